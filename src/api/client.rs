use std::time::{Duration, SystemTime, UNIX_EPOCH};

use reqwest::blocking::{Client, RequestBuilder, Response};
use reqwest::header::{self, HeaderMap, HeaderValue};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::{debug, info};
use url::{Origin, Url};

use super::decode::decode_stream;
use super::parser::{parse_series_fragments, parse_title_page};
use super::types::{ContentKind, Cookies, EpisodeRef, SeriesInfo, Stream, Title};
use super::{ApiError, SiteApi};

const USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0 Safari/537.36";
const CDN_SERIES_PATH: &str = "ajax/get_cdn_series/";
const LOGIN_PATH: &str = "ajax/login/";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Deserialize, Debug)]
struct EpisodesResponse {
    success: bool,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    seasons: Option<String>,
    #[serde(default)]
    episodes: Option<String>,
}

#[derive(Deserialize, Debug)]
struct StreamResponse {
    success: bool,
    #[serde(default)]
    message: Option<String>,
    /// Either the encoded stream string or `false`.
    #[serde(default)]
    url: serde_json::Value,
}

#[derive(Deserialize, Debug)]
struct LoginResponse {
    success: bool,
    #[serde(default)]
    message: Option<String>,
}

/// Blocking client for HDrezka and its mirrors.
pub struct HdRezkaClient {
    client: Client,
    /// Cookie-free client for size probes against CDN hosts.
    probe: Client,
    session: Option<SessionCookies>,
}

/// Cookies of a saved login together with the site they belong to.
struct SessionCookies {
    origin: Origin,
    header: HeaderValue,
}

impl HdRezkaClient {
    /// Anonymous client.
    pub fn new() -> Result<Self, ApiError> {
        let mut headers = HeaderMap::new();
        headers.insert(header::USER_AGENT, HeaderValue::from_static(USER_AGENT));
        let client = Client::builder()
            .default_headers(headers.clone())
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        let probe = Client::builder()
            .default_headers(headers)
            .timeout(PROBE_TIMEOUT)
            .build()?;
        Ok(Self {
            client,
            probe,
            session: None,
        })
    }

    /// Client that signs requests to `origin` with the saved `cookies`, so
    /// premium qualities become available. Other hosts never see them.
    pub fn with_session(origin: &Url, cookies: &Cookies) -> Result<Self, ApiError> {
        let mut client = Self::new()?;
        if !cookies.is_empty() {
            let header = HeaderValue::from_str(&cookie_header(cookies))
                .map_err(|e| ApiError::InvalidCookie(e.to_string()))?;
            client.session = Some(SessionCookies {
                origin: origin.origin(),
                header,
            });
        }
        Ok(client)
    }

    fn cookies_for(&self, url: &Url) -> Option<&HeaderValue> {
        self.session
            .as_ref()
            .filter(|s| s.origin == url.origin())
            .map(|s| &s.header)
    }

    fn with_cookies(&self, request: RequestBuilder, url: &Url) -> RequestBuilder {
        match self.cookies_for(url) {
            Some(cookies) => request.header(header::COOKIE, cookies.clone()),
            None => request,
        }
    }

    /// POSTs a form to one of the site's ajax endpoints and decodes the JSON
    /// answer. The response headers are handed back for login cookies.
    fn ajax<T: DeserializeOwned>(
        &self,
        origin: &Url,
        path: &str,
        referer: &Url,
        form: &[(&str, String)],
    ) -> Result<(T, HeaderMap), ApiError> {
        let endpoint = origin
            .join(path)
            .map_err(|e| ApiError::Parse(e.to_string()))?;
        debug!(%endpoint, "ajax request");
        let request = self
            .client
            .post(endpoint.clone())
            .query(&[("t", timestamp_millis().to_string())])
            .header(header::REFERER, referer.as_str())
            .header("X-Requested-With", "XMLHttpRequest")
            .form(form);
        let resp = self.with_cookies(request, &endpoint).send()?;
        let resp = check_status(resp)?;
        let headers = resp.headers().clone();
        let body = resp.text()?;
        Ok((serde_json::from_str(&body)?, headers))
    }

    fn probe_range(&self, link: &str) -> Result<Option<u64>, ApiError> {
        let resp = self
            .probe
            .get(link)
            .header(header::RANGE, "bytes=0-0")
            .send()?;
        if let Some(total) = header_str(resp.headers(), header::CONTENT_RANGE)
            .and_then(|cr| cr.rsplit_once('/'))
            .and_then(|(_, total)| total.trim().parse().ok())
        {
            return Ok(Some(total));
        }
        Ok(header_str(resp.headers(), header::CONTENT_LENGTH).and_then(|cl| cl.trim().parse().ok()))
    }

    fn probe_head(&self, link: &str) -> Result<Option<u64>, ApiError> {
        let resp = self.probe.head(link).send()?;
        let status = resp.status();
        if !(status.is_success() || status.is_redirection()) {
            return Ok(None);
        }
        Ok(header_str(resp.headers(), header::CONTENT_LENGTH).and_then(|cl| cl.trim().parse().ok()))
    }
}

impl SiteApi for HdRezkaClient {
    fn login(&self, origin: &Url, login: &str, password: &str) -> Result<Cookies, ApiError> {
        info!(%origin, "logging in");
        let form = [
            ("login_name", login.to_string()),
            ("login_password", password.to_string()),
            ("login_not_save", "0".to_string()),
        ];
        let (resp, headers): (LoginResponse, _) = self.ajax(origin, LOGIN_PATH, origin, &form)?;
        if !resp.success {
            return Err(ApiError::LoginRejected(
                resp.message.unwrap_or_else(|| "wrong login or password".into()),
            ));
        }
        let cookies = parse_set_cookies(&headers);
        debug!(names = ?cookies.keys().collect::<Vec<_>>(), "session cookies received");
        Ok(cookies)
    }

    fn title(&self, url: &Url) -> Result<Title, ApiError> {
        debug!(%url, "fetching title page");
        let request = self.with_cookies(self.client.get(url.clone()), url);
        let resp = check_status(request.send()?)?;
        // Mirrors redirect to their canonical host; ajax calls must follow.
        let final_url = resp.url().clone();
        let html = resp.text()?;
        parse_title_page(&html, &final_url)
    }

    fn series_info(&self, title: &Title, translator_id: u32) -> Result<SeriesInfo, ApiError> {
        let form = [
            ("id", title.post_id.to_string()),
            ("translator_id", translator_id.to_string()),
            ("action", "get_episodes".to_string()),
        ];
        let (resp, _): (EpisodesResponse, _) =
            self.ajax(&title.origin, CDN_SERIES_PATH, &title.url, &form)?;
        if !resp.success {
            return Err(ApiError::Rejected(resp.message.unwrap_or_default()));
        }
        Ok(parse_series_fragments(
            resp.seasons.as_deref().unwrap_or_default(),
            resp.episodes.as_deref().unwrap_or_default(),
        ))
    }

    fn stream(
        &self,
        title: &Title,
        translator_id: u32,
        episode: Option<EpisodeRef>,
    ) -> Result<Stream, ApiError> {
        let mut form = vec![
            ("id", title.post_id.to_string()),
            ("translator_id", translator_id.to_string()),
        ];
        match (&title.kind, episode) {
            (_, Some(ep)) => {
                form.push(("season", ep.season.to_string()));
                form.push(("episode", ep.episode.to_string()));
                form.push(("action", "get_stream".to_string()));
            }
            (ContentKind::Series, None) => {
                return Err(ApiError::Rejected("a series needs season and episode".into()));
            }
            (_, None) => {
                form.push(("is_camrip", title.player.is_camrip.to_string()));
                form.push(("is_ads", title.player.is_ads.to_string()));
                form.push(("is_director", title.player.is_director.to_string()));
                form.push(("action", "get_movie".to_string()));
            }
        }
        let (resp, _): (StreamResponse, _) =
            self.ajax(&title.origin, CDN_SERIES_PATH, &title.url, &form)?;
        if !resp.success {
            return Err(ApiError::Rejected(resp.message.unwrap_or_default()));
        }
        let encoded = resp.url.as_str().ok_or(ApiError::NoStream)?;
        decode_stream(encoded)
    }

    fn content_length(&self, link: &str) -> Option<u64> {
        match self.probe_head(link) {
            Ok(Some(len)) => return Some(len),
            Ok(None) => {}
            Err(e) => debug!(link, error = %e, "HEAD probe failed"),
        }
        // Some CDNs ignore HEAD; a one byte range reveals the total size.
        self.probe_range(link).unwrap_or_else(|e| {
            debug!(link, error = %e, "range probe failed");
            None
        })
    }
}

fn check_status(resp: Response) -> Result<Response, ApiError> {
    let status = resp.status();
    if status.is_success() {
        Ok(resp)
    } else {
        Err(ApiError::Status {
            url: resp.url().to_string(),
            status,
        })
    }
}

fn header_str(headers: &HeaderMap, name: header::HeaderName) -> Option<&str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

fn timestamp_millis() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or_default()
}

fn cookie_header(cookies: &Cookies) -> String {
    cookies
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join("; ")
}

/// Collects `name=value` out of every `Set-Cookie` header, skipping cookies
/// the server is deleting.
fn parse_set_cookies(headers: &HeaderMap) -> Cookies {
    headers
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .filter_map(|v| {
            let pair = v.split(';').next()?;
            let (name, value) = pair.split_once('=')?;
            let (name, value) = (name.trim(), value.trim());
            if name.is_empty() || value.is_empty() || value == "deleted" {
                return None;
            }
            Some((name.to_string(), value.to_string()))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::types::PlayerFlags;
    use std::io::{BufRead, BufReader, Read, Write};
    use std::net::TcpListener;
    use std::thread;

    /// A request as the fixture server received it.
    #[derive(Debug)]
    struct Seen {
        line: String,
        headers: Vec<(String, String)>,
        body: String,
    }

    impl Seen {
        fn header(&self, name: &str) -> Option<&str> {
            self.headers
                .iter()
                .find(|(k, _)| k.eq_ignore_ascii_case(name))
                .map(|(_, v)| v.as_str())
        }

        fn form(&self) -> Vec<(String, String)> {
            url::form_urlencoded::parse(self.body.as_bytes())
                .into_owned()
                .collect()
        }

        fn field(&self, name: &str) -> Option<String> {
            self.form().into_iter().find(|(k, _)| k == name).map(|(_, v)| v)
        }
    }

    /// Answers each accepted connection with the next canned response and
    /// hands back what was requested.
    fn serve(responses: Vec<String>) -> (Url, thread::JoinHandle<Vec<Seen>>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let base = Url::parse(&format!("http://{}/", listener.local_addr().unwrap())).unwrap();
        let handle = thread::spawn(move || {
            let mut seen = Vec::new();
            for response in responses {
                let (mut stream, _) = listener.accept().unwrap();
                let mut reader = BufReader::new(stream.try_clone().unwrap());
                let mut line = String::new();
                reader.read_line(&mut line).unwrap();
                let mut headers = Vec::new();
                loop {
                    let mut h = String::new();
                    reader.read_line(&mut h).unwrap();
                    let h = h.trim_end();
                    if h.is_empty() {
                        break;
                    }
                    if let Some((k, v)) = h.split_once(':') {
                        headers.push((k.trim().to_string(), v.trim().to_string()));
                    }
                }
                let len = headers
                    .iter()
                    .find(|(k, _)| k.eq_ignore_ascii_case("content-length"))
                    .and_then(|(_, v)| v.parse::<usize>().ok())
                    .unwrap_or(0);
                let mut body = vec![0; len];
                reader.read_exact(&mut body).unwrap();
                seen.push(Seen {
                    line: line.trim_end().to_string(),
                    headers,
                    body: String::from_utf8(body).unwrap(),
                });
                stream.write_all(response.as_bytes()).unwrap();
            }
            seen
        });
        (base, handle)
    }

    fn reply(status: &str, headers: &[&str], body: &str) -> String {
        let mut out = format!("HTTP/1.1 {status}\r\nConnection: close\r\n");
        for h in headers {
            out.push_str(h);
            out.push_str("\r\n");
        }
        out.push_str("\r\n");
        out.push_str(body);
        out
    }

    fn json(body: &str) -> String {
        let length = format!("Content-Length: {}", body.len());
        reply("200 OK", &["Content-Type: application/json", length.as_str()], body)
    }

    fn title(origin: &Url, kind: ContentKind) -> Title {
        Title {
            url: origin.join("films/drama/777-film.html").unwrap(),
            origin: origin.clone(),
            post_id: 777,
            name: "Film".into(),
            kind,
            translators: Vec::new(),
            player: PlayerFlags {
                is_camrip: 1,
                is_ads: 0,
                is_director: 1,
            },
        }
    }

    fn cookies(pairs: &[(&str, &str)]) -> Cookies {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn movie_stream_echoes_player_flags() {
        let (base, server) = serve(vec![json(
            r#"{"success":true,"message":"","url":"[720p]https://cdn.example/720.mp4,[1080p]https://cdn.example/1080.mp4"}"#,
        )]);
        let t = title(&base, ContentKind::Movie);

        let stream = HdRezkaClient::new().unwrap().stream(&t, 110, None).unwrap();

        assert_eq!(stream.variants.len(), 2);
        let seen = server.join().unwrap();
        let req = &seen[0];
        assert!(req.line.starts_with("POST /ajax/get_cdn_series/?t="), "{}", req.line);
        assert_eq!(req.header("x-requested-with"), Some("XMLHttpRequest"));
        assert_eq!(req.header("referer"), Some(t.url.as_str()));
        assert_eq!(req.field("action").as_deref(), Some("get_movie"));
        assert_eq!(req.field("id").as_deref(), Some("777"));
        assert_eq!(req.field("translator_id").as_deref(), Some("110"));
        assert_eq!(req.field("is_camrip").as_deref(), Some("1"));
        assert_eq!(req.field("is_ads").as_deref(), Some("0"));
        assert_eq!(req.field("is_director").as_deref(), Some("1"));
    }

    #[test]
    fn episode_stream_names_season_and_episode() {
        let (base, server) = serve(vec![json(
            r#"{"success":true,"message":"","url":"[480p]https://cdn.example/480.mp4"}"#,
        )]);
        let t = title(&base, ContentKind::Series);
        let episode = EpisodeRef { season: 2, episode: 5 };

        let stream = HdRezkaClient::new()
            .unwrap()
            .stream(&t, 56, Some(episode))
            .unwrap();

        assert_eq!(stream.links("480p").unwrap(), ["https://cdn.example/480.mp4"]);
        let seen = server.join().unwrap();
        let req = &seen[0];
        assert_eq!(req.field("action").as_deref(), Some("get_stream"));
        assert_eq!(req.field("season").as_deref(), Some("2"));
        assert_eq!(req.field("episode").as_deref(), Some("5"));
        assert_eq!(req.field("translator_id").as_deref(), Some("56"));
        assert_eq!(req.field("is_camrip"), None);
    }

    #[test]
    fn series_without_episode_is_refused_locally() {
        let t = title(&Url::parse("http://127.0.0.1:9/").unwrap(), ContentKind::Series);
        let err = HdRezkaClient::new().unwrap().stream(&t, 56, None).unwrap_err();
        assert!(matches!(err, ApiError::Rejected(_)));
    }

    #[test]
    fn episode_list_is_requested_per_translator() {
        let (base, server) = serve(vec![json(
            r#"{"success":true,"message":"","seasons":"<li class=\"b-simple_season__item\" data-tab_id=\"1\">Season 1</li>","episodes":"<li class=\"b-simple_episode__item\" data-season_id=\"1\" data-episode_id=\"1\">Episode 1</li><li class=\"b-simple_episode__item\" data-season_id=\"1\" data-episode_id=\"2\">Episode 2</li>"}"#,
        )]);
        let t = title(&base, ContentKind::Series);

        let info = HdRezkaClient::new().unwrap().series_info(&t, 238).unwrap();

        assert_eq!(
            info.all_episodes(),
            vec![
                EpisodeRef { season: 1, episode: 1 },
                EpisodeRef { season: 1, episode: 2 },
            ]
        );
        let seen = server.join().unwrap();
        let req = &seen[0];
        assert_eq!(req.field("action").as_deref(), Some("get_episodes"));
        assert_eq!(req.field("id").as_deref(), Some("777"));
        assert_eq!(req.field("translator_id").as_deref(), Some("238"));
    }

    #[test]
    fn refusals_and_missing_streams_are_distinguished() {
        let (base, server) = serve(vec![
            json(r#"{"success":false,"message":"Translation unavailable"}"#),
            json(r#"{"success":true,"message":"","url":false}"#),
            json(r#"{"success":false,"message":"No episodes"}"#),
        ]);
        let client = HdRezkaClient::new().unwrap();
        let t = title(&base, ContentKind::Movie);

        match client.stream(&t, 1, None) {
            Err(ApiError::Rejected(msg)) => assert_eq!(msg, "Translation unavailable"),
            other => panic!("expected rejection, got {other:?}"),
        }
        assert!(matches!(client.stream(&t, 1, None), Err(ApiError::NoStream)));
        assert!(matches!(client.series_info(&t, 1), Err(ApiError::Rejected(_))));
        assert_eq!(server.join().unwrap().len(), 3);
    }

    #[test]
    fn login_posts_credentials_and_keeps_cookies() {
        let body = r#"{"success":true,"message":""}"#;
        let length = format!("Content-Length: {}", body.len());
        let (base, server) = serve(vec![reply(
            "200 OK",
            &[
                "Content-Type: application/json",
                "Set-Cookie: dle_user_id=4711; path=/",
                "Set-Cookie: dle_password=5f4dcc3b; path=/; httponly",
                "Set-Cookie: PHPSESSID=deleted; path=/",
                length.as_str(),
            ],
            body,
        )]);

        let got = HdRezkaClient::new()
            .unwrap()
            .login(&base, "neo", "trinity")
            .unwrap();

        assert_eq!(got, cookies(&[("dle_user_id", "4711"), ("dle_password", "5f4dcc3b")]));
        let seen = server.join().unwrap();
        let req = &seen[0];
        assert!(req.line.starts_with("POST /ajax/login/?t="), "{}", req.line);
        assert_eq!(req.field("login_name").as_deref(), Some("neo"));
        assert_eq!(req.field("login_password").as_deref(), Some("trinity"));
        assert_eq!(req.field("login_not_save").as_deref(), Some("0"));
    }

    #[test]
    fn rejected_login_carries_site_message() {
        let (base, server) = serve(vec![json(r#"{"success":false,"message":"Wrong password"}"#)]);
        let err = HdRezkaClient::new()
            .unwrap()
            .login(&base, "neo", "nope")
            .unwrap_err();
        assert!(matches!(err, ApiError::LoginRejected(ref m) if m == "Wrong password"));
        server.join().unwrap();
    }

    #[test]
    fn size_probe_falls_back_to_range_without_cookies() {
        let (base, server) = serve(vec![
            reply("405 Method Not Allowed", &["Content-Length: 0"], ""),
            reply(
                "206 Partial Content",
                &["Content-Length: 1", "Content-Range: bytes 0-0/12345"],
                "x",
            ),
        ]);
        let client =
            HdRezkaClient::with_session(&base, &cookies(&[("dle_password", "secrethash")])).unwrap();
        let link = base.join("cdn/video.mp4").unwrap();

        assert_eq!(client.content_length(link.as_str()), Some(12345));

        let seen = server.join().unwrap();
        assert!(seen[0].line.starts_with("HEAD /cdn/video.mp4"), "{}", seen[0].line);
        assert!(seen[1].line.starts_with("GET /cdn/video.mp4"), "{}", seen[1].line);
        assert_eq!(seen[1].header("range"), Some("bytes=0-0"));
        assert!(seen.iter().all(|req| req.header("cookie").is_none()));
    }

    #[test]
    fn size_probe_reads_head_length() {
        let (base, server) = serve(vec![reply("200 OK", &["Content-Length: 999"], "")]);
        let link = base.join("cdn/video.mp4").unwrap();
        assert_eq!(HdRezkaClient::new().unwrap().content_length(link.as_str()), Some(999));
        assert_eq!(server.join().unwrap().len(), 1);
    }

    #[test]
    fn session_cookies_only_go_to_their_site() {
        let page = r#"<meta property="og:type" content="video.movie"><div class="b-post__title"><h1>X</h1></div>"#;
        let page_reply = || {
            let length = format!("Content-Length: {}", page.len());
            reply("200 OK", &["Content-Type: text/html", length.as_str()], page)
        };
        let (home, home_server) = serve(vec![page_reply()]);
        let (other, other_server) = serve(vec![page_reply()]);
        let client = HdRezkaClient::with_session(&home, &cookies(&[("dle_user_id", "1")])).unwrap();

        client.title(&home.join("films/1-x.html").unwrap()).unwrap();
        client.title(&other.join("films/1-x.html").unwrap()).unwrap();

        assert_eq!(home_server.join().unwrap()[0].header("cookie"), Some("dle_user_id=1"));
        assert_eq!(other_server.join().unwrap()[0].header("cookie"), None);
    }

    #[test]
    fn collects_login_cookies() {
        let mut headers = HeaderMap::new();
        for c in [
            "dle_user_id=4711; expires=Fri, 01-Jan-2027 00:00:00 GMT; path=/",
            "dle_password=5f4dcc3b5aa765d61d8327deb882cf99; path=/; httponly",
            "PHPSESSID=deleted; expires=Thu, 01-Jan-1970 00:00:01 GMT",
            "garbage",
        ] {
            headers.append(header::SET_COOKIE, HeaderValue::from_static(c));
        }
        let cookies = parse_set_cookies(&headers);
        assert_eq!(cookies.len(), 2);
        assert_eq!(cookies["dle_user_id"], "4711");
        assert_eq!(cookies["dle_password"], "5f4dcc3b5aa765d61d8327deb882cf99");
    }

    #[test]
    fn cookie_header_joins_pairs() {
        assert_eq!(cookie_header(&cookies(&[("a", "1"), ("b", "2")])), "a=1; b=2");
    }

    #[test]
    fn unprintable_session_cookie_is_rejected() {
        let origin = Url::parse("https://hdrezka.ag/").unwrap();
        let result = HdRezkaClient::with_session(&origin, &cookies(&[("a", "bad\nvalue")]));
        assert!(matches!(result, Err(ApiError::InvalidCookie(_))));
    }

    #[test]
    fn stream_responses_accept_false_url() {
        let resp: StreamResponse =
            serde_json::from_str(r#"{"success":true,"message":"","url":false}"#).unwrap();
        assert!(resp.url.as_str().is_none());
    }
}
