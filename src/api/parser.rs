use std::sync::LazyLock;

use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use url::Url;

use super::ApiError;
use super::types::{ContentKind, Episode, PlayerFlags, Season, SeriesInfo, Title, Translator};

macro_rules! selector {
    ($name:ident, $css:expr) => {
        static $name: LazyLock<Selector> = LazyLock::new(|| Selector::parse($css).unwrap());
    };
}

selector!(TITLE_SEL, ".b-post__title h1");
selector!(OG_TITLE_SEL, r#"meta[property="og:title"]"#);
selector!(OG_TYPE_SEL, r#"meta[property="og:type"]"#);
selector!(POST_ID_SEL, "#post_id");
selector!(FAVORITES_SEL, "#user-favorites-holder");
selector!(TRANSLATOR_SEL, "#translators-list .b-translator__item");
selector!(INFO_ROW_SEL, ".b-post__info tr");
selector!(TD_SEL, "td");
selector!(SEASON_SEL, ".b-simple_season__item");
selector!(EPISODE_SEL, ".b-simple_episode__item");

/// `sof.tv.initCDNSeriesEvents(id, translator, ...)` or
/// `initCDNMoviesEvents(id, translator, camrip, ads, director, ...)`.
static PLAYER_INIT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"initCDN(?P<kind>Series|Movies)Events\(\s*(?P<id>\d+)\s*,\s*(?P<tr>\d+)(?:\s*,\s*(?P<a>\d+)\s*,\s*(?P<b>\d+)\s*,\s*(?P<c>\d+))?",
    )
    .unwrap()
});

static URL_ID_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^(\d+)-").unwrap());

const DEFAULT_TRANSLATOR_NAME: &str = "Default";

fn text_of(el: ElementRef) -> String {
    el.text().collect::<String>().trim().to_string()
}

/// Site root for `url`, used as the base for ajax endpoints.
pub fn origin_of(url: &Url) -> Url {
    let mut origin = url.clone();
    origin.set_path("/");
    origin.set_query(None);
    origin.set_fragment(None);
    origin
}

fn post_id_from_url(url: &Url) -> Option<u64> {
    let last = url.path_segments()?.filter(|s| !s.is_empty()).last()?;
    URL_ID_RE.captures(last)?.get(1)?.as_str().parse().ok()
}

pub fn parse_title_page(html: &str, url: &Url) -> Result<Title, ApiError> {
    let doc = Html::parse_document(html);

    let name = doc
        .select(&TITLE_SEL)
        .next()
        .map(text_of)
        .filter(|n| !n.is_empty())
        .or_else(|| {
            doc.select(&OG_TITLE_SEL)
                .next()
                .and_then(|m| m.value().attr("content"))
                .map(|c| c.trim().to_string())
        })
        .ok_or_else(|| ApiError::Parse("title name not found".into()))?;

    let kind = doc
        .select(&OG_TYPE_SEL)
        .next()
        .and_then(|m| m.value().attr("content"))
        .map(ContentKind::from_og_type)
        .ok_or_else(|| ApiError::Parse("content type not found".into()))?;

    let player = PLAYER_INIT_RE.captures(html);

    let post_id = doc
        .select(&POST_ID_SEL)
        .next()
        .and_then(|e| e.value().attr("value"))
        .or_else(|| {
            doc.select(&FAVORITES_SEL)
                .next()
                .and_then(|e| e.value().attr("data-post_id"))
        })
        .and_then(|v| v.trim().parse().ok())
        .or_else(|| player.as_ref().and_then(|c| c["id"].parse().ok()))
        .or_else(|| post_id_from_url(url))
        .ok_or_else(|| ApiError::Parse("post id not found".into()))?;

    let mut translators: Vec<Translator> = doc
        .select(&TRANSLATOR_SEL)
        .filter_map(|li| {
            let id = li.value().attr("data-translator_id")?.parse().ok()?;
            let name = li
                .value()
                .attr("title")
                .map(|t| t.trim().to_string())
                .filter(|t| !t.is_empty())
                .unwrap_or_else(|| text_of(li));
            let premium = li.value().classes().any(|c| c == "b-prem_translator");
            Some(Translator { id, name, premium })
        })
        .collect();

    if translators.is_empty() {
        if let Some(c) = player.as_ref() {
            if let Ok(id) = c["tr"].parse() {
                translators.push(Translator {
                    id,
                    name: default_translator_name(&doc),
                    premium: false,
                });
            }
        }
    }

    let player = match player.as_ref() {
        Some(c) if &c["kind"] == "Movies" => {
            let flag = |name: &str| {
                c.name(name)
                    .and_then(|m| m.as_str().parse().ok())
                    .unwrap_or(0)
            };
            PlayerFlags {
                is_camrip: flag("a"),
                is_ads: flag("b"),
                is_director: flag("c"),
            }
        }
        _ => PlayerFlags::default(),
    };

    Ok(Title {
        url: url.clone(),
        origin: origin_of(url),
        post_id,
        name,
        kind,
        translators,
        player,
    })
}

/// The "В переводе" row of the info table names the sole translation when the
/// page has no translator list.
fn default_translator_name(doc: &Html) -> String {
    doc.select(&INFO_ROW_SEL)
        .find_map(|row| {
            let mut cells = row.select(&TD_SEL);
            let head = text_of(cells.next()?);
            if !head.contains("переводе") {
                return None;
            }
            let value = text_of(cells.next()?);
            (!value.is_empty()).then_some(value)
        })
        .unwrap_or_else(|| DEFAULT_TRANSLATOR_NAME.to_string())
}

/// Builds series info out of the `seasons` and `episodes` HTML fragments the
/// episode list endpoint returns.
pub fn parse_series_fragments(seasons_html: &str, episodes_html: &str) -> SeriesInfo {
    let seasons_doc = Html::parse_fragment(seasons_html);
    let episodes_doc = Html::parse_fragment(episodes_html);

    let mut seasons: Vec<Season> = seasons_doc
        .select(&SEASON_SEL)
        .filter_map(|li| {
            let number = li.value().attr("data-tab_id")?.parse().ok()?;
            Some(Season {
                number,
                label: text_of(li),
                episodes: Vec::new(),
            })
        })
        .collect();

    for li in episodes_doc.select(&EPISODE_SEL) {
        let attrs = li.value();
        let (Some(season), Some(number)) = (
            attrs.attr("data-season_id").and_then(|s| s.parse::<u32>().ok()),
            attrs.attr("data-episode_id").and_then(|e| e.parse::<u32>().ok()),
        ) else {
            continue;
        };
        let episode = Episode {
            number,
            label: text_of(li),
        };
        match seasons.iter_mut().find(|s| s.number == season) {
            Some(s) => s.episodes.push(episode),
            None => seasons.push(Season {
                number: season,
                label: format!("Season {season}"),
                episodes: vec![episode],
            }),
        }
    }

    SeriesInfo { seasons }
}
