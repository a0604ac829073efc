//! Access to the streaming site: page scraping, episode lists, stream
//! resolution and login. Everything the rest of the crate needs from the site
//! goes through [`SiteApi`].

mod client;
mod decode;
mod parser;
pub mod types;

pub use client::HdRezkaClient;
pub use parser::origin_of;
pub use types::{ContentKind, Cookies, EpisodeRef, SeriesInfo, Stream, Title, Translator};

use thiserror::Error;
use url::Url;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("{url} answered with status {status}")]
    Status {
        url: String,
        status: reqwest::StatusCode,
    },
    #[error("unexpected response body: {0}")]
    Json(#[from] serde_json::Error),
    #[error("could not understand the page: {0}")]
    Parse(String),
    #[error("could not decode stream list: {0}")]
    Decode(String),
    #[error("site refused the request: {0}")]
    Rejected(String),
    #[error("no playable stream offered")]
    NoStream,
    #[error("login rejected: {0}")]
    LoginRejected(String),
    #[error("saved session cookie is not usable: {0}")]
    InvalidCookie(String),
}

/// The operations the CLI performs against the site.
pub trait SiteApi {
    /// Signs in and returns the session cookies the site handed out.
    fn login(&self, origin: &Url, login: &str, password: &str) -> Result<Cookies, ApiError>;

    fn title(&self, url: &Url) -> Result<Title, ApiError>;

    fn series_info(&self, title: &Title, translator_id: u32) -> Result<SeriesInfo, ApiError>;

    /// Resolves the stream for a movie (`episode == None`) or one episode.
    fn stream(
        &self,
        title: &Title,
        translator_id: u32,
        episode: Option<EpisodeRef>,
    ) -> Result<Stream, ApiError>;

    /// Best-effort size of a remote file.
    fn content_length(&self, link: &str) -> Option<u64>;
}
