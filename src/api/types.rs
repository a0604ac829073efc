use std::collections::BTreeMap;
use std::fmt;

use url::Url;

/// Cookie name/value pairs handed out by the site on login.
pub type Cookies = BTreeMap<String, String>;

/// Quality labels in order of preference, best first.
pub const PREFERRED_QUALITIES: [&str; 5] = ["1080p Ultra", "1080p", "720p", "480p", "360p"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContentKind {
    Movie,
    Series,
    Other(String),
}

impl ContentKind {
    pub fn from_og_type(og_type: &str) -> Self {
        match og_type {
            "video.tv_series" => ContentKind::Series,
            "video.movie" => ContentKind::Movie,
            other => ContentKind::Other(other.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Translator {
    pub id: u32,
    pub name: String,
    pub premium: bool,
}

/// Flags the movie player is initialised with; they are echoed back when
/// requesting a movie stream.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlayerFlags {
    pub is_camrip: u8,
    pub is_ads: u8,
    pub is_director: u8,
}

#[derive(Debug, Clone)]
pub struct Title {
    pub url: Url,
    pub origin: Url,
    pub post_id: u64,
    pub name: String,
    pub kind: ContentKind,
    pub translators: Vec<Translator>,
    pub player: PlayerFlags,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EpisodeRef {
    pub season: u32,
    pub episode: u32,
}

impl fmt::Display for EpisodeRef {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "S{:02}E{:02}", self.season, self.episode)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Episode {
    pub number: u32,
    pub label: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Season {
    pub number: u32,
    pub label: String,
    pub episodes: Vec<Episode>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SeriesInfo {
    pub seasons: Vec<Season>,
}

impl SeriesInfo {
    /// Every episode of every season, in site order.
    pub fn all_episodes(&self) -> Vec<EpisodeRef> {
        self.seasons
            .iter()
            .flat_map(|s| {
                s.episodes.iter().map(move |e| EpisodeRef {
                    season: s.number,
                    episode: e.number,
                })
            })
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Variant {
    pub quality: String,
    pub links: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Stream {
    pub variants: Vec<Variant>,
}

impl Stream {
    pub fn links(&self, quality: &str) -> Option<&[String]> {
        self.variants
            .iter()
            .find(|v| v.quality == quality)
            .map(|v| v.links.as_slice())
    }

    /// Picks `forced` when the stream carries it, otherwise the best entry of
    /// [`PREFERRED_QUALITIES`], otherwise whatever the site listed first.
    pub fn choose_quality(&self, forced: Option<&str>) -> Option<&str> {
        let find = |q: &str| {
            self.variants
                .iter()
                .find(|v| v.quality == q)
                .map(|v| v.quality.as_str())
        };
        if let Some(q) = forced {
            if let Some(found) = find(q) {
                return Some(found);
            }
            tracing::warn!(quality = q, "requested quality not offered, using preference list");
        }
        PREFERRED_QUALITIES
            .iter()
            .find_map(|q| find(*q))
            .or_else(|| self.variants.first().map(|v| v.quality.as_str()))
    }
}
