//! The download and login flows, written against [`SiteApi`], [`Prompter`]
//! and [`Fetcher`] so they can run without a network or a terminal.

use std::path::{Path, PathBuf};

use anyhow::Result;
use colored::Colorize;
use tracing::{debug, info};
use url::Url;

use crate::api::{ContentKind, EpisodeRef, SiteApi, Stream, Title, Translator, origin_of};
use crate::download::{DownloadError, Fetcher, utils};
use crate::error::CliError;
use crate::select::Prompter;
use crate::session::{Session, SessionData};

#[derive(Debug, Clone)]
pub struct DownloadRequest {
    pub url: Url,
    pub target_dir: PathBuf,
    pub quality: Option<String>,
    pub translator: Option<u32>,
    pub all_episodes: bool,
    pub overwrite: bool,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Summary {
    pub downloaded: Vec<PathBuf>,
    pub skipped: usize,
    pub failed: usize,
}

/// Signs in through `api` and stores the returned cookies.
pub fn login<A: SiteApi>(
    api: &A,
    base_url: &Url,
    login: &str,
    password: &str,
    session: &Session,
) -> Result<PathBuf, CliError> {
    let login = login.trim();
    if login.is_empty() {
        return Err(CliError::NoLogin);
    }
    let origin = origin_of(base_url);
    let cookies = api
        .login(&origin, login, password)
        .map_err(CliError::LoginFailed)?;
    if cookies.is_empty() {
        return Err(CliError::NoSessionCookies);
    }
    let data = SessionData {
        origin: origin.to_string(),
        cookies,
    };
    let path = session
        .save(&data)
        .map_err(|e| CliError::SaveSession(e.into()))?;
    Ok(path)
}

pub struct App<'a, A, P, F> {
    api: &'a A,
    prompter: &'a mut P,
    fetcher: &'a mut F,
}

impl<'a, A: SiteApi, P: Prompter, F: Fetcher> App<'a, A, P, F> {
    pub fn new(api: &'a A, prompter: &'a mut P, fetcher: &'a mut F) -> Self {
        Self {
            api,
            prompter,
            fetcher,
        }
    }

    pub fn run(&mut self, req: &DownloadRequest) -> Result<Summary> {
        println!("URL: {}", req.url);
        let title = self.api.title(&req.url).map_err(CliError::Title)?;
        info!(name = %title.name, kind = ?title.kind, post_id = title.post_id, "title loaded");

        if title.translators.is_empty() {
            return Err(CliError::NoTranslators.into());
        }
        let translator_id = self.choose_translator(&title.translators, req.translator)?;
        println!("Selected translator id: {}", translator_id);

        let mut summary = Summary::default();
        match &title.kind {
            ContentKind::Series => self.download_series(&title, translator_id, req, &mut summary)?,
            ContentKind::Movie => {
                let stream = self
                    .api
                    .stream(&title, translator_id, None)
                    .map_err(CliError::MovieStream)?;
                self.download_stream(&stream, &title.name, req, &mut summary)?;
            }
            ContentKind::Other(kind) => {
                return Err(CliError::UnsupportedContent(kind.clone()).into());
            }
        }

        if summary.failed > 0 {
            return Err(CliError::DownloadsFailed(summary.failed).into());
        }
        Ok(summary)
    }

    fn choose_translator(&mut self, translators: &[Translator], preset: Option<u32>) -> Result<u32> {
        if let Some(id) = preset {
            return match translators.iter().find(|t| t.id == id) {
                Some(t) => Ok(t.id),
                None => Err(CliError::UnknownTranslator(id).into()),
            };
        }
        if let [only] = translators {
            debug!(id = only.id, "single translator, not asking");
            return Ok(only.id);
        }
        self.prompter
            .choose_translator(translators)?
            .ok_or_else(|| CliError::NoTranslatorChosen.into())
    }

    fn download_series(
        &mut self,
        title: &Title,
        translator_id: u32,
        req: &DownloadRequest,
        summary: &mut Summary,
    ) -> Result<()> {
        let info = self
            .api
            .series_info(title, translator_id)
            .map_err(CliError::SeriesInfo)?;
        if info.all_episodes().is_empty() {
            return Err(CliError::NoEpisodesAvailable.into());
        }

        let chosen: Vec<EpisodeRef> = if req.all_episodes {
            info.all_episodes()
        } else {
            self.prompter.choose_episodes(&info)?
        };
        if chosen.is_empty() {
            return Err(CliError::NoEpisodesChosen.into());
        }

        for episode in chosen {
            let stream = match self.api.stream(title, translator_id, Some(episode)) {
                Ok(stream) => stream,
                Err(e) => {
                    eprintln!("{}", format!("Failed to get stream for {episode}: {e}").red());
                    summary.failed += 1;
                    continue;
                }
            };
            let name = format!("{} - {}", title.name, episode);
            self.download_stream(&stream, &name, req, summary)?;
        }
        Ok(())
    }

    /// Largest of several mirrors of the same quality, or the first when no
    /// size is known.
    fn pick_link<'s>(&self, links: &'s [String]) -> &'s str {
        if let [only] = links {
            return only;
        }
        let mut best: Option<(&str, u64)> = None;
        for link in links {
            let size = self.api.content_length(link);
            debug!(link, ?size, "probed link");
            if let Some(size) = size {
                if best.is_none_or(|(_, b)| size > b) {
                    best = Some((link.as_str(), size));
                }
            }
        }
        best.map(|(link, _)| link).unwrap_or(links[0].as_str())
    }

    fn download_stream(
        &mut self,
        stream: &Stream,
        name: &str,
        req: &DownloadRequest,
        summary: &mut Summary,
    ) -> Result<()> {
        let Some(quality) = stream.choose_quality(req.quality.as_deref()) else {
            eprintln!("{}", format!("No available quality for {name}").red());
            summary.failed += 1;
            return Ok(());
        };
        let links = stream.links(quality).unwrap_or_default();
        if links.is_empty() {
            eprintln!("{}", format!("No links for quality {quality} for {name}").red());
            summary.failed += 1;
            return Ok(());
        }
        let link = self.pick_link(links);

        let path = utils::build_download_path(name, &req.target_dir);
        if path.exists() && !req.overwrite {
            println!(
                "{}",
                format!("Skipping {name}: {} already exists", path.display()).yellow()
            );
            summary.skipped += 1;
            return Ok(());
        }

        println!("Downloading {} -> {} ({})", name, file_name(&path), quality);
        match self.fetcher.fetch(link, &path) {
            Ok(path) => summary.downloaded.push(path),
            Err(DownloadError::Interrupted) => return Err(CliError::Interrupted.into()),
            Err(e) => {
                eprintln!("{}", format!("Download failed for {name}: {e}").red());
                summary.failed += 1;
            }
        }
        Ok(())
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}
