//! Interactive choice of translator and episodes.
//!
//! Pickers are plain state machines fed with [`Key`]s; `terminal` draws them
//! with crossterm. Without a terminal the prompter falls back to reading
//! lines from stdin.

mod multi;
mod single;
mod terminal;

use std::io::{self, BufRead, IsTerminal, Write};

use anyhow::Result;
use tracing::warn;

pub use multi::{Group, MultiSelect};
pub use single::SingleSelect;

use crate::api::{EpisodeRef, SeriesInfo, Translator};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key {
    Up,
    Down,
    Left,
    Right,
    Toggle,
    ToggleAll,
    Enter,
    Cancel,
}

pub struct Row {
    pub text: String,
}

impl Row {
    pub fn plain(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }
}

pub enum Step<T> {
    Continue,
    Done(T),
    Cancelled,
}

pub trait Picker {
    type Output;

    fn title(&self) -> &str;
    fn footer(&self) -> &str;
    fn rows(&self) -> Vec<Row>;
    /// Index into [`Picker::rows`] of the focused row.
    fn current(&self) -> usize;
    fn handle(&mut self, key: Key) -> Step<Self::Output>;
}

/// How the download flow asks the user to choose.
pub trait Prompter {
    fn choose_translator(&mut self, translators: &[Translator]) -> Result<Option<u32>>;

    /// An empty list means nothing was chosen.
    fn choose_episodes(&mut self, info: &SeriesInfo) -> Result<Vec<EpisodeRef>>;
}

fn translator_label(t: &Translator) -> String {
    if t.premium {
        format!("{} (id={}) [premium]", t.name, t.id)
    } else {
        format!("{} (id={})", t.name, t.id)
    }
}

/// Interprets a typed answer: a 1-based list number, a translator id, or an
/// exact translator name.
pub fn resolve_translator_answer(answer: &str, translators: &[Translator]) -> Option<u32> {
    let answer = answer.trim();
    if answer.is_empty() {
        return None;
    }
    if let Ok(n) = answer.parse::<u32>() {
        let idx = n as usize;
        if (1..=translators.len()).contains(&idx) {
            return Some(translators[idx - 1].id);
        }
        return translators.iter().find(|t| t.id == n).map(|t| t.id);
    }
    translators.iter().find(|t| t.name == answer).map(|t| t.id)
}

pub fn prompt_translator_lines<R: BufRead, W: Write>(
    translators: &[Translator],
    input: &mut R,
    output: &mut W,
) -> io::Result<Option<u32>> {
    writeln!(output, "Translators:")?;
    for (i, t) in translators.iter().enumerate() {
        writeln!(output, "{}. {}", i + 1, translator_label(t))?;
    }
    write!(output, "Choose translator by number (or id): ")?;
    output.flush()?;
    let mut answer = String::new();
    input.read_line(&mut answer)?;
    Ok(resolve_translator_answer(&answer, translators))
}

fn season_groups(info: &SeriesInfo) -> Vec<Group> {
    info.seasons
        .iter()
        .map(|s| Group {
            label: s.label.clone(),
            children: s.episodes.iter().map(|e| e.label.clone()).collect(),
        })
        .collect()
}

/// Maps picker output back to season/episode numbers. Seasons without
/// episodes have nothing to download and are skipped.
pub fn episodes_from_selection(
    info: &SeriesInfo,
    selection: &[(usize, Option<usize>)],
) -> Vec<EpisodeRef> {
    selection
        .iter()
        .filter_map(|&(s, e)| {
            let season = info.seasons.get(s)?;
            let episode = season.episodes.get(e?)?;
            Some(EpisodeRef {
                season: season.number,
                episode: episode.number,
            })
        })
        .collect()
}

/// Full screen pickers on a terminal, line prompts otherwise.
pub struct TerminalPrompter {
    interactive: bool,
}

impl TerminalPrompter {
    pub fn new() -> Self {
        Self {
            interactive: io::stdin().is_terminal() && io::stderr().is_terminal(),
        }
    }
}

impl Prompter for TerminalPrompter {
    fn choose_translator(&mut self, translators: &[Translator]) -> Result<Option<u32>> {
        if self.interactive {
            let labels = translators.iter().map(translator_label).collect();
            let mut picker = SingleSelect::new("Choose translator", labels);
            match terminal::run(&mut picker) {
                Ok(Some(Some(i))) => return Ok(Some(translators[i].id)),
                Ok(_) => return Ok(None),
                Err(e) => warn!(error = %e, "terminal picker failed, falling back to prompt"),
            }
        }
        let stdin = io::stdin();
        Ok(prompt_translator_lines(
            translators,
            &mut stdin.lock(),
            &mut io::stdout(),
        )?)
    }

    fn choose_episodes(&mut self, info: &SeriesInfo) -> Result<Vec<EpisodeRef>> {
        if self.interactive {
            let mut picker =
                MultiSelect::new("Choose episodes (Right to open season)", season_groups(info));
            match terminal::run(&mut picker) {
                Ok(Some(selection)) => return Ok(episodes_from_selection(info, &selection)),
                Ok(None) => return Ok(Vec::new()),
                Err(e) => warn!(error = %e, "terminal picker failed, selecting everything"),
            }
        }
        println!("No interactive selection made; defaulting to all episodes for this translator.");
        Ok(info.all_episodes())
    }
}
