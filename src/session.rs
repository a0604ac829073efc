use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use reqwest::header::HeaderValue;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::api::Cookies;

/// Directory under the user's home that holds the session file.
const SESSION_DIR: &str = "rezka-downloader-cli";
const SESSION_FILE: &str = "session.json";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionData {
    /// Site root the cookies were issued for.
    pub origin: String,
    pub cookies: Cookies,
}

/// Whether `name=value` can be sent back in a `Cookie` header.
fn sendable_cookie(name: &str, value: &str) -> bool {
    !name.is_empty()
        && !name.contains(['=', ';', ' '])
        && !value.contains(';')
        && HeaderValue::from_str(&format!("{name}={value}")).is_ok()
}

pub fn default_session_path() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(SESSION_DIR)
        .join(SESSION_FILE)
}

/// Persisted login state. A session is either valid or absent: unreadable or
/// empty files load as `None`.
pub struct Session {
    path: PathBuf,
}

impl Session {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> Option<SessionData> {
        if !self.path.is_file() {
            return None;
        }
        let data = fs::read_to_string(&self.path)
            .context("Failed to read session file")
            .and_then(|contents| {
                serde_json::from_str::<SessionData>(&contents)
                    .context("Failed to parse session file")
            });
        match data {
            Ok(data) if data.cookies.is_empty() => {
                warn!(path = %self.path.display(), "session file has no cookies, ignoring");
                None
            }
            Ok(data) if !data.cookies.iter().all(|(k, v)| sendable_cookie(k, v)) => {
                warn!(path = %self.path.display(), "session file holds malformed cookies, ignoring");
                None
            }
            Ok(data) => Some(data),
            Err(e) => {
                warn!(path = %self.path.display(), error = %format!("{e:#}"), "ignoring session file");
                None
            }
        }
    }

    pub fn save(&self, data: &SessionData) -> Result<PathBuf> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create session directory {}", parent.display())
            })?;
        }
        let contents = serde_json::to_string_pretty(data)?;
        fs::write(&self.path, contents).with_context(|| {
            format!("Failed to write session file {}", self.path.display())
        })?;
        Ok(self.path.clone())
    }

    /// Removes the session file. Returns whether there was one.
    pub fn clear(&self) -> Result<bool> {
        if !self.path.exists() {
            return Ok(false);
        }
        fs::remove_file(&self.path)
            .with_context(|| format!("Failed to remove {}", self.path.display()))?;
        Ok(true)
    }
}
