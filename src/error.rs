use thiserror::Error;

use crate::api::ApiError;

/// Outcomes that end a run with a specific exit status.
#[derive(Debug, Error)]
pub enum CliError {
    #[error("No login provided. Aborting.")]
    NoLogin,
    #[error("Login failed")]
    LoginFailed(#[source] ApiError),
    #[error("Could not obtain session cookies after login. Stored session not created.")]
    NoSessionCookies,
    #[error("Failed to save session")]
    SaveSession(#[source] Box<dyn std::error::Error + Send + Sync>),
    #[error("Could not load the title page")]
    Title(#[source] ApiError),
    #[error("No translators found for this title.")]
    NoTranslators,
    #[error("Translator {0} is not offered for this title.")]
    UnknownTranslator(u32),
    #[error("No translator chosen. Exiting.")]
    NoTranslatorChosen,
    #[error("Could not load episodes for the chosen translator")]
    SeriesInfo(#[source] ApiError),
    #[error("Chosen translator has no episodes for this title.")]
    NoEpisodesAvailable,
    #[error("No episodes chosen. Exiting.")]
    NoEpisodesChosen,
    #[error("Failed to get stream for movie")]
    MovieStream(#[source] ApiError),
    #[error("Unsupported content type: {0}")]
    UnsupportedContent(String),
    #[error("Download interrupted.")]
    Interrupted,
    #[error("{0} download(s) failed")]
    DownloadsFailed(usize),
}

impl CliError {
    pub fn exit_code(&self) -> i32 {
        match self {
            CliError::LoginFailed(_) => 2,
            CliError::NoSessionCookies => 3,
            CliError::SaveSession(_) => 4,
            _ => 1,
        }
    }
}

/// Exit status for an error chain: the code of the first [`CliError`] found,
/// 1 otherwise.
pub fn exit_code(err: &anyhow::Error) -> i32 {
    err.chain()
        .find_map(|cause| cause.downcast_ref::<CliError>())
        .map(CliError::exit_code)
        .unwrap_or(1)
}
