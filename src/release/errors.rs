use crate::external::CommandError;
use isahc::http::StatusCode;
use std::{io, path::PathBuf};
use thiserror::Error;

pub type RelResult<T> = Result<T, ReleaseError>;

#[derive(Debug, Error)]
pub enum ReleaseError {
    #[error("aborted by user")]
    UserAbort,

    #[error("interrupted by user")]
    Interrupted,

    #[error("external command failed")]
    Command(#[source] CommandError),

    #[error("failed to start the updated tool")]
    Handoff(#[source] CommandError),

    #[error("{}", _0)]
    ImpossibleRequest(&'static str),

    #[error("failed to read release info from {:?}", _0)]
    ReleaseInfo(PathBuf, #[source] ReleaseInfoError),

    #[error("failed to write {:?}", _0)]
    ConfigWrite(PathBuf, #[source] io::Error),

    #[error("failed to remove {:?}", _0)]
    ConfigRemove(PathBuf, #[source] io::Error),

    #[error("failed to save the current contents of {:?}", _0)]
    Snapshot(PathBuf, #[source] io::Error),

    #[error("failed to restore {:?}", _0)]
    Restore(PathBuf, #[source] io::Error),

    #[error("failed to create HTTP client")]
    HttpClient(#[source] isahc::Error),

    #[error("failed to access {}", _0)]
    Probe(String, #[source] isahc::Error),

    #[error("{} responded with unexpected status {}", _0, _1)]
    ProbeStatus(String, StatusCode),

    #[error("failed to check free space on {:?}", _0)]
    FreeSpace(PathBuf, #[source] nix::Error),

    #[error("failed to read answer from the terminal")]
    Prompt(#[source] io::Error),

    #[error("failed to create flag file {:?}", _0)]
    Flag(PathBuf, #[source] io::Error),

    #[error("failed to update progress flag at {:?}", _0)]
    ProgressFlag(PathBuf, #[source] io::Error),

    #[error("failed to install motd banner to {:?}", _0)]
    Banner(PathBuf, #[source] io::Error),
}

impl From<CommandError> for ReleaseError {
    fn from(why: CommandError) -> Self {
        match why {
            CommandError::Interrupted { .. } => ReleaseError::Interrupted,
            why => ReleaseError::Command(why),
        }
    }
}

#[derive(Debug, Error)]
pub enum ReleaseInfoError {
    #[error("unable to read file")]
    Read(#[source] io::Error),

    #[error("line {} is not a `key=value` pair: {:?}", _0, _1)]
    Malformed(usize, String),

    #[error("required key `{}` is missing", _0)]
    MissingKey(&'static str),
}
