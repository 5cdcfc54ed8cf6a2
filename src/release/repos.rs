use super::{
    errors::{RelResult, ReleaseError},
    state::SystemState,
};
use crate::paths::Paths;
use std::{
    fs, io,
    path::{Path, PathBuf},
};

pub const ORIGIN: &str = "wirenboard";
pub const DEFAULT_REPO_URL: &str = "http://deb.wirenboard.com/";

const GENERATED_HEADER: &str = "\
# This file is automatically generated by wb-release.
# DO NOT EDIT THIS FILE!
";

const SWITCH_HINT: &str = "\
#
# If you want to switch to testing, use command
#   wb-release -t testing
";

pub fn sources_list(state: &SystemState, base_url: &str) -> String {
    fomat!(
        (GENERATED_HEADER) (SWITCH_HINT)
        "deb " (state.repo_url(base_url)) " " (state.suite) " main\n"
    )
}

pub fn release_preferences(state: &SystemState) -> String {
    fomat!(
        (GENERATED_HEADER) (SWITCH_HINT)
        "Package: *\n"
        "Pin: release o=" (ORIGIN) ", a=" (state.suite) "\n"
        "Pin-Priority: 990"
    )
}

/// Preferences that force every package to its version from the target
/// suite and push other suites of the same origin below installed versions.
pub fn upgrade_preferences(state: &SystemState) -> String {
    fomat!(
        (GENERATED_HEADER)
        "Package: *\n"
        "Pin: release o=" (ORIGIN) ", a=" (state.suite) "\n"
        "Pin-Priority: 1010\n"
        "\n"
        "Package: *\n"
        "Pin: release o=" (ORIGIN) "\n"
        "Pin-Priority: -10"
    )
}

pub fn write_config(path: &Path, contents: &str) -> RelResult<()> {
    debug!("Writing {}", path.display());
    fs::write(path, contents).map_err(|why| ReleaseError::ConfigWrite(path.to_owned(), why))
}

pub fn remove_config(path: &Path) -> RelResult<()> {
    match fs::remove_file(path) {
        Err(why) if why.kind() != io::ErrorKind::NotFound => {
            Err(ReleaseError::ConfigRemove(path.to_owned(), why))
        }
        _ => Ok(()),
    }
}

/// Writes the sources list and release preferences for `state`.
pub fn generate_system_config(paths: &Paths, state: &SystemState, base_url: &str) -> RelResult<()> {
    info!("Generating {} for {}", paths.sources_list.display(), state);
    write_config(&paths.sources_list, &sources_list(state, base_url))?;

    info!("Generating {} for {}", paths.release_preferences.display(), state);
    write_config(&paths.release_preferences, &release_preferences(state))
}

/// Drops the apt package index cache. apt recreates it on the next update.
pub fn purge_package_lists(dir: &Path) -> RelResult<()> {
    info!("Cleaning apt cache in {}", dir.display());
    match fs::remove_dir_all(dir) {
        Err(why) if why.kind() != io::ErrorKind::NotFound => {
            Err(ReleaseError::ConfigRemove(dir.to_owned(), why))
        }
        _ => Ok(()),
    }
}

/// Exact contents of a set of files, including which of them were absent.
#[derive(Debug)]
pub struct Snapshot {
    files: Vec<(PathBuf, Option<Vec<u8>>)>,
}

impl Snapshot {
    pub fn take(paths: &[&Path]) -> RelResult<Self> {
        let mut files = Vec::with_capacity(paths.len());
        for &path in paths {
            let contents = match fs::read(path) {
                Ok(contents) => Some(contents),
                Err(why) if why.kind() == io::ErrorKind::NotFound => None,
                Err(why) => return Err(ReleaseError::Snapshot(path.to_owned(), why)),
            };

            files.push((path.to_owned(), contents));
        }

        Ok(Snapshot { files })
    }

    /// Puts every file back the way it was. All files are attempted; the
    /// first error is returned.
    pub fn restore(&self) -> RelResult<()> {
        let mut result = Ok(());
        for (path, contents) in &self.files {
            let outcome = match contents {
                Some(contents) => fs::write(path, contents),
                None => match fs::remove_file(path) {
                    Err(why) if why.kind() == io::ErrorKind::NotFound => Ok(()),
                    other => other,
                },
            };

            if let Err(why) = outcome {
                error!("failed to restore {}: {}", path.display(), why);
                if result.is_ok() {
                    result = Err(ReleaseError::Restore(path.clone(), why));
                }
            }
        }

        result
    }
}
