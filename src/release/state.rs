use super::errors::{RelResult, ReleaseError, ReleaseInfoError};
use crate::paths::Paths;
use std::{
    fmt::{self, Display, Formatter},
    fs,
    path::Path,
    str::FromStr,
};

const URL_SEPARATORS: &[char] = &[' ', '/'];

/// Identification of the installed firmware, as read from `/usr/lib/wb-release`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ReleaseInfo {
    pub release_name: String,
    pub suite:        String,
    pub target:       String,
    pub repo_prefix:  String,
}

impl FromStr for ReleaseInfo {
    type Err = ReleaseInfoError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let (mut release_name, mut suite, mut target, mut repo_prefix) = (None, None, None, None);

        for (no, line) in input.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let (key, value) = line
                .split_once('=')
                .ok_or_else(|| ReleaseInfoError::Malformed(no + 1, line.to_owned()))?;

            let value = Some(unquote(value.trim()).to_owned());
            match key.trim().to_lowercase().as_str() {
                "release_name" => release_name = value,
                "suite" => suite = value,
                "target" => target = value,
                "repo_prefix" => repo_prefix = value,
                other => debug!("ignoring unknown release info key `{}`", other),
            }
        }

        Ok(ReleaseInfo {
            release_name: release_name.ok_or(ReleaseInfoError::MissingKey("release_name"))?,
            suite:        suite.ok_or(ReleaseInfoError::MissingKey("suite"))?,
            target:       target.ok_or(ReleaseInfoError::MissingKey("target"))?,
            repo_prefix:  repo_prefix.ok_or(ReleaseInfoError::MissingKey("repo_prefix"))?,
        })
    }
}

fn unquote(value: &str) -> &str {
    for quote in &['"', '\''] {
        if value.len() >= 2 && value.starts_with(*quote) && value.ends_with(*quote) {
            return &value[1..value.len() - 1];
        }
    }

    value
}

pub fn read_release_info(path: &Path) -> RelResult<ReleaseInfo> {
    fs::read_to_string(path)
        .map_err(ReleaseInfoError::Read)
        .and_then(|contents| contents.parse::<ReleaseInfo>())
        .map_err(|why| ReleaseError::ReleaseInfo(path.to_owned(), why))
}

/// The repository configuration of the controller: which suite of which
/// repository target it follows.
///
/// `consistent` is false when the suite found in the generated sources list
/// differs from the release file, or the sources list can't be read. Two
/// states compare equal only if all four fields match.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SystemState {
    pub suite:       String,
    pub target:      String,
    pub repo_prefix: String,
    pub consistent:  bool,
}

impl SystemState {
    pub fn new(suite: &str, target: &str, repo_prefix: &str) -> Self {
        SystemState {
            suite:       suite.to_owned(),
            target:      target.to_owned(),
            repo_prefix: trim_prefix(repo_prefix).to_owned(),
            consistent:  true,
        }
    }

    /// Full URL of the repository this state points at.
    pub fn repo_url(&self, base_url: &str) -> String {
        let prefix = ["/", &self.repo_prefix].concat();
        fomat!(
            (base_url.trim_matches(URL_SEPARATORS))
            (prefix.trim_end_matches(URL_SEPARATORS))
            "/" (self.target)
        )
    }
}

impl Display for SystemState {
    fn fmt(&self, fmt: &mut Formatter) -> fmt::Result {
        write!(
            fmt,
            "suite {}, target {}, repo prefix \"{}\"",
            self.suite, self.target, self.repo_prefix
        )
    }
}

fn trim_prefix(prefix: &str) -> &str { prefix.trim_matches(URL_SEPARATORS) }

/// Suite of the first `deb http...` line of a sources list.
pub fn sources_list_suite(path: &Path) -> Option<String> {
    let contents = fs::read_to_string(path).ok()?;

    contents.lines().find_map(|line| {
        let line = line.split('#').next().unwrap_or_default().trim_end();
        if line.starts_with("deb http") {
            line.split_whitespace().nth(2).map(String::from)
        } else {
            None
        }
    })
}

/// Reads the current state from the release file and the generated sources list.
pub fn current_state(paths: &Paths) -> RelResult<SystemState> {
    let info = read_release_info(&paths.release_file)?;
    let mut state = SystemState::new(&info.suite, &info.target, &info.repo_prefix);

    match sources_list_suite(&paths.sources_list) {
        Some(suite) if suite == info.suite => (),
        Some(suite) => {
            warn!(
                "Suite in {} is \"{}\", release file says \"{}\"",
                paths.sources_list.display(),
                suite,
                info.suite
            );
            state.consistent = false;
        }
        None => {
            warn!("No suite found in {}", paths.sources_list.display());
            state.consistent = false;
        }
    }

    Ok(state)
}

/// How the user asked to change the current state.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TargetRequest<'a> {
    pub reset_url:      bool,
    pub prefix:         Option<&'a str>,
    pub target_release: Option<&'a str>,
}

/// Derives the state the user asked for from the current one.
pub fn target_state(current: &SystemState, request: &TargetRequest) -> RelResult<SystemState> {
    // empty values count as not given
    let prefix = request.prefix.filter(|prefix| !prefix.is_empty());
    let suite = request.target_release.filter(|suite| !suite.is_empty());

    if request.reset_url && prefix.is_some() {
        return Err(ReleaseError::ImpossibleRequest("--reset-url can't be used together with --prefix"));
    }

    let suite = suite.unwrap_or(&current.suite);
    let prefix = if request.reset_url { "" } else { prefix.unwrap_or(&current.repo_prefix) };

    Ok(SystemState::new(suite, &current.target, prefix))
}
