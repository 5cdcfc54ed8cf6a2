use std::path::{Path, PathBuf};

pub const RELEASE_FILE: &str = "/usr/lib/wb-release";
pub const SOURCES_LIST: &str = "/etc/apt/sources.list.d/wirenboard.list";
pub const RELEASE_PREFERENCES: &str = "/etc/apt/preferences.d/20wb-release";
pub const UPGRADE_PREFERENCES: &str = "/etc/apt/preferences.d/00wb-release-upgrade-temp";
pub const TOOL_PREFERENCES: &str = "/etc/apt/preferences.d/001wb-update-tool-stretch";
pub const BULLSEYE_SOURCES: &str = "/etc/apt/sources.list.d/000wb-bullseye-upgrade.list";
pub const BULLSEYE_PREFERENCES: &str = "/etc/apt/preferences.d/000wb-bullseye-upgrade";
pub const APT_LISTS: &str = "/var/lib/apt/lists";
pub const APT_ARCHIVES: &str = "/var/cache/apt/archives";
pub const SYSTEM_BIN: &str = "/usr/bin";
pub const PROGRESS_FLAG: &str = "/var/lib/wb-debian-release-update-in-progress";
pub const REBOOT_FLAG: &str = "/run/wb-debian-release-updated";
pub const TOOL_UPDATED_FLAG: &str = "/run/wb-release-tool-updated";
pub const MOTD_BANNER: &str = "/usr/share/wb-update-manager/99-wb-debian-release-updated";
pub const MOTD_DIR: &str = "/etc/update-motd.d";

/// Every location on the filesystem that the tool reads or writes.
///
/// `Paths::default()` points at the live system; `Paths::under` rebases
/// the same layout beneath another root directory.
#[derive(Clone, Debug, PartialEq)]
pub struct Paths {
    pub release_file:         PathBuf,
    pub sources_list:         PathBuf,
    pub release_preferences:  PathBuf,
    pub upgrade_preferences:  PathBuf,
    pub tool_preferences:     PathBuf,
    pub bullseye_sources:     PathBuf,
    pub bullseye_preferences: PathBuf,
    pub apt_lists:            PathBuf,
    pub apt_archives:         PathBuf,
    pub system_bin:           PathBuf,
    pub progress_flag:        PathBuf,
    pub reboot_flag:          PathBuf,
    pub tool_updated_flag:    PathBuf,
    pub motd_banner:          PathBuf,
    pub motd_dir:             PathBuf,
}

impl Default for Paths {
    fn default() -> Self { Self::under(Path::new("/")) }
}

impl Paths {
    pub fn under(root: &Path) -> Self {
        let rebase = |path: &str| root.join(path.trim_start_matches('/'));

        Paths {
            release_file:         rebase(RELEASE_FILE),
            sources_list:         rebase(SOURCES_LIST),
            release_preferences:  rebase(RELEASE_PREFERENCES),
            upgrade_preferences:  rebase(UPGRADE_PREFERENCES),
            tool_preferences:     rebase(TOOL_PREFERENCES),
            bullseye_sources:     rebase(BULLSEYE_SOURCES),
            bullseye_preferences: rebase(BULLSEYE_PREFERENCES),
            apt_lists:            rebase(APT_LISTS),
            apt_archives:         rebase(APT_ARCHIVES),
            system_bin:           rebase(SYSTEM_BIN),
            progress_flag:        rebase(PROGRESS_FLAG),
            reboot_flag:          rebase(REBOOT_FLAG),
            tool_updated_flag:    rebase(TOOL_UPDATED_FLAG),
            motd_banner:          rebase(MOTD_BANNER),
            motd_dir:             rebase(MOTD_DIR),
        }
    }

    /// Where the motd banner lands once installed.
    pub fn motd_target(&self) -> PathBuf {
        match self.motd_banner.file_name() {
            Some(name) => self.motd_dir.join(name),
            None => self.motd_dir.clone(),
        }
    }
}
