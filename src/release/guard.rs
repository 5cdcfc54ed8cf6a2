//! Scoped changes to the system that are undone when the scope is left,
//! however it is left.

use super::{
    errors::RelResult,
    repos::{self, Snapshot},
    state::SystemState,
};
use crate::{apt_wrappers::apt_mark, external::Runner, paths::Paths, systemd};
use std::path::PathBuf;

/// The sources list and release preferences switched to a new state.
///
/// Unless [`ConfigRollback::commit`] is called, dropping the guard puts the
/// previous files back byte for byte and purges the package lists that were
/// fetched for the new state.
pub struct ConfigRollback<'a> {
    paths:    &'a Paths,
    snapshot: Snapshot,
    armed:    bool,
}

impl<'a> ConfigRollback<'a> {
    pub fn apply(paths: &'a Paths, base_url: &str, target: &SystemState) -> RelResult<Self> {
        let snapshot = Snapshot::take(&[&paths.sources_list, &paths.release_preferences])?;
        let guard = ConfigRollback { paths, snapshot, armed: true };
        repos::generate_system_config(paths, target, base_url)?;
        Ok(guard)
    }

    pub fn commit(mut self) {
        debug!("new system config has done well, keeping it along with apt cache");
        self.armed = false;
    }
}

impl<'a> Drop for ConfigRollback<'a> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }

        info!("Restoring original system state");
        if let Err(why) = self.snapshot.restore() {
            error!("{}", crate::misc::format_error(&why));
        }

        info!("Cleaning up apt cache (to make manual apt calls safe from now)");
        if let Err(why) = repos::purge_package_lists(&self.paths.apt_lists) {
            error!("{}", crate::misc::format_error(&why));
        }
    }
}

/// Files that exist only for the lifetime of the guard.
#[derive(Debug, Default)]
pub struct TempFiles {
    files: Vec<PathBuf>,
}

impl TempFiles {
    pub fn create(entries: &[(&PathBuf, String)]) -> RelResult<Self> {
        let mut guard = TempFiles::default();
        for (path, contents) in entries {
            info!("Creating temporary {}", path.display());
            guard.files.push((*path).clone());
            repos::write_config(path, contents)?;
        }

        Ok(guard)
    }
}

impl Drop for TempFiles {
    fn drop(&mut self) {
        for path in self.files.iter().rev() {
            info!("Removing temporary {}", path.display());
            if let Err(why) = repos::remove_config(path) {
                error!("{}", crate::misc::format_error(&why));
            }
        }
    }
}

/// Packages that apt must not touch while the guard is alive.
///
/// [`HeldPackages::release`] unholds them and reports a failure. Dropping an
/// unreleased guard unholds them too, but only logs what went wrong.
pub struct HeldPackages<'a> {
    runner:   &'a dyn Runner,
    packages: &'a [&'a str],
    held:     bool,
}

impl<'a> HeldPackages<'a> {
    /// Even when holding fails part way, the packages get unheld on drop.
    pub fn hold(runner: &'a dyn Runner, packages: &'a [&'a str]) -> RelResult<Self> {
        let guard = HeldPackages { runner, packages, held: true };
        info!("Setting packages {:?} on hold", packages);
        apt_mark(runner, "hold", packages)?;
        Ok(guard)
    }

    pub fn release(mut self) -> RelResult<()> {
        self.held = false;
        unhold(self.runner, self.packages)
    }
}

fn unhold(runner: &dyn Runner, packages: &[&str]) -> RelResult<()> {
    info!("Unholding packages {:?}", packages);
    apt_mark(runner, "unhold", packages)
}

impl<'a> Drop for HeldPackages<'a> {
    fn drop(&mut self) {
        if self.held {
            if let Err(why) = unhold(self.runner, self.packages) {
                error!("{}", crate::misc::format_error(&why));
            }
        }
    }
}

/// Services that can't be started while the guard is alive.
///
/// Released the same way as [`HeldPackages`].
pub struct MaskedServices<'a> {
    runner:   &'a dyn Runner,
    services: &'a [&'a str],
    masked:   bool,
}

impl<'a> MaskedServices<'a> {
    /// Even when masking fails part way, every service gets unmasked on drop.
    pub fn mask(runner: &'a dyn Runner, services: &'a [&'a str]) -> RelResult<Self> {
        let guard = MaskedServices { runner, services, masked: true };
        info!("Masking services {:?}", services);
        systemd::mask(runner, services)?;
        Ok(guard)
    }

    /// Unmasks every service, then returns the first failure.
    pub fn release(mut self) -> RelResult<()> {
        self.masked = false;
        unmask(self.runner, self.services)
    }
}

fn unmask(runner: &dyn Runner, services: &[&str]) -> RelResult<()> {
    info!("Unmasking services {:?}", services);
    let mut first = None;
    for &service in services {
        if let Err(why) = systemd::unmask(runner, &[service]) {
            match first {
                None => first = Some(why),
                Some(_) => error!("{}", crate::misc::format_error(&why)),
            }
        }
    }

    first.map_or(Ok(()), Err)
}

impl<'a> Drop for MaskedServices<'a> {
    fn drop(&mut self) {
        if self.masked {
            if let Err(why) = unmask(self.runner, self.services) {
                error!("{}", crate::misc::format_error(&why));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        release::{repos::DEFAULT_REPO_URL, ReleaseError},
        testing::{FakeRunner, Failure, Fixture},
    };
    use std::fs;

    #[test]
    fn rollback_restores_unless_committed() {
        let fixture = Fixture::new();
        let paths = &fixture.paths;
        let original = fs::read(&paths.sources_list).unwrap();
        let target = SystemState::new("testing", "wb6/stretch", "");

        {
            let _guard = ConfigRollback::apply(paths, DEFAULT_REPO_URL, &target).unwrap();
            assert_ne!(fs::read(&paths.sources_list).unwrap(), original);
        }

        assert_eq!(fs::read(&paths.sources_list).unwrap(), original);
        assert!(!paths.release_preferences.exists());
        assert!(!paths.apt_lists.exists());

        fs::create_dir_all(&paths.apt_lists).unwrap();
        ConfigRollback::apply(paths, DEFAULT_REPO_URL, &target).unwrap().commit();
        assert_eq!(
            fs::read_to_string(&paths.sources_list).unwrap(),
            repos::sources_list(&target, DEFAULT_REPO_URL)
        );
        assert!(paths.apt_lists.exists());
    }

    #[test]
    fn temp_files_removed_on_error() {
        let fixture = Fixture::new();
        let paths = &fixture.paths;

        let result = (|| -> RelResult<()> {
            let _temp = TempFiles::create(&[
                (&paths.bullseye_sources, "deb http://deb.debian.org/debian bullseye main".into()),
                (&paths.bullseye_preferences, "Package: *".into()),
            ])?;
            assert!(paths.bullseye_sources.exists());
            Err(ReleaseError::UserAbort)
        })();

        assert!(result.is_err());
        assert!(!paths.bullseye_sources.exists());
        assert!(!paths.bullseye_preferences.exists());
    }

    #[test]
    fn held_packages_unheld_when_hold_fails() {
        let runner = FakeRunner::failing_at(0, Failure::Exit(100));
        assert!(HeldPackages::hold(&runner, &["wb-update-manager", "wb-release-info"]).is_err());
        assert_eq!(
            runner.calls(),
            vec![
                "apt-mark hold wb-update-manager wb-release-info",
                "apt-mark unhold wb-update-manager wb-release-info",
            ]
        );
    }

    #[test]
    fn every_service_unmasked_even_if_one_fails() {
        // mask a, mask b, then unmask a fails
        let runner = FakeRunner::failing_at(2, Failure::Exit(1));
        drop(MaskedServices::mask(&runner, &["a.service", "b.service"]).unwrap());
        assert_eq!(
            runner.calls(),
            vec![
                "systemctl mask a.service",
                "systemctl mask b.service",
                "systemctl unmask a.service",
                "systemctl unmask b.service",
            ]
        );
    }

    #[test]
    fn released_packages_are_unheld_once() {
        let runner = FakeRunner::default();
        HeldPackages::hold(&runner, &["wb-update-manager"]).unwrap().release().unwrap();
        assert_eq!(runner.count("apt-mark unhold"), 1);
    }

    #[test]
    fn unhold_failure_is_reported() {
        let runner = FakeRunner::failing_at(1, Failure::Exit(100));
        let held = HeldPackages::hold(&runner, &["wb-update-manager"]).unwrap();
        assert!(matches!(held.release(), Err(ReleaseError::Command(_))));
        assert_eq!(runner.count("apt-mark unhold"), 1);
    }

    #[test]
    fn release_unmasks_all_and_reports_failure() {
        // mask a, mask b, mask c, then unmask a fails
        let runner = FakeRunner::failing_at(3, Failure::Exit(1));
        let masked = MaskedServices::mask(&runner, &["a.service", "b.service", "c.service"]).unwrap();

        match masked.release() {
            Err(ReleaseError::Command(why)) => assert!(why.to_string().contains("a.service")),
            other => panic!("unexpected result: {:?}", other),
        }
        assert_eq!(
            &runner.calls()[3..],
            &["systemctl unmask a.service", "systemctl unmask b.service", "systemctl unmask c.service"]
        );
    }
}
