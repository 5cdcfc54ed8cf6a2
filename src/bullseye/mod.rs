//! Transition of a controller from Debian stretch to Debian bullseye.
//!
//! The transition runs in two processes. The first one installs the newest
//! build of this tool published for stretch and hands off to it. The second
//! one switches the repository target, upgrades the whole system with a
//! few services kept from restarting, and cleans up afterwards.

use crate::{
    apt_wrappers::{self, apt_autoremove, apt_install, apt_mark, apt_purge, apt_update},
    misc,
    paths::Paths,
    release::{
        check,
        guard::{ConfigRollback, HeldPackages, MaskedServices, TempFiles},
        restart_tool, Context, Outcome, RelResult, ReleaseError, Request, SystemState,
        PRELIMINARY_UPDATE_NOTICE,
    },
    systemd,
};
use std::{fs, io};

pub const UPDATE_DEBIAN_RELEASE_ARG: &str = "--update-debian-release";
pub const CONFIRM_STEPS_ARG: &str = "--confirm-steps";

const NEW_DISTRIBUTION: &str = "bullseye";

const TOOL_PACKAGE: &str = "wb-update-manager";
const RELEASE_INFO_PACKAGE: &str = "wb-release-info";
const HELD_PACKAGES: &[&str] = &[TOOL_PACKAGE, RELEASE_INFO_PACKAGE];

const SSH_PACKAGE: &str = "openssh-server";
const SSH_SERVICE: &[&str] = &["ssh.service"];
const PYTHON2_SHIM: &str = "python-is-python2";
const OBSOLETE_CONFIGS: &str = "wb-configs-stretch";
const CONFIGS: &str = "wb-configs";

// kept from restarting mid-upgrade, then enabled or restarted by hand
const SERVICES_TO_MASK: &[&str] =
    &["nginx.service", "mosquitto.service", "hostapd.service", "wb-mqtt-mbgate.service"];
const SERVICES_TO_ENABLE: &[&str] =
    &["hostapd.service", "wb-configs.service", "wb-configs-early.service"];
const SERVICES_TO_RESTART: &[&str] =
    &["nginx.service", "mosquitto.service", "wb-mqtt-mbgate.service"];

/// Keeps the tool itself on its stretch build while the stretch system is updated.
pub const TOOL_PIN_PRIORITY: i32 = 800;
pub const TOOL_PIN_NEW_PRIORITY: i32 = 10;

const BULLSEYE_SOURCES: &str = "\
deb http://deb.debian.org/debian bullseye main
deb http://deb.debian.org/debian bullseye-updates main
deb http://deb.debian.org/debian bullseye-backports main
deb http://security.debian.org/debian-security bullseye-security main";

const BULLSEYE_PREFERENCES: &str = "\
Package: *
Pin: release o=Debian,n=stretch*
Pin-Priority: -1

Package: *
Pin: release o=Debian,n=bullseye*
Pin-Priority: 600";

fn tool_pin() -> String {
    fomat!(
        "Package: *" (TOOL_PACKAGE) "\n"
        "Pin: release o=wirenboard,l=*stretch*\n"
        "Pin-Priority: " (TOOL_PIN_PRIORITY) "\n"
        "\n"
        "Package: *" (TOOL_PACKAGE) "\n"
        "Pin: release o=wirenboard,l=*" (NEW_DISTRIBUTION) "*\n"
        "Pin-Priority: " (TOOL_PIN_NEW_PRIORITY)
    )
}

/// The same controller on the new distribution: `wb6/stretch` becomes `wb6/bullseye`.
pub fn new_target(state: &SystemState) -> SystemState {
    let controller = state.target.split('/').next().unwrap_or_default();
    SystemState {
        target: fomat!((controller) "/" (NEW_DISTRIBUTION)),
        ..state.clone()
    }
}

/// Runs whichever half of the transition this process is responsible for.
///
/// A failed transition leaves the progress flag set to `error`, so that the
/// system can tell the operator to run the tool again. Failed preconditions
/// leave the flag alone.
pub fn upgrade_new_debian_release(ctx: &Context, state: &SystemState, request: &Request) -> Outcome {
    match check::enough_free_space(ctx.disk, ctx.paths) {
        Ok(true) => (),
        Ok(false) => return Outcome::NoTarget,
        Err(why) => return Outcome::report(&why),
    }

    let outcome = transition(ctx, state, request).unwrap_or_else(|why| Outcome::report(&why));

    if let Some(path) = ctx.logs.file_path() {
        info!("Update log is saved in {}", path.display());
    }

    // a missing target stops the transition before it starts
    if outcome != Outcome::Ok && outcome != Outcome::NoTarget {
        info!(
            "Try running wb-release {} again to continue transition",
            UPDATE_DEBIAN_RELEASE_ARG
        );
        if let Err(why) = set_progress_flag(ctx.paths, Some("error")) {
            error!("{}", misc::format_error(&why));
        }
    }

    outcome
}

fn transition(ctx: &Context, state: &SystemState, request: &Request) -> RelResult<Outcome> {
    if !request.no_preliminary_update {
        return upgrade_and_switch_tool(ctx, request).map(Outcome::from_code);
    }

    let new_state = new_target(state);
    if !ctx.release_exists(&new_state)? {
        error!("Target state does not exist: {}", new_state);
        return Ok(Outcome::NoTarget);
    }

    install_progress_banner(ctx.paths)?;

    info!("============ Update debian release to {} ============", NEW_DISTRIBUTION);
    set_progress_flag(ctx.paths, Some("progress"))?;

    // the steps are only confirmed on request
    actual_upgrade(ctx, state, &new_state, !request.confirm_steps)?;

    info!("Done! Please reboot system");
    set_progress_flag(ctx.paths, None)?;

    Ok(Outcome::Ok)
}

fn upgrade_and_switch_tool(ctx: &Context, request: &Request) -> RelResult<i32> {
    ctx.confirm(Some(PRELIMINARY_UPDATE_NOTICE), request.assume_yes)?;

    // lets the new tool know the bootstrap already happened
    misc::touch(&ctx.paths.tool_updated_flag)?;

    {
        info!("Creating temp apt preference to keep {} from stretch", TOOL_PACKAGE);
        let _pin = TempFiles::create(&[(&ctx.paths.tool_preferences, tool_pin())])?;

        info!("Try to install new {} version", TOOL_PACKAGE);
        apt_update(ctx.runner)?;
        apt_install(ctx.runner, &[TOOL_PACKAGE], request.assume_yes)?;
    }

    restart_tool(ctx, request)
}

fn actual_upgrade(
    ctx: &Context,
    current: &SystemState,
    new_state: &SystemState,
    assume_yes: bool,
) -> RelResult<()> {
    let notice = fomat!(
        "Now the release will be switched to " (new_state.suite) ", prefix \"" (new_state.repo_prefix)
        "\", target \"" (new_state.target) "\".\n"
        "\n"
        "During update, the sources and preferences files will be changed,\n"
        "then apt-get dist-upgrade action will start.\n"
        "\n"
        "This process is potentially dangerous and may break your software.\n"
        "\n"
        "To control process on each step, use this command with " (CONFIRM_STEPS_ARG) " flag.\n"
        "\n"
        "STOP RIGHT THERE IF THIS IS A PRODUCTION SYSTEM!"
    );
    ctx.confirm(Some(&notice), assume_yes)?;

    upgrade_packages(ctx, current, new_state, assume_yes)?;

    info!("Mark {} as automatically installed to remove it in future", PYTHON2_SHIM);
    apt_mark(ctx.runner, "auto", &[PYTHON2_SHIM])?;

    info!("Purging {} to remove old sources.list", OBSOLETE_CONFIGS);
    apt_purge(ctx.runner, &[OBSOLETE_CONFIGS], assume_yes)?;
    apt_wrappers::dpkg_reconfigure(ctx.runner, CONFIGS)?;

    apt_autoremove(ctx.runner, assume_yes)?;

    apt_update(ctx.runner)?;
    apt_install(ctx.runner, &[RELEASE_INFO_PACKAGE], true)?;

    info!("Updating {} tool", TOOL_PACKAGE);
    apt_update(ctx.runner)?;
    apt_install(ctx.runner, &[TOOL_PACKAGE], assume_yes)?;

    debug!("Creating a flag for banner message to remind about reboot");
    misc::touch(&ctx.paths.reboot_flag)
}

/// The part of the upgrade that runs with the new repository configuration
/// on probation. Guards are released in reverse order of acquisition, and
/// the configuration is kept only once the packages were unheld.
fn upgrade_packages(
    ctx: &Context,
    current: &SystemState,
    new_state: &SystemState,
    assume_yes: bool,
) -> RelResult<()> {
    debug!("switching from {} to {}", current, new_state);
    let config = ConfigRollback::apply(ctx.paths, ctx.base_url, new_state)?;

    info!("Creating temp apt configs for {} transition", NEW_DISTRIBUTION);
    let _temp_configs = TempFiles::create(&[
        (&ctx.paths.bullseye_sources, BULLSEYE_SOURCES.to_owned()),
        (&ctx.paths.bullseye_preferences, BULLSEYE_PREFERENCES.to_owned()),
    ])?;

    let held = HeldPackages::hold(ctx.runner, HELD_PACKAGES)?;

    ensure_new_openssh(ctx, assume_yes)?;
    ensure_python2_deps(ctx, assume_yes)?;
    main_upgrade(ctx, assume_yes)?;

    held.release()?;
    config.commit();
    Ok(())
}

fn ensure_new_openssh(ctx: &Context, assume_yes: bool) -> RelResult<()> {
    apt_update(ctx.runner)?;

    info!("Updating {} first to make Wiren Board available during update", SSH_PACKAGE);
    let masked = MaskedServices::mask(ctx.runner, SSH_SERVICE)?;
    apt_install(ctx.runner, &[SSH_PACKAGE], assume_yes)?;
    masked.release()?;

    info!("Restarting ssh.service to maintain connectivity");
    systemd::restart(ctx.runner, SSH_SERVICE)
}

fn ensure_python2_deps(ctx: &Context, assume_yes: bool) -> RelResult<()> {
    apt_update(ctx.runner)?;

    info!("Installing {} for correct dependency resolving", PYTHON2_SHIM);
    apt_install(ctx.runner, &[PYTHON2_SHIM], assume_yes)
}

fn main_upgrade(ctx: &Context, assume_yes: bool) -> RelResult<()> {
    apt_update(ctx.runner)?;

    if !assume_yes {
        info!("Simulating upgrade");
        apt_wrappers::apt_simulate_dist_upgrade(ctx.runner)?;
        ctx.confirm(None, false)?;
    }

    let masked = MaskedServices::mask(ctx.runner, SERVICES_TO_MASK)?;

    info!("Performing actual upgrade");
    apt_wrappers::apt_dist_upgrade(ctx.runner, true)?;

    info!("Performing actual upgrade - second stage (e2fsprogs update)");
    debug!("Updating packages list, may be outdated after long update procedure");
    apt_update(ctx.runner)?;
    apt_wrappers::apt_dist_upgrade(ctx.runner, assume_yes)?;

    masked.release()?;

    systemd::enable(ctx.runner, SERVICES_TO_ENABLE)?;
    systemd::restart(ctx.runner, SERVICES_TO_RESTART)
}

/// Writes `value` to the progress flag, or removes the flag for `None`.
pub fn set_progress_flag(paths: &Paths, value: Option<&str>) -> RelResult<()> {
    let path = &paths.progress_flag;
    let result = match value {
        Some(value) => fs::write(path, value),
        None => {
            debug!("Removing system release update flag");
            match fs::remove_file(path) {
                Err(why) if why.kind() == io::ErrorKind::NotFound => Ok(()),
                other => other,
            }
        }
    };

    result.map_err(|why| ReleaseError::ProgressFlag(path.clone(), why))
}

fn install_progress_banner(paths: &Paths) -> RelResult<()> {
    info!("Copying restart-required motd message from current {} version", TOOL_PACKAGE);
    let target = paths.motd_target();
    fs::copy(&paths.motd_banner, &target)
        .map(|_| ())
        .map_err(|why| ReleaseError::Banner(target, why))
}
