pub mod check;
mod errors;
pub mod guard;
pub mod repos;
pub mod state;

pub use self::{
    check::{DiskSpace, ReleaseProbe},
    errors::{RelResult, ReleaseError, ReleaseInfoError},
    state::{ReleaseInfo, SystemState, TargetRequest},
};

use self::guard::{ConfigRollback, TempFiles};
use crate::{
    apt_wrappers,
    external::{Cmd, Runner},
    logging::LogSinks,
    misc::format_error,
    paths::Paths,
    prompt::{user_confirm, Prompt},
    systemd,
};

pub const NO_PRELIMINARY_UPDATE_ARG: &str = "--no-preliminary-update";
pub const LOG_FILENAME_ARG: &str = "--log-filename";

pub const PRELIMINARY_UPDATE_NOTICE: &str = "\
Now the system will be updated using Apt without changing the release.

It is required to get latest state possible
to make release change process more controllable.

Make sure you have all your data backed up.";

const PACKAGES_RESET_NOTICE: &str = "\
Now system packages will be reinstalled to their release versions.
Some packages may be downgraded.

This process is potentially dangerous and may break your software.

Make sure you have some time to fix system if any.";

/// Process exit status of an operation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Outcome {
    Ok,
    UserAbort,
    Fault,
    NoTarget,
    InvalidArgument,
    /// An external command failed; its exit status is passed through.
    Command(i32),
}

impl Outcome {
    pub fn code(self) -> i32 {
        match self {
            Outcome::Ok => 0,
            Outcome::UserAbort => 1,
            Outcome::Fault => 2,
            Outcome::NoTarget => 3,
            Outcome::InvalidArgument => libc::EINVAL,
            Outcome::Command(code) => code,
        }
    }

    pub fn from_code(code: i32) -> Self {
        match code {
            0 => Outcome::Ok,
            code => Outcome::Command(code),
        }
    }

    /// Logs the failure the way the operator is meant to see it, and
    /// classifies it.
    pub fn report(why: &ReleaseError) -> Self {
        match why {
            ReleaseError::UserAbort => {
                info!("Aborted by user");
                Outcome::UserAbort
            }
            ReleaseError::Interrupted => {
                info!("Interrupted by user");
                Outcome::UserAbort
            }
            ReleaseError::Command(cmd) => match cmd.exit_code() {
                Some(code) => {
                    error!("The subprocess {} has failed with status {}", cmd.command(), code);
                    Outcome::Command(code)
                }
                None => Outcome::fault(why),
            },
            ReleaseError::ImpossibleRequest(_) => {
                error!("{}", why);
                Outcome::InvalidArgument
            }
            why => Outcome::fault(why),
        }
    }

    fn fault(why: &ReleaseError) -> Self {
        error!("Something went wrong, check output and try again: {}", format_error(why));
        Outcome::Fault
    }
}

/// Everything an operation needs from the outside world.
#[derive(Clone, Copy)]
pub struct Context<'a> {
    pub paths:    &'a Paths,
    pub base_url: &'a str,
    pub runner:   &'a dyn Runner,
    pub prompt:   &'a dyn Prompt,
    pub probe:    &'a dyn ReleaseProbe,
    pub disk:     &'a dyn DiskSpace,
    pub logs:     &'a LogSinks,
}

impl<'a> Context<'a> {
    pub fn confirm(&self, text: Option<&str>, assume_yes: bool) -> RelResult<()> {
        user_confirm(self.prompt, text, assume_yes)
    }

    pub fn release_exists(&self, state: &SystemState) -> RelResult<bool> {
        check::release_exists(self.probe, state, self.base_url)
    }

    fn log_saved_notice(&self) {
        if let Some(path) = self.logs.file_path() {
            info!("Update log is saved in {}", path.display());
        }
    }
}

/// Parsed command line, independent of the argument parser.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Request {
    pub version:               bool,
    pub regenerate:            bool,
    pub target_release:        Option<String>,
    pub prefix:                Option<String>,
    pub reset_url:             bool,
    pub reset_packages:        bool,
    pub assume_yes:            bool,
    pub no_preliminary_update: bool,
    pub update_debian_release: bool,
    pub confirm_steps:         bool,
    /// The original command line, program name first.
    pub argv:                  Vec<String>,
}

impl Request {
    pub fn shows_banner(&self) -> bool { self.argv.len() <= 1 || self.version }
}

/// The human summary of the installed release.
pub fn banner(info: &ReleaseInfo, release_file: &str) -> String {
    let mut out = fomat!(
        "Wirenboard release " (info.release_name) " (as " (info.suite) "), target " (info.target) "\n"
    );

    if !info.repo_prefix.is_empty() {
        out.push_str(&fomat!(
            "This is a DEVELOPMENT release (" (info.repo_prefix) "), don't use in production!\n"
        ));
    }

    out.push_str(&fomat!("\nYou can get this info in scripts from " (release_file) "."));
    out
}

pub fn print_banner(paths: &Paths) -> Outcome {
    match state::read_release_info(&paths.release_file) {
        Ok(info) => {
            println!("{}", banner(&info, &paths.release_file.to_string_lossy()));
            Outcome::Ok
        }
        Err(why) => {
            eprintln!("wb-release: {}", format_error(&why));
            Outcome::Fault
        }
    }
}

/// Dispatches a request to the operation it names.
pub fn route(ctx: &Context, request: &Request) -> Outcome {
    let current = match state::current_state(ctx.paths) {
        Ok(current) => current,
        Err(why) => return Outcome::report(&why),
    };

    if request.regenerate {
        return match repos::generate_system_config(ctx.paths, &current, ctx.base_url) {
            Ok(()) => Outcome::Ok,
            Err(why) => Outcome::report(&why),
        };
    }

    if request.update_debian_release {
        return crate::bullseye::upgrade_new_debian_release(ctx, &current, request);
    }

    let (target, second_stage) = if request.reset_packages {
        if request.reset_url || request.prefix.is_some() || request.target_release.is_some() {
            error!("--reset-packages flag can't be used on release change, abort");
            return Outcome::InvalidArgument;
        }

        // nothing to switch, so the preliminary update is pointless
        (current.clone(), true)
    } else {
        let target_request = TargetRequest {
            reset_url:      request.reset_url,
            prefix:         request.prefix.as_deref(),
            target_release: request.target_release.as_deref(),
        };

        let target = match state::target_state(&current, &target_request) {
            Ok(target) => target,
            Err(why) => return Outcome::report(&why),
        };

        if target == current {
            info!("Target and current releases are the same, nothing to do");
            return Outcome::Ok;
        }

        (target, request.no_preliminary_update)
    };

    match ctx.release_exists(&target) {
        Ok(true) => (),
        Ok(false) => {
            error!("Target state does not exist: {}", target);
            return Outcome::NoTarget;
        }
        Err(why) => return Outcome::report(&why),
    }

    update_system(ctx, &target, &current, second_stage, request)
}

/// Moves the system from `current` to `target`, in one of two stages.
///
/// The first stage upgrades within the current release, then hands off to
/// the possibly updated tool for the second stage, which switches the
/// repository configuration and upgrades to the target.
pub fn update_system(
    ctx: &Context,
    target: &SystemState,
    current: &SystemState,
    second_stage: bool,
    request: &Request,
) -> Outcome {
    let result = if second_stage {
        update_second_stage(ctx, target, current, request.assume_yes).map(|()| Outcome::Ok)
    } else {
        update_first_stage(ctx, request).map(Outcome::from_code)
    };

    let outcome = result.unwrap_or_else(|why| Outcome::report(&why));
    ctx.log_saved_notice();
    outcome
}

fn update_first_stage(ctx: &Context, request: &Request) -> RelResult<i32> {
    ctx.confirm(Some(PRELIMINARY_UPDATE_NOTICE), request.assume_yes)?;

    info!("Performing upgrade on the current release");
    apt_wrappers::run_system_update(ctx.runner, ctx.prompt, request.assume_yes)?;

    restart_tool(ctx, request)
}

/// Replaces this process with the tool installed now, forwarding the
/// command line, so that the rest of the work is done by the newest code.
pub fn restart_tool(ctx: &Context, request: &Request) -> RelResult<i32> {
    info!("Starting (possibly updated) update utility as new process");
    let cmd = handoff_command(&request.argv, ctx.logs.file_path().and_then(|path| path.to_str()));

    // the new instance appends to the same log file
    ctx.logs.close();

    ctx.runner.handoff(&cmd).map_err(ReleaseError::Handoff)
}

pub fn handoff_command(argv: &[String], log_file: Option<&str>) -> Cmd {
    let program = argv.first().map_or("wb-release", String::as_str);
    let mut cmd = Cmd::new(program).args(argv.iter().skip(1)).arg(NO_PRELIMINARY_UPDATE_ARG);

    if let Some(log_file) = log_file {
        cmd = cmd.args(&[LOG_FILENAME_ARG, log_file]);
    }

    cmd
}

fn update_second_stage(
    ctx: &Context,
    target: &SystemState,
    current: &SystemState,
    assume_yes: bool,
) -> RelResult<()> {
    let rollback = if target != current {
        let notice = fomat!(
            "Now the release will be switched to " (target.suite) ", prefix \"" (target.repo_prefix) "\".\n"
            "\n"
            "During update, the sources and preferences files will be changed,\n"
            "then apt-get dist-upgrade action will start. Some packages may be downgraded.\n"
            "\n"
            "This process is potentially dangerous and may break your software.\n"
            "\n"
            "STOP RIGHT THERE IF THIS IS A PRODUCTION SYSTEM!"
        );
        ctx.confirm(Some(&notice), assume_yes)?;

        info!("Setting target release to {}, prefix \"{}\"", target.suite, target.repo_prefix);
        Some(ConfigRollback::apply(ctx.paths, ctx.base_url, target)?)
    } else {
        ctx.confirm(Some(PACKAGES_RESET_NOTICE), assume_yes)?;
        None
    };

    info!("Temporary setting apt preferences to force install release packages");
    let _upgrade_preferences = TempFiles::create(&[(
        &ctx.paths.upgrade_preferences,
        repos::upgrade_preferences(target),
    )])?;

    info!("Updating system");
    apt_wrappers::run_system_update(ctx.runner, ctx.prompt, assume_yes)?;

    if let Some(rollback) = rollback {
        rollback.commit();
    }

    info!("Cleaning up old packages");
    apt_wrappers::apt_autoremove(ctx.runner, true)?;

    info!("Restarting wb-rules to show actual release info in MQTT");
    if let Err(why) = systemd::invoke_rc_restart(ctx.runner, "wb-rules") {
        warn!("failed to restart wb-rules: {}", format_error(&why));
    }

    info!("Update done! Please reboot the system");
    Ok(())
}
