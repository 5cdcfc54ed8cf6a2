use crate::{
    external::{Cmd, Runner},
    prompt::{user_confirm, Prompt},
    release::{RelResult, ReleaseError},
};

/// `apt-get -q <subcommand> <extra>` with the non-interactive dpkg options.
///
/// `--yes` is only added with `assume_yes`; otherwise apt asks its own
/// questions and a negative answer makes it exit with status 1.
pub fn apt_get(subcommand: &str, extra: &[&str], assume_yes: bool) -> Cmd {
    let cmd = Cmd::new("apt-get")
        .channel(&["apt.", subcommand].concat())
        .env("DEBIAN_FRONTEND", "noninteractive")
        .args(&["-q", subcommand])
        .args(extra)
        .args(&[
            "-o",
            "Dpkg::Options::=--force-confdef",
            "-o",
            "Dpkg::Options::=--force-confold",
            "--allow-downgrades",
        ]);

    if assume_yes {
        cmd.arg("--yes")
    } else {
        cmd
    }
}

/// Runs an apt-get command. Exit status 1 is apt's "user said no".
pub fn run_apt(
    runner: &dyn Runner,
    subcommand: &str,
    extra: &[&str],
    assume_yes: bool,
) -> RelResult<()> {
    runner.run(&apt_get(subcommand, extra, assume_yes)).map_err(|why| match why.exit_code() {
        Some(1) => ReleaseError::UserAbort,
        _ => why.into(),
    })
}

/// apt-get update
pub fn apt_update(runner: &dyn Runner) -> RelResult<()> { run_apt(runner, "update", &[], false) }

/// apt-get install
pub fn apt_install(runner: &dyn Runner, packages: &[&str], assume_yes: bool) -> RelResult<()> {
    run_apt(runner, "install", packages, assume_yes)
}

/// apt-get purge
pub fn apt_purge(runner: &dyn Runner, packages: &[&str], assume_yes: bool) -> RelResult<()> {
    run_apt(runner, "purge", packages, assume_yes)
}

/// apt-get dist-upgrade
pub fn apt_dist_upgrade(runner: &dyn Runner, assume_yes: bool) -> RelResult<()> {
    run_apt(runner, "dist-upgrade", &[], assume_yes)
}

/// apt-get dist-upgrade -s -V
pub fn apt_simulate_dist_upgrade(runner: &dyn Runner) -> RelResult<()> {
    run_apt(runner, "dist-upgrade", &["-s", "-V"], false)
}

/// apt-get autoremove
pub fn apt_autoremove(runner: &dyn Runner, assume_yes: bool) -> RelResult<()> {
    run_apt(runner, "autoremove", &[], assume_yes)
}

/// apt-mark hold|unhold|auto
pub fn apt_mark(runner: &dyn Runner, action: &str, packages: &[&str]) -> RelResult<()> {
    let cmd = Cmd::new("apt-mark").arg(action).args(packages);
    runner.run(&cmd).map_err(ReleaseError::from)
}

/// dpkg-reconfigure
pub fn dpkg_reconfigure(runner: &dyn Runner, package: &str) -> RelResult<()> {
    let cmd = Cmd::new("dpkg-reconfigure")
        .env("DEBIAN_FRONTEND", "noninteractive")
        .arg(package);
    runner.run(&cmd).map_err(ReleaseError::from)
}

/// Refreshes the package lists and upgrades everything within the
/// configured suites. Without `assume_yes` the upgrade is simulated first
/// and the user has to confirm the result.
pub fn run_system_update(
    runner: &dyn Runner,
    prompt: &dyn Prompt,
    assume_yes: bool,
) -> RelResult<()> {
    run_apt(runner, "update", &[], assume_yes)?;

    if !assume_yes {
        info!("Simulating upgrade");
        apt_simulate_dist_upgrade(runner)?;
        user_confirm(prompt, None, false)?;
    }

    info!("Performing actual upgrade");
    apt_dist_upgrade(runner, true)
}
