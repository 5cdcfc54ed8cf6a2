use crate::{
    external::{Cmd, Runner},
    release::{RelResult, ReleaseError},
};

fn systemctl(runner: &dyn Runner, action: &str, services: &[&str]) -> RelResult<()> {
    for &service in services {
        runner
            .run(&Cmd::new("systemctl").args(&[action, service]))
            .map_err(ReleaseError::from)?;
    }

    Ok(())
}

pub fn mask(runner: &dyn Runner, services: &[&str]) -> RelResult<()> {
    systemctl(runner, "mask", services)
}

pub fn unmask(runner: &dyn Runner, services: &[&str]) -> RelResult<()> {
    systemctl(runner, "unmask", services)
}

pub fn enable(runner: &dyn Runner, services: &[&str]) -> RelResult<()> {
    systemctl(runner, "enable", services)
}

pub fn restart(runner: &dyn Runner, services: &[&str]) -> RelResult<()> {
    systemctl(runner, "restart", services)
}

/// Restart a SysV-style service through `invoke-rc.d`, honoring policy-rc.d.
pub fn invoke_rc_restart(runner: &dyn Runner, service: &str) -> RelResult<()> {
    runner
        .run(&Cmd::new("invoke-rc.d").args(&[service, "restart"]))
        .map_err(ReleaseError::from)
}
