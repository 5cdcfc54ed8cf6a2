#![deny(clippy::all)]

#[macro_use]
extern crate cascade;

#[macro_use]
extern crate fomat_macros;

#[macro_use]
extern crate log;

/// Thin wrappers around apt-get, apt-mark and dpkg-reconfigure
pub mod apt_wrappers;

/// Transition of the controller from Debian stretch to bullseye
pub mod bullseye;

/// Running external programs and logging their output
pub mod external;

/// Console, file and journal logging
pub mod logging;

/// Miscellaneous functions used throughout the library.
pub mod misc;

/// Locations of the files the tool reads and writes
pub mod paths;

/// Questions asked of the operator
pub mod prompt;

/// Switching between Wiren Board releases
pub mod release;

/// Signal-handling capabilities for the tool.
pub mod sighandler;

mod status;

/// Helpers for systemctl and invoke-rc.d
pub mod systemd;

#[cfg(test)]
mod testing;

pub const LOG_TARGET: &str = "wb_update_manager";
