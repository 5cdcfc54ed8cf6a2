use nix::sys::signal::{self, SaFlags, SigAction, SigHandler, SigSet};
use std::{
    fmt::{self, Display, Formatter},
    sync::atomic::{AtomicU8, Ordering},
};

static PENDING: AtomicU8 = AtomicU8::new(0);

#[repr(u8)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Signal {
    Interrupt = 1,
    Hangup = 2,
    Terminate = 3,
}

/// Takes the pending signal, if one arrived since the last call.
pub fn status() -> Option<Signal> { from_u8(PENDING.swap(0, Ordering::SeqCst)) }

fn from_u8(value: u8) -> Option<Signal> {
    match value {
        1 => Some(Signal::Interrupt),
        2 => Some(Signal::Hangup),
        3 => Some(Signal::Terminate),
        _ => None,
    }
}

impl Display for Signal {
    fn fmt(&self, fmt: &mut Formatter) -> fmt::Result {
        let string = match *self {
            Signal::Interrupt => "interrupt",
            Signal::Hangup => "hangup",
            Signal::Terminate => "terminate",
        };

        fmt.write_str(string)
    }
}

/// Records SIGINT, SIGHUP and SIGTERM instead of terminating the process.
///
/// The handler is installed without `SA_RESTART`, so a blocking read on the
/// terminal returns `EINTR` and the caller gets a chance to unwind its
/// cleanup guards.
pub fn init() {
    extern "C" fn handler(signal: libc::c_int) {
        let signal = match signal {
            libc::SIGINT => Signal::Interrupt,
            libc::SIGHUP => Signal::Hangup,
            libc::SIGTERM => Signal::Terminate,
            _ => return,
        };

        PENDING.store(signal as u8, Ordering::SeqCst);
    }

    let action = SigAction::new(SigHandler::Handler(handler), SaFlags::empty(), SigSet::empty());

    for &sig in &[signal::SIGHUP, signal::SIGINT, signal::SIGTERM] {
        if let Err(why) = unsafe { signal::sigaction(sig, &action) } {
            warn!("failed to install {} handler: {}", sig, why);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_stored_values() {
        assert_eq!(from_u8(0), None);
        assert_eq!(from_u8(Signal::Hangup as u8), Some(Signal::Hangup));
        assert_eq!(from_u8(Signal::Terminate as u8), Some(Signal::Terminate));
        assert_eq!(Signal::Interrupt.to_string(), "interrupt");
    }
}
