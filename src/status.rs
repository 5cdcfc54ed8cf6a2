use crate::external::{Cmd, CommandError};
use std::process::ExitStatus;

pub trait StatusExt {
    fn as_result(self, cmd: &Cmd) -> Result<(), CommandError>;
}

impl StatusExt for ExitStatus {
    fn as_result(self, cmd: &Cmd) -> Result<(), CommandError> {
        if self.success() {
            Ok(())
        } else if let Some(code) = self.code() {
            Err(CommandError::Failed { cmd: cmd.to_string(), code })
        } else {
            Err(CommandError::Signaled { cmd: cmd.to_string() })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::process::ExitStatusExt;

    #[test]
    fn exit_codes() {
        let cmd = Cmd::new("apt-get").arg("update");

        assert!(ExitStatus::from_raw(0).as_result(&cmd).is_ok());

        match ExitStatus::from_raw(100 << 8).as_result(&cmd) {
            Err(CommandError::Failed { cmd, code }) => {
                assert_eq!(cmd, "apt-get update");
                assert_eq!(code, 100);
            }
            other => panic!("unexpected result: {:?}", other),
        }

        // SIGKILL
        assert!(matches!(
            ExitStatus::from_raw(9).as_result(&cmd),
            Err(CommandError::Signaled { .. })
        ));
    }
}
