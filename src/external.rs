use crate::{sighandler, status::StatusExt, LOG_TARGET};
use std::{
    fmt::{self, Display, Formatter},
    io::{self, BufRead, BufReader, Read},
    process::{Command, Stdio},
    thread,
};
use thiserror::Error;

/// A command line to be executed by a [`Runner`].
///
/// Output of the command is logged under the `wb_update_manager::<channel>`
/// target, which defaults to the program name.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Cmd {
    program: String,
    args:    Vec<String>,
    env:     Vec<(String, String)>,
    channel: String,
}

impl Cmd {
    pub fn new(program: &str) -> Self {
        Cmd {
            program: program.to_owned(),
            args:    Vec::new(),
            env:     Vec::new(),
            channel: program.to_owned(),
        }
    }

    pub fn arg<S: AsRef<str>>(mut self, arg: S) -> Self {
        self.args.push(arg.as_ref().to_owned());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.args.extend(args.into_iter().map(|arg| arg.as_ref().to_owned()));
        self
    }

    pub fn env(mut self, key: &str, value: &str) -> Self {
        self.env.push((key.to_owned(), value.to_owned()));
        self
    }

    pub fn channel(mut self, channel: &str) -> Self {
        self.channel = channel.to_owned();
        self
    }

    pub fn program(&self) -> &str { &self.program }

    pub fn arguments(&self) -> &[String] { &self.args }

    pub fn environment(&self) -> &[(String, String)] { &self.env }

    pub fn log_target(&self) -> String { [LOG_TARGET, "::", &self.channel].concat() }
}

impl Display for Cmd {
    fn fmt(&self, fmt: &mut Formatter) -> fmt::Result {
        fmt.write_str(&self.program)?;
        for arg in &self.args {
            fmt.write_str(" ")?;
            fmt.write_str(arg)?;
        }

        Ok(())
    }
}

#[derive(Debug, Error)]
pub enum CommandError {
    #[error("failed to spawn `{}`", cmd)]
    Spawn {
        cmd:    String,
        #[source]
        source: io::Error,
    },

    #[error("`{}` failed with exit status {}", cmd, code)]
    Failed { cmd: String, code: i32 },

    #[error("`{}` was terminated by a signal", cmd)]
    Signaled { cmd: String },

    #[error("`{}` was interrupted", cmd)]
    Interrupted { cmd: String },

    #[error("failed to replace the running process with `{}`", cmd)]
    Exec {
        cmd:    String,
        #[source]
        source: exec::Error,
    },
}

impl CommandError {
    /// The exit status of the failed command, when it exited on its own.
    pub fn exit_code(&self) -> Option<i32> {
        match *self {
            CommandError::Failed { code, .. } => Some(code),
            _ => None,
        }
    }

    pub fn command(&self) -> &str {
        match self {
            CommandError::Spawn { cmd, .. }
            | CommandError::Failed { cmd, .. }
            | CommandError::Signaled { cmd }
            | CommandError::Interrupted { cmd }
            | CommandError::Exec { cmd, .. } => cmd,
        }
    }
}

/// Executes external programs on behalf of the release logic.
pub trait Runner {
    /// Run the command to completion, logging its output line by line.
    fn run(&self, cmd: &Cmd) -> Result<(), CommandError>;

    /// Replace the current process image with `cmd`.
    ///
    /// On a real system this never returns on success. Test doubles return
    /// the exit status the replacement process would have produced.
    fn handoff(&self, cmd: &Cmd) -> Result<i32, CommandError>;
}

/// Runs commands on the host system.
#[derive(Clone, Copy, Debug, Default)]
pub struct HostRunner;

impl Runner for HostRunner {
    fn run(&self, cmd: &Cmd) -> Result<(), CommandError> {
        debug!("Starting cmd: \"{}\"", cmd);
        if !cmd.environment().is_empty() {
            debug!("Environment overrides: {:?}", cmd.environment());
        }

        let mut command = cascade! {
            Command::new(cmd.program());
            ..args(cmd.arguments());
            ..envs(cmd.environment().iter().map(|(k, v)| (k, v)));
            ..stdin(Stdio::null());
            ..stdout(Stdio::piped());
            ..stderr(Stdio::piped());
        };

        let mut child = command
            .spawn()
            .map_err(|source| CommandError::Spawn { cmd: cmd.to_string(), source })?;

        let target = cmd.log_target();
        let stdout = child.stdout.take();
        let stderr = child.stderr.take();

        thread::scope(|scope| {
            if let Some(stderr) = stderr {
                let target = target.as_str();
                scope.spawn(move || log_lines(target, stderr));
            }

            if let Some(stdout) = stdout {
                log_lines(&target, stdout);
            }
        });

        let status = child
            .wait()
            .map_err(|source| CommandError::Spawn { cmd: cmd.to_string(), source })?;

        if let Some(signal) = sighandler::status() {
            warn!("caught {} signal while running \"{}\"", signal, cmd);
            return Err(CommandError::Interrupted { cmd: cmd.to_string() });
        }

        status.as_result(cmd)
    }

    fn handoff(&self, cmd: &Cmd) -> Result<i32, CommandError> {
        debug!("Replacing process with: \"{}\"", cmd);

        let source = cascade! {
            exec::Command::new(cmd.program());
            ..args(cmd.arguments());
        }
        .exec();

        Err(CommandError::Exec { cmd: cmd.to_string(), source })
    }
}

/// Logs each line of `reader`, keeping only what follows the last carriage return.
fn log_lines<R: Read>(target: &str, reader: R) {
    for line in BufReader::new(reader).split(b'\n') {
        match line {
            Ok(line) => {
                let line = String::from_utf8_lossy(&line);
                info!(target: target, "{}", last_segment(&line));
            }
            Err(why) => {
                warn!("failed to read command output: {}", why);
                break;
            }
        }
    }
}

fn last_segment(line: &str) -> &str {
    line.trim_end().rsplit('\r').next().unwrap_or_default()
}
