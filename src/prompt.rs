use crate::{
    release::{RelResult, ReleaseError},
    sighandler,
};
use std::io::{self, Read, Write};

const QUESTION: &str = "Are you sure you want to continue? (y/n): ";

/// Interaction with the operator.
pub trait Prompt {
    /// Displays a block of explanatory text.
    fn show(&self, text: &str);

    /// Writes `question` and returns the line typed in reply.
    fn ask(&self, question: &str) -> RelResult<String>;
}

/// Shows `text`, then unless `assume_yes` is set keeps asking until the
/// user gives a non-empty answer. Anything but `y...` aborts.
pub fn user_confirm(prompt: &dyn Prompt, text: Option<&str>, assume_yes: bool) -> RelResult<()> {
    if let Some(text) = text {
        prompt.show(text);
    }

    if assume_yes {
        return Ok(());
    }

    loop {
        match parse_answer(&prompt.ask(QUESTION)?) {
            None => continue,
            Some(true) => return Ok(()),
            Some(false) => return Err(ReleaseError::UserAbort),
        }
    }
}

fn parse_answer(input: &str) -> Option<bool> {
    input.trim().to_lowercase().chars().next().map(|c| c == 'y')
}

/// The controlling terminal.
#[derive(Clone, Copy, Debug, Default)]
pub struct Terminal;

impl Prompt for Terminal {
    fn show(&self, text: &str) { println!("\n{}\n", text); }

    fn ask(&self, question: &str) -> RelResult<String> {
        let std_out = io::stdout();
        let mut std_out_lock = std_out.lock();
        std_out_lock
            .write_all(question.as_bytes())
            .and_then(|_| std_out_lock.flush())
            .map_err(ReleaseError::Prompt)?;
        drop(std_out_lock);

        read_line(io::stdin().lock())
    }
}

/// Reads up to a newline one byte at a time, so that a signal arriving
/// while blocked surfaces as [`ReleaseError::Interrupted`] instead of being
/// retried.
fn read_line(mut input: impl Read) -> RelResult<String> {
    let mut line = Vec::new();
    let mut byte = [0u8; 1];

    loop {
        match input.read(&mut byte) {
            Ok(0) if line.is_empty() => {
                return Err(ReleaseError::Prompt(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "end of input while waiting for an answer",
                )))
            }
            Ok(0) => break,
            Ok(_) if byte[0] == b'\n' => break,
            Ok(_) => line.push(byte[0]),
            Err(why) if why.kind() == io::ErrorKind::Interrupted => {
                if let Some(signal) = sighandler::status() {
                    println!();
                    warn!("caught {} signal", signal);
                    return Err(ReleaseError::Interrupted);
                }
            }
            Err(why) => return Err(ReleaseError::Prompt(why)),
        }
    }

    Ok(String::from_utf8_lossy(&line).into_owned())
}
