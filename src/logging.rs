use crate::LOG_TARGET;
use fern::{Dispatch, InitError, Output};
use log::{LevelFilter, Log};
use std::{
    fmt,
    fs::{self, File, OpenOptions},
    io::{self, Write},
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
};
use systemd_journal_logger::JournalLog;
use yansi::Color;

const SYSLOG_IDENTIFIER: &str = "wb-release";

type Slot<T> = Arc<Mutex<Option<T>>>;

#[derive(Clone, Debug, Default)]
pub struct LogConfig {
    /// Append every record down to DEBUG to this file.
    pub file:    Option<PathBuf>,
    /// Mirror INFO and above to the systemd journal.
    pub journal: bool,
    /// Also include records from the binary crate, named `target`.
    pub binary:  Option<&'static str>,
}

/// Handles to the file and journal outputs of the installed logger.
///
/// [`LogSinks::close`] releases both, after which records only reach the
/// console. A default instance has no sinks at all.
#[derive(Clone, Default)]
pub struct LogSinks {
    file:      Slot<File>,
    journal:   Slot<JournalLog>,
    file_path: Option<PathBuf>,
}

impl fmt::Debug for LogSinks {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        fmt.debug_struct("LogSinks").field("file_path", &self.file_path).finish()
    }
}

impl LogSinks {
    pub fn file_path(&self) -> Option<&Path> { self.file_path.as_deref() }

    pub fn close(&self) {
        debug!("closing log sinks");
        if let Ok(mut file) = self.file.lock() {
            if let Some(mut file) = file.take() {
                let _ = file.flush();
            }
        }

        if let Ok(mut journal) = self.journal.lock() {
            journal.take();
        }
    }
}

pub fn setup_logging(config: &LogConfig) -> Result<LogSinks, InitError> {
    let mut sinks = LogSinks::default();

    let mut dispatch = Dispatch::new()
        // Exclude logs for crates that we use
        .level(LevelFilter::Off)
        .level_for(LOG_TARGET, LevelFilter::Debug)
        .chain(
            Dispatch::new()
                .level(LevelFilter::Info)
                .format(|out, message, _record| {
                    // apt switches the terminal into a mode where a bare
                    // newline doesn't return the carriage
                    out.finish(format_args!(
                        "{} {}\r",
                        chrono::Local::now().format("%H:%M:%S"),
                        message
                    ))
                })
                .chain(io::stdout()),
        );

    if let Some(binary) = config.binary {
        dispatch = dispatch.level_for(binary, LevelFilter::Debug);
    }

    if let Some(ref path) = config.file {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new().create(true).append(true).open(path)?;
        sinks.file = Arc::new(Mutex::new(Some(file)));
        sinks.file_path = Some(path.clone());

        let slot = sinks.file.clone();
        dispatch = dispatch.chain(
            Dispatch::new()
                .level(LevelFilter::Debug)
                .format(|out, message, record| {
                    out.finish(format_args!(
                        "{} {} {}: {}",
                        chrono::Local::now().format("%Y-%m-%d %H:%M:%S,%3f"),
                        record.target(),
                        record.level(),
                        message
                    ))
                })
                .chain(Output::call(move |record| {
                    if let Ok(mut file) = slot.lock() {
                        if let Some(file) = file.as_mut() {
                            let _ = writeln!(file, "{}", record.args());
                        }
                    }
                })),
        );
    }

    if config.journal {
        match JournalLog::new() {
            Ok(journal) => {
                let journal = journal.with_syslog_identifier(SYSLOG_IDENTIFIER.to_owned());
                sinks.journal = Arc::new(Mutex::new(Some(journal)));
                let slot = sinks.journal.clone();
                dispatch = dispatch.chain(
                    Dispatch::new().level(LevelFilter::Info).chain(Output::call(move |record| {
                        if let Ok(journal) = slot.lock() {
                            if let Some(journal) = journal.as_ref() {
                                journal.log(record);
                            }
                        }
                    })),
                );
            }
            Err(why) => {
                eprintln!(
                    "{} journald logging is unavailable: {}",
                    Color::Yellow.style().bold().paint("warning:"),
                    why
                );
            }
        }
    }

    dispatch.apply()?;
    Ok(sinks)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn closed_sinks_are_empty() {
        let sinks = LogSinks::default();
        sinks.close();
        assert!(sinks.file_path().is_none());
        assert!(sinks.file.lock().unwrap().is_none());
        assert!(sinks.journal.lock().unwrap().is_none());
    }

    #[test]
    fn close_releases_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("update.log");
        let sinks = LogSinks {
            file: Arc::new(Mutex::new(Some(File::create(&path).unwrap()))),
            file_path: Some(path.clone()),
            ..LogSinks::default()
        };

        sinks.clone().close();
        assert!(sinks.file.lock().unwrap().is_none());
        assert_eq!(sinks.file_path(), Some(path.as_path()));
        assert_eq!(fomat!({sinks:?}), fomat!("LogSinks { file_path: Some(" {path:?} ") }"));
    }
}
