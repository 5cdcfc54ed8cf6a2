//! Doubles for the outside world, shared by the unit tests.

use crate::{
    external::{Cmd, CommandError, Runner},
    logging::LogSinks,
    paths::Paths,
    prompt::Prompt,
    release::{
        repos::DEFAULT_REPO_URL, Context, DiskSpace, RelResult, ReleaseError, ReleaseProbe,
    },
};
use isahc::http::StatusCode;
use std::{
    cell::{Cell, RefCell},
    collections::VecDeque,
    fs, io,
    path::{Path, PathBuf},
};
use tempfile::TempDir;

#[derive(Clone, Copy, Debug)]
pub enum Failure {
    Exit(i32),
    Interrupt,
}

/// Records command lines, optionally failing the nth `run` call.
#[derive(Default)]
pub struct FakeRunner {
    calls:    RefCell<Vec<String>>,
    handoffs: RefCell<Vec<String>>,
    fail_at:  Option<(usize, Failure)>,
}

impl FakeRunner {
    pub fn failing_at(index: usize, failure: Failure) -> Self {
        FakeRunner { fail_at: Some((index, failure)), ..FakeRunner::default() }
    }

    pub fn calls(&self) -> Vec<String> { self.calls.borrow().clone() }

    pub fn handoffs(&self) -> Vec<String> { self.handoffs.borrow().clone() }

    pub fn count(&self, needle: &str) -> usize {
        self.calls.borrow().iter().filter(|call| call.contains(needle)).count()
    }
}

impl Runner for FakeRunner {
    fn run(&self, cmd: &Cmd) -> Result<(), CommandError> {
        let index = {
            let mut calls = self.calls.borrow_mut();
            calls.push(cmd.to_string());
            calls.len() - 1
        };

        match self.fail_at {
            Some((at, Failure::Exit(code))) if at == index => {
                Err(CommandError::Failed { cmd: cmd.to_string(), code })
            }
            Some((at, Failure::Interrupt)) if at == index => {
                Err(CommandError::Interrupted { cmd: cmd.to_string() })
            }
            _ => Ok(()),
        }
    }

    fn handoff(&self, cmd: &Cmd) -> Result<i32, CommandError> {
        self.handoffs.borrow_mut().push(cmd.to_string());
        Ok(0)
    }
}

/// Replies to questions from a script; running out of answers is end of input.
#[derive(Default)]
pub struct ScriptedPrompt {
    answers:   RefCell<VecDeque<String>>,
    shown:     RefCell<Vec<String>>,
    questions: Cell<usize>,
}

impl ScriptedPrompt {
    pub fn answering(answers: &[&str]) -> Self {
        ScriptedPrompt {
            answers: RefCell::new(answers.iter().map(|&a| a.to_owned()).collect()),
            ..ScriptedPrompt::default()
        }
    }

    pub fn questions(&self) -> usize { self.questions.get() }

    pub fn shown(&self) -> Vec<String> { self.shown.borrow().clone() }
}

impl Prompt for ScriptedPrompt {
    fn show(&self, text: &str) { self.shown.borrow_mut().push(text.to_owned()); }

    fn ask(&self, _question: &str) -> RelResult<String> {
        self.questions.set(self.questions.get() + 1);
        self.answers.borrow_mut().pop_front().ok_or_else(|| {
            ReleaseError::Prompt(io::Error::new(io::ErrorKind::UnexpectedEof, "no more answers"))
        })
    }
}

/// Answers every probe with the same status.
pub struct FakeProbe {
    status: u16,
    urls:   RefCell<Vec<String>>,
}

impl FakeProbe {
    pub fn new(status: u16) -> Self { FakeProbe { status, urls: RefCell::default() } }

    pub fn urls(&self) -> Vec<String> { self.urls.borrow().clone() }
}

impl ReleaseProbe for FakeProbe {
    fn status(&self, url: &str) -> Result<StatusCode, isahc::Error> {
        self.urls.borrow_mut().push(url.to_owned());
        Ok(StatusCode::from_u16(self.status).expect("valid status code"))
    }
}

/// Reports a fixed amount of space for the apt cache and for everything else.
pub struct FakeDisk {
    cache_path: PathBuf,
    cache:      u64,
    system:     u64,
    queried:    RefCell<Vec<PathBuf>>,
}

impl FakeDisk {
    pub fn new(paths: &Paths, cache: u64, system: u64) -> Self {
        FakeDisk { cache_path: paths.apt_archives.clone(), cache, system, queried: RefCell::default() }
    }

    pub fn plenty(paths: &Paths) -> Self { FakeDisk::new(paths, 1 << 40, 1 << 40) }

    pub fn queried(&self) -> Vec<PathBuf> { self.queried.borrow().clone() }
}

impl DiskSpace for FakeDisk {
    fn available_bytes(&self, path: &Path) -> RelResult<u64> {
        self.queried.borrow_mut().push(path.to_owned());
        Ok(if path == self.cache_path { self.cache } else { self.system })
    }
}

pub const RELEASE_FILE: &str = "\
RELEASE_NAME=wb-2207
SUITE=stable
TARGET=wb6/stretch
REPO_PREFIX=\"\"
";

/// A hand-edited but consistent sources list, so byte-exact restores can be told apart
/// from regenerated files.
pub const SOURCES_LIST: &str = "\
# local copy
deb http://deb.wirenboard.com/wb6/stretch stable main
";

/// A throwaway root filesystem laid out like a stretch controller.
pub struct Fixture {
    pub _root: TempDir,
    pub paths: Paths,
    pub logs:  LogSinks,
}

impl Fixture {
    pub fn new() -> Self {
        let root = tempfile::tempdir().expect("temporary root");
        let paths = Paths::under(root.path());

        for dir in &[
            &paths.sources_list,
            &paths.release_preferences,
            &paths.release_file,
            &paths.progress_flag,
            &paths.reboot_flag,
            &paths.motd_banner,
            &paths.motd_target(),
        ] {
            fs::create_dir_all(dir.parent().expect("parent directory")).expect("directory");
        }

        for dir in &[&paths.apt_archives, &paths.system_bin, &paths.apt_lists.join("partial")] {
            fs::create_dir_all(dir).expect("directory");
        }

        fs::write(&paths.release_file, RELEASE_FILE).expect("release file");
        fs::write(&paths.sources_list, SOURCES_LIST).expect("sources list");
        fs::write(paths.apt_lists.join("lock"), "").expect("lists lock");
        fs::write(&paths.motd_banner, "#!/bin/sh\necho reboot required\n").expect("motd banner");

        Fixture { _root: root, paths, logs: LogSinks::default() }
    }

    pub fn context<'a>(
        &'a self,
        runner: &'a dyn Runner,
        prompt: &'a dyn Prompt,
        probe: &'a dyn ReleaseProbe,
        disk: &'a dyn DiskSpace,
    ) -> Context<'a> {
        Context { paths: &self.paths, base_url: DEFAULT_REPO_URL, runner, prompt, probe, disk, logs: &self.logs }
    }
}
