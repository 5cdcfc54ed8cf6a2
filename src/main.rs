#[macro_use]
extern crate log;

use anyhow::Context as _;
use clap::{Arg, ArgAction, ArgMatches, Command};
use std::{env, path::PathBuf, process::exit};
use wb_update_manager::{
    external::HostRunner,
    logging::{setup_logging, LogConfig},
    paths::Paths,
    prompt::Terminal,
    release::{
        self,
        check::{HttpProbe, Statvfs},
        repos::DEFAULT_REPO_URL,
        Context, Outcome, Request,
    },
    sighandler,
};

const EPILOG: &str = "\
By default, wb-release shows current release info (like -v flag).
This tool should be used with extra care on production installations.";

fn main() {
    let argv: Vec<String> =
        env::args_os().map(|arg| arg.to_string_lossy().into_owned()).collect();

    let matches = cli().get_matches_from(&argv);
    let request = request(&matches, argv);
    let paths = Paths::default();

    if request.shows_banner() {
        exit(release::print_banner(&paths).code());
    }

    let outcome = main_(&paths, &request, &log_config(&matches)).unwrap_or_else(|why| {
        eprintln!("wb-release: {:#}", why);
        Outcome::Fault
    });

    exit(outcome.code());
}

fn main_(paths: &Paths, request: &Request, log_config: &LogConfig) -> anyhow::Result<Outcome> {
    let logs = setup_logging(log_config).context("failed to set up logging")?;

    if let Some(path) = logs.file_path() {
        info!("Update log is written to {}", path.display());
    }

    sighandler::init();

    let probe = HttpProbe::new().context("failed to prepare the repository probe")?;

    let ctx = Context {
        paths,
        base_url: DEFAULT_REPO_URL,
        runner: &HostRunner,
        prompt: &Terminal,
        probe: &probe,
        disk: &Statvfs,
        logs: &logs,
    };

    Ok(release::route(&ctx, request))
}

fn cli() -> Command<'static> {
    let switch = |name: &'static str, help: &'static str| {
        Arg::new(name).long(name).help(help).action(ArgAction::SetTrue)
    };

    let value = |name: &'static str, help: &'static str| {
        Arg::new(name)
            .long(name)
            .help(help)
            .takes_value(true)
            .action(ArgAction::Set)
            .value_parser(clap::value_parser!(String))
    };

    Command::new("wb-release")
        .about("The tool to manage Wirenboard software releases")
        .after_help(EPILOG)
        .args_override_self(true)
        .arg(switch("regenerate", "regenerate factory sources.list and exit").short('r'))
        .arg(
            value("target-release", "upgrade release to a new target (stable or testing)")
                .short('t'),
        )
        .arg(switch("version", "print version info and exit").short('v'))
        .arg(switch("yes", "auto \"yes\" to all questions").short('y'))
        .arg(
            switch("reset-packages", "reset all packages to release versions and exit")
                .short('p'),
        )
        .arg(value("log-filename", "path to output log file").short('l'))
        .arg(switch("no-journald-log", "disable journald logging"))
        .arg(switch("reset-url", "reset repository URL to default Wirenboard one"))
        .arg(value("prefix", "override repository URL prefix"))
        .arg(switch("no-preliminary-update", "skip upgrade before switching (not recommended)"))
        .arg(switch(
            "update-debian-release",
            "update Debian release of the controller to the next one",
        ))
        .arg(switch(
            "confirm-steps",
            "ask for confirmation on each step of the Debian release update",
        ))
}

fn flag(matches: &ArgMatches, name: &str) -> bool {
    matches.get_one::<bool>(name).copied().unwrap_or(false)
}

fn value(matches: &ArgMatches, name: &str) -> Option<String> {
    matches.get_one::<String>(name).filter(|value| !value.is_empty()).cloned()
}

/// A log file is only written when asked for.
fn log_config(matches: &ArgMatches) -> LogConfig {
    LogConfig {
        file:    value(matches, "log-filename").map(PathBuf::from),
        journal: !flag(matches, "no-journald-log"),
        binary:  Some("wb_release"),
    }
}

fn request(matches: &ArgMatches, argv: Vec<String>) -> Request {
    Request {
        version: flag(matches, "version"),
        regenerate: flag(matches, "regenerate"),
        target_release: value(matches, "target-release"),
        prefix: value(matches, "prefix"),
        reset_url: flag(matches, "reset-url"),
        reset_packages: flag(matches, "reset-packages"),
        assume_yes: flag(matches, "yes"),
        no_preliminary_update: flag(matches, "no-preliminary-update"),
        update_debian_release: flag(matches, "update-debian-release"),
        confirm_steps: flag(matches, "confirm-steps"),
        argv,
    }
}
