mod cli;
mod config;
mod engine;
mod fs;
mod logger;
mod runner;
mod targets;
mod vcs;

use crate::config::Configuration;
use crate::engine::Executor;
use crate::logger::Logger;
use crate::runner::CommandRunner;
use anyhow::{Context, Result};
use clap::ArgMatches;
use log::LevelFilter;
use std::path::PathBuf;
use std::process;

/// Name of the run log file, written in the project directory.
const LOG_FILE_NAME: &str = "mason.log";

fn main() {
    let arg_matches = cli::get_app().get_matches();

    process::exit(match run(&arg_matches) {
        Ok(()) => 0,
        Err(e) => {
            eprintln!("mason: {:#}", e);
            1
        }
    });
}

fn run(arg_matches: &ArgMatches) -> Result<()> {
    let project_dir = PathBuf::from(arg_matches.value_of(cli::arg::PROJECT_DIR).unwrap());
    let project_dir = std::fs::canonicalize(&project_dir).with_context(|| {
        format!(
            "Project directory {} is not accessible",
            project_dir.display()
        )
    })?;

    let screen_threshold = match arg_matches.occurrences_of(cli::arg::VERBOSITY) {
        0 => LevelFilter::Info,
        1 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };
    let logger = Logger::create(
        &project_dir.join(LOG_FILE_NAME),
        screen_threshold,
        LevelFilter::Debug,
    )?;

    let requested_targets = arg_matches
        .values_of_lossy(cli::arg::TARGETS)
        .unwrap_or_default();

    let result = drive(&logger, project_dir, requested_targets);
    if let Err(e) = &result {
        logger.error(format!("{:#}", e));
    }
    logger.close()?;

    result
}

fn drive(logger: &Logger, project_dir: PathBuf, requested_targets: Vec<String>) -> Result<()> {
    let config = Configuration::resolve(project_dir, logger)?;
    logger.info(config.to_string());

    let runner = CommandRunner::new(logger);
    let registry = targets::standard_registry();

    Executor::new(&registry, &config, &runner, logger).run(requested_targets)
}
