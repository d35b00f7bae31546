use crate::config::Configuration;
use crate::engine::{TargetContext, TargetRegistry};
use crate::fs;
use crate::logger::Logger;
use anyhow::{anyhow, Context, Result};
use std::env;
use std::path::{Path, PathBuf};

/// Environment variable overriding the executable used to run the test suite.
pub const TEST_RUNNER_ENV: &str = "MASON_TEST_RUNNER";

/// Builds the registry of standard targets.
pub fn standard_registry() -> TargetRegistry {
    let mut registry = TargetRegistry::new();
    registry.register(
        "all",
        "Clean, fetch externals, build and test",
        Box::new(all),
    );
    registry.register(
        "clean",
        "Remove the build artefacts of the current configuration",
        Box::new(clean),
    );
    registry.register(
        "clobber",
        "Remove all build artefacts and fetched externals",
        Box::new(clobber),
    );
    registry.register(
        "externals",
        "Fetch the external dependencies needed by the build",
        Box::new(externals),
    );
    registry.register(
        "build",
        "Build the project with the configured toolchain",
        Box::new(build),
    );
    registry.register(
        "test",
        "Run the test suite against the built executable",
        Box::new(test),
    );
    registry
}

/// Composite target: performs no work itself, only enqueues the pipeline.
fn all(context: &mut TargetContext) -> Result<()> {
    for name in ["test", "build", "externals", "clean"] {
        context.queue.push_front(name);
    }

    Ok(())
}

fn clean(context: &mut TargetContext) -> Result<()> {
    clean_build_tree(context.config, context.logger)
}

fn clean_build_tree(config: &Configuration, logger: &Logger) -> Result<()> {
    let mut removed = |path: &Path| logger.debug(format!("Removed {}", path.display()));

    logger.info("Deleting compiled bytecode files");
    fs::delete("*.pyc", &config.root, true, &mut removed)?;
    fs::delete("*.pyo", &config.root, true, &mut removed)?;

    logger.info("Removing the build output directory");
    fs::remove_dir_recursive(&config.build_dir(), &mut removed)?;

    Ok(())
}

fn clobber(context: &mut TargetContext) -> Result<()> {
    let config = context.config;
    let logger = context.logger;

    clean_build_tree(config, logger)?;

    let mut removed = |path: &Path| logger.debug(format!("Removed {}", path.display()));
    for (name, version) in &config.externals {
        let dir = config.externals_dir().join(version);
        logger.info(format!("Removing external {} ({})", name, version));
        fs::remove_dir_recursive(&dir, &mut removed)?;
    }

    Ok(())
}

fn externals(context: &mut TargetContext) -> Result<()> {
    let runner = context.runner;
    fetch_externals(context.config, context.logger, |url, dir| {
        let command = vec![
            "git".to_string(),
            "clone".to_string(),
            "--depth".to_string(),
            "1".to_string(),
            url.to_string(),
            dir.display().to_string(),
        ];
        runner.run(&command, None)
    })
}

/// Fetches every external dependency that is not already in place.
///
/// Fetching is idempotent: a dependency whose version directory already
/// exists is skipped. With `keep-going-externals` enabled, every fetch is
/// attempted before the target fails; otherwise the first failure aborts the
/// remaining fetches.
fn fetch_externals<F>(config: &Configuration, logger: &Logger, mut fetch: F) -> Result<()>
where
    F: FnMut(&str, &Path) -> Result<()>,
{
    let mut failed: Vec<&str> = Vec::new();
    for (name, version) in &config.externals {
        let dir = config.externals_dir().join(version);
        if dir.exists() {
            logger.info(format!(
                "Not fetching {}; {} already exists",
                name,
                dir.display()
            ));
            continue;
        }

        let url = format!("{}/{}", config.externals_root, version);
        logger.info(format!("Fetching {} into {}", version, dir.display()));
        match fetch(&url, &dir) {
            Ok(()) => {}
            Err(e) if config.keep_going_externals => {
                logger.error(format!("Failed to fetch {}: {:#}", name, e));
                failed.push(name.as_str());
            }
            Err(e) => return Err(e).with_context(|| format!("Failed to fetch {}", name)),
        }
    }

    if failed.is_empty() {
        Ok(())
    } else {
        Err(anyhow!("Failed to fetch externals: {}", failed.join(", ")))
    }
}

fn build(context: &mut TargetContext) -> Result<()> {
    let config = context.config;
    let logger = context.logger;

    check_externals(config, logger);

    // A stale executable from a previous build must not outlive a failed one.
    let mut removed = |path: &Path| logger.debug(format!("Removed {}", path.display()));
    fs::delete(
        &config.executable_name(),
        &config.output_dir(),
        false,
        &mut removed,
    )?;

    logger.info(format!(
        "Building {} ({}, {})",
        config.executable_name(),
        config.variant,
        config.platform
    ));
    let command = vec![
        config.toolchain_env_script().display().to_string(),
        config.platform.toolchain_arg().to_string(),
        "build".to_string(),
        config.variant.as_str().to_string(),
    ];
    context.runner.run(&command, Some(&config.root))
}

/// Warns about externals that the build expects but that are not in place.
fn check_externals(config: &Configuration, logger: &Logger) {
    for (name, version) in &config.externals {
        if !config.externals_dir().join(version).exists() {
            logger.warn(format!("External {} ({}) is not in place", name, version));
        }
    }
}

fn test(context: &mut TargetContext) -> Result<()> {
    let config = context.config;

    // The remaining queue entries are passed through to the test runner.
    let extra_args = context.queue.drain();

    let test_runner = find_test_runner(config)?;
    context
        .logger
        .info(format!("Running the test suite with {}", test_runner));

    let mut command = vec![test_runner];
    command.extend(config.test_command.iter().cloned());
    command.extend(extra_args);
    context.runner.run(&command, Some(&config.root))
}

/// Locates the executable used to drive the test suite:
///
/// * the override environment variable, when set;
/// * the freshly built executable, when present;
/// * anything with a matching name on the search path;
/// * the bare executable name otherwise.
///
/// The result is deliberately not cached: the executable may not exist until
/// the build target has run.
fn find_test_runner(config: &Configuration) -> Result<String> {
    if let Some(test_runner) = env::var_os(TEST_RUNNER_ENV) {
        return Ok(test_runner.to_string_lossy().into_owned());
    }

    let built = config.executable_path();
    if built.exists() {
        return Ok(built.display().to_string());
    }

    let name = config.executable_name();
    let search_path: Vec<PathBuf> = env::var_os("PATH")
        .map(|path| env::split_paths(&path).collect())
        .unwrap_or_default();
    if let Some(found) = fs::find_one(&name, &search_path, false)? {
        return Ok(found.display().to_string());
    }

    Ok(name)
}
