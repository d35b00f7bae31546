use anyhow::{Context, Result};
use duct::cmd;
use std::path::Path;

/// Branch name assumed when the current branch cannot be determined.
pub const FALLBACK_BRANCH: &str = "default";

/// Asks the version control system for the branch checked out in
/// `project_dir`.
pub fn current_branch(project_dir: &Path) -> Result<String> {
    let output = cmd!("git", "rev-parse", "--abbrev-ref", "HEAD")
        .dir(project_dir)
        .stderr_null()
        .read()
        .with_context(|| "Failed to query the current branch")?;

    Ok(output.trim().to_string())
}
