//! Accesses repo-specific configuration.
//!
//! All `git-tidy` settings live in Git's own config under the `tidy.*`
//! namespace, so they can be set per-repository or globally with `git config`.

use tracing::instrument;

use crate::core::tool::ToolKind;
use crate::git::{Config, ConfigRead, Repo};

/// Name of the remote which is conventionally used for the project that a
/// fork was made from.
pub const CONVENTIONAL_UPSTREAM_REMOTE_NAME: &str = "upstream";

/// Name of the remote which `git clone` creates by default.
pub const DEFAULT_REMOTE_NAME: &str = "origin";

fn get_config(repo: Option<&Repo>) -> eyre::Result<Config> {
    match repo {
        Some(repo) => Ok(repo.get_readonly_config()?),
        None => Config::open_default(),
    }
}

/// Get the configured name of the main branch.
///
/// The following config values are resolved, in order. The first valid value is returned.
/// - tidy.mainBranch
/// - init.defaultBranch
/// - finally, default to "main"
#[instrument]
pub fn get_main_branch_name(repo: &Repo) -> eyre::Result<String> {
    let config = repo.get_readonly_config()?;

    if let Some(branch_name) = config.get("tidy.mainBranch")? {
        return Ok(branch_name);
    }

    if let Some(branch_name) = get_default_branch_name(repo)? {
        return Ok(branch_name);
    }

    Ok("main".to_string())
}

/// Get the default init branch name.
#[instrument]
pub fn get_default_branch_name(repo: &Repo) -> eyre::Result<Option<String>> {
    let config = repo.get_readonly_config()?;
    let default_branch_name: Option<String> = config.get("init.defaultBranch")?;
    Ok(default_branch_name)
}

/// Get the remote that the main branch is synced from.
///
/// Uses `tidy.upstreamRemote` if set. Otherwise, a remote named `upstream`
/// is preferred when present, as is conventional for forks, and `origin` is
/// used as a fallback.
#[instrument]
pub fn get_upstream_remote_name(repo: &Repo) -> eyre::Result<String> {
    let config = repo.get_readonly_config()?;
    if let Some(remote_name) = config.get("tidy.upstreamRemote")? {
        return Ok(remote_name);
    }

    let remote_names = repo.get_all_remote_names()?;
    if remote_names
        .iter()
        .any(|name| name == CONVENTIONAL_UPSTREAM_REMOTE_NAME)
    {
        Ok(CONVENTIONAL_UPSTREAM_REMOTE_NAME.to_string())
    } else {
        Ok(DEFAULT_REMOTE_NAME.to_string())
    }
}

/// Get the remote that feature branches are pushed to.
///
/// The following config values are resolved, in order. The first valid value is returned.
/// - tidy.pushRemote
/// - remote.pushDefault
/// - finally, default to "origin"
#[instrument]
pub fn get_push_remote_name(repo: &Repo) -> eyre::Result<String> {
    let config = repo.get_readonly_config()?;
    if let Some(remote_name) = config.get("tidy.pushRemote")? {
        return Ok(remote_name);
    }
    if let Some(remote_name) = config.get("remote.pushDefault")? {
        return Ok(remote_name);
    }
    Ok(DEFAULT_REMOTE_NAME.to_string())
}

/// Get the shell command line used to carry out the given project task.
///
/// This may be called outside of a repository, in which case only the
/// global configuration is consulted.
#[instrument]
pub fn get_tool_command(repo: Option<&Repo>, kind: ToolKind) -> eyre::Result<String> {
    get_config(repo)?.get_or_else(kind.config_key(), || kind.default_command().to_string())
}

/// The forge to submit to, if explicitly configured via `tidy.forge`.
#[instrument]
pub fn get_forge_name(repo: &Repo) -> eyre::Result<Option<String>> {
    repo.get_readonly_config()?.get("tidy.forge")
}

/// Whether `git tidy prepare-pr` should run the linter and tests before
/// pushing.
#[instrument]
pub fn get_prepare_run_checks(repo: &Repo) -> eyre::Result<bool> {
    repo.get_readonly_config()?
        .get_or("tidy.prepare.runChecks", true)
}

/// Environment variables which affect the functioning of `git-tidy`.
pub mod env_vars {
    use std::path::PathBuf;
    use std::process::Command;

    use eyre::Context;
    use tracing::instrument;

    /// Path to the Git executable to shell out to as a subprocess when
    /// appropriate. This may be set during tests.
    pub const TEST_GIT: &str = "TEST_GIT";

    /// "Path to wherever your core Git programs are installed". You can find
    /// the default value by running `git --exec-path`.
    ///
    /// See <https://git-scm.com/docs/git#Documentation/git.txt---exec-pathltpathgt>.
    pub const TEST_GIT_EXEC_PATH: &str = "TEST_GIT_EXEC_PATH";

    /// Get the path to the Git executable for testing.
    ///
    /// Falls back to the first `git` on `PATH` if `TEST_GIT` is not set.
    #[instrument]
    pub fn get_path_to_git() -> eyre::Result<PathBuf> {
        if let Some(path_to_git) = std::env::var_os(TEST_GIT) {
            return Ok(PathBuf::from(&path_to_git));
        }
        crate::util::get_from_path(if cfg!(target_os = "windows") {
            "git.exe"
        } else {
            "git"
        })
        .ok_or_else(|| {
            eyre::eyre!(
                "No path to Git executable was set, and none was found on PATH. \
Try running as: `{0}=$(which git) cargo test ...`",
                TEST_GIT,
            )
        })
    }

    /// Get the `GIT_EXEC_PATH` environment variable for testing.
    ///
    /// Falls back to asking the Git executable with `git --exec-path` if
    /// `TEST_GIT_EXEC_PATH` is not set.
    #[instrument]
    pub fn get_git_exec_path() -> eyre::Result<PathBuf> {
        if let Some(git_exec_path) = std::env::var_os(TEST_GIT_EXEC_PATH) {
            return Ok(PathBuf::from(&git_exec_path));
        }
        let path_to_git = get_path_to_git()?;
        let output = Command::new(&path_to_git)
            .arg("--exec-path")
            .output()
            .wrap_err_with(|| format!("Running {path_to_git:?} --exec-path"))?;
        if !output.status.success() {
            eyre::bail!(
                "Could not determine Git exec path. \
Try running as: `{0}=$(git --exec-path) cargo test ...`",
                TEST_GIT_EXEC_PATH,
            );
        }
        let git_exec_path =
            String::from_utf8(output.stdout).wrap_err("Decoding `git --exec-path` output")?;
        Ok(PathBuf::from(git_exec_path.trim_end()))
    }
}
