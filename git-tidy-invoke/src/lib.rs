//! This crate sets up the process for a `git-tidy` subcommand: it parses the
//! global arguments, installs logging and builds the shared command context,
//! then converts the subcommand's result into a process exit code.

#![warn(missing_docs)]
#![warn(
    clippy::all,
    clippy::as_conversions,
    clippy::clone_on_ref_ptr,
    clippy::dbg_macro
)]
#![allow(clippy::too_many_arguments, clippy::blocks_in_conditions)]

use std::any::Any;
use std::collections::HashMap;
use std::ffi::OsString;
use std::path::PathBuf;
use std::time::SystemTime;

use clap::{CommandFactory, FromArgMatches, Parser};
use eyre::Context;
use git_tidy_opts::{ColorSetting, GlobalArgs};
use lib::core::config::env_vars::{get_path_to_git, TEST_GIT_EXEC_PATH};
use lib::core::effects::Effects;
use lib::core::formatting::Glyphs;
use lib::git::GitRunInfo;
use lib::util::{ExitCode, EyreExitOr};
use tracing::level_filters::LevelFilter;
use tracing::{debug, info, instrument, warn};
use tracing_chrome::ChromeLayerBuilder;
use tracing_error::ErrorLayer;
use tracing_subscriber::fmt as tracing_fmt;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

/// Shared context for all commands.
#[derive(Clone, Debug)]
pub struct CommandContext {
    /// Where output and progress go.
    pub effects: Effects,

    /// How to run Git for this invocation.
    pub git_run_info: GitRunInfo,
}

/// Only first-party crates log unless `RUST_LOG` says otherwise.
const DEFAULT_LOG_DIRECTIVES: &str = "git_tidy=warn,tidy=warn";

/// Where to write a Chrome trace, given the value of `RUST_PROFILE`. `1` or
/// `true` pick a timestamped file in the current directory; any other
/// non-empty value is used as the path.
fn profile_output_path(rust_profile: Option<&str>, now: SystemTime) -> eyre::Result<Option<String>> {
    match rust_profile {
        Some("1") | Some("true") => {
            let secs = now
                .duration_since(SystemTime::UNIX_EPOCH)
                .wrap_err("Computing trace timestamp")?
                .as_secs();
            Ok(Some(format!("trace-{secs}.json")))
        }
        Some(path) if !path.is_empty() => Ok(Some(path.to_string())),
        Some(_) | None => Ok(None),
    }
}

#[must_use = "The returned guard flushes the profile trace when dropped, so it must outlive the command."]
#[instrument]
fn install_tracing(effects: Effects) -> eyre::Result<Box<dyn Any>> {
    let env_filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::WARN.into())
        .parse(
            std::env::var(EnvFilter::DEFAULT_ENV)
                .unwrap_or_else(|_| DEFAULT_LOG_DIRECTIVES.to_string()),
        )?;
    // Log lines go through `Effects` so they don't clobber progress spinners.
    let fmt_layer = tracing_fmt::layer().with_writer(move || effects.get_error_stream());

    let rust_profile = std::env::var("RUST_PROFILE").ok();
    let (profile_layer, flush_guard): (_, Box<dyn Any>) =
        match profile_output_path(rust_profile.as_deref(), SystemTime::now())? {
            Some(path) => {
                let include_args = std::env::var_os("RUST_PROFILE_INCLUDE_ARGS")
                    .map(|value| !value.is_empty())
                    .unwrap_or(false);
                let (layer, flush_guard) = ChromeLayerBuilder::new()
                    .file(path)
                    .include_args(include_args)
                    .build();
                (Some(layer), Box::new(flush_guard))
            }
            None => (None, Box::new(())),
        };

    tracing_subscriber::registry()
        .with(ErrorLayer::default())
        .with(fmt_layer.with_filter(env_filter))
        .with(profile_layer)
        .try_init()?;

    Ok(flush_guard)
}

/// Forward libgit2's own trace messages into `tracing`.
fn install_libgit2_tracing() {
    fn on_libgit2_trace(level: git2::TraceLevel, message: &[u8]) {
        info!(?level, "libgit2: {}", String::from_utf8_lossy(message));
    }

    if let Err(err) = git2::trace_set(git2::TraceLevel::Trace, on_libgit2_trace) {
        warn!(?err, "Could not install libgit2 tracing");
    }
}

fn glyphs_for_color_setting(color: Option<ColorSetting>) -> Glyphs {
    match color {
        Some(ColorSetting::Always) => Glyphs::pretty(),
        Some(ColorSetting::Never) => Glyphs::text(),
        Some(ColorSetting::Auto) | None => Glyphs::detect(),
    }
}

/// Build the [`GitRunInfo`] for Git subprocesses, which inherit this
/// process's environment. Under test, `TEST_GIT_EXEC_PATH` stands in for
/// `GIT_EXEC_PATH` unless the latter is already set.
fn make_git_run_info(env: HashMap<OsString, OsString>) -> eyre::Result<GitRunInfo> {
    let mut env = env;
    if let Some(git_exec_path) = env.get(&OsString::from(TEST_GIT_EXEC_PATH)).cloned() {
        env.entry("GIT_EXEC_PATH".into()).or_insert(git_exec_path);
    }
    let path_to_git = get_path_to_git().unwrap_or_else(|err| {
        debug!(?err, "Falling back to `git` on PATH");
        PathBuf::from("git")
    });
    Ok(GitRunInfo {
        path_to_git,
        working_directory: std::env::current_dir().wrap_err("Getting current directory")?,
        env,
    })
}

/// Parse `args`, set up the process and run `f`, returning the exit code.
///
/// Kept separate from [`invoke_subcommand_main`] so that everything here is
/// dropped (and the profile trace flushed) before the process exits.
#[instrument(skip(f))]
pub fn do_main_and_drop_locals<T: Parser>(
    f: impl Fn(CommandContext, T) -> EyreExitOr<()>,
    args: Vec<OsString>,
) -> eyre::Result<i32> {
    let command_args = T::parse_from(&args);
    let global_matches = GlobalArgs::command()
        .ignore_errors(true)
        .get_matches_from(&args);
    let GlobalArgs {
        working_directory,
        color,
    } = GlobalArgs::from_arg_matches(&global_matches)
        .map_err(|err| eyre::eyre!("Could not parse global arguments: {err}"))?;

    if let Some(working_directory) = working_directory {
        std::env::set_current_dir(&working_directory).wrap_err_with(|| {
            format!("Could not change to working directory: {working_directory:?}")
        })?;
    }

    let git_run_info = make_git_run_info(std::env::vars_os().collect())?;
    let effects = Effects::new(glyphs_for_color_setting(color));
    let _flush_guard = install_tracing(effects.clone())?;
    install_libgit2_tracing();

    let ctx = CommandContext {
        effects,
        git_run_info,
    };
    match f(ctx, command_args)? {
        Ok(()) => Ok(0),
        Err(ExitCode(exit_code)) => Ok(i32::try_from(exit_code)?),
    }
}

/// Run a `git-tidy` command from `main` and exit with its exit code:
///
/// ```ignore
/// fn main() {
///     git_tidy_invoke::invoke_subcommand_main(commands::command_main)
/// }
/// ```
pub fn invoke_subcommand_main<T: Parser>(f: impl Fn(CommandContext, T) -> EyreExitOr<()>) {
    color_eyre::install().expect("Could not install panic handler");
    let args = git_tidy_opts::rewrite_args(std::env::args_os().collect());
    let exit_code = do_main_and_drop_locals(f, args).expect("A fatal error occurred");
    std::process::exit(exit_code);
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn test_profile_output_path() -> eyre::Result<()> {
        let now = SystemTime::UNIX_EPOCH + Duration::from_secs(1234);
        assert_eq!(profile_output_path(None, now)?, None);
        assert_eq!(profile_output_path(Some(""), now)?, None);
        assert_eq!(
            profile_output_path(Some("1"), now)?,
            Some("trace-1234.json".to_string())
        );
        assert_eq!(
            profile_output_path(Some("true"), now)?,
            Some("trace-1234.json".to_string())
        );
        assert_eq!(
            profile_output_path(Some("/tmp/sync.json"), now)?,
            Some("/tmp/sync.json".to_string())
        );
        Ok(())
    }

    #[test]
    fn test_make_git_run_info_exec_path() -> eyre::Result<()> {
        let env = HashMap::from([(
            OsString::from(TEST_GIT_EXEC_PATH),
            OsString::from("/opt/git/libexec"),
        )]);
        let git_run_info = make_git_run_info(env)?;
        assert_eq!(
            git_run_info.env.get(&OsString::from("GIT_EXEC_PATH")),
            Some(&OsString::from("/opt/git/libexec"))
        );

        let env = HashMap::from([
            (
                OsString::from(TEST_GIT_EXEC_PATH),
                OsString::from("/opt/git/libexec"),
            ),
            (
                OsString::from("GIT_EXEC_PATH"),
                OsString::from("/usr/lib/git-core"),
            ),
        ]);
        let git_run_info = make_git_run_info(env)?;
        assert_eq!(
            git_run_info.env.get(&OsString::from("GIT_EXEC_PATH")),
            Some(&OsString::from("/usr/lib/git-core"))
        );
        Ok(())
    }

    #[test]
    fn test_glyphs_for_color_setting() {
        assert!(!glyphs_for_color_setting(Some(ColorSetting::Never)).should_write_ansi_escape_codes);
        assert!(glyphs_for_color_setting(Some(ColorSetting::Always)).should_write_ansi_escape_codes);
    }
}
