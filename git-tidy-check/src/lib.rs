//! Run the project's own development commands: installing it for
//! development, running its tests (optionally with coverage) and linting it.
//!
//! The command lines come from `tidy.command.*` config values. They don't
//! need a Git repository, so outside of one they run in the current directory
//! with only the global Git config consulted.

#![warn(missing_docs)]
#![warn(
    clippy::all,
    clippy::as_conversions,
    clippy::clone_on_ref_ptr,
    clippy::dbg_macro
)]
#![allow(clippy::too_many_arguments, clippy::blocks_in_conditions)]

use std::fmt::Write;
use std::path::PathBuf;

use cursive_core::theme::{BaseColor, Effect};
use git_tidy_invoke::CommandContext;
use lib::core::config::get_tool_command;
use lib::core::effects::Effects;
use lib::core::formatting::{make_status_line, StatusKind, StyledStringBuilder};
use lib::core::tool::{ToolKind, ToolRunInfo};
use lib::git::Repo;
use lib::util::{ExitCode, EyreExitOr};
use tracing::{debug, instrument};

/// Run the command configured for `kind` in `working_directory`, with
/// `extra_args` appended to it.
#[instrument]
pub fn run_tool(
    effects: &Effects,
    repo: Option<&Repo>,
    working_directory: PathBuf,
    kind: ToolKind,
    extra_args: &[String],
) -> EyreExitOr<()> {
    let glyphs = effects.get_glyphs();
    let command = get_tool_command(repo, kind)?;
    let command_line = ToolRunInfo::make_command_line(&command, extra_args);

    let tool_run_info = match ToolRunInfo::new(working_directory) {
        Some(tool_run_info) => tool_run_info,
        None => {
            writeln!(
                effects.get_error_stream(),
                "{}",
                glyphs.render(make_status_line(
                    StatusKind::Error,
                    format!("Could not find a shell to run: {command_line}"),
                ))?
            )?;
            return Ok(Err(ExitCode(1)));
        }
    };

    writeln!(
        effects.get_output_stream(),
        "{}",
        glyphs.render(
            StyledStringBuilder::new()
                .append_styled(format!("Running {kind}: "), Effect::Bold)
                .append_styled(&command_line, BaseColor::Cyan.light())
                .build()
        )?
    )?;

    match tool_run_info.run(effects, &command_line)? {
        Ok(()) => {
            writeln!(
                effects.get_output_stream(),
                "{}",
                glyphs.render(make_status_line(
                    StatusKind::Success,
                    format!("{} succeeded", kind.title()),
                ))?
            )?;
            Ok(Ok(()))
        }
        Err(exit_code) => {
            writeln!(
                effects.get_error_stream(),
                "{}",
                glyphs.render(make_status_line(
                    StatusKind::Error,
                    format!("{} failed with exit code {}", kind.title(), exit_code.0),
                ))?
            )?;
            Ok(Err(exit_code))
        }
    }
}

/// `setup`, `test`, `test-coverage` and `lint` commands.
#[instrument]
pub fn command_main(ctx: CommandContext, kind: ToolKind, extra_args: &[String]) -> EyreExitOr<()> {
    let CommandContext {
        effects,
        git_run_info,
    } = ctx;

    let repo = match Repo::from_current_dir() {
        Ok(repo) => Some(repo),
        Err(err) => {
            debug!(?err, "Not in a Git repository; running in current directory");
            None
        }
    };
    let working_directory = repo
        .as_ref()
        .and_then(|repo| repo.get_working_copy_path())
        .unwrap_or_else(|| git_run_info.working_directory.clone());

    run_tool(&effects, repo.as_ref(), working_directory, kind, extra_args)
}
