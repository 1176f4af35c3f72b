//! Sub-commands of `git-tidy`.

use std::fmt::Write;

use eyre::Context;
use git_tidy_invoke::CommandContext;
use git_tidy_opts::{write_man_pages, Command, InstallManPagesArgs, Opts};
use lib::core::tool::ToolKind;
use lib::util::EyreExitOr;
use tracing::instrument;

#[instrument]
fn install_man_pages(ctx: &CommandContext, args: InstallManPagesArgs) -> EyreExitOr<()> {
    let InstallManPagesArgs { path } = args;
    write_man_pages(&path).wrap_err_with(|| format!("Writing man-pages to: {path:?}"))?;
    writeln!(
        ctx.effects.get_output_stream(),
        "Installed man-pages to: {}",
        path.display()
    )?;
    Ok(Ok(()))
}

/// Dispatch to the crate implementing the subcommand.
pub fn command_main(ctx: CommandContext, opts: Opts) -> EyreExitOr<()> {
    let Opts {
        global_args: _,
        command,
    } = opts;

    match command {
        Command::Setup(args) => git_tidy_check::command_main(ctx, ToolKind::Setup, &args.args),
        Command::Test(args) => git_tidy_check::command_main(ctx, ToolKind::Test, &args.args),
        Command::TestCoverage(args) => {
            git_tidy_check::command_main(ctx, ToolKind::TestCoverage, &args.args)
        }
        Command::Lint(args) => git_tidy_check::command_main(ctx, ToolKind::Lint, &args.args),
        Command::Sync(args) => git_tidy_sync::command_main_sync(ctx, args),
        Command::Squash(args) => git_tidy_sync::command_main_squash(ctx, args),
        Command::PreparePr(args) => git_tidy_submit::command_main(ctx, args),
        Command::InstallManPages(args) => install_man_pages(&ctx, args),
    }
}
