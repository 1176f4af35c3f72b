//! The command-line options for `git-tidy`.

#![warn(missing_docs)]
#![warn(
    clippy::all,
    clippy::as_conversions,
    clippy::clone_on_ref_ptr,
    clippy::dbg_macro
)]
#![allow(clippy::too_many_arguments, clippy::blocks_in_conditions)]

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use clap::{Args, Command as ClapCommand, CommandFactory, Parser, ValueEnum};

/// Arguments passed through to a project command.
#[derive(Debug, Args)]
pub struct ToolArgs {
    /// Extra arguments to append to the configured command, usually given
    /// after `--`. They are shell-quoted before being appended.
    #[clap(value_parser, trailing_var_arg = true, allow_hyphen_values = true)]
    pub args: Vec<String>,
}

/// Rebase the current branch onto the latest upstream main branch.
#[derive(Debug, Args)]
pub struct SyncArgs {
    /// Don't fetch from the upstream remote first. Rebase onto whatever
    /// version of the main branch is already known locally.
    #[clap(action, long = "no-fetch")]
    pub no_fetch: bool,
}

/// Squash all commits since the branch point into a single commit.
#[derive(Debug, Args)]
pub struct SquashArgs {
    /// The message for the squashed commit. By default, the first commit's
    /// summary is used, followed by a list of all the squashed summaries.
    #[clap(value_parser, short = 'm', long = "message")]
    pub message: Option<String>,

    /// Don't ask for confirmation before squashing.
    #[clap(action, short = 'y', long = "yes")]
    pub yes: bool,
}

/// A Git hosting provider to open pull requests on.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum ForgeKind {
    /// Force-push the branch to the push remote and print a link for opening
    /// a pull request in the browser, if one can be determined.
    Branch,

    /// Force-push the branch to the push remote and create or update a pull
    /// request using the `gh` command-line tool.
    Github,
}

/// Lint, test, sync, squash and push the current branch, then open a pull
/// request for it.
#[derive(Debug, Args)]
pub struct PreparePrArgs {
    /// Don't run the linters and tests before pushing.
    #[clap(action, long = "skip-checks")]
    pub skip_checks: bool,

    /// The message for the squashed commit.
    #[clap(value_parser, short = 'm', long = "message")]
    pub message: Option<String>,

    /// Don't ask for confirmation before squashing.
    #[clap(action, short = 'y', long = "yes")]
    pub yes: bool,

    /// If the forge supports it, create the pull request in "draft" mode.
    #[clap(action, short = 'd', long = "draft")]
    pub draft: bool,

    /// The title of the pull request. Defaults to the squashed commit's
    /// summary.
    #[clap(value_parser, long = "title")]
    pub title: Option<String>,

    /// The Git hosting provider to use, called a "forge". If not provided, the
    /// `tidy.forge` config value is used, or else the forge is detected from
    /// the push remote's URL.
    #[clap(value_enum, short = 'F', long = "forge")]
    pub forge_kind: Option<ForgeKind>,
}

/// Install git-tidy's man-pages to the given path.
#[derive(Debug, Parser)]
pub struct InstallManPagesArgs {
    /// The path to install to. An example path might be `/usr/share/man`. The
    /// provided path will be appended with `man1`, etc., as appropriate.
    pub path: PathBuf,
}

/// The `git-tidy` subcommands.
#[derive(Debug, Parser)]
pub enum Command {
    /// Install the project for development, along with its pre-commit hooks.
    Setup(ToolArgs),

    /// Run the project's test suite.
    Test(ToolArgs),

    /// Run the project's test suite and report code coverage.
    #[clap(alias = "test_coverage")]
    TestCoverage(ToolArgs),

    /// Run the project's linters and formatters.
    Lint(ToolArgs),

    /// Rebase the current branch onto the latest upstream main branch.
    Sync(SyncArgs),

    /// Squash all commits since the branch point into a single commit.
    Squash(SquashArgs),

    /// Lint, test, sync, squash and push the current branch, then open a pull
    /// request for it.
    #[clap(alias = "prepare_pr")]
    PreparePr(PreparePrArgs),

    /// Install git-tidy's man-pages to the given path.
    InstallManPages(InstallManPagesArgs),
}

/// Whether to display terminal colors.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum ColorSetting {
    /// Automatically determine whether to display colors from the terminal and environment variables.
    /// This is the default behavior.
    Auto,
    /// Always display terminal colors.
    Always,
    /// Never display terminal colors.
    Never,
}

/// Arguments which apply to all commands. Used during setup.
#[derive(Debug, Parser)]
pub struct GlobalArgs {
    /// Change to the given directory before executing the rest of the program.
    /// (The option is called `-C` for symmetry with Git.)
    #[clap(value_parser, short = 'C', global = true)]
    pub working_directory: Option<PathBuf>,

    /// Flag to force enable or disable terminal colors.
    #[clap(value_parser, long = "color", value_enum, global = true)]
    pub color: Option<ColorSetting>,
}

/// Keep feature branches tidy: run the project's checks, sync with upstream,
/// squash, and open pull requests.
#[derive(Debug, Parser)]
#[clap(name = "git-tidy", version = env!("CARGO_PKG_VERSION"))]
pub struct Opts {
    /// Global arguments.
    #[clap(flatten)]
    pub global_args: GlobalArgs,

    /// The `git-tidy` subcommand to run.
    #[clap(subcommand)]
    pub command: Command,
}

/// Generate and write man-pages into the specified directory.
///
/// The generated files are named things like `man1/git-tidy-sync.1`,
/// so this directory should be of the form `path/to/man`, to ensure that these
/// files get generated into the correct man-page section.
pub fn write_man_pages(man_dir: &Path) -> std::io::Result<()> {
    let man1_dir = man_dir.join("man1");
    std::fs::create_dir_all(&man1_dir)?;

    let app =
        // Explicitly set the name here, or else clap thinks that the name of the
        // command is `git-tidy-opts` (and that its subcommands are
        // `git-tidy-opts-sync`, etc.).
        Opts::command().name("git-tidy");
    generate_man_page(&man1_dir, "git-tidy", &app)?;
    for subcommand in app.get_subcommands() {
        let subcommand_exe_name = format!("git-tidy-{}", subcommand.get_name());
        generate_man_page(&man1_dir, &subcommand_exe_name, subcommand)?;
    }
    Ok(())
}

fn generate_man_page(man1_dir: &Path, name: &str, command: &ClapCommand) -> std::io::Result<()> {
    let rendered_man_page = {
        let mut buffer = Vec::new();
        clap_mangen::Man::new(command.clone())
            // The rendered man-page command name would be the subcommand only
            // (such as `sync(1)` instead of `git-tidy-sync(1)`), so override
            // the name here.
            .title(name)
            .render(&mut buffer)?;
        buffer
    };
    let output_path = man1_dir.join(format!("{name}.1"));
    std::fs::write(output_path, rendered_man_page)?;
    Ok(())
}

/// Carry out some rewrites on the command-line arguments for uniformity.
///
/// For example, `git-tidy-sync` becomes `git-tidy sync`, and the `.exe`
/// suffix is removed on Windows. These are necessary for later command-line
/// argument parsing.
pub fn rewrite_args(args: Vec<OsString>) -> Vec<OsString> {
    let first_arg = match args.first() {
        None => return args,
        Some(first_arg) => first_arg.clone(),
    };

    // Don't use `std::env::current_exe`, because it may or may not resolve the
    // symlink. We want to preserve the symlink in our case. See
    // https://doc.rust-lang.org/std/env/fn.current_exe.html#platform-specific-behavior
    let exe_path = PathBuf::from(first_arg);
    let exe_name = match exe_path.file_name().and_then(|arg| arg.to_str()) {
        Some(exe_name) => exe_name,
        None => return args,
    };

    // On Windows, the first argument might be `git-tidy-sync.exe` instead of
    // just `git-tidy-sync`. Remove the suffix in that case.
    let exe_name = match exe_name.strip_suffix(std::env::consts::EXE_SUFFIX) {
        Some(exe_name) => exe_name,
        None => exe_name,
    };

    match exe_name.strip_prefix("git-tidy-") {
        Some(subcommand) => {
            let mut new_args = vec![OsString::from("git-tidy"), OsString::from(subcommand)];
            new_args.extend(args.into_iter().skip(1));
            new_args
        }
        None => {
            let mut new_args = vec![OsString::from(exe_name)];
            new_args.extend(args.into_iter().skip(1));
            new_args
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rewrite_args() {
        assert_eq!(
            rewrite_args(vec![OsString::from("git-tidy")]),
            vec![OsString::from("git-tidy")]
        );
        assert_eq!(
            rewrite_args(vec![OsString::from("git-tidy-sync")]),
            vec![OsString::from("git-tidy"), OsString::from("sync")]
        );

        // Should only happen on Windows.
        if std::env::consts::EXE_SUFFIX == ".exe" {
            assert_eq!(
                rewrite_args(vec![OsString::from("git-tidy-sync.exe")]),
                vec![OsString::from("git-tidy"), OsString::from("sync")]
            );
        }

        assert_eq!(
            rewrite_args(vec![
                OsString::from("target/debug/git-tidy-squash"),
                OsString::from("-m"),
                OsString::from("message")
            ]),
            vec![
                OsString::from("git-tidy"),
                OsString::from("squash"),
                OsString::from("-m"),
                OsString::from("message")
            ]
        );
    }

    #[test]
    fn test_parse_tool_args() -> Result<(), clap::Error> {
        let opts = Opts::try_parse_from(["git-tidy", "test", "--", "-k", "foo bar"])?;
        match opts.command {
            Command::Test(ToolArgs { args }) => assert_eq!(args, vec!["-k", "foo bar"]),
            other => panic!("unexpected command: {other:?}"),
        }

        let opts = Opts::try_parse_from(["git-tidy", "test_coverage"])?;
        assert!(matches!(
            opts.command,
            Command::TestCoverage(ToolArgs { args }) if args.is_empty()
        ));
        Ok(())
    }

    #[test]
    fn test_parse_prepare_pr() -> Result<(), clap::Error> {
        let opts = Opts::try_parse_from([
            "git-tidy",
            "prepare_pr",
            "--skip-checks",
            "-F",
            "github",
            "--draft",
            "--color",
            "never",
        ])?;
        assert_eq!(opts.global_args.color, Some(ColorSetting::Never));
        match opts.command {
            Command::PreparePr(args) => {
                assert!(args.skip_checks);
                assert!(args.draft);
                assert!(!args.yes);
                assert_eq!(args.forge_kind, Some(ForgeKind::Github));
            }
            other => panic!("unexpected command: {other:?}"),
        }

        assert!(Opts::try_parse_from(["git-tidy", "frobnicate"]).is_err());
        Ok(())
    }

    #[test]
    fn test_write_man_pages() -> std::io::Result<()> {
        let temp_dir = tempfile::tempdir()?;
        write_man_pages(temp_dir.path())?;
        assert!(temp_dir.path().join("man1").join("git-tidy.1").exists());
        assert!(temp_dir.path().join("man1").join("git-tidy-sync.1").exists());
        assert!(temp_dir
            .path()
            .join("man1")
            .join("git-tidy-prepare-pr.1")
            .exists());
        Ok(())
    }
}
