//! Running the project's own development commands, such as its test suite.

use std::collections::HashMap;
use std::ffi::OsString;
use std::fmt::Display;
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::sync::Arc;

use eyre::Context;
use tracing::instrument;

use crate::core::effects::{Effects, OperationType};
use crate::git::{join_writer_threads, spawn_writer_thread};
use crate::util::{get_sh, ExitCode, EyreExitOr};

/// One of the development tasks that `git-tidy` knows how to run.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ToolKind {
    /// Install the project and its development hooks.
    Setup,

    /// Run the test suite.
    Test,

    /// Run the test suite while measuring coverage.
    TestCoverage,

    /// Run the linters and formatters.
    Lint,
}

impl ToolKind {
    /// The Git config key that overrides the command for this task.
    pub fn config_key(&self) -> &'static str {
        match self {
            ToolKind::Setup => "tidy.command.setup",
            ToolKind::Test => "tidy.command.test",
            ToolKind::TestCoverage => "tidy.command.testCoverage",
            ToolKind::Lint => "tidy.command.lint",
        }
    }

    /// The command run for this task if none is configured.
    pub fn default_command(&self) -> &'static str {
        match self {
            ToolKind::Setup => r#"pip install -e ".[dev]" && pre-commit install"#,
            ToolKind::Test => "pytest",
            ToolKind::TestCoverage => "coverage run -m pytest && coverage report -m",
            ToolKind::Lint => "pre-commit run --all-files",
        }
    }

    /// A capitalized description, for the start of a sentence.
    pub fn title(&self) -> &'static str {
        match self {
            ToolKind::Setup => "Setup",
            ToolKind::Test => "Tests",
            ToolKind::TestCoverage => "Tests with coverage",
            ToolKind::Lint => "Linters",
        }
    }
}

impl Display for ToolKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ToolKind::Setup => write!(f, "setup"),
            ToolKind::Test => write!(f, "tests"),
            ToolKind::TestCoverage => write!(f, "tests with coverage"),
            ToolKind::Lint => write!(f, "linters"),
        }
    }
}

/// Information needed to run a project command through the shell.
#[derive(Clone)]
pub struct ToolRunInfo {
    /// The path to the shell used to interpret commands.
    pub path_to_sh: PathBuf,

    /// The directory that commands are run in.
    pub working_directory: PathBuf,

    /// The environment variables that should be passed to the command.
    pub env: HashMap<OsString, OsString>,
}

impl std::fmt::Debug for ToolRunInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "<ToolRunInfo path_to_sh={:?} working_directory={:?} env=not shown>",
            self.path_to_sh, self.working_directory
        )
    }
}

impl ToolRunInfo {
    /// Locate a shell and capture the current environment. Returns `None` if
    /// no shell could be found.
    pub fn new(working_directory: PathBuf) -> Option<Self> {
        let path_to_sh = get_sh()?;
        Some(Self {
            path_to_sh,
            working_directory,
            env: std::env::vars_os().collect(),
        })
    }

    /// Build the full command line for `command` with `extra_args` appended.
    /// Each extra argument is quoted so that the shell passes it through
    /// verbatim.
    pub fn make_command_line(command: &str, extra_args: &[String]) -> String {
        if extra_args.is_empty() {
            command.to_string()
        } else {
            format!("{} {}", command, shell_words::join(extra_args))
        }
    }

    /// Run `command_line` with the shell, streaming its output to the user.
    ///
    /// Returns the exit code of the command (non-zero signifies error).
    #[instrument]
    #[must_use = "The return code for `ToolRunInfo::run` must be checked"]
    pub fn run(&self, effects: &Effects, command_line: &str) -> EyreExitOr<()> {
        let ToolRunInfo {
            path_to_sh,
            working_directory,
            env,
        } = self;

        let (effects, _progress) =
            effects.start_operation(OperationType::RunTool(Arc::new(command_line.to_string())));

        let mut child = Command::new(path_to_sh)
            .current_dir(working_directory)
            .arg("-c")
            .arg(command_line)
            .env_clear()
            .envs(env.iter())
            .stdin(Stdio::inherit())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .wrap_err_with(|| format!("Spawning shell for command: {command_line}"))?;

        let stdout = child.stdout.take();
        let stdout_thread = spawn_writer_thread(stdout, effects.get_output_stream());
        let stderr = child.stderr.take();
        let stderr_thread = spawn_writer_thread(stderr, effects.get_error_stream());

        let exit_status = child
            .wait()
            .wrap_err("Waiting for command to complete")?;
        join_writer_threads(vec![stdout_thread, stderr_thread])?;

        let exit_code =
            ExitCode::try_from(exit_status).wrap_err("Converting exit code from i32 to isize")?;
        if exit_code.is_success() {
            Ok(Ok(()))
        } else {
            Ok(Err(exit_code))
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::core::formatting::Glyphs;

    #[test]
    fn test_make_command_line() {
        assert_eq!(ToolRunInfo::make_command_line("pytest", &[]), "pytest");
        assert_eq!(
            ToolRunInfo::make_command_line(
                "pytest",
                &["-k".to_string(), "test foo".to_string(), "-x".to_string()]
            ),
            "pytest -k 'test foo' -x"
        );
    }

    #[test]
    fn test_default_commands() {
        assert_eq!(ToolKind::Test.default_command(), "pytest");
        assert_eq!(ToolKind::Lint.config_key(), "tidy.command.lint");
        assert_eq!(ToolKind::TestCoverage.to_string(), "tests with coverage");
    }

    #[cfg(unix)]
    #[test]
    fn test_run_captures_output_and_exit_code() -> eyre::Result<()> {
        let stdout = Arc::new(Mutex::new(Vec::new()));
        let stderr = Arc::new(Mutex::new(Vec::new()));
        let effects = Effects::new_from_buffer_for_test(Glyphs::text(), &stdout, &stderr);
        let temp_dir = tempfile::tempdir()?;
        let tool_run_info = ToolRunInfo::new(temp_dir.path().to_path_buf())
            .ok_or_else(|| eyre::eyre!("no shell"))?;

        assert_eq!(tool_run_info.run(&effects, "echo hello")?, Ok(()));
        assert_eq!(
            tool_run_info.run(&effects, "echo oops >&2; exit 3")?,
            Err(ExitCode(3))
        );

        assert_eq!(String::from_utf8(stdout.lock().unwrap().clone())?, "hello\n");
        assert_eq!(
            String::from_utf8(stderr.lock().unwrap().clone())?,
            "oops\n"
        );
        Ok(())
    }

    #[cfg(unix)]
    #[test]
    fn test_run_forwards_non_utf8_output() -> eyre::Result<()> {
        let stdout = Arc::new(Mutex::new(Vec::new()));
        let stderr = Arc::new(Mutex::new(Vec::new()));
        let effects = Effects::new_from_buffer_for_test(Glyphs::text(), &stdout, &stderr);
        let temp_dir = tempfile::tempdir()?;
        let tool_run_info = ToolRunInfo::new(temp_dir.path().to_path_buf())
            .ok_or_else(|| eyre::eyre!("no shell"))?;

        // The command keeps writing after the latin-1 line, so it would die
        // of SIGPIPE if the output pipe were closed early.
        assert_eq!(
            tool_run_info.run(
                &effects,
                "printf 'caf\\351\\n'; sleep 0.3; echo all tests passed; exit 0"
            )?,
            Ok(())
        );
        assert_eq!(
            String::from_utf8(stdout.lock().unwrap().clone())?,
            "caf\u{FFFD}\nall tests passed\n"
        );
        Ok(())
    }
}
