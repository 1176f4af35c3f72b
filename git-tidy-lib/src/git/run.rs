use std::collections::HashMap;
use std::ffi::{OsStr, OsString};
use std::fmt::Write;
use std::io::{BufRead, BufReader, Read};
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use eyre::{eyre, Context};
use itertools::Itertools;
use tracing::{instrument, warn};

use crate::core::effects::{Effects, OperationType};
use crate::git::repo::Repo;
use crate::util::{ExitCode, EyreExitOr};

/// How to launch Git as a subprocess.
#[derive(Clone)]
pub struct GitRunInfo {
    /// The Git executable.
    pub path_to_git: PathBuf,

    /// The directory Git is started in.
    pub working_directory: PathBuf,

    /// The complete environment of the Git process. Nothing else is
    /// inherited.
    pub env: HashMap<OsString, OsString>,
}

impl std::fmt::Debug for GitRunInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "<GitRunInfo path_to_git={:?} working_directory={:?} env=not shown>",
            self.path_to_git, self.working_directory
        )
    }
}

/// Options for [`GitRunInfo::run_silent`].
#[derive(Debug)]
pub struct GitRunOpts {
    /// Turn a non-zero exit code into an `Err`. Disable this for plumbing
    /// commands which report their answer through the exit code.
    pub treat_git_failure_as_error: bool,
}

impl Default for GitRunOpts {
    fn default() -> Self {
        Self {
            treat_git_failure_as_error: true,
        }
    }
}

/// The captured result of [`GitRunInfo::run_silent`].
#[must_use]
pub struct GitRunResult {
    /// The exit code of the process.
    pub exit_code: ExitCode,

    /// Everything written to stdout.
    pub stdout: Vec<u8>,

    /// Everything written to stderr.
    pub stderr: Vec<u8>,
}

impl std::fmt::Debug for GitRunResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GitRunResult")
            .field("exit_code", &self.exit_code)
            .field("stdout", &String::from_utf8_lossy(&self.stdout))
            .field("stderr", &String::from_utf8_lossy(&self.stderr))
            .finish()
    }
}

/// Forward a subprocess's output stream, one line at a time, into one of the
/// `Effects` streams so that it doesn't tear through progress spinners.
///
/// Lines need not be valid UTF-8. The pipe is drained until EOF even if
/// writing fails, so the subprocess never sees a closed pipe.
pub(crate) fn spawn_writer_thread<
    InputStream: Read + Send + 'static,
    OutputStream: Write + Send + 'static,
>(
    stream: Option<InputStream>,
    mut output: OutputStream,
) -> JoinHandle<()> {
    thread::spawn(move || {
        let Some(stream) = stream else {
            return;
        };
        let mut reader = BufReader::new(stream);
        let mut line = Vec::new();
        let mut is_output_open = true;
        loop {
            line.clear();
            match reader.read_until(b'\n', &mut line) {
                Ok(0) => break,
                Ok(_) => {
                    if is_output_open {
                        let line = line.strip_suffix(b"\n").unwrap_or(&line);
                        let text = String::from_utf8_lossy(line);
                        if let Err(err) = writeln!(output, "{text}") {
                            warn!(?err, "Could not forward subprocess output");
                            is_output_open = false;
                        }
                    }
                }
                Err(err) if err.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(err) => {
                    warn!(?err, "Could not read subprocess output");
                    break;
                }
            }
        }
    })
}

/// Wait until every line forwarded by [`spawn_writer_thread`] is written.
pub(crate) fn join_writer_threads(threads: Vec<JoinHandle<()>>) -> eyre::Result<()> {
    for thread in threads {
        thread
            .join()
            .map_err(|_| eyre!("Subprocess output thread panicked"))?;
    }
    Ok(())
}

impl GitRunInfo {
    fn make_command<S: AsRef<OsStr>>(&self, args: &[S]) -> Command {
        let mut command = Command::new(&self.path_to_git);
        command
            .current_dir(&self.working_directory)
            .args(args)
            .env_clear()
            .envs(self.env.iter())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        command
    }

    /// Run Git where the user can see it: the command line is announced on
    /// stdout and Git's own output is streamed through `effects`.
    ///
    /// Use this for anything which changes the repository, so that Git runs
    /// its hooks and the user can follow along.
    ///
    /// Returns Git's exit code (non-zero signifies error).
    #[instrument]
    #[must_use = "The return code for `GitRunInfo::run` must be checked"]
    pub fn run<S: AsRef<OsStr> + std::fmt::Debug>(
        &self,
        effects: &Effects,
        args: &[S],
    ) -> EyreExitOr<()> {
        let args_string = args
            .iter()
            .map(|arg| arg.as_ref().to_string_lossy())
            .join(" ");
        let (effects, _progress) = effects.start_operation(OperationType::RunGitCommand(
            Arc::new(format!("git {args_string}")),
        ));
        writeln!(
            effects.get_output_stream(),
            "tidy: running command: {} {}",
            self.path_to_git.to_string_lossy(),
            args_string
        )?;

        let mut child = self
            .make_command(args)
            .stdin(Stdio::inherit())
            .spawn()
            .wrap_err_with(|| format!("Spawning Git subprocess: git {args_string}"))?;
        let stdout_thread = spawn_writer_thread(child.stdout.take(), effects.get_output_stream());
        let stderr_thread = spawn_writer_thread(child.stderr.take(), effects.get_error_stream());
        let exit_status = child
            .wait()
            .wrap_err("Waiting for Git subprocess to complete")?;
        join_writer_threads(vec![stdout_thread, stderr_thread])?;

        let exit_code = ExitCode::try_from(exit_status)?;
        if exit_code.is_success() {
            Ok(Ok(()))
        } else {
            Ok(Err(exit_code))
        }
    }

    /// Run Git against `repo` and capture its output instead of showing it.
    ///
    /// Prefer `git2` where it can answer the question.
    #[instrument]
    pub fn run_silent(
        &self,
        repo: &Repo,
        args: &[&str],
        opts: GitRunOpts,
    ) -> eyre::Result<GitRunResult> {
        let GitRunOpts {
            treat_git_failure_as_error,
        } = opts;

        // Plumbing like `diff-index` needs to run in the working copy rather
        // than the `.git` directory.
        let repo_dir = repo
            .get_working_copy_path()
            .unwrap_or_else(|| repo.get_path().to_owned());
        let mut full_args: Vec<&OsStr> = vec![OsStr::new("-C"), repo_dir.as_os_str()];
        full_args.extend(args.iter().map(OsStr::new));

        let output = self
            .make_command(&full_args)
            .output()
            .wrap_err_with(|| format!("Running Git subprocess: {args:?}"))?;
        let result = GitRunResult {
            exit_code: ExitCode::try_from(output.status)?,
            stdout: output.stdout,
            stderr: output.stderr,
        };
        if treat_git_failure_as_error && !result.exit_code.is_success() {
            eyre::bail!("Git subprocess failed:\nArgs: {args:?}\nResult: {result:?}");
        }
        Ok(result)
    }
}
