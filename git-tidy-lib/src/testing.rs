//! Testing utilities.
//!
//! This is inside `src` rather than `tests` since we use this code in some unit
//! tests.

use std::collections::{BTreeMap, HashMap};
use std::ffi::OsString;
use std::io::Write;
use std::ops::Deref;
use std::path::PathBuf;
use std::process::{Command, Stdio};

use crate::core::config::env_vars::{get_git_exec_path, get_path_to_git, TEST_GIT};
use crate::git::{GitRunInfo, NonZeroOid, Repo};
use crate::util::get_sh;

use eyre::Context;
use itertools::Itertools;
use lazy_static::lazy_static;
use once_cell::sync::OnceCell;
use regex::{Captures, Regex};
use tempfile::TempDir;
use tracing::instrument;

const DUMMY_NAME: &str = "Testy McTestface";
const DUMMY_EMAIL: &str = "test@example.com";
const DUMMY_DATE: &str = "Wed 29 Oct 12:34:56 2020 PDT";

/// Wrapper around the Git executable, for testing.
#[derive(Clone, Debug)]
pub struct Git {
    /// The path to the repository on disk. The directory itself must exist,
    /// although it might not have a `.git` folder in it. (Use `Git::init_repo`
    /// to initialize it.)
    pub repo_path: PathBuf,

    /// The path to the Git executable on disk. This is important since we test
    /// against multiple Git versions.
    pub path_to_git: PathBuf,

    /// The `GIT_EXEC_PATH` environment variable value to use for testing.
    pub git_exec_path: PathBuf,
}

/// Options for `Git::run_with_options`.
#[derive(Debug, Default)]
pub struct GitRunOptions {
    /// The timestamp of the command. Mostly useful for `git commit`. This should
    /// be a number like 0, 1, 2, 3...
    pub time: isize,

    /// The exit code that `Git` should return.
    pub expected_exit_code: i32,

    /// The input to write to the child process's stdin.
    pub input: Option<String>,

    /// Additional environment variables to start the process with.
    pub env: HashMap<String, String>,
}

impl Git {
    /// Constructor.
    pub fn new(path_to_git: PathBuf, repo_path: PathBuf, git_exec_path: PathBuf) -> Self {
        Git {
            repo_path,
            path_to_git,
            git_exec_path,
        }
    }

    /// Make output comparable across runs: the Git executable and the
    /// repository path are replaced by placeholders, and any line which a
    /// terminal would have overwritten (by `\r` or an erase-in-line escape)
    /// is dropped.
    pub fn preprocess_output(&self, output: String) -> eyre::Result<String> {
        lazy_static! {
            static ref OVERWRITTEN_LINE_RE: Regex =
                Regex::new(r"(^|\n).*(\r|\x1B\[K)").expect("Compiling overwritten-line regex");
        }

        let path_to_git = self
            .path_to_git
            .to_str()
            .ok_or_else(|| eyre::eyre!("Path to Git is not UTF-8: {:?}", self.path_to_git))?;
        // Not expected to work on Windows, where canonical paths look different.
        let repo_path = std::fs::canonicalize(&self.repo_path)?;
        let repo_path = repo_path
            .to_str()
            .ok_or_else(|| eyre::eyre!("Repo path is not UTF-8: {repo_path:?}"))?;

        let output = output
            .replace(path_to_git, "<git-executable>")
            .replace(repo_path, "<repo-path>");
        let output = OVERWRITTEN_LINE_RE
            .replace_all(&output, |captures: &Captures| captures[1].to_string())
            .into_owned();
        Ok(output)
    }

    /// Get the `PATH` environment variable to use for testing.
    pub fn get_path_for_env(&self) -> eyre::Result<OsString> {
        let cargo_bin_path = assert_cmd::cargo::cargo_bin("git-tidy");
        let tidy_path = cargo_bin_path
            .parent()
            .ok_or_else(|| eyre::eyre!("Unable to find git-tidy path parent"))?;
        let sh = get_sh().ok_or_else(|| eyre::eyre!("Could not find sh on PATH"))?;
        let sh_path = sh
            .parent()
            .ok_or_else(|| eyre::eyre!("Unable to find sh path parent"))?;
        let path_to_git_dir = self
            .path_to_git
            .parent()
            .ok_or_else(|| eyre::eyre!("Unable to find Git path parent"))?;
        let path = std::env::join_paths(vec![
            // For Git to be able to launch `git-tidy`.
            tidy_path.as_os_str(),
            // For `git-tidy` to run Git itself without `TEST_GIT`.
            path_to_git_dir.as_os_str(),
            self.git_exec_path.as_os_str(),
            // For project commands to be run through the shell.
            sh_path.as_os_str(),
        ])
        .wrap_err("Joining paths")?;
        Ok(path)
    }

    /// The whole environment for a Git process in a test. Commit dates are
    /// fixed by `time`, so that hashes come out the same on every run.
    pub fn get_base_env(&self, time: isize) -> eyre::Result<Vec<(OsString, OsString)>> {
        let date = OsString::from(format!("{DUMMY_DATE} -{time:0>2}"));
        Ok(vec![
            ("GIT_CONFIG_NOSYSTEM".into(), "1".into()),
            ("GIT_AUTHOR_DATE".into(), date.clone()),
            ("GIT_COMMITTER_DATE".into(), date),
            // Accept whatever message Git proposes, e.g. during a rebase.
            ("GIT_EDITOR".into(), ":".into()),
            ("GIT_EXEC_PATH".into(), self.git_exec_path.clone().into()),
            ("PATH".into(), self.get_path_for_env()?),
            (TEST_GIT.into(), self.path_to_git.clone().into()),
        ])
    }

    #[instrument]
    fn run_with_options_inner(
        &self,
        args: &[&str],
        options: &GitRunOptions,
    ) -> eyre::Result<(String, String)> {
        let GitRunOptions {
            time,
            expected_exit_code,
            input,
            env,
        } = options;

        let env: BTreeMap<OsString, OsString> = self
            .get_base_env(*time)?
            .into_iter()
            .chain(env.iter().map(|(key, value)| (key.into(), value.into())))
            .collect();
        let mut child = Command::new(&self.path_to_git)
            .current_dir(&self.repo_path)
            .args(args)
            .env_clear()
            .envs(&env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .wrap_err_with(|| format!("Spawning {:?} {args:?}", self.path_to_git))?;

        // Close stdin even without input, so that prompts see end-of-file.
        {
            let mut stdin = child
                .stdin
                .take()
                .ok_or_else(|| eyre::eyre!("Child stdin was not piped"))?;
            if let Some(input) = input {
                stdin.write_all(input.as_bytes())?;
            }
        }
        let output = child
            .wait_with_output()
            .wrap_err_with(|| format!("Waiting for git {args:?} (stdin: {input:?})"))?;

        let stdout = String::from_utf8(output.stdout)?;
        let stderr = String::from_utf8(output.stderr)?;
        let exit_code = output
            .status
            .code()
            .ok_or_else(|| eyre::eyre!("Git was terminated by a signal: git {args:?}"))?;
        if exit_code != *expected_exit_code {
            eyre::bail!(
                "git {args:?} exited with code {exit_code}, expected {expected_exit_code}\nenv:\n{env:#?}\nstdout:\n{stdout}\nstderr:\n{stderr}"
            );
        }
        Ok((self.preprocess_output(stdout)?, self.preprocess_output(stderr)?))
    }

    /// Run Git with `args`, failing unless it exits with
    /// `options.expected_exit_code`. Returns the preprocessed stdout and
    /// stderr.
    pub fn run_with_options<S: AsRef<str> + std::fmt::Debug>(
        &self,
        args: &[S],
        options: &GitRunOptions,
    ) -> eyre::Result<(String, String)> {
        let args = args.iter().map(|arg| arg.as_ref()).collect_vec();
        self.run_with_options_inner(&args, options)
    }

    /// Run Git with `args`, expecting success.
    pub fn run<S: AsRef<str> + std::fmt::Debug>(
        &self,
        args: &[S],
    ) -> eyre::Result<(String, String)> {
        if args.first().map(|arg| arg.as_ref()) == Some("tidy") {
            eyre::bail!("Use `Git::tidy` to run `git tidy`, not `Git::run`");
        }
        self.run_with_options(args, &Default::default())
    }

    /// Run `git tidy <subcommand> <args>`, expecting success.
    #[instrument]
    pub fn tidy(&self, subcommand: &str, args: &[&str]) -> eyre::Result<(String, String)> {
        self.tidy_with_options(subcommand, args, &Default::default())
    }

    /// Run `git tidy <subcommand> <args>`. Git finds `git-tidy` through the
    /// `PATH` from [`Git::get_path_for_env`].
    #[instrument]
    pub fn tidy_with_options(
        &self,
        subcommand: &str,
        args: &[&str],
        options: &GitRunOptions,
    ) -> eyre::Result<(String, String)> {
        let args = ["tidy", subcommand]
            .into_iter()
            .chain(args.iter().copied())
            .collect_vec();
        self.run_with_options_inner(&args, options)
    }

    /// Initialize a repository on `main`, with `initial.txt` committed at
    /// time 0. The `init.defaultBranch` of whoever runs the tests is ignored.
    #[instrument]
    pub fn init_repo(&self) -> eyre::Result<()> {
        self.run(&["init"])?;
        self.run(&["symbolic-ref", "HEAD", "refs/heads/main"])?;
        self.set_identity()?;
        self.run(&["config", "core.autocrlf", "false"])?;
        self.commit_file("initial", 0)?;
        Ok(())
    }

    fn set_identity(&self) -> eyre::Result<()> {
        self.run(&["config", "user.name", DUMMY_NAME])?;
        self.run(&["config", "user.email", DUMMY_EMAIL])?;
        Ok(())
    }

    /// Clone this repository into `target`, whose directory must not exist
    /// yet. The clone's `origin` is a `file://` URL.
    pub fn clone_repo_into(&self, target: &Git) -> eyre::Result<()> {
        let remote_url = format!("file://{}", self.repo_path.display());
        let target_path = target
            .repo_path
            .to_str()
            .ok_or_else(|| eyre::eyre!("Target path is not UTF-8: {:?}", target.repo_path))?;
        self.run(&[
            "clone",
            "-c",
            "core.autocrlf=false",
            &remote_url,
            target_path,
        ])?;
        target.set_identity()
    }

    /// Write `<name>.txt` in the working copy.
    pub fn write_file_txt(&self, name: &str, contents: &str) -> eyre::Result<()> {
        self.write_file(&format!("{name}.txt"), contents)
    }

    /// Write a file in the working copy, creating parent directories as
    /// needed.
    pub fn write_file(&self, name: &str, contents: &str) -> eyre::Result<()> {
        let path = self.repo_path.join(name);
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)?;
        }
        std::fs::write(&path, contents)?;
        Ok(())
    }

    /// Write `<name>.txt` with `contents` and commit everything as
    /// "create <name>.txt". `time` fixes the commit date, and so the hash.
    #[instrument]
    pub fn commit_file_with_contents(
        &self,
        name: &str,
        time: isize,
        contents: &str,
    ) -> eyre::Result<NonZeroOid> {
        self.write_file_txt(name, contents)?;
        self.run(&["add", "."])?;
        self.run_with_options(
            &["commit", "-m", &format!("create {name}.txt")],
            &GitRunOptions {
                time,
                ..Default::default()
            },
        )?;
        self.get_repo()?
            .get_head_info()?
            .oid
            .ok_or_else(|| eyre::eyre!("HEAD is unborn after committing {name}.txt"))
    }

    /// Like [`Git::commit_file_with_contents`], with `<name> contents` as the
    /// contents.
    pub fn commit_file(&self, name: &str, time: isize) -> eyre::Result<NonZeroOid> {
        self.commit_file_with_contents(name, time, &format!("{name} contents\n"))
    }

    /// Check out the current commit without a branch.
    pub fn detach_head(&self) -> eyre::Result<()> {
        self.run(&["checkout", "--detach"])?;
        Ok(())
    }

    /// Open the repository with `git2`.
    pub fn get_repo(&self) -> eyre::Result<Repo> {
        Ok(Repo::from_dir(&self.repo_path)?)
    }

    /// A [`GitRunInfo`] for running Git in this repository from library code,
    /// with the same environment that [`Git::run`] uses at time 0.
    pub fn get_git_run_info(&self) -> eyre::Result<GitRunInfo> {
        Ok(GitRunInfo {
            path_to_git: self.path_to_git.clone(),
            working_directory: self.repo_path.clone(),
            env: self.get_base_env(0)?.into_iter().collect(),
        })
    }

    /// Get the subjects of the commits on the current branch, newest first.
    pub fn log_subjects(&self) -> eyre::Result<String> {
        let (stdout, _stderr) = self.run(&["log", "--format=%s"])?;
        Ok(stdout)
    }
}

/// A [`Git`] whose repository lives in a temporary directory, removed on
/// drop.
pub struct GitWrapper {
    _repo_dir: TempDir,
    git: Git,
}

impl Deref for GitWrapper {
    type Target = Git;

    fn deref(&self) -> &Self::Target {
        &self.git
    }
}

static COLOR_EYRE_INSTALL: OnceCell<()> = OnceCell::new();

/// Locate Git for a test and point it at `repo_path`. Also installs the
/// `color-eyre` report handler, once per test binary.
fn make_git_at(repo_path: PathBuf) -> eyre::Result<Git> {
    COLOR_EYRE_INSTALL.get_or_try_init(color_eyre::install)?;
    Ok(Git::new(get_path_to_git()?, repo_path, get_git_exec_path()?))
}

/// Create a temporary directory and a `Git` for it. The repository is not
/// initialized; call [`Git::init_repo`].
pub fn make_git() -> eyre::Result<GitWrapper> {
    let repo_dir = tempfile::tempdir()?;
    let git = make_git_at(repo_dir.path().to_path_buf())?;
    Ok(GitWrapper {
        _repo_dir: repo_dir,
        git,
    })
}

/// An `original` repository standing in for the remote, and a `cloned`
/// directory for a clone of it, in one temporary directory.
pub struct GitWrapperWithRemoteRepo {
    /// Removes both repositories when dropped, so bind it to a named
    /// variable (not `_`).
    pub temp_dir: TempDir,

    /// The repository acting as the remote. Initialize it with
    /// [`Git::init_repo`].
    pub original_repo: Git,

    /// Where the clone goes. Create it with [`Git::clone_repo_into`].
    pub cloned_repo: Git,
}

/// Create a [`GitWrapperWithRemoteRepo`].
pub fn make_git_with_remote_repo() -> eyre::Result<GitWrapperWithRemoteRepo> {
    let temp_dir = tempfile::tempdir()?;
    let original_repo_path = temp_dir.path().join("original");
    std::fs::create_dir_all(&original_repo_path)?;
    let original_repo = make_git_at(original_repo_path)?;
    let cloned_repo = make_git_at(temp_dir.path().join("cloned"))?;
    Ok(GitWrapperWithRemoteRepo {
        temp_dir,
        original_repo,
        cloned_repo,
    })
}
