//! Utility functions.

use std::num::TryFromIntError;
use std::path::PathBuf;
use std::process::ExitStatus;

/// Represents the code to exit the process with.
#[must_use]
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct ExitCode(pub isize);

impl ExitCode {
    /// Return an exit code corresponding to success.
    pub fn success() -> Self {
        Self(0)
    }

    /// Determine whether or not this exit code represents a successful
    /// termination.
    pub fn is_success(&self) -> bool {
        match self {
            ExitCode(0) => true,
            ExitCode(_) => false,
        }
    }
}

impl TryFrom<ExitStatus> for ExitCode {
    type Error = TryFromIntError;

    fn try_from(status: ExitStatus) -> Result<Self, Self::Error> {
        // On Unix, a process terminated by a signal has no exit code. Treat
        // that as a plain failure.
        let exit_code = status.code().unwrap_or(1);
        Ok(Self(exit_code.try_into()?))
    }
}

/// Encapsulate both an `eyre::Result<T>` and a possible subcommand exit code.
///
/// The outer `Err` is an unexpected failure. The inner `Err` is a deliberate
/// non-zero exit, which has usually already been reported to the user.
pub type EyreExitOr<T> = eyre::Result<Result<T, ExitCode>>;

/// Macro to propagate `ExitCode`s in the same way as the `?` operator.
///
/// ```
/// # use tidy::try_exit_code;
/// # use tidy::util::{ExitCode, EyreExitOr};
/// fn inner() -> EyreExitOr<u32> {
///     Ok(Err(ExitCode(3)))
/// }
///
/// fn outer() -> EyreExitOr<u32> {
///     let value = try_exit_code!(inner()?);
///     Ok(Ok(value + 1))
/// }
///
/// assert_eq!(outer().unwrap(), Err(ExitCode(3)));
/// ```
#[macro_export]
macro_rules! try_exit_code {
    ($e:expr) => {
        match $e {
            Ok(value) => value,
            Err(exit_code) => {
                return Ok(Err(exit_code));
            }
        }
    };
}

/// Returns a path for a given file, searching through PATH to find it.
pub fn get_from_path(exe_name: &str) -> Option<PathBuf> {
    std::env::var_os("PATH").and_then(|paths| {
        std::env::split_paths(&paths).find_map(|dir| {
            let exe_path = dir.join(exe_name);
            if exe_path.is_file() {
                Some(exe_path)
            } else {
                None
            }
        })
    })
}

/// Returns the path to a shell suitable for running project commands.
pub fn get_sh() -> Option<PathBuf> {
    let exe_name = if cfg!(target_os = "windows") {
        "bash.exe"
    } else {
        "sh"
    };
    // On Windows, prefer the `bash` which ships alongside `git.exe`, since it's
    // usually not on `PATH` itself.
    if cfg!(target_os = "windows") {
        if let Some(git_bash) = get_from_path("git.exe")
            .as_deref()
            .and_then(|git_path| git_path.parent())
            .and_then(|cmd_dir| cmd_dir.parent())
            .map(|git_dir| git_dir.join("bin").join(exe_name))
        {
            if git_bash.is_file() {
                return Some(git_bash);
            }
        }
    }
    get_from_path(exe_name)
}
