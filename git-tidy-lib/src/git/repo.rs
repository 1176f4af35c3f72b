//! Read-only access to the repository through `git2`.
//!
//! Everything which changes the repository goes through the `git` executable
//! instead (see [`super::GitRunInfo`]), so that hooks run and the user sees
//! what happened. Lookups which `git2` reports as `NotFound` come back as
//! `None` here.

use std::io;
use std::path::{Path, PathBuf};

use itertools::Itertools;
use thiserror::Error;
use tracing::{instrument, warn};

use crate::git::config::Config;
use crate::git::run::{GitRunInfo, GitRunOpts};
use crate::git::{Commit, NonZeroOid};

#[allow(missing_docs)]
#[derive(Debug, Error)]
pub enum Error {
    #[error("could not open repository: {0}")]
    OpenRepo(#[source] git2::Error),

    #[error("this repository does not have an associated working copy")]
    NoWorkingCopyPath,

    #[error("could not read config: {0}")]
    ReadConfig(#[source] git2::Error),

    #[error("could not calculate merge-base between {lhs} and {rhs}: {source}")]
    FindMergeBase {
        source: git2::Error,
        lhs: NonZeroOid,
        rhs: NonZeroOid,
    },

    #[error("could not find commit {oid}: {source}")]
    FindCommit {
        source: git2::Error,
        oid: NonZeroOid,
    },

    #[error("could not read reference {name}: {source}")]
    ReadReference { source: git2::Error, name: String },

    #[error("could not get remote names: {0}")]
    GetRemoteNames(#[source] git2::Error),

    #[error("could not find remote with name '{name}': {source}")]
    FindRemote { source: git2::Error, name: String },

    #[error("commit {head} does not descend from {base} along its first parents")]
    NotDescendant { base: NonZeroOid, head: NonZeroOid },

    #[error("could not execute git: {0}")]
    ExecGit(#[source] eyre::Error),

    #[error("the target of HEAD is not valid UTF-8")]
    DecodeHeadTarget,

    #[error("could not read the summary of commit {oid}")]
    ReadSummary { oid: NonZeroOid },

    #[error(transparent)]
    Git(git2::Error),

    #[error(transparent)]
    Io(io::Error),
}

/// Result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Turn a `git2::Error` into an `eyre::Error` which keeps its error code.
pub(super) fn wrap_git_error(error: git2::Error) -> eyre::Error {
    eyre::eyre!("Git error {:?}: {}", error.code(), error.message())
}

/// Where `HEAD` pointed when it was read.
///
/// On a branch, both fields are set. A detached `HEAD` has no
/// `reference_name`, and an unborn one (a fresh repository, or a branch
/// with no commits yet) has no `oid`.
#[derive(Debug, PartialEq, Eq)]
pub struct ResolvedReferenceInfo {
    /// The commit `HEAD` resolves to.
    pub oid: Option<NonZeroOid>,

    /// The reference `HEAD` points at, such as `refs/heads/feature`.
    pub reference_name: Option<String>,
}

impl ResolvedReferenceInfo {
    /// The short name of the checked-out branch. `None` when `HEAD` is
    /// detached or points outside `refs/heads/`.
    pub fn get_branch_name(&self) -> Option<&str> {
        self.reference_name
            .as_deref()
            .and_then(|name| name.strip_prefix("refs/heads/"))
    }
}

/// Wrapper around `git2::Repository`.
pub struct Repo {
    pub(super) inner: git2::Repository,
}

impl std::fmt::Debug for Repo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "<Git repository at: {:?}>", self.get_path())
    }
}

impl Repo {
    /// Get the Git repository associated with the given directory.
    #[instrument]
    pub fn from_dir(path: &Path) -> Result<Self> {
        let repo = git2::Repository::discover(path).map_err(Error::OpenRepo)?;
        Ok(Repo { inner: repo })
    }

    /// Get the Git repository associated with the current directory.
    #[instrument]
    pub fn from_current_dir() -> Result<Self> {
        let path = std::env::current_dir().map_err(Error::Io)?;
        Repo::from_dir(&path)
    }

    /// Get the path to the `.git` directory for the repository.
    pub fn get_path(&self) -> &Path {
        self.inner.path()
    }

    /// Get the path to the working copy for this repository. If the repository
    /// is bare (has no working copy), returns `None`.
    pub fn get_working_copy_path(&self) -> Option<PathBuf> {
        self.inner.workdir().map(|workdir| workdir.to_owned())
    }

    /// Like `get_working_copy_path`, but fails for bare repositories.
    pub fn get_working_copy_path_or_fail(&self) -> Result<PathBuf> {
        self.get_working_copy_path().ok_or(Error::NoWorkingCopyPath)
    }

    /// Get the configuration object for the repository.
    #[instrument]
    pub fn get_readonly_config(&self) -> Result<Config> {
        let config = self.inner.config().map_err(Error::ReadConfig)?;
        Ok(Config::from(config))
    }

    /// Get the OID and branch name for the repository's `HEAD` reference.
    #[instrument]
    pub fn get_head_info(&self) -> Result<ResolvedReferenceInfo> {
        let head = match self.inner.find_reference("HEAD") {
            Ok(head) => head,
            Err(err) if err.code() == git2::ErrorCode::NotFound => {
                return Ok(ResolvedReferenceInfo {
                    oid: None,
                    reference_name: None,
                })
            }
            Err(err) => {
                return Err(Error::ReadReference {
                    source: err,
                    name: "HEAD".to_string(),
                })
            }
        };

        let reference_name = match head.kind() {
            Some(git2::ReferenceType::Symbolic) => match head.symbolic_target() {
                Some(name) => Some(name.to_owned()),
                None => return Err(Error::DecodeHeadTarget),
            },
            Some(git2::ReferenceType::Direct) | None => None,
        };
        let oid = match head.resolve() {
            Ok(resolved) => resolved.target().map(|inner| NonZeroOid { inner }),
            // Unborn branch.
            Err(err) if err.code() == git2::ErrorCode::NotFound => None,
            Err(err) => {
                return Err(Error::ReadReference {
                    source: err,
                    name: "HEAD".to_string(),
                })
            }
        };
        Ok(ResolvedReferenceInfo {
            oid,
            reference_name,
        })
    }

    /// The multi-step operation, such as `rebase` or `cherry-pick`, which was
    /// started but not finished. `None` when the repository is idle.
    pub fn get_current_operation_type(&self) -> Option<&str> {
        use git2::RepositoryState::*;
        match self.inner.state() {
            Clean => None,
            Bisect => Some("bisect"),
            Merge => Some("merge"),
            Revert | RevertSequence => Some("revert"),
            CherryPick | CherryPickSequence => Some("cherry-pick"),
            Rebase | RebaseInteractive | RebaseMerge => Some("rebase"),
            ApplyMailbox | ApplyMailboxOrRebase => Some("am"),
        }
    }

    /// Find the merge-base between two commits. Returns `None` if a merge-base
    /// could not be found.
    #[instrument]
    pub fn find_merge_base(&self, lhs: NonZeroOid, rhs: NonZeroOid) -> Result<Option<NonZeroOid>> {
        match self.inner.merge_base(lhs.inner, rhs.inner) {
            Ok(merge_base_oid) => Ok(Some(NonZeroOid {
                inner: merge_base_oid,
            })),
            Err(err) if err.code() == git2::ErrorCode::NotFound => Ok(None),
            Err(err) => Err(Error::FindMergeBase {
                source: err,
                lhs,
                rhs,
            }),
        }
    }

    /// Determine whether `ancestor` is reachable from `descendant`. A commit
    /// counts as its own ancestor.
    #[instrument]
    pub fn is_ancestor(&self, ancestor: NonZeroOid, descendant: NonZeroOid) -> Result<bool> {
        if ancestor == descendant {
            return Ok(true);
        }
        self.inner
            .graph_descendant_of(descendant.inner, ancestor.inner)
            .map_err(Error::Git)
    }

    /// The commit that the fully-qualified reference `name` (such as
    /// `refs/remotes/origin/main`) points to, or `None` if there is no such
    /// reference.
    #[instrument]
    pub fn find_reference_commit_oid(&self, name: &str) -> Result<Option<NonZeroOid>> {
        let reference = match self.inner.find_reference(name) {
            Ok(reference) => reference,
            Err(err) if err.code() == git2::ErrorCode::NotFound => return Ok(None),
            Err(err) => {
                return Err(Error::ReadReference {
                    source: err,
                    name: name.to_owned(),
                })
            }
        };
        let commit = reference
            .peel_to_commit()
            .map_err(|err| Error::ReadReference {
                source: err,
                name: name.to_owned(),
            })?;
        Ok(Some(NonZeroOid {
            inner: commit.id(),
        }))
    }

    /// Look up a commit which is known to exist.
    #[instrument]
    pub fn find_commit_or_fail(&self, oid: NonZeroOid) -> Result<Commit<'_>> {
        match self.inner.find_commit(oid.inner) {
            Ok(commit) => Ok(Commit { inner: commit }),
            Err(err) => Err(Error::FindCommit { source: err, oid }),
        }
    }

    /// Get the commits reachable from `head` but not from `base`, walking
    /// first parents only. The result is ordered oldest first.
    ///
    /// `base` must be an ancestor of `head` along its first-parent chain.
    #[instrument]
    pub fn get_commits_between(
        &self,
        base: NonZeroOid,
        head: NonZeroOid,
    ) -> Result<Vec<Commit<'_>>> {
        let mut commits = Vec::new();
        let mut current = self.find_commit_or_fail(head)?;
        while current.get_oid() != base {
            let parent = match current.get_first_parent() {
                Some(parent) => parent,
                None => return Err(Error::NotDescendant { base, head }),
            };
            commits.push(current);
            current = parent;
        }
        commits.reverse();
        Ok(commits)
    }

    /// Get a list of all remote names.
    #[instrument]
    pub fn get_all_remote_names(&self) -> Result<Vec<String>> {
        let remotes = self.inner.remotes().map_err(Error::GetRemoteNames)?;
        Ok(remotes
            .into_iter()
            .enumerate()
            .filter_map(|(i, remote_name)| match remote_name {
                Some(remote_name) => Some(remote_name.to_owned()),
                None => {
                    warn!(remote_index = i, "Remote name could not be decoded");
                    None
                }
            })
            .sorted()
            .collect())
    }

    /// Get the fetch URL of the given remote. Returns `None` if there is no
    /// such remote, or if it has no URL.
    #[instrument]
    pub fn find_remote_url(&self, name: &str) -> Result<Option<String>> {
        match self.inner.find_remote(name) {
            Ok(remote) => Ok(remote.url().map(|url| url.to_owned())),
            Err(err) if err.code() == git2::ErrorCode::NotFound => Ok(None),
            Err(err) if err.code() == git2::ErrorCode::InvalidSpec => Ok(None),
            Err(err) => Err(Error::FindRemote {
                source: err,
                name: name.to_owned(),
            }),
        }
    }

    /// Determine whether any tracked file differs from `HEAD`, in either the
    /// index or the working copy. Untracked files are not considered.
    ///
    /// Shells out so that the stat cache is refreshed the same way that
    /// `git status` would refresh it.
    #[instrument]
    pub fn has_uncommitted_changes(&self, git_run_info: &GitRunInfo) -> Result<bool> {
        // Refreshing reports modified files via its exit code, but we only
        // care about its side effect on the index.
        let _refresh = git_run_info
            .run_silent(
                self,
                &["update-index", "-q", "--refresh"],
                GitRunOpts {
                    treat_git_failure_as_error: false,
                },
            )
            .map_err(Error::ExecGit)?;
        let result = git_run_info
            .run_silent(
                self,
                &["diff-index", "--quiet", "HEAD", "--"],
                GitRunOpts {
                    treat_git_failure_as_error: false,
                },
            )
            .map_err(Error::ExecGit)?;
        Ok(!result.exit_code.is_success())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_branch_name_from_head_info() {
        let head_info = ResolvedReferenceInfo {
            oid: None,
            reference_name: Some("refs/heads/feature".to_string()),
        };
        assert_eq!(head_info.get_branch_name(), Some("feature"));

        let head_info = ResolvedReferenceInfo {
            oid: None,
            reference_name: Some("refs/remotes/origin/feature".to_string()),
        };
        assert_eq!(head_info.get_branch_name(), None);

        let head_info = ResolvedReferenceInfo {
            oid: None,
            reference_name: None,
        };
        assert_eq!(head_info.get_branch_name(), None);
    }
}
