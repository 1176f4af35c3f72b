//! History hygiene for a feature branch: rebasing it onto the latest upstream
//! main branch, and squashing its commits into one.
//!
//! Both commands rewrite history, so they first check that the branch is in a
//! state where that is safe (see [`check_branch_preconditions`]).

#![warn(missing_docs)]
#![warn(
    clippy::all,
    clippy::as_conversions,
    clippy::clone_on_ref_ptr,
    clippy::dbg_macro
)]
#![allow(clippy::too_many_arguments, clippy::blocks_in_conditions)]

use std::fmt::Write;
use std::io::Read;

use cursive_core::theme::Effect;
use git_tidy_invoke::CommandContext;
use git_tidy_opts::{SquashArgs, SyncArgs};
use itertools::Itertools;
use lib::core::config::{get_main_branch_name, get_upstream_remote_name};
use lib::core::effects::{Effects, OperationType};
use lib::core::formatting::{make_status_line, Pluralize, StatusKind, StyledStringBuilder};
use lib::core::prompt::prompt_confirmation;
use lib::git::{GitRunInfo, NonZeroOid, Repo, RepoError};
use lib::try_exit_code;
use lib::util::{ExitCode, EyreExitOr};
use tracing::{debug, instrument};

/// The branch that a history-rewriting command operates on, as validated by
/// [`check_branch_preconditions`].
#[derive(Clone, Debug)]
pub struct BranchState {
    /// The name of the checked-out branch, without the `refs/heads/` prefix.
    pub branch_name: String,

    /// The name of the main branch, which the branch is synced onto.
    pub main_branch_name: String,
}

/// The commit that the current branch is synced onto.
#[derive(Clone, Debug)]
pub struct SyncTarget {
    /// How to refer to the commit, such as `origin/main` or `main`.
    pub name: String,

    /// The commit itself.
    pub oid: NonZeroOid,
}

/// What `squash` ended up doing.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SquashOutcome {
    /// There were fewer than two commits ahead of the target, so the branch
    /// was left alone.
    NothingToSquash {
        /// The number of commits ahead of the target (zero or one).
        num_commits: usize,
    },

    /// The commits were replaced by a single commit.
    Squashed {
        /// The number of commits which were combined.
        num_commits: usize,

        /// The newly-created commit.
        commit_oid: NonZeroOid,
    },
}

/// Options for [`squash`].
#[derive(Clone, Debug, Default)]
pub struct SquashOptions {
    /// The message for the squashed commit. If not set, one is built from the
    /// summaries of the squashed commits.
    pub message: Option<String>,

    /// Don't ask before squashing.
    pub skip_confirmation: bool,
}

fn print_error(effects: &Effects, message: impl AsRef<str>) -> eyre::Result<()> {
    writeln!(
        effects.get_error_stream(),
        "{}",
        effects
            .get_glyphs()
            .render(make_status_line(StatusKind::Error, message))?
    )?;
    Ok(())
}

fn print_status(effects: &Effects, kind: StatusKind, message: impl AsRef<str>) -> eyre::Result<()> {
    writeln!(
        effects.get_output_stream(),
        "{}",
        effects.get_glyphs().render(make_status_line(kind, message))?
    )?;
    Ok(())
}

/// Open the repository containing the current directory, or report that
/// there is none.
#[instrument]
pub fn open_repo(effects: &Effects) -> EyreExitOr<Repo> {
    match Repo::from_current_dir() {
        Ok(repo) => Ok(Ok(repo)),
        Err(err) => {
            debug!(?err, "Could not open repository");
            print_error(effects, "Not inside a Git repository.")?;
            Ok(Err(ExitCode(1)))
        }
    }
}

fn get_head_oid(repo: &Repo) -> eyre::Result<NonZeroOid> {
    repo.get_head_info()?
        .oid
        .ok_or_else(|| eyre::eyre!("HEAD no longer points to a commit"))
}

/// Check that the repository is in a state where the current branch's
/// history may be rewritten:
///
/// - it has a working copy,
/// - no rebase, merge or similar operation is in progress,
/// - a branch is checked out, and it isn't the main branch,
/// - there are no uncommitted changes to tracked files.
///
/// The first failed check is reported to the user and results in exit code 1.
#[instrument]
pub fn check_branch_preconditions(
    effects: &Effects,
    git_run_info: &GitRunInfo,
    repo: &Repo,
) -> EyreExitOr<BranchState> {
    if repo.get_working_copy_path().is_none() {
        print_error(effects, "This repository has no working copy.")?;
        return Ok(Err(ExitCode(1)));
    }

    if let Some(operation_type) = repo.get_current_operation_type() {
        print_error(
            effects,
            format!(
                "A {operation_type} is in progress. Finish or abort it before continuing."
            ),
        )?;
        return Ok(Err(ExitCode(1)));
    }

    let head_info = repo.get_head_info()?;
    let branch_name = match (head_info.oid, head_info.get_branch_name()) {
        (Some(_), Some(branch_name)) => branch_name.to_owned(),
        (None, _) => {
            print_error(effects, "HEAD is unborn. Make a commit first.")?;
            return Ok(Err(ExitCode(1)));
        }
        (Some(_), None) => {
            print_error(effects, "HEAD is detached. Check out a feature branch first.")?;
            return Ok(Err(ExitCode(1)));
        }
    };

    let main_branch_name = get_main_branch_name(repo)?;
    if branch_name == main_branch_name {
        print_error(
            effects,
            format!(
                "Refusing to rewrite the main branch '{main_branch_name}'. Check out a feature branch first."
            ),
        )?;
        return Ok(Err(ExitCode(1)));
    }

    let has_uncommitted_changes = {
        let (_effects, _progress) = effects.start_operation(OperationType::QueryWorkingCopy);
        repo.has_uncommitted_changes(git_run_info)?
    };
    if has_uncommitted_changes {
        print_error(
            effects,
            "You have uncommitted changes to tracked files. Commit or stash them first.",
        )?;
        return Ok(Err(ExitCode(1)));
    }

    Ok(Ok(BranchState {
        branch_name,
        main_branch_name,
    }))
}

/// Find the commit that the branch should be synced onto: the upstream
/// remote's copy of the main branch if it is known, or else the local main
/// branch. Returns `None` if neither exists.
#[instrument]
pub fn resolve_sync_target(
    repo: &Repo,
    main_branch_name: &str,
) -> eyre::Result<Option<SyncTarget>> {
    let upstream_remote_name = get_upstream_remote_name(repo)?;
    let candidates = [
        (
            format!("refs/remotes/{upstream_remote_name}/{main_branch_name}"),
            format!("{upstream_remote_name}/{main_branch_name}"),
        ),
        (
            format!("refs/heads/{main_branch_name}"),
            main_branch_name.to_owned(),
        ),
    ];
    for (reference_name, name) in candidates {
        if let Some(oid) = repo.find_reference_commit_oid(&reference_name)? {
            return Ok(Some(SyncTarget { name, oid }));
        }
    }
    Ok(None)
}

fn resolve_sync_target_or_fail(
    effects: &Effects,
    repo: &Repo,
    main_branch_name: &str,
) -> EyreExitOr<SyncTarget> {
    match resolve_sync_target(repo, main_branch_name)? {
        Some(target) => Ok(Ok(target)),
        None => {
            print_error(
                effects,
                format!(
                    "Could not find the main branch '{main_branch_name}', locally or on the upstream remote. Set it with: git config tidy.mainBranch <name>"
                ),
            )?;
            Ok(Err(ExitCode(1)))
        }
    }
}

/// Rebase the branch onto the latest version of the main branch, fetching
/// it from the upstream remote first if `fetch` is set.
#[instrument]
pub fn sync(
    effects: &Effects,
    git_run_info: &GitRunInfo,
    repo: &Repo,
    branch_state: &BranchState,
    fetch: bool,
) -> EyreExitOr<()> {
    let BranchState {
        branch_name,
        main_branch_name,
    } = branch_state;

    if fetch {
        let upstream_remote_name = get_upstream_remote_name(repo)?;
        if repo
            .get_all_remote_names()?
            .iter()
            .any(|name| name == &upstream_remote_name)
        {
            let (effects, _progress) = effects.start_operation(OperationType::FetchUpstream);
            let exit_code = git_run_info.run(&effects, &["fetch", &upstream_remote_name])?;
            if let Err(exit_code) = exit_code {
                print_error(
                    &effects,
                    format!("Could not fetch from {upstream_remote_name}."),
                )?;
                return Ok(Err(exit_code));
            }
        } else {
            print_status(
                effects,
                StatusKind::Warning,
                format!("No remote named '{upstream_remote_name}'; not fetching."),
            )?;
        }
    }

    let target = try_exit_code!(resolve_sync_target_or_fail(
        effects,
        repo,
        main_branch_name
    )?);
    let head_oid = get_head_oid(repo)?;
    if repo.is_ancestor(target.oid, head_oid)? {
        print_status(
            effects,
            StatusKind::Success,
            format!(
                "{branch_name} is already up to date with {}",
                target.name
            ),
        )?;
        return Ok(Ok(()));
    }

    let (effects, _progress) = effects.start_operation(OperationType::RebaseOntoUpstream);
    let exit_code = git_run_info.run(&effects, &["rebase", &target.name])?;
    if let Err(exit_code) = exit_code {
        print_error(
            &effects,
            format!("Could not rebase {branch_name} onto {}.", target.name),
        )?;
        writeln!(
            effects.get_error_stream(),
            "Resolve the conflicts and run `git rebase --continue`, or run `git rebase --abort` to undo the sync."
        )?;
        return Ok(Err(exit_code));
    }

    print_status(
        &effects,
        StatusKind::Success,
        format!("Synced {branch_name} onto {}", target.name),
    )?;
    Ok(Ok(()))
}

/// The message used for a squashed commit when none is given: the oldest
/// commit's summary, then a bullet for each squashed commit's summary.
pub fn make_default_squash_message(summaries: &[String]) -> String {
    let title = summaries.first().map(String::as_str).unwrap_or_default();
    let bullets = summaries
        .iter()
        .map(|summary| format!("* {summary}"))
        .join("\n");
    format!("{title}\n\n{bullets}\n")
}

/// Replace all commits between the branch point and `HEAD` with a single
/// commit containing their combined changes.
#[instrument(skip(in_))]
pub fn squash(
    effects: &Effects,
    git_run_info: &GitRunInfo,
    repo: &Repo,
    branch_state: &BranchState,
    in_: impl Read,
    options: &SquashOptions,
) -> EyreExitOr<SquashOutcome> {
    let BranchState {
        branch_name,
        main_branch_name,
    } = branch_state;
    let SquashOptions {
        message,
        skip_confirmation,
    } = options;
    let glyphs = effects.get_glyphs();

    let target = try_exit_code!(resolve_sync_target_or_fail(
        effects,
        repo,
        main_branch_name
    )?);
    let head_oid = get_head_oid(repo)?;
    let base_oid = match repo.find_merge_base(head_oid, target.oid)? {
        Some(base_oid) => base_oid,
        None => {
            print_error(
                effects,
                format!("{branch_name} has no common history with {}.", target.name),
            )?;
            return Ok(Err(ExitCode(1)));
        }
    };

    let commits = match repo.get_commits_between(base_oid, head_oid) {
        Ok(commits) => commits,
        Err(RepoError::NotDescendant { .. }) => {
            print_error(
                effects,
                format!(
                    "The branch point with {} is not on the first-parent history of {branch_name}, so the commits to squash can't be determined.",
                    target.name
                ),
            )?;
            return Ok(Err(ExitCode(1)));
        }
        Err(err) => return Err(err.into()),
    };

    match commits.len() {
        0 => {
            print_status(
                effects,
                StatusKind::Warning,
                format!("No commits ahead of {}; nothing to squash.", target.name),
            )?;
            return Ok(Ok(SquashOutcome::NothingToSquash { num_commits: 0 }));
        }
        1 => {
            print_status(
                effects,
                StatusKind::Warning,
                format!(
                    "Only one commit ahead of {}; nothing to squash.",
                    target.name
                ),
            )?;
            return Ok(Ok(SquashOutcome::NothingToSquash { num_commits: 1 }));
        }
        _ => {}
    }

    let num_commits = commits.len();
    writeln!(
        effects.get_output_stream(),
        "{}",
        glyphs.render(
            StyledStringBuilder::new()
                .append_styled(
                    format!(
                        "Found {} ahead of {}:",
                        Pluralize {
                            determiner: None,
                            amount: num_commits,
                            unit: ("commit", "commits"),
                        },
                        target.name
                    ),
                    Effect::Bold
                )
                .build()
        )?
    )?;
    for commit in &commits {
        writeln!(
            effects.get_output_stream(),
            "{} {}",
            glyphs.bullet_point,
            glyphs.render(commit.friendly_describe(glyphs)?)?
        )?;
    }

    let question = format!("Squash {num_commits} commits into one?");
    if !prompt_confirmation(effects, in_, &question, *skip_confirmation)? {
        writeln!(effects.get_output_stream())?;
        print_error(effects, "Aborted.")?;
        return Ok(Err(ExitCode(1)));
    }

    let message = match message {
        Some(message) => message.clone(),
        None => {
            let summaries: Vec<String> = commits
                .iter()
                .map(|commit| Ok(commit.get_summary()?.to_string()))
                .collect::<eyre::Result<_>>()?;
            make_default_squash_message(&summaries)
        }
    };

    let (effects, progress) = effects.start_operation(OperationType::SquashCommits);
    let base_oid = base_oid.to_string();
    progress.notify_status(format!("Resetting {branch_name} to {}", target.name));
    try_exit_code!(git_run_info.run(&effects, &["reset", "--soft", &base_oid])?);
    progress.notify_status("Committing the squashed changes");
    let exit_code = git_run_info.run(&effects, &["commit", "-m", &message])?;
    if let Err(exit_code) = exit_code {
        print_error(&effects, "Could not commit the squashed changes.")?;
        writeln!(
            effects.get_error_stream(),
            "The combined changes are still staged. To put {branch_name} back the way it was, run: git reset --soft {head_oid}"
        )?;
        return Ok(Err(exit_code));
    }

    let commit_oid = get_head_oid(repo)?;
    let commit = repo.find_commit_or_fail(commit_oid)?;
    writeln!(
        effects.get_output_stream(),
        "{}",
        glyphs.render(
            StyledStringBuilder::new()
                .append(make_status_line(
                    StatusKind::Success,
                    format!(
                        "Squashed {} into ",
                        Pluralize {
                            determiner: None,
                            amount: num_commits,
                            unit: ("commit", "commits"),
                        }
                    ),
                ))
                .append(commit.friendly_describe(glyphs)?)
                .build()
        )?
    )?;

    Ok(Ok(SquashOutcome::Squashed {
        num_commits,
        commit_oid,
    }))
}

/// `sync` command.
#[instrument]
pub fn command_main_sync(ctx: CommandContext, args: SyncArgs) -> EyreExitOr<()> {
    let CommandContext {
        effects,
        git_run_info,
    } = ctx;
    let SyncArgs { no_fetch } = args;

    let repo = try_exit_code!(open_repo(&effects)?);
    let branch_state = try_exit_code!(check_branch_preconditions(&effects, &git_run_info, &repo)?);
    sync(&effects, &git_run_info, &repo, &branch_state, !no_fetch)
}

/// `squash` command.
#[instrument]
pub fn command_main_squash(ctx: CommandContext, args: SquashArgs) -> EyreExitOr<()> {
    let CommandContext {
        effects,
        git_run_info,
    } = ctx;
    let SquashArgs { message, yes } = args;

    let repo = try_exit_code!(open_repo(&effects)?);
    let branch_state = try_exit_code!(check_branch_preconditions(&effects, &git_run_info, &repo)?);
    let _outcome = try_exit_code!(squash(
        &effects,
        &git_run_info,
        &repo,
        &branch_state,
        std::io::stdin(),
        &SquashOptions {
            message,
            skip_confirmation: yes,
        },
    )?);
    Ok(Ok(()))
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use lib::core::formatting::Glyphs;
    use lib::testing::{make_git, make_git_with_remote_repo, Git, GitWrapperWithRemoteRepo};

    use super::*;

    struct Buffers {
        stdout: Arc<Mutex<Vec<u8>>>,
        stderr: Arc<Mutex<Vec<u8>>>,
    }

    impl Buffers {
        fn new() -> Self {
            Self {
                stdout: Default::default(),
                stderr: Default::default(),
            }
        }

        fn effects(&self) -> Effects {
            Effects::new_from_buffer_for_test(Glyphs::text(), &self.stdout, &self.stderr)
        }

        fn take(&self, git: &Git) -> eyre::Result<(String, String)> {
            let stdout = std::mem::take(&mut *self.stdout.lock().unwrap());
            let stderr = std::mem::take(&mut *self.stderr.lock().unwrap());
            Ok((
                git.preprocess_output(String::from_utf8(stdout)?)?,
                git.preprocess_output(String::from_utf8(stderr)?)?,
            ))
        }
    }

    #[test]
    fn test_default_squash_message() {
        let message = make_default_squash_message(&[
            "create test1.txt".to_string(),
            "create test2.txt".to_string(),
        ]);
        insta::assert_snapshot!(message, @r###"
        create test1.txt

        * create test1.txt
        * create test2.txt
        "###);
    }

    #[test]
    fn test_preconditions() -> eyre::Result<()> {
        let git = make_git()?;
        git.init_repo()?;
        let git_run_info = git.get_git_run_info()?;
        let buffers = Buffers::new();
        let effects = buffers.effects();

        {
            let repo = git.get_repo()?;
            let result = check_branch_preconditions(&effects, &git_run_info, &repo)?;
            assert!(matches!(result, Err(ExitCode(1))));
            let (_stdout, stderr) = buffers.take(&git)?;
            insta::assert_snapshot!(stderr, @r###"
            X Refusing to rewrite the main branch 'main'. Check out a feature branch first.
            "###);
        }

        git.detach_head()?;
        {
            let repo = git.get_repo()?;
            let result = check_branch_preconditions(&effects, &git_run_info, &repo)?;
            assert!(matches!(result, Err(ExitCode(1))));
            let (_stdout, stderr) = buffers.take(&git)?;
            insta::assert_snapshot!(stderr, @r###"
            X HEAD is detached. Check out a feature branch first.
            "###);
        }

        git.run(&["checkout", "-b", "feature"])?;
        git.write_file_txt("initial", "changed contents\n")?;
        {
            let repo = git.get_repo()?;
            let result = check_branch_preconditions(&effects, &git_run_info, &repo)?;
            assert!(matches!(result, Err(ExitCode(1))));
            let (_stdout, stderr) = buffers.take(&git)?;
            insta::assert_snapshot!(stderr, @r###"
            X You have uncommitted changes to tracked files. Commit or stash them first.
            "###);
        }

        git.run(&["checkout", "--", "initial.txt"])?;
        git.write_file_txt("untracked", "untracked contents\n")?;
        {
            let repo = git.get_repo()?;
            let branch_state =
                check_branch_preconditions(&effects, &git_run_info, &repo)?.unwrap();
            assert_eq!(branch_state.branch_name, "feature");
            assert_eq!(branch_state.main_branch_name, "main");
        }

        Ok(())
    }

    #[test]
    fn test_preconditions_respect_configured_main_branch() -> eyre::Result<()> {
        let git = make_git()?;
        git.init_repo()?;
        git.run(&["config", "tidy.mainBranch", "develop"])?;
        git.run(&["checkout", "-b", "develop"])?;
        let git_run_info = git.get_git_run_info()?;
        let buffers = Buffers::new();
        let effects = buffers.effects();

        let repo = git.get_repo()?;
        let result = check_branch_preconditions(&effects, &git_run_info, &repo)?;
        assert!(matches!(result, Err(ExitCode(1))));
        let (_stdout, stderr) = buffers.take(&git)?;
        insta::assert_snapshot!(stderr, @r###"
        X Refusing to rewrite the main branch 'develop'. Check out a feature branch first.
        "###);

        git.run(&["checkout", "main"])?;
        let repo = git.get_repo()?;
        let branch_state = check_branch_preconditions(&effects, &git_run_info, &repo)?.unwrap();
        assert_eq!(branch_state.main_branch_name, "develop");
        Ok(())
    }

    #[test]
    fn test_resolve_sync_target_prefers_remote() -> eyre::Result<()> {
        let GitWrapperWithRemoteRepo {
            temp_dir: _guard,
            original_repo,
            cloned_repo,
        } = make_git_with_remote_repo()?;
        original_repo.init_repo()?;
        original_repo.clone_repo_into(&cloned_repo)?;

        let repo = cloned_repo.get_repo()?;
        let target = resolve_sync_target(&repo, "main")?.unwrap();
        assert_eq!(target.name, "origin/main");

        cloned_repo.run(&["remote", "rename", "origin", "upstream"])?;
        let repo = cloned_repo.get_repo()?;
        let target = resolve_sync_target(&repo, "main")?.unwrap();
        assert_eq!(target.name, "upstream/main");

        assert!(resolve_sync_target(&repo, "nonexistent")?.is_none());
        Ok(())
    }

    #[test]
    fn test_squash_nothing_to_squash() -> eyre::Result<()> {
        let git = make_git()?;
        git.init_repo()?;
        git.run(&["checkout", "-b", "feature"])?;
        let git_run_info = git.get_git_run_info()?;
        let buffers = Buffers::new();
        let effects = buffers.effects();

        let repo = git.get_repo()?;
        let branch_state = check_branch_preconditions(&effects, &git_run_info, &repo)?.unwrap();
        let outcome = squash(
            &effects,
            &git_run_info,
            &repo,
            &branch_state,
            &b""[..],
            &SquashOptions::default(),
        )?;
        assert_eq!(outcome, Ok(SquashOutcome::NothingToSquash { num_commits: 0 }));
        let (stdout, _stderr) = buffers.take(&git)?;
        insta::assert_snapshot!(stdout, @r###"
        ! No commits ahead of main; nothing to squash.
        "###);

        git.commit_file("test1", 1)?;
        let outcome = squash(
            &effects,
            &git_run_info,
            &repo,
            &branch_state,
            &b""[..],
            &SquashOptions::default(),
        )?;
        assert_eq!(outcome, Ok(SquashOutcome::NothingToSquash { num_commits: 1 }));
        let (stdout, _stderr) = buffers.take(&git)?;
        insta::assert_snapshot!(stdout, @r###"
        ! Only one commit ahead of main; nothing to squash.
        "###);
        Ok(())
    }

    #[test]
    fn test_squash_declined() -> eyre::Result<()> {
        let git = make_git()?;
        git.init_repo()?;
        git.run(&["checkout", "-b", "feature"])?;
        git.commit_file("test1", 1)?;
        git.commit_file("test2", 2)?;
        let git_run_info = git.get_git_run_info()?;
        let buffers = Buffers::new();
        let effects = buffers.effects();

        let repo = git.get_repo()?;
        let branch_state = check_branch_preconditions(&effects, &git_run_info, &repo)?.unwrap();
        let outcome = squash(
            &effects,
            &git_run_info,
            &repo,
            &branch_state,
            &b"n\n"[..],
            &SquashOptions::default(),
        )?;
        assert_eq!(outcome, Err(ExitCode(1)));

        let (stdout, stderr) = buffers.take(&git)?;
        assert!(stdout.starts_with("Found 2 commits ahead of main:\n"));
        assert!(stdout.contains("create test1.txt\n"));
        assert!(stdout.contains("Squash 2 commits into one? [yN] \n"));
        insta::assert_snapshot!(stderr, @r###"
        X Aborted.
        "###);

        insta::assert_snapshot!(git.log_subjects()?, @r###"
        create test2.txt
        create test1.txt
        create initial.txt
        "###);
        Ok(())
    }

    #[test]
    fn test_squash_with_default_message() -> eyre::Result<()> {
        let git = make_git()?;
        git.init_repo()?;
        git.run(&["checkout", "-b", "feature"])?;
        git.commit_file("test1", 1)?;
        git.commit_file("test2", 2)?;
        git.commit_file("test3", 3)?;
        let git_run_info = git.get_git_run_info()?;
        let buffers = Buffers::new();
        let effects = buffers.effects();

        let repo = git.get_repo()?;
        let branch_state = check_branch_preconditions(&effects, &git_run_info, &repo)?.unwrap();
        let outcome = squash(
            &effects,
            &git_run_info,
            &repo,
            &branch_state,
            &b"y\n"[..],
            &SquashOptions::default(),
        )?;
        assert!(matches!(
            outcome,
            Ok(SquashOutcome::Squashed { num_commits: 3, .. })
        ));

        let (stdout, _stderr) = buffers.take(&git)?;
        assert!(stdout.contains("Squash 3 commits into one? [yN] "));
        assert!(stdout.contains("tidy: running command: <git-executable> reset --soft "));
        assert!(stdout.contains("\n✓ Squashed 3 commits into "));
        assert!(stdout.trim_end().ends_with("create test1.txt"));

        insta::assert_snapshot!(git.log_subjects()?, @r###"
        create test1.txt
        create initial.txt
        "###);
        let (message, _stderr) = git.run(&["log", "-1", "--format=%B"])?;
        insta::assert_snapshot!(message, @r###"
        create test1.txt

        * create test1.txt
        * create test2.txt
        * create test3.txt

        "###);
        let (files, _stderr) = git.run(&["ls-files"])?;
        insta::assert_snapshot!(files, @r###"
        initial.txt
        test1.txt
        test2.txt
        test3.txt
        "###);
        Ok(())
    }

    #[test]
    fn test_squash_with_message() -> eyre::Result<()> {
        let git = make_git()?;
        git.init_repo()?;
        git.run(&["checkout", "-b", "feature"])?;
        git.commit_file("test1", 1)?;
        git.commit_file("test2", 2)?;
        let git_run_info = git.get_git_run_info()?;
        let buffers = Buffers::new();
        let effects = buffers.effects();

        let repo = git.get_repo()?;
        let branch_state = check_branch_preconditions(&effects, &git_run_info, &repo)?.unwrap();
        let outcome = squash(
            &effects,
            &git_run_info,
            &repo,
            &branch_state,
            &b""[..],
            &SquashOptions {
                message: Some("Add two test files".to_string()),
                skip_confirmation: true,
            },
        )?;
        assert!(matches!(
            outcome,
            Ok(SquashOutcome::Squashed { num_commits: 2, .. })
        ));
        insta::assert_snapshot!(git.log_subjects()?, @r###"
        Add two test files
        create initial.txt
        "###);
        Ok(())
    }

    #[test]
    fn test_sync_onto_remote_main() -> eyre::Result<()> {
        let GitWrapperWithRemoteRepo {
            temp_dir: _guard,
            original_repo,
            cloned_repo,
        } = make_git_with_remote_repo()?;
        original_repo.init_repo()?;
        original_repo.clone_repo_into(&cloned_repo)?;
        original_repo.commit_file("upstream1", 1)?;

        cloned_repo.run(&["checkout", "-b", "feature"])?;
        cloned_repo.commit_file("feature1", 2)?;

        let git_run_info = cloned_repo.get_git_run_info()?;
        let buffers = Buffers::new();
        let effects = buffers.effects();
        let repo = cloned_repo.get_repo()?;
        let branch_state = check_branch_preconditions(&effects, &git_run_info, &repo)?.unwrap();

        // Without fetching, the branch is already based on the known
        // `origin/main`.
        let exit_code = sync(&effects, &git_run_info, &repo, &branch_state, false)?;
        assert_eq!(exit_code, Ok(()));
        let (stdout, _stderr) = buffers.take(&cloned_repo)?;
        insta::assert_snapshot!(stdout, @r###"
        ✓ feature is already up to date with origin/main
        "###);

        let exit_code = sync(&effects, &git_run_info, &repo, &branch_state, true)?;
        assert_eq!(exit_code, Ok(()));
        let (stdout, _stderr) = buffers.take(&cloned_repo)?;
        assert!(stdout.starts_with("tidy: running command: <git-executable> fetch origin\n"));
        assert!(stdout.contains("tidy: running command: <git-executable> rebase origin/main\n"));
        assert!(stdout.contains("✓ Synced feature onto origin/main\n"));

        insta::assert_snapshot!(cloned_repo.log_subjects()?, @r###"
        create feature1.txt
        create upstream1.txt
        create initial.txt
        "###);
        Ok(())
    }

    #[test]
    fn test_sync_conflict() -> eyre::Result<()> {
        let git = make_git()?;
        git.init_repo()?;
        git.run(&["checkout", "-b", "feature"])?;
        git.commit_file_with_contents("shared", 1, "feature contents\n")?;
        git.run(&["checkout", "main"])?;
        git.commit_file_with_contents("shared", 2, "main contents\n")?;
        git.run(&["checkout", "feature"])?;

        let git_run_info = git.get_git_run_info()?;
        let buffers = Buffers::new();
        let effects = buffers.effects();
        let repo = git.get_repo()?;
        let branch_state = check_branch_preconditions(&effects, &git_run_info, &repo)?.unwrap();

        let exit_code = sync(&effects, &git_run_info, &repo, &branch_state, true)?;
        assert!(exit_code.is_err());
        let (stdout, stderr) = buffers.take(&git)?;
        assert!(stdout.contains("! No remote named 'origin'; not fetching.\n"));
        assert!(stderr.contains("X Could not rebase feature onto main.\n"));
        assert!(stderr.contains("git rebase --continue"));

        let repo = git.get_repo()?;
        assert_eq!(repo.get_current_operation_type(), Some("rebase"));
        let result = check_branch_preconditions(&effects, &git_run_info, &repo)?;
        assert!(matches!(result, Err(ExitCode(1))));
        let (_stdout, stderr) = buffers.take(&git)?;
        insta::assert_snapshot!(stderr, @r###"
        X A rebase is in progress. Finish or abort it before continuing.
        "###);
        Ok(())
    }
}
