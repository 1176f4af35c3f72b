//! Get the current branch ready for review and push it: run the project's
//! checks, sync it with upstream, squash it, force-push it and open a pull
//! request on the forge.

#![warn(missing_docs)]
#![warn(
    clippy::all,
    clippy::as_conversions,
    clippy::clone_on_ref_ptr,
    clippy::dbg_macro
)]
#![allow(clippy::too_many_arguments, clippy::blocks_in_conditions)]

mod branch_forge;
pub mod github;

use std::fmt::{Debug, Write};
use std::io::Read;

use branch_forge::BranchForge;
use git_tidy_check::run_tool;
use git_tidy_invoke::CommandContext;
use git_tidy_opts::{ForgeKind, PreparePrArgs};
use git_tidy_sync::{
    check_branch_preconditions, open_repo, squash, sync, BranchState, SquashOptions,
    SquashOutcome,
};
use github::{make_github_client, parse_github_remote_url, GithubForge, MOCK_REMOTE_REPO_PATH_ENV_KEY};
use lib::core::config::{get_forge_name, get_prepare_run_checks, get_push_remote_name};
use lib::core::effects::{Effects, OperationType};
use lib::core::formatting::{make_status_line, StatusKind};
use lib::core::tool::ToolKind;
use lib::git::{GitRunInfo, NonZeroOid, Repo};
use lib::try_exit_code;
use lib::util::{get_from_path, ExitCode, EyreExitOr};
use tracing::{debug, info, instrument};

/// Everything a forge needs to know to open a pull request for a branch
/// which has already been pushed.
#[derive(Clone, Debug)]
pub struct PullRequestDetails {
    /// The branch to merge.
    pub branch_name: String,

    /// The branch to merge into.
    pub main_branch_name: String,

    /// The remote which the branch was pushed to.
    pub remote_name: String,

    /// The commit at the tip of the branch.
    pub head_oid: NonZeroOid,

    /// The title of the pull request.
    pub title: String,

    /// The description of the pull request.
    pub body: String,

    /// Whether to open the pull request as a draft, if the forge supports it.
    pub draft: bool,
}

/// "Forge" refers to a Git hosting provider, such as GitHub, GitLab, etc.
/// Branches are pushed to a forge for review.
pub trait Forge: Debug {
    /// Create or update the pull request for the branch described by
    /// `details`.
    fn submit(&mut self, details: &PullRequestDetails) -> EyreExitOr<()>;
}

/// Options for [`prepare_pr`].
#[derive(Clone, Debug, Default)]
pub struct PreparePrOptions {
    /// Don't run the linters and tests first.
    pub skip_checks: bool,

    /// The message for the squashed commit.
    pub message: Option<String>,

    /// Don't ask before squashing.
    pub skip_confirmation: bool,

    /// Open the pull request as a draft.
    pub draft: bool,

    /// The title of the pull request, instead of the commit summary.
    pub title: Option<String>,

    /// The forge to use, instead of the configured or detected one.
    pub forge_kind: Option<ForgeKind>,
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

/// Split a commit message into its summary line and the rest of the message.
pub fn split_commit_message(message: &str) -> (String, String) {
    let mut lines = message.trim().lines();
    let title = lines.next().unwrap_or_default().trim().to_owned();
    let body = lines.collect::<Vec<_>>().join("\n").trim().to_owned();
    (title, body)
}

#[instrument]
fn resolve_forge_kind(
    effects: &Effects,
    repo: &Repo,
    forge_kind: Option<ForgeKind>,
    remote_name: &str,
) -> EyreExitOr<ForgeKind> {
    if let Some(forge_kind) = forge_kind {
        info!(?forge_kind, "Forge kind was explicitly set");
        return Ok(Ok(forge_kind));
    }

    if let Some(forge_name) = get_forge_name(repo)? {
        return match forge_name.to_lowercase().as_str() {
            "github" => Ok(Ok(ForgeKind::Github)),
            "branch" => Ok(Ok(ForgeKind::Branch)),
            _ => {
                print_error(
                    effects,
                    format!(
                        "Unknown forge '{forge_name}' in tidy.forge. Expected 'github' or 'branch'."
                    ),
                )?;
                Ok(Err(ExitCode(1)))
            }
        };
    }

    let remote_url = repo.find_remote_url(remote_name)?;
    let is_github_remote = remote_url
        .as_deref()
        .and_then(parse_github_remote_url)
        .is_some();
    let is_gh_available = std::env::var_os(MOCK_REMOTE_REPO_PATH_ENV_KEY).is_some()
        || get_from_path(if cfg!(target_os = "windows") {
            "gh.exe"
        } else {
            "gh"
        })
        .is_some();
    debug!(
        ?remote_url,
        ?is_github_remote,
        ?is_gh_available,
        "Detecting forge kind"
    );
    if is_github_remote && is_gh_available {
        Ok(Ok(ForgeKind::Github))
    } else {
        Ok(Ok(ForgeKind::Branch))
    }
}

#[instrument]
fn select_forge<'a>(
    effects: &'a Effects,
    repo: &'a Repo,
    forge_kind: ForgeKind,
) -> EyreExitOr<Box<dyn Forge + 'a>> {
    info!(?forge_kind, "Selected forge kind");
    let forge: Box<dyn Forge + 'a> = match forge_kind {
        ForgeKind::Branch => Box::new(BranchForge { effects, repo }),
        ForgeKind::Github => {
            let working_copy_path = repo.get_working_copy_path_or_fail()?;
            match make_github_client(working_copy_path) {
                Some(client) => Box::new(GithubForge { effects, client }),
                None => {
                    print_error(
                        effects,
                        "Could not find `gh` on PATH. Install the GitHub CLI, or use `--forge branch` to only push the branch.",
                    )?;
                    return Ok(Err(ExitCode(1)));
                }
            }
        }
    };
    Ok(Ok(forge))
}

/// Force-push `branch_name` to `remote_name`, refusing to overwrite any
/// remote changes that haven't been fetched.
#[instrument]
pub fn push_branch(
    effects: &Effects,
    git_run_info: &GitRunInfo,
    remote_name: &str,
    branch_name: &str,
) -> EyreExitOr<()> {
    let (effects, _progress) = effects.start_operation(OperationType::PushBranch);
    let exit_code = git_run_info.run(
        &effects,
        &[
            "push",
            "--force-with-lease",
            "--set-upstream",
            remote_name,
            branch_name,
        ],
    )?;
    if let Err(exit_code) = exit_code {
        print_error(
            &effects,
            format!("Could not push {branch_name} to {remote_name}."),
        )?;
        return Ok(Err(exit_code));
    }
    Ok(Ok(()))
}

/// Run the whole flow for the current branch: check that it is safe to
/// rewrite, lint and test it, sync it, squash it, push it and open a pull
/// request for it. Stops at the first step which fails.
#[instrument(skip(in_))]
pub fn prepare_pr(
    effects: &Effects,
    git_run_info: &GitRunInfo,
    repo: &Repo,
    in_: impl Read,
    options: &PreparePrOptions,
) -> EyreExitOr<()> {
    let PreparePrOptions {
        skip_checks,
        message,
        skip_confirmation,
        draft,
        title,
        forge_kind,
    } = options;

    let branch_state = try_exit_code!(check_branch_preconditions(effects, git_run_info, repo)?);
    let BranchState {
        branch_name,
        main_branch_name,
    } = &branch_state;

    let remote_name = get_push_remote_name(repo)?;
    if !repo
        .get_all_remote_names()?
        .iter()
        .any(|name| name == &remote_name)
    {
        print_error(
            effects,
            format!(
                "No remote named '{remote_name}' to push to. Configure one with: git config tidy.pushRemote <remote>"
            ),
        )?;
        return Ok(Err(ExitCode(1)));
    }
    let forge_kind = try_exit_code!(resolve_forge_kind(effects, repo, *forge_kind, &remote_name)?);

    if *skip_checks || !get_prepare_run_checks(repo)? {
        debug!(?skip_checks, "Not running checks");
    } else {
        let working_copy_path = repo.get_working_copy_path_or_fail()?;
        for kind in [ToolKind::Lint, ToolKind::Test] {
            try_exit_code!(run_tool(
                effects,
                Some(repo),
                working_copy_path.clone(),
                kind,
                &[]
            )?);
        }
    }

    try_exit_code!(sync(effects, git_run_info, repo, &branch_state, true)?);

    let outcome = try_exit_code!(squash(
        effects,
        git_run_info,
        repo,
        &branch_state,
        in_,
        &SquashOptions {
            message: message.clone(),
            skip_confirmation: *skip_confirmation,
        },
    )?);
    if let SquashOutcome::NothingToSquash { num_commits: 0 } = outcome {
        print_error(
            effects,
            format!("{branch_name} has no commits to open a pull request for."),
        )?;
        return Ok(Err(ExitCode(1)));
    }

    try_exit_code!(push_branch(effects, git_run_info, &remote_name, branch_name)?);

    let head_oid = repo
        .get_head_info()?
        .oid
        .ok_or_else(|| eyre::eyre!("HEAD no longer points to a commit"))?;
    let head_commit = repo.find_commit_or_fail(head_oid)?;
    let (summary, body) = split_commit_message(&head_commit.get_message_pretty().to_string());
    let details = PullRequestDetails {
        branch_name: branch_name.clone(),
        main_branch_name: main_branch_name.clone(),
        remote_name,
        head_oid,
        title: title.clone().unwrap_or(summary),
        body,
        draft: *draft,
    };

    let mut forge = try_exit_code!(select_forge(effects, repo, forge_kind)?);
    forge.submit(&details)
}

/// `prepare-pr` command.
#[instrument]
pub fn command_main(ctx: CommandContext, args: PreparePrArgs) -> EyreExitOr<()> {
    let CommandContext {
        effects,
        git_run_info,
    } = ctx;
    let PreparePrArgs {
        skip_checks,
        message,
        yes,
        draft,
        title,
        forge_kind,
    } = args;

    let repo = try_exit_code!(open_repo(&effects)?);
    prepare_pr(
        &effects,
        &git_run_info,
        &repo,
        std::io::stdin(),
        &PreparePrOptions {
            skip_checks,
            message,
            skip_confirmation: yes,
            draft,
            title,
            forge_kind,
        },
    )
}
