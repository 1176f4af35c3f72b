//! GitHub backend for opening pull requests. This forge integrates with the
//! `gh` command-line utility.

use std::fmt::{Debug, Write};
use std::io;
use std::path::PathBuf;
use std::process::Command;

use lazy_static::lazy_static;
use lib::core::effects::{Effects, OperationType};
use lib::core::formatting::{make_status_line, StatusKind};
use lib::util::{get_from_path, ExitCode, EyreExitOr};
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, instrument};

use crate::{Forge, PullRequestDetails};

/// When this environment variable is set, the GitHub forge doesn't invoke
/// `gh`. Instead, pull requests are recorded in a file in the repository at
/// the given path, which stands in for the remote repository.
pub const MOCK_REMOTE_REPO_PATH_ENV_KEY: &str = "TIDY_MOCK_REMOTE_REPO_PATH";

/// The fields requested from `gh` when querying pull requests.
const PULL_REQUEST_JSON_FIELDS: &str =
    "number,url,headRefName,headRefOid,baseRefName,closed,isDraft,title,body";

/// Error type.
#[allow(missing_docs)]
#[derive(Debug, Error)]
pub enum Error {
    #[error("invocation to `gh {args}` failed: {source}", args = args.join(" "))]
    InvokeGh {
        source: io::Error,
        args: Vec<String>,
    },

    #[error("could not parse response when running `gh {args}`: {source}; with output: {output}", args = args.join(" "))]
    ParseResponse {
        source: serde_json::Error,
        output: String,
        args: Vec<String>,
    },

    #[error("could not access mock GitHub state at {}: {source}", .path.display())]
    AccessMockState { source: io::Error, path: PathBuf },

    #[error("could not parse mock GitHub state at {}: {source}", .path.display())]
    ParseMockState {
        source: serde_json::Error,
        path: PathBuf,
    },
}

/// A pull request, as reported by `gh`.
#[allow(missing_docs)]
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PullRequestInfo {
    pub number: usize,
    pub url: String,
    pub head_ref_name: String,
    pub head_ref_oid: String,
    pub base_ref_name: String,
    pub closed: bool,
    pub is_draft: bool,
    pub title: String,
    pub body: String,
}

/// The parameters for creating a new pull request.
#[allow(missing_docs)]
#[derive(Clone, Debug)]
pub struct CreatePullRequestArgs {
    pub head_ref_name: String,
    pub head_ref_oid: String,
    pub base_ref_name: String,
    pub title: String,
    pub body: String,
    pub draft: bool,
}

/// Access to the pull requests of a GitHub repository.
pub trait GithubClient: Debug {
    /// Find the open pull request whose head is the given branch, if any.
    fn query_pull_request(
        &self,
        effects: &Effects,
        head_ref_name: &str,
    ) -> EyreExitOr<Option<PullRequestInfo>>;

    /// Create a pull request and return its URL.
    fn create_pull_request(
        &self,
        effects: &Effects,
        args: &CreatePullRequestArgs,
    ) -> EyreExitOr<String>;
}

/// The client which shells out to `gh`.
#[derive(Debug)]
pub struct RealGithubClient {
    /// The path to the `gh` executable.
    pub gh_path: PathBuf,

    /// The directory to run `gh` in, so that it picks up the repository's
    /// remotes.
    pub working_directory: PathBuf,
}

impl RealGithubClient {
    fn run_gh(&self, effects: &Effects, args: &[String]) -> EyreExitOr<Vec<u8>> {
        let (effects, _progress) = effects.start_operation(OperationType::QueryForge);
        debug!(?args, "Invoking gh");
        let output = Command::new(&self.gh_path)
            .current_dir(&self.working_directory)
            .args(args)
            .output()
            .map_err(|err| Error::InvokeGh {
                source: err,
                args: args.to_vec(),
            })?;
        if !output.status.success() {
            write!(
                effects.get_error_stream(),
                "{}",
                String::from_utf8_lossy(&output.stderr)
            )?;
            let exit_code = ExitCode::try_from(output.status)?;
            return Ok(Err(exit_code));
        }
        Ok(Ok(output.stdout))
    }
}

impl GithubClient for RealGithubClient {
    #[instrument]
    fn query_pull_request(
        &self,
        effects: &Effects,
        head_ref_name: &str,
    ) -> EyreExitOr<Option<PullRequestInfo>> {
        let args = vec![
            "pr".to_string(),
            "list".to_string(),
            "--head".to_string(),
            head_ref_name.to_string(),
            "--json".to_string(),
            PULL_REQUEST_JSON_FIELDS.to_string(),
        ];
        let stdout = match self.run_gh(effects, &args)? {
            Ok(stdout) => stdout,
            Err(exit_code) => return Ok(Err(exit_code)),
        };
        let pull_requests: Vec<PullRequestInfo> =
            serde_json::from_slice(&stdout).map_err(|err| Error::ParseResponse {
                source: err,
                output: String::from_utf8_lossy(&stdout).into_owned(),
                args: args.clone(),
            })?;
        Ok(Ok(pull_requests
            .into_iter()
            .find(|pull_request| !pull_request.closed)))
    }

    #[instrument]
    fn create_pull_request(
        &self,
        effects: &Effects,
        args: &CreatePullRequestArgs,
    ) -> EyreExitOr<String> {
        let CreatePullRequestArgs {
            head_ref_name,
            head_ref_oid: _,
            base_ref_name,
            title,
            body,
            draft,
        } = args;
        let mut gh_args = vec![
            "pr".to_string(),
            "create".to_string(),
            "--head".to_string(),
            head_ref_name.clone(),
            "--base".to_string(),
            base_ref_name.clone(),
            "--title".to_string(),
            title.clone(),
            "--body".to_string(),
            body.clone(),
        ];
        if *draft {
            gh_args.push("--draft".to_string());
        }

        let (effects, _progress) = effects.start_operation(OperationType::CreatePullRequest);
        let stdout = match self.run_gh(&effects, &gh_args)? {
            Ok(stdout) => stdout,
            Err(exit_code) => return Ok(Err(exit_code)),
        };
        // `gh pr create` prints the URL of the new pull request last.
        let stdout = String::from_utf8_lossy(&stdout);
        let url = stdout
            .lines()
            .map(str::trim)
            .rev()
            .find(|line| !line.is_empty())
            .unwrap_or_default()
            .to_owned();
        Ok(Ok(url))
    }
}

/// Testing utilities.
pub mod testing {
    use std::collections::BTreeMap;
    use std::path::PathBuf;

    use lib::core::effects::Effects;
    use lib::util::EyreExitOr;
    use serde::{Deserialize, Serialize};

    use super::{CreatePullRequestArgs, Error, GithubClient, PullRequestInfo};

    /// The pull requests recorded by the mock client.
    #[derive(Debug, Default, Deserialize, Serialize)]
    pub struct MockState {
        /// The number of the most recently created pull request.
        pub pull_request_index: usize,

        /// The pull requests, keyed by head branch name.
        pub pull_requests: BTreeMap<String, PullRequestInfo>,
    }

    /// A client which stores pull requests in a file instead of talking to
    /// GitHub.
    #[derive(Debug)]
    pub struct MockGithubClient {
        /// The path to the repository standing in for the GitHub repository.
        pub remote_repo_path: PathBuf,
    }

    impl MockGithubClient {
        /// The file where the mock pull requests are stored.
        pub fn state_path(&self) -> PathBuf {
            self.remote_repo_path.join("pull_request_info.json")
        }

        /// Load the stored state, apply `f` to it, and save it again.
        pub fn with_state_mut<T>(
            &self,
            f: impl FnOnce(&mut MockState) -> eyre::Result<T>,
        ) -> eyre::Result<T> {
            let state_path = self.state_path();
            let mut state: MockState = match std::fs::read_to_string(&state_path) {
                Ok(contents) => {
                    serde_json::from_str(&contents).map_err(|err| Error::ParseMockState {
                        source: err,
                        path: state_path.clone(),
                    })?
                }
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => Default::default(),
                Err(err) => {
                    return Err(Error::AccessMockState {
                        source: err,
                        path: state_path,
                    }
                    .into())
                }
            };
            let result = f(&mut state)?;
            let contents = serde_json::to_string_pretty(&state).map_err(|err| {
                Error::ParseMockState {
                    source: err,
                    path: state_path.clone(),
                }
            })?;
            std::fs::write(&state_path, contents).map_err(|err| Error::AccessMockState {
                source: err,
                path: state_path.clone(),
            })?;
            Ok(result)
        }
    }

    impl GithubClient for MockGithubClient {
        fn query_pull_request(
            &self,
            _effects: &Effects,
            head_ref_name: &str,
        ) -> EyreExitOr<Option<PullRequestInfo>> {
            let pull_request = self.with_state_mut(|state| {
                Ok(state
                    .pull_requests
                    .get(head_ref_name)
                    .filter(|pull_request| !pull_request.closed)
                    .cloned())
            })?;
            Ok(Ok(pull_request))
        }

        fn create_pull_request(
            &self,
            _effects: &Effects,
            args: &CreatePullRequestArgs,
        ) -> EyreExitOr<String> {
            let CreatePullRequestArgs {
                head_ref_name,
                head_ref_oid,
                base_ref_name,
                title,
                body,
                draft,
            } = args;
            let url = self.with_state_mut(|state| {
                state.pull_request_index += 1;
                let number = state.pull_request_index;
                let url = format!(
                    "https://example.com/mock-github-username/mock-github-repo/pulls/{number}"
                );
                let pull_request = PullRequestInfo {
                    number,
                    url: url.clone(),
                    head_ref_name: head_ref_name.clone(),
                    head_ref_oid: head_ref_oid.clone(),
                    base_ref_name: base_ref_name.clone(),
                    closed: false,
                    is_draft: *draft,
                    title: title.clone(),
                    body: body.clone(),
                };
                state
                    .pull_requests
                    .insert(head_ref_name.clone(), pull_request);
                Ok(url)
            })?;
            Ok(Ok(url))
        }
    }
}

/// The client to use: the mock one if [`MOCK_REMOTE_REPO_PATH_ENV_KEY`] is
/// set, or else `gh` if it can be found on `PATH`.
pub fn make_github_client(working_directory: PathBuf) -> Option<Box<dyn GithubClient>> {
    if let Some(remote_repo_path) = std::env::var_os(MOCK_REMOTE_REPO_PATH_ENV_KEY) {
        return Some(Box::new(testing::MockGithubClient {
            remote_repo_path: PathBuf::from(remote_repo_path),
        }));
    }
    let gh_path = get_from_path(if cfg!(target_os = "windows") {
        "gh.exe"
    } else {
        "gh"
    })?;
    Some(Box::new(RealGithubClient {
        gh_path,
        working_directory,
    }))
}

/// The owner and name of a GitHub repository, as found in a remote URL.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GithubRepoName {
    /// The user or organization which owns the repository.
    pub owner: String,

    /// The name of the repository.
    pub repo: String,
}

/// Extract the owner and repository name from a GitHub remote URL. Returns
/// `None` if the URL doesn't point at `github.com`.
pub fn parse_github_remote_url(url: &str) -> Option<GithubRepoName> {
    lazy_static! {
        static ref GITHUB_URL_RE: Regex = Regex::new(
            r"^(?:https?://(?:[^@/]+@)?github\.com/|ssh://git@github\.com(?::\d+)?/|git@github\.com:)([^/]+)/([^/]+?)(?:\.git)?/?$"
        )
        .expect("Compiling GitHub URL regex");
    }
    let captures = GITHUB_URL_RE.captures(url.trim())?;
    Some(GithubRepoName {
        owner: captures[1].to_owned(),
        repo: captures[2].to_owned(),
    })
}

/// The URL of GitHub's page for opening a pull request from `branch_name`
/// into `main_branch_name`.
pub fn make_compare_url(
    repo_name: &GithubRepoName,
    main_branch_name: &str,
    branch_name: &str,
) -> String {
    let GithubRepoName { owner, repo } = repo_name;
    format!("https://github.com/{owner}/{repo}/compare/{main_branch_name}...{branch_name}?expand=1")
}

/// The [GitHub](https://en.wikipedia.org/wiki/GitHub) code hosting platform.
#[allow(missing_docs)]
#[derive(Debug)]
pub struct GithubForge<'a> {
    pub effects: &'a Effects,
    pub client: Box<dyn GithubClient>,
}

impl Forge for GithubForge<'_> {
    #[instrument]
    fn submit(&mut self, details: &PullRequestDetails) -> EyreExitOr<()> {
        let PullRequestDetails {
            branch_name,
            main_branch_name,
            remote_name: _,
            head_oid,
            title,
            body,
            draft,
        } = details;
        let effects = self.effects;
        let glyphs = effects.get_glyphs();

        let existing = match self.client.query_pull_request(effects, branch_name)? {
            Ok(existing) => existing,
            Err(exit_code) => return Ok(Err(exit_code)),
        };
        if let Some(PullRequestInfo { url, .. }) = existing {
            writeln!(
                effects.get_output_stream(),
                "{}",
                glyphs.render(make_status_line(
                    StatusKind::Success,
                    format!("Updated pull request {url}"),
                ))?
            )?;
            return Ok(Ok(()));
        }

        let url = match self.client.create_pull_request(
            effects,
            &CreatePullRequestArgs {
                head_ref_name: branch_name.clone(),
                head_ref_oid: head_oid.to_string(),
                base_ref_name: main_branch_name.clone(),
                title: title.clone(),
                body: body.clone(),
                draft: *draft,
            },
        )? {
            Ok(url) => url,
            Err(exit_code) => return Ok(Err(exit_code)),
        };
        writeln!(
            effects.get_output_stream(),
            "{}",
            glyphs.render(make_status_line(
                StatusKind::Success,
                format!("Created pull request {url}"),
            ))?
        )?;
        Ok(Ok(()))
    }
}

#[cfg(test)]
mod tests {
    use super::testing::MockGithubClient;
    use super::*;

    #[test]
    fn test_parse_github_remote_url() {
        let expected = Some(GithubRepoName {
            owner: "octo-org".to_string(),
            repo: "some.repo".to_string(),
        });
        assert_eq!(
            parse_github_remote_url("https://github.com/octo-org/some.repo.git"),
            expected
        );
        assert_eq!(
            parse_github_remote_url("https://github.com/octo-org/some.repo"),
            expected
        );
        assert_eq!(
            parse_github_remote_url("https://user@github.com/octo-org/some.repo/"),
            expected
        );
        assert_eq!(
            parse_github_remote_url("git@github.com:octo-org/some.repo.git"),
            expected
        );
        assert_eq!(
            parse_github_remote_url("ssh://git@github.com/octo-org/some.repo.git"),
            expected
        );
        assert_eq!(
            parse_github_remote_url("https://gitlab.com/octo-org/some.repo.git"),
            None
        );
        assert_eq!(
            parse_github_remote_url("file:///tmp/github.com/octo-org/some.repo"),
            None
        );
    }

    #[test]
    fn test_make_compare_url() {
        let repo_name = GithubRepoName {
            owner: "octo-org".to_string(),
            repo: "tools".to_string(),
        };
        insta::assert_snapshot!(
            make_compare_url(&repo_name, "main", "feature"),
            @"https://github.com/octo-org/tools/compare/main...feature?expand=1"
        );
    }

    #[test]
    fn test_mock_client_round_trip() -> eyre::Result<()> {
        let temp_dir = tempfile::tempdir()?;
        let client = MockGithubClient {
            remote_repo_path: temp_dir.path().to_path_buf(),
        };
        let effects = Effects::new_suppress_for_test(lib::core::formatting::Glyphs::text());

        assert_eq!(client.query_pull_request(&effects, "feature")?, Ok(None));

        let url = client
            .create_pull_request(
                &effects,
                &CreatePullRequestArgs {
                    head_ref_name: "feature".to_string(),
                    head_ref_oid: "abc".to_string(),
                    base_ref_name: "main".to_string(),
                    title: "Add feature".to_string(),
                    body: "Details".to_string(),
                    draft: true,
                },
            )?
            .unwrap();
        assert_eq!(
            url,
            "https://example.com/mock-github-username/mock-github-repo/pulls/1"
        );

        let pull_request = client.query_pull_request(&effects, "feature")?.unwrap();
        assert_eq!(pull_request.map(|pr| (pr.number, pr.is_draft)), Some((1, true)));

        client.with_state_mut(|state| {
            if let Some(pull_request) = state.pull_requests.get_mut("feature") {
                pull_request.closed = true;
            }
            Ok(())
        })?;
        assert_eq!(client.query_pull_request(&effects, "feature")?, Ok(None));

        let contents = std::fs::read_to_string(client.state_path())?;
        assert!(contents.contains(r#""headRefName": "feature""#));
        assert!(contents.contains(r#""pull_request_index": 1"#));
        Ok(())
    }
}
