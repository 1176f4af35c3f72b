use std::fmt::Write;

use cursive_core::theme::BaseColor;
use lib::core::effects::Effects;
use lib::core::formatting::{make_status_line, StatusKind, StyledStringBuilder};
use lib::git::Repo;
use lib::util::EyreExitOr;
use tracing::{debug, instrument};

use crate::github::{make_compare_url, parse_github_remote_url};
use crate::{Forge, PullRequestDetails};

/// Pushing the branch is all that this forge does. When the remote is hosted
/// on GitHub, a link for opening the pull request in the browser is printed.
#[derive(Debug)]
pub struct BranchForge<'a> {
    pub effects: &'a Effects,
    pub repo: &'a Repo,
}

impl Forge for BranchForge<'_> {
    #[instrument]
    fn submit(&mut self, details: &PullRequestDetails) -> EyreExitOr<()> {
        let PullRequestDetails {
            branch_name,
            main_branch_name,
            remote_name,
            head_oid: _,
            title: _,
            body: _,
            draft: _,
        } = details;
        let glyphs = self.effects.get_glyphs();

        writeln!(
            self.effects.get_output_stream(),
            "{}",
            glyphs.render(make_status_line(
                StatusKind::Success,
                format!("Pushed {branch_name} to {remote_name}"),
            ))?
        )?;

        let remote_url = self.repo.find_remote_url(remote_name)?;
        match remote_url.as_deref().and_then(parse_github_remote_url) {
            Some(repo_name) => {
                writeln!(
                    self.effects.get_output_stream(),
                    "{}",
                    glyphs.render(
                        StyledStringBuilder::new()
                            .append_plain("Open a pull request at: ")
                            .append_styled(
                                make_compare_url(&repo_name, main_branch_name, branch_name),
                                BaseColor::Cyan.light()
                            )
                            .build()
                    )?
                )?;
            }
            None => {
                debug!(?remote_url, "Not a GitHub remote; no pull request link");
            }
        }
        Ok(Ok(()))
    }
}
