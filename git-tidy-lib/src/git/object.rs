use bstr::{BString, ByteSlice};
use cursive_core::theme::BaseColor;
use cursive_core::utils::markup::StyledString;
use tracing::instrument;

use crate::core::formatting::{Glyphs, StyledStringBuilder};
use crate::git::repo::{Error, Result};
use crate::git::NonZeroOid;

/// A commit in the object database.
#[derive(Clone, Debug)]
pub struct Commit<'repo> {
    pub(super) inner: git2::Commit<'repo>,
}

impl<'repo> Commit<'repo> {
    /// The commit's object ID.
    pub fn get_oid(&self) -> NonZeroOid {
        NonZeroOid {
            inner: self.inner.id(),
        }
    }

    /// The shortest unambiguous abbreviation of the object ID, honoring
    /// `core.abbrev`.
    #[instrument]
    pub fn get_short_oid(&self) -> Result<String> {
        let short_id = self
            .inner
            .as_object()
            .short_id()
            .map_err(Error::Git)?;
        Ok(short_id.as_str().unwrap_or_default().to_owned())
    }

    /// The first parent, or `None` for a root commit. Merges are followed
    /// along their first parent, the way `git log --first-parent` does.
    pub fn get_first_parent(&self) -> Option<Commit<'repo>> {
        self.inner.parent(0).ok().map(|inner| Commit { inner })
    }

    /// The first paragraph of the message, joined onto one line.
    #[instrument]
    pub fn get_summary(&self) -> Result<BString> {
        self.inner
            .summary_bytes()
            .map(BString::from)
            .ok_or_else(|| Error::ReadSummary { oid: self.get_oid() })
    }

    /// The full commit message, as stored.
    pub fn get_message_pretty(&self) -> BString {
        BString::from(self.inner.message_bytes())
    }

    /// `<short oid> <summary>`, with the OID highlighted.
    #[instrument]
    pub fn friendly_describe(&self, glyphs: &Glyphs) -> Result<StyledString> {
        Ok(StyledStringBuilder::new()
            .append_styled(self.get_short_oid()?, BaseColor::Yellow.dark())
            .append_plain(glyphs.commit_separator)
            .append_plain(self.get_summary()?.to_str_lossy())
            .build())
    }
}
