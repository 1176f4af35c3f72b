use std::fmt::Display;
use std::str::FromStr;

/// Represents the ID of a Git object. The zero OID is never a valid
/// `NonZeroOid`.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NonZeroOid {
    pub(super) inner: git2::Oid,
}

impl NonZeroOid {
    /// Render the first `len` hex digits of this OID, as used when displaying
    /// a commit to the user.
    pub fn to_short_string(&self, len: usize) -> String {
        let mut result = self.to_string();
        result.truncate(len);
        result
    }
}

impl std::fmt::Debug for NonZeroOid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "NonZeroOid({:?})", self.inner)
    }
}

impl Display for NonZeroOid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self.inner)
    }
}

impl FromStr for NonZeroOid {
    type Err = eyre::Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let oid = git2::Oid::from_str(value.trim())?;
        if oid.is_zero() {
            eyre::bail!("Expected a non-zero OID, but got: {:?}", value);
        }
        Ok(NonZeroOid { inner: oid })
    }
}

impl TryFrom<git2::Oid> for NonZeroOid {
    type Error = eyre::Error;

    fn try_from(oid: git2::Oid) -> Result<Self, Self::Error> {
        if oid.is_zero() {
            eyre::bail!("Expected a non-zero OID");
        }
        Ok(NonZeroOid { inner: oid })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_oid() -> eyre::Result<()> {
        let oid: NonZeroOid = "62fc20d2a290daea0d52bdc2ed2ad4be6491010e".parse()?;
        assert_eq!(oid.to_string(), "62fc20d2a290daea0d52bdc2ed2ad4be6491010e");
        assert_eq!(oid.to_short_string(7), "62fc20d");

        let zero = "0000000000000000000000000000000000000000".parse::<NonZeroOid>();
        assert!(zero.is_err());
        Ok(())
    }
}
