//! core identity types for the storage layer.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest as _, Sha256};

/// A SHA-256 digest, the identity of every stored object.
///
/// The all-zero value is reserved as the nil sentinel and never names
/// a real object.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Digest([u8; Digest::LEN]);

impl Digest {
    /// digest length in bytes
    pub const LEN: usize = 32;

    /// the reserved "no reference" value
    pub const NIL: Digest = Digest([0u8; Digest::LEN]);

    /// hash a byte sequence
    pub fn of(bytes: &[u8]) -> Self {
        Self(Sha256::digest(bytes).into())
    }

    pub const fn from_bytes(bytes: [u8; Digest::LEN]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; Digest::LEN] {
        &self.0
    }

    pub fn is_nil(&self) -> bool {
        *self == Self::NIL
    }

    /// lowercase hex form, used for file names and serialized records
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// parse from a 64 character hex string (either case)
    pub fn from_hex(s: &str) -> Result<Self, hex::FromHexError> {
        let mut bytes = [0u8; Digest::LEN];
        hex::decode_to_slice(s, &mut bytes)?;
        Ok(Self(bytes))
    }

    /// short form for log lines
    pub fn short(&self) -> String {
        hex::encode(&self.0[..4])
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Digest({})", self.to_hex())
    }
}

impl FromStr for Digest {
    type Err = hex::FromHexError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

impl Serialize for Digest {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Digest {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

/// Declares a typed wrapper around [`Digest`] so a blob id can't be
/// passed where a commit id is expected.
macro_rules! object_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Digest);

        impl $name {
            pub const fn new(digest: Digest) -> Self {
                Self(digest)
            }

            pub fn digest(&self) -> Digest {
                self.0
            }

            pub fn from_hex(s: &str) -> Result<Self, hex::FromHexError> {
                Digest::from_hex(s).map(Self)
            }

            pub fn to_hex(&self) -> String {
                self.0.to_hex()
            }

            pub fn short(&self) -> String {
                self.0.short()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                fmt::Display::fmt(&self.0, f)
            }
        }

        impl FromStr for $name {
            type Err = hex::FromHexError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::from_hex(s)
            }
        }

        impl From<Digest> for $name {
            fn from(digest: Digest) -> Self {
                Self(digest)
            }
        }
    };
}

object_id!(
    /// Identity of a stored database file.
    BlobId
);
object_id!(
    /// Identity of a tree snapshot.
    TreeId
);
object_id!(
    /// Identity of a commit.
    CommitId
);

impl CommitId {
    /// parent value of a root commit
    pub const NIL: CommitId = CommitId(Digest::NIL);

    pub fn is_nil(&self) -> bool {
        self.0.is_nil()
    }
}

/// A validated branch name.
///
/// Branch names are kept in a single JSON file rather than on the
/// filesystem, but we still reject anything that would read badly in
/// a listing or look like a path escape.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct BranchName(String);

impl BranchName {
    /// the default branch
    pub const MAIN: &'static str = "main";

    const MAX_LEN: usize = 255;

    pub fn new(name: impl Into<String>) -> Result<Self, InvalidNameError> {
        let name = name.into();
        Self::validate(&name)?;
        Ok(Self(name))
    }

    pub fn main() -> Self {
        Self(Self::MAIN.to_string())
    }

    fn validate(name: &str) -> Result<(), InvalidNameError> {
        if name.is_empty() {
            return Err(InvalidNameError::Empty);
        }

        if name.len() > Self::MAX_LEN {
            return Err(InvalidNameError::TooLong(name.len()));
        }

        for (i, c) in name.chars().enumerate() {
            if c.is_control() || c.is_whitespace() {
                return Err(InvalidNameError::InvalidCharacter { char: c, position: i });
            }
        }

        if name.contains("..") || name.starts_with('/') || name.ends_with('/') {
            return Err(InvalidNameError::InvalidPath(name.to_string()));
        }

        Ok(())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for BranchName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for BranchName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for BranchName {
    type Error = InvalidNameError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl TryFrom<&str> for BranchName {
    type Error = InvalidNameError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<BranchName> for String {
    fn from(name: BranchName) -> Self {
        name.0
    }
}

/// author/committer identity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signature {
    pub name: String,
    pub email: String,
}

impl Signature {
    pub fn new(name: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            email: email.into(),
        }
    }
}

/// error type for invalid names (branches, tree entries)
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvalidNameError {
    Empty,
    TooLong(usize),
    InvalidCharacter { char: char, position: usize },
    InvalidPath(String),
}

impl fmt::Display for InvalidNameError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => write!(f, "name cannot be empty"),
            Self::TooLong(len) => write!(f, "name too long: {} bytes", len),
            Self::InvalidCharacter { char, position } => {
                write!(f, "invalid character {:?} at position {}", char, position)
            }
            Self::InvalidPath(path) => write!(f, "invalid path: '{}'", path),
        }
    }
}

impl std::error::Error for InvalidNameError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_digest_of_known_input() {
        let digest = Digest::of(b"hello-db-bytes");
        assert_eq!(
            digest.to_hex(),
            "3c97726c4729f3015e5740bff6ae7b3e615069267312ff605a8f62bd4dfb7aa7"
        );
        assert_eq!(digest.short(), "3c97726c");
    }

    #[test]
    fn test_nil_sentinel() {
        assert!(Digest::NIL.is_nil());
        assert!(CommitId::NIL.is_nil());
        assert_eq!(Digest::NIL.to_hex(), "0".repeat(64));
        // the digest of empty input is not the sentinel
        assert!(!Digest::of(b"").is_nil());
    }

    #[test]
    fn test_digest_hex_parsing() {
        let digest = Digest::of(b"abc");
        assert_eq!(Digest::from_hex(&digest.to_hex()).unwrap(), digest);
        assert_eq!(Digest::from_hex(&digest.to_hex().to_uppercase()).unwrap(), digest);
        assert!(Digest::from_hex("abc").is_err());
        assert!(Digest::from_hex(&"zz".repeat(32)).is_err());
        assert!("not-hex".parse::<CommitId>().is_err());
    }

    #[test]
    fn test_digest_serializes_as_hex_string() {
        let id = BlobId::new(Digest::of(b"abc"));
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, format!("\"{}\"", id.to_hex()));

        let back: BlobId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);

        let bad: Result<BlobId, _> = serde_json::from_str("\"1234\"");
        assert!(bad.is_err());
    }

    #[test]
    fn test_branch_name_valid() {
        assert!(BranchName::new("main").is_ok());
        assert!(BranchName::new("feature/new-schema").is_ok());
        assert!(BranchName::new("v1.2").is_ok());
        assert_eq!(BranchName::main().as_str(), "main");
    }

    #[test]
    fn test_branch_name_invalid() {
        assert_eq!(BranchName::new(""), Err(InvalidNameError::Empty));
        assert!(matches!(
            BranchName::new("has space"),
            Err(InvalidNameError::InvalidCharacter { char: ' ', position: 3 })
        ));
        assert!(matches!(BranchName::new("../up"), Err(InvalidNameError::InvalidPath(_))));
        assert!(matches!(BranchName::new("/lead"), Err(InvalidNameError::InvalidPath(_))));
        assert!(matches!(BranchName::new("x".repeat(256)), Err(InvalidNameError::TooLong(256))));
    }

    #[test]
    fn test_branch_name_deserialize_validates() {
        let ok: BranchName = serde_json::from_str("\"dev\"").unwrap();
        assert_eq!(ok.as_str(), "dev");

        let bad: Result<BranchName, _> = serde_json::from_str("\"\"");
        assert!(bad.is_err());
    }
}
