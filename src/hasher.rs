//! Password and content digests required by the MNI authentication scheme.
//!
//! The password digest is salted with the current calendar date, so it
//! changes once per day:
//!
//! ```text
//! sha256("{DD-MM-YYYY}{rawPassword}")
//! ```
//!
//! Letter casing of the hex output is a per-system rule and is always
//! chosen by the caller.

use chrono::NaiveDate;
use sha2::{Digest, Sha256};

/// Hex casing demanded by the target system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DigestCase {
    #[default]
    Lower,
    Upper,
}

impl std::str::FromStr for DigestCase {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "lower" | "lowercase" => Ok(DigestCase::Lower),
            "upper" | "uppercase" => Ok(DigestCase::Upper),
            other => Err(format!("unknown digest case '{}'", other)),
        }
    }
}

/// Derives the date-salted password digest.
///
/// # Example
///
/// ```rust
/// use chrono::NaiveDate;
/// use mni_mtom_client::hasher::{digest_password, DigestCase};
///
/// let date = NaiveDate::from_ymd_opt(2024, 3, 7).unwrap();
/// let digest = digest_password("secret", date, DigestCase::Lower);
/// assert_eq!(digest.len(), 64);
/// ```
pub fn digest_password(raw_password: &str, current_date: NaiveDate, case: DigestCase) -> String {
    let salted = format!("{}{}", current_date.format("%d-%m-%Y"), raw_password);
    let digest = sha256_hex(salted.as_bytes());

    match case {
        DigestCase::Lower => digest,
        DigestCase::Upper => digest.to_ascii_uppercase(),
    }
}

/// SHA-256 of raw bytes, hex encoded in lowercase.
///
/// Used for the petition content hash, which the server compares against
/// the decoded binary, never against its base64 text.
pub fn sha256_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}
