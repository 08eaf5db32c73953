//! Template entry naming and metadata
//!
//! A template entry is a database named `<prefix>-<fingerprint>`. Its
//! timestamps live in the database comment so that every process sharing the
//! server sees the same state without a side table.

use crate::cache::fingerprint::{Fingerprint, FINGERPRINT_LEN};
use crate::error::{PgstampError, PgstampResult};
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// PostgreSQL truncates identifiers longer than this
pub const MAX_IDENTIFIER_LEN: usize = 63;

/// Longest prefix that still leaves room for `-<fingerprint>`
pub const MAX_PREFIX_LEN: usize = MAX_IDENTIFIER_LEN - 1 - FINGERPRINT_LEN * 2;

/// Check that a prefix yields valid, untruncated database names
pub fn validate_prefix(prefix: &str) -> PgstampResult<()> {
    let invalid = |reason: &str| PgstampError::InvalidPrefix {
        prefix: prefix.to_string(),
        reason: reason.to_string(),
    };

    if prefix.is_empty() {
        return Err(invalid("must not be empty"));
    }
    if prefix.len() > MAX_PREFIX_LEN {
        return Err(invalid(&format!(
            "longer than {} characters",
            MAX_PREFIX_LEN
        )));
    }
    if !prefix
        .bytes()
        .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'_')
    {
        return Err(invalid("only a-z, 0-9 and '_' are allowed"));
    }
    Ok(())
}

/// Reserved database name for a fingerprint under a prefix
pub fn entry_name(prefix: &str, fingerprint: &Fingerprint) -> String {
    format!("{}-{}", prefix, fingerprint)
}

/// Fingerprint encoded in a template name, if `name` is one under `prefix`
pub fn parse_entry_name(prefix: &str, name: &str) -> Option<Fingerprint> {
    name.strip_prefix(prefix)
        .and_then(|rest| rest.strip_prefix('-'))
        .and_then(|hex| hex.parse::<Fingerprint>().ok())
}

/// Timestamps stored in the template database comment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryMetadata {
    /// When the template was registered
    pub created_at: DateTime<Utc>,
    /// When the template was last cloned from
    pub last_used_at: DateTime<Utc>,
}

impl EntryMetadata {
    /// Metadata for a template registered at `now`
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            created_at: now,
            last_used_at: now,
        }
    }

    /// Metadata after a clone at `now`; never moves before `created_at`
    pub fn touched(&self, now: DateTime<Utc>) -> Self {
        Self {
            created_at: self.created_at,
            last_used_at: now.max(self.created_at),
        }
    }

    /// Serialize for `COMMENT ON DATABASE`
    pub fn to_comment(&self) -> PgstampResult<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Parse a database comment
    ///
    /// Accepts the JSON form written by [`EntryMetadata::to_comment`] and a
    /// bare ISO-8601 timestamp as written by older tooling. Returns `None`
    /// for anything else, including timestamps that run backwards.
    pub fn from_comment(comment: &str) -> Option<Self> {
        let comment = comment.trim();

        let metadata = if comment.starts_with('{') {
            serde_json::from_str::<Self>(comment).ok()?
        } else {
            Self::new(parse_legacy_timestamp(comment)?)
        };

        (metadata.last_used_at >= metadata.created_at).then_some(metadata)
    }
}

/// Older tooling wrote a naive UTC `isoformat()` timestamp as the comment
fn parse_legacy_timestamp(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(s, format).ok())
        .map(|naive| naive.and_utc())
}

/// A live template entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    /// Database name (`<prefix>-<fingerprint>`)
    pub name: String,
    /// Recipe fingerprint, recovered from the name
    pub fingerprint: Fingerprint,
    /// When the template was registered
    pub created_at: DateTime<Utc>,
    /// When the template was last cloned from
    pub last_used_at: DateTime<Utc>,
}

impl CacheEntry {
    /// Try to build an entry from a catalog row
    ///
    /// Returns `None` when the name is not `<prefix>-<fingerprint>` or the
    /// comment does not hold recoverable metadata.
    pub fn from_catalog(prefix: &str, name: &str, comment: Option<&str>) -> Option<Self> {
        let fingerprint = parse_entry_name(prefix, name)?;

        let Some(metadata) = comment.and_then(EntryMetadata::from_comment) else {
            debug!("Template {} has no usable metadata: {:?}", name, comment);
            return None;
        };

        Some(Self {
            name: name.to_string(),
            fingerprint,
            created_at: metadata.created_at,
            last_used_at: metadata.last_used_at,
        })
    }

    /// Stored metadata for this entry
    pub fn metadata(&self) -> EntryMetadata {
        EntryMetadata {
            created_at: self.created_at,
            last_used_at: self.last_used_at,
        }
    }

    /// Whether the entry was last used at or before `cutoff`
    pub fn is_stale(&self, cutoff: DateTime<Utc>) -> bool {
        self.last_used_at <= cutoff
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn fp(c: char) -> Fingerprint {
        c.to_string().repeat(40).parse().unwrap()
    }

    fn at(day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2018, 5, day, 0, 0, 0).unwrap()
    }

    #[test]
    fn prefix_validation() {
        assert!(validate_prefix("cache").is_ok());
        assert!(validate_prefix("tst_pfx9").is_ok());
        assert!(validate_prefix("").is_err());
        assert!(validate_prefix("Cache").is_err());
        assert!(validate_prefix("my-cache").is_err());
        assert!(validate_prefix(&"a".repeat(MAX_PREFIX_LEN)).is_ok());
        assert!(validate_prefix(&"a".repeat(MAX_PREFIX_LEN + 1)).is_err());
    }

    #[test]
    fn longest_name_fits_identifier_limit() {
        let name = entry_name(&"a".repeat(MAX_PREFIX_LEN), &fp('a'));
        assert_eq!(name.len(), MAX_IDENTIFIER_LEN);
    }

    #[test]
    fn entry_name_format() {
        assert_eq!(
            entry_name("cache", &fp('b')),
            format!("cache-{}", "b".repeat(40))
        );
    }

    #[test]
    fn metadata_comment_roundtrip() {
        let meta = EntryMetadata::new(at(6)).touched(at(10));
        let parsed = EntryMetadata::from_comment(&meta.to_comment().unwrap()).unwrap();
        assert_eq!(parsed, meta);
    }

    #[test]
    fn touch_never_precedes_creation() {
        let meta = EntryMetadata::new(at(10)).touched(at(6));
        assert_eq!(meta.last_used_at, at(10));
    }

    #[test]
    fn legacy_comment_accepted() {
        let meta = EntryMetadata::from_comment("2018-05-08T00:00:00").unwrap();
        assert_eq!(meta.created_at, at(8));
        assert_eq!(meta.last_used_at, at(8));

        let meta = EntryMetadata::from_comment("2018-05-08T00:00:00.123456").unwrap();
        assert_eq!(meta.created_at.date_naive(), at(8).date_naive());
    }

    #[test]
    fn malformed_comments_rejected() {
        assert!(EntryMetadata::from_comment("").is_none());
        assert!(EntryMetadata::from_comment("hello").is_none());
        assert!(EntryMetadata::from_comment("{\"created_at\": 1}").is_none());

        let backwards = format!(
            "{{\"created_at\":\"{}\",\"last_used_at\":\"{}\"}}",
            at(10).to_rfc3339(),
            at(6).to_rfc3339()
        );
        assert!(EntryMetadata::from_comment(&backwards).is_none());
    }

    #[test]
    fn from_catalog_parses_entry() {
        let name = entry_name("cache", &fp('c'));
        let comment = EntryMetadata::new(at(6)).to_comment().unwrap();
        let entry = CacheEntry::from_catalog("cache", &name, Some(&comment)).unwrap();

        assert_eq!(entry.name, name);
        assert_eq!(entry.fingerprint, fp('c'));
        assert_eq!(entry.created_at, at(6));
    }

    #[test]
    fn from_catalog_rejects_foreign_names() {
        let comment = EntryMetadata::new(at(6)).to_comment().unwrap();
        assert!(CacheEntry::from_catalog("cache", "cache-short", Some(&comment)).is_none());
        assert!(CacheEntry::from_catalog("cache", "other-db", Some(&comment)).is_none());

        // A longer prefix sharing the same start is a different namespace
        let name = entry_name("cache_two", &fp('a'));
        assert!(CacheEntry::from_catalog("cache", &name, Some(&comment)).is_none());
    }

    #[test]
    fn from_catalog_requires_metadata() {
        let name = entry_name("cache", &fp('a'));
        assert!(CacheEntry::from_catalog("cache", &name, None).is_none());
        assert!(CacheEntry::from_catalog("cache", &name, Some("garbage")).is_none());
    }

    #[test]
    fn staleness_is_inclusive() {
        let entry = CacheEntry {
            name: entry_name("cache", &fp('a')),
            fingerprint: fp('a'),
            created_at: at(6),
            last_used_at: at(8),
        };
        assert!(entry.is_stale(at(8)));
        assert!(entry.is_stale(at(9)));
        assert!(!entry.is_stale(at(7)));
    }
}
