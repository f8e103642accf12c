//! Configuration fingerprints.
//!
//! A fingerprint is a short token naming one exact version of an entity's
//! configuration. It is derived from the entity id and its last-modified
//! timestamp, so a write to the row yields a new token and every instance
//! built from the old version stops matching.

use chrono::{DateTime, SecondsFormat, Utc};
use sha2::{Digest, Sha256};

use crate::domain::models::EntitySnapshot;

/// Hex characters kept from the digest.
pub const FINGERPRINT_LEN: usize = 12;

/// Stand-in for rows that carry no timestamp.
pub const NO_DATE: &str = "no_date";

/// Fingerprint of a snapshot.
pub fn fingerprint(snapshot: &EntitySnapshot) -> String {
    fingerprint_parts(&snapshot.id, snapshot.last_modified)
}

pub fn fingerprint_parts(entity_id: &str, last_modified: Option<DateTime<Utc>>) -> String {
    let stamp = last_modified.map_or_else(
        || NO_DATE.to_string(),
        |ts| ts.to_rfc3339_opts(SecondsFormat::AutoSi, true),
    );

    let mut hasher = Sha256::new();
    hasher.update(entity_id.as_bytes());
    hasher.update(b"|");
    hasher.update(stamp.as_bytes());

    let mut token = hex::encode(hasher.finalize());
    token.truncate(FINGERPRINT_LEN);
    token
}
