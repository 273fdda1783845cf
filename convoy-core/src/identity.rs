//! Identity types for Convoy entities

use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Entity identifier using UUIDv7 for timestamp-sortable IDs.
/// UUIDv7 embeds a Unix timestamp, making IDs naturally sortable by creation time.
pub type EntityId = Uuid;

/// Timestamp type using UTC timezone.
pub type Timestamp = DateTime<Utc>;

/// Generate a new UUIDv7 EntityId (timestamp-sortable).
pub fn new_entity_id() -> EntityId {
    Uuid::now_v7()
}

/// Generate a prefixed identifier string, e.g. `handshake-0192f3...`.
///
/// Handshakes, contracts, collaborations, and units of work carry
/// human-scannable prefixed IDs on the wire rather than bare UUIDs.
pub fn prefixed_id(prefix: &str) -> String {
    format!("{}-{}", prefix, Uuid::now_v7())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entity_ids_are_unique() {
        let a = new_entity_id();
        let b = new_entity_id();
        assert_ne!(a, b);
    }

    #[test]
    fn test_prefixed_id_format() {
        let id = prefixed_id("contract");
        assert!(id.starts_with("contract-"));
        assert!(id.len() > "contract-".len());
    }
}
