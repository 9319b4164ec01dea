//! Timestamp-sortable identifiers.
//!
//! Identity ids are generated app-side as UUIDv7 so rows created through
//! either the directory or local registration sort by creation time.

use uuid::Uuid;

/// Generate a new UUIDv7 (timestamp-sortable).
pub fn uuidv7() -> Uuid {
    Uuid::now_v7()
}
