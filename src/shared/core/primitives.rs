// Identifier and clock primitives shared by every layer.
//
// Identifiers are UUID v7 strings so they sort by creation time in the
// serialized store.

use chrono::{DateTime, Utc};
use uuid::Uuid;

pub fn new_id() -> String {
    Uuid::now_v7().to_string()
}

pub fn now() -> DateTime<Utc> {
    Utc::now()
}
