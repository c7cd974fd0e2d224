//! Identifier and time helpers.

mod ids;
mod time;

pub use ids::{generate_message_id, generate_uuid, generate_uuid_v7, string_hash_code};
pub use time::{iso_timestamp, millis_to_timestamp, now_millis, Timestamp};
