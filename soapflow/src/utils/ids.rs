//! UUIDs, message ids and stable string hashes.

use uuid::Uuid;

/// Generates a new UUID v4.
#[must_use]
pub fn generate_uuid() -> Uuid {
    Uuid::new_v4()
}

/// Generates a new UUID v7 (time-ordered).
#[must_use]
pub fn generate_uuid_v7() -> Uuid {
    Uuid::now_v7()
}

/// Generates a WS-Addressing message id (`urn:uuid:…`).
#[must_use]
pub fn generate_message_id() -> String {
    format!("urn:uuid:{}", generate_uuid_v7())
}

/// A 32-bit polynomial hash over UTF-16 code units (`h = 31*h + c`).
///
/// Self-managed data keys embed this value, so it must stay stable across
/// processes and releases.
#[must_use]
pub fn string_hash_code(s: &str) -> i32 {
    s.encode_utf16()
        .fold(0i32, |h, unit| h.wrapping_mul(31).wrapping_add(i32::from(unit)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_uuid_is_v4() {
        assert_eq!(generate_uuid().get_version_num(), 4);
    }

    #[test]
    fn test_message_id_is_urn() {
        let id = generate_message_id();
        assert!(id.starts_with("urn:uuid:"));
        assert_ne!(id, generate_message_id());
    }

    #[test]
    fn test_string_hash_code_known_values() {
        assert_eq!(string_hash_code(""), 0);
        assert_eq!(string_hash_code("a"), 97);
        assert_eq!(string_hash_code("hello"), 99_162_322);
        assert_eq!(string_hash_code("polygenelubricants"), i32::MIN);
    }
}
