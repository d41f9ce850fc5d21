//! Identifier handling for the wire protocol.
//!
//! Session identifiers are UUID strings and are canonicalized to lowercase
//! hyphenated form on every external input. Message identifiers are
//! server-assigned opaque strings and are preserved verbatim. Command-session
//! identifiers live in their own namespace but share the UUID shape.

use uuid::Uuid;

/// Prefix every valid API key carries.
pub const API_KEY_PREFIX: &str = "untethered-";

/// Total length of a well-formed API key: `untethered-` + 32 hex chars.
pub const API_KEY_LENGTH: usize = 43;

/// Parse an externally supplied session identifier into canonical form
/// (lowercase hyphenated UUID). Returns `None` for anything that is not
/// UUID-shaped; callers log and drop instead of aborting.
pub fn normalize_session_id(raw: &str) -> Option<String> {
    let parsed = Uuid::parse_str(raw.trim()).ok()?;
    Some(parsed.as_hyphenated().to_string())
}

/// Mint a fresh canonical session identifier.
pub fn new_session_id() -> String {
    Uuid::new_v4().as_hyphenated().to_string()
}

/// Client-side API key check: `untethered-` followed by exactly 32 lowercase
/// hexadecimal characters. Malformed keys are rejected before any round trip.
pub fn api_key_is_valid(key: &str) -> bool {
    if key.len() != API_KEY_LENGTH {
        return false;
    }
    let Some(suffix) = key.strip_prefix(API_KEY_PREFIX) else {
        return false;
    };
    suffix.len() == 32
        && suffix
            .chars()
            .all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_lowercases_uuid() {
        let id = normalize_session_id("0E984725-C51C-4BF4-9960-E1C80E27ABA0").unwrap();
        assert_eq!(id, "0e984725-c51c-4bf4-9960-e1c80e27aba0");
    }

    #[test]
    fn normalize_trims_whitespace() {
        let id = normalize_session_id("  0e984725-c51c-4bf4-9960-e1c80e27aba0 ").unwrap();
        assert_eq!(id, "0e984725-c51c-4bf4-9960-e1c80e27aba0");
    }

    #[test]
    fn normalize_rejects_garbage() {
        assert!(normalize_session_id("not-a-uuid").is_none());
        assert!(normalize_session_id("").is_none());
    }

    #[test]
    fn api_key_accepts_well_formed() {
        assert!(api_key_is_valid(
            "untethered-0123456789abcdef0123456789abcdef"
        ));
    }

    #[test]
    fn api_key_rejects_uppercase_hex() {
        assert!(!api_key_is_valid(
            "untethered-0123456789ABCDEF0123456789ABCDEF"
        ));
    }

    #[test]
    fn api_key_rejects_wrong_prefix() {
        assert!(!api_key_is_valid(
            "untetherXd-0123456789abcdef0123456789abcdef"
        ));
    }

    #[test]
    fn api_key_rejects_wrong_length() {
        assert!(!api_key_is_valid("untethered-0123456789abcdef"));
        assert!(!api_key_is_valid(
            "untethered-0123456789abcdef0123456789abcdef00"
        ));
    }

    #[test]
    fn api_key_rejects_non_hex_suffix() {
        assert!(!api_key_is_valid(
            "untethered-0123456789abcdef0123456789abcdeg"
        ));
    }
}
