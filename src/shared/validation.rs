use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    /// Characters that may not appear in a storage key segment
    /// - Kept: ASCII letters, digits, `.` and `-`
    /// - Everything else (spaces, slashes, punctuation, non-ASCII) becomes `_`
    pub static ref UNSAFE_KEY_CHARS: Regex = Regex::new(r"[^a-zA-Z0-9.-]").unwrap();
}

/// Make a filename safe for use as one storage key segment
///
/// Lossy on purpose: the storage name carries a unique prefix, and the
/// literal filename travels separately. A segment made only of dots is
/// replaced entirely so it can never be read as a relative path component.
pub fn sanitize_key_segment(value: &str) -> String {
    let sanitized = UNSAFE_KEY_CHARS.replace_all(value, "_").into_owned();
    if !sanitized.is_empty() && sanitized.chars().all(|c| c == '.') {
        "_".repeat(sanitized.len())
    } else {
        sanitized
    }
}

/// Escape byte used by [`user_namespace`]
const NAMESPACE_ESCAPE: char = '~';

/// Storage namespace of a user id
///
/// Keeps `[A-Za-z0-9._-]` and writes every other byte as `~XX` (uppercase
/// hex), so distinct ids always map to distinct namespaces and the id can be
/// decoded back. `~` itself is escaped. The result is valid both as an S3 key
/// segment and as a Cloudinary folder name, which rejects `%`. An all-dot id
/// is escaped entirely so it cannot read as `.` or `..`.
pub fn user_namespace(user_id: &str) -> String {
    let all_dots = !user_id.is_empty() && user_id.bytes().all(|b| b == b'.');

    let mut namespace = String::with_capacity(user_id.len());
    for byte in user_id.bytes() {
        let keep = byte.is_ascii_alphanumeric() || matches!(byte, b'.' | b'_' | b'-');
        if keep && !all_dots {
            namespace.push(byte as char);
        } else {
            namespace.push(NAMESPACE_ESCAPE);
            namespace.push_str(&hex::encode_upper([byte]));
        }
    }
    namespace
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_key_segment_replaces_unsafe_chars() {
        assert_eq!(sanitize_key_segment("my photo!!.png"), "my_photo__.png");
        assert_eq!(sanitize_key_segment("a/b\\c"), "a_b_c");
        assert_eq!(sanitize_key_segment("çiçek.jpg"), "_i_ek.jpg");
        assert_eq!(sanitize_key_segment("user_1"), "user_1");
    }

    #[test]
    fn test_sanitize_key_segment_keeps_safe_chars() {
        assert_eq!(sanitize_key_segment("IMG-2024.01.jpeg"), "IMG-2024.01.jpeg");
    }

    #[test]
    fn test_sanitize_key_segment_neutralizes_dot_segments() {
        assert_eq!(sanitize_key_segment(".."), "__");
        assert_eq!(sanitize_key_segment("."), "_");
        assert_eq!(sanitize_key_segment(""), "");
    }

    fn decode_namespace(namespace: &str) -> String {
        let mut bytes = Vec::new();
        let mut rest = namespace.as_bytes();
        while let Some((&first, tail)) = rest.split_first() {
            if first == b'~' {
                bytes.extend(hex::decode(&tail[..2]).unwrap());
                rest = &tail[2..];
            } else {
                bytes.push(first);
                rest = tail;
            }
        }
        String::from_utf8(bytes).unwrap()
    }

    #[test]
    fn test_user_namespace_keeps_ids_apart() {
        let ids = [
            "alice@example.com",
            "alice#example.com",
            "alice_example.com",
            "alice example.com",
            "alice~40example.com",
        ];
        let namespaces: std::collections::HashSet<String> =
            ids.iter().map(|id| user_namespace(id)).collect();
        assert_eq!(namespaces.len(), ids.len());

        assert_eq!(user_namespace("alice@example.com"), "alice~40example.com");
        assert_eq!(user_namespace("alice_example.com"), "alice_example.com");
        assert_eq!(user_namespace("user-1"), "user-1");
    }

    #[test]
    fn test_user_namespace_round_trips() {
        for id in ["u1", "john doe", "a/b", "çiçek", "100%", "~x"] {
            let namespace = user_namespace(id);
            assert!(!namespace.contains('/'));
            assert!(!namespace.contains('%'));
            assert_eq!(decode_namespace(&namespace), id);
        }
    }

    #[test]
    fn test_user_namespace_escapes_dot_segments() {
        assert_eq!(user_namespace("."), "~2E");
        assert_eq!(user_namespace(".."), "~2E~2E");
        assert_eq!(user_namespace("a.b"), "a.b");
        assert_eq!(user_namespace("../x"), "..~2Fx");
        assert_eq!(user_namespace(""), "");
    }

    #[test]
    fn test_unsafe_key_chars_regex() {
        assert!(UNSAFE_KEY_CHARS.is_match("a b"));
        assert!(!UNSAFE_KEY_CHARS.is_match("abc-1.2"));
    }
}
