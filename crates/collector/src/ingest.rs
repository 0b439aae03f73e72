//! The single boundary where loosely-typed extraction payloads become
//! [`Post`] values. Placeholder defaulting happens here and nowhere else, so
//! every post downstream always carries every field.

use serde_json::Value;

use feedsift_core::Post;

pub const EMPTY_TEXT_MARKER: &str = "[No text]";
pub const UNKNOWN_HANDLE: &str = "unknown";

/// Convert a Runtime.evaluate payload (a JSON array of raw post objects)
/// into posts. Entries that are not objects are dropped; missing or
/// mistyped fields default rather than fail.
pub fn posts_from_value(value: &Value) -> Vec<Post> {
    let Some(entries) = value.as_array() else {
        return Vec::new();
    };
    entries.iter().filter_map(post_from_entry).collect()
}

fn post_from_entry(entry: &Value) -> Option<Post> {
    if !entry.is_object() {
        return None;
    }

    let text = str_field(entry, "text");
    let author_handle = str_field(entry, "authorHandle");
    let url = str_field(entry, "url");

    // The in-page query only emits elements with at least one of these, but
    // the payload is untrusted; enforce the invariant again here so every
    // post has a non-empty identity key.
    if text.is_empty() && author_handle.is_empty() && url.is_empty() {
        return None;
    }

    let replies = num_field(entry, "replies");

    Some(Post {
        text: if text.is_empty() {
            EMPTY_TEXT_MARKER.to_string()
        } else {
            text
        },
        author_handle: if author_handle.is_empty() {
            UNKNOWN_HANDLE.to_string()
        } else {
            author_handle
        },
        author_name: str_field(entry, "authorName"),
        likes: num_field(entry, "likes"),
        reposts: num_field(entry, "reposts"),
        replies,
        views: num_field(entry, "views"),
        posted_at: str_field(entry, "postedAt"),
        url,
        is_repost: entry
            .get("isRepost")
            .and_then(Value::as_bool)
            .unwrap_or(false),
        is_thread: false,
        thread_length: 1,
        likely_thread: replies > 0,
    })
}

fn str_field(entry: &Value, key: &str) -> String {
    entry
        .get(key)
        .and_then(Value::as_str)
        .unwrap_or("")
        .trim()
        .to_string()
}

fn num_field(entry: &Value, key: &str) -> u64 {
    let Some(v) = entry.get(key) else { return 0 };
    v.as_u64()
        .or_else(|| v.as_f64().map(|f| f.max(0.0).round() as u64))
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_full_entry() {
        let payload = json!([{
            "text": "big model drop",
            "authorHandle": "alice",
            "authorName": "Alice",
            "likes": 12,
            "reposts": 3,
            "replies": 4,
            "views": 56000,
            "postedAt": "2026-08-01T12:00:00.000Z",
            "url": "https://x.com/alice/status/1",
            "isRepost": false
        }]);

        let posts = posts_from_value(&payload);
        assert_eq!(posts.len(), 1);
        let post = &posts[0];
        assert_eq!(post.text, "big model drop");
        assert_eq!(post.author_handle, "alice");
        assert_eq!(post.views, 56000);
        assert!(post.likely_thread);
        assert!(!post.is_thread);
        assert_eq!(post.thread_length, 1);
    }

    #[test]
    fn test_placeholders_applied_once_at_ingest() {
        let payload = json!([{
            "text": "",
            "authorHandle": "",
            "url": "https://x.com/i/status/2"
        }]);

        let posts = posts_from_value(&payload);
        assert_eq!(posts[0].text, EMPTY_TEXT_MARKER);
        assert_eq!(posts[0].author_handle, UNKNOWN_HANDLE);
        assert_eq!(posts[0].author_name, "");
    }

    #[test]
    fn test_entry_without_any_identity_dropped() {
        let payload = json!([
            {"text": "", "authorHandle": "", "url": ""},
            {"likes": 5}
        ]);
        assert!(posts_from_value(&payload).is_empty());
    }

    #[test]
    fn test_mistyped_fields_default() {
        let payload = json!([{
            "text": "ok",
            "authorHandle": "bob",
            "url": "",
            "likes": "12",
            "views": 1234.0,
            "isRepost": "yes"
        }]);

        let posts = posts_from_value(&payload);
        assert_eq!(posts[0].likes, 0);
        assert_eq!(posts[0].views, 1234);
        assert!(!posts[0].is_repost);
    }

    #[test]
    fn test_non_array_payload() {
        assert!(posts_from_value(&json!(null)).is_empty());
        assert!(posts_from_value(&json!({"posts": []})).is_empty());
    }
}
