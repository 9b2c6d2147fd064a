//! Content resolution for polymorphic message payloads.

use crate::types::{ContentBlock, MessageContent};

/// Resolve a content payload to plain text.
///
/// A string is returned as-is, including the empty string; callers decide
/// whether empty text is renderable. For a block list the first `text`
/// block wins. Anything else resolves to `None`.
pub fn resolve_content(content: Option<&MessageContent>) -> Option<&str> {
    match content? {
        MessageContent::Text(text) => Some(text.as_str()),
        MessageContent::Blocks(blocks) => blocks.iter().find_map(|block| match block {
            ContentBlock::Text(block) => Some(block.text.as_str()),
            ContentBlock::Other(_) => None,
        }),
        MessageContent::Other(_) => None,
    }
}

/// Like [`resolve_content`], but treats the empty string as no text.
pub fn renderable_text(content: Option<&MessageContent>) -> Option<&str> {
    resolve_content(content).filter(|text| !text.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn content(value: serde_json::Value) -> Option<MessageContent> {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_absent_and_null() {
        assert_eq!(resolve_content(None), None);
        assert_eq!(resolve_content(content(json!(null)).as_ref()), None);
    }

    #[test]
    fn test_plain_string_including_empty() {
        let c = content(json!("hello"));
        assert_eq!(resolve_content(c.as_ref()), Some("hello"));

        let empty = content(json!(""));
        assert_eq!(resolve_content(empty.as_ref()), Some(""));
        assert_eq!(renderable_text(empty.as_ref()), None);
    }

    #[test]
    fn test_first_text_block_wins() {
        let c = content(json!([
            {"type": "text", "text": "hi"},
            {"type": "text", "text": "second"}
        ]));
        assert_eq!(resolve_content(c.as_ref()), Some("hi"));
    }

    #[test]
    fn test_skips_non_text_blocks() {
        let c = content(json!([
            {"type": "tool_use", "id": "t1", "name": "search", "input": {}},
            {"type": "text", "text": "after"}
        ]));
        assert_eq!(resolve_content(c.as_ref()), Some("after"));
    }

    #[test]
    fn test_malformed_elements_do_not_hide_text_block() {
        let c = content(json!([{"text": "no type"}, {"type": "text", "text": "hi"}]));
        assert_eq!(resolve_content(c.as_ref()), Some("hi"));

        let c = content(json!(["raw string block", {"type": "text", "text": "hi"}]));
        assert_eq!(resolve_content(c.as_ref()), Some("hi"));

        let c = content(json!([{"type": "text", "text": null}, {"type": "text", "text": "x"}]));
        assert_eq!(resolve_content(c.as_ref()), Some("x"));
    }

    #[test]
    fn test_unresolvable_shapes() {
        assert_eq!(resolve_content(content(json!([])).as_ref()), None);
        assert_eq!(
            resolve_content(content(json!([{"type": "image_url"}])).as_ref()),
            None
        );
        assert_eq!(resolve_content(content(json!({"text": "x"})).as_ref()), None);
        assert_eq!(resolve_content(content(json!(7)).as_ref()), None);
    }
}
