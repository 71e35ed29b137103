//! Allow-list HTML sanitizer for everything the service persists as markup.
//!
//! Callback payloads come from an upstream we don't control and user edits
//! come from a rich-text surface; both pass through here before any write.

use std::collections::HashSet;

/// Basic text and structure tags only. No attributes survive.
const ALLOWED_TAGS: &[&str] = &[
    "p", "br", "strong", "em", "b", "i", "u", "ul", "ol", "li",
];

/// Strips everything outside the allow-list, keeping inner text of removed
/// structural tags and dropping script/style content entirely.
pub fn sanitize_markup(input: &str) -> String {
    let tags: HashSet<&str> = ALLOWED_TAGS.iter().copied().collect();

    ammonia::Builder::default()
        .tags(tags)
        .generic_attributes(HashSet::new())
        .clean(input)
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keeps_paragraphs_and_emphasis() {
        let input = "<p>Led the <strong>data platform</strong> rebuild.</p>";
        assert_eq!(sanitize_markup(input), input);
    }

    #[test]
    fn test_strips_script_including_content() {
        let input = "<p>ok</p><script>alert('x')</script>";
        assert_eq!(sanitize_markup(input), "<p>ok</p>");
    }

    #[test]
    fn test_strips_disallowed_tags_but_keeps_text() {
        let input = "<div><p>kept</p></div>";
        assert_eq!(sanitize_markup(input), "<p>kept</p>");
    }

    #[test]
    fn test_strips_attributes_from_allowed_tags() {
        let input = r#"<p onclick="steal()">text</p>"#;
        assert_eq!(sanitize_markup(input), "<p>text</p>");
    }

    #[test]
    fn test_plain_text_passes_through() {
        let input = "Focus on stakeholder outcomes before tooling.";
        assert_eq!(sanitize_markup(input), input);
    }
}
