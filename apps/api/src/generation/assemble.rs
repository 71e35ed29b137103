//! Reassembles the engine's structured pitch output into flat markup.
//!
//! One workflow variant returns the pitch pre-sectioned as JSON instead of a
//! single string; the persisted form is paragraph blocks in reading order with
//! no section headers.

use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct PitchSections {
    #[serde(default)]
    pub introduction: String,
    #[serde(default, rename = "starExamples")]
    pub star_examples: Vec<StarSection>,
    #[serde(default)]
    pub conclusion: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StarSection {
    #[serde(default)]
    pub content: String,
}

/// Concatenates introduction, each STAR example's content, and conclusion as
/// separate `<p>` blocks separated by blank lines. Blank sections are skipped.
pub fn assemble_markup(sections: &PitchSections) -> String {
    let mut blocks: Vec<String> = Vec::with_capacity(sections.star_examples.len() + 2);

    push_paragraph(&mut blocks, &sections.introduction);
    for example in &sections.star_examples {
        push_paragraph(&mut blocks, &example.content);
    }
    push_paragraph(&mut blocks, &sections.conclusion);

    blocks.join("\n\n")
}

fn push_paragraph(blocks: &mut Vec<String>, text: &str) {
    let text = text.trim();
    if !text.is_empty() {
        blocks.push(format!("<p>{text}</p>"));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sections(json: &str) -> PitchSections {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_assembles_intro_examples_conclusion_as_paragraphs() {
        let sections = sections(
            r#"{
                "introduction": "Intro text",
                "starExamples": [{"content": "Example text"}],
                "conclusion": "Conclusion text"
            }"#,
        );

        assert_eq!(
            assemble_markup(&sections),
            "<p>Intro text</p>\n\n<p>Example text</p>\n\n<p>Conclusion text</p>"
        );
    }

    #[test]
    fn test_multiple_examples_stay_in_order() {
        let sections = sections(
            r#"{
                "introduction": "A",
                "starExamples": [{"content": "B"}, {"content": "C"}],
                "conclusion": "D"
            }"#,
        );

        assert_eq!(
            assemble_markup(&sections),
            "<p>A</p>\n\n<p>B</p>\n\n<p>C</p>\n\n<p>D</p>"
        );
    }

    #[test]
    fn test_blank_sections_are_skipped() {
        let sections = sections(
            r#"{
                "introduction": "  ",
                "starExamples": [{"content": "Only example"}],
                "conclusion": ""
            }"#,
        );

        assert_eq!(assemble_markup(&sections), "<p>Only example</p>");
    }

    #[test]
    fn test_missing_fields_default_to_empty() {
        let sections = sections(r#"{"introduction": "Just an intro"}"#);
        assert_eq!(assemble_markup(&sections), "<p>Just an intro</p>");
    }
}
