//! Static instructional text sent to the completion provider or shown to the
//! student. The prose lives in the sibling `.md` files.

pub const WELCOME_MESSAGE: &str = include_str!("welcome.md");

pub const SYSTEM_INSTRUCTIONS: &str = include_str!("system_instructions.md");

/// Review steps, rubric and output template for essay evaluation.
pub const REVIEW_INSTRUCTIONS: &str = include_str!("review_instructions.md");

/// Appended verbatim to every reply produced in review mode.
pub const DISCLAIMER: &str = include_str!("disclaimer.md");

pub const TOPIC_DESIGN_CASE: &str = include_str!("topic_design_case.md");
pub const TOPIC_CRITIQUE: &str = include_str!("topic_critique.md");
pub const OUTLINE_DESIGN_CASE: &str = include_str!("outline_design_case.md");
pub const OUTLINE_CRITIQUE: &str = include_str!("outline_critique.md");
pub const DRAFTING: &str = include_str!("drafting.md");

pub const SECTION_INTRODUCTION: &str = include_str!("section_introduction.md");
pub const SECTION_BODY: &str = include_str!("section_body.md");
pub const SECTION_CONCLUSION: &str = include_str!("section_conclusion.md");

/// Instruction used by the summary title strategy.
pub const TITLE_INSTRUCTION: &str = "Create a 2-3 word title for this conversation.";
