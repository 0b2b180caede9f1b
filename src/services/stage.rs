use crate::config::TransitionPolicy;
use crate::models::{EssayType, Stage};
use crate::prompts;

/// Inputs that count as asking for an evaluation under
/// [`TransitionPolicy::ReviewKeywords`]. Matched as lowercase substrings.
pub const REVIEW_KEYWORDS: &[&str] = &[
    "grade",
    "grades",
    "grading",
    "graded",
    "score",
    "scores",
    "scoring",
    "scored",
    "review",
    "reviews",
    "reviewing",
    "reviewed",
    "assess",
    "assesses",
    "assessing",
    "assessed",
    "assessment",
    "evaluate",
    "evaluates",
    "evaluating",
    "evaluated",
    "evaluation",
    "feedback",
    "rubric",
];

/// Result of feeding one user input through the stage engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub stage: Stage,
    pub essay_type: EssayType,
    /// Static guidance for the resulting stage; empty when the table has none.
    pub guidance: String,
    /// Whether this turn should be answered as an essay evaluation.
    pub review: bool,
}

/// Decide the next stage and essay type for `input` and look up the
/// guidance to inject. Pure: no state is read or written.
pub fn advance(
    policy: TransitionPolicy,
    stage: Stage,
    essay_type: EssayType,
    input: &str,
) -> Transition {
    let lowered = input.to_lowercase();

    let (mut next_stage, next_type) = match stage {
        Stage::Initial if input.contains('1') => (Stage::TopicSelection, EssayType::DesignCase),
        Stage::Initial if input.contains('2') => (Stage::TopicSelection, EssayType::Critique),
        Stage::TopicSelection if lowered.contains("outline") => (Stage::Outline, essay_type),
        Stage::Outline if lowered.contains("draft") => (Stage::Drafting, essay_type),
        Stage::Drafting if lowered.contains("review") => (Stage::Review, essay_type),
        _ => (stage, essay_type),
    };

    let keyword_review =
        policy == TransitionPolicy::ReviewKeywords && mentions_review(&lowered);
    if keyword_review {
        next_stage = Stage::Review;
    }

    Transition {
        stage: next_stage,
        essay_type: next_type,
        guidance: guidance_for(next_stage, next_type, &lowered),
        review: next_stage == Stage::Review,
    }
}

fn mentions_review(lowered: &str) -> bool {
    REVIEW_KEYWORDS.iter().any(|k| lowered.contains(k))
}

/// Guidance table indexed by (stage, essay type). Drafting guidance is shared
/// by both essay types and gains a section prompt when the input names one.
pub fn guidance_for(stage: Stage, essay_type: EssayType, lowered_input: &str) -> String {
    match (stage, essay_type) {
        (Stage::TopicSelection, EssayType::DesignCase) => prompts::TOPIC_DESIGN_CASE.to_string(),
        (Stage::TopicSelection, EssayType::Critique) => prompts::TOPIC_CRITIQUE.to_string(),
        (Stage::Outline, EssayType::DesignCase) => prompts::OUTLINE_DESIGN_CASE.to_string(),
        (Stage::Outline, EssayType::Critique) => prompts::OUTLINE_CRITIQUE.to_string(),
        (Stage::Drafting, _) => match section_prompt(lowered_input) {
            Some(section) => format!("{}\n\n{}", prompts::DRAFTING, section),
            None => prompts::DRAFTING.to_string(),
        },
        _ => String::new(),
    }
}

fn section_prompt(lowered_input: &str) -> Option<&'static str> {
    if lowered_input.contains("introduction") {
        Some(prompts::SECTION_INTRODUCTION)
    } else if lowered_input.contains("conclusion") {
        Some(prompts::SECTION_CONCLUSION)
    } else if lowered_input.contains("body") {
        Some(prompts::SECTION_BODY)
    } else {
        None
    }
}
