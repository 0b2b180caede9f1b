use serde::{Deserialize, Serialize};

/// Coarse phase of the guided writing workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Stage {
    Initial,
    TopicSelection,
    Outline,
    Drafting,
    Review,
}

impl Stage {
    pub const ALL: [Stage; 5] = [
        Stage::Initial,
        Stage::TopicSelection,
        Stage::Outline,
        Stage::Drafting,
        Stage::Review,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Initial => "initial",
            Stage::TopicSelection => "topic_selection",
            Stage::Outline => "outline",
            Stage::Drafting => "drafting",
            Stage::Review => "review",
        }
    }

    /// Accepts `topic` as shorthand for `topic_selection`.
    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "initial" => Some(Stage::Initial),
            "topic" | "topic_selection" => Some(Stage::TopicSelection),
            "outline" => Some(Stage::Outline),
            "drafting" | "draft" => Some(Stage::Drafting),
            "review" => Some(Stage::Review),
            _ => None,
        }
    }
}

/// Which assignment variant the student is pursuing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EssayType {
    Unset,
    DesignCase,
    Critique,
}

impl EssayType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EssayType::Unset => "unset",
            EssayType::DesignCase => "design_case",
            EssayType::Critique => "critique",
        }
    }
}
