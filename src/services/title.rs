use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::config::{TitleConfig, TitleStrategyKind};
use crate::models::{Message, Role};
use crate::prompts;
use crate::providers::{CompletionProvider, CompletionRequest, Turn};
use crate::services::cache::TtlCache;
use crate::services::clock::TimeFormatter;

const FALLBACK_TITLE: &str = "New Chat";
const MAX_TITLE_CHARS: usize = 60;
const SUMMARY_CONTEXT_MESSAGES: usize = 5;
const SUMMARY_MEMO_TTL: Duration = Duration::from_secs(6 * 60 * 60);

/// Everything a strategy may look at when (re)titling a conversation.
pub struct TitleContext<'a> {
    pub conversation_id: &'a str,
    /// All persisted messages, oldest first.
    pub messages: &'a [Message],
}

/// Produces a conversation title. Implementations must be idempotent:
/// the same context yields the same title.
#[async_trait]
pub trait TitleStrategy: Send + Sync {
    async fn title(&self, ctx: &TitleContext<'_>) -> String;
}

pub fn build_strategy(
    config: &TitleConfig,
    provider: Arc<dyn CompletionProvider>,
    model: &str,
    formatter: TimeFormatter,
) -> Arc<dyn TitleStrategy> {
    let leading = LeadingWords::new(config.words);
    match config.strategy {
        TitleStrategyKind::LeadingWords => Arc::new(leading),
        TitleStrategyKind::Summary => Arc::new(SummaryTitle::new(
            provider,
            model.to_string(),
            formatter,
            leading,
        )),
    }
}

/// First few words of the student's opening message.
#[derive(Debug, Clone)]
pub struct LeadingWords {
    words: usize,
}

impl LeadingWords {
    pub fn new(words: usize) -> Self {
        Self {
            words: words.max(1),
        }
    }

    pub fn title_from_messages(&self, messages: &[Message]) -> String {
        let source = messages
            .iter()
            .find(|m| m.role == Role::User)
            .or_else(|| messages.first())
            .map(|m| m.content.as_str())
            .unwrap_or_default();
        self.title_from_text(source)
    }

    pub fn title_from_text(&self, text: &str) -> String {
        let mut words = text.split_whitespace();
        let head: Vec<&str> = words.by_ref().take(self.words).collect();
        if head.is_empty() {
            return FALLBACK_TITLE.to_string();
        }
        let mut title = head.join(" ");
        let truncated = words.next().is_some();

        if title.chars().count() > MAX_TITLE_CHARS {
            title = title.chars().take(MAX_TITLE_CHARS - 3).collect();
            title.push_str("...");
        } else if truncated {
            title.push_str("...");
        }
        title
    }
}

#[async_trait]
impl TitleStrategy for LeadingWords {
    async fn title(&self, ctx: &TitleContext<'_>) -> String {
        self.title_from_messages(ctx.messages)
    }
}

/// Provider-generated 2-3 word summary, formatted as
/// `<date> • <summary> [<n> messages]`. Summaries are memoised per
/// (conversation, message count).
pub struct SummaryTitle {
    provider: Arc<dyn CompletionProvider>,
    model: String,
    formatter: TimeFormatter,
    fallback: LeadingWords,
    memo: TtlCache<(String, usize), String>,
}

impl SummaryTitle {
    pub fn new(
        provider: Arc<dyn CompletionProvider>,
        model: String,
        formatter: TimeFormatter,
        fallback: LeadingWords,
    ) -> Self {
        Self {
            provider,
            model,
            formatter,
            fallback,
            memo: TtlCache::new(SUMMARY_MEMO_TTL),
        }
    }

    async fn summarise(&self, messages: &[Message]) -> String {
        let start = messages.len().saturating_sub(SUMMARY_CONTEXT_MESSAGES);
        let context = messages[start..]
            .iter()
            .map(|m| m.content.as_str())
            .collect::<Vec<_>>()
            .join(" ");

        let request = CompletionRequest {
            model: self.model.clone(),
            turns: vec![Turn::system(prompts::TITLE_INSTRUCTION), Turn::user(context)],
            temperature: 0.3,
            max_tokens: 10,
        };

        match self.provider.complete(request).await {
            Ok(response) => {
                let summary = response.content.trim().trim_matches('"').trim().to_string();
                if summary.is_empty() {
                    self.fallback.title_from_messages(messages)
                } else {
                    summary
                }
            }
            Err(e) => {
                tracing::warn!("Title summary failed, using leading words: {}", e);
                self.fallback.title_from_messages(messages)
            }
        }
    }
}

#[async_trait]
impl TitleStrategy for SummaryTitle {
    async fn title(&self, ctx: &TitleContext<'_>) -> String {
        let count = ctx.messages.len();
        let key = (ctx.conversation_id.to_string(), count);
        if let Some(title) = self.memo.get(&key) {
            return title;
        }

        let summary = self.summarise(ctx.messages).await;
        let date = ctx
            .messages
            .first()
            .map(|m| self.formatter.title_date(m.created_at))
            .unwrap_or_default();
        let title = format!("{} • {} [{} messages]", date, summary, count);

        self.memo.insert(key, title.clone());
        title
    }
}
