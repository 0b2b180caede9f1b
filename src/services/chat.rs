use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use thiserror::Error;

use crate::config::{ChatConfig, TransitionPolicy};
use crate::models::{EssayType, Message, Role, Session, Stage};
use crate::prompts;
use crate::providers::{CompletionProvider, CompletionRequest, ProviderError, Turn};
use crate::services::clock::Clock;
use crate::services::conversation::ConversationStore;
use crate::services::stage;

#[derive(Debug, Error)]
pub enum ChatError {
    #[error("Please type a message first")]
    EmptyInput,

    #[error("Please log in first")]
    NotAuthenticated,

    #[error("Your session expired after a period of inactivity. Please log in again.")]
    SessionExpired,

    #[error("Error processing message: {0}")]
    Provider(#[from] ProviderError),

    /// The exchange is visible in the session but was not saved.
    #[error("Error saving conversation: {0:#}")]
    Persistence(anyhow::Error),
}

/// Selected before the provider call; fixes the length cap and temperature.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenerationMode {
    Guidance,
    Review,
}

#[derive(Debug, Clone)]
pub struct TurnOutcome {
    pub reply: Message,
    pub mode: GenerationMode,
    pub stage: Stage,
    pub essay_type: EssayType,
    pub conversation_id: String,
}

/// Turns one user input into one persisted exchange.
pub struct ChatService {
    provider: Arc<dyn CompletionProvider>,
    store: ConversationStore,
    clock: Arc<dyn Clock>,
    config: ChatConfig,
    model: String,
    session_timeout: Duration,
}

impl ChatService {
    pub fn new(
        provider: Arc<dyn CompletionProvider>,
        store: ConversationStore,
        clock: Arc<dyn Clock>,
        config: ChatConfig,
        model: String,
        session_timeout: Duration,
    ) -> Self {
        Self {
            provider,
            store,
            clock,
            config,
            model,
            session_timeout,
        }
    }

    pub fn policy(&self) -> TransitionPolicy {
        self.config.transition_policy
    }

    /// Run one chat turn against `session`.
    ///
    /// On provider failure the session keeps its messages and stage untouched
    /// and nothing is stored. On storage failure both new messages stay in the
    /// session and the error is returned.
    pub async fn send(&self, session: &mut Session, input: &str) -> Result<TurnOutcome, ChatError> {
        let now = self.clock.now();
        self.check_session(session, now)?;

        let input = input.trim();
        if input.is_empty() {
            return Err(ChatError::EmptyInput);
        }
        session.touch(now);

        let transition = stage::advance(
            self.config.transition_policy,
            session.stage,
            session.essay_type,
            input,
        );
        if transition.stage != session.stage {
            tracing::info!(
                "Stage {} -> {} ({})",
                session.stage.as_str(),
                transition.stage.as_str(),
                transition.essay_type.as_str()
            );
        }

        let mode = if transition.review {
            GenerationMode::Review
        } else {
            GenerationMode::Guidance
        };
        let request = self.build_request(mode, &transition.guidance, &session.messages, input);

        let user_message = Message::user(input, now);
        let response = match self.provider.complete(request).await {
            Ok(r) => r,
            Err(e) => {
                tracing::error!("Completion via {} failed: {}", self.provider.name(), e);
                return Err(ChatError::Provider(e));
            }
        };
        tracing::debug!(
            "Completion from {} used {:?} prompt / {:?} completion tokens",
            response.model,
            response.tokens_in,
            response.tokens_out
        );
        session.stage = transition.stage;
        session.essay_type = transition.essay_type;

        let content = match mode {
            GenerationMode::Review => format!("{}\n\n{}", response.content, prompts::DISCLAIMER),
            GenerationMode::Guidance => response.content,
        };
        let reply = Message::assistant(content, self.clock.now());

        session.messages.push(user_message.clone());
        session.messages.push(reply.clone());

        let conversation_id = self
            .persist(session, &user_message, &reply)
            .await
            .map_err(|e| {
                tracing::error!("Failed to persist exchange: {:#}", e);
                ChatError::Persistence(e)
            })?;

        tracing::info!(
            "Turn stored in {} (stage={}, mode={:?})",
            conversation_id,
            session.stage.as_str(),
            mode
        );

        Ok(TurnOutcome {
            reply,
            mode,
            stage: session.stage,
            essay_type: session.essay_type,
            conversation_id,
        })
    }

    /// Manual stage override from the sidebar.
    pub fn override_stage(&self, session: &mut Session, stage: Stage) {
        tracing::info!("Stage manually set to {}", stage.as_str());
        session.stage = stage;
        session.touch(self.clock.now());
    }

    /// Session gate for actions other than chatting (history, stage, admin).
    /// Counts as activity when the session is still live.
    pub fn ensure_active(&self, session: &mut Session) -> Result<(), ChatError> {
        let now = self.clock.now();
        self.check_session(session, now)?;
        session.touch(now);
        Ok(())
    }

    fn check_session(&self, session: &mut Session, now: DateTime<Utc>) -> Result<(), ChatError> {
        if !session.authenticated {
            return Err(ChatError::NotAuthenticated);
        }
        if session.is_expired(now, self.session_timeout) {
            tracing::info!("Session for {} expired", session.user.email);
            session.logout();
            return Err(ChatError::SessionExpired);
        }
        Ok(())
    }

    /// Fixed order: instructions, stage guidance, review rubric, history, new input.
    fn build_request(
        &self,
        mode: GenerationMode,
        guidance: &str,
        history: &[Message],
        input: &str,
    ) -> CompletionRequest {
        let mut turns = vec![Turn::system(prompts::SYSTEM_INSTRUCTIONS)];
        if !guidance.is_empty() {
            turns.push(Turn::system(guidance));
        }
        if mode == GenerationMode::Review {
            turns.push(Turn::system(prompts::REVIEW_INSTRUCTIONS));
        }
        turns.extend(
            history
                .iter()
                .filter(|m| m.role != Role::System)
                .map(|m| Turn::new(m.role, m.content.clone())),
        );
        turns.push(Turn::user(input));

        let (max_tokens, temperature) = match mode {
            GenerationMode::Guidance => (
                self.config.guidance_max_tokens,
                self.config.guidance_temperature,
            ),
            GenerationMode::Review => (self.config.review_max_tokens, self.config.review_temperature),
        };

        CompletionRequest {
            model: self.model.clone(),
            turns,
            temperature,
            max_tokens,
        }
    }

    async fn persist(
        &self,
        session: &mut Session,
        user_message: &Message,
        reply: &Message,
    ) -> anyhow::Result<String> {
        let user_id = session.user.id.clone();
        if let Some(stale) = session.conversation_id.clone() {
            if !self.store.exists(&stale).await? {
                tracing::warn!("Conversation {} no longer exists, starting a new one", stale);
                session.conversation_id = None;
            }
        }
        let id = self
            .store
            .append(session.conversation_id.as_deref(), &user_id, user_message)
            .await?;
        session.conversation_id = Some(id.clone());
        self.store.append(Some(&id), &user_id, reply).await?;
        Ok(id)
    }
}
