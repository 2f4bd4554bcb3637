//! Drives the chat screen: owns the message log and runs one turn at a time
//! through locate, ask, and resolve.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::assistant::{AssistantEndpoint, EndpointError, TurnRequest};
use crate::location::{Coordinates, FALLBACK_COORDINATES, LocationProvider, locate_or_fallback};
use crate::session::{Content, Message, MessageLog, Sender, Status};
use crate::settings::EffectiveSettings;

pub const TYPING_INDICATOR: &str = "...";
pub const APOLOGY: &str = "Ne pare rău, a apărut o eroare. Te rog încearcă din nou.";
pub const SUGGESTIONS: [&str; 3] = [
    "Caut o rochie de seară unică",
    "Găsește-mi un cadou de la un artizan local",
    "Recomandă-mi un designer roman",
];

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TurnSettings {
    pub location_timeout: Duration,
    pub request_timeout: Duration,
    pub fallback: Coordinates,
}

impl Default for TurnSettings {
    fn default() -> Self {
        Self {
            location_timeout: Duration::from_secs(5),
            request_timeout: Duration::from_secs(30),
            fallback: FALLBACK_COORDINATES,
        }
    }
}

impl From<&EffectiveSettings> for TurnSettings {
    fn from(eff: &EffectiveSettings) -> Self {
        Self {
            location_timeout: eff.location_timeout,
            request_timeout: eff.request_timeout,
            fallback: eff.fallback,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnOutcome {
    /// Blank input; nothing happened.
    Ignored,
    /// Another turn was still in flight.
    Busy,
    Answered { reply_id: Uuid },
    Failed { reply_id: Uuid },
    /// The session was reset while this turn was out; its result was dropped.
    Discarded,
}

#[derive(Debug)]
struct ChatState {
    log: MessageLog,
    generation: u64,
    in_flight: bool,
    active: bool,
}

impl ChatState {
    fn fresh(generation: u64) -> Self {
        Self {
            log: MessageLog::seeded(),
            generation,
            in_flight: false,
            active: false,
        }
    }
}

#[derive(Clone)]
pub struct SessionController {
    endpoint: Arc<dyn AssistantEndpoint>,
    location: Arc<dyn LocationProvider>,
    settings: TurnSettings,
    state: Arc<Mutex<ChatState>>,
}

impl SessionController {
    pub fn new(
        endpoint: Arc<dyn AssistantEndpoint>,
        location: Arc<dyn LocationProvider>,
        settings: TurnSettings,
    ) -> Self {
        Self {
            endpoint,
            location,
            settings,
            state: Arc::new(Mutex::new(ChatState::fresh(0))),
        }
    }

    pub async fn snapshot(&self) -> Vec<Message> {
        self.state.lock().await.log.snapshot()
    }

    pub async fn is_active(&self) -> bool {
        self.state.lock().await.active
    }

    pub async fn is_busy(&self) -> bool {
        self.state.lock().await.in_flight
    }

    /// Prompts offered on the welcome view; empty once the chat is active.
    pub async fn suggestions(&self) -> &'static [&'static str] {
        if self.is_active().await { &[] } else { &SUGGESTIONS }
    }

    /// Drops the transcript back to the greeting. Any turn still in flight
    /// finishes against the old generation and is discarded.
    pub async fn reset_session(&self) {
        let mut state = self.state.lock().await;
        let next = state.generation.wrapping_add(1);
        *state = ChatState::fresh(next);
        tracing::info!(generation = next, "conversation reset");
    }

    pub async fn submit_turn(&self, raw_text: &str) -> TurnOutcome {
        if raw_text.trim().is_empty() {
            return TurnOutcome::Ignored;
        }

        let (generation, placeholder_id) = {
            let mut state = self.state.lock().await;
            if state.in_flight || state.log.pending_count() > 0 {
                tracing::debug!("turn already in flight, ignoring submission");
                return TurnOutcome::Busy;
            }
            let user = Message::user(raw_text);
            let placeholder = Message::new(Sender::Assistant, TYPING_INDICATOR, Status::Pending);
            let placeholder_id = placeholder.id;
            if let Err(err) = state
                .log
                .append(user)
                .and_then(|()| state.log.append(placeholder))
            {
                tracing::error!(error = %err, "message log rejected new turn");
                return TurnOutcome::Ignored;
            }
            state.in_flight = true;
            state.active = true;
            (state.generation, placeholder_id)
        };

        let at = locate_or_fallback(
            self.location.as_ref(),
            self.settings.location_timeout,
            self.settings.fallback,
        )
        .await;
        let req = TurnRequest::new(raw_text, at);
        tracing::debug!(latitude = at.latitude, longitude = at.longitude, "sending turn");

        let limit = self.settings.request_timeout;
        let result = match tokio::time::timeout(limit, self.endpoint.ask(&req)).await {
            Ok(res) => res,
            Err(_) => Err(EndpointError::Timeout(limit)),
        };

        let mut state = self.state.lock().await;
        if state.generation != generation || !state.log.contains(placeholder_id) {
            tracing::debug!(generation, "session reset during turn, dropping result");
            return TurnOutcome::Discarded;
        }

        let (content, outcome) = match result {
            Ok(reply) => (reply, TurnOutcome::Answered { reply_id: placeholder_id }),
            Err(err) => {
                tracing::warn!(kind = err.kind(), error = %err, "assistant turn failed");
                (Content::from(APOLOGY), TurnOutcome::Failed { reply_id: placeholder_id })
            }
        };
        if let Err(err) = state.log.replace(placeholder_id, content, Status::Final) {
            tracing::error!(error = %err, "could not resolve placeholder");
        }
        state.in_flight = false;
        outcome
    }
}
