//! Website assistant backed by the Grok chat completions API.
//!
//! Conversations are keyed by a client-generated session id and persisted
//! turn by turn.  The user's turn is saved before the upstream call, so a
//! provider outage loses nothing; the visitor can retry and the context is
//! still there.

use std::time::Duration;

use axum::extract::State;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::debug;

use docket_store::{AiChatSession, ChatTurn, StoreError};

use crate::api::AppState;
use crate::error::{ensure, ApiError, Json};

const XAI_ENDPOINT: &str = "https://api.x.ai/v1/chat/completions";
const MODEL: &str = "grok-2-latest";

/// Turns of history sent upstream per request, newest last.
const HISTORY_WINDOW: usize = 20;

const SYSTEM_PROMPT: &str = "You are the website assistant for Sterling & Associates, \
a law firm practicing civil litigation, family law, business law, and estate planning. \
Answer questions about the firm's practice areas, process, and how to book a consultation. \
You are not a lawyer and must not give legal advice or predict case outcomes; \
for anything case-specific, suggest booking a consultation through the website. \
Keep answers short and plain.";

pub struct AiClient {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
}

#[derive(Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: Vec<WireMessage<'a>>,
    temperature: f32,
}

#[derive(Serialize)]
struct WireMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct CompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    content: String,
}

impl AiClient {
    pub fn new(api_key: String) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_default();

        Self {
            client,
            api_key,
            base_url: XAI_ENDPOINT.to_string(),
        }
    }

    #[cfg(test)]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Send the trailing conversation window and return the assistant reply.
    pub async fn chat(&self, history: &[ChatTurn]) -> Result<String, ApiError> {
        let start = history.len().saturating_sub(HISTORY_WINDOW);
        let mut messages = Vec::with_capacity(history.len() - start + 1);
        messages.push(WireMessage {
            role: "system",
            content: SYSTEM_PROMPT,
        });
        for turn in &history[start..] {
            messages.push(WireMessage {
                role: &turn.role,
                content: &turn.content,
            });
        }

        let body = CompletionRequest {
            model: MODEL,
            messages,
            temperature: 0.3,
        };

        let resp = self
            .client
            .post(&self.base_url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| ApiError::Upstream(format!("request failed: {e}")))?;

        if !resp.status().is_success() {
            return Err(ApiError::Upstream(format!(
                "provider returned {}",
                resp.status()
            )));
        }

        let completion: CompletionResponse = resp
            .json()
            .await
            .map_err(|e| ApiError::Upstream(format!("malformed response: {e}")))?;

        completion
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| ApiError::Upstream("empty completion".to_string()))
    }
}

// ---------------------------------------------------------------------------
// Handler
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    session_id: String,
    message: String,
    client_email: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatResponse {
    session_id: String,
    response: String,
}

/// POST /api/ai/chat
pub async fn chat(
    State(state): State<AppState>,
    Json(req): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, ApiError> {
    ensure(!req.session_id.trim().is_empty(), "chat: empty session id")?;
    ensure(req.session_id.len() <= 128, "chat: session id too long")?;
    let message = req.message.trim();
    ensure(!message.is_empty(), "chat: empty message")?;
    ensure(message.len() <= 4000, "chat: message too long")?;

    let now = Utc::now();

    let mut session = {
        let db = state.db.lock().await;
        match db.get_chat_session(&req.session_id) {
            Ok(session) => session,
            Err(StoreError::NotFound) => AiChatSession {
                session_id: req.session_id.clone(),
                client_email: None,
                messages: Vec::new(),
                status: "active".to_string(),
                created_at: now,
                updated_at: now,
            },
            Err(other) => return Err(ApiError::Store(other)),
        }
    };

    if req.client_email.is_some() {
        session.client_email = req.client_email;
    }
    session.messages.push(ChatTurn {
        role: "user".to_string(),
        content: message.to_string(),
        timestamp: now,
    });
    session.updated_at = now;

    // Persist the user's turn before calling upstream.
    {
        let db = state.db.lock().await;
        db.upsert_chat_session(&session)?;
    }

    let reply = state.ai.chat(&session.messages).await?;

    session.messages.push(ChatTurn {
        role: "assistant".to_string(),
        content: reply.clone(),
        timestamp: Utc::now(),
    });
    session.updated_at = Utc::now();

    {
        let db = state.db.lock().await;
        db.upsert_chat_session(&session)?;
    }

    debug!(session_id = %session.session_id, turns = session.messages.len(), "chat turn completed");

    Ok(Json(ChatResponse {
        session_id: session.session_id,
        response: reply,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unreachable_provider_is_an_upstream_error() {
        let client = AiClient::new("test-key".into()).with_base_url("http://127.0.0.1:9/v1/chat");
        let history = vec![ChatTurn {
            role: "user".into(),
            content: "hello".into(),
            timestamp: Utc::now(),
        }];
        let err = client.chat(&history).await.unwrap_err();
        assert!(matches!(err, ApiError::Upstream(_)));
    }

    #[test]
    fn history_window_keeps_newest_turns() {
        let turns: Vec<ChatTurn> = (0..30)
            .map(|i| ChatTurn {
                role: "user".into(),
                content: format!("turn {i}"),
                timestamp: Utc::now(),
            })
            .collect();
        let start = turns.len().saturating_sub(HISTORY_WINDOW);
        assert_eq!(start, 10);
        assert_eq!(turns[start].content, "turn 10");
    }
}
