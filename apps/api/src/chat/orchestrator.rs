//! One chat turn: persist the user message, stream the completion to the
//! caller through a bounded channel, then record how the turn ended.
//!
//! The HTTP response drains the channel. When the client goes away the
//! receiver is dropped, the producer notices on its next send (or while
//! waiting on the provider) and drops the upstream stream, closing the
//! provider connection.

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::response::sse::{Event, KeepAlive, Sse};
use chrono::Utc;
use futures::StreamExt;
use serde_json::json;
use tokio::sync::mpsc;
use tokio::time::{timeout_at, Instant};
use tokio_stream::wrappers::ReceiverStream;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::auth::Owner;
use crate::errors::AppError;
use crate::llm_client::{CompletionStream, LlmError, StreamEvent};
use crate::models::message::{latest_user_message, ChatMessage, NewMessage, Role};
use crate::models::turn::TurnStatus;
use crate::state::AppState;
use crate::store::{ProjectStore, TurnHandle};

pub type EventSender = mpsc::Sender<Result<Event, Infallible>>;
pub type ChatResponse = Sse<ReceiverStream<Result<Event, Infallible>>>;

/// Shown to the caller when a reply cannot be produced. Details stay in the log.
pub const GENERIC_FAILURE: &str = "Failed to generate a response. Please try again.";

/// How the producer stopped.
#[derive(Debug, PartialEq)]
enum RelayOutcome {
    Finished(String),
    Failed(String),
    Disconnected,
}

/// Runs one turn against an already-authorized project.
///
/// Errors before the first byte (no user message, a turn already in flight,
/// the provider refusing the request) come back as `AppError`. Once the
/// stream has started, failures are reported as an `error` event.
pub async fn run_turn(
    state: &AppState,
    owner: &Owner,
    project_id: Uuid,
    system: String,
    messages: Vec<ChatMessage>,
) -> Result<ChatResponse, AppError> {
    let deadline = Instant::now() + state.config.request_timeout;
    let latest = latest_user_input(&messages)?;

    let user_message = NewMessage::now(
        Role::User,
        latest.persisted_parts(),
        latest.attachments.clone(),
    );

    let turn = state
        .projects
        .begin_turn(
            owner,
            project_id,
            user_message,
            state.config.stale_turn_cutoff(Utc::now()),
        )
        .await?;

    let ceiling = state.config.request_timeout;
    let upstream = match timeout_at(deadline, state.llm.stream(&system, &messages)).await {
        Ok(Ok(stream)) => stream,
        Ok(Err(e)) => return Err(fail_before_stream(state, &turn, e).await),
        Err(_) => return Err(fail_before_stream(state, &turn, LlmError::Timeout(ceiling)).await),
    };

    let (tx, rx) = mpsc::channel(state.config.stream_buffer.max(1));
    tokio::spawn(relay(
        state.projects.clone(),
        turn,
        upstream,
        tx,
        deadline,
        ceiling,
    ));

    Ok(Sse::new(ReceiverStream::new(rx)).keep_alive(KeepAlive::default()))
}

/// The newest user message, which must carry some text.
pub fn latest_user_input(messages: &[ChatMessage]) -> Result<&ChatMessage, AppError> {
    let latest = latest_user_message(messages)
        .ok_or_else(|| AppError::NotFound("No user message found".into()))?;
    if latest.text().trim().is_empty() {
        return Err(AppError::Validation("Message cannot be empty".into()));
    }
    Ok(latest)
}

async fn fail_before_stream(state: &AppState, turn: &TurnHandle, e: LlmError) -> AppError {
    error!(
        "Completion request for project {} failed: {e}",
        turn.project_id
    );
    if let Err(close_err) = state
        .projects
        .close_turn(turn, TurnStatus::Failed, Some(&e.to_string()))
        .await
    {
        error!("Failed to close turn {}: {close_err}", turn.turn_id);
    }
    AppError::Llm(e)
}

/// Producer task: pumps the completion into the channel until the request
/// deadline, then closes the turn.
async fn relay(
    store: Arc<dyn ProjectStore>,
    turn: TurnHandle,
    upstream: CompletionStream,
    tx: EventSender,
    deadline: Instant,
    ceiling: Duration,
) {
    let outcome = match timeout_at(deadline, pump(upstream, &tx)).await {
        Ok(outcome) => outcome,
        Err(_) => RelayOutcome::Failed(format!("reply not finished within {ceiling:?}")),
    };

    match outcome {
        RelayOutcome::Finished(text) => {
            let reply = NewMessage::assistant_text(text);
            let message_id = reply.id;
            match store.complete_turn(&turn, reply).await {
                Ok(()) => {
                    let finish = Event::default()
                        .event("finish")
                        .data(json!({ "messageId": message_id }).to_string());
                    // The client may already be gone; the reply is stored either way.
                    let _ = tx.send(Ok(finish)).await;
                }
                Err(e) => {
                    error!("Failed to store reply for turn {}: {e}", turn.turn_id);
                    send_error(&tx).await;
                }
            }
        }
        RelayOutcome::Failed(reason) => {
            warn!(
                "Chat turn {} on project {} failed, user message {} kept: {reason}",
                turn.turn_id, turn.project_id, turn.user_message_id
            );
            close(&*store, &turn, TurnStatus::Failed, &reason).await;
            send_error(&tx).await;
        }
        RelayOutcome::Disconnected => {
            info!(
                "Client left during turn {} on project {}",
                turn.turn_id, turn.project_id
            );
            close(&*store, &turn, TurnStatus::Cancelled, "client disconnected").await;
        }
    }
}

/// Forwards deltas until the provider finishes, fails, or the client leaves.
/// The upstream stream is dropped on return.
async fn pump(mut upstream: CompletionStream, tx: &EventSender) -> RelayOutcome {
    let mut text = String::new();

    loop {
        let next = tokio::select! {
            item = upstream.next() => item,
            _ = tx.closed() => return RelayOutcome::Disconnected,
        };

        match next {
            Some(Ok(StreamEvent::Delta(delta))) => {
                if delta.is_empty() {
                    continue;
                }
                text.push_str(&delta);
                // SSE data cannot carry carriage returns.
                let event = Event::default().event("text").data(delta.replace('\r', ""));
                if tx.send(Ok(event)).await.is_err() {
                    return RelayOutcome::Disconnected;
                }
            }
            Some(Ok(StreamEvent::Finished)) => {
                return if text.trim().is_empty() {
                    RelayOutcome::Failed("completion finished without any text".into())
                } else {
                    RelayOutcome::Finished(text)
                };
            }
            Some(Err(e)) => return RelayOutcome::Failed(e.to_string()),
            None => {
                return RelayOutcome::Failed(
                    "completion stream ended before the message was finished".into(),
                )
            }
        }
    }
}

async fn close(store: &dyn ProjectStore, turn: &TurnHandle, status: TurnStatus, reason: &str) {
    if let Err(e) = store.close_turn(turn, status, Some(reason)).await {
        error!("Failed to close turn {}: {e}", turn.turn_id);
    }
}

async fn send_error(tx: &EventSender) {
    let event = Event::default()
        .event("error")
        .data(json!({ "message": GENERIC_FAILURE }).to_string());
    let _ = tx.send(Ok(event)).await;
}
