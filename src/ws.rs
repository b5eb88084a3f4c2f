//! WebSocket test runs with live progress.
//!
//! Each text frame the client sends starts one run (same body as
//! `POST /start_test`, blank means all datasets). The server answers with
//! `accepted`, one `progress` per classified utterance, then `completed`
//! carrying the full report, or `error`.

use axum::{
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::IntoResponse,
};
use futures::{Sink, SinkExt, Stream, StreamExt};
use serde::Serialize;
use std::fmt::Display;
use uuid::Uuid;

use crate::AppState;
use crate::api::parse_selection;
use crate::report::TestReport;
use crate::types::TestResult;

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WsMessage {
    Accepted {
        run_id: String,
        total: usize,
    },
    Progress {
        run_id: String,
        completed: usize,
        total: usize,
        result: TestResult,
    },
    Completed {
        run_id: String,
        report: TestReport,
    },
    Error {
        run_id: Option<String>,
        error: String,
    },
}

pub async fn start_test_socket(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn send<S>(sender: &mut S, message: &WsMessage) -> bool
where
    S: Sink<Message> + Unpin,
    S::Error: Display,
{
    let text = match serde_json::to_string(message) {
        Ok(text) => text,
        Err(e) => {
            tracing::error!("Failed to serialize WebSocket message: {}", e);
            return false;
        }
    };
    match sender.send(Message::Text(text)).await {
        Ok(()) => true,
        Err(e) => {
            tracing::debug!("WebSocket send failed: {}", e);
            false
        }
    }
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let (sender, receiver) = socket.split();
    tracing::info!("WebSocket client connected");
    serve_runs(sender, receiver, state).await;
    tracing::info!("WebSocket client disconnected");
}

/// Answer every text frame with one test run until the client goes away.
async fn serve_runs<S, R, E>(mut sender: S, mut receiver: R, state: AppState)
where
    S: Sink<Message> + Unpin,
    S::Error: Display,
    R: Stream<Item = Result<Message, E>> + Unpin,
    E: Display,
{
    while let Some(message) = receiver.next().await {
        let text = match message {
            Ok(Message::Text(text)) => text,
            Ok(Message::Ping(data)) => {
                if sender.send(Message::Pong(data)).await.is_err() {
                    break;
                }
                continue;
            }
            Ok(Message::Close(_)) => break,
            Ok(_) => continue,
            Err(e) => {
                tracing::debug!("WebSocket receive failed: {}", e);
                break;
            }
        };

        if !run_over_socket(&mut sender, &state, &text).await {
            break;
        }
    }
}

/// Run one test and stream its progress. Returns false once the client is
/// unreachable.
async fn run_over_socket<S>(sender: &mut S, state: &AppState, text: &str) -> bool
where
    S: Sink<Message> + Unpin,
    S::Error: Display,
{
    let records = match parse_selection(text.as_bytes()) {
        Ok(selection) => state.load_records(&selection).await,
        Err(e) => Err(e),
    };
    let records = match records {
        Ok(records) => records,
        Err(e) => {
            let error = WsMessage::Error {
                run_id: None,
                error: e.to_string(),
            };
            return send(sender, &error).await;
        }
    };

    let run_id = Uuid::new_v4().to_string();
    let total = records.len();
    tracing::info!(%run_id, total, "WebSocket test run accepted");

    let accepted = WsMessage::Accepted {
        run_id: run_id.clone(),
        total,
    };
    if !send(sender, &accepted).await {
        return false;
    }

    let (progress_tx, progress_rx) = flume::bounded::<TestResult>(64);
    let run_state = state.clone();
    let run = tokio::spawn(async move { run_state.execute(records, Some(progress_tx)).await });

    // Keep draining after a send failure so the run is never blocked on us.
    let mut connected = true;
    let mut completed = 0;
    while let Ok(result) = progress_rx.recv_async().await {
        completed += 1;
        if connected {
            let progress = WsMessage::Progress {
                run_id: run_id.clone(),
                completed,
                total,
                result,
            };
            connected = send(sender, &progress).await;
        }
    }

    let message = match run.await {
        Ok(report) => WsMessage::Completed { run_id, report },
        Err(e) => {
            tracing::error!(%run_id, "Test run task failed: {}", e);
            WsMessage::Error {
                run_id: Some(run_id),
                error: "Test run failed".to_string(),
            }
        }
    };

    connected && send(sender, &message).await
}
