//! WebSocket upgrade + message loop. Each client message is parsed as JSON and
//! forwarded to core logic. We reply with a single JSON message per request.

use std::sync::Arc;
use axum::{
  extract::{
    ws::{Message, WebSocket},
    State, WebSocketUpgrade,
  },
  response::IntoResponse,
};
use tracing::{debug, error, info, instrument};

use crate::logic;
use crate::protocol::{ClientWsMessage, ServerWsMessage};
use crate::state::AppState;

#[instrument(level = "info", skip(state))]
pub async fn ws_upgrade(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> impl IntoResponse {
  info!(target: "sulva_backend", "WebSocket upgrade requested");
  ws.on_upgrade(move |socket| handle_ws(socket, state))
}

#[instrument(level = "info", skip(socket, state))]
async fn handle_ws(mut socket: WebSocket, state: Arc<AppState>) {
  info!(target: "sulva_backend", "WebSocket connected");
  while let Some(Ok(msg)) = socket.recv().await {
    match msg {
      Message::Text(txt) => {
        // Parse, dispatch, serialize response.
        let reply_msg = match serde_json::from_str::<ClientWsMessage>(&txt) {
          Ok(incoming) => {
            debug!(target: "sulva_backend", "WS received: {:?}", &incoming);
            handle_client_ws(incoming, &state).await
          }
          Err(e) => ServerWsMessage::Error { message: format!("Invalid JSON: {}", e) },
        };

        let out = serde_json::to_string(&reply_msg).unwrap_or_else(|e| {
          serde_json::json!({ "type": "error", "message": format!("Serialization error: {}", e) }).to_string()
        });

        if let Err(e) = socket.send(Message::Text(out)).await {
          error!(target: "sulva_backend", error = %e, "WS send error");
          break;
        }
      }
      Message::Ping(payload) => { let _ = socket.send(Message::Pong(payload)).await; }
      Message::Close(_) => break,
      _ => {}
    }
  }
  info!(target: "sulva_backend", "WebSocket disconnected");
}

/// Dispatch one client message. Failures surface as an `error` message with
/// the same text the HTTP layer would use.
#[instrument(level = "info", skip(msg, state))]
async fn handle_client_ws(msg: ClientWsMessage, state: &AppState) -> ServerWsMessage {
  match msg {
    ClientWsMessage::Ping => ServerWsMessage::Pong,

    ClientWsMessage::ListMaterials => {
      ServerWsMessage::Materials { materials: state.materials.list().await }
    }

    ClientWsMessage::SaveMaterial { text, name } => {
      match logic::save_pasted_material(state, &text, name).await {
        Ok(material) => ServerWsMessage::MaterialSaved { material },
        Err(e) => ServerWsMessage::Error { message: e.to_string() },
      }
    }

    ClientWsMessage::DeleteMaterial { id } => {
      let deleted = state.materials.delete(&id).await;
      ServerWsMessage::MaterialDeleted { id, deleted }
    }

    ClientWsMessage::GenerateQuiz { user_id, source_text, mode, count } => {
      match logic::generate_quiz(state, &user_id, &source_text, mode, count).await {
        Ok(out) => {
          info!(target: "session", session_id = %out.session_id, "WS quiz generated");
          ServerWsMessage::Quiz {
            session_id: out.session_id,
            quiz: out.quiz,
            remaining_today: out.remaining_today,
          }
        }
        Err(e) => ServerWsMessage::Error { message: e.to_string() },
      }
    }

    ClientWsMessage::SubmitAnswer { session_id, answer } => {
      match logic::submit_answer(state, &session_id, answer).await {
        Ok(result) => ServerWsMessage::Answer { result },
        Err(e) => ServerWsMessage::Error { message: e.to_string() },
      }
    }

    ClientWsMessage::Advance { session_id } => {
      match logic::advance(state, &session_id).await {
        Ok(result) => ServerWsMessage::Advanced { result },
        Err(e) => ServerWsMessage::Error { message: e.to_string() },
      }
    }

    ClientWsMessage::Restart { session_id } => {
      match logic::restart(state, &session_id).await {
        Ok(session) => ServerWsMessage::Restarted { session },
        Err(e) => ServerWsMessage::Error { message: e.to_string() },
      }
    }

    ClientWsMessage::Summary { session_id } => {
      match logic::summary(state, &session_id).await {
        Ok(summary) => ServerWsMessage::Summary { summary },
        Err(e) => ServerWsMessage::Error { message: e.to_string() },
      }
    }
  }
}
