use axum::extract::ws::{Message, WebSocket};
use futures::{sink::SinkExt, stream::StreamExt};
use log;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::actions::{MoveRequest, SessionId};
use crate::application::GameService;
use crate::broadcast::{Broadcaster, ConnectionRegistry};
use crate::enums::Color;
use crate::errors::{NetworkError, RejectionKind};
use crate::session::PlayerView;

/// WebSocket message types for client-server communication
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum WsMessage {
    // Client -> server
    #[serde(rename = "join_game")]
    JoinGame,

    #[serde(rename = "cancel_join")]
    CancelJoin,

    #[serde(rename = "make_move")]
    MakeMove {
        session_id: SessionId,
        from: String,
        to: String,
        color: Color,
    },

    // Server -> client
    #[serde(rename = "greeting")]
    Greeting { message: String },

    #[serde(rename = "waiting")]
    Waiting {},

    #[serde(rename = "game_start")]
    GameStart {
        session_id: SessionId,
        color: Color,
        game: PlayerView,
    },

    #[serde(rename = "update_game")]
    UpdateGame { game: PlayerView },

    #[serde(rename = "move_rejected")]
    MoveRejected {
        session_id: SessionId,
        reason: RejectionKind,
        message: String,
    },

    #[serde(rename = "opponent_left")]
    OpponentLeft { session_id: SessionId },

    #[serde(rename = "error")]
    Error { message: String },
}

/// WebSocket service that handles real-time communication
/// This is purely an infrastructure concern - no game logic here
#[derive(Clone)]
pub struct WebSocketService {
    game_service: Arc<GameService>,
    registry: Arc<ConnectionRegistry>,
}

impl WebSocketService {
    pub fn new(game_service: Arc<GameService>, registry: Arc<ConnectionRegistry>) -> Self {
        Self {
            game_service,
            registry,
        }
    }

    /// Handle a new WebSocket connection until either side closes it
    pub async fn handle_connection(&self, socket: WebSocket) {
        let connection_id = Uuid::new_v4().to_string();
        log::info!("New connection: {}", connection_id);

        // Split socket for concurrent read/write
        let (mut sender, mut receiver) = socket.split();
        let mut outbound = self.registry.register(&connection_id);

        self.registry.deliver(
            &connection_id,
            WsMessage::Greeting {
                message: "Connected to fog-of-war chess".to_string(),
            },
        );

        // Task to forward queued messages to this client
        let mut send_task = tokio::spawn(async move {
            while let Some(message) = outbound.recv().await {
                match encode(&message) {
                    Ok(json) => {
                        if sender.send(Message::Text(json.into())).await.is_err() {
                            break; // Client disconnected
                        }
                    }
                    Err(e) => log::error!("{}", e),
                }
            }
        });

        // Task to handle incoming messages
        let service = self.clone();
        let reader_id = connection_id.clone();
        let mut recv_task = tokio::spawn(async move {
            while let Some(Ok(message)) = receiver.next().await {
                match message {
                    Message::Text(text) => service.handle_text_message(&reader_id, text.as_str()).await,
                    Message::Close(_) => break,
                    _ => {
                        // Ignore other message types
                    }
                }
            }
        });

        // Wait for either task to complete (client disconnect or error)
        tokio::select! {
            _ = &mut send_task => {
                recv_task.abort();
            }
            _ = &mut recv_task => {
                send_task.abort();
            }
        }

        self.registry.unregister(&connection_id);
        self.game_service.disconnect(&connection_id).await;
        log::info!("Disconnect: {}", connection_id);
    }

    /// Dispatch one client frame
    pub async fn handle_text_message(&self, connection_id: &str, text: &str) {
        let message = match decode(text) {
            Ok(message) => message,
            Err(e) => {
                log::warn!("Bad frame from {}: {}", connection_id, e);
                self.registry.deliver(
                    connection_id,
                    WsMessage::Error {
                        message: e.to_string(),
                    },
                );
                return;
            }
        };

        match message {
            WsMessage::JoinGame => {
                if let Err(e) = self.game_service.join(connection_id).await {
                    log::error!("Join failed for {}: {}", connection_id, e);
                }
            }
            WsMessage::CancelJoin => {
                self.game_service.cancel(connection_id);
            }
            WsMessage::MakeMove {
                session_id,
                from,
                to,
                color,
            } => {
                let request = MoveRequest {
                    session_id,
                    from,
                    to,
                    color,
                };
                // Rejections are reported to the client by the service.
                let _ = self.game_service.submit_move(connection_id, request).await;
            }
            other => {
                log::debug!("Ignoring server-bound message from {}: {:?}", connection_id, other);
            }
        }
    }
}

fn encode(message: &WsMessage) -> Result<String, NetworkError> {
    serde_json::to_string(message).map_err(NetworkError::serialization_failed)
}

fn decode(text: &str) -> Result<WsMessage, NetworkError> {
    serde_json::from_str(text).map_err(NetworkError::deserialization_failed)
}
