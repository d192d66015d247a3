use log;
use rand::SeedableRng;
use rand_xorshift::XorShiftRng;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

use crate::actions::{ConnectionId, MoveRequest, Pairing, SessionId};
use crate::broadcast::Broadcaster;
use crate::config::GameConfig;
use crate::enums::{ByColor, Color, SessionStatus, COLORS};
use crate::errors::{AppResult, GameError, GameResult};
use crate::matchmaker::Matchmaker;
use crate::rules::RuleEngine;
use crate::session::{GameSession, MoveSummary, SessionSnapshot};
use crate::setup::{derive_position_notation, derive_position_notation_960, SetupGenerator};
use crate::square::Square;
use crate::websocket::WsMessage;

/// Core application service: matchmaking, session registry and move arbitration.
/// Owned by the application root and shared behind an `Arc`.
pub struct GameService {
    engine: Arc<dyn RuleEngine>,
    broadcaster: Arc<dyn Broadcaster>,
    matchmaker: Matchmaker,
    setup: std::sync::Mutex<SetupGenerator<XorShiftRng>>,
    encode_castling: bool,
    sessions: RwLock<HashMap<SessionId, Arc<Mutex<GameSession>>>>,
    memberships: RwLock<HashMap<ConnectionId, Vec<SessionId>>>,
}

/// Counters exposed on the stats endpoint
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceStats {
    /// Open transport connections; the service itself leaves this at zero
    pub connections: usize,
    pub waiting: bool,
    pub active: usize,
    pub abandoned: usize,
    pub finished: usize,
}

impl GameService {
    pub fn new(
        config: GameConfig,
        engine: Arc<dyn RuleEngine>,
        broadcaster: Arc<dyn Broadcaster>,
    ) -> Self {
        let rng = match config.seed {
            Some(seed) => XorShiftRng::seed_from_u64(seed),
            None => XorShiftRng::from_entropy(),
        };
        Self {
            engine,
            broadcaster,
            matchmaker: Matchmaker::new(),
            setup: std::sync::Mutex::new(SetupGenerator::new(rng)),
            encode_castling: config.encode_castling,
            sessions: RwLock::new(HashMap::new()),
            memberships: RwLock::new(HashMap::new()),
        }
    }

    /// Handle a join request. Returns the new session id when the join
    /// completed a pairing.
    pub async fn join(&self, connection_id: &str) -> AppResult<Option<SessionId>> {
        // Pairing and membership registration happen under one lock, so a
        // concurrent disconnect sees either the waiting slot or the session.
        let mut memberships = self.memberships.write().await;
        match self.matchmaker.join(connection_id) {
            Pairing::Waiting => {
                drop(memberships);
                self.broadcaster.deliver(connection_id, WsMessage::Waiting {});
                Ok(None)
            }
            Pairing::Paired { white, black } => {
                let players = ByColor::new(white, black);
                let created = self.create_session(players.clone(), &mut memberships).await;
                drop(memberships);
                match created {
                    Ok(session_id) => Ok(Some(session_id)),
                    Err(e) => {
                        log::error!("Failed to create session: {}", e);
                        for connection_id in [&players.white, &players.black] {
                            self.broadcaster.deliver(
                                connection_id,
                                WsMessage::Error {
                                    message: "Could not start a game".to_string(),
                                },
                            );
                        }
                        Err(e)
                    }
                }
            }
        }
    }

    /// Leave the waiting slot, if held.
    pub fn cancel(&self, connection_id: &str) -> bool {
        self.matchmaker.cancel(connection_id)
    }

    /// Caller holds the membership write lock; lock order is memberships
    /// before sessions.
    async fn create_session(
        &self,
        players: ByColor<ConnectionId>,
        memberships: &mut HashMap<ConnectionId, Vec<SessionId>>,
    ) -> AppResult<SessionId> {
        let notation = {
            let mut setup = self
                .setup
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            let white = setup.setup_side(Color::White);
            let black = setup.setup_side(Color::Black);
            if self.encode_castling {
                derive_position_notation_960(&white, &black)
            } else {
                derive_position_notation(&white, &black)
            }
        };

        let session_id = Uuid::new_v4().to_string();
        let session = GameSession::new(session_id.clone(), players.clone(), &notation, self.engine.as_ref())?;
        log::info!(
            "Session {} created: {} (white) vs {} (black)",
            session_id,
            players.white,
            players.black
        );
        log::debug!("Session {} starts from {}", session_id, notation);

        let views = ByColor::new(session.view_for(Color::White), session.view_for(Color::Black));
        {
            let mut sessions = self.sessions.write().await;
            sessions.insert(session_id.clone(), Arc::new(Mutex::new(session)));
        }
        for color in COLORS {
            memberships
                .entry(players[color].clone())
                .or_default()
                .push(session_id.clone());
        }

        for color in COLORS {
            self.broadcaster.deliver(
                &players[color],
                WsMessage::GameStart {
                    session_id: session_id.clone(),
                    color,
                    game: views[color].clone(),
                },
            );
        }
        Ok(session_id)
    }

    async fn session(&self, session_id: &str) -> GameResult<Arc<Mutex<GameSession>>> {
        let sessions = self.sessions.read().await;
        sessions
            .get(session_id)
            .cloned()
            .ok_or_else(|| GameError::unknown_session(session_id))
    }

    /// Submit a move on behalf of `connection_id`. Success is broadcast to both
    /// participants; a rejection goes back to the submitter only.
    pub async fn submit_move(&self, connection_id: &str, request: MoveRequest) -> GameResult<MoveSummary> {
        let result = self.apply(connection_id, &request).await;
        if let Err(e) = &result {
            log::debug!(
                "Rejected move {}{} from {} in {}: {}",
                request.from,
                request.to,
                connection_id,
                request.session_id,
                e
            );
            self.broadcaster.deliver(
                connection_id,
                WsMessage::MoveRejected {
                    session_id: request.session_id.clone(),
                    reason: e.kind(),
                    message: e.to_string(),
                },
            );
        }
        result
    }

    async fn apply(&self, connection_id: &str, request: &MoveRequest) -> GameResult<MoveSummary> {
        let from: Square = request.from.parse()?;
        let to: Square = request.to.parse()?;
        let session_arc = self.session(&request.session_id).await?;
        let mut session = session_arc.lock().await;

        if session.color_of(connection_id) != Some(request.color) {
            return Err(GameError::NotAParticipant {
                connection_id: connection_id.to_string(),
                color: request.color,
            });
        }

        let summary = session.apply_move(self.engine.as_ref(), request.color, from, to)?;
        log::debug!(
            "Session {}: {} played {}{}",
            request.session_id,
            summary.color,
            summary.from,
            summary.to
        );

        // Delivered under the session lock so updates reach clients in move order.
        for color in COLORS {
            self.broadcaster.deliver(
                &session.players()[color],
                WsMessage::UpdateGame {
                    game: session.view_for(color),
                },
            );
        }
        Ok(summary)
    }

    /// Connection went away: free the waiting slot and abandon any active
    /// session it played in, notifying the remaining participant.
    pub async fn disconnect(&self, connection_id: &str) {
        let session_ids = {
            let mut memberships = self.memberships.write().await;
            if self.matchmaker.cancel(connection_id) {
                log::info!("{} disconnected while waiting", connection_id);
            }
            memberships.remove(connection_id).unwrap_or_default()
        };

        for session_id in session_ids {
            let Ok(session_arc) = self.session(&session_id).await else {
                continue;
            };
            let mut session = session_arc.lock().await;
            let Some(color) = session.color_of(connection_id) else {
                continue;
            };
            if !session.abandon(color) {
                continue;
            }
            log::info!("Session {} abandoned by {} ({})", session_id, connection_id, color);

            let remaining = color.opponent();
            let opponent_id = session.players()[remaining].clone();
            self.broadcaster.deliver(
                &opponent_id,
                WsMessage::OpponentLeft {
                    session_id: session_id.clone(),
                },
            );
            self.broadcaster.deliver(
                &opponent_id,
                WsMessage::UpdateGame {
                    game: session.view_for(remaining),
                },
            );
        }
    }

    /// Full unredacted state of a session
    pub async fn snapshot(&self, session_id: &str) -> GameResult<SessionSnapshot> {
        let session_arc = self.session(session_id).await?;
        let session = session_arc.lock().await;
        Ok(session.snapshot())
    }

    pub async fn stats(&self) -> ServiceStats {
        let mut stats = ServiceStats {
            waiting: self.matchmaker.waiting().is_some(),
            ..ServiceStats::default()
        };
        let sessions: Vec<_> = self.sessions.read().await.values().cloned().collect();
        for session_arc in sessions {
            match session_arc.lock().await.status() {
                SessionStatus::Active => stats.active += 1,
                SessionStatus::Abandoned { .. } => stats.abandoned += 1,
                SessionStatus::Finished { .. } => stats.finished += 1,
            }
        }
        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::RejectionKind;
    use crate::rules::ShakmatyEngine;

    #[derive(Default)]
    struct RecordingBroadcaster {
        sent: std::sync::Mutex<Vec<(ConnectionId, WsMessage)>>,
    }

    impl RecordingBroadcaster {
        fn take(&self) -> Vec<(ConnectionId, WsMessage)> {
            std::mem::take(&mut *self.sent.lock().unwrap())
        }
    }

    impl Broadcaster for RecordingBroadcaster {
        fn deliver(&self, connection_id: &str, message: WsMessage) {
            self.sent
                .lock()
                .unwrap()
                .push((connection_id.to_string(), message));
        }
    }

    fn service() -> (GameService, Arc<RecordingBroadcaster>) {
        let recorder = Arc::new(RecordingBroadcaster::default());
        let config = GameConfig {
            seed: Some(17),
            encode_castling: false,
        };
        let service = GameService::new(config, Arc::new(ShakmatyEngine::new()), recorder.clone());
        (service, recorder)
    }

    fn request(session_id: &str, from: &str, to: &str, color: Color) -> MoveRequest {
        MoveRequest {
            session_id: session_id.to_string(),
            from: from.to_string(),
            to: to.to_string(),
            color,
        }
    }

    async fn paired(service: &GameService, recorder: &RecordingBroadcaster) -> SessionId {
        service.join("alice").await.unwrap();
        let session_id = service.join("bob").await.unwrap().unwrap();
        recorder.take();
        session_id
    }

    #[tokio::test]
    async fn test_single_join_waits_without_session() {
        let (service, recorder) = service();
        assert_eq!(service.join("alice").await.unwrap(), None);
        assert_eq!(recorder.take(), vec![("alice".to_string(), WsMessage::Waiting {})]);
        let stats = service.stats().await;
        assert!(stats.waiting);
        assert_eq!(stats.active, 0);
    }

    #[tokio::test]
    async fn test_pairing_starts_game_for_both_players() {
        let (service, recorder) = service();
        service.join("alice").await.unwrap();
        recorder.take();
        let session_id = service.join("bob").await.unwrap().expect("paired");

        let sent = recorder.take();
        assert_eq!(sent.len(), 2);
        for (connection_id, expected_color) in [("alice", Color::White), ("bob", Color::Black)] {
            let message = sent
                .iter()
                .find(|(to, _)| to == connection_id)
                .map(|(_, message)| message.clone())
                .unwrap();
            match message {
                WsMessage::GameStart { session_id: id, color, game } => {
                    assert_eq!(id, session_id);
                    assert_eq!(color, expected_color);
                    assert_eq!(game.pieces.len(), 16);
                    assert_eq!(game.hidden.len(), 16);
                }
                other => panic!("unexpected message {:?}", other),
            }
        }

        let snapshot = service.snapshot(&session_id).await.unwrap();
        assert_eq!(snapshot.players.white, "alice");
        assert_eq!(snapshot.players.black, "bob");
        assert_eq!(snapshot.turn, Color::White);
        let stats = service.stats().await;
        assert!(!stats.waiting);
        assert_eq!(stats.active, 1);
    }

    #[tokio::test]
    async fn test_accepted_move_updates_both_players() {
        let (service, recorder) = service();
        let session_id = paired(&service, &recorder).await;

        service
            .submit_move("alice", request(&session_id, "e2", "e4", Color::White))
            .await
            .unwrap();

        let sent = recorder.take();
        assert_eq!(sent.len(), 2);
        assert!(sent.iter().all(|(_, message)| matches!(message, WsMessage::UpdateGame { game } if game.turn == Color::Black)));
        assert_eq!(service.snapshot(&session_id).await.unwrap().turn, Color::Black);
    }

    #[tokio::test]
    async fn test_rejections_reach_only_the_submitter() {
        let (service, recorder) = service();
        let session_id = paired(&service, &recorder).await;
        let before = service.snapshot(&session_id).await.unwrap();

        let cases = [
            ("alice", request("missing", "e2", "e4", Color::White), RejectionKind::UnknownSession),
            ("bob", request(&session_id, "e2", "e4", Color::White), RejectionKind::NotAParticipant),
            ("bob", request(&session_id, "e7", "e5", Color::Black), RejectionKind::TurnViolation),
            ("alice", request(&session_id, "e3", "e4", Color::White), RejectionKind::StaleOwnership),
            ("alice", request(&session_id, "e2", "e5", Color::White), RejectionKind::IllegalMove),
            ("alice", request(&session_id, "e2", "e9", Color::White), RejectionKind::InvalidSquare),
            ("alice", request(&session_id, "zz", "e4", Color::White), RejectionKind::InvalidSquare),
        ];
        for (connection_id, move_request, expected) in cases {
            let err = service.submit_move(connection_id, move_request).await.unwrap_err();
            assert_eq!(err.kind(), expected);
            let sent = recorder.take();
            assert_eq!(sent.len(), 1);
            assert_eq!(sent[0].0, connection_id);
            assert!(matches!(sent[0].1, WsMessage::MoveRejected { reason, .. } if reason == expected));
        }
        assert_eq!(service.snapshot(&session_id).await.unwrap(), before);
    }

    #[tokio::test]
    async fn test_disconnect_abandons_and_notifies_opponent() {
        let (service, recorder) = service();
        let session_id = paired(&service, &recorder).await;

        service.disconnect("bob").await;
        let sent = recorder.take();
        assert!(sent.iter().all(|(to, _)| to == "alice"));
        assert!(sent
            .iter()
            .any(|(_, message)| matches!(message, WsMessage::OpponentLeft { session_id: id } if *id == session_id)));
        assert_eq!(
            service.snapshot(&session_id).await.unwrap().status,
            SessionStatus::Abandoned { by: Color::Black }
        );

        let err = service
            .submit_move("alice", request(&session_id, "e2", "e4", Color::White))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), RejectionKind::SessionNotActive);
        assert_eq!(service.stats().await.abandoned, 1);
    }

    #[tokio::test]
    async fn test_disconnect_while_waiting_frees_slot() {
        let (service, recorder) = service();
        service.join("alice").await.unwrap();
        service.disconnect("alice").await;
        recorder.take();

        assert_eq!(service.join("bob").await.unwrap(), None);
        assert!(service.cancel("bob"));
        assert!(!service.stats().await.waiting);
    }

    #[tokio::test]
    async fn test_encoded_castling_sessions_start() {
        let recorder = Arc::new(RecordingBroadcaster::default());
        let config = GameConfig {
            seed: Some(3),
            encode_castling: true,
        };
        let service = GameService::new(config, Arc::new(ShakmatyEngine::new()), recorder.clone());
        for round in 0..10 {
            service.join(&format!("w{}", round)).await.unwrap();
            assert!(service.join(&format!("b{}", round)).await.unwrap().is_some());
        }
        assert_eq!(service.stats().await.active, 10);
    }

    #[tokio::test]
    async fn test_disconnect_during_pairing_abandons_session() {
        let (service, recorder) = service();
        let service = Arc::new(service);
        service.join("alice").await.unwrap();
        recorder.take();

        // Stall session creation after the matchmaker has paired the two.
        let sessions_guard = service.sessions.write().await;
        let joining = {
            let service = service.clone();
            tokio::spawn(async move { service.join("bob").await })
        };
        while service.matchmaker.waiting().is_some() {
            tokio::task::yield_now().await;
        }
        let leaving = {
            let service = service.clone();
            tokio::spawn(async move { service.disconnect("alice").await })
        };
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
        drop(sessions_guard);

        let session_id = joining.await.unwrap().unwrap().expect("paired");
        leaving.await.unwrap();

        assert_eq!(
            service.snapshot(&session_id).await.unwrap().status,
            SessionStatus::Abandoned { by: Color::White }
        );
        let sent = recorder.take();
        assert!(sent
            .iter()
            .any(|(to, message)| to == "bob" && matches!(message, WsMessage::OpponentLeft { .. })));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_submissions_are_serialized() {
        let (service, recorder) = service();
        let service = Arc::new(service);
        let session_id = paired(&service, &recorder).await;

        let handles: Vec<_> = (0..2)
            .map(|_| {
                let service = service.clone();
                let session_id = session_id.clone();
                tokio::spawn(async move {
                    service
                        .submit_move("alice", request(&session_id, "e2", "e4", Color::White))
                        .await
                })
            })
            .collect();

        let mut accepted = 0;
        let mut rejected = Vec::new();
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => accepted += 1,
                Err(e) => rejected.push(e.kind()),
            }
        }
        assert_eq!(accepted, 1);
        assert_eq!(rejected, vec![RejectionKind::TurnViolation]);

        let snapshot = service.snapshot(&session_id).await.unwrap();
        assert_eq!(snapshot.turn, Color::Black);
        assert!(snapshot.position.contains(" b "));
    }
}
