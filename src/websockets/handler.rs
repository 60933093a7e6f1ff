use async_trait::async_trait;
use axum::{
    extract::{Path, State, WebSocketUpgrade},
    http::HeaderMap,
    response::Response,
};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::shared::{AppError, AppState};
use crate::websockets::messages::{ClientEvent, ServerEvent};

use super::socket::{Connection, MessageHandler};

/// Parses client events and dispatches them to the room actor. Errors are
/// answered inline to the sender only; successful operations emit their
/// own events from inside the actor.
pub struct LooproomReceiveHandler {
    app_state: AppState,
    display_name: String,
}

impl LooproomReceiveHandler {
    pub fn new(app_state: AppState, display_name: String) -> Self {
        Self {
            app_state,
            display_name,
        }
    }

    async fn dispatch(
        &self,
        user_id: &str,
        bound_room_id: &str,
        event: ClientEvent,
    ) -> Result<(), AppError> {
        // every event is scoped to the room this connection authenticated
        // against; a mismatched payload is rejected, not rerouted
        if let Some(room_id) = event.room_id() {
            if room_id != bound_room_id {
                return Err(AppError::Forbidden(
                    "Event addresses a different room".to_string(),
                ));
            }
        }

        match event {
            ClientEvent::JoinLooproom { mood, silent, .. } => {
                let actor = self.app_state.registry.get_or_create(bound_room_id).await?;
                let snapshot = actor
                    .join(user_id, &self.display_name, mood, silent)
                    .await?;

                // the joiner gets history and the current room picture;
                // everyone else was already notified by the actor
                self.send_to(
                    user_id,
                    &ServerEvent::MessageHistory {
                        messages: snapshot.history,
                    },
                )
                .await;
                self.send_to(
                    user_id,
                    &ServerEvent::ParticipantsUpdated {
                        participants: snapshot.participants,
                        participant_count: snapshot.participant_count,
                    },
                )
                .await;
                if let Some(session) = snapshot.session.filter(|s| s.is_live()) {
                    self.send_to(user_id, &ServerEvent::SessionStarted { session })
                        .await;
                }
                Ok(())
            }
            ClientEvent::LeaveLooproom { .. } => {
                if let Some(actor) = self.app_state.registry.get(bound_room_id).await {
                    actor.leave(user_id).await;
                }
                Ok(())
            }
            ClientEvent::SendMessage {
                content, reply_to, ..
            } => {
                let actor = self.live_room(bound_room_id).await?;
                actor.send_message(user_id, content, reply_to).await?;
                Ok(())
            }
            ClientEvent::Typing { is_typing, .. } => {
                let actor = self.live_room(bound_room_id).await?;
                actor.typing(user_id, is_typing).await
            }
            ClientEvent::ReactToMessage { message_id, emoji } => {
                let actor = self.live_room(bound_room_id).await?;
                actor.react(user_id, &message_id, &emoji).await
            }
            ClientEvent::StartSession { stream_url, .. } => {
                let actor = self.live_room(bound_room_id).await?;
                actor.start_session(user_id, stream_url).await?;
                Ok(())
            }
            ClientEvent::EndSession { .. } => {
                let actor = self.live_room(bound_room_id).await?;
                actor.end_session(user_id).await?;
                Ok(())
            }
            ClientEvent::PauseSession { .. } => {
                let actor = self.live_room(bound_room_id).await?;
                actor.pause_session(user_id).await
            }
            ClientEvent::ResumeSession { .. } => {
                let actor = self.live_room(bound_room_id).await?;
                actor.resume_session(user_id).await
            }
            ClientEvent::UpdateStream { stream_url, .. } => {
                let actor = self.live_room(bound_room_id).await?;
                actor.update_stream(user_id, stream_url).await
            }
            ClientEvent::ModerateUser {
                target_user_id,
                action,
                reason,
                duration_minutes,
                ..
            } => {
                let actor = self.live_room(bound_room_id).await?;
                actor
                    .moderate(user_id, target_user_id, action, reason, duration_minutes)
                    .await
            }
            ClientEvent::DeleteMessage { message_id, .. } => {
                let actor = self.live_room(bound_room_id).await?;
                actor.delete_message(user_id, &message_id).await
            }
            ClientEvent::PinMessage { message_id, .. } => {
                let actor = self.live_room(bound_room_id).await?;
                actor.pin_message(user_id, &message_id).await
            }
            ClientEvent::SendAnnouncement { content, .. } => {
                let actor = self.live_room(bound_room_id).await?;
                actor.announce(user_id, content).await?;
                Ok(())
            }
            ClientEvent::StartBroadcast {
                media_descriptor, ..
            } => {
                let actor = self.live_room(bound_room_id).await?;
                actor.start_broadcast(user_id, media_descriptor).await
            }
            ClientEvent::StopBroadcast { .. } => {
                let actor = self.live_room(bound_room_id).await?;
                actor.stop_broadcast(user_id).await
            }
            ClientEvent::RequestStream { .. } => {
                let actor = self.live_room(bound_room_id).await?;
                actor.request_stream(user_id).await
            }
            ClientEvent::WebrtcOffer {
                target_user_id,
                offer,
                ..
            } => {
                let actor = self.live_room(bound_room_id).await?;
                actor.relay_offer(user_id, &target_user_id, offer).await
            }
            ClientEvent::WebrtcAnswer { answer, .. } => {
                let actor = self.live_room(bound_room_id).await?;
                actor.relay_answer(user_id, answer).await
            }
            ClientEvent::IceCandidate {
                candidate,
                user_id: target,
                ..
            } => {
                let actor = self.live_room(bound_room_id).await?;
                actor.relay_ice(user_id, target, candidate).await
            }
        }
    }

    async fn live_room(
        &self,
        room_id: &str,
    ) -> Result<Arc<crate::room::actor::RoomActor>, AppError> {
        self.app_state
            .registry
            .get(room_id)
            .await
            .ok_or_else(|| AppError::RoomNotFound(room_id.to_string()))
    }

    async fn send_to(&self, user_id: &str, event: &ServerEvent) {
        self.app_state
            .connection_manager
            .send_to_user(user_id, &event.to_json())
            .await;
    }
}

#[async_trait]
impl MessageHandler for LooproomReceiveHandler {
    async fn handle_message(&self, user_id: &str, room_id: &str, message: String) {
        debug!(
            user_id = %user_id,
            room_id = %room_id,
            "Received message"
        );

        let event = match serde_json::from_str::<ClientEvent>(&message) {
            Ok(event) => event,
            Err(e) => {
                warn!(
                    user_id = %user_id,
                    room_id = %room_id,
                    error = %e,
                    "Failed to parse client event"
                );
                self.send_to(
                    user_id,
                    &ServerEvent::Error {
                        code: "invalid_event".to_string(),
                        message: e.to_string(),
                    },
                )
                .await;
                return;
            }
        };

        if let Err(e) = self.dispatch(user_id, room_id, event).await {
            debug!(
                user_id = %user_id,
                room_id = %room_id,
                error = %e,
                "Event rejected"
            );
            self.send_to(user_id, &ServerEvent::error(&e)).await;
        }
    }
}

/// WebSocket endpoint that handles authentication via Sec-WebSocket-Protocol header
/// GET /ws/{room_id} with JWT token in Sec-WebSocket-Protocol header
pub async fn websocket_handler(
    ws: WebSocketUpgrade,
    Path(room_id): Path<String>,
    headers: HeaderMap,
    State(app_state): State<AppState>,
) -> Result<Response, AppError> {
    info!(
        room_id = %room_id,
        "WebSocket connection requested"
    );

    let jwt_token = headers
        .get("sec-websocket-protocol")
        .and_then(|h| h.to_str().ok())
        .ok_or_else(|| {
            warn!("Missing or invalid Sec-WebSocket-Protocol header");
            AppError::Unauthorized("Missing authentication token".to_string())
        })?;

    let claims = app_state.token_config.validate_token(jwt_token)?;

    // reject before upgrading when the room record does not exist
    let room = app_state.looproom_repository.get_room(&room_id).await?;
    if room.is_none() {
        warn!(
            room_id = %room_id,
            "Room not found, rejecting WebSocket connection"
        );
        return Err(AppError::RoomNotFound(room_id));
    }

    info!(
        room_id = %room_id,
        user_id = %claims.user_id,
        "WebSocket authentication successful"
    );
    Ok(ws.on_upgrade(move |socket| {
        handle_websocket_connection(socket, room_id, claims.user_id, claims.name, app_state)
    }))
}

/// Handle the upgraded WebSocket connection
async fn handle_websocket_connection(
    socket: axum::extract::ws::WebSocket,
    room_id: String,
    user_id: String,
    name: String,
    app_state: AppState,
) {
    info!(
        room_id = %room_id,
        user_id = %user_id,
        "WebSocket connection established"
    );

    // the manager keeps the only sender; kicks and bans hang up by
    // removing the entry
    let outbound_receiver = app_state
        .connection_manager
        .register(user_id.clone())
        .await;

    let handler = Arc::new(LooproomReceiveHandler::new(app_state.clone(), name.clone()));
    let connection = Connection::new(
        user_id.clone(),
        room_id.clone(),
        Box::new(socket),
        outbound_receiver,
        handler,
    );

    if let Err(e) = connection.run().await {
        warn!(
            room_id = %room_id,
            user_id = %user_id,
            error = ?e,
            "WebSocket connection ended with error"
        );
    }

    // disconnect cleanup, same path for close, kick and transport error
    app_state.connection_manager.remove_connection(&user_id).await;
    if let Some(actor) = app_state.registry.get(&room_id).await {
        actor.leave(&user_id).await;
    }

    info!(
        room_id = %room_id,
        user_id = %user_id,
        name = %name,
        "WebSocket connection closed"
    );
}
