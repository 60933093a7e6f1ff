use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::Deserialize;
use tracing::instrument;

use super::models::MessageModel;
use crate::shared::{AppError, AppState};

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub limit: Option<u32>,
}

const MAX_HISTORY_LIMIT: u32 = 200;

/// HTTP handler for fetching persisted message history
///
/// GET /looprooms/{room_id}/messages?limit=N
/// Returns the newest N messages in oldest-first order
#[instrument(name = "recent_messages", skip(state))]
pub async fn recent_messages(
    State(state): State<AppState>,
    Path(room_id): Path<String>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<Vec<MessageModel>>, AppError> {
    if state.looproom_repository.get_room(&room_id).await?.is_none() {
        return Err(AppError::RoomNotFound(room_id));
    }

    let limit = query.limit.unwrap_or(50).min(MAX_HISTORY_LIMIT);
    let messages = state.message_repository.fetch_recent(&room_id, limit).await?;
    Ok(Json(messages))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::models::MessageKind;
    use crate::room::models::LooproomModel;
    use crate::shared::test_utils::AppStateBuilder;
    use axum::{
        body::Body,
        http::{Request, StatusCode},
        Router,
    };
    use chrono::Utc;
    use tower::ServiceExt;

    fn test_app(state: AppState) -> Router {
        Router::new()
            .route(
                "/looprooms/:room_id/messages",
                axum::routing::get(recent_messages),
            )
            .with_state(state)
    }

    #[tokio::test]
    async fn test_history_for_unknown_room_is_404() {
        let app = test_app(AppStateBuilder::new().build());

        let request = Request::builder()
            .uri("/looprooms/nope/messages")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_history_returns_saved_messages() {
        let state = AppStateBuilder::new()
            .with_room(LooproomModel {
                id: "calm-corner".to_string(),
                creator_id: "u1".to_string(),
                name: "Calm Corner".to_string(),
                capacity: None,
            })
            .build();

        let message = MessageModel::new(
            "calm-corner".to_string(),
            None,
            "u1".to_string(),
            "hello".to_string(),
            MessageKind::Message,
            None,
            Utc::now(),
        );
        state.message_repository.save_message(&message).await.unwrap();

        let app = test_app(state);
        let request = Request::builder()
            .uri("/looprooms/calm-corner/messages?limit=10")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let messages: Vec<MessageModel> = serde_json::from_slice(&body).unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].content, "hello");
    }
}
