use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};
use uuid::Uuid;

use super::models::LooproomModel;
use crate::shared::{AppError, AppState};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomCreateRequest {
    pub name: String,
    pub creator_id: String,
    #[serde(default)]
    pub capacity: Option<i32>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomResponse {
    pub id: String,
    pub name: String,
    pub creator_id: String,
    pub capacity: Option<i32>,
}

impl From<LooproomModel> for RoomResponse {
    fn from(room: LooproomModel) -> Self {
        Self {
            id: room.id,
            name: room.name,
            creator_id: room.creator_id,
            capacity: room.capacity,
        }
    }
}

/// Readable room ids: a slug of the name plus a short random suffix so
/// two "Calm Corner" rooms never collide.
fn room_id_from_name(name: &str) -> String {
    let slug: String = name
        .to_lowercase()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '-' })
        .collect();
    let slug = slug.trim_matches('-').to_string();
    let unique = Uuid::new_v4().simple().to_string();
    let suffix = &unique[..8];
    if slug.is_empty() {
        format!("room-{suffix}")
    } else {
        format!("{slug}-{suffix}")
    }
}

/// HTTP handler for creating a new looproom
///
/// POST /looprooms
/// Returns the room record with its generated ID
#[instrument(name = "create_room", skip(state))]
pub async fn create_room(
    State(state): State<AppState>,
    Json(request): Json<RoomCreateRequest>,
) -> Result<Json<RoomResponse>, AppError> {
    let room = LooproomModel {
        id: room_id_from_name(&request.name),
        creator_id: request.creator_id,
        name: request.name,
        capacity: request.capacity,
    };
    state.looproom_repository.create_room(&room).await?;

    info!(
        room_id = %room.id,
        creator_id = %room.creator_id,
        "Room created successfully"
    );
    Ok(Json(room.into()))
}

/// HTTP handler for listing all looprooms
///
/// GET /looprooms
#[instrument(name = "list_rooms", skip(state))]
pub async fn list_rooms(
    State(state): State<AppState>,
) -> Result<Json<Vec<RoomResponse>>, AppError> {
    let rooms = state.looproom_repository.list_rooms().await?;
    info!(room_count = rooms.len(), "Rooms listed");
    Ok(Json(rooms.into_iter().map(RoomResponse::from).collect()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::test_utils::AppStateBuilder;
    use axum::{
        body::Body,
        http::{Request, StatusCode},
        Router,
    };
    use tower::ServiceExt; // for `oneshot`

    #[tokio::test]
    async fn test_create_room_handler() {
        let app_state = AppStateBuilder::new().build();

        let app = Router::new()
            .route("/looprooms", axum::routing::post(create_room))
            .with_state(app_state);

        let request_body = r#"{"name": "Calm Corner", "creatorId": "u1"}"#;
        let request = Request::builder()
            .method("POST")
            .uri("/looprooms")
            .header("content-type", "application/json")
            .body(Body::from(request_body))
            .unwrap();

        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let room: RoomResponse = serde_json::from_slice(&body).unwrap();

        assert!(room.id.starts_with("calm-corner-"));
        assert_eq!(room.creator_id, "u1");
        assert_eq!(room.capacity, None);
    }

    #[tokio::test]
    async fn test_list_rooms_handler() {
        let app_state = AppStateBuilder::new()
            .with_room(LooproomModel {
                id: "calm-corner".to_string(),
                creator_id: "u1".to_string(),
                name: "Calm Corner".to_string(),
                capacity: Some(10),
            })
            .build();

        let app = Router::new()
            .route("/looprooms", axum::routing::get(list_rooms))
            .with_state(app_state);

        let request = Request::builder()
            .method("GET")
            .uri("/looprooms")
            .body(Body::empty())
            .unwrap();

        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let rooms: Vec<RoomResponse> = serde_json::from_slice(&body).unwrap();
        assert_eq!(rooms.len(), 1);
        assert_eq!(rooms[0].id, "calm-corner");
    }

    #[test]
    fn test_room_id_slug() {
        let id = room_id_from_name("Calm Corner!");
        assert!(id.starts_with("calm-corner-"));

        let id = room_id_from_name("");
        assert!(id.starts_with("room-"));
    }
}
