use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};

use crate::models::Profile;
use crate::services;
use crate::services::presence::PresenceStatus;
use crate::state::ServiceContext;

pub async fn list_online(
    State(ctx): State<ServiceContext>,
) -> Json<Vec<Profile>> {
    Json(services::presence::list_online(&ctx).await)
}

pub async fn get_presence(
    State(ctx): State<ServiceContext>,
    Path(user_id): Path<String>,
) -> Result<Json<PresenceStatus>, (StatusCode, String)> {
    services::presence::get_presence(&ctx, &user_id)
        .await
        .map(Json)
        .map_err(|e| (StatusCode::BAD_REQUEST, e))
}

pub async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({"ok": true}))
}
