use serde::Serialize;

use crate::models::Profile;
use crate::state::ServiceContext;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PresenceStatus {
    pub user_id: String,
    pub online: bool,
}

pub async fn list_online(ctx: &ServiceContext) -> Vec<Profile> {
    ctx.relay.online().await
}

pub async fn get_presence(ctx: &ServiceContext, user_id: &str) -> Result<PresenceStatus, String> {
    if user_id.trim().is_empty() {
        return Err("user id must not be empty".to_string());
    }
    Ok(PresenceStatus {
        user_id: user_id.to_string(),
        online: ctx.relay.is_online(user_id).await,
    })
}
