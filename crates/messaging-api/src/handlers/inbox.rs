use axum::{extract::State, Json};

use crate::dto::{InboxMessage, InboxResponse};
use crate::error::ApiError;
use crate::extractors::AuthenticatedUser;
use crate::state::AppState;

/// `inbox(userId)` → ordered list of messages (by created_at desc) with
/// sender wallet joined.
#[utoipa::path(
    get,
    path = "/inbox",
    responses((status = 200, description = "inbox listing", body = InboxResponse)),
    tag = "messages",
)]
pub async fn inbox(
    State(state): State<std::sync::Arc<AppState>>,
    AuthenticatedUser(user_id): AuthenticatedUser,
) -> Result<Json<InboxResponse>, ApiError> {
    let entries = state.store.list_inbox(&user_id).await.map_err(messaging_types::MessagingError::from)?;
    let messages = entries
        .into_iter()
        .map(|entry| InboxMessage::from_entry(entry.message, entry.sender_wallet_address))
        .collect();
    Ok(Json(InboxResponse { messages }))
}
