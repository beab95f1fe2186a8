use axum::extract::{Path, State};
use axum::Json;

use messaging_types::{Channel, MessagingError};

use crate::dto::{ChannelConnectBody, ChannelStatusResponse};
use crate::error::ApiError;
use crate::extractors::AuthenticatedUser;
use crate::state::AppState;

/// Narrow `secretRef` shape check: a provider-qualified reference,
/// `scheme:id`, e.g. `vault:whatsapp/alice`. The provider itself validates
/// the secret; this only rejects obviously malformed references before
/// they're stored.
fn validate_secret_ref(secret_ref: &str) -> Result<(), ApiError> {
    let valid = secret_ref
        .split_once(':')
        .map(|(scheme, id)| !scheme.is_empty() && !id.is_empty())
        .unwrap_or(false);
    if valid {
        Ok(())
    } else {
        Err(ApiError::from(MessagingError::InvalidSecretFormat))
    }
}

/// Connects (or re-connects) a channel. `termsAcceptedAt` is the caller's
/// record of when the user accepted the named `termsVersion`; a connection
/// only becomes consent-current once both are present. Omitting it on a
/// re-connect preserves whatever acceptance was already on file rather than
/// clearing it.
#[utoipa::path(
    post,
    path = "/channels/{channel}/connect",
    params(("channel" = String, Path, description = "delivery channel: whatsapp or x")),
    request_body = ChannelConnectBody,
    responses(
        (status = 200, description = "channel connected"),
        (status = 400, description = "invalid secret reference", body = crate::error::ErrorResponse),
    ),
    tag = "channels",
)]
pub async fn channel_connect(
    State(state): State<std::sync::Arc<AppState>>,
    AuthenticatedUser(user_id): AuthenticatedUser,
    Path(channel): Path<Channel>,
    Json(body): Json<ChannelConnectBody>,
) -> Result<Json<ChannelStatusResponse>, ApiError> {
    let secret_ref = body.secret_ref.as_deref().unwrap_or("none:unset");
    validate_secret_ref(secret_ref)?;
    let terms_version = body.terms_version.unwrap_or_else(|| state.consent.legal_tos_version().to_string());

    state
        .store
        .upsert_channel_connection(&user_id, channel, &body.external_handle, secret_ref, &terms_version, body.terms_accepted_at)
        .await
        .map_err(MessagingError::from)?;

    let connection = state
        .store
        .get_channel_connection(&user_id, channel)
        .await
        .map_err(MessagingError::from)?
        .ok_or_else(|| MessagingError::internal("channel connection vanished after upsert"))?;

    Ok(Json(ChannelStatusResponse {
        channel,
        external_handle: connection.external_handle,
        status: connection.status,
        consent_current: state.consent.is_current(&connection),
        consent_version: connection.consent_version,
    }))
}

/// Disconnects a channel.
#[utoipa::path(
    post,
    path = "/channels/{channel}/disconnect",
    params(("channel" = String, Path, description = "delivery channel: whatsapp or x")),
    responses((status = 200, description = "channel disconnected")),
    tag = "channels",
)]
pub async fn channel_disconnect(
    State(state): State<std::sync::Arc<AppState>>,
    AuthenticatedUser(user_id): AuthenticatedUser,
    Path(channel): Path<Channel>,
) -> Result<(), ApiError> {
    state.store.disconnect_channel(&user_id, channel).await.map_err(MessagingError::from)?;
    Ok(())
}

/// Reports a channel's connection and consent status.
#[utoipa::path(
    get,
    path = "/channels/{channel}/status",
    params(("channel" = String, Path, description = "delivery channel: whatsapp or x")),
    responses((status = 200, description = "channel connection status", body = ChannelStatusResponse)),
    tag = "channels",
)]
pub async fn channel_status(
    State(state): State<std::sync::Arc<AppState>>,
    AuthenticatedUser(user_id): AuthenticatedUser,
    Path(channel): Path<Channel>,
) -> Result<Json<ChannelStatusResponse>, ApiError> {
    let connection = state
        .store
        .get_channel_connection(&user_id, channel)
        .await
        .map_err(MessagingError::from)?
        .ok_or_else(|| MessagingError::validation("channel", "no connection on record for this channel"))?;

    Ok(Json(ChannelStatusResponse {
        channel,
        external_handle: connection.external_handle,
        status: connection.status,
        consent_current: state.consent.is_current(&connection),
        consent_version: connection.consent_version,
    }))
}
