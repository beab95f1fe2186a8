use axum::{extract::State, Json};

use messaging_abuse::AbuseEngine;
use messaging_audit::AuditLedger;
use messaging_orchestrator::{RecipientSelector, SendOrchestrator, SendRequest};
use messaging_types::MessagingError;

use crate::dto::{SendRequestBody, SendResponse};
use crate::error::ApiError;
use crate::extractors::{AuthenticatedUser, ClientIp};
use crate::state::AppState;

/// `send(senderId, recipientSelector, ciphertext, contentHash, idempotencyKey?)`
/// endpoint.
#[utoipa::path(
    post,
    path = "/send",
    request_body = SendRequestBody,
    responses(
        (status = 200, description = "message accepted", body = SendResponse),
        (status = 409, description = "conflict", body = crate::error::ErrorResponse),
    ),
    tag = "messages",
)]
pub async fn send(
    State(state): State<std::sync::Arc<AppState>>,
    AuthenticatedUser(sender_id): AuthenticatedUser,
    ClientIp(client_ip): ClientIp,
    Json(body): Json<SendRequestBody>,
) -> Result<Json<SendResponse>, ApiError> {
    let recipient = recipient_selector(&body)?;

    let abuse = AbuseEngine::new(&state.store, state.abuse_config.clone());
    let audit = AuditLedger::new(&state.store);
    let orchestrator = SendOrchestrator::new(
        &state.store,
        &state.lock,
        &abuse,
        &state.consent,
        &audit,
        &state.metrics,
        state.rate_limit.clone(),
    );

    let result = orchestrator
        .send(SendRequest {
            sender_id,
            recipient,
            ciphertext: body.ciphertext,
            content_hash: body.content_hash,
            idempotency_key: body.idempotency_key,
            channel: body.channel,
            client_ip,
            explicit_device_id: body.device_id,
            user_agent_hints: body.user_agent_hints,
        })
        .await?;

    Ok(Json(SendResponse {
        message_id: result.message_id,
        paid: result.paid,
        status: result.status,
    }))
}

fn recipient_selector(body: &SendRequestBody) -> Result<RecipientSelector, ApiError> {
    let set = [
        body.recipient_handle.is_some(),
        body.recipient_phone_hash.is_some(),
        body.recipient_wallet.is_some(),
    ]
    .iter()
    .filter(|present| **present)
    .count();
    if set != 1 {
        return Err(ApiError::from(MessagingError::validation(
            "recipient",
            "exactly one of recipient_handle, recipient_phone_hash, recipient_wallet is required",
        )));
    }
    if let Some(handle) = &body.recipient_handle {
        return Ok(RecipientSelector::Handle(handle.clone()));
    }
    if let Some(phone_hash) = &body.recipient_phone_hash {
        return Ok(RecipientSelector::PhoneHash(phone_hash.clone()));
    }
    Ok(RecipientSelector::Wallet(body.recipient_wallet.clone().unwrap()))
}
