use axum::{extract::State, Json};

use messaging_types::MessagingError;

use crate::dto::PricingProfileBody;
use crate::error::ApiError;
use crate::extractors::AuthenticatedUser;
use crate::state::AppState;

/// `pricing-get(userId)`.
#[utoipa::path(
    get,
    path = "/pricing",
    responses((status = 200, description = "current pricing profile", body = PricingProfileBody)),
    tag = "pricing",
)]
pub async fn pricing_get(
    State(state): State<std::sync::Arc<AppState>>,
    AuthenticatedUser(user_id): AuthenticatedUser,
) -> Result<Json<PricingProfileBody>, ApiError> {
    let profile = state.store.get_pricing_profile(&user_id).await.map_err(MessagingError::from)?;
    Ok(Json(profile.into()))
}

/// `pricing-set(userId, defaults)`.
#[utoipa::path(
    put,
    path = "/pricing",
    request_body = PricingProfileBody,
    responses(
        (status = 200, description = "pricing profile stored", body = PricingProfileBody),
        (status = 400, description = "invalid pricing values", body = crate::error::ErrorResponse),
    ),
    tag = "pricing",
)]
pub async fn pricing_set(
    State(state): State<std::sync::Arc<AppState>>,
    AuthenticatedUser(user_id): AuthenticatedUser,
    Json(body): Json<PricingProfileBody>,
) -> Result<Json<PricingProfileBody>, ApiError> {
    let profile: messaging_types::PricingProfile = body.into();
    if !profile.is_valid() {
        return Err(ApiError::from(MessagingError::validation(
            "return_discount_bps",
            "must be within 0..=10000 and prices must be non-negative",
        )));
    }
    state.store.set_pricing_profile(&user_id, &profile).await.map_err(MessagingError::from)?;
    Ok(Json(profile.into()))
}
