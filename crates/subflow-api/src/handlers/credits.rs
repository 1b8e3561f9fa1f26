//! Credit balance handlers.

use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::Json;
use serde::Serialize;

use crate::error::ApiResult;
use crate::middleware::require_shared_secret;
use crate::state::AppState;

/// Credit balance response.
#[derive(Serialize)]
pub struct CreditBalanceResponse {
    pub user_id: String,
    pub credits: u32,
    /// Number of store transactions already applied to this balance.
    pub processed_purchases: usize,
    /// False when no credit document exists yet for the user.
    pub exists: bool,
}

/// GET /api/users/:uid/credits
///
/// Internal endpoint, protected by the same shared-secret scheme as the
/// webhook but with its own token.
pub async fn get_credit_balance(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(uid): Path<String>,
) -> ApiResult<Json<CreditBalanceResponse>> {
    require_shared_secret(&headers, state.config.internal_api_token.as_deref())?;

    let doc = state.entitlements.credit_balance(&uid).await?;

    let response = match doc {
        Some(doc) => CreditBalanceResponse {
            user_id: uid,
            credits: doc.credits,
            processed_purchases: doc.processed_purchases.len(),
            exists: true,
        },
        None => CreditBalanceResponse {
            user_id: uid,
            credits: 0,
            processed_purchases: 0,
            exists: false,
        },
    };

    Ok(Json(response))
}
