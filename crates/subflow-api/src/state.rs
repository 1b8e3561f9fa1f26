//! Application state.

use std::sync::Arc;

use subflow_firestore::FirestoreClient;

use crate::config::ApiConfig;
use crate::services::EntitlementService;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: ApiConfig,
    pub firestore: Arc<FirestoreClient>,
    pub entitlements: EntitlementService,
}

impl AppState {
    /// Create new application state.
    pub async fn new(config: ApiConfig) -> anyhow::Result<Self> {
        let firestore = Arc::new(FirestoreClient::from_env().await?);

        let entitlements = EntitlementService::new(
            Arc::clone(&firestore),
            config.plan_catalog(),
            config.entitlement_id.clone(),
        );

        Ok(Self {
            config,
            firestore,
            entitlements,
        })
    }
}
