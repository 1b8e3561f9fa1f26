//! Per-user credit document repository.
//!
//! Stores the credit balance and the processed-purchase history that keeps
//! consumable top-ups idempotent. Writes go through optimistic locking via
//! Firestore's `updateTime` precondition so concurrent entitlement events for
//! the same user cannot clobber each other's balances.

use std::collections::HashMap;
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, info, warn};

use subflow_models::CreditDocument;

use crate::client::FirestoreClient;
use crate::error::{FirestoreError, FirestoreResult};
use crate::types::{Document, FromFirestoreValue, ToFirestoreValue};

/// Collection holding one credit document per user, keyed by uid.
const COLLECTION: &str = "user_credits";

/// Maximum retries for optimistic-locking writes.
const MAX_WRITE_RETRIES: u32 = 5;

/// Base delay for backoff between precondition-failure retries.
const RETRY_BASE_DELAY_MS: u64 = 50;

/// The write a credit decision produced.
#[derive(Debug, Clone)]
pub struct CreditUpdate {
    /// New balance to store.
    pub credits: u32,
    /// Purchase id to append to the processed history, if the decision came
    /// from a fresh store transaction.
    pub record_purchase: Option<String>,
}

/// Result of a committed credit write.
#[derive(Debug, Clone)]
pub struct CreditWriteResult {
    /// Balance after the write.
    pub credits_after: u32,
    /// Whether the document was created by this write.
    pub created: bool,
}

/// Repository for one user's credit document.
pub struct CreditDocRepository {
    client: FirestoreClient,
    user_id: String,
}

impl CreditDocRepository {
    /// Create a repository scoped to a user.
    pub fn new(client: FirestoreClient, user_id: impl Into<String>) -> Self {
        Self {
            client,
            user_id: user_id.into(),
        }
    }

    /// The user this repository operates on.
    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    /// Fetch the stored credit document, if any.
    pub async fn get(&self) -> FirestoreResult<Option<CreditDocument>> {
        let doc = self
            .client
            .with_retry("credits_get", || {
                self.client.get_document(COLLECTION, &self.user_id)
            })
            .await?;
        Ok(doc.as_ref().map(parse_credit_document))
    }

    /// Read-decide-write with optimistic locking.
    ///
    /// `decide` sees the currently stored document (or `None`) and returns
    /// the update to commit, or `None` to skip the write entirely (e.g. a
    /// re-delivered purchase that was already processed). On a precondition
    /// conflict the whole read-decide-write cycle is retried, so `decide`
    /// must be pure with respect to its input.
    pub async fn apply<F>(&self, decide: F) -> FirestoreResult<Option<CreditWriteResult>>
    where
        F: Fn(Option<&CreditDocument>) -> Option<CreditUpdate>,
    {
        let mut last_error: Option<FirestoreError> = None;

        for attempt in 0..MAX_WRITE_RETRIES {
            let stored = self
                .client
                .with_retry("credits_read", || {
                    self.client.get_document(COLLECTION, &self.user_id)
                })
                .await?;
            let existing = stored.as_ref().map(parse_credit_document);
            let update_time = stored.as_ref().and_then(|d| d.update_time.clone());

            let Some(update) = decide(existing.as_ref()) else {
                debug!(user_id = %self.user_id, "Credit decision produced no write");
                return Ok(None);
            };

            let mut processed = existing
                .as_ref()
                .map(|d| d.processed_purchases.clone())
                .unwrap_or_default();
            if let Some(purchase_id) = &update.record_purchase {
                processed.push(purchase_id.clone());
            }

            let mut fields = HashMap::new();
            fields.insert("credits".to_string(), update.credits.to_firestore_value());
            fields.insert(
                "processed_purchases".to_string(),
                processed.to_firestore_value(),
            );
            fields.insert("updated_at".to_string(), Utc::now().to_firestore_value());

            // A retried write that actually landed comes back as a
            // precondition or already-exists conflict, which the outer loop
            // resolves by re-reading and re-deciding.
            let write = if stored.is_some() {
                let update_mask = vec![
                    "credits".to_string(),
                    "processed_purchases".to_string(),
                    "updated_at".to_string(),
                ];
                self.client
                    .with_retry("credits_update", || {
                        self.client.update_document_with_precondition(
                            COLLECTION,
                            &self.user_id,
                            fields.clone(),
                            Some(update_mask.clone()),
                            update_time.as_deref(),
                        )
                    })
                    .await
            } else {
                self.client
                    .with_retry("credits_create", || {
                        self.client
                            .create_document(COLLECTION, &self.user_id, fields.clone())
                    })
                    .await
            };

            match write {
                Ok(_) => {
                    info!(
                        user_id = %self.user_id,
                        credits = update.credits,
                        created = stored.is_none(),
                        "Committed credit document"
                    );
                    return Ok(Some(CreditWriteResult {
                        credits_after: update.credits,
                        created: stored.is_none(),
                    }));
                }
                // Lost the race: another writer changed the document (or
                // created it first). Re-read and re-decide.
                Err(e)
                    if e.is_precondition_failed()
                        || matches!(e, FirestoreError::AlreadyExists(_)) =>
                {
                    debug!(
                        user_id = %self.user_id,
                        attempt = attempt + 1,
                        "Credit write conflicted, retrying"
                    );
                    last_error = Some(e);
                    let delay = Duration::from_millis(RETRY_BASE_DELAY_MS * (attempt as u64 + 1));
                    tokio::time::sleep(delay).await;
                    continue;
                }
                Err(e) => {
                    warn!(user_id = %self.user_id, error = %e, "Failed to write credit document");
                    return Err(e);
                }
            }
        }

        warn!(
            user_id = %self.user_id,
            retries = MAX_WRITE_RETRIES,
            error = ?last_error,
            "Credit write failed after retries"
        );
        Err(FirestoreError::request_failed(
            "Failed to write credit document due to concurrent updates",
        ))
    }
}

/// Parse the stored form into the domain document. Missing or mistyped
/// fields degrade to defaults.
fn parse_credit_document(doc: &Document) -> CreditDocument {
    let credits = doc
        .field("credits")
        .and_then(u32::from_firestore_value)
        .unwrap_or(0);
    let processed_purchases = doc
        .field("processed_purchases")
        .and_then(Vec::<String>::from_firestore_value)
        .unwrap_or_default();

    CreditDocument {
        credits,
        processed_purchases,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ArrayValue, Value};
    use std::collections::HashMap;

    #[test]
    fn test_parse_credit_document() {
        let mut fields = HashMap::new();
        fields.insert("credits".to_string(), 40u32.to_firestore_value());
        fields.insert(
            "processed_purchases".to_string(),
            vec!["txn-1".to_string()].to_firestore_value(),
        );
        let doc = Document::new(fields);

        let parsed = parse_credit_document(&doc);
        assert_eq!(parsed.credits, 40);
        assert_eq!(parsed.processed_purchases, vec!["txn-1".to_string()]);
    }

    #[test]
    fn test_parse_degrades_on_missing_fields() {
        let parsed = parse_credit_document(&Document::new(HashMap::new()));
        assert_eq!(parsed.credits, 0);
        assert!(parsed.processed_purchases.is_empty());
    }

    #[test]
    fn test_parse_degrades_on_mistyped_fields() {
        let mut fields = HashMap::new();
        fields.insert("credits".to_string(), Value::StringValue("oops".into()));
        fields.insert(
            "processed_purchases".to_string(),
            Value::ArrayValue(ArrayValue { values: None }),
        );
        let parsed = parse_credit_document(&Document::new(fields));
        assert_eq!(parsed.credits, 0);
        assert!(parsed.processed_purchases.is_empty());
    }
}
