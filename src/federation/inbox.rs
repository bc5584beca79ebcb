//! Inbox ingestion
//!
//! Authenticates an inbound delivery, resolves the acting actor and records
//! the activity verbatim. Activity semantics are left to downstream
//! consumers; this layer only validates, classifies and stores.

use std::sync::Arc;
use std::time::Duration;

use serde_json::{Map, Value};

use super::accounts::AccountStore;
use super::key_resolver::KeyResolver;
use super::signature::{InboundRequest, SignatureVerifier};
use crate::data::{Activity, ActivityStore};
use crate::error::AppError;
use crate::metrics::ACTIVITIES_RECEIVED_TOTAL;

/// Knobs for [`InboxHandler`]
#[derive(Debug, Clone, Default)]
pub struct InboxOptions {
    /// Allowed drift of a signed `date`; `None` disables the check
    pub max_clock_skew: Option<Duration>,
    /// Reject payloads whose `actor` is not the signing actor
    pub require_actor_match: bool,
}

/// Inbox request pipeline
///
/// # Steps
/// 1. Authenticate (HTTP signature) - 401 on failure
/// 2. Parse the JSON document - 400 on failure
/// 3. Find or create the payload's `actor` - 500 on failure
/// 4. Classify by `type` and `object.type`
/// 5. Persist one activity row - 500 on failure
pub struct InboxHandler {
    verifier: SignatureVerifier,
    accounts: Arc<dyn AccountStore>,
    activities: Arc<dyn ActivityStore>,
    require_actor_match: bool,
}

impl InboxHandler {
    pub fn new(
        accounts: Arc<dyn AccountStore>,
        activities: Arc<dyn ActivityStore>,
        options: InboxOptions,
    ) -> Self {
        let verifier =
            SignatureVerifier::new(KeyResolver::new(accounts.clone()), options.max_clock_skew);
        Self {
            verifier,
            accounts,
            activities,
            require_actor_match: options.require_actor_match,
        }
    }

    /// Run the pipeline for one request.
    ///
    /// Every accepted request produces a new row; repeated deliveries of the
    /// same activity are not deduplicated here.
    ///
    /// # Returns
    /// The stored activity
    pub async fn handle(&self, request: &InboundRequest) -> Result<Activity, AppError> {
        // 1. Authenticate
        let signer = self
            .verifier
            .verify(request)
            .await
            .map_err(authentication_failure)?;

        // 2. Parse
        let document = parse_document(&request.body)?;

        // 3. Resolve actor
        let actor_id = string_field(&document, "actor");
        if self.require_actor_match && actor_id != signer.account.uri {
            tracing::warn!(
                signer = %signer.account.uri,
                actor = actor_id,
                "Activity actor does not match signer"
            );
            return Err(AppError::Unauthorized(format!(
                "signer {} may not act as {:?}",
                signer.account.uri, actor_id
            )));
        }

        let account = self
            .accounts
            .find_or_create_account(actor_id)
            .await
            .map_err(|error| AppError::Resolution(error.to_string()))?;

        // 4. Classify
        let (activity_type, object_type) = classify(&document);

        // 5. Persist
        let activity = Activity::new(&account.id, &document, activity_type, object_type)
            .map_err(|e| AppError::Internal(e.into()))?;
        self.activities.create_activity(&activity).await?;

        ACTIVITIES_RECEIVED_TOTAL
            .with_label_values(&[label_for(&activity.activity_type)])
            .inc();
        tracing::info!(
            activity_id = %activity.id,
            activity_type = %activity.activity_type,
            object_type = %activity.object_type,
            actor = %account.uri,
            signer = %signer.account.uri,
            "Activity accepted"
        );

        Ok(activity)
    }
}

/// Map a verifier error to the 401 returned to the caller.
///
/// Only failures caused by the request itself keep their reason; resolver
/// and storage failures get a fixed message.
fn authentication_failure(error: AppError) -> AppError {
    tracing::warn!(%error, "Signature verification failed");
    match error {
        AppError::MissingSignature
        | AppError::SignatureParse(_)
        | AppError::SignatureInvalid(_)
        | AppError::SignatureExpired(_)
        | AppError::DigestMismatch => AppError::Unauthorized(error.to_string()),
        _ => AppError::Unauthorized("signature verification failed".to_string()),
    }
}

fn parse_document(body: &[u8]) -> Result<Map<String, Value>, AppError> {
    serde_json::from_slice::<Map<String, Value>>(body)
        .map_err(|e| AppError::BadRequest(format!("Invalid JSON: {}", e)))
}

/// String value of `key`, or "" when absent or not a string.
fn string_field<'a>(document: &'a Map<String, Value>, key: &str) -> &'a str {
    document.get(key).and_then(Value::as_str).unwrap_or_default()
}

/// Derive `(activity_type, object_type)` from a document.
///
/// `object_type` is only set when `object` is itself a document.
pub fn classify(document: &Map<String, Value>) -> (String, String) {
    let activity_type = string_field(document, "type").to_string();
    let object_type = document
        .get("object")
        .and_then(Value::as_object)
        .map(|object| string_field(object, "type"))
        .unwrap_or_default()
        .to_string();
    (activity_type, object_type)
}

// Keeps metric cardinality bounded for arbitrary remote input.
fn label_for(activity_type: &str) -> &str {
    const KNOWN: &[&str] = &[
        "Accept", "Add", "Announce", "Block", "Create", "Delete", "Flag", "Follow", "Like",
        "Move", "Reject", "Remove", "Undo", "Update",
    ];
    KNOWN
        .iter()
        .copied()
        .find(|known| *known == activity_type)
        .unwrap_or("other")
}
