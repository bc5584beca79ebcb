//! Public key resolution
//!
//! Maps a signature `keyId` to the signing actor's RSA public key. Unknown
//! actors are created on first contact through the [`AccountStore`]; there
//! is no in-process cache, the store is the single source of truth.

use std::sync::Arc;

use rsa::RsaPublicKey;
use rsa::pkcs8::DecodePublicKey;

use super::accounts::AccountStore;
use crate::data::Account;
use crate::error::AppError;

const PUBLIC_KEY_LABEL: &str = "PUBLIC KEY";

/// The signer's account together with its decoded key
#[derive(Debug, Clone)]
pub struct ResolvedKey {
    pub account: Account,
    pub public_key: RsaPublicKey,
}

/// Resolves key identifiers through the actor trust store.
#[derive(Clone)]
pub struct KeyResolver {
    accounts: Arc<dyn AccountStore>,
}

impl KeyResolver {
    pub fn new(accounts: Arc<dyn AccountStore>) -> Self {
        Self { accounts }
    }

    /// Resolve `key_id` to the owning actor and its public key.
    ///
    /// # Errors
    /// - Errors from the account store, unchanged
    /// - `KeyFormat` if the stored PEM is not a `PUBLIC KEY` block
    /// - `KeyParse` if the block is not a valid RSA SubjectPublicKeyInfo
    pub async fn resolve_key(&self, key_id: &str) -> Result<ResolvedKey, AppError> {
        let actor_id = trim_key_id(key_id);
        tracing::debug!(key_id, actor_id, "Resolving signing key");

        let account = self.accounts.find_or_create_account(actor_id).await?;
        let public_key = public_key_from_pem(&account.public_key_pem)?;

        Ok(ResolvedKey {
            account,
            public_key,
        })
    }
}

/// Strip the fragment (e.g. `#main-key`) from a key ID.
pub fn trim_key_id(key_id: &str) -> &str {
    key_id.split_once('#').map_or(key_id, |(actor, _)| actor)
}

/// Decode a PEM-armored SubjectPublicKeyInfo RSA key.
///
/// Text before the first `-----BEGIN` line is ignored.
pub fn public_key_from_pem(pem: &str) -> Result<RsaPublicKey, AppError> {
    let start = pem
        .find("-----BEGIN ")
        .ok_or_else(|| AppError::KeyFormat("no PEM block found".to_string()))?;
    let block = &pem[start..];

    let label = block
        .lines()
        .next()
        .and_then(|line| line.trim_end().strip_prefix("-----BEGIN "))
        .and_then(|rest| rest.strip_suffix("-----"))
        .ok_or_else(|| AppError::KeyFormat("malformed PEM header".to_string()))?;

    if label != PUBLIC_KEY_LABEL {
        return Err(AppError::KeyFormat(format!("invalid pem type: {}", label)));
    }

    RsaPublicKey::from_public_key_pem(block).map_err(|e| AppError::KeyParse(e.to_string()))
}
