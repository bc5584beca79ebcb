//! Actor trust store
//!
//! Idempotent find-or-create of actor records. The first time an actor is
//! seen its document is fetched and its key is stored (trust on first use);
//! afterwards the stored row is authoritative.

use std::net::IpAddr;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use serde::Deserialize;

use crate::config::FederationConfig;
use crate::data::{Account, Database, EntityId};
use crate::error::AppError;
use crate::metrics::ACTOR_RESOLUTIONS_TOTAL;

/// Find-or-create access to actor records
///
/// Implementations must be safe to call concurrently for the same URI and
/// must never produce two rows for one URI.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AccountStore: Send + Sync {
    /// Return the account for `uri`, creating it on first contact.
    async fn find_or_create_account(&self, uri: &str) -> Result<Account, AppError>;
}

/// Database-backed [`AccountStore`] that fetches unknown actors remotely.
pub struct Accounts {
    db: Arc<Database>,
    fetcher: ActorFetcher,
}

impl Accounts {
    pub fn new(db: Arc<Database>, fetcher: ActorFetcher) -> Self {
        Self { db, fetcher }
    }
}

#[async_trait]
impl AccountStore for Accounts {
    async fn find_or_create_account(&self, uri: &str) -> Result<Account, AppError> {
        // 1. Known actor
        if let Some(account) = self.db.get_account_by_uri(uri).await? {
            ACTOR_RESOLUTIONS_TOTAL.with_label_values(&["hit"]).inc();
            return Ok(account);
        }

        // 2. First contact - fetch the actor document
        let document = match self.fetcher.fetch_actor(uri).await {
            Ok(document) => document,
            Err(error) => {
                ACTOR_RESOLUTIONS_TOTAL.with_label_values(&["error"]).inc();
                return Err(error);
            }
        };
        let account = document.into_account(uri)?;

        // 3. Insert unless a concurrent request got there first
        let created = self.db.insert_account_if_absent(&account).await?;

        // 4. Re-read so every caller sees the same row
        let stored = self.db.get_account_by_uri(uri).await?.ok_or_else(|| {
            AppError::Internal(anyhow::anyhow!("account {} missing after insert", uri))
        })?;

        if created {
            ACTOR_RESOLUTIONS_TOTAL.with_label_values(&["created"]).inc();
            tracing::info!(uri, domain = %stored.domain, "Created account on first contact");
        } else {
            ACTOR_RESOLUTIONS_TOTAL.with_label_values(&["raced"]).inc();
            tracing::debug!(uri, "Account created concurrently; using stored row");
        }

        Ok(stored)
    }
}

// =============================================================================
// Remote actor documents
// =============================================================================

/// The subset of an ActivityPub actor document the inbox needs
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActorDocument {
    pub id: String,
    #[serde(default)]
    pub preferred_username: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub inbox: Option<String>,
    pub public_key: ActorPublicKey,
}

/// `publicKey` property of an actor
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActorPublicKey {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub owner: Option<String>,
    pub public_key_pem: String,
}

impl ActorDocument {
    /// Convert into a new account row for `uri`.
    ///
    /// # Errors
    /// `Federation` if the document describes a different actor.
    pub fn into_account(self, uri: &str) -> Result<Account, AppError> {
        if self.id != uri {
            return Err(AppError::Federation(format!(
                "actor document id {} does not match {}",
                self.id, uri
            )));
        }
        if let Some(owner) = &self.public_key.owner {
            if owner != uri {
                return Err(AppError::Federation(format!(
                    "publicKey owner {} does not match {}",
                    owner, uri
                )));
            }
        }

        let domain = url::Url::parse(uri)
            .ok()
            .and_then(|url| url.host_str().map(|host| host.to_ascii_lowercase()))
            .ok_or_else(|| AppError::Federation(format!("actor URI has no host: {}", uri)))?;

        let now = Utc::now();
        Ok(Account {
            id: EntityId::new().0,
            uri: self.id,
            username: self.preferred_username.unwrap_or_default(),
            domain,
            display_name: self.name,
            public_key_pem: self.public_key.public_key_pem,
            inbox: self.inbox,
            created_at: now,
            updated_at: now,
        })
    }
}

/// Fetches remote actor documents over HTTP.
#[derive(Clone)]
pub struct ActorFetcher {
    http_client: reqwest::Client,
    allow_private_hosts: bool,
}

impl ActorFetcher {
    /// Build a fetcher with the configured user agent and timeout.
    pub fn new(config: &FederationConfig) -> Result<Self, AppError> {
        let http_client = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .timeout(config.fetch_timeout())
            // Host checks only cover the requested URL; never follow a Location.
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| AppError::Internal(e.into()))?;

        Ok(Self::with_client(http_client, config.allow_private_hosts))
    }

    pub fn with_client(http_client: reqwest::Client, allow_private_hosts: bool) -> Self {
        Self {
            http_client,
            allow_private_hosts,
        }
    }

    /// Fetch and decode the actor document at `uri`.
    pub async fn fetch_actor(&self, uri: &str) -> Result<ActorDocument, AppError> {
        let parsed = url::Url::parse(uri)
            .map_err(|e| AppError::Federation(format!("Invalid actor URL {:?}: {}", uri, e)))?;

        match parsed.scheme() {
            "http" | "https" => {}
            scheme => {
                return Err(AppError::Federation(format!(
                    "Unsupported actor URL scheme: {}",
                    scheme
                )));
            }
        }

        let host = parsed
            .host_str()
            .ok_or_else(|| AppError::Federation("Missing host in actor URL".to_string()))?;

        if !self.allow_private_hosts {
            if is_disallowed_host(host) {
                return Err(AppError::Federation(format!(
                    "Refusing to fetch actor from local host {}",
                    host
                )));
            }
            let port = parsed
                .port_or_known_default()
                .ok_or_else(|| AppError::Federation("Missing port in actor URL".to_string()))?;
            // Reject hosts that look public but resolve internally.
            validate_resolved_host_ips(host, port).await?;
        }

        tracing::debug!(uri, "Fetching remote actor");

        let response = self
            .http_client
            .get(parsed)
            .header("Accept", "application/activity+json")
            .send()
            .await
            .map_err(|e| AppError::Federation(format!("Failed to fetch actor: {}", e)))?;

        if !response.status().is_success() {
            return Err(AppError::Federation(format!(
                "Failed to fetch actor: HTTP {}",
                response.status()
            )));
        }

        response
            .json::<ActorDocument>()
            .await
            .map_err(|e| AppError::Federation(format!("Failed to parse actor: {}", e)))
    }
}

fn is_disallowed_ip(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => {
            v4.is_loopback()
                || v4.is_private()
                || v4.is_link_local()
                || v4.is_multicast()
                || v4.is_unspecified()
        }
        IpAddr::V6(v6) => {
            if let Some(v4) = v6.to_ipv4_mapped() {
                return is_disallowed_ip(IpAddr::V4(v4));
            }
            v6.is_loopback()
                || v6.is_unique_local()
                || v6.is_unicast_link_local()
                || v6.is_multicast()
                || v6.is_unspecified()
        }
    }
}

fn is_disallowed_host(host: &str) -> bool {
    let normalized = host
        .trim_start_matches('[')
        .trim_end_matches(']')
        .trim_end_matches('.')
        .to_ascii_lowercase();
    if normalized == "localhost" || normalized.ends_with(".localhost") {
        return true;
    }

    normalized
        .parse::<IpAddr>()
        .map(is_disallowed_ip)
        .unwrap_or(false)
}

async fn validate_resolved_host_ips(host: &str, port: u16) -> Result<(), AppError> {
    let normalized = host
        .trim_start_matches('[')
        .trim_end_matches(']')
        .trim_end_matches('.')
        .to_ascii_lowercase();

    let lookup = tokio::net::lookup_host((normalized.as_str(), port))
        .await
        .map_err(|e| AppError::Federation(format!("Failed to resolve actor host: {}", e)))?;

    let mut resolved_any = false;
    for addr in lookup {
        resolved_any = true;
        if is_disallowed_ip(addr.ip()) {
            return Err(AppError::Federation(format!(
                "Actor host {} resolves to a local address",
                host
            )));
        }
    }

    if !resolved_any {
        return Err(AppError::Federation(
            "No DNS records for actor host".to_string(),
        ));
    }

    Ok(())
}
