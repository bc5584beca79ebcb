//! Common test utilities for E2E tests

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};

use apinbox::data::{ActivityStore, Database};
use apinbox::federation::{Accounts, ActorFetcher, InboxHandler, InboxOptions, sign_request};
use apinbox::{AppState, config};
use axum::extract::{Path, State};
use axum::response::{IntoResponse, Response};
use rsa::pkcs8::{EncodePrivateKey, EncodePublicKey, LineEnding};
use rsa::{RsaPrivateKey, RsaPublicKey};
use serde_json::{Value, json};
use tempfile::TempDir;
use tokio::net::TcpListener;

/// Test server instance
pub struct TestServer {
    pub addr: String,
    pub state: AppState,
    /// Separate handle on the server's database for assertions
    pub db: Arc<Database>,
    pub remote: RemoteActors,
    pub _temp_dir: TempDir,
    pub client: reqwest::Client,
}

impl TestServer {
    /// Create a new test server instance with default settings
    pub async fn new() -> Self {
        Self::with_config(|_| {}).await
    }

    /// Create a test server after adjusting the configuration
    pub async fn with_config(configure: impl FnOnce(&mut config::AppConfig)) -> Self {
        let temp_dir = TempDir::new().unwrap();
        let mut config = test_config(&temp_dir);
        configure(&mut config);

        let state = AppState::new(config.clone()).await.unwrap();
        let db = Arc::new(Database::connect(&config.database.path).await.unwrap());

        Self::serve(state, db, temp_dir).await
    }

    /// Create a test server whose activities go to `activities`
    pub async fn with_activity_store(
        activities: Arc<dyn ActivityStore>,
        configure: impl FnOnce(&mut config::AppConfig),
    ) -> Self {
        let temp_dir = TempDir::new().unwrap();
        let mut config = test_config(&temp_dir);
        configure(&mut config);

        let db = Arc::new(Database::connect(&config.database.path).await.unwrap());
        let fetcher = ActorFetcher::new(&config.federation).unwrap();
        let inbox = InboxHandler::new(
            Arc::new(Accounts::new(db.clone(), fetcher)),
            activities,
            InboxOptions {
                max_clock_skew: config.federation.max_clock_skew(),
                require_actor_match: config.federation.require_actor_match,
            },
        );
        let state = AppState::with_inbox(config, inbox);

        Self::serve(state, db, temp_dir).await
    }

    async fn serve(state: AppState, db: Arc<Database>, temp_dir: TempDir) -> Self {
        apinbox::metrics::init_metrics();

        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .build()
            .unwrap();

        // Bind to random port
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let app = apinbox::build_router(state.clone());
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            addr: format!("http://{}", addr),
            state,
            db,
            remote: RemoteActors::start().await,
            _temp_dir: temp_dir,
            client,
        }
    }

    /// Get base URL for requests
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.addr, path)
    }

    /// POST `activity` to `/inbox`, signed by `signer`
    pub async fn post_signed(&self, signer: &RemoteActor, activity: &Value) -> reqwest::Response {
        let body = serde_json::to_vec(activity).unwrap();
        self.post_signed_bytes(signer, body).await
    }

    /// POST raw bytes to `/inbox`, signed by `signer`
    pub async fn post_signed_bytes(&self, signer: &RemoteActor, body: Vec<u8>) -> reqwest::Response {
        let url = self.url("/inbox");
        let headers =
            sign_request("POST", &url, Some(&body), &signer.private_key_pem, &signer.key_id)
                .unwrap();

        let mut request = self
            .client
            .post(&url)
            .header("Content-Type", "application/activity+json")
            .header("Date", &headers.date)
            .header("Signature", &headers.signature);
        if let Some(digest) = &headers.digest {
            request = request.header("Digest", digest);
        }

        request.body(body).send().await.unwrap()
    }

    pub async fn activity_count(&self) -> i64 {
        self.db.count_activities().await.unwrap()
    }

    pub async fn account_count(&self) -> i64 {
        self.db.count_accounts().await.unwrap()
    }
}

fn test_config(temp_dir: &TempDir) -> config::AppConfig {
    config::AppConfig {
        server: config::ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 0, // Let OS assign port
            domain: "inbox.test".to_string(),
            protocol: "http".to_string(),
        },
        database: config::DatabaseConfig {
            path: temp_dir.path().join("test.db"),
        },
        federation: config::FederationConfig {
            // Remote actors are served from 127.0.0.1
            allow_private_hosts: true,
            ..config::FederationConfig::default()
        },
        logging: config::LoggingConfig {
            level: "info".to_string(),
            format: "pretty".to_string(),
        },
    }
}

// =============================================================================
// Remote actors
// =============================================================================

/// A remote actor whose document is served by [`RemoteActors`]
#[derive(Clone)]
pub struct RemoteActor {
    pub uri: String,
    pub key_id: String,
    pub private_key_pem: String,
    pub public_key_pem: String,
}

/// Local HTTP server standing in for remote instances
#[derive(Clone)]
pub struct RemoteActors {
    pub base: String,
    documents: Arc<RwLock<HashMap<String, Value>>>,
    fetches: Arc<AtomicUsize>,
}

impl RemoteActors {
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let remote = Self {
            base: format!("http://{}", addr),
            documents: Arc::new(RwLock::new(HashMap::new())),
            fetches: Arc::new(AtomicUsize::new(0)),
        };

        let app = axum::Router::new()
            .route("/users/:username", axum::routing::get(serve_actor))
            .with_state(remote.clone());
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        remote
    }

    /// Generate a keypair and publish an actor document for `username`
    pub fn add_actor(&self, username: &str) -> RemoteActor {
        let mut rng = rand::thread_rng();
        let private_key = RsaPrivateKey::new(&mut rng, 1024).unwrap();
        let public_key = RsaPublicKey::from(&private_key);

        let actor = RemoteActor {
            uri: format!("{}/users/{}", self.base, username),
            key_id: format!("{}/users/{}#main-key", self.base, username),
            private_key_pem: private_key.to_pkcs8_pem(LineEnding::LF).unwrap().to_string(),
            public_key_pem: public_key.to_public_key_pem(LineEnding::LF).unwrap(),
        };

        let document = json!({
            "@context": ["https://www.w3.org/ns/activitystreams", "https://w3id.org/security/v1"],
            "id": actor.uri,
            "type": "Person",
            "preferredUsername": username,
            "inbox": format!("{}/inbox", actor.uri),
            "publicKey": {
                "id": actor.key_id,
                "owner": actor.uri,
                "publicKeyPem": actor.public_key_pem,
            }
        });
        self.documents
            .write()
            .unwrap()
            .insert(username.to_string(), document);

        actor
    }

    /// Stop serving `username`; later fetches get 404
    pub fn remove_actor(&self, username: &str) {
        self.documents.write().unwrap().remove(username);
    }

    /// Number of actor documents served so far
    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

async fn serve_actor(
    State(remote): State<RemoteActors>,
    Path(username): Path<String>,
) -> Response {
    remote.fetches.fetch_add(1, Ordering::SeqCst);
    let document = remote.documents.read().unwrap().get(&username).cloned();
    match document {
        Some(document) => axum::Json(document).into_response(),
        None => http::StatusCode::NOT_FOUND.into_response(),
    }
}
