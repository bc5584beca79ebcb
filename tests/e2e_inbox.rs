//! E2E tests for the inbox endpoint

mod common;

use std::sync::Arc;

use apinbox::data::{Activity, ActivityStore};
use apinbox::error::AppError;
use async_trait::async_trait;
use common::TestServer;
use serde_json::json;

#[tokio::test]
async fn test_signed_follow_is_accepted() {
    let server = TestServer::new().await;
    let bob = server.remote.add_actor("bob");

    let activity = json!({
        "@context": "https://www.w3.org/ns/activitystreams",
        "id": format!("{}/follows/1", bob.uri),
        "type": "Follow",
        "actor": bob.uri,
        "object": "http://inbox.test/users/alice"
    });

    let response = server.post_signed(&bob, &activity).await;
    assert_eq!(response.status(), 202);
    assert!(response.text().await.unwrap().is_empty());

    // Signer and actor are the same: one account, one fetch
    let account = server
        .db
        .get_account_by_uri(&bob.uri)
        .await
        .unwrap()
        .expect("actor should be stored on first contact");
    assert_eq!(account.username, "bob");
    assert_eq!(account.public_key_pem, bob.public_key_pem);
    assert_eq!(server.remote.fetch_count(), 1);

    let stored = server
        .db
        .list_activities_by_account(&account.id, 10)
        .await
        .unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].activity_type, "Follow");
    assert_eq!(stored[0].object_type, "");
    assert_eq!(stored[0].payload().unwrap(), activity);
}

#[tokio::test]
async fn test_create_note_records_object_type() {
    let server = TestServer::new().await;
    let bob = server.remote.add_actor("bob");

    let activity = json!({
        "type": "Create",
        "actor": bob.uri,
        "object": {"type": "Note", "content": "hello"}
    });

    let response = server.post_signed(&bob, &activity).await;
    assert_eq!(response.status(), 202);

    let account = server.db.get_account_by_uri(&bob.uri).await.unwrap().unwrap();
    let stored = server
        .db
        .list_activities_by_account(&account.id, 10)
        .await
        .unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].activity_type, "Create");
    assert_eq!(stored[0].object_type, "Note");
}

#[tokio::test]
async fn test_known_actor_is_not_fetched_again() {
    let server = TestServer::new().await;
    let bob = server.remote.add_actor("bob");

    for n in 0..3 {
        let activity = json!({"type": "Like", "actor": bob.uri, "object": format!("note/{n}")});
        assert_eq!(server.post_signed(&bob, &activity).await.status(), 202);
    }

    assert_eq!(server.remote.fetch_count(), 1);
    assert_eq!(server.account_count().await, 1);
    assert_eq!(server.activity_count().await, 3);
}

#[tokio::test]
async fn test_stored_key_survives_remote_removal() {
    let server = TestServer::new().await;
    let bob = server.remote.add_actor("bob");

    let activity = json!({"type": "Like", "actor": bob.uri});
    assert_eq!(server.post_signed(&bob, &activity).await.status(), 202);

    // The actor disappears remotely; the stored key keeps verifying
    server.remote.remove_actor("bob");
    assert_eq!(server.post_signed(&bob, &activity).await.status(), 202);
    assert_eq!(server.activity_count().await, 2);
}

#[tokio::test]
async fn test_repeated_delivery_is_not_deduplicated() {
    let server = TestServer::new().await;
    let bob = server.remote.add_actor("bob");

    let activity = json!({
        "id": format!("{}/announces/1", bob.uri),
        "type": "Announce",
        "actor": bob.uri
    });
    assert_eq!(server.post_signed(&bob, &activity).await.status(), 202);
    assert_eq!(server.post_signed(&bob, &activity).await.status(), 202);

    assert_eq!(server.activity_count().await, 2);
}

#[tokio::test]
async fn test_unsigned_request_is_rejected() {
    let server = TestServer::new().await;
    let bob = server.remote.add_actor("bob");

    let response = server
        .client
        .post(&server.url("/inbox"))
        .header("Content-Type", "application/activity+json")
        .json(&json!({"type": "Follow", "actor": bob.uri}))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 401);
    assert!(!response.text().await.unwrap().is_empty());
    assert_eq!(server.activity_count().await, 0);
    assert_eq!(server.remote.fetch_count(), 0);
}

#[tokio::test]
async fn test_tampered_body_is_rejected() {
    let server = TestServer::new().await;
    let bob = server.remote.add_actor("bob");

    let body = serde_json::to_vec(&json!({"type": "Like", "actor": bob.uri})).unwrap();
    let headers = apinbox::federation::sign_request(
        "POST",
        &server.url("/inbox"),
        Some(&body),
        &bob.private_key_pem,
        &bob.key_id,
    )
    .unwrap();

    let response = server
        .client
        .post(&server.url("/inbox"))
        .header("Date", &headers.date)
        .header("Signature", &headers.signature)
        .header("Digest", headers.digest.unwrap())
        .body(serde_json::to_vec(&json!({"type": "Delete", "actor": bob.uri})).unwrap())
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 401);
    assert_eq!(server.activity_count().await, 0);
}

#[tokio::test]
async fn test_wrong_key_is_rejected() {
    let server = TestServer::new().await;
    let bob = server.remote.add_actor("bob");
    let mallory = server.remote.add_actor("mallory");

    // Mallory signs but claims bob's key
    let mut forged = mallory.clone();
    forged.key_id = bob.key_id.clone();

    let response = server
        .post_signed(&forged, &json!({"type": "Like", "actor": bob.uri}))
        .await;
    assert_eq!(response.status(), 401);
    assert_eq!(server.activity_count().await, 0);
}

#[tokio::test]
async fn test_unresolvable_signer_is_rejected() {
    let server = TestServer::new().await;
    let ghost = server.remote.add_actor("ghost");
    server.remote.remove_actor("ghost");

    let response = server
        .post_signed(&ghost, &json!({"type": "Follow", "actor": ghost.uri}))
        .await;

    assert_eq!(response.status(), 401);
    assert_eq!(server.account_count().await, 0);
    assert_eq!(server.activity_count().await, 0);
}

#[tokio::test]
async fn test_malformed_json_is_bad_request() {
    let server = TestServer::new().await;
    let bob = server.remote.add_actor("bob");

    let response = server
        .post_signed_bytes(&bob, b"{\"type\": \"Follow\",".to_vec())
        .await;

    assert_eq!(response.status(), 400);
    assert!(response.text().await.unwrap().contains("Invalid JSON"));
    assert_eq!(server.activity_count().await, 0);
}

#[tokio::test]
async fn test_unknown_payload_actor_is_server_error() {
    let server = TestServer::new().await;
    let bob = server.remote.add_actor("bob");

    let activity = json!({"type": "Like", "actor": format!("{}/users/nobody", server.remote.base)});
    let response = server.post_signed(&bob, &activity).await;

    assert_eq!(response.status(), 500);
    assert_eq!(response.text().await.unwrap(), "Internal server error");
    assert_eq!(server.activity_count().await, 0);
}

#[tokio::test]
async fn test_payload_actor_is_resolved_independently() {
    let server = TestServer::new().await;
    let bob = server.remote.add_actor("bob");
    let carol = server.remote.add_actor("carol");

    let activity = json!({"type": "Like", "actor": carol.uri});
    let response = server.post_signed(&bob, &activity).await;
    assert_eq!(response.status(), 202);

    // Both the signer and the payload actor were fetched
    assert_eq!(server.account_count().await, 2);
    let carol_account = server.db.get_account_by_uri(&carol.uri).await.unwrap().unwrap();
    let stored = server
        .db
        .list_activities_by_account(&carol_account.id, 10)
        .await
        .unwrap();
    assert_eq!(stored.len(), 1);
}

#[tokio::test]
async fn test_actor_match_can_be_required() {
    let server = TestServer::with_config(|config| {
        config.federation.require_actor_match = true;
    })
    .await;
    let bob = server.remote.add_actor("bob");
    let carol = server.remote.add_actor("carol");

    let response = server
        .post_signed(&bob, &json!({"type": "Like", "actor": carol.uri}))
        .await;
    assert_eq!(response.status(), 401);

    let response = server
        .post_signed(&bob, &json!({"type": "Like", "actor": bob.uri}))
        .await;
    assert_eq!(response.status(), 202);
    assert_eq!(server.activity_count().await, 1);
}

#[tokio::test]
async fn test_oversized_body_is_rejected() {
    let server = TestServer::with_config(|config| {
        config.federation.max_body_bytes = 256;
    })
    .await;
    let bob = server.remote.add_actor("bob");

    let activity = json!({
        "type": "Create",
        "actor": bob.uri,
        "object": {"type": "Note", "content": "x".repeat(1024)}
    });
    let response = server.post_signed(&bob, &activity).await;

    assert_eq!(response.status(), 413);
    assert_eq!(server.activity_count().await, 0);
}

#[tokio::test]
async fn test_concurrent_first_contact_creates_one_account() {
    let server = Arc::new(TestServer::new().await);
    let bob = server.remote.add_actor("bob");

    let mut handles = Vec::new();
    for n in 0..6 {
        let server = server.clone();
        let bob = bob.clone();
        handles.push(tokio::spawn(async move {
            let activity = json!({"type": "Like", "actor": bob.uri, "object": format!("note/{n}")});
            server.post_signed(&bob, &activity).await.status()
        }));
    }
    for handle in handles {
        assert_eq!(handle.await.unwrap(), 202);
    }

    assert_eq!(server.account_count().await, 1);
    assert_eq!(server.activity_count().await, 6);
}

/// Activity store that always fails
struct FailingStore;

#[async_trait]
impl ActivityStore for FailingStore {
    async fn create_activity(&self, _activity: &Activity) -> Result<(), AppError> {
        Err(AppError::Storage("disk full at /srv/apinbox".to_string()))
    }
}

#[tokio::test]
async fn test_storage_failure_is_opaque_server_error() {
    let server = TestServer::with_activity_store(Arc::new(FailingStore), |_| {}).await;
    let bob = server.remote.add_actor("bob");

    let response = server
        .post_signed(&bob, &json!({"type": "Like", "actor": bob.uri}))
        .await;

    assert_eq!(response.status(), 500);
    let body = response.text().await.unwrap();
    assert!(!body.contains("/srv/apinbox"));
}

#[tokio::test]
async fn test_internal_errors_can_be_exposed() {
    let server = TestServer::with_activity_store(Arc::new(FailingStore), |config| {
        config.federation.expose_internal_errors = true;
    })
    .await;
    let bob = server.remote.add_actor("bob");

    let response = server
        .post_signed(&bob, &json!({"type": "Like", "actor": bob.uri}))
        .await;

    assert_eq!(response.status(), 500);
    assert!(response.text().await.unwrap().contains("disk full"));
}
