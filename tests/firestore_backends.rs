//! HTTP-level tests for the Firestore backends against a mock server.

use std::sync::Arc;

use serde_json::{json, Value as JsonValue};
use visit_backfill::error::AppError;
use serde::Deserialize;
use visit_backfill::firestore::auth::{
    AuthorizedUser, AuthorizedUserToken, ServiceAccountKey, ServiceAccountToken, StaticToken,
    TokenProvider, DATASTORE_SCOPE,
};
use visit_backfill::firestore::FirestoreClient;
use visit_backfill::migration::{run_migration, ConsoleReporter, MigrationOptions};
use visit_backfill::store::backends::{CommitStore, PatchStore};
use visit_backfill::store::{DocumentStore, WriteBatch};
use wiremock::matchers::{body_json, body_partial_json, body_string_contains, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const TOKEN: &str = "test-token";
const ROOT: &str = "/v1/projects/proj/databases/(default)/documents";
const NAME_ROOT: &str = "projects/proj/databases/(default)/documents";

fn client(server: &MockServer) -> FirestoreClient {
    FirestoreClient::new(
        reqwest::Client::new(),
        &format!("{}/v1", server.uri()),
        "proj",
        "(default)",
        Arc::new(StaticToken::new(TOKEN)),
    )
    .expect("valid client")
}

fn doc(collection: &str, id: &str, fields: JsonValue) -> JsonValue {
    json!({
        "name": format!("{}/{}/{}", NAME_ROOT, collection, id),
        "fields": fields,
        "createTime": "2024-01-15T10:30:00.000000Z",
        "updateTime": "2024-01-15T10:30:00.000000Z"
    })
}

fn not_found() -> ResponseTemplate {
    ResponseTemplate::new(404).set_body_json(json!({
        "error": {"code": 404, "message": "Document not found", "status": "NOT_FOUND"}
    }))
}

/// Visits: v1 -> e1 (has admin), v2 -> missing employee, v3 already migrated.
async fn mount_fixture(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path(format!("{}/visits", ROOT)))
        .and(header("authorization", format!("Bearer {}", TOKEN).as_str()))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "documents": [
                doc("visits", "v1", json!({"employeeId": {"stringValue": "e1"}})),
                doc("visits", "v2", json!({"employeeId": {"stringValue": "missing"}})),
                doc("visits", "v3", json!({
                    "employeeId": {"stringValue": "e1"},
                    "adminId": {"stringValue": "a9"}
                })),
            ]
        })))
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path(format!("{}/users/e1", ROOT)))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(doc("users", "e1", json!({"adminId": {"stringValue": "a1"}}))),
        )
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path(format!("{}/users/missing", ROOT)))
        .respond_with(not_found())
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_list_follows_page_tokens() {
    let server = MockServer::start().await;

    // Registered first so it wins over the unqualified listing below
    Mock::given(method("GET"))
        .and(path(format!("{}/visits", ROOT)))
        .and(query_param("pageToken", "p2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "documents": [doc("visits", "v2", json!({}))]
        })))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path(format!("{}/visits", ROOT)))
        .and(query_param("pageSize", "1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "documents": [doc("visits", "v1", json!({"employeeId": {"stringValue": "e1"}}))],
            "nextPageToken": "p2"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = client(&server).with_page_size(1);
    let docs = client.list_documents("visits").await.unwrap();

    let ids: Vec<&str> = docs.iter().map(|d| d.id.as_str()).collect();
    assert_eq!(ids, ["v1", "v2"]);
    assert_eq!(docs[0].get_str("employeeId"), Some("e1"));
}

#[tokio::test]
async fn test_empty_collection_has_no_documents_key() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(format!("{}/visits", ROOT)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .mount(&server)
        .await;

    let store = CommitStore::new(client(&server));
    assert!(store.fetch_all("visits").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_get_document_not_found_is_none() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(format!("{}/users/ghost", ROOT)))
        .respond_with(not_found())
        .mount(&server)
        .await;

    let found = client(&server).get_document("users", "ghost").await.unwrap();
    assert!(found.is_none());
}

#[tokio::test]
async fn test_api_error_is_reported() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(format!("{}/visits", ROOT)))
        .respond_with(ResponseTemplate::new(403).set_body_json(json!({
            "error": {"code": 403, "message": "Missing or insufficient permissions.", "status": "PERMISSION_DENIED"}
        })))
        .mount(&server)
        .await;

    let err = client(&server).list_documents("visits").await.unwrap_err();
    match err {
        AppError::Api { status, message } => {
            assert_eq!(status, 403);
            assert_eq!(message, "PERMISSION_DENIED: Missing or insufficient permissions.");
        }
        other => panic!("unexpected {:?}", other),
    }
}

#[tokio::test]
async fn test_commit_transport_end_to_end() {
    let server = MockServer::start().await;
    mount_fixture(&server).await;

    Mock::given(method("POST"))
        .and(path(format!("{}:commit", ROOT)))
        .and(body_json(json!({
            "writes": [{
                "update": {
                    "name": format!("{}/visits/v1", NAME_ROOT),
                    "fields": {"adminId": {"stringValue": "a1"}}
                },
                "updateMask": {"fieldPaths": ["adminId"]},
                "currentDocument": {"exists": true}
            }]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "writeResults": [{"updateTime": "2024-01-16T00:00:00Z"}],
            "commitTime": "2024-01-16T00:00:00Z"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let store = CommitStore::new(client(&server));
    let summary = run_migration(&store, &MigrationOptions::default(), &ConsoleReporter)
        .await
        .unwrap();

    assert_eq!(summary.total, 3);
    assert_eq!(summary.updated, 1);
    assert_eq!(summary.errors, 1);
    assert_eq!(summary.already_migrated, 1);
    assert_eq!(summary.batches_committed, 1);
}

#[tokio::test]
async fn test_patch_transport_end_to_end() {
    let server = MockServer::start().await;
    mount_fixture(&server).await;

    Mock::given(method("PATCH"))
        .and(path(format!("{}/visits/v1", ROOT)))
        .and(query_param("updateMask.fieldPaths", "adminId"))
        .and(query_param("currentDocument.exists", "true"))
        .and(body_json(json!({"fields": {"adminId": {"stringValue": "a1"}}})))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(doc("visits", "v1", json!({"adminId": {"stringValue": "a1"}}))),
        )
        .expect(1)
        .mount(&server)
        .await;

    let store = PatchStore::new(client(&server));
    let summary = run_migration(&store, &MigrationOptions::default(), &ConsoleReporter)
        .await
        .unwrap();

    assert_eq!(summary.updated, 1);
    assert_eq!(summary.errors, 1);
    assert_eq!(summary.already_migrated, 1);
}

#[tokio::test]
async fn test_failed_commit_aborts_run() {
    let server = MockServer::start().await;
    mount_fixture(&server).await;

    Mock::given(method("POST"))
        .and(path(format!("{}:commit", ROOT)))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": {"code": 400, "message": "bad write", "status": "INVALID_ARGUMENT"}
        })))
        .mount(&server)
        .await;

    let store = CommitStore::new(client(&server));
    let result = run_migration(&store, &MigrationOptions::default(), &ConsoleReporter).await;

    match result {
        Err(AppError::CommitFailed { pending, message }) => {
            assert_eq!(pending, 1);
            assert!(message.contains("INVALID_ARGUMENT"));
        }
        other => panic!("unexpected {:?}", other),
    }
}

#[tokio::test]
async fn test_patch_batch_stops_at_first_failure() {
    let server = MockServer::start().await;

    Mock::given(method("PATCH"))
        .and(path(format!("{}/visits/a", ROOT)))
        .respond_with(ResponseTemplate::new(200).set_body_json(doc("visits", "a", json!({}))))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("PATCH"))
        .and(path(format!("{}/visits/b", ROOT)))
        .respond_with(not_found())
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("PATCH"))
        .and(path(format!("{}/visits/c", ROOT)))
        .respond_with(ResponseTemplate::new(200).set_body_json(doc("visits", "c", json!({}))))
        .expect(0)
        .mount(&server)
        .await;

    let store = PatchStore::new(client(&server));
    let mut batch = store.batch();
    for id in ["a", "b", "c"] {
        batch.update_field("visits", id, "adminId", json!("a1"));
    }

    let err = batch.commit().await.unwrap_err();
    assert!(matches!(err, AppError::CommitFailed { pending: 2, .. }));
}

#[tokio::test]
async fn test_refresh_token_is_cached() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .and(body_string_contains("grant_type=refresh_token"))
        .and(body_string_contains("refresh_token=r3fresh"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "minted",
            "expires_in": 3599,
            "token_type": "Bearer"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let provider = AuthorizedUserToken::new(
        AuthorizedUser {
            client_id: "cid".to_string(),
            client_secret: "secret".to_string(),
            refresh_token: "r3fresh".to_string(),
            quota_project_id: None,
            token_uri: format!("{}/token", server.uri()),
        },
        reqwest::Client::new(),
    );

    assert_eq!(provider.access_token().await.unwrap(), "minted");
    assert_eq!(provider.access_token().await.unwrap(), "minted");
}

const SERVICE_ACCOUNT_PEM: &str = include_str!("fixtures/service_account_key.pem");
const SERVICE_ACCOUNT_PUBLIC_PEM: &str = include_str!("fixtures/service_account_key.pub.pem");

fn service_account(token_uri: &str) -> ServiceAccountToken {
    ServiceAccountToken::new(
        ServiceAccountKey {
            client_email: "migrator@proj.iam.gserviceaccount.com".to_string(),
            private_key: SERVICE_ACCOUNT_PEM.to_string(),
            private_key_id: Some("key-1".to_string()),
            project_id: Some("proj".to_string()),
            token_uri: token_uri.to_string(),
        },
        reqwest::Client::new(),
    )
    .expect("fixture key parses")
}

#[derive(Debug, Deserialize)]
struct AssertionClaims {
    iss: String,
    scope: String,
    aud: String,
}

#[tokio::test]
async fn test_service_account_exchanges_signed_assertion_once() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .and(body_string_contains(
            "grant_type=urn%3Aietf%3Aparams%3Aoauth%3Agrant-type%3Ajwt-bearer",
        ))
        .and(body_string_contains("assertion="))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "sa-token",
            "expires_in": 3599,
            "token_type": "Bearer"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let token_uri = format!("{}/token", server.uri());
    let provider = service_account(&token_uri);

    assert_eq!(provider.access_token().await.unwrap(), "sa-token");
    assert_eq!(provider.access_token().await.unwrap(), "sa-token");

    let requests = server.received_requests().await.unwrap();
    let assertion = url::form_urlencoded::parse(&requests[0].body)
        .find(|(key, _)| key == "assertion")
        .map(|(_, value)| value.into_owned())
        .expect("assertion in form body");

    let key = jsonwebtoken::DecodingKey::from_rsa_pem(SERVICE_ACCOUNT_PUBLIC_PEM.as_bytes()).unwrap();
    let mut validation = jsonwebtoken::Validation::new(jsonwebtoken::Algorithm::RS256);
    validation.set_audience(&[token_uri.as_str()]);
    let decoded = jsonwebtoken::decode::<AssertionClaims>(&assertion, &key, &validation).unwrap();

    assert_eq!(decoded.header.kid.as_deref(), Some("key-1"));
    assert_eq!(decoded.claims.iss, "migrator@proj.iam.gserviceaccount.com");
    assert_eq!(decoded.claims.scope, DATASTORE_SCOPE);
    assert_eq!(decoded.claims.aud, token_uri);
}

#[tokio::test]
async fn test_service_account_rejection_is_a_token_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": "invalid_grant",
            "error_description": "Invalid JWT Signature."
        })))
        .mount(&server)
        .await;

    let provider = service_account(&format!("{}/token", server.uri()));

    match provider.access_token().await {
        Err(AppError::Token(message)) => {
            assert!(message.contains("Invalid JWT Signature."));
            assert!(message.contains("(400)"));
        }
        other => panic!("unexpected {:?}", other),
    }
}

#[tokio::test]
async fn test_token_error_is_surfaced() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": "invalid_grant",
            "error_description": "Token has been expired or revoked."
        })))
        .mount(&server)
        .await;

    let provider = AuthorizedUserToken::new(
        AuthorizedUser {
            client_id: "cid".to_string(),
            client_secret: "secret".to_string(),
            refresh_token: "old".to_string(),
            quota_project_id: None,
            token_uri: format!("{}/token", server.uri()),
        },
        reqwest::Client::new(),
    );

    match provider.access_token().await {
        Err(AppError::Token(message)) => {
            assert!(message.contains("invalid_grant"));
            assert!(message.contains("(400)"));
        }
        other => panic!("unexpected {:?}", other),
    }
}

#[tokio::test]
async fn test_commit_batch_sends_all_writes_in_one_request() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(format!("{}:commit", ROOT)))
        .and(body_partial_json(json!({
            "writes": [
                {"update": {"name": format!("{}/visits/x", NAME_ROOT)}},
                {"update": {"name": format!("{}/visits/y", NAME_ROOT)}}
            ]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(1)
        .mount(&server)
        .await;

    let store = CommitStore::new(client(&server));
    let mut batch = store.batch();
    batch.update_field("visits", "x", "adminId", json!("a1"));
    batch.update_field("visits", "y", "adminId", json!("a2"));
    assert_eq!(batch.commit().await.unwrap(), 2);
}
