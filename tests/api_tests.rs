//! Integration tests for HTTP API endpoints.

mod common;

use std::time::Duration;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use bytes::Bytes;
use common::{multipart_body, TestServer, ALICE, ALICE_PASSWORD, BOB, BOB_PASSWORD};
use serde_json::{json, Value};
use tower::ServiceExt;

/// Helper to make JSON requests.
async fn json_request(
    router: &axum::Router,
    method: &str,
    uri: &str,
    body: Option<Value>,
    auth_token: Option<&str>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);

    if let Some(token) = auth_token {
        builder = builder.header("Authorization", format!("Bearer {}", token));
    }

    let body = match body {
        Some(v) => {
            builder = builder.header("Content-Type", "application/json");
            Body::from(serde_json::to_vec(&v).unwrap())
        }
        None => Body::empty(),
    };

    let request = builder.body(body).unwrap();
    let response = router.clone().oneshot(request).await.unwrap();

    let status = response.status();
    let body_bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();

    let json: Value = if body_bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&body_bytes).unwrap_or(Value::Null)
    };

    (status, json)
}

/// Helper for endpoints that answer in plain text or binary.
async fn raw_request(router: &axum::Router, request: Request<Body>) -> (StatusCode, header::HeaderMap, Bytes) {
    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, headers, body)
}

fn upload_request(token: Option<&str>, file: Option<(&str, &[u8])>, folder_id: Option<&str>) -> Request<Body> {
    let (content_type, body) = multipart_body(file, folder_id);
    let mut builder = Request::builder()
        .method("POST")
        .uri("/upload")
        .header("Content-Type", content_type);
    if let Some(token) = token {
        builder = builder.header("Authorization", format!("Bearer {}", token));
    }
    builder.body(Body::from(body)).unwrap()
}

// ============ Login ============

#[tokio::test]
async fn test_health_check() {
    let server = TestServer::new().await;
    server.token_for(ALICE, ALICE_PASSWORD).await;

    let (status, body) = json_request(&server.router, "GET", "/health", None, None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["healthy"], json!(true));
    assert_eq!(body["backend"], json!("memory"));
    assert_eq!(body["active_sessions"], json!(1));
}

#[tokio::test]
async fn test_login_issues_token() {
    let server = TestServer::new().await;

    let (status, body) = json_request(
        &server.router,
        "POST",
        "/api/login",
        Some(json!({ "email": ALICE, "password": ALICE_PASSWORD })),
        None,
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["email"], json!(ALICE));
    let token = body["token"].as_str().unwrap();
    assert_eq!(token.len(), 48);
    // the response carries the token and email only
    assert_eq!(body.as_object().unwrap().len(), 2);
    assert!(!body.to_string().contains(ALICE_PASSWORD));

    let (status, _) = json_request(&server.router, "GET", "/api/files", None, Some(token)).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_login_rejects_bad_password() {
    let server = TestServer::new().await;

    let (status, body) = json_request(
        &server.router,
        "POST",
        "/api/login",
        Some(json!({ "email": ALICE, "password": "nope" })),
        None,
    )
    .await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], json!("Invalid email or password"));
    assert_eq!(server.broker.active_sessions().await, 0);
}

#[tokio::test]
async fn test_login_requires_both_fields() {
    let server = TestServer::new().await;

    for payload in [json!({ "email": ALICE }), json!({ "password": "x" }), json!({})] {
        let (status, body) =
            json_request(&server.router, "POST", "/api/login", Some(payload), None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], json!("Email and password are required"));
    }
}

#[tokio::test]
async fn test_logout_revokes_token() {
    let server = TestServer::new().await;
    let token = server.token_for(ALICE, ALICE_PASSWORD).await;

    let (status, body) = json_request(&server.router, "POST", "/api/logout", None, Some(&token)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], json!(true));

    let (status, _) = json_request(&server.router, "GET", "/api/files", None, Some(&token)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = json_request(&server.router, "POST", "/api/logout", None, Some(&token)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_expired_token_is_unauthorized() {
    let server = TestServer::with_ttl(Some(Duration::from_millis(20))).await;
    let token = server.token_for(ALICE, ALICE_PASSWORD).await;
    tokio::time::sleep(Duration::from_millis(50)).await;

    let (status, body) = json_request(&server.router, "GET", "/api/files", None, Some(&token)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], json!("Unauthorized"));
}

// ============ Listing ============

#[tokio::test]
async fn test_files_requires_token() {
    let server = TestServer::new().await;

    let (status, body) = json_request(&server.router, "GET", "/api/files", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], json!("Unauthorized"));
    assert_eq!(body["code"], json!("unauthorized"));

    let (status, _) = json_request(&server.router, "GET", "/api/files", None, Some("made-up")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_files_lists_root_and_nested_folder() {
    let server = TestServer::new().await;
    let root = server.backend.root(ALICE).unwrap();
    let photos = server.backend.insert_folder(ALICE, &root.id, "photos").unwrap();
    let readme = server.backend.insert_file(ALICE, &root.id, "readme.txt", "hello").unwrap();
    let trip = server.backend.insert_folder(ALICE, &photos.id, "trip").unwrap();
    let beach = server.backend.insert_file(ALICE, &trip.id, "beach.jpg", vec![0u8; 2048]).unwrap();
    let token = server.token_for(ALICE, ALICE_PASSWORD).await;

    let (status, body) = json_request(&server.router, "GET", "/api/files", None, Some(&token)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["folders"].as_array().unwrap().len(), 1);
    assert_eq!(body["folders"][0]["id"], json!(photos.id));
    assert_eq!(body["folders"][0]["type"], json!("folder"));
    assert_eq!(body["folders"][0]["size"], Value::Null);
    assert_eq!(body["files"][0]["id"], json!(readme.id));
    assert_eq!(body["files"][0]["size"], json!(5));
    assert_eq!(
        body["files"][0]["downloadUrl"],
        json!(format!("/api/download/{}", readme.id))
    );

    // two levels down, found by depth-first search
    let uri = format!("/api/files?folderId={}", trip.id);
    let (status, body) = json_request(&server.router, "GET", &uri, None, Some(&token)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["folders"], json!([]));
    assert_eq!(body["files"][0]["name"], json!("beach.jpg"));
    assert_eq!(body["files"][0]["id"], json!(beach.id));
    assert_eq!(body["files"][0]["size"], json!(2048));
}

#[tokio::test]
async fn test_files_unknown_folder_and_file_target() {
    let server = TestServer::new().await;
    let root = server.backend.root(ALICE).unwrap();
    let file = server.backend.insert_file(ALICE, &root.id, "a.txt", "a").unwrap();
    let token = server.token_for(ALICE, ALICE_PASSWORD).await;

    let (status, body) =
        json_request(&server.router, "GET", "/api/files?folderId=missing", None, Some(&token)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], json!("Folder not found"));

    let uri = format!("/api/files?folderId={}", file.id);
    let (status, body) = json_request(&server.router, "GET", &uri, None, Some(&token)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], json!("Not a folder"));
}

#[tokio::test]
async fn test_accounts_are_isolated() {
    let server = TestServer::new().await;
    let alice_root = server.backend.root(ALICE).unwrap();
    let secret = server
        .backend
        .insert_folder(ALICE, &alice_root.id, "alice-only")
        .unwrap();
    let bob = server.token_for(BOB, BOB_PASSWORD).await;

    let (status, body) = json_request(&server.router, "GET", "/api/files", None, Some(&bob)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["folders"], json!([]));

    let uri = format!("/api/files?folderId={}", secret.id);
    let (status, _) = json_request(&server.router, "GET", &uri, None, Some(&bob)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

// ============ Folders ============

#[tokio::test]
async fn test_create_folder() {
    let server = TestServer::new().await;
    let root = server.backend.root(ALICE).unwrap();
    let docs = server.backend.insert_folder(ALICE, &root.id, "docs").unwrap();
    let token = server.token_for(ALICE, ALICE_PASSWORD).await;

    let (status, body) = json_request(
        &server.router,
        "POST",
        "/api/folder",
        Some(json!({ "name": "reports", "parentId": docs.id })),
        Some(&token),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], json!(true));
    assert_eq!(body["message"], json!("Folder \"reports\" created successfully"));
    assert_eq!(body["folder"]["name"], json!("reports"));
    assert_eq!(body["folder"]["type"], json!("folder"));
    let new_id = body["folder"]["id"].as_str().unwrap().to_string();

    let uri = format!("/api/files?folderId={}", docs.id);
    let (_, listing) = json_request(&server.router, "GET", &uri, None, Some(&token)).await;
    assert_eq!(listing["folders"][0]["id"], json!(new_id));

    // no parent means the root
    let (status, _) = json_request(
        &server.router,
        "POST",
        "/api/folder",
        Some(json!({ "name": "top" })),
        Some(&token),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let (_, listing) = json_request(&server.router, "GET", "/api/files", None, Some(&token)).await;
    assert_eq!(listing["folders"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn test_create_folder_errors() {
    let server = TestServer::new().await;
    let root = server.backend.root(ALICE).unwrap();
    let file = server.backend.insert_file(ALICE, &root.id, "a.txt", "a").unwrap();
    let token = server.token_for(ALICE, ALICE_PASSWORD).await;

    let cases = [
        (json!({ "name": "" }), StatusCode::BAD_REQUEST, "Folder name is required"),
        (
            json!({ "name": "x", "parentId": "missing" }),
            StatusCode::NOT_FOUND,
            "Parent folder not found",
        ),
        (
            json!({ "name": "x", "parentId": file.id }),
            StatusCode::BAD_REQUEST,
            "Parent is not a folder",
        ),
    ];
    for (payload, expected_status, expected_error) in cases {
        let (status, body) =
            json_request(&server.router, "POST", "/api/folder", Some(payload), Some(&token)).await;
        assert_eq!(status, expected_status);
        assert_eq!(body["error"], json!(expected_error));
    }

    let (status, _) = json_request(
        &server.router,
        "POST",
        "/api/folder",
        Some(json!({ "name": "x" })),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

// ============ Downloads ============

#[tokio::test]
async fn test_download_with_query_token() {
    let server = TestServer::new().await;
    let root = server.backend.root(ALICE).unwrap();
    let content: Vec<u8> = (0..150_000u32).map(|i| (i % 7) as u8).collect();
    let file = server
        .backend
        .insert_file(ALICE, &root.id, "data.bin", content.clone())
        .unwrap();
    let token = server.token_for(ALICE, ALICE_PASSWORD).await;

    let request = Request::builder()
        .uri(format!("/api/download/{}?token={}", file.id, token))
        .body(Body::empty())
        .unwrap();
    let (status, headers, body) = raw_request(&server.router, request).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(headers[header::CONTENT_TYPE], "application/octet-stream");
    assert_eq!(headers[header::CONTENT_LENGTH], "150000");
    assert!(headers[header::CONTENT_DISPOSITION]
        .to_str()
        .unwrap()
        .starts_with("attachment; filename=\"data.bin\""));
    assert_eq!(body, Bytes::from(content));
}

#[tokio::test]
async fn test_download_errors_are_plain_text() {
    let server = TestServer::new().await;
    let root = server.backend.root(ALICE).unwrap();
    let folder = server.backend.insert_folder(ALICE, &root.id, "docs").unwrap();
    let token = server.token_for(ALICE, ALICE_PASSWORD).await;

    let request = Request::builder()
        .uri("/api/download/missing")
        .body(Body::empty())
        .unwrap();
    let (status, _, body) = raw_request(&server.router, request).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body, "Unauthorized");

    for id in ["missing", folder.id.as_str()] {
        let request = Request::builder()
            .uri(format!("/api/download/{}", id))
            .header("Authorization", format!("Bearer {}", token))
            .body(Body::empty())
            .unwrap();
        let (status, _, body) = raw_request(&server.router, request).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body, "File not found");
    }
}

#[tokio::test]
async fn test_download_truncates_on_backend_error() {
    let server = TestServer::new().await;
    let root = server.backend.root(ALICE).unwrap();
    let content = vec![42u8; 10_000];
    let file = server
        .backend
        .insert_file(ALICE, &root.id, "flaky.bin", content.clone())
        .unwrap();
    server.backend.fail_download_after(&file.id, 4_000);
    let token = server.token_for(ALICE, ALICE_PASSWORD).await;

    let request = Request::builder()
        .uri(format!("/api/download/{}?token={}", file.id, token))
        .body(Body::empty())
        .unwrap();
    let (status, headers, body) = raw_request(&server.router, request).await;

    // status and length were committed before the failure
    assert_eq!(status, StatusCode::OK);
    assert_eq!(headers[header::CONTENT_LENGTH], "10000");
    assert_eq!(body.len(), 4_000);
    assert_eq!(body, Bytes::from(content[..4_000].to_vec()));
}

// ============ Uploads ============

#[tokio::test]
async fn test_upload_into_folder() {
    let server = TestServer::new().await;
    let root = server.backend.root(ALICE).unwrap();
    let docs = server.backend.insert_folder(ALICE, &root.id, "docs").unwrap();
    let token = server.token_for(ALICE, ALICE_PASSWORD).await;

    let request = upload_request(Some(&token), Some(("notes.txt", &b"meeting notes"[..])), Some(&docs.id));
    let (status, _, body) = raw_request(&server.router, request).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "File \"notes.txt\" uploaded successfully!");
    assert_eq!(server.staged_files(), 0);

    let uri = format!("/api/files?folderId={}", docs.id);
    let (_, listing) = json_request(&server.router, "GET", &uri, None, Some(&token)).await;
    assert_eq!(listing["files"][0]["name"], json!("notes.txt"));
    assert_eq!(listing["files"][0]["size"], json!(13));
    let id = listing["files"][0]["id"].as_str().unwrap();
    assert_eq!(
        server.backend.content(ALICE, id).unwrap(),
        Bytes::from_static(b"meeting notes")
    );
}

#[tokio::test]
async fn test_upload_unknown_folder_falls_back_to_root() {
    let server = TestServer::new().await;
    let token = server.token_for(ALICE, ALICE_PASSWORD).await;

    let request = upload_request(Some(&token), Some(("a.txt", &b"abc"[..])), Some("missing"));
    let (status, _, _) = raw_request(&server.router, request).await;
    assert_eq!(status, StatusCode::OK);

    let (_, listing) = json_request(&server.router, "GET", "/api/files", None, Some(&token)).await;
    assert_eq!(listing["files"][0]["name"], json!("a.txt"));
}

#[tokio::test]
async fn test_upload_requires_token_and_file() {
    let server = TestServer::new().await;
    let token = server.token_for(ALICE, ALICE_PASSWORD).await;

    let request = upload_request(None, Some(("a.txt", &b"abc"[..])), None);
    let (status, _, body) = raw_request(&server.router, request).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body, "Unauthorized");
    assert_eq!(server.staged_files(), 0);

    let request = upload_request(Some(&token), None, Some("whatever"));
    let (status, _, body) = raw_request(&server.router, request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, "File not found");
}

#[tokio::test]
async fn test_upload_backend_failure_cleans_staging() {
    let server = TestServer::new().await;
    server.backend.reject_uploads("quota exceeded");
    let token = server.token_for(ALICE, ALICE_PASSWORD).await;

    let request = upload_request(Some(&token), Some(("big.iso", &[7u8; 32 * 1024][..])), None);
    let (status, _, body) = raw_request(&server.router, request).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    let body = String::from_utf8(body.to_vec()).unwrap();
    assert!(body.starts_with("Upload error: "));
    assert!(body.contains("quota exceeded"));
    assert_eq!(server.staged_files(), 0);
}

#[tokio::test]
async fn test_upload_session_failure_cleans_staging() {
    let server = TestServer::new().await;
    let token = server.token_for(ALICE, ALICE_PASSWORD).await;
    // token is still live but the backend no longer accepts the account
    assert!(server.backend.remove_account(ALICE));

    let request = upload_request(Some(&token), Some(("late.txt", &b"staged then dropped"[..])), None);
    let (status, _, _) = raw_request(&server.router, request).await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(server.staged_files(), 0);
}

#[tokio::test]
async fn test_upload_truncated_body_cleans_staging() {
    let server = TestServer::new().await;
    let token = server.token_for(ALICE, ALICE_PASSWORD).await;

    let (content_type, mut body) = multipart_body(Some(("cut.bin", &[9u8; 8 * 1024][..])), None);
    // cut inside the file part so the closing boundary never arrives
    body.truncate(body.len() - 1024);

    let request = Request::builder()
        .method("POST")
        .uri("/upload")
        .header("Content-Type", content_type)
        .header("Authorization", format!("Bearer {}", token))
        .body(Body::from(body))
        .unwrap();
    let (status, _, body) = raw_request(&server.router, request).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(String::from_utf8(body.to_vec()).unwrap().starts_with("File upload error: "));
    assert_eq!(server.staged_files(), 0);

    let (_, listing) = json_request(&server.router, "GET", "/api/files", None, Some(&token)).await;
    assert_eq!(listing["files"], json!([]));
}

#[tokio::test]
async fn test_concurrent_logins_stay_separate() {
    let server = TestServer::new().await;
    let bob_root = server.backend.root(BOB).unwrap();
    server.backend.insert_folder(BOB, &bob_root.id, "bob-stuff").unwrap();

    let (alice, bob) = tokio::join!(
        server.token_for(ALICE, ALICE_PASSWORD),
        server.token_for(BOB, BOB_PASSWORD)
    );
    assert_ne!(alice, bob);

    let (_, alice_listing) = json_request(&server.router, "GET", "/api/files", None, Some(&alice)).await;
    let (_, bob_listing) = json_request(&server.router, "GET", "/api/files", None, Some(&bob)).await;
    assert_eq!(alice_listing["folders"], json!([]));
    assert_eq!(bob_listing["folders"][0]["name"], json!("bob-stuff"));
}
