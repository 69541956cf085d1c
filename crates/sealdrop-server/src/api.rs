use std::convert::Infallible;
use std::sync::Arc;

use axum::{
    body::{Body, Bytes},
    extract::{DefaultBodyLimit, FromRef, Query, State},
    http::{header, HeaderMap, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use futures::{future, stream, StreamExt};
use serde::Deserialize;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use sealdrop_shared::constants::REGISTRATION_TOKEN_HEADER;
use sealdrop_shared::models::{FileMetadata, Session, User};
use sealdrop_shared::protocol::{
    AuthChallenge, AuthResponse, DeleteResponse, HealthResponse, RegisterRequest, UploadRequest,
};

use crate::auth::{AuthUser, Authenticator};
use crate::error::ServerError;
use crate::transfer::TransferService;

/// Room for base64 expansion and the JSON envelope around an upload.
const BODY_OVERHEAD: usize = 64 * 1024;

#[derive(Clone)]
pub struct AppState {
    pub auth: Arc<Authenticator>,
    pub transfers: Arc<TransferService>,
}

impl FromRef<AppState> for Arc<Authenticator> {
    fn from_ref(state: &AppState) -> Self {
        state.auth.clone()
    }
}

pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers(Any);

    let body_limit = (state.transfers.max_file_size() / 3)
        .saturating_mul(4)
        .saturating_add(BODY_OVERHEAD);

    Router::new()
        .route("/ping", get(ping))
        .route("/health", get(health_check))
        .route("/users", post(register).get(users))
        .route("/auth/challenge", get(challenge))
        .route("/auth/login", post(login))
        .route("/auth/logout", post(logout))
        .route("/files", post(upload).get(list_files).delete(delete_file))
        .route("/files/download", get(download))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[derive(Deserialize)]
struct UsernameQuery {
    username: Option<String>,
}

#[derive(Deserialize)]
struct IdQuery {
    id: Option<String>,
}

fn required(value: Option<String>, name: &str) -> Result<String, ServerError> {
    value
        .filter(|v| !v.is_empty())
        .ok_or_else(|| ServerError::Validation(format!("missing query parameter '{name}'")))
}

async fn ping() -> &'static str {
    "pong"
}

async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".into(),
        version: env!("CARGO_PKG_VERSION").into(),
    })
}

async fn register(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<User>), ServerError> {
    let token = headers
        .get(REGISTRATION_TOKEN_HEADER)
        .and_then(|v| v.to_str().ok());
    let user = state.transfers.register(token, request)?;
    Ok((StatusCode::CREATED, Json(user)))
}

/// `?username=` returns one user, no query lists everyone.
async fn users(
    State(state): State<AppState>,
    Query(query): Query<UsernameQuery>,
) -> Result<Response, ServerError> {
    match query.username.filter(|u| !u.is_empty()) {
        Some(username) => Ok(Json(state.transfers.lookup_user(&username)?).into_response()),
        None => Ok(Json(state.transfers.list_users()?).into_response()),
    }
}

async fn challenge(
    State(state): State<AppState>,
    Query(query): Query<UsernameQuery>,
) -> Result<Json<AuthChallenge>, ServerError> {
    let username = required(query.username, "username")?;
    Ok(Json(state.auth.issue_challenge(&username)?))
}

async fn login(
    State(state): State<AppState>,
    Json(response): Json<AuthResponse>,
) -> Result<Json<Session>, ServerError> {
    Ok(Json(state.auth.login(&response)?))
}

async fn logout(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
) -> Result<StatusCode, ServerError> {
    state.auth.logout(&user)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn upload(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Json(request): Json<UploadRequest>,
) -> Result<(StatusCode, Json<FileMetadata>), ServerError> {
    let record = state.transfers.upload(&user, request).await?;
    Ok((StatusCode::CREATED, Json(record)))
}

async fn list_files(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
) -> Result<Json<Vec<FileMetadata>>, ServerError> {
    Ok(Json(state.transfers.list(&user)?))
}

/// Auto-delete is chained behind the encoded body and only runs once the
/// whole body has been polled. A response that is dropped early, or never
/// encoded, leaves the file in place.
async fn download(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Query(query): Query<IdQuery>,
) -> Result<Response, ServerError> {
    let id = required(query.id, "id")?;
    let response = state.transfers.download(&user, &id).await?;

    let encoded = serde_json::to_vec(&response)
        .map_err(|e| ServerError::Internal(format!("encode download: {e}")))?;

    let transfers = state.transfers.clone();
    let metadata = response.metadata;
    let finish = stream::once(async move { transfers.complete_download(&metadata).await })
        .filter_map(|()| future::ready(None::<Result<Bytes, Infallible>>));
    let body = stream::iter([Ok(Bytes::from(encoded))]).chain(finish);

    Ok((
        [(header::CONTENT_TYPE, "application/json")],
        Body::from_stream(body),
    )
        .into_response())
}

async fn delete_file(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Query(query): Query<IdQuery>,
) -> Result<Json<DeleteResponse>, ServerError> {
    let id = required(query.id, "id")?;
    Ok(Json(state.transfers.delete(&user, &id).await?))
}

pub async fn serve(state: AppState, addr: std::net::SocketAddr) -> anyhow::Result<()> {
    let app = build_router(state);

    info!(addr = %addr, "Starting HTTP API server");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::time::Duration;

    use axum::body::to_bytes;
    use axum::http::Request;
    use serde::de::DeserializeOwned;
    use serde_json::json;
    use tower::ServiceExt;

    use sealdrop_shared::crypto::{open_from_sender, seal_for_recipient};
    use sealdrop_shared::encoding;
    use sealdrop_shared::identity::KeyBundle;
    use sealdrop_shared::protocol::{DownloadResponse, ErrorBody, UploadMetadata};
    use sealdrop_store::{Database, ObjectBlobStore, Storage};

    use crate::auth::AuthPolicy;

    const MAX: usize = 1024 * 1024;

    fn app_with(token: Option<&str>, policy: AuthPolicy) -> Router {
        let storage = Arc::new(Storage::new(
            Database::open_in_memory().unwrap(),
            Arc::new(ObjectBlobStore::in_memory()),
        ));
        build_router(AppState {
            auth: Arc::new(Authenticator::new(storage.clone(), policy)),
            transfers: Arc::new(TransferService::new(
                storage,
                token.map(String::from),
                MAX,
            )),
        })
    }

    fn app() -> Router {
        app_with(None, AuthPolicy::default())
    }

    async fn send(
        app: &Router,
        method: Method,
        uri: &str,
        bearer: Option<&str>,
        body: Option<serde_json::Value>,
    ) -> Response {
        let mut req = Request::builder().method(method).uri(uri);
        if let Some(token) = bearer {
            req = req.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        let req = match body {
            Some(json) => req
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(json.to_string()))
                .unwrap(),
            None => req.body(Body::empty()).unwrap(),
        };
        app.clone().oneshot(req).await.unwrap()
    }

    async fn read<T: DeserializeOwned>(response: Response) -> T {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    async fn enroll(app: &Router, name: &str) -> KeyBundle {
        let keys = KeyBundle::generate().unwrap();
        let body = serde_json::to_value(keys.registration(name)).unwrap();
        let res = send(app, Method::POST, "/users", None, Some(body)).await;
        assert_eq!(res.status(), StatusCode::CREATED);
        keys
    }

    async fn fetch_challenge(app: &Router, name: &str) -> AuthChallenge {
        let res = send(
            app,
            Method::GET,
            &format!("/auth/challenge?username={name}"),
            None,
            None,
        )
        .await;
        assert_eq!(res.status(), StatusCode::OK);
        read(res).await
    }

    fn signed(challenge: &AuthChallenge, keys: &KeyBundle) -> serde_json::Value {
        serde_json::to_value(AuthResponse {
            username: challenge.username.clone(),
            nonce: challenge.nonce.clone(),
            signature: keys.identity.sign(challenge.nonce.as_bytes()).to_vec(),
        })
        .unwrap()
    }

    async fn login_as(app: &Router, name: &str, keys: &KeyBundle) -> String {
        let challenge = fetch_challenge(app, name).await;
        let res = send(app, Method::POST, "/auth/login", None, Some(signed(&challenge, keys))).await;
        assert_eq!(res.status(), StatusCode::OK);
        read::<Session>(res).await.token
    }

    async fn upload_sealed(
        app: &Router,
        token: &str,
        recipient: &str,
        recipient_keys: &KeyBundle,
        plaintext: &[u8],
        auto_delete: bool,
    ) -> FileMetadata {
        let sealed =
            seal_for_recipient(plaintext, &recipient_keys.exchange.public_key_bytes()).unwrap();
        let request = UploadRequest {
            metadata: UploadMetadata {
                recipient: recipient.into(),
                file_name: "secret.txt".into(),
                encrypted_key: sealed.ephemeral_public.to_vec(),
                auto_delete,
                ..Default::default()
            },
            encrypted_content: sealed.ciphertext,
        };
        let res = send(
            app,
            Method::POST,
            "/files",
            Some(token),
            Some(serde_json::to_value(request).unwrap()),
        )
        .await;
        assert_eq!(res.status(), StatusCode::CREATED);
        read(res).await
    }

    #[tokio::test]
    async fn test_ping_and_health() {
        let app = app();
        let res = send(&app, Method::GET, "/ping", None, None).await;
        assert_eq!(res.status(), StatusCode::OK);
        let body = to_bytes(res.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&body[..], b"pong");

        let health: HealthResponse = read(send(&app, Method::GET, "/health", None, None).await).await;
        assert_eq!(health.status, "ok");
    }

    #[tokio::test]
    async fn test_alice_sends_bob_a_file() {
        let app = app();
        let alice = enroll(&app, "alice").await;
        let bob = enroll(&app, "bob").await;

        let s1 = login_as(&app, "alice", &alice).await;

        // Alice discovers bob's exchange key through the directory.
        let res = send(&app, Method::GET, "/users?username=bob", None, None).await;
        let bob_public: User = read(res).await;
        assert_eq!(bob_public.exchange_public_key, bob.exchange.public_key_bytes());

        let plaintext = b"the eagle lands at midnight";
        let uploaded = upload_sealed(&app, &s1, "bob", &bob, plaintext, false).await;
        assert_eq!(uploaded.sender, "alice");

        let s2 = login_as(&app, "bob", &bob).await;
        let inbox: Vec<FileMetadata> =
            read(send(&app, Method::GET, "/files", Some(&s2), None).await).await;
        assert_eq!(inbox.len(), 1);
        assert_eq!(inbox[0].recipient, "bob");

        let res = send(
            &app,
            Method::GET,
            &format!("/files/download?id={}", inbox[0].id),
            Some(&s2),
            None,
        )
        .await;
        assert_eq!(res.status(), StatusCode::OK);
        let download: DownloadResponse = read(res).await;
        let opened = open_from_sender(
            &download.encrypted_content,
            &download.metadata.encrypted_key,
            &bob.exchange,
        )
        .unwrap();
        assert_eq!(opened, plaintext);

        // Alice's own inbox stays empty.
        let inbox: Vec<FileMetadata> =
            read(send(&app, Method::GET, "/files", Some(&s1), None).await).await;
        assert!(inbox.is_empty());
    }

    #[tokio::test]
    async fn test_wrong_signature_burns_challenge() {
        let app = app();
        let alice = enroll(&app, "alice").await;
        let impostor = KeyBundle::generate().unwrap();

        let challenge = fetch_challenge(&app, "alice").await;
        let res = send(
            &app,
            Method::POST,
            "/auth/login",
            None,
            Some(signed(&challenge, &impostor)),
        )
        .await;
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
        let wrong_sig: ErrorBody = read(res).await;

        let res = send(&app, Method::POST, "/auth/login", None, Some(signed(&challenge, &alice))).await;
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
        let stale_nonce: ErrorBody = read(res).await;

        // No oracle: both failures look the same.
        assert_eq!(wrong_sig.error, stale_nonce.error);
    }

    #[tokio::test]
    async fn test_challenge_replay_rejected() {
        let app = app();
        let alice = enroll(&app, "alice").await;
        let challenge = fetch_challenge(&app, "alice").await;
        let answer = signed(&challenge, &alice);

        let res = send(&app, Method::POST, "/auth/login", None, Some(answer.clone())).await;
        assert_eq!(res.status(), StatusCode::OK);
        let res = send(&app, Method::POST, "/auth/login", None, Some(answer)).await;
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_challenge_for_unknown_user() {
        let app = app();
        let res = send(&app, Method::GET, "/auth/challenge?username=ghost", None, None).await;
        assert_eq!(res.status(), StatusCode::NOT_FOUND);

        let res = send(&app, Method::GET, "/auth/challenge", None, None).await;
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_expired_session_looks_like_unknown_token() {
        let app = app_with(
            None,
            AuthPolicy {
                session_ttl: Duration::ZERO,
                ..AuthPolicy::default()
            },
        );
        let alice = enroll(&app, "alice").await;
        let token = login_as(&app, "alice", &alice).await;

        let expired = send(&app, Method::GET, "/files", Some(&token), None).await;
        let unknown = send(&app, Method::GET, "/files", Some("deadbeef"), None).await;
        assert_eq!(expired.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(unknown.status(), StatusCode::UNAUTHORIZED);
        let expired: ErrorBody = read(expired).await;
        let unknown: ErrorBody = read(unknown).await;
        assert_eq!(expired.error, unknown.error);
    }

    #[tokio::test]
    async fn test_malformed_authorization_rejected() {
        let app = app();
        for value in ["", "Bearer", "Bearer a b", "Basic abc", "token"] {
            let req = Request::builder()
                .uri("/files")
                .header(header::AUTHORIZATION, value)
                .body(Body::empty())
                .unwrap();
            let res = app.clone().oneshot(req).await.unwrap();
            assert_eq!(res.status(), StatusCode::UNAUTHORIZED, "header {value:?}");
        }
        let res = send(&app, Method::GET, "/files", None, None).await;
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_logout_revokes_session() {
        let app = app();
        let alice = enroll(&app, "alice").await;
        let token = login_as(&app, "alice", &alice).await;

        let res = send(&app, Method::POST, "/auth/logout", Some(&token), None).await;
        assert_eq!(res.status(), StatusCode::NO_CONTENT);
        let res = send(&app, Method::GET, "/files", Some(&token), None).await;
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_third_party_delete_forbidden() {
        let app = app();
        let alice = enroll(&app, "alice").await;
        let bob = enroll(&app, "bob").await;
        let carol = enroll(&app, "carol").await;

        let sa = login_as(&app, "alice", &alice).await;
        let sb = login_as(&app, "bob", &bob).await;
        let sc = login_as(&app, "carol", &carol).await;
        let record = upload_sealed(&app, &sa, "bob", &bob, b"private", false).await;

        let res = send(
            &app,
            Method::DELETE,
            &format!("/files?id={}", record.id),
            Some(&sc),
            None,
        )
        .await;
        assert_eq!(res.status(), StatusCode::FORBIDDEN);

        let inbox: Vec<FileMetadata> =
            read(send(&app, Method::GET, "/files", Some(&sb), None).await).await;
        assert_eq!(inbox.len(), 1);
        let res = send(
            &app,
            Method::GET,
            &format!("/files/download?id={}", record.id),
            Some(&sb),
            None,
        )
        .await;
        assert_eq!(res.status(), StatusCode::OK);

        let res = send(
            &app,
            Method::DELETE,
            &format!("/files?id={}", record.id),
            Some(&sb),
            None,
        )
        .await;
        assert_eq!(res.status(), StatusCode::OK);
        assert!(read::<DeleteResponse>(res).await.deleted);

        let res = send(
            &app,
            Method::GET,
            &format!("/files/download?id={}", record.id),
            Some(&sb),
            None,
        )
        .await;
        assert_eq!(res.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_auto_delete_after_download() {
        let app = app();
        let alice = enroll(&app, "alice").await;
        let bob = enroll(&app, "bob").await;
        let sa = login_as(&app, "alice", &alice).await;
        let sb = login_as(&app, "bob", &bob).await;

        let record = upload_sealed(&app, &sa, "bob", &bob, b"burn after reading", true).await;
        let uri = format!("/files/download?id={}", record.id);

        let first = send(&app, Method::GET, &uri, Some(&sb), None).await;
        assert_eq!(first.status(), StatusCode::OK);
        let download: DownloadResponse = read(first).await;
        assert_eq!(
            open_from_sender(
                &download.encrypted_content,
                &download.metadata.encrypted_key,
                &bob.exchange
            )
            .unwrap(),
            b"burn after reading"
        );

        let second = send(&app, Method::GET, &uri, Some(&sb), None).await;
        assert_eq!(second.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_unread_download_keeps_auto_delete_file() {
        let app = app();
        let alice = enroll(&app, "alice").await;
        let bob = enroll(&app, "bob").await;
        let sa = login_as(&app, "alice", &alice).await;
        let sb = login_as(&app, "bob", &bob).await;

        let record = upload_sealed(&app, &sa, "bob", &bob, b"only once", true).await;
        let uri = format!("/files/download?id={}", record.id);

        // Connection lost before the body went out.
        let dropped = send(&app, Method::GET, &uri, Some(&sb), None).await;
        assert_eq!(dropped.status(), StatusCode::OK);
        drop(dropped);

        let res = send(&app, Method::GET, "/files", Some(&sb), None).await;
        let inbox: Vec<FileMetadata> = read(res).await;
        assert_eq!(inbox, vec![record.clone()]);

        // A complete read still burns it.
        let full = send(&app, Method::GET, &uri, Some(&sb), None).await;
        let download: DownloadResponse = read(full).await;
        assert_eq!(download.metadata, record);

        let res = send(&app, Method::GET, "/files", Some(&sb), None).await;
        assert!(read::<Vec<FileMetadata>>(res).await.is_empty());
    }

    #[tokio::test]
    async fn test_unbounded_file_size_builds_router() {
        let storage = Arc::new(Storage::new(
            Database::open_in_memory().unwrap(),
            Arc::new(ObjectBlobStore::in_memory()),
        ));
        let app = build_router(AppState {
            auth: Arc::new(Authenticator::new(storage.clone(), AuthPolicy::default())),
            transfers: Arc::new(TransferService::new(storage, None, usize::MAX)),
        });

        let res = send(&app, Method::GET, "/ping", None, None).await;
        assert_eq!(res.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_registration_token_gate() {
        let app = app_with(Some("open-sesame"), AuthPolicy::default());
        let keys = KeyBundle::generate().unwrap();
        let body = serde_json::to_value(keys.registration("alice")).unwrap();

        let res = send(&app, Method::POST, "/users", None, Some(body.clone())).await;
        assert_eq!(res.status(), StatusCode::FORBIDDEN);

        let req = Request::builder()
            .method(Method::POST)
            .uri("/users")
            .header(header::CONTENT_TYPE, "application/json")
            .header(REGISTRATION_TOKEN_HEADER, "open-sesame")
            .body(Body::from(body.to_string()))
            .unwrap();
        let res = app.clone().oneshot(req).await.unwrap();
        assert_eq!(res.status(), StatusCode::CREATED);

        let users: Vec<User> = read(send(&app, Method::GET, "/users", None, None).await).await;
        assert_eq!(users.len(), 1);
    }

    #[tokio::test]
    async fn test_register_errors() {
        let app = app();
        enroll(&app, "alice").await;

        let again = serde_json::to_value(KeyBundle::generate().unwrap().registration("alice")).unwrap();
        let res = send(&app, Method::POST, "/users", None, Some(again)).await;
        assert_eq!(res.status(), StatusCode::CONFLICT);

        let short = json!({
            "username": "bob",
            "identity_public_key": encoding::encode(&[1u8; 16]),
            "exchange_public_key": encoding::encode(&[2u8; 32]),
        });
        let res = send(&app, Method::POST, "/users", None, Some(short)).await;
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_upload_to_unknown_recipient() {
        let app = app();
        let alice = enroll(&app, "alice").await;
        let token = login_as(&app, "alice", &alice).await;
        let request = json!({
            "metadata": {
                "recipient": "nobody",
                "file_name": "x",
                "encrypted_key": encoding::encode(&[3u8; 32]),
            },
            "encrypted_content": encoding::encode(b"abc"),
        });
        let res = send(&app, Method::POST, "/files", Some(&token), Some(request)).await;
        assert_eq!(res.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_uploads_get_unique_ids() {
        let app = app();
        let alice = enroll(&app, "alice").await;
        let bob = enroll(&app, "bob").await;
        let sa = login_as(&app, "alice", &alice).await;
        let sb = login_as(&app, "bob", &bob).await;
        let n = 16;

        let tasks: Vec<_> = (0..n)
            .map(|i| {
                let app = app.clone();
                let token = sa.clone();
                let bob = bob.clone();
                tokio::spawn(async move {
                    let body = format!("file number {i}");
                    let record =
                        upload_sealed(&app, &token, "bob", &bob, body.as_bytes(), false).await;
                    (record.id, body)
                })
            })
            .collect();

        let uploads: Vec<(String, String)> = futures::future::join_all(tasks)
            .await
            .into_iter()
            .map(|r| r.unwrap())
            .collect();
        let ids: HashSet<_> = uploads.iter().map(|(id, _)| id.clone()).collect();
        assert_eq!(ids.len(), n);

        for (id, expected) in uploads {
            let res = send(
                &app,
                Method::GET,
                &format!("/files/download?id={id}"),
                Some(&sb),
                None,
            )
            .await;
            let download: DownloadResponse = read(res).await;
            let opened = open_from_sender(
                &download.encrypted_content,
                &download.metadata.encrypted_key,
                &bob.exchange,
            )
            .unwrap();
            assert_eq!(opened, expected.as_bytes());
        }
    }
}
