//! GitHub Actions secrets API client implementing the ghsm store contracts.

use std::{fmt, time::Duration};

use async_trait::async_trait;
use ghsm_core::{
    error::{KeyFetchError, UpsertError},
    model::{EncryptedPayload, PublicKeyMaterial, Scope, UpsertOutcome},
    store::{KeyProvider, SecretUpserter},
};
use ghsm_crypto::key::{decode_public_key, encode_ciphertext};
use reqwest::{
    header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION},
    StatusCode,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, instrument};

pub const DEFAULT_API_BASE: &str = "https://api.github.com";
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;
const API_VERSION: &str = "2022-11-28";

/// Connection settings for the GitHub API.
#[derive(Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct GitHubConfig {
    pub token: String,
    #[serde(default)]
    pub api_base: Option<String>,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

impl GitHubConfig {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            api_base: None,
            timeout_secs: None,
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS))
    }
}

impl fmt::Debug for GitHubConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GitHubConfig")
            .field("token", &"<redacted>")
            .field("api_base", &self.api_base)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("GitHub token contains characters not allowed in an HTTP header")]
    InvalidToken,
    #[error("failed to build HTTP client: {0}")]
    Build(#[from] reqwest::Error),
}

/// Client for one GitHub API base. Cheap to clone; clones share a connection pool.
#[derive(Debug, Clone)]
pub struct GitHubClient {
    base: String,
    client: reqwest::Client,
}

impl GitHubClient {
    pub fn new(cfg: &GitHubConfig) -> Result<Self, ClientError> {
        let mut auth = HeaderValue::from_str(&format!("Bearer {}", cfg.token))
            .map_err(|_| ClientError::InvalidToken)?;
        auth.set_sensitive(true);

        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, auth);
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("application/vnd.github+json"),
        );
        headers.insert("x-github-api-version", HeaderValue::from_static(API_VERSION));

        let client = reqwest::Client::builder()
            .user_agent(concat!("ghsm/", env!("CARGO_PKG_VERSION")))
            .default_headers(headers)
            .timeout(cfg.timeout())
            .build()?;

        Ok(Self {
            base: cfg
                .api_base
                .as_deref()
                .unwrap_or(DEFAULT_API_BASE)
                .trim_end_matches('/')
                .to_string(),
            client,
        })
    }

    fn secrets_url(&self, scope: &Scope, tail: &str) -> String {
        format!("{}/{}/actions/secrets/{tail}", self.base, scope.root_path())
    }

    async fn put_secret(
        &self,
        scope: &Scope,
        name: &str,
        payload: &EncryptedPayload,
    ) -> Result<UpsertOutcome, UpsertError> {
        let url = self.secrets_url(scope, name);
        let body = UpsertSecretBody::new(scope, payload);
        let resp = self
            .client
            .put(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| UpsertError::Transport {
                reason: describe(&e),
            })?;

        let status = resp.status();
        let text = resp.text().await.map_err(|e| UpsertError::Transport {
            reason: describe(&e),
        })?;
        debug!(%status, "upsert response");
        classify_upsert(status, text)
    }
}

#[async_trait]
impl KeyProvider for GitHubClient {
    #[instrument(skip_all, fields(scope = %scope))]
    async fn fetch(&self, scope: &Scope) -> Result<PublicKeyMaterial, KeyFetchError> {
        let url = self.secrets_url(scope, "public-key");
        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| KeyFetchError::Transport {
                reason: describe(&e),
            })?;

        let status = resp.status();
        if status.is_success() {
            let body: PublicKeyResponse = resp.json().await.map_err(|e| {
                if e.is_decode() {
                    KeyFetchError::InvalidKeyMaterial {
                        reason: format!("unreadable public key response: {e}"),
                    }
                } else {
                    KeyFetchError::Transport {
                        reason: describe(&e),
                    }
                }
            })?;
            return decode_public_key(&body.key, body.key_id);
        }

        let text = resp.text().await.map_err(|e| KeyFetchError::Transport {
            reason: describe(&e),
        })?;
        Err(match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => KeyFetchError::Authorization {
                scope: scope.to_string(),
                message: error_message(status, &text),
            },
            StatusCode::NOT_FOUND => KeyFetchError::NotFound {
                scope: scope.to_string(),
            },
            _ => KeyFetchError::Transport {
                reason: format!(
                    "unexpected status {status}: {}",
                    error_message(status, &text)
                ),
            },
        })
    }
}

#[async_trait]
impl SecretUpserter for GitHubClient {
    #[instrument(skip_all, fields(scope = %scope, secret = name))]
    async fn upsert(
        &self,
        scope: &Scope,
        name: &str,
        payload: &EncryptedPayload,
    ) -> UpsertOutcome {
        match self.put_secret(scope, name, payload).await {
            Ok(outcome) => outcome,
            Err(err) => err.into(),
        }
    }
}

/// Map a create-or-update response to an outcome: 201 is a new secret, 204 an
/// overwrite, anything else a rejection carrying the response body.
///
/// An empty rejection body is replaced by the status line so the reason is never blank.
pub fn classify_upsert(status: StatusCode, body: String) -> Result<UpsertOutcome, UpsertError> {
    match status {
        StatusCode::CREATED => Ok(UpsertOutcome::Created),
        StatusCode::NO_CONTENT => Ok(UpsertOutcome::Updated),
        _ => Err(UpsertError::Rejected {
            status: status.as_u16(),
            body: if body.trim().is_empty() {
                status.to_string()
            } else {
                body
            },
        }),
    }
}

#[derive(Debug, Deserialize)]
struct PublicKeyResponse {
    key_id: String,
    key: String,
}

#[derive(Debug, Serialize)]
struct UpsertSecretBody<'a> {
    encrypted_value: String,
    key_id: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    visibility: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    selected_repository_ids: Option<&'a [u64]>,
}

impl<'a> UpsertSecretBody<'a> {
    fn new(scope: &'a Scope, payload: &'a EncryptedPayload) -> Self {
        let visibility = scope.visibility();
        Self {
            encrypted_value: encode_ciphertext(&payload.ciphertext),
            key_id: &payload.key_id,
            visibility: visibility.map(|v| v.as_str()),
            selected_repository_ids: visibility.and_then(|v| v.selected_repository_ids()),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ApiError {
    message: String,
}

fn error_message(status: StatusCode, body: &str) -> String {
    match serde_json::from_str::<ApiError>(body) {
        Ok(err) => err.message,
        Err(_) if body.trim().is_empty() => status.to_string(),
        Err(_) => body.trim().to_string(),
    }
}

fn describe(err: &reqwest::Error) -> String {
    if err.is_timeout() {
        format!("request timed out: {err}")
    } else if err.is_connect() {
        format!("connection failed: {err}")
    } else {
        err.to_string()
    }
}

#[cfg(test)]
mod tests {
    use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
    use crypto_box::SecretKey;
    use ghsm_core::{
        batch::BatchRunner,
        error::BatchError,
        model::{RecordOutcome, SecretRecord, Visibility},
        store::Encryptor,
    };
    use ghsm_crypto::{key::encode_public_key, sealed_box::SealedBoxEncryptor};
    use mockito::{Matcher, Server};
    use rand::rngs::OsRng;
    use serde_json::json;

    use super::*;

    const KEY_ID: &str = "568250167242549743";

    fn client(server: &Server) -> GitHubClient {
        let cfg = GitHubConfig {
            token: "test-token".into(),
            api_base: Some(server.url()),
            timeout_secs: Some(5),
        };
        GitHubClient::new(&cfg).expect("client")
    }

    fn key_body(public: &[u8]) -> String {
        json!({ "key_id": KEY_ID, "key": encode_public_key(public) }).to_string()
    }

    fn payload() -> EncryptedPayload {
        EncryptedPayload {
            key_id: KEY_ID.into(),
            ciphertext: vec![1, 2, 3],
        }
    }

    #[test]
    fn config_debug_redacts_token() {
        let rendered = format!("{:?}", GitHubConfig::new("ghp_secret"));
        assert!(!rendered.contains("ghp_secret"));
    }

    #[test]
    fn rejects_token_with_newline() {
        let err = GitHubClient::new(&GitHubConfig::new("bad\ntoken")).expect_err("invalid");
        assert!(matches!(err, ClientError::InvalidToken));
    }

    #[test]
    fn classifies_upsert_statuses() {
        assert_eq!(
            classify_upsert(StatusCode::CREATED, String::new()),
            Ok(UpsertOutcome::Created)
        );
        assert_eq!(
            classify_upsert(StatusCode::NO_CONTENT, String::new()),
            Ok(UpsertOutcome::Updated)
        );
        let body = r#"{"message":"Invalid request."}"#.to_string();
        assert_eq!(
            classify_upsert(StatusCode::UNPROCESSABLE_ENTITY, body.clone()),
            Err(UpsertError::Rejected { status: 422, body })
        );
        // 200 is a success status but not one the endpoint promises.
        assert!(classify_upsert(StatusCode::OK, "{}".into()).is_err());
    }

    #[test]
    fn repository_body_has_no_visibility() {
        let scope = Scope::repository("acme", "api").expect("scope");
        let payload = payload();
        let body = serde_json::to_value(UpsertSecretBody::new(&scope, &payload)).unwrap();
        assert_eq!(
            body,
            json!({ "encrypted_value": "AQID", "key_id": KEY_ID })
        );
    }

    #[test]
    fn organization_body_carries_visibility() {
        let payload = payload();
        let private = Scope::organization("acme", Some(Visibility::Private)).expect("scope");
        let body = serde_json::to_value(UpsertSecretBody::new(&private, &payload)).unwrap();
        assert_eq!(
            body,
            json!({ "encrypted_value": "AQID", "key_id": KEY_ID, "visibility": "private" })
        );

        let selected = Scope::organization(
            "acme",
            Some(Visibility::Selected {
                repository_ids: vec![1296269, 1269280],
            }),
        )
        .expect("scope");
        let body = serde_json::to_value(UpsertSecretBody::new(&selected, &payload)).unwrap();
        assert_eq!(body["visibility"], "selected");
        assert_eq!(body["selected_repository_ids"], json!([1296269, 1269280]));
    }

    #[test]
    fn sealed_body_opens_with_recipient_key() {
        let secret = SecretKey::generate(&mut OsRng);
        let key = PublicKeyMaterial::new(secret.public_key().as_bytes(), KEY_ID).unwrap();
        let payload = SealedBoxEncryptor.seal(&key, b"v1").unwrap();
        let scope = Scope::repository("acme", "api").expect("scope");

        let body = serde_json::to_value(UpsertSecretBody::new(&scope, &payload)).unwrap();
        let sealed = BASE64
            .decode(body["encrypted_value"].as_str().unwrap())
            .unwrap();
        assert_eq!(secret.unseal(&sealed).unwrap(), b"v1");
        assert_eq!(body["key_id"], KEY_ID);
    }

    #[tokio::test]
    async fn fetches_repository_public_key() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/repos/acme/api/actions/secrets/public-key")
            .match_header("authorization", "Bearer test-token")
            .match_header("accept", "application/vnd.github+json")
            .match_header("x-github-api-version", API_VERSION)
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(key_body(&[5u8; 32]))
            .create_async()
            .await;

        let key = client(&server)
            .fetch(&Scope::repository("acme", "api").expect("scope"))
            .await
            .expect("fetch");

        assert_eq!(key.key(), &[5u8; 32]);
        assert_eq!(key.key_id(), KEY_ID);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn maps_key_fetch_statuses() {
        let scope = Scope::organization("acme", None).expect("scope");
        let cases = [
            (401, r#"{"message":"Bad credentials"}"#),
            (403, r#"{"message":"Resource not accessible by integration"}"#),
            (404, r#"{"message":"Not Found"}"#),
            (500, "oops"),
        ];

        for (status, body) in cases {
            let mut server = Server::new_async().await;
            server
                .mock("GET", "/orgs/acme/actions/secrets/public-key")
                .with_status(status)
                .with_body(body)
                .create_async()
                .await;

            let err = client(&server).fetch(&scope).await.expect_err("should fail");
            match status {
                401 => assert_eq!(
                    err,
                    KeyFetchError::Authorization {
                        scope: "organization acme".into(),
                        message: "Bad credentials".into()
                    }
                ),
                403 => assert!(matches!(err, KeyFetchError::Authorization { .. })),
                404 => assert!(matches!(err, KeyFetchError::NotFound { .. })),
                _ => assert!(
                    matches!(&err, KeyFetchError::Transport { reason } if reason.contains("oops"))
                ),
            }
        }
    }

    #[tokio::test]
    async fn short_key_is_invalid_material() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/repos/acme/api/actions/secrets/public-key")
            .with_status(200)
            .with_body(key_body(&[5u8; 31]))
            .create_async()
            .await;

        let err = client(&server)
            .fetch(&Scope::repository("acme", "api").expect("scope"))
            .await
            .expect_err("should reject");
        assert!(matches!(err, KeyFetchError::InvalidKeyMaterial { .. }));
    }

    #[tokio::test]
    async fn unreachable_host_is_transport_error() {
        let cfg = GitHubConfig {
            token: "t".into(),
            api_base: Some("http://127.0.0.1:1".into()),
            timeout_secs: Some(2),
        };
        let client = GitHubClient::new(&cfg).expect("client");
        let scope = Scope::repository("acme", "api").expect("scope");

        let err = client.fetch(&scope).await.expect_err("should fail");
        assert!(matches!(err, KeyFetchError::Transport { .. }));

        let outcome = client.upsert(&scope, "A", &payload()).await;
        assert!(matches!(
            outcome,
            UpsertOutcome::Failed { reason } if reason.starts_with("transport error")
        ));
    }

    #[tokio::test]
    async fn stalled_server_times_out_as_transport_error() {
        // Accepts connections and never writes a response.
        let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind");
        let addr = listener.local_addr().expect("addr");
        std::thread::spawn(move || {
            let mut held = Vec::new();
            for stream in listener.incoming().flatten() {
                held.push(stream);
            }
        });

        let cfg = GitHubConfig {
            token: "t".into(),
            api_base: Some(format!("http://{addr}")),
            timeout_secs: Some(1),
        };
        let client = GitHubClient::new(&cfg).expect("client");
        let scope = Scope::repository("acme", "api").expect("scope");

        let err = client.fetch(&scope).await.expect_err("should time out");
        assert!(
            matches!(&err, KeyFetchError::Transport { reason } if reason.contains("timed out")),
            "{err:?}"
        );

        let outcome = client.upsert(&scope, "A", &payload()).await;
        assert!(
            matches!(&outcome, UpsertOutcome::Failed { reason } if reason.contains("timed out")),
            "{outcome:?}"
        );
    }

    #[tokio::test]
    async fn truncated_error_body_is_transport_error() {
        use std::io::{Read, Write};

        let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind");
        let addr = listener.local_addr().expect("addr");
        std::thread::spawn(move || {
            if let Ok((mut stream, _)) = listener.accept() {
                let mut buf = [0u8; 4096];
                let _ = stream.read(&mut buf);
                // Promise more bytes than are sent, then hang up.
                let _ = stream.write_all(
                    b"HTTP/1.1 404 Not Found\r\ncontent-length: 100\r\n\r\npartial",
                );
            }
        });

        let cfg = GitHubConfig {
            token: "t".into(),
            api_base: Some(format!("http://{addr}")),
            timeout_secs: Some(5),
        };
        let client = GitHubClient::new(&cfg).expect("client");
        let err = client
            .fetch(&Scope::repository("acme", "api").expect("scope"))
            .await
            .expect_err("should fail");
        assert!(matches!(err, KeyFetchError::Transport { .. }), "{err:?}");
    }

    #[tokio::test]
    async fn empty_rejection_body_reports_status_line() {
        let mut server = Server::new_async().await;
        server
            .mock("PUT", "/repos/acme/api/actions/secrets/GONE")
            .with_status(404)
            .create_async()
            .await;

        let scope = Scope::repository("acme", "api").expect("scope");
        let outcome = client(&server).upsert(&scope, "GONE", &payload()).await;
        assert_eq!(
            outcome,
            UpsertOutcome::Failed {
                reason: "404 Not Found".into()
            }
        );
    }

    #[tokio::test]
    async fn upsert_maps_statuses() {
        let mut server = Server::new_async().await;
        let scope = Scope::repository("acme", "api").expect("scope");
        server
            .mock("PUT", "/repos/acme/api/actions/secrets/NEW")
            .match_body(Matcher::PartialJson(json!({ "key_id": KEY_ID })))
            .with_status(201)
            .with_body("{}")
            .create_async()
            .await;
        server
            .mock("PUT", "/repos/acme/api/actions/secrets/OLD")
            .with_status(204)
            .create_async()
            .await;
        let rejection = r#"{"message":"Invalid request.","status":"422"}"#;
        server
            .mock("PUT", "/repos/acme/api/actions/secrets/BAD")
            .with_status(422)
            .with_body(rejection)
            .create_async()
            .await;

        let client = client(&server);
        assert_eq!(
            client.upsert(&scope, "NEW", &payload()).await,
            UpsertOutcome::Created
        );
        assert_eq!(
            client.upsert(&scope, "OLD", &payload()).await,
            UpsertOutcome::Updated
        );
        assert_eq!(
            client.upsert(&scope, "BAD", &payload()).await,
            UpsertOutcome::Failed {
                reason: rejection.into()
            }
        );
    }

    #[tokio::test]
    async fn organization_upsert_sends_visibility() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("PUT", "/orgs/acme/actions/secrets/TOKEN")
            .match_body(Matcher::PartialJson(
                json!({ "key_id": KEY_ID, "visibility": "private" }),
            ))
            .with_status(201)
            .create_async()
            .await;

        let scope = Scope::organization("acme", Some(Visibility::Private)).expect("scope");
        let outcome = client(&server).upsert(&scope, "TOKEN", &payload()).await;

        assert_eq!(outcome, UpsertOutcome::Created);
        mock.assert_async().await;
    }

    fn records(pairs: &[(&str, &str)]) -> Vec<Result<SecretRecord, ghsm_core::model::MalformedRecord>> {
        pairs
            .iter()
            .map(|(n, v)| Ok(SecretRecord::new(*n, *v).unwrap()))
            .collect()
    }

    #[tokio::test]
    async fn batch_creates_and_updates() {
        let mut server = Server::new_async().await;
        let secret = SecretKey::generate(&mut OsRng);
        let key_mock = server
            .mock("GET", "/repos/acme/api/actions/secrets/public-key")
            .with_status(200)
            .with_body(key_body(secret.public_key().as_bytes()))
            .expect(1)
            .create_async()
            .await;
        server
            .mock("PUT", "/repos/acme/api/actions/secrets/A")
            .match_body(Matcher::PartialJson(json!({ "key_id": KEY_ID })))
            .with_status(201)
            .create_async()
            .await;
        server
            .mock("PUT", "/repos/acme/api/actions/secrets/B")
            .match_body(Matcher::PartialJson(json!({ "key_id": KEY_ID })))
            .with_status(204)
            .create_async()
            .await;

        let client = client(&server);
        let runner = BatchRunner::new(client.clone(), SealedBoxEncryptor, client);
        let outcomes = runner
            .run(
                &Scope::repository("acme", "api").expect("scope"),
                records(&[("A", "v1"), ("B", "v2")]),
            )
            .await
            .expect("batch");

        assert_eq!(
            outcomes,
            vec![
                RecordOutcome {
                    name: "A".into(),
                    outcome: UpsertOutcome::Created
                },
                RecordOutcome {
                    name: "B".into(),
                    outcome: UpsertOutcome::Updated
                },
            ]
        );
        key_mock.assert_async().await;
    }

    #[tokio::test]
    async fn batch_isolates_server_error() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/orgs/acme/actions/secrets/public-key")
            .with_status(200)
            .with_body(key_body(&[3u8; 32]))
            .create_async()
            .await;
        for name in ["A", "C"] {
            server
                .mock("PUT", format!("/orgs/acme/actions/secrets/{name}").as_str())
                .with_status(201)
                .create_async()
                .await;
        }
        server
            .mock("PUT", "/orgs/acme/actions/secrets/B")
            .with_status(500)
            .with_body("internal error")
            .create_async()
            .await;

        let client = client(&server);
        let runner = BatchRunner::new(client.clone(), SealedBoxEncryptor, client);
        let outcomes = runner
            .run(
                &Scope::organization("acme", Some(Visibility::Private)).expect("scope"),
                records(&[("A", "1"), ("B", "2"), ("C", "3")]),
            )
            .await
            .expect("batch");

        let statuses: Vec<_> = outcomes.iter().map(|o| o.outcome.clone()).collect();
        assert_eq!(
            statuses,
            vec![
                UpsertOutcome::Created,
                UpsertOutcome::Failed {
                    reason: "internal error".into()
                },
                UpsertOutcome::Created,
            ]
        );
    }

    #[tokio::test]
    async fn batch_aborts_on_unauthorized_key_fetch() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/repos/acme/api/actions/secrets/public-key")
            .with_status(401)
            .with_body(r#"{"message":"Bad credentials"}"#)
            .create_async()
            .await;
        let put = server
            .mock("PUT", Matcher::Any)
            .expect(0)
            .create_async()
            .await;

        let client = client(&server);
        let runner = BatchRunner::new(client.clone(), SealedBoxEncryptor, client);
        let err = runner
            .run(&Scope::repository("acme", "api").expect("scope"), records(&[("A", "v1")]))
            .await
            .expect_err("should abort");

        assert!(matches!(
            err,
            BatchError::KeyFetch(KeyFetchError::Authorization { .. })
        ));
        put.assert_async().await;
    }
}
