use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use async_trait::async_trait;

use crate::{
    error::{KeyFetchError, SealError, UpsertError},
    model::{EncryptedPayload, PublicKeyMaterial, Scope, UpsertOutcome},
};

/// Source of a scope's current public key.
#[async_trait]
pub trait KeyProvider: Send + Sync {
    async fn fetch(&self, scope: &Scope) -> Result<PublicKeyMaterial, KeyFetchError>;
}

/// Seals plaintext under a public key, binding the result to the key's id.
pub trait Encryptor: Send + Sync {
    fn seal(
        &self,
        key: &PublicKeyMaterial,
        plaintext: &[u8],
    ) -> Result<EncryptedPayload, SealError>;
}

/// Writes one encrypted secret. Implementations make exactly one attempt and
/// report every failure through the returned outcome.
#[async_trait]
pub trait SecretUpserter: Send + Sync {
    async fn upsert(&self, scope: &Scope, name: &str, payload: &EncryptedPayload)
        -> UpsertOutcome;
}

/// Entry held by [`InMemorySecretStore`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredSecret {
    pub scope: Scope,
    pub payload: EncryptedPayload,
}

#[derive(Debug, Default)]
struct State {
    key: Option<PublicKeyMaterial>,
    key_error: Option<KeyFetchError>,
    key_fetches: usize,
    secrets: HashMap<String, StoredSecret>,
    rejections: HashMap<String, UpsertError>,
    upserts: Vec<String>,
}

/// In-memory store double implementing both store contracts, for tests and smoke runs.
/// Names are stored upper-cased, as the remote store does.
#[derive(Debug, Default, Clone)]
pub struct InMemorySecretStore {
    inner: Arc<Mutex<State>>,
}

impl InMemorySecretStore {
    pub fn new(key: PublicKeyMaterial) -> Self {
        let store = Self::default();
        store.with_state(|state| state.key = Some(key));
        store
    }

    /// Make every subsequent key fetch fail with `err`.
    pub fn fail_key_fetch(&self, err: KeyFetchError) {
        self.with_state(|state| state.key_error = Some(err));
    }

    /// Make upserts of `name` fail with `err`.
    pub fn reject(&self, name: &str, err: UpsertError) {
        self.with_state(|state| {
            state.rejections.insert(name.to_ascii_uppercase(), err);
        });
    }

    /// Pre-populate a secret so the next write of it is an update.
    pub fn seed(&self, scope: &Scope, name: &str, payload: EncryptedPayload) {
        self.with_state(|state| {
            state.secrets.insert(
                name.to_ascii_uppercase(),
                StoredSecret {
                    scope: scope.clone(),
                    payload,
                },
            );
        });
    }

    pub fn get(&self, name: &str) -> Option<StoredSecret> {
        self.with_state(|state| state.secrets.get(&name.to_ascii_uppercase()).cloned())
    }

    pub fn key_fetches(&self) -> usize {
        self.with_state(|state| state.key_fetches)
    }

    /// Names passed to `upsert`, in call order.
    pub fn upserts(&self) -> Vec<String> {
        self.with_state(|state| state.upserts.clone())
    }

    fn with_state<T>(&self, f: impl FnOnce(&mut State) -> T) -> T {
        let mut guard = match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        f(&mut guard)
    }
}

#[async_trait]
impl KeyProvider for InMemorySecretStore {
    async fn fetch(&self, scope: &Scope) -> Result<PublicKeyMaterial, KeyFetchError> {
        self.with_state(|state| {
            state.key_fetches += 1;
            if let Some(err) = &state.key_error {
                return Err(err.clone());
            }
            state.key.clone().ok_or_else(|| KeyFetchError::NotFound {
                scope: scope.to_string(),
            })
        })
    }
}

#[async_trait]
impl SecretUpserter for InMemorySecretStore {
    async fn upsert(
        &self,
        scope: &Scope,
        name: &str,
        payload: &EncryptedPayload,
    ) -> UpsertOutcome {
        self.with_state(|state| {
            let name = name.to_ascii_uppercase();
            state.upserts.push(name.clone());
            if let Some(err) = state.rejections.get(&name) {
                return err.clone().into();
            }
            let previous = state.secrets.insert(
                name,
                StoredSecret {
                    scope: scope.clone(),
                    payload: payload.clone(),
                },
            );
            match previous {
                Some(_) => UpsertOutcome::Updated,
                None => UpsertOutcome::Created,
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload(key_id: &str) -> EncryptedPayload {
        EncryptedPayload {
            key_id: key_id.into(),
            ciphertext: vec![1, 2, 3],
        }
    }

    #[tokio::test]
    async fn first_write_creates_second_updates() {
        let store = InMemorySecretStore::new(PublicKeyMaterial::new(&[1; 32], "kid").unwrap());
        let scope = Scope::repository("acme", "api").expect("scope");

        let first = store.upsert(&scope, "token", &payload("kid")).await;
        let second = store.upsert(&scope, "TOKEN", &payload("kid")).await;

        assert_eq!(first, UpsertOutcome::Created);
        assert_eq!(second, UpsertOutcome::Updated);
        assert_eq!(store.upserts(), vec!["TOKEN", "TOKEN"]);
        assert_eq!(store.get("token").unwrap().payload.key_id, "kid");
    }

    #[tokio::test]
    async fn rejected_names_report_failure_and_store_nothing() {
        let store = InMemorySecretStore::new(PublicKeyMaterial::new(&[1; 32], "kid").unwrap());
        let scope = Scope::organization("acme", None).expect("scope");
        store.reject(
            "BAD",
            UpsertError::Rejected {
                status: 422,
                body: "nope".into(),
            },
        );

        let outcome = store.upsert(&scope, "BAD", &payload("kid")).await;
        assert_eq!(
            outcome,
            UpsertOutcome::Failed {
                reason: "nope".into()
            }
        );
        assert!(store.get("BAD").is_none());
    }

    #[tokio::test]
    async fn key_fetch_failure_is_repeated() {
        let store = InMemorySecretStore::default();
        store.fail_key_fetch(KeyFetchError::Transport {
            reason: "timed out".into(),
        });
        let scope = Scope::repository("acme", "api").expect("scope");

        for _ in 0..2 {
            let err = store.fetch(&scope).await.expect_err("fetch should fail");
            assert!(matches!(err, KeyFetchError::Transport { .. }));
        }
        assert_eq!(store.key_fetches(), 2);
    }
}
