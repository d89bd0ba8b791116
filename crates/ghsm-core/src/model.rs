use std::fmt;

use serde::Serialize;
use zeroize::Zeroizing;

use crate::error::{InputError, SealError};

/// Length in bytes of a store public key.
pub const PUBLIC_KEY_LEN: usize = 32;

const RESERVED_PREFIX: &str = "GITHUB_";

/// Visibility of an organization secret.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Visibility {
    /// Every repository in the organization.
    All,
    /// Private and internal repositories only.
    Private,
    /// Only the listed repository ids.
    Selected { repository_ids: Vec<u64> },
}

impl Visibility {
    pub fn as_str(&self) -> &'static str {
        match self {
            Visibility::All => "all",
            Visibility::Private => "private",
            Visibility::Selected { .. } => "selected",
        }
    }

    pub fn selected_repository_ids(&self) -> Option<&[u64]> {
        match self {
            Visibility::Selected { repository_ids } => Some(repository_ids),
            _ => None,
        }
    }
}

impl Default for Visibility {
    fn default() -> Self {
        Visibility::Private
    }
}

/// Target of a secret write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Scope {
    Repository {
        owner: String,
        name: String,
    },
    Organization {
        name: String,
        visibility: Option<Visibility>,
    },
}

impl Scope {
    /// Repository scope. Both names are checked so they stay a single path
    /// segment each.
    pub fn repository(
        owner: impl Into<String>,
        name: impl Into<String>,
    ) -> Result<Self, InputError> {
        let owner = owner.into();
        let name = name.into();
        validate_account(&owner, "owner")?;
        validate_repository(&name)?;
        Ok(Scope::Repository { owner, name })
    }

    pub fn organization(
        name: impl Into<String>,
        visibility: Option<Visibility>,
    ) -> Result<Self, InputError> {
        let name = name.into();
        validate_account(&name, "organization")?;
        Ok(Scope::Organization { name, visibility })
    }

    /// API path prefix addressing this scope, e.g. `repos/acme/api` or `orgs/acme`.
    pub fn root_path(&self) -> String {
        match self {
            Scope::Repository { owner, name } => format!("repos/{owner}/{name}"),
            Scope::Organization { name, .. } => format!("orgs/{name}"),
        }
    }

    /// Visibility sent alongside an upsert; always `None` for repositories.
    pub fn visibility(&self) -> Option<&Visibility> {
        match self {
            Scope::Repository { .. } => None,
            Scope::Organization { visibility, .. } => visibility.as_ref(),
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scope::Repository { owner, name } => write!(f, "repository {owner}/{name}"),
            Scope::Organization { name, .. } => write!(f, "organization {name}"),
        }
    }
}

/// One plaintext secret read from input. The value is wiped from memory on drop.
pub struct SecretRecord {
    name: String,
    value: Zeroizing<String>,
}

impl SecretRecord {
    /// Build a record, rejecting names the store would refuse.
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Result<Self, InputError> {
        let name = name.into();
        validate_name(&name)?;
        Ok(Self {
            name,
            value: Zeroizing::new(value.into()),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn value(&self) -> &str {
        &self.value
    }
}

impl fmt::Debug for SecretRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecretRecord")
            .field("name", &self.name)
            .field("value", &"<redacted>")
            .finish()
    }
}

fn validate_name(name: &str) -> Result<(), InputError> {
    let invalid = |reason: &'static str| InputError::InvalidName {
        name: name.to_string(),
        reason,
    };

    let first = name.chars().next().ok_or_else(|| invalid("name is empty"))?;
    if !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(invalid(
            "only alphanumeric characters and underscores are allowed",
        ));
    }
    if first.is_ascii_digit() {
        return Err(invalid("name must not start with a number"));
    }
    if name.to_ascii_uppercase().starts_with(RESERVED_PREFIX) {
        return Err(invalid("the GITHUB_ prefix is reserved"));
    }
    Ok(())
}

fn invalid_scope(kind: &'static str, value: &str, reason: &'static str) -> InputError {
    InputError::InvalidScope {
        kind,
        value: value.to_string(),
        reason,
    }
}

// User and organization logins: ASCII alphanumerics and hyphens.
fn validate_account(value: &str, kind: &'static str) -> Result<(), InputError> {
    if value.is_empty() {
        return Err(invalid_scope(kind, value, "name is empty"));
    }
    if !value.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
        return Err(invalid_scope(
            kind,
            value,
            "only alphanumeric characters and hyphens are allowed",
        ));
    }
    Ok(())
}

fn validate_repository(value: &str) -> Result<(), InputError> {
    const KIND: &str = "repository";
    if value.is_empty() {
        return Err(invalid_scope(KIND, value, "name is empty"));
    }
    if value == "." || value == ".." {
        return Err(invalid_scope(KIND, value, "name is reserved"));
    }
    if !value
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
    {
        return Err(invalid_scope(
            KIND,
            value,
            "only alphanumeric characters, hyphens, underscores and dots are allowed",
        ));
    }
    Ok(())
}

/// Record that could not be turned into a [`SecretRecord`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MalformedRecord {
    /// Secret name when known, otherwise a positional label such as `row 4`.
    pub label: String,
    pub error: InputError,
}

/// A store's public key together with the identifier the store uses to find
/// the matching private key.
#[derive(Clone, PartialEq, Eq)]
pub struct PublicKeyMaterial {
    key: [u8; PUBLIC_KEY_LEN],
    key_id: String,
}

impl PublicKeyMaterial {
    pub fn new(key: &[u8], key_id: impl Into<String>) -> Result<Self, SealError> {
        let key: [u8; PUBLIC_KEY_LEN] = key
            .try_into()
            .map_err(|_| SealError::InvalidKeyMaterial { len: key.len() })?;
        Ok(Self {
            key,
            key_id: key_id.into(),
        })
    }

    pub fn key(&self) -> &[u8; PUBLIC_KEY_LEN] {
        &self.key
    }

    pub fn key_id(&self) -> &str {
        &self.key_id
    }
}

impl fmt::Debug for PublicKeyMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PublicKeyMaterial")
            .field("key_id", &self.key_id)
            .finish_non_exhaustive()
    }
}

/// Ciphertext bound to the id of the key it was sealed under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptedPayload {
    pub key_id: String,
    pub ciphertext: Vec<u8>,
}

/// Result of writing one secret.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum UpsertOutcome {
    Created,
    Updated,
    Failed { reason: String },
}

impl UpsertOutcome {
    pub fn is_success(&self) -> bool {
        !matches!(self, UpsertOutcome::Failed { .. })
    }
}

/// Outcome of one input record, in input order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecordOutcome {
    pub name: String,
    #[serde(flatten)]
    pub outcome: UpsertOutcome,
}
