//! Sequential encrypt-then-upsert pipeline over a batch of secrets.
//!
//! The key is fetched once and reused for every record, so each ciphertext is
//! paired with the `key_id` it was sealed under. Records are processed strictly
//! in input order, one at a time. A failed write is recorded and the batch moves
//! on; earlier writes are never undone.

use tracing::{debug, info, instrument, warn};

use crate::{
    error::BatchError,
    model::{MalformedRecord, RecordOutcome, Scope, SecretRecord, UpsertOutcome},
    store::{Encryptor, KeyProvider, SecretUpserter},
};

/// Per-record lifecycle. Each record moves forward through these once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RecordState {
    Pending,
    Encrypting,
    Encrypted,
    Upserting,
}

/// Drives a [`KeyProvider`], an [`Encryptor`] and a [`SecretUpserter`] over a batch.
pub struct BatchRunner<K, E, U> {
    keys: K,
    encryptor: E,
    upserter: U,
}

impl<K, E, U> BatchRunner<K, E, U>
where
    K: KeyProvider,
    E: Encryptor,
    U: SecretUpserter,
{
    pub fn new(keys: K, encryptor: E, upserter: U) -> Self {
        Self {
            keys,
            encryptor,
            upserter,
        }
    }

    /// Seal and write every record into `scope`, returning one outcome per record
    /// reached, in input order.
    ///
    /// Fails without producing any outcome when the key cannot be fetched. A
    /// sealing failure stops the batch and carries the outcomes completed so far.
    /// Malformed records and rejected writes are reported as
    /// [`UpsertOutcome::Failed`] and never stop the batch.
    #[instrument(skip_all, fields(scope = %scope))]
    pub async fn run<I>(&self, scope: &Scope, records: I) -> Result<Vec<RecordOutcome>, BatchError>
    where
        I: IntoIterator<Item = Result<SecretRecord, MalformedRecord>>,
    {
        let key = self.keys.fetch(scope).await?;
        info!(key_id = key.key_id(), "fetched public key");

        let mut outcomes = Vec::new();
        for item in records {
            let record = match item {
                Ok(record) => record,
                Err(malformed) => {
                    warn!(record = %malformed.label, error = %malformed.error, "skipping malformed record");
                    outcomes.push(RecordOutcome {
                        name: malformed.label,
                        outcome: malformed.error.into(),
                    });
                    continue;
                }
            };

            let name = record.name();
            let mut state = RecordState::Pending;
            transition(name, &mut state, RecordState::Encrypting);
            let payload = match self.encryptor.seal(&key, record.value().as_bytes()) {
                Ok(payload) => payload,
                Err(source) => {
                    return Err(BatchError::Seal {
                        name: name.to_string(),
                        source,
                        completed: outcomes,
                    })
                }
            };
            transition(name, &mut state, RecordState::Encrypted);

            transition(name, &mut state, RecordState::Upserting);
            let outcome = self.upserter.upsert(scope, name, &payload).await;
            match &outcome {
                UpsertOutcome::Created => info!(secret = name, "created"),
                UpsertOutcome::Updated => info!(secret = name, "updated"),
                UpsertOutcome::Failed { reason } => warn!(secret = name, %reason, "upsert failed"),
            }

            outcomes.push(RecordOutcome {
                name: name.to_string(),
                outcome,
            });
        }

        Ok(outcomes)
    }
}

fn transition(name: &str, state: &mut RecordState, next: RecordState) {
    debug!(secret = name, from = ?*state, to = ?next, "record state");
    *state = next;
}

/// Created/updated/failed tallies for a finished batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct Summary {
    pub created: usize,
    pub updated: usize,
    pub failed: usize,
}

impl Summary {
    pub fn from_outcomes(outcomes: &[RecordOutcome]) -> Self {
        outcomes
            .iter()
            .fold(Summary::default(), |mut acc, item| {
                match item.outcome {
                    UpsertOutcome::Created => acc.created += 1,
                    UpsertOutcome::Updated => acc.updated += 1,
                    UpsertOutcome::Failed { .. } => acc.failed += 1,
                }
                acc
            })
    }

    pub fn total(&self) -> usize {
        self.created + self.updated + self.failed
    }
}
