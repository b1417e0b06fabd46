//! Run history storage

use crate::{CodecError, Payload, PayloadCodec, RunId, SagaContext, SagaEvent};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

/// Journal storage trait
pub trait HistoryJournal: Send + Sync + 'static {
    /// Append an event to a run's history, returning its sequence number
    fn append(&self, run_id: &RunId, event: SagaEvent) -> Result<u64, JournalError>;
    /// Read a run's history in append order
    fn read(&self, run_id: &RunId) -> Result<Vec<JournalEntry>, JournalError>;
    /// IDs of every run with history
    fn list_runs(&self) -> Result<Vec<RunId>, JournalError>;
}

/// One recorded event
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct JournalEntry {
    /// Journal-wide sequence number
    pub sequence: u64,
    /// When the event was appended (millis since UNIX epoch)
    pub recorded_at_millis: u64,
    /// Event
    pub event: SagaEvent,
}

/// Error from the history journal
#[derive(Debug, thiserror::Error)]
pub enum JournalError {
    /// Backend failure
    #[error("Storage error: {0}")]
    Storage(Box<str>),
    /// No history for this run
    #[error("Not found: {0}")]
    NotFound(RunId),
    /// Stored payload could not be encoded or decoded
    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),
}

struct StoredEntry {
    sequence: u64,
    recorded_at_millis: u64,
    payload: Payload,
}

/// In-memory journal.
///
/// Events are stored as payloads; with a codec attached every stored payload
/// passes through it, so an encrypting codec keeps the history encrypted at
/// rest.
pub struct InMemoryJournal {
    data: RwLock<HashMap<RunId, Vec<StoredEntry>>>,
    counter: AtomicU64,
    codec: Option<Arc<dyn PayloadCodec>>,
}

impl InMemoryJournal {
    /// Create an empty journal storing plain JSON payloads
    pub fn new() -> Self {
        Self {
            data: RwLock::new(HashMap::new()),
            counter: AtomicU64::new(1),
            codec: None,
        }
    }

    /// Pass every stored payload through `codec`
    pub fn with_codec(mut self, codec: Arc<dyn PayloadCodec>) -> Self {
        self.codec = Some(codec);
        self
    }

    /// Payloads exactly as stored for a run
    pub fn stored_payloads(&self, run_id: &RunId) -> Result<Vec<Payload>, JournalError> {
        let data = self.data.read().map_err(|e| JournalError::Storage(e.to_string().into()))?;
        Ok(data
            .get(run_id)
            .map(|entries| entries.iter().map(|e| e.payload.clone()).collect())
            .unwrap_or_default())
    }

    fn encode(&self, event: &SagaEvent) -> Result<Payload, JournalError> {
        let payload = Payload::json(event)?;
        match &self.codec {
            Some(codec) => codec
                .encode(std::slice::from_ref(&payload))?
                .pop()
                .ok_or_else(|| JournalError::Storage("codec returned no payload".into())),
            None => Ok(payload),
        }
    }

    fn decode(&self, stored: &[StoredEntry]) -> Result<Vec<JournalEntry>, JournalError> {
        let payloads: Vec<Payload> = stored.iter().map(|e| e.payload.clone()).collect();
        let payloads = match &self.codec {
            Some(codec) => codec.decode(&payloads)?,
            None => payloads,
        };

        stored
            .iter()
            .zip(payloads)
            .map(|(entry, payload)| {
                Ok(JournalEntry {
                    sequence: entry.sequence,
                    recorded_at_millis: entry.recorded_at_millis,
                    event: payload.to_value()?,
                })
            })
            .collect()
    }
}

impl HistoryJournal for InMemoryJournal {
    fn append(&self, run_id: &RunId, event: SagaEvent) -> Result<u64, JournalError> {
        let payload = self.encode(&event)?;
        let seq = self.counter.fetch_add(1, Ordering::Relaxed);
        let entry = StoredEntry {
            sequence: seq,
            recorded_at_millis: SagaContext::now_millis(),
            payload,
        };

        let mut data = self.data.write().map_err(|e| JournalError::Storage(e.to_string().into()))?;
        data.entry(run_id.clone()).or_default().push(entry);

        tracing::trace!(run_id = %run_id, sequence = seq, event = event.event_type(), "History event appended");
        Ok(seq)
    }

    fn read(&self, run_id: &RunId) -> Result<Vec<JournalEntry>, JournalError> {
        let data = self.data.read().map_err(|e| JournalError::Storage(e.to_string().into()))?;
        match data.get(run_id) {
            Some(stored) => self.decode(stored),
            None => Err(JournalError::NotFound(run_id.clone())),
        }
    }

    fn list_runs(&self) -> Result<Vec<RunId>, JournalError> {
        let data = self.data.read().map_err(|e| JournalError::Storage(e.to_string().into()))?;
        let mut runs: Vec<RunId> = data.keys().cloned().collect();
        runs.sort();
        Ok(runs)
    }
}

impl Default for InMemoryJournal {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{EncryptionCodec, DEFAULT_KEY, DEFAULT_KEY_ID};

    #[test]
    fn test_append_and_read_in_order() {
        let journal = InMemoryJournal::new();
        let run = RunId::from("run-1");

        let first = journal.append(&run, SagaEvent::ApprovalReceived).unwrap();
        let second = journal.append(&run, SagaEvent::SagaCancelled).unwrap();
        assert!(second > first);

        let entries = journal.read(&run).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].event, SagaEvent::ApprovalReceived);
        assert_eq!(entries[1].event, SagaEvent::SagaCancelled);
        assert_eq!(journal.list_runs().unwrap(), vec![run]);
    }

    #[test]
    fn test_missing_run_is_not_found() {
        let journal = InMemoryJournal::new();
        assert!(matches!(
            journal.read(&RunId::from("nope")),
            Err(JournalError::NotFound(_))
        ));
    }

    #[test]
    fn test_codec_encrypts_history_at_rest() {
        let codec = Arc::new(EncryptionCodec::new(DEFAULT_KEY_ID, DEFAULT_KEY).unwrap());
        let journal = InMemoryJournal::new().with_codec(codec);
        let run = RunId::from("run-2");

        journal
            .append(&run, SagaEvent::SagaFailed { reason: "Simulated bug - fix me!".into(), recoverable: true })
            .unwrap();

        let stored = journal.stored_payloads(&run).unwrap();
        assert!(stored[0].is_encrypted());
        assert!(!String::from_utf8_lossy(&stored[0].data).contains("Simulated bug"));

        let entries = journal.read(&run).unwrap();
        assert!(matches!(entries[0].event, SagaEvent::SagaFailed { recoverable: true, .. }));
    }
}
