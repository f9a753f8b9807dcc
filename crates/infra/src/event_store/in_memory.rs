use std::collections::HashMap;
use std::sync::RwLock;

use pharmaflow_core::{AggregateId, ExpectedVersion};

use super::store_trait::{EventStore, EventStoreError, StoredEvent, StreamAppend, UncommittedEvent};

/// In-memory append-only event store.
///
/// Intended for tests/dev. A single `RwLock` over all streams makes
/// `append_batch` trivially atomic: expected versions for every stream are
/// validated under the write lock before any stream is mutated.
#[derive(Debug, Default)]
pub struct InMemoryEventStore {
    streams: RwLock<HashMap<AggregateId, Vec<StoredEvent>>>,
}

impl InMemoryEventStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn current_version(stream: &[StoredEvent]) -> u64 {
        stream.last().map(|e| e.sequence_number).unwrap_or(0)
    }

    /// Validate one stream append against the current state. Returns the
    /// stream key so commit can proceed without re-deriving it.
    fn validate_append(
        streams: &HashMap<AggregateId, Vec<StoredEvent>>,
        append: &StreamAppend,
    ) -> Result<AggregateId, EventStoreError> {
        if append.events.is_empty() {
            return Err(EventStoreError::InvalidAppend(
                "stream append contains no events".to_string(),
            ));
        }

        // All events must target the same aggregate stream.
        let aggregate_id = append.events[0].aggregate_id;
        let aggregate_type = append.events[0].aggregate_type.clone();
        for (idx, e) in append.events.iter().enumerate() {
            if e.aggregate_id != aggregate_id {
                return Err(EventStoreError::InvalidAppend(format!(
                    "batch contains multiple aggregate_ids (index {idx})"
                )));
            }
            if e.aggregate_type != aggregate_type {
                return Err(EventStoreError::AggregateTypeMismatch(format!(
                    "batch contains multiple aggregate_types (index {idx})"
                )));
            }
        }

        let stream = streams.get(&aggregate_id).map(Vec::as_slice).unwrap_or(&[]);
        let current = Self::current_version(stream);
        if !append.expected_version.matches(current) {
            return Err(EventStoreError::Concurrency(format!(
                "expected {:?}, found {current}",
                append.expected_version
            )));
        }

        // Enforce aggregate type stability across the stream.
        if let Some(existing) = stream.first() {
            if existing.aggregate_type != aggregate_type {
                return Err(EventStoreError::AggregateTypeMismatch(format!(
                    "stream aggregate_type is '{}', attempted append with '{}'",
                    existing.aggregate_type, aggregate_type
                )));
            }
        }

        Ok(aggregate_id)
    }

    fn commit(
        streams: &mut HashMap<AggregateId, Vec<StoredEvent>>,
        aggregate_id: AggregateId,
        events: Vec<UncommittedEvent>,
        committed: &mut Vec<StoredEvent>,
    ) {
        let stream = streams.entry(aggregate_id).or_default();
        let mut next = Self::current_version(stream) + 1;
        for e in events {
            let stored = StoredEvent {
                event_id: e.event_id,
                aggregate_id: e.aggregate_id,
                aggregate_type: e.aggregate_type,
                sequence_number: next,
                event_type: e.event_type,
                event_version: e.event_version,
                occurred_at: e.occurred_at,
                payload: e.payload,
            };
            next += 1;
            stream.push(stored.clone());
            committed.push(stored);
        }
    }
}

impl EventStore for InMemoryEventStore {
    fn append(
        &self,
        events: Vec<UncommittedEvent>,
        expected_version: ExpectedVersion,
    ) -> Result<Vec<StoredEvent>, EventStoreError> {
        if events.is_empty() {
            return Ok(vec![]);
        }
        self.append_batch(vec![StreamAppend {
            expected_version,
            events,
        }])
    }

    fn append_batch(
        &self,
        appends: Vec<StreamAppend>,
    ) -> Result<Vec<StoredEvent>, EventStoreError> {
        let appends: Vec<StreamAppend> = appends
            .into_iter()
            .filter(|a| !a.events.is_empty())
            .collect();
        if appends.is_empty() {
            return Ok(vec![]);
        }

        let mut streams = self
            .streams
            .write()
            .map_err(|_| EventStoreError::InvalidAppend("lock poisoned".to_string()))?;

        // Two streams in one batch must be distinct; duplicate keys would
        // make the expected versions ambiguous.
        let mut keys = Vec::with_capacity(appends.len());
        for append in &appends {
            let key = Self::validate_append(&streams, append)?;
            if keys.contains(&key) {
                return Err(EventStoreError::InvalidAppend(format!(
                    "batch targets stream {key} more than once"
                )));
            }
            keys.push(key);
        }

        // All checks passed; nothing has been mutated yet. Commit everything.
        let mut committed = Vec::new();
        for (key, append) in keys.into_iter().zip(appends) {
            Self::commit(&mut streams, key, append.events, &mut committed);
        }

        Ok(committed)
    }

    fn load_stream(&self, aggregate_id: AggregateId) -> Result<Vec<StoredEvent>, EventStoreError> {
        let streams = self
            .streams
            .read()
            .map_err(|_| EventStoreError::InvalidAppend("lock poisoned".to_string()))?;

        Ok(streams.get(&aggregate_id).cloned().unwrap_or_default())
    }

    fn load_all(&self) -> Result<Vec<StoredEvent>, EventStoreError> {
        let streams = self
            .streams
            .read()
            .map_err(|_| EventStoreError::InvalidAppend("lock poisoned".to_string()))?;

        let mut all: Vec<StoredEvent> = streams.values().flatten().cloned().collect();
        all.sort_by(|a, b| {
            (a.aggregate_id.as_uuid(), a.sequence_number)
                .cmp(&(b.aggregate_id.as_uuid(), b.sequence_number))
        });
        Ok(all)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::json;
    use uuid::Uuid;

    fn event(aggregate_id: AggregateId, marker: u32) -> UncommittedEvent {
        UncommittedEvent {
            event_id: Uuid::now_v7(),
            aggregate_id,
            aggregate_type: "test.stream".to_string(),
            event_type: "test.happened".to_string(),
            event_version: 1,
            occurred_at: Utc::now(),
            payload: json!({ "marker": marker }),
        }
    }

    #[test]
    fn append_assigns_gapless_sequence_numbers() {
        let store = InMemoryEventStore::new();
        let id = AggregateId::new();

        let first = store
            .append(vec![event(id, 1), event(id, 2)], ExpectedVersion::Exact(0))
            .unwrap();
        let second = store
            .append(vec![event(id, 3)], ExpectedVersion::Exact(2))
            .unwrap();

        let seqs: Vec<u64> = first
            .iter()
            .chain(second.iter())
            .map(|e| e.sequence_number)
            .collect();
        assert_eq!(seqs, vec![1, 2, 3]);
    }

    #[test]
    fn stale_expected_version_rejected() {
        let store = InMemoryEventStore::new();
        let id = AggregateId::new();
        store
            .append(vec![event(id, 1)], ExpectedVersion::Exact(0))
            .unwrap();

        let err = store
            .append(vec![event(id, 2)], ExpectedVersion::Exact(0))
            .unwrap_err();
        assert!(matches!(err, EventStoreError::Concurrency(_)));
    }

    #[test]
    fn batch_is_all_or_nothing() {
        let store = InMemoryEventStore::new();
        let a = AggregateId::new();
        let b = AggregateId::new();
        store
            .append(vec![event(b, 1)], ExpectedVersion::Exact(0))
            .unwrap();

        // Stream b's expected version is stale; stream a must stay untouched.
        let err = store
            .append_batch(vec![
                StreamAppend {
                    expected_version: ExpectedVersion::Exact(0),
                    events: vec![event(a, 2)],
                },
                StreamAppend {
                    expected_version: ExpectedVersion::Exact(0),
                    events: vec![event(b, 3)],
                },
            ])
            .unwrap_err();
        assert!(matches!(err, EventStoreError::Concurrency(_)));

        assert!(store.load_stream(a).unwrap().is_empty());
        assert_eq!(store.load_stream(b).unwrap().len(), 1);
    }

    #[test]
    fn batch_commits_multiple_streams() {
        let store = InMemoryEventStore::new();
        let a = AggregateId::new();
        let b = AggregateId::new();

        let committed = store
            .append_batch(vec![
                StreamAppend {
                    expected_version: ExpectedVersion::Exact(0),
                    events: vec![event(a, 1)],
                },
                StreamAppend {
                    expected_version: ExpectedVersion::Exact(0),
                    events: vec![event(b, 2), event(b, 3)],
                },
            ])
            .unwrap();

        assert_eq!(committed.len(), 3);
        assert_eq!(store.load_stream(a).unwrap().len(), 1);
        assert_eq!(store.load_stream(b).unwrap().len(), 2);
    }

    #[test]
    fn duplicate_stream_in_batch_rejected() {
        let store = InMemoryEventStore::new();
        let a = AggregateId::new();

        let err = store
            .append_batch(vec![
                StreamAppend {
                    expected_version: ExpectedVersion::Exact(0),
                    events: vec![event(a, 1)],
                },
                StreamAppend {
                    expected_version: ExpectedVersion::Exact(0),
                    events: vec![event(a, 2)],
                },
            ])
            .unwrap_err();
        assert!(matches!(err, EventStoreError::InvalidAppend(_)));
        assert!(store.load_stream(a).unwrap().is_empty());
    }
}
