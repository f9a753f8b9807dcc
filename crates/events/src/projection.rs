use crate::{Event, EventEnvelope};

/// A projection builds a read model from an append-only event stream.
///
/// Projections transform events (write model) into queryable state (read
/// model). Read models are **disposable**: they can be deleted and rebuilt
/// from events at any time, because events are the source of truth.
///
/// Projections must be **idempotent**: applying the same event twice should
/// produce the same result (or be a no-op). The bus delivers at-least-once,
/// and rebuilds replay the full history. `ProjectionRunner` helps by tracking
/// sequence numbers and rejecting regressions, but projections should still be
/// idempotent at the domain level.
///
/// Storage is an infrastructure concern; this trait makes no persistence
/// assumptions.
pub trait Projection {
    type Ev: Event;

    /// Apply a single event to the projection, updating the read model.
    ///
    /// No error return: irrelevant events are ignored, recoverable problems
    /// are logged by the caller. For structured progress tracking use
    /// `ProjectionRunner::apply()`.
    fn apply(&mut self, envelope: &EventEnvelope<Self::Ev>);
}
