//! Records emitted for off-chain observers.
//!
//! Every completed state change in the ledger, dispatch and subscription
//! components produces a [`MarketEvent`]. Events are handed to an injected
//! [`EventSink`]; the sink decides where they go.
//!
//! - [`TracingEventSink`] logs each event as structured JSON via `tracing`
//! - [`RecordingEventSink`] keeps an in-memory, sequenced log
//! - [`NoopEventSink`] discards everything

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::address::{Address, Endpoint};
use crate::amount::Amount;

/// Identifier of a dispatched query. Allocated from 1 upward, never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct QueryId(pub u64);

impl fmt::Display for QueryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "query-{}", self.0)
    }
}

/// A provider's answer to a query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "shape", content = "values", rename_all = "snake_case")]
pub enum QueryResponse {
    /// One string value.
    Single(String),
    /// Two string values.
    Pair(String, String),
    /// Any number of string values.
    Strings(Vec<String>),
    /// Any number of integer values.
    Ints(Vec<i128>),
}

/// Free-form subscription metadata (e.g. the subscriber's public key).
pub type Metadata = BTreeMap<String, String>;

/// A state change observable outside the marketplace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MarketEvent {
    /// Dots were bonded.
    Bound {
        /// Account credited with the dots.
        holder: Address,
        /// Account debited for the cost.
        payer: Address,
        /// Provider bonded to.
        provider: Address,
        /// Endpoint bonded to.
        endpoint: Endpoint,
        /// Dots credited.
        dots: u64,
        /// Tokens paid.
        cost: Amount,
    },
    /// Dots were redeemed for tokens.
    Unbound {
        /// Account the dots were taken from.
        holder: Address,
        /// Provider unbonded from.
        provider: Address,
        /// Endpoint unbonded from.
        endpoint: Endpoint,
        /// Dots redeemed.
        dots: u64,
        /// Tokens refunded.
        refund: Amount,
    },
    /// Dots moved from a holder's bound balance into escrow.
    Escrowed {
        /// Owner of the escrowed dots.
        holder: Address,
        /// Provider the dots are bonded to.
        provider: Address,
        /// Endpoint the dots are bonded to.
        endpoint: Endpoint,
        /// Dots escrowed.
        dots: u64,
    },
    /// Escrowed dots were settled to the provider.
    Released {
        /// Original owner of the dots.
        holder: Address,
        /// Provider credited.
        provider: Address,
        /// Endpoint the dots are bonded to.
        endpoint: Endpoint,
        /// Dots released.
        dots: u64,
    },
    /// Escrowed dots were settled back to their owner.
    Returned {
        /// Owner credited.
        holder: Address,
        /// Provider the dots are bonded to.
        provider: Address,
        /// Endpoint the dots are bonded to.
        endpoint: Endpoint,
        /// Dots returned.
        dots: u64,
    },
    /// A provider removed an unused curve.
    CurveCleared {
        /// Provider owning the endpoint.
        provider: Address,
        /// Endpoint whose curve was removed.
        endpoint: Endpoint,
    },
    /// A query is waiting for the provider.
    Incoming {
        /// Query identifier.
        id: QueryId,
        /// Provider asked.
        provider: Address,
        /// Requesting holder.
        requester: Address,
        /// Endpoint queried.
        endpoint: Endpoint,
        /// Query text.
        query: String,
        /// Endpoint parameters.
        params: Vec<String>,
    },
    /// A query was answered.
    Fulfilled {
        /// Query identifier.
        id: QueryId,
        /// The provider's answer.
        response: QueryResponse,
    },
    /// A query was withdrawn by its requester.
    Canceled {
        /// Query identifier.
        id: QueryId,
    },
    /// A subscription started.
    SubscriptionInitiated {
        /// Provider serving the subscription.
        provider: Address,
        /// Paying subscriber.
        subscriber: Address,
        /// Endpoint subscribed to.
        endpoint: Endpoint,
        /// Dots escrowed, one per block.
        total_dots: u64,
        /// Block the subscription started in.
        start_block: u64,
        /// Endpoint parameters.
        params: Vec<String>,
        /// Subscriber metadata.
        metadata: Metadata,
    },
    /// A subscriber forwarded new parameters to the provider.
    ParamsPassed {
        /// Provider receiving the parameters.
        provider: Address,
        /// Subscriber sending them.
        subscriber: Address,
        /// Endpoint subscribed to.
        endpoint: Endpoint,
        /// New parameters.
        params: Vec<String>,
    },
    /// A subscription was settled.
    SubscriptionEnded {
        /// Provider serving the subscription.
        provider: Address,
        /// Paying subscriber.
        subscriber: Address,
        /// Endpoint subscribed to.
        endpoint: Endpoint,
        /// Dots released to the provider.
        consumed: u64,
        /// Dots returned to the subscriber.
        unused: u64,
        /// Party that ended the subscription.
        ended_by: Address,
    },
}

impl MarketEvent {
    /// Short event name for logs.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Bound { .. } => "bound",
            Self::Unbound { .. } => "unbound",
            Self::Escrowed { .. } => "escrowed",
            Self::Released { .. } => "released",
            Self::Returned { .. } => "returned",
            Self::CurveCleared { .. } => "curve_cleared",
            Self::Incoming { .. } => "incoming",
            Self::Fulfilled { .. } => "fulfilled",
            Self::Canceled { .. } => "canceled",
            Self::SubscriptionInitiated { .. } => "subscription_initiated",
            Self::ParamsPassed { .. } => "params_passed",
            Self::SubscriptionEnded { .. } => "subscription_ended",
        }
    }

    /// Serialize this event to JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// An event with its position in the log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventRecord {
    /// Monotonic sequence number, starting at 1.
    pub sequence: u64,
    /// Wall-clock time the event was recorded.
    pub recorded_at: DateTime<Utc>,
    /// The event itself.
    pub event: MarketEvent,
}

/// Destination for emitted events.
pub trait EventSink: Send + Sync {
    /// Accept one event.
    fn emit(&self, event: MarketEvent);
}

/// Logs events through `tracing` under the `zap_events` target.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingEventSink;

impl EventSink for TracingEventSink {
    fn emit(&self, event: MarketEvent) {
        let kind = event.kind();
        let json = event.to_json().unwrap_or_else(|_| "{}".to_string());
        tracing::info!(target: "zap_events", %kind, event_json = %json, "market event");
    }
}

/// Discards every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopEventSink;

impl EventSink for NoopEventSink {
    fn emit(&self, _event: MarketEvent) {}
}

/// Keeps every event in memory, in emission order.
#[derive(Debug, Default)]
pub struct RecordingEventSink {
    records: Mutex<Vec<EventRecord>>,
}

impl RecordingEventSink {
    /// Create an empty recorder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of all records.
    #[must_use]
    pub fn records(&self) -> Vec<EventRecord> {
        self.records.lock().clone()
    }

    /// Snapshot of all events, without envelopes.
    #[must_use]
    pub fn events(&self) -> Vec<MarketEvent> {
        self.records.lock().iter().map(|r| r.event.clone()).collect()
    }

    /// The most recent event, if any.
    #[must_use]
    pub fn last(&self) -> Option<MarketEvent> {
        self.records.lock().last().map(|r| r.event.clone())
    }

    /// Number of recorded events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    /// Whether nothing has been recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }
}

impl EventSink for RecordingEventSink {
    fn emit(&self, event: MarketEvent) {
        let mut records = self.records.lock();
        let sequence = records.len() as u64 + 1;
        records.push(EventRecord {
            sequence,
            recorded_at: Utc::now(),
            event,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn canceled(id: u64) -> MarketEvent {
        MarketEvent::Canceled { id: QueryId(id) }
    }

    #[test]
    fn recording_sink_sequences_events() {
        let sink = RecordingEventSink::new();
        assert!(sink.is_empty());

        sink.emit(canceled(1));
        sink.emit(canceled(2));

        let records = sink.records();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].sequence, 1);
        assert_eq!(records[1].sequence, 2);
        assert_eq!(sink.last(), Some(canceled(2)));
    }

    #[test]
    fn noop_and_tracing_sinks_accept_events() {
        NoopEventSink.emit(canceled(1));
        TracingEventSink.emit(canceled(1));
    }

    #[test]
    fn event_json_is_tagged() {
        let event = MarketEvent::Fulfilled {
            id: QueryId(7),
            response: QueryResponse::Pair("a".into(), "b".into()),
        };
        let json = event.to_json().expect("serialize");
        assert!(json.contains(r#""type":"fulfilled""#));
        assert!(json.contains(r#""shape":"pair""#));
        let parsed: MarketEvent = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(parsed, event);
    }

    #[test]
    fn bound_event_carries_amount_as_string() {
        let event = MarketEvent::Bound {
            holder: Address::new("alice"),
            payer: Address::new("alice"),
            provider: Address::new("oracle"),
            endpoint: Endpoint::new("prices"),
            dots: 5,
            cost: Amount::from(110u64),
        };
        let json = event.to_json().expect("serialize");
        assert!(json.contains(r#""cost":"110""#));
        assert_eq!(event.kind(), "bound");
    }

    #[test]
    fn query_id_display() {
        assert_eq!(QueryId(42).to_string(), "query-42");
    }
}
