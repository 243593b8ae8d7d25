//! Trace types.
use serde::{Deserialize, Serialize};

use crate::{Attributes, Resource, Scope};

/// A 16-byte trace identifier.
pub type TraceId = [u8; 16];

/// An 8-byte span identifier.
pub type SpanId = [u8; 8];

/// A batch of traces.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
pub struct Traces {
    /// Spans, grouped by resource.
    pub resource_spans: Vec<ResourceSpans>,
}

impl Traces {
    /// Returns the total number of spans across all resources and scopes.
    pub fn span_count(&self) -> usize {
        self.resource_spans
            .iter()
            .flat_map(|rs| rs.scope_spans.iter())
            .map(|ss| ss.spans.len())
            .sum()
    }

    /// Returns `true` if there are no spans.
    pub fn is_empty(&self) -> bool {
        self.span_count() == 0
    }
}

/// Spans produced by a single resource.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
pub struct ResourceSpans {
    /// The resource.
    pub resource: Resource,

    /// Schema URL of the resource.
    pub schema_url: String,

    /// Spans, grouped by scope.
    pub scope_spans: Vec<ScopeSpans>,
}

/// Spans produced by a single instrumentation scope.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
pub struct ScopeSpans {
    /// The scope.
    pub scope: Scope,

    /// Schema URL of the scope.
    pub schema_url: String,

    /// Spans.
    pub spans: Vec<Span>,
}

/// Span kind.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq, Deserialize, Serialize)]
#[repr(i32)]
pub enum SpanKind {
    /// Unspecified.
    #[default]
    Unspecified = 0,

    /// Internal operation.
    Internal = 1,

    /// Server-side handling of a request.
    Server = 2,

    /// Client-side request.
    Client = 3,

    /// Message producer.
    Producer = 4,

    /// Message consumer.
    Consumer = 5,
}

impl SpanKind {
    /// Returns the numeric value of this kind.
    pub const fn as_i32(self) -> i32 {
        self as i32
    }

    /// Creates a `SpanKind` from its numeric value.
    ///
    /// Unknown values map to `Unspecified`.
    pub const fn from_i32(value: i32) -> Self {
        match value {
            1 => Self::Internal,
            2 => Self::Server,
            3 => Self::Client,
            4 => Self::Producer,
            5 => Self::Consumer,
            _ => Self::Unspecified,
        }
    }
}

/// Span status code.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq, Deserialize, Serialize)]
#[repr(i32)]
pub enum StatusCode {
    /// Unset.
    #[default]
    Unset = 0,

    /// Ok.
    Ok = 1,

    /// Error.
    Error = 2,
}

impl StatusCode {
    /// Returns the numeric value of this status code.
    pub const fn as_i32(self) -> i32 {
        self as i32
    }

    /// Creates a `StatusCode` from its numeric value.
    ///
    /// Unknown values map to `Unset`.
    pub const fn from_i32(value: i32) -> Self {
        match value {
            1 => Self::Ok,
            2 => Self::Error,
            _ => Self::Unset,
        }
    }
}

/// Span status.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
pub struct Status {
    /// Status code.
    pub code: StatusCode,

    /// Status message.
    pub message: String,
}

/// A span.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
pub struct Span {
    /// Trace identifier.
    pub trace_id: TraceId,

    /// Span identifier.
    pub span_id: SpanId,

    /// W3C trace state.
    pub trace_state: String,

    /// Identifier of the parent span, if any.
    pub parent_span_id: Option<SpanId>,

    /// Trace flags.
    pub flags: u32,

    /// Span name.
    pub name: String,

    /// Span kind.
    pub kind: SpanKind,

    /// Start time, in nanoseconds since the Unix epoch.
    pub start_time_unix_nano: u64,

    /// End time, in nanoseconds since the Unix epoch.
    pub end_time_unix_nano: u64,

    /// Span attributes.
    pub attributes: Attributes,

    /// Number of attributes that were discarded.
    pub dropped_attributes_count: u32,

    /// Span events.
    pub events: Vec<Event>,

    /// Number of events that were discarded.
    pub dropped_events_count: u32,

    /// Span links.
    pub links: Vec<Link>,

    /// Number of links that were discarded.
    pub dropped_links_count: u32,

    /// Span status.
    pub status: Status,
}

impl Span {
    /// Returns `true` if the span has any related data (attributes, events, or links).
    pub fn has_related_data(&self) -> bool {
        !self.attributes.is_empty() || !self.events.is_empty() || !self.links.is_empty()
    }
}

/// A timestamped event attached to a span.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
pub struct Event {
    /// Time of the event, in nanoseconds since the Unix epoch.
    pub time_unix_nano: u64,

    /// Event name.
    pub name: String,

    /// Event attributes.
    pub attributes: Attributes,

    /// Number of attributes that were discarded.
    pub dropped_attributes_count: u32,
}

/// A link from a span to another span.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
pub struct Link {
    /// Trace identifier of the linked span.
    pub trace_id: TraceId,

    /// Span identifier of the linked span.
    pub span_id: SpanId,

    /// W3C trace state of the linked span.
    pub trace_state: String,

    /// Trace flags.
    pub flags: u32,

    /// Link attributes.
    pub attributes: Attributes,

    /// Number of attributes that were discarded.
    pub dropped_attributes_count: u32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::KeyValue;

    #[test]
    fn span_count_spans_all_groups() {
        let traces = Traces {
            resource_spans: vec![
                ResourceSpans {
                    scope_spans: vec![
                        ScopeSpans {
                            spans: vec![Span::default(), Span::default()],
                            ..Default::default()
                        },
                        ScopeSpans {
                            spans: vec![Span::default()],
                            ..Default::default()
                        },
                    ],
                    ..Default::default()
                },
                ResourceSpans::default(),
            ],
        };

        assert_eq!(traces.span_count(), 3);
        assert!(!traces.is_empty());
        assert!(Traces::default().is_empty());
    }

    #[test]
    fn related_data_detection() {
        let mut span = Span::default();
        assert!(!span.has_related_data());

        span.links.push(Link::default());
        assert!(span.has_related_data());

        let span = Span {
            attributes: vec![KeyValue::new("k", "v")],
            ..Default::default()
        };
        assert!(span.has_related_data());
    }

    #[test]
    fn kind_and_status_codes() {
        for kind in [
            SpanKind::Unspecified,
            SpanKind::Internal,
            SpanKind::Server,
            SpanKind::Client,
            SpanKind::Producer,
            SpanKind::Consumer,
        ] {
            assert_eq!(SpanKind::from_i32(kind.as_i32()), kind);
        }
        assert_eq!(SpanKind::from_i32(42), SpanKind::Unspecified);
        assert_eq!(StatusCode::from_i32(2), StatusCode::Error);
        assert_eq!(StatusCode::from_i32(-1), StatusCode::Unset);
    }
}
