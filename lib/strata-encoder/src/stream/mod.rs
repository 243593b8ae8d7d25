//! Dictionary-delta streams.
//!
//! Every table is written to a stream: a sequence of self-describing messages that starts with the table's schema,
//! carries dictionaries and record batches, and ends with an end-of-stream marker. Streams are keyed by schema identity,
//! so a schema change for a table starts a new stream.
use std::fmt;

use bytes::Bytes;

mod consumer;
pub use self::consumer::{DecodedBatch, StreamConsumer};

mod producer;
pub use self::producer::StreamProducer;

pub mod wire;

mod writer;
pub use self::writer::StreamWriter;

/// Coarse category of a payload.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum PayloadCategory {
    /// The main table: spans or metrics.
    Main,

    /// An attribute table.
    Attrs,

    /// Span events.
    Events,

    /// Span links.
    Links,

    /// Metric data points.
    DataPoints,

    /// Data point exemplars.
    Exemplars,
}

/// Table carried by a payload.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum PayloadType {
    /// Spans.
    Spans,

    /// Metrics.
    Metrics,

    /// Resource attributes.
    ResourceAttrs,

    /// Scope attributes.
    ScopeAttrs,

    /// Span attributes.
    SpanAttrs,

    /// Span events.
    SpanEvents,

    /// Span event attributes.
    SpanEventAttrs,

    /// Span links.
    SpanLinks,

    /// Span link attributes.
    SpanLinkAttrs,

    /// Gauge and sum data points.
    NumberDataPoints,

    /// Gauge and sum data point attributes.
    NumberDpAttrs,

    /// Gauge and sum data point exemplars.
    NumberDpExemplars,

    /// Gauge and sum data point exemplar attributes.
    NumberDpExemplarAttrs,

    /// Histogram data points.
    HistogramDataPoints,

    /// Histogram data point attributes.
    HistogramDpAttrs,

    /// Histogram data point exemplars.
    HistogramDpExemplars,

    /// Histogram data point exemplar attributes.
    HistogramDpExemplarAttrs,

    /// Exponential histogram data points.
    ExpHistogramDataPoints,

    /// Exponential histogram data point attributes.
    ExpHistogramDpAttrs,

    /// Exponential histogram data point exemplars.
    ExpHistogramDpExemplars,

    /// Exponential histogram data point exemplar attributes.
    ExpHistogramDpExemplarAttrs,

    /// Summary data points.
    SummaryDataPoints,

    /// Summary data point attributes.
    SummaryDpAttrs,
}

impl PayloadType {
    /// Returns the name of the table carried by this payload type.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Spans => "spans",
            Self::Metrics => "metrics",
            Self::ResourceAttrs => "resource_attrs",
            Self::ScopeAttrs => "scope_attrs",
            Self::SpanAttrs => "span_attrs",
            Self::SpanEvents => "span_events",
            Self::SpanEventAttrs => "span_event_attrs",
            Self::SpanLinks => "span_links",
            Self::SpanLinkAttrs => "span_link_attrs",
            Self::NumberDataPoints => "number_data_points",
            Self::NumberDpAttrs => "number_dp_attrs",
            Self::NumberDpExemplars => "number_dp_exemplars",
            Self::NumberDpExemplarAttrs => "number_dp_exemplar_attrs",
            Self::HistogramDataPoints => "histogram_data_points",
            Self::HistogramDpAttrs => "histogram_dp_attrs",
            Self::HistogramDpExemplars => "histogram_dp_exemplars",
            Self::HistogramDpExemplarAttrs => "histogram_dp_exemplar_attrs",
            Self::ExpHistogramDataPoints => "exp_histogram_data_points",
            Self::ExpHistogramDpAttrs => "exp_histogram_dp_attrs",
            Self::ExpHistogramDpExemplars => "exp_histogram_dp_exemplars",
            Self::ExpHistogramDpExemplarAttrs => "exp_histogram_dp_exemplar_attrs",
            Self::SummaryDataPoints => "summary_data_points",
            Self::SummaryDpAttrs => "summary_dp_attrs",
        }
    }

    /// Returns the coarse category of this payload type.
    pub const fn category(&self) -> PayloadCategory {
        match self {
            Self::Spans | Self::Metrics => PayloadCategory::Main,
            Self::ResourceAttrs
            | Self::ScopeAttrs
            | Self::SpanAttrs
            | Self::SpanEventAttrs
            | Self::SpanLinkAttrs
            | Self::NumberDpAttrs
            | Self::NumberDpExemplarAttrs
            | Self::HistogramDpAttrs
            | Self::HistogramDpExemplarAttrs
            | Self::ExpHistogramDpAttrs
            | Self::ExpHistogramDpExemplarAttrs
            | Self::SummaryDpAttrs => PayloadCategory::Attrs,
            Self::SpanEvents => PayloadCategory::Events,
            Self::SpanLinks => PayloadCategory::Links,
            Self::NumberDataPoints
            | Self::HistogramDataPoints
            | Self::ExpHistogramDataPoints
            | Self::SummaryDataPoints => PayloadCategory::DataPoints,
            Self::NumberDpExemplars | Self::HistogramDpExemplars | Self::ExpHistogramDpExemplars => {
                PayloadCategory::Exemplars
            }
        }
    }
}

impl fmt::Display for PayloadType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Encoded bytes of one table for one batch.
#[derive(Clone, Debug, PartialEq)]
pub struct Payload {
    /// Identifier of the stream the bytes belong to.
    pub schema_id: String,

    /// Table carried by the payload.
    pub payload_type: PayloadType,

    /// Encoded messages.
    pub bytes: Bytes,
}

/// Everything produced for one batch: the main table first, then its related tables.
#[derive(Clone, Debug, PartialEq)]
pub struct BatchEnvelope {
    /// Sequence number of the batch within its producer.
    pub batch_id: u64,

    /// Payloads, one per non-empty table.
    pub payloads: Vec<Payload>,
}

impl BatchEnvelope {
    /// Returns the total number of payload bytes.
    pub fn encoded_len(&self) -> usize {
        self.payloads.iter().map(|p| p.bytes.len()).sum()
    }

    /// Returns the payload for the given table, if present.
    pub fn payload(&self, payload_type: PayloadType) -> Option<&Payload> {
        self.payloads.iter().find(|p| p.payload_type == payload_type)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn categories() {
        assert_eq!(PayloadType::Spans.category(), PayloadCategory::Main);
        assert_eq!(PayloadType::Metrics.category(), PayloadCategory::Main);
        assert_eq!(PayloadType::SpanLinkAttrs.category(), PayloadCategory::Attrs);
        assert_eq!(PayloadType::SpanEvents.category(), PayloadCategory::Events);
        assert_eq!(PayloadType::SummaryDataPoints.category(), PayloadCategory::DataPoints);
        assert_eq!(PayloadType::HistogramDpExemplars.category(), PayloadCategory::Exemplars);
        assert_eq!(PayloadType::ExpHistogramDpAttrs.to_string(), "exp_histogram_dp_attrs");
    }
}
