//! Columnar batch encoder for hierarchical telemetry.
//!
//! Traces and metrics trees are canonicalized into rows, split into a main table and a set of related tables, and
//! written as self-describing streams of schemas, dictionaries and record batches. Resources and scopes that repeat
//! within a batch are written once and referenced by ID, and dictionary values are sent once per stream, so that
//! consecutive batches only carry what is new.
//!
//! The entry points are [`TracesProducer`] and [`MetricsProducer`], which turn telemetry trees into
//! [`BatchEnvelope`]s. [`StreamConsumer`] reverses the process, and [`decode_traces`] / [`decode_metrics`] reassemble
//! the decoded tables into trees.
#![deny(warnings)]
#![deny(missing_docs)]

mod collections;

pub mod column;

pub mod config;
pub use self::config::{DictionaryConfig, DictionaryPolicy, EncoderConfig};

pub mod decode;
pub use self::decode::{decode_metrics, decode_traces};

pub mod entity;

mod error;
pub use self::error::{BuildError, DecodeError, EncodeError};

pub mod metrics;
pub use self::metrics::MetricsEncoder;

pub mod optimizer;
pub use self::optimizer::SortPolicy;

pub mod producer;
pub use self::producer::{EncodedBatch, MetricsProducer, Producer, TelemetryEncoder, TracesProducer};

pub mod record;

pub mod related;

mod resource_scope;

pub mod stream;
pub use self::stream::{
    BatchEnvelope, DecodedBatch, Payload, PayloadCategory, PayloadType, StreamConsumer, StreamProducer,
};

mod telemetry;

pub mod traces;
pub use self::traces::TracesEncoder;
