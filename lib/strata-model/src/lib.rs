//! Hierarchical telemetry data model consumed by the Strata encoder.
//!
//! Telemetry arrives as a tree: a resource owns one or more instrumentation scopes, each scope owns a set of leaf
//! records (spans or metrics), and each leaf record owns its related data (attributes, events, links, data points,
//! exemplars). The encoder flattens this tree into columnar tables; this crate only describes the tree itself.
#![deny(warnings)]
#![deny(missing_docs)]

use std::fmt;

use serde::{Deserialize, Serialize};

mod value;
pub use self::value::{AnyValue, Attributes, KeyValue};

mod resource;
pub use self::resource::{Resource, Scope};

pub mod trace;
pub use self::trace::Traces;

pub mod metric;
pub use self::metric::Metrics;

/// Kind of telemetry carried by a batch.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TelemetryKind {
    /// Traces (spans, with their events and links).
    Traces,

    /// Metrics (with their data points and exemplars).
    Metrics,
}

impl TelemetryKind {
    /// Returns the telemetry kind as a static string.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Traces => "traces",
            Self::Metrics => "metrics",
        }
    }
}

impl fmt::Display for TelemetryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
