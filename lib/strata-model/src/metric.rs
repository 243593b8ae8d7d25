//! Metric types.
use serde::{Deserialize, Serialize};

use crate::{
    trace::{SpanId, TraceId},
    Attributes, Resource, Scope,
};

/// A batch of metrics.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
pub struct Metrics {
    /// Metrics, grouped by resource.
    pub resource_metrics: Vec<ResourceMetrics>,
}

impl Metrics {
    /// Returns the total number of metrics across all resources and scopes.
    pub fn metric_count(&self) -> usize {
        self.resource_metrics
            .iter()
            .flat_map(|rm| rm.scope_metrics.iter())
            .map(|sm| sm.metrics.len())
            .sum()
    }

    /// Returns the total number of data points across all metrics.
    pub fn data_point_count(&self) -> usize {
        self.resource_metrics
            .iter()
            .flat_map(|rm| rm.scope_metrics.iter())
            .flat_map(|sm| sm.metrics.iter())
            .map(|m| m.data.data_point_count())
            .sum()
    }
}

/// Metrics produced by a single resource.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
pub struct ResourceMetrics {
    /// The resource.
    pub resource: Resource,

    /// Schema URL of the resource.
    pub schema_url: String,

    /// Metrics, grouped by scope.
    pub scope_metrics: Vec<ScopeMetrics>,
}

/// Metrics produced by a single instrumentation scope.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
pub struct ScopeMetrics {
    /// The scope.
    pub scope: Scope,

    /// Schema URL of the scope.
    pub schema_url: String,

    /// Metrics.
    pub metrics: Vec<Metric>,
}

/// A metric.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
pub struct Metric {
    /// Metric name.
    pub name: String,

    /// Metric description.
    pub description: String,

    /// Metric unit.
    pub unit: String,

    /// Metric data.
    pub data: MetricData,
}

/// Aggregation temporality of cumulative-style metrics.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq, Deserialize, Serialize)]
#[repr(i32)]
pub enum AggregationTemporality {
    /// Unspecified.
    #[default]
    Unspecified = 0,

    /// Values are deltas since the previous report.
    Delta = 1,

    /// Values are cumulative since a fixed start time.
    Cumulative = 2,
}

impl AggregationTemporality {
    /// Returns the numeric value of this temporality.
    pub const fn as_i32(self) -> i32 {
        self as i32
    }

    /// Creates an `AggregationTemporality` from its numeric value.
    ///
    /// Unknown values map to `Unspecified`.
    pub const fn from_i32(value: i32) -> Self {
        match value {
            1 => Self::Delta,
            2 => Self::Cumulative,
            _ => Self::Unspecified,
        }
    }
}

/// Metric data.
///
/// Each variant carries only the fields that apply to its metric type.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
pub enum MetricData {
    /// A metric with no data.
    #[default]
    Empty,

    /// A gauge: the latest value of a quantity.
    Gauge {
        /// Data points.
        data_points: Vec<NumberDataPoint>,
    },

    /// A sum: an aggregated quantity over time.
    Sum {
        /// Data points.
        data_points: Vec<NumberDataPoint>,

        /// Aggregation temporality.
        aggregation_temporality: AggregationTemporality,

        /// Whether the sum only ever increases.
        is_monotonic: bool,
    },

    /// A histogram with explicit bucket boundaries.
    Histogram {
        /// Data points.
        data_points: Vec<HistogramDataPoint>,

        /// Aggregation temporality.
        aggregation_temporality: AggregationTemporality,
    },

    /// A histogram with exponentially-scaled buckets.
    ExponentialHistogram {
        /// Data points.
        data_points: Vec<ExponentialHistogramDataPoint>,

        /// Aggregation temporality.
        aggregation_temporality: AggregationTemporality,
    },

    /// A summary: precomputed quantiles.
    Summary {
        /// Data points.
        data_points: Vec<SummaryDataPoint>,
    },
}

impl MetricData {
    /// Returns the metric type of this data.
    pub fn metric_type(&self) -> MetricType {
        match self {
            Self::Empty => MetricType::Empty,
            Self::Gauge { .. } => MetricType::Gauge,
            Self::Sum { .. } => MetricType::Sum,
            Self::Histogram { .. } => MetricType::Histogram,
            Self::ExponentialHistogram { .. } => MetricType::ExponentialHistogram,
            Self::Summary { .. } => MetricType::Summary,
        }
    }

    /// Returns the number of data points.
    pub fn data_point_count(&self) -> usize {
        match self {
            Self::Empty => 0,
            Self::Gauge { data_points } => data_points.len(),
            Self::Sum { data_points, .. } => data_points.len(),
            Self::Histogram { data_points, .. } => data_points.len(),
            Self::ExponentialHistogram { data_points, .. } => data_points.len(),
            Self::Summary { data_points } => data_points.len(),
        }
    }
}

/// Metric type tag.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq, Deserialize, Serialize)]
#[repr(u8)]
pub enum MetricType {
    /// No data.
    #[default]
    Empty = 0,

    /// Gauge.
    Gauge = 1,

    /// Sum.
    Sum = 2,

    /// Histogram.
    Histogram = 3,

    /// Exponential histogram.
    ExponentialHistogram = 4,

    /// Summary.
    Summary = 5,
}

impl MetricType {
    /// Returns the numeric value of this metric type.
    pub const fn as_u8(self) -> u8 {
        self as u8
    }

    /// Creates a `MetricType` from its numeric value.
    pub const fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Empty),
            1 => Some(Self::Gauge),
            2 => Some(Self::Sum),
            3 => Some(Self::Histogram),
            4 => Some(Self::ExponentialHistogram),
            5 => Some(Self::Summary),
            _ => None,
        }
    }
}

/// A numeric value, either integer or floating-point.
#[derive(Clone, Copy, Debug, PartialEq, Deserialize, Serialize)]
pub enum NumberValue {
    /// Integer value.
    Int(i64),

    /// Floating-point value.
    Double(f64),
}

impl Default for NumberValue {
    fn default() -> Self {
        Self::Int(0)
    }
}

/// A data point of a gauge or sum.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
pub struct NumberDataPoint {
    /// Data point attributes.
    pub attributes: Attributes,

    /// Start of the measurement window, in nanoseconds since the Unix epoch.
    pub start_time_unix_nano: u64,

    /// Time of the measurement, in nanoseconds since the Unix epoch.
    pub time_unix_nano: u64,

    /// Measured value.
    pub value: NumberValue,

    /// Exemplars.
    pub exemplars: Vec<Exemplar>,

    /// Data point flags.
    pub flags: u32,
}

/// A data point of an explicit-bucket histogram.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
pub struct HistogramDataPoint {
    /// Data point attributes.
    pub attributes: Attributes,

    /// Start of the measurement window, in nanoseconds since the Unix epoch.
    pub start_time_unix_nano: u64,

    /// Time of the measurement, in nanoseconds since the Unix epoch.
    pub time_unix_nano: u64,

    /// Number of values in the population.
    pub count: u64,

    /// Sum of the values in the population, if known.
    pub sum: Option<f64>,

    /// Per-bucket counts.
    pub bucket_counts: Vec<u64>,

    /// Bucket boundaries.
    pub explicit_bounds: Vec<f64>,

    /// Exemplars.
    pub exemplars: Vec<Exemplar>,

    /// Data point flags.
    pub flags: u32,

    /// Minimum value, if known.
    pub min: Option<f64>,

    /// Maximum value, if known.
    pub max: Option<f64>,
}

/// A set of contiguous exponential histogram buckets.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
pub struct Buckets {
    /// Index of the first bucket.
    pub offset: i32,

    /// Per-bucket counts.
    pub bucket_counts: Vec<u64>,
}

/// A data point of an exponential histogram.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
pub struct ExponentialHistogramDataPoint {
    /// Data point attributes.
    pub attributes: Attributes,

    /// Start of the measurement window, in nanoseconds since the Unix epoch.
    pub start_time_unix_nano: u64,

    /// Time of the measurement, in nanoseconds since the Unix epoch.
    pub time_unix_nano: u64,

    /// Number of values in the population.
    pub count: u64,

    /// Sum of the values in the population, if known.
    pub sum: Option<f64>,

    /// Resolution of the histogram.
    pub scale: i32,

    /// Number of values that fall into the zero bucket.
    pub zero_count: u64,

    /// Positive buckets.
    pub positive: Buckets,

    /// Negative buckets.
    pub negative: Buckets,

    /// Data point flags.
    pub flags: u32,

    /// Exemplars.
    pub exemplars: Vec<Exemplar>,

    /// Minimum value, if known.
    pub min: Option<f64>,

    /// Maximum value, if known.
    pub max: Option<f64>,

    /// Width of the zero bucket.
    pub zero_threshold: f64,
}

/// A quantile and its value.
#[derive(Clone, Copy, Debug, Default, PartialEq, Deserialize, Serialize)]
pub struct ValueAtQuantile {
    /// Quantile, between 0.0 and 1.0.
    pub quantile: f64,

    /// Value at the quantile.
    pub value: f64,
}

/// A data point of a summary.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
pub struct SummaryDataPoint {
    /// Data point attributes.
    pub attributes: Attributes,

    /// Start of the measurement window, in nanoseconds since the Unix epoch.
    pub start_time_unix_nano: u64,

    /// Time of the measurement, in nanoseconds since the Unix epoch.
    pub time_unix_nano: u64,

    /// Number of values in the population.
    pub count: u64,

    /// Sum of the values in the population.
    pub sum: f64,

    /// Quantile values.
    pub quantile_values: Vec<ValueAtQuantile>,

    /// Data point flags.
    pub flags: u32,
}

/// A sample measurement recorded alongside aggregated data.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
pub struct Exemplar {
    /// Attributes that were filtered out during aggregation.
    pub filtered_attributes: Attributes,

    /// Time of the measurement, in nanoseconds since the Unix epoch.
    pub time_unix_nano: u64,

    /// Measured value.
    pub value: NumberValue,

    /// Span active when the measurement was taken, if any.
    pub span_id: Option<SpanId>,

    /// Trace active when the measurement was taken, if any.
    pub trace_id: Option<TraceId>,
}
