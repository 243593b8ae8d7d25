//! Metrics encoding.
use strata_model::{
    metric::{AggregationTemporality, Metric, MetricData},
    Metrics, TelemetryKind,
};
use tracing::debug;

use crate::{
    column::{
        builder::{PrimitiveBuilder, StringBuilder},
        DataType, FieldDef, RecordBatch, SchemaDef,
    },
    config::EncoderConfig,
    error::{BuildError, EncodeError},
    optimizer::{optimize_metrics, Flattened, Row, SortPolicy},
    producer::{EncodedBatch, TelemetryEncoder},
    record::{assemble_with_retry, TableSet},
    related::{
        attributes::{
            EXP_HISTOGRAM_DP_ATTRS, EXP_HISTOGRAM_DP_EXEMPLAR_ATTRS, HISTOGRAM_DP_ATTRS, HISTOGRAM_DP_EXEMPLAR_ATTRS,
            NUMBER_DP_ATTRS, NUMBER_DP_EXEMPLAR_ATTRS, RESOURCE_ATTRS, SCOPE_ATTRS, SUMMARY_DP_ATTRS,
        },
        datapoints::{EXP_HISTOGRAM_DATA_POINTS, HISTOGRAM_DATA_POINTS, NUMBER_DATA_POINTS, SUMMARY_DATA_POINTS},
        exemplars::{EXP_HISTOGRAM_DP_EXEMPLARS, HISTOGRAM_DP_EXEMPLARS, NUMBER_DP_EXEMPLARS},
        Accumulator, ExpHistogramDataPointsBuilder, FinishedTable, HistogramDataPointsBuilder, IdAllocator,
        NumberDataPointsBuilder, SummaryDataPointsBuilder,
    },
    resource_scope::{resource_scope_fields, ResourceScopeColumns},
    stream::PayloadType,
};

/// Metrics, one row per metric.
///
/// Data points live in one side table per metric type, keyed by the metric ID.
pub static METRICS: SchemaDef = SchemaDef {
    name: "metrics",
    fields: resource_scope_fields![
        FieldDef::required("metric_type", DataType::UInt8),
        FieldDef::required("name", DataType::Utf8).dictionary(),
        FieldDef::optional("description", DataType::Utf8).dictionary(),
        FieldDef::optional("unit", DataType::Utf8).dictionary(),
        FieldDef::optional("aggregation_temporality", DataType::Int32),
        FieldDef::optional("is_monotonic", DataType::Boolean),
    ],
};

fn tables() -> [(PayloadType, &'static SchemaDef); 17] {
    [
        (PayloadType::Metrics, &METRICS),
        (PayloadType::ResourceAttrs, &RESOURCE_ATTRS),
        (PayloadType::ScopeAttrs, &SCOPE_ATTRS),
        (PayloadType::NumberDataPoints, &NUMBER_DATA_POINTS),
        (PayloadType::NumberDpAttrs, &NUMBER_DP_ATTRS),
        (PayloadType::NumberDpExemplars, &NUMBER_DP_EXEMPLARS),
        (PayloadType::NumberDpExemplarAttrs, &NUMBER_DP_EXEMPLAR_ATTRS),
        (PayloadType::HistogramDataPoints, &HISTOGRAM_DATA_POINTS),
        (PayloadType::HistogramDpAttrs, &HISTOGRAM_DP_ATTRS),
        (PayloadType::HistogramDpExemplars, &HISTOGRAM_DP_EXEMPLARS),
        (PayloadType::HistogramDpExemplarAttrs, &HISTOGRAM_DP_EXEMPLAR_ATTRS),
        (PayloadType::ExpHistogramDataPoints, &EXP_HISTOGRAM_DATA_POINTS),
        (PayloadType::ExpHistogramDpAttrs, &EXP_HISTOGRAM_DP_ATTRS),
        (PayloadType::ExpHistogramDpExemplars, &EXP_HISTOGRAM_DP_EXEMPLARS),
        (PayloadType::ExpHistogramDpExemplarAttrs, &EXP_HISTOGRAM_DP_EXEMPLAR_ATTRS),
        (PayloadType::SummaryDataPoints, &SUMMARY_DATA_POINTS),
        (PayloadType::SummaryDpAttrs, &SUMMARY_DP_ATTRS),
    ]
}

/// Encodes metrics into the metrics table and its data point tables.
///
/// A metric gets an ID only when it has data points.
pub struct MetricsEncoder {
    sort_policy: SortPolicy,
    tables: TableSet,
    metric_ids: IdAllocator<u16>,
    entities: ResourceScopeColumns,
    id: PrimitiveBuilder<u16>,
    metric_type: PrimitiveBuilder<u8>,
    name: StringBuilder,
    description: StringBuilder,
    unit: StringBuilder,
    aggregation_temporality: PrimitiveBuilder<i32>,
    is_monotonic: PrimitiveBuilder<bool>,
    number_dps: NumberDataPointsBuilder,
    histogram_dps: HistogramDataPointsBuilder,
    exp_histogram_dps: ExpHistogramDataPointsBuilder,
    summary_dps: SummaryDataPointsBuilder,
}

impl MetricsEncoder {
    /// Creates a new `MetricsEncoder`.
    pub fn new(config: &EncoderConfig) -> Self {
        Self {
            sort_policy: config.sort_policy,
            tables: TableSet::new(&tables(), config),
            metric_ids: IdAllocator::new("metric"),
            entities: ResourceScopeColumns::new(config.dedup),
            id: PrimitiveBuilder::new(),
            metric_type: PrimitiveBuilder::new(),
            name: StringBuilder::new(),
            description: StringBuilder::new(),
            unit: StringBuilder::new(),
            aggregation_temporality: PrimitiveBuilder::new(),
            is_monotonic: PrimitiveBuilder::new(),
            number_dps: NumberDataPointsBuilder::new(),
            histogram_dps: HistogramDataPointsBuilder::new(),
            exp_histogram_dps: ExpHistogramDataPointsBuilder::new(),
            summary_dps: SummaryDataPointsBuilder::new(),
        }
    }

    fn reset(&mut self) {
        self.metric_ids.reset();
        self.entities.reset();
        self.id.reset();
        self.metric_type.reset();
        self.name.reset();
        self.description.reset();
        self.unit.reset();
        self.aggregation_temporality.reset();
        self.is_monotonic.reset();
        self.number_dps.reset();
        self.histogram_dps.reset();
        self.exp_histogram_dps.reset();
        self.summary_dps.reset();
    }

    fn append(&mut self, flattened: &Flattened<'_, Metric>, row: &Row<'_, Metric>) -> Result<(), EncodeError> {
        let metric = row.item;
        self.entities
            .append(flattened.resource_of(row), flattened.scope_of(row))?;

        if metric.data.data_point_count() > 0 {
            let id = self.metric_ids.allocate()?;
            match &metric.data {
                MetricData::Empty => {}
                MetricData::Gauge { data_points } | MetricData::Sum { data_points, .. } => {
                    self.number_dps.append_with_id(id, data_points)?
                }
                MetricData::Histogram { data_points, .. } => self.histogram_dps.append_with_id(id, data_points)?,
                MetricData::ExponentialHistogram { data_points, .. } => {
                    self.exp_histogram_dps.append_with_id(id, data_points)?
                }
                MetricData::Summary { data_points } => self.summary_dps.append_with_id(id, data_points)?,
            }
            self.id.append(id);
        } else {
            self.id.append_null();
        }

        self.metric_type.append(metric.data.metric_type().as_u8());
        self.name.append(&metric.name);
        self.description.append_non_empty(&metric.description);
        self.unit.append_non_empty(&metric.unit);

        let (temporality, is_monotonic) = match &metric.data {
            MetricData::Sum {
                aggregation_temporality,
                is_monotonic,
                ..
            } => (*aggregation_temporality, Some(*is_monotonic)),
            MetricData::Histogram {
                aggregation_temporality,
                ..
            }
            | MetricData::ExponentialHistogram {
                aggregation_temporality,
                ..
            } => (*aggregation_temporality, None),
            _ => (AggregationTemporality::Unspecified, None),
        };
        self.aggregation_temporality
            .append_non_zero(temporality.as_i32());
        self.is_monotonic.append_option(is_monotonic);
        Ok(())
    }

    fn build(&mut self) -> Result<Vec<(PayloadType, RecordBatch)>, BuildError> {
        let mut columns = Vec::with_capacity(METRICS.fields.len());
        columns.push(self.id.finish());
        columns.extend(self.entities.finish_columns());
        columns.extend([
            self.metric_type.finish(),
            self.name.finish(),
            self.description.finish(),
            self.unit.finish(),
            self.aggregation_temporality.finish(),
            self.is_monotonic.finish(),
        ]);
        self.metric_ids.reset();

        let mut finished = Vec::with_capacity(17);
        finished.push(FinishedTable { def: &METRICS, columns });
        self.entities.finish(&mut finished);
        self.number_dps.finish(&mut finished);
        self.histogram_dps.finish(&mut finished);
        self.exp_histogram_dps.finish(&mut finished);
        self.summary_dps.finish(&mut finished);
        self.tables.assemble(finished)
    }
}

impl TelemetryEncoder for MetricsEncoder {
    type Input = Metrics;

    const KIND: TelemetryKind = TelemetryKind::Metrics;

    fn from_config(config: &EncoderConfig) -> Self {
        Self::new(config)
    }

    fn encode(&mut self, metrics: &Metrics) -> Result<EncodedBatch, EncodeError> {
        let flattened = optimize_metrics(metrics, self.sort_policy);

        let mut entities = (0, 0);
        let (records, retries) = assemble_with_retry(METRICS.name, || {
            self.reset();
            for row in &flattened.rows {
                self.append(&flattened, row)?;
            }
            entities = self.entities.allocated();
            self.build()
        })?;

        debug!(
            metrics = flattened.rows.len(),
            resources = entities.0,
            scopes = entities.1,
            tables = records.len(),
            retries,
            "Encoded metrics."
        );

        Ok(EncodedBatch {
            records,
            rows: flattened.rows.len(),
            retries,
        })
    }
}
