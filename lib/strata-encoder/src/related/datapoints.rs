//! Data point side tables.
//!
//! Each metric type has its own data point table, keyed by metric ID. A data point gets an ID of its own only when it
//! has attributes or exemplars, which are written to further side tables keyed by that ID.
use strata_model::{
    metric::{
        Exemplar, ExponentialHistogramDataPoint, HistogramDataPoint, NumberDataPoint, NumberValue, SummaryDataPoint,
    },
    KeyValue,
};

use super::{
    attributes::{AttributesBuilder, EXP_HISTOGRAM_DP_ATTRS, HISTOGRAM_DP_ATTRS, NUMBER_DP_ATTRS, SUMMARY_DP_ATTRS},
    Accumulator, ExemplarsBuilder, FinishedTable, IdAllocator, OwnerOrder,
};
use crate::{
    column::{
        builder::{ListBuilder, PrimitiveBuilder},
        ColumnData, DataType, FieldDef, SchemaDef,
    },
    error::EncodeError,
};

/// Number data points (gauges and sums), keyed by metric ID.
pub static NUMBER_DATA_POINTS: SchemaDef = SchemaDef {
    name: "number_data_points",
    fields: &[
        FieldDef::optional("id", DataType::UInt32).delta(),
        FieldDef::required("parent_id", DataType::UInt16).delta(),
        FieldDef::optional("start_time_unix_nano", DataType::UInt64),
        FieldDef::required("time_unix_nano", DataType::UInt64),
        FieldDef::optional("int_value", DataType::Int64),
        FieldDef::optional("double_value", DataType::Float64),
        FieldDef::optional("flags", DataType::UInt32),
    ],
};

/// Histogram data points, keyed by metric ID.
pub static HISTOGRAM_DATA_POINTS: SchemaDef = SchemaDef {
    name: "histogram_data_points",
    fields: &[
        FieldDef::optional("id", DataType::UInt32).delta(),
        FieldDef::required("parent_id", DataType::UInt16).delta(),
        FieldDef::optional("start_time_unix_nano", DataType::UInt64),
        FieldDef::required("time_unix_nano", DataType::UInt64),
        FieldDef::required("count", DataType::UInt64),
        FieldDef::optional("sum", DataType::Float64),
        FieldDef::optional("bucket_counts", DataType::ListUInt64),
        FieldDef::optional("explicit_bounds", DataType::ListFloat64),
        FieldDef::optional("flags", DataType::UInt32),
        FieldDef::optional("min", DataType::Float64),
        FieldDef::optional("max", DataType::Float64),
    ],
};

/// Exponential histogram data points, keyed by metric ID.
pub static EXP_HISTOGRAM_DATA_POINTS: SchemaDef = SchemaDef {
    name: "exp_histogram_data_points",
    fields: &[
        FieldDef::optional("id", DataType::UInt32).delta(),
        FieldDef::required("parent_id", DataType::UInt16).delta(),
        FieldDef::optional("start_time_unix_nano", DataType::UInt64),
        FieldDef::required("time_unix_nano", DataType::UInt64),
        FieldDef::required("count", DataType::UInt64),
        FieldDef::optional("sum", DataType::Float64),
        FieldDef::optional("scale", DataType::Int32),
        FieldDef::optional("zero_count", DataType::UInt64),
        FieldDef::optional("positive_offset", DataType::Int32),
        FieldDef::optional("positive_bucket_counts", DataType::ListUInt64),
        FieldDef::optional("negative_offset", DataType::Int32),
        FieldDef::optional("negative_bucket_counts", DataType::ListUInt64),
        FieldDef::optional("flags", DataType::UInt32),
        FieldDef::optional("min", DataType::Float64),
        FieldDef::optional("max", DataType::Float64),
        FieldDef::optional("zero_threshold", DataType::Float64),
    ],
};

/// Summary data points, keyed by metric ID.
pub static SUMMARY_DATA_POINTS: SchemaDef = SchemaDef {
    name: "summary_data_points",
    fields: &[
        FieldDef::optional("id", DataType::UInt32).delta(),
        FieldDef::required("parent_id", DataType::UInt16).delta(),
        FieldDef::optional("start_time_unix_nano", DataType::UInt64),
        FieldDef::required("time_unix_nano", DataType::UInt64),
        FieldDef::required("count", DataType::UInt64),
        FieldDef::required("sum", DataType::Float64),
        FieldDef::optional("quantile", DataType::ListFloat64),
        FieldDef::optional("value", DataType::ListFloat64),
        FieldDef::optional("flags", DataType::UInt32),
    ],
};

/// Columns and related tables shared by every data point table.
struct DataPointBase {
    ids: IdAllocator<u32>,
    order: OwnerOrder<u16>,
    id: PrimitiveBuilder<u32>,
    parent_id: PrimitiveBuilder<u16>,
    start_time_unix_nano: PrimitiveBuilder<u64>,
    time_unix_nano: PrimitiveBuilder<u64>,
    attrs: AttributesBuilder<u32>,
    exemplars: Option<ExemplarsBuilder>,
}

impl DataPointBase {
    fn new(def: &'static SchemaDef, attrs: &'static SchemaDef, exemplars: Option<ExemplarsBuilder>) -> Self {
        Self {
            ids: IdAllocator::new("data_point"),
            order: OwnerOrder::new(def.name),
            id: PrimitiveBuilder::new(),
            parent_id: PrimitiveBuilder::new(),
            start_time_unix_nano: PrimitiveBuilder::new(),
            time_unix_nano: PrimitiveBuilder::new(),
            attrs: AttributesBuilder::new(attrs),
            exemplars,
        }
    }

    fn append(
        &mut self, parent_id: u16, attributes: &[KeyValue], exemplars: &[Exemplar], start_time_unix_nano: u64,
        time_unix_nano: u64,
    ) -> Result<(), EncodeError> {
        if attributes.is_empty() && exemplars.is_empty() {
            self.id.append_null();
        } else {
            let id = self.ids.allocate()?;
            if !attributes.is_empty() {
                self.attrs.append_with_id(id, attributes)?;
            }
            if !exemplars.is_empty() {
                if let Some(builder) = self.exemplars.as_mut() {
                    builder.append_with_id(id, exemplars)?;
                }
            }
            self.id.append(id);
        }

        self.parent_id.append(parent_id);
        self.start_time_unix_nano.append_non_zero(start_time_unix_nano);
        self.time_unix_nano.append(time_unix_nano);
        Ok(())
    }

    fn len(&self) -> usize {
        self.parent_id.len()
    }

    fn reset(&mut self) {
        self.ids.reset();
        self.order.reset();
        self.id.reset();
        self.parent_id.reset();
        self.start_time_unix_nano.reset();
        self.time_unix_nano.reset();
        self.attrs.reset();
        if let Some(exemplars) = self.exemplars.as_mut() {
            exemplars.reset();
        }
    }

    /// Finishes the shared columns, in field order, ahead of the type-specific ones.
    fn finish_columns(&mut self) -> Vec<ColumnData> {
        self.ids.reset();
        self.order.reset();
        vec![
            self.id.finish(),
            self.parent_id.finish(),
            self.start_time_unix_nano.finish(),
            self.time_unix_nano.finish(),
        ]
    }

    fn finish_related(&mut self, out: &mut Vec<FinishedTable>) {
        self.attrs.finish(out);
        if let Some(exemplars) = self.exemplars.as_mut() {
            exemplars.finish(out);
        }
    }
}

/// Accumulates gauge and sum data points.
pub struct NumberDataPointsBuilder {
    base: DataPointBase,
    int_value: PrimitiveBuilder<i64>,
    double_value: PrimitiveBuilder<f64>,
    flags: PrimitiveBuilder<u32>,
}

impl NumberDataPointsBuilder {
    /// Creates a new, empty `NumberDataPointsBuilder`.
    pub fn new() -> Self {
        Self {
            base: DataPointBase::new(
                &NUMBER_DATA_POINTS,
                &NUMBER_DP_ATTRS,
                Some(ExemplarsBuilder::for_number_data_points()),
            ),
            int_value: PrimitiveBuilder::new(),
            double_value: PrimitiveBuilder::new(),
            flags: PrimitiveBuilder::new(),
        }
    }

    /// Returns the number of data point rows appended.
    pub fn len(&self) -> usize {
        self.base.len()
    }

    /// Returns `true` if no data points have been appended.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Appends the data points of the metric identified by `parent_id`.
    ///
    /// # Errors
    ///
    /// If `data_points` is empty or `parent_id` is lower than the previous metric's, an `AppendMismatch` error is
    /// returned. If an ID space is exhausted, a `CapacityExceeded` error is returned.
    pub fn append_with_id(&mut self, parent_id: u16, data_points: &[NumberDataPoint]) -> Result<(), EncodeError> {
        self.base.order.check(parent_id, data_points.len())?;

        for dp in data_points {
            self.base.append(
                parent_id,
                &dp.attributes,
                &dp.exemplars,
                dp.start_time_unix_nano,
                dp.time_unix_nano,
            )?;
            match dp.value {
                NumberValue::Int(v) => {
                    self.int_value.append(v);
                    self.double_value.append_null();
                }
                NumberValue::Double(v) => {
                    self.int_value.append_null();
                    self.double_value.append(v);
                }
            }
            self.flags.append_non_zero(dp.flags);
        }

        Ok(())
    }
}

impl Accumulator for NumberDataPointsBuilder {
    fn reset(&mut self) {
        self.base.reset();
        self.int_value.reset();
        self.double_value.reset();
        self.flags.reset();
    }

    fn finish(&mut self, out: &mut Vec<FinishedTable>) {
        let mut columns = self.base.finish_columns();
        columns.push(self.int_value.finish());
        columns.push(self.double_value.finish());
        columns.push(self.flags.finish());
        out.push(FinishedTable {
            def: &NUMBER_DATA_POINTS,
            columns,
        });
        self.base.finish_related(out);
    }
}

/// Accumulates histogram data points.
pub struct HistogramDataPointsBuilder {
    base: DataPointBase,
    count: PrimitiveBuilder<u64>,
    sum: PrimitiveBuilder<f64>,
    bucket_counts: ListBuilder<u64>,
    explicit_bounds: ListBuilder<f64>,
    flags: PrimitiveBuilder<u32>,
    min: PrimitiveBuilder<f64>,
    max: PrimitiveBuilder<f64>,
}

impl HistogramDataPointsBuilder {
    /// Creates a new, empty `HistogramDataPointsBuilder`.
    pub fn new() -> Self {
        Self {
            base: DataPointBase::new(
                &HISTOGRAM_DATA_POINTS,
                &HISTOGRAM_DP_ATTRS,
                Some(ExemplarsBuilder::for_histogram_data_points()),
            ),
            count: PrimitiveBuilder::new(),
            sum: PrimitiveBuilder::new(),
            bucket_counts: ListBuilder::new(),
            explicit_bounds: ListBuilder::new(),
            flags: PrimitiveBuilder::new(),
            min: PrimitiveBuilder::new(),
            max: PrimitiveBuilder::new(),
        }
    }

    /// Returns the number of data point rows appended.
    pub fn len(&self) -> usize {
        self.base.len()
    }

    /// Returns `true` if no data points have been appended.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Appends the data points of the metric identified by `parent_id`.
    ///
    /// # Errors
    ///
    /// If `data_points` is empty or `parent_id` is lower than the previous metric's, an `AppendMismatch` error is
    /// returned. If an ID space is exhausted, a `CapacityExceeded` error is returned.
    pub fn append_with_id(&mut self, parent_id: u16, data_points: &[HistogramDataPoint]) -> Result<(), EncodeError> {
        self.base.order.check(parent_id, data_points.len())?;

        for dp in data_points {
            self.base.append(
                parent_id,
                &dp.attributes,
                &dp.exemplars,
                dp.start_time_unix_nano,
                dp.time_unix_nano,
            )?;
            self.count.append(dp.count);
            self.sum.append_option(dp.sum);
            self.bucket_counts.append_non_empty(&dp.bucket_counts);
            self.explicit_bounds.append_non_empty(&dp.explicit_bounds);
            self.flags.append_non_zero(dp.flags);
            self.min.append_option(dp.min);
            self.max.append_option(dp.max);
        }

        Ok(())
    }
}

impl Accumulator for HistogramDataPointsBuilder {
    fn reset(&mut self) {
        self.base.reset();
        self.count.reset();
        self.sum.reset();
        self.bucket_counts.reset();
        self.explicit_bounds.reset();
        self.flags.reset();
        self.min.reset();
        self.max.reset();
    }

    fn finish(&mut self, out: &mut Vec<FinishedTable>) {
        let mut columns = self.base.finish_columns();
        columns.push(self.count.finish());
        columns.push(self.sum.finish());
        columns.push(self.bucket_counts.finish());
        columns.push(self.explicit_bounds.finish());
        columns.push(self.flags.finish());
        columns.push(self.min.finish());
        columns.push(self.max.finish());
        out.push(FinishedTable {
            def: &HISTOGRAM_DATA_POINTS,
            columns,
        });
        self.base.finish_related(out);
    }
}

/// Accumulates exponential histogram data points.
pub struct ExpHistogramDataPointsBuilder {
    base: DataPointBase,
    count: PrimitiveBuilder<u64>,
    sum: PrimitiveBuilder<f64>,
    scale: PrimitiveBuilder<i32>,
    zero_count: PrimitiveBuilder<u64>,
    positive_offset: PrimitiveBuilder<i32>,
    positive_bucket_counts: ListBuilder<u64>,
    negative_offset: PrimitiveBuilder<i32>,
    negative_bucket_counts: ListBuilder<u64>,
    flags: PrimitiveBuilder<u32>,
    min: PrimitiveBuilder<f64>,
    max: PrimitiveBuilder<f64>,
    zero_threshold: PrimitiveBuilder<f64>,
}

impl ExpHistogramDataPointsBuilder {
    /// Creates a new, empty `ExpHistogramDataPointsBuilder`.
    pub fn new() -> Self {
        Self {
            base: DataPointBase::new(
                &EXP_HISTOGRAM_DATA_POINTS,
                &EXP_HISTOGRAM_DP_ATTRS,
                Some(ExemplarsBuilder::for_exp_histogram_data_points()),
            ),
            count: PrimitiveBuilder::new(),
            sum: PrimitiveBuilder::new(),
            scale: PrimitiveBuilder::new(),
            zero_count: PrimitiveBuilder::new(),
            positive_offset: PrimitiveBuilder::new(),
            positive_bucket_counts: ListBuilder::new(),
            negative_offset: PrimitiveBuilder::new(),
            negative_bucket_counts: ListBuilder::new(),
            flags: PrimitiveBuilder::new(),
            min: PrimitiveBuilder::new(),
            max: PrimitiveBuilder::new(),
            zero_threshold: PrimitiveBuilder::new(),
        }
    }

    /// Returns the number of data point rows appended.
    pub fn len(&self) -> usize {
        self.base.len()
    }

    /// Returns `true` if no data points have been appended.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Appends the data points of the metric identified by `parent_id`.
    ///
    /// # Errors
    ///
    /// If `data_points` is empty or `parent_id` is lower than the previous metric's, an `AppendMismatch` error is
    /// returned. If an ID space is exhausted, a `CapacityExceeded` error is returned.
    pub fn append_with_id(
        &mut self, parent_id: u16, data_points: &[ExponentialHistogramDataPoint],
    ) -> Result<(), EncodeError> {
        self.base.order.check(parent_id, data_points.len())?;

        for dp in data_points {
            self.base.append(
                parent_id,
                &dp.attributes,
                &dp.exemplars,
                dp.start_time_unix_nano,
                dp.time_unix_nano,
            )?;
            self.count.append(dp.count);
            self.sum.append_option(dp.sum);
            self.scale.append_non_zero(dp.scale);
            self.zero_count.append_non_zero(dp.zero_count);
            self.positive_offset.append_non_zero(dp.positive.offset);
            self.positive_bucket_counts
                .append_non_empty(&dp.positive.bucket_counts);
            self.negative_offset.append_non_zero(dp.negative.offset);
            self.negative_bucket_counts
                .append_non_empty(&dp.negative.bucket_counts);
            self.flags.append_non_zero(dp.flags);
            self.min.append_option(dp.min);
            self.max.append_option(dp.max);
            self.zero_threshold.append_non_zero(dp.zero_threshold);
        }

        Ok(())
    }
}

impl Accumulator for ExpHistogramDataPointsBuilder {
    fn reset(&mut self) {
        self.base.reset();
        self.count.reset();
        self.sum.reset();
        self.scale.reset();
        self.zero_count.reset();
        self.positive_offset.reset();
        self.positive_bucket_counts.reset();
        self.negative_offset.reset();
        self.negative_bucket_counts.reset();
        self.flags.reset();
        self.min.reset();
        self.max.reset();
        self.zero_threshold.reset();
    }

    fn finish(&mut self, out: &mut Vec<FinishedTable>) {
        let mut columns = self.base.finish_columns();
        columns.push(self.count.finish());
        columns.push(self.sum.finish());
        columns.push(self.scale.finish());
        columns.push(self.zero_count.finish());
        columns.push(self.positive_offset.finish());
        columns.push(self.positive_bucket_counts.finish());
        columns.push(self.negative_offset.finish());
        columns.push(self.negative_bucket_counts.finish());
        columns.push(self.flags.finish());
        columns.push(self.min.finish());
        columns.push(self.max.finish());
        columns.push(self.zero_threshold.finish());
        out.push(FinishedTable {
            def: &EXP_HISTOGRAM_DATA_POINTS,
            columns,
        });
        self.base.finish_related(out);
    }
}

/// Accumulates summary data points.
pub struct SummaryDataPointsBuilder {
    base: DataPointBase,
    count: PrimitiveBuilder<u64>,
    sum: PrimitiveBuilder<f64>,
    quantile: ListBuilder<f64>,
    value: ListBuilder<f64>,
    flags: PrimitiveBuilder<u32>,
}

impl SummaryDataPointsBuilder {
    /// Creates a new, empty `SummaryDataPointsBuilder`.
    pub fn new() -> Self {
        Self {
            base: DataPointBase::new(&SUMMARY_DATA_POINTS, &SUMMARY_DP_ATTRS, None),
            count: PrimitiveBuilder::new(),
            sum: PrimitiveBuilder::new(),
            quantile: ListBuilder::new(),
            value: ListBuilder::new(),
            flags: PrimitiveBuilder::new(),
        }
    }

    /// Returns the number of data point rows appended.
    pub fn len(&self) -> usize {
        self.base.len()
    }

    /// Returns `true` if no data points have been appended.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Appends the data points of the metric identified by `parent_id`.
    ///
    /// # Errors
    ///
    /// If `data_points` is empty or `parent_id` is lower than the previous metric's, an `AppendMismatch` error is
    /// returned. If the data point ID space is exhausted, a `CapacityExceeded` error is returned.
    pub fn append_with_id(&mut self, parent_id: u16, data_points: &[SummaryDataPoint]) -> Result<(), EncodeError> {
        self.base.order.check(parent_id, data_points.len())?;

        for dp in data_points {
            self.base.append(
                parent_id,
                &dp.attributes,
                &[],
                dp.start_time_unix_nano,
                dp.time_unix_nano,
            )?;
            self.count.append(dp.count);
            self.sum.append(dp.sum);

            let (quantiles, values): (Vec<f64>, Vec<f64>) =
                dp.quantile_values.iter().map(|qv| (qv.quantile, qv.value)).unzip();
            self.quantile.append_non_empty(&quantiles);
            self.value.append_non_empty(&values);
            self.flags.append_non_zero(dp.flags);
        }

        Ok(())
    }
}

impl Accumulator for SummaryDataPointsBuilder {
    fn reset(&mut self) {
        self.base.reset();
        self.count.reset();
        self.sum.reset();
        self.quantile.reset();
        self.value.reset();
        self.flags.reset();
    }

    fn finish(&mut self, out: &mut Vec<FinishedTable>) {
        let mut columns = self.base.finish_columns();
        columns.push(self.count.finish());
        columns.push(self.sum.finish());
        columns.push(self.quantile.finish());
        columns.push(self.value.finish());
        columns.push(self.flags.finish());
        out.push(FinishedTable {
            def: &SUMMARY_DATA_POINTS,
            columns,
        });
        self.base.finish_related(out);
    }
}

#[cfg(test)]
mod tests {
    use strata_model::metric::{Buckets, ValueAtQuantile};

    use super::*;

    fn finish<A: Accumulator>(builder: &mut A) -> Vec<FinishedTable> {
        let mut out = Vec::new();
        builder.finish(&mut out);
        out
    }

    #[test]
    fn number_data_points_split_values() {
        let mut builder = NumberDataPointsBuilder::new();
        builder
            .append_with_id(
                0,
                &[
                    NumberDataPoint {
                        time_unix_nano: 5,
                        value: NumberValue::Int(3),
                        ..Default::default()
                    },
                    NumberDataPoint {
                        time_unix_nano: 6,
                        value: NumberValue::Double(0.5),
                        attributes: vec![KeyValue::new("k", "v")],
                        exemplars: vec![Exemplar::default()],
                        ..Default::default()
                    },
                ],
            )
            .unwrap();

        let tables = finish(&mut builder);
        let names = tables.iter().map(|t| t.def.name).collect::<Vec<_>>();
        assert_eq!(
            names,
            [
                "number_data_points",
                "number_dp_attrs",
                "number_dp_exemplars",
                "number_dp_exemplar_attrs"
            ]
        );
        assert_eq!(tables[0].columns[0], ColumnData::UInt32(vec![None, Some(0)]));
        assert_eq!(tables[0].columns[4], ColumnData::Int64(vec![Some(3), None]));
        assert_eq!(tables[0].columns[5], ColumnData::Float64(vec![None, Some(0.5)]));
        assert_eq!(tables[2].columns[1], ColumnData::UInt32(vec![Some(0)]));
        assert_eq!(tables[3].num_rows(), 0);
    }

    #[test]
    fn data_point_ids_are_per_table() {
        let mut histograms = HistogramDataPointsBuilder::new();
        let dp = HistogramDataPoint {
            attributes: vec![KeyValue::new("k", 1i64)],
            count: 3,
            bucket_counts: vec![1, 2],
            explicit_bounds: vec![10.0],
            ..Default::default()
        };
        histograms.append_with_id(0, &[dp.clone()]).unwrap();
        histograms.append_with_id(1, &[dp]).unwrap();
        assert!(histograms.append_with_id(0, &[HistogramDataPoint::default()]).is_err());

        let tables = finish(&mut histograms);
        assert_eq!(tables[0].columns[0], ColumnData::UInt32(vec![Some(0), Some(1)]));
        assert_eq!(
            tables[0].columns[6],
            ColumnData::ListUInt64(vec![Some(vec![1, 2]), Some(vec![1, 2])])
        );
        assert_eq!(tables[1].columns[0], ColumnData::UInt32(vec![Some(0), Some(1)]));
    }

    #[test]
    fn exp_histogram_sparse_columns() {
        let mut builder = ExpHistogramDataPointsBuilder::new();
        builder
            .append_with_id(
                3,
                &[ExponentialHistogramDataPoint {
                    count: 4,
                    scale: 0,
                    positive: Buckets {
                        offset: -2,
                        bucket_counts: vec![1, 3],
                    },
                    ..Default::default()
                }],
            )
            .unwrap();

        let tables = finish(&mut builder);
        assert_eq!(tables[0].columns[6], ColumnData::Int32(vec![None]));
        assert_eq!(tables[0].columns[8], ColumnData::Int32(vec![Some(-2)]));
        assert_eq!(tables[0].columns[11], ColumnData::ListUInt64(vec![None]));
    }

    #[test]
    fn summary_quantiles_split_into_lists() {
        let mut builder = SummaryDataPointsBuilder::new();
        builder
            .append_with_id(
                1,
                &[SummaryDataPoint {
                    count: 2,
                    sum: 3.0,
                    quantile_values: vec![
                        ValueAtQuantile {
                            quantile: 0.5,
                            value: 1.0,
                        },
                        ValueAtQuantile {
                            quantile: 0.99,
                            value: 2.0,
                        },
                    ],
                    ..Default::default()
                }],
            )
            .unwrap();

        let tables = finish(&mut builder);
        assert_eq!(tables.len(), 2);
        assert_eq!(tables[0].columns[6], ColumnData::ListFloat64(vec![Some(vec![0.5, 0.99])]));
        assert_eq!(tables[0].columns[7], ColumnData::ListFloat64(vec![Some(vec![1.0, 2.0])]));
    }
}
