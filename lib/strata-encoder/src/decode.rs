//! Reassembly of decoded tables into telemetry trees.
//!
//! Related rows are joined to their owners through the ID columns. Consecutive main-table rows with equal resources and
//! scopes are grouped back under a single resource and scope, so a decoded tree holds the same leaves as the encoded
//! one but not necessarily the same grouping.
use strata_model::{
    metric::{
        AggregationTemporality, Buckets, Exemplar, ExponentialHistogramDataPoint, HistogramDataPoint, Metric,
        MetricData, MetricType, NumberDataPoint, NumberValue, ResourceMetrics, ScopeMetrics, SummaryDataPoint,
        ValueAtQuantile,
    },
    trace::{Event, Link, ResourceSpans, ScopeSpans, Span, SpanKind, Status, StatusCode},
    AnyValue, Attributes, KeyValue, Metrics, Resource, Scope, Traces,
};

use crate::{
    collections::FastHashMap,
    column::{ColumnData, RecordBatch},
    error::DecodeError,
    related::ValueType,
    stream::{wire::decode_any_value, DecodedBatch, PayloadType},
};

type Values<'a, T> = Option<&'a [Option<T>]>;

type Accessor<T> = fn(&ColumnData) -> Option<&[Option<T>]>;

fn cell<T: Clone>(values: Values<'_, T>, row: usize) -> Option<T> {
    values.and_then(|values| values.get(row).cloned().flatten())
}

fn take<V: Default>(map: &mut FastHashMap<u32, V>, id: Option<u32>) -> V {
    id.and_then(|id| map.remove(&id)).unwrap_or_default()
}

fn fixed<const N: usize>(bytes: Vec<u8>, name: &str) -> Result<[u8; N], DecodeError> {
    bytes.try_into().map_err(|bytes: Vec<u8>| DecodeError::InvalidMessage {
        reason: format!("'{}' holds {} bytes, expected {}", name, bytes.len(), N),
    })
}

fn number_value(int: Option<i64>, double: Option<f64>) -> NumberValue {
    match (int, double) {
        (Some(v), _) => NumberValue::Int(v),
        (None, Some(v)) => NumberValue::Double(v),
        (None, None) => NumberValue::default(),
    }
}

/// Returns the last group if it matches, or pushes a new one.
fn group<'v, G>(groups: &'v mut Vec<G>, matches: impl Fn(&G) -> bool, create: impl FnOnce() -> G) -> &'v mut G {
    if !groups.last().is_some_and(matches) {
        groups.push(create());
    }
    let last = groups.len() - 1;
    &mut groups[last]
}

/// Typed access to the columns of one decoded table.
struct Table<'a> {
    payload_type: PayloadType,
    batch: &'a RecordBatch,
}

impl<'a> Table<'a> {
    fn get(decoded: &'a DecodedBatch, payload_type: PayloadType) -> Option<Self> {
        decoded
            .table(payload_type)
            .map(|batch| Self { payload_type, batch })
    }

    fn main(decoded: &'a DecodedBatch, payload_type: PayloadType) -> Result<Self, DecodeError> {
        Self::get(decoded, payload_type).ok_or_else(|| DecodeError::Missing {
            what: "table",
            name: payload_type.to_string(),
        })
    }

    fn rows(&self) -> usize {
        self.batch.num_rows()
    }

    fn unexpected_type(&self, name: &str, column: &ColumnData) -> DecodeError {
        DecodeError::InvalidMessage {
            reason: format!(
                "column '{}' of {} has unexpected type {}",
                name,
                self.payload_type,
                column.data_type()
            ),
        }
    }

    fn missing(&self, name: &str) -> DecodeError {
        DecodeError::Missing {
            what: "column",
            name: format!("{}.{}", self.payload_type, name),
        }
    }

    /// Returns the values of an optional column, or `None` if the column is absent from the schema.
    fn optional<T>(&self, name: &str, accessor: Accessor<T>) -> Result<Values<'a, T>, DecodeError> {
        let batch = self.batch;
        match batch.column(name) {
            None => Ok(None),
            Some(column) => accessor(column)
                .map(Some)
                .ok_or_else(|| self.unexpected_type(name, column)),
        }
    }

    fn required<T>(&self, name: &str, accessor: Accessor<T>) -> Result<&'a [Option<T>], DecodeError> {
        self.optional(name, accessor)?.ok_or_else(|| self.missing(name))
    }

    /// Reads an ID column, which may be 16 or 32 bits wide, widening every ID to 32 bits.
    fn ids(&self, name: &str) -> Result<Option<Vec<Option<u32>>>, DecodeError> {
        let batch = self.batch;
        match batch.column(name) {
            None => Ok(None),
            Some(ColumnData::UInt16(values)) => Ok(Some(values.iter().map(|id| id.map(u32::from)).collect())),
            Some(ColumnData::UInt32(values)) => Ok(Some(values.clone())),
            Some(column) => Err(self.unexpected_type(name, column)),
        }
    }

    fn row_ids(&self) -> Result<Vec<Option<u32>>, DecodeError> {
        Ok(self.ids("id")?.unwrap_or_else(|| vec![None; self.rows()]))
    }

    fn parent_ids(&self) -> Result<Vec<u32>, DecodeError> {
        self.ids("parent_id")?
            .ok_or_else(|| self.missing("parent_id"))?
            .into_iter()
            .map(|id| id.ok_or_else(|| self.null_value("parent_id")))
            .collect()
    }

    fn null_value(&self, name: &str) -> DecodeError {
        DecodeError::InvalidMessage {
            reason: format!("required column '{}' of {} holds a null", name, self.payload_type),
        }
    }
}

fn attributes(decoded: &DecodedBatch, payload_type: PayloadType) -> Result<FastHashMap<u32, Attributes>, DecodeError> {
    let mut out = FastHashMap::<u32, Attributes>::default();
    let Some(table) = Table::get(decoded, payload_type) else {
        return Ok(out);
    };

    let parents = table.parent_ids()?;
    let keys = table.required("key", ColumnData::as_utf8)?;
    let types = table.required("type", ColumnData::as_u8)?;
    let strs = table.optional("str", ColumnData::as_utf8)?;
    let ints = table.optional("int", ColumnData::as_i64)?;
    let doubles = table.optional("double", ColumnData::as_f64)?;
    let bools = table.optional("bool", ColumnData::as_bool)?;
    let bytes = table.optional("bytes", ColumnData::as_binary)?;
    let sers = table.optional("ser", ColumnData::as_binary)?;

    for (row, parent) in parents.into_iter().enumerate() {
        let key = cell(Some(keys), row).unwrap_or_default();
        let tag = cell(Some(types), row).unwrap_or_default();
        let value_type = ValueType::from_u8(tag).ok_or(DecodeError::UnknownCode {
            what: "value type",
            code: u64::from(tag),
        })?;
        let missing = || DecodeError::InvalidMessage {
            reason: format!("attribute '{}' of {} has no {:?} value", key, payload_type, value_type),
        };

        let value = match value_type {
            ValueType::Empty => AnyValue::Empty,
            ValueType::Str => AnyValue::Str(cell(strs, row).ok_or_else(missing)?),
            ValueType::Int => AnyValue::Int(cell(ints, row).ok_or_else(missing)?),
            ValueType::Double => AnyValue::Double(cell(doubles, row).ok_or_else(missing)?),
            ValueType::Bool => AnyValue::Bool(cell(bools, row).ok_or_else(missing)?),
            ValueType::Bytes => AnyValue::Bytes(cell(bytes, row).ok_or_else(missing)?),
            ValueType::Map | ValueType::Slice => {
                let ser = cell(sers, row).ok_or_else(missing)?;
                decode_any_value(&ser)?
            }
        };

        out.entry(parent).or_default().push(KeyValue { key, value });
    }

    Ok(out)
}

/// The resource and scope of one main-table row.
struct EntityRow {
    resource: Resource,
    resource_schema_url: String,
    scope: Scope,
    schema_url: String,
}

/// The resource and scope columns of a main table, along with their attribute tables.
struct EntityColumns<'a> {
    resource_ids: &'a [Option<u16>],
    resource_schema_url: Values<'a, String>,
    resource_dropped_attributes_count: Values<'a, u32>,
    scope_ids: &'a [Option<u16>],
    scope_name: Values<'a, String>,
    scope_version: Values<'a, String>,
    scope_dropped_attributes_count: Values<'a, u32>,
    schema_url: Values<'a, String>,
    resource_attrs: FastHashMap<u32, Attributes>,
    scope_attrs: FastHashMap<u32, Attributes>,
}

impl<'a> EntityColumns<'a> {
    fn read(table: &Table<'a>, decoded: &DecodedBatch) -> Result<Self, DecodeError> {
        Ok(Self {
            resource_ids: table.required("resource.id", ColumnData::as_u16)?,
            resource_schema_url: table.optional("resource.schema_url", ColumnData::as_utf8)?,
            resource_dropped_attributes_count: table.optional("resource.dropped_attributes_count", ColumnData::as_u32)?,
            scope_ids: table.required("scope.id", ColumnData::as_u16)?,
            scope_name: table.optional("scope.name", ColumnData::as_utf8)?,
            scope_version: table.optional("scope.version", ColumnData::as_utf8)?,
            scope_dropped_attributes_count: table.optional("scope.dropped_attributes_count", ColumnData::as_u32)?,
            schema_url: table.optional("schema_url", ColumnData::as_utf8)?,
            resource_attrs: attributes(decoded, PayloadType::ResourceAttrs)?,
            scope_attrs: attributes(decoded, PayloadType::ScopeAttrs)?,
        })
    }

    fn row(&self, table: &Table<'_>, row: usize) -> Result<EntityRow, DecodeError> {
        let resource_id = cell(Some(self.resource_ids), row).ok_or_else(|| table.null_value("resource.id"))?;
        let scope_id = cell(Some(self.scope_ids), row).ok_or_else(|| table.null_value("scope.id"))?;

        Ok(EntityRow {
            resource: Resource {
                attributes: self
                    .resource_attrs
                    .get(&u32::from(resource_id))
                    .cloned()
                    .unwrap_or_default(),
                dropped_attributes_count: cell(self.resource_dropped_attributes_count, row).unwrap_or_default(),
            },
            resource_schema_url: cell(self.resource_schema_url, row).unwrap_or_default(),
            scope: Scope {
                name: cell(self.scope_name, row).unwrap_or_default(),
                version: cell(self.scope_version, row).unwrap_or_default(),
                attributes: self
                    .scope_attrs
                    .get(&u32::from(scope_id))
                    .cloned()
                    .unwrap_or_default(),
                dropped_attributes_count: cell(self.scope_dropped_attributes_count, row).unwrap_or_default(),
            },
            schema_url: cell(self.schema_url, row).unwrap_or_default(),
        })
    }
}

fn span_events(decoded: &DecodedBatch) -> Result<FastHashMap<u32, Vec<Event>>, DecodeError> {
    let mut out = FastHashMap::<u32, Vec<Event>>::default();
    let Some(table) = Table::get(decoded, PayloadType::SpanEvents) else {
        return Ok(out);
    };

    let mut attrs = attributes(decoded, PayloadType::SpanEventAttrs)?;
    let ids = table.row_ids()?;
    let parents = table.parent_ids()?;
    let times = table.optional("time_unix_nano", ColumnData::as_u64)?;
    let names = table.optional("name", ColumnData::as_utf8)?;
    let dropped = table.optional("dropped_attributes_count", ColumnData::as_u32)?;

    for (row, parent) in parents.into_iter().enumerate() {
        out.entry(parent).or_default().push(Event {
            time_unix_nano: cell(times, row).unwrap_or_default(),
            name: cell(names, row).unwrap_or_default(),
            attributes: take(&mut attrs, ids[row]),
            dropped_attributes_count: cell(dropped, row).unwrap_or_default(),
        });
    }

    Ok(out)
}

fn span_links(decoded: &DecodedBatch) -> Result<FastHashMap<u32, Vec<Link>>, DecodeError> {
    let mut out = FastHashMap::<u32, Vec<Link>>::default();
    let Some(table) = Table::get(decoded, PayloadType::SpanLinks) else {
        return Ok(out);
    };

    let mut attrs = attributes(decoded, PayloadType::SpanLinkAttrs)?;
    let ids = table.row_ids()?;
    let parents = table.parent_ids()?;
    let trace_ids = table.required("trace_id", ColumnData::as_binary)?;
    let span_ids = table.required("span_id", ColumnData::as_binary)?;
    let trace_states = table.optional("trace_state", ColumnData::as_utf8)?;
    let flags = table.optional("flags", ColumnData::as_u32)?;
    let dropped = table.optional("dropped_attributes_count", ColumnData::as_u32)?;

    for (row, parent) in parents.into_iter().enumerate() {
        let trace_id = cell(Some(trace_ids), row).ok_or_else(|| table.null_value("trace_id"))?;
        let span_id = cell(Some(span_ids), row).ok_or_else(|| table.null_value("span_id"))?;
        out.entry(parent).or_default().push(Link {
            trace_id: fixed(trace_id, "trace_id")?,
            span_id: fixed(span_id, "span_id")?,
            trace_state: cell(trace_states, row).unwrap_or_default(),
            flags: cell(flags, row).unwrap_or_default(),
            attributes: take(&mut attrs, ids[row]),
            dropped_attributes_count: cell(dropped, row).unwrap_or_default(),
        });
    }

    Ok(out)
}

/// Reassembles a traces tree from a decoded batch.
///
/// # Errors
///
/// If the spans table is missing, or any table is inconsistent, an error is returned.
pub fn decode_traces(decoded: &DecodedBatch) -> Result<Traces, DecodeError> {
    let table = Table::main(decoded, PayloadType::Spans)?;
    let entities = EntityColumns::read(&table, decoded)?;
    let mut span_attrs = attributes(decoded, PayloadType::SpanAttrs)?;
    let mut events = span_events(decoded)?;
    let mut links = span_links(decoded)?;

    let ids = table.row_ids()?;
    let start_times = table.required("start_time_unix_nano", ColumnData::as_u64)?;
    let durations = table.required("duration_time_unix_nano", ColumnData::as_i64)?;
    let trace_ids = table.required("trace_id", ColumnData::as_binary)?;
    let span_ids = table.required("span_id", ColumnData::as_binary)?;
    let trace_states = table.optional("trace_state", ColumnData::as_utf8)?;
    let parent_span_ids = table.optional("parent_span_id", ColumnData::as_binary)?;
    let flags = table.optional("flags", ColumnData::as_u32)?;
    let names = table.required("name", ColumnData::as_utf8)?;
    let kinds = table.optional("kind", ColumnData::as_i32)?;
    let dropped_attributes = table.optional("dropped_attributes_count", ColumnData::as_u32)?;
    let dropped_events = table.optional("dropped_events_count", ColumnData::as_u32)?;
    let dropped_links = table.optional("dropped_links_count", ColumnData::as_u32)?;
    let status_codes = table.optional("status.code", ColumnData::as_i32)?;
    let status_messages = table.optional("status.status_message", ColumnData::as_utf8)?;

    let mut traces = Traces::default();
    for (row, id) in ids.into_iter().enumerate() {
        let EntityRow {
            resource,
            resource_schema_url,
            scope,
            schema_url,
        } = entities.row(&table, row)?;

        let start_time_unix_nano = cell(Some(start_times), row).unwrap_or_default();
        let duration = cell(Some(durations), row).unwrap_or_default();
        let trace_id = cell(Some(trace_ids), row).ok_or_else(|| table.null_value("trace_id"))?;
        let span_id = cell(Some(span_ids), row).ok_or_else(|| table.null_value("span_id"))?;
        let span = Span {
            trace_id: fixed(trace_id, "trace_id")?,
            span_id: fixed(span_id, "span_id")?,
            trace_state: cell(trace_states, row).unwrap_or_default(),
            parent_span_id: cell(parent_span_ids, row)
                .map(|id| fixed(id, "parent_span_id"))
                .transpose()?,
            flags: cell(flags, row).unwrap_or_default(),
            name: cell(Some(names), row).unwrap_or_default(),
            kind: cell(kinds, row).map_or(SpanKind::Unspecified, SpanKind::from_i32),
            start_time_unix_nano,
            end_time_unix_nano: start_time_unix_nano.wrapping_add(duration as u64),
            attributes: take(&mut span_attrs, id),
            dropped_attributes_count: cell(dropped_attributes, row).unwrap_or_default(),
            events: take(&mut events, id),
            dropped_events_count: cell(dropped_events, row).unwrap_or_default(),
            links: take(&mut links, id),
            dropped_links_count: cell(dropped_links, row).unwrap_or_default(),
            status: Status {
                code: cell(status_codes, row).map_or(StatusCode::Unset, StatusCode::from_i32),
                message: cell(status_messages, row).unwrap_or_default(),
            },
        };

        let rs = group(
            &mut traces.resource_spans,
            |rs| rs.resource == resource && rs.schema_url == resource_schema_url,
            || ResourceSpans {
                resource: resource.clone(),
                schema_url: resource_schema_url.clone(),
                scope_spans: Vec::new(),
            },
        );
        let ss = group(
            &mut rs.scope_spans,
            |ss| ss.scope == scope && ss.schema_url == schema_url,
            || ScopeSpans {
                scope: scope.clone(),
                schema_url: schema_url.clone(),
                spans: Vec::new(),
            },
        );
        ss.spans.push(span);
    }

    Ok(traces)
}

/// The columns and related tables shared by every data point table.
struct DataPoints<'a> {
    table: Table<'a>,
    ids: Vec<Option<u32>>,
    parents: Vec<u32>,
    start_times: Values<'a, u64>,
    times: &'a [Option<u64>],
    attrs: FastHashMap<u32, Attributes>,
    exemplars: FastHashMap<u32, Vec<Exemplar>>,
}

/// The shared fields of one data point.
struct DataPointRow {
    parent: u32,
    attributes: Attributes,
    start_time_unix_nano: u64,
    time_unix_nano: u64,
    exemplars: Vec<Exemplar>,
}

impl<'a> DataPoints<'a> {
    fn read(
        decoded: &'a DecodedBatch, payload_type: PayloadType, attrs: PayloadType,
        exemplars: Option<(PayloadType, PayloadType)>,
    ) -> Result<Option<Self>, DecodeError> {
        let Some(table) = Table::get(decoded, payload_type) else {
            return Ok(None);
        };

        let exemplars = match exemplars {
            Some((exemplars, attrs)) => self::exemplars(decoded, exemplars, attrs)?,
            None => FastHashMap::default(),
        };
        Ok(Some(Self {
            ids: table.row_ids()?,
            parents: table.parent_ids()?,
            start_times: table.optional("start_time_unix_nano", ColumnData::as_u64)?,
            times: table.required("time_unix_nano", ColumnData::as_u64)?,
            attrs: attributes(decoded, attrs)?,
            exemplars,
            table,
        }))
    }

    fn rows(&self) -> usize {
        self.parents.len()
    }

    fn row(&mut self, row: usize) -> DataPointRow {
        let id = self.ids.get(row).copied().flatten();
        DataPointRow {
            parent: self.parents[row],
            attributes: take(&mut self.attrs, id),
            start_time_unix_nano: cell(self.start_times, row).unwrap_or_default(),
            time_unix_nano: cell(Some(self.times), row).unwrap_or_default(),
            exemplars: take(&mut self.exemplars, id),
        }
    }
}

fn exemplars(
    decoded: &DecodedBatch, payload_type: PayloadType, attrs: PayloadType,
) -> Result<FastHashMap<u32, Vec<Exemplar>>, DecodeError> {
    let mut out = FastHashMap::<u32, Vec<Exemplar>>::default();
    let Some(table) = Table::get(decoded, payload_type) else {
        return Ok(out);
    };

    let mut attrs = attributes(decoded, attrs)?;
    let ids = table.row_ids()?;
    let parents = table.parent_ids()?;
    let times = table.optional("time_unix_nano", ColumnData::as_u64)?;
    let ints = table.optional("int_value", ColumnData::as_i64)?;
    let doubles = table.optional("double_value", ColumnData::as_f64)?;
    let span_ids = table.optional("span_id", ColumnData::as_binary)?;
    let trace_ids = table.optional("trace_id", ColumnData::as_binary)?;

    for (row, parent) in parents.into_iter().enumerate() {
        out.entry(parent).or_default().push(Exemplar {
            filtered_attributes: take(&mut attrs, ids[row]),
            time_unix_nano: cell(times, row).unwrap_or_default(),
            value: number_value(cell(ints, row), cell(doubles, row)),
            span_id: cell(span_ids, row).map(|id| fixed(id, "span_id")).transpose()?,
            trace_id: cell(trace_ids, row).map(|id| fixed(id, "trace_id")).transpose()?,
        });
    }

    Ok(out)
}

fn number_data_points(decoded: &DecodedBatch) -> Result<FastHashMap<u32, Vec<NumberDataPoint>>, DecodeError> {
    let mut out = FastHashMap::<u32, Vec<NumberDataPoint>>::default();
    let Some(mut dps) = DataPoints::read(
        decoded,
        PayloadType::NumberDataPoints,
        PayloadType::NumberDpAttrs,
        Some((PayloadType::NumberDpExemplars, PayloadType::NumberDpExemplarAttrs)),
    )?
    else {
        return Ok(out);
    };

    let ints = dps.table.optional("int_value", ColumnData::as_i64)?;
    let doubles = dps.table.optional("double_value", ColumnData::as_f64)?;
    let flags = dps.table.optional("flags", ColumnData::as_u32)?;

    for row in 0..dps.rows() {
        let common = dps.row(row);
        out.entry(common.parent).or_default().push(NumberDataPoint {
            attributes: common.attributes,
            start_time_unix_nano: common.start_time_unix_nano,
            time_unix_nano: common.time_unix_nano,
            value: number_value(cell(ints, row), cell(doubles, row)),
            exemplars: common.exemplars,
            flags: cell(flags, row).unwrap_or_default(),
        });
    }

    Ok(out)
}

fn histogram_data_points(decoded: &DecodedBatch) -> Result<FastHashMap<u32, Vec<HistogramDataPoint>>, DecodeError> {
    let mut out = FastHashMap::<u32, Vec<HistogramDataPoint>>::default();
    let Some(mut dps) = DataPoints::read(
        decoded,
        PayloadType::HistogramDataPoints,
        PayloadType::HistogramDpAttrs,
        Some((PayloadType::HistogramDpExemplars, PayloadType::HistogramDpExemplarAttrs)),
    )?
    else {
        return Ok(out);
    };

    let counts = dps.table.required("count", ColumnData::as_u64)?;
    let sums = dps.table.optional("sum", ColumnData::as_f64)?;
    let bucket_counts = dps.table.optional("bucket_counts", ColumnData::as_list_u64)?;
    let explicit_bounds = dps.table.optional("explicit_bounds", ColumnData::as_list_f64)?;
    let flags = dps.table.optional("flags", ColumnData::as_u32)?;
    let mins = dps.table.optional("min", ColumnData::as_f64)?;
    let maxes = dps.table.optional("max", ColumnData::as_f64)?;

    for row in 0..dps.rows() {
        let common = dps.row(row);
        out.entry(common.parent).or_default().push(HistogramDataPoint {
            attributes: common.attributes,
            start_time_unix_nano: common.start_time_unix_nano,
            time_unix_nano: common.time_unix_nano,
            count: cell(Some(counts), row).unwrap_or_default(),
            sum: cell(sums, row),
            bucket_counts: cell(bucket_counts, row).unwrap_or_default(),
            explicit_bounds: cell(explicit_bounds, row).unwrap_or_default(),
            exemplars: common.exemplars,
            flags: cell(flags, row).unwrap_or_default(),
            min: cell(mins, row),
            max: cell(maxes, row),
        });
    }

    Ok(out)
}

fn exp_histogram_data_points(
    decoded: &DecodedBatch,
) -> Result<FastHashMap<u32, Vec<ExponentialHistogramDataPoint>>, DecodeError> {
    let mut out = FastHashMap::<u32, Vec<ExponentialHistogramDataPoint>>::default();
    let Some(mut dps) = DataPoints::read(
        decoded,
        PayloadType::ExpHistogramDataPoints,
        PayloadType::ExpHistogramDpAttrs,
        Some((
            PayloadType::ExpHistogramDpExemplars,
            PayloadType::ExpHistogramDpExemplarAttrs,
        )),
    )?
    else {
        return Ok(out);
    };

    let counts = dps.table.required("count", ColumnData::as_u64)?;
    let sums = dps.table.optional("sum", ColumnData::as_f64)?;
    let scales = dps.table.optional("scale", ColumnData::as_i32)?;
    let zero_counts = dps.table.optional("zero_count", ColumnData::as_u64)?;
    let positive_offsets = dps.table.optional("positive_offset", ColumnData::as_i32)?;
    let positive_counts = dps.table.optional("positive_bucket_counts", ColumnData::as_list_u64)?;
    let negative_offsets = dps.table.optional("negative_offset", ColumnData::as_i32)?;
    let negative_counts = dps.table.optional("negative_bucket_counts", ColumnData::as_list_u64)?;
    let flags = dps.table.optional("flags", ColumnData::as_u32)?;
    let mins = dps.table.optional("min", ColumnData::as_f64)?;
    let maxes = dps.table.optional("max", ColumnData::as_f64)?;
    let zero_thresholds = dps.table.optional("zero_threshold", ColumnData::as_f64)?;

    for row in 0..dps.rows() {
        let common = dps.row(row);
        out.entry(common.parent).or_default().push(ExponentialHistogramDataPoint {
            attributes: common.attributes,
            start_time_unix_nano: common.start_time_unix_nano,
            time_unix_nano: common.time_unix_nano,
            count: cell(Some(counts), row).unwrap_or_default(),
            sum: cell(sums, row),
            scale: cell(scales, row).unwrap_or_default(),
            zero_count: cell(zero_counts, row).unwrap_or_default(),
            positive: Buckets {
                offset: cell(positive_offsets, row).unwrap_or_default(),
                bucket_counts: cell(positive_counts, row).unwrap_or_default(),
            },
            negative: Buckets {
                offset: cell(negative_offsets, row).unwrap_or_default(),
                bucket_counts: cell(negative_counts, row).unwrap_or_default(),
            },
            flags: cell(flags, row).unwrap_or_default(),
            exemplars: common.exemplars,
            min: cell(mins, row),
            max: cell(maxes, row),
            zero_threshold: cell(zero_thresholds, row).unwrap_or_default(),
        });
    }

    Ok(out)
}

fn summary_data_points(decoded: &DecodedBatch) -> Result<FastHashMap<u32, Vec<SummaryDataPoint>>, DecodeError> {
    let mut out = FastHashMap::<u32, Vec<SummaryDataPoint>>::default();
    let Some(mut dps) = DataPoints::read(
        decoded,
        PayloadType::SummaryDataPoints,
        PayloadType::SummaryDpAttrs,
        None,
    )?
    else {
        return Ok(out);
    };

    let counts = dps.table.required("count", ColumnData::as_u64)?;
    let sums = dps.table.required("sum", ColumnData::as_f64)?;
    let quantiles = dps.table.optional("quantile", ColumnData::as_list_f64)?;
    let values = dps.table.optional("value", ColumnData::as_list_f64)?;
    let flags = dps.table.optional("flags", ColumnData::as_u32)?;

    for row in 0..dps.rows() {
        let quantile = cell(quantiles, row).unwrap_or_default();
        let value = cell(values, row).unwrap_or_default();
        if quantile.len() != value.len() {
            return Err(DecodeError::InvalidMessage {
                reason: format!(
                    "summary data point has {} quantiles but {} values",
                    quantile.len(),
                    value.len()
                ),
            });
        }

        let common = dps.row(row);
        out.entry(common.parent).or_default().push(SummaryDataPoint {
            attributes: common.attributes,
            start_time_unix_nano: common.start_time_unix_nano,
            time_unix_nano: common.time_unix_nano,
            count: cell(Some(counts), row).unwrap_or_default(),
            sum: cell(Some(sums), row).unwrap_or_default(),
            quantile_values: quantile
                .into_iter()
                .zip(value)
                .map(|(quantile, value)| ValueAtQuantile { quantile, value })
                .collect(),
            flags: cell(flags, row).unwrap_or_default(),
        });
    }

    Ok(out)
}

/// Reassembles a metrics tree from a decoded batch.
///
/// # Errors
///
/// If the metrics table is missing, or any table is inconsistent, an error is returned.
pub fn decode_metrics(decoded: &DecodedBatch) -> Result<Metrics, DecodeError> {
    let table = Table::main(decoded, PayloadType::Metrics)?;
    let entities = EntityColumns::read(&table, decoded)?;
    let mut number = number_data_points(decoded)?;
    let mut histogram = histogram_data_points(decoded)?;
    let mut exp_histogram = exp_histogram_data_points(decoded)?;
    let mut summary = summary_data_points(decoded)?;

    let ids = table.row_ids()?;
    let metric_types = table.required("metric_type", ColumnData::as_u8)?;
    let names = table.required("name", ColumnData::as_utf8)?;
    let descriptions = table.optional("description", ColumnData::as_utf8)?;
    let units = table.optional("unit", ColumnData::as_utf8)?;
    let temporalities = table.optional("aggregation_temporality", ColumnData::as_i32)?;
    let monotonic = table.optional("is_monotonic", ColumnData::as_bool)?;

    let mut metrics = Metrics::default();
    for (row, id) in ids.into_iter().enumerate() {
        let EntityRow {
            resource,
            resource_schema_url,
            scope,
            schema_url,
        } = entities.row(&table, row)?;

        let tag = cell(Some(metric_types), row).ok_or_else(|| table.null_value("metric_type"))?;
        let metric_type = MetricType::from_u8(tag).ok_or(DecodeError::UnknownCode {
            what: "metric type",
            code: u64::from(tag),
        })?;
        let aggregation_temporality =
            AggregationTemporality::from_i32(cell(temporalities, row).unwrap_or_default());
        let data = match metric_type {
            MetricType::Empty => MetricData::Empty,
            MetricType::Gauge => MetricData::Gauge {
                data_points: take(&mut number, id),
            },
            MetricType::Sum => MetricData::Sum {
                data_points: take(&mut number, id),
                aggregation_temporality,
                is_monotonic: cell(monotonic, row).unwrap_or_default(),
            },
            MetricType::Histogram => MetricData::Histogram {
                data_points: take(&mut histogram, id),
                aggregation_temporality,
            },
            MetricType::ExponentialHistogram => MetricData::ExponentialHistogram {
                data_points: take(&mut exp_histogram, id),
                aggregation_temporality,
            },
            MetricType::Summary => MetricData::Summary {
                data_points: take(&mut summary, id),
            },
        };
        let metric = Metric {
            name: cell(Some(names), row).unwrap_or_default(),
            description: cell(descriptions, row).unwrap_or_default(),
            unit: cell(units, row).unwrap_or_default(),
            data,
        };

        let rm = group(
            &mut metrics.resource_metrics,
            |rm| rm.resource == resource && rm.schema_url == resource_schema_url,
            || ResourceMetrics {
                resource: resource.clone(),
                schema_url: resource_schema_url.clone(),
                scope_metrics: Vec::new(),
            },
        );
        let sm = group(
            &mut rm.scope_metrics,
            |sm| sm.scope == scope && sm.schema_url == schema_url,
            || ScopeMetrics {
                scope: scope.clone(),
                schema_url: schema_url.clone(),
                metrics: Vec::new(),
            },
        );
        sm.metrics.push(metric);
    }

    Ok(metrics)
}

#[cfg(test)]
mod tests {
    use strata_model::TelemetryKind;

    use super::*;
    use crate::{
        config::{DictionaryPolicy, EncoderConfig},
        metrics::MetricsEncoder,
        optimizer::SortPolicy,
        producer::TelemetryEncoder as _,
        stream::{StreamConsumer, StreamProducer},
        traces::TracesEncoder,
    };

    fn round_trip(records: Vec<(PayloadType, RecordBatch)>) -> DecodedBatch {
        let mut producer = StreamProducer::new(TelemetryKind::Traces, DictionaryPolicy::Incremental);
        let envelope = producer.produce(&records).unwrap();
        StreamConsumer::new().consume_envelope(&envelope).unwrap()
    }

    #[test]
    fn spans_with_related_data() {
        let span = Span {
            trace_id: [7; 16],
            span_id: [8; 8],
            parent_span_id: Some([9; 8]),
            name: "GET /".into(),
            kind: SpanKind::Server,
            start_time_unix_nano: 100,
            end_time_unix_nano: 250,
            attributes: vec![
                KeyValue::new("http.status_code", 200i64),
                KeyValue::new("tags", AnyValue::Array(vec![AnyValue::Str("a".into()), AnyValue::Bool(true)])),
            ],
            events: vec![Event {
                time_unix_nano: 120,
                name: "retry".into(),
                attributes: vec![KeyValue::new("attempt", 2i64)],
                ..Default::default()
            }],
            links: vec![Link {
                trace_id: [1; 16],
                span_id: [2; 8],
                trace_state: "k=v".into(),
                ..Default::default()
            }],
            status: Status {
                code: StatusCode::Ok,
                message: String::new(),
            },
            ..Default::default()
        };
        let traces = Traces {
            resource_spans: vec![ResourceSpans {
                resource: Resource::from_attributes(vec![KeyValue::new("service.name", "web")]),
                schema_url: "https://opentelemetry.io/schemas/1.21.0".into(),
                scope_spans: vec![ScopeSpans {
                    scope: Scope::new("http", "0.9"),
                    schema_url: String::new(),
                    spans: vec![span],
                }],
            }],
        };

        let encoded = TracesEncoder::new(&EncoderConfig::default()).encode(&traces).unwrap();
        let decoded = decode_traces(&round_trip(encoded.records)).unwrap();
        assert_eq!(decoded, traces);
    }

    #[test]
    fn metrics_of_every_type() {
        let exemplar = Exemplar {
            filtered_attributes: vec![KeyValue::new("sampled", true)],
            time_unix_nano: 5,
            value: NumberValue::Double(0.25),
            span_id: Some([3; 8]),
            trace_id: None,
        };
        let metrics = vec![
            Metric {
                name: "requests".into(),
                unit: "1".into(),
                data: MetricData::Sum {
                    data_points: vec![NumberDataPoint {
                        time_unix_nano: 10,
                        value: NumberValue::Int(42),
                        exemplars: vec![exemplar],
                        ..Default::default()
                    }],
                    aggregation_temporality: AggregationTemporality::Delta,
                    is_monotonic: true,
                },
                ..Default::default()
            },
            Metric {
                name: "latency".into(),
                description: "request latency".into(),
                data: MetricData::Histogram {
                    data_points: vec![HistogramDataPoint {
                        time_unix_nano: 10,
                        count: 3,
                        sum: Some(0.6),
                        bucket_counts: vec![1, 2],
                        explicit_bounds: vec![0.1],
                        min: Some(0.05),
                        ..Default::default()
                    }],
                    aggregation_temporality: AggregationTemporality::Cumulative,
                },
                ..Default::default()
            },
            Metric {
                name: "sizes".into(),
                data: MetricData::ExponentialHistogram {
                    data_points: vec![ExponentialHistogramDataPoint {
                        time_unix_nano: 10,
                        count: 4,
                        scale: -2,
                        zero_count: 1,
                        positive: Buckets {
                            offset: -1,
                            bucket_counts: vec![1, 2],
                        },
                        zero_threshold: 0.001,
                        ..Default::default()
                    }],
                    aggregation_temporality: AggregationTemporality::Delta,
                },
                ..Default::default()
            },
            Metric {
                name: "quantiles".into(),
                data: MetricData::Summary {
                    data_points: vec![SummaryDataPoint {
                        time_unix_nano: 10,
                        count: 2,
                        sum: 3.0,
                        quantile_values: vec![ValueAtQuantile {
                            quantile: 0.5,
                            value: 1.5,
                        }],
                        attributes: vec![KeyValue::new("route", "/")],
                        ..Default::default()
                    }],
                },
                ..Default::default()
            },
            Metric {
                name: "nothing".into(),
                ..Default::default()
            },
        ];
        let input = Metrics {
            resource_metrics: vec![ResourceMetrics {
                resource: Resource::default(),
                schema_url: String::new(),
                scope_metrics: vec![ScopeMetrics {
                    scope: Scope::new("meter", "1"),
                    schema_url: String::new(),
                    metrics,
                }],
            }],
        };

        let config = EncoderConfig {
            sort_policy: SortPolicy::None,
            ..Default::default()
        };
        let encoded = MetricsEncoder::new(&config).encode(&input).unwrap();
        let decoded = decode_metrics(&round_trip(encoded.records)).unwrap();
        assert_eq!(decoded, input);
    }

    #[test]
    fn missing_main_table() {
        let decoded = DecodedBatch {
            batch_id: 0,
            tables: Vec::new(),
        };
        assert!(matches!(
            decode_traces(&decoded),
            Err(DecodeError::Missing { what: "table", .. })
        ));
    }
}
