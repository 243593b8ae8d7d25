//! Traces encoding.
use strata_model::{
    trace::{Span, SpanKind, StatusCode},
    TelemetryKind, Traces,
};
use tracing::debug;

use crate::{
    column::{
        builder::{BinaryBuilder, PrimitiveBuilder, StringBuilder},
        DataType, FieldDef, RecordBatch, SchemaDef,
    },
    config::EncoderConfig,
    error::{BuildError, EncodeError},
    optimizer::{optimize_traces, Flattened, Row, SortPolicy},
    producer::{EncodedBatch, TelemetryEncoder},
    record::{assemble_with_retry, TableSet},
    related::{
        attributes::{RESOURCE_ATTRS, SCOPE_ATTRS, SPAN_ATTRS, SPAN_EVENT_ATTRS, SPAN_LINK_ATTRS},
        events::SPAN_EVENTS,
        links::SPAN_LINKS,
        Accumulator, AttributesBuilder, EventsBuilder, FinishedTable, IdAllocator, LinksBuilder,
    },
    resource_scope::{resource_scope_fields, ResourceScopeColumns},
    stream::PayloadType,
};

/// Spans, one row per span.
pub static SPANS: SchemaDef = SchemaDef {
    name: "spans",
    fields: resource_scope_fields![
        FieldDef::required("start_time_unix_nano", DataType::UInt64).delta(),
        FieldDef::required("duration_time_unix_nano", DataType::Int64),
        FieldDef::required("trace_id", DataType::Binary),
        FieldDef::required("span_id", DataType::Binary),
        FieldDef::optional("trace_state", DataType::Utf8).dictionary(),
        FieldDef::optional("parent_span_id", DataType::Binary),
        FieldDef::optional("flags", DataType::UInt32),
        FieldDef::required("name", DataType::Utf8).dictionary(),
        FieldDef::optional("kind", DataType::Int32),
        FieldDef::optional("dropped_attributes_count", DataType::UInt32),
        FieldDef::optional("dropped_events_count", DataType::UInt32),
        FieldDef::optional("dropped_links_count", DataType::UInt32),
        FieldDef::optional("status.code", DataType::Int32),
        FieldDef::optional("status.status_message", DataType::Utf8).dictionary(),
    ],
};

fn tables() -> [(PayloadType, &'static SchemaDef); 8] {
    [
        (PayloadType::Spans, &SPANS),
        (PayloadType::ResourceAttrs, &RESOURCE_ATTRS),
        (PayloadType::ScopeAttrs, &SCOPE_ATTRS),
        (PayloadType::SpanAttrs, &SPAN_ATTRS),
        (PayloadType::SpanEvents, &SPAN_EVENTS),
        (PayloadType::SpanEventAttrs, &SPAN_EVENT_ATTRS),
        (PayloadType::SpanLinks, &SPAN_LINKS),
        (PayloadType::SpanLinkAttrs, &SPAN_LINK_ATTRS),
    ]
}

/// Encodes traces into the spans table and its related tables.
///
/// Spans with attributes, events or links get an ID, which keys their rows in the related tables. Spans without related
/// data carry a null ID.
pub struct TracesEncoder {
    sort_policy: SortPolicy,
    tables: TableSet,
    span_ids: IdAllocator<u16>,
    entities: ResourceScopeColumns,
    id: PrimitiveBuilder<u16>,
    start_time_unix_nano: PrimitiveBuilder<u64>,
    duration_time_unix_nano: PrimitiveBuilder<i64>,
    trace_id: BinaryBuilder,
    span_id: BinaryBuilder,
    trace_state: StringBuilder,
    parent_span_id: BinaryBuilder,
    flags: PrimitiveBuilder<u32>,
    name: StringBuilder,
    kind: PrimitiveBuilder<i32>,
    dropped_attributes_count: PrimitiveBuilder<u32>,
    dropped_events_count: PrimitiveBuilder<u32>,
    dropped_links_count: PrimitiveBuilder<u32>,
    status_code: PrimitiveBuilder<i32>,
    status_message: StringBuilder,
    attrs: AttributesBuilder<u16>,
    events: EventsBuilder,
    links: LinksBuilder,
}

impl TracesEncoder {
    /// Creates a new `TracesEncoder`.
    pub fn new(config: &EncoderConfig) -> Self {
        Self {
            sort_policy: config.sort_policy,
            tables: TableSet::new(&tables(), config),
            span_ids: IdAllocator::new("span"),
            entities: ResourceScopeColumns::new(config.dedup),
            id: PrimitiveBuilder::new(),
            start_time_unix_nano: PrimitiveBuilder::new(),
            duration_time_unix_nano: PrimitiveBuilder::new(),
            trace_id: BinaryBuilder::new(),
            span_id: BinaryBuilder::new(),
            trace_state: StringBuilder::new(),
            parent_span_id: BinaryBuilder::new(),
            flags: PrimitiveBuilder::new(),
            name: StringBuilder::new(),
            kind: PrimitiveBuilder::new(),
            dropped_attributes_count: PrimitiveBuilder::new(),
            dropped_events_count: PrimitiveBuilder::new(),
            dropped_links_count: PrimitiveBuilder::new(),
            status_code: PrimitiveBuilder::new(),
            status_message: StringBuilder::new(),
            attrs: AttributesBuilder::new(&SPAN_ATTRS),
            events: EventsBuilder::new(),
            links: LinksBuilder::new(),
        }
    }

    fn reset(&mut self) {
        self.span_ids.reset();
        self.entities.reset();
        self.id.reset();
        self.start_time_unix_nano.reset();
        self.duration_time_unix_nano.reset();
        self.trace_id.reset();
        self.span_id.reset();
        self.trace_state.reset();
        self.parent_span_id.reset();
        self.flags.reset();
        self.name.reset();
        self.kind.reset();
        self.dropped_attributes_count.reset();
        self.dropped_events_count.reset();
        self.dropped_links_count.reset();
        self.status_code.reset();
        self.status_message.reset();
        self.attrs.reset();
        self.events.reset();
        self.links.reset();
    }

    fn append(
        &mut self, flattened: &Flattened<'_, Span>, row: &Row<'_, Span>,
    ) -> Result<(), EncodeError> {
        let span = row.item;
        self.entities
            .append(flattened.resource_of(row), flattened.scope_of(row))?;

        if span.has_related_data() {
            let id = self.span_ids.allocate()?;
            if !span.attributes.is_empty() {
                self.attrs.append_with_id(id, &span.attributes)?;
            }
            if !span.events.is_empty() {
                self.events.append_with_id(id, &span.events)?;
            }
            if !span.links.is_empty() {
                self.links.append_with_id(id, &span.links)?;
            }
            self.id.append(id);
        } else {
            self.id.append_null();
        }

        self.start_time_unix_nano.append(span.start_time_unix_nano);
        self.duration_time_unix_nano
            .append(span.end_time_unix_nano.wrapping_sub(span.start_time_unix_nano) as i64);
        self.trace_id.append(&span.trace_id);
        self.span_id.append(&span.span_id);
        self.trace_state.append_non_empty(&span.trace_state);
        self.parent_span_id
            .append_option(span.parent_span_id.as_ref().map(|id| id.as_slice()));
        self.flags.append_non_zero(span.flags);
        self.name.append(&span.name);
        if span.kind == SpanKind::Unspecified {
            self.kind.append_null();
        } else {
            self.kind.append(span.kind.as_i32());
        }
        self.dropped_attributes_count
            .append_non_zero(span.dropped_attributes_count);
        self.dropped_events_count.append_non_zero(span.dropped_events_count);
        self.dropped_links_count.append_non_zero(span.dropped_links_count);
        if span.status.code == StatusCode::Unset {
            self.status_code.append_null();
        } else {
            self.status_code.append(span.status.code.as_i32());
        }
        self.status_message.append_non_empty(&span.status.message);
        Ok(())
    }

    fn build(&mut self) -> Result<Vec<(PayloadType, RecordBatch)>, BuildError> {
        let mut columns = Vec::with_capacity(SPANS.fields.len());
        columns.push(self.id.finish());
        columns.extend(self.entities.finish_columns());
        columns.extend([
            self.start_time_unix_nano.finish(),
            self.duration_time_unix_nano.finish(),
            self.trace_id.finish(),
            self.span_id.finish(),
            self.trace_state.finish(),
            self.parent_span_id.finish(),
            self.flags.finish(),
            self.name.finish(),
            self.kind.finish(),
            self.dropped_attributes_count.finish(),
            self.dropped_events_count.finish(),
            self.dropped_links_count.finish(),
            self.status_code.finish(),
            self.status_message.finish(),
        ]);
        self.span_ids.reset();

        let mut finished = Vec::with_capacity(8);
        finished.push(FinishedTable { def: &SPANS, columns });
        self.entities.finish(&mut finished);
        self.attrs.finish(&mut finished);
        self.events.finish(&mut finished);
        self.links.finish(&mut finished);
        self.tables.assemble(finished)
    }
}

impl TelemetryEncoder for TracesEncoder {
    type Input = Traces;

    const KIND: TelemetryKind = TelemetryKind::Traces;

    fn from_config(config: &EncoderConfig) -> Self {
        Self::new(config)
    }

    fn encode(&mut self, traces: &Traces) -> Result<EncodedBatch, EncodeError> {
        let flattened = optimize_traces(traces, self.sort_policy);

        let mut entities = (0, 0);
        let (records, retries) = assemble_with_retry(SPANS.name, || {
            self.reset();
            for row in &flattened.rows {
                self.append(&flattened, row)?;
            }
            entities = self.entities.allocated();
            self.build()
        })?;

        debug!(
            spans = flattened.rows.len(),
            resources = entities.0,
            scopes = entities.1,
            tables = records.len(),
            retries,
            "Encoded traces."
        );

        Ok(EncodedBatch {
            records,
            rows: flattened.rows.len(),
            retries,
        })
    }
}

#[cfg(test)]
mod tests {
    use strata_model::{
        trace::{Event, Link, ResourceSpans, ScopeSpans, Span, Status},
        KeyValue, Resource, Scope,
    };

    use super::*;
    use crate::column::ColumnData;

    fn traces(spans: Vec<Span>) -> Traces {
        Traces {
            resource_spans: vec![ResourceSpans {
                resource: Resource::from_attributes(vec![KeyValue::new("service.name", "checkout")]),
                schema_url: String::new(),
                scope_spans: vec![ScopeSpans {
                    scope: Scope::new("tracer", "1.2"),
                    schema_url: String::new(),
                    spans,
                }],
            }],
        }
    }

    fn span(name: &str, start: u64) -> Span {
        Span {
            trace_id: [1; 16],
            span_id: [2; 8],
            name: name.into(),
            start_time_unix_nano: start,
            end_time_unix_nano: start + 10,
            ..Default::default()
        }
    }

    fn encoder(sort_policy: SortPolicy) -> TracesEncoder {
        TracesEncoder::new(&EncoderConfig {
            sort_policy,
            ..Default::default()
        })
    }

    #[test]
    fn ids_only_for_spans_with_related_data() {
        let mut with_attrs = span("b", 100);
        with_attrs.attributes = vec![KeyValue::new("http.method", "GET")];
        let mut with_event = span("c", 200);
        with_event.events = vec![Event {
            name: "exception".into(),
            ..Default::default()
        }];

        let mut encoder = encoder(SortPolicy::None);
        let encoded = encoder
            .encode(&traces(vec![span("a", 50), with_attrs, with_event]))
            .unwrap();
        assert_eq!(encoded.rows, 3);

        let (payload_type, spans) = &encoded.records[0];
        assert_eq!(*payload_type, PayloadType::Spans);
        assert_eq!(spans.column("id"), Some(&ColumnData::UInt16(vec![None, Some(0), Some(1)])));
        assert_eq!(
            spans.column("duration_time_unix_nano"),
            Some(&ColumnData::Int64(vec![Some(10); 3]))
        );

        let types = encoded.records.iter().map(|(pt, _)| *pt).collect::<Vec<_>>();
        assert_eq!(
            types,
            [
                PayloadType::Spans,
                PayloadType::ResourceAttrs,
                PayloadType::SpanAttrs,
                PayloadType::SpanEvents
            ]
        );
    }

    #[test]
    fn optional_columns_join_through_retry() {
        let mut encoder = encoder(SortPolicy::None);

        // Scope name and version join the schema.
        let first = encoder.encode(&traces(vec![span("a", 1)])).unwrap();
        assert_eq!(first.retries, 1);
        assert!(first.records[0].1.column("status.code").is_none());

        let mut failed = span("b", 2);
        failed.status = Status {
            code: StatusCode::Error,
            message: "boom".into(),
        };
        failed.links = vec![Link {
            trace_id: [3; 16],
            span_id: [4; 8],
            ..Default::default()
        }];
        let second = encoder.encode(&traces(vec![failed])).unwrap();
        assert_eq!(second.retries, 1);
        assert_eq!(
            second.records[0].1.column("status.code"),
            Some(&ColumnData::Int32(vec![Some(StatusCode::Error.as_i32())]))
        );
        assert!(second.records.iter().any(|(pt, _)| *pt == PayloadType::SpanLinks));
    }

    #[test]
    fn empty_input_still_produces_main_table() {
        let mut encoder = encoder(SortPolicy::ByResourceScopeName);
        let encoded = encoder.encode(&Traces::default()).unwrap();
        assert_eq!(encoded.rows, 0);
        assert_eq!(encoded.records.len(), 1);
        assert_eq!(encoded.records[0].1.num_rows(), 0);
    }
}
