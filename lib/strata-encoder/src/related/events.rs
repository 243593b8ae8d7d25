//! Span event side tables.
use strata_model::trace::Event;

use super::{
    attributes::{AttributesBuilder, SPAN_EVENT_ATTRS},
    Accumulator, FinishedTable, IdAllocator, OwnerOrder,
};
use crate::{
    column::{
        builder::{PrimitiveBuilder, StringBuilder},
        DataType, FieldDef, SchemaDef,
    },
    error::EncodeError,
};

/// Span events, keyed by span ID.
pub static SPAN_EVENTS: SchemaDef = SchemaDef {
    name: "span_events",
    fields: &[
        FieldDef::optional("id", DataType::UInt32).delta(),
        FieldDef::required("parent_id", DataType::UInt16).delta(),
        FieldDef::optional("time_unix_nano", DataType::UInt64),
        FieldDef::optional("name", DataType::Utf8).dictionary(),
        FieldDef::optional("dropped_attributes_count", DataType::UInt32),
    ],
};

/// Accumulates span events and their attributes.
pub struct EventsBuilder {
    ids: IdAllocator<u32>,
    order: OwnerOrder<u16>,
    id: PrimitiveBuilder<u32>,
    parent_id: PrimitiveBuilder<u16>,
    time_unix_nano: PrimitiveBuilder<u64>,
    name: StringBuilder,
    dropped_attributes_count: PrimitiveBuilder<u32>,
    attrs: AttributesBuilder<u32>,
}

impl EventsBuilder {
    /// Creates a new, empty `EventsBuilder`.
    pub fn new() -> Self {
        Self {
            ids: IdAllocator::new("event"),
            order: OwnerOrder::new(SPAN_EVENTS.name),
            id: PrimitiveBuilder::new(),
            parent_id: PrimitiveBuilder::new(),
            time_unix_nano: PrimitiveBuilder::new(),
            name: StringBuilder::new(),
            dropped_attributes_count: PrimitiveBuilder::new(),
            attrs: AttributesBuilder::new(&SPAN_EVENT_ATTRS),
        }
    }

    /// Returns the number of event rows appended.
    pub fn len(&self) -> usize {
        self.parent_id.len()
    }

    /// Returns `true` if no events have been appended.
    pub fn is_empty(&self) -> bool {
        self.parent_id.is_empty()
    }

    /// Appends the events of the span identified by `parent_id`.
    ///
    /// # Errors
    ///
    /// If `events` is empty or `parent_id` is lower than the previous span's, an `AppendMismatch` error is returned. If
    /// the event ID space is exhausted, a `CapacityExceeded` error is returned.
    pub fn append_with_id(&mut self, parent_id: u16, events: &[Event]) -> Result<(), EncodeError> {
        self.order.check(parent_id, events.len())?;

        for event in events {
            if event.attributes.is_empty() {
                self.id.append_null();
            } else {
                let id = self.ids.allocate()?;
                self.attrs.append_with_id(id, &event.attributes)?;
                self.id.append(id);
            }

            self.parent_id.append(parent_id);
            self.time_unix_nano.append_non_zero(event.time_unix_nano);
            self.name.append_non_empty(&event.name);
            self.dropped_attributes_count
                .append_non_zero(event.dropped_attributes_count);
        }

        Ok(())
    }
}

impl Accumulator for EventsBuilder {
    fn reset(&mut self) {
        self.ids.reset();
        self.order.reset();
        self.id.reset();
        self.parent_id.reset();
        self.time_unix_nano.reset();
        self.name.reset();
        self.dropped_attributes_count.reset();
        self.attrs.reset();
    }

    fn finish(&mut self, out: &mut Vec<FinishedTable>) {
        self.ids.reset();
        self.order.reset();
        out.push(FinishedTable {
            def: &SPAN_EVENTS,
            columns: vec![
                self.id.finish(),
                self.parent_id.finish(),
                self.time_unix_nano.finish(),
                self.name.finish(),
                self.dropped_attributes_count.finish(),
            ],
        });
        self.attrs.finish(out);
    }
}
