//! Span link side tables.
use strata_model::trace::Link;

use super::{
    attributes::{AttributesBuilder, SPAN_LINK_ATTRS},
    Accumulator, FinishedTable, IdAllocator, OwnerOrder,
};
use crate::{
    column::{
        builder::{BinaryBuilder, PrimitiveBuilder, StringBuilder},
        DataType, FieldDef, SchemaDef,
    },
    error::EncodeError,
};

/// Span links, keyed by span ID.
pub static SPAN_LINKS: SchemaDef = SchemaDef {
    name: "span_links",
    fields: &[
        FieldDef::optional("id", DataType::UInt32).delta(),
        FieldDef::required("parent_id", DataType::UInt16).delta(),
        FieldDef::required("trace_id", DataType::Binary),
        FieldDef::required("span_id", DataType::Binary),
        FieldDef::optional("trace_state", DataType::Utf8).dictionary(),
        FieldDef::optional("flags", DataType::UInt32),
        FieldDef::optional("dropped_attributes_count", DataType::UInt32),
    ],
};

/// Accumulates span links and their attributes.
pub struct LinksBuilder {
    ids: IdAllocator<u32>,
    order: OwnerOrder<u16>,
    id: PrimitiveBuilder<u32>,
    parent_id: PrimitiveBuilder<u16>,
    trace_id: BinaryBuilder,
    span_id: BinaryBuilder,
    trace_state: StringBuilder,
    flags: PrimitiveBuilder<u32>,
    dropped_attributes_count: PrimitiveBuilder<u32>,
    attrs: AttributesBuilder<u32>,
}

impl LinksBuilder {
    /// Creates a new, empty `LinksBuilder`.
    pub fn new() -> Self {
        Self {
            ids: IdAllocator::new("link"),
            order: OwnerOrder::new(SPAN_LINKS.name),
            id: PrimitiveBuilder::new(),
            parent_id: PrimitiveBuilder::new(),
            trace_id: BinaryBuilder::new(),
            span_id: BinaryBuilder::new(),
            trace_state: StringBuilder::new(),
            flags: PrimitiveBuilder::new(),
            dropped_attributes_count: PrimitiveBuilder::new(),
            attrs: AttributesBuilder::new(&SPAN_LINK_ATTRS),
        }
    }

    /// Returns the number of link rows appended.
    pub fn len(&self) -> usize {
        self.parent_id.len()
    }

    /// Returns `true` if no links have been appended.
    pub fn is_empty(&self) -> bool {
        self.parent_id.is_empty()
    }

    /// Appends the links of the span identified by `parent_id`.
    ///
    /// # Errors
    ///
    /// If `links` is empty or `parent_id` is lower than the previous span's, an `AppendMismatch` error is returned. If
    /// the link ID space is exhausted, a `CapacityExceeded` error is returned.
    pub fn append_with_id(&mut self, parent_id: u16, links: &[Link]) -> Result<(), EncodeError> {
        self.order.check(parent_id, links.len())?;

        for link in links {
            if link.attributes.is_empty() {
                self.id.append_null();
            } else {
                let id = self.ids.allocate()?;
                self.attrs.append_with_id(id, &link.attributes)?;
                self.id.append(id);
            }

            self.parent_id.append(parent_id);
            self.trace_id.append(&link.trace_id);
            self.span_id.append(&link.span_id);
            self.trace_state.append_non_empty(&link.trace_state);
            self.flags.append_non_zero(link.flags);
            self.dropped_attributes_count
                .append_non_zero(link.dropped_attributes_count);
        }

        Ok(())
    }
}

impl Accumulator for LinksBuilder {
    fn reset(&mut self) {
        self.ids.reset();
        self.order.reset();
        self.id.reset();
        self.parent_id.reset();
        self.trace_id.reset();
        self.span_id.reset();
        self.trace_state.reset();
        self.flags.reset();
        self.dropped_attributes_count.reset();
        self.attrs.reset();
    }

    fn finish(&mut self, out: &mut Vec<FinishedTable>) {
        self.ids.reset();
        self.order.reset();
        out.push(FinishedTable {
            def: &SPAN_LINKS,
            columns: vec![
                self.id.finish(),
                self.parent_id.finish(),
                self.trace_id.finish(),
                self.span_id.finish(),
                self.trace_state.finish(),
                self.flags.finish(),
                self.dropped_attributes_count.finish(),
            ],
        });
        self.attrs.finish(out);
    }
}
