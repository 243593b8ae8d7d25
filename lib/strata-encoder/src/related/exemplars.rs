//! Exemplar side tables.
use strata_model::metric::{Exemplar, NumberValue};

use super::{
    attributes::{
        AttributesBuilder, EXP_HISTOGRAM_DP_EXEMPLAR_ATTRS, HISTOGRAM_DP_EXEMPLAR_ATTRS, NUMBER_DP_EXEMPLAR_ATTRS,
    },
    Accumulator, FinishedTable, IdAllocator, OwnerOrder,
};
use crate::{
    column::{
        builder::{BinaryBuilder, PrimitiveBuilder},
        DataType, FieldDef, SchemaDef,
    },
    error::EncodeError,
};

const EXEMPLAR_FIELDS: &[FieldDef] = &[
    FieldDef::optional("id", DataType::UInt32).delta(),
    FieldDef::required("parent_id", DataType::UInt32).delta(),
    FieldDef::optional("time_unix_nano", DataType::UInt64),
    FieldDef::optional("int_value", DataType::Int64),
    FieldDef::optional("double_value", DataType::Float64),
    FieldDef::optional("span_id", DataType::Binary),
    FieldDef::optional("trace_id", DataType::Binary),
];

/// Number data point exemplars, keyed by data point ID.
pub static NUMBER_DP_EXEMPLARS: SchemaDef = SchemaDef {
    name: "number_dp_exemplars",
    fields: EXEMPLAR_FIELDS,
};

/// Histogram data point exemplars, keyed by data point ID.
pub static HISTOGRAM_DP_EXEMPLARS: SchemaDef = SchemaDef {
    name: "histogram_dp_exemplars",
    fields: EXEMPLAR_FIELDS,
};

/// Exponential histogram data point exemplars, keyed by data point ID.
pub static EXP_HISTOGRAM_DP_EXEMPLARS: SchemaDef = SchemaDef {
    name: "exp_histogram_dp_exemplars",
    fields: EXEMPLAR_FIELDS,
};

/// Accumulates exemplars and their attributes.
///
/// Exemplars with attributes get an ID, which keys their rows in the exemplar attribute table; the rest carry a null ID.
pub struct ExemplarsBuilder {
    def: &'static SchemaDef,
    ids: IdAllocator<u32>,
    order: OwnerOrder<u32>,
    id: PrimitiveBuilder<u32>,
    parent_id: PrimitiveBuilder<u32>,
    time_unix_nano: PrimitiveBuilder<u64>,
    int_value: PrimitiveBuilder<i64>,
    double_value: PrimitiveBuilder<f64>,
    span_id: BinaryBuilder,
    trace_id: BinaryBuilder,
    attrs: AttributesBuilder<u32>,
}

impl ExemplarsBuilder {
    fn new(def: &'static SchemaDef, attrs: &'static SchemaDef) -> Self {
        Self {
            def,
            ids: IdAllocator::new("exemplar"),
            order: OwnerOrder::new(def.name),
            id: PrimitiveBuilder::new(),
            parent_id: PrimitiveBuilder::new(),
            time_unix_nano: PrimitiveBuilder::new(),
            int_value: PrimitiveBuilder::new(),
            double_value: PrimitiveBuilder::new(),
            span_id: BinaryBuilder::new(),
            trace_id: BinaryBuilder::new(),
            attrs: AttributesBuilder::new(attrs),
        }
    }

    /// Creates a builder for number data point exemplars.
    pub fn for_number_data_points() -> Self {
        Self::new(&NUMBER_DP_EXEMPLARS, &NUMBER_DP_EXEMPLAR_ATTRS)
    }

    /// Creates a builder for histogram data point exemplars.
    pub fn for_histogram_data_points() -> Self {
        Self::new(&HISTOGRAM_DP_EXEMPLARS, &HISTOGRAM_DP_EXEMPLAR_ATTRS)
    }

    /// Creates a builder for exponential histogram data point exemplars.
    pub fn for_exp_histogram_data_points() -> Self {
        Self::new(&EXP_HISTOGRAM_DP_EXEMPLARS, &EXP_HISTOGRAM_DP_EXEMPLAR_ATTRS)
    }

    /// Returns the number of exemplar rows appended.
    pub fn len(&self) -> usize {
        self.parent_id.len()
    }

    /// Returns `true` if no exemplars have been appended.
    pub fn is_empty(&self) -> bool {
        self.parent_id.is_empty()
    }

    /// Appends the exemplars of the data point identified by `parent_id`.
    ///
    /// # Errors
    ///
    /// If `exemplars` is empty or `parent_id` is lower than the previous owner's, an `AppendMismatch` error is
    /// returned. If the exemplar ID space is exhausted, a `CapacityExceeded` error is returned.
    pub fn append_with_id(&mut self, parent_id: u32, exemplars: &[Exemplar]) -> Result<(), EncodeError> {
        self.order.check(parent_id, exemplars.len())?;

        for exemplar in exemplars {
            if exemplar.filtered_attributes.is_empty() {
                self.id.append_null();
            } else {
                let id = self.ids.allocate()?;
                self.attrs.append_with_id(id, &exemplar.filtered_attributes)?;
                self.id.append(id);
            }

            self.parent_id.append(parent_id);
            self.time_unix_nano.append_non_zero(exemplar.time_unix_nano);
            match exemplar.value {
                NumberValue::Int(v) => {
                    self.int_value.append(v);
                    self.double_value.append_null();
                }
                NumberValue::Double(v) => {
                    self.int_value.append_null();
                    self.double_value.append(v);
                }
            }
            self.span_id.append_option(exemplar.span_id.as_ref().map(|id| id.as_slice()));
            self.trace_id.append_option(exemplar.trace_id.as_ref().map(|id| id.as_slice()));
        }

        Ok(())
    }
}

impl Accumulator for ExemplarsBuilder {
    fn reset(&mut self) {
        self.ids.reset();
        self.order.reset();
        self.id.reset();
        self.parent_id.reset();
        self.time_unix_nano.reset();
        self.int_value.reset();
        self.double_value.reset();
        self.span_id.reset();
        self.trace_id.reset();
        self.attrs.reset();
    }

    fn finish(&mut self, out: &mut Vec<FinishedTable>) {
        self.ids.reset();
        self.order.reset();
        out.push(FinishedTable {
            def: self.def,
            columns: vec![
                self.id.finish(),
                self.parent_id.finish(),
                self.time_unix_nano.finish(),
                self.int_value.finish(),
                self.double_value.finish(),
                self.span_id.finish(),
                self.trace_id.finish(),
            ],
        });
        self.attrs.finish(out);
    }
}
