//! Attribute side tables.
use strata_model::{AnyValue, KeyValue};

use super::{Accumulator, FinishedTable, OwnerOrder, RowId};
use crate::{
    column::{
        builder::{BinaryBuilder, PrimitiveBuilder, StringBuilder},
        DataType, FieldDef, SchemaDef,
    },
    error::EncodeError,
    stream::wire::encode_any_value,
};

macro_rules! attribute_fields {
    ($parent:expr) => {
        &[
            FieldDef::required("parent_id", $parent).delta(),
            FieldDef::required("key", DataType::Utf8).dictionary(),
            FieldDef::required("type", DataType::UInt8),
            FieldDef::optional("str", DataType::Utf8).dictionary(),
            FieldDef::optional("int", DataType::Int64),
            FieldDef::optional("double", DataType::Float64),
            FieldDef::optional("bool", DataType::Boolean),
            FieldDef::optional("bytes", DataType::Binary),
            FieldDef::optional("ser", DataType::Binary),
        ]
    };
}

const ATTRIBUTES_U16: &[FieldDef] = attribute_fields!(DataType::UInt16);
const ATTRIBUTES_U32: &[FieldDef] = attribute_fields!(DataType::UInt32);

/// Resource attributes, keyed by resource ID.
pub static RESOURCE_ATTRS: SchemaDef = SchemaDef {
    name: "resource_attrs",
    fields: ATTRIBUTES_U16,
};

/// Scope attributes, keyed by scope ID.
pub static SCOPE_ATTRS: SchemaDef = SchemaDef {
    name: "scope_attrs",
    fields: ATTRIBUTES_U16,
};

/// Span attributes, keyed by span ID.
pub static SPAN_ATTRS: SchemaDef = SchemaDef {
    name: "span_attrs",
    fields: ATTRIBUTES_U16,
};

/// Span event attributes, keyed by event ID.
pub static SPAN_EVENT_ATTRS: SchemaDef = SchemaDef {
    name: "span_event_attrs",
    fields: ATTRIBUTES_U32,
};

/// Span link attributes, keyed by link ID.
pub static SPAN_LINK_ATTRS: SchemaDef = SchemaDef {
    name: "span_link_attrs",
    fields: ATTRIBUTES_U32,
};

/// Number data point attributes, keyed by data point ID.
pub static NUMBER_DP_ATTRS: SchemaDef = SchemaDef {
    name: "number_dp_attrs",
    fields: ATTRIBUTES_U32,
};

/// Histogram data point attributes, keyed by data point ID.
pub static HISTOGRAM_DP_ATTRS: SchemaDef = SchemaDef {
    name: "histogram_dp_attrs",
    fields: ATTRIBUTES_U32,
};

/// Exponential histogram data point attributes, keyed by data point ID.
pub static EXP_HISTOGRAM_DP_ATTRS: SchemaDef = SchemaDef {
    name: "exp_histogram_dp_attrs",
    fields: ATTRIBUTES_U32,
};

/// Summary data point attributes, keyed by data point ID.
pub static SUMMARY_DP_ATTRS: SchemaDef = SchemaDef {
    name: "summary_dp_attrs",
    fields: ATTRIBUTES_U32,
};

/// Number data point exemplar attributes, keyed by exemplar ID.
pub static NUMBER_DP_EXEMPLAR_ATTRS: SchemaDef = SchemaDef {
    name: "number_dp_exemplar_attrs",
    fields: ATTRIBUTES_U32,
};

/// Histogram data point exemplar attributes, keyed by exemplar ID.
pub static HISTOGRAM_DP_EXEMPLAR_ATTRS: SchemaDef = SchemaDef {
    name: "histogram_dp_exemplar_attrs",
    fields: ATTRIBUTES_U32,
};

/// Exponential histogram data point exemplar attributes, keyed by exemplar ID.
pub static EXP_HISTOGRAM_DP_EXEMPLAR_ATTRS: SchemaDef = SchemaDef {
    name: "exp_histogram_dp_exemplar_attrs",
    fields: ATTRIBUTES_U32,
};

/// Type tag of an attribute value, as stored in the `type` column.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[repr(u8)]
pub enum ValueType {
    /// No value.
    Empty = 0,

    /// String, stored in the `str` column.
    Str = 1,

    /// Integer, stored in the `int` column.
    Int = 2,

    /// Double, stored in the `double` column.
    Double = 3,

    /// Boolean, stored in the `bool` column.
    Bool = 4,

    /// Key/value list, coded into the `ser` column.
    Map = 5,

    /// Array, coded into the `ser` column.
    Slice = 6,

    /// Raw bytes, stored in the `bytes` column.
    Bytes = 7,
}

impl ValueType {
    /// Returns the type tag of the given value.
    pub fn of(value: &AnyValue) -> Self {
        match value {
            AnyValue::Empty => Self::Empty,
            AnyValue::Str(_) => Self::Str,
            AnyValue::Int(_) => Self::Int,
            AnyValue::Double(_) => Self::Double,
            AnyValue::Bool(_) => Self::Bool,
            AnyValue::KvList(_) => Self::Map,
            AnyValue::Array(_) => Self::Slice,
            AnyValue::Bytes(_) => Self::Bytes,
        }
    }

    /// Creates a `ValueType` from its stored tag.
    pub const fn from_u8(value: u8) -> Option<Self> {
        Some(match value {
            0 => Self::Empty,
            1 => Self::Str,
            2 => Self::Int,
            3 => Self::Double,
            4 => Self::Bool,
            5 => Self::Map,
            6 => Self::Slice,
            7 => Self::Bytes,
            _ => return None,
        })
    }
}

/// Accumulates attributes into an attribute side table.
///
/// Each attribute becomes one row: the owner ID, the key, the value's type tag, and the value itself in the column
/// matching its type. Arrays and key/value lists are coded with [`encode_any_value`].
pub struct AttributesBuilder<P> {
    def: &'static SchemaDef,
    order: OwnerOrder<P>,
    parent_id: PrimitiveBuilder<P>,
    key: StringBuilder,
    value_type: PrimitiveBuilder<u8>,
    str: StringBuilder,
    int: PrimitiveBuilder<i64>,
    double: PrimitiveBuilder<f64>,
    bool: PrimitiveBuilder<bool>,
    bytes: BinaryBuilder,
    ser: BinaryBuilder,
}

impl<P: RowId> AttributesBuilder<P> {
    /// Creates a new `AttributesBuilder` for the given attribute table.
    pub fn new(def: &'static SchemaDef) -> Self {
        Self {
            def,
            order: OwnerOrder::new(def.name),
            parent_id: PrimitiveBuilder::new(),
            key: StringBuilder::new(),
            value_type: PrimitiveBuilder::new(),
            str: StringBuilder::new(),
            int: PrimitiveBuilder::new(),
            double: PrimitiveBuilder::new(),
            bool: PrimitiveBuilder::new(),
            bytes: BinaryBuilder::new(),
            ser: BinaryBuilder::new(),
        }
    }

    /// Returns the number of attribute rows appended.
    pub fn len(&self) -> usize {
        self.parent_id.len()
    }

    /// Returns `true` if no attributes have been appended.
    pub fn is_empty(&self) -> bool {
        self.parent_id.is_empty()
    }

    /// Appends the attributes of the owner identified by `parent_id`.
    ///
    /// # Errors
    ///
    /// If `attributes` is empty, if `parent_id` is lower than the previous owner's, or if a nested value cannot be
    /// encoded, an `AppendMismatch` error is returned.
    pub fn append_with_id(&mut self, parent_id: P, attributes: &[KeyValue]) -> Result<(), EncodeError> {
        self.order.check(parent_id, attributes.len())?;

        for kv in attributes {
            // Serialize first so that a failure leaves every column the same length.
            let ser = match &kv.value {
                value @ (AnyValue::Array(_) | AnyValue::KvList(_)) => {
                    Some(encode_any_value(value).map_err(|e| EncodeError::AppendMismatch {
                        table: self.def.name,
                        reason: format!("failed to serialize value of '{}': {}", kv.key, e),
                    })?)
                }
                _ => None,
            };

            self.parent_id.append(parent_id);
            self.key.append(&kv.key);
            self.value_type.append(ValueType::of(&kv.value) as u8);
            self.str.append_option(match &kv.value {
                AnyValue::Str(s) => Some(s.as_str()),
                _ => None,
            });
            self.int.append_option(match kv.value {
                AnyValue::Int(i) => Some(i),
                _ => None,
            });
            self.double.append_option(match kv.value {
                AnyValue::Double(d) => Some(d),
                _ => None,
            });
            self.bool.append_option(match kv.value {
                AnyValue::Bool(b) => Some(b),
                _ => None,
            });
            self.bytes.append_option(match &kv.value {
                AnyValue::Bytes(b) => Some(b.as_slice()),
                _ => None,
            });
            self.ser.append_option(ser.as_deref());
        }

        Ok(())
    }
}

impl<P: RowId> Accumulator for AttributesBuilder<P> {
    fn reset(&mut self) {
        self.order.reset();
        self.parent_id.reset();
        self.key.reset();
        self.value_type.reset();
        self.str.reset();
        self.int.reset();
        self.double.reset();
        self.bool.reset();
        self.bytes.reset();
        self.ser.reset();
    }

    fn finish(&mut self, out: &mut Vec<FinishedTable>) {
        self.order.reset();
        out.push(FinishedTable {
            def: self.def,
            columns: vec![
                self.parent_id.finish(),
                self.key.finish(),
                self.value_type.finish(),
                self.str.finish(),
                self.int.finish(),
                self.double.finish(),
                self.bool.finish(),
                self.bytes.finish(),
                self.ser.finish(),
            ],
        });
    }
}
