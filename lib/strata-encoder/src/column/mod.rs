//! Typed columns, schemas and record batches.
use std::{fmt, sync::Arc};

use crate::collections::FastHashSet;

pub mod builder;

/// Logical data type of a column.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum DataType {
    /// Unsigned 8-bit integer.
    UInt8,

    /// Unsigned 16-bit integer.
    UInt16,

    /// Unsigned 32-bit integer.
    UInt32,

    /// Unsigned 64-bit integer.
    UInt64,

    /// Signed 32-bit integer.
    Int32,

    /// Signed 64-bit integer.
    Int64,

    /// 64-bit floating-point number.
    Float64,

    /// Boolean.
    Boolean,

    /// UTF-8 string.
    Utf8,

    /// Raw bytes.
    Binary,

    /// List of unsigned 64-bit integers.
    ListUInt64,

    /// List of 64-bit floating-point numbers.
    ListFloat64,
}

impl DataType {
    /// Returns the wire code of this data type.
    pub const fn code(self) -> u64 {
        match self {
            Self::UInt8 => 1,
            Self::UInt16 => 2,
            Self::UInt32 => 3,
            Self::UInt64 => 4,
            Self::Int32 => 5,
            Self::Int64 => 6,
            Self::Float64 => 7,
            Self::Boolean => 8,
            Self::Utf8 => 9,
            Self::Binary => 10,
            Self::ListUInt64 => 11,
            Self::ListFloat64 => 12,
        }
    }

    /// Creates a `DataType` from its wire code.
    pub const fn from_code(code: u64) -> Option<Self> {
        Some(match code {
            1 => Self::UInt8,
            2 => Self::UInt16,
            3 => Self::UInt32,
            4 => Self::UInt64,
            5 => Self::Int32,
            6 => Self::Int64,
            7 => Self::Float64,
            8 => Self::Boolean,
            9 => Self::Utf8,
            10 => Self::Binary,
            11 => Self::ListUInt64,
            12 => Self::ListFloat64,
            _ => return None,
        })
    }

    /// Returns `true` if values of this type can be delta-encoded.
    pub const fn is_integer(self) -> bool {
        matches!(
            self,
            Self::UInt8 | Self::UInt16 | Self::UInt32 | Self::UInt64 | Self::Int32 | Self::Int64
        )
    }

    /// Returns a short name for this data type.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::UInt8 => "u8",
            Self::UInt16 => "u16",
            Self::UInt32 => "u32",
            Self::UInt64 => "u64",
            Self::Int32 => "i32",
            Self::Int64 => "i64",
            Self::Float64 => "f64",
            Self::Boolean => "bool",
            Self::Utf8 => "utf8",
            Self::Binary => "binary",
            Self::ListUInt64 => "list<u64>",
            Self::ListFloat64 => "list<f64>",
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Physical encoding of a column on the wire.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
pub enum Encoding {
    /// Values written inline.
    #[default]
    Plain,

    /// Integer values written as differences from the previous non-null value.
    Delta,

    /// String values written as keys into a per-stream dictionary.
    Dictionary,
}

impl Encoding {
    /// Returns the wire code of this encoding.
    pub const fn code(self) -> u64 {
        match self {
            Self::Plain => 0,
            Self::Delta => 1,
            Self::Dictionary => 2,
        }
    }

    /// Creates an `Encoding` from its wire code.
    pub const fn from_code(code: u64) -> Option<Self> {
        match code {
            0 => Some(Self::Plain),
            1 => Some(Self::Delta),
            2 => Some(Self::Dictionary),
            _ => None,
        }
    }

    /// Returns a short name for this encoding.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Plain => "plain",
            Self::Delta => "delta",
            Self::Dictionary => "dict",
        }
    }
}

/// Static definition of a table column.
#[derive(Clone, Copy, Debug)]
pub struct FieldDef {
    /// Column name.
    pub name: &'static str,

    /// Column data type.
    pub data_type: DataType,

    /// Preferred encoding.
    pub encoding: Encoding,

    /// Whether the column is left out of the schema until a batch holds a non-null value for it.
    pub optional: bool,
}

impl FieldDef {
    /// Defines a column that is always part of the schema.
    pub const fn required(name: &'static str, data_type: DataType) -> Self {
        Self {
            name,
            data_type,
            encoding: Encoding::Plain,
            optional: false,
        }
    }

    /// Defines a column that joins the schema once it first holds a value.
    pub const fn optional(name: &'static str, data_type: DataType) -> Self {
        Self {
            name,
            data_type,
            encoding: Encoding::Plain,
            optional: true,
        }
    }

    /// Marks the column as delta-encoded.
    pub const fn delta(mut self) -> Self {
        self.encoding = Encoding::Delta;
        self
    }

    /// Marks the column as dictionary-encoded.
    pub const fn dictionary(mut self) -> Self {
        self.encoding = Encoding::Dictionary;
        self
    }
}

/// Static definition of a table.
///
/// Columns handed to the record assembler are indexed by the ordinal of their field in `fields`.
#[derive(Debug)]
pub struct SchemaDef {
    /// Table name.
    pub name: &'static str,

    /// Column definitions.
    pub fields: &'static [FieldDef],
}

/// A column of a concrete schema.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct Field {
    /// Column name.
    pub name: String,

    /// Column data type.
    pub data_type: DataType,

    /// Column encoding.
    pub encoding: Encoding,
}

/// A concrete table schema: the columns actually present in a record batch, with their encodings.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct Schema {
    /// Table name.
    pub name: String,

    /// Columns, in table order.
    pub fields: Vec<Field>,
}

impl Schema {
    /// Returns a string that uniquely identifies this schema.
    ///
    /// Two schemas with the same identity describe the same wire layout.
    pub fn identity(&self) -> String {
        let mut identity = String::with_capacity(self.name.len() + self.fields.len() * 24);
        identity.push_str(&self.name);
        identity.push('{');
        for (i, field) in self.fields.iter().enumerate() {
            if i > 0 {
                identity.push(',');
            }
            identity.push_str(&field.name);
            identity.push(':');
            identity.push_str(field.data_type.as_str());
            if field.encoding != Encoding::Plain {
                identity.push('/');
                identity.push_str(field.encoding.as_str());
            }
        }
        identity.push('}');
        identity
    }

    /// Returns the position of the named column.
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|field| field.name == name)
    }
}

/// Values of a finished column.
///
/// Nulls are represented as `None`.
#[derive(Clone, Debug, PartialEq)]
pub enum ColumnData {
    /// Unsigned 8-bit integers.
    UInt8(Vec<Option<u8>>),

    /// Unsigned 16-bit integers.
    UInt16(Vec<Option<u16>>),

    /// Unsigned 32-bit integers.
    UInt32(Vec<Option<u32>>),

    /// Unsigned 64-bit integers.
    UInt64(Vec<Option<u64>>),

    /// Signed 32-bit integers.
    Int32(Vec<Option<i32>>),

    /// Signed 64-bit integers.
    Int64(Vec<Option<i64>>),

    /// 64-bit floating-point numbers.
    Float64(Vec<Option<f64>>),

    /// Booleans.
    Boolean(Vec<Option<bool>>),

    /// UTF-8 strings.
    Utf8(Vec<Option<String>>),

    /// Raw bytes.
    Binary(Vec<Option<Vec<u8>>>),

    /// Lists of unsigned 64-bit integers.
    ListUInt64(Vec<Option<Vec<u64>>>),

    /// Lists of 64-bit floating-point numbers.
    ListFloat64(Vec<Option<Vec<f64>>>),
}

macro_rules! for_each_column {
    ($column:expr, $values:ident => $body:expr) => {
        match $column {
            ColumnData::UInt8($values) => $body,
            ColumnData::UInt16($values) => $body,
            ColumnData::UInt32($values) => $body,
            ColumnData::UInt64($values) => $body,
            ColumnData::Int32($values) => $body,
            ColumnData::Int64($values) => $body,
            ColumnData::Float64($values) => $body,
            ColumnData::Boolean($values) => $body,
            ColumnData::Utf8($values) => $body,
            ColumnData::Binary($values) => $body,
            ColumnData::ListUInt64($values) => $body,
            ColumnData::ListFloat64($values) => $body,
        }
    };
}

macro_rules! typed_accessor {
    ($fn_name:ident, $variant:ident, $ty:ty) => {
        #[doc = concat!("Returns the values if this is a `", stringify!($variant), "` column.")]
        pub fn $fn_name(&self) -> Option<&[Option<$ty>]> {
            match self {
                Self::$variant(values) => Some(values),
                _ => None,
            }
        }
    };
}

impl ColumnData {
    /// Creates an empty column of the given data type.
    pub fn empty(data_type: DataType) -> Self {
        Self::nulls(data_type, 0)
    }

    /// Creates a column of the given data type holding `len` nulls.
    pub fn nulls(data_type: DataType, len: usize) -> Self {
        match data_type {
            DataType::UInt8 => Self::UInt8(vec![None; len]),
            DataType::UInt16 => Self::UInt16(vec![None; len]),
            DataType::UInt32 => Self::UInt32(vec![None; len]),
            DataType::UInt64 => Self::UInt64(vec![None; len]),
            DataType::Int32 => Self::Int32(vec![None; len]),
            DataType::Int64 => Self::Int64(vec![None; len]),
            DataType::Float64 => Self::Float64(vec![None; len]),
            DataType::Boolean => Self::Boolean(vec![None; len]),
            DataType::Utf8 => Self::Utf8(vec![None; len]),
            DataType::Binary => Self::Binary(vec![None; len]),
            DataType::ListUInt64 => Self::ListUInt64(vec![None; len]),
            DataType::ListFloat64 => Self::ListFloat64(vec![None; len]),
        }
    }

    /// Returns the data type of this column.
    pub fn data_type(&self) -> DataType {
        match self {
            Self::UInt8(_) => DataType::UInt8,
            Self::UInt16(_) => DataType::UInt16,
            Self::UInt32(_) => DataType::UInt32,
            Self::UInt64(_) => DataType::UInt64,
            Self::Int32(_) => DataType::Int32,
            Self::Int64(_) => DataType::Int64,
            Self::Float64(_) => DataType::Float64,
            Self::Boolean(_) => DataType::Boolean,
            Self::Utf8(_) => DataType::Utf8,
            Self::Binary(_) => DataType::Binary,
            Self::ListUInt64(_) => DataType::ListUInt64,
            Self::ListFloat64(_) => DataType::ListFloat64,
        }
    }

    /// Returns the number of values, including nulls.
    pub fn len(&self) -> usize {
        for_each_column!(self, values => values.len())
    }

    /// Returns `true` if the column holds no values.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the number of nulls.
    pub fn null_count(&self) -> usize {
        for_each_column!(self, values => values.iter().filter(|v| v.is_none()).count())
    }

    /// Returns `true` if the value at `index` is null.
    ///
    /// Out-of-range indexes are treated as null.
    pub fn is_null(&self, index: usize) -> bool {
        for_each_column!(self, values => !matches!(values.get(index), Some(Some(_))))
    }

    /// Returns `true` if at least one value is not null.
    pub fn has_values(&self) -> bool {
        for_each_column!(self, values => values.iter().any(|v| v.is_some()))
    }

    /// Returns the number of distinct non-null string values, or `None` if this is not a string column.
    pub fn distinct_count(&self) -> Option<usize> {
        match self {
            Self::Utf8(values) => {
                let distinct = values.iter().flatten().map(String::as_str).collect::<FastHashSet<_>>();
                Some(distinct.len())
            }
            _ => None,
        }
    }

    typed_accessor!(as_u8, UInt8, u8);
    typed_accessor!(as_u16, UInt16, u16);
    typed_accessor!(as_u32, UInt32, u32);
    typed_accessor!(as_u64, UInt64, u64);
    typed_accessor!(as_i32, Int32, i32);
    typed_accessor!(as_i64, Int64, i64);
    typed_accessor!(as_f64, Float64, f64);
    typed_accessor!(as_bool, Boolean, bool);
    typed_accessor!(as_utf8, Utf8, String);
    typed_accessor!(as_binary, Binary, Vec<u8>);
    typed_accessor!(as_list_u64, ListUInt64, Vec<u64>);
    typed_accessor!(as_list_f64, ListFloat64, Vec<f64>);
}

/// A finished table: a schema plus one column per schema field, all of the same length.
#[derive(Clone, Debug, PartialEq)]
pub struct RecordBatch {
    schema: Arc<Schema>,
    columns: Vec<ColumnData>,
    num_rows: usize,
}

impl RecordBatch {
    /// Creates a new `RecordBatch`.
    ///
    /// Callers must ensure that there is one column per schema field and that every column holds `num_rows` values.
    pub(crate) fn new(schema: Arc<Schema>, columns: Vec<ColumnData>, num_rows: usize) -> Self {
        debug_assert_eq!(schema.fields.len(), columns.len());
        debug_assert!(columns.iter().all(|c| c.len() == num_rows));
        Self {
            schema,
            columns,
            num_rows,
        }
    }

    /// Returns the schema.
    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    /// Returns the columns, in schema order.
    pub fn columns(&self) -> &[ColumnData] {
        &self.columns
    }

    /// Returns the number of rows.
    pub fn num_rows(&self) -> usize {
        self.num_rows
    }

    /// Returns the named column, if present in the schema.
    pub fn column(&self, name: &str) -> Option<&ColumnData> {
        self.schema.index_of(name).and_then(|i| self.columns.get(i))
    }
}
