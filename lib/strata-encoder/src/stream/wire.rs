//! Stream wire format.
//!
//! A stream is a sequence of frames. Every frame is a varint message kind, a varint body length, and the body itself,
//! so a reader can always skip to the next frame. Four kinds of message exist:
//!
//! - a schema: the table name, then the name, data type code and encoding code of every column
//! - a dictionary: the column ordinal, whether the values extend or replace the current dictionary, and the values
//! - a record batch: the row count, the column count, then every column in schema order
//! - an end-of-stream marker, with an empty body
//!
//! Within a record batch, each column starts with its null count. When the column holds both nulls and values, a
//! validity bitmap follows (least significant bit first, set bits marking values). Only non-null values are written.
//! Unsigned integers are varints, signed integers are zigzag varints, and delta-encoded integers are zigzag varints of
//! the difference from the previous non-null value. Dictionary-encoded strings are written as varint keys into the
//! column's dictionary, which assigns keys from zero in insertion order.
//!
//! Nested attribute values (arrays and key/value lists) are stored in a binary column, each one coded as its type tag
//! followed by its payload. Doubles keep their raw bits, so infinities, NaN and negative zero read back unchanged.
use protobuf::{CodedInputStream, CodedOutputStream};
use snafu::ResultExt as _;
use strata_model::{AnyValue, KeyValue};

use crate::{
    column::{ColumnData, DataType, Encoding, Field, RecordBatch, Schema},
    error::{DecodeError, Malformed},
    related::ValueType,
};

// Individual frames cannot be larger than `i32::MAX`.
const MAX_MESSAGE_SIZE: u64 = i32::MAX as u64;

const MAX_ROWS: u64 = u32::MAX as u64;

const MAX_NESTING_DEPTH: usize = 64;

/// Kind of a stream message.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum MessageKind {
    /// Table schema.
    Schema,

    /// Dictionary values for one column.
    Dictionary,

    /// Record batch.
    RecordBatch,

    /// End of stream.
    EndOfStream,
}

impl MessageKind {
    /// Returns the wire code of this message kind.
    pub const fn code(self) -> u64 {
        match self {
            Self::Schema => 1,
            Self::Dictionary => 2,
            Self::RecordBatch => 3,
            Self::EndOfStream => 4,
        }
    }

    /// Creates a `MessageKind` from its wire code.
    pub const fn from_code(code: u64) -> Option<Self> {
        match code {
            1 => Some(Self::Schema),
            2 => Some(Self::Dictionary),
            3 => Some(Self::RecordBatch),
            4 => Some(Self::EndOfStream),
            _ => None,
        }
    }
}

/// New dictionary values for one column.
#[derive(Clone, Debug, PartialEq)]
pub struct DictionaryUpdate {
    /// Ordinal of the column within the schema.
    pub field: usize,

    /// Whether `values` extend the current dictionary rather than replace it.
    pub is_delta: bool,

    /// Values, in key order.
    pub values: Vec<String>,
}

/// A decoded frame.
#[derive(Debug)]
pub enum Message {
    /// Table schema.
    Schema(Schema),

    /// Dictionary values for one column.
    Dictionary(DictionaryUpdate),

    /// Undecoded record batch body.
    ///
    /// Decoding a record batch needs the stream's schema and dictionaries, see [`read_record_batch`].
    RecordBatch(Vec<u8>),

    /// End of stream.
    EndOfStream,
}

/// Delta-encodes a slice in place, working backwards.
///
/// After encoding, `s[i]` contains the wrapping difference `s[i] - s[i-1]`.
pub fn delta_encode(s: &mut [i64]) {
    for i in (1..s.len()).rev() {
        s[i] = s[i].wrapping_sub(s[i - 1]);
    }
}

/// Reverses [`delta_encode`] in place.
pub fn delta_decode(s: &mut [i64]) {
    for i in 1..s.len() {
        s[i] = s[i].wrapping_add(s[i - 1]);
    }
}

/// An integer type that can be carried in a column.
trait WireInt: Copy {
    const SIGNED: bool;

    fn to_i64(self) -> i64;

    fn from_i64(value: i64) -> Option<Self>;
}

macro_rules! impl_wire_int {
    ($ty:ty, signed: $signed:expr) => {
        impl WireInt for $ty {
            const SIGNED: bool = $signed;

            fn to_i64(self) -> i64 {
                self as i64
            }

            fn from_i64(value: i64) -> Option<Self> {
                <$ty>::try_from(value).ok()
            }
        }
    };
}

impl_wire_int!(u8, signed: false);
impl_wire_int!(u16, signed: false);
impl_wire_int!(u32, signed: false);
impl_wire_int!(i32, signed: true);
impl_wire_int!(i64, signed: true);

impl WireInt for u64 {
    const SIGNED: bool = false;

    fn to_i64(self) -> i64 {
        self as i64
    }

    fn from_i64(value: i64) -> Option<Self> {
        Some(value as u64)
    }
}

fn frame_len(buf: &[u8]) -> Result<u64, protobuf::Error> {
    let len = buf.len() as u64;
    if len > MAX_MESSAGE_SIZE {
        return Err(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            "message size exceeds limit (2147483647 bytes)",
        )
        .into());
    }
    Ok(len)
}

/// Writes a frame of the given kind to `out`, using `scratch` to buffer the body.
pub(crate) fn write_frame<F>(
    out: &mut Vec<u8>, scratch: &mut Vec<u8>, kind: MessageKind, body: F,
) -> Result<(), protobuf::Error>
where
    F: FnOnce(&mut CodedOutputStream<'_>) -> Result<(), protobuf::Error>,
{
    scratch.clear();

    {
        let mut body_output_stream = CodedOutputStream::vec(scratch);
        body(&mut body_output_stream)?;
        body_output_stream.flush()?;
    }

    let len = frame_len(scratch)?;
    let mut output_stream = CodedOutputStream::vec(out);
    output_stream.write_raw_varint64(kind.code())?;
    output_stream.write_raw_varint64(len)?;
    output_stream.write_raw_bytes(scratch)?;
    output_stream.flush()
}

/// Writes the body of a schema message.
pub(crate) fn write_schema(os: &mut CodedOutputStream<'_>, schema: &Schema) -> Result<(), protobuf::Error> {
    os.write_string_no_tag(&schema.name)?;
    os.write_raw_varint64(schema.fields.len() as u64)?;
    for field in &schema.fields {
        os.write_string_no_tag(&field.name)?;
        os.write_raw_varint64(field.data_type.code())?;
        os.write_raw_varint64(field.encoding.code())?;
    }
    Ok(())
}

/// Writes the body of a dictionary message.
pub(crate) fn write_dictionary(
    os: &mut CodedOutputStream<'_>, update: &DictionaryUpdate,
) -> Result<(), protobuf::Error> {
    os.write_raw_varint64(update.field as u64)?;
    os.write_bool_no_tag(update.is_delta)?;
    os.write_raw_varint64(update.values.len() as u64)?;
    for value in &update.values {
        os.write_string_no_tag(value)?;
    }
    Ok(())
}

/// Writes the body of a record batch message.
///
/// `key_of` maps a value of a dictionary-encoded column, identified by its ordinal, to its dictionary key. Every value
/// must already be in the dictionary sent to the reader, otherwise an error is returned.
pub(crate) fn write_record_batch<F>(
    os: &mut CodedOutputStream<'_>, batch: &RecordBatch, mut key_of: F,
) -> Result<(), protobuf::Error>
where
    F: FnMut(usize, &str) -> Option<u64>,
{
    os.write_raw_varint64(batch.num_rows() as u64)?;
    os.write_raw_varint64(batch.columns().len() as u64)?;
    for (ordinal, (field, column)) in batch.schema().fields.iter().zip(batch.columns()).enumerate() {
        write_column(os, ordinal, field, column, &mut key_of)?;
    }
    Ok(())
}

fn write_column<F>(
    os: &mut CodedOutputStream<'_>, ordinal: usize, field: &Field, column: &ColumnData, key_of: &mut F,
) -> Result<(), protobuf::Error>
where
    F: FnMut(usize, &str) -> Option<u64>,
{
    match column {
        ColumnData::UInt8(values) => write_ints(os, field.encoding, values),
        ColumnData::UInt16(values) => write_ints(os, field.encoding, values),
        ColumnData::UInt32(values) => write_ints(os, field.encoding, values),
        ColumnData::UInt64(values) => write_ints(os, field.encoding, values),
        ColumnData::Int32(values) => write_ints(os, field.encoding, values),
        ColumnData::Int64(values) => write_ints(os, field.encoding, values),
        ColumnData::Float64(values) => {
            write_validity(os, values)?;
            for value in values.iter().flatten() {
                os.write_double_no_tag(*value)?;
            }
            Ok(())
        }
        ColumnData::Boolean(values) => {
            write_validity(os, values)?;
            for value in values.iter().flatten() {
                os.write_bool_no_tag(*value)?;
            }
            Ok(())
        }
        ColumnData::Utf8(values) => {
            write_validity(os, values)?;
            for value in values.iter().flatten() {
                if field.encoding == Encoding::Dictionary {
                    let key = key_of(ordinal, value).ok_or_else(|| {
                        std::io::Error::new(
                            std::io::ErrorKind::InvalidInput,
                            format!("value of column '{}' missing from dictionary", field.name),
                        )
                    })?;
                    os.write_raw_varint64(key)?;
                } else {
                    os.write_string_no_tag(value)?;
                }
            }
            Ok(())
        }
        ColumnData::Binary(values) => {
            write_validity(os, values)?;
            for value in values.iter().flatten() {
                os.write_bytes_no_tag(value)?;
            }
            Ok(())
        }
        ColumnData::ListUInt64(values) => {
            write_validity(os, values)?;
            for list in values.iter().flatten() {
                os.write_raw_varint64(list.len() as u64)?;
                for value in list {
                    os.write_raw_varint64(*value)?;
                }
            }
            Ok(())
        }
        ColumnData::ListFloat64(values) => {
            write_validity(os, values)?;
            for list in values.iter().flatten() {
                os.write_raw_varint64(list.len() as u64)?;
                for value in list {
                    os.write_double_no_tag(*value)?;
                }
            }
            Ok(())
        }
    }
}

fn write_validity<T>(os: &mut CodedOutputStream<'_>, values: &[Option<T>]) -> Result<(), protobuf::Error> {
    let null_count = values.iter().filter(|v| v.is_none()).count();
    os.write_raw_varint64(null_count as u64)?;

    if null_count > 0 && null_count < values.len() {
        let mut bitmap = vec![0u8; values.len().div_ceil(8)];
        for (i, value) in values.iter().enumerate() {
            if value.is_some() {
                bitmap[i / 8] |= 1 << (i % 8);
            }
        }
        os.write_raw_bytes(&bitmap)?;
    }

    Ok(())
}

fn write_ints<T: WireInt>(
    os: &mut CodedOutputStream<'_>, encoding: Encoding, values: &[Option<T>],
) -> Result<(), protobuf::Error> {
    write_validity(os, values)?;

    let mut ints = values.iter().flatten().map(|v| v.to_i64()).collect::<Vec<_>>();
    if encoding == Encoding::Delta {
        delta_encode(&mut ints);
        for value in ints {
            os.write_sint64_no_tag(value)?;
        }
    } else if T::SIGNED {
        for value in ints {
            os.write_sint64_no_tag(value)?;
        }
    } else {
        for value in ints {
            os.write_raw_varint64(value as u64)?;
        }
    }

    Ok(())
}

/// Encodes a nested attribute value.
pub fn encode_any_value(value: &AnyValue) -> Result<Vec<u8>, protobuf::Error> {
    let mut buf = Vec::new();
    {
        let mut os = CodedOutputStream::vec(&mut buf);
        write_any_value(&mut os, value)?;
        os.flush()?;
    }
    Ok(buf)
}

fn write_any_value(os: &mut CodedOutputStream<'_>, value: &AnyValue) -> Result<(), protobuf::Error> {
    os.write_raw_varint64(ValueType::of(value) as u64)?;
    match value {
        AnyValue::Empty => Ok(()),
        AnyValue::Str(s) => os.write_string_no_tag(s),
        AnyValue::Int(i) => os.write_sint64_no_tag(*i),
        AnyValue::Double(d) => os.write_fixed64_no_tag(d.to_bits()),
        AnyValue::Bool(b) => os.write_bool_no_tag(*b),
        AnyValue::Bytes(b) => os.write_bytes_no_tag(b),
        AnyValue::Array(values) => {
            os.write_raw_varint64(values.len() as u64)?;
            for value in values {
                write_any_value(os, value)?;
            }
            Ok(())
        }
        AnyValue::KvList(kvs) => {
            os.write_raw_varint64(kvs.len() as u64)?;
            for kv in kvs {
                os.write_string_no_tag(&kv.key)?;
                write_any_value(os, &kv.value)?;
            }
            Ok(())
        }
    }
}

/// Decodes a nested attribute value written by [`encode_any_value`].
///
/// # Errors
///
/// If the input is truncated, holds an unknown type tag, nests deeper than 64 levels, or has trailing bytes, an error
/// is returned.
pub fn decode_any_value(bytes: &[u8]) -> Result<AnyValue, DecodeError> {
    let mut is = CodedInputStream::from_bytes(bytes);
    let value = read_any_value(&mut is, 0)?;
    if !is.eof().context(Malformed)? {
        return Err(invalid("trailing bytes after nested value"));
    }
    Ok(value)
}

fn read_any_value(is: &mut CodedInputStream<'_>, depth: usize) -> Result<AnyValue, DecodeError> {
    if depth > MAX_NESTING_DEPTH {
        return Err(invalid(format!("nested value exceeds depth {}", MAX_NESTING_DEPTH)));
    }

    let tag = is.read_raw_varint64().context(Malformed)?;
    let value_type = u8::try_from(tag)
        .ok()
        .and_then(ValueType::from_u8)
        .ok_or(DecodeError::UnknownCode {
            what: "value type",
            code: tag,
        })?;

    let value = match value_type {
        ValueType::Empty => AnyValue::Empty,
        ValueType::Str => AnyValue::Str(is.read_string().context(Malformed)?),
        ValueType::Int => AnyValue::Int(is.read_sint64().context(Malformed)?),
        ValueType::Double => AnyValue::Double(f64::from_bits(is.read_fixed64().context(Malformed)?)),
        ValueType::Bool => AnyValue::Bool(is.read_bool().context(Malformed)?),
        ValueType::Bytes => AnyValue::Bytes(is.read_bytes().context(Malformed)?),
        ValueType::Slice => {
            let len = is.read_raw_varint64().context(Malformed)?;
            AnyValue::Array(
                (0..len)
                    .map(|_| read_any_value(is, depth + 1))
                    .collect::<Result<Vec<_>, DecodeError>>()?,
            )
        }
        ValueType::Map => {
            let len = is.read_raw_varint64().context(Malformed)?;
            let mut kvs = Vec::new();
            for _ in 0..len {
                let key = is.read_string().context(Malformed)?;
                let value = read_any_value(is, depth + 1)?;
                kvs.push(KeyValue { key, value });
            }
            AnyValue::KvList(kvs)
        }
    };
    Ok(value)
}

fn invalid(reason: impl Into<String>) -> DecodeError {
    DecodeError::InvalidMessage { reason: reason.into() }
}

/// Reads the next frame, or `None` if the input is exhausted.
///
/// # Errors
///
/// If the frame is truncated, of an unknown kind, or holds an invalid schema or dictionary, an error is returned.
pub fn read_frame(is: &mut CodedInputStream<'_>) -> Result<Option<Message>, DecodeError> {
    if is.eof().context(Malformed)? {
        return Ok(None);
    }

    let kind = is.read_raw_varint64().context(Malformed)?;
    let len = is.read_raw_varint64().context(Malformed)?;
    if len > MAX_MESSAGE_SIZE {
        return Err(invalid(format!("frame length {} exceeds limit", len)));
    }
    let body = is.read_raw_bytes(len as u32).context(Malformed)?;

    let message = match MessageKind::from_code(kind) {
        Some(MessageKind::Schema) => Message::Schema(read_schema(&body)?),
        Some(MessageKind::Dictionary) => Message::Dictionary(read_dictionary(&body)?),
        Some(MessageKind::RecordBatch) => Message::RecordBatch(body),
        Some(MessageKind::EndOfStream) => Message::EndOfStream,
        None => return Err(DecodeError::UnknownMessageKind { kind }),
    };
    Ok(Some(message))
}

fn read_schema(body: &[u8]) -> Result<Schema, DecodeError> {
    let mut is = CodedInputStream::from_bytes(body);
    let name = is.read_string().context(Malformed)?;
    let count = is.read_raw_varint64().context(Malformed)?;

    let mut fields = Vec::new();
    for _ in 0..count {
        let name = is.read_string().context(Malformed)?;
        let code = is.read_raw_varint64().context(Malformed)?;
        let data_type = DataType::from_code(code).ok_or(DecodeError::UnknownCode {
            what: "data type",
            code,
        })?;
        let code = is.read_raw_varint64().context(Malformed)?;
        let encoding = Encoding::from_code(code).ok_or(DecodeError::UnknownCode { what: "encoding", code })?;

        if encoding == Encoding::Delta && !data_type.is_integer() {
            return Err(invalid(format!("column '{}' is {} and cannot be delta-encoded", name, data_type)));
        }
        if encoding == Encoding::Dictionary && data_type != DataType::Utf8 {
            return Err(invalid(format!(
                "column '{}' is {} and cannot be dictionary-encoded",
                name, data_type
            )));
        }

        fields.push(Field {
            name,
            data_type,
            encoding,
        });
    }

    Ok(Schema { name, fields })
}

fn read_dictionary(body: &[u8]) -> Result<DictionaryUpdate, DecodeError> {
    let mut is = CodedInputStream::from_bytes(body);
    let field = is.read_raw_varint64().context(Malformed)?;
    let is_delta = is.read_bool().context(Malformed)?;
    let count = is.read_raw_varint64().context(Malformed)?;

    let mut values = Vec::new();
    for _ in 0..count {
        values.push(is.read_string().context(Malformed)?);
    }

    Ok(DictionaryUpdate {
        field: usize::try_from(field).map_err(|_| invalid(format!("column ordinal {} out of range", field)))?,
        is_delta,
        values,
    })
}

/// Decodes a record batch body against the given schema.
///
/// `dictionaries` holds the current dictionary of every column, indexed by ordinal. Columns that are not
/// dictionary-encoded may have an empty or missing entry.
///
/// Returns the columns, in schema order, and the number of rows.
///
/// # Errors
///
/// If the body is truncated, does not match the schema, or references a missing dictionary entry, an error is
/// returned.
pub fn read_record_batch(
    body: &[u8], schema: &Schema, dictionaries: &[Vec<String>],
) -> Result<(Vec<ColumnData>, usize), DecodeError> {
    let mut is = CodedInputStream::from_bytes(body);
    let num_rows = is.read_raw_varint64().context(Malformed)?;
    if num_rows > MAX_ROWS {
        return Err(invalid(format!("row count {} exceeds limit", num_rows)));
    }
    let num_rows = num_rows as usize;

    let num_columns = is.read_raw_varint64().context(Malformed)?;
    if num_columns != schema.fields.len() as u64 {
        return Err(invalid(format!(
            "record batch has {} columns, schema '{}' has {}",
            num_columns,
            schema.name,
            schema.fields.len()
        )));
    }

    let mut columns = Vec::with_capacity(schema.fields.len());
    for (ordinal, field) in schema.fields.iter().enumerate() {
        let dictionary = dictionaries.get(ordinal).map_or(&[][..], Vec::as_slice);
        columns.push(read_column(&mut is, field, num_rows, dictionary)?);
    }

    if !is.eof().context(Malformed)? {
        return Err(invalid(format!("trailing bytes after record batch of '{}'", schema.name)));
    }

    Ok((columns, num_rows))
}

fn read_column(
    is: &mut CodedInputStream<'_>, field: &Field, num_rows: usize, dictionary: &[String],
) -> Result<ColumnData, DecodeError> {
    let validity = read_validity(is, num_rows)?;

    let column = match field.data_type {
        DataType::UInt8 => ColumnData::UInt8(read_ints(is, field, &validity)?),
        DataType::UInt16 => ColumnData::UInt16(read_ints(is, field, &validity)?),
        DataType::UInt32 => ColumnData::UInt32(read_ints(is, field, &validity)?),
        DataType::UInt64 => ColumnData::UInt64(read_ints(is, field, &validity)?),
        DataType::Int32 => ColumnData::Int32(read_ints(is, field, &validity)?),
        DataType::Int64 => ColumnData::Int64(read_ints(is, field, &validity)?),
        DataType::Float64 => ColumnData::Float64(read_values(&validity, || is.read_double().context(Malformed))?),
        DataType::Boolean => ColumnData::Boolean(read_values(&validity, || is.read_bool().context(Malformed))?),
        DataType::Utf8 if field.encoding == Encoding::Dictionary => ColumnData::Utf8(read_values(&validity, || {
            let key = is.read_raw_varint64().context(Malformed)?;
            usize::try_from(key)
                .ok()
                .and_then(|index| dictionary.get(index))
                .cloned()
                .ok_or_else(|| DecodeError::MissingDictionaryEntry {
                    field: field.name.clone(),
                    key,
                })
        })?),
        DataType::Utf8 => ColumnData::Utf8(read_values(&validity, || is.read_string().context(Malformed))?),
        DataType::Binary => ColumnData::Binary(read_values(&validity, || is.read_bytes().context(Malformed))?),
        DataType::ListUInt64 => ColumnData::ListUInt64(read_values(&validity, || {
            let len = is.read_raw_varint64().context(Malformed)?;
            (0..len)
                .map(|_| is.read_raw_varint64())
                .collect::<Result<Vec<_>, _>>()
                .context(Malformed)
        })?),
        DataType::ListFloat64 => ColumnData::ListFloat64(read_values(&validity, || {
            let len = is.read_raw_varint64().context(Malformed)?;
            (0..len)
                .map(|_| is.read_double())
                .collect::<Result<Vec<_>, _>>()
                .context(Malformed)
        })?),
    };
    Ok(column)
}

fn read_validity(is: &mut CodedInputStream<'_>, num_rows: usize) -> Result<Vec<bool>, DecodeError> {
    let null_count = is.read_raw_varint64().context(Malformed)?;
    if null_count > num_rows as u64 {
        return Err(invalid(format!("null count {} exceeds row count {}", null_count, num_rows)));
    }

    let null_count = null_count as usize;
    if null_count == 0 {
        return Ok(vec![true; num_rows]);
    }
    if null_count == num_rows {
        return Ok(vec![false; num_rows]);
    }

    let bitmap = is.read_raw_bytes(num_rows.div_ceil(8) as u32).context(Malformed)?;
    let validity = (0..num_rows)
        .map(|i| bitmap[i / 8] & (1 << (i % 8)) != 0)
        .collect::<Vec<_>>();
    if validity.iter().filter(|valid| !**valid).count() != null_count {
        return Err(invalid("validity bitmap does not match null count"));
    }
    Ok(validity)
}

fn read_values<T, F>(validity: &[bool], mut read: F) -> Result<Vec<Option<T>>, DecodeError>
where
    F: FnMut() -> Result<T, DecodeError>,
{
    validity
        .iter()
        .map(|&valid| if valid { read().map(Some) } else { Ok(None) })
        .collect()
}

fn read_ints<T: WireInt>(
    is: &mut CodedInputStream<'_>, field: &Field, validity: &[bool],
) -> Result<Vec<Option<T>>, DecodeError> {
    let delta = field.encoding == Encoding::Delta;

    let mut ints = Vec::new();
    for _ in validity.iter().filter(|valid| **valid) {
        let value = if delta || T::SIGNED {
            is.read_sint64()
        } else {
            is.read_raw_varint64().map(|v| v as i64)
        };
        ints.push(value.context(Malformed)?);
    }
    if delta {
        delta_decode(&mut ints);
    }

    let mut ints = ints.into_iter();
    validity
        .iter()
        .map(|&valid| {
            if !valid {
                return Ok(None);
            }
            let value = ints.next().ok_or_else(|| invalid("column ended early"))?;
            T::from_i64(value)
                .map(Some)
                .ok_or_else(|| invalid(format!("value {} out of range for column '{}'", value, field.name)))
        })
        .collect()
}
