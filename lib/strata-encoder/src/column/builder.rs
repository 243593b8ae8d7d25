//! Append-only column builders.
//!
//! Every builder follows the same lifecycle: values are appended row by row, and [`finish`][PrimitiveBuilder::finish]
//! takes the accumulated values out as a [`ColumnData`], leaving the builder empty and ready for the next batch.
//!
//! The `append_non_zero`/`append_non_empty` variants treat the type's zero value as absent and append a null instead,
//! which keeps sparse columns out of the schema until they actually carry information.
use std::mem;

use super::ColumnData;

/// A fixed-width value that can be stored in a column.
pub trait ColumnValue: Copy + Default + PartialEq {
    /// Wraps the given values in the matching column variant.
    fn into_column(values: Vec<Option<Self>>) -> ColumnData;

    /// Returns `true` if this is the type's sparse default.
    fn is_zero(&self) -> bool {
        *self == Self::default()
    }
}

macro_rules! impl_column_value {
    ($ty:ty, $variant:ident) => {
        impl ColumnValue for $ty {
            fn into_column(values: Vec<Option<Self>>) -> ColumnData {
                ColumnData::$variant(values)
            }
        }
    };
}

impl_column_value!(u8, UInt8);
impl_column_value!(u16, UInt16);
impl_column_value!(u32, UInt32);
impl_column_value!(u64, UInt64);
impl_column_value!(i32, Int32);
impl_column_value!(i64, Int64);
impl_column_value!(bool, Boolean);

impl ColumnValue for f64 {
    fn into_column(values: Vec<Option<Self>>) -> ColumnData {
        ColumnData::Float64(values)
    }

    // Only positive zero is the default: `-0.0` and NaN are kept.
    fn is_zero(&self) -> bool {
        self.to_bits() == 0
    }
}

/// A value that can be stored as an element of a list column.
pub trait ListValue: Copy {
    /// Wraps the given lists in the matching column variant.
    fn into_column(values: Vec<Option<Vec<Self>>>) -> ColumnData;
}

impl ListValue for u64 {
    fn into_column(values: Vec<Option<Vec<Self>>>) -> ColumnData {
        ColumnData::ListUInt64(values)
    }
}

impl ListValue for f64 {
    fn into_column(values: Vec<Option<Vec<Self>>>) -> ColumnData {
        ColumnData::ListFloat64(values)
    }
}

/// Builder for fixed-width columns.
#[derive(Debug, Default)]
pub struct PrimitiveBuilder<T> {
    values: Vec<Option<T>>,
}

impl<T: ColumnValue> PrimitiveBuilder<T> {
    /// Creates a new, empty builder.
    pub fn new() -> Self {
        Self { values: Vec::new() }
    }

    /// Appends a value.
    pub fn append(&mut self, value: T) {
        self.values.push(Some(value));
    }

    /// Appends a null.
    pub fn append_null(&mut self) {
        self.values.push(None);
    }

    /// Appends a value, or a null if `value` is `None`.
    pub fn append_option(&mut self, value: Option<T>) {
        self.values.push(value);
    }

    /// Appends a value, or a null if the value is the type's zero value.
    pub fn append_non_zero(&mut self, value: T) {
        if value.is_zero() {
            self.values.push(None);
        } else {
            self.values.push(Some(value));
        }
    }

    /// Returns the number of appended values.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns `true` if nothing has been appended.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Discards all appended values.
    pub fn reset(&mut self) {
        self.values.clear();
    }

    /// Takes the appended values out of the builder.
    pub fn finish(&mut self) -> ColumnData {
        T::into_column(mem::take(&mut self.values))
    }
}

/// Builder for UTF-8 string columns.
#[derive(Debug, Default)]
pub struct StringBuilder {
    values: Vec<Option<String>>,
}

impl StringBuilder {
    /// Creates a new, empty builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a string.
    pub fn append(&mut self, value: &str) {
        self.values.push(Some(value.to_string()));
    }

    /// Appends a null.
    pub fn append_null(&mut self) {
        self.values.push(None);
    }

    /// Appends a string, or a null if `value` is `None`.
    pub fn append_option(&mut self, value: Option<&str>) {
        self.values.push(value.map(str::to_string));
    }

    /// Appends a string, or a null if it is empty.
    pub fn append_non_empty(&mut self, value: &str) {
        if value.is_empty() {
            self.values.push(None);
        } else {
            self.append(value);
        }
    }

    /// Returns the number of appended values.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns `true` if nothing has been appended.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Discards all appended values.
    pub fn reset(&mut self) {
        self.values.clear();
    }

    /// Takes the appended values out of the builder.
    pub fn finish(&mut self) -> ColumnData {
        ColumnData::Utf8(mem::take(&mut self.values))
    }
}

/// Builder for raw byte columns.
#[derive(Debug, Default)]
pub struct BinaryBuilder {
    values: Vec<Option<Vec<u8>>>,
}

impl BinaryBuilder {
    /// Creates a new, empty builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a byte string.
    pub fn append(&mut self, value: &[u8]) {
        self.values.push(Some(value.to_vec()));
    }

    /// Appends a null.
    pub fn append_null(&mut self) {
        self.values.push(None);
    }

    /// Appends a byte string, or a null if `value` is `None`.
    pub fn append_option(&mut self, value: Option<&[u8]>) {
        self.values.push(value.map(<[u8]>::to_vec));
    }

    /// Appends a byte string, or a null if it is empty.
    pub fn append_non_empty(&mut self, value: &[u8]) {
        if value.is_empty() {
            self.values.push(None);
        } else {
            self.append(value);
        }
    }

    /// Returns the number of appended values.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns `true` if nothing has been appended.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Discards all appended values.
    pub fn reset(&mut self) {
        self.values.clear();
    }

    /// Takes the appended values out of the builder.
    pub fn finish(&mut self) -> ColumnData {
        ColumnData::Binary(mem::take(&mut self.values))
    }
}

/// Builder for list columns.
#[derive(Debug, Default)]
pub struct ListBuilder<T> {
    values: Vec<Option<Vec<T>>>,
}

impl<T: ListValue> ListBuilder<T> {
    /// Creates a new, empty builder.
    pub fn new() -> Self {
        Self { values: Vec::new() }
    }

    /// Appends a list.
    pub fn append(&mut self, value: &[T]) {
        self.values.push(Some(value.to_vec()));
    }

    /// Appends a null.
    pub fn append_null(&mut self) {
        self.values.push(None);
    }

    /// Appends a list, or a null if it is empty.
    pub fn append_non_empty(&mut self, value: &[T]) {
        if value.is_empty() {
            self.values.push(None);
        } else {
            self.append(value);
        }
    }

    /// Returns the number of appended values.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns `true` if nothing has been appended.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Discards all appended values.
    pub fn reset(&mut self) {
        self.values.clear();
    }

    /// Takes the appended values out of the builder.
    pub fn finish(&mut self) -> ColumnData {
        T::into_column(mem::take(&mut self.values))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sparse_appends() {
        let mut builder = PrimitiveBuilder::<u32>::new();
        builder.append_non_zero(0);
        builder.append_non_zero(7);
        builder.append_option(None);
        builder.append(0);

        assert_eq!(builder.finish(), ColumnData::UInt32(vec![None, Some(7), None, Some(0)]));
        assert!(builder.is_empty());

        let mut builder = StringBuilder::new();
        builder.append_non_empty("");
        builder.append_non_empty("x");
        builder.append_option(Some(""));
        assert_eq!(
            builder.finish(),
            ColumnData::Utf8(vec![None, Some("x".into()), Some(String::new())])
        );
    }

    #[test]
    fn negative_zero_is_not_sparse() {
        let mut builder = PrimitiveBuilder::<f64>::new();
        builder.append_non_zero(0.0);
        builder.append_non_zero(-0.0);
        builder.append_non_zero(f64::NAN);

        let values = builder.finish().as_f64().map(<[_]>::to_vec).unwrap();
        assert_eq!(values[0], None);
        assert_eq!(values[1].map(f64::to_bits), Some((-0.0f64).to_bits()));
        assert!(values[2].is_some_and(f64::is_nan));
    }

    #[test]
    fn finish_takes_values() {
        let mut builder = ListBuilder::<f64>::new();
        builder.append(&[1.0, 2.0]);
        builder.append_non_empty(&[]);
        assert_eq!(builder.len(), 2);
        assert_eq!(
            builder.finish(),
            ColumnData::ListFloat64(vec![Some(vec![1.0, 2.0]), None])
        );
        assert_eq!(builder.finish(), ColumnData::ListFloat64(vec![]));

        let mut builder = BinaryBuilder::new();
        builder.append(&[1, 2]);
        builder.reset();
        builder.append_null();
        assert_eq!(builder.finish(), ColumnData::Binary(vec![None]));
    }
}
