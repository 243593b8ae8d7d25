use std::sync::Arc;

use bytes::Bytes;

use super::{
    wire::{self, DictionaryUpdate, MessageKind},
    PayloadType,
};
use crate::{
    collections::FastHashMap,
    column::{Encoding, RecordBatch, Schema},
};

/// Assigns dictionary keys to the values of one column.
///
/// Keys start at zero and follow insertion order, so the values sent to a reader, concatenated, are the dictionary.
#[derive(Debug, Default)]
struct Interner {
    index: FastHashMap<String, u64>,
}

impl Interner {
    /// Gets the key for a value, inserting it if not present.
    ///
    /// Returns `(key, is_new)` where `is_new` is true if the value was newly inserted.
    fn get_or_insert(&mut self, value: &str) -> (u64, bool) {
        if let Some(&key) = self.index.get(value) {
            (key, false)
        } else {
            let key = self.index.len() as u64;
            self.index.insert(value.to_string(), key);
            (key, true)
        }
    }

    fn get(&self, value: &str) -> Option<u64> {
        self.index.get(value).copied()
    }

    fn is_empty(&self) -> bool {
        self.index.is_empty()
    }
}

/// Writes the record batches of one schema as a stream.
///
/// The first write emits the schema. Every write emits the dictionary values its batch introduces: the first update of
/// a column replaces the reader's dictionary, later ones extend it. Output accumulates until taken with
/// [`take_output`][Self::take_output].
#[derive(Debug)]
pub struct StreamWriter {
    schema_id: String,
    payload_type: PayloadType,
    schema: Arc<Schema>,
    dictionaries: Vec<Option<Interner>>,
    header_written: bool,
    closed: bool,
    output: Vec<u8>,
    scratch: Vec<u8>,
}

impl StreamWriter {
    /// Creates a new `StreamWriter` for the given schema.
    pub fn new(schema_id: String, payload_type: PayloadType, schema: Arc<Schema>) -> Self {
        let dictionaries = schema
            .fields
            .iter()
            .map(|field| (field.encoding == Encoding::Dictionary).then(Interner::default))
            .collect();
        Self {
            schema_id,
            payload_type,
            schema,
            dictionaries,
            header_written: false,
            closed: false,
            output: Vec::new(),
            scratch: Vec::new(),
        }
    }

    /// Returns the stream's schema ID.
    pub fn schema_id(&self) -> &str {
        &self.schema_id
    }

    /// Returns the payload type carried by the stream.
    pub fn payload_type(&self) -> PayloadType {
        self.payload_type
    }

    /// Returns the stream's schema.
    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    /// Returns `true` if the stream has been closed.
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Writes a record batch, preceded by the schema if this is the first write, and by any new dictionary values.
    ///
    /// # Errors
    ///
    /// If the stream is closed, if the batch does not have the stream's schema, or if the output cannot be written, an
    /// error is returned.
    pub fn write(&mut self, batch: &RecordBatch) -> Result<(), protobuf::Error> {
        if self.closed {
            return Err(io_error(format!("stream {} is closed", self.schema_id)));
        }
        if batch.schema() != &self.schema {
            return Err(io_error(format!(
                "batch schema '{}' does not match stream schema '{}'",
                batch.schema().identity(),
                self.schema.identity()
            )));
        }

        if !self.header_written {
            wire::write_frame(&mut self.output, &mut self.scratch, MessageKind::Schema, |os| {
                wire::write_schema(os, &self.schema)
            })?;
            self.header_written = true;
        }

        for (ordinal, column) in batch.columns().iter().enumerate() {
            let Some(interner) = self.dictionaries.get_mut(ordinal).and_then(Option::as_mut) else {
                continue;
            };
            let Some(values) = column.as_utf8() else {
                continue;
            };

            let is_delta = !interner.is_empty();
            let new_values = values
                .iter()
                .flatten()
                .filter(|value| interner.get_or_insert(value).1)
                .cloned()
                .collect::<Vec<_>>();
            if new_values.is_empty() {
                continue;
            }

            let update = DictionaryUpdate {
                field: ordinal,
                is_delta,
                values: new_values,
            };
            wire::write_frame(&mut self.output, &mut self.scratch, MessageKind::Dictionary, |os| {
                wire::write_dictionary(os, &update)
            })?;
        }

        let dictionaries = &self.dictionaries;
        wire::write_frame(&mut self.output, &mut self.scratch, MessageKind::RecordBatch, |os| {
            wire::write_record_batch(os, batch, |ordinal, value| {
                dictionaries.get(ordinal)?.as_ref()?.get(value)
            })
        })
    }

    /// Writes the end-of-stream marker.
    ///
    /// Closing an already closed stream does nothing. A stream that never wrote anything is closed without output.
    ///
    /// # Errors
    ///
    /// If the output cannot be written, an error is returned. The stream is considered closed regardless.
    pub fn close(&mut self) -> Result<(), protobuf::Error> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;

        if self.header_written {
            wire::write_frame(&mut self.output, &mut self.scratch, MessageKind::EndOfStream, |_| Ok(()))?;
        }
        Ok(())
    }

    /// Takes everything written since the last call.
    pub fn take_output(&mut self) -> Bytes {
        let output = Bytes::copy_from_slice(&self.output);
        self.output.clear();
        output
    }
}

fn io_error(reason: String) -> protobuf::Error {
    std::io::Error::new(std::io::ErrorKind::InvalidInput, reason).into()
}
