use std::sync::Arc;

use hashbrown::hash_map::Entry;
use strata_model::TelemetryKind;
use tracing::debug;

use super::{BatchEnvelope, Payload, PayloadType, StreamWriter};
use crate::{
    collections::FastHashMap, column::RecordBatch, config::DictionaryPolicy, error::EncodeError, telemetry::Telemetry,
};

/// Turns record batches into payloads, maintaining one stream per schema.
///
/// Streams are keyed by schema identity. When the schema of a table changes, the table's previous stream is closed and
/// a new one, with a new schema ID, takes its place. Under [`DictionaryPolicy::PerBatch`], every stream is closed right
/// after its batch is written, so every payload is self-contained.
pub struct StreamProducer {
    policy: DictionaryPolicy,
    streams: FastHashMap<String, StreamWriter>,
    next_schema_id: u64,
    next_batch_id: u64,
    telemetry: Telemetry,
}

impl StreamProducer {
    /// Creates a new `StreamProducer`.
    pub fn new(kind: TelemetryKind, policy: DictionaryPolicy) -> Self {
        Self::with_telemetry(policy, Telemetry::new(kind))
    }

    pub(crate) fn with_telemetry(policy: DictionaryPolicy, telemetry: Telemetry) -> Self {
        Self {
            policy,
            streams: FastHashMap::default(),
            next_schema_id: 0,
            next_batch_id: 0,
            telemetry,
        }
    }

    /// Returns the number of open streams.
    pub fn open_streams(&self) -> usize {
        self.streams.len()
    }

    /// Writes the given record batches, one per table, and collects the resulting payloads into an envelope.
    ///
    /// # Errors
    ///
    /// If a stream cannot be written, a `StreamIo` error is returned. Every stream touched by the batch is closed and
    /// dropped, so that the next batch starts over with fresh schemas and full dictionaries, and no batch ID is
    /// consumed.
    pub fn produce(&mut self, records: &[(PayloadType, RecordBatch)]) -> Result<BatchEnvelope, EncodeError> {
        let mut payloads = Vec::with_capacity(records.len());
        let mut touched = Vec::with_capacity(records.len());
        for (payload_type, batch) in records {
            let identity = batch.schema().identity();
            match self.write(*payload_type, &identity, batch) {
                Ok(payload) => {
                    payloads.push(payload);
                    touched.push(identity);
                }
                Err(e) => {
                    for identity in touched {
                        self.drop_stream(&identity);
                    }
                    return Err(e);
                }
            }
        }

        let batch_id = self.next_batch_id;
        self.next_batch_id += 1;
        Ok(BatchEnvelope { batch_id, payloads })
    }

    fn write(
        &mut self, payload_type: PayloadType, identity: &str, batch: &RecordBatch,
    ) -> Result<Payload, EncodeError> {
        if !self.streams.contains_key(identity) {
            self.retire(payload_type);
        }

        let writer = match self.streams.entry(identity.to_string()) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => {
                let schema_id = self.next_schema_id.to_string();
                self.next_schema_id += 1;
                debug!(%payload_type, %schema_id, identity, "Opening stream.");
                self.telemetry.streams_opened().increment(1);
                entry.insert(StreamWriter::new(schema_id, payload_type, Arc::clone(batch.schema())))
            }
        };

        let close = self.policy == DictionaryPolicy::PerBatch;
        let result = writer
            .write(batch)
            .and_then(|()| if close { writer.close() } else { Ok(()) });
        let schema_id = writer.schema_id().to_string();
        let bytes = writer.take_output();

        match result {
            Ok(()) => {
                if close {
                    self.remove(identity);
                }
                Ok(Payload {
                    schema_id,
                    payload_type,
                    bytes,
                })
            }
            Err(source) => {
                self.drop_stream(identity);
                Err(EncodeError::StreamIo {
                    schema_id,
                    payload_type,
                    source,
                })
            }
        }
    }

    /// Closes the open stream of the given payload type, if any, discarding its end-of-stream marker.
    fn retire(&mut self, payload_type: PayloadType) {
        let identity = self
            .streams
            .iter()
            .find(|(_, writer)| writer.payload_type() == payload_type)
            .map(|(identity, _)| identity.clone());
        if let Some(identity) = identity {
            debug!(%payload_type, "Schema changed. Closing previous stream.");
            self.drop_stream(&identity);
        }
    }

    fn drop_stream(&mut self, identity: &str) {
        if let Some(mut writer) = self.streams.remove(identity) {
            // The end-of-stream marker is never delivered, so a failure to write it changes nothing.
            let _ = writer.close();
            self.telemetry.streams_closed().increment(1);
        }
    }

    fn remove(&mut self, identity: &str) {
        if self.streams.remove(identity).is_some() {
            self.telemetry.streams_closed().increment(1);
        }
    }

    /// Closes every open stream, returning the end-of-stream payloads.
    ///
    /// Closing with no open streams does nothing and returns no payloads.
    ///
    /// # Errors
    ///
    /// If a stream cannot be closed, a `StreamIo` error is returned. All streams are dropped regardless.
    pub fn close(&mut self) -> Result<Vec<Payload>, EncodeError> {
        let mut payloads = Vec::with_capacity(self.streams.len());
        let mut first_error = None;

        let mut writers = self.streams.drain().map(|(_, writer)| writer).collect::<Vec<_>>();
        writers.sort_by(|a, b| a.payload_type().cmp(&b.payload_type()));
        for mut writer in writers {
            self.telemetry.streams_closed().increment(1);
            let schema_id = writer.schema_id().to_string();
            let payload_type = writer.payload_type();
            match writer.close() {
                Ok(()) => {
                    let bytes = writer.take_output();
                    if !bytes.is_empty() {
                        payloads.push(Payload {
                            schema_id,
                            payload_type,
                            bytes,
                        });
                    }
                }
                Err(source) => {
                    first_error.get_or_insert(EncodeError::StreamIo {
                        schema_id,
                        payload_type,
                        source,
                    });
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(payloads),
        }
    }
}
