use std::sync::Arc;

use protobuf::CodedInputStream;
use tracing::debug;

use super::{
    wire::{self, Message},
    BatchEnvelope, Payload, PayloadType,
};
use crate::{
    collections::FastHashMap,
    column::{Encoding, RecordBatch, Schema},
    error::DecodeError,
};

struct StreamState {
    schema: Arc<Schema>,
    dictionaries: Vec<Vec<String>>,
}

/// Record batches decoded from one envelope.
#[derive(Debug)]
pub struct DecodedBatch {
    /// Sequence number of the batch.
    pub batch_id: u64,

    /// Decoded tables, in payload order.
    pub tables: Vec<(PayloadType, RecordBatch)>,
}

impl DecodedBatch {
    /// Returns the decoded table of the given payload type, if present.
    pub fn table(&self, payload_type: PayloadType) -> Option<&RecordBatch> {
        self.tables
            .iter()
            .find(|(pt, _)| *pt == payload_type)
            .map(|(_, batch)| batch)
    }
}

/// Decodes payloads back into record batches.
///
/// The consumer keeps the schema and dictionaries of every open stream, keyed by schema ID. Payloads of a stream must be
/// consumed in the order they were produced; the state of a stream is dropped when its end-of-stream marker is read.
#[derive(Default)]
pub struct StreamConsumer {
    streams: FastHashMap<String, StreamState>,
}

impl StreamConsumer {
    /// Creates a new, empty `StreamConsumer`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of streams the consumer holds state for.
    pub fn open_streams(&self) -> usize {
        self.streams.len()
    }

    /// Decodes every record batch in the given payload.
    ///
    /// # Errors
    ///
    /// If the payload belongs to a stream the consumer never saw a schema for, an `UnknownStream` error is returned.
    /// If the payload is malformed, or references dictionary values that were never sent, an error is returned.
    pub fn consume(&mut self, payload: &Payload) -> Result<Vec<RecordBatch>, DecodeError> {
        let mut is = CodedInputStream::from_bytes(&payload.bytes);
        let mut batches = Vec::new();

        while let Some(message) = wire::read_frame(&mut is)? {
            match message {
                Message::Schema(schema) => {
                    if schema.name != payload.payload_type.as_str() {
                        return Err(DecodeError::InvalidMessage {
                            reason: format!(
                                "schema for table '{}' in {} payload",
                                schema.name, payload.payload_type
                            ),
                        });
                    }
                    debug!(schema_id = %payload.schema_id, identity = %schema.identity(), "Stream opened.");
                    let dictionaries = vec![Vec::new(); schema.fields.len()];
                    self.streams.insert(
                        payload.schema_id.clone(),
                        StreamState {
                            schema: Arc::new(schema),
                            dictionaries,
                        },
                    );
                }
                Message::Dictionary(update) => {
                    let state = self.state_mut(&payload.schema_id)?;
                    let is_dictionary = state
                        .schema
                        .fields
                        .get(update.field)
                        .is_some_and(|field| field.encoding == Encoding::Dictionary);
                    if !is_dictionary {
                        return Err(DecodeError::InvalidMessage {
                            reason: format!("dictionary for column {} which is not dictionary-encoded", update.field),
                        });
                    }

                    let dictionary = &mut state.dictionaries[update.field];
                    if !update.is_delta {
                        dictionary.clear();
                    }
                    dictionary.extend(update.values);
                }
                Message::RecordBatch(body) => {
                    let state = self.state_mut(&payload.schema_id)?;
                    let (columns, num_rows) = wire::read_record_batch(&body, &state.schema, &state.dictionaries)?;
                    batches.push(RecordBatch::new(Arc::clone(&state.schema), columns, num_rows));
                }
                Message::EndOfStream => {
                    if self.streams.remove(&payload.schema_id).is_none() {
                        return Err(DecodeError::UnknownStream {
                            schema_id: payload.schema_id.clone(),
                        });
                    }
                    debug!(schema_id = %payload.schema_id, "Stream closed.");
                }
            }
        }

        Ok(batches)
    }

    /// Decodes every payload of the given envelope.
    ///
    /// # Errors
    ///
    /// If any payload fails to decode, or does not hold exactly one record batch, an error is returned.
    pub fn consume_envelope(&mut self, envelope: &BatchEnvelope) -> Result<DecodedBatch, DecodeError> {
        let mut tables = Vec::with_capacity(envelope.payloads.len());
        for payload in &envelope.payloads {
            let mut batches = self.consume(payload)?;
            if batches.len() != 1 {
                return Err(DecodeError::InvalidMessage {
                    reason: format!(
                        "{} payload holds {} record batches, expected 1",
                        payload.payload_type,
                        batches.len()
                    ),
                });
            }
            if let Some(batch) = batches.pop() {
                tables.push((payload.payload_type, batch));
            }
        }

        Ok(DecodedBatch {
            batch_id: envelope.batch_id,
            tables,
        })
    }

    fn state_mut(&mut self, schema_id: &str) -> Result<&mut StreamState, DecodeError> {
        self.streams.get_mut(schema_id).ok_or_else(|| DecodeError::UnknownStream {
            schema_id: schema_id.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;

    use super::*;
    use crate::{
        column::{ColumnData, DataType, Field},
        config::DictionaryPolicy,
        stream::StreamProducer,
        telemetry::Telemetry,
    };

    fn batch(names: &[&str]) -> RecordBatch {
        let schema = Arc::new(Schema {
            name: "spans".into(),
            fields: vec![Field {
                name: "name".into(),
                data_type: DataType::Utf8,
                encoding: Encoding::Dictionary,
            }],
        });
        let column = ColumnData::Utf8(names.iter().map(|n| Some(n.to_string())).collect());
        RecordBatch::new(schema, vec![column], names.len())
    }

    #[test]
    fn incremental_stream_round_trip() {
        let mut producer = StreamProducer::with_telemetry(DictionaryPolicy::Incremental, Telemetry::noop());
        let mut consumer = StreamConsumer::new();

        for names in [&["a", "b"][..], &["b", "c"], &["a"]] {
            let envelope = producer.produce(&[(PayloadType::Spans, batch(names))]).unwrap();
            let decoded = consumer.consume_envelope(&envelope).unwrap();
            assert_eq!(decoded.table(PayloadType::Spans), Some(&batch(names)));
        }
        assert_eq!(consumer.open_streams(), 1);

        for payload in producer.close().unwrap() {
            assert!(consumer.consume(&payload).unwrap().is_empty());
        }
        assert_eq!(consumer.open_streams(), 0);
    }

    #[test]
    fn later_payload_alone_is_unknown() {
        let mut producer = StreamProducer::with_telemetry(DictionaryPolicy::Incremental, Telemetry::noop());
        producer.produce(&[(PayloadType::Spans, batch(&["a"]))]).unwrap();
        let second = producer.produce(&[(PayloadType::Spans, batch(&["a"]))]).unwrap();

        let mut consumer = StreamConsumer::new();
        assert!(matches!(
            consumer.consume_envelope(&second),
            Err(DecodeError::UnknownStream { .. })
        ));
    }

    #[test]
    fn schema_must_match_payload_type() {
        let mut producer = StreamProducer::with_telemetry(DictionaryPolicy::PerBatch, Telemetry::noop());
        let mut envelope = producer.produce(&[(PayloadType::Spans, batch(&["a"]))]).unwrap();
        envelope.payloads[0].payload_type = PayloadType::Metrics;

        let mut consumer = StreamConsumer::new();
        assert!(matches!(
            consumer.consume_envelope(&envelope),
            Err(DecodeError::InvalidMessage { .. })
        ));
    }

    #[test]
    fn garbage_is_malformed() {
        let payload = Payload {
            schema_id: "0".into(),
            payload_type: PayloadType::Spans,
            bytes: Bytes::from_static(&[1, 200]),
        };
        assert!(matches!(
            StreamConsumer::new().consume(&payload),
            Err(DecodeError::Malformed { .. })
        ));
    }
}
