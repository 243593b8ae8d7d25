//! Batch producers.
//!
//! A [`Producer`] ties an encoder, which turns a telemetry tree into record batches, to a [`StreamProducer`], which
//! turns record batches into payloads. A batch is atomic: when encoding or writing fails, nothing is emitted and the
//! batch ID is not consumed.
use strata_config::ConfigurationError;
use strata_model::TelemetryKind;
use tracing::{debug, error};

use crate::{
    column::RecordBatch,
    config::EncoderConfig,
    error::EncodeError,
    metrics::MetricsEncoder,
    stream::{BatchEnvelope, Payload, PayloadType, StreamProducer},
    telemetry::Telemetry,
    traces::TracesEncoder,
};

/// Record batches encoded from one telemetry tree.
#[derive(Debug)]
pub struct EncodedBatch {
    /// Record batches, main table first, related tables in declaration order.
    pub records: Vec<(PayloadType, RecordBatch)>,

    /// Number of main-table rows.
    pub rows: usize,

    /// Number of rebuilds caused by schema changes.
    pub retries: usize,
}

/// Encodes one kind of telemetry into record batches.
pub trait TelemetryEncoder {
    /// Telemetry tree accepted by the encoder.
    type Input;

    /// Kind of telemetry, used to label logs and metrics.
    const KIND: TelemetryKind;

    /// Creates an encoder from the given configuration.
    fn from_config(config: &EncoderConfig) -> Self;

    /// Encodes a telemetry tree.
    ///
    /// # Errors
    ///
    /// If the tree cannot be encoded, an error is returned and the encoder holds no state from the failed batch.
    fn encode(&mut self, input: &Self::Input) -> Result<EncodedBatch, EncodeError>;
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum State {
    Active,
    Poisoned,
    Released,
}

/// Produces payload envelopes from telemetry trees.
pub struct Producer<E> {
    encoder: E,
    streams: StreamProducer,
    state: State,
    telemetry: Telemetry,
}

/// A producer of traces batches.
pub type TracesProducer = Producer<TracesEncoder>;

/// A producer of metrics batches.
pub type MetricsProducer = Producer<MetricsEncoder>;

impl<E: TelemetryEncoder> Producer<E> {
    /// Creates a new `Producer` from the given configuration.
    ///
    /// # Errors
    ///
    /// If the configuration holds unsupported values, an error is returned.
    pub fn new(config: &EncoderConfig) -> Result<Self, ConfigurationError> {
        config.validate()?;
        Ok(Self::with_telemetry(config, Telemetry::new(E::KIND)))
    }

    pub(crate) fn with_telemetry(config: &EncoderConfig, telemetry: Telemetry) -> Self {
        Self {
            encoder: E::from_config(config),
            streams: StreamProducer::with_telemetry(config.dictionary_policy, telemetry.clone()),
            state: State::Active,
            telemetry,
        }
    }

    /// Returns `true` if the producer hit a fatal error and refuses further work.
    pub fn is_poisoned(&self) -> bool {
        self.state == State::Poisoned
    }

    /// Returns the number of open streams.
    pub fn open_streams(&self) -> usize {
        self.streams.open_streams()
    }

    /// Encodes a telemetry tree into a batch envelope.
    ///
    /// # Errors
    ///
    /// If the batch cannot be encoded or written, an error is returned and nothing from the batch is emitted. A
    /// `SchemaDrift` error poisons the producer: every later call returns `Poisoned`. Calls after
    /// [`close`][Self::close] return `Released`.
    pub fn produce(&mut self, input: &E::Input) -> Result<BatchEnvelope, EncodeError> {
        match self.state {
            State::Active => {}
            State::Poisoned => return Err(EncodeError::Poisoned),
            State::Released => return Err(EncodeError::Released),
        }

        match self.try_produce(input) {
            Ok(envelope) => Ok(envelope),
            Err(e) => {
                self.telemetry.batches_failed().increment(1);
                if e.is_fatal() {
                    error!(telemetry_kind = E::KIND.as_str(), error = %e, "Fatal encoder error. Producer poisoned.");
                    self.state = State::Poisoned;
                } else {
                    debug!(telemetry_kind = E::KIND.as_str(), error = %e, "Failed to produce batch.");
                }
                Err(e)
            }
        }
    }

    fn try_produce(&mut self, input: &E::Input) -> Result<BatchEnvelope, EncodeError> {
        let encoded = self.encoder.encode(input)?;
        if encoded.retries > 0 {
            self.telemetry.schema_retries().increment(encoded.retries as u64);
        }

        let envelope = self.streams.produce(&encoded.records)?;
        self.telemetry.batches_produced().increment(1);
        self.telemetry.rows_encoded().increment(encoded.rows as u64);
        for payload in &envelope.payloads {
            self.telemetry.payload_bytes().record(payload.bytes.len() as f64);
        }

        debug!(
            telemetry_kind = E::KIND.as_str(),
            batch_id = envelope.batch_id,
            rows = encoded.rows,
            payloads = envelope.payloads.len(),
            bytes = envelope.encoded_len(),
            "Produced batch."
        );
        Ok(envelope)
    }

    /// Releases the producer, closing every open stream and returning the end-of-stream payloads.
    ///
    /// Closing is idempotent: later calls return no payloads. A poisoned producer can still be closed.
    ///
    /// # Errors
    ///
    /// If a stream cannot be closed, a `StreamIo` error is returned. The producer is released regardless.
    pub fn close(&mut self) -> Result<Vec<Payload>, EncodeError> {
        if self.state == State::Released {
            return Ok(Vec::new());
        }
        self.state = State::Released;
        self.streams.close()
    }
}
