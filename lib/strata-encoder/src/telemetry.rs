use metrics::{counter, histogram, Counter, Histogram};
use strata_model::TelemetryKind;

/// Producer telemetry.
#[derive(Clone)]
pub struct Telemetry {
    batches_produced: Counter,
    batches_failed: Counter,
    rows_encoded: Counter,
    payload_bytes: Histogram,
    schema_retries: Counter,
    streams_opened: Counter,
    streams_closed: Counter,
}

impl Telemetry {
    /// Creates a new `Telemetry` instance, labelled with the given telemetry kind.
    pub fn new(kind: TelemetryKind) -> Self {
        let kind = kind.as_str();
        Self {
            batches_produced: counter!("strata_encoder_batches_produced_total", "telemetry_kind" => kind),
            batches_failed: counter!("strata_encoder_batches_failed_total", "telemetry_kind" => kind),
            rows_encoded: counter!("strata_encoder_rows_encoded_total", "telemetry_kind" => kind),
            payload_bytes: histogram!("strata_encoder_payload_bytes", "telemetry_kind" => kind),
            schema_retries: counter!("strata_encoder_schema_retries_total", "telemetry_kind" => kind),
            streams_opened: counter!("strata_encoder_streams_opened_total", "telemetry_kind" => kind),
            streams_closed: counter!("strata_encoder_streams_closed_total", "telemetry_kind" => kind),
        }
    }

    #[cfg(test)]
    pub fn noop() -> Self {
        Self {
            batches_produced: Counter::noop(),
            batches_failed: Counter::noop(),
            rows_encoded: Counter::noop(),
            payload_bytes: Histogram::noop(),
            schema_retries: Counter::noop(),
            streams_opened: Counter::noop(),
            streams_closed: Counter::noop(),
        }
    }

    pub fn batches_produced(&self) -> &Counter {
        &self.batches_produced
    }

    pub fn batches_failed(&self) -> &Counter {
        &self.batches_failed
    }

    pub fn rows_encoded(&self) -> &Counter {
        &self.rows_encoded
    }

    pub fn payload_bytes(&self) -> &Histogram {
        &self.payload_bytes
    }

    pub fn schema_retries(&self) -> &Counter {
        &self.schema_retries
    }

    pub fn streams_opened(&self) -> &Counter {
        &self.streams_opened
    }

    pub fn streams_closed(&self) -> &Counter {
        &self.streams_closed
    }
}
