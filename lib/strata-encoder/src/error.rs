use snafu::Snafu;

use crate::stream::PayloadType;

/// An encoder error.
#[derive(Debug, Snafu)]
#[snafu(context(suffix(false)), visibility(pub(crate)))]
pub enum EncodeError {
    /// An identifier space was exhausted.
    ///
    /// Entity and row identifiers are scoped to a single batch, so this error only fails the batch that triggered it.
    /// The producer can be used again afterwards, typically with smaller batches.
    #[snafu(display("identifier space exhausted for {} (next id: {})", entity, id))]
    CapacityExceeded {
        /// Kind of entity or row that ran out of identifiers.
        entity: &'static str,

        /// Identifier that could not be represented.
        id: u64,
    },

    /// The schema of a table kept changing across build attempts.
    ///
    /// This is fatal: the producer is poisoned and refuses all further work.
    #[snafu(display("schema of table '{}' still drifting after {} attempts", table, attempts))]
    SchemaDrift {
        /// Name of the table.
        table: &'static str,

        /// Number of build attempts made.
        attempts: usize,
    },

    /// Values appended to a table were inconsistent.
    #[snafu(display("append mismatch in table '{}': {}", table, reason))]
    AppendMismatch {
        /// Name of the table.
        table: &'static str,

        /// What was inconsistent.
        reason: String,
    },

    /// A stream writer failed.
    ///
    /// The affected stream is closed and removed, and no partial envelope is returned.
    #[snafu(display("failed to write stream {} ({})", schema_id, payload_type))]
    StreamIo {
        /// Schema ID of the stream.
        schema_id: String,

        /// Payload type of the stream.
        payload_type: PayloadType,

        /// Error source.
        source: protobuf::Error,
    },

    /// The producer hit a fatal error earlier and refuses further work.
    #[snafu(display("producer is poisoned after a fatal error"))]
    Poisoned,

    /// The producer was used after being released.
    #[snafu(display("producer used after release"))]
    Released,
}

impl EncodeError {
    /// Returns `true` if this error leaves the producer permanently unusable.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::SchemaDrift { .. } | Self::Poisoned)
    }
}

/// Result of a single table build attempt that did not produce a record batch.
#[derive(Debug, Snafu)]
#[snafu(context(suffix(false)), visibility(pub(crate)))]
pub enum BuildError {
    /// The table's schema changed while building; the caller should rebuild the batch.
    #[snafu(display("schema of table '{}' is not up to date", table))]
    SchemaNotUpToDate {
        /// Name of the table.
        table: &'static str,
    },

    /// A non-retriable encoder error.
    #[snafu(display("{}", source))]
    Encode {
        /// Error source.
        source: EncodeError,
    },
}

impl From<EncodeError> for BuildError {
    fn from(source: EncodeError) -> Self {
        Self::Encode { source }
    }
}

/// A decoder error.
#[derive(Debug, Snafu)]
#[snafu(context(suffix(false)), visibility(pub(crate)))]
pub enum DecodeError {
    /// The payload bytes could not be read.
    #[snafu(display("malformed payload: {}", source))]
    Malformed {
        /// Error source.
        source: protobuf::Error,
    },

    /// A message was structurally invalid.
    #[snafu(display("invalid message: {}", reason))]
    InvalidMessage {
        /// What was invalid.
        reason: String,
    },

    /// A message kind was not recognized.
    #[snafu(display("unknown message kind {}", kind))]
    UnknownMessageKind {
        /// Kind code found on the wire.
        kind: u64,
    },

    /// A data type or encoding code was not recognized.
    #[snafu(display("unknown {} code {}", what, code))]
    UnknownCode {
        /// Which code space the value belongs to.
        what: &'static str,

        /// Code found on the wire.
        code: u64,
    },

    /// A payload referenced a stream the consumer has no state for.
    #[snafu(display("payload for unknown stream {} does not start with a schema", schema_id))]
    UnknownStream {
        /// Schema ID of the stream.
        schema_id: String,
    },

    /// A dictionary-encoded column referenced a value that was never sent.
    #[snafu(display("column '{}' references missing dictionary entry {}", field, key))]
    MissingDictionaryEntry {
        /// Name of the column.
        field: String,

        /// Dictionary key.
        key: u64,
    },

    /// A table needed for reassembly was missing, or lacked a required column.
    #[snafu(display("missing {} '{}'", what, name))]
    Missing {
        /// Whether a table or a column was missing.
        what: &'static str,

        /// Name of the missing table or column.
        name: String,
    },
}
