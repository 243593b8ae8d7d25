//! Record assembly.
//!
//! A [`RecordBuilder`] turns the finished columns of one table into a [`RecordBatch`], tracking the table's schema as it
//! evolves. Optional columns join the schema the first time a batch holds a value for them, and dictionary columns whose
//! cardinality grows past the configured limit fall back to plain encoding. Both changes are sticky, and both are
//! reported as [`BuildError::SchemaNotUpToDate`] so that the caller rebuilds the whole batch against the new schema.
use std::sync::Arc;

use tracing::debug;

use crate::{
    column::{ColumnData, Encoding, Field, RecordBatch, Schema, SchemaDef},
    config::{DictionaryPolicy, EncoderConfig},
    error::{BuildError, EncodeError},
    related::FinishedTable,
    stream::PayloadType,
};

/// Maximum number of rebuilds after a schema change before giving up.
pub const MAX_SCHEMA_RETRIES: usize = 5;

/// Per-field schema state.
#[derive(Clone, Debug)]
pub struct SchemaState {
    present: Vec<bool>,
    dictionary: Vec<bool>,
}

impl SchemaState {
    fn new(def: &SchemaDef, use_dictionaries: bool) -> Self {
        Self {
            present: def.fields.iter().map(|f| !f.optional).collect(),
            dictionary: def
                .fields
                .iter()
                .map(|f| use_dictionaries && f.encoding == Encoding::Dictionary)
                .collect(),
        }
    }

    /// Returns `true` if the field at `ordinal` is part of the schema.
    pub fn is_present(&self, ordinal: usize) -> bool {
        self.present.get(ordinal).copied().unwrap_or(false)
    }

    /// Returns `true` if the field at `ordinal` is dictionary-encoded.
    pub fn is_dictionary(&self, ordinal: usize) -> bool {
        self.dictionary.get(ordinal).copied().unwrap_or(false)
    }
}

/// Assembles finished columns into record batches for one table.
pub struct RecordBuilder {
    def: &'static SchemaDef,
    state: SchemaState,
    max_cardinality: usize,
    schema: Arc<Schema>,
}

impl RecordBuilder {
    /// Creates a new `RecordBuilder` for the given table.
    ///
    /// When `use_dictionaries` is `false`, dictionary-eligible fields are declared plain from the start.
    pub fn new(def: &'static SchemaDef, use_dictionaries: bool, max_cardinality: usize) -> Self {
        let state = SchemaState::new(def, use_dictionaries);
        let schema = Arc::new(build_schema(def, &state));
        Self {
            def,
            state,
            max_cardinality,
            schema,
        }
    }

    /// Returns the table definition.
    pub fn def(&self) -> &'static SchemaDef {
        self.def
    }

    /// Returns the current schema state.
    pub fn state(&self) -> &SchemaState {
        &self.state
    }

    /// Returns the current schema.
    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    /// Assembles a record batch from one finished column per table field, indexed by field ordinal.
    ///
    /// # Errors
    ///
    /// If the number of columns, their lengths, or their data types do not match the table definition, an
    /// `AppendMismatch` error is returned. If the schema had to change to accommodate the columns,
    /// `SchemaNotUpToDate` is returned and the caller must rebuild the batch.
    pub fn assemble(&mut self, columns: Vec<ColumnData>) -> Result<RecordBatch, BuildError> {
        let table = self.def.name;
        if columns.len() != self.def.fields.len() {
            return Err(EncodeError::AppendMismatch {
                table,
                reason: format!("expected {} columns, got {}", self.def.fields.len(), columns.len()),
            }
            .into());
        }

        let num_rows = columns.first().map_or(0, ColumnData::len);
        let mut changed = false;
        for (ordinal, (field, column)) in self.def.fields.iter().zip(&columns).enumerate() {
            if column.data_type() != field.data_type {
                return Err(EncodeError::AppendMismatch {
                    table,
                    reason: format!(
                        "column '{}' is {}, expected {}",
                        field.name,
                        column.data_type(),
                        field.data_type
                    ),
                }
                .into());
            }

            if column.len() != num_rows {
                return Err(EncodeError::AppendMismatch {
                    table,
                    reason: format!("column '{}' has {} rows, expected {}", field.name, column.len(), num_rows),
                }
                .into());
            }

            if !self.state.present[ordinal] && column.has_values() {
                debug!(table, field = field.name, "Optional column now present.");
                self.state.present[ordinal] = true;
                changed = true;
            }

            if self.state.dictionary[ordinal] {
                let cardinality = column.distinct_count().unwrap_or(0);
                if cardinality > self.max_cardinality {
                    debug!(
                        table,
                        field = field.name,
                        cardinality,
                        limit = self.max_cardinality,
                        "Dictionary cardinality limit exceeded. Falling back to plain encoding."
                    );
                    self.state.dictionary[ordinal] = false;
                    changed = true;
                }
            }
        }

        if changed {
            self.schema = Arc::new(build_schema(self.def, &self.state));
            return Err(BuildError::SchemaNotUpToDate { table });
        }

        let columns = columns
            .into_iter()
            .enumerate()
            .filter(|(ordinal, _)| self.state.present[*ordinal])
            .map(|(_, column)| column)
            .collect();

        Ok(RecordBatch::new(Arc::clone(&self.schema), columns, num_rows))
    }
}

fn build_schema(def: &SchemaDef, state: &SchemaState) -> Schema {
    let fields = def
        .fields
        .iter()
        .enumerate()
        .filter(|(ordinal, _)| state.is_present(*ordinal))
        .map(|(ordinal, field)| {
            let encoding = match field.encoding {
                Encoding::Dictionary if !state.is_dictionary(ordinal) => Encoding::Plain,
                encoding => encoding,
            };
            Field {
                name: field.name.to_string(),
                data_type: field.data_type,
                encoding,
            }
        })
        .collect();

    Schema {
        name: def.name.to_string(),
        fields,
    }
}

/// The record builders of every table an encoder produces.
///
/// The first table is the main table. It is always part of the output, even when empty, while related tables are only
/// emitted when they hold rows. Output follows declaration order.
pub(crate) struct TableSet {
    tables: Vec<(PayloadType, RecordBuilder)>,
}

impl TableSet {
    pub fn new(tables: &[(PayloadType, &'static SchemaDef)], config: &EncoderConfig) -> Self {
        let use_dictionaries = config.dictionary_policy != DictionaryPolicy::None;
        let tables = tables
            .iter()
            .map(|(payload_type, def)| {
                let builder = RecordBuilder::new(def, use_dictionaries, config.dictionary.max_cardinality);
                (*payload_type, builder)
            })
            .collect();
        Self { tables }
    }

    /// Assembles the finished tables of one build attempt.
    ///
    /// Every table is assembled even after one of them reports a schema change, so that a single retry picks up all of
    /// the changes the batch causes.
    pub fn assemble(
        &mut self, finished: Vec<FinishedTable>,
    ) -> Result<Vec<(PayloadType, RecordBatch)>, BuildError> {
        let mut records = Vec::with_capacity(finished.len());
        let mut drifted = None;

        for table in finished {
            let index = self
                .tables
                .iter()
                .position(|(_, builder)| builder.def().name == table.def.name)
                .ok_or_else(|| EncodeError::AppendMismatch {
                    table: table.def.name,
                    reason: "table is not produced by this encoder".to_string(),
                })?;
            if index != 0 && table.num_rows() == 0 {
                continue;
            }

            let (payload_type, builder) = &mut self.tables[index];
            match builder.assemble(table.columns) {
                Ok(batch) => records.push((index, *payload_type, batch)),
                Err(BuildError::SchemaNotUpToDate { table }) => {
                    drifted.get_or_insert(table);
                }
                Err(e) => return Err(e),
            }
        }

        if let Some(table) = drifted {
            return Err(BuildError::SchemaNotUpToDate { table });
        }

        records.sort_by_key(|(index, _, _)| *index);
        Ok(records
            .into_iter()
            .map(|(_, payload_type, batch)| (payload_type, batch))
            .collect())
    }
}

/// Runs `attempt` until it stops reporting schema changes.
///
/// `attempt` must reset all of its builders before appending, since every retry rebuilds the batch from scratch. The
/// first call is not a retry; after [`MAX_SCHEMA_RETRIES`] retries, a `SchemaDrift` error is returned. Returns the
/// result along with the number of retries that were needed.
pub fn assemble_with_retry<T, F>(table: &'static str, mut attempt: F) -> Result<(T, usize), EncodeError>
where
    F: FnMut() -> Result<T, BuildError>,
{
    let mut retries = 0;
    loop {
        match attempt() {
            Ok(value) => return Ok((value, retries)),
            Err(BuildError::SchemaNotUpToDate { table: drifted }) => {
                if retries == MAX_SCHEMA_RETRIES {
                    return Err(EncodeError::SchemaDrift {
                        table: drifted,
                        attempts: retries + 1,
                    });
                }
                retries += 1;
                debug!(table, drifted, retries, "Schema changed while building batch. Retrying.");
            }
            Err(BuildError::Encode { source }) => return Err(source),
        }
    }
}
