//! Related-data accumulators.
//!
//! Related data (attributes, events, links, data points, exemplars) is written to side tables, one row per related
//! record, each carrying the identifier of the row that owns it. Owners are appended in main-table order, so the owner
//! identifiers in every side table are non-decreasing and correlation is purely positional.
use std::{fmt, marker::PhantomData};

use crate::{
    column::{builder::ColumnValue, ColumnData, SchemaDef},
    error::EncodeError,
};

pub mod attributes;
pub use self::attributes::{AttributesBuilder, ValueType};

pub mod datapoints;
pub use self::datapoints::{
    ExpHistogramDataPointsBuilder, HistogramDataPointsBuilder, NumberDataPointsBuilder, SummaryDataPointsBuilder,
};

pub mod events;
pub use self::events::EventsBuilder;

pub mod exemplars;
pub use self::exemplars::ExemplarsBuilder;

pub mod links;
pub use self::links::LinksBuilder;

/// An integer type used for row identifiers.
pub trait RowId: ColumnValue + Ord + Into<u64> + TryFrom<u64> + fmt::Display {}

impl RowId for u16 {}
impl RowId for u32 {}

/// Allocates sequential row identifiers, failing once they no longer fit in `T`.
#[derive(Debug)]
pub struct IdAllocator<T> {
    entity: &'static str,
    next: u64,
    _id: PhantomData<T>,
}

impl<T: RowId> IdAllocator<T> {
    /// Creates a new `IdAllocator` for the given kind of row.
    pub fn new(entity: &'static str) -> Self {
        Self {
            entity,
            next: 0,
            _id: PhantomData,
        }
    }

    /// Allocates the next identifier.
    ///
    /// # Errors
    ///
    /// If the identifier does not fit in `T`, a `CapacityExceeded` error is returned.
    pub fn allocate(&mut self) -> Result<T, EncodeError> {
        let id = T::try_from(self.next).map_err(|_| EncodeError::CapacityExceeded {
            entity: self.entity,
            id: self.next,
        })?;
        self.next += 1;
        Ok(id)
    }

    /// Restarts allocation at zero.
    pub fn reset(&mut self) {
        self.next = 0;
    }
}

/// Checks that owner identifiers are appended in non-decreasing order, and that appends are non-empty.
#[derive(Debug)]
pub(crate) struct OwnerOrder<T> {
    table: &'static str,
    last: Option<T>,
}

impl<T: RowId> OwnerOrder<T> {
    pub fn new(table: &'static str) -> Self {
        Self { table, last: None }
    }

    pub fn check(&mut self, owner: T, count: usize) -> Result<(), EncodeError> {
        if count == 0 {
            return Err(EncodeError::AppendMismatch {
                table: self.table,
                reason: format!("empty append for owner {}", owner),
            });
        }

        if let Some(last) = self.last {
            if owner < last {
                return Err(EncodeError::AppendMismatch {
                    table: self.table,
                    reason: format!("owner {} appended after owner {}", owner, last),
                });
            }
        }

        self.last = Some(owner);
        Ok(())
    }

    pub fn reset(&mut self) {
        self.last = None;
    }
}

/// The finished columns of one table, indexed by field ordinal.
#[derive(Debug)]
pub struct FinishedTable {
    /// Table definition.
    pub def: &'static SchemaDef,

    /// Columns, one per field of the definition.
    pub columns: Vec<ColumnData>,
}

impl FinishedTable {
    /// Returns the number of rows in the table.
    pub fn num_rows(&self) -> usize {
        self.columns.first().map_or(0, ColumnData::len)
    }
}

/// A builder that accumulates one or more tables.
pub trait Accumulator {
    /// Discards everything appended so far, including in nested builders.
    fn reset(&mut self);

    /// Takes the finished columns of every table out of the builder, including nested builders.
    fn finish(&mut self, out: &mut Vec<FinishedTable>);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocator_is_bounded() {
        let mut ids = IdAllocator::<u16>::new("span");
        for expected in 0..=u16::MAX {
            assert_eq!(ids.allocate().unwrap(), expected);
        }
        assert!(matches!(
            ids.allocate(),
            Err(EncodeError::CapacityExceeded { entity: "span", id: 65536 })
        ));

        ids.reset();
        assert_eq!(ids.allocate().unwrap(), 0);
    }

    #[test]
    fn owner_order() {
        let mut order = OwnerOrder::<u32>::new("t");
        order.check(1, 1).unwrap();
        order.check(1, 3).unwrap();
        order.check(4, 1).unwrap();
        assert!(order.check(2, 1).is_err());
        assert!(order.check(5, 0).is_err());

        order.reset();
        order.check(0, 1).unwrap();
    }
}
