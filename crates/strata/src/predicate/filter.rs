//! Row filters compiled from predicates.

use crate::error::Result;
use crate::field::ImmutableField;
use crate::range::RangeSet;
use crate::record::Record;
use std::fmt;
use std::ops::Bound;

/// Decides per record whether it belongs to a query result.
///
/// Filters see fully resolved records, never deltas.
pub trait RecordFilter: fmt::Debug {
    /// Returns true if `record` is accepted.
    fn accept(&mut self, record: &dyn Record) -> Result<bool>;

    /// Returns true once no later record can be accepted. Records are presented in
    /// timestamp order, so a filter bounded in time becomes done when a record
    /// passes its upper bound.
    fn is_done(&self) -> bool {
        false
    }
}

/// Accepts every record.
#[derive(Debug, Clone, Copy, Default)]
pub struct AcceptAllFilter;

impl RecordFilter for AcceptAllFilter {
    fn accept(&mut self, _record: &dyn Record) -> Result<bool> {
        Ok(true)
    }
}

/// Accepts records whose value for one field lies in a range set.
///
/// The field is resolved per record type; records of a type that does not declare
/// the field are rejected.
#[derive(Debug, Clone)]
pub struct FieldRangeFilter {
    name: String,
    targets: Vec<Option<(usize, RangeSet<ImmutableField>)>>,
    done: bool,
}

impl FieldRangeFilter {
    /// Creates a filter from per-record-type `(field index, accepted values)`
    /// pairs, `None` for types without the field.
    pub fn new(
        name: impl Into<String>,
        targets: Vec<Option<(usize, RangeSet<ImmutableField>)>>,
    ) -> Self {
        let done = targets
            .iter()
            .flatten()
            .all(|(index, ranges)| *index == 0 && ranges.is_empty());
        Self {
            name: name.into(),
            targets,
            done,
        }
    }

    /// The filtered field name.
    pub fn name(&self) -> &str {
        &self.name
    }
}

fn beyond_upper(value: &ImmutableField, ranges: &RangeSet<ImmutableField>) -> bool {
    match ranges.span() {
        None => true,
        Some(span) => match span.upper() {
            Bound::Included(upper) => value > upper,
            Bound::Excluded(upper) => value >= upper,
            Bound::Unbounded => false,
        },
    }
}

impl RecordFilter for FieldRangeFilter {
    fn accept(&mut self, record: &dyn Record) -> Result<bool> {
        let Some(Some((index, ranges))) = self.targets.get(record.record_type()) else {
            return Ok(false);
        };
        let value = ImmutableField::from(record.field(*index)?);
        if *index == 0 && beyond_upper(&value, ranges) {
            self.done = true;
        }
        Ok(ranges.contains(&value))
    }

    fn is_done(&self) -> bool {
        self.done
    }
}

/// Accepts records accepted by both filters.
#[derive(Debug)]
pub struct AndFilter {
    left: Box<dyn RecordFilter>,
    right: Box<dyn RecordFilter>,
}

impl AndFilter {
    /// Combines two filters.
    pub fn new(left: Box<dyn RecordFilter>, right: Box<dyn RecordFilter>) -> Self {
        Self { left, right }
    }
}

impl RecordFilter for AndFilter {
    fn accept(&mut self, record: &dyn Record) -> Result<bool> {
        // Both sides see every record so that their done state stays current.
        let left = self.left.accept(record)?;
        let right = self.right.accept(record)?;
        Ok(left && right)
    }

    fn is_done(&self) -> bool {
        self.left.is_done() || self.right.is_done()
    }
}

/// Accepts records accepted by either filter.
#[derive(Debug)]
pub struct OrFilter {
    left: Box<dyn RecordFilter>,
    right: Box<dyn RecordFilter>,
}

impl OrFilter {
    /// Combines two filters.
    pub fn new(left: Box<dyn RecordFilter>, right: Box<dyn RecordFilter>) -> Self {
        Self { left, right }
    }
}

impl RecordFilter for OrFilter {
    fn accept(&mut self, record: &dyn Record) -> Result<bool> {
        let left = self.left.accept(record)?;
        let right = self.right.accept(record)?;
        Ok(left || right)
    }

    fn is_done(&self) -> bool {
        self.left.is_done() && self.right.is_done()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::Field;
    use crate::range::Range;
    use crate::record::TimeSeriesRecord;

    fn record(record_type: usize, ts: i64, value: i64) -> TimeSeriesRecord {
        TimeSeriesRecord::new(record_type, vec![Field::NanosecondTimestamp(ts), Field::Long(value)])
    }

    fn ts_filter(lower: i64, upper: i64) -> FieldRangeFilter {
        let ranges = RangeSet::from_range(Range::closed_open(
            Field::NanosecondTimestamp(lower).into(),
            Field::NanosecondTimestamp(upper).into(),
        ));
        FieldRangeFilter::new("timestamp", vec![Some((0, ranges))])
    }

    #[test]
    fn test_timestamp_filter_becomes_done() {
        let mut filter = ts_filter(10, 20);
        assert!(!filter.accept(&record(0, 5, 0)).unwrap());
        assert!(!filter.is_done());
        assert!(filter.accept(&record(0, 19, 0)).unwrap());
        assert!(!filter.accept(&record(0, 20, 0)).unwrap());
        assert!(filter.is_done());
    }

    #[test]
    fn test_missing_field_rejects_type() {
        let ranges = RangeSet::from_range(Range::at_least(Field::Long(0).into()));
        let mut filter = FieldRangeFilter::new("v", vec![None, Some((1, ranges))]);
        assert!(!filter.accept(&record(0, 1, 5)).unwrap());
        assert!(filter.accept(&record(1, 1, 5)).unwrap());
        assert!(!filter.accept(&record(2, 1, 5)).unwrap());
        assert!(!filter.is_done());
    }

    #[test]
    fn test_empty_timestamp_set_is_done_immediately() {
        let filter = FieldRangeFilter::new("timestamp", vec![Some((0, RangeSet::new()))]);
        assert!(filter.is_done());
    }

    #[test]
    fn test_combinators() {
        let mut and = AndFilter::new(Box::new(ts_filter(0, 10)), Box::new(AcceptAllFilter));
        assert!(and.accept(&record(0, 5, 0)).unwrap());
        assert!(!and.accept(&record(0, 15, 0)).unwrap());
        assert!(and.is_done());

        let mut or = OrFilter::new(Box::new(ts_filter(0, 10)), Box::new(ts_filter(20, 30)));
        assert!(or.accept(&record(0, 25, 0)).unwrap());
        assert!(!or.is_done());
        assert!(!or.accept(&record(0, 30, 0)).unwrap());
        assert!(or.is_done());
    }
}
