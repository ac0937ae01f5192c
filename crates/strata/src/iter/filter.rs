//! Predicate filtering over delta-encoded record streams.

use crate::error::{Result, StrataError};
use crate::iter::{CloseableIterator, ComputeNext, NextSlot, RecordIterator};
use crate::predicate::RecordFilter;
use crate::record::{BoxedRecord, Record, TimeSeriesRecord};

/// Returns the per-record-type slot at `record_type`, growing `slots` as needed.
pub(crate) fn type_slot<T>(slots: &mut Vec<Option<T>>, record_type: usize) -> &mut Option<T> {
    if slots.len() <= record_type {
        slots.resize_with(record_type + 1, || None);
    }
    &mut slots[record_type]
}

struct RecordSieve {
    source: RecordIterator,
    filter: Box<dyn RecordFilter>,
    resolved: Vec<Option<TimeSeriesRecord>>,
    shadows: Vec<Option<TimeSeriesRecord>>,
}

impl RecordSieve {
    /// The resolved record of `record_type`, as a full record.
    fn resolved_copy(&self, record_type: usize) -> Result<TimeSeriesRecord> {
        self.resolved
            .get(record_type)
            .and_then(Option::clone)
            .ok_or(StrataError::NoSuchElement)
    }

    /// Folds a rejected record into the shadow of its type.
    ///
    /// A shadow whose accumulated decimals would lose digits is replaced by the
    /// resolved record, which carries the same information in full.
    fn shadow(&mut self, record: &dyn Record) -> Result<()> {
        let record_type = record.record_type();
        let replacement = match type_slot(&mut self.shadows, record_type).as_mut() {
            Some(shadow) if record.is_delta()? => {
                if shadow.add_exact(record)? {
                    return Ok(());
                }
                self.resolved_copy(record_type)?
            }
            _ => record.to_record()?,
        };
        *type_slot(&mut self.shadows, record_type) = Some(replacement);
        Ok(())
    }
}

impl ComputeNext for RecordSieve {
    type Item = BoxedRecord;

    fn compute_next(&mut self) -> Result<Option<BoxedRecord>> {
        while !self.filter.is_done() && self.source.has_next()? {
            let record = self.source.next()?;
            let record_type = record.record_type();

            let resolved = type_slot(&mut self.resolved, record_type);
            match resolved {
                Some(previous) => previous.inflate(&*record)?,
                None => {
                    if record.is_delta()? {
                        return Err(StrataError::InvalidFormat(format!(
                            "delta record of type {} has no preceding full record",
                            record_type
                        )));
                    }
                    *resolved = Some(record.to_record()?);
                }
            }

            let accepted = match &self.resolved[record_type] {
                Some(current) => self.filter.accept(current)?,
                None => false,
            };
            if !accepted {
                self.shadow(&*record)?;
                continue;
            }

            let shadow = type_slot(&mut self.shadows, record_type).take();
            return match shadow {
                Some(mut shadow) if record.is_delta()? => {
                    if !shadow.add_exact(&*record)? {
                        shadow = self.resolved_copy(record_type)?;
                    }
                    Ok(Some(Box::new(shadow)))
                }
                _ => Ok(Some(record)),
            };
        }
        Ok(None)
    }

    fn close_source(&mut self) -> Result<()> {
        self.source.close()
    }
}

/// Keeps the records accepted by a filter while preserving delta encoding.
///
/// The filter is evaluated on each record resolved against its predecessors of the
/// same type. Rejected records are folded into a per-type shadow record: the
/// first one is copied, later deltas are added to it and a full record replaces
/// it. When an accepted record is a delta and a shadow exists, the shadow plus the
/// record is returned instead, so the output still resolves to the right values.
/// Where that sum would lose decimal digits the resolved record is returned in
/// full.
/// Iteration ends as soon as the filter reports that it is done.
pub struct FilteringRecordIterator {
    slot: NextSlot<BoxedRecord>,
    stage: RecordSieve,
}

impl FilteringRecordIterator {
    /// Filters `source` with `filter`.
    pub fn new(source: RecordIterator, filter: Box<dyn RecordFilter>) -> Self {
        Self {
            slot: NextSlot::default(),
            stage: RecordSieve {
                source,
                filter,
                resolved: Vec::new(),
                shadows: Vec::new(),
            },
        }
    }
}

impl CloseableIterator for FilteringRecordIterator {
    type Item = BoxedRecord;

    fn has_next(&mut self) -> Result<bool> {
        self.slot.has_next(&mut self.stage)
    }

    fn next(&mut self) -> Result<BoxedRecord> {
        self.slot.next(&mut self.stage)
    }

    fn close(&mut self) -> Result<()> {
        self.slot.close(&mut self.stage)
    }
}
