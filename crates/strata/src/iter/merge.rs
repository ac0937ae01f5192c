//! Timestamp-ordered merge of two delta-encoded record streams.

use crate::error::{Result, StrataError};
use crate::field::Field;
use crate::iter::filter::type_slot;
use crate::iter::{CloseableIterator, ComputeNext, NextSlot, RecordIterator};
use crate::record::{BoxedRecord, Record, TimeSeriesRecord};
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Side {
    Left,
    Right,
}

/// One input of the merge with its lookahead record.
struct MergeInput {
    source: RecordIterator,
    resolved: Vec<Option<TimeSeriesRecord>>,
    head: Option<BoxedRecord>,
}

impl MergeInput {
    fn new(source: RecordIterator) -> Self {
        Self {
            source,
            resolved: Vec::new(),
            head: None,
        }
    }

    /// Pulls the next record into `head` and resolves it against its type.
    fn fill(&mut self) -> Result<()> {
        if self.head.is_some() || !self.source.has_next()? {
            return Ok(());
        }
        let record = self.source.next()?;
        let resolved = type_slot(&mut self.resolved, record.record_type());
        match resolved {
            Some(previous) => previous.inflate(&*record)?,
            None => {
                if record.is_delta()? {
                    return Err(StrataError::InvalidFormat(format!(
                        "delta record of type {} has no preceding full record",
                        record.record_type()
                    )));
                }
                *resolved = Some(record.to_record()?);
            }
        }
        self.head = Some(record);
        Ok(())
    }

    fn head_resolved(&self) -> Option<&TimeSeriesRecord> {
        let head = self.head.as_ref()?;
        self.resolved.get(head.record_type())?.as_ref()
    }

    fn head_timestamp(&self) -> Result<Option<Field>> {
        self.head_resolved().map(|r| r.timestamp()).transpose()
    }

    /// Takes the head record together with its resolved form.
    fn take_head(&mut self) -> Result<(BoxedRecord, TimeSeriesRecord)> {
        let resolved = self
            .head_resolved()
            .cloned()
            .ok_or(StrataError::NoSuchElement)?;
        let head = self.head.take().ok_or(StrataError::NoSuchElement)?;
        Ok((head, resolved))
    }
}

struct RecordMerger {
    left: MergeInput,
    right: MergeInput,
    /// Per record type, the side the last emitted record came from and its resolved
    /// values.
    emitted: Vec<Option<(Side, TimeSeriesRecord)>>,
}

impl RecordMerger {
    fn input(&mut self, side: Side) -> &mut MergeInput {
        match side {
            Side::Left => &mut self.left,
            Side::Right => &mut self.right,
        }
    }
}

impl ComputeNext for RecordMerger {
    type Item = BoxedRecord;

    fn compute_next(&mut self) -> Result<Option<BoxedRecord>> {
        self.left.fill()?;
        self.right.fill()?;
        let side = match (self.left.head_timestamp()?, self.right.head_timestamp()?) {
            (None, None) => return Ok(None),
            (Some(_), None) => Side::Left,
            (None, Some(_)) => Side::Right,
            (Some(left), Some(right)) => {
                if right < left {
                    Side::Right
                } else {
                    Side::Left
                }
            }
        };

        let (record, resolved) = self.input(side).take_head()?;
        let last = type_slot(&mut self.emitted, record.record_type());
        let output: BoxedRecord = match last.as_ref() {
            Some((last_side, _)) if *last_side == side && record.is_delta()? => record,
            Some((_, baseline)) => Box::new(resolved.deflate(baseline)?),
            None => Box::new(resolved.clone()),
        };
        *last = Some((side, resolved));
        Ok(Some(output))
    }

    fn close_source(&mut self) -> Result<()> {
        let left = self.left.source.close();
        let right = self.right.source.close();
        match (left, right) {
            (Err(e), Err(other)) => {
                warn!(error = %other, "Failed to close right merge input");
                Err(e)
            }
            (left, right) => left.and(right),
        }
    }
}

/// Merges two record streams, each ordered by timestamp, into one ordered stream.
///
/// Both inputs may be delta-encoded. The output is delta-encoded per record type
/// across the merged sequence: a delta is passed through unchanged when the
/// previous output record of its type came from the same input, and otherwise the
/// record is re-encoded against the previous output record of its type. The first
/// output record of each type is full. On equal timestamps the left input wins.
pub struct MergingRecordIterator {
    slot: NextSlot<BoxedRecord>,
    stage: RecordMerger,
}

impl MergingRecordIterator {
    /// Merges `left` and `right`.
    pub fn new(left: RecordIterator, right: RecordIterator) -> Self {
        Self {
            slot: NextSlot::default(),
            stage: RecordMerger {
                left: MergeInput::new(left),
                right: MergeInput::new(right),
                emitted: Vec::new(),
            },
        }
    }
}

impl CloseableIterator for MergingRecordIterator {
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
