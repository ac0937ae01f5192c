//! Helpers over lists of records.

use crate::error::{Result, StrataError};
use crate::record::{BinaryTimeSeriesRecord, Record, TimeSeriesRecord};
use crate::schema::TimeSeriesDefinition;
use std::collections::HashMap;
use std::io::Write;
use std::sync::Arc;

/// Total number of bytes [`write_records`] emits for `records`.
pub fn compute_serialized_size<R: Record>(records: &[R]) -> Result<usize> {
    let mut size = 0;
    for record in records {
        size += record.framed_size()?;
    }
    Ok(size)
}

/// Writes every record as a frame and returns the number of bytes written.
pub fn write_records<R: Record, W: Write>(records: &[R], writer: &mut W) -> Result<usize> {
    let mut written = 0;
    for record in records {
        record.write_framed(writer)?;
        written += record.framed_size()?;
    }
    Ok(written)
}

/// Parses the concatenated record frames in `buffer`.
pub fn read_records(
    definition: &TimeSeriesDefinition,
    buffer: Arc<[u8]>,
) -> Result<Vec<BinaryTimeSeriesRecord>> {
    let mut records = Vec::new();
    let mut position = 0;
    while position < buffer.len() {
        let (record, next) = BinaryTimeSeriesRecord::read_framed(definition, &buffer, position)?;
        records.push(record);
        position = next;
    }
    Ok(records)
}

/// Resolves every record against the previous record of its type.
///
/// # Errors
///
/// Returns `StrataError::InvalidFormat` if the first record of a type is a delta.
pub fn inflate_records<R: Record>(records: &[R]) -> Result<Vec<TimeSeriesRecord>> {
    let mut resolved: HashMap<usize, TimeSeriesRecord> = HashMap::new();
    let mut result = Vec::with_capacity(records.len());
    for record in records {
        let current = match resolved.get_mut(&record.record_type()) {
            Some(previous) => {
                previous.inflate(record)?;
                previous.clone()
            }
            None => {
                if record.is_delta()? {
                    return Err(StrataError::InvalidFormat(format!(
                        "delta record of type {} has no preceding full record",
                        record.record_type()
                    )));
                }
                let full = record.to_record()?;
                resolved.insert(record.record_type(), full.clone());
                full
            }
        };
        result.push(current);
    }
    Ok(result)
}

/// Delta-encodes `records`: the first record of each type stays full, every later
/// one becomes the difference to its predecessor of the same type.
///
/// Input records may themselves be full or delta; they are resolved first.
pub fn to_delta_encoded<R: Record>(records: &[R]) -> Result<Vec<TimeSeriesRecord>> {
    let inflated = inflate_records(records)?;
    let mut previous: HashMap<usize, &TimeSeriesRecord> = HashMap::new();
    let mut result = Vec::with_capacity(inflated.len());
    for record in &inflated {
        let encoded = match previous.insert(record.record_type(), record) {
            Some(baseline) => record.deflate(baseline)?,
            None => record.clone(),
        };
        result.push(encoded);
    }
    Ok(result)
}
