//! Fluent construction of record lists by record type and field name.

use crate::error::{Result, StrataError};
use crate::field::Field;
use crate::record::utils::to_delta_encoded;
use crate::record::{Record, TimeSeriesRecord};
use crate::schema::{TimeSeriesDefinition, TIMESTAMP_FIELD_NAME};

/// Builds a list of records of a series, addressing types and fields by name.
///
/// Setters apply to the record most recently started with
/// [`RecordListBuilder::new_record`].
///
/// # Example
///
/// ```rust,ignore
/// let mut builder = RecordListBuilder::new(&definition);
/// builder
///     .new_record("trade")?
///     .set_timestamp_in_nanos(1_000)?
///     .set_decimal("price", 100, -1)?
///     .set_long("volume", 5)?;
/// let records = builder.build()?;
/// ```
#[derive(Debug)]
pub struct RecordListBuilder<'a> {
    definition: &'a TimeSeriesDefinition,
    records: Vec<TimeSeriesRecord>,
}

impl<'a> RecordListBuilder<'a> {
    /// Creates an empty builder for `definition`.
    pub fn new(definition: &'a TimeSeriesDefinition) -> Self {
        Self {
            definition,
            records: Vec::new(),
        }
    }

    /// Starts a new, zero-valued record of the type called `record_type`.
    pub fn new_record(&mut self, record_type: &str) -> Result<&mut Self> {
        let record = self.definition.new_record_by_name(record_type)?;
        self.records.push(record);
        Ok(self)
    }

    fn field_mut(&mut self, name: &str) -> Result<&mut Field> {
        let record = self
            .records
            .last_mut()
            .ok_or(StrataError::NoRecordStarted)?;
        let index = self.definition.field_index(record.record_type(), name)?;
        record.field_mut(index)
    }

    /// Sets the timestamp in the series time unit.
    pub fn set_timestamp(&mut self, value: i64) -> Result<&mut Self> {
        let unit = self.definition.time_unit();
        self.field_mut(TIMESTAMP_FIELD_NAME)?
            .set_timestamp(value, unit)?;
        Ok(self)
    }

    /// Sets the timestamp in nanoseconds.
    pub fn set_timestamp_in_nanos(&mut self, nanos: i64) -> Result<&mut Self> {
        self.field_mut(TIMESTAMP_FIELD_NAME)?
            .set_timestamp_in_nanos(nanos)?;
        Ok(self)
    }

    /// Sets the timestamp in milliseconds.
    pub fn set_timestamp_in_millis(&mut self, millis: i64) -> Result<&mut Self> {
        self.field_mut(TIMESTAMP_FIELD_NAME)?
            .set_timestamp_in_millis(millis)?;
        Ok(self)
    }

    /// Sets field `name` from a byte.
    pub fn set_byte(&mut self, name: &str, value: i8) -> Result<&mut Self> {
        self.field_mut(name)?.set_byte(value)?;
        Ok(self)
    }

    /// Sets field `name` from an int.
    pub fn set_int(&mut self, name: &str, value: i32) -> Result<&mut Self> {
        self.field_mut(name)?.set_int(value)?;
        Ok(self)
    }

    /// Sets field `name` from a long.
    pub fn set_long(&mut self, name: &str, value: i64) -> Result<&mut Self> {
        self.field_mut(name)?.set_long(value)?;
        Ok(self)
    }

    /// Sets decimal field `name` to `mantissa × 10^exponent`.
    pub fn set_decimal(&mut self, name: &str, mantissa: i64, exponent: i8) -> Result<&mut Self> {
        self.field_mut(name)?.set_decimal(mantissa, exponent)?;
        Ok(self)
    }

    /// Parses `value` into field `name`.
    pub fn set_value(&mut self, name: &str, value: &str) -> Result<&mut Self> {
        let time_zone = *self.definition.time_zone();
        self.field_mut(name)?.set_value_from_string(&time_zone, value)?;
        Ok(self)
    }

    /// Number of records started so far.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Returns true if no record was started.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Returns the records delta-encoded per record type.
    pub fn build(&self) -> Result<Vec<TimeSeriesRecord>> {
        to_delta_encoded(&self.records)
    }

    /// Returns the records as built, all full.
    pub fn build_inflated(&self) -> Vec<TimeSeriesRecord> {
        self.records.clone()
    }
}
