//! Static description of a time series: record types, field layout, time unit,
//! time zone and partitioning rule.
//!
//! A [`TimeSeriesDefinition`] is built once with [`TimeSeriesDefinitionBuilder`] and
//! is read-only afterwards. Every record type starts with the implicit timestamp
//! field at index 0, whose resolution is the series time unit.
//!
//! # Example
//!
//! ```rust,ignore
//! use alopex_strata::field::{FieldType, TimeUnit};
//! use alopex_strata::schema::{PartitionType, RecordTypeDefinition, TimeSeriesDefinition};
//!
//! let trade = RecordTypeDefinition::builder("trade")
//!     .add_field("price", FieldType::Decimal)
//!     .add_field("volume", FieldType::Long)
//!     .build();
//!
//! let definition = TimeSeriesDefinition::builder("DAX")
//!     .time_unit(TimeUnit::Nanoseconds)
//!     .partition_type(PartitionType::ByDay)
//!     .add_record_type(trade)
//!     .build()?;
//! ```

use crate::block::BLOCK_HEADER_RECORD_TYPE;
use crate::error::{Result, StrataError};
use crate::field::{Field, FieldType, ImmutableField, TimeUnit};
use crate::range::Range;
use crate::record::TimeSeriesRecord;
use chrono::{DateTime, Datelike, Days, FixedOffset, NaiveDate, TimeZone};
use std::fmt;
use std::sync::Arc;

/// Name of the implicit timestamp field present at index 0 of every record type.
pub const TIMESTAMP_FIELD_NAME: &str = "timestamp";

/// Name of the record type used for block headers.
pub const BLOCK_HEADER_TYPE_NAME: &str = "blockHeader";

/// Maximum number of record types a series can declare (type indices are one byte
/// and `0xFF` is reserved for block headers).
pub const MAX_RECORD_TYPES: usize = BLOCK_HEADER_RECORD_TYPE as usize;

/// A named, typed field of a record type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDefinition {
    /// Field name, unique within its record type.
    pub name: String,
    /// Field type.
    pub field_type: FieldType,
}

impl FieldDefinition {
    /// Creates a field definition.
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
        }
    }
}

/// The ordered field layout of one record type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordTypeDefinition {
    name: String,
    fields: Vec<FieldDefinition>,
    field_types: Arc<[FieldType]>,
}

impl RecordTypeDefinition {
    /// Starts building a record type. The timestamp field is added implicitly.
    pub fn builder(name: impl Into<String>) -> RecordTypeDefinitionBuilder {
        RecordTypeDefinitionBuilder {
            name: name.into(),
            fields: Vec::new(),
        }
    }

    fn from_fields(name: String, fields: Vec<FieldDefinition>) -> Self {
        let field_types = fields.iter().map(|f| f.field_type).collect();
        Self {
            name,
            fields,
            field_types,
        }
    }

    /// Returns a copy whose timestamp field uses `timestamp_type`.
    fn with_timestamp_type(&self, timestamp_type: FieldType) -> Self {
        let mut fields = self.fields.clone();
        fields[0].field_type = timestamp_type;
        Self::from_fields(self.name.clone(), fields)
    }

    /// The record type name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The fields, timestamp first.
    pub fn fields(&self) -> &[FieldDefinition] {
        &self.fields
    }

    /// Number of fields including the timestamp.
    pub fn field_count(&self) -> usize {
        self.fields.len()
    }

    /// The field types in field order, shared with the records of this type.
    pub fn field_types(&self) -> &Arc<[FieldType]> {
        &self.field_types
    }

    /// Returns the index of the field called `name`, if any.
    pub fn field_index(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.name == name)
    }

    /// Returns the index of the field called `name` or an error naming it.
    pub fn require_field_index(&self, name: &str) -> Result<usize> {
        self.field_index(name).ok_or_else(|| StrataError::UnknownField {
            record_type: self.name.clone(),
            field: name.to_string(),
        })
    }

    /// Creates zero-valued fields for a new record of this type.
    pub fn new_fields(&self) -> Vec<Field> {
        self.field_types.iter().map(|t| t.new_field()).collect()
    }
}

/// Builder for [`RecordTypeDefinition`].
#[derive(Debug)]
pub struct RecordTypeDefinitionBuilder {
    name: String,
    fields: Vec<FieldDefinition>,
}

impl RecordTypeDefinitionBuilder {
    /// Appends a field.
    pub fn add_field(mut self, name: impl Into<String>, field_type: FieldType) -> Self {
        self.fields.push(FieldDefinition::new(name, field_type));
        self
    }

    /// Appends a decimal field.
    pub fn add_decimal_field(self, name: impl Into<String>) -> Self {
        self.add_field(name, FieldType::Decimal)
    }

    /// Appends a byte field.
    pub fn add_byte_field(self, name: impl Into<String>) -> Self {
        self.add_field(name, FieldType::Byte)
    }

    /// Appends an int field.
    pub fn add_int_field(self, name: impl Into<String>) -> Self {
        self.add_field(name, FieldType::Integer)
    }

    /// Appends a long field.
    pub fn add_long_field(self, name: impl Into<String>) -> Self {
        self.add_field(name, FieldType::Long)
    }

    /// Finishes the record type. The timestamp field is placed at index 0 with
    /// nanosecond resolution until the owning series fixes its unit.
    pub fn build(self) -> RecordTypeDefinition {
        let mut fields = Vec::with_capacity(self.fields.len() + 1);
        fields.push(FieldDefinition::new(
            TIMESTAMP_FIELD_NAME,
            FieldType::NanosecondTimestamp,
        ));
        fields.extend(self.fields);
        RecordTypeDefinition::from_fields(self.name, fields)
    }
}

/// A half-open `[start, end)` time range in nanoseconds since the epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimeRange {
    /// Inclusive start.
    pub start: i64,
    /// Exclusive end.
    pub end: i64,
}

impl TimeRange {
    /// Creates a time range.
    pub fn new(start: i64, end: i64) -> Self {
        Self { start, end }
    }

    /// Returns true if `timestamp` lies in `[start, end)`.
    pub fn contains(&self, timestamp: i64) -> bool {
        timestamp >= self.start && timestamp < self.end
    }

    /// Returns true if the closed span `[first, last]` overlaps this range.
    pub fn overlaps(&self, first: i64, last: i64) -> bool {
        first < self.end && last >= self.start
    }

    /// The range as timestamp fields in `unit`, rounded outward, for intersection
    /// with predicate ranges of a series with that unit.
    pub fn to_field_range(&self, unit: TimeUnit) -> Range<ImmutableField> {
        Range::closed_open(
            Field::timestamp_of(unit, unit.floor_nanos(self.start)).into(),
            Field::timestamp_of(unit, unit.ceil_nanos(self.end)).into(),
        )
    }
}

impl fmt::Display for TimeRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.start, self.end)
    }
}

/// Calendar rule used to split a series into partitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PartitionType {
    /// One partition per calendar day.
    #[default]
    ByDay,
    /// One partition per ISO week (Monday to Monday).
    ByWeek,
    /// One partition per calendar month.
    ByMonth,
}

fn out_of_range(timestamp: i64) -> StrataError {
    StrataError::InvalidFormat(format!(
        "timestamp {} is outside the calendar range",
        timestamp
    ))
}

fn local_midnight_nanos(date: NaiveDate, time_zone: &FixedOffset) -> Option<i64> {
    let naive = date.and_hms_opt(0, 0, 0)?;
    time_zone
        .from_local_datetime(&naive)
        .single()?
        .timestamp_nanos_opt()
}

impl PartitionType {
    /// Returns the partition containing `timestamp` (nanoseconds), with calendar
    /// boundaries evaluated in `time_zone`.
    pub fn partition_range(self, timestamp: i64, time_zone: &FixedOffset) -> Result<TimeRange> {
        let secs = timestamp.div_euclid(1_000_000_000);
        let nanos = timestamp.rem_euclid(1_000_000_000) as u32;
        let local = DateTime::from_timestamp(secs, nanos)
            .ok_or_else(|| out_of_range(timestamp))?
            .with_timezone(time_zone)
            .date_naive();

        let (start, end) = match self {
            Self::ByDay => (Some(local), local.succ_opt()),
            Self::ByWeek => {
                let days = local.weekday().num_days_from_monday() as u64;
                let start = local.checked_sub_days(Days::new(days));
                (start, start.and_then(|s| s.checked_add_days(Days::new(7))))
            }
            Self::ByMonth => {
                let start = NaiveDate::from_ymd_opt(local.year(), local.month(), 1);
                let end = if local.month() == 12 {
                    NaiveDate::from_ymd_opt(local.year() + 1, 1, 1)
                } else {
                    NaiveDate::from_ymd_opt(local.year(), local.month() + 1, 1)
                };
                (start, end)
            }
        };

        let start = start
            .and_then(|d| local_midnight_nanos(d, time_zone))
            .ok_or_else(|| out_of_range(timestamp))?;
        let end = end
            .and_then(|d| local_midnight_nanos(d, time_zone))
            .unwrap_or(i64::MAX);
        Ok(TimeRange::new(start, end))
    }
}

/// Immutable schema of a time series.
#[derive(Debug, Clone)]
pub struct TimeSeriesDefinition {
    name: String,
    time_unit: TimeUnit,
    time_zone: FixedOffset,
    partition_type: PartitionType,
    record_types: Vec<RecordTypeDefinition>,
    block_header: RecordTypeDefinition,
}

impl TimeSeriesDefinition {
    /// Starts building a definition with nanosecond timestamps, UTC and daily
    /// partitions.
    pub fn builder(name: impl Into<String>) -> TimeSeriesDefinitionBuilder {
        TimeSeriesDefinitionBuilder {
            name: name.into(),
            time_unit: TimeUnit::default(),
            time_zone: FixedOffset::east_opt(0),
            partition_type: PartitionType::default(),
            record_types: Vec::new(),
        }
    }

    /// The series name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Resolution of the timestamp field of every record type.
    pub fn time_unit(&self) -> TimeUnit {
        self.time_unit
    }

    /// Type of the timestamp field of every record type.
    pub fn timestamp_type(&self) -> FieldType {
        FieldType::timestamp(self.time_unit)
    }

    /// Time zone used for partition boundaries and date literals.
    pub fn time_zone(&self) -> &FixedOffset {
        &self.time_zone
    }

    /// The partitioning rule.
    pub fn partition_type(&self) -> PartitionType {
        self.partition_type
    }

    /// All record types, in index order.
    pub fn record_types(&self) -> &[RecordTypeDefinition] {
        &self.record_types
    }

    /// Number of record types.
    pub fn number_of_record_types(&self) -> usize {
        self.record_types.len()
    }

    /// Returns the record type at `index`.
    pub fn record_type(&self, index: usize) -> Result<&RecordTypeDefinition> {
        self.record_types
            .get(index)
            .ok_or(StrataError::UnknownRecordType(index.min(u8::MAX as usize) as u8))
    }

    /// Returns the index of the record type called `name`.
    pub fn record_type_index(&self, name: &str) -> Result<usize> {
        self.record_types
            .iter()
            .position(|t| t.name == name)
            .ok_or_else(|| StrataError::UnknownRecordTypeName(name.to_string()))
    }

    /// Returns the index of field `field` in record type `record_type`.
    pub fn field_index(&self, record_type: usize, field: &str) -> Result<usize> {
        self.record_type(record_type)?.require_field_index(field)
    }

    /// The record type describing block headers.
    pub fn block_header_definition(&self) -> &RecordTypeDefinition {
        &self.block_header
    }

    /// Creates a zero-valued full record of the given type.
    pub fn new_record(&self, record_type: usize) -> Result<TimeSeriesRecord> {
        let definition = self.record_type(record_type)?;
        Ok(TimeSeriesRecord::new(record_type, definition.new_fields()))
    }

    /// Creates a zero-valued full record of the type called `name`.
    pub fn new_record_by_name(&self, name: &str) -> Result<TimeSeriesRecord> {
        self.new_record(self.record_type_index(name)?)
    }

    /// Creates a zero-valued field for `field` of `record_type`.
    pub fn new_field(&self, record_type: usize, field: usize) -> Result<Field> {
        let definition = self.record_type(record_type)?;
        definition
            .field_types()
            .get(field)
            .map(|t| t.new_field())
            .ok_or(StrataError::FieldIndexOutOfBounds {
                index: field,
                count: definition.field_count(),
            })
    }

    /// Returns the partition holding `timestamp` (nanoseconds).
    pub fn partition_range(&self, timestamp: i64) -> Result<TimeRange> {
        self.partition_type
            .partition_range(timestamp, &self.time_zone)
    }
}

/// Builder for [`TimeSeriesDefinition`].
#[derive(Debug)]
pub struct TimeSeriesDefinitionBuilder {
    name: String,
    time_unit: TimeUnit,
    time_zone: Option<FixedOffset>,
    partition_type: PartitionType,
    record_types: Vec<RecordTypeDefinition>,
}

impl TimeSeriesDefinitionBuilder {
    /// Sets the timestamp resolution.
    pub fn time_unit(mut self, time_unit: TimeUnit) -> Self {
        self.time_unit = time_unit;
        self
    }

    /// Sets the time zone.
    pub fn time_zone(mut self, time_zone: FixedOffset) -> Self {
        self.time_zone = Some(time_zone);
        self
    }

    /// Sets the partitioning rule.
    pub fn partition_type(mut self, partition_type: PartitionType) -> Self {
        self.partition_type = partition_type;
        self
    }

    /// Appends a record type. Its index is its position in call order.
    pub fn add_record_type(mut self, record_type: RecordTypeDefinition) -> Self {
        self.record_types.push(record_type);
        self
    }

    /// Validates and freezes the definition.
    ///
    /// # Errors
    ///
    /// Returns `StrataError::InvalidFormat` for duplicate record type or field
    /// names, or when more record types are declared than a type byte can address.
    pub fn build(self) -> Result<TimeSeriesDefinition> {
        if self.record_types.len() > MAX_RECORD_TYPES {
            return Err(StrataError::InvalidFormat(format!(
                "{} record types declared, at most {} supported",
                self.record_types.len(),
                MAX_RECORD_TYPES
            )));
        }
        for (i, record_type) in self.record_types.iter().enumerate() {
            if self.record_types[..i].iter().any(|t| t.name == record_type.name) {
                return Err(StrataError::InvalidFormat(format!(
                    "duplicate record type {}",
                    record_type.name
                )));
            }
            for (j, field) in record_type.fields.iter().enumerate() {
                if record_type.fields[..j].iter().any(|f| f.name == field.name) {
                    return Err(StrataError::InvalidFormat(format!(
                        "duplicate field {} in record type {}",
                        field.name, record_type.name
                    )));
                }
            }
        }

        let timestamp_type = FieldType::timestamp(self.time_unit);
        let record_types: Vec<RecordTypeDefinition> = self
            .record_types
            .iter()
            .map(|t| t.with_timestamp_type(timestamp_type))
            .collect();

        let mut header = RecordTypeDefinition::builder(BLOCK_HEADER_TYPE_NAME)
            .add_field("lastTimestamp", FieldType::NanosecondTimestamp)
            .add_int_field("compressedBlockSize")
            .add_byte_field("compressionType");
        for record_type in &record_types {
            header = header.add_int_field(format!("recordCount.{}", record_type.name));
        }

        let time_zone = match self.time_zone {
            Some(tz) => tz,
            None => FixedOffset::east_opt(0)
                .ok_or_else(|| StrataError::InvalidFormat("invalid UTC offset".into()))?,
        };

        Ok(TimeSeriesDefinition {
            name: self.name,
            time_unit: self.time_unit,
            time_zone,
            partition_type: self.partition_type,
            record_types,
            block_header: header.build(),
        })
    }
}
