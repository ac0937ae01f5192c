//! Records: one row of a record type, either fully resolved or delta-encoded.
//!
//! Two implementations share the [`Record`] trait:
//!
//! - [`TimeSeriesRecord`] owns its fields and is mutated in place. It is the form
//!   used to build, inflate and deflate records.
//! - [`BinaryTimeSeriesRecord`] is a read-only view over an encoded payload that
//!   decodes fields on demand.
//!
//! # Binary format
//!
//! ```text
//! frame   := u8(record type) varint(payload length) payload
//! payload := varint(presence bit-set) field*
//! ```
//!
//! Bit 0 of the presence bit-set is the delta flag and bit `i + 1` is set when
//! field `i` is non-zero. Only non-zero fields are written, in field order.

mod binary;
mod builder;
pub mod utils;

pub use binary::BinaryTimeSeriesRecord;
pub use builder::RecordListBuilder;

use crate::codec::{bit_set_size, var_u64_size, write_bit_set, write_var_u64, PresenceBits};
use crate::error::{Result, StrataError};
use crate::field::Field;
use std::fmt;
use std::io::Write;
use tracing::debug;

/// A record behind a trait object, as produced by record iterators.
pub type BoxedRecord = Box<dyn Record>;

/// Read access to a record of some record type.
///
/// Accessors are fallible because lazily-decoded records only parse their buffer
/// when a value is first requested.
pub trait Record: fmt::Debug {
    /// Index of the record type in the series definition.
    fn record_type(&self) -> usize;

    /// Number of fields, timestamp included.
    fn field_count(&self) -> usize;

    /// Returns true if the fields hold differences to the previous record of the
    /// same type.
    fn is_delta(&self) -> Result<bool>;

    /// Returns the value of field `index`.
    fn field(&self, index: usize) -> Result<Field>;

    /// Returns the timestamp field.
    fn timestamp(&self) -> Result<Field> {
        self.field(0)
    }

    /// Returns the presence bit-set: bit 0 is the delta flag, bit `i + 1` marks a
    /// non-zero field `i`.
    fn bit_set(&self) -> Result<PresenceBits> {
        let mut bits = PresenceBits::repeat(false, self.field_count() + 1);
        bits.set(0, self.is_delta()?);
        for i in 0..self.field_count() {
            bits.set(i + 1, !self.field(i)?.is_zero());
        }
        Ok(bits)
    }

    /// Size in bytes of the encoded payload (presence bit-set and fields).
    fn serialized_size(&self) -> Result<usize> {
        let mut size = bit_set_size(&self.bit_set()?);
        for i in 0..self.field_count() {
            let field = self.field(i)?;
            if !field.is_zero() {
                size += field.serialized_size();
            }
        }
        Ok(size)
    }

    /// Writes the encoded payload.
    fn write_to(&self, writer: &mut dyn Write) -> Result<()> {
        write_bit_set(writer, &self.bit_set()?)?;
        for i in 0..self.field_count() {
            let field = self.field(i)?;
            if !field.is_zero() {
                field.write_to(writer)?;
            }
        }
        Ok(())
    }

    /// Size in bytes of the full frame: type byte, length and payload.
    fn framed_size(&self) -> Result<usize> {
        let payload = self.serialized_size()?;
        Ok(1 + var_u64_size(payload as u64) + payload)
    }

    /// Writes the full frame: type byte, payload length and payload.
    fn write_framed(&self, writer: &mut dyn Write) -> Result<()> {
        let record_type = u8::try_from(self.record_type()).map_err(|_| {
            StrataError::InvalidFormat(format!(
                "record type {} does not fit in a byte",
                self.record_type()
            ))
        })?;
        writer.write_all(&[record_type])?;
        write_var_u64(writer, self.serialized_size()? as u64)?;
        self.write_to(writer)
    }

    /// Materializes the record into an owned, mutable copy.
    fn to_record(&self) -> Result<TimeSeriesRecord> {
        let mut fields = Vec::with_capacity(self.field_count());
        for i in 0..self.field_count() {
            fields.push(self.field(i)?);
        }
        let mut record = TimeSeriesRecord::new(self.record_type(), fields);
        record.set_delta(self.is_delta()?);
        Ok(record)
    }
}

impl<R: Record + ?Sized> Record for Box<R> {
    fn record_type(&self) -> usize {
        (**self).record_type()
    }

    fn field_count(&self) -> usize {
        (**self).field_count()
    }

    fn is_delta(&self) -> Result<bool> {
        (**self).is_delta()
    }

    fn field(&self, index: usize) -> Result<Field> {
        (**self).field(index)
    }

    fn bit_set(&self) -> Result<PresenceBits> {
        (**self).bit_set()
    }

    fn serialized_size(&self) -> Result<usize> {
        (**self).serialized_size()
    }

    fn write_to(&self, writer: &mut dyn Write) -> Result<()> {
        (**self).write_to(writer)
    }

    fn to_record(&self) -> Result<TimeSeriesRecord> {
        (**self).to_record()
    }
}

/// A record that owns its fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimeSeriesRecord {
    record_type: usize,
    delta: bool,
    fields: Vec<Field>,
}

impl TimeSeriesRecord {
    /// Creates a full (non-delta) record.
    pub fn new(record_type: usize, fields: Vec<Field>) -> Self {
        Self {
            record_type,
            delta: false,
            fields,
        }
    }

    /// Copies any record into an owned one.
    pub fn from_record(record: &dyn Record) -> Result<Self> {
        record.to_record()
    }

    /// Sets the delta flag.
    pub fn set_delta(&mut self, delta: bool) {
        self.delta = delta;
    }

    /// The fields in order.
    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    /// Mutable access to field `index`.
    pub fn field_mut(&mut self, index: usize) -> Result<&mut Field> {
        let count = self.fields.len();
        self.fields
            .get_mut(index)
            .ok_or(StrataError::FieldIndexOutOfBounds { index, count })
    }

    /// Mutable access to the timestamp field.
    pub fn timestamp_mut(&mut self) -> Result<&mut Field> {
        self.field_mut(0)
    }

    /// Zeroes every field and clears the delta flag.
    pub fn clear(&mut self) {
        self.delta = false;
        for field in &mut self.fields {
            field.set_zero();
        }
    }

    fn check_compatible(&self, other: &dyn Record) -> Result<()> {
        if other.record_type() != self.record_type {
            return Err(StrataError::RecordTypeMismatch {
                expected: self.record_type,
                actual: other.record_type(),
            });
        }
        if other.field_count() != self.fields.len() {
            return Err(StrataError::InvalidFormat(format!(
                "record of type {} has {} fields, expected {}",
                self.record_type,
                other.field_count(),
                self.fields.len()
            )));
        }
        Ok(())
    }

    /// Copies this record's delta flag and field values into `other`.
    pub fn copy_to(&self, other: &mut TimeSeriesRecord) -> Result<()> {
        other.copy_from(self)
    }

    /// Overwrites this record with the delta flag and values of `other`.
    pub fn copy_from(&mut self, other: &dyn Record) -> Result<()> {
        self.check_compatible(other)?;
        self.delta = other.is_delta()?;
        for (i, field) in self.fields.iter_mut().enumerate() {
            other.field(i)?.copy_to(field)?;
        }
        Ok(())
    }

    /// Adds `other` field by field. The result is a delta only if both operands are.
    pub fn add(&mut self, other: &dyn Record) -> Result<()> {
        self.check_compatible(other)?;
        for (i, field) in self.fields.iter_mut().enumerate() {
            field.add(&other.field(i)?)?;
        }
        self.delta = self.delta && other.is_delta()?;
        Ok(())
    }

    /// Subtracts `other` field by field, turning this record into a delta.
    pub fn subtract(&mut self, other: &dyn Record) -> Result<()> {
        self.check_compatible(other)?;
        for (i, field) in self.fields.iter_mut().enumerate() {
            field.subtract(&other.field(i)?)?;
        }
        self.delta = true;
        Ok(())
    }

    /// Applies the next record of the same type on top of this resolved record: a
    /// delta is added, a full record replaces the current values.
    pub fn inflate(&mut self, next: &dyn Record) -> Result<()> {
        if next.is_delta()? {
            self.add(next)
        } else {
            self.copy_from(next)
        }
    }

    /// Adds `other` like [`TimeSeriesRecord::add`], but only when every decimal sum
    /// is exact. Returns false and leaves this record unchanged otherwise.
    pub fn add_exact(&mut self, other: &dyn Record) -> Result<bool> {
        self.check_compatible(other)?;
        let mut fields = self.fields.clone();
        for (i, field) in fields.iter_mut().enumerate() {
            if !field.add_exact(&other.field(i)?)? {
                return Ok(false);
            }
        }
        self.fields = fields;
        self.delta = self.delta && other.is_delta()?;
        Ok(true)
    }

    /// Returns this resolved record expressed as a delta against `baseline`.
    ///
    /// When a decimal difference cannot be represented exactly the record is
    /// returned in full, so inflating the result against `baseline` always
    /// restores this record.
    pub fn deflate(&self, baseline: &dyn Record) -> Result<TimeSeriesRecord> {
        self.check_compatible(baseline)?;
        let mut delta = self.clone();
        for (i, field) in delta.fields.iter_mut().enumerate() {
            if !field.subtract_exact(&baseline.field(i)?)? {
                debug!(
                    record_type = self.record_type,
                    field = i,
                    "Delta would lose decimal digits, keeping full record"
                );
                let mut full = self.clone();
                full.delta = false;
                return Ok(full);
            }
        }
        delta.delta = true;
        Ok(delta)
    }
}

impl Record for TimeSeriesRecord {
    fn record_type(&self) -> usize {
        self.record_type
    }

    fn field_count(&self) -> usize {
        self.fields.len()
    }

    fn is_delta(&self) -> Result<bool> {
        Ok(self.delta)
    }

    fn field(&self, index: usize) -> Result<Field> {
        self.fields
            .get(index)
            .copied()
            .ok_or(StrataError::FieldIndexOutOfBounds {
                index,
                count: self.fields.len(),
            })
    }

    fn to_record(&self) -> Result<TimeSeriesRecord> {
        Ok(self.clone())
    }
}

impl fmt::Display for TimeSeriesRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}[", self.record_type, if self.delta { "Δ" } else { "" })?;
        for (i, field) in self.fields.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}", field)?;
        }
        f.write_str("]")
    }
}
