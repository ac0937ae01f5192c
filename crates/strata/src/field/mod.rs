//! Typed scalar field values.
//!
//! A [`Field`] is one column of a record: a timestamp in one of four units, a byte,
//! a 32-bit or 64-bit integer, or a [`Decimal`]. Fields are small `Copy` values that
//! are mutated in place through typed setters and combined with [`Field::add`] /
//! [`Field::subtract`] to apply and compute record deltas.
//!
//! # Binary format
//!
//! | Type | Encoding |
//! |------|----------|
//! | timestamps, int, long | zig-zag varint |
//! | byte | 1 raw byte |
//! | decimal | zig-zag varint mantissa, then 1 raw exponent byte |

mod decimal;
mod parse;

pub use decimal::Decimal;

use crate::codec::{var_i64_size, write_var_i64, SliceReader};
use crate::error::{Result, StrataError};
use crate::range::{Range, RangeSet};
use chrono::FixedOffset;
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::io::Write;
use std::ops::Deref;

/// Resolution of a timestamp value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TimeUnit {
    /// Nanoseconds since the epoch.
    #[default]
    Nanoseconds,
    /// Microseconds since the epoch.
    Microseconds,
    /// Milliseconds since the epoch.
    Milliseconds,
    /// Seconds since the epoch.
    Seconds,
}

impl TimeUnit {
    /// Number of nanoseconds in one unit.
    pub fn nanos_per_unit(self) -> i64 {
        match self {
            Self::Nanoseconds => 1,
            Self::Microseconds => 1_000,
            Self::Milliseconds => 1_000_000,
            Self::Seconds => 1_000_000_000,
        }
    }

    /// Converts `value`, expressed in `from`, into this unit.
    ///
    /// Conversion to a coarser unit floors; conversion to a finer unit saturates.
    pub fn convert(self, value: i64, from: TimeUnit) -> i64 {
        let from_nanos = from.nanos_per_unit();
        let to_nanos = self.nanos_per_unit();
        if from_nanos >= to_nanos {
            value.saturating_mul(from_nanos / to_nanos)
        } else {
            value.div_euclid(to_nanos / from_nanos)
        }
    }

    /// Converts `value` in this unit to nanoseconds, saturating on overflow.
    pub fn to_nanos(self, value: i64) -> i64 {
        TimeUnit::Nanoseconds.convert(value, self)
    }

    /// Converts `nanos` into this unit, flooring.
    pub fn floor_nanos(self, nanos: i64) -> i64 {
        self.convert(nanos, TimeUnit::Nanoseconds)
    }

    /// Converts `nanos` into this unit, rounding up.
    pub fn ceil_nanos(self, nanos: i64) -> i64 {
        let per_unit = self.nanos_per_unit();
        let floor = nanos.div_euclid(per_unit);
        if nanos.rem_euclid(per_unit) == 0 {
            floor
        } else {
            floor + 1
        }
    }

    /// Short suffix used when printing values (`ns`, `us`, `ms`, `s`).
    pub fn suffix(self) -> &'static str {
        match self {
            Self::Nanoseconds => "ns",
            Self::Microseconds => "us",
            Self::Milliseconds => "ms",
            Self::Seconds => "s",
        }
    }
}

/// The concrete type of a field.
///
/// The discriminant is the stable one-byte code used in serialized schemas.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum FieldType {
    /// Timestamp with nanosecond resolution.
    NanosecondTimestamp = 0,
    /// Timestamp with microsecond resolution.
    MicrosecondTimestamp = 1,
    /// Timestamp with millisecond resolution.
    MillisecondTimestamp = 2,
    /// Timestamp with second resolution.
    SecondTimestamp = 3,
    /// Signed 8-bit integer.
    Byte = 4,
    /// Signed 32-bit integer.
    Integer = 5,
    /// Signed 64-bit integer.
    Long = 6,
    /// Decimal with a 64-bit mantissa and 8-bit exponent.
    Decimal = 7,
}

impl FieldType {
    /// Returns the one-byte code of this type.
    pub fn code(self) -> u8 {
        self as u8
    }

    /// Creates a FieldType from its one-byte code.
    pub fn from_code(code: u8) -> Result<Self> {
        match code {
            0 => Ok(Self::NanosecondTimestamp),
            1 => Ok(Self::MicrosecondTimestamp),
            2 => Ok(Self::MillisecondTimestamp),
            3 => Ok(Self::SecondTimestamp),
            4 => Ok(Self::Byte),
            5 => Ok(Self::Integer),
            6 => Ok(Self::Long),
            7 => Ok(Self::Decimal),
            other => Err(StrataError::UnknownFieldType(other)),
        }
    }

    /// Returns the timestamp type with the given resolution.
    pub fn timestamp(unit: TimeUnit) -> Self {
        match unit {
            TimeUnit::Nanoseconds => Self::NanosecondTimestamp,
            TimeUnit::Microseconds => Self::MicrosecondTimestamp,
            TimeUnit::Milliseconds => Self::MillisecondTimestamp,
            TimeUnit::Seconds => Self::SecondTimestamp,
        }
    }

    /// Returns true for the four timestamp types.
    pub fn is_timestamp(self) -> bool {
        self.time_unit().is_some()
    }

    /// Returns the resolution of a timestamp type.
    pub fn time_unit(self) -> Option<TimeUnit> {
        match self {
            Self::NanosecondTimestamp => Some(TimeUnit::Nanoseconds),
            Self::MicrosecondTimestamp => Some(TimeUnit::Microseconds),
            Self::MillisecondTimestamp => Some(TimeUnit::Milliseconds),
            Self::SecondTimestamp => Some(TimeUnit::Seconds),
            _ => None,
        }
    }

    /// Creates a zero-valued field of this type.
    pub fn new_field(self) -> Field {
        match self {
            Self::NanosecondTimestamp => Field::NanosecondTimestamp(0),
            Self::MicrosecondTimestamp => Field::MicrosecondTimestamp(0),
            Self::MillisecondTimestamp => Field::MillisecondTimestamp(0),
            Self::SecondTimestamp => Field::SecondTimestamp(0),
            Self::Byte => Field::Byte(0),
            Self::Integer => Field::Integer(0),
            Self::Long => Field::Long(0),
            Self::Decimal => Field::Decimal(Decimal::ZERO),
        }
    }

    /// Smallest value of this type.
    pub fn min_value(self) -> Field {
        match self {
            Self::NanosecondTimestamp => Field::NanosecondTimestamp(i64::MIN),
            Self::MicrosecondTimestamp => Field::MicrosecondTimestamp(i64::MIN),
            Self::MillisecondTimestamp => Field::MillisecondTimestamp(i64::MIN),
            Self::SecondTimestamp => Field::SecondTimestamp(i64::MIN),
            Self::Byte => Field::Byte(i8::MIN),
            Self::Integer => Field::Integer(i32::MIN),
            Self::Long => Field::Long(i64::MIN),
            Self::Decimal => Field::Decimal(Decimal::MIN),
        }
    }

    /// Largest value of this type.
    pub fn max_value(self) -> Field {
        match self {
            Self::NanosecondTimestamp => Field::NanosecondTimestamp(i64::MAX),
            Self::MicrosecondTimestamp => Field::MicrosecondTimestamp(i64::MAX),
            Self::MillisecondTimestamp => Field::MillisecondTimestamp(i64::MAX),
            Self::SecondTimestamp => Field::SecondTimestamp(i64::MAX),
            Self::Byte => Field::Byte(i8::MAX),
            Self::Integer => Field::Integer(i32::MAX),
            Self::Long => Field::Long(i64::MAX),
            Self::Decimal => Field::Decimal(Decimal::MAX),
        }
    }

    /// The range set spanning the whole domain of this type.
    pub fn all_values(self) -> RangeSet<ImmutableField> {
        RangeSet::from_range(Range::closed(
            self.min_value().into(),
            self.max_value().into(),
        ))
    }

    /// Parses a literal into a field of this type.
    ///
    /// Timestamp literals may be dates interpreted in `time_zone`; see
    /// [`Field::set_value_from_string`].
    pub fn parse_value(self, time_zone: &FixedOffset, value: &str) -> Result<Field> {
        let mut field = self.new_field();
        field.set_value_from_string(time_zone, value)?;
        Ok(field)
    }

    /// Parses two literals into the half-open range `[from, to)`.
    pub fn range(
        self,
        time_zone: &FixedOffset,
        from: &str,
        to: &str,
    ) -> Result<Range<ImmutableField>> {
        let lower = self.parse_value(time_zone, from)?;
        let upper = self.parse_value(time_zone, to)?;
        Ok(Range::closed_open(lower.into(), upper.into()))
    }

    /// Decodes a field of this type.
    pub fn read_field(self, reader: &mut SliceReader<'_>) -> Result<Field> {
        Ok(match self {
            Self::NanosecondTimestamp => Field::NanosecondTimestamp(reader.read_var_i64()?),
            Self::MicrosecondTimestamp => Field::MicrosecondTimestamp(reader.read_var_i64()?),
            Self::MillisecondTimestamp => Field::MillisecondTimestamp(reader.read_var_i64()?),
            Self::SecondTimestamp => Field::SecondTimestamp(reader.read_var_i64()?),
            Self::Byte => Field::Byte(reader.read_i8()?),
            Self::Integer => {
                let value = reader.read_var_i64()?;
                let value = i32::try_from(value).map_err(|_| {
                    StrataError::InvalidFormat(format!("int field value {} overflows", value))
                })?;
                Field::Integer(value)
            }
            Self::Long => Field::Long(reader.read_var_i64()?),
            Self::Decimal => {
                let mantissa = reader.read_var_i64()?;
                let exponent = reader.read_i8()?;
                Field::Decimal(Decimal::new(mantissa, exponent))
            }
        })
    }

    fn name(self) -> &'static str {
        match self {
            Self::NanosecondTimestamp => "NANOSECONDS_TIMESTAMP",
            Self::MicrosecondTimestamp => "MICROSECONDS_TIMESTAMP",
            Self::MillisecondTimestamp => "MILLISECONDS_TIMESTAMP",
            Self::SecondTimestamp => "SECONDS_TIMESTAMP",
            Self::Byte => "BYTE",
            Self::Integer => "INTEGER",
            Self::Long => "LONG",
            Self::Decimal => "DECIMAL",
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A typed scalar value.
///
/// The variant (and hence the [`FieldType`]) of a field never changes once created:
/// setters convert the supplied value into the field's own type or fail with
/// [`StrataError::TypeConversion`].
#[derive(Debug, Clone, Copy)]
pub enum Field {
    /// Nanosecond timestamp.
    NanosecondTimestamp(i64),
    /// Microsecond timestamp.
    MicrosecondTimestamp(i64),
    /// Millisecond timestamp.
    MillisecondTimestamp(i64),
    /// Second timestamp.
    SecondTimestamp(i64),
    /// Byte.
    Byte(i8),
    /// 32-bit integer.
    Integer(i32),
    /// 64-bit integer.
    Long(i64),
    /// Decimal.
    Decimal(Decimal),
}

impl Field {
    /// Creates a timestamp field holding `value` in `unit`.
    pub fn timestamp_of(unit: TimeUnit, value: i64) -> Field {
        match unit {
            TimeUnit::Nanoseconds => Field::NanosecondTimestamp(value),
            TimeUnit::Microseconds => Field::MicrosecondTimestamp(value),
            TimeUnit::Milliseconds => Field::MillisecondTimestamp(value),
            TimeUnit::Seconds => Field::SecondTimestamp(value),
        }
    }

    /// Returns the type of this field.
    pub fn field_type(&self) -> FieldType {
        match self {
            Self::NanosecondTimestamp(_) => FieldType::NanosecondTimestamp,
            Self::MicrosecondTimestamp(_) => FieldType::MicrosecondTimestamp,
            Self::MillisecondTimestamp(_) => FieldType::MillisecondTimestamp,
            Self::SecondTimestamp(_) => FieldType::SecondTimestamp,
            Self::Byte(_) => FieldType::Byte,
            Self::Integer(_) => FieldType::Integer,
            Self::Long(_) => FieldType::Long,
            Self::Decimal(_) => FieldType::Decimal,
        }
    }

    /// Returns a copy of this field.
    pub fn new_instance(&self) -> Field {
        *self
    }

    /// Returns true if the field holds the zero value of its type.
    pub fn is_zero(&self) -> bool {
        match self {
            Self::NanosecondTimestamp(v)
            | Self::MicrosecondTimestamp(v)
            | Self::MillisecondTimestamp(v)
            | Self::SecondTimestamp(v)
            | Self::Long(v) => *v == 0,
            Self::Byte(v) => *v == 0,
            Self::Integer(v) => *v == 0,
            Self::Decimal(d) => d.is_zero(),
        }
    }

    /// Resets the field to the zero value of its type.
    pub fn set_zero(&mut self) {
        *self = self.field_type().new_field();
    }

    fn mismatch(&self, operation: &'static str) -> StrataError {
        StrataError::TypeConversion {
            operation,
            field_type: self.field_type(),
        }
    }

    /// Copies the value of this field into `other`, which must be of the same type.
    pub fn copy_to(&self, other: &mut Field) -> Result<()> {
        if self.field_type() != other.field_type() {
            return Err(other.mismatch("copy_to"));
        }
        *other = *self;
        Ok(())
    }

    /// Adds `other` (same type) to this field.
    ///
    /// Integral types wrap, so that `a.add(b.subtract(a))` always restores `b`.
    pub fn add(&mut self, other: &Field) -> Result<()> {
        self.combine(other, "add", i64::wrapping_add, Decimal::overflowing_add)
            .map(|_| ())
    }

    /// Subtracts `other` (same type) from this field.
    pub fn subtract(&mut self, other: &Field) -> Result<()> {
        self.combine(other, "subtract", i64::wrapping_sub, Decimal::overflowing_subtract)
            .map(|_| ())
    }

    /// Adds `other` like [`Field::add`] and returns false if a decimal sum had to
    /// drop digits.
    pub fn add_exact(&mut self, other: &Field) -> Result<bool> {
        self.combine(other, "add", i64::wrapping_add, Decimal::overflowing_add)
    }

    /// Subtracts `other` like [`Field::subtract`] and returns false if a decimal
    /// difference had to drop digits.
    pub fn subtract_exact(&mut self, other: &Field) -> Result<bool> {
        self.combine(other, "subtract", i64::wrapping_sub, Decimal::overflowing_subtract)
    }

    fn combine(
        &mut self,
        other: &Field,
        operation: &'static str,
        op: fn(i64, i64) -> i64,
        decimal_op: fn(&Decimal, &Decimal) -> (Decimal, bool),
    ) -> Result<bool> {
        let field_type = self.field_type();
        match (self, other) {
            (Self::NanosecondTimestamp(a), Self::NanosecondTimestamp(b))
            | (Self::MicrosecondTimestamp(a), Self::MicrosecondTimestamp(b))
            | (Self::MillisecondTimestamp(a), Self::MillisecondTimestamp(b))
            | (Self::SecondTimestamp(a), Self::SecondTimestamp(b))
            | (Self::Long(a), Self::Long(b)) => *a = op(*a, *b),
            (Self::Byte(a), Self::Byte(b)) => *a = op(*a as i64, *b as i64) as i8,
            (Self::Integer(a), Self::Integer(b)) => *a = op(*a as i64, *b as i64) as i32,
            (Self::Decimal(a), Self::Decimal(b)) => {
                let (value, lost) = decimal_op(a, b);
                *a = value;
                return Ok(!lost);
            }
            _ => {
                return Err(StrataError::TypeConversion {
                    operation,
                    field_type,
                })
            }
        }
        Ok(true)
    }

    /// Sets a timestamp expressed in `unit`, converting it to the field's resolution.
    pub fn set_timestamp(&mut self, value: i64, unit: TimeUnit) -> Result<&mut Self> {
        match self {
            Self::NanosecondTimestamp(v) => *v = TimeUnit::Nanoseconds.convert(value, unit),
            Self::MicrosecondTimestamp(v) => *v = TimeUnit::Microseconds.convert(value, unit),
            Self::MillisecondTimestamp(v) => *v = TimeUnit::Milliseconds.convert(value, unit),
            Self::SecondTimestamp(v) => *v = TimeUnit::Seconds.convert(value, unit),
            _ => return Err(self.mismatch("set_timestamp")),
        }
        Ok(self)
    }

    /// Sets a timestamp expressed in nanoseconds.
    pub fn set_timestamp_in_nanos(&mut self, nanos: i64) -> Result<&mut Self> {
        self.set_timestamp(nanos, TimeUnit::Nanoseconds)
    }

    /// Sets a timestamp expressed in milliseconds.
    pub fn set_timestamp_in_millis(&mut self, millis: i64) -> Result<&mut Self> {
        self.set_timestamp(millis, TimeUnit::Milliseconds)
    }

    /// Sets a byte value. Accepted by byte, int, long and decimal fields.
    pub fn set_byte(&mut self, value: i8) -> Result<&mut Self> {
        match self {
            Self::Byte(v) => *v = value,
            Self::Integer(v) => *v = value as i32,
            Self::Long(v) => *v = value as i64,
            Self::Decimal(d) => *d = Decimal::new(value as i64, 0),
            _ => return Err(self.mismatch("set_byte")),
        }
        Ok(self)
    }

    /// Sets an int value. Accepted by int, long and decimal fields.
    pub fn set_int(&mut self, value: i32) -> Result<&mut Self> {
        match self {
            Self::Integer(v) => *v = value,
            Self::Long(v) => *v = value as i64,
            Self::Decimal(d) => *d = Decimal::new(value as i64, 0),
            _ => return Err(self.mismatch("set_int")),
        }
        Ok(self)
    }

    /// Sets a long value. Accepted by long and decimal fields.
    pub fn set_long(&mut self, value: i64) -> Result<&mut Self> {
        match self {
            Self::Long(v) => *v = value,
            Self::Decimal(d) => *d = Decimal::new(value, 0),
            _ => return Err(self.mismatch("set_long")),
        }
        Ok(self)
    }

    /// Sets a decimal value. Accepted by decimal fields only.
    pub fn set_decimal(&mut self, mantissa: i64, exponent: i8) -> Result<&mut Self> {
        match self {
            Self::Decimal(d) => *d = Decimal::new(mantissa, exponent),
            _ => return Err(self.mismatch("set_decimal")),
        }
        Ok(self)
    }

    /// Parses `value` and stores it in this field.
    ///
    /// Timestamp literals are integers in the field's unit, integers with a unit
    /// suffix (`10ms`) or dates/date-times in `time_zone`.
    pub fn set_value_from_string(&mut self, time_zone: &FixedOffset, value: &str) -> Result<()> {
        let field_type = self.field_type();
        match self {
            Self::NanosecondTimestamp(v)
            | Self::MicrosecondTimestamp(v)
            | Self::MillisecondTimestamp(v)
            | Self::SecondTimestamp(v) => {
                let unit = field_type.time_unit().unwrap_or_default();
                *v = parse::parse_timestamp(value, field_type, unit, time_zone)?;
            }
            Self::Byte(v) => {
                *v = parse::parse_integer(value, field_type, i8::MIN as i64, i8::MAX as i64)? as i8
            }
            Self::Integer(v) => {
                *v = parse::parse_integer(value, field_type, i32::MIN as i64, i32::MAX as i64)?
                    as i32
            }
            Self::Long(v) => *v = parse::parse_integer(value, field_type, i64::MIN, i64::MAX)?,
            Self::Decimal(d) => *d = parse::parse_decimal(value)?,
        }
        Ok(())
    }

    /// Returns the timestamp converted to `unit`.
    pub fn timestamp_in(&self, unit: TimeUnit) -> Result<i64> {
        match self {
            Self::NanosecondTimestamp(v) => Ok(unit.convert(*v, TimeUnit::Nanoseconds)),
            Self::MicrosecondTimestamp(v) => Ok(unit.convert(*v, TimeUnit::Microseconds)),
            Self::MillisecondTimestamp(v) => Ok(unit.convert(*v, TimeUnit::Milliseconds)),
            Self::SecondTimestamp(v) => Ok(unit.convert(*v, TimeUnit::Seconds)),
            _ => Err(self.mismatch("get_timestamp")),
        }
    }

    /// Returns the timestamp in nanoseconds.
    pub fn timestamp_in_nanos(&self) -> Result<i64> {
        self.timestamp_in(TimeUnit::Nanoseconds)
    }

    /// Returns the timestamp in milliseconds.
    pub fn timestamp_in_millis(&self) -> Result<i64> {
        self.timestamp_in(TimeUnit::Milliseconds)
    }

    /// Returns the value of a byte field.
    pub fn byte(&self) -> Result<i8> {
        match self {
            Self::Byte(v) => Ok(*v),
            _ => Err(self.mismatch("get_byte")),
        }
    }

    /// Returns the value of a byte or int field.
    pub fn int(&self) -> Result<i32> {
        match self {
            Self::Byte(v) => Ok(*v as i32),
            Self::Integer(v) => Ok(*v),
            _ => Err(self.mismatch("get_int")),
        }
    }

    /// Returns the value of a byte, int or long field.
    pub fn long(&self) -> Result<i64> {
        match self {
            Self::Byte(v) => Ok(*v as i64),
            Self::Integer(v) => Ok(*v as i64),
            Self::Long(v) => Ok(*v),
            _ => Err(self.mismatch("get_long")),
        }
    }

    /// Returns the value of a numeric (non-timestamp) field as a decimal.
    pub fn decimal(&self) -> Result<Decimal> {
        match self {
            Self::Decimal(d) => Ok(*d),
            Self::Byte(_) | Self::Integer(_) | Self::Long(_) => Ok(Decimal::new(self.long()?, 0)),
            _ => Err(self.mismatch("get_decimal")),
        }
    }

    /// Returns the value of a numeric (non-timestamp) field as a float.
    pub fn double(&self) -> Result<f64> {
        Ok(self.decimal()?.to_f64())
    }

    /// Number of bytes [`Field::write_to`] emits.
    pub fn serialized_size(&self) -> usize {
        match self {
            Self::NanosecondTimestamp(v)
            | Self::MicrosecondTimestamp(v)
            | Self::MillisecondTimestamp(v)
            | Self::SecondTimestamp(v)
            | Self::Long(v) => var_i64_size(*v),
            Self::Byte(_) => 1,
            Self::Integer(v) => var_i64_size(*v as i64),
            Self::Decimal(d) => var_i64_size(d.mantissa) + 1,
        }
    }

    /// Writes the binary encoding of the field value.
    pub fn write_to<W: Write + ?Sized>(&self, writer: &mut W) -> Result<()> {
        match self {
            Self::NanosecondTimestamp(v)
            | Self::MicrosecondTimestamp(v)
            | Self::MillisecondTimestamp(v)
            | Self::SecondTimestamp(v)
            | Self::Long(v) => write_var_i64(writer, *v),
            Self::Byte(v) => {
                writer.write_all(&[*v as u8])?;
                Ok(())
            }
            Self::Integer(v) => write_var_i64(writer, *v as i64),
            Self::Decimal(d) => {
                write_var_i64(writer, d.mantissa)?;
                writer.write_all(&[d.exponent as u8])?;
                Ok(())
            }
        }
    }

    /// Timestamp value widened to nanoseconds, used for ordering across units.
    fn wide_nanos(&self) -> Option<i128> {
        let unit = self.field_type().time_unit()?;
        let raw = match self {
            Self::NanosecondTimestamp(v)
            | Self::MicrosecondTimestamp(v)
            | Self::MillisecondTimestamp(v)
            | Self::SecondTimestamp(v) => *v,
            _ => return None,
        };
        Some(raw as i128 * unit.nanos_per_unit() as i128)
    }
}

impl PartialEq for Field {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Field {}

impl PartialOrd for Field {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Fields of the same type compare by value; timestamps compare by their instant
/// regardless of unit. Fields of unrelated types are ordered by type code so that
/// the order stays total.
impl Ord for Field {
    fn cmp(&self, other: &Self) -> Ordering {
        if let (Some(a), Some(b)) = (self.wide_nanos(), other.wide_nanos()) {
            return a.cmp(&b).then(self.field_type().cmp(&other.field_type()));
        }
        match (self, other) {
            (Self::Byte(a), Self::Byte(b)) => a.cmp(b),
            (Self::Integer(a), Self::Integer(b)) => a.cmp(b),
            (Self::Long(a), Self::Long(b)) => a.cmp(b),
            (Self::Decimal(a), Self::Decimal(b)) => a.cmp(b),
            _ => self.field_type().cmp(&other.field_type()),
        }
    }
}

impl Hash for Field {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.field_type().hash(state);
        match self {
            Self::NanosecondTimestamp(v)
            | Self::MicrosecondTimestamp(v)
            | Self::MillisecondTimestamp(v)
            | Self::SecondTimestamp(v)
            | Self::Long(v) => v.hash(state),
            Self::Byte(v) => v.hash(state),
            Self::Integer(v) => v.hash(state),
            Self::Decimal(d) => d.hash(state),
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NanosecondTimestamp(v)
            | Self::MicrosecondTimestamp(v)
            | Self::MillisecondTimestamp(v)
            | Self::SecondTimestamp(v) => {
                let unit = self.field_type().time_unit().unwrap_or_default();
                write!(f, "{}{}", v, unit.suffix())
            }
            Self::Byte(v) => write!(f, "{}", v),
            Self::Integer(v) => write!(f, "{}", v),
            Self::Long(v) => write!(f, "{}", v),
            Self::Decimal(d) => write!(f, "{}", d),
        }
    }
}

/// A field that can no longer be mutated, suitable as a map/set key and as a range
/// endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ImmutableField(Field);

impl ImmutableField {
    /// Freezes `field`.
    pub fn new(field: Field) -> Self {
        Self(field)
    }

    /// Returns a mutable copy of the wrapped value.
    pub fn to_field(&self) -> Field {
        self.0
    }
}

impl Deref for ImmutableField {
    type Target = Field;

    fn deref(&self) -> &Field {
        &self.0
    }
}

impl From<Field> for ImmutableField {
    fn from(field: Field) -> Self {
        Self(field)
    }
}

impl fmt::Display for ImmutableField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn utc() -> FixedOffset {
        FixedOffset::east_opt(0).unwrap()
    }

    fn roundtrip(field: Field) -> Field {
        let mut buf = Vec::new();
        field.write_to(&mut buf).unwrap();
        assert_eq!(buf.len(), field.serialized_size(), "size of {:?}", field);
        let mut reader = SliceReader::new(&buf);
        let decoded = field.field_type().read_field(&mut reader).unwrap();
        assert!(reader.is_empty());
        decoded
    }

    #[test]
    fn test_field_type_codes() {
        for code in 0..8u8 {
            assert_eq!(FieldType::from_code(code).unwrap().code(), code);
        }
        assert!(matches!(
            FieldType::from_code(8),
            Err(StrataError::UnknownFieldType(8))
        ));
    }

    #[test]
    fn test_binary_roundtrip_extremes() {
        let fields = [
            Field::NanosecondTimestamp(i64::MIN),
            Field::MicrosecondTimestamp(1_700_000_000_000_000),
            Field::SecondTimestamp(-1),
            Field::Byte(i8::MIN),
            Field::Integer(i32::MAX),
            Field::Long(i64::MAX),
            Field::Decimal(Decimal::new(-123_456, -3)),
            Field::Decimal(Decimal::MAX),
        ];
        for field in fields {
            let decoded = roundtrip(field);
            assert_eq!(decoded, field);
            assert_eq!(decoded.field_type(), field.field_type());
        }
    }

    #[test]
    fn test_setters_widen_but_never_narrow() {
        let mut long = FieldType::Long.new_field();
        long.set_byte(-3).unwrap();
        assert_eq!(long.long().unwrap(), -3);
        long.set_int(70_000).unwrap();
        assert_eq!(long.long().unwrap(), 70_000);

        let mut byte = FieldType::Byte.new_field();
        assert!(matches!(
            byte.set_int(1),
            Err(StrataError::TypeConversion { operation: "set_int", .. })
        ));
        assert!(byte.set_timestamp_in_nanos(1).is_err());
        assert!(byte.set_decimal(1, 0).is_err());

        let mut decimal = FieldType::Decimal.new_field();
        decimal.set_long(42).unwrap();
        assert_eq!(decimal.decimal().unwrap(), Decimal::new(42, 0));
    }

    #[test]
    fn test_getters_reject_incompatible_types() {
        let ts = Field::MillisecondTimestamp(5);
        assert!(ts.long().is_err());
        assert!(ts.double().is_err());
        assert!(Field::Long(1).timestamp_in_nanos().is_err());
        assert!(Field::Integer(1).byte().is_err());
    }

    #[test]
    fn test_timestamp_units() {
        let mut ts = FieldType::MillisecondTimestamp.new_field();
        ts.set_timestamp_in_nanos(1_234_567_890).unwrap();
        assert!(matches!(ts, Field::MillisecondTimestamp(1_234)));
        assert_eq!(ts.timestamp_in_nanos().unwrap(), 1_234_000_000);
        assert_eq!(ts.timestamp_in(TimeUnit::Seconds).unwrap(), 1);
        assert_eq!(TimeUnit::Seconds.convert(-1, TimeUnit::Milliseconds), -1);
    }

    #[test]
    fn test_rounding_from_nanos() {
        let ms = TimeUnit::Milliseconds;
        assert_eq!(ms.floor_nanos(2_000_000), 2);
        assert_eq!(ms.ceil_nanos(2_000_000), 2);
        assert_eq!(ms.floor_nanos(2_000_001), 2);
        assert_eq!(ms.ceil_nanos(2_000_001), 3);
        assert_eq!(ms.floor_nanos(-1), -1);
        assert_eq!(ms.ceil_nanos(-1), 0);
        assert_eq!(TimeUnit::Nanoseconds.ceil_nanos(7), 7);
        assert_eq!(Field::timestamp_of(TimeUnit::Seconds, 3), Field::SecondTimestamp(3));
    }

    #[test]
    fn test_timestamps_compare_by_instant() {
        let millis = Field::MillisecondTimestamp(1);
        let nanos = Field::NanosecondTimestamp(999_999);
        assert!(nanos < millis);
        assert!(Field::SecondTimestamp(1) > Field::MillisecondTimestamp(999));
        assert_ne!(Field::SecondTimestamp(1), Field::MillisecondTimestamp(1000));
    }

    #[test]
    fn test_add_subtract_roundtrip() {
        let pairs = [
            (Field::NanosecondTimestamp(12_000_700), Field::NanosecondTimestamp(13_000_900)),
            (Field::Byte(100), Field::Byte(-100)),
            (Field::Integer(i32::MIN), Field::Integer(i32::MAX)),
            (Field::Long(i64::MAX), Field::Long(i64::MIN)),
            (
                Field::Decimal(Decimal::new(100, -1)),
                Field::Decimal(Decimal::new(15, 0)),
            ),
        ];
        for (base, target) in pairs {
            let mut delta = target;
            delta.subtract(&base).unwrap();
            let mut restored = base;
            restored.add(&delta).unwrap();
            assert_eq!(restored, target);
        }
    }

    #[test]
    fn test_exact_arithmetic_flags_lost_decimal_digits() {
        let mut wrapped = Field::Long(i64::MAX);
        assert!(wrapped.add_exact(&Field::Long(1)).unwrap());
        assert_eq!(wrapped, Field::Long(i64::MIN));

        let mut decimal = Field::Decimal(Decimal::new(-i64::MAX, 0));
        assert!(!decimal
            .subtract_exact(&Field::Decimal(Decimal::new(i64::MAX, 0)))
            .unwrap());

        let mut price = Field::Decimal(Decimal::new(155, -1));
        assert!(price.subtract_exact(&Field::Decimal(Decimal::new(10, 0))).unwrap());
        assert_eq!(price, Field::Decimal(Decimal::new(55, -1)));
    }

    #[test]
    fn test_add_rejects_mismatched_types() {
        let mut field = Field::Long(1);
        assert!(matches!(
            field.add(&Field::Integer(1)),
            Err(StrataError::TypeConversion { operation: "add", .. })
        ));
        assert!(Field::Long(1).copy_to(&mut Field::Byte(0)).is_err());
    }

    #[test]
    fn test_is_zero_and_set_zero() {
        let mut field = Field::Decimal(Decimal::new(5, -1));
        assert!(!field.is_zero());
        field.set_zero();
        assert!(field.is_zero());
        assert_eq!(field.field_type(), FieldType::Decimal);
    }

    #[test]
    fn test_range_parsing() {
        let range = FieldType::NanosecondTimestamp
            .range(&utc(), "1970-01-01", "1970-01-02")
            .unwrap();
        assert!(range.contains(&Field::NanosecondTimestamp(0).into()));
        assert!(!range.contains(&Field::NanosecondTimestamp(86_400_000_000_000).into()));

        let err = FieldType::Integer.range(&utc(), "1", "two").unwrap_err();
        assert!(matches!(err, StrataError::Parse { .. }));
    }

    #[test]
    fn test_all_values_spans_domain() {
        let all = FieldType::Byte.all_values();
        assert!(all.contains(&Field::Byte(i8::MIN).into()));
        assert!(all.contains(&Field::Byte(i8::MAX).into()));
        assert!(!all.contains(&Field::Integer(0).into()));
    }

    #[test]
    fn test_immutable_field_as_key() {
        use std::collections::HashSet;
        let mut set = HashSet::new();
        set.insert(ImmutableField::from(Field::Decimal(Decimal::new(150, -2))));
        assert!(set.contains(&ImmutableField::from(Field::Decimal(Decimal::new(15, -1)))));
        assert_eq!(set.iter().next().unwrap().field_type(), FieldType::Decimal);
    }

    #[test]
    fn test_display() {
        assert_eq!(Field::NanosecondTimestamp(12).to_string(), "12ns");
        assert_eq!(Field::Decimal(Decimal::new(155, -1)).to_string(), "15.5");
        assert_eq!(FieldType::Long.to_string(), "LONG");
    }
}
