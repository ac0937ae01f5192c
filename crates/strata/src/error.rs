//! Error and Result types for Strata record and block operations.

use crate::field::FieldType;
use std::io;
use thiserror::Error;

/// A convenience `Result` type for Strata operations.
pub type Result<T> = std::result::Result<T, StrataError>;

/// The error type for record, block and iterator operations.
#[derive(Debug, Error)]
pub enum StrataError {
    /// A typed accessor was used on a field of an incompatible type.
    #[error("Type conversion error: cannot {operation} on a {field_type} field")]
    TypeConversion {
        /// The attempted operation (e.g. `set_int`).
        operation: &'static str,
        /// The concrete type of the field.
        field_type: FieldType,
    },

    /// A literal could not be converted into a field value.
    #[error("Cannot parse {value:?} as {field_type}: {reason}")]
    Parse {
        /// The offending literal.
        value: String,
        /// The type the literal was parsed for.
        field_type: FieldType,
        /// Why the parse failed.
        reason: String,
    },

    /// A record frame carries a record type byte outside the schema.
    #[error("Unknown record type: {0}")]
    UnknownRecordType(u8),

    /// A block header carries an unknown compression type byte.
    #[error("Unknown compression type: {0}")]
    UnknownCompressionType(u8),

    /// An unknown field type code was read.
    #[error("Unknown field type: {0}")]
    UnknownFieldType(u8),

    /// The buffer ended before a complete value could be decoded.
    #[error("Truncated buffer: needed {needed} bytes, {available} available")]
    Truncated {
        /// Number of bytes required.
        needed: usize,
        /// Number of bytes left in the buffer.
        available: usize,
    },

    /// Malformed binary data.
    #[error("Invalid format: {0}")]
    InvalidFormat(String),

    /// Two records of different types were combined.
    #[error("Record type mismatch: expected {expected}, got {actual}")]
    RecordTypeMismatch {
        /// The record type of the receiver.
        expected: usize,
        /// The record type of the argument.
        actual: usize,
    },

    /// A record type name is not declared by the schema.
    #[error("Unknown record type name: {0}")]
    UnknownRecordTypeName(String),

    /// A field name is not declared by the record type.
    #[error("Unknown field {field} in record type {record_type}")]
    UnknownField {
        /// The record type name.
        record_type: String,
        /// The missing field name.
        field: String,
    },

    /// A field index is out of bounds for the record.
    #[error("Field index {index} out of bounds for a record of {count} fields")]
    FieldIndexOutOfBounds {
        /// The requested index.
        index: usize,
        /// The number of fields of the record.
        count: usize,
    },

    /// `next()` was called on an exhausted iterator.
    #[error("No more elements")]
    NoSuchElement,

    /// A record builder setter was called before any record was started.
    #[error("No record started; call new_record first")]
    NoRecordStarted,

    /// Error during compression.
    #[error("Compression error: {0}")]
    CompressionError(String),

    /// Error during decompression.
    #[error("Decompression error: {0}")]
    DecompressionError(String),

    /// Underlying I/O error.
    #[error("I/O error: {0}")]
    IoError(#[from] io::Error),
}
