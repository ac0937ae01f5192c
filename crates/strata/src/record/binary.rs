//! Lazily decoded records backed by a shared byte buffer.

use crate::block::BLOCK_HEADER_RECORD_TYPE;
use crate::codec::{PresenceBits, SliceReader};
use crate::error::{Result, StrataError};
use crate::field::{Field, FieldType};
use crate::record::Record;
use crate::schema::TimeSeriesDefinition;
use std::cell::RefCell;
use std::fmt;
use std::io::Write;
use std::ops::Range;
use std::sync::Arc;

/// Decode progress of a [`BinaryTimeSeriesRecord`].
///
/// `bits` is decoded on first access. Fields are then decoded strictly forward:
/// `values[i]` and `offsets[i]` exist for every field up to the furthest index
/// requested so far and `cursor` is the byte position right after it.
#[derive(Debug, Default)]
struct DecodeState {
    bits: Option<PresenceBits>,
    offsets: Vec<usize>,
    values: Vec<Field>,
    cursor: usize,
}

impl DecodeState {
    fn reset(&mut self) {
        self.bits = None;
        self.offsets.clear();
        self.values.clear();
        self.cursor = 0;
    }
}

/// A read-only record over an encoded payload.
///
/// The payload is a view into a buffer shared with the other records of the same
/// block; nothing is copied. The presence bit-set is decoded once, and fields are
/// decoded on demand up to the highest index requested, with values and byte
/// offsets cached so that earlier fields can be read again for free.
pub struct BinaryTimeSeriesRecord {
    record_type: usize,
    field_types: Arc<[FieldType]>,
    buffer: Arc<[u8]>,
    payload: Range<usize>,
    state: RefCell<DecodeState>,
}

impl BinaryTimeSeriesRecord {
    /// Wraps `buffer[payload]`, the payload of a record of `record_type`.
    pub fn new(
        record_type: usize,
        field_types: Arc<[FieldType]>,
        buffer: Arc<[u8]>,
        payload: Range<usize>,
    ) -> Result<Self> {
        check_payload(&buffer, &payload)?;
        Ok(Self {
            record_type,
            field_types,
            buffer,
            payload,
            state: RefCell::new(DecodeState::default()),
        })
    }

    /// Wraps a buffer that holds exactly one payload.
    pub fn from_payload(
        record_type: usize,
        field_types: Arc<[FieldType]>,
        payload: impl Into<Arc<[u8]>>,
    ) -> Result<Self> {
        let buffer = payload.into();
        let len = buffer.len();
        Self::new(record_type, field_types, buffer, 0..len)
    }

    /// Reads the record frame starting at `position` in `buffer`.
    ///
    /// Returns the record and the position of the next frame. The block header
    /// record type is resolved through `definition` like any other record type.
    pub fn read_framed(
        definition: &TimeSeriesDefinition,
        buffer: &Arc<[u8]>,
        position: usize,
    ) -> Result<(Self, usize)> {
        let mut reader = SliceReader::at(buffer, position);
        let type_byte = reader.read_u8()?;
        let length = reader.read_var_usize()?;
        let start = reader.position();
        reader.skip(length)?;

        let field_types = if type_byte == BLOCK_HEADER_RECORD_TYPE {
            definition.block_header_definition().field_types()
        } else {
            match definition.record_types().get(type_byte as usize) {
                Some(record_type) => record_type.field_types(),
                None => return Err(StrataError::UnknownRecordType(type_byte)),
            }
        };

        let record = Self::new(
            type_byte as usize,
            Arc::clone(field_types),
            Arc::clone(buffer),
            start..start + length,
        )?;
        Ok((record, reader.position()))
    }

    /// Points this record at a new payload and forgets everything decoded so far.
    pub fn fill(
        &mut self,
        record_type: usize,
        field_types: Arc<[FieldType]>,
        buffer: Arc<[u8]>,
        payload: Range<usize>,
    ) -> Result<()> {
        check_payload(&buffer, &payload)?;
        self.record_type = record_type;
        self.field_types = field_types;
        self.buffer = buffer;
        self.payload = payload;
        self.state.get_mut().reset();
        Ok(())
    }

    /// The raw payload bytes.
    pub fn payload(&self) -> &[u8] {
        &self.buffer[self.payload.clone()]
    }

    /// Returns the encoded bytes of field `index`, empty for a zero field.
    pub fn raw_field(&self, index: usize) -> Result<&[u8]> {
        self.check_index(index)?;
        let state = &mut *self.state.borrow_mut();
        self.decode_up_to(state, index)?;
        let start = state.offsets[index];
        let end = match state.offsets.get(index + 1) {
            Some(next) => *next,
            None => state.cursor,
        };
        Ok(&self.buffer[start..end])
    }

    fn check_index(&self, index: usize) -> Result<()> {
        if index >= self.field_types.len() {
            return Err(StrataError::FieldIndexOutOfBounds {
                index,
                count: self.field_types.len(),
            });
        }
        Ok(())
    }

    fn decode_bits(&self, state: &mut DecodeState) -> Result<()> {
        if state.bits.is_some() {
            return Ok(());
        }
        let mut reader = SliceReader::at(&self.buffer[..self.payload.end], self.payload.start);
        state.bits = Some(reader.read_bit_set(self.field_types.len() + 1)?);
        state.cursor = reader.position();
        Ok(())
    }

    fn decode_up_to(&self, state: &mut DecodeState, index: usize) -> Result<()> {
        self.decode_bits(state)?;
        while state.values.len() <= index {
            let i = state.values.len();
            let present = state.bits.as_ref().is_some_and(|bits| bits[i + 1]);
            state.offsets.push(state.cursor);
            let value = if present {
                let mut reader =
                    SliceReader::at(&self.buffer[..self.payload.end], state.cursor);
                let value = self.field_types[i].read_field(&mut reader)?;
                state.cursor = reader.position();
                value
            } else {
                self.field_types[i].new_field()
            };
            state.values.push(value);
        }
        if state.values.len() == self.field_types.len() && state.cursor != self.payload.end {
            return Err(StrataError::InvalidFormat(format!(
                "{} trailing bytes after record of type {}",
                self.payload.end - state.cursor,
                self.record_type
            )));
        }
        Ok(())
    }
}

fn check_payload(buffer: &[u8], payload: &Range<usize>) -> Result<()> {
    if payload.start > payload.end || payload.end > buffer.len() {
        return Err(StrataError::Truncated {
            needed: payload.end,
            available: buffer.len(),
        });
    }
    Ok(())
}

impl Record for BinaryTimeSeriesRecord {
    fn record_type(&self) -> usize {
        self.record_type
    }

    fn field_count(&self) -> usize {
        self.field_types.len()
    }

    fn is_delta(&self) -> Result<bool> {
        let state = &mut *self.state.borrow_mut();
        self.decode_bits(state)?;
        Ok(state.bits.as_ref().is_some_and(|bits| bits[0]))
    }

    fn field(&self, index: usize) -> Result<Field> {
        self.check_index(index)?;
        let state = &mut *self.state.borrow_mut();
        self.decode_up_to(state, index)?;
        Ok(state.values[index])
    }

    fn bit_set(&self) -> Result<PresenceBits> {
        let state = &mut *self.state.borrow_mut();
        self.decode_bits(state)?;
        Ok(state.bits.clone().unwrap_or_default())
    }

    fn serialized_size(&self) -> Result<usize> {
        Ok(self.payload.len())
    }

    fn write_to(&self, writer: &mut dyn Write) -> Result<()> {
        writer.write_all(self.payload())?;
        Ok(())
    }
}

impl Clone for BinaryTimeSeriesRecord {
    fn clone(&self) -> Self {
        Self {
            record_type: self.record_type,
            field_types: Arc::clone(&self.field_types),
            buffer: Arc::clone(&self.buffer),
            payload: self.payload.clone(),
            state: RefCell::new(DecodeState::default()),
        }
    }
}

impl fmt::Debug for BinaryTimeSeriesRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BinaryTimeSeriesRecord")
            .field("record_type", &self.record_type)
            .field("payload", &self.payload)
            .field("decoded_fields", &self.state.borrow().values.len())
            .finish()
    }
}
