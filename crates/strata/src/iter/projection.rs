//! Field projection: publishing a subset of each record type's fields.

use crate::error::{Result, StrataError};
use crate::field::Field;
use crate::iter::{CloseableIterator, RecordIterator};
use crate::record::{BoxedRecord, Record};
use crate::schema::TimeSeriesDefinition;
use std::collections::HashSet;
use std::sync::Arc;

/// Per record type, the source field index of every published field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldProjection {
    mappings: Vec<Arc<[usize]>>,
}

impl FieldProjection {
    /// Publishes, for each record type, the timestamp plus the fields named in
    /// `fields` that the type declares, in declaration order.
    ///
    /// # Errors
    ///
    /// Fails with `StrataError::UnknownField` if a name is declared by no record
    /// type.
    pub fn new(definition: &TimeSeriesDefinition, fields: &[&str]) -> Result<Self> {
        let wanted: HashSet<&str> = fields.iter().copied().collect();
        for name in fields {
            let declared = definition
                .record_types()
                .iter()
                .any(|t| t.field_index(name).is_some());
            if !declared {
                return Err(StrataError::UnknownField {
                    record_type: definition.name().to_string(),
                    field: name.to_string(),
                });
            }
        }

        let mappings = definition
            .record_types()
            .iter()
            .map(|record_type| {
                record_type
                    .fields()
                    .iter()
                    .enumerate()
                    .filter(|(i, f)| *i == 0 || wanted.contains(f.name.as_str()))
                    .map(|(i, _)| i)
                    .collect()
            })
            .collect();
        Ok(Self { mappings })
    }

    /// Builds a projection from explicit index tables, one per record type.
    ///
    /// # Errors
    ///
    /// Fails if a table does not start with the timestamp or references a field
    /// the record type does not have.
    pub fn from_indices(definition: &TimeSeriesDefinition, indices: Vec<Vec<usize>>) -> Result<Self> {
        if indices.len() != definition.number_of_record_types() {
            return Err(StrataError::InvalidFormat(format!(
                "{} index tables for {} record types",
                indices.len(),
                definition.number_of_record_types()
            )));
        }
        for (record_type, table) in indices.iter().enumerate() {
            let count = definition.record_type(record_type)?.field_count();
            if table.first() != Some(&0) {
                return Err(StrataError::InvalidFormat(format!(
                    "projection of record type {} drops the timestamp",
                    record_type
                )));
            }
            if let Some(index) = table.iter().find(|i| **i >= count) {
                return Err(StrataError::FieldIndexOutOfBounds {
                    index: *index,
                    count,
                });
            }
        }
        Ok(Self {
            mappings: indices.into_iter().map(Arc::from).collect(),
        })
    }

    /// The index table of `record_type`.
    pub fn mapping(&self, record_type: usize) -> Option<&[usize]> {
        self.mappings.get(record_type).map(|m| &m[..])
    }

    /// Wraps `record` so that it publishes only the projected fields.
    pub fn apply(&self, record: BoxedRecord) -> Result<FieldFilteringRecord> {
        let mapping = self.mappings.get(record.record_type()).ok_or(
            StrataError::UnknownRecordType(record.record_type().min(u8::MAX as usize) as u8),
        )?;
        Ok(FieldFilteringRecord {
            inner: record,
            mapping: Arc::clone(mapping),
        })
    }
}

/// A record publishing a subset of the fields of another record.
///
/// Field values are read through from the wrapped record; the presence bit-set
/// and serialized size are those of the projected fields only.
#[derive(Debug)]
pub struct FieldFilteringRecord {
    inner: BoxedRecord,
    mapping: Arc<[usize]>,
}

impl FieldFilteringRecord {
    /// Returns the wrapped record.
    pub fn into_inner(self) -> BoxedRecord {
        self.inner
    }
}

impl Record for FieldFilteringRecord {
    fn record_type(&self) -> usize {
        self.inner.record_type()
    }

    fn field_count(&self) -> usize {
        self.mapping.len()
    }

    fn is_delta(&self) -> Result<bool> {
        self.inner.is_delta()
    }

    fn field(&self, index: usize) -> Result<Field> {
        match self.mapping.get(index) {
            Some(source) => self.inner.field(*source),
            None => Err(StrataError::FieldIndexOutOfBounds {
                index,
                count: self.mapping.len(),
            }),
        }
    }
}

/// Projects every record of a source iterator.
pub struct FieldFilteringRecordIterator {
    source: RecordIterator,
    projection: Arc<FieldProjection>,
}

impl FieldFilteringRecordIterator {
    /// Applies `projection` to the records of `source`.
    pub fn new(source: RecordIterator, projection: Arc<FieldProjection>) -> Self {
        Self { source, projection }
    }
}

impl CloseableIterator for FieldFilteringRecordIterator {
    type Item = BoxedRecord;

    fn has_next(&mut self) -> Result<bool> {
        self.source.has_next()
    }

    fn next(&mut self) -> Result<BoxedRecord> {
        let record = self.source.next()?;
        Ok(Box::new(self.projection.apply(record)?))
    }

    fn close(&mut self) -> Result<()> {
        self.source.close()
    }
}
