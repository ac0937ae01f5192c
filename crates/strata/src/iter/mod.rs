//! Pull-based, closeable iterators over blocks and records.
//!
//! Every stage of a read pipeline implements [`CloseableIterator`]:
//! `has_next()` computes and caches the next element, `next()` hands it out and
//! fails with [`StrataError::NoSuchElement`] once the iterator is exhausted, and
//! `close()` releases the underlying resources. Stages own their sources, so
//! closing the outermost iterator closes the whole chain.
//!
//! Stages that derive their output from a source implement [`ComputeNext`] and
//! keep their lookahead in a [`NextSlot`].

mod block;
mod filter;
mod merge;
mod projection;

pub use block::{
    BinaryBlockIterator, BlockFilteringIterator, BlockRecordIterator, CompressingBlockIterator,
    DecompressingBlockIterator,
};
pub use filter::FilteringRecordIterator;
pub use merge::MergingRecordIterator;
pub use projection::{FieldFilteringRecord, FieldFilteringRecordIterator, FieldProjection};

use crate::block::Block;
use crate::error::{Result, StrataError};
use crate::record::BoxedRecord;
use std::fmt;
use std::iter::Peekable;
use tracing::warn;

/// A boxed iterator of records.
pub type RecordIterator = Box<dyn CloseableIterator<Item = BoxedRecord>>;

/// A boxed iterator of blocks.
pub type BlockIterator = Box<dyn CloseableIterator<Item = Block>>;

/// A fallible pull iterator owning closeable resources.
pub trait CloseableIterator {
    /// The element type.
    type Item;

    /// Returns true if [`CloseableIterator::next`] will yield an element.
    fn has_next(&mut self) -> Result<bool>;

    /// Returns the next element.
    ///
    /// # Errors
    ///
    /// Returns `StrataError::NoSuchElement` if the iterator is exhausted.
    fn next(&mut self) -> Result<Self::Item>;

    /// Releases the resources held by this iterator and its sources.
    fn close(&mut self) -> Result<()>;

    /// Drains the iterator into a vector and closes it.
    fn collect_all(mut self) -> Result<Vec<Self::Item>>
    where
        Self: Sized,
    {
        let mut items = Vec::new();
        let drained = (|| -> Result<()> {
            while self.has_next()? {
                items.push(self.next()?);
            }
            Ok(())
        })();
        let closed = self.close();
        drained.and(closed)?;
        Ok(items)
    }
}

impl<I: CloseableIterator + ?Sized> CloseableIterator for Box<I> {
    type Item = I::Item;

    fn has_next(&mut self) -> Result<bool> {
        (**self).has_next()
    }

    fn next(&mut self) -> Result<Self::Item> {
        (**self).next()
    }

    fn close(&mut self) -> Result<()> {
        (**self).close()
    }
}

/// The per-stage logic of a derived iterator.
pub trait ComputeNext {
    /// The element type.
    type Item;

    /// Computes the next element, or `None` once the stage is exhausted.
    fn compute_next(&mut self) -> Result<Option<Self::Item>>;

    /// Closes the sources of the stage.
    fn close_source(&mut self) -> Result<()>;
}

/// Lookahead slot of a derived iterator: the cached next element and whether the
/// stage is finished.
#[derive(Debug)]
pub struct NextSlot<T> {
    next: Option<T>,
    done: bool,
}

impl<T> Default for NextSlot<T> {
    fn default() -> Self {
        Self {
            next: None,
            done: false,
        }
    }
}

impl<T> NextSlot<T> {
    /// Fills the slot from `stage` if empty and reports whether it holds an element.
    pub fn has_next<C: ComputeNext<Item = T>>(&mut self, stage: &mut C) -> Result<bool> {
        if self.next.is_none() && !self.done {
            match stage.compute_next()? {
                Some(item) => self.next = Some(item),
                None => self.done = true,
            }
        }
        Ok(self.next.is_some())
    }

    /// Takes the element out of the slot, computing it first if needed.
    pub fn next<C: ComputeNext<Item = T>>(&mut self, stage: &mut C) -> Result<T> {
        self.has_next(stage)?;
        self.next.take().ok_or(StrataError::NoSuchElement)
    }

    /// Marks the slot finished and closes `stage`.
    pub fn close<C: ComputeNext<Item = T>>(&mut self, stage: &mut C) -> Result<()> {
        self.next = None;
        self.done = true;
        stage.close_source()
    }
}

/// Adapts an in-memory iterator.
pub struct IteratorAdapter<I: Iterator> {
    inner: Peekable<I>,
}

impl<I> fmt::Debug for IteratorAdapter<I>
where
    I: Iterator + fmt::Debug,
    I::Item: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IteratorAdapter").field("inner", &self.inner).finish()
    }
}

impl<I: Iterator> IteratorAdapter<I> {
    /// Wraps `items`.
    pub fn new<T: IntoIterator<IntoIter = I>>(items: T) -> Self {
        Self {
            inner: items.into_iter().peekable(),
        }
    }
}

impl<I: Iterator> CloseableIterator for IteratorAdapter<I> {
    type Item = I::Item;

    fn has_next(&mut self) -> Result<bool> {
        Ok(self.inner.peek().is_some())
    }

    fn next(&mut self) -> Result<Self::Item> {
        self.inner.next().ok_or(StrataError::NoSuchElement)
    }

    fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Concatenates iterators, closing each one as soon as it is exhausted.
pub struct CompositeIterator<T> {
    iterators: Vec<Box<dyn CloseableIterator<Item = T>>>,
    current: usize,
}

impl<T> CompositeIterator<T> {
    /// Chains `iterators` in order.
    pub fn new(iterators: Vec<Box<dyn CloseableIterator<Item = T>>>) -> Self {
        Self {
            iterators,
            current: 0,
        }
    }
}

impl<T> CloseableIterator for CompositeIterator<T> {
    type Item = T;

    fn has_next(&mut self) -> Result<bool> {
        while let Some(iterator) = self.iterators.get_mut(self.current) {
            if iterator.has_next()? {
                return Ok(true);
            }
            self.current += 1;
            iterator.close()?;
        }
        Ok(false)
    }

    fn next(&mut self) -> Result<T> {
        if !self.has_next()? {
            return Err(StrataError::NoSuchElement);
        }
        self.iterators[self.current].next()
    }

    /// Closes every iterator not yet closed. All are attempted; the first failure
    /// is returned and later ones are logged.
    fn close(&mut self) -> Result<()> {
        let mut first_error = None;
        for iterator in self.iterators.iter_mut().skip(self.current) {
            if let Err(e) = iterator.close() {
                if first_error.is_none() {
                    first_error = Some(e);
                } else {
                    warn!(error = %e, "Failed to close iterator");
                }
            }
        }
        self.current = self.iterators.len();
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}
