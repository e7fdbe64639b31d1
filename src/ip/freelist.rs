//! Free-range bookkeeping for a single network.
//!
//! A freelist is a sorted sequence of disjoint, non-adjacent `{start, end}`
//! ranges of host offsets that are still unallocated. Allocation always hands
//! out the smallest free offset; release merges the offset back into its
//! neighbours so that the list never contains two touching ranges.

use serde::{Deserialize, Serialize};

/// An inclusive range of free host offsets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Range {
    pub start: u64,
    pub end: u64,
}

impl Range {
    pub fn new(start: u64, end: u64) -> Self {
        Range { start, end }
    }

    pub fn contains(&self, offset: u64) -> bool {
        self.start <= offset && offset <= self.end
    }

    /// Number of offsets in the range
    pub fn len(&self) -> u64 {
        self.end - self.start + 1
    }
}

/// Errors raised by freelist operations
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FreelistError {
    #[error("no free offsets left")]
    Exhausted,
    #[error("offset {0} is not free")]
    Unavailable(u64),
    #[error("offset {0} is already free")]
    DoubleRelease(u64),
}

/// Sorted list of free offset ranges
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Freelist(Vec<Range>);

impl Freelist {
    /// Freelist covering `[first, last]`
    pub fn spanning(first: u64, last: u64) -> Self {
        if last < first {
            return Freelist(Vec::new());
        }
        Freelist(vec![Range::new(first, last)])
    }

    pub fn ranges(&self) -> &[Range] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Total number of free offsets
    pub fn free_count(&self) -> u64 {
        self.0.iter().map(Range::len).sum()
    }

    /// Index of the first range whose end is not below `offset`
    fn locate(&self, offset: u64) -> usize {
        self.0.partition_point(|r| r.end < offset)
    }

    pub fn is_free(&self, offset: u64) -> bool {
        self.0
            .get(self.locate(offset))
            .map_or(false, |r| r.contains(offset))
    }

    /// Take the smallest free offset
    pub fn allocate(&mut self) -> Result<u64, FreelistError> {
        let first = self.0.first_mut().ok_or(FreelistError::Exhausted)?;
        let offset = first.start;
        if first.start == first.end {
            self.0.remove(0);
        } else {
            first.start += 1;
        }
        Ok(offset)
    }

    /// Take a specific offset, splitting the range that holds it
    pub fn allocate_specific(&mut self, offset: u64) -> Result<u64, FreelistError> {
        let idx = self.locate(offset);
        let range = match self.0.get(idx) {
            Some(r) if r.contains(offset) => *r,
            _ => return Err(FreelistError::Unavailable(offset)),
        };

        if range.start == range.end {
            self.0.remove(idx);
        } else if offset == range.start {
            self.0[idx].start += 1;
        } else if offset == range.end {
            self.0[idx].end -= 1;
        } else {
            self.0[idx].end = offset - 1;
            self.0.insert(idx + 1, Range::new(offset + 1, range.end));
        }
        Ok(offset)
    }

    /// Return an offset to the list, merging with adjacent ranges
    pub fn release(&mut self, offset: u64) -> Result<(), FreelistError> {
        let idx = self.locate(offset);
        if self.0.get(idx).map_or(false, |r| r.contains(offset)) {
            return Err(FreelistError::DoubleRelease(offset));
        }

        let joins_left = idx > 0 && self.0[idx - 1].end.checked_add(1) == Some(offset);
        let joins_right = self
            .0
            .get(idx)
            .map_or(false, |r| offset.checked_add(1) == Some(r.start));

        match (joins_left, joins_right) {
            (true, true) => {
                self.0[idx - 1].end = self.0[idx].end;
                self.0.remove(idx);
            }
            (true, false) => self.0[idx - 1].end = offset,
            (false, true) => self.0[idx].start = offset,
            (false, false) => self.0.insert(idx, Range::new(offset, offset)),
        }
        Ok(())
    }
}
