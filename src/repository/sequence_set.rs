use std::{
    collections::BTreeSet,
    fmt::{Display, Formatter, Result},
    num::NonZeroU32,
};
use thiserror::Error;

use crate::repository::Uid;

#[derive(Debug, PartialEq, Clone, Copy)]
struct SequenceRange {
    start: NonZeroU32,
    end: Option<NonZeroU32>,
}

impl SequenceRange {
    fn single(num: NonZeroU32) -> Self {
        Self {
            start: num,
            end: None,
        }
    }

    fn range(start: NonZeroU32, end: NonZeroU32) -> Self {
        if start == end {
            Self::single(start)
        } else {
            debug_assert!(start < end);
            Self {
                start,
                end: Some(end),
            }
        }
    }

    fn end(&self) -> NonZeroU32 {
        self.end.unwrap_or(self.start)
    }

    fn len(&self) -> usize {
        let span = self.end().get() - self.start.get();
        usize::try_from(span).map_or(usize::MAX, |span| span.saturating_add(1))
    }

    fn iter(&self) -> impl Iterator<Item = NonZeroU32> + use<> {
        (self.start.get()..=self.end().get()).filter_map(NonZeroU32::new)
    }
}

impl Display for SequenceRange {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        if let Some(to) = self.end {
            write!(f, "{}:{}", self.start, to)
        } else {
            write!(f, "{}", self.start)
        }
    }
}

#[derive(Debug, Error, Default)]
#[error("No numbers in sequence set")]
pub struct EmptySetError {}

/// Collects message numbers (sequence numbers or UIDs) into a compact set.
#[derive(Default, Debug, PartialEq, Clone)]
pub struct SequenceSetBuilder {
    nums: BTreeSet<NonZeroU32>,
}

impl SequenceSetBuilder {
    pub fn add(&mut self, num: impl Into<NonZeroU32>) {
        self.nums.insert(num.into());
    }

    pub fn build(self) -> std::result::Result<SequenceSet, EmptySetError> {
        let mut sorted_nums = self.nums.into_iter();

        if let Some(first_num) = sorted_nums.next() {
            let mut ranges = Vec::new();
            let mut current_range = SequenceRange::single(first_num);

            for num in sorted_nums {
                if current_range.end().checked_add(1) == Some(num) {
                    current_range.end = Some(num);
                } else {
                    ranges.push(current_range);
                    current_range = SequenceRange::single(num);
                }
            }

            ranges.push(current_range);

            Ok(SequenceSet { ranges })
        } else {
            Err(EmptySetError {})
        }
    }
}

/// Non-empty IMAP sequence set, rendered in its wire form (`1:4,7,9:10`).
#[derive(Debug, PartialEq, Clone)]
pub struct SequenceSet {
    ranges: Vec<SequenceRange>,
}

impl SequenceSet {
    /// `1:count`, the whole mailbox as seen by the current selection.
    pub fn first(count: u32) -> std::result::Result<Self, EmptySetError> {
        let end = NonZeroU32::new(count).ok_or(EmptySetError {})?;
        Ok(Self {
            ranges: vec![SequenceRange::range(NonZeroU32::MIN, end)],
        })
    }

    pub fn len(&self) -> usize {
        self.ranges
            .iter()
            .map(SequenceRange::len)
            .fold(0, usize::saturating_add)
    }

    pub fn iter(&self) -> impl Iterator<Item = NonZeroU32> + '_ {
        self.ranges.iter().flat_map(SequenceRange::iter)
    }
}

impl Display for SequenceSet {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        let mut ranges = self.ranges.iter();
        if let Some(first) = ranges.next() {
            write!(f, "{first}")?;
        }
        for range in ranges {
            write!(f, ",{range}")?;
        }
        Ok(())
    }
}

impl From<Uid> for NonZeroU32 {
    fn from(value: Uid) -> Self {
        value.get()
    }
}

impl TryFrom<&[Uid]> for SequenceSet {
    type Error = EmptySetError;

    fn try_from(value: &[Uid]) -> std::result::Result<Self, Self::Error> {
        value
            .iter()
            .fold(SequenceSetBuilder::default(), |mut builder, uid| {
                builder.add(*uid);
                builder
            })
            .build()
    }
}
