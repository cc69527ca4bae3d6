use crate::entry::Entry;
use bstr::BStr;
use std::cmp::Ordering;

/// The key an entry listing is ordered by.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum SortOrder {
    #[default]
    FilePath,
    FileSize,
    Extension,
}

/// How [`Archive::sort`](crate::Archive::sort) orders the entry listing.
#[derive(Clone, Copy, Debug, Default)]
pub struct SortConfig {
    pub order: SortOrder,
    pub descending: bool,
}

impl SortConfig {
    #[must_use]
    pub fn new(order: SortOrder) -> Self {
        Self {
            order,
            descending: false,
        }
    }

    #[must_use]
    pub fn descending(mut self) -> Self {
        self.descending = true;
        self
    }

    /// Hash-named entries (no real path was recovered) always group after
    /// named ones and stay in original on-disk order relative to each other,
    /// whatever the configured key.
    pub(crate) fn compare(&self, a: &Entry, b: &Entry) -> Ordering {
        let ordering = match (a.had_hash_translated(), b.had_hash_translated()) {
            (true, false) => Ordering::Less,
            (false, true) => Ordering::Greater,
            (false, false) => a.index().cmp(&b.index()),
            (true, true) => self.compare_named(a, b),
        };
        if self.descending {
            ordering.reverse()
        } else {
            ordering
        }
    }

    fn compare_named(&self, a: &Entry, b: &Entry) -> Ordering {
        match self.order {
            SortOrder::FilePath => compare_caseless(a.full_path(), b.full_path()),
            SortOrder::FileSize => a
                .display_size()
                .cmp(&b.display_size())
                .then_with(|| compare_caseless(a.full_path(), b.full_path())),
            SortOrder::Extension => compare_caseless(a.extension(), b.extension())
                .then_with(|| compare_caseless(a.full_path(), b.full_path())),
        }
    }
}

/// ASCII-caseless comparison, matching the format's own case-insensitive
/// path treatment.
fn compare_caseless(a: &BStr, b: &BStr) -> Ordering {
    let a = a.iter().map(u8::to_ascii_lowercase);
    let b = b.iter().map(u8::to_ascii_lowercase);
    a.cmp(b)
}
