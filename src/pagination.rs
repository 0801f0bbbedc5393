use std::ops::Range;
use tracing::trace;

/// Number of pages for `nrows` rows. Never zero: an empty result still has
/// one (empty) page.
pub fn total_pages(nrows: usize, page_size: usize) -> usize {
    let page_size = page_size.max(1);
    nrows.div_ceil(page_size).max(1)
}

/// The 1-indexed current page, owned by the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageState {
    current: usize,
}

impl Default for PageState {
    fn default() -> Self {
        Self { current: 1 }
    }
}

impl PageState {
    #[cfg(test)]
    pub fn at(page: usize) -> Self {
        Self {
            current: page.max(1),
        }
    }

    pub fn current(&self) -> usize {
        self.current
    }

    /// Page number this state resolves to for the given page count.
    pub fn effective(&self, total_pages: usize) -> usize {
        self.current.clamp(1, total_pages.max(1))
    }

    /// Re-clamp after the row count or page size changed.
    pub fn clamp_to(&mut self, total_pages: usize) {
        let clamped = self.effective(total_pages);
        if clamped != self.current {
            trace!("Page {} clamped to {}", self.current, clamped);
        }
        self.current = clamped;
    }

    pub fn can_advance(&self, total_pages: usize) -> bool {
        self.current < total_pages
    }

    pub fn can_retreat(&self) -> bool {
        self.current > 1
    }

    /// Moves to the next page; returns false at the last page.
    pub fn advance(&mut self, total_pages: usize) -> bool {
        if self.can_advance(total_pages) {
            self.current += 1;
            true
        } else {
            false
        }
    }

    /// Moves to the previous page; returns false at the first page.
    pub fn retreat(&mut self) -> bool {
        if self.can_retreat() {
            self.current -= 1;
            true
        } else {
            false
        }
    }
}

/// Index range of the page `state` resolves to.
pub fn page_range(nrows: usize, page_size: usize, state: &PageState) -> Range<usize> {
    let page_size = page_size.max(1);
    let page = state.effective(total_pages(nrows, page_size));
    let begin = std::cmp::min((page - 1) * page_size, nrows);
    let end = std::cmp::min(begin + page_size, nrows);
    begin..end
}

pub fn paginate<'a, T>(rows: &'a [T], page_size: usize, state: &PageState) -> &'a [T] {
    &rows[page_range(rows.len(), page_size, state)]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_count() {
        assert_eq!(total_pages(0, 10), 1);
        assert_eq!(total_pages(1, 10), 1);
        assert_eq!(total_pages(10, 10), 1);
        assert_eq!(total_pages(11, 10), 2);
        assert_eq!(total_pages(3, 1), 3);
    }

    #[test]
    fn pages_partition_rows_in_order() {
        let rows: Vec<usize> = (0..23).collect();
        for page_size in 1..=15 {
            let pages = total_pages(rows.len(), page_size);
            let mut seen = Vec::new();
            for page in 1..=pages {
                let slice = paginate(&rows, page_size, &PageState::at(page));
                assert!(!slice.is_empty());
                assert!(slice.len() <= page_size);
                seen.extend_from_slice(slice);
            }
            assert_eq!(seen, rows, "page size {page_size}");
        }
    }

    #[test]
    fn paginate_is_idempotent() {
        let rows: Vec<usize> = (0..7).collect();
        let state = PageState::at(2);
        let first = paginate(&rows, 3, &state).to_vec();
        let second = paginate(&rows, 3, &state).to_vec();
        assert_eq!(first, second);
        assert_eq!(first, vec![3, 4, 5]);
    }

    #[test]
    fn page_beyond_end_clamps_to_last() {
        let rows = vec!["a", "b", "c"];
        let mut state = PageState::at(4);
        assert_eq!(paginate(&rows, 1, &state), &["c"]);

        state.clamp_to(total_pages(rows.len(), 1));
        assert_eq!(state.current(), 3);
    }

    #[test]
    fn empty_rows_give_single_empty_page() {
        let rows: Vec<u8> = Vec::new();
        let mut state = PageState::at(5);
        assert!(paginate(&rows, 4, &state).is_empty());
        state.clamp_to(total_pages(0, 4));
        assert_eq!(state.current(), 1);
        state.clamp_to(0);
        assert_eq!(state.current(), 1);
    }

    #[test]
    fn navigation_stops_at_boundaries() {
        let mut state = PageState::default();
        assert!(!state.retreat());
        assert_eq!(state.current(), 1);

        assert!(state.advance(2));
        assert_eq!(state.current(), 2);
        assert!(!state.advance(2));
        assert_eq!(state.current(), 2);

        assert!(state.retreat());
        assert_eq!(state.current(), 1);
    }
}
