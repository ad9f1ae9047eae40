//! Page cursor shared by the history and memory views.

use crate::config::PageSize;

/// `logs[(page-1)*page_size .. page*page_size]`, clamped to the slice.
///
/// Page 0 is treated like page 1. Out-of-range pages yield an empty slice.
pub fn paginate<T>(items: &[T], page: usize, page_size: PageSize) -> &[T] {
    let size = page_size.get();
    let start = page.saturating_sub(1).saturating_mul(size).min(items.len());
    let end = start.saturating_add(size).min(items.len());
    &items[start..end]
}

pub fn page_count(len: usize, page_size: PageSize) -> usize {
    len.div_ceil(page_size.get()).max(1)
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PageState {
    current: usize,
    size: PageSize,
}

impl PageState {
    pub fn new(size: PageSize) -> Self {
        Self { current: 1, size }
    }

    pub fn current(&self) -> usize {
        self.current
    }

    pub fn size(&self) -> PageSize {
        self.size
    }

    pub fn set_size(&mut self, size: PageSize, len: usize) {
        self.size = size;
        self.clamp(len);
    }

    pub fn go_to(&mut self, page: usize, len: usize) {
        self.current = page;
        self.clamp(len);
    }

    pub fn next(&mut self, len: usize) {
        self.go_to(self.current.saturating_add(1), len);
    }

    pub fn prev(&mut self, len: usize) {
        self.go_to(self.current.saturating_sub(1), len);
    }

    pub fn clamp(&mut self, len: usize) {
        self.current = self.current.clamp(1, page_count(len, self.size));
    }

    pub fn total_pages(&self, len: usize) -> usize {
        page_count(len, self.size)
    }

    pub fn slice<'a, T>(&self, items: &'a [T]) -> &'a [T] {
        paginate(items, self.current, self.size)
    }
}
