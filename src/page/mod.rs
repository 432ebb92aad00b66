pub mod engine;
pub mod render;

use crate::host::{Coordinates, GridSize};
use tracing::debug;

/// Role of a key on the current page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Slot {
    /// First key of the first page: returns to the previous profile.
    Back,
    /// Last key of every page. `None` when there is nothing to page through.
    PageAdvance(Option<(usize, usize)>),
    /// Index into the device list.
    Device(usize),
    Empty,
}

/// Maps keys to devices and tracks the current page.
///
/// The first and last key of a page are reserved for navigation, so each
/// page holds `capacity - 2` devices.
#[derive(Debug, Clone)]
pub struct Pager {
    page: usize,
    capacity: usize,
}

impl Pager {
    /// `capacity` is clamped to 3, the smallest grid with a device slot.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            page: 0,
            capacity: capacity.max(3),
        }
    }

    #[must_use]
    pub const fn current_page(&self) -> usize {
        self.page
    }

    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn set_capacity(&mut self, capacity: usize) {
        self.capacity = capacity.max(3);
    }

    const fn per_page(&self) -> usize {
        self.capacity - 2
    }

    #[must_use]
    pub const fn total_pages(&self, device_count: usize) -> usize {
        device_count.div_ceil(self.per_page())
    }

    /// Resolve a key index to its role on the current page.
    #[must_use]
    pub fn slot(&self, index: usize, device_count: usize) -> Slot {
        if index == 0 && self.page == 0 {
            return Slot::Back;
        }

        if index == self.capacity - 1 {
            let total = self.total_pages(device_count);
            if total <= 1 || device_count <= self.per_page() {
                return Slot::PageAdvance(None);
            }
            return Slot::PageAdvance(Some((self.page + 1, total)));
        }

        if index >= self.capacity {
            return Slot::Empty;
        }

        let first_page_shift = usize::from(self.page == 0);
        let device = self.page * self.per_page() + index - first_page_shift;
        if device < device_count {
            Slot::Device(device)
        } else {
            Slot::Empty
        }
    }

    /// Move to the next page, wrapping to the first.
    pub fn advance(&mut self, device_count: usize) {
        let total = self.total_pages(device_count);
        self.page = if total <= 1 { 0 } else { (self.page + 1) % total };
        debug!("page {} of {total}", self.page + 1);
    }

    /// Pull the page back into range after the device list shrank.
    pub fn clamp(&mut self, device_count: usize) {
        let total = self.total_pages(device_count);
        if self.page >= total {
            self.page = total.saturating_sub(1);
        }
    }

    pub fn reset(&mut self) {
        self.page = 0;
    }
}

/// Zero-based, row-major key index.
#[must_use]
pub const fn button_index(coords: Coordinates, grid: GridSize) -> usize {
    coords.row * grid.columns + coords.column
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn twenty_devices_on_fifteen_keys() {
        let pager = Pager::new(15);
        assert_eq!(pager.total_pages(20), 2);
        assert_eq!(pager.slot(14, 20), Slot::PageAdvance(Some((1, 2))));
        assert_eq!(pager.slot(0, 20), Slot::Back);
        assert_eq!(pager.slot(1, 20), Slot::Device(0));
        assert_eq!(pager.slot(13, 20), Slot::Device(12));
    }

    #[test]
    fn later_pages_start_at_key_zero() {
        let mut pager = Pager::new(15);
        pager.advance(20);
        assert_eq!(pager.current_page(), 1);
        assert_eq!(pager.slot(0, 20), Slot::Device(13));
        assert_eq!(pager.slot(6, 20), Slot::Device(19));
        assert_eq!(pager.slot(7, 20), Slot::Empty);
        assert_eq!(pager.slot(14, 20), Slot::PageAdvance(Some((2, 2))));

        pager.advance(20);
        assert_eq!(pager.current_page(), 0);
    }

    #[test]
    fn page_advance_hidden_for_single_page() {
        let pager = Pager::new(15);
        assert_eq!(pager.slot(14, 13), Slot::PageAdvance(None));
        assert_eq!(pager.slot(14, 0), Slot::PageAdvance(None));
    }

    #[test]
    fn back_key_ignores_device_count() {
        let pager = Pager::new(15);
        for count in [0, 1, 13, 14, 500] {
            assert_eq!(pager.slot(0, count), Slot::Back);
        }
    }

    #[test]
    fn advance_with_no_devices_stays_on_first_page() {
        let mut pager = Pager::new(15);
        pager.advance(0);
        assert_eq!(pager.current_page(), 0);
    }

    #[test]
    fn clamp_keeps_page_in_range() {
        for count in [0usize, 1, 12, 13, 14, 26, 27, 40, 100] {
            let mut pager = Pager::new(15);
            for _ in 0..7 {
                pager.advance(100);
            }
            pager.clamp(count);
            let total = pager.total_pages(count);
            if count == 0 {
                assert_eq!(pager.current_page(), 0);
            } else {
                assert!(pager.current_page() < total, "count {count}");
            }
        }
    }

    #[test]
    fn row_major_index() {
        let grid = GridSize { columns: 5, rows: 3 };
        assert_eq!(button_index(Coordinates { column: 0, row: 0 }, grid), 0);
        assert_eq!(button_index(Coordinates { column: 4, row: 2 }, grid), 14);
        assert_eq!(button_index(Coordinates { column: 2, row: 1 }, grid), 7);
    }
}
