//! LIMIT/OFFSET window for a table request.

use serde::Serialize;

/// Rows to fetch for one page. `limit: None` means every remaining row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PageWindow {
    pub offset: u64,
    pub limit: Option<u64>,
}

impl PageWindow {
    /// Build the window from DataTables `start`/`length`.
    ///
    /// A negative length asks for all rows; `max_page_length` (0 = unlimited)
    /// caps both explicit lengths and "all".
    pub fn from_request(start: u64, length: i64, max_page_length: u64) -> Self {
        let cap = (max_page_length > 0).then_some(max_page_length);
        let limit = if length < 0 {
            cap
        } else {
            let length = length as u64;
            Some(cap.map_or(length, |cap| length.min(cap)))
        };
        Self {
            offset: start,
            limit,
        }
    }

    /// A zero-length page needs no fetch at all.
    pub fn is_empty(&self) -> bool {
        self.limit == Some(0)
    }

    pub fn offset_sql(&self) -> Option<u64> {
        (self.offset > 0).then_some(self.offset)
    }
}
