//! Row and cell storage.
//!
//! A cell is a `(column index, text)` pair; the text payload is a
//! [`SmolStr`], which stores short strings inline (mmCIF values are
//! mostly a handful of bytes). A row holds only the cells that carry a
//! non-default value: the absence of a cell is the unknown value `?`,
//! the text `.` is the inapplicable value, and the empty string is a
//! value of its own. Column lookup walks the row's cells, which is fine
//! because mmCIF rows are narrow.

use smol_str::SmolStr;

/// Stable handle to a row within its category. Handles stay valid
/// across every mutation except erasure of the row itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RowId(pub(crate) u32);

impl RowId {
    pub(crate) fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Cell {
    pub column: u16,
    pub text: SmolStr,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct Row {
    pub cells: Vec<Cell>,
}

impl Row {
    pub fn get(&self, column: u16) -> Option<&str> {
        self.cells
            .iter()
            .find(|c| c.column == column)
            .map(|c| c.text.as_str())
    }

    /// Write or clear one cell. `None` removes the cell, making the
    /// field unknown again.
    pub fn set(&mut self, column: u16, text: Option<SmolStr>) {
        match (self.cells.iter().position(|c| c.column == column), text) {
            (Some(ix), Some(text)) => self.cells[ix].text = text,
            (Some(ix), None) => {
                self.cells.remove(ix);
            }
            (None, Some(text)) => self.cells.push(Cell { column, text }),
            (None, None) => {}
        }
    }
}

// A cell must stay small: SmolStr is three pointers wide and the
// column index rides in the padding.
const _: () = assert!(size_of::<Cell>() <= 32);
