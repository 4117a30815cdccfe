//! Grid-cell digit reading.
//!
//! A confirmed paper grid is subdivided into N x N cells by bilinear
//! interpolation of its corners; each cell is handed to the text recognizer
//! independently. A digit is accepted only when recognition confidence
//! clears the threshold; anything else reads as an empty cell, including a
//! recognizer error (a transient per-cell failure is not an event).

use crate::detect::TextRecognizer;
use crate::frame::Frame;
use crate::geometry::Quad;

/// One full read of an N x N grid, row-major.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GridCells {
    pub size: usize,
    pub cells: Vec<Option<u8>>,
}

impl GridCells {
    pub fn empty(size: usize) -> Self {
        Self {
            size,
            cells: vec![None; size * size],
        }
    }

    pub fn get(&self, row: usize, col: usize) -> Option<u8> {
        self.cells[row * self.size + col]
    }

    /// Cells that differ from `previous`, as (row, col, new value).
    pub fn diff(&self, previous: &GridCells) -> Vec<(u8, u8, Option<u8>)> {
        debug_assert_eq!(self.size, previous.size);
        let mut changes = Vec::new();
        for row in 0..self.size {
            for col in 0..self.size {
                let value = self.get(row, col);
                if value != previous.get(row, col) {
                    changes.push((row as u8, col as u8, value));
                }
            }
        }
        changes
    }
}

/// Read every cell of `quad` subdivided `size` x `size`.
pub fn read_cells(
    frame: &Frame,
    quad: &Quad,
    size: usize,
    recognizer: &mut dyn TextRecognizer,
    min_confidence: f32,
) -> GridCells {
    let mut grid = GridCells::empty(size);
    for row in 0..size {
        for col in 0..size {
            let region = quad.cell(row, col, size);
            let value = match recognizer.recognize(frame, &region) {
                Ok(Some(candidate)) if candidate.confidence >= min_confidence => {
                    parse_digit(&candidate.text)
                }
                Ok(_) => None,
                Err(err) => {
                    log::debug!("cell ({row},{col}) recognition failed: {err:#}");
                    None
                }
            };
            grid.cells[row * size + col] = value;
        }
    }
    grid
}

fn parse_digit(text: &str) -> Option<u8> {
    let trimmed = text.trim();
    match trimmed.parse::<u8>() {
        Ok(d) if d <= 9 => Some(d),
        _ => None,
    }
}
