//! Raw sensor output.

use serde::{Deserialize, Serialize};

use crate::error::{PerceptionError, Result};

/// Whatever a sensor produced on its last read.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data")]
pub enum Observation {
    /// Nothing has been observed yet.
    #[default]
    Empty,
    Scalar(f64),
    Vector(Vec<f64>),
    /// A grid of symbolic labels, one per cell.
    Labels(LabelGrid),
    Image(ImageFrame),
    Json(serde_json::Value),
}

impl Observation {
    pub fn kind(&self) -> &'static str {
        match self {
            Observation::Empty => "empty",
            Observation::Scalar(_) => "scalar",
            Observation::Vector(_) => "vector",
            Observation::Labels(_) => "labels",
            Observation::Image(_) => "image",
            Observation::Json(_) => "json",
        }
    }

    /// Borrow the label grid, or fail with
    /// [`PerceptionError::MalformedObservation`] for any other variant.
    pub fn as_labels(&self) -> Result<&LabelGrid> {
        match self {
            Observation::Labels(grid) => Ok(grid),
            other => Err(PerceptionError::MalformedObservation(format!(
                "expected a label grid, got {}",
                other.kind()
            ))),
        }
    }

    pub fn as_vector(&self) -> Result<&[f64]> {
        match self {
            Observation::Vector(v) => Ok(v),
            other => Err(PerceptionError::MalformedObservation(format!(
                "expected a vector, got {}",
                other.kind()
            ))),
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// LabelGrid
// ────────────────────────────────────────────────────────────────────────────

/// A rectangular, row-major grid of string labels.
///
/// Deserialization checks that `cells` holds exactly `rows * cols` labels.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawLabelGrid")]
pub struct LabelGrid {
    rows: usize,
    cols: usize,
    cells: Vec<String>,
}

#[derive(Deserialize)]
struct RawLabelGrid {
    rows: usize,
    cols: usize,
    cells: Vec<String>,
}

impl TryFrom<RawLabelGrid> for LabelGrid {
    type Error = PerceptionError;

    fn try_from(raw: RawLabelGrid) -> Result<Self> {
        let RawLabelGrid { rows, cols, cells } = raw;
        if rows.checked_mul(cols) != Some(cells.len()) {
            return Err(PerceptionError::MalformedObservation(format!(
                "a {rows}x{cols} grid cannot hold {} cells",
                cells.len()
            )));
        }
        Ok(Self { rows, cols, cells })
    }
}

impl LabelGrid {
    /// Build a grid from its rows.
    ///
    /// # Errors
    ///
    /// [`PerceptionError::MalformedObservation`] when the rows differ in
    /// length.
    pub fn new<R, S>(rows: impl IntoIterator<Item = R>) -> Result<Self>
    where
        R: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut cells = Vec::new();
        let mut n_rows = 0;
        let mut n_cols = None;
        for row in rows {
            let before = cells.len();
            cells.extend(row.into_iter().map(Into::into));
            let width = cells.len() - before;
            match n_cols {
                None => n_cols = Some(width),
                Some(expected) if expected != width => {
                    return Err(PerceptionError::MalformedObservation(format!(
                        "row {n_rows} has {width} cells, expected {expected}"
                    )));
                }
                Some(_) => {}
            }
            n_rows += 1;
        }
        Ok(Self {
            rows: n_rows,
            cols: n_cols.unwrap_or(0),
            cells,
        })
    }

    /// Parse whitespace-separated labels, one grid row per non-blank line.
    pub fn parse(text: &str) -> Result<Self> {
        Self::new(
            text.lines()
                .filter(|line| !line.trim().is_empty())
                .map(|line| line.split_whitespace().collect::<Vec<_>>()),
        )
    }

    /// `(rows, cols)`.
    pub fn shape(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }

    pub fn get(&self, row: usize, col: usize) -> Option<&str> {
        if row >= self.rows || col >= self.cols {
            return None;
        }
        self.cells.get(row * self.cols + col).map(String::as_str)
    }

    /// All `(row, col)` positions holding `label`, in row-major order.
    pub fn positions_of(&self, label: &str) -> Vec<(usize, usize)> {
        self.cells
            .iter()
            .enumerate()
            .filter(|(_, cell)| cell.as_str() == label)
            .map(|(i, _)| (i / self.cols, i % self.cols))
            .collect()
    }
}

// ────────────────────────────────────────────────────────────────────────────
// ImageFrame
// ────────────────────────────────────────────────────────────────────────────

/// A raw, interleaved image frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageFrame {
    /// Frame width in pixels.
    pub width: u32,
    /// Frame height in pixels.
    pub height: u32,
    /// Bytes per pixel (1 for greyscale, 3 for RGB24).
    pub channels: u8,
    pub data: Vec<u8>,
}

impl ImageFrame {
    /// # Errors
    ///
    /// [`PerceptionError::MalformedObservation`] when `data` does not hold
    /// exactly `width * height * channels` bytes.
    pub fn new(width: u32, height: u32, channels: u8, data: Vec<u8>) -> Result<Self> {
        let expected = width as usize * height as usize * channels as usize;
        if data.len() != expected {
            return Err(PerceptionError::MalformedObservation(format!(
                "{width}x{height}x{channels} frame needs {expected} bytes, got {}",
                data.len()
            )));
        }
        Ok(Self {
            width,
            height,
            channels,
            data,
        })
    }

    /// The channel values of the pixel at `(x, y)`.
    pub fn pixel(&self, x: u32, y: u32) -> Option<&[u8]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let c = self.channels as usize;
        let start = (y as usize * self.width as usize + x as usize) * c;
        self.data.get(start..start + c)
    }
}
