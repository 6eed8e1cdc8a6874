use nalgebra::Point3;
use serde::{Deserialize, Serialize};

/// Physical chessboard: inner-corner counts and square edge in metres.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BoardSpec {
    pub inner_cols: usize,
    pub inner_rows: usize,
    pub square_size: f64,
}

impl Default for BoardSpec {
    fn default() -> Self {
        Self {
            inner_cols: 6,
            inner_rows: 9,
            square_size: 0.01905,
        }
    }
}

impl BoardSpec {
    pub fn new(inner_cols: usize, inner_rows: usize, square_size: f64) -> Self {
        Self {
            inner_cols,
            inner_rows,
            square_size,
        }
    }

    pub fn corner_count(&self) -> usize {
        self.inner_cols * self.inner_rows
    }

    /// Board-frame corners `(c * s, r * s, 0)`, row-major, matching the
    /// order chessboard finders report image corners in.
    pub fn object_points(&self) -> Vec<Point3<f64>> {
        (0..self.inner_rows)
            .flat_map(|r| {
                (0..self.inner_cols).map(move |c| {
                    Point3::new(c as f64 * self.square_size, r as f64 * self.square_size, 0.0)
                })
            })
            .collect()
    }
}
