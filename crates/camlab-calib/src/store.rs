//! Plain-text calibration file.
//!
//! Layout, one token per line:
//!
//! ```text
//! rows
//! cols
//! <rows * cols matrix values, row-major>
//! rows
//! cols
//! <rows * cols distortion coefficients>
//! ```
//!
//! Values are written with Rust's shortest round-trip float formatting, so a
//! saved calibration loads back bit-exact.

use std::fmt::Write as _;
use std::fs::File;
use std::io::{BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use camlab_core::CameraCalibration;
use log::{debug, info};
use nalgebra::{DVector, Matrix3};

const MAX_COEFFICIENTS: usize = 14;

#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    #[error("cannot open calibration file {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("i/o error on calibration file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("corrupt calibration file {path}, line {line}: {reason}")]
    Corrupt {
        path: PathBuf,
        line: usize,
        reason: String,
    },
}

/// Parse failure with the 1-based line it was detected on.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FormatError {
    pub line: usize,
    pub reason: String,
}

/// Serialize in the file layout.
pub fn to_text(matrix: &Matrix3<f64>, coefficients: &DVector<f64>) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "3\n3");
    for r in 0..3 {
        for c in 0..3 {
            let _ = writeln!(out, "{}", matrix[(r, c)]);
        }
    }
    let _ = writeln!(out, "{}\n1", coefficients.len());
    for v in coefficients.iter() {
        let _ = writeln!(out, "{v}");
    }
    out
}

struct Tokens<'a> {
    inner: Box<dyn Iterator<Item = (usize, &'a str)> + 'a>,
    last_line: usize,
}

impl<'a> Tokens<'a> {
    fn new(text: &'a str) -> Self {
        Self {
            inner: Box::new(
                text.lines()
                    .enumerate()
                    .flat_map(|(i, l)| l.split_whitespace().map(move |t| (i + 1, t))),
            ),
            last_line: 0,
        }
    }

    fn next_token(&mut self, what: &str) -> Result<(usize, &'a str), FormatError> {
        match self.inner.next() {
            Some((line, tok)) => {
                self.last_line = line;
                Ok((line, tok))
            }
            None => Err(FormatError {
                line: self.last_line + 1,
                reason: format!("unexpected end of file, expected {what}"),
            }),
        }
    }

    fn dim(&mut self, what: &str) -> Result<usize, FormatError> {
        let (line, tok) = self.next_token(what)?;
        tok.parse::<usize>().map_err(|_| FormatError {
            line,
            reason: format!("expected {what}, found `{tok}`"),
        })
    }

    fn value(&mut self, what: &str) -> Result<f64, FormatError> {
        let (line, tok) = self.next_token(what)?;
        tok.parse::<f64>().map_err(|_| FormatError {
            line,
            reason: format!("expected {what}, found `{tok}`"),
        })
    }

    fn values(&mut self, n: usize, what: &str) -> Result<Vec<f64>, FormatError> {
        (0..n).map(|_| self.value(what)).collect()
    }
}

/// Parse the file layout, checking every count against the header.
pub fn parse(text: &str) -> Result<CameraCalibration, FormatError> {
    let mut tokens = Tokens::new(text);

    let rows = tokens.dim("matrix row count")?;
    let cols = tokens.dim("matrix column count")?;
    if (rows, cols) != (3, 3) {
        return Err(FormatError {
            line: tokens.last_line,
            reason: format!("camera matrix must be 3x3, found {rows}x{cols}"),
        });
    }
    let m = tokens.values(9, "camera matrix value")?;
    let matrix = Matrix3::from_row_slice(&m);

    let rows = tokens.dim("coefficient row count")?;
    let cols = tokens.dim("coefficient column count")?;
    let n = rows.checked_mul(cols).unwrap_or(usize::MAX);
    if (rows != 1 && cols != 1) || n == 0 || n > MAX_COEFFICIENTS {
        return Err(FormatError {
            line: tokens.last_line,
            reason: format!("distortion must be a vector of 1..={MAX_COEFFICIENTS} values, found {rows}x{cols}"),
        });
    }
    let coefficients = DVector::from_vec(tokens.values(n, "distortion coefficient")?);

    if let Some((line, tok)) = tokens.inner.next() {
        return Err(FormatError {
            line,
            reason: format!("trailing token `{tok}`"),
        });
    }

    Ok(CameraCalibration::new(matrix, coefficients))
}

/// Write the camera matrix and coefficients to `path` (created or truncated).
pub fn save(
    path: impl AsRef<Path>,
    matrix: &Matrix3<f64>,
    coefficients: &DVector<f64>,
) -> Result<(), StoreError> {
    let path = path.as_ref();
    let file = File::create(path).map_err(|source| StoreError::Open {
        path: path.to_path_buf(),
        source,
    })?;
    let mut writer = BufWriter::new(file);
    writer
        .write_all(to_text(matrix, coefficients).as_bytes())
        .and_then(|_| writer.flush())
        .map_err(|source| StoreError::Io {
            path: path.to_path_buf(),
            source,
        })?;
    info!("saved calibration to {}", path.display());
    Ok(())
}

pub fn save_calibration(path: impl AsRef<Path>, calib: &CameraCalibration) -> Result<(), StoreError> {
    save(path, &calib.camera_matrix, &calib.distortion)
}

/// Read a calibration written by [`save`].
pub fn load(path: impl AsRef<Path>) -> Result<CameraCalibration, StoreError> {
    let path = path.as_ref();
    let mut file = File::open(path).map_err(|source| StoreError::Open {
        path: path.to_path_buf(),
        source,
    })?;
    let mut text = String::new();
    file.read_to_string(&mut text)
        .map_err(|source| StoreError::Io {
            path: path.to_path_buf(),
            source,
        })?;
    let calib = parse(&text).map_err(|e| StoreError::Corrupt {
        path: path.to_path_buf(),
        line: e.line,
        reason: e.reason,
    })?;
    debug!(
        "loaded calibration from {} ({} coefficients)",
        path.display(),
        calib.distortion.len()
    );
    Ok(calib)
}
