//! Coordinate-format (Matrix Market style) matrix reader.
//!
//! Files are 1-indexed. Lines starting with `%` are comments; the first
//! remaining line is the `rows cols entries` header and must describe a
//! square matrix. Each entry line is `i j value`: the entries are grouped
//! by `j`, which selects the stored row, and `i` is the column index
//! within that row. A missing value reads as `1.0`.

use anyhow::{bail, Context, Result};
use std::fs;
use std::path::Path;

/// Square matrix in CSR form with `usize` indices.
#[derive(Debug, Clone, PartialEq)]
pub struct MtxMatrix {
    pub n: usize,
    pub row_ptr: Vec<usize>,
    pub col_idx: Vec<usize>,
    pub values: Vec<f64>,
}

impl MtxMatrix {
    pub fn nnz(&self) -> usize {
        self.col_idx.len()
    }
}

/// Read a coordinate file from disk.
pub fn read_mtx(path: &Path) -> Result<MtxMatrix> {
    let text = fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;
    parse_mtx(&text).with_context(|| format!("Failed to parse {}", path.display()))
}

/// Parse the contents of a coordinate file.
pub fn parse_mtx(text: &str) -> Result<MtxMatrix> {
    let mut lines = text
        .lines()
        .enumerate()
        .map(|(no, line)| (no + 1, line.trim()))
        .filter(|(_, line)| !line.is_empty() && !line.starts_with('%'));

    let (no, header) = lines.next().context("missing size header")?;
    let dims: Vec<usize> = header
        .split_whitespace()
        .take(3)
        .map(|t| t.parse::<usize>())
        .collect::<Result<_, _>>()
        .with_context(|| format!("line {no}: malformed header"))?;
    if dims.len() != 3 {
        bail!("line {no}: header needs rows, columns and entries");
    }
    let (rows, cols, nz) = (dims[0], dims[1], dims[2]);
    if rows != cols {
        bail!("matrix is not square ({rows} rows, {cols} columns)");
    }
    let n = rows;

    let mut row_ptr = vec![0usize; n + 1];
    let mut col_idx = Vec::with_capacity(nz);
    let mut values = Vec::with_capacity(nz);
    let mut current = 0usize;
    for (no, line) in lines {
        let mut tokens = line.split_whitespace();
        let mut index = |name: &str| -> Result<usize> {
            let t = tokens.next().with_context(|| format!("line {no}: missing {name}"))?;
            let v: usize = t.parse().with_context(|| format!("line {no}: bad {name} {t:?}"))?;
            if v == 0 || v > n {
                bail!("line {no}: {name} {v} outside 1..={n}");
            }
            Ok(v - 1)
        };
        let col = index("first index")?;
        let row = index("second index")?;
        let value = match tokens.next() {
            Some(t) => t.parse::<f64>().with_context(|| format!("line {no}: bad value {t:?}"))?,
            None => 1.0,
        };
        if row < current {
            bail!("line {no}: entries are not grouped by the second index");
        }
        while current < row {
            current += 1;
            row_ptr[current] = col_idx.len();
        }
        col_idx.push(col);
        values.push(value);
    }
    while current < n {
        current += 1;
        row_ptr[current] = col_idx.len();
    }
    if col_idx.len() != nz {
        bail!("header announces {nz} entries, file has {}", col_idx.len());
    }
    Ok(MtxMatrix { n, row_ptr, col_idx, values })
}
