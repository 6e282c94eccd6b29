//! Dense Matrix
//!
//! Row-major `f32` storage backing both the entity table and the bucket
//! table. Every row has the same width.

use rand::Rng;

use super::similarity::normalize_vector;
use crate::error::{Result, VectorError};

/// Row-major matrix of `f32`
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Matrix {
    data: Vec<f32>,
    rows: usize,
    cols: usize,
}

impl Matrix {
    /// Matrix of zeros
    pub fn zeros(rows: usize, cols: usize) -> Self {
        Self {
            data: vec![0.0; rows * cols],
            rows,
            cols,
        }
    }

    /// Empty matrix with a fixed row width
    pub fn empty(cols: usize) -> Self {
        Self::zeros(0, cols)
    }

    /// Wrap a flat buffer. Its length must be a multiple of `cols`.
    pub fn from_vec(data: Vec<f32>, cols: usize) -> Result<Self> {
        if cols == 0 {
            if !data.is_empty() {
                return Err(VectorError::InvalidArgument(
                    "zero-width matrix cannot hold data".to_string(),
                ));
            }
            return Ok(Self::empty(0));
        }
        if data.len() % cols != 0 {
            return Err(VectorError::InvalidArgument(format!(
                "buffer of {} values is not a whole number of rows of width {}",
                data.len(),
                cols
            )));
        }
        let rows = data.len() / cols;
        Ok(Self { data, rows, cols })
    }

    /// Stack rows into a matrix of width `cols`
    pub fn from_rows<R: AsRef<[f32]>>(rows: &[R], cols: usize) -> Result<Self> {
        let mut matrix = Self::empty(cols);
        matrix.data.reserve(rows.len() * cols);
        for row in rows {
            let row = row.as_ref();
            if row.len() != cols {
                return Err(VectorError::dimension_mismatch(cols, row.len()));
            }
            matrix.push_row(row);
        }
        Ok(matrix)
    }

    /// Rows drawn uniformly from `[-1/cols, 1/cols]`
    pub fn random_uniform<G: Rng + ?Sized>(rows: usize, cols: usize, rng: &mut G) -> Self {
        let mut matrix = Self::empty(cols);
        matrix.pad_random(rows, rng);
        matrix
    }

    #[inline]
    pub fn rows(&self) -> usize {
        self.rows
    }

    #[inline]
    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn is_empty(&self) -> bool {
        self.rows == 0
    }

    /// Flat view of all rows
    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }

    #[inline]
    pub fn row(&self, i: usize) -> &[f32] {
        &self.data[i * self.cols..(i + 1) * self.cols]
    }

    #[inline]
    pub fn row_mut(&mut self, i: usize) -> &mut [f32] {
        &mut self.data[i * self.cols..(i + 1) * self.cols]
    }

    pub fn iter_rows(&self) -> impl Iterator<Item = &[f32]> + '_ {
        (0..self.rows).map(move |i| self.row(i))
    }

    pub fn push_row(&mut self, row: &[f32]) {
        debug_assert_eq!(row.len(), self.cols, "Row width must match");
        self.data.extend_from_slice(row);
        self.rows += 1;
    }

    /// Overwrite row `dst` with a copy of row `src`
    pub fn copy_row(&mut self, src: usize, dst: usize) {
        if src != dst {
            let cols = self.cols;
            self.data.copy_within(src * cols..(src + 1) * cols, dst * cols);
        }
    }

    /// Append `new_rows` rows drawn uniformly from `[-1/cols, 1/cols]`
    pub fn pad_random<G: Rng + ?Sized>(&mut self, new_rows: usize, rng: &mut G) {
        if self.cols == 0 {
            self.rows += new_rows;
            return;
        }
        let bound = 1.0 / self.cols as f32;
        self.data.reserve(new_rows * self.cols);
        for _ in 0..new_rows * self.cols {
            self.data.push(rng.gen_range(-bound..=bound));
        }
        self.rows += new_rows;
    }

    /// Split into the first `at` rows and the remainder
    pub fn split_at_row(mut self, at: usize) -> (Matrix, Matrix) {
        let at = at.min(self.rows);
        let tail = self.data.split_off(at * self.cols);
        let tail_rows = self.rows - at;
        self.rows = at;
        let tail = Matrix {
            data: tail,
            rows: tail_rows,
            cols: self.cols,
        };
        (self, tail)
    }

    /// Scale every row to unit length in place. Zero rows stay zero.
    pub fn normalize_rows(&mut self) {
        for i in 0..self.rows {
            normalize_vector(self.row_mut(i));
        }
    }

    /// Unit-length copy
    pub fn normalized(&self) -> Matrix {
        let mut copy = self.clone();
        copy.normalize_rows();
        copy
    }
}
