use crate::error::{HeatError, Result};
use crate::layout;
use crate::traits::Matrix;
use serde::{Deserialize, Serialize};

/// Host-resident `rows x cols` grid of `f64`, stored column by column so that
/// `columns[col][row]` addresses a cell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HostMatrix {
    rows: usize,
    cols: usize,
    columns: Vec<Vec<f64>>,
}

impl HostMatrix {
    /// Creates a matrix filled with zeros.
    pub fn zeros(rows: usize, cols: usize) -> Self {
        Self {
            rows,
            cols,
            columns: vec![vec![0.0; rows]; cols],
        }
    }

    /// Wraps column-indexed data, checking that every column has `rows` values.
    pub fn from_columns(rows: usize, cols: usize, columns: Vec<Vec<f64>>) -> Result<Self> {
        if columns.len() != cols || columns.iter().any(|c| c.len() != rows) {
            return Err(HeatError::InvalidDimensions(format!(
                "Column data does not form a {}x{} grid",
                rows, cols
            )));
        }
        Ok(Self {
            rows,
            cols,
            columns,
        })
    }

    /// Builds a matrix from row-major nested vectors, `data[row][col]`.
    pub fn from_rows(data: &[Vec<f64>]) -> Result<Self> {
        let rows = data.len();
        let cols = data.first().map_or(0, Vec::len);
        if data.iter().any(|r| r.len() != cols) {
            return Err(HeatError::InvalidDimensions(
                "Rows have differing lengths".to_string(),
            ));
        }
        let columns = (0..cols)
            .map(|col| data.iter().map(|r| r[col]).collect())
            .collect();
        Ok(Self {
            rows,
            cols,
            columns,
        })
    }

    /// Rebuilds a matrix from a kernel-layout flat buffer.
    pub fn from_flat(flat: &[f64], rows: usize, cols: usize) -> Result<Self> {
        let columns = layout::unflatten(flat, rows, cols)?;
        Ok(Self {
            rows,
            cols,
            columns,
        })
    }

    /// Flattens into the kernel layout, `flat[row * cols + col]`.
    pub fn to_flat(&self) -> Result<Vec<f64>> {
        layout::flatten(&self.columns, self.rows, self.cols)
    }

    /// Overwrites every cell from a kernel-layout flat buffer.
    pub fn copy_from_flat(&mut self, flat: &[f64]) -> Result<()> {
        self.columns = layout::unflatten(flat, self.rows, self.cols)?;
        Ok(())
    }

    pub fn get(&self, row: usize, col: usize) -> Option<f64> {
        self.columns.get(col).and_then(|c| c.get(row)).copied()
    }

    pub fn get_mut(&mut self, row: usize, col: usize) -> Option<&mut f64> {
        self.columns.get_mut(col).and_then(|c| c.get_mut(row))
    }

    pub fn columns(&self) -> &[Vec<f64>] {
        &self.columns
    }

    pub fn into_columns(self) -> Vec<Vec<f64>> {
        self.columns
    }

    /// Largest absolute cell-wise difference, or `None` if the shapes differ.
    pub fn max_abs_diff(&self, other: &HostMatrix) -> Option<f64> {
        if self.dims() != other.dims() {
            return None;
        }
        let diff = self
            .columns
            .iter()
            .flatten()
            .zip(other.columns.iter().flatten())
            .map(|(a, b)| (a - b).abs())
            .fold(0.0, f64::max);
        Some(diff)
    }
}

impl Matrix for HostMatrix {
    type Value = f64;

    fn dims(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_rows_transposes_storage() {
        let m = HostMatrix::from_rows(&[vec![1.0, 2.0, 3.0], vec![4.0, 5.0, 6.0]]).unwrap();
        assert_eq!(m.dims(), (2, 3));
        assert_eq!(m.get(0, 2), Some(3.0));
        assert_eq!(m.get(1, 0), Some(4.0));
        assert_eq!(m.columns()[1], vec![2.0, 5.0]);
        assert_eq!(m.get(2, 0), None);
    }

    #[test]
    fn test_from_rows_rejects_ragged_input() {
        assert!(HostMatrix::from_rows(&[vec![1.0, 2.0], vec![3.0]]).is_err());
    }

    #[test]
    fn test_flat_round_trip_preserves_cells() {
        let m =
            HostMatrix::from_rows(&[vec![1.5, -2.0], vec![0.0, 1e-300], vec![7.0, 8.0]]).unwrap();
        let flat = m.to_flat().unwrap();
        assert_eq!(flat, vec![1.5, -2.0, 0.0, 1e-300, 7.0, 8.0]);
        assert_eq!(HostMatrix::from_flat(&flat, 3, 2).unwrap(), m);
    }

    #[test]
    fn test_copy_from_flat_keeps_shape_and_checks_length() {
        let mut m = HostMatrix::zeros(2, 2);
        m.copy_from_flat(&[1.0, 2.0, 3.0, 4.0]).unwrap();
        assert_eq!(m.get(1, 0), Some(3.0));
        assert!(m.copy_from_flat(&[1.0]).is_err());
        assert_eq!(m.get(1, 0), Some(3.0));
    }

    #[test]
    fn test_from_columns_validates_shape() {
        assert!(HostMatrix::from_columns(2, 2, vec![vec![0.0, 1.0]]).is_err());
        let m = HostMatrix::from_columns(2, 1, vec![vec![0.0, 1.0]]).unwrap();
        assert_eq!(m.cells(), 2);
    }

    #[test]
    fn test_max_abs_diff() {
        let a = HostMatrix::from_rows(&[vec![1.0, 2.0]]).unwrap();
        let mut b = a.clone();
        *b.get_mut(0, 1).unwrap() = 2.5;
        assert_eq!(a.max_abs_diff(&b), Some(0.5));
        assert_eq!(a.max_abs_diff(&HostMatrix::zeros(2, 1)), None);
    }
}
