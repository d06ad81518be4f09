//! Conversion between the host's column-indexed grid and the flat buffer the
//! kernels index as `flat[row * cols + col]`.

use crate::error::{HeatError, Result};

/// Flattens `matrix[col][row]` into `flat[row * cols + col]`.
///
/// `matrix` must hold exactly `cols` columns of `rows` values each.
pub fn flatten<T: Copy>(matrix: &[Vec<T>], rows: usize, cols: usize) -> Result<Vec<T>> {
    check_columns(matrix, rows, cols)?;
    let mut flat = Vec::with_capacity(rows * cols);
    for row in 0..rows {
        for column in matrix {
            flat.push(column[row]);
        }
    }
    Ok(flat)
}

/// Inverse of [`flatten`]: allocates a fresh `cols x rows` column-indexed grid.
pub fn unflatten<T: Copy>(flat: &[T], rows: usize, cols: usize) -> Result<Vec<Vec<T>>> {
    let expected = rows.checked_mul(cols).ok_or_else(|| {
        HeatError::InvalidDimensions(format!("{}x{} overflows the cell count", rows, cols))
    })?;
    if flat.len() != expected {
        return Err(HeatError::InvalidDimensions(format!(
            "Flat buffer length ({}) does not match dimensions ({}x{})",
            flat.len(),
            rows,
            cols
        )));
    }
    let columns = (0..cols)
        .map(|col| (0..rows).map(|row| flat[row * cols + col]).collect())
        .collect();
    Ok(columns)
}

fn check_columns<T>(matrix: &[Vec<T>], rows: usize, cols: usize) -> Result<()> {
    if matrix.len() != cols {
        return Err(HeatError::InvalidDimensions(format!(
            "Matrix has {} columns, expected {}",
            matrix.len(),
            cols
        )));
    }
    if let Some((col, column)) = matrix.iter().enumerate().find(|(_, c)| c.len() != rows) {
        return Err(HeatError::InvalidDimensions(format!(
            "Column {} has {} rows, expected {}",
            col,
            column.len(),
            rows
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(rows: usize, cols: usize) -> Vec<Vec<f64>> {
        (0..cols)
            .map(|c| (0..rows).map(|r| (r * 10 + c) as f64 + 0.25).collect())
            .collect()
    }

    #[test]
    fn test_flatten_uses_transposed_index() {
        // Two columns of three rows: matrix[col][row].
        let matrix = vec![vec![1.0, 2.0, 3.0], vec![4.0, 5.0, 6.0]];
        let flat = flatten(&matrix, 3, 2).unwrap();
        assert_eq!(flat, vec![1.0, 4.0, 2.0, 5.0, 3.0, 6.0]);
        for row in 0..3 {
            for col in 0..2 {
                assert_eq!(flat[row * 2 + col], matrix[col][row]);
            }
        }
    }

    #[test]
    fn test_unflatten_inverts_flatten() {
        for &(rows, cols) in &[(1, 1), (1, 5), (5, 1), (3, 3), (4, 7), (16, 9)] {
            let matrix = sample(rows, cols);
            let flat = flatten(&matrix, rows, cols).unwrap();
            assert_eq!(flat.len(), rows * cols);
            assert_eq!(unflatten(&flat, rows, cols).unwrap(), matrix);
        }
    }

    #[test]
    fn test_flatten_rejects_wrong_column_count() {
        let matrix = sample(3, 2);
        match flatten(&matrix, 3, 3) {
            Err(HeatError::InvalidDimensions(msg)) => assert!(msg.contains("2 columns")),
            other => panic!("Expected InvalidDimensions error, got {:?}", other),
        }
    }

    #[test]
    fn test_flatten_rejects_ragged_column() {
        let mut matrix = sample(3, 3);
        matrix[1].pop();
        match flatten(&matrix, 3, 3) {
            Err(HeatError::InvalidDimensions(msg)) => assert!(msg.contains("Column 1")),
            other => panic!("Expected InvalidDimensions error, got {:?}", other),
        }
    }

    #[test]
    fn test_unflatten_rejects_length_mismatch() {
        let flat = vec![0.0; 8];
        assert!(matches!(
            unflatten(&flat, 3, 3),
            Err(HeatError::InvalidDimensions(_))
        ));
    }

    #[test]
    fn test_empty_dimensions_flatten_to_empty() {
        let matrix: Vec<Vec<f64>> = vec![];
        assert!(flatten(&matrix, 4, 0).unwrap().is_empty());
    }
}
