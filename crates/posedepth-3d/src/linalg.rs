use crate::error::GeometryError;

/// Determinant magnitude below which a 3x3 matrix is treated as singular.
const SINGULAR_EPS: f64 = 1e-12;

/// Identity 3x3 matrix.
pub const IDENTITY_33: [[f64; 3]; 3] = [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]];

/// Compute the determinant of a 3x3 matrix.
pub fn det33(m: &[[f64; 3]; 3]) -> f64 {
    m[0][0] * (m[1][1] * m[2][2] - m[1][2] * m[2][1])
        - m[0][1] * (m[1][0] * m[2][2] - m[1][2] * m[2][0])
        + m[0][2] * (m[1][0] * m[2][1] - m[1][1] * m[2][0])
}

/// Invert a 3x3 matrix in closed form through its adjugate.
///
/// # Arguments
///
/// * `m` - The matrix to invert.
///
/// # Returns
///
/// The inverse matrix, or [`GeometryError::SingularMatrix`] when the determinant vanishes.
///
/// Example:
///
/// ```
/// use posedepth_3d::linalg::inverse33;
///
/// let k = [[500.0, 0.0, 320.0], [0.0, 500.0, 240.0], [0.0, 0.0, 1.0]];
/// let k_inv = inverse33(&k).unwrap();
/// assert!((k_inv[0][0] - 1.0 / 500.0).abs() < 1e-15);
/// ```
pub fn inverse33(m: &[[f64; 3]; 3]) -> Result<[[f64; 3]; 3], GeometryError> {
    let det = det33(m);
    if !det.is_finite() || det.abs() < SINGULAR_EPS {
        return Err(GeometryError::SingularMatrix(det));
    }
    let inv_det = 1.0 / det;

    Ok([
        [
            (m[1][1] * m[2][2] - m[1][2] * m[2][1]) * inv_det,
            (m[0][2] * m[2][1] - m[0][1] * m[2][2]) * inv_det,
            (m[0][1] * m[1][2] - m[0][2] * m[1][1]) * inv_det,
        ],
        [
            (m[1][2] * m[2][0] - m[1][0] * m[2][2]) * inv_det,
            (m[0][0] * m[2][2] - m[0][2] * m[2][0]) * inv_det,
            (m[0][2] * m[1][0] - m[0][0] * m[1][2]) * inv_det,
        ],
        [
            (m[1][0] * m[2][1] - m[1][1] * m[2][0]) * inv_det,
            (m[0][1] * m[2][0] - m[0][0] * m[2][1]) * inv_det,
            (m[0][0] * m[1][1] - m[0][1] * m[1][0]) * inv_det,
        ],
    ])
}

/// Transpose a 3x3 matrix.
pub fn transpose33(m: &[[f64; 3]; 3]) -> [[f64; 3]; 3] {
    let mut out = [[0.0; 3]; 3];
    for (i, row) in out.iter_mut().enumerate() {
        for (j, val) in row.iter_mut().enumerate() {
            *val = m[j][i];
        }
    }
    out
}

/// Multiply a 3x3 matrix by a 3-vector.
pub fn mat33_mul_vec3(m: &[[f64; 3]; 3], v: &[f64; 3]) -> [f64; 3] {
    [
        m[0][0] * v[0] + m[0][1] * v[1] + m[0][2] * v[2],
        m[1][0] * v[0] + m[1][1] * v[1] + m[1][2] * v[2],
        m[2][0] * v[0] + m[2][1] * v[1] + m[2][2] * v[2],
    ]
}

/// Multiply two row-major matrices of compatible fixed sizes.
pub fn matmul<const R: usize, const K: usize, const C: usize>(
    a: &[[f64; K]; R],
    b: &[[f64; C]; K],
) -> [[f64; C]; R] {
    let mut out = [[0.0; C]; R];
    for (i, row) in out.iter_mut().enumerate() {
        for (j, val) in row.iter_mut().enumerate() {
            *val = (0..K).map(|k| a[i][k] * b[k][j]).sum();
        }
    }
    out
}

/// Apply a homogeneous 4x4 transform to a 3D point.
///
/// Example:
///
/// ```
/// use posedepth_3d::linalg::transform_point_h;
///
/// let h = [
///     [1.0, 0.0, 0.0, 1.0],
///     [0.0, 1.0, 0.0, 2.0],
///     [0.0, 0.0, 1.0, 3.0],
///     [0.0, 0.0, 0.0, 1.0],
/// ];
/// assert_eq!(transform_point_h(&h, &[1.0, 1.0, 1.0]), [2.0, 3.0, 4.0]);
/// ```
pub fn transform_point_h(h: &[[f64; 4]; 4], p: &[f64; 3]) -> [f64; 3] {
    let mut out = [0.0; 3];
    for (i, val) in out.iter_mut().enumerate() {
        *val = h[i][0] * p[0] + h[i][1] * p[1] + h[i][2] * p[2] + h[i][3];
    }
    out
}

/// Build a 3x3 row-major matrix from a flat slice of 9 values.
///
/// # Errors
///
/// Returns [`GeometryError::DimensionMismatch`] when the slice does not hold 9 values.
pub fn mat33_from_slice(values: &[f64]) -> Result<[[f64; 3]; 3], GeometryError> {
    if values.len() != 9 {
        return Err(GeometryError::DimensionMismatch {
            expected: 9,
            actual: values.len(),
        });
    }
    let mut out = [[0.0; 3]; 3];
    for (i, row) in out.iter_mut().enumerate() {
        row.copy_from_slice(&values[i * 3..i * 3 + 3]);
    }
    Ok(out)
}

/// Utility function to convert a fixed-size row-major array to a faer matrix.
pub fn array_to_faer_mat<const R: usize, const C: usize>(array: &[[f64; C]; R]) -> faer::Mat<f64> {
    faer::Mat::<f64>::from_fn(R, C, |i, j| array[i][j])
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_inverse33_roundtrip() -> Result<(), GeometryError> {
        let m = [[2.0, 1.0, 0.5], [0.0, 3.0, -1.0], [1.0, 0.0, 4.0]];
        let m_inv = inverse33(&m)?;
        let eye = matmul(&m, &m_inv);
        for i in 0..3 {
            for j in 0..3 {
                assert_relative_eq!(eye[i][j], IDENTITY_33[i][j], epsilon = 1e-12);
            }
        }
        Ok(())
    }

    #[test]
    fn test_inverse33_singular() {
        let m = [[1.0, 2.0, 3.0], [2.0, 4.0, 6.0], [0.0, 0.0, 1.0]];
        assert!(matches!(
            inverse33(&m),
            Err(GeometryError::SingularMatrix(_))
        ));
    }

    #[test]
    fn test_inverse33_rotation_is_transpose() -> Result<(), GeometryError> {
        let (s, c) = 0.3f64.sin_cos();
        let r = [[c, -s, 0.0], [s, c, 0.0], [0.0, 0.0, 1.0]];
        let r_inv = inverse33(&r)?;
        let r_t = transpose33(&r);
        for i in 0..3 {
            for j in 0..3 {
                assert_relative_eq!(r_inv[i][j], r_t[i][j], epsilon = 1e-12);
            }
        }
        Ok(())
    }

    #[test]
    fn test_mat33_from_slice() -> Result<(), GeometryError> {
        let m = mat33_from_slice(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 9.0])?;
        assert_eq!(m, [[1.0, 2.0, 3.0], [4.0, 5.0, 6.0], [7.0, 8.0, 9.0]]);
        assert_eq!(
            mat33_from_slice(&[1.0; 4]),
            Err(GeometryError::DimensionMismatch {
                expected: 9,
                actual: 4
            })
        );
        Ok(())
    }

    #[test]
    fn test_array_to_faer_mat() {
        let array = [[1.0, 2.0, 3.0, 4.0], [5.0, 6.0, 7.0, 8.0]];
        let mat = array_to_faer_mat(&array);
        assert_eq!(mat.nrows(), 2);
        assert_eq!(mat.ncols(), 4);
        assert_eq!(mat.read(0, 3), 4.0);
        assert_eq!(mat.read(1, 0), 5.0);
    }
}
