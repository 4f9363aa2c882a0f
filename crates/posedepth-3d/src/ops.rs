use posedepth_image::{Image, ImageSize};

use crate::{error::GeometryError, linalg};

/// Build the homogeneous pixel coordinates of every pixel of an image.
///
/// The result is a `3 x P` matrix with `P = width * height` where column
/// `p = y * width + x` holds `[x, y, 1]`. This is the same row-major order
/// [`Image::as_slice`] uses, so column `p` and element `p` of a flattened
/// image always refer to the same pixel.
///
/// # Arguments
///
/// * `size` - The size of the image.
///
/// Example:
///
/// ```
/// use posedepth_3d::ops::homogeneous_pixel_grid;
/// use posedepth_image::ImageSize;
///
/// let grid = homogeneous_pixel_grid(ImageSize { width: 3, height: 2 });
/// assert_eq!(grid.ncols(), 6);
/// assert_eq!((grid.read(0, 4), grid.read(1, 4), grid.read(2, 4)), (1.0, 1.0, 1.0));
/// ```
pub fn homogeneous_pixel_grid(size: ImageSize) -> faer::Mat<f64> {
    let width = size.width;
    faer::Mat::<f64>::from_fn(3, size.num_pixels(), |i, p| match i {
        0 => (p % width) as f64,
        1 => (p / width) as f64,
        _ => 1.0,
    })
}

/// Cast homogeneous pixels into 3D rays scaled by their depth.
///
/// Each column `p` of the result is `(K^-1 * pixels_h[:, p]) * depths[p]`,
/// a 3D point in the sensor's own frame. A depth of zero produces a
/// zero-length ray; such columns are kept so that element-wise masks over
/// the result stay aligned with the input.
///
/// # Arguments
///
/// * `k_inv` - The inverse intrinsics of the sensor.
/// * `pixels_h` - A `3 x P` matrix of homogeneous pixel coordinates.
/// * `depths` - One depth value per column of `pixels_h`.
///
/// # Errors
///
/// Returns [`GeometryError::DimensionMismatch`] when `pixels_h` is not `3 x depths.len()`.
pub fn deproject(
    k_inv: &[[f64; 3]; 3],
    pixels_h: &faer::Mat<f64>,
    depths: &[f32],
) -> Result<faer::Mat<f64>, GeometryError> {
    if pixels_h.nrows() != 3 {
        return Err(GeometryError::DimensionMismatch {
            expected: 3,
            actual: pixels_h.nrows(),
        });
    }
    if pixels_h.ncols() != depths.len() {
        return Err(GeometryError::DimensionMismatch {
            expected: pixels_h.ncols(),
            actual: depths.len(),
        });
    }

    let k_inv = linalg::array_to_faer_mat(k_inv);
    let mut points = &k_inv * pixels_h;
    for (j, &depth) in depths.iter().enumerate() {
        let depth = depth as f64;
        for i in 0..3 {
            points.write(i, j, points.read(i, j) * depth);
        }
    }

    Ok(points)
}

/// Apply a (homogeneous) transform to a set of column points.
///
/// When `matrix` has as many columns as `points` has rows this is a plain
/// product. When it has one more column, `points` is treated as
/// inhomogeneous and an implicit row of ones is appended, so a `3 x 4`
/// projection can be applied directly to `3 x N` points.
///
/// # Arguments
///
/// * `matrix` - An `M x K` or `M x (K + 1)` matrix.
/// * `points` - A `K x N` matrix of points, one per column.
///
/// # Returns
///
/// The `M x N` transformed points.
///
/// # Errors
///
/// Returns [`GeometryError::DimensionMismatch`] for any other shape combination.
pub fn transform_points(
    matrix: &faer::Mat<f64>,
    points: &faer::Mat<f64>,
) -> Result<faer::Mat<f64>, GeometryError> {
    let k = points.nrows();
    if matrix.ncols() == k {
        return Ok(matrix * points);
    }
    if matrix.ncols() != k + 1 {
        return Err(GeometryError::DimensionMismatch {
            expected: k + 1,
            actual: matrix.ncols(),
        });
    }

    Ok(faer::Mat::<f64>::from_fn(
        matrix.nrows(),
        points.ncols(),
        |i, j| {
            let mut acc = matrix.read(i, k);
            for l in 0..k {
                acc += matrix.read(i, l) * points.read(l, j);
            }
            acc
        },
    ))
}

/// Rasterize projected rays into a dense depth image.
///
/// Every column of `projected` is an unnormalized ray `[x, y, z]` in the
/// target camera. The ray lands on pixel `(round(x / z), round(y / z))` and
/// writes its `z` there. Rays with `z == 0`, with non-finite coordinates or
/// landing outside `[0, width) x [0, height)` are dropped. When several rays
/// land on the same pixel the last one wins. Pixels that receive no ray stay
/// at zero.
///
/// # Arguments
///
/// * `projected` - A `3 x N` matrix of rays.
/// * `size` - The size of the target image.
///
/// # Errors
///
/// Returns [`GeometryError::DimensionMismatch`] when `projected` does not have 3 rows.
pub fn rasterize_sparse_to_dense(
    projected: &faer::Mat<f64>,
    size: ImageSize,
) -> Result<Image<f32>, GeometryError> {
    if projected.nrows() != 3 {
        return Err(GeometryError::DimensionMismatch {
            expected: 3,
            actual: projected.nrows(),
        });
    }

    let mut dense = Image::from_size_val(size, 0.0f32);
    let data = dense.as_slice_mut();

    for j in 0..projected.ncols() {
        let z = projected.read(2, j);
        if z == 0.0 || !z.is_finite() {
            continue;
        }
        let u = (projected.read(0, j) / z).round();
        let v = (projected.read(1, j) / z).round();
        if !(u.is_finite() && v.is_finite()) || u < 0.0 || v < 0.0 {
            continue;
        }
        let (u, v) = (u as usize, v as usize);
        if !size.contains(u, v) {
            continue;
        }
        data[v * size.width + u] = z as f32;
    }

    Ok(dense)
}

/// Sample a sparse depth image around a pixel.
///
/// Reads the `(2 * half_window + 1)^2` neighborhood centered at the rounded
/// `center`, clipped to the image bounds, drops the zero and non-finite
/// entries and returns the minimum of what is left. Returns zero, the "no data" value, when the
/// neighborhood holds no nonzero entry or `center` is not finite.
///
/// # Arguments
///
/// * `image` - The sparse depth image.
/// * `center` - The `[x, y]` pixel to sample around.
/// * `half_window` - The distance from the center to the window edge.
///
/// Example:
///
/// ```
/// use posedepth_3d::ops::sample_window;
/// use posedepth_image::{Image, ImageSize};
///
/// let mut image = Image::from_size_val(ImageSize { width: 5, height: 5 }, 0.0f32);
/// image.set(3, 2, 900.0).unwrap();
/// image.set(1, 1, 1200.0).unwrap();
/// assert_eq!(sample_window(&image, [2.0, 2.0], 1), 900.0);
/// assert_eq!(sample_window(&image, [0.0, 4.0], 1), 0.0);
/// ```
pub fn sample_window(image: &Image<f32>, center: [f64; 2], half_window: usize) -> f32 {
    if !(center[0].is_finite() && center[1].is_finite()) || image.size().num_pixels() == 0 {
        return 0.0;
    }

    let half = i64::try_from(half_window).unwrap_or(i64::MAX);
    let cx = center[0].round() as i64;
    let cy = center[1].round() as i64;

    let x0 = cx.saturating_sub(half).max(0);
    let x1 = cx.saturating_add(half).min(image.width() as i64 - 1);
    let y0 = cy.saturating_sub(half).max(0);
    let y1 = cy.saturating_add(half).min(image.height() as i64 - 1);
    if x0 > x1 || y0 > y1 {
        return 0.0;
    }

    let width = image.width();
    let data = image.as_slice();
    let mut best: Option<f32> = None;
    for y in y0 as usize..=y1 as usize {
        let row = &data[y * width + x0 as usize..=y * width + x1 as usize];
        for &value in row.iter().filter(|&&v| v != 0.0 && v.is_finite()) {
            best = Some(match best {
                Some(current) if current <= value => current,
                _ => value,
            });
        }
    }

    best.unwrap_or(0.0)
}

/// Deproject 2D pixels with known depths into 3D points.
///
/// # Arguments
///
/// * `k_inv` - The inverse intrinsics of the camera the pixels belong to.
/// * `pixels` - The `[x, y]` pixel coordinates.
/// * `depths` - One depth per pixel.
///
/// # Errors
///
/// Returns [`GeometryError::DimensionMismatch`] when the lengths differ.
pub fn deproject_pixels(
    k_inv: &[[f64; 3]; 3],
    pixels: &[[f64; 2]],
    depths: &[f32],
) -> Result<Vec<[f64; 3]>, GeometryError> {
    let pixels_h = faer::Mat::<f64>::from_fn(3, pixels.len(), |i, j| match i {
        2 => 1.0,
        _ => pixels[j][i],
    });
    let points = deproject(k_inv, &pixels_h, depths)?;

    Ok((0..points.ncols())
        .map(|j| [points.read(0, j), points.read(1, j), points.read(2, j)])
        .collect())
}

/// Project 3D points to pixel coordinates through a `3 x 4` projection matrix.
///
/// Each point is lifted to `[x, y, z, 1]`, multiplied by `projection` and
/// divided by the resulting third coordinate.
pub fn project_points(projection: &[[f64; 4]; 3], points: &[[f64; 3]]) -> Vec<[f64; 2]> {
    points
        .iter()
        .map(|p| {
            let mut ray = [0.0; 3];
            for (i, val) in ray.iter_mut().enumerate() {
                let row = &projection[i];
                *val = row[0] * p[0] + row[1] * p[1] + row[2] * p[2] + row[3];
            }
            [ray[0] / ray[2], ray[1] / ray[2]]
        })
        .collect()
}
