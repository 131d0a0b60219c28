//! Projective (homography) transforms between quadrilaterals
//!
//! This module solves the Direct Linear Transform for four point
//! correspondences and provides the inverse used for reverse mapping
//! while warping a design onto a mockup.

use nalgebra::{Matrix3, Vector3};

use crate::placement::Point;

/// Determinant and homogeneous-w floor below which a value is treated as zero
pub const DEGENERATE_EPSILON: f64 = 1e-10;

/// A 3x3 projective transform, normalized so that `h[2][2] == 1`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Homography {
    matrix: Matrix3<f64>,
}

impl Homography {
    pub fn from_matrix(matrix: Matrix3<f64>) -> Self {
        Self { matrix }
    }

    pub fn identity() -> Self {
        Self {
            matrix: Matrix3::identity(),
        }
    }

    /// Compute the homography mapping each `src[i]` onto `dst[i]`.
    ///
    /// Singular systems are not an error: collinear or coincident points
    /// leave NaN entries, which [`Homography::inverse`] reports as degenerate.
    pub fn from_points(src: &[Point; 4], dst: &[Point; 4]) -> Self {
        let h = compute_homography(src, dst);
        Self {
            matrix: Matrix3::new(h[0], h[1], h[2], h[3], h[4], h[5], h[6], h[7], 1.0),
        }
    }

    /// Homography from the `width x height` source rectangle onto `dst`
    pub fn from_rect(width: f64, height: f64, dst: &[Point; 4]) -> Self {
        Self::from_points(&rect_corners(width, height), dst)
    }

    pub fn matrix(&self) -> &Matrix3<f64> {
        &self.matrix
    }

    pub fn determinant(&self) -> f64 {
        self.matrix.determinant()
    }

    /// Inverse transform, or `None` when the matrix is degenerate.
    pub fn inverse(&self) -> Option<Self> {
        let det = self.determinant();
        // NaN compares false, so a poisoned matrix lands here as well
        if !(det.abs() >= DEGENERATE_EPSILON) {
            return None;
        }
        let inverse = self.matrix.try_inverse()?;
        if inverse.iter().all(|v| v.is_finite()) {
            Some(Self { matrix: inverse })
        } else {
            None
        }
    }

    /// Map a point, returning `None` when the homogeneous `w` is ~0
    #[inline]
    pub fn apply(&self, x: f64, y: f64) -> Option<(f64, f64)> {
        let v = self.matrix * Vector3::new(x, y, 1.0);
        if v.z.abs() < DEGENERATE_EPSILON {
            return None;
        }
        Some((v.x / v.z, v.y / v.z))
    }

    #[inline]
    pub fn apply_point(&self, p: Point) -> Option<Point> {
        self.apply(p.x, p.y).map(|(x, y)| Point::new(x, y))
    }
}

/// Corners of a `width x height` rectangle anchored at the origin,
/// ordered top-left, top-right, bottom-right, bottom-left
pub fn rect_corners(width: f64, height: f64) -> [Point; 4] {
    [
        Point::new(0.0, 0.0),
        Point::new(width, 0.0),
        Point::new(width, height),
        Point::new(0.0, height),
    ]
}

/// Build and solve the 8x8 DLT system for exactly four correspondences
fn compute_homography(src: &[Point; 4], dst: &[Point; 4]) -> [f64; 8] {
    // For each correspondence (x,y) -> (u,v):
    //   x*h0 + y*h1 + h2 - u*x*h6 - u*y*h7 = u
    //   x*h3 + y*h4 + h5 - v*x*h6 - v*y*h7 = v
    let mut a = [[0.0f64; 8]; 8];
    let mut b = [0.0f64; 8];

    for i in 0..4 {
        let Point { x, y } = src[i];
        let Point { x: u, y: v } = dst[i];

        let row1 = i * 2;
        let row2 = i * 2 + 1;

        a[row1] = [x, y, 1.0, 0.0, 0.0, 0.0, -u * x, -u * y];
        b[row1] = u;

        a[row2] = [0.0, 0.0, 0.0, x, y, 1.0, -v * x, -v * y];
        b[row2] = v;
    }

    solve_linear_system(&mut a, &mut b)
}

/// Solve an 8x8 linear system using Gaussian elimination with partial pivoting.
///
/// A pivot that vanishes relative to the system's magnitude poisons the
/// result with NaN instead of returning roundoff noise.
fn solve_linear_system(a: &mut [[f64; 8]; 8], b: &mut [f64; 8]) -> [f64; 8] {
    let n = 8;
    let magnitude = a
        .iter()
        .flat_map(|row| row.iter())
        .fold(1.0f64, |acc, v| acc.max(v.abs()));
    let pivot_floor = DEGENERATE_EPSILON * magnitude;

    for col in 0..n {
        // Largest absolute pivot goes on the diagonal
        let mut max_row = col;
        let mut max_val = a[col][col].abs();
        for row in (col + 1)..n {
            if a[row][col].abs() > max_val {
                max_val = a[row][col].abs();
                max_row = row;
            }
        }

        if max_row != col {
            a.swap(col, max_row);
            b.swap(col, max_row);
        }

        let pivot = a[col][col];
        if !(pivot.abs() >= pivot_floor) {
            return [f64::NAN; 8];
        }

        for row in (col + 1)..n {
            let factor = a[row][col] / pivot;
            a[row][col] = 0.0;
            for j in (col + 1)..n {
                a[row][j] -= factor * a[col][j];
            }
            b[row] -= factor * b[col];
        }
    }

    // Back substitution
    let mut x = [0.0f64; 8];
    for i in (0..n).rev() {
        let mut sum = b[i];
        for j in (i + 1)..n {
            sum -= a[i][j] * x[j];
        }
        x[i] = sum / a[i][i];
    }

    x
}
