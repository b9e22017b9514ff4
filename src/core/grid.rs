//! 2-D field geometry: flat/(x, y) addressing, projection between fields of
//! different sizes, and Chebyshev neighbourhoods clipped at the field edges.

use super::{SdrError, SdrResult};

/// Width and height of a rectangular field. Nodes are stored row-major.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GridSize {
    pub width: usize,
    pub height: usize,
}

impl GridSize {
    pub fn new(width: usize, height: usize) -> Self {
        Self { width, height }
    }

    /// Number of nodes in the field.
    #[inline]
    pub fn len(&self) -> usize {
        self.width * self.height
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Flat index of `(x, y)`.
    ///
    /// # Errors
    /// `OutOfBounds` if either coordinate lies outside the field.
    pub fn index(&self, x: usize, y: usize, what: &'static str) -> SdrResult<usize> {
        if x >= self.width {
            return Err(SdrError::OutOfBounds {
                what,
                index: x,
                len: self.width,
            });
        }
        if y >= self.height {
            return Err(SdrError::OutOfBounds {
                what,
                index: y,
                len: self.height,
            });
        }
        Ok(x + y * self.width)
    }

    /// `(x, y)` position of a flat index.
    #[inline]
    pub fn position(&self, index: usize) -> (usize, usize) {
        (index % self.width, index / self.width)
    }
}

/// Map a node position in `from` onto the centre it covers in `to`.
///
/// Cell centres are scaled by the size ratio, so equal-sized fields map a
/// position onto itself.
pub fn project(x: usize, y: usize, from: GridSize, to: GridSize) -> (i64, i64) {
    let sx = to.width as f32 / from.width as f32;
    let sy = to.height as f32 / from.height as f32;
    (
        ((x as f32 + 0.5) * sx) as i64,
        ((y as f32 + 0.5) * sy) as i64,
    )
}

/// Flat indices of every node of `field` within Chebyshev distance `radius`
/// of `center`, row-major. Negative radii yield nothing.
pub fn neighborhood(center: (i64, i64), radius: i32, field: GridSize) -> Vec<usize> {
    if radius < 0 || field.is_empty() {
        return Vec::new();
    }
    let r = i64::from(radius);
    let x0 = (center.0 - r).max(0);
    let x1 = (center.0 + r).min(field.width as i64 - 1);
    let y0 = (center.1 - r).max(0);
    let y1 = (center.1 + r).min(field.height as i64 - 1);

    let mut indices = Vec::new();
    for y in y0..=y1 {
        for x in x0..=x1 {
            indices.push(x as usize + y as usize * field.width);
        }
    }
    indices
}
