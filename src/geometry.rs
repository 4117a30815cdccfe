//! Pure 2-D geometry over normalized image coordinates.
//!
//! All coordinates are normalized to the 0..1 frame space. Quadrilateral
//! corners are stored in ring order: top-left, top-right, bottom-right,
//! bottom-left.

use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn distance(&self, other: &Point) -> f32 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        (dx * dx + dy * dy).sqrt()
    }

    /// Linear interpolation between two points, `t` in 0..=1.
    pub fn lerp(a: Point, b: Point, t: f32) -> Point {
        Point {
            x: a.x + (b.x - a.x) * t,
            y: a.y + (b.y - a.y) * t,
        }
    }
}

/// Centroid of a point set. Returns the origin for an empty slice.
pub fn centroid(points: &[Point]) -> Point {
    if points.is_empty() {
        return Point::default();
    }
    let mut sum = Point::default();
    for p in points {
        sum.x += p.x;
        sum.y += p.y;
    }
    Point {
        x: sum.x / points.len() as f32,
        y: sum.y / points.len() as f32,
    }
}

/// Interior angle in degrees at `vertex`, formed by rays toward `a` and `b`.
pub fn angle_at(vertex: Point, a: Point, b: Point) -> f32 {
    let va = (a.x - vertex.x, a.y - vertex.y);
    let vb = (b.x - vertex.x, b.y - vertex.y);
    let na = (va.0 * va.0 + va.1 * va.1).sqrt();
    let nb = (vb.0 * vb.0 + vb.1 * vb.1).sqrt();
    if na == 0.0 || nb == 0.0 {
        return 0.0;
    }
    let cos = ((va.0 * vb.0 + va.1 * vb.1) / (na * nb)).clamp(-1.0, 1.0);
    cos.acos().to_degrees()
}

/// Quadrilateral with corners in ring order (TL, TR, BR, BL).
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Quad {
    pub corners: [Point; 4],
}

impl Quad {
    pub fn new(corners: [Point; 4]) -> Self {
        Self { corners }
    }

    /// Axis-aligned quad from the top-left corner and side lengths.
    pub fn axis_aligned(top_left: Point, width: f32, height: f32) -> Self {
        let Point { x, y } = top_left;
        Self::new([
            Point::new(x, y),
            Point::new(x + width, y),
            Point::new(x + width, y + height),
            Point::new(x, y + height),
        ])
    }

    pub fn centroid(&self) -> Point {
        centroid(&self.corners)
    }

    /// Side lengths in ring order: top, right, bottom, left.
    pub fn side_lengths(&self) -> [f32; 4] {
        let c = &self.corners;
        [
            c[0].distance(&c[1]),
            c[1].distance(&c[2]),
            c[2].distance(&c[3]),
            c[3].distance(&c[0]),
        ]
    }

    /// Interior angle in degrees at each corner, in ring order.
    pub fn interior_angles(&self) -> [f32; 4] {
        let c = &self.corners;
        let mut angles = [0.0; 4];
        for i in 0..4 {
            let prev = c[(i + 3) % 4];
            let next = c[(i + 1) % 4];
            angles[i] = angle_at(c[i], prev, next);
        }
        angles
    }

    /// Polygon area by the shoelace formula (normalized units squared).
    pub fn area(&self) -> f32 {
        let c = &self.corners;
        let mut sum = 0.0;
        for i in 0..4 {
            let j = (i + 1) % 4;
            sum += c[i].x * c[j].y - c[j].x * c[i].y;
        }
        (sum / 2.0).abs()
    }

    /// Bilinear interpolation inside the quad. `u` runs left to right along
    /// the top and bottom edges, `v` runs top to bottom.
    pub fn bilerp(&self, u: f32, v: f32) -> Point {
        let c = &self.corners;
        let top = Point::lerp(c[0], c[1], u);
        let bottom = Point::lerp(c[3], c[2], u);
        Point::lerp(top, bottom, v)
    }

    /// The sub-quad covering cell (`row`, `col`) of an `n`x`n` subdivision.
    pub fn cell(&self, row: usize, col: usize, n: usize) -> Quad {
        let n = n.max(1) as f32;
        let u0 = col as f32 / n;
        let u1 = (col + 1) as f32 / n;
        let v0 = row as f32 / n;
        let v1 = (row + 1) as f32 / n;
        Quad::new([
            self.bilerp(u0, v0),
            self.bilerp(u1, v0),
            self.bilerp(u1, v1),
            self.bilerp(u0, v1),
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit_square() -> Quad {
        Quad::axis_aligned(Point::new(0.0, 0.0), 1.0, 1.0)
    }

    #[test]
    fn square_geometry() {
        let q = unit_square();
        assert!((q.area() - 1.0).abs() < 1e-6);
        for side in q.side_lengths() {
            assert!((side - 1.0).abs() < 1e-6);
        }
        for angle in q.interior_angles() {
            assert!((angle - 90.0).abs() < 1e-3);
        }
        let c = q.centroid();
        assert!((c.x - 0.5).abs() < 1e-6 && (c.y - 0.5).abs() < 1e-6);
    }

    #[test]
    fn skewed_parallelogram_angles() {
        // 60/120 degree parallelogram.
        let q = Quad::new([
            Point::new(0.0, 0.0),
            Point::new(1.0, 0.0),
            Point::new(1.5, 0.866),
            Point::new(0.5, 0.866),
        ]);
        let angles = q.interior_angles();
        assert!((angles[0] - 60.0).abs() < 1.0);
        assert!((angles[1] - 120.0).abs() < 1.0);
        assert!((angles[2] - 60.0).abs() < 1.0);
        assert!((angles[3] - 120.0).abs() < 1.0);
    }

    #[test]
    fn bilerp_spans_the_quad() {
        let q = unit_square();
        let mid = q.bilerp(0.5, 0.5);
        assert!((mid.x - 0.5).abs() < 1e-6 && (mid.y - 0.5).abs() < 1e-6);
        let corner = q.bilerp(1.0, 1.0);
        assert!((corner.x - 1.0).abs() < 1e-6 && (corner.y - 1.0).abs() < 1e-6);
    }

    #[test]
    fn cell_subdivision_tiles_the_quad() {
        let q = unit_square();
        let cell = q.cell(0, 0, 3);
        assert!((cell.corners[0].x - 0.0).abs() < 1e-6);
        assert!((cell.corners[2].x - 1.0 / 3.0).abs() < 1e-6);
        let last = q.cell(2, 2, 3);
        assert!((last.corners[2].x - 1.0).abs() < 1e-6);
        assert!((last.corners[2].y - 1.0).abs() < 1e-6);
    }
}
