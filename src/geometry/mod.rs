//! # Geometry Module
//!
//! Play-area geometry: points, extents, polygon containment and centroids.
//!
//! The play area lies on the horizontal `x`/`z` plane. The `y` component
//! carries height (floor level, observer height) and never takes part in
//! containment tests.

pub mod area;

pub use area::*;

use crate::utils::round_to_tenth;
use crate::{AllocationError, AllocationResult};
use serde::{Deserialize, Serialize};

/// A point in the play space.
///
/// # Examples
///
/// ```
/// use room_allocation::Point;
///
/// let a = Point::new(1.0, 0.0, 2.0);
/// let b = Point::flat(4.0, 6.0);
/// assert_eq!(a.planar_distance(b), 5.0);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Point {
    /// Creates a new point.
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    /// Creates a point on the `y = 0` plane.
    pub fn flat(x: f64, z: f64) -> Self {
        Self::new(x, 0.0, z)
    }

    /// Returns the origin.
    pub fn origin() -> Self {
        Self::default()
    }

    /// Euclidean distance in all three axes.
    pub fn distance(self, other: Point) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        let dz = self.z - other.z;
        (dx * dx + dy * dy + dz * dz).sqrt()
    }

    /// Distance on the `x`/`z` plane only.
    pub fn planar_distance(self, other: Point) -> f64 {
        let dx = self.x - other.x;
        let dz = self.z - other.z;
        (dx * dx + dz * dz).sqrt()
    }

    /// Returns the same point with its height replaced.
    pub fn with_y(self, y: f64) -> Self {
        Self::new(self.x, y, self.z)
    }

    /// Rotates the point about the vertical axis through the origin.
    ///
    /// Positive angles turn clockwise when seen from above, so a heading of
    /// 0° faces `+z` and 90° faces `+x`.
    ///
    /// # Examples
    ///
    /// ```
    /// use room_allocation::Point;
    ///
    /// let turned = Point::flat(0.0, 1.0).rotated_y(90.0);
    /// assert!((turned.x - 1.0).abs() < 1e-9);
    /// assert!(turned.z.abs() < 1e-9);
    /// ```
    pub fn rotated_y(self, degrees: f64) -> Self {
        let (sin, cos) = degrees.to_radians().sin_cos();
        Self::new(
            self.x * cos + self.z * sin,
            self.y,
            -self.x * sin + self.z * cos,
        )
    }

    /// Steps towards `target` by at most `max_step`, landing on it when
    /// closer than that.
    pub fn move_towards(self, target: Point, max_step: f64) -> Self {
        let distance = self.distance(target);
        if distance <= max_step || distance == 0.0 {
            return target;
        }
        let delta = target - self;
        let scale = max_step / distance;
        Self::new(
            self.x + delta.x * scale,
            self.y + delta.y * scale,
            self.z + delta.z * scale,
        )
    }

    /// Rounds `x` and `z` to one decimal place and pins `y` to `floor_level`.
    pub fn quantized(self, floor_level: f64) -> Self {
        Self::new(round_to_tenth(self.x), floor_level, round_to_tenth(self.z))
    }
}

impl std::ops::Add for Point {
    type Output = Self;

    fn add(self, other: Self) -> Self {
        Self::new(self.x + other.x, self.y + other.y, self.z + other.z)
    }
}

impl std::ops::Sub for Point {
    type Output = Self;

    fn sub(self, other: Self) -> Self {
        Self::new(self.x - other.x, self.y - other.y, self.z - other.z)
    }
}

/// Axis-aligned min/max of a point set on the `x`/`z` plane.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Extents {
    pub min_x: f64,
    pub max_x: f64,
    pub min_z: f64,
    pub max_z: f64,
}

impl Extents {
    /// Computes the extents of a point set, or `None` if it is empty.
    pub fn of(points: &[Point]) -> Option<Self> {
        let first = points.first()?;
        let mut extents = Self {
            min_x: first.x,
            max_x: first.x,
            min_z: first.z,
            max_z: first.z,
        };
        for point in &points[1..] {
            extents.min_x = extents.min_x.min(point.x);
            extents.max_x = extents.max_x.max(point.x);
            extents.min_z = extents.min_z.min(point.z);
            extents.max_z = extents.max_z.max(point.z);
        }
        Some(extents)
    }

    /// Inclusive bounding-box test.
    pub fn contains(&self, point: Point) -> bool {
        point.x >= self.min_x
            && point.x <= self.max_x
            && point.z >= self.min_z
            && point.z <= self.max_z
    }

    /// Width along `x`.
    pub fn width(&self) -> f64 {
        self.max_x - self.min_x
    }

    /// Depth along `z`.
    pub fn depth(&self) -> f64 {
        self.max_z - self.min_z
    }
}

/// Even-odd (ray casting) containment test on the `x`/`z` plane.
///
/// The ray is cast towards `+x` and the crossing test uses a strict
/// inequality, so points lying on the far edges of the polygon classify as
/// outside.
///
/// # Examples
///
/// ```
/// use room_allocation::{is_inside, Point};
///
/// let square = [
///     Point::new(0.0, 0.0, 0.0),
///     Point::new(1.0, 0.0, 0.0),
///     Point::new(1.0, 0.0, 1.0),
///     Point::new(0.0, 0.0, 1.0),
/// ];
/// assert!(is_inside(Point::flat(0.5, 0.5), &square));
/// assert!(!is_inside(Point::new(1.0, 0.0, 0.5), &square));
/// ```
pub fn is_inside(point: Point, polygon: &[Point]) -> bool {
    if polygon.is_empty() {
        return false;
    }

    let mut inside = false;
    let mut j = polygon.len() - 1;
    for i in 0..polygon.len() {
        let pi = polygon[i];
        let pj = polygon[j];
        let straddles = (pi.z <= point.z && point.z < pj.z) || (pj.z <= point.z && point.z < pi.z);
        if straddles && point.x < (pj.x - pi.x) * (point.z - pi.z) / (pj.z - pi.z) + pi.x {
            inside = !inside;
        }
        j = i;
    }
    inside
}

/// Arithmetic mean of a point set, or `None` if it is empty.
pub fn centroid(points: &[Point]) -> Option<Point> {
    if points.is_empty() {
        return None;
    }
    let count = points.len() as f64;
    let sum = points.iter().fold(Point::origin(), |acc, p| acc + *p);
    Some(Point::new(sum.x / count, sum.y / count, sum.z / count))
}

/// The walkable play area.
///
/// Holds the ordered boundary polygon together with cached extents used for
/// fast rejection before the precise polygon test.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoundingGeometry {
    points: Vec<Point>,
    shape: AreaShape,
    extents: Extents,
    floor_level: f64,
}

impl BoundingGeometry {
    /// Wraps a boundary polygon.
    ///
    /// Fails with [`AllocationError::UndefinedGeometry`] if `points` is empty.
    pub fn new(points: Vec<Point>, shape: AreaShape, floor_level: f64) -> AllocationResult<Self> {
        let extents = Extents::of(&points).ok_or_else(|| {
            AllocationError::UndefinedGeometry("bounding polygon has no points".to_string())
        })?;
        Ok(Self {
            points,
            shape,
            extents,
            floor_level,
        })
    }

    /// Builds the polygon described by an area specification.
    pub fn from_spec(spec: &AreaSpec, floor_level: f64) -> AllocationResult<Self> {
        let points = build_polygon(spec)?;
        Self::new(points, spec.shape, floor_level)
    }

    /// The boundary polygon in order.
    pub fn points(&self) -> &[Point] {
        &self.points
    }

    /// The shape the polygon was built as.
    pub fn shape(&self) -> AreaShape {
        self.shape
    }

    /// Cached extents of the polygon.
    pub fn extents(&self) -> Extents {
        self.extents
    }

    /// Height of the floor the area sits on.
    pub fn floor_level(&self) -> f64 {
        self.floor_level
    }

    /// Width and depth of the extents.
    pub fn size(&self) -> (f64, f64) {
        (self.extents.width(), self.extents.depth())
    }

    /// Centroid of the boundary points, on the floor.
    pub fn centre(&self) -> Point {
        centroid(&self.points)
            .unwrap_or_else(Point::origin)
            .with_y(self.floor_level)
    }

    /// Tests a single point after quantization.
    ///
    /// Rectangular areas only need the inclusive extents test. Other shapes
    /// are rejected early by the extents and then ray cast.
    pub fn contains(&self, point: Point) -> bool {
        let point = point.quantized(self.floor_level);
        if self.shape.is_rectangular() {
            return self.extents.contains(point);
        }
        self.extents.contains(point) && is_inside(point, &self.points)
    }

    /// Tests that every footprint corner lies inside the area.
    pub fn contains_all(&self, footprint: &[Point]) -> bool {
        footprint.iter().all(|corner| self.contains(*corner))
    }
}
