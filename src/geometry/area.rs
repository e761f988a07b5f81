//! # Area Construction
//!
//! Builds boundary polygons for simulated play areas: rectangles, squares,
//! triangles, or an explicit point list supplied by a device boundary.

use super::Point;
use crate::{config, AllocationError, AllocationResult};
use log::warn;
use serde::{Deserialize, Serialize};

/// Shape of the play area.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AreaShape {
    /// Axis-aligned rectangle of `width` by `depth`
    Rect,
    /// Axis-aligned square of side `width`
    Square,
    /// Triangle with a base of `width` and an apex `depth` away
    Triangle,
    /// Arbitrary (possibly non-convex) polygon given point by point
    Polygon,
}

impl AreaShape {
    /// Rectangular areas can be tested against their extents alone.
    pub fn is_rectangular(self) -> bool {
        matches!(self, AreaShape::Rect | AreaShape::Square)
    }
}

/// Description of a play area to be turned into a boundary polygon.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AreaSpec {
    /// Shape of the area
    pub shape: AreaShape,
    /// Corner the polygon starts from
    pub origin: Point,
    /// Size along `x` (side length for squares, base for triangles)
    pub width: f64,
    /// Size along `z` (apex distance for triangles)
    pub depth: f64,
    /// Offset of the triangle apex along `x`, relative to the origin
    pub apex_offset: f64,
    /// Number of boundary points to generate
    pub point_count: usize,
    /// Explicit boundary for [`AreaShape::Polygon`]
    #[serde(default)]
    pub points: Vec<Point>,
}

impl AreaSpec {
    /// A rectangle anchored at the origin.
    pub fn rect(width: f64, depth: f64) -> Self {
        Self {
            shape: AreaShape::Rect,
            origin: Point::origin(),
            width,
            depth,
            apex_offset: 0.0,
            point_count: config::DEFAULT_GEOMETRY_POINTS,
            points: Vec::new(),
        }
    }

    /// A square anchored at the origin.
    pub fn square(size: f64) -> Self {
        Self {
            shape: AreaShape::Square,
            ..Self::rect(size, size)
        }
    }

    /// A triangle anchored at the origin.
    pub fn triangle(base: f64, height: f64, apex_offset: f64) -> Self {
        Self {
            shape: AreaShape::Triangle,
            apex_offset,
            ..Self::rect(base, height)
        }
    }

    /// An explicit boundary polygon.
    pub fn polygon(points: Vec<Point>) -> Self {
        Self {
            shape: AreaShape::Polygon,
            point_count: points.len(),
            points,
            ..Self::rect(0.0, 0.0)
        }
    }

    /// Returns a copy with out-of-range values replaced by safe defaults.
    ///
    /// Non-positive sizes become 2, point counts of two or fewer become 36,
    /// and rectangular point counts that are not a multiple of four become 4.
    pub fn validated(&self) -> Self {
        let mut spec = self.clone();
        if spec.shape == AreaShape::Polygon {
            return spec;
        }

        if spec.width <= 0.0 {
            warn!("Area width cannot be 0 or less, changing to {}", config::DEFAULT_AREA_SIZE);
            spec.width = config::DEFAULT_AREA_SIZE;
        }
        if spec.depth <= 0.0 {
            warn!("Area depth cannot be 0 or less, changing to {}", config::DEFAULT_AREA_SIZE);
            spec.depth = config::DEFAULT_AREA_SIZE;
        }
        if spec.point_count <= 2 {
            warn!(
                "Geometry with 2 or less points is a line, resetting to {}",
                config::DEFAULT_GEOMETRY_POINTS
            );
            spec.point_count = config::DEFAULT_GEOMETRY_POINTS;
        }
        if spec.shape.is_rectangular() && spec.point_count % 4 != 0 {
            warn!(
                "Rect and square areas need a multiple of 4 geometry points (got {}), resetting to 4",
                spec.point_count
            );
            spec.point_count = 4;
        }
        spec
    }
}

/// Builds the ordered boundary polygon for an area.
///
/// Points are spread along each side in proportion to its length. The area
/// is validated first, so a rectangle asked for 10 points is built with 4.
///
/// # Examples
///
/// ```
/// use room_allocation::{build_polygon, AreaSpec};
///
/// let mut spec = AreaSpec::square(2.0);
/// spec.point_count = 8;
/// let points = build_polygon(&spec).unwrap();
/// assert_eq!(points.len(), 8);
/// ```
pub fn build_polygon(spec: &AreaSpec) -> AllocationResult<Vec<Point>> {
    let spec = spec.validated();
    let origin = spec.origin;

    let points = match spec.shape {
        AreaShape::Polygon => spec.points.clone(),
        AreaShape::Square => {
            let size = spec.width;
            let per_side = spec.point_count / 4;
            let step = size / per_side as f64;
            let far_x = Point::new(origin.x + size, origin.y, origin.z);
            let far_xz = Point::new(origin.x + size, origin.y, origin.z + size);
            let far_z = Point::new(origin.x, origin.y, origin.z + size);

            let mut points = interpolate_points(per_side, origin, far_x, step);
            points.extend(interpolate_points(per_side, far_x, far_xz, step));
            points.extend(interpolate_points(per_side, far_xz, far_z, step));
            points.extend(interpolate_points(per_side, far_z, origin, step));
            points
        }
        AreaShape::Rect => {
            let (width, depth) = (spec.width, spec.depth);
            let half = (spec.point_count / 2) as f64;
            let horizontal = (half * width / (width + depth)).round_ties_even() as usize;
            let vertical = (half * depth / (width + depth)).round_ties_even() as usize;
            let far_x = Point::new(origin.x + width, origin.y, origin.z);
            let far_xz = Point::new(origin.x + width, origin.y, origin.z + depth);
            let far_z = Point::new(origin.x, origin.y, origin.z + depth);

            let w_step = width / horizontal.max(1) as f64;
            let d_step = depth / vertical.max(1) as f64;
            let mut points = interpolate_points(horizontal, origin, far_x, w_step);
            points.extend(interpolate_points(vertical, far_x, far_xz, d_step));
            points.extend(interpolate_points(horizontal, far_xz, far_z, w_step));
            points.extend(interpolate_points(vertical, far_z, origin, d_step));
            points
        }
        AreaShape::Triangle => {
            let apex = Point::new(origin.x + spec.apex_offset, origin.y, origin.z + spec.depth);
            let right = Point::new(origin.x + spec.width, origin.y, origin.z);
            let left_len = origin.distance(apex);
            let right_len = right.distance(apex);
            let total = spec.width + left_len + right_len;
            let count = spec.point_count as f64;

            let on_base = (count * spec.width / total).round_ties_even() as usize;
            let on_left = (count * left_len / total).round_ties_even() as usize;
            let on_right = (count * right_len / total).round_ties_even() as usize;

            let mut points =
                interpolate_points(on_left, origin, apex, left_len / on_left.max(1) as f64);
            points.extend(interpolate_points(
                on_right,
                apex,
                right,
                right_len / on_right.max(1) as f64,
            ));
            points.extend(interpolate_points(
                on_base,
                right,
                origin,
                spec.width / on_base.max(1) as f64,
            ));
            points
        }
    };

    if points.is_empty() {
        return Err(AllocationError::UndefinedGeometry(format!(
            "{:?} area produced no boundary points",
            spec.shape
        )));
    }
    Ok(points)
}

/// Produces `count` samples walking from `from` towards `to` in steps of
/// `step`, starting at `from` and never passing `to`. The end anchor itself
/// is excluded unless a step lands on it before `count` samples are taken.
pub fn interpolate_points(count: usize, from: Point, to: Point, step: f64) -> Vec<Point> {
    let mut points = Vec::with_capacity(count);
    let mut current = from;
    for _ in 0..count {
        points.push(current);
        current = current.move_towards(to, step);
    }
    points
}
