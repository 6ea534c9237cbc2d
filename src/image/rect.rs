//! Rectangle types.
//!
//! These are used for regions of interest, detection boxes, and for addressing parts of an
//! [`Image`][super::Image].

use std::fmt;

use nalgebra::{Rotation2, Vector2};

use super::AspectRatio;

/// 2D vector of `f32` coordinates, in image space (X right, Y down).
pub type Vec2f = Vector2<f32>;

/// An axis-aligned rectangle.
///
/// Rectangles are allowed to have zero height and/or width. Negative dimensions are not allowed.
#[derive(Clone, Copy, PartialEq)]
pub struct Rect {
    center: Vec2f,
    size: Vec2f,
}

impl Rect {
    /// Creates a rectangle extending outwards from a center point.
    #[inline]
    pub fn from_center(x_center: f32, y_center: f32, width: f32, height: f32) -> Self {
        Self {
            center: Vec2f::new(x_center, y_center),
            size: Vec2f::new(width, height),
        }
    }

    /// Creates a rectangle extending downwards and right from a point.
    #[inline]
    pub fn from_top_left(top_left_x: f32, top_left_y: f32, width: f32, height: f32) -> Self {
        Self::from_center(
            top_left_x + width * 0.5,
            top_left_y + height * 0.5,
            width,
            height,
        )
    }

    /// Computes the axis-aligned bounding rectangle that encompasses `points`.
    ///
    /// Returns [`None`] if `points` is an empty iterator.
    pub fn bounding<I: IntoIterator<Item = Vec2f>>(points: I) -> Option<Self> {
        let mut iter = points.into_iter();

        let first = iter.next()?;
        let (mut min, mut max) = (first, first);
        for pt in iter {
            min = min.inf(&pt);
            max = max.sup(&pt);
        }

        Some(Self::from_top_left(min.x, min.y, max.x - min.x, max.y - min.y))
    }

    /// Scales the width and height of this [`Rect`] by the given amount.
    ///
    /// The center position of the [`Rect`] remains the same.
    #[must_use]
    pub fn scale(&self, scale: f32) -> Self {
        Self {
            center: self.center,
            size: self.size * scale,
        }
    }

    /// Grows this rectangle by adding a margin relative to width and height.
    ///
    /// `amount` is the relative amount of the rectangles width and height to add to each side.
    #[must_use]
    pub fn grow_rel(&self, amount: f32) -> Self {
        Self {
            size: self.size * (1.0 + 2.0 * amount),
            ..*self
        }
    }

    /// Symmetrically extends one dimension of `self` so that the resulting rectangle has the given
    /// aspect ratio.
    #[must_use]
    pub fn grow_to_fit_aspect(&self, target_aspect: AspectRatio) -> Self {
        let mut res = *self;
        let target_width = self.height() * target_aspect.as_f32();
        if target_width >= self.width() {
            res.size.x = target_width;
        } else {
            res.size.y = self.width() / target_aspect.as_f32();
        }

        res
    }

    #[inline]
    pub fn top_left(&self) -> Vec2f {
        self.center - self.size * 0.5
    }

    /// Returns the X coordinate of the left side of the rectangle.
    #[inline]
    pub fn x(&self) -> f32 {
        self.top_left().x
    }

    /// Returns the Y coordinate of the top side of the rectangle.
    #[inline]
    pub fn y(&self) -> f32 {
        self.top_left().y
    }

    #[inline]
    pub fn width(&self) -> f32 {
        self.size.x
    }

    #[inline]
    pub fn height(&self) -> f32 {
        self.size.y
    }

    #[inline]
    pub fn area(&self) -> f32 {
        self.size.x * self.size.y
    }

    #[inline]
    pub fn center(&self) -> Vec2f {
        self.center
    }

    #[inline]
    pub fn size(&self) -> Vec2f {
        self.size
    }

    #[must_use]
    pub fn move_by(&self, offset: Vec2f) -> Rect {
        Rect {
            center: self.center + offset,
            ..*self
        }
    }

    #[must_use]
    pub fn move_to(&self, x: f32, y: f32) -> Rect {
        Rect::from_top_left(x, y, self.width(), self.height())
    }

    /// Computes the intersection of `self` and `other`.
    ///
    /// Returns [`None`] when the rectangles do not overlap.
    pub fn intersection(&self, other: &Rect) -> Option<Rect> {
        let min = self.top_left().sup(&other.top_left());
        let max = (self.top_left() + self.size()).inf(&(other.top_left() + other.size()));
        if min.x > max.x || min.y > max.y {
            return None;
        }

        Rect::bounding([min, max])
    }

    fn intersection_area(&self, other: &Self) -> f32 {
        self.intersection(other).map_or(0.0, |rect| rect.area())
    }

    fn union_area(&self, other: &Self) -> f32 {
        self.area() + other.area() - self.intersection_area(other)
    }

    /// Computes the Intersection over Union (IOU) of `self` and `other`.
    ///
    /// Two empty rectangles have an IOU of 0.
    pub fn iou(&self, other: &Self) -> f32 {
        let union = self.union_area(other);
        if union <= 0.0 {
            return 0.0;
        }
        self.intersection_area(other) / union
    }

    pub fn contains_point(&self, p: Vec2f) -> bool {
        self.x() <= p.x
            && self.y() <= p.y
            && self.x() + self.width() >= p.x
            && self.y() + self.height() >= p.y
    }

    /// Returns the corners in order top-left, top-right, bottom-right, bottom-left.
    pub fn corners(&self) -> [Vec2f; 4] {
        let [x, y] = [self.x(), self.y()];
        let [w, h] = [self.width(), self.height()];
        [
            Vec2f::new(x, y),
            Vec2f::new(x + w, y),
            Vec2f::new(x + w, y + h),
            Vec2f::new(x, y + h),
        ]
    }
}

impl fmt::Debug for Rect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Rect @ ({},{})/{}x{}",
            self.center.x, self.center.y, self.size.x, self.size.y
        )
    }
}

/// A [`Rect`], rotated around its center.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RotatedRect {
    rect: Rect,
    radians: f32,
}

impl RotatedRect {
    /// Creates a new rotated rectangle.
    ///
    /// `radians` is the clockwise rotation to apply to the [`Rect`] (as seen on screen, with the Y
    /// axis pointing down).
    #[inline]
    pub fn new(rect: Rect, radians: f32) -> Self {
        Self { rect, radians }
    }

    /// Computes the rectangle rotated by `radians` that encompasses `points`.
    ///
    /// Returns [`None`] if `points` is an empty iterator.
    pub fn bounding<I: IntoIterator<Item = Vec2f>>(radians: f32, points: I) -> Option<Self> {
        // Rotate all points into the rectangle's frame, compute the axis-aligned bounds there,
        // then rotate the center back. Rotating around the origin is fine since only the center
        // is transformed back.
        let cw = Rotation2::new(-radians);
        let bounds = Rect::bounding(points.into_iter().map(|p| cw * p))?;
        let center = Rotation2::new(radians) * bounds.center();

        Some(Self::new(
            Rect::from_center(center.x, center.y, bounds.width(), bounds.height()),
            radians,
        ))
    }

    /// Returns the rectangle's clockwise rotation in radians.
    #[inline]
    pub fn rotation_radians(&self) -> f32 {
        self.radians
    }

    /// Returns a reference to the underlying non-rotated rectangle.
    #[inline]
    pub fn rect(&self) -> &Rect {
        &self.rect
    }

    /// Applies a closure to the underlying non-rotated [`Rect`].
    #[must_use]
    pub fn map(mut self, f: impl FnOnce(Rect) -> Rect) -> Self {
        self.rect = f(self.rect);
        self
    }

    pub fn center(&self) -> Vec2f {
        self.rect.center()
    }

    /// Returns the rotated rectangle's corners in the parent's coordinate system.
    ///
    /// The order is top-left, top-right, bottom-right, bottom-left, as seen from the non-rotated
    /// rect.
    pub fn rotated_corners(&self) -> [Vec2f; 4] {
        let rot = Rotation2::new(self.radians);
        let center = self.rect.center();
        self.rect.corners().map(|p| center + rot * (p - center))
    }

    pub fn contains_point(&self, point: Vec2f) -> bool {
        let pt = self.transform_in(point);

        // The rect offset was already compensated for by the transform.
        self.rect.move_to(0.0, 0.0).contains_point(pt)
    }

    /// Transforms a point from the parent coordinate system into the [`RotatedRect`]'s system.
    ///
    /// The origin of the inner coordinate system is formed by the top left corner of the rectangle.
    pub fn transform_in(&self, pt: Vec2f) -> Vec2f {
        let half = self.rect.size() * 0.5;
        let pos = pt - self.rect.top_left() - half;
        Rotation2::new(-self.radians) * pos + half
    }

    /// Transforms a point from the [`RotatedRect`]'s coordinate system to the parent system.
    ///
    /// The origin of the inner coordinate system is formed by the top left corner of the rectangle.
    pub fn transform_out(&self, pt: Vec2f) -> Vec2f {
        let half = self.rect.size() * 0.5;
        Rotation2::new(self.radians) * (pt - half) + half + self.rect.top_left()
    }
}

impl From<Rect> for RotatedRect {
    fn from(rect: Rect) -> Self {
        Self::new(rect, 0.0)
    }
}

#[cfg(test)]
mod tests {
    use std::f32::consts::TAU;

    use approx::assert_relative_eq;

    use super::*;

    fn v(x: f32, y: f32) -> Vec2f {
        Vec2f::new(x, y)
    }

    #[test]
    fn contains_point() {
        let rect = Rect::from_top_left(-5.0, 5.0, 10.0, 5.0);
        assert!(rect.contains_point(v(-5.0, 5.0)));
        assert!(rect.contains_point(v(4.0, 9.0)));
        assert!(!rect.contains_point(v(6.0, 9.0)));
        assert!(!rect.contains_point(v(4.0, 11.0)));
    }

    #[test]
    fn iou() {
        let smaller = Rect::from_center(9.0, 9.0, 1.0, 1.0);
        let bigger = Rect::from_center(9.0, 9.0, 2.0, 2.0);

        let intersection = smaller.intersection(&bigger).unwrap();
        assert_eq!(intersection.center(), smaller.center());
        assert_eq!(intersection.size(), smaller.size());

        assert_eq!(smaller.iou(&bigger), 1.0 / 4.0);
        assert_eq!(bigger.iou(&smaller), 1.0 / 4.0);

        let apart = Rect::from_center(0.0, 0.0, 1.0, 1.0);
        assert_eq!(apart.iou(&bigger), 0.0);

        let zero = Rect::from_center(0.0, 0.0, 0.0, 0.0);
        assert_eq!(zero.iou(&zero), 0.0);
    }

    #[test]
    fn bounding() {
        assert_eq!(
            Rect::bounding([v(0.0, 0.0), v(1.0, 1.0), v(-1.0, -1.0)]).unwrap(),
            Rect::from_center(0.0, 0.0, 2.0, 2.0),
        );
        assert_eq!(
            Rect::bounding([v(0.0, 0.0), v(10.0, 0.0)]).unwrap(),
            Rect::from_center(5.0, 0.0, 10.0, 0.0),
        );
        assert!(Rect::bounding([]).is_none());
    }

    #[test]
    fn fit_aspect() {
        assert_eq!(
            Rect::from_center(10.0, 10.0, 50.0, 100.0).grow_to_fit_aspect(AspectRatio::SQUARE),
            Rect::from_center(10.0, 10.0, 100.0, 100.0),
        );
        assert_eq!(
            Rect::from_center(10.0, 10.0, 100.0, 50.0).grow_to_fit_aspect(AspectRatio::SQUARE),
            Rect::from_center(10.0, 10.0, 100.0, 100.0),
        );
    }

    #[test]
    fn rotated_rect_transform() {
        let null = RotatedRect::new(Rect::from_top_left(0.0, 0.0, 1.0, 1.0), 0.0);
        assert_eq!(null.transform_in(v(1.0, -1.0)), v(1.0, -1.0));
        assert_eq!(null.transform_out(v(1.0, -1.0)), v(1.0, -1.0));

        let offset = RotatedRect::new(Rect::from_top_left(10.0, 20.0, 1.0, 1.0), 0.0);
        assert_eq!(offset.transform_in(v(10.0, 20.0)), v(0.0, 0.0));

        // Rotated clockwise by 90°
        let right = RotatedRect::new(Rect::from_top_left(0.0, 0.0, 1.0, 1.0), TAU / 4.0);
        assert_relative_eq!(right.transform_in(v(0.5, 0.5)), v(0.5, 0.5));
        assert_relative_eq!(right.transform_in(v(0.0, 0.0)), v(0.0, 1.0), epsilon = 1e-6);
        assert_relative_eq!(right.transform_out(v(0.0, 0.0)), v(1.0, 0.0), epsilon = 1e-6);
        assert_relative_eq!(right.transform_out(v(0.0, -1.0)), v(2.0, 0.0), epsilon = 1e-6);

        // Offset, rotated by 180°
        let rect = RotatedRect::new(Rect::from_top_left(10.0, 20.0, 1.0, 1.0), TAU / 2.0);
        assert_relative_eq!(rect.transform_in(v(11.0, 21.0)), v(0.0, 0.0), epsilon = 1e-5);
        assert_relative_eq!(rect.transform_out(v(0.0, 0.0)), v(11.0, 21.0), epsilon = 1e-5);
    }

    #[test]
    fn rotated_rect_contains_point() {
        let rect = RotatedRect::new(Rect::from_center(0.0, 0.0, 51.0, 1.0), TAU / 4.0);
        assert!(rect.contains_point(v(0.0, 0.0)));
        assert!(rect.contains_point(v(0.0, 25.0)));
        assert!(!rect.contains_point(v(0.0, 26.0)));
        assert!(rect.contains_point(v(0.0, -25.0)));
        assert!(!rect.contains_point(v(1.0, 0.0)));
    }

    #[test]
    fn rotated_rect_bounding() {
        assert!(RotatedRect::bounding(0.0, []).is_none());
        assert_eq!(
            RotatedRect::bounding(0.0, [v(0.0, 0.0), v(10.0, 0.0)]).unwrap(),
            Rect::from_top_left(0.0, 0.0, 10.0, 0.0).into(),
        );

        let mut rng = fastrand::Rng::with_seed(42);
        for _ in 0..20 {
            let radians = rng.f32() * TAU;
            let points = (0..10)
                .map(|_| v(rng.f32() * 100.0, rng.f32() * 100.0))
                .collect::<Vec<_>>();
            let rect = RotatedRect::bounding(radians, points.iter().copied()).unwrap();
            let dilated = rect.map(|rect| rect.grow_rel(0.005));
            for point in &points {
                assert!(
                    dilated.contains_point(*point),
                    "{dilated:?} does not contain {point}"
                );
            }
        }
    }

    #[test]
    fn rotated_corners() {
        let rect = RotatedRect::new(Rect::from_center(0.0, 0.0, 2.0, 2.0), TAU / 4.0);
        let [tl, tr, br, bl] = rect.rotated_corners();
        assert_relative_eq!(tl, v(1.0, -1.0), epsilon = 1e-6);
        assert_relative_eq!(tr, v(1.0, 1.0), epsilon = 1e-6);
        assert_relative_eq!(br, v(-1.0, 1.0), epsilon = 1e-6);
        assert_relative_eq!(bl, v(-1.0, -1.0), epsilon = 1e-6);
    }
}
