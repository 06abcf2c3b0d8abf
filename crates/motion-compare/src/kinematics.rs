//! Per-frame joint geometry in image coordinates (x right, y down).

use motion_compare_types::Joint;

use crate::trial::Frame;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn midpoint(self, other: Point) -> Point {
        Point::new((self.x + other.x) / 2.0, (self.y + other.y) / 2.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Left,
    Right,
}

impl Side {
    pub fn hip(self) -> Joint {
        match self {
            Side::Left => Joint::LeftHip,
            Side::Right => Joint::RightHip,
        }
    }

    pub fn knee(self) -> Joint {
        match self {
            Side::Left => Joint::LeftKnee,
            Side::Right => Joint::RightKnee,
        }
    }

    pub fn ankle(self) -> Joint {
        match self {
            Side::Left => Joint::LeftAnkle,
            Side::Right => Joint::RightAnkle,
        }
    }
}

const DEGENERATE: f64 = 1e-4;

/// Angle at `vertex` between the segments towards `a` and `c`, in degrees.
pub fn interior_angle(a: Point, vertex: Point, c: Point) -> Option<f64> {
    let v1 = (a.x - vertex.x, a.y - vertex.y);
    let v2 = (c.x - vertex.x, c.y - vertex.y);
    let mag1 = (v1.0 * v1.0 + v1.1 * v1.1).sqrt();
    let mag2 = (v2.0 * v2.0 + v2.1 * v2.1).sqrt();
    if mag1 < DEGENERATE || mag2 < DEGENERATE {
        return None;
    }
    let cos_angle = ((v1.0 * v2.0 + v1.1 * v2.1) / (mag1 * mag2)).clamp(-1.0, 1.0);
    Some(cos_angle.acos().to_degrees())
}

/// Inclination of the line `a`→`b` against the horizontal, folded to 0..=90°.
pub fn tilt_from_horizontal(a: Point, b: Point) -> Option<f64> {
    let dx = (b.x - a.x).abs();
    let dy = (b.y - a.y).abs();
    if dx < DEGENERATE && dy < DEGENERATE {
        return None;
    }
    Some(dy.atan2(dx).to_degrees())
}

/// Inclination of the line `a`→`b` against the vertical, folded to 0..=90°.
pub fn tilt_from_vertical(a: Point, b: Point) -> Option<f64> {
    tilt_from_horizontal(a, b).map(|angle| 90.0 - angle)
}

/// Reads joint positions from a frame, ignoring landmarks below the
/// visibility floor.
#[derive(Debug, Clone, Copy)]
pub struct FrameGeometry<'a> {
    frame: &'a Frame,
    min_visibility: f64,
}

impl<'a> FrameGeometry<'a> {
    pub fn new(frame: &'a Frame, min_visibility: f64) -> Self {
        Self {
            frame,
            min_visibility,
        }
    }

    pub fn point(&self, joint: Joint) -> Option<Point> {
        self.frame
            .joint(joint, self.min_visibility)
            .map(|landmark| Point::new(landmark.x, landmark.y))
    }

    pub fn mid_hip(&self) -> Option<Point> {
        Some(self.point(Joint::LeftHip)?.midpoint(self.point(Joint::RightHip)?))
    }

    pub fn mid_shoulder(&self) -> Option<Point> {
        Some(
            self.point(Joint::LeftShoulder)?
                .midpoint(self.point(Joint::RightShoulder)?),
        )
    }

    /// Horizontal distance of the left ankle ahead of the right one.
    pub fn step_separation(&self) -> Option<f64> {
        Some(self.point(Joint::LeftAnkle)?.x - self.point(Joint::RightAnkle)?.x)
    }

    /// Ankle position relative to the pelvis along the image x axis.
    pub fn ankle_offset(&self, side: Side) -> Option<f64> {
        Some(self.point(side.ankle())?.x - self.mid_hip()?.x)
    }

    pub fn pelvic_tilt(&self) -> Option<f64> {
        tilt_from_horizontal(self.point(Joint::LeftHip)?, self.point(Joint::RightHip)?)
    }

    pub fn trunk_lean(&self) -> Option<f64> {
        tilt_from_vertical(self.mid_hip()?, self.mid_shoulder()?)
    }

    /// 0° for a straight leg, growing as the knee bends.
    pub fn knee_flexion(&self, side: Side) -> Option<f64> {
        let angle = interior_angle(
            self.point(side.hip())?,
            self.point(side.knee())?,
            self.point(side.ankle())?,
        )?;
        Some(180.0 - angle)
    }

    /// Frontal plane projection angle deviation of one leg.
    ///
    /// `Some(0.0)` when the knee sits on or lateral to the hip–ankle line;
    /// otherwise `180° − hip/knee/ankle angle`.
    pub fn knee_valgus(&self, side: Side) -> Option<f64> {
        let hip = self.point(side.hip())?;
        let knee = self.point(side.knee())?;
        let ankle = self.point(side.ankle())?;
        let midline = self.mid_hip()?.x;

        let span = ankle.y - hip.y;
        if span.abs() < DEGENERATE {
            return None;
        }
        let line_x = hip.x + (ankle.x - hip.x) * (knee.y - hip.y) / span;
        let deviation = 180.0 - interior_angle(hip, knee, ankle)?;
        if (knee.x - midline).abs() < (line_x - midline).abs() {
            Some(deviation)
        } else {
            Some(0.0)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trial::fixtures::pose_from;

    fn frame_with(place: impl FnMut(Joint) -> (f64, f64)) -> Frame {
        Frame {
            index: 0,
            timestamp_ms: 0.0,
            landmarks: Some(pose_from(place)),
        }
    }

    fn standing(joint: Joint) -> (f64, f64) {
        match joint {
            Joint::LeftShoulder => (0.55, 0.3),
            Joint::RightShoulder => (0.45, 0.3),
            Joint::LeftHip => (0.55, 0.5),
            Joint::RightHip => (0.45, 0.5),
            Joint::LeftKnee => (0.55, 0.7),
            Joint::RightKnee => (0.45, 0.7),
            Joint::LeftAnkle => (0.55, 0.9),
            Joint::RightAnkle => (0.45, 0.9),
            _ => (0.5, 0.1),
        }
    }

    #[test]
    fn straight_and_right_angles() {
        let straight = interior_angle(Point::new(0.0, 0.0), Point::new(0.5, 0.0), Point::new(1.0, 0.0));
        assert!((straight.unwrap() - 180.0).abs() < 1e-6);
        let bent = interior_angle(Point::new(0.0, 0.0), Point::new(0.5, 0.0), Point::new(0.5, 0.5));
        assert!((bent.unwrap() - 90.0).abs() < 1e-6);
        assert!(interior_angle(Point::new(0.0, 0.0), Point::new(0.0, 0.0), Point::new(1.0, 0.0)).is_none());
    }

    #[test]
    fn upright_stance_has_no_lean_tilt_or_valgus() {
        let frame = frame_with(standing);
        let geometry = FrameGeometry::new(&frame, 0.5);
        assert!(geometry.trunk_lean().unwrap().abs() < 1e-9);
        assert!(geometry.pelvic_tilt().unwrap().abs() < 1e-9);
        assert!(geometry.knee_flexion(Side::Left).unwrap().abs() < 1e-4);
        assert_eq!(geometry.knee_valgus(Side::Right), Some(0.0));
    }

    #[test]
    fn medial_knee_reports_valgus() {
        let frame = frame_with(|joint| match joint {
            Joint::LeftKnee => (0.52, 0.7),
            other => standing(other),
        });
        let geometry = FrameGeometry::new(&frame, 0.5);
        let valgus = geometry.knee_valgus(Side::Left).unwrap();
        let expected = 2.0 * (0.03f64).atan2(0.2).to_degrees();
        assert!((valgus - expected).abs() < 1e-6, "valgus {valgus}");
    }

    #[test]
    fn lateral_knee_is_not_valgus() {
        let frame = frame_with(|joint| match joint {
            Joint::LeftKnee => (0.58, 0.7),
            other => standing(other),
        });
        let geometry = FrameGeometry::new(&frame, 0.5);
        assert_eq!(geometry.knee_valgus(Side::Left), Some(0.0));
    }

    #[test]
    fn tilted_hips_and_leaning_trunk() {
        let frame = frame_with(|joint| match joint {
            Joint::LeftHip => (0.55, 0.55),
            Joint::LeftShoulder => (0.65, 0.3),
            Joint::RightShoulder => (0.55, 0.3),
            other => standing(other),
        });
        let geometry = FrameGeometry::new(&frame, 0.5);
        let tilt = geometry.pelvic_tilt().unwrap();
        assert!((tilt - (0.05f64).atan2(0.1).to_degrees()).abs() < 1e-9);
        assert!(geometry.trunk_lean().unwrap() > 10.0);
    }
}
