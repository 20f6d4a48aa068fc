//! Normalised bounding boxes (spec §3).

use serde::{Deserialize, Serialize};

/// A normalised bounding box `(x1, y1, x2, y2)` in `[0, 1]^4` with `x2 > x1`
/// and `y2 > y1`, rounded to 4 decimals for cache-key stability.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x1: f64,
    pub y1: f64,
    pub x2: f64,
    pub y2: f64,
}

impl BoundingBox {
    /// Builds a box from raw coordinates, clamping to `[0, 1]` and rounding to
    /// 4 decimals. Returns `None` if the clamped box has zero or negative area.
    #[must_use]
    pub fn clamped(x1: f64, y1: f64, x2: f64, y2: f64) -> Option<Self> {
        let round4 = |v: f64| (v.clamp(0.0, 1.0) * 10_000.0).round() / 10_000.0;
        let (x1, y1, x2, y2) = (round4(x1), round4(y1), round4(x2), round4(y2));
        if x2 > x1 && y2 > y1 {
            Some(Self { x1, y1, x2, y2 })
        } else {
            None
        }
    }

    /// Stable string form used inside render-cache keys: `x1,y1,x2,y2`.
    #[must_use]
    pub fn cache_fragment(&self) -> String {
        format!("{:.4},{:.4},{:.4},{:.4}", self.x1, self.y1, self.x2, self.y2)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clamps_out_of_range_coordinates() {
        let bbox = BoundingBox::clamped(-0.1, 0.0, 1.1, 1.0).unwrap();
        assert_eq!(bbox.x1, 0.0);
        assert_eq!(bbox.y1, 0.0);
        assert_eq!(bbox.x2, 1.0);
        assert_eq!(bbox.y2, 1.0);
    }

    #[test]
    fn rejects_zero_area_after_clamp() {
        assert!(BoundingBox::clamped(0.5, 0.5, 0.5, 0.9).is_none());
        assert!(BoundingBox::clamped(1.2, 0.0, 1.3, 1.0).is_none());
    }

    #[test]
    fn rounds_to_four_decimals() {
        let bbox = BoundingBox::clamped(0.123_456, 0.0, 0.987_654, 1.0).unwrap();
        assert_eq!(bbox.x1, 0.1235);
        assert_eq!(bbox.x2, 0.9877);
    }
}
