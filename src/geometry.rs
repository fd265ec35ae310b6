//! Screen geometry primitives
//!
//! Everything the locators hand around is a pixel-space rectangle on the
//! device screen. `Region` and `Viewport` both serialize because they are
//! part of the persisted cache format.

use rand::Rng;
use serde::{Deserialize, Serialize};

/// Device screen dimensions
///
/// Part of every cache key: element positions are resolution-dependent, so a
/// region recorded on one viewport must never be reused on another.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

impl Viewport {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Key fragment used by the persisted cache ("720x1440")
    pub fn key(&self) -> String {
        format!("{}x{}", self.width, self.height)
    }
}

impl std::fmt::Display for Viewport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Axis-aligned bounding rectangle in screen pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Region {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl Region {
    pub fn new(x: i32, y: i32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Build from corner coordinates (the tree dump's `[x1,y1][x2,y2]` form)
    pub fn from_corners(x1: i32, y1: i32, x2: i32, y2: i32) -> Self {
        Self {
            x: x1.min(x2),
            y: y1.min(y2),
            width: (x2 - x1).unsigned_abs(),
            height: (y2 - y1).unsigned_abs(),
        }
    }

    pub fn center(&self) -> (i32, i32) {
        (
            self.x + self.width as i32 / 2,
            self.y + self.height as i32 / 2,
        )
    }

    pub fn center_y(&self) -> i32 {
        self.y + self.height as i32 / 2
    }

    pub fn bottom(&self) -> i32 {
        self.y + self.height as i32
    }

    pub fn right(&self) -> i32 {
        self.x + self.width as i32
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    pub fn contains(&self, px: i32, py: i32) -> bool {
        px >= self.x && px < self.right() && py >= self.y && py < self.bottom()
    }

    pub fn intersects(&self, other: &Region) -> bool {
        self.x < other.right()
            && other.x < self.right()
            && self.y < other.bottom()
            && other.y < self.bottom()
    }

    /// Shrink the region by `frac` of its size on each side
    pub fn inset(&self, frac: f32) -> Region {
        let dx = (self.width as f32 * frac) as i32;
        let dy = (self.height as f32 * frac) as i32;
        Region {
            x: self.x + dx,
            y: self.y + dy,
            width: self.width.saturating_sub(2 * dx as u32),
            height: self.height.saturating_sub(2 * dy as u32),
        }
    }

    /// Uniform random point inside the region inset by `margin` per side
    ///
    /// Edge-of-hitbox taps miss on real devices, so click targets are drawn
    /// from the shrunken interior. Degenerate regions fall back to center.
    pub fn random_point_inset<R: Rng>(&self, margin: f32, rng: &mut R) -> (i32, i32) {
        let inner = self.inset(margin);
        if inner.is_empty() {
            return self.center();
        }
        let px = rng.gen_range(inner.x..inner.right());
        let py = rng.gen_range(inner.y..inner.bottom());
        (px, py)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_corners() {
        let r = Region::from_corners(143, 295, 603, 393);
        assert_eq!(r.x, 143);
        assert_eq!(r.y, 295);
        assert_eq!(r.width, 460);
        assert_eq!(r.height, 98);
        assert_eq!(r.center(), (373, 344));
    }

    #[test]
    fn test_contains_and_intersects() {
        let r = Region::new(100, 100, 200, 50);
        assert!(r.contains(150, 120));
        assert!(r.contains(100, 100));
        assert!(!r.contains(300, 120));
        assert!(r.intersects(&Region::new(250, 140, 100, 100)));
        assert!(!r.intersects(&Region::new(400, 400, 10, 10)));
    }

    #[test]
    fn test_random_point_stays_inside_margin() {
        let r = Region::new(0, 0, 100, 100);
        let mut rng = rand::thread_rng();
        for _ in 0..500 {
            let (px, py) = r.random_point_inset(0.15, &mut rng);
            assert!((15..85).contains(&px), "x out of inset: {}", px);
            assert!((15..85).contains(&py), "y out of inset: {}", py);
        }
    }

    #[test]
    fn test_random_point_degenerate_region() {
        let r = Region::new(10, 10, 2, 2);
        let mut rng = rand::thread_rng();
        let (px, py) = r.random_point_inset(0.5, &mut rng);
        assert_eq!((px, py), r.center());
    }

    #[test]
    fn test_viewport_key() {
        assert_eq!(Viewport::new(720, 1440).key(), "720x1440");
    }
}
