//! Window geometry

/// Window geometry (outer size, including the X11 border)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Geometry {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl Geometry {
    pub const fn new(x: i32, y: i32, width: u32, height: u32) -> Self {
        Self { x, y, width, height }
    }

    /// Build from an X11 GetGeometry-style description, folding the border
    /// into the outer size.
    pub fn from_x11(x: i16, y: i16, width: u16, height: u16, border_width: u16) -> Self {
        Self {
            x: x as i32,
            y: y as i32,
            width: width as u32 + border_width as u32 * 2,
            height: height as u32 + border_width as u32 * 2,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    pub fn same_size(&self, other: &Geometry) -> bool {
        self.width == other.width && self.height == other.height
    }

    pub fn area(&self) -> u64 {
        self.width as u64 * self.height as u64
    }

    fn right(&self) -> i64 {
        self.x as i64 + self.width as i64
    }

    fn bottom(&self) -> i64 {
        self.y as i64 + self.height as i64
    }

    /// True if `other` lies entirely inside `self`
    pub fn contains(&self, other: &Geometry) -> bool {
        other.x >= self.x
            && other.y >= self.y
            && other.right() <= self.right()
            && other.bottom() <= self.bottom()
    }

    pub fn intersects(&self, other: &Geometry) -> bool {
        (self.x as i64) < other.right()
            && (other.x as i64) < self.right()
            && (self.y as i64) < other.bottom()
            && (other.y as i64) < self.bottom()
    }

    /// Smallest rectangle covering both
    pub fn union(&self, other: &Geometry) -> Geometry {
        if self.is_empty() {
            return *other;
        }
        if other.is_empty() {
            return *self;
        }
        let x = self.x.min(other.x);
        let y = self.y.min(other.y);
        let right = self.right().max(other.right());
        let bottom = self.bottom().max(other.bottom());
        Geometry {
            x,
            y,
            width: (right - x as i64) as u32,
            height: (bottom - y as i64) as u32,
        }
    }

    /// Linear interpolation towards `to`. `t` is clamped to [0, 1].
    pub fn lerp(&self, to: &Geometry, t: f64) -> Geometry {
        let t = t.clamp(0.0, 1.0);
        let mix = |a: f64, b: f64| a + (b - a) * t;
        Geometry {
            x: mix(self.x as f64, to.x as f64).round() as i32,
            y: mix(self.y as f64, to.y as f64).round() as i32,
            width: mix(self.width as f64, to.width as f64).round().max(0.0) as u32,
            height: mix(self.height as f64, to.height as f64).round().max(0.0) as u32,
        }
    }
}
