use std::fmt;
use std::ops::Sub;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Interval<T> {
    pub min: T,
    pub max: T,
}

impl<T> Interval<T> {
    pub fn new(min: T, max: T) -> Self {
        Self { min, max }
    }
}

impl<T: Copy + Sub<Output = T>> Interval<T> {
    pub fn range(&self) -> T {
        self.max - self.min
    }
}

impl Interval<f64> {
    pub fn contains(&self, other: &Self) -> bool {
        self.min <= other.min && other.max <= self.max
    }

    /// Overlap with positive length; touching intervals do not intersect
    pub fn intersects(&self, other: &Self) -> bool {
        self.min < other.max && other.min < self.max
    }

    pub fn intersection(&self, other: &Self) -> Option<Self> {
        self.intersects(other)
            .then(|| Self::new(self.min.max(other.min), self.max.min(other.max)))
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Envelope {
    pub x: Interval<f64>,
    pub y: Interval<f64>,
}

impl Envelope {
    pub fn new(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Self {
        Self {
            x: Interval::new(min_x.min(max_x), min_x.max(max_x)),
            y: Interval::new(min_y.min(max_y), min_y.max(max_y)),
        }
    }

    pub fn min_x(&self) -> f64 {
        self.x.min
    }

    pub fn min_y(&self) -> f64 {
        self.y.min
    }

    pub fn max_x(&self) -> f64 {
        self.x.max
    }

    pub fn max_y(&self) -> f64 {
        self.y.max
    }

    pub fn width(&self) -> f64 {
        self.x.range()
    }

    pub fn height(&self) -> f64 {
        self.y.range()
    }

    pub fn is_empty(&self) -> bool {
        !(self.width() > 0.0 && self.height() > 0.0)
    }

    pub fn contains(&self, other: &Envelope) -> bool {
        self.x.contains(&other.x) && self.y.contains(&other.y)
    }

    pub fn intersects(&self, other: &Envelope) -> bool {
        self.x.intersects(&other.x) && self.y.intersects(&other.y)
    }

    pub fn intersection(&self, other: &Envelope) -> Option<Envelope> {
        Some(Self {
            x: self.x.intersection(&other.x)?,
            y: self.y.intersection(&other.y)?,
        })
    }

    pub fn as_tuple(&self) -> (f64, f64, f64, f64) {
        (self.x.min, self.y.min, self.x.max, self.y.max)
    }
}

impl fmt::Display for Envelope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Envelope(({}, {}) - ({}, {}))",
            self.x.min, self.y.min, self.x.max, self.y.max
        )
    }
}

/// Integer rectangle in a pyramid level's pixel space, `y` growing down
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct PixelRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl PixelRect {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn right(&self) -> u32 {
        self.x + self.width
    }

    pub fn bottom(&self) -> u32 {
        self.y + self.height
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn fits_within(&self, dimensions: (u32, u32)) -> bool {
        self.x as u64 + self.width as u64 <= dimensions.0 as u64
            && self.y as u64 + self.height as u64 <= dimensions.1 as u64
    }
}

impl fmt::Display for PixelRect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "PixelRect({}, {}, {}x{})",
            self.x, self.y, self.width, self.height
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_normalizes_corners() {
        let env = Envelope::new(10.0, 5.0, 0.0, -5.0);
        assert_eq!(env.as_tuple(), (0.0, -5.0, 10.0, 5.0));
        assert_eq!(env.width(), 10.0);
        assert_eq!(env.height(), 10.0);
    }

    #[test]
    fn touching_envelopes_do_not_intersect() {
        let a = Envelope::new(0.0, 0.0, 10.0, 10.0);
        let b = Envelope::new(10.0, 0.0, 20.0, 10.0);
        assert!(!a.intersects(&b));
        assert_eq!(a.intersection(&b), None);
        let c = Envelope::new(5.0, 5.0, 20.0, 20.0);
        assert_eq!(
            a.intersection(&c),
            Some(Envelope::new(5.0, 5.0, 10.0, 10.0))
        );
    }

    #[test]
    fn pixel_rect_edges() {
        let rect = PixelRect::new(3, 4, 5, 6);
        assert_eq!((rect.right(), rect.bottom()), (8, 10));
        assert!(rect.fits_within((8, 10)));
        assert!(!rect.fits_within((7, 10)));
        assert!(PixelRect::new(0, 0, 0, 3).is_empty());
    }
}
