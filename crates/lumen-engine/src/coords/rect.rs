use super::Extent;

/// Scissor rectangle in physical pixels.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct ScissorRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl ScissorRect {
    #[inline]
    pub const fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self { x, y, width, height }
    }

    #[inline]
    pub fn covering(size: Extent) -> Self {
        Self::new(0, 0, size.width, size.height)
    }

    #[inline]
    pub fn is_empty(self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Clamps the rect to `bounds`. Rects fully outside collapse to zero area.
    pub fn clamped_to(self, bounds: Extent) -> Self {
        let x = self.x.min(bounds.width);
        let y = self.y.min(bounds.height);
        let x2 = self.x.saturating_add(self.width).min(bounds.width);
        let y2 = self.y.saturating_add(self.height).min(bounds.height);
        Self::new(x, y, x2 - x, y2 - y)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn r(x: u32, y: u32, w: u32, h: u32) -> ScissorRect {
        ScissorRect::new(x, y, w, h)
    }

    // ── covering ──────────────────────────────────────────────────────────

    #[test]
    fn covering_matches_extent() {
        assert_eq!(ScissorRect::covering(Extent::new(640, 480)), r(0, 0, 640, 480));
    }

    // ── clamped_to ────────────────────────────────────────────────────────

    #[test]
    fn clamp_inside_is_identity() {
        let rect = r(10, 10, 20, 20);
        assert_eq!(rect.clamped_to(Extent::new(100, 100)), rect);
    }

    #[test]
    fn clamp_trims_overhang() {
        let rect = r(90, 90, 20, 20);
        assert_eq!(rect.clamped_to(Extent::new(100, 100)), r(90, 90, 10, 10));
    }

    #[test]
    fn clamp_outside_is_empty() {
        let rect = r(200, 5, 10, 10);
        assert!(rect.clamped_to(Extent::new(100, 100)).is_empty());
    }

    #[test]
    fn clamp_does_not_overflow() {
        let rect = r(u32::MAX - 1, 0, u32::MAX, 4);
        assert_eq!(rect.clamped_to(Extent::new(8, 8)), r(8, 0, 0, 4));
    }
}
