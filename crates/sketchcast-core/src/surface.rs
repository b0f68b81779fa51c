//! Raster drawing surface.
//!
//! A fixed-size RGBA8 pixel buffer with straight (non-premultiplied) alpha.
//! Strokes are rasterized one segment at a time with round caps and a
//! one-pixel antialiased edge.

use crate::color::PenColor;
use kurbo::{Point, Rect};
use serde::{Deserialize, Serialize};

/// Default surface width in pixels.
pub const SURFACE_WIDTH: u32 = 600;
/// Default surface height in pixels.
pub const SURFACE_HEIGHT: u32 = 600;

/// How stroke pixels combine with what is already on the surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum Composite {
    /// Paint over existing pixels.
    #[default]
    SourceOver,
    /// Remove existing pixels where the stroke covers them (erase to transparency).
    DestinationOut,
}

/// Paint parameters fixed for the duration of one stroke.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StrokeStyle {
    pub color: PenColor,
    pub width: f64,
    pub composite: Composite,
}

impl Default for StrokeStyle {
    fn default() -> Self {
        Self {
            color: PenColor::BLACK,
            width: 5.0,
            composite: Composite::SourceOver,
        }
    }
}

/// A decoded image ready to be drawn onto a surface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RasterImage {
    pub width: u32,
    pub height: u32,
    /// RGBA8 rows, top to bottom, straight alpha.
    pub pixels: Vec<u8>,
}

impl RasterImage {
    /// Create a fully transparent image.
    pub fn blank(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            pixels: vec![0; width as usize * height as usize * 4],
        }
    }

    /// Pixel at `(x, y)`, or `None` when out of bounds.
    pub fn pixel(&self, x: u32, y: u32) -> Option<PenColor> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let i = (y as usize * self.width as usize + x as usize) * 4;
        Some(PenColor::new(
            self.pixels[i],
            self.pixels[i + 1],
            self.pixels[i + 2],
            self.pixels[i + 3],
        ))
    }
}

/// A mutable 2D pixel buffer that strokes can be rasterized onto.
pub trait RasterSurface {
    /// Width in pixels.
    fn width(&self) -> u32;

    /// Height in pixels.
    fn height(&self) -> u32;

    /// RGBA8 contents, row-major, straight alpha.
    fn pixels(&self) -> &[u8];

    /// Rasterize one round-capped line segment.
    fn stroke_segment(&mut self, from: Point, to: Point, style: &StrokeStyle);

    /// Make every pixel transparent.
    fn clear(&mut self);

    /// Replace the whole surface with `image`, anchored at the top-left corner.
    ///
    /// Areas the image does not cover become transparent; image content past
    /// the surface bounds is cropped.
    fn replace(&mut self, image: &RasterImage);

    /// Pixel at `(x, y)`, or `None` when out of bounds.
    fn pixel(&self, x: u32, y: u32) -> Option<PenColor> {
        if x >= self.width() || y >= self.height() {
            return None;
        }
        let i = (y as usize * self.width() as usize + x as usize) * 4;
        let p = self.pixels();
        Some(PenColor::new(p[i], p[i + 1], p[i + 2], p[i + 3]))
    }

    /// Check whether no pixel has any opacity.
    fn is_blank(&self) -> bool {
        self.pixels().chunks_exact(4).all(|px| px[3] == 0)
    }
}

/// In-memory software implementation of [`RasterSurface`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PixelSurface {
    width: u32,
    height: u32,
    pixels: Vec<u8>,
}

impl Default for PixelSurface {
    fn default() -> Self {
        Self::new(SURFACE_WIDTH, SURFACE_HEIGHT)
    }
}

impl PixelSurface {
    /// Create a transparent surface of the given size.
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            pixels: vec![0; width as usize * height as usize * 4],
        }
    }

    /// Copy the surface contents into a standalone image.
    pub fn to_image(&self) -> RasterImage {
        RasterImage {
            width: self.width,
            height: self.height,
            pixels: self.pixels.clone(),
        }
    }

    fn blend(&mut self, x: u32, y: u32, color: PenColor, coverage: f32, composite: Composite) {
        let i = (y as usize * self.width as usize + x as usize) * 4;
        let px = &mut self.pixels[i..i + 4];
        let dst_a = px[3] as f32 / 255.0;
        let src_a = (color.a as f32 / 255.0) * coverage;

        match composite {
            Composite::SourceOver => {
                let out_a = src_a + dst_a * (1.0 - src_a);
                if out_a <= 0.0 {
                    px.copy_from_slice(&[0, 0, 0, 0]);
                    return;
                }
                let src = [color.r, color.g, color.b];
                for c in 0..3 {
                    let s = src[c] as f32;
                    let d = px[c] as f32;
                    let v = (s * src_a + d * dst_a * (1.0 - src_a)) / out_a;
                    px[c] = v.round().clamp(0.0, 255.0) as u8;
                }
                px[3] = (out_a * 255.0).round() as u8;
            }
            Composite::DestinationOut => {
                // Only the stroke's coverage matters when erasing.
                let out_a = dst_a * (1.0 - coverage);
                let a = (out_a * 255.0).round() as u8;
                if a == 0 {
                    px.copy_from_slice(&[0, 0, 0, 0]);
                } else {
                    px[3] = a;
                }
            }
        }
    }
}

impl RasterSurface for PixelSurface {
    fn width(&self) -> u32 {
        self.width
    }

    fn height(&self) -> u32 {
        self.height
    }

    fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    fn stroke_segment(&mut self, from: Point, to: Point, style: &StrokeStyle) {
        if !(style.width.is_finite() && style.width > 0.0) || self.width == 0 || self.height == 0 {
            return;
        }
        let radius = style.width / 2.0;

        let bounds = Rect::from_points(from, to).inflate(radius + 1.0, radius + 1.0);
        let surface = Rect::new(0.0, 0.0, self.width as f64, self.height as f64);
        let clip = bounds.intersect(surface);
        if clip.width() <= 0.0 || clip.height() <= 0.0 {
            return;
        }

        let x0 = clip.x0.floor() as u32;
        let y0 = clip.y0.floor() as u32;
        let x1 = (clip.x1.ceil() as u32).min(self.width);
        let y1 = (clip.y1.ceil() as u32).min(self.height);

        for y in y0..y1 {
            for x in x0..x1 {
                let center = Point::new(x as f64 + 0.5, y as f64 + 0.5);
                let dist = distance_to_segment(center, from, to);
                let coverage = (radius + 0.5 - dist).clamp(0.0, 1.0) as f32;
                if coverage > 0.0 {
                    self.blend(x, y, style.color, coverage, style.composite);
                }
            }
        }
    }

    fn clear(&mut self) {
        self.pixels.fill(0);
    }

    fn replace(&mut self, image: &RasterImage) {
        self.pixels.fill(0);
        let w = self.width.min(image.width) as usize;
        let h = self.height.min(image.height) as usize;
        for row in 0..h {
            let dst = row * self.width as usize * 4;
            let src = row * image.width as usize * 4;
            self.pixels[dst..dst + w * 4].copy_from_slice(&image.pixels[src..src + w * 4]);
        }
    }
}

/// Euclidean distance from `p` to the segment `a..b`.
fn distance_to_segment(p: Point, a: Point, b: Point) -> f64 {
    let ab = b - a;
    let len2 = ab.hypot2();
    let t = if len2 > 0.0 {
        ((p - a).dot(ab) / len2).clamp(0.0, 1.0)
    } else {
        0.0
    };
    (p - (a + ab * t)).hypot()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pen(width: f64) -> StrokeStyle {
        StrokeStyle {
            color: PenColor::BLACK,
            width,
            composite: Composite::SourceOver,
        }
    }

    #[test]
    fn test_new_surface_is_blank() {
        let surface = PixelSurface::default();
        assert_eq!(surface.width(), SURFACE_WIDTH);
        assert_eq!(surface.height(), SURFACE_HEIGHT);
        assert!(surface.is_blank());
    }

    #[test]
    fn test_stroke_covers_segment() {
        let mut surface = PixelSurface::new(100, 100);
        surface.stroke_segment(Point::new(10.0, 10.0), Point::new(50.0, 50.0), &pen(5.0));

        assert_eq!(surface.pixel(30, 30), Some(PenColor::BLACK));
        assert_eq!(surface.pixel(10, 10), Some(PenColor::BLACK));
        // Far from the segment stays untouched.
        assert_eq!(surface.pixel(80, 20), Some(PenColor::TRANSPARENT));
        assert_eq!(surface.pixel(30, 10), Some(PenColor::TRANSPARENT));
    }

    #[test]
    fn test_zero_length_segment_draws_dot() {
        let mut surface = PixelSurface::new(20, 20);
        let p = Point::new(10.5, 10.5);
        surface.stroke_segment(p, p, &pen(4.0));
        assert_eq!(surface.pixel(10, 10), Some(PenColor::BLACK));
        assert_eq!(surface.pixel(0, 0), Some(PenColor::TRANSPARENT));
    }

    #[test]
    fn test_stroke_outside_bounds_is_clipped() {
        let mut surface = PixelSurface::new(20, 20);
        surface.stroke_segment(Point::new(-50.0, -50.0), Point::new(-30.0, -30.0), &pen(5.0));
        assert!(surface.is_blank());

        surface.stroke_segment(Point::new(-10.0, 5.5), Point::new(30.0, 5.5), &pen(3.0));
        assert_eq!(surface.pixel(0, 5), Some(PenColor::BLACK));
        assert_eq!(surface.pixel(19, 5), Some(PenColor::BLACK));
    }

    #[test]
    fn test_eraser_leaves_transparency() {
        let mut surface = PixelSurface::new(100, 100);
        surface.stroke_segment(Point::new(10.0, 10.0), Point::new(50.0, 50.0), &pen(5.0));

        let eraser = StrokeStyle {
            color: PenColor::WHITE,
            width: 20.0,
            composite: Composite::DestinationOut,
        };
        surface.stroke_segment(Point::new(20.0, 40.0), Point::new(40.0, 20.0), &eraser);

        // Transparent, not white.
        assert_eq!(surface.pixel(30, 30), Some(PenColor::TRANSPARENT));
        // Outside the eraser path the line survives.
        assert_eq!(surface.pixel(12, 12), Some(PenColor::BLACK));
    }

    #[test]
    fn test_invalid_width_is_ignored() {
        let mut surface = PixelSurface::new(20, 20);
        surface.stroke_segment(Point::new(0.0, 0.0), Point::new(19.0, 19.0), &pen(0.0));
        surface.stroke_segment(Point::new(0.0, 0.0), Point::new(19.0, 19.0), &pen(f64::NAN));
        assert!(surface.is_blank());
    }

    #[test]
    fn test_replace_overwrites_and_crops() {
        let mut surface = PixelSurface::new(4, 4);
        surface.stroke_segment(Point::new(0.0, 3.5), Point::new(4.0, 3.5), &pen(1.0));

        let mut image = RasterImage::blank(2, 2);
        image.pixels[0..4].copy_from_slice(&[255, 0, 0, 255]);
        surface.replace(&image);

        assert_eq!(surface.pixel(0, 0), Some(PenColor::rgb(255, 0, 0)));
        // Previous stroke is gone.
        assert_eq!(surface.pixel(1, 3), Some(PenColor::TRANSPARENT));

        let large = RasterImage {
            width: 8,
            height: 8,
            pixels: [0u8, 0, 255, 255].repeat(64),
        };
        surface.replace(&large);
        assert_eq!(surface.pixel(3, 3), Some(PenColor::rgb(0, 0, 255)));
    }

    #[test]
    fn test_clear() {
        let mut surface = PixelSurface::new(10, 10);
        surface.stroke_segment(Point::new(0.0, 0.0), Point::new(9.0, 9.0), &pen(3.0));
        assert!(!surface.is_blank());
        surface.clear();
        assert!(surface.is_blank());
    }
}
