use std::path::Path;

use image::{Rgba, RgbaImage};

/// Off-screen RGBA8 paint target owned by a panel.
///
/// Rows are tightly packed, so [`stride`](Self::stride) is always
/// `width * 4`. The panel only ever reads the raw bytes back out for upload;
/// everything else is up to whoever paints it.
#[derive(Debug, Clone)]
pub struct PixelSurface {
    image: RgbaImage,
}

impl PixelSurface {
    /// Fully transparent surface.
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            image: RgbaImage::new(width, height),
        }
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    /// Distance in bytes between the starts of two rows.
    pub fn stride(&self) -> usize {
        self.image.width() as usize * 4
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.image.as_raw()
    }

    pub fn pixel(&self, x: u32, y: u32) -> Option<Rgba<u8>> {
        self.image.get_pixel_checked(x, y).copied()
    }

    pub fn clear(&mut self, color: Rgba<u8>) {
        for pixel in self.image.pixels_mut() {
            *pixel = color;
        }
    }

    /// Fills the rectangle, clipped to the surface bounds.
    pub fn fill_rect(&mut self, x: i64, y: i64, width: u32, height: u32, color: Rgba<u8>) {
        let x0 = x.max(0);
        let y0 = y.max(0);
        let x1 = (x + i64::from(width)).min(i64::from(self.width()));
        let y1 = (y + i64::from(height)).min(i64::from(self.height()));
        for py in y0..y1 {
            for px in x0..x1 {
                self.image.put_pixel(px as u32, py as u32, color);
            }
        }
    }

    /// Draws a `thickness`-pixel outline inside the rectangle.
    pub fn stroke_rect(
        &mut self,
        x: i64,
        y: i64,
        width: u32,
        height: u32,
        thickness: u32,
        color: Rgba<u8>,
    ) {
        let t = thickness.min(width).min(height);
        let (w, h) = (i64::from(width), i64::from(height));
        let ti = i64::from(t);
        self.fill_rect(x, y, width, t, color);
        self.fill_rect(x, y + h - ti, width, t, color);
        self.fill_rect(x, y, t, height, color);
        self.fill_rect(x + w - ti, y, t, height, color);
    }

    /// Direct access for painters that need more than rectangles.
    pub fn image_mut(&mut self) -> &mut RgbaImage {
        &mut self.image
    }

    pub fn save_png(&self, path: &Path) -> image::ImageResult<()> {
        self.image.save_with_format(path, image::ImageFormat::Png)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RED: Rgba<u8> = Rgba([255, 0, 0, 255]);

    #[test]
    fn new_surface_is_transparent_and_tight() {
        let surface = PixelSurface::new(3, 2);
        assert_eq!(surface.stride(), 12);
        assert_eq!(surface.as_bytes().len(), 24);
        assert!(surface.as_bytes().iter().all(|byte| *byte == 0));
    }

    #[test]
    fn fill_rect_clips_to_bounds() {
        let mut surface = PixelSurface::new(4, 4);
        surface.fill_rect(-2, 2, 4, 10, RED);
        assert_eq!(surface.pixel(0, 2), Some(RED));
        assert_eq!(surface.pixel(1, 3), Some(RED));
        assert_eq!(surface.pixel(2, 3), Some(Rgba([0, 0, 0, 0])));
        assert_eq!(surface.pixel(0, 1), Some(Rgba([0, 0, 0, 0])));
    }

    #[test]
    fn stroke_leaves_interior_untouched() {
        let mut surface = PixelSurface::new(5, 5);
        surface.stroke_rect(0, 0, 5, 5, 1, RED);
        assert_eq!(surface.pixel(0, 0), Some(RED));
        assert_eq!(surface.pixel(4, 4), Some(RED));
        assert_eq!(surface.pixel(2, 2), Some(Rgba([0, 0, 0, 0])));
    }

    #[test]
    fn raw_bytes_are_rgba_order() {
        let mut surface = PixelSurface::new(1, 1);
        surface.clear(Rgba([1, 2, 3, 4]));
        assert_eq!(surface.as_bytes(), &[1, 2, 3, 4]);
    }

    #[test]
    fn png_dump_reloads_with_same_pixels() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("surface.png");
        let mut surface = PixelSurface::new(2, 2);
        surface.fill_rect(1, 0, 1, 2, RED);
        surface.save_png(&path).unwrap();

        let reloaded = image::open(&path).unwrap().to_rgba8();
        assert_eq!(reloaded.dimensions(), (2, 2));
        assert_eq!(*reloaded.get_pixel(1, 1), RED);
        assert_eq!(*reloaded.get_pixel(0, 0), Rgba([0, 0, 0, 0]));
    }
}
