use std::ops::Range;

use rayon::prelude::*;

use crate::error::{Result, StitchError};
use crate::video::types::Frame;

pub const BLACK: [u8; 3] = [0, 0, 0];
pub const WHITE: [u8; 3] = [255, 255, 255];

/// Fixed-size RGB drawing surface shared by every composited frame
///
/// All draws use straight alpha compositing: `dst = src * a + dst * (1 - a)`.
/// An opacity of 0 leaves the surface untouched and an opacity of 1 copies
/// the source exactly, so blends at the ends of a transition are
/// pixel-identical to their sources.
pub struct Surface {
    frame: Frame,
}

impl Surface {
    pub fn new(width: u32, height: u32) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(StitchError::surface(format!(
                "invalid output dimensions {}x{}",
                width, height
            )));
        }

        let bytes = (width as usize)
            .checked_mul(height as usize)
            .and_then(|px| px.checked_mul(3))
            .ok_or_else(|| StitchError::surface(format!("{}x{} surface is too large", width, height)))?;

        let frame = Frame::from_rgb_bytes(width, height, vec![0; bytes])
            .ok_or_else(|| StitchError::surface("failed to allocate surface buffer"))?;

        Ok(Self { frame })
    }

    pub fn width(&self) -> u32 {
        self.frame.width()
    }

    pub fn height(&self) -> u32 {
        self.frame.height()
    }

    pub fn as_frame(&self) -> &Frame {
        &self.frame
    }

    /// Copy of the current surface content, handed to the capture pipeline
    pub fn snapshot(&self) -> Frame {
        self.frame.clone()
    }

    /// Draw a frame over the whole surface, scaling it first if needed
    pub fn draw_fitted(&mut self, frame: &Frame) -> Result<()> {
        let fitted = frame.fitted(self.width(), self.height());
        self.draw(&fitted, 0, 1.0)
    }

    /// Draw a surface-sized frame shifted horizontally by `offset_x` pixels
    pub fn draw(&mut self, frame: &Frame, offset_x: i64, opacity: f32) -> Result<()> {
        let width = self.width() as i64;
        self.ensure_fits(frame)?;

        let start = offset_x.clamp(0, width) as u32;
        let end = (offset_x + width).clamp(0, width) as u32;
        self.composite(start..end, opacity, |row, x| {
            let sx = (x as i64 - offset_x) as usize;
            let i = (row * width as usize + sx) * 3;
            let raw = frame.as_raw();
            [raw[i], raw[i + 1], raw[i + 2]]
        });
        Ok(())
    }

    /// Draw a surface-sized frame, only inside the columns of `clip`
    pub fn draw_clipped(&mut self, frame: &Frame, clip: Range<u32>, opacity: f32) -> Result<()> {
        self.ensure_fits(frame)?;

        let width = self.width() as usize;
        let clip = clip.start.min(self.width())..clip.end.min(self.width());
        self.composite(clip, opacity, |row, x| {
            let i = (row * width + x as usize) * 3;
            let raw = frame.as_raw();
            [raw[i], raw[i + 1], raw[i + 2]]
        });
        Ok(())
    }

    /// Fill the whole surface with a solid color
    pub fn fill(&mut self, color: [u8; 3], opacity: f32) {
        let width = self.width();
        self.composite(0..width, opacity, |_, _| color);
    }

    fn ensure_fits(&self, frame: &Frame) -> Result<()> {
        if frame.dimensions() != self.frame.dimensions() {
            return Err(StitchError::surface(format!(
                "frame is {}x{} but the surface is {}x{}",
                frame.width(),
                frame.height(),
                self.width(),
                self.height()
            )));
        }
        Ok(())
    }

    fn composite<F>(&mut self, columns: Range<u32>, opacity: f32, source: F)
    where
        F: Fn(usize, u32) -> [u8; 3] + Sync,
    {
        let alpha = if opacity.is_nan() { 0.0 } else { opacity.clamp(0.0, 1.0) };
        if alpha <= 0.0 || columns.is_empty() {
            return;
        }

        let row_bytes = self.width() as usize * 3;
        self.frame
            .as_raw_mut()
            .par_chunks_mut(row_bytes)
            .enumerate()
            .for_each(|(row, pixels)| {
                for x in columns.clone() {
                    let src = source(row, x);
                    let i = x as usize * 3;
                    if alpha >= 1.0 {
                        pixels[i..i + 3].copy_from_slice(&src);
                    } else {
                        for c in 0..3 {
                            pixels[i + c] = mix(pixels[i + c], src[c], alpha);
                        }
                    }
                }
            });
    }
}

#[inline]
fn mix(dst: u8, src: u8, alpha: f32) -> u8 {
    (src as f32 * alpha + dst as f32 * (1.0 - alpha))
        .round()
        .clamp(0.0, 255.0) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_sized_surface_is_rejected() {
        assert!(matches!(
            Surface::new(0, 10),
            Err(StitchError::CompositeSurface { .. })
        ));
    }

    #[test]
    fn test_draw_with_offset_only_covers_overlap() {
        let mut surface = Surface::new(4, 2).unwrap();
        let red = Frame::new_filled(4, 2, [255, 0, 0]);

        surface.draw(&red, 2, 1.0).unwrap();

        assert_eq!(surface.as_frame().get_pixel(1, 0), BLACK);
        assert_eq!(surface.as_frame().get_pixel(2, 0), [255, 0, 0]);
        assert_eq!(surface.as_frame().get_pixel(3, 1), [255, 0, 0]);
    }

    #[test]
    fn test_negative_offset_shifts_content_left() {
        let mut surface = Surface::new(4, 1).unwrap();
        let mut gradient = Frame::new_black(4, 1);
        for x in 0..4 {
            gradient.set_pixel(x, 0, [x as u8 * 10, 0, 0]);
        }

        surface.draw(&gradient, -1, 1.0).unwrap();

        assert_eq!(surface.as_frame().get_pixel(0, 0), [10, 0, 0]);
        assert_eq!(surface.as_frame().get_pixel(2, 0), [30, 0, 0]);
        assert_eq!(surface.as_frame().get_pixel(3, 0), BLACK);
    }

    #[test]
    fn test_half_opacity_fill_mixes() {
        let mut surface = Surface::new(2, 2).unwrap();
        surface.fill(WHITE, 0.5);
        assert!(surface.as_frame().is_uniform([128, 128, 128]));
    }

    #[test]
    fn test_zero_opacity_is_a_no_op() {
        let mut surface = Surface::new(2, 2).unwrap();
        surface.fill([9, 9, 9], 1.0);
        surface.fill(WHITE, 0.0);
        assert!(surface.as_frame().is_uniform([9, 9, 9]));
    }

    #[test]
    fn test_mismatched_frame_is_rejected() {
        let mut surface = Surface::new(4, 4).unwrap();
        let small = Frame::new_black(2, 2);
        assert!(surface.draw(&small, 0, 1.0).is_err());
        assert!(surface.draw_fitted(&small).is_ok());
    }

    #[test]
    fn test_clipped_draw_respects_columns() {
        let mut surface = Surface::new(4, 1).unwrap();
        let green = Frame::new_filled(4, 1, [0, 255, 0]);

        surface.draw_clipped(&green, 1..3, 1.0).unwrap();

        assert_eq!(surface.as_frame().get_pixel(0, 0), BLACK);
        assert_eq!(surface.as_frame().get_pixel(1, 0), [0, 255, 0]);
        assert_eq!(surface.as_frame().get_pixel(2, 0), [0, 255, 0]);
        assert_eq!(surface.as_frame().get_pixel(3, 0), BLACK);
    }
}
