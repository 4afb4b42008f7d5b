//! Shared output image.
//!
//! Workers write disjoint pixel ranges concurrently, so each pixel is a
//! single `AtomicU32` holding packed RGBA8 and no lock is needed.

use std::path::Path;
use std::sync::atomic::{AtomicU32, Ordering};

use bytemuck::{Pod, Zeroable};
use flux_core::Color;
use log::info;
use thiserror::Error;

/// Errors that can occur while writing an image.
#[derive(Error, Debug)]
pub enum ImageError {
    #[error("Image encoding error: {0}")]
    Encode(#[from] image::ImageError),

    #[error("Pixel buffer does not match {width}x{height}")]
    Size { width: u32, height: u32 },
}

pub type ImageResult<T> = Result<T, ImageError>;

/// An 8-bit RGBA pixel.
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct Rgba8 {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Rgba8 {
    pub const BLACK: Rgba8 = Rgba8 {
        r: 0,
        g: 0,
        b: 0,
        a: 255,
    };

    pub fn new(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    /// True if any color channel is non-zero.
    pub fn is_lit(&self) -> bool {
        self.r > 0 || self.g > 0 || self.b > 0
    }
}

/// Apply gamma correction (gamma = 2.0).
#[inline]
fn linear_to_gamma(linear: f32) -> f32 {
    if linear > 0.0 {
        linear.sqrt()
    } else {
        0.0
    }
}

/// Convert a linear color to a clamped, gamma-corrected 8-bit pixel.
pub fn color_to_rgba(color: Color) -> Rgba8 {
    let channel = |c: f32| (255.0 * linear_to_gamma(c).clamp(0.0, 1.0)) as u8;
    Rgba8::new(channel(color.x), channel(color.y), channel(color.z), 255)
}

/// Fixed-size RGBA8 image that any thread can write through `&self`.
pub struct ImageBuffer {
    width: u32,
    height: u32,
    pixels: Box<[AtomicU32]>,
}

impl ImageBuffer {
    /// Create a new image filled with opaque black.
    pub fn new(width: u32, height: u32) -> Self {
        let black: u32 = bytemuck::cast(Rgba8::BLACK);
        let pixels = (0..width as usize * height as usize)
            .map(|_| AtomicU32::new(black))
            .collect();

        Self {
            width,
            height,
            pixels,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    fn offset(&self, x: u32, y: u32) -> Option<usize> {
        (x < self.width && y < self.height)
            .then(|| y as usize * self.width as usize + x as usize)
    }

    /// Set the pixel at (x, y). Coordinates outside the image are ignored.
    pub fn set_pixel(&self, x: u32, y: u32, pixel: Rgba8) {
        if let Some(offset) = self.offset(x, y) {
            self.pixels[offset].store(bytemuck::cast(pixel), Ordering::Relaxed);
        }
    }

    /// Get the pixel at (x, y).
    pub fn get_pixel(&self, x: u32, y: u32) -> Option<Rgba8> {
        self.offset(x, y)
            .map(|offset| bytemuck::cast(self.pixels[offset].load(Ordering::Relaxed)))
    }

    /// Number of pixels with any non-black channel.
    pub fn lit_pixel_count(&self) -> usize {
        self.snapshot().iter().filter(|p| p.is_lit()).count()
    }

    fn snapshot(&self) -> Vec<Rgba8> {
        self.pixels
            .iter()
            .map(|p| bytemuck::cast(p.load(Ordering::Relaxed)))
            .collect()
    }

    /// Convert to row-major RGBA bytes.
    pub fn to_rgba_bytes(&self) -> Vec<u8> {
        bytemuck::cast_slice(&self.snapshot()).to_vec()
    }

    /// Write the image as a PNG file.
    pub fn save_png(&self, path: impl AsRef<Path>) -> ImageResult<()> {
        let path = path.as_ref();
        let buffer = image::RgbaImage::from_raw(self.width, self.height, self.to_rgba_bytes())
            .ok_or(ImageError::Size {
                width: self.width,
                height: self.height,
            })?;
        buffer.save_with_format(path, image::ImageFormat::Png)?;
        info!("Wrote {}x{} image to {}", self.width, self.height, path.display());
        Ok(())
    }
}
