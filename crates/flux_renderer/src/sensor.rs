//! Pixel sensors generated from a pinhole camera.
//!
//! Every pixel gets a frustum from the eye through the pixel's corners on
//! a viewport one unit in front of the camera. Widening the footprint
//! grows the pixel rectangle about its center so neighboring sensors
//! overlap and gather more hits.

use std::ops::Range;

use flux_core::{Camera, PipelineConfig};
use flux_math::{Frustum, Vec3};

/// The view of the scene through a single output pixel.
#[derive(Debug, Clone, Copy)]
pub struct PixelSensor {
    pub x: u32,
    pub y: u32,
    pub frustum: Frustum,
    /// Unit direction from the eye through the pixel center
    pub direction: Vec3,
}

/// One sensor per pixel, stored row-major.
pub struct SensorGrid {
    width: u32,
    height: u32,
    sensors: Vec<PixelSensor>,
}

impl SensorGrid {
    /// Build the sensors for a `width` x `height` image.
    ///
    /// `footprint` scales each pixel rectangle (1.0 = exact pixel) and
    /// `far` is the depth at which every frustum is capped.
    pub fn new(camera: &Camera, width: u32, height: u32, footprint: f32, far: f32) -> Self {
        let center = camera.look_from;

        let theta = camera.vfov.to_radians();
        let h = (theta / 2.0).tan();
        let viewport_height = 2.0 * h;
        let viewport_width = viewport_height * (width as f32 / height.max(1) as f32);

        // Camera basis
        let w = (camera.look_from - camera.look_at).normalize();
        let u = camera.vup.cross(w).normalize();
        let v = w.cross(u);

        let viewport_u = viewport_width * u;
        let viewport_v = -viewport_height * v;
        let pixel_delta_u = viewport_u / width.max(1) as f32;
        let pixel_delta_v = viewport_v / height.max(1) as f32;
        let viewport_upper_left = center - w - viewport_u / 2.0 - viewport_v / 2.0;

        let half_u = pixel_delta_u * (0.5 * footprint);
        let half_v = pixel_delta_v * (0.5 * footprint);

        let mut sensors = Vec::with_capacity(width as usize * height as usize);
        for y in 0..height {
            for x in 0..width {
                let pixel_center = viewport_upper_left
                    + (x as f32 + 0.5) * pixel_delta_u
                    + (y as f32 + 0.5) * pixel_delta_v;

                let corners = [
                    pixel_center - half_u - half_v,
                    pixel_center + half_u - half_v,
                    pixel_center + half_u + half_v,
                    pixel_center - half_u + half_v,
                ];

                sensors.push(PixelSensor {
                    x,
                    y,
                    frustum: Frustum::from_pyramid(center, corners, far),
                    direction: (pixel_center - center).normalize(),
                });
            }
        }

        Self {
            width,
            height,
            sensors,
        }
    }

    /// Build the sensors using the image size and gather settings of `config`.
    pub fn from_config(camera: &Camera, config: &PipelineConfig) -> Self {
        Self::new(
            camera,
            config.image_width,
            config.image_height,
            config.gather_footprint,
            config.gather_distance,
        )
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn len(&self) -> usize {
        self.sensors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sensors.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&PixelSensor> {
        self.sensors.get(index)
    }

    /// Sensors in `range`, clamped to the grid.
    pub fn range(&self, range: Range<usize>) -> &[PixelSensor] {
        let end = range.end.min(self.sensors.len());
        let start = range.start.min(end);
        &self.sensors[start..end]
    }

    pub fn iter(&self) -> impl Iterator<Item = &PixelSensor> + '_ {
        self.sensors.iter()
    }

    /// Split the grid into `parts` contiguous ranges of near-equal size.
    pub fn partition(&self, parts: usize) -> Vec<Range<usize>> {
        let parts = parts.max(1);
        let total = self.sensors.len();
        (0..parts)
            .map(|i| (total * i / parts)..(total * (i + 1) / parts))
            .collect()
    }
}
