//! End-to-end orchestration of a photon-mapping render.
//!
//! The calling thread emits photons and collects hits while the workers
//! trace. Once the photon queue drains, the collected hits are indexed and
//! every worker writes its share of the image.

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use flux_core::{ConfigError, Photon, PhotonHit, PipelineConfig, Scene};
use log::{debug, info};
use rand::rngs::StdRng;
use rand::SeedableRng;
use thiserror::Error;

use crate::framebuffer::{ImageBuffer, ImageError};
use crate::gather::HitCollector;
use crate::queue::WorkQueue;
use crate::sensor::SensorGrid;
use crate::volume::RenderScene;
use crate::worker::{Worker, WorkerError, WorkerSettings, WorkerState};

/// Errors that can occur while setting up or running a render.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Worker error: {0}")]
    Worker(#[from] WorkerError),

    #[error("Image error: {0}")]
    Image(#[from] ImageError),

    #[error("Scene has no lights")]
    NoLights,

    #[error("Scene has no camera")]
    NoCamera,

    #[error("All workers exited before the render finished")]
    WorkersExited,
}

pub type PipelineResult<T> = Result<T, PipelineError>;

/// Counters and timings from one render.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RenderStats {
    /// Photons emitted directly by lights (bounces not counted)
    pub photons_emitted: usize,
    /// Hits stored in the gather index
    pub hits_recorded: usize,
    pub lit_pixels: usize,
    pub transport_time: Duration,
    pub write_time: Duration,
}

/// A configured render, ready to [`run`](PhotonPipeline::run).
pub struct PhotonPipeline {
    config: PipelineConfig,
    scene: Arc<RenderScene>,
    photons: Arc<WorkQueue<Photon>>,
    hits: Arc<WorkQueue<PhotonHit>>,
    image: Arc<ImageBuffer>,
    workers: Vec<Worker>,
}

impl PhotonPipeline {
    /// Prepare queues, sensors, the output image and one worker per thread.
    pub fn new(config: PipelineConfig, scene: &Scene) -> PipelineResult<Self> {
        config.validate()?;
        let camera = scene.camera.ok_or(PipelineError::NoCamera)?;

        let render_scene = Arc::new(RenderScene::from_scene(scene, config.page_size));
        if render_scene.emitters().is_empty() {
            return Err(PipelineError::NoLights);
        }

        let sensors = Arc::new(SensorGrid::from_config(&camera, &config));
        let photons = Arc::new(WorkQueue::new(config.photon_queue_capacity));
        let hits = Arc::new(WorkQueue::new(config.hit_queue_capacity));
        let image = Arc::new(ImageBuffer::new(config.image_width, config.image_height));

        let settings = WorkerSettings::from_config(&config);
        let workers = sensors
            .partition(config.worker_count)
            .into_iter()
            .enumerate()
            .map(|(id, pixels)| {
                Worker::new(id, settings)
                    .with_photon_queue(Arc::clone(&photons))
                    .with_hit_queue(Arc::clone(&hits))
                    .with_scene(Arc::clone(&render_scene))
                    .with_sensors(Arc::clone(&sensors))
                    .with_image(Arc::clone(&image))
                    .with_pixel_range(pixels)
            })
            .collect();

        Ok(Self {
            config,
            scene: render_scene,
            photons,
            hits,
            image,
            workers,
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    /// Render the image. Workers are stopped before this returns.
    pub fn run(mut self) -> PipelineResult<(Arc<ImageBuffer>, RenderStats)> {
        let result = self.render();
        for worker in &mut self.workers {
            worker.stop();
        }
        let stats = result?;
        Ok((Arc::clone(&self.image), stats))
    }

    fn render(&mut self) -> PipelineResult<RenderStats> {
        let mut stats = RenderStats::default();
        let idle_wait = Duration::from_millis(self.config.idle_wait_ms);

        for worker in &mut self.workers {
            worker.start()?;
        }
        info!("Started {} workers", self.workers.len());

        // Transport
        let started = Instant::now();
        let mut collector = HitCollector::new(&self.config);
        let mut drained = Vec::new();
        stats.photons_emitted = self.emit_all(&mut collector, &mut drained)?;

        while self.photons.allocated() > 0 || self.hits.allocated() > 0 {
            if self.drain_hits(&mut collector, &mut drained) == 0 {
                self.check_workers()?;
                thread::sleep(idle_wait);
            }
        }
        stats.transport_time = started.elapsed();
        info!(
            "Transport finished: {} hits from {} photons in {:.2?}",
            collector.len(),
            stats.photons_emitted,
            stats.transport_time
        );

        // Write
        let started = Instant::now();
        let index = collector.finish();
        stats.hits_recorded = index.hit_count();
        for worker in &self.workers {
            worker.request_write(Some(Arc::clone(&index)))?;
        }
        while !self.workers.iter().all(Worker::is_write_complete) {
            self.check_workers()?;
            thread::sleep(idle_wait);
        }
        stats.write_time = started.elapsed();
        stats.lit_pixels = self.image.lit_pixel_count();
        info!(
            "Wrote {}x{} image ({} lit pixels) in {:.2?}",
            self.image.width(),
            self.image.height(),
            stats.lit_pixels,
            stats.write_time
        );

        Ok(stats)
    }

    /// Emit every light's share of the photon budget. Returns the total.
    fn emit_all(
        &self,
        collector: &mut HitCollector,
        drained: &mut Vec<PhotonHit>,
    ) -> PipelineResult<usize> {
        let idle_wait = Duration::from_millis(self.config.idle_wait_ms);
        let mut rng = StdRng::seed_from_u64(self.config.seed);
        let budgets = self.photon_budgets();
        info!(
            "Emitting {} photons from {} lights",
            self.config.photon_count,
            budgets.len()
        );

        let mut emitted = 0;
        for (emitter, &budget) in self.scene.emitters().iter().zip(&budgets) {
            let mut remaining = budget;
            while remaining > 0 {
                let batch = remaining.min(self.config.emission_batch);
                let mut claim = self.photons.initialize(batch);
                let claimed = claim.len();
                if claimed > 0 {
                    emitter.emit(&mut claim, budget, &mut rng);
                }
                self.photons.ready(claim);

                remaining -= claimed;
                emitted += claimed;
                if self.drain_hits(collector, drained) == 0 && claimed == 0 {
                    // Photon queue full and no hits waiting
                    self.check_workers()?;
                    thread::sleep(idle_wait);
                }
            }
            debug!("Emitter at {:?} sent {} photons", emitter.position(), budget);
        }
        Ok(emitted)
    }

    /// Split `photon_count` across emitters in proportion to their power.
    fn photon_budgets(&self) -> Vec<usize> {
        let emitters = self.scene.emitters();
        let count = self.config.photon_count;
        let total = self.scene.total_power();

        let weights: Vec<f64> = if total > 0.0 {
            emitters.iter().map(|e| e.power().max(0.0) as f64).collect()
        } else {
            vec![1.0; emitters.len()]
        };
        let sum: f64 = weights.iter().sum();

        // Rounding on the running total keeps the budgets summing to `count`
        let mut budgets = Vec::with_capacity(weights.len());
        let mut cumulative = 0.0;
        let mut assigned = 0;
        for weight in weights {
            cumulative += weight;
            let target = (count as f64 * cumulative / sum).round() as usize;
            let target = target.clamp(assigned, count);
            budgets.push(target - assigned);
            assigned = target;
        }
        budgets
    }

    fn drain_hits(&self, collector: &mut HitCollector, drained: &mut Vec<PhotonHit>) -> usize {
        drained.clear();
        let taken = self.hits.drain_into(drained, self.config.hit_queue_capacity);
        collector.extend(drained.drain(..));
        taken
    }

    fn check_workers(&self) -> PipelineResult<()> {
        if self.workers.iter().all(|w| w.state() == WorkerState::Stopped) {
            return Err(PipelineError::WorkersExited);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flux_core::{Camera, Color, HitIndexKind, Light, Material, Mesh, ObjectKind, Transform};
    use flux_math::Vec3;

    fn init_logger() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    fn floor_scene(lights: &[f32]) -> Scene {
        let mut scene = Scene::new("floor");
        let grey = scene.add_material(Material::new("grey", Color::splat(0.6)));
        scene
            .add_object(
                "floor",
                ObjectKind::Mesh {
                    mesh: Arc::new(Mesh::quad()),
                    material: grey,
                },
                Transform::default().with_scale(Vec3::splat(10.0)),
                None,
            )
            .unwrap();
        for (i, &power) in lights.iter().enumerate() {
            scene
                .add_object(
                    format!("light{i}"),
                    ObjectKind::Light(Light::point(Color::ONE, power)),
                    Transform::from_translation(Vec3::new(i as f32, 2.0, 0.0)),
                    None,
                )
                .unwrap();
        }
        scene.camera = Some(Camera::new(
            Vec3::new(0.0, 5.0, 0.0),
            Vec3::ZERO,
            Vec3::NEG_Z,
            60.0,
        ));
        scene
    }

    fn small_config() -> PipelineConfig {
        PipelineConfig {
            worker_count: 2,
            photon_count: 2000,
            photon_queue_capacity: 256,
            hit_queue_capacity: 128,
            fetch_batch: 32,
            emission_batch: 64,
            image_width: 16,
            image_height: 12,
            ..Default::default()
        }
    }

    #[test]
    fn test_small_scene_renders_lit_pixels() {
        init_logger();
        let pipeline = PhotonPipeline::new(small_config(), &floor_scene(&[2000.0])).unwrap();
        assert_eq!(pipeline.worker_count(), 2);

        let (image, stats) = pipeline.run().unwrap();

        assert_eq!(stats.photons_emitted, 2000);
        // Roughly half the photons head down onto the floor
        assert!(stats.hits_recorded > 500);
        assert!(stats.lit_pixels > 0);
        assert_eq!(stats.lit_pixels, image.lit_pixel_count());
        assert_eq!((image.width(), image.height()), (16, 12));
    }

    #[test]
    fn test_incremental_index_renders() {
        init_logger();
        let config = PipelineConfig {
            hit_index: HitIndexKind::Incremental,
            worker_count: 3,
            ..small_config()
        };
        let (_, stats) = PhotonPipeline::new(config, &floor_scene(&[2000.0]))
            .unwrap()
            .run()
            .unwrap();

        assert!(stats.hits_recorded > 500);
        assert!(stats.lit_pixels > 0);
    }

    #[test]
    fn test_budgets_follow_power() {
        let config = PipelineConfig {
            photon_count: 1000,
            ..small_config()
        };
        let pipeline = PhotonPipeline::new(config, &floor_scene(&[1.0, 3.0, 0.0])).unwrap();

        let budgets = pipeline.photon_budgets();
        assert_eq!(budgets, vec![250, 750, 0]);
        assert_eq!(budgets.iter().sum::<usize>(), 1000);
    }

    #[test]
    fn test_zero_photons_renders_black() {
        let config = PipelineConfig {
            photon_count: 0,
            ..small_config()
        };
        let (image, stats) = PhotonPipeline::new(config, &floor_scene(&[1.0]))
            .unwrap()
            .run()
            .unwrap();

        assert_eq!(stats.photons_emitted, 0);
        assert_eq!(stats.hits_recorded, 0);
        assert_eq!(image.lit_pixel_count(), 0);
    }

    #[test]
    fn test_setup_errors() {
        let no_lights = floor_scene(&[]);
        assert!(matches!(
            PhotonPipeline::new(small_config(), &no_lights),
            Err(PipelineError::NoLights)
        ));

        let mut no_camera = floor_scene(&[1.0]);
        no_camera.camera = None;
        assert!(matches!(
            PhotonPipeline::new(small_config(), &no_camera),
            Err(PipelineError::NoCamera)
        ));

        let bad = PipelineConfig {
            worker_count: 0,
            ..small_config()
        };
        assert!(matches!(
            PhotonPipeline::new(bad, &floor_scene(&[1.0])),
            Err(PipelineError::Config(_))
        ));
    }
}
