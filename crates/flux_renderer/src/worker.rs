//! Photon transport worker threads.
//!
//! A worker runs a polling loop on its own named thread. While running it
//! fetches photons from the shared photon queue, traces each one against
//! the scene, pushes the resulting hits to the hit queue and re-queues any
//! photon that bounces. When handed a finalized hit index it switches to
//! the write phase and fills its range of pixels in the shared image.
//!
//! ```text
//!   Idle --start--> Running <--suspend/resume--> Suspended
//!                    |    ^
//!      request_write |    | range written
//!                    v    |
//!                   Writing
//!   Running --stop--> Stopped
//! ```

use std::ops::Range;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use flux_core::{Photon, PhotonHit, PipelineConfig};
use log::{debug, error, warn};
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use thiserror::Error;

use crate::bounce::bounce;
use crate::framebuffer::{color_to_rgba, ImageBuffer};
use crate::gather::{gather_radiance, HitIndex};
use crate::queue::WorkQueue;
use crate::sensor::SensorGrid;
use crate::volume::RenderScene;

/// Errors reported by worker controls.
#[derive(Error, Debug)]
pub enum WorkerError {
    #[error("Worker {worker} has no {what}")]
    MissingCollaborator { worker: usize, what: &'static str },

    #[error("Write request for worker {0} has no hit index")]
    MissingHitIndex(usize),

    #[error("Worker {0} is not running")]
    NotRunning(usize),

    #[error("Failed to spawn worker thread: {0}")]
    ThreadSpawn(#[from] std::io::Error),
}

pub type WorkerResult<T> = Result<T, WorkerError>;

/// Observable lifecycle state of a worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    /// Not started yet
    Idle,
    Running,
    Suspended,
    /// Writing its pixel range from a hit index
    Writing,
    /// Stopped externally or exited after an error
    Stopped,
}

/// Per-worker tuning taken from the pipeline configuration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WorkerSettings {
    pub fetch_batch: usize,
    pub max_bounces: u32,
    pub exposure: f32,
    pub idle_wait: Duration,
    pub seed: u64,
}

impl WorkerSettings {
    pub fn from_config(config: &PipelineConfig) -> Self {
        Self {
            fetch_batch: config.fetch_batch,
            max_bounces: config.max_bounces,
            exposure: config.exposure,
            idle_wait: Duration::from_millis(config.idle_wait_ms),
            seed: config.seed,
        }
    }
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self::from_config(&PipelineConfig::default())
    }
}

/// Flags shared between the controlling thread and the worker thread.
#[derive(Default)]
struct Control {
    started: AtomicBool,
    running: AtomicBool,
    suspended: AtomicBool,
    writing: AtomicBool,
    write_complete: AtomicBool,
    write_request: Mutex<Option<Arc<dyn HitIndex>>>,
}

impl Control {
    fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }
}

/// Shared resources a worker is wired to before it starts.
#[derive(Clone, Default)]
struct Collaborators {
    photons: Option<Arc<WorkQueue<Photon>>>,
    hits: Option<Arc<WorkQueue<PhotonHit>>>,
    scene: Option<Arc<RenderScene>>,
    sensors: Option<Arc<SensorGrid>>,
    image: Option<Arc<ImageBuffer>>,
}

impl Collaborators {
    fn resolve(
        self,
        id: usize,
        settings: WorkerSettings,
        pixels: Range<usize>,
    ) -> WorkerResult<Context> {
        let missing = |what| WorkerError::MissingCollaborator { worker: id, what };

        Ok(Context {
            id,
            settings,
            pixels,
            photons: self.photons.ok_or_else(|| missing("photon queue"))?,
            hits: self.hits.ok_or_else(|| missing("hit queue"))?,
            scene: self.scene.ok_or_else(|| missing("scene"))?,
            sensors: self.sensors.ok_or_else(|| missing("sensor grid"))?,
            image: self.image.ok_or_else(|| missing("image"))?,
        })
    }
}

/// A photon transport worker.
///
/// Configure with the `with_*` methods, then [`Worker::start`]. Dropping a
/// worker stops and joins its thread.
pub struct Worker {
    id: usize,
    settings: WorkerSettings,
    pixels: Range<usize>,
    collaborators: Collaborators,
    control: Arc<Control>,
    handle: Option<JoinHandle<()>>,
}

impl Worker {
    pub fn new(id: usize, settings: WorkerSettings) -> Self {
        Self {
            id,
            settings,
            pixels: 0..0,
            collaborators: Collaborators::default(),
            control: Arc::new(Control::default()),
            handle: None,
        }
    }

    pub fn with_photon_queue(mut self, queue: Arc<WorkQueue<Photon>>) -> Self {
        self.collaborators.photons = Some(queue);
        self
    }

    pub fn with_hit_queue(mut self, queue: Arc<WorkQueue<PhotonHit>>) -> Self {
        self.collaborators.hits = Some(queue);
        self
    }

    pub fn with_scene(mut self, scene: Arc<RenderScene>) -> Self {
        self.collaborators.scene = Some(scene);
        self
    }

    pub fn with_sensors(mut self, sensors: Arc<SensorGrid>) -> Self {
        self.collaborators.sensors = Some(sensors);
        self
    }

    pub fn with_image(mut self, image: Arc<ImageBuffer>) -> Self {
        self.collaborators.image = Some(image);
        self
    }

    /// Sensors this worker writes during the write phase.
    pub fn with_pixel_range(mut self, pixels: Range<usize>) -> Self {
        self.pixels = pixels;
        self
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub fn pixel_range(&self) -> Range<usize> {
        self.pixels.clone()
    }

    /// Spawn the worker thread. Does nothing if it is already running.
    pub fn start(&mut self) -> WorkerResult<()> {
        if self.control.is_running() {
            return Ok(());
        }
        // Reap a thread that already exited on its own
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }

        let collaborators = self.collaborators.clone();
        let control = Arc::clone(&self.control);
        let (id, settings, pixels) = (self.id, self.settings, self.pixels.clone());

        self.control.suspended.store(false, Ordering::Release);
        self.control.running.store(true, Ordering::Release);
        self.control.started.store(true, Ordering::Release);

        let spawned = thread::Builder::new()
            .name(format!("flux-worker-{id}"))
            .spawn(move || {
                match collaborators.resolve(id, settings, pixels) {
                    Ok(context) => context.run(&control),
                    Err(e) => error!("{e}; worker exiting"),
                }
                control.writing.store(false, Ordering::Release);
                control.running.store(false, Ordering::Release);
            });

        match spawned {
            Ok(handle) => {
                self.handle = Some(handle);
                debug!("Worker {} started", self.id);
                Ok(())
            }
            Err(e) => {
                self.control.running.store(false, Ordering::Release);
                Err(e.into())
            }
        }
    }

    /// Pause transport and writing until [`Worker::resume`].
    pub fn suspend(&self) {
        if self.control.is_running() {
            self.control.suspended.store(true, Ordering::Release);
            debug!("Worker {} suspended", self.id);
        }
    }

    pub fn resume(&self) {
        if self.control.suspended.swap(false, Ordering::AcqRel) {
            debug!("Worker {} resumed", self.id);
        }
    }

    /// Clear the running flag and join the thread.
    pub fn stop(&mut self) {
        self.control.running.store(false, Ordering::Release);
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                error!("Worker {} panicked", self.id);
            }
            debug!("Worker {} stopped", self.id);
        }
    }

    /// Ask the worker to write its pixel range from `index`.
    ///
    /// Completion is reported by [`Worker::is_write_complete`].
    pub fn request_write(&self, index: Option<Arc<dyn HitIndex>>) -> WorkerResult<()> {
        let Some(index) = index else {
            let err = WorkerError::MissingHitIndex(self.id);
            warn!("{err}");
            return Err(err);
        };
        if !self.control.is_running() {
            let err = WorkerError::NotRunning(self.id);
            warn!("{err}");
            return Err(err);
        }

        self.control.write_complete.store(false, Ordering::Release);
        self.control.writing.store(true, Ordering::Release);
        *self.control.write_request.lock() = Some(index);
        debug!("Worker {} write requested", self.id);
        Ok(())
    }

    /// True once the last requested write has finished.
    pub fn is_write_complete(&self) -> bool {
        self.control.write_complete.load(Ordering::Acquire)
    }

    pub fn state(&self) -> WorkerState {
        let control = &self.control;
        if !control.started.load(Ordering::Acquire) {
            WorkerState::Idle
        } else if !control.is_running() {
            WorkerState::Stopped
        } else if control.writing.load(Ordering::Acquire) {
            WorkerState::Writing
        } else if control.suspended.load(Ordering::Acquire) {
            WorkerState::Suspended
        } else {
            WorkerState::Running
        }
    }
}

impl Drop for Worker {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Reusable buffers for one transport cycle.
#[derive(Default)]
struct Scratch {
    hits: Vec<PhotonHit>,
    bounces: Vec<Photon>,
}

/// A started worker's fully resolved view of the pipeline.
struct Context {
    id: usize,
    settings: WorkerSettings,
    pixels: Range<usize>,
    photons: Arc<WorkQueue<Photon>>,
    hits: Arc<WorkQueue<PhotonHit>>,
    scene: Arc<RenderScene>,
    sensors: Arc<SensorGrid>,
    image: Arc<ImageBuffer>,
}

impl Context {
    fn run(&self, control: &Control) {
        let mut rng = StdRng::seed_from_u64(self.settings.seed.wrapping_add(self.id as u64));
        let mut scratch = Scratch::default();
        let mut traced = 0usize;

        while control.is_running() {
            if control.suspended.load(Ordering::Acquire) {
                thread::sleep(self.settings.idle_wait);
                continue;
            }

            let request = control.write_request.lock().take();
            if let Some(index) = request {
                let written = self.write_pixels(index.as_ref());
                control.writing.store(false, Ordering::Release);
                control.write_complete.store(true, Ordering::Release);
                debug!("Worker {} wrote {} pixels", self.id, written);
                continue;
            }

            match self.transport_cycle(control, &mut rng, &mut scratch) {
                0 => thread::sleep(self.settings.idle_wait),
                n => traced += n,
            }
        }

        debug!("Worker {} exiting after tracing {} photons", self.id, traced);
    }

    /// Trace one batch of photons. Returns how many were fetched.
    fn transport_cycle<R: Rng + ?Sized>(
        &self,
        control: &Control,
        rng: &mut R,
        scratch: &mut Scratch,
    ) -> usize {
        let batch = self.photons.fetch(self.settings.fetch_batch);
        if batch.is_empty() {
            return 0;
        }

        scratch.hits.clear();
        scratch.bounces.clear();
        for photon in batch.iter() {
            if let Some(hit) = self.scene.cast_ray(&photon.ray) {
                scratch.hits.push(PhotonHit::new(*photon, hit));

                let max_bounces = self.settings.max_bounces;
                if let Some(material) = self.scene.material(hit.material) {
                    scratch
                        .bounces
                        .extend(bounce(photon, &hit, material, max_bounces, rng));
                }
            }
        }

        self.push_hits(control, &scratch.hits);

        // Re-queue before releasing so the queue never looks empty while
        // bounced photons are still owed
        if !scratch.bounces.is_empty() {
            let requeued = self.photons.push_slice(&scratch.bounces);
            if requeued < scratch.bounces.len() {
                debug!(
                    "Worker {} dropped {} bounced photons: photon queue full",
                    self.id,
                    scratch.bounces.len() - requeued
                );
            }
        }

        let fetched = batch.len();
        self.photons.release(batch);
        fetched
    }

    /// Push every hit, waiting for space while the worker is running.
    fn push_hits(&self, control: &Control, hits: &[PhotonHit]) {
        let mut pending = hits;
        loop {
            let pushed = self.hits.push_slice(pending);
            pending = &pending[pushed..];
            if pending.is_empty() {
                return;
            }
            if !control.is_running() {
                warn!("Worker {} stopped with {} hits not queued", self.id, pending.len());
                return;
            }
            thread::sleep(self.settings.idle_wait);
        }
    }

    /// Gather and write every pixel in this worker's range.
    fn write_pixels(&self, index: &dyn HitIndex) -> usize {
        let sensors = self.sensors.range(self.pixels.clone());
        for sensor in sensors {
            let radiance = gather_radiance(index, sensor) * self.settings.exposure;
            self.image.set_pixel(sensor.x, sensor.y, color_to_rgba(radiance));
        }
        sensors.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gather::build_hit_index;
    use flux_core::{Camera, Color, Hit, Light, Material, Mesh, ObjectKind, Scene, Transform};
    use flux_math::{Ray, Vec3};
    use std::time::Instant;

    fn init_logger() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(10);
        while Instant::now() < deadline {
            if condition() {
                return true;
            }
            thread::sleep(Duration::from_millis(1));
        }
        false
    }

    /// A floor quad at y = 0 and a camera looking straight down at it.
    fn floor_scene(albedo: Color) -> Scene {
        let mut scene = Scene::new("floor");
        let material = scene.add_material(Material::new("floor", albedo));
        scene
            .add_object(
                "floor",
                ObjectKind::Mesh {
                    mesh: Arc::new(Mesh::quad()),
                    material,
                },
                Transform::default().with_scale(Vec3::splat(10.0)),
                None,
            )
            .unwrap();
        scene
            .add_object(
                "light",
                ObjectKind::Light(Light::point(Color::ONE, 1.0)),
                Transform::from_translation(Vec3::new(0.0, 2.0, 0.0)),
                None,
            )
            .unwrap();
        scene.camera = Some(Camera::new(
            Vec3::new(0.0, 5.0, 0.0),
            Vec3::ZERO,
            Vec3::NEG_Z,
            40.0,
        ));
        scene
    }

    fn downward_photons(count: usize) -> Vec<Photon> {
        (0..count)
            .map(|i| {
                let x = 0.05 + i as f32 * 0.01;
                Photon::new(Ray::new(Vec3::new(x, 1.0, 0.05), Vec3::NEG_Y), Color::splat(0.5))
            })
            .collect()
    }

    struct Fixture {
        photons: Arc<WorkQueue<Photon>>,
        hits: Arc<WorkQueue<PhotonHit>>,
        scene: Arc<RenderScene>,
        sensors: Arc<SensorGrid>,
        image: Arc<ImageBuffer>,
    }

    impl Fixture {
        fn new(albedo: Color) -> Self {
            let scene = floor_scene(albedo);
            let camera = scene.camera.unwrap();
            Self {
                photons: Arc::new(WorkQueue::new(64)),
                hits: Arc::new(WorkQueue::new(64)),
                scene: Arc::new(RenderScene::from_scene(&scene, 8)),
                sensors: Arc::new(SensorGrid::new(&camera, 4, 4, 1.0, 100.0)),
                image: Arc::new(ImageBuffer::new(4, 4)),
            }
        }

        fn worker(&self, id: usize, settings: WorkerSettings) -> Worker {
            Worker::new(id, settings)
                .with_photon_queue(Arc::clone(&self.photons))
                .with_hit_queue(Arc::clone(&self.hits))
                .with_scene(Arc::clone(&self.scene))
                .with_sensors(Arc::clone(&self.sensors))
                .with_image(Arc::clone(&self.image))
                .with_pixel_range(0..self.sensors.len())
        }

        fn context(&self, settings: WorkerSettings) -> Context {
            Collaborators {
                photons: Some(Arc::clone(&self.photons)),
                hits: Some(Arc::clone(&self.hits)),
                scene: Some(Arc::clone(&self.scene)),
                sensors: Some(Arc::clone(&self.sensors)),
                image: Some(Arc::clone(&self.image)),
            }
            .resolve(0, settings, 0..self.sensors.len())
            .unwrap()
        }
    }

    fn settings() -> WorkerSettings {
        WorkerSettings {
            fetch_batch: 16,
            idle_wait: Duration::from_millis(1),
            ..Default::default()
        }
    }

    #[test]
    fn test_transport_cycle_produces_hits() {
        // Black floor absorbs everything, so no bounces are queued
        let fixture = Fixture::new(Color::ZERO);
        let context = fixture.context(settings());
        let control = Control {
            running: AtomicBool::new(true),
            ..Default::default()
        };
        let mut rng = StdRng::seed_from_u64(1);
        let mut scratch = Scratch::default();

        assert_eq!(fixture.photons.push_slice(&downward_photons(20)), 20);
        assert_eq!(context.transport_cycle(&control, &mut rng, &mut scratch), 16);
        assert_eq!(context.transport_cycle(&control, &mut rng, &mut scratch), 4);
        assert_eq!(context.transport_cycle(&control, &mut rng, &mut scratch), 0);

        assert_eq!(fixture.photons.allocated(), 0);
        assert_eq!(fixture.hits.available(), 20);

        let mut hits = Vec::new();
        fixture.hits.drain_into(&mut hits, 64);
        for record in &hits {
            assert!(record.position().y.abs() < 1e-4);
            assert_eq!(record.hit.normal, Vec3::Y);
            assert!((record.hit.distance - 1.0).abs() < 1e-4);
        }
    }

    #[test]
    fn test_transport_cycle_requeues_bounces() {
        // White floor reflects every photon while under the bounce limit
        let fixture = Fixture::new(Color::ONE);
        let context = fixture.context(WorkerSettings {
            max_bounces: 1,
            ..settings()
        });
        let control = Control {
            running: AtomicBool::new(true),
            ..Default::default()
        };
        let mut rng = StdRng::seed_from_u64(2);
        let mut scratch = Scratch::default();

        fixture.photons.push_slice(&downward_photons(8));
        assert_eq!(context.transport_cycle(&control, &mut rng, &mut scratch), 8);

        // Bounced photons head away from the floor and escape
        assert_eq!(fixture.photons.available(), 8);
        let mut bounced = Vec::new();
        fixture.photons.drain_into(&mut bounced, 64);
        assert!(bounced.iter().all(|p| p.bounces == 1 && p.ray.direction.y >= 0.0));
    }

    #[test]
    fn test_write_pixels_fills_range() {
        let fixture = Fixture::new(Color::ZERO);
        let context = fixture.context(WorkerSettings {
            exposure: 1.0,
            ..settings()
        });

        let floor_hit = |x: f32, z: f32| {
            PhotonHit::new(
                Photon::new(Ray::new(Vec3::new(x, 1.0, z), Vec3::NEG_Y), Color::ONE),
                Hit {
                    position: Vec3::new(x, 0.0, z),
                    normal: Vec3::Y,
                    distance: 1.0,
                    ..Default::default()
                },
            )
        };
        let index = build_hit_index(
            vec![floor_hit(0.1, 0.1), floor_hit(-0.1, -0.1)],
            &PipelineConfig::default(),
        );

        assert_eq!(context.write_pixels(index.as_ref()), 16);
        assert_eq!(fixture.image.lit_pixel_count(), 2);
    }

    #[test]
    fn test_worker_lifecycle_and_write() {
        init_logger();
        let fixture = Fixture::new(Color::ZERO);
        let mut worker = fixture.worker(0, settings());
        assert_eq!(worker.state(), WorkerState::Idle);

        worker.start().unwrap();
        assert_eq!(worker.state(), WorkerState::Running);

        worker.suspend();
        assert_eq!(worker.state(), WorkerState::Suspended);
        thread::sleep(Duration::from_millis(5));
        fixture.photons.push_slice(&downward_photons(10));
        thread::sleep(Duration::from_millis(20));
        assert_eq!(fixture.photons.available(), 10);

        worker.resume();
        assert!(wait_until(|| fixture.photons.allocated() == 0));
        assert_eq!(fixture.hits.available(), 10);

        let mut hits = Vec::new();
        fixture.hits.drain_into(&mut hits, 64);
        let index = build_hit_index(hits, &PipelineConfig::default());

        worker.request_write(Some(index)).unwrap();
        assert!(wait_until(|| worker.is_write_complete()));
        assert_eq!(worker.state(), WorkerState::Running);
        assert!(fixture.image.lit_pixel_count() > 0);

        worker.stop();
        assert_eq!(worker.state(), WorkerState::Stopped);
        assert!(matches!(
            worker.request_write(Some(build_hit_index(Vec::new(), &PipelineConfig::default()))),
            Err(WorkerError::NotRunning(0))
        ));
    }

    #[test]
    fn test_write_without_index_rejected() {
        init_logger();
        let fixture = Fixture::new(Color::ZERO);
        let mut worker = fixture.worker(3, settings());
        worker.start().unwrap();

        assert!(matches!(
            worker.request_write(None),
            Err(WorkerError::MissingHitIndex(3))
        ));
        assert_eq!(worker.state(), WorkerState::Running);
        assert!(!worker.is_write_complete());
        worker.stop();
    }

    #[test]
    fn test_missing_collaborator_exits() {
        init_logger();
        let fixture = Fixture::new(Color::ZERO);
        let mut worker = Worker::new(1, settings())
            .with_photon_queue(Arc::clone(&fixture.photons))
            .with_hit_queue(Arc::clone(&fixture.hits));

        worker.start().unwrap();
        assert!(wait_until(|| worker.state() == WorkerState::Stopped));

        // Photons are left untouched
        fixture.photons.push_slice(&downward_photons(4));
        thread::sleep(Duration::from_millis(10));
        assert_eq!(fixture.photons.available(), 4);
    }

    #[test]
    fn test_missing_collaborator_names_what() {
        let err = Collaborators::default()
            .resolve(7, settings(), 0..0)
            .err()
            .unwrap();
        assert!(matches!(
            err,
            WorkerError::MissingCollaborator {
                worker: 7,
                what: "photon queue"
            }
        ));
    }
}
