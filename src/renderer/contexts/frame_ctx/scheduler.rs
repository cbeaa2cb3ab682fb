use std::time::{Duration, Instant};
use ash::vk;
use color_eyre::Result;
use crate::renderer::contexts::frame_ctx::profiler::{FramePhase, FrameProfiler, FrameReport};
use crate::renderer::contexts::frame_ctx::{MAX_FRAMES_IN_FLIGHT, RECREATE_RESET_SLOT};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueueKind {
    Compute,
    Graphics,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquireOutcome {
    Acquired { image_index: u32, suboptimal: bool },
    OutOfDate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresentStatus {
    Optimal,
    Suboptimal,
    OutOfDate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwapchainState {
    pub extent: vk::Extent2D,
    pub image_count: u32,
}

/// What the recording callbacks need to know about the frame being built
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameInfo {
    pub slot: usize,
    pub tick: u32,
    /// Set on the very first compute submission only
    pub seed_cells: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameOutcome {
    /// Work for the slot was submitted and handed to the presentation engine
    Submitted { slot: usize, image_index: u32 },
    /// Acquire reported out-of-date; the swapchain was rebuilt and the slot kept
    Aborted,
    /// Nothing to render to, e.g. a minimized window
    Skipped,
}

/// The GPU-facing half of a frame. The scheduler owns the ordering, the backend
/// owns the handles.
pub trait FrameBackend {
    fn framebuffer_ready(&self) -> bool;
    fn take_resize_request(&mut self) -> bool;

    fn wait_for_fence(&mut self, queue: QueueKind, slot: usize) -> Result<()>;
    /// GPU time of the slot's previous `queue` work; valid right after its fence wait
    fn gpu_time(&mut self, queue: QueueKind, slot: usize) -> Result<Option<Duration>>;
    fn reset_fence(&mut self, queue: QueueKind, slot: usize) -> Result<()>;
    fn reset_commands(&mut self, queue: QueueKind, slot: usize) -> Result<()>;

    fn update_uniforms(&mut self, slot: usize) -> Result<()>;
    fn record_compute(&mut self, frame: &FrameInfo) -> Result<()>;
    /// Signals the slot's compute-finished semaphore and compute fence
    fn submit_compute(&mut self, slot: usize) -> Result<()>;
    /// Consumes a compute-finished signal that no graphics submission will wait on
    fn drain_compute_signal(&mut self, slot: usize) -> Result<()>;

    fn acquire_image(&mut self, slot: usize) -> Result<AcquireOutcome>;
    fn record_graphics(&mut self, frame: &FrameInfo, image_index: u32) -> Result<()>;
    /// Waits on compute-finished and image-available, signals render-finished and the graphics fence
    fn submit_graphics(&mut self, slot: usize) -> Result<()>;
    fn present(&mut self, slot: usize, image_index: u32) -> Result<PresentStatus>;

    fn wait_idle(&mut self) -> Result<()>;
    fn destroy_swapchain(&mut self);
    fn create_swapchain(&mut self) -> Result<SwapchainState>;
    fn rewrite_descriptors(&mut self) -> Result<()>;
}

/// Ring of frames in flight.
///
/// Each frame waits on the slot's compute fence, submits compute, waits on the slot's
/// graphics fence, acquires, submits graphics and presents. Two slots overlap on the GPU
/// but a slot's own command buffers are only reset after its fence has been waited on.
pub struct FrameScheduler {
    slot: usize,
    tick: u32,
    recreate_pending: bool,
    swapchain: SwapchainState,
    last_presented_image: Option<u32>,
    last_submitted_slot: Option<usize>,
    recreations: u32,
    profiler: Option<FrameProfiler>,
    last_report: Option<FrameReport>,
}

impl FrameScheduler {
    pub fn new(swapchain: SwapchainState, profile: bool) -> Self {
        Self {
            slot: 0,
            tick: 0,
            recreate_pending: false,
            swapchain: clamp_image_count(swapchain),
            last_presented_image: None,
            last_submitted_slot: None,
            recreations: 0,
            profiler: profile.then(FrameProfiler::default),
            last_report: None,
        }
    }

    pub fn slot(&self) -> usize {
        self.slot
    }

    pub fn tick(&self) -> u32 {
        self.tick
    }

    pub fn swapchain(&self) -> SwapchainState {
        self.swapchain
    }

    pub fn recreations(&self) -> u32 {
        self.recreations
    }

    pub fn recreate_pending(&self) -> bool {
        self.recreate_pending
    }

    /// Image index and slot of the most recent frame handed to present
    pub fn last_presented(&self) -> Option<(u32, usize)> {
        self.last_presented_image.zip(self.last_submitted_slot)
    }

    pub fn draw_frame<B: FrameBackend>(&mut self, backend: &mut B) -> Result<FrameOutcome> {
        if (self.recreate_pending || !backend.framebuffer_ready()) && !self.recreate(backend)? {
            return Ok(FrameOutcome::Skipped);
        }

        let frame_start = Instant::now();
        let slot = self.slot;
        let frame = FrameInfo {
            slot,
            tick: self.tick,
            seed_cells: self.tick == 0,
        };

        let started = Instant::now();
        backend.wait_for_fence(QueueKind::Compute, slot)?;
        self.measure(FramePhase::ComputeWait, started);
        self.measure_gpu(backend, QueueKind::Compute, slot)?;

        backend.update_uniforms(slot)?;

        let started = Instant::now();
        backend.reset_fence(QueueKind::Compute, slot)?;
        backend.reset_commands(QueueKind::Compute, slot)?;
        backend.record_compute(&frame)?;
        backend.submit_compute(slot)?;
        self.tick = self.tick.wrapping_add(1);
        self.measure(FramePhase::ComputeSubmit, started);

        let started = Instant::now();
        backend.wait_for_fence(QueueKind::Graphics, slot)?;
        self.measure(FramePhase::GraphicsWait, started);
        self.measure_gpu(backend, QueueKind::Graphics, slot)?;

        let started = Instant::now();
        let acquired = backend.acquire_image(slot)?;
        self.measure(FramePhase::Acquire, started);
        let image_index = match acquired {
            AcquireOutcome::Acquired { image_index, suboptimal } => {
                if suboptimal {
                    log::trace!("Acquired suboptimal image {image_index}");
                }
                image_index
            }
            AcquireOutcome::OutOfDate => {
                log::debug!("Swapchain out of date on acquire, slot {slot} is retried");
                // The graphics fence was only waited on, so it stays signaled for the retry
                backend.drain_compute_signal(slot)?;
                self.recreate(backend)?;
                return Ok(FrameOutcome::Aborted);
            }
        };

        let started = Instant::now();
        backend.reset_fence(QueueKind::Graphics, slot)?;
        backend.reset_commands(QueueKind::Graphics, slot)?;
        backend.record_graphics(&frame, image_index)?;
        backend.submit_graphics(slot)?;
        self.measure(FramePhase::GraphicsSubmit, started);

        let started = Instant::now();
        let status = backend.present(slot, image_index)?;
        self.measure(FramePhase::Present, started);
        let resized = backend.take_resize_request();

        self.last_presented_image = Some(image_index);
        self.last_submitted_slot = Some(slot);

        if status != PresentStatus::Optimal || resized {
            log::debug!("Recreating swapchain after present ({status:?}, resized: {resized})");
            self.recreate(backend)?;
            self.slot = RECREATE_RESET_SLOT;
        } else {
            self.slot = (slot + 1) % MAX_FRAMES_IN_FLIGHT;
        }

        if let Some(report) = self
            .profiler
            .as_mut()
            .and_then(|profiler| profiler.end_frame(frame_start.elapsed()))
        {
            report.log();
            self.last_report = Some(report);
        }

        Ok(FrameOutcome::Submitted { slot, image_index })
    }

    /// Rebuilds the swapchain behind a device-idle barrier.
    /// Returns `false` and stays pending while the framebuffer has no area.
    pub fn recreate<B: FrameBackend>(&mut self, backend: &mut B) -> Result<bool> {
        if !backend.framebuffer_ready() {
            if !self.recreate_pending {
                log::debug!("Framebuffer is empty, swapchain recreation deferred");
            }
            self.recreate_pending = true;
            return Ok(false);
        }

        backend.wait_idle()?;
        backend.destroy_swapchain();
        let swapchain = clamp_image_count(backend.create_swapchain()?);
        backend.rewrite_descriptors()?;

        self.swapchain = swapchain;
        self.recreate_pending = false;
        self.recreations += 1;
        log::info!(
            "Swapchain recreated: {}x{}, {} images",
            swapchain.extent.width,
            swapchain.extent.height,
            swapchain.image_count,
        );
        Ok(true)
    }

    fn measure(&mut self, phase: FramePhase, started: Instant) {
        if let Some(profiler) = self.profiler.as_mut() {
            profiler.record(phase, started.elapsed());
        }
    }

    fn measure_gpu<B: FrameBackend>(&mut self, backend: &mut B, queue: QueueKind, slot: usize) -> Result<()> {
        let Some(profiler) = self.profiler.as_mut() else {
            return Ok(());
        };
        if let Some(elapsed) = backend.gpu_time(queue, slot)? {
            profiler.record_gpu(queue, elapsed);
        }
        Ok(())
    }

    /// Most recent profile report, kept until the next one replaces it
    pub fn last_report(&self) -> Option<&FrameReport> {
        self.last_report.as_ref()
    }
}

fn clamp_image_count(state: SwapchainState) -> SwapchainState {
    SwapchainState {
        image_count: state.image_count.min(MAX_FRAMES_IN_FLIGHT as u32),
        ..state
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::{HashSet, VecDeque};
    use crate::renderer::contexts::frame_ctx::profiler::REPORT_INTERVAL;
    use crate::renderer::contexts::resource_ctx::storage::{current_generation, PairBuffer};

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum Event {
        Wait(QueueKind, usize),
        GpuTime(QueueKind, usize),
        ResetFence(QueueKind, usize),
        ResetCommands(QueueKind, usize),
        Submit(QueueKind, usize),
        Drain(usize),
        Acquire(usize),
        Present(usize, u32),
        WaitIdle,
        Destroy,
        Create,
        Rewrite,
    }

    struct MockBackend {
        events: Vec<Event>,
        framebuffer: (u32, u32),
        resize_requested: bool,
        acquire_calls: usize,
        out_of_date_acquires: HashSet<usize>,
        present_statuses: VecDeque<PresentStatus>,
        next_image: u32,
        live_swapchains: i32,
        image_count: u32,
        seeded_ticks: Vec<u32>,
        gpu_compute: Option<Duration>,
        gpu_graphics: Option<Duration>,
    }

    impl MockBackend {
        fn new() -> Self {
            Self {
                events: Vec::new(),
                framebuffer: (800, 600),
                resize_requested: false,
                acquire_calls: 0,
                out_of_date_acquires: HashSet::new(),
                present_statuses: VecDeque::new(),
                next_image: 0,
                live_swapchains: 1,
                image_count: 2,
                seeded_ticks: Vec::new(),
                gpu_compute: None,
                gpu_graphics: None,
            }
        }

        fn count(&self, event: Event) -> usize {
            self.events.iter().filter(|e| **e == event).count()
        }

        /// Every reset of a slot's fence or commands follows a wait on that fence
        /// with no submission in between
        fn assert_wait_precedes_reset(&self) {
            let mut waited = HashSet::new();
            for event in &self.events {
                match *event {
                    Event::Wait(queue, slot) => {
                        waited.insert((queue, slot));
                    }
                    Event::ResetFence(queue, slot) | Event::ResetCommands(queue, slot) => {
                        assert!(
                            waited.contains(&(queue, slot)),
                            "{event:?} without a prior wait in {:?}",
                            self.events,
                        );
                    }
                    Event::Submit(queue, slot) => {
                        waited.remove(&(queue, slot));
                    }
                    _ => {}
                }
            }
        }
    }

    impl FrameBackend for MockBackend {
        fn framebuffer_ready(&self) -> bool {
            self.framebuffer.0 > 0 && self.framebuffer.1 > 0
        }

        fn take_resize_request(&mut self) -> bool {
            std::mem::take(&mut self.resize_requested)
        }

        fn wait_for_fence(&mut self, queue: QueueKind, slot: usize) -> Result<()> {
            self.events.push(Event::Wait(queue, slot));
            Ok(())
        }

        fn gpu_time(&mut self, queue: QueueKind, slot: usize) -> Result<Option<Duration>> {
            self.events.push(Event::GpuTime(queue, slot));
            Ok(match queue {
                QueueKind::Compute => self.gpu_compute,
                QueueKind::Graphics => self.gpu_graphics,
            })
        }

        fn reset_fence(&mut self, queue: QueueKind, slot: usize) -> Result<()> {
            self.events.push(Event::ResetFence(queue, slot));
            Ok(())
        }

        fn reset_commands(&mut self, queue: QueueKind, slot: usize) -> Result<()> {
            self.events.push(Event::ResetCommands(queue, slot));
            Ok(())
        }

        fn update_uniforms(&mut self, _slot: usize) -> Result<()> {
            Ok(())
        }

        fn record_compute(&mut self, frame: &FrameInfo) -> Result<()> {
            if frame.seed_cells {
                self.seeded_ticks.push(frame.tick);
            }
            Ok(())
        }

        fn submit_compute(&mut self, slot: usize) -> Result<()> {
            self.events.push(Event::Submit(QueueKind::Compute, slot));
            Ok(())
        }

        fn drain_compute_signal(&mut self, slot: usize) -> Result<()> {
            self.events.push(Event::Drain(slot));
            Ok(())
        }

        fn acquire_image(&mut self, slot: usize) -> Result<AcquireOutcome> {
            self.acquire_calls += 1;
            self.events.push(Event::Acquire(slot));
            if self.out_of_date_acquires.contains(&self.acquire_calls) {
                return Ok(AcquireOutcome::OutOfDate);
            }
            let image_index = self.next_image;
            self.next_image = (self.next_image + 1) % self.image_count;
            Ok(AcquireOutcome::Acquired {
                image_index,
                suboptimal: false,
            })
        }

        fn record_graphics(&mut self, _frame: &FrameInfo, _image_index: u32) -> Result<()> {
            Ok(())
        }

        fn submit_graphics(&mut self, slot: usize) -> Result<()> {
            self.events.push(Event::Submit(QueueKind::Graphics, slot));
            Ok(())
        }

        fn present(&mut self, slot: usize, image_index: u32) -> Result<PresentStatus> {
            self.events.push(Event::Present(slot, image_index));
            Ok(self.present_statuses.pop_front().unwrap_or(PresentStatus::Optimal))
        }

        fn wait_idle(&mut self) -> Result<()> {
            self.events.push(Event::WaitIdle);
            Ok(())
        }

        fn destroy_swapchain(&mut self) {
            self.events.push(Event::Destroy);
            self.live_swapchains -= 1;
        }

        fn create_swapchain(&mut self) -> Result<SwapchainState> {
            assert_eq!(self.live_swapchains, 0, "old swapchain still alive");
            self.events.push(Event::Create);
            self.live_swapchains += 1;
            self.next_image = 0;
            Ok(SwapchainState {
                extent: vk::Extent2D {
                    width: self.framebuffer.0,
                    height: self.framebuffer.1,
                },
                image_count: self.image_count,
            })
        }

        fn rewrite_descriptors(&mut self) -> Result<()> {
            self.events.push(Event::Rewrite);
            Ok(())
        }
    }

    fn initial_state() -> SwapchainState {
        SwapchainState {
            extent: vk::Extent2D { width: 800, height: 600 },
            image_count: 2,
        }
    }

    #[test]
    fn slots_alternate_and_fences_are_waited_before_reset() {
        let mut backend = MockBackend::new();
        let mut scheduler = FrameScheduler::new(initial_state(), false);

        let slots: Vec<usize> = (0..4)
            .map(|_| match scheduler.draw_frame(&mut backend).unwrap() {
                FrameOutcome::Submitted { slot, .. } => slot,
                other => panic!("unexpected {other:?}"),
            })
            .collect();

        assert_eq!(slots, vec![0, 1, 0, 1]);
        backend.assert_wait_precedes_reset();
        assert_eq!(scheduler.tick(), 4);
        assert_eq!(scheduler.recreations(), 0);
    }

    #[test]
    fn frame_steps_run_in_order() {
        let mut backend = MockBackend::new();
        let mut scheduler = FrameScheduler::new(initial_state(), false);
        scheduler.draw_frame(&mut backend).unwrap();

        assert_eq!(backend.events, vec![
            Event::Wait(QueueKind::Compute, 0),
            Event::ResetFence(QueueKind::Compute, 0),
            Event::ResetCommands(QueueKind::Compute, 0),
            Event::Submit(QueueKind::Compute, 0),
            Event::Wait(QueueKind::Graphics, 0),
            Event::Acquire(0),
            Event::ResetFence(QueueKind::Graphics, 0),
            Event::ResetCommands(QueueKind::Graphics, 0),
            Event::Submit(QueueKind::Graphics, 0),
            Event::Present(0, 0),
        ]);
        assert_eq!(scheduler.last_presented(), Some((0, 0)));
    }

    #[test]
    fn out_of_date_acquire_keeps_the_slot() {
        let mut backend = MockBackend::new();
        let mut scheduler = FrameScheduler::new(initial_state(), false);
        scheduler.draw_frame(&mut backend).unwrap();
        backend.out_of_date_acquires.insert(2);

        let before = scheduler.slot();
        let outcome = scheduler.draw_frame(&mut backend).unwrap();
        assert_eq!(outcome, FrameOutcome::Aborted);
        assert_eq!(scheduler.slot(), before);
        assert_eq!(backend.count(Event::Drain(before)), 1);
        // The graphics fence was not reset, so the retry does not block forever
        assert_eq!(backend.count(Event::ResetFence(QueueKind::Graphics, before)), 0);
    }

    #[test]
    fn out_of_date_on_third_frame_recreates_once() {
        let mut backend = MockBackend::new();
        backend.out_of_date_acquires.insert(3);
        let mut scheduler = FrameScheduler::new(initial_state(), false);

        let mut slots = Vec::new();
        let mut outcomes = Vec::new();
        for _ in 0..10 {
            slots.push(scheduler.slot());
            outcomes.push(scheduler.draw_frame(&mut backend).unwrap());
        }

        assert_eq!(scheduler.recreations(), 1);
        assert_eq!(backend.count(Event::Create), 1);
        assert_eq!(outcomes[2], FrameOutcome::Aborted);
        assert_eq!(slots[2], slots[3]);
        assert_eq!(slots, vec![0, 1, 0, 0, 1, 0, 1, 0, 1, 0]);
        backend.assert_wait_precedes_reset();
    }

    #[test]
    fn recreating_twice_leaves_one_swapchain_with_latest_extent() {
        let mut backend = MockBackend::new();
        backend.image_count = 3;
        let mut scheduler = FrameScheduler::new(initial_state(), false);

        backend.framebuffer = (1024, 768);
        assert!(scheduler.recreate(&mut backend).unwrap());
        backend.framebuffer = (640, 480);
        assert!(scheduler.recreate(&mut backend).unwrap());

        assert_eq!(backend.live_swapchains, 1);
        assert_eq!(backend.count(Event::Destroy), backend.count(Event::Create));
        assert_eq!(backend.count(Event::Rewrite), 2);
        let state = scheduler.swapchain();
        assert_eq!(state.extent, vk::Extent2D { width: 640, height: 480 });
        assert!(state.image_count <= MAX_FRAMES_IN_FLIGHT as u32);

        // Each rebuild is bracketed by a device-idle wait and a descriptor rewrite
        assert_eq!(&backend.events[..4], &[Event::WaitIdle, Event::Destroy, Event::Create, Event::Rewrite]);
    }

    #[test]
    fn present_out_of_date_or_resize_resets_slot() {
        let mut backend = MockBackend::new();
        let mut scheduler = FrameScheduler::new(initial_state(), false);
        backend.present_statuses.push_back(PresentStatus::Suboptimal);

        scheduler.draw_frame(&mut backend).unwrap();
        assert_eq!(scheduler.recreations(), 1);
        assert_eq!(scheduler.slot(), RECREATE_RESET_SLOT);

        scheduler.draw_frame(&mut backend).unwrap();
        assert_eq!(scheduler.slot(), 0);

        backend.resize_requested = true;
        scheduler.draw_frame(&mut backend).unwrap();
        assert_eq!(scheduler.recreations(), 2);
        assert_eq!(scheduler.slot(), RECREATE_RESET_SLOT);
        assert!(!backend.resize_requested);
        backend.assert_wait_precedes_reset();
    }

    #[test]
    fn rebuild_after_the_reset_slot_repeats_its_parity_once() {
        let mut backend = MockBackend::new();
        let mut scheduler = FrameScheduler::new(initial_state(), false);
        backend.present_statuses.extend([PresentStatus::Optimal, PresentStatus::OutOfDate]);

        let slots: Vec<usize> = (0..4)
            .map(|_| match scheduler.draw_frame(&mut backend).unwrap() {
                FrameOutcome::Submitted { slot, .. } => slot,
                other => panic!("unexpected {other:?}"),
            })
            .collect();

        assert_eq!(slots, vec![0, RECREATE_RESET_SLOT, RECREATE_RESET_SLOT, 0]);
        let writes: Vec<PairBuffer> = slots.iter().map(|&slot| current_generation(slot)).collect();
        assert_eq!(writes[1], writes[2]);
        assert_ne!(writes[2], writes[3]);
        backend.assert_wait_precedes_reset();
    }

    #[test]
    fn minimized_window_skips_frames_until_restored() {
        let mut backend = MockBackend::new();
        let mut scheduler = FrameScheduler::new(initial_state(), false);
        backend.framebuffer = (0, 0);

        assert_eq!(scheduler.draw_frame(&mut backend).unwrap(), FrameOutcome::Skipped);
        assert_eq!(scheduler.draw_frame(&mut backend).unwrap(), FrameOutcome::Skipped);
        assert!(scheduler.recreate_pending());
        assert!(backend.events.is_empty());

        backend.framebuffer = (320, 200);
        let outcome = scheduler.draw_frame(&mut backend).unwrap();
        assert!(matches!(outcome, FrameOutcome::Submitted { slot: 0, .. }));
        assert!(!scheduler.recreate_pending());
        assert_eq!(scheduler.recreations(), 1);
        assert_eq!(scheduler.swapchain().extent, vk::Extent2D { width: 320, height: 200 });
    }

    #[test]
    fn gpu_times_are_read_after_the_fence_wait_and_reported() {
        let mut backend = MockBackend::new();
        backend.gpu_compute = Some(Duration::from_micros(1_500));
        backend.gpu_graphics = Some(Duration::from_micros(4_000));
        let mut scheduler = FrameScheduler::new(initial_state(), true);
        for _ in 0..REPORT_INTERVAL {
            scheduler.draw_frame(&mut backend).unwrap();
        }

        assert_eq!(&backend.events[..3], &[
            Event::Wait(QueueKind::Compute, 0),
            Event::GpuTime(QueueKind::Compute, 0),
            Event::ResetFence(QueueKind::Compute, 0),
        ]);
        let graphics_wait = backend
            .events
            .iter()
            .position(|event| *event == Event::Wait(QueueKind::Graphics, 0))
            .unwrap();
        assert_eq!(backend.events[graphics_wait + 1], Event::GpuTime(QueueKind::Graphics, 0));

        let report = scheduler.last_report().unwrap();
        assert_eq!(report.frames, REPORT_INTERVAL);
        assert!((report.gpu_avg_ms[0].unwrap() - 1.5).abs() < 1e-9);
        assert!((report.gpu_avg_ms[1].unwrap() - 4.0).abs() < 1e-9);
    }

    #[test]
    fn gpu_times_are_not_read_without_profiling() {
        let mut backend = MockBackend::new();
        let mut scheduler = FrameScheduler::new(initial_state(), false);
        scheduler.draw_frame(&mut backend).unwrap();
        assert!(!backend.events.iter().any(|event| matches!(event, Event::GpuTime(..))));
        assert!(scheduler.last_report().is_none());
    }

    #[test]
    fn only_the_first_compute_pass_seeds_cells() {
        let mut backend = MockBackend::new();
        let mut scheduler = FrameScheduler::new(initial_state(), true);
        for _ in 0..3 {
            scheduler.draw_frame(&mut backend).unwrap();
        }
        assert_eq!(backend.seeded_ticks, vec![0]);
    }
}
