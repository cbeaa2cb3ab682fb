use std::time::Duration;
use crate::renderer::contexts::frame_ctx::scheduler::QueueKind;

pub const REPORT_INTERVAL: u32 = 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FramePhase {
    ComputeWait,
    ComputeSubmit,
    GraphicsWait,
    Acquire,
    GraphicsSubmit,
    Present,
}

impl FramePhase {
    pub const ALL: [Self; 6] = [
        Self::ComputeWait,
        Self::ComputeSubmit,
        Self::GraphicsWait,
        Self::Acquire,
        Self::GraphicsSubmit,
        Self::Present,
    ];

    fn index(&self) -> usize {
        *self as usize
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::ComputeWait => "compute_wait",
            Self::ComputeSubmit => "compute_submit",
            Self::GraphicsWait => "graphics_wait",
            Self::Acquire => "acquire",
            Self::GraphicsSubmit => "graphics_submit",
            Self::Present => "present",
        }
    }
}

fn gpu_index(queue: QueueKind) -> usize {
    match queue {
        QueueKind::Compute => 0,
        QueueKind::Graphics => 1,
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FrameReport {
    pub frames: u32,
    pub phase_avg_ms: [f64; 6],
    pub frame_avg_ms: f64,
    pub frame_max_ms: f64,
    /// Compute and graphics time on the GPU timeline, when timestamps were read
    pub gpu_avg_ms: [Option<f64>; 2],
}

impl FrameReport {
    pub fn log(&self) {
        let mut fields = FramePhase::ALL
            .iter()
            .map(|phase| format!("{}={:.3}", phase.label(), self.phase_avg_ms[phase.index()]))
            .collect::<Vec<_>>();
        for (label, avg) in ["gpu_compute", "gpu_graphics"].iter().zip(self.gpu_avg_ms) {
            if let Some(avg) = avg {
                fields.push(format!("{label}={avg:.3}"));
            }
        }
        log::info!(
            "Frame profile ({} frames, ms): {} frame_avg={:.3} frame_max={:.3}",
            self.frames,
            fields.join(" "),
            self.frame_avg_ms,
            self.frame_max_ms,
        );
    }
}

/// Accumulates per-phase CPU time, plus GPU pass time when timestamps are available,
/// and reports averages every `REPORT_INTERVAL` frames
#[derive(Debug, Default)]
pub struct FrameProfiler {
    phases: [Duration; 6],
    gpu: [Duration; 2],
    gpu_samples: [u32; 2],
    frame_total: Duration,
    frame_max: Duration,
    frames: u32,
}

impl FrameProfiler {
    pub fn record(&mut self, phase: FramePhase, elapsed: Duration) {
        self.phases[phase.index()] += elapsed;
    }

    pub fn record_gpu(&mut self, queue: QueueKind, elapsed: Duration) {
        self.gpu[gpu_index(queue)] += elapsed;
        self.gpu_samples[gpu_index(queue)] += 1;
    }

    /// Closes one frame; returns and resets the report once the interval is full
    pub fn end_frame(&mut self, frame_time: Duration) -> Option<FrameReport> {
        self.frame_total += frame_time;
        self.frame_max = self.frame_max.max(frame_time);
        self.frames += 1;
        if self.frames < REPORT_INTERVAL {
            return None;
        }

        let frames = self.frames as f64;
        let avg_ms = |total: Duration| total.as_secs_f64() * 1000.0 / frames;
        let report = FrameReport {
            frames: self.frames,
            phase_avg_ms: self.phases.map(avg_ms),
            frame_avg_ms: avg_ms(self.frame_total),
            frame_max_ms: self.frame_max.as_secs_f64() * 1000.0,
            // Averaged over the submissions that were timed, not over every frame
            gpu_avg_ms: [0, 1].map(|i| {
                (self.gpu_samples[i] > 0)
                    .then(|| self.gpu[i].as_secs_f64() * 1000.0 / self.gpu_samples[i] as f64)
            }),
        };
        *self = Self::default();
        Some(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reports_every_interval_and_resets() {
        let mut profiler = FrameProfiler::default();
        for frame in 0..REPORT_INTERVAL - 1 {
            profiler.record(FramePhase::Acquire, Duration::from_millis(2));
            assert!(profiler.end_frame(Duration::from_millis(10 + frame as u64 % 2)).is_none());
        }
        profiler.record(FramePhase::Acquire, Duration::from_millis(2));
        profiler.record(FramePhase::Present, Duration::from_millis(60));
        let report = profiler.end_frame(Duration::from_millis(30)).unwrap();

        assert_eq!(report.frames, REPORT_INTERVAL);
        assert!((report.phase_avg_ms[FramePhase::Acquire as usize] - 2.0).abs() < 1e-9);
        assert!((report.phase_avg_ms[FramePhase::Present as usize] - 1.0).abs() < 1e-9);
        assert_eq!(report.phase_avg_ms[FramePhase::ComputeWait as usize], 0.0);
        assert!((report.frame_max_ms - 30.0).abs() < 1e-9);

        assert_eq!(report.gpu_avg_ms, [None, None]);

        // Counters start over after a report
        assert!(profiler.end_frame(Duration::from_millis(1)).is_none());
    }

    #[test]
    fn gpu_time_is_averaged_over_timed_submissions() {
        let mut profiler = FrameProfiler::default();
        profiler.record_gpu(QueueKind::Compute, Duration::from_millis(1));
        profiler.record_gpu(QueueKind::Compute, Duration::from_millis(3));
        for _ in 0..REPORT_INTERVAL - 1 {
            assert!(profiler.end_frame(Duration::from_millis(16)).is_none());
        }
        let report = profiler.end_frame(Duration::from_millis(16)).unwrap();
        assert!((report.gpu_avg_ms[0].unwrap() - 2.0).abs() < 1e-9);
        assert_eq!(report.gpu_avg_ms[1], None);
    }
}
