use std::time::Instant;

const HOURS_PER_DAY: u64 = 24;

/// Simulated clock; `speed` is simulated hours per real second
#[derive(Debug, Clone)]
pub struct Timer {
    pub passed_hours: u64,
    speed: f32,
    day_fraction: f32,
    hour_accumulator: f32,
    last_update: Option<Instant>,
}

impl Timer {
    pub fn new(speed: f32) -> Self {
        Self {
            passed_hours: 0,
            speed,
            day_fraction: 0.0,
            hour_accumulator: 0.0,
            last_update: None,
        }
    }

    pub fn day_fraction(&self) -> f32 {
        self.day_fraction
    }

    /// Advances by the wall time since the previous call. The first call only starts the clock.
    pub fn run(&mut self) {
        let now = Instant::now();
        if let Some(last_update) = self.last_update.replace(now) {
            self.advance(now.duration_since(last_update).as_secs_f32());
        }
    }

    pub fn advance(&mut self, delta_seconds: f32) {
        if self.speed <= 0.0 {
            self.day_fraction = 0.0;
            return;
        }

        self.hour_accumulator += delta_seconds * self.speed;
        if self.hour_accumulator >= 1.0 {
            let advanced = self.hour_accumulator.floor();
            self.passed_hours += advanced as u64;
            self.hour_accumulator -= advanced;
        }

        let hours_today = (self.passed_hours % HOURS_PER_DAY) as f32 + self.hour_accumulator;
        self.day_fraction = hours_today / HOURS_PER_DAY as f32;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hours_accumulate_and_wrap_into_day_fraction() {
        let mut timer = Timer::new(25.0);
        timer.advance(0.5);
        assert_eq!(timer.passed_hours, 12);
        assert!((timer.day_fraction() - 12.5 / 24.0).abs() < 1e-5);

        timer.advance(0.5);
        assert_eq!(timer.passed_hours, 25);
        assert!((timer.day_fraction() - 1.0 / 24.0).abs() < 1e-5);
    }

    #[test]
    fn stopped_timer_stays_at_midnight() {
        let mut timer = Timer::new(0.0);
        timer.advance(10.0);
        assert_eq!(timer.passed_hours, 0);
        assert_eq!(timer.day_fraction(), 0.0);
    }

    #[test]
    fn first_run_only_starts_the_clock() {
        let mut timer = Timer::new(1000.0);
        timer.run();
        assert_eq!(timer.passed_hours, 0);
    }
}
