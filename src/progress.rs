use chrono::{DateTime, Local, TimeDelta};

use crate::events::ProgressEvent;

/// Where the renderer is within the current job.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProgressState {
    strip: u32,
    strips: u32,
    sub_progress: f64,
}

impl Default for ProgressState {
    fn default() -> Self {
        Self {
            strip: 1,
            strips: 1,
            sub_progress: 0.0,
        }
    }
}

impl ProgressState {
    pub fn strip(&self) -> u32 {
        self.strip
    }

    pub fn strips(&self) -> u32 {
        self.strips
    }

    pub fn sub_progress(&self) -> f64 {
        self.sub_progress
    }

    /// Overall completion in percent, `[0, 100]`.
    pub fn overall(&self) -> f64 {
        let strips = f64::from(self.strips);
        let coarse = 100.0 * f64::from(self.strip - 1) / strips;
        (coarse + self.sub_progress / strips).clamp(0.0, 100.0)
    }

    /// Applies one event. Returns whether the display must be redrawn.
    pub fn apply(&mut self, event: &ProgressEvent) -> bool {
        match *event {
            ProgressEvent::StripUpdate { strip, strips } => {
                self.strips = strips.max(1);
                self.strip = strip.clamp(1, self.strips);
                self.sub_progress = 0.0;
            }
            ProgressEvent::ChaosProgress(percent) => {
                self.sub_progress = percent.unwrap_or(0.0).clamp(0.0, 100.0);
            }
            ProgressEvent::Ignorable | ProgressEvent::Diagnostic(_) => {}
        }
        event.triggers_redraw()
    }
}

/// Progress state for one session plus the clock it is measured against.
#[derive(Debug, Clone)]
pub struct ProgressTracker {
    state: ProgressState,
    started: DateTime<Local>,
}

impl ProgressTracker {
    pub fn new(started: DateTime<Local>) -> Self {
        Self {
            state: ProgressState::default(),
            started,
        }
    }

    pub fn state(&self) -> &ProgressState {
        &self.state
    }

    pub fn apply(&mut self, event: &ProgressEvent) -> bool {
        self.state.apply(event)
    }

    /// Estimated time remaining, extrapolated linearly from elapsed time.
    /// `None` until some progress has been reported.
    pub fn eta(&self, now: DateTime<Local>) -> Option<TimeDelta> {
        let overall = self.state.overall();
        if overall <= 0.0 {
            return None;
        }
        let elapsed = (now - self.started).num_milliseconds().max(0) as f64;
        let remaining = elapsed * (100.0 - overall) / overall;
        TimeDelta::try_milliseconds(remaining.round() as i64)
    }
}

/// Formats a duration as `HHH:MM:SS`; hours are not wrapped into days.
pub fn format_eta(remaining: TimeDelta) -> String {
    let total = remaining.num_seconds().max(0);
    let hours = total / 3600;
    let minutes = (total % 3600) / 60;
    let seconds = total % 60;
    format!("{hours:03}:{minutes:02}:{seconds:02}")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strip(strip: u32, strips: u32) -> ProgressEvent {
        ProgressEvent::StripUpdate { strip, strips }
    }

    #[test]
    fn starts_at_first_of_one_strip() {
        let state = ProgressState::default();
        assert_eq!((state.strip(), state.strips()), (1, 1));
        assert_eq!(state.overall(), 0.0);
    }

    #[test]
    fn overall_uses_fractional_strip_term() {
        let mut state = ProgressState::default();
        state.apply(&strip(2, 4));
        state.apply(&ProgressEvent::ChaosProgress(Some(50.0)));
        assert!((state.overall() - 37.5).abs() < 1e-9);

        state.apply(&strip(2, 3));
        assert!((state.overall() - 100.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn strip_update_resets_sub_progress() {
        let mut state = ProgressState::default();
        state.apply(&ProgressEvent::ChaosProgress(Some(80.0)));
        assert!(state.apply(&strip(2, 2)));
        assert_eq!(state.sub_progress(), 0.0);
    }

    #[test]
    fn chaos_without_percentage_means_zero() {
        let mut state = ProgressState::default();
        state.apply(&ProgressEvent::ChaosProgress(Some(30.0)));
        state.apply(&ProgressEvent::ChaosProgress(None));
        assert_eq!(state.sub_progress(), 0.0);
    }

    #[test]
    fn degenerate_strip_counts_keep_invariants() {
        let mut state = ProgressState::default();
        state.apply(&strip(0, 0));
        assert_eq!((state.strip(), state.strips()), (1, 1));
        state.apply(&strip(5, 3));
        assert_eq!((state.strip(), state.strips()), (3, 3));
    }

    #[test]
    fn non_progress_events_do_not_redraw() {
        let mut state = ProgressState::default();
        assert!(!state.apply(&ProgressEvent::Ignorable));
        assert!(!state.apply(&ProgressEvent::Diagnostic("x".to_owned())));
        assert_eq!(state, ProgressState::default());
    }

    #[test]
    fn overall_is_bounded_and_monotonic_over_ordered_events() {
        let mut state = ProgressState::default();
        let mut previous = state.overall();
        for current in 1..=4 {
            state.apply(&strip(current, 4));
            for tenth in 0..=1000 {
                state.apply(&ProgressEvent::ChaosProgress(Some(f64::from(tenth) / 10.0)));
                let overall = state.overall();
                assert!((0.0..=100.0).contains(&overall));
                assert!(overall >= previous, "{overall} < {previous}");
                previous = overall;
            }
        }
        assert!((previous - 100.0).abs() < 1e-9);
    }

    #[test]
    fn eta_extrapolates_from_elapsed_time() {
        let started = Local::now();
        let mut tracker = ProgressTracker::new(started);
        assert_eq!(tracker.eta(started + TimeDelta::seconds(10)), None);

        tracker.apply(&ProgressEvent::ChaosProgress(Some(25.0)));
        let eta = tracker
            .eta(started + TimeDelta::seconds(10))
            .expect("eta once progress exists");
        assert_eq!(eta.num_seconds(), 30);
    }

    #[test]
    fn eta_formats_with_unbounded_hours() {
        assert_eq!(format_eta(TimeDelta::seconds(0)), "000:00:00");
        assert_eq!(format_eta(TimeDelta::seconds(3_723)), "001:02:03");
        assert_eq!(format_eta(TimeDelta::hours(1_234) + TimeDelta::seconds(5)), "1234:00:05");
        assert_eq!(format_eta(TimeDelta::hours(50)), "050:00:00");
    }
}
