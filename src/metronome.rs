// src/metronome.rs

//! Lookahead click scheduler.
//!
//! The host calls [`MetronomeScheduler::tick`] every [`LOOKAHEAD_INTERVAL`] with the
//! current audio-clock time. Every pulse that falls inside the next
//! [`SCHEDULE_AHEAD_SECS`] is returned with its exact audio-clock time, so timer jitter
//! on the host side never reaches the clicks.

use crate::transport::Transport;
use std::time::{Duration, Instant};

pub const SCHEDULE_AHEAD_SECS: f64 = 0.12;
pub const LOOKAHEAD_INTERVAL: Duration = Duration::from_millis(25);

/// Accented click: pitch and level relative to the metronome gain.
pub const ACCENT_FREQ_HZ: f32 = 1000.0;
pub const ACCENT_LEVEL: f32 = 1.0;
pub const NORMAL_FREQ_HZ: f32 = 800.0;
pub const NORMAL_LEVEL: f32 = 0.7;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClickEvent {
    pub time: f64,
    pub accent: bool,
}

impl ClickEvent {
    pub fn frequency(&self) -> f32 {
        if self.accent {
            ACCENT_FREQ_HZ
        } else {
            NORMAL_FREQ_HZ
        }
    }

    pub fn level(&self) -> f32 {
        if self.accent {
            ACCENT_LEVEL
        } else {
            NORMAL_LEVEL
        }
    }
}

/// `(first, second)` eighth-note durations for a swung beat. They always sum to `beat`.
pub fn swing_durations(beat: f64, swing_percent: f64) -> (f64, f64) {
    let first = beat * (0.5 + swing_percent / 200.0);
    (first, beat - first)
}

/// The part of the transport the scheduler needs, frozen at start time.
///
/// A running scheduler never sees a tempo or signature change mid-measure; the
/// controller restarts it instead.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClickGrid {
    pub beat_duration: f64,
    pub beats_per_measure: u32,
    pub pulses_per_beat: u32,
    pub swing_percent: f64,
}

impl ClickGrid {
    pub fn from_transport(transport: &Transport) -> Self {
        Self {
            beat_duration: transport.beat_duration(),
            beats_per_measure: transport.time_signature().0,
            pulses_per_beat: transport.subdivision().pulses_per_beat(),
            swing_percent: transport.swing_percent(),
        }
    }

    pub fn measure_length(&self) -> f64 {
        self.beat_duration * self.beats_per_measure as f64
    }

    pub fn pulses_per_measure(&self) -> u32 {
        self.beats_per_measure * self.pulses_per_beat
    }

    fn pulse_duration(&self, subdiv_in_beat: u32) -> f64 {
        if self.pulses_per_beat == 2 && self.swing_percent > 0.0 {
            let (first, second) = swing_durations(self.beat_duration, self.swing_percent);
            if subdiv_in_beat == 0 {
                first
            } else {
                second
            }
        } else {
            self.beat_duration / self.pulses_per_beat as f64
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum SchedulerState {
    Stopped,
    Running {
        grid: ClickGrid,
        /// Start of the first scheduled measure. Measure `k` begins at `origin + k * measure`.
        origin: f64,
        measure: u64,
        next_time: f64,
        index: u32,
    },
}

#[derive(Debug, Clone)]
pub struct MetronomeScheduler {
    state: SchedulerState,
}

impl Default for MetronomeScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl MetronomeScheduler {
    pub fn new() -> Self {
        Self {
            state: SchedulerState::Stopped,
        }
    }

    pub fn is_running(&self) -> bool {
        matches!(self.state, SchedulerState::Running { .. })
    }

    /// Begins scheduling at the first measure boundary after `now`, counted from
    /// `reference`. No-op while already running.
    pub fn start(&mut self, now: f64, reference: f64, grid: ClickGrid) {
        if self.is_running() {
            return;
        }
        let measure_len = grid.measure_length();
        if !(measure_len > 0.0) || grid.pulses_per_measure() == 0 {
            return;
        }
        let measures_since = ((now - reference) / measure_len).floor();
        let origin = reference + (measures_since + 1.0) * measure_len;
        self.state = SchedulerState::Running {
            grid,
            origin,
            measure: 0,
            next_time: origin,
            index: 0,
        };
    }

    pub fn stop(&mut self) {
        self.state = SchedulerState::Stopped;
    }

    /// Stop followed by start, used whenever the grid changes.
    pub fn restart(&mut self, now: f64, reference: f64, grid: ClickGrid) {
        self.stop();
        self.start(now, reference, grid);
    }

    /// Returns every click due before `now + SCHEDULE_AHEAD_SECS`, in time order.
    pub fn tick(&mut self, now: f64) -> Vec<ClickEvent> {
        let mut events = Vec::new();
        let SchedulerState::Running {
            grid,
            origin,
            measure,
            next_time,
            index,
        } = &mut self.state
        else {
            return events;
        };

        let horizon = now + SCHEDULE_AHEAD_SECS;
        let pulses_per_measure = grid.pulses_per_measure();
        let measure_len = grid.measure_length();

        while *next_time < horizon {
            let beat_index = *index / grid.pulses_per_beat;
            let subdiv_in_beat = *index % grid.pulses_per_beat;
            let pulse = grid.pulse_duration(subdiv_in_beat);

            events.push(ClickEvent {
                time: *next_time,
                accent: beat_index == 0 && subdiv_in_beat == 0,
            });

            *next_time += pulse;
            *index += 1;
            if *index >= pulses_per_measure {
                *index = 0;
                *measure += 1;
                *next_time = *origin + *measure as f64 * measure_len;
            }
            if pulse <= 0.0 {
                break;
            }
        }
        events
    }
}

/// Wall-clock cadence for the host's scheduler ticks.
#[derive(Debug, Clone, Copy)]
pub struct TickTimer {
    interval: Duration,
    next_due: Instant,
}

impl TickTimer {
    pub fn new(interval: Duration, now: Instant) -> Self {
        Self {
            interval,
            next_due: now + interval,
        }
    }

    /// How long the host may block before the next tick falls due, at most `max_wait`.
    pub fn wait(&self, now: Instant, max_wait: Duration) -> Duration {
        self.next_due.saturating_duration_since(now).min(max_wait)
    }

    /// True when a tick is due. A host that fell behind gets one tick, not a burst.
    pub fn poll(&mut self, now: Instant) -> bool {
        if now < self.next_due {
            return false;
        }
        self.next_due += self.interval;
        if self.next_due <= now {
            self.next_due = now + self.interval;
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid(bpm: f64, top: u32, pulses: u32, swing: f64) -> ClickGrid {
        ClickGrid {
            beat_duration: 60.0 / bpm,
            beats_per_measure: top,
            pulses_per_beat: pulses,
            swing_percent: swing,
        }
    }

    /// Drives the scheduler like the host would, 25 ms at a time.
    fn run(scheduler: &mut MetronomeScheduler, from: f64, to: f64) -> Vec<ClickEvent> {
        let mut events = Vec::new();
        let mut now = from;
        while now < to {
            events.extend(scheduler.tick(now));
            now += 0.025;
        }
        events
    }

    #[test]
    fn quarter_notes_at_120_bpm_are_half_a_second_apart() {
        let mut m = MetronomeScheduler::new();
        m.start(0.0, 0.0, grid(120.0, 4, 1, 0.0));
        let events = run(&mut m, 0.0, 10.0);
        assert!(events.len() >= 16);
        for pair in events.windows(2) {
            assert!((pair[1].time - pair[0].time - 0.5).abs() < 1e-9);
        }
        for (i, e) in events.iter().enumerate() {
            assert_eq!(e.accent, i % 4 == 0);
        }
    }

    #[test]
    fn first_click_lands_on_the_next_measure_boundary() {
        let mut m = MetronomeScheduler::new();
        m.start(5.3, 1.0, grid(120.0, 4, 1, 0.0));
        let events = m.tick(6.95);
        assert_eq!(events.len(), 1);
        assert!((events[0].time - 7.0).abs() < 1e-9);
        assert!(events[0].accent);
    }

    #[test]
    fn swing_splits_the_beat_unevenly() {
        let (first, second) = swing_durations(0.5, 50.0);
        assert!((first - 0.375).abs() < 1e-12);
        assert!((second - 0.125).abs() < 1e-12);
        assert!((first + second - 0.5).abs() < 1e-12);

        let mut m = MetronomeScheduler::new();
        m.start(0.0, 0.0, grid(120.0, 4, 2, 50.0));
        let events = run(&mut m, 0.0, 4.0);
        assert!((events[1].time - events[0].time - 0.375).abs() < 1e-9);
        assert!((events[2].time - events[1].time - 0.125).abs() < 1e-9);
    }

    #[test]
    fn swing_is_ignored_outside_eighth_notes() {
        let mut m = MetronomeScheduler::new();
        m.start(0.0, 0.0, grid(120.0, 4, 4, 80.0));
        let events = run(&mut m, 0.0, 3.0);
        for pair in events.windows(2) {
            assert!((pair[1].time - pair[0].time - 0.125).abs() < 1e-9);
        }
    }

    #[test]
    fn measures_do_not_drift() {
        let mut m = MetronomeScheduler::new();
        let g = grid(97.0, 7, 2, 33.0);
        m.start(0.0, 0.0, g);
        let events = run(&mut m, 0.0, 600.0);
        let downbeats: Vec<f64> = events.iter().filter(|e| e.accent).map(|e| e.time).collect();
        let measure = g.measure_length();
        for (k, t) in downbeats.iter().enumerate() {
            assert!((t - (k as f64 + 1.0) * measure).abs() < 1e-9);
        }
    }

    #[test]
    fn start_while_running_is_a_no_op_and_stop_silences() {
        let mut m = MetronomeScheduler::new();
        m.start(0.0, 0.0, grid(120.0, 4, 1, 0.0));
        m.start(0.7, 0.7, grid(60.0, 3, 1, 0.0));
        let events = m.tick(1.95);
        assert!((events[0].time - 2.0).abs() < 1e-9);
        m.stop();
        assert!(!m.is_running());
        assert!(m.tick(10.0).is_empty());
    }

    #[test]
    fn restart_picks_up_a_new_grid() {
        let mut m = MetronomeScheduler::new();
        m.start(0.0, 0.0, grid(120.0, 4, 1, 0.0));
        m.restart(0.0, 0.0, grid(60.0, 3, 1, 0.0));
        let events = m.tick(3.0);
        assert_eq!(events.len(), 1);
        assert!((events[0].time - 3.0).abs() < 1e-9);
    }

    #[test]
    fn tick_timer_keeps_the_lookahead_cadence() {
        let poll = Duration::from_millis(16);
        let start = Instant::now();
        let mut timer = TickTimer::new(LOOKAHEAD_INTERVAL, start);
        assert_eq!(timer.wait(start, poll), poll);
        assert_eq!(timer.wait(start + poll, poll), Duration::from_millis(9));

        // Host loop: block for the suggested wait, then spend 1ms handling input.
        let mut now = start;
        let mut ticks = 0;
        while now < start + Duration::from_secs(1) {
            now += timer.wait(now, poll);
            if timer.poll(now) {
                ticks += 1;
            }
            now += Duration::from_millis(1);
        }
        assert!(ticks >= 39, "only {ticks} ticks in a second");
    }

    #[test]
    fn late_host_gets_a_single_tick() {
        let start = Instant::now();
        let mut timer = TickTimer::new(LOOKAHEAD_INTERVAL, start);
        let late = start + Duration::from_millis(200);
        assert!(timer.poll(late));
        assert!(!timer.poll(late));
        assert_eq!(timer.wait(late, Duration::from_secs(1)), LOOKAHEAD_INTERVAL);
    }
}
