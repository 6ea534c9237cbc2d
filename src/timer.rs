//! Performance measurement tools.

use std::{
    cell::Cell,
    fmt,
    mem,
    sync::Mutex,
    time::{Duration, Instant},
};

use itertools::Itertools;

/// Smoothing factor of the exponential moving average over recorded durations.
const EMA_ALPHA: f32 = 0.3;

/// A timer that can measure and average the time an operation takes.
///
/// Collected timings are averaged and reset when the timer is displayed using `{}`
/// ([`std::fmt::Display`]).
pub struct Timer {
    name: &'static str,
    state: Mutex<State>,
}

#[derive(Default)]
struct State {
    /// The current average time in seconds, `None` if nothing was recorded since the last reset.
    avg: Option<f32>,
    /// The number of time measurements that contributed to the current `avg`.
    count: usize,
}

impl State {
    fn record(&mut self, secs: f32) {
        self.avg = Some(match self.avg {
            Some(avg) => avg + EMA_ALPHA * (secs - avg),
            None => secs,
        });
        self.count += 1;
    }
}

impl Timer {
    /// Creates a new timer.
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            state: Mutex::new(State::default()),
        }
    }

    /// Returns the name passed to [`Timer::new`].
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Invokes a closure, measuring and recording the time it takes.
    pub fn time<T>(&self, timee: impl FnOnce() -> T) -> T {
        let _guard = self.start();
        timee()
    }

    /// Starts timing an operation using a drop guard.
    ///
    /// When the returned [`TimerGuard`] is dropped, the time between the call to `start` and the
    /// drop is measured and recorded.
    pub fn start(&self) -> TimerGuard<'_> {
        TimerGuard {
            start: Instant::now(),
            timer: self,
        }
    }

    fn stop(&self, start: Instant) {
        self.record(start.elapsed());
    }

    fn record(&self, duration: Duration) {
        // A poisoned lock only means another thread panicked mid-update; the average is still
        // usable.
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.record(duration.as_secs_f32());
    }
}

/// Displays the average recorded time and resets it.
impl fmt::Display for Timer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        let State { avg, count } = mem::take(&mut *state);
        let avg_ms = avg.unwrap_or(0.0) * 1000.0;

        write!(f, "{}: {count}x{avg_ms:.01}ms", self.name)
    }
}

/// Cloning a timer resets its collected timings.
impl Clone for Timer {
    fn clone(&self) -> Self {
        Self::new(self.name)
    }
}

/// Guard returned by [`Timer::start`]. Stops timing the operation when dropped.
pub struct TimerGuard<'a> {
    start: Instant,
    timer: &'a Timer,
}

impl Drop for TimerGuard<'_> {
    fn drop(&mut self) {
        self.timer.stop(self.start);
    }
}

/// Logs frames per second with optional extra data.
pub struct FpsCounter {
    name: String,
    frames: u32,
    start: Instant,
}

impl FpsCounter {
    pub fn new<N: Into<String>>(name: N) -> Self {
        Self {
            name: name.into(),
            frames: 0,
            start: Instant::now(),
        }
    }

    /// Advances the frame counter by 1 and logs FPS and `extra` data if one second has passed.
    pub fn tick_with<D: fmt::Display, I: IntoIterator<Item = D>>(&mut self, extra: I) {
        self.frames += 1;
        if self.start.elapsed() > Duration::from_secs(1) {
            log::debug!(
                "{}: {} FPS{}",
                self.name,
                self.frames,
                DisplayExtra(Cell::new(Some(extra.into_iter())))
            );

            self.frames = 0;
            self.start = Instant::now();
        }
    }
}

/// Formats a list of items as ` (a, b, c)`, or nothing if the list is empty.
///
/// The iterator is consumed on first use, so this must only be formatted once.
struct DisplayExtra<D: fmt::Display, I: Iterator<Item = D>>(Cell<Option<I>>);

impl<D: fmt::Display, I: Iterator<Item = D>> fmt::Display for DisplayExtra<D, I> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let Some(iter) = self.0.take() else {
            return Ok(());
        };
        let mut iter = iter.peekable();
        if iter.peek().is_none() {
            return Ok(());
        }
        write!(f, " ({})", iter.format(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_resets() {
        let timer = Timer::new("infer");
        timer.record(Duration::from_millis(10));
        assert_eq!(timer.to_string(), "infer: 1x10.0ms");
        assert_eq!(timer.to_string(), "infer: 0x0.0ms");
    }

    #[test]
    fn averages() {
        let timer = Timer::new("decode");
        timer.record(Duration::from_millis(10));
        timer.record(Duration::from_millis(20));
        // 10 + 0.3 * (20 - 10)
        assert_eq!(timer.to_string(), "decode: 2x13.0ms");
    }

    #[test]
    fn guard_records() {
        let timer = Timer::new("op");
        let value = timer.time(|| 42);
        assert_eq!(value, 42);
        assert!(timer.to_string().starts_with("op: 1x"));
    }

    #[test]
    fn extra_formatting() {
        let timers = [Timer::new("a"), Timer::new("b")];
        let s = DisplayExtra(Cell::new(Some(timers.iter()))).to_string();
        assert_eq!(s, " (a: 0x0.0ms, b: 0x0.0ms)");

        let s = DisplayExtra(Cell::new(Some(std::iter::empty::<&Timer>()))).to_string();
        assert_eq!(s, "");
    }
}
