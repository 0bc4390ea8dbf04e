use parking_lot::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

const TICKS_PER_MILLI: i64 = 1_000_000;

#[derive(Debug, Default)]
struct ClockState {
    millis: i64,
    counter: i64,
    last: i64,
}

/// Process-wide source of write timestamps.
///
/// A timestamp is `millis * 1_000_000 + counter`, where the counter restarts
/// at every new millisecond. Values are strictly increasing even if the wall
/// clock steps backwards, and never zero.
#[derive(Debug, Default)]
pub struct LogicalClock {
    state: Mutex<ClockState>,
}

impl LogicalClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn now(&self) -> i64 {
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as i64)
            .unwrap_or(0);

        let mut state = self.state.lock();
        if millis != state.millis {
            state.millis = millis;
            state.counter = 0;
        }
        let candidate = millis.saturating_mul(TICKS_PER_MILLI) + state.counter;
        state.counter += 1;

        let ts = candidate.max(state.last + 1);
        state.last = ts;
        ts
    }
}
