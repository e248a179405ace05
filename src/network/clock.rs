//! Clock Reconciliation
//!
//! Decides how many whole ticks to run this frame and nudges a persisted
//! baseline (`prev_time`) so the local tick count trails the swarm's net
//! tic by about `input_delay` ticks. It is handed `ts`; it never reads a
//! clock itself.

/// Fraction of the gap closed per frame while starved.
pub const STARVED_EASE: f64 = 0.01;

/// Frame pacing controller.
#[derive(Debug, Clone)]
pub struct ClockController {
    prev_time: f64,
    tick_rate: f64,
    input_delay: u32,
}

impl ClockController {
    /// Controller starting at `ts`.
    pub fn new(tick_rate: u32, input_delay: u32, ts: f64) -> Self {
        Self {
            prev_time: ts,
            tick_rate: tick_rate.max(1) as f64,
            input_delay,
        }
    }

    /// Baseline the next tick is measured from.
    pub fn prev_time(&self) -> f64 {
        self.prev_time
    }

    /// Seconds per tick.
    #[inline]
    pub fn tick_duration(&self) -> f64 {
        1.0 / self.tick_rate
    }

    /// Whole ticks real time is ahead of the baseline.
    pub fn owed(&self, ts: f64) -> u32 {
        let frames = ((ts - self.prev_time) * self.tick_rate).floor();
        if frames <= 0.0 {
            0
        } else {
            frames as u32
        }
    }

    /// Re-base on `ts`, used after adopting a bootstrap snapshot.
    pub fn reset(&mut self, ts: f64) {
        self.prev_time = ts;
    }

    /// Number of ticks to simulate now, starting at `next_tic`.
    ///
    /// `net_tic` is the highest tic every eligible peer has supplied
    /// input for; `None` means there is nobody to wait for and real time
    /// alone decides.
    pub fn schedule(&mut self, ts: f64, next_tic: u32, net_tic: Option<u32>) -> u32 {
        let available = self.owed(ts);
        let steps = match net_tic {
            Some(net) => available.min(net.saturating_add(1).saturating_sub(next_tic)),
            None => available,
        };
        self.prev_time += steps as f64 / self.tick_rate;

        if let Some(net) = net_tic {
            let next = next_tic.saturating_add(steps);
            let lead = self.input_delay as f64 / self.tick_rate;
            if next > net {
                // Starved: drift toward ts - lead, slowing down
                if ts - self.prev_time > lead {
                    self.prev_time += (ts - lead - self.prev_time) * STARVED_EASE;
                }
            } else if net - next + 1 > self.input_delay {
                // Backlog: speed up by one tick
                self.prev_time -= self.tick_duration();
            }
        }
        steps
    }
}
