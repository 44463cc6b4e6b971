//! Deterministic synthetic bars for tests, benches and demos.
//!
//! Prices follow a geometric Brownian motion driven by a seeded `StdRng`, so
//! the same seed always yields the same series.

use chrono::{Duration, NaiveDate};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::domain::{Bar, Timestamp};

/// Geometric Brownian motion bar generator.
#[derive(Debug, Clone)]
pub struct RandomGbm {
    rng: StdRng,
    /// Per-bar volatility as a fraction of price.
    volatility: f64,
    /// Per-bar drift as a fraction of price.
    drift: f64,
    last_close: f64,
    next_timestamp: Timestamp,
    step: Duration,
}

impl RandomGbm {
    /// Daily bars starting on 2000-01-03 at `start_price`.
    pub fn new(seed: u64, start_price: f64) -> Self {
        let start = NaiveDate::from_ymd_opt(2000, 1, 3)
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .unwrap_or_default();
        Self {
            rng: StdRng::seed_from_u64(seed),
            volatility: 0.01,
            drift: 0.0005,
            last_close: start_price,
            next_timestamp: start,
            step: Duration::days(1),
        }
    }

    pub fn with_volatility(mut self, volatility: f64, drift: f64) -> Self {
        self.volatility = volatility;
        self.drift = drift;
        self
    }

    pub fn with_step(mut self, start: Timestamp, step: Duration) -> Self {
        self.next_timestamp = start;
        self.step = step;
        self
    }

    /// Standard normal draw (Box-Muller).
    fn normal(&mut self) -> f64 {
        let u1: f64 = 1.0 - self.rng.gen::<f64>();
        let u2: f64 = self.rng.gen::<f64>();
        (-2.0 * u1.ln()).sqrt() * (std::f64::consts::TAU * u2).cos()
    }

    fn walk(&mut self, from: f64, volatility: f64, drift: f64) -> f64 {
        let z = self.normal();
        from * ((drift - 0.5 * volatility * volatility) + volatility * z).exp()
    }

    /// Generate the next bar.
    pub fn next_bar(&mut self) -> Bar {
        let (volatility, drift) = (self.volatility, self.drift);
        let open = self.walk(self.last_close, volatility * 0.3, 0.0);
        let close = self.walk(open, volatility, drift);
        let wick_up = self.walk(1.0, volatility * 0.5, 0.0).max(1.0);
        let wick_down = self.walk(1.0, volatility * 0.5, 0.0).min(1.0);
        let high = open.max(close) * wick_up;
        let low = open.min(close) * wick_down;
        let volume = (self.walk(1_000_000.0, 0.25, 0.0)).round();

        let bar = Bar::new(self.next_timestamp, open, high, low, close, volume);
        self.last_close = close;
        self.next_timestamp += self.step;
        bar
    }

    pub fn take_bars(&mut self, count: usize) -> Vec<Bar> {
        (0..count).map(|_| self.next_bar()).collect()
    }
}

impl Iterator for RandomGbm {
    type Item = Bar;

    fn next(&mut self) -> Option<Bar> {
        Some(self.next_bar())
    }
}

/// `count` daily bars from a fixed seed.
pub fn sample_bars(seed: u64, count: usize) -> Vec<Bar> {
    RandomGbm::new(seed, 100.0).take_bars(count)
}
