//! An exponentially-weighted moving average.
//!
//! See:
//! - [UNIX Load Average Part 1: How It Works](http://www.teamquest.com/pdfs/whitepaper/ldavg1.pdf)
//! - [UNIX Load Average Part 2: Not Your Average Average](http://www.teamquest.com/pdfs/whitepaper/ldavg2.pdf)

/// Interval, in seconds, at which the load-average style averages expect to be ticked.
pub const TICK_INTERVAL: f64 = 5.0;

fn load_average_alpha(minutes: f64) -> f64 {
    1.0 - (-TICK_INTERVAL / 60.0 / minutes).exp()
}

/// An exponentially-weighted moving average of an event rate.
///
/// Events are accumulated with [`update`](Ewma::update) and only folded into the rate when
/// [`tick`](Ewma::tick) is called, which must happen at the fixed interval the average was built with. The first
/// tick seeds the rate with the instant rate; every later tick moves it `alpha` of the way towards the instant rate.
#[derive(Debug, Clone)]
pub struct Ewma {
    alpha: f64,
    interval: f64,
    initialized: bool,
    rate: f64,
    uncounted: f64,
}

impl Ewma {
    /// Creates a new `Ewma` with the given smoothing constant, expecting to be ticked every `interval` seconds.
    pub fn new(alpha: f64, interval: f64) -> Self {
        Ewma { alpha, interval, initialized: false, rate: 0.0, uncounted: 0.0 }
    }

    /// Creates an `Ewma` equivalent to the UNIX one minute load average, ticked every five seconds.
    pub fn one_minute() -> Self {
        Ewma::new(load_average_alpha(1.0), TICK_INTERVAL)
    }

    /// Creates an `Ewma` equivalent to the UNIX five minute load average, ticked every five seconds.
    pub fn five_minute() -> Self {
        Ewma::new(load_average_alpha(5.0), TICK_INTERVAL)
    }

    /// Creates an `Ewma` equivalent to the UNIX fifteen minute load average, ticked every five seconds.
    pub fn fifteen_minute() -> Self {
        Ewma::new(load_average_alpha(15.0), TICK_INTERVAL)
    }

    /// Records `n` new events.
    pub fn update(&mut self, n: f64) {
        self.uncounted += n;
    }

    /// Marks the passage of one interval, decaying the current rate accordingly.
    pub fn tick(&mut self) {
        let instant_rate = self.uncounted / self.interval;
        self.uncounted = 0.0;

        if self.initialized {
            self.rate += self.alpha * (instant_rate - self.rate);
        } else {
            self.rate = instant_rate;
            self.initialized = true;
        }
    }

    /// Gets the rate, in events per second.
    pub fn rate(&self) -> f64 {
        self.rate
    }

    /// Gets the smoothing constant.
    pub fn alpha(&self) -> f64 {
        self.alpha
    }
}
