/*!
  # Bit timing primitives

  Every edge produced by the bus engines is separated by a half-cycle delay
  made of a number of calibrated *spin units*. How long one unit lasts is
  hardware specific, so it is measured at runtime: the bus clocks a burst of
  bytes with no extra delay, then again with a known number of units, and the
  two samples give the line

  ```text
  period(n) = overhead + 2 * n * unit
  ```

  which is inverted to turn a requested frequency into a unit count.
  [`Calibration::tune`] then corrects the estimate by remeasuring.
*/

use embedded_hal::timer::{CountDown, Periodic};
use log::{debug, info, warn};
use void::Void;

/// Lowest clock frequency a bus may be tuned to.
pub const MIN_FREQUENCY_HZ: u32 = 100_000;

/// Unit count used for the second calibration sample.
pub const CALIBRATION_LOAD: u32 = 50;

/// Estimated counts below this are resolved by a brute-force sweep.
pub const SWEEP_THRESHOLD: f64 = 3.0;

/// Largest count tried by the brute-force sweep.
pub const SWEEP_MAX: u32 = 2;

/// Relative error at which tuning stops.
pub const TOLERANCE: f64 = 0.03;

/// Number of ±1 corrections tried after the initial estimate.
pub const MAX_ADJUSTMENTS: usize = 5;

/// Largest unit count `tune` will apply to a bus.
pub const MAX_HALF_CYCLE: u32 = 100_000;

/// Delay by a number of calibrated units.
///
/// The bus engines never sleep; they spin. Implementations may burn `nop`s,
/// poll a cycle counter or wait on a hardware timer, as long as the time
/// taken grows linearly with `units`.
pub trait SpinDelay {
    /// Spin for `units` calibrated units. Zero returns immediately.
    fn spin(&mut self, units: u32);
}

impl<T: SpinDelay + ?Sized> SpinDelay for &mut T {
    #[inline]
    fn spin(&mut self, units: u32) {
        (**self).spin(units)
    }
}

/// Busy loop built on [`core::hint::spin_loop`].
#[derive(Debug, Default, Clone, Copy)]
pub struct NopSpin;

impl SpinDelay for NopSpin {
    #[inline]
    fn spin(&mut self, units: u32) {
        for _ in 0..units {
            core::hint::spin_loop();
        }
    }
}

/// Monotonic time source used to measure achieved clock rates.
pub trait Stopwatch {
    /// Current timestamp in nanoseconds. Only differences are used.
    fn now_ns(&mut self) -> u64;
}

impl<T: Stopwatch + ?Sized> Stopwatch for &mut T {
    #[inline]
    fn now_ns(&mut self) -> u64 {
        (**self).now_ns()
    }
}

/// Periodic timer made from a [`SpinDelay`].
///
/// Each `wait` spins for the configured number of units, which lets timer
/// driven engines such as [`crate::i2c::I2cBB`] run without a hardware timer.
#[derive(Debug)]
pub struct SpinTimer<D> {
    delay: D,
    period: u32,
}

impl<D: SpinDelay> SpinTimer<D> {
    /// Create a timer whose period is `period` spin units
    pub fn new(delay: D, period: u32) -> Self {
        SpinTimer { delay, period }
    }

    pub fn period(&self) -> u32 {
        self.period
    }

    pub fn free(self) -> D {
        self.delay
    }
}

impl<D: SpinDelay> CountDown for SpinTimer<D> {
    type Time = u32;

    fn start<T>(&mut self, count: T)
    where
        T: Into<u32>,
    {
        self.period = count.into();
    }

    fn wait(&mut self) -> nb::Result<(), Void> {
        self.delay.spin(self.period);
        Ok(())
    }
}

impl<D: SpinDelay> Periodic for SpinTimer<D> {}

/// Measured clock model of a bus and the unit count currently in use.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Calibration {
    overhead_ns: f64,
    unit_ns: f64,
    max_hz: f64,
    current_hz: f64,
    half_cycle: u32,
}

impl Calibration {
    /// Fit the clock model from two samples.
    ///
    /// `baseline_hz` was measured with zero units per half cycle and
    /// `loaded_hz` with `load` units per half cycle. Returns `None` when the
    /// loaded sample is not slower than the baseline, since no unit count
    /// could then lower the clock.
    pub fn from_samples(baseline_hz: f64, loaded_hz: f64, load: u32) -> Option<Self> {
        let t1 = 1e9 / baseline_hz;
        let t2 = 1e9 / loaded_hz;
        // units are spent twice per clock period
        let unit_ns = (t2 - t1) / (2.0 * f64::from(load.max(1)));
        if !(unit_ns > 0.0) || !unit_ns.is_finite() || !t1.is_finite() {
            warn!(
                "calibration slope is not positive ({} ns per unit), spin delay has no effect",
                unit_ns
            );
            return None;
        }

        debug!(
            "clock model: overhead {} ns, {} ns per unit, max {} Hz",
            t1, unit_ns, baseline_hz
        );

        Some(Calibration {
            overhead_ns: t1,
            unit_ns,
            max_hz: baseline_hz,
            current_hz: baseline_hz,
            half_cycle: 0,
        })
    }

    pub fn overhead_ns(&self) -> f64 {
        self.overhead_ns
    }

    pub fn unit_ns(&self) -> f64 {
        self.unit_ns
    }

    /// Fastest achievable clock, measured with zero delay.
    pub fn max_hz(&self) -> u32 {
        self.max_hz as u32
    }

    /// Clock rate measured for the unit count in use.
    pub fn current_hz(&self) -> u32 {
        self.current_hz as u32
    }

    /// Units spun per half clock cycle.
    pub fn half_cycle(&self) -> u32 {
        self.half_cycle
    }

    /// Predicted clock period for a unit count.
    pub fn period_ns(&self, half_cycle: u32) -> f64 {
        self.overhead_ns + 2.0 * f64::from(half_cycle) * self.unit_ns
    }

    /// Unit count the model predicts for `hz`, before truncation.
    pub fn estimate(&self, hz: f64) -> f64 {
        (1e9 / hz - self.overhead_ns) / (2.0 * self.unit_ns)
    }

    /// Pick the unit count that best achieves `requested_hz`.
    ///
    /// `measure` applies a unit count to the bus and returns the frequency it
    /// actually achieves. Requests above the measured maximum run at full
    /// speed with no delay; requests below [`MIN_FREQUENCY_HZ`] are raised to
    /// it. Unit counts never exceed [`MAX_HALF_CYCLE`]. Returns the achieved
    /// frequency, which is also recorded. If `measure` fails the previous
    /// state is kept.
    pub fn tune<E, F>(&mut self, requested_hz: u32, mut measure: F) -> Result<u32, E>
    where
        F: FnMut(u32) -> Result<f64, E>,
    {
        if f64::from(requested_hz) > self.max_hz {
            warn!(
                "cannot exceed {} Hz, requested {} Hz; running at maximum",
                self.max_hz as u32, requested_hz
            );
            self.half_cycle = 0;
            self.current_hz = self.max_hz;
            return Ok(self.current_hz());
        }

        let target = if requested_hz < MIN_FREQUENCY_HZ {
            warn!(
                "cannot go below {} Hz, requested {} Hz",
                MIN_FREQUENCY_HZ, requested_hz
            );
            f64::from(MIN_FREQUENCY_HZ)
        } else {
            f64::from(requested_hz)
        };

        let estimate = self.estimate(target);

        if estimate < SWEEP_THRESHOLD {
            // the fit is too coarse this close to zero delay, try every count
            let mut best_count = 0;
            let mut best_error = f64::MAX;
            for count in 0..=SWEEP_MAX {
                let error = relative_error(measure(count)?, target);
                if error < best_error {
                    best_error = error;
                    best_count = count;
                }
            }

            let achieved = measure(best_count)?;
            self.half_cycle = best_count;
            self.current_hz = achieved;
            info!(
                "clock set to {} kHz ({} units, swept)",
                self.current_hz() / 1000,
                best_count
            );
            return Ok(self.current_hz());
        }

        if estimate > f64::from(MAX_HALF_CYCLE) {
            warn!(
                "{} Hz needs {} units, capping at {}",
                target as u32, estimate, MAX_HALF_CYCLE
            );
        }
        let mut count = (estimate as u32).min(MAX_HALF_CYCLE);
        let mut achieved = measure(count)?;
        let mut adjustments = 0;
        while relative_error(achieved, target) >= TOLERANCE && adjustments < MAX_ADJUSTMENTS {
            if achieved > target {
                if count == MAX_HALF_CYCLE {
                    break;
                }
                count += 1;
            } else {
                count = count.saturating_sub(1);
            }
            achieved = measure(count)?;
            adjustments += 1;
        }

        self.half_cycle = count;
        self.current_hz = achieved;
        info!(
            "clock set to {} kHz ({} units)",
            self.current_hz() / 1000,
            count
        );
        Ok(self.current_hz())
    }
}

/// `|actual - target| / target`
pub fn relative_error(actual: f64, target: f64) -> f64 {
    let error = (actual - target) / target;
    if error < 0.0 {
        -error
    } else {
        error
    }
}
