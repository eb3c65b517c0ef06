//! The single clock that makes the two sensor streams comparable.
//!
//! Each stream arrives on its own thread with its own device-internal
//! notion of time; neither of those clocks is trusted. Instead, every
//! sample and every trial event is stamped with [`TimestampAuthority::now`]
//! at the moment it is pulled off the wire, and alignment between streams
//! is done after the fact by comparing those receipt stamps. One authority
//! lives for exactly one recording session.

use std::fmt::{self, Display};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// Microseconds elapsed since the session's timestamp origin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct MonotonicTime {
    micros: u64,
}

impl MonotonicTime {
    /// Wrap a raw microsecond offset.
    pub fn from_micros(micros: u64) -> Self {
        Self { micros }
    }

    /// The raw microsecond offset.
    pub fn as_micros(&self) -> u64 {
        self.micros
    }

    /// Seconds since the origin, at store precision.
    pub fn as_secs_f32(&self) -> f32 {
        self.micros as f32 / 1_000_000.0
    }

    /// Seconds since the origin.
    pub fn as_secs_f64(&self) -> f64 {
        self.micros as f64 / 1_000_000.0
    }
}

impl Display for MonotonicTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.6}", self.as_secs_f64())
    }
}

/// Process-wide monotonic clock, shared by `Arc` between both capture
/// loops and the trial scheduler.
///
/// `Instant` is already monotonic on every platform we care about, but two
/// threads reading it concurrently may still observe their reads in an
/// order that disagrees with the values. The atomic max below pins the
/// guarantee we actually need: no call to [`now`](Self::now) ever returns
/// a value smaller than one returned before it.
#[derive(Debug)]
pub struct TimestampAuthority {
    origin: Instant,
    latest: AtomicU64,
}

impl TimestampAuthority {
    /// A fresh authority whose origin is the moment of this call.
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            latest: AtomicU64::new(0),
        }
    }

    /// The current session time, non-decreasing across concurrent callers.
    pub fn now(&self) -> MonotonicTime {
        let elapsed = self.origin.elapsed().as_micros() as u64;
        let seen = self.latest.fetch_max(elapsed, Ordering::AcqRel);
        MonotonicTime::from_micros(elapsed.max(seen))
    }
}

impl Default for TimestampAuthority {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn stamps_never_decrease() {
        let authority = TimestampAuthority::new();
        let mut previous = authority.now();
        for _ in 0..10_000 {
            let stamp = authority.now();
            assert!(stamp >= previous);
            previous = stamp;
        }
    }

    #[test]
    fn stamps_never_decrease_across_threads() {
        let authority = Arc::new(TimestampAuthority::new());

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let authority = Arc::clone(&authority);
                thread::spawn(move || {
                    let mut stamps = Vec::with_capacity(1_000);
                    for _ in 0..1_000 {
                        stamps.push(authority.now());
                    }
                    stamps
                })
            })
            .collect();

        for handle in handles {
            let stamps = handle.join().unwrap();
            assert!(stamps.windows(2).all(|w| w[0] <= w[1]));
        }
    }

    #[test]
    fn displays_as_fractional_seconds() {
        let stamp = MonotonicTime::from_micros(1_500_000);
        assert_eq!(stamp.to_string(), "1.500000");
    }
}
