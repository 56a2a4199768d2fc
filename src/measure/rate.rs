use anyhow::{bail, ensure};
use logos::{Lexer, Logos};
use std::{
    fmt,
    str::FromStr,
    sync::atomic::{AtomicU64, Ordering},
    time::Duration,
};

/// The [`Rate`] at which a [`Link`](crate::link::Link) can move bits in one
/// direction.
///
/// Internally stores **bits per second** as an [`AtomicU64`]. The simulation
/// itself is single-threaded (see the crate-level docs), but the atomic
/// storage is kept rather than plain interior-mutable state: it gives a
/// cheap, allocation-free `Clone` and in-place `set` without introducing
/// `Cell`.
///
/// ## Constructing
///
/// ```
/// # use tcpsim_core::measure::Rate;
/// # use std::time::Duration;
/// let rate = Rate::new(8_000_000); // 8 Mbps
/// let bits = rate.bits_in(Duration::from_millis(1));
/// # assert_eq!(bits, 8_000);
/// ```
///
/// Or parse a human-readable string:
///
/// ```
/// # use tcpsim_core::measure::Rate;
/// let rate: Rate = "100mbps".parse().unwrap();
/// ```
pub struct Rate(AtomicU64);

impl Rate {
    /// Effectively unlimited bandwidth.
    #[allow(clippy::declare_interior_mutable_const)]
    pub const MAX: Self = Self(AtomicU64::new(u64::MAX));

    /// Creates a [`Rate`] from a bits-per-second value.
    pub const fn new(bits_per_sec: u64) -> Self {
        Self(AtomicU64::new(bits_per_sec))
    }

    /// Returns the raw bits-per-second value.
    pub fn bits_per_sec(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }

    /// Returns how many whole bits can cross in `elapsed`.
    ///
    /// Uses integer arithmetic: a very short `elapsed` relative to the rate
    /// may floor to 0 bits, meaning nothing moves on that tick.
    pub fn bits_in(&self, elapsed: Duration) -> u64 {
        let bps = self.bits_per_sec() as u128;
        let us = elapsed.as_micros();
        let bits = bps.saturating_mul(us) / 1_000_000;
        bits.min(u64::MAX as u128) as u64
    }

    /// Returns the smallest tick duration for which [`Rate::bits_in`] is at
    /// least one bit. Used by [`Network::min_tick_ms`](crate::network::Network::min_tick_ms)
    /// to warn against ticks too short to make progress on a slow link.
    pub fn minimum_step_duration(&self) -> Duration {
        let bps = self.bits_per_sec();
        if bps == 0 {
            return Duration::ZERO;
        }
        Duration::from_micros(1_000_000u64.div_ceil(bps))
    }

    /// Overwrites this rate with a new value.
    pub fn set(&self, this: Rate) {
        self.0.store(this.bits_per_sec(), Ordering::Relaxed);
    }
}

impl Clone for Rate {
    fn clone(&self) -> Self {
        Self(AtomicU64::new(self.bits_per_sec()))
    }
}

impl PartialEq for Rate {
    fn eq(&self, other: &Self) -> bool {
        self.bits_per_sec() == other.bits_per_sec()
    }
}
impl Eq for Rate {}
impl PartialOrd for Rate {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for Rate {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.bits_per_sec().cmp(&other.bits_per_sec())
    }
}
impl std::hash::Hash for Rate {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.bits_per_sec().hash(state);
    }
}
impl fmt::Debug for Rate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Rate").field(&self.bits_per_sec()).finish()
    }
}

const K: u64 = 1_000;
const M: u64 = 1_000_000;
const G: u64 = 1_000_000_000;

impl fmt::Display for Rate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let bps = self.bits_per_sec();
        let (divisor, unit) = if bps < K {
            return write!(f, "{bps}bps");
        } else if bps < M {
            (K, "kbps")
        } else if bps < G {
            (M, "mbps")
        } else {
            (G, "gbps")
        };

        if bps.is_multiple_of(divisor) {
            write!(f, "{}{unit}", bps / divisor)
        } else {
            let val = bps as f64 / divisor as f64;
            let s = format!("{val:.2}");
            let s = s.trim_end_matches('0');
            write!(f, "{s}{unit}")
        }
    }
}

#[derive(Logos, Debug, PartialEq)]
#[logos(skip r"[ \t\n\f]+")]
enum RateToken {
    #[regex("bps")]
    Bps,
    #[regex("kbps")]
    Kbps,
    #[regex("mbps")]
    Mbps,
    #[regex("gbps")]
    Gbps,

    #[regex("[0-9]+")]
    Value,
}

impl FromStr for Rate {
    type Err = anyhow::Error;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut lex = Lexer::<'_, RateToken>::new(s);

        let Some(Ok(RateToken::Value)) = lex.next() else {
            bail!("Expecting to parse a number")
        };
        let number: u64 = lex.slice().parse()?;
        let Some(Ok(token)) = lex.next() else {
            bail!("Expecting to parse a unit")
        };
        let (multiplier, unit) = match token {
            RateToken::Bps => (1, "bps"),
            RateToken::Kbps => (K, "kbps"),
            RateToken::Mbps => (M, "mbps"),
            RateToken::Gbps => (G, "gbps"),
            RateToken::Value => bail!("Expecting to parse a unit (bps, kbps, ...)"),
        };
        let Some(bps) = number.checked_mul(multiplier) else {
            bail!("{number}{unit} overflows maximum rate ({max})", max = Rate::MAX)
        };

        ensure!(
            lex.next().is_none(),
            "Not expecting any other tokens to parse a rate"
        );

        Ok(Self::new(bps))
    }
}

impl Default for Rate {
    fn default() -> Self {
        Rate::MAX
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_rate() {
        assert_eq!("0bps".parse::<Rate>().unwrap().bits_per_sec(), 0);
        assert_eq!("42bps".parse::<Rate>().unwrap().bits_per_sec(), 42);
        assert_eq!("42kbps".parse::<Rate>().unwrap().bits_per_sec(), 42_000);
        assert_eq!("42mbps".parse::<Rate>().unwrap().bits_per_sec(), 42_000_000);
        assert_eq!(
            "42gbps".parse::<Rate>().unwrap().bits_per_sec(),
            42_000_000_000
        );
    }

    #[test]
    fn print_rate() {
        assert_eq!(Rate::new(0).to_string(), "0bps");
        assert_eq!(Rate::new(1_000).to_string(), "1kbps");
        assert_eq!(Rate::new(1_500).to_string(), "1.5kbps");
        assert_eq!(Rate::new(1_000_000).to_string(), "1mbps");
        assert_eq!(Rate::new(1_000_000_000).to_string(), "1gbps");
    }

    #[test]
    fn bits_in_8mbps() {
        let rate = Rate::new(8_000_000);
        assert_eq!(rate.bits_in(Duration::from_millis(1)), 8_000);
        assert_eq!(rate.bits_in(Duration::from_secs(1)), 8_000_000);
    }

    #[test]
    fn zero_rate_moves_nothing() {
        let rate = Rate::new(0);
        assert_eq!(rate.bits_in(Duration::from_secs(1)), 0);
    }

    #[test]
    fn parse_invalid_strings() {
        assert!("42".parse::<Rate>().is_err());
        assert!("mbps".parse::<Rate>().is_err());
        assert!("".parse::<Rate>().is_err());
        assert!("42mbps extra".parse::<Rate>().is_err());
    }

    #[test]
    fn clone_is_independent() {
        let original = Rate::new(40_000_000);
        let clone = original.clone();
        original.set(Rate::new(80_000_000));
        assert_eq!(clone.bits_per_sec(), 40_000_000);
        assert_eq!(original.bits_per_sec(), 80_000_000);
    }

    #[test]
    fn minimum_step_duration() {
        assert_eq!(
            Rate::new(8_000_000).minimum_step_duration(),
            Duration::from_micros(1)
        );
        assert_eq!(Rate::new(0).minimum_step_duration(), Duration::ZERO);
    }
}
