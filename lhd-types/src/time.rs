use core::fmt;
use core::ops::Add;

/// A point in simulation time: a real-time component in picoseconds and a
/// delta-cycle step ordering events at the same instant.
///
/// Ordering compares real time first, delta step second, so delta cycles
/// sort between two adjacent picoseconds the way the event queue expects.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TimeValue {
    /// Real time in picoseconds.
    pub ps: u64,
    /// Delta step within the same picosecond.
    pub delta: u32,
}

impl TimeValue {
    /// Simulation time zero.
    pub const ZERO: TimeValue = TimeValue { ps: 0, delta: 0 };

    /// A real-time amount in picoseconds, at delta step zero.
    pub const fn ps(ps: u64) -> Self {
        TimeValue { ps, delta: 0 }
    }

    /// A pure delta step at the current instant.
    pub const fn delta(delta: u32) -> Self {
        TimeValue { ps: 0, delta }
    }

    /// Construct from an amount and a unit suffix (`ps`, `ns`, `us`,
    /// `ms`, `s`).
    pub fn from_unit(amount: u64, unit: &str) -> Option<Self> {
        let scale: u64 = match unit {
            "ps" => 1,
            "ns" => 1_000,
            "us" => 1_000_000,
            "ms" => 1_000_000_000,
            "s" => 1_000_000_000_000,
            _ => return None,
        };
        Some(TimeValue::ps(amount.checked_mul(scale)?))
    }

    /// Advance by a relative amount. Adding a real-time amount resets the
    /// delta counter; adding a pure delta keeps the instant.
    pub fn advance(self, amount: TimeValue) -> TimeValue {
        if amount.ps > 0 {
            TimeValue {
                ps: self.ps + amount.ps,
                delta: 0,
            }
        } else {
            TimeValue {
                ps: self.ps,
                delta: self.delta + amount.delta,
            }
        }
    }
}

impl Add for TimeValue {
    type Output = TimeValue;

    fn add(self, rhs: TimeValue) -> TimeValue {
        self.advance(rhs)
    }
}

impl fmt::Display for TimeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (scale, unit) = [
            (1_000_000_000_000, "s"),
            (1_000_000_000, "ms"),
            (1_000_000, "us"),
            (1_000, "ns"),
            (1, "ps"),
        ]
        .into_iter()
        .find(|(scale, _)| self.ps % scale == 0 && (self.ps > 0 || *scale == 1))
        .expect("picoseconds always divide by one");
        write!(f, "{}{}", self.ps / scale, unit)?;
        if self.delta > 0 {
            write!(f, "+{}d", self.delta)?;
        }
        Ok(())
    }
}
