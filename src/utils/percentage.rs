use std::{fmt::Display, ops::Deref, str::FromStr};

use anyhow::anyhow;
use chrono::Duration;

#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct Percentage(f64);

impl Display for Percentage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}%", self.0)
    }
}

impl Percentage {
    pub const ZERO: Percentage = Percentage(0.);

    pub fn new_opt(value: f64) -> Option<Percentage> {
        if value < 0. || value.is_nan() {
            None
        } else {
            Some(Percentage(value))
        }
    }
}

impl FromStr for Percentage {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim_end_matches('%');
        let v = s.parse::<f64>()?;
        Percentage::new_opt(v).ok_or_else(|| anyhow!("Can't parse {s} into percentage"))
    }
}

impl Deref for Percentage {
    type Target = f64;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

/// Share of `whole` taken by `value`. An empty whole has no shares.
pub fn duration_percentage(value: Duration, whole: Duration) -> Percentage {
    if whole <= Duration::zero() {
        return Percentage::ZERO;
    }
    Percentage::new_opt(value.num_milliseconds() as f64 / whole.num_milliseconds() as f64 * 100.)
        .unwrap_or(Percentage::ZERO)
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::{duration_percentage, Percentage};

    #[test]
    fn parses_with_and_without_sign() -> anyhow::Result<()> {
        assert_eq!("5%".parse::<Percentage>()?, Percentage::new_opt(5.).unwrap());
        assert_eq!("12.5".parse::<Percentage>()?, Percentage::new_opt(12.5).unwrap());
        assert!("-1".parse::<Percentage>().is_err());
        Ok(())
    }

    #[test]
    fn share_of_duration() {
        let share = duration_percentage(Duration::minutes(15), Duration::hours(1));
        assert_eq!(*share, 25.);
        assert_eq!(duration_percentage(Duration::minutes(15), Duration::zero()), Percentage::ZERO);
    }
}
