//! Simulation dates. The simulator steps whole days, so a date is a signed day number. Day 0 is
//! the calendar origin of a scenario; the smart seed's mock run may start on any day.

use serde::{Deserialize, Serialize};
use std::fmt::{self, Display};
use std::ops::{Add, AddAssign, Sub};

#[derive(
    Copy, Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Date(pub i32);

impl Date {
    #[must_use]
    pub fn next(self) -> Date {
        Date(self.0 + 1)
    }

    /// Number of days from `earlier` to `self`.
    #[must_use]
    pub fn days_since(self, earlier: Date) -> i32 {
        self.0 - earlier.0
    }
}

impl Add<i32> for Date {
    type Output = Date;

    fn add(self, days: i32) -> Date {
        Date(self.0 + days)
    }
}

impl Add<u32> for Date {
    type Output = Date;

    fn add(self, days: u32) -> Date {
        Date(self.0 + i32::try_from(days).expect("day offsets fit in i32"))
    }
}

impl AddAssign<i32> for Date {
    fn add_assign(&mut self, days: i32) {
        self.0 += days;
    }
}

impl Sub for Date {
    type Output = i32;

    fn sub(self, other: Date) -> i32 {
        self.0 - other.0
    }
}

impl Display for Date {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "day {}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn arithmetic() {
        let d = Date(3);
        assert_eq!(d + 4_i32, Date(7));
        assert_eq!(d + 2_u32, Date(5));
        assert_eq!(Date(10) - d, 7);
        assert_eq!(d.next(), Date(4));
        assert_eq!(Date(1).days_since(Date(5)), -4);
    }

    #[test]
    fn serializes_as_number() {
        assert_eq!(serde_json::to_string(&Date(12)).unwrap(), "12");
        let d: Date = serde_json::from_str("-2").unwrap();
        assert_eq!(d, Date(-2));
    }
}
