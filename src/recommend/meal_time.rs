use std::fmt;

use serde::{Deserialize, Serialize};
use time::{OffsetDateTime, UtcOffset};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MealTime {
    Breakfast,
    Lunch,
    Dinner,
}

impl MealTime {
    /// Meal period of `now` on the local clock: 03–11 breakfast, 11–17 lunch,
    /// dinner otherwise.
    pub fn at(now: OffsetDateTime, offset: UtcOffset) -> Self {
        match now.to_offset(offset).hour() {
            3..=10 => MealTime::Breakfast,
            11..=16 => MealTime::Lunch,
            _ => MealTime::Dinner,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MealTime::Breakfast => "Breakfast",
            MealTime::Lunch => "Lunch",
            MealTime::Dinner => "Dinner",
        }
    }
}

impl fmt::Display for MealTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Start of the local calendar day containing `now`, as an absolute instant.
pub fn start_of_local_day(now: OffsetDateTime, offset: UtcOffset) -> OffsetDateTime {
    now.to_offset(offset).replace_time(time::Time::MIDNIGHT)
}
