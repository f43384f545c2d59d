use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Per-player clock allotment. Each value gets its own matching pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TimeControl {
    OneMinute,
    ThreeMinutes,
    FiveMinutes,
    TenMinutes,
}

impl TimeControl {
    pub const ALL: [TimeControl; 4] = [
        TimeControl::OneMinute,
        TimeControl::ThreeMinutes,
        TimeControl::FiveMinutes,
        TimeControl::TenMinutes,
    ];

    pub fn from_minutes(minutes: u32) -> Option<TimeControl> {
        match minutes {
            1 => Some(TimeControl::OneMinute),
            3 => Some(TimeControl::ThreeMinutes),
            5 => Some(TimeControl::FiveMinutes),
            10 => Some(TimeControl::TenMinutes),
            _ => None,
        }
    }

    pub fn minutes(self) -> u32 {
        match self {
            TimeControl::OneMinute => 1,
            TimeControl::ThreeMinutes => 3,
            TimeControl::FiveMinutes => 5,
            TimeControl::TenMinutes => 10,
        }
    }

    pub fn duration(self) -> Duration {
        Duration::from_secs(u64::from(self.minutes()) * 60)
    }
}

impl fmt::Display for TimeControl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}min", self.minutes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case(1, TimeControl::OneMinute ; "bullet")]
    #[test_case(3, TimeControl::ThreeMinutes ; "blitz three")]
    #[test_case(5, TimeControl::FiveMinutes ; "blitz five")]
    #[test_case(10, TimeControl::TenMinutes ; "rapid")]
    fn test_from_minutes_supported(minutes: u32, expected: TimeControl) {
        assert_eq!(TimeControl::from_minutes(minutes), Some(expected));
        assert_eq!(expected.minutes(), minutes);
    }

    #[test_case(0)]
    #[test_case(2)]
    #[test_case(15)]
    fn test_from_minutes_unsupported(minutes: u32) {
        assert_eq!(TimeControl::from_minutes(minutes), None);
    }

    #[test]
    fn test_duration() {
        assert_eq!(TimeControl::ThreeMinutes.duration(), Duration::from_secs(180));
    }
}
