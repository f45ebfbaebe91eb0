use chrono::{Days, Duration, NaiveDateTime, NaiveTime};
use std::convert::Infallible;
use std::fmt;
use std::str::FromStr;

const TONIGHT_HOUR: u32 = 21;
const TOMORROW_HOUR: u32 = 9;

/// Relative scheduling shorthands.
///
/// - InOneHour (+1h): sixty minutes from now
/// - Tonight: 21:00 today, or tomorrow once 21:00 has been reached
/// - Tomorrow: 09:00 on the next calendar day
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Preset {
    #[default]
    InOneHour,
    Tonight,
    Tomorrow,
}

impl Preset {
    pub const ALL: [Preset; 3] = [Preset::InOneHour, Preset::Tonight, Preset::Tomorrow];

    /// Parse a preset token. Unknown tokens fall back to `InOneHour`.
    pub fn parse(token: &str) -> Self {
        match token.trim().to_ascii_lowercase().as_str() {
            "tonight" => Self::Tonight,
            "tomorrow" => Self::Tomorrow,
            _ => Self::InOneHour,
        }
    }

    pub fn as_token(&self) -> &'static str {
        match self {
            Self::InOneHour => "+1h",
            Self::Tonight => "tonight",
            Self::Tomorrow => "tomorrow",
        }
    }

    pub fn resolve(&self, now: NaiveDateTime) -> NaiveDateTime {
        match self {
            Self::InOneHour => now + Duration::minutes(60),
            Self::Tonight => {
                let tonight = now.date().and_time(on_the_hour(TONIGHT_HOUR));
                if tonight <= now {
                    next_day(tonight)
                } else {
                    tonight
                }
            }
            Self::Tomorrow => next_day(now.date().and_time(on_the_hour(TOMORROW_HOUR))),
        }
    }
}

impl fmt::Display for Preset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_token())
    }
}

impl FromStr for Preset {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::parse(s))
    }
}

/// Resolve a raw token such as `"tonight"`; never fails.
pub fn resolve_token(token: &str, now: NaiveDateTime) -> NaiveDateTime {
    Preset::parse(token).resolve(now)
}

/// The time offered when nothing is being edited.
pub fn default_time(now: NaiveDateTime) -> NaiveDateTime {
    Preset::InOneHour.resolve(now)
}

fn on_the_hour(hour: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(hour, 0, 0).unwrap_or_default()
}

fn next_day(ts: NaiveDateTime) -> NaiveDateTime {
    ts.checked_add_days(Days::new(1)).unwrap_or(ts)
}
