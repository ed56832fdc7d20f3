//! Trading sessions as UTC hour-of-day windows.

use chrono::{DateTime, Timelike, Utc};
use serde::Serialize;
use std::fmt;
use std::ops::Range;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Session {
    Tokyo,
    London,
    #[serde(rename = "NY")]
    NewYork,
}

impl Session {
    pub const ALL: [Session; 3] = [Session::Tokyo, Session::London, Session::NewYork];

    /// UTC hours covered by the session. Tokyo [0, 8), London [8, 14),
    /// NY [14, 24); every hour belongs to exactly one session.
    pub fn hours(&self) -> Range<u32> {
        match self {
            Session::Tokyo => 0..8,
            Session::London => 8..14,
            Session::NewYork => 14..24,
        }
    }

    pub fn detect(ts: DateTime<Utc>) -> Session {
        let hour = ts.hour();
        Session::ALL
            .into_iter()
            .find(|s| s.hours().contains(&hour))
            .unwrap_or(Session::NewYork)
    }

    pub fn contains(&self, ts: DateTime<Utc>) -> bool {
        self.hours().contains(&ts.hour())
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Session::Tokyo => "Tokyo",
            Session::London => "London",
            Session::NewYork => "NY",
        }
    }
}

impl fmt::Display for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Session {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "tokyo" | "asia" => Ok(Session::Tokyo),
            "london" => Ok(Session::London),
            "ny" | "newyork" | "new york" | "new_york" => Ok(Session::NewYork),
            other => Err(format!("unknown session {:?}, expected Tokyo, London or NY", other)),
        }
    }
}
