use std::fmt;
use std::str::FromStr;

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Publication dates arrive at whatever precision the upstream source
/// recorded: a bare year, a year and month, or a full calendar date.
/// The variants keep that precision instead of inventing a January 1st.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PublicationDate {
    Year(i32),
    YearMonth { year: i32, month: u32 },
    Day(NaiveDate),
}

impl PublicationDate {
    pub fn year(&self) -> i32 {
        match self {
            Self::Year(year) => *year,
            Self::YearMonth { year, .. } => *year,
            Self::Day(date) => date.year(),
        }
    }

    /// The full calendar date, when the source supplied one.
    pub fn as_day(&self) -> Option<NaiveDate> {
        match self {
            Self::Day(date) => Some(*date),
            _ => None,
        }
    }

    pub fn is_fully_specified(&self) -> bool {
        matches!(self, Self::Day(_))
    }
}

impl fmt::Display for PublicationDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Year(year) => write!(f, "{year}"),
            Self::YearMonth { year, month } => write!(f, "{year}-{month:02}"),
            Self::Day(date) => write!(f, "{}", date.format("%Y-%m-%d")),
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("unrecognized publication date: {0}")]
pub struct DateParseError(pub String);

impl FromStr for PublicationDate {
    type Err = DateParseError;

    /// Accepts `YYYY`, `YYYY-MM` and `YYYY-MM-DD`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let invalid = || DateParseError(trimmed.to_string());

        let parts: Vec<&str> = trimmed.split('-').collect();
        match parts.as_slice() {
            [year] => year.parse::<i32>().map(Self::Year).map_err(|_| invalid()),
            [year, month] => {
                let year = year.parse::<i32>().map_err(|_| invalid())?;
                let month = month.parse::<u32>().map_err(|_| invalid())?;
                if !(1..=12).contains(&month) {
                    return Err(invalid());
                }
                Ok(Self::YearMonth { year, month })
            }
            [_, _, _] => NaiveDate::parse_from_str(trimmed, "%Y-%m-%d")
                .map(Self::Day)
                .map_err(|_| invalid()),
            _ => Err(invalid()),
        }
    }
}
