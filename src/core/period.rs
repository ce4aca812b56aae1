use crate::core::day_of_burn::DoyWindow;
use crate::types::{FireError, FireResult};
use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

/// Which part of the month a period covers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PeriodPart {
    FullMonth,
    /// Days 1 to 15
    FirstHalf,
    /// Day 16 to the end of the month
    SecondHalf,
}

/// Calendar period one set of grid products is computed for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ReportingPeriod {
    pub year: i32,
    pub month: u32,
    pub part: PeriodPart,
}

impl ReportingPeriod {
    pub fn new(year: i32, month: u32, part: PeriodPart) -> FireResult<Self> {
        let period = Self { year, month, part };
        period.first_day()?;
        Ok(period)
    }

    pub fn month(year: i32, month: u32) -> FireResult<Self> {
        Self::new(year, month, PeriodPart::FullMonth)
    }

    fn first_day(&self) -> FireResult<NaiveDate> {
        NaiveDate::from_ymd_opt(self.year, self.month, 1).ok_or_else(|| {
            FireError::InvalidArgument(format!("Invalid month {}-{}", self.year, self.month))
        })
    }

    fn last_day(&self) -> FireResult<NaiveDate> {
        let next = if self.month == 12 {
            NaiveDate::from_ymd_opt(self.year + 1, 1, 1)
        } else {
            NaiveDate::from_ymd_opt(self.year, self.month + 1, 1)
        };
        next.and_then(|d| d.pred_opt()).ok_or_else(|| {
            FireError::InvalidArgument(format!("Invalid month {}-{}", self.year, self.month))
        })
    }

    /// Day-of-year window covered by the period
    pub fn doy_window(&self) -> FireResult<DoyWindow> {
        let first = self.first_day()?.ordinal() as i32;
        let last = self.last_day()?.ordinal() as i32;

        match self.part {
            PeriodPart::FullMonth => DoyWindow::new(first, last),
            PeriodPart::FirstHalf => DoyWindow::new(first, first + 14),
            PeriodPart::SecondHalf => DoyWindow::new(first + 15, last),
        }
    }

    /// Key used for output records, e.g. `2008-02` or `2008-02-b`
    pub fn label(&self) -> String {
        let suffix = match self.part {
            PeriodPart::FullMonth => "",
            PeriodPart::FirstHalf => "-a",
            PeriodPart::SecondHalf => "-b",
        };
        format!("{:04}-{:02}{}", self.year, self.month, suffix)
    }
}

impl std::fmt::Display for ReportingPeriod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label())
    }
}
