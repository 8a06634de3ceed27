//! Recurring expense schedules
//!
//! A recurring expense is a template. Its n-th occurrence falls on
//! `anchor + n * interval`; occurrence 0 is the template itself. Month and
//! year steps are computed from the anchor, not from the previous
//! occurrence, so a schedule anchored on the 31st lands on the last day of
//! shorter months and returns to the 31st afterwards.

use chrono::{Days, Months, NaiveDate};
use serde::{Deserialize, Serialize};

use core_kernel::TemporalError;

/// Upper bound on occurrences materialised for one template in one run
pub const MAX_OCCURRENCES_PER_RUN: usize = 400;

/// Step between occurrences
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecurrenceInterval {
    Daily,
    Weekly,
    Monthly,
    Yearly,
}

/// Schedule carried by a recurring expense template
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recurrence {
    pub interval: RecurrenceInterval,
    /// Date of occurrence 0
    pub anchor: NaiveDate,
    /// First period index not yet materialised
    pub next_index: u32,
}

impl Recurrence {
    /// Creates a schedule whose first generated occurrence is one interval after `anchor`
    pub fn new(interval: RecurrenceInterval, anchor: NaiveDate) -> Self {
        Self {
            interval,
            anchor,
            next_index: 1,
        }
    }

    /// Date of the `index`-th occurrence
    ///
    /// # Errors
    ///
    /// Returns `TemporalError::DateOutOfRange` if the date overflows the calendar.
    pub fn occurrence_date(&self, index: u32) -> Result<NaiveDate, TemporalError> {
        let out_of_range = || TemporalError::DateOutOfRange {
            anchor: self.anchor,
            periods: index,
        };
        let n = u64::from(index);
        match self.interval {
            RecurrenceInterval::Daily => self.anchor.checked_add_days(Days::new(n)),
            RecurrenceInterval::Weekly => self.anchor.checked_add_days(Days::new(n * 7)),
            RecurrenceInterval::Monthly => self.anchor.checked_add_months(Months::new(index)),
            RecurrenceInterval::Yearly => index
                .checked_mul(12)
                .and_then(|m| self.anchor.checked_add_months(Months::new(m))),
        }
        .ok_or_else(out_of_range)
    }

    /// Next occurrence that has not been materialised yet
    pub fn next_date(&self) -> Result<NaiveDate, TemporalError> {
        self.occurrence_date(self.next_index)
    }

    /// Pending occurrences on or before `as_of`, as `(period index, date)` pairs
    ///
    /// At most [`MAX_OCCURRENCES_PER_RUN`] are returned; the rest are picked
    /// up by the next run.
    pub fn due(&self, as_of: NaiveDate) -> Result<Vec<(u32, NaiveDate)>, TemporalError> {
        let mut due = Vec::new();
        let mut index = self.next_index;
        while due.len() < MAX_OCCURRENCES_PER_RUN {
            let date = self.occurrence_date(index)?;
            if date > as_of {
                break;
            }
            due.push((index, date));
            index += 1;
        }
        Ok(due)
    }

    /// Returns the schedule advanced past `index`
    pub fn advanced_past(mut self, index: u32) -> Self {
        self.next_index = self.next_index.max(index + 1);
        self
    }
}

/// Idempotency key of a materialised occurrence
pub fn occurrence_key(template_id: impl std::fmt::Display, index: u32) -> String {
    format!("{template_id}#{index}")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_weekly_occurrences() {
        let r = Recurrence::new(RecurrenceInterval::Weekly, date(2024, 1, 1));
        assert_eq!(r.occurrence_date(1).unwrap(), date(2024, 1, 8));
        assert_eq!(r.occurrence_date(4).unwrap(), date(2024, 1, 29));
    }

    #[test]
    fn test_monthly_clamps_to_month_end() {
        let r = Recurrence::new(RecurrenceInterval::Monthly, date(2024, 1, 31));
        assert_eq!(r.occurrence_date(1).unwrap(), date(2024, 2, 29));
        assert_eq!(r.occurrence_date(2).unwrap(), date(2024, 3, 31));
        assert_eq!(r.occurrence_date(3).unwrap(), date(2024, 4, 30));
    }

    #[test]
    fn test_yearly_from_leap_day() {
        let r = Recurrence::new(RecurrenceInterval::Yearly, date(2024, 2, 29));
        assert_eq!(r.occurrence_date(1).unwrap(), date(2025, 2, 28));
        assert_eq!(r.occurrence_date(4).unwrap(), date(2028, 2, 29));
    }

    #[test]
    fn test_due_is_inclusive_of_as_of() {
        let r = Recurrence::new(RecurrenceInterval::Monthly, date(2024, 1, 15));
        let due = r.due(date(2024, 3, 15)).unwrap();
        assert_eq!(due, vec![(1, date(2024, 2, 15)), (2, date(2024, 3, 15))]);
    }

    #[test]
    fn test_due_starts_from_next_index() {
        let r = Recurrence::new(RecurrenceInterval::Daily, date(2024, 1, 1)).advanced_past(3);
        assert_eq!(r.next_index, 4);
        let due = r.due(date(2024, 1, 5)).unwrap();
        assert_eq!(due, vec![(4, date(2024, 1, 5))]);
    }

    #[test]
    fn test_due_is_capped() {
        let r = Recurrence::new(RecurrenceInterval::Daily, date(2000, 1, 1));
        assert_eq!(r.due(date(2024, 1, 1)).unwrap().len(), MAX_OCCURRENCES_PER_RUN);
    }

    #[test]
    fn test_advance_never_moves_back() {
        let r = Recurrence::new(RecurrenceInterval::Daily, date(2024, 1, 1)).advanced_past(5);
        assert_eq!(r.advanced_past(2).next_index, 6);
    }

    #[test]
    fn test_occurrence_key_format() {
        assert_eq!(occurrence_key("abc", 3), "abc#3");
    }
}
