//! ISO-8601 week arithmetic: turns a `"YYYY-Www"` label into the seven UTC
//! dates of that Monday-first week, and back, so
//! [`crate::fetch::list_available_weeks`] can group daily log dates into
//! weeks and [`crate::pipeline`] can ask for a week's seven day strings.

use anyhow::{Context, Result, bail};
use std::fmt;
use time::{Date, Weekday};

const WEEKDAYS: [Weekday; 7] = [
	Weekday::Monday,
	Weekday::Tuesday,
	Weekday::Wednesday,
	Weekday::Thursday,
	Weekday::Friday,
	Weekday::Saturday,
	Weekday::Sunday,
];

/// An ISO-8601 week, identified by its week-numbering year and week number
/// (1..=53). Ordered chronologically (year, then week), which is exactly
/// the order `tilerank::pipeline` needs to pick the most recent `maxWeeks`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct IsoWeek {
	pub year: i32,
	pub week: u8,
}

impl IsoWeek {
	/// The ISO-8601, Monday-first week containing `date`.
	pub fn containing(date: Date) -> IsoWeek {
		let (year, week, _) = date.to_iso_week_date();
		IsoWeek { year, week }
	}

	/// Parses a `"YYYY-Www"` label as produced by [`IsoWeek::to_string`].
	pub fn parse(label: &str) -> Option<IsoWeek> {
		let (year_str, week_str) = label.split_once("-W")?;
		let year: i32 = year_str.parse().ok()?;
		let week: u8 = week_str.parse().ok()?;
		Some(IsoWeek { year, week })
	}

	/// The seven UTC dates of this week, Monday first, as `"YYYY-MM-DD"`
	/// strings ready for [`crate::fetch::HttpFetcher::fetch`].
	pub fn day_strings(&self) -> Result<[String; 7]> {
		let mut days: [String; 7] = Default::default();
		for (i, weekday) in WEEKDAYS.iter().enumerate() {
			let date = Date::from_iso_week_date(self.year, self.week, *weekday)
				.with_context(|| format!("ISO week {self} has no {weekday} (invalid week number)"))?;
			days[i] = format!("{:04}-{:02}-{:02}", date.year(), u8::from(date.month()), date.day());
		}
		Ok(days)
	}
}

impl fmt::Display for IsoWeek {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{:04}-W{:02}", self.year, self.week)
	}
}

/// Parses a `"YYYY-MM-DD"` log-file date string into a [`Date`].
pub fn parse_day(date: &str) -> Result<Date> {
	let parts: Vec<&str> = date.split('-').collect();
	if parts.len() != 3 {
		bail!("malformed date {date:?}");
	}
	let year: i32 = parts[0].parse().with_context(|| format!("malformed date {date:?}"))?;
	let month: u8 = parts[1].parse().with_context(|| format!("malformed date {date:?}"))?;
	let day: u8 = parts[2].parse().with_context(|| format!("malformed date {date:?}"))?;
	let month = time::Month::try_from(month).with_context(|| format!("malformed date {date:?}"))?;
	Date::from_calendar_date(year, month, day).with_context(|| format!("malformed date {date:?}"))
}
