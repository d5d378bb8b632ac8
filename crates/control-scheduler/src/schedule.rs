use std::collections::BTreeSet;

use chrono::{DateTime, Duration, NaiveTime, TimeDelta, TimeZone};

use crate::error::{Result, SchedulerError};
use crate::types::Schedule;

/// Parse a cron expression.
///
/// The `cron` crate wants seven fields (sec min hour dom month dow year);
/// crontab entries have five, so those get `0` seconds and `*` year, and
/// their day-of-week numbers are translated (see [`crontab_weekdays`]).
/// Anything else is handed to the crate as-is.
pub fn parse_cron(expression: &str) -> Result<cron::Schedule> {
    let expression = expression.trim();
    let invalid = |e: String| SchedulerError::InvalidSchedule(format!("'{expression}': {e}"));
    let fields: Vec<&str> = expression.split_whitespace().collect();
    let normalized = match fields.as_slice() {
        [minute, hour, dom, month, dow] => {
            let dow = crontab_weekdays(dow).map_err(invalid)?;
            format!("0 {minute} {hour} {dom} {month} {dow} *")
        }
        _ => expression.to_string(),
    };
    normalized
        .parse::<cron::Schedule>()
        .map_err(|e| invalid(e.to_string()))
}

/// Rewrite a crontab day-of-week field into the `cron` crate's numbering.
///
/// Crontab counts 0-7 with both 0 and 7 meaning Sunday; the crate counts 1-7
/// starting at Sunday. Numeric items (values, ranges, steps) are expanded to
/// an explicit list so that ranges ending on Sunday (`5-7`) keep their
/// meaning. Fields using day names are left alone, the crate reads those the
/// same way.
fn crontab_weekdays(field: &str) -> std::result::Result<String, String> {
    if field == "*" || field == "?" || field.chars().any(|c| c.is_ascii_alphabetic()) {
        return Ok(field.to_string());
    }

    let day = |s: &str| -> std::result::Result<u8, String> {
        match s.parse::<u8>() {
            Ok(d) if d <= 7 => Ok(d),
            _ => Err(format!("invalid day of week '{s}'")),
        }
    };

    let mut days = BTreeSet::new();
    for item in field.split(',') {
        let (range, step) = match item.split_once('/') {
            Some((range, step)) => match step.parse::<usize>() {
                Ok(step) if step > 0 => (range, Some(step)),
                _ => return Err(format!("invalid step in '{item}'")),
            },
            None => (item, None),
        };
        let (first, last) = match range.split_once('-') {
            _ if range == "*" => (0, 6),
            Some((first, last)) => (day(first)?, day(last)?),
            None => {
                let d = day(range)?;
                // `n/step` runs from n to the end of the week.
                (d, if step.is_some() { 6 } else { d })
            }
        };
        if first > last {
            return Err(format!("invalid day range '{range}'"));
        }
        for d in (first..=last).step_by(step.unwrap_or(1)) {
            days.insert(d % 7 + 1);
        }
    }

    Ok(days
        .iter()
        .map(u8::to_string)
        .collect::<Vec<_>>()
        .join(","))
}

/// Compute the next execution time for `schedule` strictly *after* `from`,
/// in `from`'s timezone.
///
/// Returns `Ok(None)` when the schedule has no future occurrence.
pub fn compute_next_run<Tz: TimeZone>(
    schedule: &Schedule,
    from: &DateTime<Tz>,
) -> Result<Option<DateTime<Tz>>> {
    match schedule {
        Schedule::Interval { every_secs } => {
            if *every_secs == 0 {
                return Err(SchedulerError::InvalidSchedule(
                    "every_secs must be > 0".to_string(),
                ));
            }
            let too_large =
                || SchedulerError::InvalidSchedule(format!("interval of {every_secs}s is too large"));
            let every = i64::try_from(*every_secs)
                .ok()
                .and_then(TimeDelta::try_seconds)
                .ok_or_else(too_large)?;
            from.clone()
                .checked_add_signed(every)
                .map(Some)
                .ok_or_else(too_large)
        }

        Schedule::Daily { hour, minute } => {
            let at = NaiveTime::from_hms_opt(u32::from(*hour), u32::from(*minute), 0)
                .ok_or_else(|| {
                    SchedulerError::InvalidSchedule(format!("no such time {hour}:{minute}"))
                })?;
            let tz = from.timezone();
            let today = from.date_naive();
            // Today's slot may have passed; a DST gap can also swallow a slot,
            // so look a couple of days ahead.
            for days in 0..=2 {
                let Some(date) = today.checked_add_signed(Duration::days(days)) else {
                    break;
                };
                if let Some(candidate) = tz.from_local_datetime(&date.and_time(at)).earliest() {
                    if candidate > *from {
                        return Ok(Some(candidate));
                    }
                }
            }
            Ok(None)
        }

        Schedule::Cron { expression } => Ok(parse_cron(expression)?.after(from).next()),
    }
}
