//! Recurrence expressions.
//!
//! Parses human-readable schedules into [`RecurrenceRule`]s that can answer
//! "when is the next occurrence after this moment".
//!
//! # Supported Formats
//!
//! | Format | Example |
//! |--------|---------|
//! | Interval | `every 5 minutes`, `every other hour`, `every 30s from now` |
//! | Daily times | `every day at 00:00`, `every 2 days at 6am and 6pm` |
//! | Weekdays | `every monday and friday at 9:30`, `every weekday at noon` |
//! | Shorthand | `hourly`, `daily`, `weekly` |
//! | Named cron | `@daily`, `@hourly` |
//! | Cron | `cron:0 */5 * * * *`, `*/15 * * * *` |
//!
//! Intervals are anchored at the moment they are evaluated, so re-evaluating
//! the rule after every fire never tries to catch up on missed runs. One-shot
//! expressions such as `in 5 minutes` or `tomorrow at 10:00` are rejected
//! with [`Error::NonRecurringSchedule`].

use std::str::FromStr;
use std::time::Duration;

use chrono::{
    DateTime, Datelike, LocalResult, NaiveDateTime, NaiveTime, Offset, TimeZone, Utc, Weekday,
};

use crate::utils::{Error, Result};

/// Maximum expression length accepted by the parser.
const MAX_EXPRESSION_LENGTH: usize = 256;

/// Words that start a one-shot time expression.
const ONE_SHOT_WORDS: &[&str] = &[
    "in", "at", "on", "tomorrow", "today", "tonight", "now", "next", "this",
];

const SECOND: u64 = 1;
const MINUTE: u64 = 60;
const HOUR: u64 = 60 * MINUTE;
const DAY: u64 = 24 * HOUR;
const WEEK: u64 = 7 * DAY;

#[derive(Debug, Clone)]
pub enum RecurrenceRule {
    /// Fixed period starting from the evaluation time.
    Interval(Duration),
    /// Times of day on every `every`-th day, counting from today.
    Daily { every: u32, times: Vec<NaiveTime> },
    /// Times of day on the listed weekdays.
    Weekly {
        days: Vec<Weekday>,
        times: Vec<NaiveTime>,
    },
    Cron(Box<cron::Schedule>),
}

impl RecurrenceRule {
    pub fn parse(expression: &str) -> Result<Self> {
        let text = expression.trim();

        if text.is_empty() {
            return Err(Error::invalid_schedule(expression, "expression cannot be empty"));
        }
        if text.len() > MAX_EXPRESSION_LENGTH {
            return Err(Error::invalid_schedule(
                expression,
                format!("expression exceeds {MAX_EXPRESSION_LENGTH} characters"),
            ));
        }

        if text.starts_with('@') {
            return parse_named(expression, text);
        }
        if let Some(expr) = text.strip_prefix("cron:") {
            return parse_cron(expression, expr);
        }
        if looks_like_cron(text) {
            return parse_cron(expression, text);
        }

        let lower = text.to_lowercase().replace(',', " ");
        let mut words: Vec<&str> = lower.split_whitespace().collect();
        if let [.., "from" | "starting", "now"] = words.as_slice() {
            words.truncate(words.len() - 2);
        }

        match words.as_slice() {
            ["minutely"] => Ok(RecurrenceRule::Interval(Duration::from_secs(MINUTE))),
            ["hourly"] => Ok(RecurrenceRule::Interval(Duration::from_secs(HOUR))),
            ["daily"] => Ok(RecurrenceRule::Interval(Duration::from_secs(DAY))),
            ["weekly"] => Ok(RecurrenceRule::Interval(Duration::from_secs(WEEK))),
            ["every" | "each", rest @ ..] => parse_every(expression, rest),
            [first, ..]
                if ONE_SHOT_WORDS.contains(first)
                    || first.starts_with(|c: char| c.is_ascii_digit()) =>
            {
                Err(Error::NonRecurringSchedule(expression.to_string()))
            }
            _ => Err(Error::invalid_schedule(expression, "unrecognized expression")),
        }
    }

    /// First occurrence strictly after `now`, in local wall-clock time.
    pub fn next_after(&self, now: NaiveDateTime) -> Option<NaiveDateTime> {
        match self {
            RecurrenceRule::Interval(period) => {
                now.checked_add_signed(chrono::Duration::from_std(*period).ok()?)
            }
            RecurrenceRule::Daily { every, times } => {
                let step = u64::from((*every).max(1));
                [0, step]
                    .into_iter()
                    .filter_map(|offset| now.date().checked_add_days(chrono::Days::new(offset)))
                    .flat_map(|day| times.iter().map(move |t| day.and_time(*t)))
                    .find(|candidate| *candidate > now)
            }
            RecurrenceRule::Weekly { days, times } => (0..=7)
                .filter_map(|offset| now.date().checked_add_days(chrono::Days::new(offset)))
                .filter(|day| days.contains(&day.weekday()))
                .flat_map(|day| times.iter().map(move |t| day.and_time(*t)))
                .find(|candidate| *candidate > now),
            RecurrenceRule::Cron(schedule) => {
                // cron fields describe wall-clock time, so evaluate the naive
                // local time as if it were UTC
                let reference = Utc.from_utc_datetime(&now);
                schedule.after(&reference).next().map(|t| t.naive_utc())
            }
        }
    }

    /// Time left from `now` until the next occurrence.
    ///
    /// Wall-clock occurrences are mapped back to instants in `now`'s time
    /// zone, so an offset change (daylight saving) between now and the next
    /// occurrence shortens or lengthens the delay accordingly. Intervals are
    /// plain durations and ignore the clock.
    pub fn delay_from<Tz: TimeZone>(&self, now: &DateTime<Tz>) -> Option<Duration> {
        if let RecurrenceRule::Interval(period) = self {
            return Some(*period);
        }

        let next = self.next_after(now.naive_local())?;
        let next = match now.timezone().from_local_datetime(&next) {
            LocalResult::Single(t) | LocalResult::Ambiguous(t, _) => t.naive_utc(),
            // skipped by a forward transition: use the offset in force now
            LocalResult::None => {
                let offset = now.offset().fix().local_minus_utc();
                next - chrono::Duration::seconds(offset.into())
            }
        };
        (next - now.naive_utc()).to_std().ok()
    }
}

/// Named schedules, expanded to 7-field cron: sec min hour dom mon dow year.
fn parse_named(expression: &str, text: &str) -> Result<RecurrenceRule> {
    let cron = match text.to_lowercase().as_str() {
        "@yearly" | "@annually" => "0 0 0 1 1 * *",
        "@monthly" => "0 0 0 1 * * *",
        "@weekly" => "0 0 0 * * Sun *",
        "@daily" | "@midnight" => "0 0 0 * * * *",
        "@hourly" => "0 0 * * * * *",
        "@minutely" => "0 * * * * * *",
        _ => {
            return Err(Error::invalid_schedule(
                expression,
                "unknown named schedule. Valid options: @yearly, @monthly, @weekly, @daily, @hourly, @minutely",
            ));
        }
    };
    parse_cron(expression, cron)
}

fn parse_cron(expression: &str, cron_expr: &str) -> Result<RecurrenceRule> {
    let cron_expr = cron_expr.trim();
    let fields: Vec<&str> = cron_expr.split_whitespace().collect();
    // classic 5-field crontab lines get a seconds column and crontab weekdays
    let normalized = if let [minute, hour, dom, month, dow] = fields.as_slice() {
        let dow = crontab_weekdays(dow).ok_or_else(|| {
            Error::invalid_schedule(expression, format!("invalid day-of-week field '{dow}'"))
        })?;
        format!("0 {minute} {hour} {dom} {month} {dow}")
    } else {
        cron_expr.to_string()
    };

    cron::Schedule::from_str(&normalized)
        .map(|schedule| RecurrenceRule::Cron(Box::new(schedule)))
        .map_err(|e| Error::invalid_schedule(expression, format!("invalid cron expression: {e}")))
}

/// Rewrites a crontab day-of-week field (0-7, Sunday is 0 and 7) into the
/// 1-7 numbering of the `cron` crate, which starts at Sunday = 1.
///
/// Lists, ranges and steps are expanded to an explicit list of days, so
/// `1-5`, `*/2` and `5-7` keep their crontab meaning.
fn crontab_weekdays(field: &str) -> Option<String> {
    if field == "*" || field == "?" {
        return Some(field.to_string());
    }

    let mut days = [false; 7];
    for part in field.split(',') {
        let (range, step) = match part.split_once('/') {
            Some((range, step)) => (range, Some(step.parse::<usize>().ok()?)),
            None => (part, None),
        };
        let (start, end) = match range.split_once('-') {
            _ if range == "*" => (0, 7),
            Some((start, end)) => (crontab_day(start)?, crontab_day(end)?),
            None if step.is_some() => (crontab_day(range)?, 7),
            None => {
                let day = crontab_day(range)?;
                (day, day)
            }
        };
        if start > end || step == Some(0) {
            return None;
        }
        for day in (start..=end).step_by(step.unwrap_or(1)) {
            days[day as usize % 7] = true;
        }
    }

    let list: Vec<String> = (0..7u32)
        .filter(|day| days[*day as usize])
        .map(|day| (day + 1).to_string())
        .collect();
    (!list.is_empty()).then(|| list.join(","))
}

fn crontab_day(token: &str) -> Option<u32> {
    match token.parse::<u32>() {
        Ok(day) if day <= 7 => Some(day),
        Ok(_) => None,
        Err(_) => token
            .parse::<Weekday>()
            .ok()
            .map(|day| day.num_days_from_sunday()),
    }
}

fn looks_like_cron(text: &str) -> bool {
    let fields: Vec<&str> = text.split_whitespace().collect();
    (5..=7).contains(&fields.len())
        && fields
            .iter()
            .all(|f| f.chars().all(|c| c.is_ascii_digit() || "*/,-?".contains(c)))
}

fn parse_every(expression: &str, words: &[&str]) -> Result<RecurrenceRule> {
    // "every 30s" is shorthand for "every 30 s"
    let expanded: Vec<&str> = match words.split_first() {
        Some((first, rest)) => match split_compact(first) {
            Some((count, unit)) => [count, unit].into_iter().chain(rest.iter().copied()).collect(),
            None => words.to_vec(),
        },
        None => return Err(Error::invalid_schedule(expression, "missing period after 'every'")),
    };
    let words = expanded.as_slice();

    let (count, words) = match words.split_first() {
        Some((first, rest)) => match parse_count(first) {
            Some(n) => (Some(n), rest),
            None => (None, words),
        },
        None => return Err(Error::invalid_schedule(expression, "missing period after 'every'")),
    };
    if count == Some(0) {
        return Err(Error::invalid_schedule(expression, "period must be at least 1"));
    }

    let (subject, times) = match words.iter().position(|w| *w == "at") {
        Some(at) => (&words[..at], parse_times(expression, &words[at + 1..])?),
        None => (words, Vec::new()),
    };
    let subject: Vec<&str> = subject
        .iter()
        .copied()
        .filter(|w| !matches!(*w, "and" | "&" | "on"))
        .collect();

    if let [unit] = subject.as_slice() {
        if let Some(seconds) = unit_seconds(unit) {
            let n = u64::from(count.unwrap_or(1));
            return match (seconds, times.is_empty()) {
                (_, true) => Ok(RecurrenceRule::Interval(Duration::from_secs(n * seconds))),
                (DAY, false) => Ok(RecurrenceRule::Daily {
                    every: count.unwrap_or(1),
                    times,
                }),
                _ => Err(Error::invalid_schedule(
                    expression,
                    format!("'at' cannot be combined with '{unit}'"),
                )),
            };
        }
    }

    let mut days = Vec::new();
    for word in &subject {
        days.extend(parse_days(word).ok_or_else(|| {
            Error::invalid_schedule(expression, format!("unknown period '{word}'"))
        })?);
    }
    if days.is_empty() {
        return Err(Error::invalid_schedule(expression, "missing period after 'every'"));
    }
    if count.is_some_and(|n| n != 1) {
        return Err(Error::invalid_schedule(
            expression,
            "weekdays cannot be combined with a count",
        ));
    }
    days.sort_by_key(|d| d.num_days_from_monday());
    days.dedup();

    let times = if times.is_empty() {
        vec![NaiveTime::MIN]
    } else {
        times
    };
    Ok(RecurrenceRule::Weekly { days, times })
}

fn parse_count(word: &str) -> Option<u32> {
    if let Ok(n) = word.parse() {
        return Some(n);
    }
    let n = match word {
        "one" | "a" | "an" => 1,
        "other" | "two" => 2,
        "three" => 3,
        "four" => 4,
        "five" => 5,
        "six" => 6,
        "seven" => 7,
        "eight" => 8,
        "nine" => 9,
        "ten" => 10,
        "eleven" => 11,
        "twelve" => 12,
        "fifteen" => 15,
        "twenty" => 20,
        "thirty" => 30,
        _ => return None,
    };
    Some(n)
}

fn split_compact(word: &str) -> Option<(&str, &str)> {
    let digits = word.find(|c: char| !c.is_ascii_digit())?;
    let (count, unit) = word.split_at(digits);
    (!count.is_empty() && unit_seconds(unit).is_some()).then_some((count, unit))
}

fn unit_seconds(word: &str) -> Option<u64> {
    match word {
        "second" | "seconds" | "sec" | "secs" | "s" => Some(SECOND),
        "minute" | "minutes" | "min" | "mins" | "m" => Some(MINUTE),
        "hour" | "hours" | "hr" | "hrs" | "h" => Some(HOUR),
        "day" | "days" | "d" => Some(DAY),
        "week" | "weeks" | "w" => Some(WEEK),
        _ => None,
    }
}

fn parse_days(word: &str) -> Option<Vec<Weekday>> {
    let word = word.strip_suffix('s').unwrap_or(word);
    let days = match word {
        "weekday" => vec![
            Weekday::Mon,
            Weekday::Tue,
            Weekday::Wed,
            Weekday::Thu,
            Weekday::Fri,
        ],
        "weekend" => vec![Weekday::Sat, Weekday::Sun],
        other => vec![other.parse::<Weekday>().ok()?],
    };
    Some(days)
}

fn parse_times(expression: &str, words: &[&str]) -> Result<Vec<NaiveTime>> {
    let mut times = Vec::new();
    let mut iter = words.iter().filter(|w| !matches!(**w, "and" | "&")).peekable();

    while let Some(word) = iter.next() {
        let mut token = word.to_string();
        if let Some(meridiem) = iter.next_if(|w| matches!(**w, "am" | "pm")) {
            token.push_str(meridiem);
        }
        let time = parse_time(&token).ok_or_else(|| {
            Error::invalid_schedule(expression, format!("invalid time of day '{token}'"))
        })?;
        times.push(time);
    }

    if times.is_empty() {
        return Err(Error::invalid_schedule(expression, "missing time after 'at'"));
    }
    times.sort();
    times.dedup();
    Ok(times)
}

fn parse_time(token: &str) -> Option<NaiveTime> {
    match token {
        "noon" | "midday" => return NaiveTime::from_hms_opt(12, 0, 0),
        "midnight" => return Some(NaiveTime::MIN),
        _ => {}
    }

    let (clock, meridiem) = match token.strip_suffix("am") {
        Some(clock) => (clock, Some(false)),
        None => match token.strip_suffix("pm") {
            Some(clock) => (clock, Some(true)),
            None => (token, None),
        },
    };

    let mut parts = clock.split(':');
    let hour: u32 = parts.next()?.parse().ok()?;
    let minute: u32 = parts.next().map_or(Some(0), |m| m.parse().ok())?;
    let second: u32 = parts.next().map_or(Some(0), |s| s.parse().ok())?;
    if parts.next().is_some() {
        return None;
    }

    let hour = match meridiem {
        Some(pm) if (1..=12).contains(&hour) => hour % 12 + if pm { 12 } else { 0 },
        Some(_) => return None,
        None => hour,
    };
    NaiveTime::from_hms_opt(hour, minute, second)
}
