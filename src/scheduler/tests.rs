use std::sync::Arc;
use std::time::Duration;

use chrono::{
    DateTime, FixedOffset, LocalResult, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc,
    Weekday,
};

use super::{RecurrenceRule, ScheduleEntry, Scheduler};
use crate::bridge::tests::test_dispatcher;
use crate::config::{BoundTask, OrderedMap, ScheduleTable, TaskBinding};
use crate::utils::Error;

fn at(y: i32, m: u32, d: u32, h: u32, min: u32, s: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(y, m, d)
        .unwrap()
        .and_hms_opt(h, min, s)
        .unwrap()
}

fn utc(t: NaiveDateTime) -> DateTime<Utc> {
    Utc.from_utc_datetime(&t)
}

fn time(h: u32, m: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(h, m, 0).unwrap()
}

#[test]
fn test_parse_intervals() {
    let cases = [
        ("every 5 minutes", 300),
        ("every minute", 60),
        ("Every 10 Seconds", 10),
        ("every other hour", 7200),
        ("every two days", 2 * 86_400),
        ("every 30s", 30),
        ("every 15 min from now", 900),
        ("each week", 7 * 86_400),
        ("hourly", 3600),
        ("daily", 86_400),
    ];
    for (expression, seconds) in cases {
        match RecurrenceRule::parse(expression) {
            Ok(RecurrenceRule::Interval(d)) => {
                assert_eq!(d, Duration::from_secs(seconds), "{expression}")
            }
            other => panic!("{expression}: unexpected {other:?}"),
        }
    }
}

#[test]
fn test_parse_daily_times() {
    match RecurrenceRule::parse("every day at 00:00").unwrap() {
        RecurrenceRule::Daily { every, times } => {
            assert_eq!(every, 1);
            assert_eq!(times, vec![time(0, 0)]);
        }
        other => panic!("unexpected {other:?}"),
    }

    match RecurrenceRule::parse("every 2 days at 6pm and 6am").unwrap() {
        RecurrenceRule::Daily { every, times } => {
            assert_eq!(every, 2);
            assert_eq!(times, vec![time(6, 0), time(18, 0)]);
        }
        other => panic!("unexpected {other:?}"),
    }

    match RecurrenceRule::parse("every day at noon, midnight and 7:30 pm").unwrap() {
        RecurrenceRule::Daily { times, .. } => {
            assert_eq!(times, vec![time(0, 0), time(12, 0), time(19, 30)]);
        }
        other => panic!("unexpected {other:?}"),
    }
}

#[test]
fn test_parse_weekdays() {
    match RecurrenceRule::parse("every monday and friday at 9:30").unwrap() {
        RecurrenceRule::Weekly { days, times } => {
            assert_eq!(days, vec![Weekday::Mon, Weekday::Fri]);
            assert_eq!(times, vec![time(9, 30)]);
        }
        other => panic!("unexpected {other:?}"),
    }

    match RecurrenceRule::parse("every weekend").unwrap() {
        RecurrenceRule::Weekly { days, times } => {
            assert_eq!(days, vec![Weekday::Sat, Weekday::Sun]);
            assert_eq!(times, vec![time(0, 0)]);
        }
        other => panic!("unexpected {other:?}"),
    }
}

#[test]
fn test_parse_cron_forms() {
    for expression in ["@daily", "@hourly", "cron:0 */5 * * * *", "*/15 * * * *"] {
        assert!(
            matches!(RecurrenceRule::parse(expression), Ok(RecurrenceRule::Cron(_))),
            "{expression}"
        );
    }
    assert!(matches!(
        RecurrenceRule::parse("@fortnightly"),
        Err(Error::InvalidSchedule { .. })
    ));
}

#[test]
fn test_parse_one_shot_expressions() {
    for expression in [
        "in 5 minutes",
        "tomorrow at 10:00",
        "at 10:00",
        "next tuesday",
        "2024-01-15 09:00",
    ] {
        assert!(
            matches!(
                RecurrenceRule::parse(expression),
                Err(Error::NonRecurringSchedule(ref e)) if e == expression
            ),
            "{expression}"
        );
    }
}

#[test]
fn test_parse_invalid_expressions() {
    for expression in [
        "",
        "whenever",
        "every",
        "every 0 minutes",
        "every 5 fortnights",
        "every minute at 10:00",
        "every day at 25:00",
        "every 3 mondays",
    ] {
        assert!(
            matches!(
                RecurrenceRule::parse(expression),
                Err(Error::InvalidSchedule { .. })
            ),
            "{expression}"
        );
    }
}

#[test]
fn test_midnight_delay_is_recomputed_from_now() {
    let rule = RecurrenceRule::parse("every day at 00:00").unwrap();

    let t = at(2024, 3, 10, 13, 45, 30);
    assert_eq!(rule.next_after(t), Some(at(2024, 3, 11, 0, 0, 0)));
    assert_eq!(
        rule.delay_from(&utc(t)),
        Some(Duration::from_secs(10 * 3600 + 14 * 60 + 30))
    );

    // fired a second late: the next delay is measured from the new now
    let fired = at(2024, 3, 11, 0, 0, 1);
    assert_eq!(rule.delay_from(&utc(fired)), Some(Duration::from_secs(86_399)));

    // exactly at midnight the next occurrence is the following one
    assert_eq!(
        rule.next_after(at(2024, 3, 11, 0, 0, 0)),
        Some(at(2024, 3, 12, 0, 0, 0))
    );
}

#[test]
fn test_interval_is_anchored_at_now() {
    let rule = RecurrenceRule::parse("every 10 minutes from now").unwrap();
    let t = at(2024, 3, 10, 13, 45, 30);
    assert_eq!(rule.next_after(t), Some(at(2024, 3, 10, 13, 55, 30)));

    // a late fire does not try to catch up
    let late = at(2024, 3, 10, 14, 30, 0);
    assert_eq!(rule.next_after(late), Some(at(2024, 3, 10, 14, 40, 0)));
}

#[test]
fn test_every_other_day_counts_from_today() {
    let rule = RecurrenceRule::parse("every 2 days at 10:00").unwrap();
    assert_eq!(
        rule.next_after(at(2024, 3, 10, 9, 0, 0)),
        Some(at(2024, 3, 10, 10, 0, 0))
    );
    assert_eq!(
        rule.next_after(at(2024, 3, 10, 11, 0, 0)),
        Some(at(2024, 3, 12, 10, 0, 0))
    );
}

#[test]
fn test_weekly_next_occurrence() {
    // 2024-03-10 is a Sunday
    let rule = RecurrenceRule::parse("every monday and friday at 9:30").unwrap();
    assert_eq!(
        rule.next_after(at(2024, 3, 10, 12, 0, 0)),
        Some(at(2024, 3, 11, 9, 30, 0))
    );
    assert_eq!(
        rule.next_after(at(2024, 3, 11, 9, 30, 0)),
        Some(at(2024, 3, 15, 9, 30, 0))
    );
    assert_eq!(
        rule.next_after(at(2024, 3, 15, 10, 0, 0)),
        Some(at(2024, 3, 18, 9, 30, 0))
    );
}

#[test]
fn test_cron_next_occurrence() {
    let rule = RecurrenceRule::parse("@hourly").unwrap();
    assert_eq!(
        rule.next_after(at(2024, 3, 10, 13, 45, 30)),
        Some(at(2024, 3, 10, 14, 0, 0))
    );

    let rule = RecurrenceRule::parse("*/15 * * * *").unwrap();
    assert_eq!(
        rule.next_after(at(2024, 3, 10, 13, 45, 30)),
        Some(at(2024, 3, 10, 14, 0, 0))
    );
}

#[test]
fn test_crontab_weekdays() {
    // 2024-03-10 is a Sunday
    let sunday_noon = at(2024, 3, 10, 12, 0, 0);

    let monday = RecurrenceRule::parse("0 9 * * 1").unwrap();
    assert_eq!(monday.next_after(sunday_noon), Some(at(2024, 3, 11, 9, 0, 0)));

    for expression in ["0 9 * * 0", "0 9 * * 7", "cron:0 9 * * sun"] {
        let rule = RecurrenceRule::parse(expression).unwrap();
        assert_eq!(
            rule.next_after(sunday_noon),
            Some(at(2024, 3, 17, 9, 0, 0)),
            "{expression}"
        );
    }

    let workdays = RecurrenceRule::parse("30 8 * * 1-5").unwrap();
    assert_eq!(
        workdays.next_after(at(2024, 3, 15, 9, 0, 0)),
        Some(at(2024, 3, 18, 8, 30, 0))
    );

    let friday_to_sunday = RecurrenceRule::parse("0 9 * * 5-7").unwrap();
    assert_eq!(
        friday_to_sunday.next_after(at(2024, 3, 16, 10, 0, 0)),
        Some(at(2024, 3, 17, 9, 0, 0))
    );

    // every other day from Sunday: Sun, Tue, Thu, Sat
    let every_other = RecurrenceRule::parse("0 9 * * */2").unwrap();
    assert_eq!(
        every_other.next_after(at(2024, 3, 11, 12, 0, 0)),
        Some(at(2024, 3, 12, 9, 0, 0))
    );

    for expression in ["0 9 * * 8", "0 9 * * 5-2", "0 9 * * */0"] {
        assert!(
            matches!(
                RecurrenceRule::parse(expression),
                Err(Error::InvalidSchedule { .. })
            ),
            "{expression}"
        );
    }
}

/// +01:00 until 2024-03-31 01:00 UTC, +02:00 afterwards. Local times from
/// 02:00 to 03:00 on that day do not exist.
#[derive(Debug, Clone, Copy)]
struct SpringForward;

impl SpringForward {
    fn switch_utc() -> NaiveDateTime {
        at(2024, 3, 31, 1, 0, 0)
    }

    fn offset(hours: i32) -> FixedOffset {
        FixedOffset::east_opt(hours * 3600).unwrap()
    }
}

impl TimeZone for SpringForward {
    type Offset = FixedOffset;

    fn from_offset(_: &FixedOffset) -> Self {
        SpringForward
    }

    fn offset_from_local_date(&self, local: &NaiveDate) -> LocalResult<FixedOffset> {
        self.offset_from_local_datetime(&local.and_time(NaiveTime::MIN))
    }

    fn offset_from_local_datetime(&self, local: &NaiveDateTime) -> LocalResult<FixedOffset> {
        if *local < at(2024, 3, 31, 2, 0, 0) {
            LocalResult::Single(Self::offset(1))
        } else if *local < at(2024, 3, 31, 3, 0, 0) {
            LocalResult::None
        } else {
            LocalResult::Single(Self::offset(2))
        }
    }

    fn offset_from_utc_date(&self, utc: &NaiveDate) -> FixedOffset {
        self.offset_from_utc_datetime(&utc.and_time(NaiveTime::MIN))
    }

    fn offset_from_utc_datetime(&self, utc: &NaiveDateTime) -> FixedOffset {
        if *utc < Self::switch_utc() {
            Self::offset(1)
        } else {
            Self::offset(2)
        }
    }
}

#[test]
fn test_delay_spans_clock_change() {
    let now = SpringForward
        .from_local_datetime(&at(2024, 3, 30, 12, 0, 0))
        .single()
        .unwrap();

    // 09:00 on the 31st is only 20 hours away once the clocks go forward
    let rule = RecurrenceRule::parse("every day at 09:00").unwrap();
    assert_eq!(rule.delay_from(&now), Some(Duration::from_secs(20 * 3600)));

    // 02:30 does not exist that night; it is taken at the old offset
    let rule = RecurrenceRule::parse("every day at 02:30").unwrap();
    assert_eq!(
        rule.delay_from(&now),
        Some(Duration::from_secs(14 * 3600 + 30 * 60))
    );

    // intervals are plain durations
    let rule = RecurrenceRule::parse("every 1 hour").unwrap();
    assert_eq!(rule.delay_from(&now), Some(Duration::from_secs(3600)));
}

#[test]
fn test_fire_uses_topic_override() {
    let (dispatcher, publisher) = test_dispatcher();
    let tasks = vec![BoundTask::new("cpu.percent", Some("sensors/cpu".to_string()))];

    Scheduler::fire(&dispatcher, &tasks);

    assert_eq!(publisher.topics(), vec!["psmqtt/host/sensors/cpu"]);
    assert_eq!(publisher.payload("psmqtt/host/sensors/cpu").unwrap(), "3.5");
}

#[test]
fn test_fire_isolates_failing_tasks() {
    let (dispatcher, publisher) = test_dispatcher();
    let tasks = vec![
        BoundTask::new("gpu/temp", None),
        BoundTask::new("virtual_memory", None),
        BoundTask::new("cpu_percent", None),
    ];

    Scheduler::fire(&dispatcher, &tasks);

    assert_eq!(
        publisher.topics(),
        vec![
            "psmqtt/host/gpu/temp/error",
            "psmqtt/host/virtual_memory/error",
            "psmqtt/host/cpu_percent",
        ]
    );
    assert_eq!(dispatcher.failure_count(), 2);
}

#[test]
fn test_from_table_skips_one_shot_entries() {
    let (dispatcher, _) = test_dispatcher();
    let table = ScheduleTable::Single(OrderedMap::from_iter([
        (
            "every 5 minutes".to_string(),
            TaskBinding::Task("cpu_percent".to_string()),
        ),
        (
            "tomorrow at 10:00".to_string(),
            TaskBinding::Task("boot_time".to_string()),
        ),
        (
            "whenever".to_string(),
            TaskBinding::Task("boot_time".to_string()),
        ),
    ]));

    let scheduler = Scheduler::from_table(&table, Arc::new(dispatcher));
    assert_eq!(scheduler.entries().len(), 1);
    assert_eq!(scheduler.entries()[0].expression(), "every 5 minutes");
    assert_eq!(
        scheduler.entries()[0].tasks(),
        &[BoundTask::new("cpu_percent", None)]
    );
}

#[tokio::test]
async fn test_one_shot_schedule_never_fires() {
    let (dispatcher, publisher) = test_dispatcher();
    let table = ScheduleTable::Single(OrderedMap::from_iter([(
        "in 1 second".to_string(),
        TaskBinding::Task("cpu_percent".to_string()),
    )]));

    let scheduler = Scheduler::from_table(&table, Arc::new(dispatcher));
    // nothing is armed, so the loop ends immediately
    tokio::time::timeout(Duration::from_secs(2), scheduler.run())
        .await
        .expect("scheduler should stop with an empty queue");
    assert!(publisher.topics().is_empty());
}

#[tokio::test]
async fn test_run_rearms_entries() {
    let (dispatcher, publisher) = test_dispatcher();
    let mut scheduler = Scheduler::new(Arc::new(dispatcher));
    scheduler.add(
        ScheduleEntry::new("every 1 second", vec![BoundTask::new("boot_time", None)]).unwrap(),
    );

    let handle = tokio::spawn(scheduler.run());
    tokio::time::sleep(Duration::from_millis(2600)).await;
    handle.abort();

    let fires = publisher
        .topics()
        .iter()
        .filter(|t| *t == "psmqtt/host/boot_time")
        .count();
    assert!(fires >= 2, "expected at least two fires, got {fires}");
}

#[test]
fn test_entry_refresh_keeps_expression() {
    let mut entry = ScheduleEntry::new("every day at 00:00", Vec::new()).unwrap();
    entry.refresh();
    assert_eq!(entry.expression(), "every day at 00:00");
    assert!(matches!(entry.rule(), RecurrenceRule::Daily { .. }));
    assert!(entry.next_delay(&utc(at(2024, 3, 10, 23, 0, 0))).is_some());
}
