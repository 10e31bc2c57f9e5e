//! The `scheduler` module re-runs tasks on recurrence rules.
//!
//! Every configured expression becomes a [`ScheduleEntry`]. A single loop
//! keeps the armed entries in a min-heap ordered by due time, sleeps until
//! the earliest one, dispatches its tasks and re-arms it with a delay
//! computed from the current time. Fires never overlap; a slow handler only
//! postpones the entry that called it.

pub mod recurrence;

use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Local, TimeZone};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::bridge::Dispatcher;
use crate::config::{BoundTask, ScheduleTable};
use crate::utils::Result;

pub use recurrence::RecurrenceRule;

/// A recurrence expression and the tasks it triggers.
#[derive(Debug, Clone)]
pub struct ScheduleEntry {
    expression: String,
    rule: RecurrenceRule,
    tasks: Vec<BoundTask>,
}

impl ScheduleEntry {
    /// Parses `expression`; fails for one-shot or malformed expressions.
    pub fn new(expression: impl Into<String>, tasks: Vec<BoundTask>) -> Result<Self> {
        let expression = expression.into();
        let rule = RecurrenceRule::parse(&expression)?;
        Ok(Self {
            expression,
            rule,
            tasks,
        })
    }

    pub fn expression(&self) -> &str {
        &self.expression
    }

    pub fn rule(&self) -> &RecurrenceRule {
        &self.rule
    }

    pub fn tasks(&self) -> &[BoundTask] {
        &self.tasks
    }

    /// Re-parses the expression so relative rules are anchored at the
    /// current moment. The previous rule stays in place if parsing fails.
    pub fn refresh(&mut self) {
        match RecurrenceRule::parse(&self.expression) {
            Ok(rule) => self.rule = rule,
            Err(e) => warn!("Keeping previous rule for '{}': {}", self.expression, e),
        }
    }

    pub fn next_delay<Tz: TimeZone>(&self, now: &DateTime<Tz>) -> Option<Duration> {
        self.rule.delay_from(now)
    }
}

#[derive(Debug, PartialEq, Eq, PartialOrd, Ord)]
struct Armed {
    due: Instant,
    seq: u64,
    entry: usize,
}

pub struct Scheduler {
    entries: Vec<ScheduleEntry>,
    dispatcher: Arc<Dispatcher>,
}

impl Scheduler {
    pub fn new(dispatcher: Arc<Dispatcher>) -> Self {
        Self {
            entries: Vec::new(),
            dispatcher,
        }
    }

    /// Builds a scheduler from the configured schedule. Expressions that are
    /// not recurring are logged and left out.
    pub fn from_table(table: &ScheduleTable, dispatcher: Arc<Dispatcher>) -> Self {
        let mut scheduler = Self::new(dispatcher);
        for (expression, binding) in table.entries() {
            match ScheduleEntry::new(expression, binding.tasks()) {
                Ok(entry) => scheduler.add(entry),
                Err(e) => error!("{}. Skipping", e),
            }
        }
        scheduler
    }

    pub fn add(&mut self, entry: ScheduleEntry) {
        self.entries.push(entry);
    }

    pub fn entries(&self) -> &[ScheduleEntry] {
        &self.entries
    }

    /// Dispatches every bound task once, with its explicit topic if one was
    /// configured.
    pub fn fire(dispatcher: &Dispatcher, tasks: &[BoundTask]) {
        for task in tasks {
            dispatcher.dispatch(&task.task, task.topic_source());
        }
    }

    /// Runs the timer loop until no entry can be re-armed.
    pub async fn run(mut self) {
        let mut queue = BinaryHeap::new();
        let mut seq = 0;

        for index in 0..self.entries.len() {
            self.arm(&mut queue, index, &mut seq);
        }
        info!("Scheduler started with {} entries", queue.len());

        while let Some(Reverse(armed)) = queue.pop() {
            tokio::time::sleep_until(armed.due).await;

            let entry = &mut self.entries[armed.entry];
            debug!("Firing '{}'", entry.expression);
            let dispatcher = Arc::clone(&self.dispatcher);
            let tasks = entry.tasks.clone();
            if let Err(e) =
                tokio::task::spawn_blocking(move || Self::fire(&dispatcher, &tasks)).await
            {
                error!("Schedule '{}' failed: {}", entry.expression, e);
            }

            entry.refresh();
            self.arm(&mut queue, armed.entry, &mut seq);
        }

        info!("Scheduler has no entries left to run");
    }

    fn arm(&self, queue: &mut BinaryHeap<Reverse<Armed>>, index: usize, seq: &mut u64) {
        let entry = &self.entries[index];
        match entry.next_delay(&Local::now()) {
            Some(delay) => {
                debug!("'{}' armed in {:?}", entry.expression, delay);
                *seq += 1;
                queue.push(Reverse(Armed {
                    due: Instant::now() + delay,
                    seq: *seq,
                    entry: index,
                }));
            }
            None => warn!("'{}' has no further occurrences", entry.expression),
        }
    }
}

#[cfg(test)]
mod tests;
