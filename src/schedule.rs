use crate::error::BinbakError;
use crate::signal::RunContext;
use crate::Result;
use chrono::{DateTime, Local, TimeZone};
use std::thread;
use std::time::Duration;
use tracing::{info, warn};

const MAX_SLEEP: Duration = Duration::from_secs(1);

/// Fires once a day at a fixed local time
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DailySchedule {
    hour: u32,
    minute: u32,
}

impl DailySchedule {
    pub fn new(hour: u32, minute: u32) -> Result<Self> {
        if hour > 23 || minute > 59 {
            return Err(BinbakError::config(format!(
                "Invalid schedule time {hour:02}:{minute:02}"
            )));
        }
        Ok(Self { hour, minute })
    }

    /// First fire strictly after `now`. A time skipped by a DST jump moves
    /// to the next day; a repeated one fires at its earlier occurrence.
    pub fn next_fire_after<Tz: TimeZone>(&self, now: &DateTime<Tz>) -> DateTime<Tz> {
        let tz = now.timezone();
        let mut date = now.date_naive();

        for _ in 0..3 {
            if let Some(candidate) = date
                .and_hms_opt(self.hour, self.minute, 0)
                .and_then(|naive| tz.from_local_datetime(&naive).earliest())
            {
                if candidate > *now {
                    return candidate;
                }
            }
            match date.succ_opt() {
                Some(next) => date = next,
                None => break,
            }
        }

        now.clone() + chrono::Duration::days(1)
    }

    /// Number of fires in `(start, end]`
    pub fn fires_between<Tz: TimeZone>(&self, start: &DateTime<Tz>, end: &DateTime<Tz>) -> usize {
        let mut count = 0;
        let mut cursor = self.next_fire_after(start);
        while cursor <= *end {
            count += 1;
            cursor = self.next_fire_after(&cursor);
        }
        count
    }
}

/// Run `job` at every fire until interrupted. Runs never overlap: fires that
/// pass while a job is still running are skipped, not queued.
pub fn run_scheduled<F: FnMut()>(schedule: &DailySchedule, context: &RunContext, mut job: F) {
    info!(
        hour = schedule.hour,
        minute = schedule.minute,
        "scheduler started"
    );

    loop {
        let next = schedule.next_fire_after(&Local::now());
        info!(next = %next.format("%Y-%m-%d %H:%M:%S"), "next backup scheduled");

        if !sleep_until(&next, context) {
            break;
        }

        let fired_at = Local::now();
        job();
        let finished_at = Local::now();

        let skipped = schedule.fires_between(&fired_at, &finished_at);
        if skipped > 0 {
            warn!(skipped, "backup run outlasted scheduled fires; skipping them");
        }

        if context.is_interrupted() {
            break;
        }
    }

    info!("scheduler stopped");
}

/// Sleep until `target`; returns false if interrupted first
fn sleep_until(target: &DateTime<Local>, context: &RunContext) -> bool {
    loop {
        if context.is_interrupted() {
            return false;
        }
        let remaining = target.clone() - Local::now();
        let Ok(remaining) = remaining.to_std() else {
            return true;
        };
        if remaining.is_zero() {
            return true;
        }
        thread::sleep(remaining.min(MAX_SLEEP));
    }
}
