//! Lead-time arithmetic and weekly cron expressions.
//!
//! Everything here is pure apart from reading the system timezone; the
//! scheduler builds its triggers from these functions.

use chrono::{DateTime, Local};
use croner::Cron;

use crate::types::{TimeOfDay, Weekday};

const MINUTES_PER_DAY: i64 = 24 * 60;
const MINUTES_PER_WEEK: i64 = 7 * MINUTES_PER_DAY;

/// Weekly wall-clock instant at which a reminder fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FireTime {
    pub weekday: Weekday,
    pub hour: u8,
    pub minute: u8,
}

impl FireTime {
    /// 5-field cron expression firing every week at this instant
    /// (day-of-week uses Sunday = 0).
    pub fn cron_expr(&self) -> String {
        format!(
            "{} {} * * {}",
            self.minute,
            self.hour,
            self.weekday.cron_index()
        )
    }

    fn minute_of_week(&self) -> i64 {
        self.weekday.days_from_monday() as i64 * MINUTES_PER_DAY
            + self.hour as i64 * 60
            + self.minute as i64
    }
}

/// When the `lead_time`-minute reminder for an occurrence on `weekday` at
/// `time` fires. Underflow rolls back across hours, midnight and the start
/// of the week (Monday wraps to Sunday); lead times longer than a day roll
/// back several days.
pub fn lead_time_fire_at(time: TimeOfDay, weekday: Weekday, lead_time: u32) -> FireTime {
    let occurrence =
        weekday.days_from_monday() as i64 * MINUTES_PER_DAY + time.minute_of_day() as i64;
    let fire = (occurrence - lead_time as i64).rem_euclid(MINUTES_PER_WEEK);
    let minute_of_day = fire % MINUTES_PER_DAY;
    FireTime {
        weekday: Weekday::from_days_from_monday((fire / MINUTES_PER_DAY) as u32),
        hour: (minute_of_day / 60) as u8,
        minute: (minute_of_day % 60) as u8,
    }
}

/// Compute the next occurrence of a cron expression strictly after `after`,
/// in the system-local timezone.
pub fn compute_next_run_local(
    cron_expr: &str,
    after: &DateTime<Local>,
) -> anyhow::Result<DateTime<Local>> {
    let cron: Cron = cron_expr
        .parse()
        .map_err(|e| anyhow::anyhow!("Failed to parse cron '{}': {}", cron_expr, e))?;

    cron.find_next_occurrence(after, false)
        .map_err(|e| anyhow::anyhow!("No next occurrence for '{}': {}", cron_expr, e))
}

/// Human-readable system timezone label, logged at startup.
pub fn system_timezone_display() -> String {
    Local::now().format("%Z (UTC%:z)").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, TimeZone, Timelike};

    fn t(s: &str) -> TimeOfDay {
        s.parse().unwrap()
    }

    fn fire(weekday: Weekday, hour: u8, minute: u8) -> FireTime {
        FireTime {
            weekday,
            hour,
            minute,
        }
    }

    #[test]
    fn lead_time_within_the_same_hour() {
        assert_eq!(
            lead_time_fire_at(t("09:30"), Weekday::Monday, 5),
            fire(Weekday::Monday, 9, 25)
        );
    }

    #[test]
    fn lead_time_crosses_hour_boundary() {
        assert_eq!(
            lead_time_fire_at(t("09:10"), Weekday::Monday, 30),
            fire(Weekday::Monday, 8, 40)
        );
        assert_eq!(
            lead_time_fire_at(t("09:30"), Weekday::Friday, 60),
            fire(Weekday::Friday, 8, 30)
        );
    }

    #[test]
    fn lead_time_wraps_minute_and_weekday() {
        assert_eq!(
            lead_time_fire_at(t("00:10"), Weekday::Tuesday, 30),
            fire(Weekday::Monday, 23, 40)
        );
        // First day of the week wraps to the last.
        assert_eq!(
            lead_time_fire_at(t("00:10"), Weekday::Monday, 30),
            fire(Weekday::Sunday, 23, 40)
        );
    }

    #[test]
    fn lead_time_longer_than_an_hour_crosses_midnight() {
        assert_eq!(
            lead_time_fire_at(t("00:30"), Weekday::Wednesday, 90),
            fire(Weekday::Tuesday, 23, 0)
        );
        assert_eq!(
            lead_time_fire_at(t("01:00"), Weekday::Thursday, 125),
            fire(Weekday::Wednesday, 22, 55)
        );
    }

    #[test]
    fn lead_time_spanning_several_days() {
        // 2 days and 1 hour before Monday 00:00.
        assert_eq!(
            lead_time_fire_at(t("00:00"), Weekday::Monday, 2 * 1440 + 60),
            fire(Weekday::Friday, 23, 0)
        );
    }

    #[test]
    fn cron_expr_uses_sunday_zero() {
        assert_eq!(fire(Weekday::Sunday, 23, 40).cron_expr(), "40 23 * * 0");
        assert_eq!(fire(Weekday::Monday, 8, 5).cron_expr(), "5 8 * * 1");
    }

    #[test]
    fn next_run_lands_on_requested_weekday_and_time() {
        let expr = fire(Weekday::Wednesday, 8, 30).cron_expr();
        let after = Local.with_ymd_and_hms(2026, 3, 2, 12, 0, 0).unwrap(); // a Monday
        let next = compute_next_run_local(&expr, &after).unwrap();
        assert_eq!(next.weekday(), chrono::Weekday::Wed);
        assert_eq!((next.hour(), next.minute()), (8, 30));
        assert_eq!(next.day(), 4);
    }

    #[test]
    fn next_run_is_strictly_after() {
        let after = Local.with_ymd_and_hms(2026, 3, 4, 8, 30, 0).unwrap();
        let next = compute_next_run_local("30 8 * * 3", &after).unwrap();
        assert!(next > after);
        assert_eq!(next.day(), 11);
    }

    #[test]
    fn invalid_cron_is_an_error() {
        assert!(compute_next_run_local("61 8 * * 1", &Local::now()).is_err());
    }

    #[test]
    fn test_system_timezone_display_non_empty() {
        assert!(!system_timezone_display().is_empty());
    }

    mod proptest_lead_times {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn fire_time_plus_lead_returns_to_occurrence(
                hour in 0u8..24,
                minute in 0u8..60,
                day in 0u32..7,
                lead in 1u32..20_000,
            ) {
                let time = TimeOfDay::new(hour, minute).unwrap();
                let weekday = Weekday::from_days_from_monday(day);
                let f = lead_time_fire_at(time, weekday, lead);
                prop_assert!(f.hour < 24 && f.minute < 60);
                let occurrence = day as i64 * MINUTES_PER_DAY + time.minute_of_day() as i64;
                prop_assert_eq!(
                    (f.minute_of_week() + lead as i64).rem_euclid(MINUTES_PER_WEEK),
                    occurrence
                );
            }
        }
    }
}
