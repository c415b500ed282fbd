use anyhow::{Context, anyhow};
use chrono::{
    DateTime, Datelike, Duration, Local, NaiveDate, NaiveDateTime, TimeDelta, TimeZone, Utc,
    Weekday,
};
use regex::Regex;

/// Parses a due-date expression relative to `now` in the local timezone.
pub fn parse_due_expr(input: &str, now: DateTime<Utc>) -> anyhow::Result<DateTime<Utc>> {
    parse_due_expr_in(input, now, &Local)
}

pub fn parse_due_expr_in<Tz: TimeZone>(
    input: &str,
    now: DateTime<Utc>,
    tz: &Tz,
) -> anyhow::Result<DateTime<Utc>> {
    let token = input.trim();
    let lower = token.to_ascii_lowercase();
    let today = now.with_timezone(tz).date_naive();

    match lower.as_str() {
        "now" => return Ok(now),
        "today" => return local_midnight(today, tz),
        "tomorrow" => return local_midnight(today + Duration::days(1), tz),
        "yesterday" => return local_midnight(today - Duration::days(1), tz),
        _ => {}
    }

    if let Some(weekday) = parse_weekday_name(&lower) {
        return local_midnight(next_weekday_date(today, weekday), tz);
    }

    let rel_re = Regex::new(r"^(?:in\s+|\+)(?P<num>\d+)\s*(?P<unit>[dwh])$")
        .map_err(|e| anyhow!("internal regex compile failure: {e}"))?;
    if let Some(caps) = rel_re.captures(&lower) {
        let num: i64 = caps
            .name("num")
            .map(|m| m.as_str())
            .ok_or_else(|| anyhow!("missing relative amount"))?
            .parse()
            .context("invalid relative number")?;
        let unit = caps
            .name("unit")
            .map(|m| m.as_str())
            .ok_or_else(|| anyhow!("missing relative unit"))?;
        let out_of_range = || anyhow!("relative date out of range: {input}");
        return match unit {
            "d" => {
                let date = TimeDelta::try_days(num)
                    .and_then(|delta| today.checked_add_signed(delta))
                    .ok_or_else(out_of_range)?;
                local_midnight(date, tz)
            }
            "w" => {
                let date = TimeDelta::try_weeks(num)
                    .and_then(|delta| today.checked_add_signed(delta))
                    .ok_or_else(out_of_range)?;
                local_midnight(date, tz)
            }
            "h" => TimeDelta::try_hours(num)
                .and_then(|delta| now.checked_add_signed(delta))
                .ok_or_else(out_of_range),
            other => Err(anyhow!("unknown relative unit: {other}")),
        };
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(token) {
        return Ok(dt.with_timezone(&Utc));
    }

    if let Ok(date) = NaiveDate::parse_from_str(token, "%Y-%m-%d") {
        return local_midnight(date, tz);
    }

    for fmt in ["%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M"] {
        if let Ok(ndt) = NaiveDateTime::parse_from_str(token, fmt) {
            return to_utc(ndt, tz);
        }
    }

    Err(anyhow!("unrecognized date expression: {input}")).with_context(|| {
        "supported formats: now/today/tomorrow/yesterday, weekday names (e.g. \
         monday), in Nd/in Nw/in Nh, +Nd, RFC3339, YYYY-MM-DD, YYYY-MM-DD HH:MM"
    })
}

pub fn format_local_date(dt: DateTime<Utc>) -> String {
    dt.with_timezone(&Local).format("%Y-%m-%d").to_string()
}

fn local_midnight<Tz: TimeZone>(date: NaiveDate, tz: &Tz) -> anyhow::Result<DateTime<Utc>> {
    let midnight = date
        .and_hms_opt(0, 0, 0)
        .ok_or_else(|| anyhow!("failed to construct midnight for {date}"))?;
    to_utc(midnight, tz)
}

fn to_utc<Tz: TimeZone>(naive: NaiveDateTime, tz: &Tz) -> anyhow::Result<DateTime<Utc>> {
    tz.from_local_datetime(&naive)
        .earliest()
        .map(|dt| dt.with_timezone(&Utc))
        .ok_or_else(|| anyhow!("local time {naive} does not exist in this timezone"))
}

fn parse_weekday_name(token: &str) -> Option<Weekday> {
    match token.trim() {
        "monday" | "mon" => Some(Weekday::Mon),
        "tuesday" | "tue" | "tues" => Some(Weekday::Tue),
        "wednesday" | "wed" => Some(Weekday::Wed),
        "thursday" | "thu" | "thur" | "thurs" => Some(Weekday::Thu),
        "friday" | "fri" => Some(Weekday::Fri),
        "saturday" | "sat" => Some(Weekday::Sat),
        "sunday" | "sun" => Some(Weekday::Sun),
        _ => None,
    }
}

/// Next occurrence of `target` strictly after `from`.
fn next_weekday_date(from: NaiveDate, target: Weekday) -> NaiveDate {
    let from_idx = from.weekday().num_days_from_monday() as i64;
    let target_idx = target.num_days_from_monday() as i64;
    let mut delta = (7 + target_idx - from_idx) % 7;
    if delta == 0 {
        delta = 7;
    }
    from.checked_add_signed(Duration::days(delta)).unwrap_or(from)
}
