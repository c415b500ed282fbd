use chrono::{DateTime, Utc};
use tally_shared::{Priority, Task};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Stats {
    pub total: usize,
    pub completed: usize,
    pub pending: usize,
    pub overdue: usize,
    pub low: usize,
    pub medium: usize,
    pub high: usize,
}

impl Stats {
    pub fn collect(tasks: &[Task], now: DateTime<Utc>) -> Self {
        let mut stats = Self::default();
        for task in tasks {
            stats.total += 1;
            if task.completed {
                stats.completed += 1;
            } else {
                stats.pending += 1;
            }
            if task.is_overdue(now) {
                stats.overdue += 1;
            }
            match task.priority {
                Priority::Low => stats.low += 1,
                Priority::Medium => stats.medium += 1,
                Priority::High => stats.high += 1,
            }
        }
        stats
    }

    /// Whole-number completion percentage; 0 for an empty list.
    pub fn completion_rate(&self) -> u32 {
        if self.total == 0 {
            return 0;
        }
        ((self.completed as f64 / self.total as f64) * 100.0).round() as u32
    }
}

pub fn pending_visible(projection: &[&Task]) -> usize {
    projection.iter().filter(|t| !t.completed).count()
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone};

    use super::*;

    #[test]
    fn counts_completion_overdue_and_priorities() {
        let now = Utc.with_ymd_and_hms(2024, 5, 10, 12, 0, 0).unwrap();
        let mut late = Task::with_id("a", "late", now);
        late.due = Some(now - Duration::days(1));
        late.priority = Priority::High;
        let mut late_but_done = Task::with_id("b", "done", now);
        late_but_done.due = Some(now - Duration::days(2));
        late_but_done.completed = true;
        let mut upcoming = Task::with_id("c", "soon", now);
        upcoming.due = Some(now + Duration::days(1));
        upcoming.priority = Priority::Low;

        let stats = Stats::collect(&[late, late_but_done, upcoming], now);
        assert_eq!(stats.total, 3);
        assert_eq!(stats.completed, 1);
        assert_eq!(stats.pending, 2);
        assert_eq!(stats.overdue, 1);
        assert_eq!((stats.low, stats.medium, stats.high), (1, 1, 1));
        assert_eq!(stats.completion_rate(), 33);
    }

    #[test]
    fn empty_list_has_zero_rate() {
        let now = Utc.with_ymd_and_hms(2024, 5, 10, 12, 0, 0).unwrap();
        assert_eq!(Stats::collect(&[], now).completion_rate(), 0);
    }

    #[test]
    fn pending_visible_ignores_completed() {
        let now = Utc.with_ymd_and_hms(2024, 5, 10, 12, 0, 0).unwrap();
        let open = Task::with_id("a", "open", now);
        let mut done = Task::with_id("b", "done", now);
        done.completed = true;
        assert_eq!(pending_visible(&[&open, &done]), 1);
    }
}
