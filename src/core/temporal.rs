use chrono::NaiveDate;

use super::task::Task;

/// Due-date proximity of a task relative to today.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Bucket {
    Overdue,
    Today,
    Tomorrow,
    DayAfterTomorrow,
    Future,
}

impl Bucket {
    /// Buckets that can trigger a notification, most urgent first.
    pub const NOTIFIABLE: [Bucket; 4] = [
        Bucket::Overdue,
        Bucket::Today,
        Bucket::Tomorrow,
        Bucket::DayAfterTomorrow,
    ];

    /// Category key used for ledger entries and notification tags.
    pub fn key(&self) -> &'static str {
        match self {
            Self::Overdue => "overdue",
            Self::Today => "today",
            Self::Tomorrow => "tomorrow",
            Self::DayAfterTomorrow => "dayAfterTomorrow",
            Self::Future => "future",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Overdue => "overdue",
            Self::Today => "today",
            Self::Tomorrow => "tomorrow",
            Self::DayAfterTomorrow => "day after tomorrow",
            Self::Future => "upcoming",
        }
    }

    /// Overdue and today's reminders stay on screen until dismissed.
    pub fn is_urgent(&self) -> bool {
        matches!(self, Self::Overdue | Self::Today)
    }
}

pub fn classify(today: NaiveDate, due: NaiveDate) -> Bucket {
    if due < today {
        return Bucket::Overdue;
    }
    if due == today {
        return Bucket::Today;
    }
    let tomorrow = today.succ_opt();
    if Some(due) == tomorrow {
        return Bucket::Tomorrow;
    }
    if Some(due) == tomorrow.and_then(|d| d.succ_opt()) {
        return Bucket::DayAfterTomorrow;
    }
    Bucket::Future
}

/// Tasks grouped into the notifiable buckets; future tasks are dropped.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DueBuckets {
    pub overdue: Vec<Task>,
    pub today: Vec<Task>,
    pub tomorrow: Vec<Task>,
    pub day_after_tomorrow: Vec<Task>,
}

impl DueBuckets {
    pub fn build(tasks: &[Task], today: NaiveDate) -> Self {
        let mut buckets = Self::default();
        for task in tasks {
            let target = match classify(today, task.due_date) {
                Bucket::Overdue => &mut buckets.overdue,
                Bucket::Today => &mut buckets.today,
                Bucket::Tomorrow => &mut buckets.tomorrow,
                Bucket::DayAfterTomorrow => &mut buckets.day_after_tomorrow,
                Bucket::Future => continue,
            };
            target.push(task.clone());
        }
        buckets
    }

    pub fn get(&self, bucket: Bucket) -> &[Task] {
        match bucket {
            Bucket::Overdue => &self.overdue,
            Bucket::Today => &self.today,
            Bucket::Tomorrow => &self.tomorrow,
            Bucket::DayAfterTomorrow => &self.day_after_tomorrow,
            Bucket::Future => &[],
        }
    }

    pub fn total_count(&self) -> usize {
        self.overdue.len() + self.today.len() + self.tomorrow.len() + self.day_after_tomorrow.len()
    }
}
