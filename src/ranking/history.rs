use chrono::{Datelike, Duration, NaiveDate};

/// Calendar period size of an occurrence bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum History {
    Daily,
    Weekly,
    Monthly,
}

impl History {
    pub const ALL: [History; 3] = [History::Daily, History::Weekly, History::Monthly];

    /// Resolve a granularity token.
    ///
    /// Accepts `daily`/`d` and `weekly`/`w`. Every other token, including
    /// `monthly`/`m` and unknown spellings, resolves to `Monthly`; unknown
    /// tokens are not an error.
    pub fn from_token(token: &str) -> Self {
        match token {
            "d" | "daily" => History::Daily,
            "w" | "weekly" => History::Weekly,
            _ => History::Monthly,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            History::Daily => "daily",
            History::Weekly => "weekly",
            History::Monthly => "monthly",
        }
    }

    /// Bucket table holding counts at this granularity.
    pub fn table(&self) -> &'static str {
        match self {
            History::Daily => "report_history_daily",
            History::Weekly => "report_history_weekly",
            History::Monthly => "report_history_monthly",
        }
    }

    /// Bucket start date column of [`History::table`].
    pub fn date_column(&self) -> &'static str {
        match self {
            History::Daily => "day",
            History::Weekly => "week",
            History::Monthly => "month",
        }
    }

    /// The bucket key `date` falls into: the day itself, the Monday of its
    /// week, or the first day of its month.
    pub fn bucket_start(&self, date: NaiveDate) -> NaiveDate {
        match self {
            History::Daily => date,
            History::Weekly => {
                date - Duration::days(i64::from(date.weekday().num_days_from_monday()))
            }
            History::Monthly => first_of_month(date),
        }
    }
}

impl std::fmt::Display for History {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

pub(crate) fn first_of_month(date: NaiveDate) -> NaiveDate {
    // Day 1 exists in every month.
    date - Duration::days(i64::from(date.day0()))
}
