//! Problem ranking: one shared aggregation over occurrence buckets, with a
//! "hot" policy (recent activity) and a "long-term" policy (average
//! occurrences per observed month).

pub mod aggregate;
pub mod history;
pub mod hot;
pub mod longterm;

pub use aggregate::{query_problems, RankQuery};
pub use history::History;
pub use hot::{hot_problems, DEFAULT_HOT_WINDOW_DAYS};
pub use longterm::{longterm_problems, min_first_occurrence, observed_months, prioritize_longterm};
