//! Core data models for context retrieval.
//!
//! These types describe the newsletter chunks the retrieval core reads, and
//! the scoping filters that restrict which chunks are eligible for a query.
//! Chunks are produced by the ingestion pipeline and are never mutated here.

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifies a chunk by its owning document and its position in it.
///
/// The derived ordering (`document_id`, then `index`) is the tie-breaker used
/// whenever two chunks score identically.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ChunkId {
    pub document_id: String,
    pub index: i64,
}

impl ChunkId {
    pub fn new(document_id: impl Into<String>, index: i64) -> Self {
        Self {
            document_id: document_id.into(),
            index,
        }
    }
}

impl fmt::Display for ChunkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.document_id, self.index)
    }
}

/// A bounded segment of a newsletter's extracted text.
///
/// `title`, `category`, and `received_at` belong to the owning document and
/// are carried on every chunk so scoping never needs a second lookup.
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    pub id: ChunkId,
    pub text: String,
    pub title: String,
    pub category: Option<String>,
    pub received_at: DateTime<Utc>,
}

/// Normalize a category label for comparison.
///
/// Categories are stored lower-cased with spaces replaced by underscores, so
/// `"Fixed Income"` and `"fixed_income"` name the same category.
pub fn normalize_category(category: &str) -> String {
    category.trim().to_lowercase().replace(' ', "_")
}

/// Parse a filter date.
///
/// Accepts `YYYY-MM-DD` or a full RFC 3339 timestamp, in which case only the
/// (UTC) date part is kept.
pub fn parse_filter_date(s: &str) -> Option<NaiveDate> {
    let s = s.trim();
    NaiveDate::parse_from_str(s, "%Y-%m-%d").ok().or_else(|| {
        DateTime::parse_from_rfc3339(s)
            .ok()
            .map(|dt| dt.with_timezone(&Utc).date_naive())
    })
}

/// Midnight UTC at the start of `date`.
fn start_of_day(date: NaiveDate) -> DateTime<Utc> {
    date.and_time(chrono::NaiveTime::MIN).and_utc()
}

/// Received-date window: inclusive `start`, exclusive end-of-day `end`.
///
/// A timestamp is inside the range when `start <= ts < end + 1 day`. Either
/// bound may be absent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DateRange {
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
}

impl DateRange {
    /// Build a range, swapping the bounds if they arrive reversed.
    pub fn new(start: Option<NaiveDate>, end: Option<NaiveDate>) -> Self {
        match (start, end) {
            (Some(s), Some(e)) if e < s => Self {
                start: Some(e),
                end: Some(s),
            },
            _ => Self { start, end },
        }
    }

    pub fn is_unbounded(&self) -> bool {
        self.start.is_none() && self.end.is_none()
    }

    /// Inclusive lower bound: midnight UTC on `start`.
    pub fn lower_bound(&self) -> Option<DateTime<Utc>> {
        self.start.map(start_of_day)
    }

    /// Exclusive upper bound: midnight UTC on the day after `end`.
    pub fn upper_bound(&self) -> Option<DateTime<Utc>> {
        self.end.map(|end| start_of_day(end) + Duration::days(1))
    }

    pub fn contains(&self, ts: DateTime<Utc>) -> bool {
        self.lower_bound().map_or(true, |lo| ts >= lo)
            && self.upper_bound().map_or(true, |hi| ts < hi)
    }
}

/// Category and date restrictions applied in filtered mode.
///
/// All supplied filters must match (logical AND). Within `categories`, a
/// chunk matches if its category equals any listed one.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContextFilters {
    categories: Vec<String>,
    pub date_range: DateRange,
}

impl ContextFilters {
    pub fn new<I, S>(categories: I, date_range: DateRange) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut normalized: Vec<String> = categories
            .into_iter()
            .map(|c| normalize_category(c.as_ref()))
            .filter(|c| !c.is_empty())
            .collect();
        normalized.sort();
        normalized.dedup();
        Self {
            categories: normalized,
            date_range,
        }
    }

    /// Normalized, sorted, de-duplicated category list.
    pub fn categories(&self) -> &[String] {
        &self.categories
    }

    pub fn is_empty(&self) -> bool {
        self.categories.is_empty() && self.date_range.is_unbounded()
    }

    pub fn matches_category(&self, category: Option<&str>) -> bool {
        if self.categories.is_empty() {
            return true;
        }
        match category {
            Some(c) => {
                let c = normalize_category(c);
                self.categories.iter().any(|f| *f == c)
            }
            None => false,
        }
    }

    pub fn matches(&self, chunk: &Chunk) -> bool {
        self.matches_category(chunk.category.as_deref())
            && self.date_range.contains(chunk.received_at)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn chunk(category: Option<&str>, ts: DateTime<Utc>) -> Chunk {
        Chunk {
            id: ChunkId::new("d1", 0),
            text: "text".to_string(),
            title: "title".to_string(),
            category: category.map(str::to_string),
            received_at: ts,
        }
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_chunk_id_display_and_order() {
        let a = ChunkId::new("D1", 2);
        let b = ChunkId::new("D1", 10);
        let c = ChunkId::new("D2", 0);
        assert_eq!(a.to_string(), "D1-2");
        assert!(a < b);
        assert!(b < c);
    }

    #[test]
    fn test_normalize_category() {
        assert_eq!(normalize_category("  Fixed Income "), "fixed_income");
        assert_eq!(normalize_category("econ"), "econ");
    }

    #[test]
    fn test_parse_filter_date() {
        assert_eq!(parse_filter_date("2024-01-05"), Some(date(2024, 1, 5)));
        assert_eq!(
            parse_filter_date("2024-01-05T23:30:00Z"),
            Some(date(2024, 1, 5))
        );
        assert_eq!(parse_filter_date("next tuesday"), None);
    }

    #[test]
    fn test_date_range_end_is_end_of_day() {
        let range = DateRange::new(Some(date(2024, 1, 1)), Some(date(2024, 1, 5)));
        let late = Utc.with_ymd_and_hms(2024, 1, 5, 23, 59, 59).unwrap();
        let next = Utc.with_ymd_and_hms(2024, 1, 6, 0, 0, 0).unwrap();
        let before = Utc.with_ymd_and_hms(2023, 12, 31, 23, 59, 59).unwrap();
        let first = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        assert!(range.contains(late));
        assert!(range.contains(first));
        assert!(!range.contains(next));
        assert!(!range.contains(before));
    }

    #[test]
    fn test_date_range_swaps_reversed_bounds() {
        let range = DateRange::new(Some(date(2024, 2, 1)), Some(date(2024, 1, 1)));
        assert_eq!(range.start, Some(date(2024, 1, 1)));
        assert_eq!(range.end, Some(date(2024, 2, 1)));
    }

    #[test]
    fn test_filters_category_any_of() {
        let ts = Utc.with_ymd_and_hms(2024, 1, 5, 0, 0, 0).unwrap();
        let filters = ContextFilters::new(["Econ", "tech"], DateRange::default());
        assert_eq!(filters.categories(), ["econ", "tech"]);
        assert!(filters.matches(&chunk(Some("econ"), ts)));
        assert!(filters.matches(&chunk(Some("Tech"), ts)));
        assert!(!filters.matches(&chunk(Some("rates"), ts)));
        assert!(!filters.matches(&chunk(None, ts)));
    }

    #[test]
    fn test_empty_filters_match_everything() {
        let ts = Utc.with_ymd_and_hms(2024, 1, 5, 0, 0, 0).unwrap();
        let filters = ContextFilters::new(Vec::<String>::new(), DateRange::default());
        assert!(filters.is_empty());
        assert!(filters.matches(&chunk(None, ts)));
    }
}
