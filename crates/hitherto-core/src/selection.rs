//! Pinned-document selection and out-of-context tracking.
//!
//! A [`SelectionState`] is an explicitly constructed value owned by one
//! session. All reads and writes go through [`SelectionState::toggle`],
//! [`SelectionState::set_filters`], and [`SelectionState::clear`]; nothing
//! here touches the network.
//!
//! Every pinned item carries an out-of-context flag. The flag is a pure
//! function of the item and the current filters ([`is_out_of_context`]) and
//! is recomputed for every item whenever the filters change.

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;

use crate::context::ContextRequest;
use crate::models::{normalize_category, ContextFilters, DateRange};

/// Filters active in the user's session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SelectionFilters {
    pub category: Option<String>,
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
}

impl SelectionFilters {
    /// The equivalent request filters for filtered-mode retrieval.
    pub fn to_context_filters(&self) -> ContextFilters {
        ContextFilters::new(
            self.category.iter(),
            DateRange::new(self.start, self.end),
        )
    }
}

/// A partial filter update.
///
/// For each field, `None` keeps the current value, `Some(None)` clears it,
/// and `Some(Some(v))` sets it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterPatch {
    pub category: Option<Option<String>>,
    pub start: Option<Option<NaiveDate>>,
    pub end: Option<Option<NaiveDate>>,
}

impl FilterPatch {
    pub fn category(mut self, category: Option<&str>) -> Self {
        self.category = Some(category.map(str::to_string));
        self
    }

    pub fn start(mut self, start: Option<NaiveDate>) -> Self {
        self.start = Some(start);
        self
    }

    pub fn end(mut self, end: Option<NaiveDate>) -> Self {
        self.end = Some(end);
        self
    }

    fn apply(self, filters: &mut SelectionFilters) {
        if let Some(category) = self.category {
            filters.category = category;
        }
        if let Some(start) = self.start {
            filters.start = start;
        }
        if let Some(end) = self.end {
            filters.end = end;
        }
    }
}

/// A document the user pinned into context.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SelectionItem {
    pub document_id: String,
    pub title: String,
    /// Cached chunk contents for display.
    pub chunks: Vec<String>,
    pub category: Option<String>,
    pub received_at: DateTime<Utc>,
    out_of_context: bool,
}

impl SelectionItem {
    pub fn new(
        document_id: impl Into<String>,
        title: impl Into<String>,
        chunks: Vec<String>,
        category: Option<String>,
        received_at: DateTime<Utc>,
    ) -> Self {
        Self {
            document_id: document_id.into(),
            title: title.into(),
            chunks,
            category,
            received_at,
            out_of_context: false,
        }
    }

    /// Whether this item no longer matches the filters it was last
    /// evaluated against.
    pub fn out_of_context(&self) -> bool {
        self.out_of_context
    }
}

/// True when `item` falls outside `filters`.
///
/// - a category filter is set and the item's category differs (an item
///   with no category differs from every category), or
/// - a start date is set and the item was received before it, or
/// - an end date is set and the item was received on or after the day
///   following it.
pub fn is_out_of_context(item: &SelectionItem, filters: &SelectionFilters) -> bool {
    if let Some(category) = &filters.category {
        let wanted = normalize_category(category);
        match &item.category {
            Some(c) if normalize_category(c) == wanted => {}
            _ => return true,
        }
    }
    let window = DateRange {
        start: filters.start,
        end: filters.end,
    };
    !window.contains(item.received_at)
}

/// One session's pinned documents and active filters.
#[derive(Debug, Clone, Default)]
pub struct SelectionState {
    items: Vec<SelectionItem>,
    filters: SelectionFilters,
}

impl SelectionState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_filters(filters: SelectionFilters) -> Self {
        Self {
            items: Vec::new(),
            filters,
        }
    }

    pub fn items(&self) -> &[SelectionItem] {
        &self.items
    }

    pub fn filters(&self) -> &SelectionFilters {
        &self.filters
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn get(&self, document_id: &str) -> Option<&SelectionItem> {
        self.items.iter().find(|i| i.document_id == document_id)
    }

    /// Pin `item`, or unpin the item with the same document id.
    ///
    /// Returns `true` if the document is pinned afterwards.
    pub fn toggle(&mut self, mut item: SelectionItem) -> bool {
        if let Some(pos) = self
            .items
            .iter()
            .position(|i| i.document_id == item.document_id)
        {
            self.items.remove(pos);
            return false;
        }
        item.out_of_context = is_out_of_context(&item, &self.filters);
        self.items.push(item);
        true
    }

    /// Merge `patch` into the filters and re-evaluate every pinned item.
    pub fn set_filters(&mut self, patch: FilterPatch) {
        patch.apply(&mut self.filters);
        for item in &mut self.items {
            item.out_of_context = is_out_of_context(item, &self.filters);
        }
        tracing::debug!(
            pinned = self.items.len(),
            out_of_context = self.out_of_context_count(),
            "selection filters updated"
        );
    }

    /// Unpin everything.
    pub fn clear(&mut self) {
        self.items.clear();
    }

    pub fn out_of_context_count(&self) -> usize {
        self.items.iter().filter(|i| i.out_of_context).count()
    }

    /// Build the retrieval request for this selection.
    ///
    /// Pinned documents always win (explicit mode, filters ignored). With
    /// nothing pinned, the active filters scope the request.
    pub fn context_request(&self, query: impl Into<String>, k: Option<i64>) -> ContextRequest {
        let mut req = ContextRequest::new(query);
        req.k = k;
        if self.items.is_empty() {
            req.filters = self.filters.to_context_filters();
        } else {
            req.document_ids = self.items.iter().map(|i| i.document_id.clone()).collect();
        }
        req
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn item(doc: &str, category: Option<&str>, y: i32, m: u32, d: u32) -> SelectionItem {
        SelectionItem::new(
            doc,
            format!("{doc} title"),
            vec![format!("{doc} body")],
            category.map(str::to_string),
            Utc.with_ymd_and_hms(y, m, d, 12, 0, 0).unwrap(),
        )
    }

    fn date(y: i32, m: u32, d: u32) -> Option<NaiveDate> {
        NaiveDate::from_ymd_opt(y, m, d)
    }

    #[test]
    fn test_category_change_marks_item_out_of_context() {
        let mut state = SelectionState::new();
        state.toggle(item("D1", Some("econ"), 2024, 1, 5));
        assert!(!state.get("D1").unwrap().out_of_context());

        state.set_filters(FilterPatch::default().category(Some("tech")));
        assert!(state.get("D1").unwrap().out_of_context());
    }

    #[test]
    fn test_toggle_twice_restores_original_state() {
        let mut state = SelectionState::new();
        state.toggle(item("D1", Some("econ"), 2024, 1, 5));
        let before: Vec<SelectionItem> = state.items().to_vec();

        assert!(state.toggle(item("D2", Some("tech"), 2024, 2, 10)));
        assert!(!state.toggle(item("D2", Some("tech"), 2024, 2, 10)));
        assert_eq!(state.items(), before.as_slice());
    }

    #[test]
    fn test_toggle_computes_initial_flag_against_current_filters() {
        let mut state = SelectionState::with_filters(SelectionFilters {
            category: Some("econ".to_string()),
            ..Default::default()
        });
        state.toggle(item("D2", Some("tech"), 2024, 2, 10));
        state.toggle(item("D1", Some("Econ"), 2024, 1, 5));
        assert!(state.get("D2").unwrap().out_of_context());
        assert!(!state.get("D1").unwrap().out_of_context());
    }

    #[test]
    fn test_set_filters_recomputes_every_item() {
        let mut state = SelectionState::new();
        state.toggle(item("D1", Some("econ"), 2024, 1, 5));
        state.toggle(item("D2", Some("tech"), 2024, 2, 10));
        state.toggle(item("D3", None, 2024, 3, 1));

        let patches = [
            FilterPatch::default().category(Some("econ")),
            FilterPatch::default().start(date(2024, 2, 1)),
            FilterPatch::default().category(None),
            FilterPatch::default().end(date(2024, 2, 10)),
            FilterPatch::default().start(None).end(None),
        ];
        for patch in patches {
            state.set_filters(patch);
            for it in state.items() {
                assert_eq!(
                    it.out_of_context(),
                    is_out_of_context(it, state.filters()),
                    "stale flag on {} under {:?}",
                    it.document_id,
                    state.filters()
                );
            }
        }
        assert_eq!(state.out_of_context_count(), 0);
    }

    #[test]
    fn test_patch_merges_rather_than_replaces() {
        let mut state = SelectionState::new();
        state.set_filters(FilterPatch::default().category(Some("econ")));
        state.set_filters(FilterPatch::default().start(date(2024, 1, 1)));
        assert_eq!(state.filters().category.as_deref(), Some("econ"));
        assert_eq!(state.filters().start, date(2024, 1, 1));
    }

    #[test]
    fn test_date_predicate_boundaries() {
        let filters = SelectionFilters {
            category: None,
            start: date(2024, 1, 5),
            end: date(2024, 1, 5),
        };
        let mut it = item("D1", None, 2024, 1, 5);
        assert!(!is_out_of_context(&it, &filters));

        it.received_at = Utc.with_ymd_and_hms(2024, 1, 5, 23, 59, 59).unwrap();
        assert!(!is_out_of_context(&it, &filters));

        it.received_at = Utc.with_ymd_and_hms(2024, 1, 6, 0, 0, 0).unwrap();
        assert!(is_out_of_context(&it, &filters));

        it.received_at = Utc.with_ymd_and_hms(2024, 1, 4, 23, 59, 59).unwrap();
        assert!(is_out_of_context(&it, &filters));
    }

    #[test]
    fn test_uncategorized_item_is_out_of_context_under_category_filter() {
        let filters = SelectionFilters {
            category: Some("econ".to_string()),
            ..Default::default()
        };
        assert!(is_out_of_context(&item("D1", None, 2024, 1, 5), &filters));
    }

    #[test]
    fn test_clear_removes_everything() {
        let mut state = SelectionState::new();
        state.toggle(item("D1", Some("econ"), 2024, 1, 5));
        state.toggle(item("D2", Some("tech"), 2024, 2, 10));
        state.clear();
        assert!(state.is_empty());
    }

    #[test]
    fn test_context_request_prefers_pinned_documents() {
        let mut state = SelectionState::new();
        state.set_filters(FilterPatch::default().category(Some("econ")));

        let req = state.context_request("rates", Some(3));
        assert!(req.document_ids.is_empty());
        assert_eq!(req.filters.categories(), ["econ"]);
        assert_eq!(req.k, Some(3));

        state.toggle(item("D2", Some("tech"), 2024, 2, 10));
        let req = state.context_request("rates", None);
        assert_eq!(req.document_ids, vec!["D2"]);
        assert!(req.filters.is_empty());
    }
}
