//! Per-table column filters
//!
//! A row stays visible only when every active filter accepts it. Summary and
//! group rows are never filtered.

use crate::dom::Element;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterKind {
    /// Case-insensitive substring match
    Text,
    /// Case-insensitive exact match
    Select,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Filter {
    pub kind: FilterKind,
    /// Lowercased filter value
    pub value: String,
}

impl Filter {
    pub fn new(kind: FilterKind, value: &str) -> Self {
        Self {
            kind,
            value: value.trim().to_lowercase(),
        }
    }

    pub fn accepts(&self, cell_text: &str) -> bool {
        let text = cell_text.trim().to_lowercase();
        match self.kind {
            FilterKind::Text => text.contains(&self.value),
            FilterKind::Select => text == self.value,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TableFilters {
    filters: BTreeMap<usize, Filter>,
}

impl TableFilters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the filter on `column`; an empty value clears it
    pub fn set(&mut self, column: usize, kind: FilterKind, value: &str) {
        if value.trim().is_empty() {
            self.filters.remove(&column);
        } else {
            self.filters.insert(column, Filter::new(kind, value));
        }
    }

    pub fn clear(&mut self, column: usize) -> bool {
        self.filters.remove(&column).is_some()
    }

    pub fn get(&self, column: usize) -> Option<&Filter> {
        self.filters.get(&column)
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    pub fn len(&self) -> usize {
        self.filters.len()
    }

    /// A row missing a filtered cell is not held back by that filter
    pub fn matches(&self, row: &Element) -> bool {
        self.filters.iter().all(|(&column, filter)| match row.child(column) {
            Some(cell) => filter.accepts(&cell.text_content()),
            None => true,
        })
    }

    /// Show or hide every data row of `tbody`. Returns the visible data row count.
    pub fn apply(&self, tbody: &mut Element) -> usize {
        let mut visible = 0;
        for row in tbody.children_mut().filter(|tr| tr.tag == "tr") {
            if row.is_summary_row() || row.is_group_row() {
                continue;
            }
            if self.matches(row) {
                row.remove_style("display");
                visible += 1;
            } else {
                row.set_style("display", "none");
            }
        }
        visible
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::markup::class;

    fn row(a: &str, b: &str) -> Element {
        Element::new("tr")
            .with_child(Element::new("td").with_text(a))
            .with_child(Element::new("td").with_text(b))
    }

    #[test]
    fn test_filters_are_conjunctive() {
        let mut tbody = Element::new("tbody")
            .with_child(row("xABCx", "x"))
            .with_child(row("abc", "Y"))
            .with_child(row("zzz", "X"))
            .with_child(row(" ABC ", " X "));

        let mut filters = TableFilters::new();
        filters.set(0, FilterKind::Text, "abc");
        filters.set(1, FilterKind::Select, "X");
        assert_eq!(filters.apply(&mut tbody), 2);

        let shown: Vec<bool> = tbody.children().map(|tr| tr.is_displayed()).collect();
        assert_eq!(shown, vec![true, false, false, true]);
    }

    #[test]
    fn test_select_requires_exact_match() {
        let filter = Filter::new(FilterKind::Select, "Cash");
        assert!(filter.accepts(" cash "));
        assert!(!filter.accepts("cashless"));
    }

    #[test]
    fn test_clearing_restores_rows_and_skips_summary() {
        let mut tbody = Element::new("tbody")
            .with_child(row("a", "1"))
            .with_child(row("b", "2").with_class(class::ROW_SUMMARY))
            .with_child(row("group", "").with_class(class::GROUP_ROW));

        let mut filters = TableFilters::new();
        filters.set(0, FilterKind::Text, "zzz");
        assert_eq!(filters.apply(&mut tbody), 0);
        assert!(!tbody.child(0).unwrap().is_displayed());
        assert!(tbody.child(1).unwrap().is_displayed());
        assert!(tbody.child(2).unwrap().is_displayed());

        filters.set(0, FilterKind::Text, "  ");
        assert!(filters.is_empty());
        assert_eq!(filters.apply(&mut tbody), 1);
        assert!(tbody.child(0).unwrap().is_displayed());
    }
}
