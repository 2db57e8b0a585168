//! Table-shaped queries over [`Element`]
//!
//! Expected shape: `table > colgroup > col*`, `table > thead > tr > th*` and
//! `table > tbody > tr > td*`. Additional `thead` rows (the filter row) hold
//! `td` cells aligned with the header.

use crate::dom::Element;

/// Class names shared with the stylesheet and page scripts
pub mod class {
    pub const TABLE: &str = "table";
    pub const TABLE_CONTAINER: &str = "table-container";
    pub const BODY: &str = "table__body";
    pub const ROW: &str = "table__row";
    pub const ROW_SELECTED: &str = "table__row--selected";
    pub const ROW_SUMMARY: &str = "table__row--summary";
    pub const ROW_EMPTY: &str = "table__row--empty";
    pub const GROUP_ROW: &str = "table__group-row";
    pub const CELL: &str = "table__cell";
    pub const CELL_SELECTED: &str = "table__cell--selected";
    pub const CELL_SUMMARY: &str = "table__cell--summary";
    pub const CELL_LAST: &str = "table__cell-last";
    pub const CELL_CHANGED: &str = "table__cell--changed";
    pub const CELL_ACTIONS: &str = "table__cell--actions";
    pub const HEADER_CELL: &str = "table__cell-header";
    pub const HEADER_SIGN: &str = "table__cell-header-sign";
    pub const HEADER_ACTIONS: &str = "table__header--actions";
    pub const SORTED_ASC: &str = "table__cell-header--sorted-asc";
    pub const SORTED_DESC: &str = "table__cell-header--sorted-desc";
    pub const RESIZE_HANDLE: &str = "table__resize-handle";
    pub const RESIZE_LINE: &str = "table__resize-line";
    pub const RESIZE_ACTIVE: &str = "resize-active";
    pub const COLUMN_TOGGLE: &str = "table__column-toggle";
    pub const FILTER_ROW: &str = "table__filter-row";
    pub const FILTER_CELL: &str = "table__filter-cell";
    pub const HIDDEN: &str = "hidden";
    pub const ACTIVE: &str = "active";
    pub const BACK_RED: &str = "back-red";
    pub const BACK_GREEN: &str = "back-green";
    pub const TEXT_GREEN: &str = "text-green";
    pub const TEXT_RED: &str = "text-red";
    pub const TEXT_BLUE: &str = "text-blue";
}

impl Element {
    pub fn colgroup(&self) -> Option<&Element> {
        self.child_by_tag("colgroup")
    }

    pub fn colgroup_mut(&mut self) -> Option<&mut Element> {
        self.child_by_tag_mut("colgroup")
    }

    pub fn thead(&self) -> Option<&Element> {
        self.child_by_tag("thead")
    }

    pub fn thead_mut(&mut self) -> Option<&mut Element> {
        self.child_by_tag_mut("thead")
    }

    /// The data body: a `tbody.table__body` when present, else the first `tbody`
    pub fn tbody(&self) -> Option<&Element> {
        self.children()
            .find(|el| el.tag == "tbody" && el.has_class(class::BODY))
            .or_else(|| self.child_by_tag("tbody"))
    }

    pub fn tbody_mut(&mut self) -> Option<&mut Element> {
        let has_classed = self
            .children()
            .any(|el| el.tag == "tbody" && el.has_class(class::BODY));
        if has_classed {
            self.children_mut()
                .find(|el| el.tag == "tbody" && el.has_class(class::BODY))
        } else {
            self.child_by_tag_mut("tbody")
        }
    }

    /// The body, created as `tbody.table__body` when the table has none
    pub fn ensure_tbody(&mut self) -> &mut Element {
        if self.tbody().is_none() {
            self.push(Element::new("tbody").with_class(class::BODY));
        }
        // Present after the push above.
        self.tbody_mut().expect("tbody exists")
    }

    fn header_row(&self) -> Option<&Element> {
        self.thead()?.children().find(|tr| tr.tag == "tr")
    }

    fn header_row_mut(&mut self) -> Option<&mut Element> {
        self.thead_mut()?.children_mut().find(|tr| tr.tag == "tr")
    }

    /// Header cells that define columns, excluding the actions header
    pub fn header_cells(&self) -> Vec<&Element> {
        self.header_row()
            .map(|tr| {
                tr.children()
                    .filter(|th| th.tag == "th" && !th.has_class(class::HEADER_ACTIONS))
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn header_cells_mut(&mut self) -> Vec<&mut Element> {
        self.header_row_mut()
            .map(|tr| {
                tr.children_mut()
                    .filter(|th| th.tag == "th" && !th.has_class(class::HEADER_ACTIONS))
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn header_cell_mut(&mut self, index: usize) -> Option<&mut Element> {
        self.header_cells_mut().into_iter().nth(index)
    }

    /// Appends a header cell after the column headers (used for the actions column)
    pub fn push_header_cell(&mut self, th: Element) -> bool {
        match self.header_row_mut() {
            Some(tr) => {
                tr.push(th);
                true
            }
            None => false,
        }
    }

    pub fn cols_mut(&mut self) -> Vec<&mut Element> {
        self.colgroup_mut()
            .map(|cg| cg.children_mut().filter(|c| c.tag == "col").collect())
            .unwrap_or_default()
    }

    pub fn col_mut(&mut self, index: usize) -> Option<&mut Element> {
        self.cols_mut().into_iter().nth(index)
    }

    pub fn rows(&self) -> Vec<&Element> {
        self.tbody()
            .map(|tbody| tbody.children().filter(|tr| tr.tag == "tr").collect())
            .unwrap_or_default()
    }

    /// Every `td` at column position `index`, in `thead` rows and the body.
    /// Header `th` cells are not included.
    pub fn for_each_column_cell(&mut self, index: usize, f: &mut dyn FnMut(&mut Element)) {
        for section in self.children_mut() {
            if section.tag != "thead" && section.tag != "tbody" {
                continue;
            }
            for row in section.children_mut().filter(|tr| tr.tag == "tr") {
                if let Some(cell) = row.child_mut(index) {
                    if cell.tag == "td" {
                        f(cell);
                    }
                }
            }
        }
    }

    /// Every `td` in the table
    pub fn for_each_cell(&mut self, f: &mut dyn FnMut(&mut Element)) {
        self.visit_mut(&mut |el| {
            if el.tag == "td" {
                f(el);
            }
        });
    }

    pub fn is_summary_row(&self) -> bool {
        self.has_class(class::ROW_SUMMARY)
    }

    pub fn is_group_row(&self) -> bool {
        self.has_class(class::GROUP_ROW)
    }

    /// A row carrying record data: not a summary row and not a group marker
    pub fn is_data_row(&self) -> bool {
        self.tag == "tr" && !self.is_summary_row() && !self.is_group_row()
    }

    /// Record id of a row: `data-id`, else the trimmed text of its first cell
    pub fn record_id(&self) -> Option<String> {
        if let Some(id) = self.attr("data-id") {
            return Some(id.to_string());
        }
        self.children()
            .find(|td| td.tag == "td")
            .map(|td| td.text_content().trim().to_string())
            .filter(|text| !text.is_empty())
    }
}
