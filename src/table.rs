//! Per-table instance: column model, widths, visibility, resize, column menu

use crate::column::{Column, SortDirection};
use crate::config::GridConfig;
use crate::dom::Element;
use crate::dropdown::{toggle_button, DropdownManager};
use crate::error::GridError;
use crate::form::{build_form, FormView};
use crate::markup::class;
use crate::persist::{LayoutSnapshot, LayoutStore};
use crate::resize::{GuideLine, ResizeHandler, TableFrame};
use crate::sizing::{ColumnSizeCalculator, TableMetrics};
use crate::sort::sort_rows;
use crate::visibility::{
    lock_col_width, project_columns, px, set_column_hidden, sync_form_column, update_last_column_highlight,
    ColumnVisibilityController,
};
use std::rc::Rc;

/// One rendered grid. Owns the table markup while registered; [`Self::destroy`]
/// hands it back.
pub struct ResizableTable {
    id: String,
    element: Element,
    columns: Vec<Column>,
    config: Rc<GridConfig>,
    store: Rc<dyn LayoutStore>,
    resize: ResizeHandler,
    dropdown: DropdownManager,
    form: Option<FormView>,
}

impl std::fmt::Debug for ResizableTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResizableTable")
            .field("id", &self.id)
            .field("columns", &self.columns)
            .finish_non_exhaustive()
    }
}

impl ResizableTable {
    /// Build an instance over `element`.
    ///
    /// Width sources, first match wins: a stored snapshot matching the column
    /// count, `carried_widths` from the instance being replaced, a fresh
    /// calculation from `metrics`.
    pub fn new(
        mut element: Element,
        carried_widths: &[u32],
        metrics: &TableMetrics,
        config: Rc<GridConfig>,
        store: Rc<dyn LayoutStore>,
    ) -> Result<Self, GridError> {
        let id = element
            .id()
            .filter(|id| !id.is_empty())
            .ok_or_else(|| GridError::InvalidStructure("table has no id".into()))?
            .to_string();
        if element.colgroup().is_none() {
            return Err(GridError::InvalidStructure(format!("table {:?} has no colgroup", id)));
        }

        let mut columns: Vec<Column> = element
            .header_cells()
            .into_iter()
            .enumerate()
            .map(|(index, th)| Column::from_header(index, th))
            .collect();
        ensure_cols(&mut element, columns.len());
        for (column, col) in columns.iter_mut().zip(element.cols_mut()) {
            column.saved_width = col.attr("data-saved-width").and_then(|w| w.parse().ok());
        }

        let stored = store.load(&id);
        let snapshot = match stored {
            Some(snapshot) if snapshot.fits(columns.len()) => Some(snapshot),
            Some(snapshot) => {
                log::warn!(
                    "stored layout for {:?} has {} widths for {} columns; recomputing",
                    id,
                    snapshot.widths.len(),
                    columns.len()
                );
                None
            }
            None => None,
        };

        let prior: Vec<u32> = match &snapshot {
            Some(snapshot) => snapshot.widths.clone(),
            None if carried_widths.len() == columns.len() => carried_widths.to_vec(),
            None => {
                if !carried_widths.is_empty() {
                    log::warn!(
                        "carried widths for {:?} do not match {} columns; recomputing",
                        id,
                        columns.len()
                    );
                }
                Vec::new()
            }
        };
        let computed = prior.is_empty();
        let widths = ColumnSizeCalculator::new(&columns, &config).calculate(metrics, &prior);

        for (column, &width) in columns.iter_mut().zip(&widths) {
            match (column.visible, width) {
                (true, 0) => column.width = config.min_column_width,
                (true, w) => column.width = w,
                (false, 0) => column.width = 0,
                (false, w) => {
                    column.width = w;
                    column.hide();
                }
            }
        }

        let mut table = Self {
            id,
            element,
            columns,
            resize: ResizeHandler::new(config.min_column_width),
            dropdown: DropdownManager::new(),
            form: None,
            config,
            store,
        };

        table.apply_column_widths();
        for index in (0..table.columns.len()).filter(|&i| !table.columns[i].visible) {
            set_column_hidden(&mut table.element, index, true);
        }
        if let Some(snapshot) = snapshot.filter(|s| !s.hidden.is_empty()) {
            table.apply_hidden_state(&snapshot.hidden);
        } else {
            table.update_last_column_highlight();
        }
        table.add_header_controls();
        table.element.set_style("visibility", "visible");

        if computed {
            table.persist();
        }
        log::debug!("table {:?} ready with widths {:?}", table.id, table.column_widths());
        Ok(table)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn element(&self) -> &Element {
        &self.element
    }

    pub fn element_mut(&mut self) -> &mut Element {
        &mut self.element
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn config(&self) -> &GridConfig {
        &self.config
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().find(|c| c.name == name).map(|c| c.index)
    }

    pub fn column_widths(&self) -> Vec<u32> {
        self.columns.iter().map(|c| c.width).collect()
    }

    pub fn hidden_state(&self) -> Vec<bool> {
        self.columns.iter().map(|c| !c.visible).collect()
    }

    pub fn snapshot(&self) -> LayoutSnapshot {
        LayoutSnapshot::new(self.column_widths(), self.hidden_state())
    }

    pub fn persist(&self) {
        if self.columns.is_empty() {
            return;
        }
        self.store.save(&self.id, &self.snapshot());
    }

    /// Sum of visible widths, which is also the table's inline width
    pub fn table_width(&self) -> u32 {
        self.columns.iter().filter(|c| c.visible).map(|c| c.width).sum()
    }

    pub fn update_table_width(&mut self) {
        let width = self.table_width();
        self.element.set_style("width", px(width));
    }

    /// Write every column's width onto its `<col>`, header and cells
    fn apply_column_widths(&mut self) {
        for column in &self.columns {
            if let Some(col) = self.element.col_mut(column.index) {
                lock_col_width(col, column.width);
                if let Some(saved) = column.saved_width {
                    col.set_attr("data-saved-width", saved.to_string());
                }
            }
            if column.width == 0 {
                continue;
            }
            let max_width = px(column.width);
            if let Some(th) = self.element.header_cell_mut(column.index) {
                th.set_style("max-width", max_width.as_str());
            }
            self.element
                .for_each_column_cell(column.index, &mut |td| td.set_style("max-width", max_width.as_str()));
        }
        self.update_table_width();
    }

    fn apply_hidden_state(&mut self, hidden: &[bool]) {
        ColumnVisibilityController::new(&mut self.element, &mut self.columns, self.config.min_column_width)
            .apply_hidden_state(hidden);
        self.update_table_width();
    }

    pub fn update_last_column_highlight(&mut self) {
        update_last_column_highlight(&mut self.element, &self.columns);
    }

    /// Resize handle and menu toggle on every header, added once
    fn add_header_controls(&mut self) {
        for th in self.element.header_cells_mut() {
            if th.find(&|el| el.has_class(class::RESIZE_HANDLE)).is_none() {
                th.push(Element::new("div").with_class(class::RESIZE_HANDLE));
            }
            if th.find(&|el| el.has_class(class::COLUMN_TOGGLE)).is_none() {
                th.push(toggle_button());
            }
        }
    }

    /// Hide or show column `index`, then refresh width, the open form and the
    /// stored snapshot. Returns true when the column is now hidden.
    pub fn toggle_column_visibility(&mut self, index: usize) -> Result<bool, GridError> {
        let hidden =
            ColumnVisibilityController::new(&mut self.element, &mut self.columns, self.config.min_column_width)
                .toggle(index)?;
        self.update_table_width();
        if let Some(form) = self.form.as_mut() {
            sync_form_column(&mut form.element, index, !hidden);
        }
        self.persist();
        Ok(hidden)
    }

    /// Reorder rows by column `index` and move the sort indicator onto its header
    pub fn sort_column(&mut self, index: usize, direction: SortDirection) -> Result<(), GridError> {
        let count = self.columns.len();
        let kind = self
            .columns
            .get(index)
            .map(|c| c.kind)
            .ok_or(GridError::ColumnOutOfRange { index, count })?;

        for column in &mut self.columns {
            column.sort = if column.index == index { direction } else { SortDirection::None };
        }
        for (position, th) in self.element.header_cells_mut().into_iter().enumerate() {
            th.remove_class(class::SORTED_ASC);
            th.remove_class(class::SORTED_DESC);
            if position == index {
                match direction {
                    SortDirection::Asc => th.add_class(class::SORTED_ASC),
                    SortDirection::Desc => th.add_class(class::SORTED_DESC),
                    SortDirection::None => {}
                }
            }
        }

        let id = self.id.clone();
        let tbody = self.element.tbody_mut().ok_or(GridError::MissingBody(id))?;
        sort_rows(tbody, index, kind, direction);
        Ok(())
    }

    /// Hidden flags, widths and the last-column marker for a row built
    /// outside the table
    pub fn decorate_row(&self, row: &mut Element) {
        project_columns(row, &self.columns);
    }

    /// Re-apply hidden flags, widths and the last-column marker to every body row
    pub fn decorate_body(&mut self) {
        for column in &self.columns {
            set_column_hidden(&mut self.element, column.index, !column.visible);
        }
        let columns = &self.columns;
        if let Some(tbody) = self.element.tbody_mut() {
            for row in tbody.children_mut() {
                project_columns(row, columns);
            }
        }
    }

    pub fn resize(&self) -> &ResizeHandler {
        &self.resize
    }

    /// Start dragging column `index`'s right edge
    pub fn begin_resize(&mut self, index: usize, pointer_x: f64, frame: TableFrame) -> Result<Option<GuideLine>, GridError> {
        let count = self.columns.len();
        let column = self.columns.get(index).ok_or(GridError::ColumnOutOfRange { index, count })?;
        let right_edge: u32 = self
            .columns
            .iter()
            .take(index + 1)
            .filter(|c| c.visible)
            .map(|c| c.width)
            .sum();
        Ok(self.resize.start(index, pointer_x, column.width, f64::from(right_edge), frame))
    }

    pub fn resize_move(&mut self, pointer_x: f64) -> Option<GuideLine> {
        self.resize.update(pointer_x)
    }

    /// Finish the drag and lock the new width onto the column. Returns the
    /// resized column, if a drag was in flight.
    pub fn end_resize(&mut self) -> Option<usize> {
        let commit = self.resize.finish()?;
        let width = commit.width;
        let index = commit.column;

        let column = self.columns.get_mut(index)?;
        column.width = width;
        column.visible = true;

        if let Some(col) = self.element.col_mut(index) {
            lock_col_width(col, width);
        }
        let max_width = px(width);
        if let Some(th) = self.element.header_cell_mut(index) {
            th.set_style("max-width", max_width.as_str());
        }
        self.element
            .for_each_column_cell(index, &mut |td| td.set_style("max-width", max_width.as_str()));

        self.update_table_width();
        self.persist();
        log::debug!("column {} of {:?} resized to {}px", index, self.id, width);
        Some(index)
    }

    pub fn dropdown(&self) -> &DropdownManager {
        &self.dropdown
    }

    pub fn dropdown_mut(&mut self) -> &mut DropdownManager {
        &mut self.dropdown
    }

    /// Current overlay elements for the column menu
    pub fn render_overlay(&self, column_template: Option<&Element>) -> Vec<Element> {
        self.dropdown.render(&self.id, &self.columns, column_template)
    }

    /// Open the inline form, replacing any form already shown for this table.
    /// `row_id` edits an existing record.
    pub fn create_form(&mut self, form_id: &str, row_id: Option<&str>) -> &FormView {
        let position = row_id.and_then(|id| {
            self.element
                .rows()
                .iter()
                .filter(|r| r.has_class(class::ROW))
                .position(|r| r.record_id().as_deref() == Some(id))
        });
        let element = build_form(form_id, &self.columns, self.config.min_column_width, row_id, position);
        self.form.insert(FormView {
            id: form_id.to_string(),
            element,
            anchor_row: row_id.map(str::to_string),
        })
    }

    pub fn form(&self) -> Option<&FormView> {
        self.form.as_ref()
    }

    /// Detach the open form so a rebuilt instance can keep showing it
    pub(crate) fn take_form(&mut self) -> Option<FormView> {
        self.form.take()
    }

    pub(crate) fn restore_form(&mut self, form: FormView) {
        self.form = Some(form);
    }

    /// Drop the form if `form_id` is the one shown
    pub fn hide_form(&mut self, form_id: &str) -> bool {
        if self.form.as_ref().is_some_and(|f| f.id == form_id) {
            self.form = None;
            true
        } else {
            false
        }
    }

    /// Tear the instance down and hand back its markup. Any drag in flight and
    /// any open menu are dropped.
    pub fn destroy(mut self) -> Element {
        self.resize.cancel();
        self.dropdown.close();
        self.element
    }
}

/// Pad the colgroup so every column has a `<col>`
fn ensure_cols(element: &mut Element, count: usize) {
    let Some(colgroup) = element.colgroup_mut() else { return };
    let existing = colgroup.children().filter(|c| c.tag == "col").count();
    if existing < count {
        log::warn!("colgroup has {} cols for {} columns; padding", existing, count);
        for _ in existing..count {
            colgroup.push(Element::new("col"));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persist::MemoryLayoutStore;
    use crate::sizing::ContainerMetrics;

    fn sample_table(id: &str, kinds: &[&str]) -> Element {
        let mut colgroup = Element::new("colgroup");
        let mut header = Element::new("tr");
        for (i, kind) in kinds.iter().enumerate() {
            colgroup.push(Element::new("col"));
            header.push(
                Element::new("th")
                    .with_class(class::HEADER_CELL)
                    .with_attr("data-name", format!("c{}", i))
                    .with_attr("data-column-type", *kind)
                    .with_text(format!("Col {}", i)),
            );
        }
        let mut tbody = Element::new("tbody").with_class(class::BODY);
        for r in 0..3 {
            let mut row = Element::new("tr").with_class(class::ROW).with_attr("data-id", r.to_string());
            for c in 0..kinds.len() {
                row.push(Element::new("td").with_class(class::CELL).with_text(format!("{}", (3 - r) * 10 + c)));
            }
            tbody.push(row);
        }
        Element::new("table")
            .with_class(class::TABLE)
            .with_attr("id", id)
            .with_child(colgroup)
            .with_child(Element::new("thead").with_child(header))
            .with_child(tbody)
    }

    fn metrics(n: usize) -> TableMetrics {
        TableMetrics {
            container: ContainerMetrics::new(1201, 1201),
            intrinsic_widths: vec![50; n],
        }
    }

    fn build(store: &Rc<MemoryLayoutStore>, kinds: &[&str], carried: &[u32]) -> ResizableTable {
        ResizableTable::new(
            sample_table("orders", kinds),
            carried,
            &metrics(kinds.len()),
            Rc::new(GridConfig::default()),
            store.clone(),
        )
        .unwrap()
    }

    #[test]
    fn test_missing_colgroup_is_rejected() {
        let element = Element::new("table").with_attr("id", "t").with_child(Element::new("thead"));
        let err = ResizableTable::new(
            element,
            &[],
            &TableMetrics::default(),
            Rc::new(GridConfig::default()),
            Rc::new(MemoryLayoutStore::new()),
        )
        .unwrap_err();
        assert!(matches!(err, GridError::InvalidStructure(_)));
    }

    #[test]
    fn test_computed_widths_are_applied_and_saved() {
        let store = Rc::new(MemoryLayoutStore::new());
        let table = build(&store, &["default", "amount", "select"], &[]);
        assert_eq!(table.column_widths(), vec![100, 90, 150]);
        assert_eq!(table.element().style("width"), Some("340px"));
        assert_eq!(table.element().style("visibility"), Some("visible"));
        assert_eq!(store.get("orders").unwrap().widths, vec![100, 90, 150]);

        let headers = table.element().header_cells();
        let th = headers[1];
        assert_eq!(th.style("max-width"), Some("90px"));
        assert!(th.find(&|el| el.has_class(class::COLUMN_TOGGLE)).is_some());
        assert!(table.element().header_cells()[2].has_class(class::CELL_LAST));
    }

    #[test]
    fn test_stored_snapshot_wins_and_restores_hidden() {
        let store = Rc::new(MemoryLayoutStore::new());
        store.insert("orders", LayoutSnapshot::new(vec![120, 0, 150], vec![false, true, false]));
        let table = build(&store, &["default", "amount", "select"], &[77, 77, 77]);

        assert_eq!(table.column_widths(), vec![120, 0, 150]);
        assert!(!table.columns()[1].visible);
        assert!(table.element().header_cells()[1].has_class(class::HIDDEN));
        assert_eq!(table.table_width(), 270);
    }

    #[test]
    fn test_mismatched_snapshot_is_discarded() {
        let store = Rc::new(MemoryLayoutStore::new());
        store.insert("orders", LayoutSnapshot::new(vec![120, 0], vec![false, true]));
        let table = build(&store, &["default", "amount", "select"], &[]);
        assert_eq!(table.column_widths(), vec![100, 90, 150]);
        assert!(table.columns().iter().all(|c| c.visible));
    }

    #[test]
    fn test_resize_round_trip_through_store() {
        let store = Rc::new(MemoryLayoutStore::new());
        let mut table = build(&store, &["default", "default", "default", "default"], &[]);
        let frame = TableFrame { left: 0.0, height: 200.0 };

        let guide = table.begin_resize(2, 300.0, frame).unwrap().unwrap();
        assert_eq!(guide.left, 300.0);
        table.resize_move(320.0);
        assert_eq!(table.end_resize(), Some(2));
        assert_eq!(table.columns()[2].width, 120);
        let col = table.element().colgroup().unwrap().child(2).unwrap().clone();
        assert_eq!(col.style("min-width"), Some("120px"));

        let rebuilt = build(&store, &["default", "default", "default", "default"], &[]);
        assert_eq!(rebuilt.columns()[2].width, 120);
    }

    #[test]
    fn test_toggle_syncs_form_and_persists() {
        let store = Rc::new(MemoryLayoutStore::new());
        let mut table = build(&store, &["default", "amount", "default", "default"], &[]);
        table.create_form("order-form", None);

        assert!(table.toggle_column_visibility(0).unwrap());
        assert_eq!(table.form().unwrap().element.child(0).unwrap().style("display"), Some("none"));
        assert_eq!(store.get("orders").unwrap().hidden, vec![true, false, false, false]);

        assert!(!table.toggle_column_visibility(0).unwrap());
        assert_eq!(table.columns()[0].width, 100);
        assert_eq!(table.form().unwrap().element.child(0).unwrap().style("display"), Some("block"));
    }

    #[test]
    fn test_sort_indicator_is_exclusive() {
        let store = Rc::new(MemoryLayoutStore::new());
        let mut table = build(&store, &["number", "default"], &[]);
        table.sort_column(0, SortDirection::Desc).unwrap();
        table.sort_column(1, SortDirection::Asc).unwrap();

        let headers = table.element().header_cells();
        assert!(!headers[0].has_class(class::SORTED_DESC));
        assert!(headers[1].has_class(class::SORTED_ASC));
        let first = table.element().rows()[0].child(1).unwrap().text_content();
        assert_eq!(first, "11");
        assert!(table.sort_column(9, SortDirection::Asc).is_err());
    }

    #[test]
    fn test_destroy_returns_markup() {
        let store = Rc::new(MemoryLayoutStore::new());
        let mut table = build(&store, &["default", "default"], &[]);
        table.dropdown_mut().toggle(0, Default::default());
        let element = table.destroy();
        assert_eq!(element.id(), Some("orders"));
    }
}
