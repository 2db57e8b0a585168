//! Column show/hide across `<col>`, header and cells

use crate::column::Column;
use crate::dom::Element;
use crate::error::GridError;
use crate::markup::class;

/// Toggles one column's visibility and keeps the per-column width
/// bookkeeping consistent. Table width, form sync and persistence are the
/// owning table's follow-up.
pub struct ColumnVisibilityController<'a> {
    table: &'a mut Element,
    columns: &'a mut [Column],
    min_width: u32,
}

impl<'a> ColumnVisibilityController<'a> {
    pub fn new(table: &'a mut Element, columns: &'a mut [Column], min_width: u32) -> Self {
        Self {
            table,
            columns,
            min_width,
        }
    }

    /// Flip column `index`. Returns true when the column is now hidden.
    pub fn toggle(&mut self, index: usize) -> Result<bool, GridError> {
        let count = self.columns.len();
        let column = self
            .columns
            .get_mut(index)
            .ok_or(GridError::ColumnOutOfRange { index, count })?;

        let hide = column.visible;
        if hide {
            column.hide();
        } else {
            column.show(self.min_width);
        }
        let (width, saved) = (column.width, column.saved_width);

        set_column_hidden(self.table, index, hide);
        if let Some(col) = self.table.col_mut(index) {
            match saved {
                Some(w) => col.set_attr("data-saved-width", w.to_string()),
                None => {
                    col.remove_attr("data-saved-width");
                }
            }
            if !hide {
                lock_col_width(col, width);
            }
        }
        if !hide {
            self.table.for_each_column_cell(index, &mut |td| td.set_style("max-width", px(width)));
        }

        self.update_last_column_highlight();
        log::debug!("column {} {}", index, if hide { "hidden" } else { "shown" });
        Ok(hide)
    }

    /// Overlay a stored hidden-state vector, hiding every flagged column
    pub fn apply_hidden_state(&mut self, hidden: &[bool]) {
        if hidden.len() != self.columns.len() {
            return;
        }
        for (index, &is_hidden) in hidden.iter().enumerate() {
            if !is_hidden {
                continue;
            }
            self.columns[index].hide();
            set_column_hidden(self.table, index, true);
        }
        self.update_last_column_highlight();
    }

    pub fn update_last_column_highlight(&mut self) {
        update_last_column_highlight(self.table, self.columns);
    }
}

pub(crate) fn px(width: u32) -> String {
    format!("{}px", width)
}

/// Width, min-width and max-width on a `<col>` so the column stays rigid
pub(crate) fn lock_col_width(col: &mut Element, width: u32) {
    col.set_style("width", px(width));
    col.set_style("min-width", px(width));
    col.set_style("max-width", px(width));
}

/// Set the `hidden` class on the column's `<col>`, header and every cell in
/// one pass so the three never disagree.
pub fn set_column_hidden(table: &mut Element, index: usize, hidden: bool) {
    if let Some(col) = table.col_mut(index) {
        col.toggle_class(class::HIDDEN, hidden);
    }
    if let Some(th) = table.header_cell_mut(index) {
        th.toggle_class(class::HIDDEN, hidden);
    }
    table.for_each_column_cell(index, &mut |td| td.toggle_class(class::HIDDEN, hidden));
}

pub fn last_visible_column(columns: &[Column]) -> Option<usize> {
    columns.iter().rev().find(|c| c.visible).map(|c| c.index)
}

/// Mark exactly one column, the rightmost visible one, with the last-cell class
pub fn update_last_column_highlight(table: &mut Element, columns: &[Column]) {
    let last = last_visible_column(columns);
    for th in table.header_cells_mut() {
        th.remove_class(class::CELL_LAST);
    }
    table.for_each_cell(&mut |td| {
        td.remove_class(class::CELL_LAST);
    });
    if let Some(index) = last {
        if let Some(th) = table.header_cell_mut(index) {
            th.add_class(class::CELL_LAST);
        }
        table.for_each_column_cell(index, &mut |td| td.add_class(class::CELL_LAST));
    }
}

/// Project column state onto a single row built outside the table: hidden
/// class, max-width and the last-column marker.
pub fn project_columns(row: &mut Element, columns: &[Column]) {
    let last = last_visible_column(columns);
    for column in columns {
        let Some(td) = row.child_mut(column.index) else { continue };
        if td.tag != "td" {
            continue;
        }
        td.toggle_class(class::HIDDEN, !column.visible);
        td.toggle_class(class::CELL_LAST, Some(column.index) == last);
        if column.width > 0 {
            td.set_style("max-width", px(column.width));
        }
    }
}

/// Show or hide the matching field of an inline form. The form holds one
/// `create-form__column` per table column.
pub fn sync_form_column(form: &mut Element, index: usize, visible: bool) {
    if let Some(field) = form.child_mut(index) {
        field.set_style("display", if visible { "block" } else { "none" });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::column::{ColumnType, SortDirection};

    fn fixture(n: usize) -> (Element, Vec<Column>) {
        let mut colgroup = Element::new("colgroup");
        let mut header = Element::new("tr");
        let mut row = Element::new("tr");
        for i in 0..n {
            colgroup.push(Element::new("col"));
            header.push(Element::new("th").with_attr("data-name", format!("c{}", i)));
            row.push(Element::new("td").with_text(i.to_string()));
        }
        let table = Element::new("table")
            .with_child(colgroup)
            .with_child(Element::new("thead").with_child(header))
            .with_child(Element::new("tbody").with_child(row));
        let columns = (0..n)
            .map(|index| Column {
                index,
                name: format!("c{}", index),
                label: String::new(),
                kind: ColumnType::Default,
                visible: true,
                width: 100 + index as u32,
                saved_width: None,
                sort: SortDirection::None,
            })
            .collect();
        (table, columns)
    }

    #[test]
    fn test_toggle_round_trip_restores_width() {
        let (mut table, mut columns) = fixture(4);
        let mut controller = ColumnVisibilityController::new(&mut table, &mut columns, 50);

        assert!(controller.toggle(0).unwrap());
        assert!(!controller.toggle(0).unwrap());
        drop(controller);

        assert_eq!(columns[0].width, 100);
        assert!(columns[0].visible);
        assert!(!table.colgroup().unwrap().child(0).unwrap().has_class(class::HIDDEN));
        assert_eq!(table.colgroup().unwrap().child(0).unwrap().style("width"), Some("100px"));
    }

    #[test]
    fn test_hide_marks_col_header_and_cells() {
        let (mut table, mut columns) = fixture(3);
        ColumnVisibilityController::new(&mut table, &mut columns, 50).toggle(1).unwrap();

        assert_eq!(columns[1].width, 0);
        assert_eq!(columns[1].saved_width, Some(101));
        let col = table.colgroup().unwrap().child(1).unwrap();
        assert!(col.has_class(class::HIDDEN));
        assert_eq!(col.attr("data-saved-width"), Some("101"));
        assert!(table.header_cells()[1].has_class(class::HIDDEN));
        assert!(table.rows()[0].child(1).unwrap().has_class(class::HIDDEN));
    }

    #[test]
    fn test_last_column_marker_moves() {
        let (mut table, mut columns) = fixture(3);
        let mut controller = ColumnVisibilityController::new(&mut table, &mut columns, 50);
        controller.update_last_column_highlight();
        controller.toggle(2).unwrap();
        drop(controller);

        let headers = table.header_cells();
        assert!(headers[1].has_class(class::CELL_LAST));
        assert!(!headers[2].has_class(class::CELL_LAST));
        let row = table.rows()[0];
        assert!(row.child(1).unwrap().has_class(class::CELL_LAST));
        assert_eq!(row.children().filter(|td| td.has_class(class::CELL_LAST)).count(), 1);
    }

    #[test]
    fn test_out_of_range_toggle() {
        let (mut table, mut columns) = fixture(2);
        let err = ColumnVisibilityController::new(&mut table, &mut columns, 50).toggle(5).unwrap_err();
        assert_eq!(err, GridError::ColumnOutOfRange { index: 5, count: 2 });
    }

    #[test]
    fn test_hidden_state_overlay_requires_matching_length() {
        let (mut table, mut columns) = fixture(3);
        let mut controller = ColumnVisibilityController::new(&mut table, &mut columns, 50);
        controller.apply_hidden_state(&[true, false]);
        controller.apply_hidden_state(&[false, true, false]);
        drop(controller);
        assert!(columns[0].visible);
        assert!(!columns[1].visible);
    }

    #[test]
    fn test_form_field_sync() {
        let mut form = Element::new("form")
            .with_child(Element::new("div").with_class("create-form__column"))
            .with_child(Element::new("div").with_class("create-form__column"));
        sync_form_column(&mut form, 1, false);
        assert_eq!(form.child(1).unwrap().style("display"), Some("none"));
        sync_form_column(&mut form, 1, true);
        assert_eq!(form.child(1).unwrap().style("display"), Some("block"));
    }
}
