//! Registry of live tables and the grid operations pages call
//!
//! The registry owns one [`ResizableTable`] per table id, the per-table filter
//! and summary settings, and the host services. Operations mutate the owned
//! markup and queue [`Patch`] values; the browser bridge drains the queue and
//! projects the changes onto the page.

use crate::column::SortDirection;
use crate::config::GridConfig;
use crate::dom::{Element, FragmentParser};
use crate::dropdown::{ClickZone, MenuAction, Rect, TemplateCache};
use crate::error::GridError;
use crate::filter::{FilterKind, TableFilters};
use crate::form::{build_filter_row, fill_filter_options, ColumnOption, FilterColumnConfig, FormView, PendingOptions};
use crate::format::CellFormatter;
use crate::markup::class;
use crate::net::{Notifier, RowPayload, TransferPayload, Transport};
use crate::persist::LayoutStore;
use crate::resize::{GuideLine, TableFrame};
use crate::sizing::Measure;
use crate::summary::{self, SummaryOptions, SummarySpec};
use crate::table::ResizableTable;
use indexmap::IndexMap;
use std::collections::HashMap;
use std::rc::Rc;

/// Host capabilities the registry calls out to
#[derive(Clone)]
pub struct Services {
    pub store: Rc<dyn LayoutStore>,
    pub measure: Rc<dyn Measure>,
    pub parser: Rc<dyn FragmentParser>,
    pub transport: Rc<dyn Transport>,
    pub notifier: Rc<dyn Notifier>,
}

/// A change the page has to reflect
#[derive(Debug, Clone, PartialEq)]
pub enum Patch {
    /// The table's markup changed throughout
    Table(String),
    /// Only the body rows changed
    Body(String),
    /// `<col>` styles, header classes and the table width changed
    Columns(String),
    /// The inline form of a table was opened, replaced or synced
    Form(String),
    RemoveElement(String),
    /// Raw markup for a container that could not be parsed as a table
    Container { id: String, html: String },
    /// Column menu overlay of a table
    Overlay(String),
    Guide { table_id: String, line: Option<GuideLine> },
    ResizeActive(bool),
    /// Scroll a row into view
    Reveal { table_id: String, row_id: String },
}

/// Arrow keys moving the selected cell
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavKey {
    Left,
    Right,
    Up,
    Down,
}

impl NavKey {
    pub fn parse(key: &str) -> Option<Self> {
        match key {
            "ArrowLeft" => Some(Self::Left),
            "ArrowRight" => Some(Self::Right),
            "ArrowUp" => Some(Self::Up),
            "ArrowDown" => Some(Self::Down),
            _ => None,
        }
    }
}

/// Where the selected cell sits: body row and cell positions within a table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CellPosition {
    pub table_id: String,
    pub row: usize,
    pub cell: usize,
}

/// The last summary request for a table, replayed whenever its rows change
#[derive(Debug, Clone, PartialEq)]
struct RememberedSummary {
    columns: Vec<String>,
    options: SummaryOptions,
}

pub struct TableManager {
    tables: IndexMap<String, ResizableTable>,
    filters: HashMap<String, TableFilters>,
    summaries: HashMap<String, RememberedSummary>,
    templates: TemplateCache,
    services: Services,
    config: Rc<GridConfig>,
    formatter: CellFormatter,
    patches: Vec<Patch>,
}

impl TableManager {
    pub fn new(config: GridConfig, services: Services) -> Self {
        Self {
            tables: IndexMap::new(),
            filters: HashMap::new(),
            summaries: HashMap::new(),
            templates: TemplateCache::new(),
            formatter: CellFormatter::new(&config),
            config: Rc::new(config),
            services,
            patches: Vec::new(),
        }
    }

    pub fn config(&self) -> &GridConfig {
        &self.config
    }

    pub fn services(&self) -> &Services {
        &self.services
    }

    pub fn templates(&self) -> &TemplateCache {
        &self.templates
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    pub fn contains(&self, table_id: &str) -> bool {
        self.tables.contains_key(table_id)
    }

    pub fn table_ids(&self) -> Vec<String> {
        self.tables.keys().cloned().collect()
    }

    pub fn table(&self, table_id: &str) -> Option<&ResizableTable> {
        self.tables.get(table_id)
    }

    fn get(&self, table_id: &str) -> Result<&ResizableTable, GridError> {
        self.tables
            .get(table_id)
            .ok_or_else(|| GridError::TableNotFound(table_id.to_string()))
    }

    fn get_mut(&mut self, table_id: &str) -> Result<&mut ResizableTable, GridError> {
        self.tables
            .get_mut(table_id)
            .ok_or_else(|| GridError::TableNotFound(table_id.to_string()))
    }

    fn patch(&mut self, patch: Patch) {
        if !self.patches.contains(&patch) {
            self.patches.push(patch);
        }
    }

    /// Hand queued patches to the bridge, in the order they were recorded
    pub fn drain_patches(&mut self) -> Vec<Patch> {
        std::mem::take(&mut self.patches)
    }

    // --- lifecycle -------------------------------------------------------

    /// Drop every instance and register `tables` afresh, then seed the
    /// selection. Tables that fail validation are logged and skipped.
    pub fn init(&mut self, tables: Vec<Element>) -> Vec<String> {
        self.dispose_all();
        let mut ids = Vec::with_capacity(tables.len());
        for element in tables {
            match self.install(element, &[], None, None) {
                Ok(id) => ids.push(id),
                Err(e) => log::error!("skipping table: {}", e),
            }
        }
        self.seed_selection();
        log::info!("grid initialized with {} table(s)", ids.len());
        ids
    }

    /// Register one table, replacing any instance with the same id
    pub fn init_table(&mut self, element: Element) -> Result<String, GridError> {
        let id = self.install(element, &[], None, None)?;
        self.seed_selection();
        Ok(id)
    }

    /// Build and store an instance. An instance already registered under the
    /// same id is destroyed first and the new one takes its place in order.
    fn install(
        &mut self,
        element: Element,
        carried_widths: &[u32],
        form: Option<FormView>,
        position: Option<usize>,
    ) -> Result<String, GridError> {
        let id = element
            .id()
            .filter(|id| !id.is_empty())
            .ok_or_else(|| GridError::InvalidStructure("table has no id".into()))?
            .to_string();
        let position = match self.tables.shift_remove_full(&id) {
            Some((index, _, old)) => {
                old.destroy();
                Some(index)
            }
            None => position,
        };

        let metrics = self.services.measure.measure(&id, &element);
        let mut table = ResizableTable::new(
            element,
            carried_widths,
            &metrics,
            Rc::clone(&self.config),
            Rc::clone(&self.services.store),
        )?;
        let columns = table.columns().to_vec();
        self.formatter.format_table(table.element_mut(), &columns);
        table.decorate_body();
        let has_form = form.is_some();
        if let Some(form) = form {
            table.restore_form(form);
        }

        match position {
            Some(index) if index <= self.tables.len() => {
                self.tables.shift_insert(index, id.clone(), table);
            }
            _ => {
                self.tables.insert(id.clone(), table);
            }
        }
        self.refilter(&id);
        self.patch(Patch::Table(id.clone()));
        if has_form {
            self.patch(Patch::Form(id.clone()));
        }
        Ok(id)
    }

    /// Unregister one table and hand back its markup
    pub fn destroy_table(&mut self, table_id: &str) -> Option<Element> {
        let table = self.tables.shift_remove(table_id)?;
        self.filters.remove(table_id);
        self.summaries.remove(table_id);
        Some(table.destroy())
    }

    /// Destroy every instance and forget filters and summary settings
    pub fn dispose_all(&mut self) {
        let had_tables = !self.tables.is_empty();
        for (_, table) in self.tables.drain(..) {
            table.destroy();
        }
        self.filters.clear();
        self.summaries.clear();
        if had_tables {
            self.patch(Patch::ResizeActive(false));
        }
    }

    /// Back to an empty registry with no cached template and no queued patches
    pub fn reset(&mut self) {
        self.dispose_all();
        self.templates.reset();
        self.patches.clear();
    }

    // --- content replacement ---------------------------------------------

    fn parse_rows(&self, html: &str) -> Result<Vec<Element>, GridError> {
        let mut rows = Vec::new();
        for element in self.services.parser.parse_fragment(html)? {
            collect_rows(element, &mut rows);
        }
        Ok(rows)
    }

    fn parse_row(&self, payload: &RowPayload) -> Result<Element, GridError> {
        let mut row = self
            .parse_rows(&payload.html)?
            .into_iter()
            .next()
            .ok_or_else(|| GridError::Fragment(format!("no row in fragment for record {}", payload.id)))?;
        row.set_attr("data-id", payload.id.as_str());
        Ok(row)
    }

    /// Replace the body of `table_id` with the rows in `html` and rebuild the
    /// instance, carrying widths, hidden columns and the open form over.
    pub fn update_table(&mut self, table_id: &str, html: &str) -> Result<(), GridError> {
        let rows = self.parse_rows(html)?;
        self.replace_rows(table_id, rows)
    }

    fn replace_rows(&mut self, table_id: &str, rows: Vec<Element>) -> Result<(), GridError> {
        let (index, _, mut table) = self
            .tables
            .shift_remove_full(table_id)
            .ok_or_else(|| GridError::TableNotFound(table_id.to_string()))?;
        let widths = table.column_widths();
        let form = table.take_form();
        let mut element = table.destroy();
        element.ensure_tbody().set_children(rows);

        self.install(element, &widths, form, Some(index))?;
        self.seed_selection();
        Ok(())
    }

    /// Empty the body, keeping the table registered
    pub fn clear_body(&mut self, table_id: &str) -> Result<(), GridError> {
        self.replace_rows(table_id, Vec::new())
    }

    /// Swap in a whole new table. `html` should hold a `.table-container`
    /// with a `.table` inside; the table is renamed to `table_id`. Without a
    /// container the raw markup is placed into `container_id` unchanged.
    pub fn replace_entire_table(
        &mut self,
        container_id: &str,
        table_id: &str,
        html: &str,
        ids: Option<&[String]>,
    ) -> Result<(), GridError> {
        let nodes = self.services.parser.parse_fragment(html.trim())?;
        let Some(mut wrapper) = take_matching(nodes, &|el| el.has_class(class::TABLE_CONTAINER)) else {
            log::error!("no table container in the markup for {:?}", container_id);
            self.patch(Patch::Container {
                id: container_id.to_string(),
                html: html.to_string(),
            });
            return Ok(());
        };
        let table = wrapper
            .find_mut(&|el| el.tag == "table" && el.has_class(class::TABLE))
            .ok_or_else(|| GridError::InvalidStructure("table container holds no table".into()))?;
        table.set_id(table_id);
        if let Some(ids) = ids {
            tag_rows(table, ids);
        }
        let element = table.clone();

        if let Some(old) = self.destroy_table(table_id) {
            log::debug!("replacing table {:?} ({} rows)", table_id, old.rows().len());
        }
        self.patch(Patch::Container {
            id: container_id.to_string(),
            html: wrapper.to_html(),
        });
        self.install(element, &[], None, None)?;
        self.seed_selection();
        Ok(())
    }

    /// Set `data-id` on each data row from `ids`, in order. Skipped with a
    /// warning when the counts disagree.
    pub fn tag_rows(&mut self, table_id: &str, ids: &[String]) -> Result<bool, GridError> {
        let tagged = tag_rows(self.get_mut(table_id)?.element_mut(), ids);
        if tagged {
            self.patch(Patch::Body(table_id.to_string()));
        }
        Ok(tagged)
    }

    // --- rows ------------------------------------------------------------

    /// Insert a server-rendered row before the summary row (or at the end)
    /// and select it. Returns the record id.
    pub fn add_table_row(&mut self, table_id: &str, payload: &RowPayload) -> Result<String, GridError> {
        let mut row = self.parse_row(payload)?;
        let table = self.get(table_id)?;
        self.formatter.format_row(&mut row, table.columns());
        table.decorate_row(&mut row);
        mark_row_selected(&mut row);

        self.clear_selection();
        let tbody = self.get_mut(table_id)?.element_mut().ensure_tbody();
        let at = tbody
            .children()
            .position(|tr| tr.is_summary_row())
            .unwrap_or_else(|| tbody.child_count());
        tbody.insert_child(at, row);

        self.refilter(table_id);
        self.patch(Patch::Body(table_id.to_string()));
        self.patch(Patch::Reveal {
            table_id: table_id.to_string(),
            row_id: payload.id.clone(),
        });
        log::debug!("row {} added to {:?}", payload.id, table_id);
        Ok(payload.id.clone())
    }

    /// Replace the row carrying `payload.id` in place, reformat and select it
    pub fn update_table_row(&mut self, table_id: &str, payload: &RowPayload) -> Result<(), GridError> {
        let position = self
            .row_position(table_id, &payload.id)
            .ok_or_else(|| GridError::RowNotFound(payload.id.clone()))?;
        let mut row = self.parse_row(payload)?;
        let table = self.get(table_id)?;
        self.formatter.format_row(&mut row, table.columns());
        table.decorate_row(&mut row);
        mark_row_selected(&mut row);

        self.clear_selection();
        let id = table_id.to_string();
        self.get_mut(table_id)?
            .element_mut()
            .tbody_mut()
            .ok_or(GridError::MissingBody(id))?
            .replace_child(position, row);

        self.refilter(table_id);
        self.patch(Patch::Body(table_id.to_string()));
        Ok(())
    }

    /// Update the row when its id is present, add it otherwise
    pub fn upsert_row(&mut self, table_id: &str, payload: &RowPayload) -> Result<(), GridError> {
        if self.row_position(table_id, &payload.id).is_some() {
            self.update_table_row(table_id, payload)
        } else {
            self.add_table_row(table_id, payload).map(|_| ())
        }
    }

    /// Both rows of a transfer, outgoing first
    pub fn upsert_transfer(&mut self, table_id: &str, payload: &TransferPayload) -> Result<(), GridError> {
        self.upsert_row(table_id, &payload.outgoing_transaction)?;
        self.upsert_row(table_id, &payload.incoming_transaction)
    }

    /// Remove the row carrying `row_id` and select the first remaining row
    pub fn remove_row(&mut self, table_id: &str, row_id: &str) -> Result<bool, GridError> {
        let Some(position) = self.row_position(table_id, row_id) else {
            return Ok(false);
        };
        let id = table_id.to_string();
        self.get_mut(table_id)?
            .element_mut()
            .tbody_mut()
            .ok_or(GridError::MissingBody(id))?
            .remove_child(position);
        self.select_first_row(table_id);
        self.refilter(table_id);
        self.patch(Patch::Body(table_id.to_string()));
        Ok(true)
    }

    /// Position of a record within the body: the `data-id` match first, then
    /// a `.table__row` whose first cell holds the id.
    fn row_position(&self, table_id: &str, row_id: &str) -> Option<usize> {
        let tbody = self.tables.get(table_id)?.element().tbody()?;
        tbody
            .children()
            .position(|tr| tr.attr("data-id") == Some(row_id))
            .or_else(|| {
                tbody
                    .children()
                    .position(|tr| tr.has_class(class::ROW) && first_cell_text(tr).as_deref() == Some(row_id))
            })
    }

    pub fn get_row_by_id(&self, table_id: &str, row_id: &str) -> Option<&Element> {
        let position = self.row_position(table_id, row_id)?;
        self.tables.get(table_id)?.element().tbody()?.child(position)
    }

    pub fn get_selected_row(&self, table_id: &str) -> Option<&Element> {
        self.tables
            .get(table_id)?
            .element()
            .rows()
            .into_iter()
            .find(|tr| tr.has_class(class::ROW_SELECTED))
    }

    pub fn get_selected_row_id(&self, table_id: &str) -> Option<String> {
        self.get_selected_row(table_id)?.record_id()
    }

    // --- selection -------------------------------------------------------

    fn clear_selection(&mut self) {
        let mut touched = Vec::new();
        for (id, table) in self.tables.iter_mut() {
            let Some(tbody) = table.element_mut().tbody_mut() else { continue };
            let mut changed = false;
            for row in tbody.children_mut() {
                changed |= row.remove_class(class::ROW_SELECTED);
                row.visit_mut(&mut |el| changed |= el.remove_class(class::CELL_SELECTED));
            }
            if changed {
                touched.push(id.clone());
            }
        }
        for id in touched {
            self.patch(Patch::Body(id));
        }
    }

    fn mark_selected(&mut self, table_id: &str, row: usize, cell: usize) -> Option<String> {
        let tr = self.tables.get_mut(table_id)?.element_mut().tbody_mut()?.child_mut(row)?;
        tr.add_class(class::ROW_SELECTED);
        if let Some(td) = tr.child_mut(cell) {
            td.add_class(class::CELL_SELECTED);
        }
        let row_id = tr.record_id();
        self.patch(Patch::Body(table_id.to_string()));
        row_id
    }

    /// Select one cell, clearing every other selection on the page. Summary
    /// and group rows are not selectable, and neither is a cell position the
    /// row does not have.
    pub fn select_cell(&mut self, table_id: &str, row: usize, cell: usize) -> Result<bool, GridError> {
        let selectable = self
            .get(table_id)?
            .element()
            .tbody()
            .and_then(|tbody| tbody.child(row))
            .is_some_and(|tr| tr.is_data_row() && tr.child(cell).is_some());
        if !selectable {
            return Ok(false);
        }
        self.clear_selection();
        self.mark_selected(table_id, row, cell);
        Ok(true)
    }

    /// The first `.table__row` of a table and its first cell become the selection
    pub fn select_first_row(&mut self, table_id: &str) -> bool {
        let first = self
            .tables
            .get(table_id)
            .and_then(|t| t.element().tbody())
            .and_then(|tbody| tbody.children().position(|tr| tr.has_class(class::ROW) && tr.is_data_row()));
        self.clear_selection();
        match first {
            Some(row) => {
                self.mark_selected(table_id, row, 0);
                true
            }
            None => false,
        }
    }

    /// Select the first row of the first table unless a cell is selected already
    pub fn seed_selection(&mut self) {
        if self.selected_cell().is_some() {
            return;
        }
        let first = self
            .tables
            .iter()
            .find(|(_, table)| {
                table
                    .element()
                    .rows()
                    .iter()
                    .any(|tr| tr.has_class(class::ROW) && tr.is_data_row())
            })
            .map(|(id, _)| id.clone());
        if let Some(id) = first {
            self.select_first_row(&id);
        }
    }

    pub fn selected_cell(&self) -> Option<CellPosition> {
        self.tables.iter().find_map(|(id, table)| {
            let tbody = table.element().tbody()?;
            tbody.children().enumerate().find_map(|(row, tr)| {
                tr.children()
                    .position(|td| td.has_class(class::CELL_SELECTED))
                    .map(|cell| CellPosition {
                        table_id: id.clone(),
                        row,
                        cell,
                    })
            })
        })
    }

    /// Trimmed text of the selected cell, for copying
    pub fn selected_cell_text(&self) -> Option<String> {
        let pos = self.selected_cell()?;
        let tbody = self.tables.get(&pos.table_id)?.element().tbody()?;
        let text = tbody.child(pos.row)?.child(pos.cell)?.text_content();
        Some(text.trim().to_string())
    }

    /// Move the selected cell with an arrow key. Up and down skip hidden,
    /// summary and group rows and clamp to the last cell of shorter rows.
    pub fn navigate(&mut self, key: NavKey) -> bool {
        let Some(pos) = self.selected_cell() else { return false };
        let Some(tbody) = self.tables.get(&pos.table_id).and_then(|t| t.element().tbody()) else {
            return false;
        };
        let rows: Vec<(usize, &Element)> = tbody
            .children()
            .enumerate()
            .filter(|(_, tr)| tr.is_data_row() && tr.is_displayed())
            .collect();
        let Some(current) = rows.iter().position(|(row, _)| *row == pos.row) else {
            return false;
        };
        let width = |tr: &Element| tr.children().filter(|td| td.tag == "td").count();

        let (target, cell) = match key {
            NavKey::Left if pos.cell > 0 => (current, pos.cell - 1),
            NavKey::Right if pos.cell + 1 < width(rows[current].1) => (current, pos.cell + 1),
            NavKey::Up if current > 0 => (current - 1, pos.cell),
            NavKey::Down if current + 1 < rows.len() => (current + 1, pos.cell),
            _ => return false,
        };
        let (row, tr) = rows[target];
        let cell = cell.min(width(tr).saturating_sub(1));

        self.clear_selection();
        if let Some(row_id) = self.mark_selected(&pos.table_id, row, cell) {
            self.patch(Patch::Reveal {
                table_id: pos.table_id.clone(),
                row_id,
            });
        }
        true
    }

    // --- columns, filters, summaries -------------------------------------

    /// Append the filter row under the header and remember which columns the
    /// summary sums. Returns the select filters still waiting for options.
    pub fn create_columns_for_table(
        &mut self,
        table_id: &str,
        configs: &[FilterColumnConfig],
        summary: Option<SummarySpec>,
    ) -> Result<Vec<PendingOptions>, GridError> {
        let min_width = self.config.min_column_width;
        let table = self.get_mut(table_id)?;
        let (row, pending) = build_filter_row(table.columns(), configs, min_width);
        let names: Vec<String> = table.columns().iter().map(|c| c.name.clone()).collect();
        let thead = table
            .element_mut()
            .thead_mut()
            .ok_or_else(|| GridError::InvalidStructure(format!("table {:?} has no thead", table_id)))?;
        thead.retain_children(|tr| !tr.has_class(class::FILTER_ROW));
        thead.push(row);

        if let Some(mut spec) = summary {
            spec.columns.retain(|name| names.contains(name));
            let options = spec.options();
            self.remember_summary(table_id, spec.columns, options);
        }
        self.filters.entry(table_id.to_string()).or_default();
        self.patch(Patch::Table(table_id.to_string()));
        Ok(pending)
    }

    /// Fill a select filter with the options fetched for it
    pub fn fill_filter_options(
        &mut self,
        table_id: &str,
        column: usize,
        options: &[ColumnOption],
    ) -> Result<bool, GridError> {
        let filled = self
            .get_mut(table_id)?
            .element_mut()
            .thead_mut()
            .and_then(|thead| thead.children_mut().find(|tr| tr.has_class(class::FILTER_ROW)))
            .is_some_and(|row| fill_filter_options(row, column, options));
        if filled {
            self.patch(Patch::Table(table_id.to_string()));
        }
        Ok(filled)
    }

    /// Set or clear (empty value) the filter on one column, re-filter the
    /// body and recompute the summary. Returns the visible data row count.
    pub fn set_filter(&mut self, table_id: &str, column: usize, kind: FilterKind, value: &str) -> Result<usize, GridError> {
        let count = self.get(table_id)?.columns().len();
        if column >= count {
            return Err(GridError::ColumnOutOfRange { index: column, count });
        }
        self.filters.entry(table_id.to_string()).or_default().set(column, kind, value);
        let visible = self.refilter(table_id);
        self.patch(Patch::Body(table_id.to_string()));
        Ok(visible)
    }

    pub fn clear_filter(&mut self, table_id: &str, column: usize) -> Result<usize, GridError> {
        self.set_filter(table_id, column, FilterKind::Text, "")
    }

    pub fn filters(&self, table_id: &str) -> Option<&TableFilters> {
        self.filters.get(table_id)
    }

    /// Apply the table's filters, then rebuild its remembered summary.
    /// Returns the visible data row count.
    fn refilter(&mut self, table_id: &str) -> usize {
        let Some(table) = self.tables.get_mut(table_id) else { return 0 };
        let visible = match (self.filters.get(table_id), table.element_mut().tbody_mut()) {
            (Some(filters), Some(tbody)) => filters.apply(tbody),
            (None, Some(tbody)) => tbody.children().filter(|tr| tr.is_data_row() && tr.is_displayed()).count(),
            (_, None) => 0,
        };
        if let Some(remembered) = self.summaries.get(table_id) {
            let columns = table.columns().to_vec();
            summary::calculate(
                table.element_mut(),
                &columns,
                &remembered.columns,
                &remembered.options,
                &self.formatter,
            );
        }
        visible
    }

    fn remember_summary(&mut self, table_id: &str, columns: Vec<String>, options: SummaryOptions) {
        if columns.is_empty() {
            self.summaries.remove(table_id);
        } else {
            self.summaries
                .insert(table_id.to_string(), RememberedSummary { columns, options });
        }
    }

    /// Rebuild the summary rows for `columns`. The request is remembered and
    /// replayed after every filter change and row edit. Returns how many
    /// summary rows were inserted.
    pub fn calculate_table_summary(
        &mut self,
        table_id: &str,
        columns: &[String],
        options: &SummaryOptions,
    ) -> Result<usize, GridError> {
        let table = self
            .tables
            .get_mut(table_id)
            .ok_or_else(|| GridError::TableNotFound(table_id.to_string()))?;
        let model = table.columns().to_vec();
        let inserted = summary::calculate(table.element_mut(), &model, columns, options, &self.formatter);
        self.remember_summary(table_id, columns.to_vec(), options.clone());
        self.patch(Patch::Body(table_id.to_string()));
        Ok(inserted)
    }

    /// Re-run amount and percent formatting over the whole body
    pub fn format_currency_values(&mut self, table_id: &str) -> Result<(), GridError> {
        let table = self
            .tables
            .get_mut(table_id)
            .ok_or_else(|| GridError::TableNotFound(table_id.to_string()))?;
        let columns = table.columns().to_vec();
        self.formatter.format_table(table.element_mut(), &columns);
        self.patch(Patch::Body(table_id.to_string()));
        Ok(())
    }

    pub fn format_currency_values_for_row(&mut self, table_id: &str, row_id: &str) -> Result<(), GridError> {
        let position = self
            .row_position(table_id, row_id)
            .ok_or_else(|| GridError::RowNotFound(row_id.to_string()))?;
        let table = self
            .tables
            .get_mut(table_id)
            .ok_or_else(|| GridError::TableNotFound(table_id.to_string()))?;
        let columns = table.columns().to_vec();
        if let Some(row) = table.element_mut().tbody_mut().and_then(|tbody| tbody.child_mut(position)) {
            self.formatter.format_row(row, &columns);
        }
        self.patch(Patch::Body(table_id.to_string()));
        Ok(())
    }

    pub fn sort_table(&mut self, table_id: &str, column: usize, direction: SortDirection) -> Result<(), GridError> {
        self.get_mut(table_id)?.sort_column(column, direction)?;
        self.patch(Patch::Columns(table_id.to_string()));
        self.patch(Patch::Body(table_id.to_string()));
        Ok(())
    }

    pub fn toggle_column_visibility(&mut self, table_id: &str, column: usize) -> Result<bool, GridError> {
        let table = self.get_mut(table_id)?;
        let hidden = table.toggle_column_visibility(column)?;
        let has_form = table.form().is_some();
        let menu_open = table.dropdown().is_open();

        self.patch(Patch::Table(table_id.to_string()));
        if has_form {
            self.patch(Patch::Form(table_id.to_string()));
        }
        if menu_open {
            self.patch(Patch::Overlay(table_id.to_string()));
        }
        Ok(hidden)
    }

    // --- actions column --------------------------------------------------

    /// Add the edit/delete column: one header cell and, per data row in
    /// order, `data-id` from `ids` plus an actions cell.
    pub fn add_actions_column(&mut self, table_id: &str, ids: &[String]) -> Result<(), GridError> {
        let element = self.get_mut(table_id)?.element_mut();
        let has_header = element
            .thead()
            .and_then(|thead| thead.find(&|el| el.has_class(class::HEADER_ACTIONS)))
            .is_some();
        if !has_header {
            let th = Element::new("th")
                .with_class(class::HEADER_CELL)
                .with_class(class::HEADER_ACTIONS);
            if !element.push_header_cell(th) {
                return Err(GridError::InvalidStructure(format!("table {:?} has no header row", table_id)));
            }
        }

        let tbody = element
            .tbody_mut()
            .ok_or_else(|| GridError::MissingBody(table_id.to_string()))?;
        let rows: Vec<&mut Element> = tbody.children_mut().filter(|tr| tr.is_data_row()).collect();
        if rows.len() != ids.len() {
            log::warn!(
                "table {:?}: {} ids for {} rows in the actions column",
                table_id,
                ids.len(),
                rows.len()
            );
        }
        for (row, id) in rows.into_iter().zip(ids) {
            row.set_attr("data-id", id.as_str());
            push_actions_cell(row);
        }
        self.patch(Patch::Table(table_id.to_string()));
        Ok(())
    }

    pub fn add_actions_to_row(&mut self, table_id: &str, row_id: &str) -> Result<bool, GridError> {
        let position = self
            .row_position(table_id, row_id)
            .ok_or_else(|| GridError::RowNotFound(row_id.to_string()))?;
        let added = self
            .get_mut(table_id)?
            .element_mut()
            .tbody_mut()
            .and_then(|tbody| tbody.child_mut(position))
            .is_some_and(push_actions_cell);
        if added {
            self.patch(Patch::Body(table_id.to_string()));
        }
        Ok(added)
    }

    // --- forms -----------------------------------------------------------

    pub fn create_form(&mut self, form_id: &str, table_id: &str, row_id: Option<&str>) -> Result<&FormView, GridError> {
        let previous = self.get(table_id)?.form().map(|f| f.id.clone());
        if let Some(previous) = previous.filter(|id| id != form_id) {
            self.patch(Patch::RemoveElement(previous));
        }
        self.patch(Patch::Form(table_id.to_string()));
        Ok(self.get_mut(table_id)?.create_form(form_id, row_id))
    }

    pub fn hide_form(&mut self, form_id: &str, table_id: &str) -> Result<bool, GridError> {
        let removed = self.get_mut(table_id)?.hide_form(form_id);
        if removed {
            self.patch(Patch::RemoveElement(form_id.to_string()));
        }
        Ok(removed)
    }

    // --- resize ----------------------------------------------------------

    pub fn begin_resize(&mut self, table_id: &str, column: usize, pointer_x: f64, frame: TableFrame) -> Result<bool, GridError> {
        let Some(line) = self.get_mut(table_id)?.begin_resize(column, pointer_x, frame)? else {
            return Ok(false);
        };
        self.patch(Patch::ResizeActive(true));
        self.patch(Patch::Guide {
            table_id: table_id.to_string(),
            line: Some(line),
        });
        Ok(true)
    }

    pub fn resize_move(&mut self, table_id: &str, pointer_x: f64) -> Result<(), GridError> {
        if let Some(line) = self.get_mut(table_id)?.resize_move(pointer_x) {
            self.patches.retain(|p| !matches!(p, Patch::Guide { table_id: id, .. } if id == table_id));
            self.patch(Patch::Guide {
                table_id: table_id.to_string(),
                line: Some(line),
            });
        }
        Ok(())
    }

    /// Commit the drag in flight. Returns the resized column.
    pub fn end_resize(&mut self, table_id: &str) -> Result<Option<usize>, GridError> {
        let resized = self.get_mut(table_id)?.end_resize();
        self.patches.retain(|p| !matches!(p, Patch::Guide { table_id: id, .. } if id == table_id));
        self.patch(Patch::Guide {
            table_id: table_id.to_string(),
            line: None,
        });
        self.patch(Patch::ResizeActive(false));
        if resized.is_some() {
            self.patch(Patch::Columns(table_id.to_string()));
            self.patch(Patch::Body(table_id.to_string()));
        }
        Ok(resized)
    }

    /// Table with a drag in flight, if any
    pub fn active_resize(&self) -> Option<&str> {
        self.tables
            .iter()
            .find(|(_, t)| t.resize().is_resizing())
            .map(|(id, _)| id.as_str())
    }

    // --- column menu -----------------------------------------------------

    /// Trigger click on a column's menu button. Menus of other tables close.
    pub fn toggle_dropdown(&mut self, table_id: &str, column: usize, anchor: Rect) -> Result<bool, GridError> {
        self.get(table_id)?;
        self.close_menus(Some(table_id));
        let open = self.get_mut(table_id)?.dropdown_mut().toggle(column, anchor);
        self.patch(Patch::Overlay(table_id.to_string()));
        Ok(open)
    }

    fn close_menus(&mut self, except: Option<&str>) {
        let mut closed = Vec::new();
        for (id, table) in self.tables.iter_mut() {
            if Some(id.as_str()) != except && table.dropdown().is_open() {
                table.dropdown_mut().close();
                closed.push(id.clone());
            }
        }
        for id in closed {
            self.patch(Patch::Overlay(id));
        }
    }

    pub fn show_submenu(&mut self, table_id: &str, action: MenuAction, item: Rect) -> Result<bool, GridError> {
        let shown = self.get_mut(table_id)?.dropdown_mut().show_submenu(action, item);
        if shown {
            self.patch(Patch::Overlay(table_id.to_string()));
        }
        Ok(shown)
    }

    pub fn hide_submenu(&mut self, table_id: &str) -> Result<(), GridError> {
        self.get_mut(table_id)?.dropdown_mut().hide_submenu();
        self.patch(Patch::Overlay(table_id.to_string()));
        Ok(())
    }

    /// A click anywhere on the page. Returns true when a menu closed.
    pub fn handle_document_click(&mut self, zone: ClickZone) -> bool {
        let mut closed = Vec::new();
        for (id, table) in self.tables.iter_mut() {
            if table.dropdown_mut().handle_document_click(zone) {
                closed.push(id.clone());
            }
        }
        let any = !closed.is_empty();
        for id in closed {
            self.patch(Patch::Overlay(id));
        }
        any
    }

    /// Sort entry in the open menu: sort by the menu's column, then close
    pub fn choose_sort(&mut self, table_id: &str, direction: SortDirection) -> Result<(), GridError> {
        let column = self
            .get(table_id)?
            .dropdown()
            .open_column()
            .ok_or_else(|| GridError::InvalidStructure(format!("no column menu open on {:?}", table_id)))?;
        self.sort_table(table_id, column, direction)?;
        self.get_mut(table_id)?.dropdown_mut().close();
        self.patch(Patch::Overlay(table_id.to_string()));
        Ok(())
    }

    /// Overlay elements for a table's menu, empty when closed
    pub fn render_overlay(&self, table_id: &str) -> Vec<Element> {
        let Some(table) = self.tables.get(table_id) else { return Vec::new() };
        let template = self.templates.get().and_then(|html| {
            match self.services.parser.parse_fragment(&html) {
                Ok(nodes) => nodes.into_iter().next(),
                Err(e) => {
                    log::warn!("column menu template unusable: {}", e);
                    None
                }
            }
        });
        table.render_overlay(template.as_ref())
    }
}

fn collect_rows(mut element: Element, out: &mut Vec<Element>) {
    if element.tag == "tr" {
        out.push(element);
        return;
    }
    for child in element.take_children() {
        collect_rows(child, out);
    }
}

/// First node matching `pred`, searching each root and then its descendants
fn take_matching(nodes: Vec<Element>, pred: &dyn Fn(&Element) -> bool) -> Option<Element> {
    for node in nodes {
        if pred(&node) {
            return Some(node);
        }
        if let Some(found) = node.find(pred) {
            return Some(found.clone());
        }
    }
    None
}

fn first_cell_text(row: &Element) -> Option<String> {
    row.children()
        .find(|td| td.tag == "td")
        .map(|td| td.text_content().trim().to_string())
}

/// Rows that take a record id: no summary rows, no empty-state rows
fn taggable(row: &Element) -> bool {
    row.is_data_row() && !row.has_class(class::ROW_EMPTY)
}

fn tag_rows(table: &mut Element, ids: &[String]) -> bool {
    let Some(tbody) = table.tbody_mut() else { return false };
    let rows: Vec<&mut Element> = tbody.children_mut().filter(|tr| taggable(tr)).collect();
    if rows.len() != ids.len() {
        log::warn!("{} record ids for {} rows; rows left untagged", ids.len(), rows.len());
        return false;
    }
    for (row, id) in rows.into_iter().zip(ids) {
        row.set_attr("data-id", id.as_str());
    }
    true
}

fn mark_row_selected(row: &mut Element) {
    row.add_class(class::ROW_SELECTED);
    let first = row.children().position(|td| td.has_class(class::CELL)).unwrap_or(0);
    if let Some(td) = row.child_mut(first) {
        td.add_class(class::CELL_SELECTED);
    }
}

fn action_button(class_name: &str, icon: &str) -> Element {
    Element::new("button")
        .with_attr("type", "button")
        .with_class(class_name)
        .with_child(Element::new("i").with_class(icon))
}

/// Edit and delete buttons at the end of a data row, added once
fn push_actions_cell(row: &mut Element) -> bool {
    if !row.is_data_row() || row.children().any(|td| td.has_class(class::CELL_ACTIONS)) {
        return false;
    }
    row.push(
        Element::new("td")
            .with_class(class::CELL)
            .with_class(class::CELL_ACTIONS)
            .with_child(action_button("table__header--action-edit", "fas fa-edit"))
            .with_child(action_button("table__header--action-delete", "fas fa-times")),
    );
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{sample_table, TestHost};

    fn manager_with(ids: &[&str]) -> (TestHost, TableManager) {
        let host = TestHost::new();
        let mut grid = host.manager();
        grid.init(ids.iter().map(|id| sample_table(id, 3)).collect());
        (host, grid)
    }

    #[test]
    fn test_init_registers_and_seeds_selection() {
        let (_host, mut grid) = manager_with(&["a", "b"]);
        assert_eq!(grid.table_ids(), vec!["a".to_string(), "b".to_string()]);
        let pos = grid.selected_cell().unwrap();
        assert_eq!((pos.table_id.as_str(), pos.row, pos.cell), ("a", 0, 0));
        assert!(grid.drain_patches().contains(&Patch::Table("a".into())));
    }

    #[test]
    fn test_selection_is_unique_across_tables() {
        let (_host, mut grid) = manager_with(&["a", "b"]);
        assert!(grid.select_cell("b", 2, 1).unwrap());

        let selected_rows: usize = ["a", "b"]
            .iter()
            .map(|id| {
                grid.table(id)
                    .unwrap()
                    .element()
                    .rows()
                    .iter()
                    .filter(|tr| tr.has_class(class::ROW_SELECTED))
                    .count()
            })
            .sum();
        assert_eq!(selected_rows, 1);
        assert_eq!(grid.get_selected_row_id("b").as_deref(), Some("3"));
        assert_eq!(grid.get_selected_row_id("a"), None);
    }

    #[test]
    fn test_missing_cell_leaves_selection_alone() {
        let (_host, mut grid) = manager_with(&["a"]);
        assert!(!grid.select_cell("a", 1, 99).unwrap());

        let pos = grid.selected_cell().unwrap();
        assert_eq!((pos.table_id.as_str(), pos.row, pos.cell), ("a", 0, 0));
        assert_eq!(grid.get_selected_row_id("a").as_deref(), Some("1"));
        let selected_rows = grid
            .table("a")
            .unwrap()
            .element()
            .rows()
            .iter()
            .filter(|tr| tr.has_class(class::ROW_SELECTED))
            .count();
        assert_eq!(selected_rows, 1);
    }

    #[test]
    fn test_navigation_clamps_and_stops_at_edges() {
        let (_host, mut grid) = manager_with(&["a"]);
        assert!(!grid.navigate(NavKey::Up));
        assert!(!grid.navigate(NavKey::Left));
        assert!(grid.navigate(NavKey::Right));
        assert!(grid.navigate(NavKey::Down));
        let pos = grid.selected_cell().unwrap();
        assert_eq!((pos.row, pos.cell), (1, 1));
        assert_eq!(grid.selected_cell_text().as_deref(), Some("2-1"));
    }

    #[test]
    fn test_row_position_prefers_data_id() {
        let (_host, grid) = manager_with(&["a"]);
        assert_eq!(grid.get_row_by_id("a", "2").unwrap().attr("data-id"), Some("2"));
        assert!(grid.get_row_by_id("a", "99").is_none());
    }

    #[test]
    fn test_actions_column_is_added_once() {
        let (_host, mut grid) = manager_with(&["a"]);
        let ids: Vec<String> = vec!["10".into(), "11".into(), "12".into()];
        grid.add_actions_column("a", &ids).unwrap();
        grid.add_actions_column("a", &ids).unwrap();

        let table = grid.table("a").unwrap();
        assert_eq!(table.columns().len(), 3);
        let row = table.element().rows()[0];
        assert_eq!(row.attr("data-id"), Some("10"));
        assert_eq!(row.children().filter(|td| td.has_class(class::CELL_ACTIONS)).count(), 1);
        assert!(!grid.add_actions_to_row("a", "11").unwrap());
    }

    #[test]
    fn test_menus_are_single_flight() {
        let (_host, mut grid) = manager_with(&["a", "b"]);
        assert!(grid.toggle_dropdown("a", 0, Rect::default()).unwrap());
        assert!(grid.toggle_dropdown("b", 1, Rect::default()).unwrap());
        assert!(!grid.table("a").unwrap().dropdown().is_open());

        assert!(!grid.handle_document_click(ClickZone::Dropdown));
        assert!(grid.handle_document_click(ClickZone::Outside));
        assert!(grid.render_overlay("b").is_empty());
    }

    #[test]
    fn test_choose_sort_uses_menu_column_and_closes() {
        let (_host, mut grid) = manager_with(&["a"]);
        grid.toggle_dropdown("a", 0, Rect::default()).unwrap();
        grid.choose_sort("a", SortDirection::Desc).unwrap();
        let table = grid.table("a").unwrap();
        assert!(!table.dropdown().is_open());
        assert_eq!(table.element().rows()[0].attr("data-id"), Some("3"));
        assert!(grid.choose_sort("a", SortDirection::Asc).is_err());
    }

    #[test]
    fn test_resize_patches_guide_then_columns() {
        let (_host, mut grid) = manager_with(&["a"]);
        grid.drain_patches();
        assert!(grid.begin_resize("a", 0, 100.0, TableFrame::default()).unwrap());
        assert_eq!(grid.active_resize(), Some("a"));
        grid.resize_move("a", 130.0).unwrap();
        grid.resize_move("a", 140.0).unwrap();
        let guides = grid
            .drain_patches()
            .into_iter()
            .filter(|p| matches!(p, Patch::Guide { .. }))
            .count();
        assert_eq!(guides, 1);

        assert_eq!(grid.end_resize("a").unwrap(), Some(0));
        let patches = grid.drain_patches();
        assert!(patches.contains(&Patch::ResizeActive(false)));
        assert!(patches.contains(&Patch::Columns("a".into())));
        assert_eq!(grid.active_resize(), None);
    }

    #[test]
    fn test_unknown_table_is_reported() {
        let (_host, mut grid) = manager_with(&[]);
        assert_eq!(
            grid.sort_table("nope", 0, SortDirection::Asc),
            Err(GridError::TableNotFound("nope".into()))
        );
    }
}
