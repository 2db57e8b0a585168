//! Ledger Grid Engine - resizable, filterable data grids for the ledger UI
//!
//! The headless core keeps a markup model of every registered table and
//! records render patches; the browser bridge mirrors those onto the page and
//! feeds user input back in. [`GridEngine`] is the surface page scripts call.

pub mod browser;
pub mod column;
pub mod config;
pub mod dom;
pub mod dropdown;
pub mod error;
pub mod filter;
pub mod form;
pub mod format;
pub mod logging;
pub mod manager;
pub mod markup;
pub mod net;
pub mod persist;
pub mod remote;
pub mod resize;
pub mod sizing;
pub mod sort;
pub mod summary;
pub mod table;
#[cfg(any(test, feature = "testing"))]
pub mod testing;
pub mod visibility;

use std::future::Future;
use std::rc::Rc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use wasm_bindgen::prelude::*;
use wasm_bindgen_futures::future_to_promise;

pub use column::{Column, ColumnType, SortDirection};
pub use config::GridConfig;
pub use error::GridError;
pub use manager::{Patch, Services, TableManager};
pub use table::ResizableTable;

use browser::Bridge;
use filter::FilterKind;
use form::FilterColumnConfig;
use net::{RowPayload, TableReplace, TransferPayload};
use summary::{SummaryArg, SummaryOptions, SummarySpec};

/// Initialize the WASM module with panic hooks and console logging
#[wasm_bindgen(start)]
pub fn init() {
    #[cfg(feature = "console_error_panic_hook")]
    console_error_panic_hook::set_once();
    logging::init(log::LevelFilter::Info);
}

/// `undefined` and `null` read as the type's default
fn from_js<T: DeserializeOwned + Default>(value: JsValue) -> Result<T, JsValue> {
    if value.is_undefined() || value.is_null() {
        return Ok(T::default());
    }
    Ok(serde_wasm_bindgen::from_value(value)?)
}

/// Plain objects rather than `Map`s, so pages can read keys directly
fn to_js<T: Serialize>(value: &T) -> Result<JsValue, JsValue> {
    Ok(value.serialize(&serde_wasm_bindgen::Serializer::json_compatible())?)
}

fn parse_filter_kind(kind: &str) -> Result<FilterKind, JsValue> {
    match kind {
        "text" => Ok(FilterKind::Text),
        "select" => Ok(FilterKind::Select),
        other => Err(JsValue::from_str(&format!("unknown filter kind {:?}", other))),
    }
}

/// The grid registry exposed to JavaScript
#[wasm_bindgen]
pub struct GridEngine {
    bridge: Rc<Bridge>,
}

impl GridEngine {
    fn run<T>(&self, op: impl FnOnce(&mut TableManager) -> Result<T, GridError>) -> Result<T, JsValue> {
        Ok(self.bridge.run(op)?)
    }

    /// Resolve with `task`'s value once it is done and its patches are drawn
    fn promise<Fut>(&self, task: Fut) -> js_sys::Promise
    where
        Fut: Future<Output = Result<JsValue, GridError>> + 'static,
    {
        let bridge = Rc::clone(&self.bridge);
        future_to_promise(async move {
            let result = task.await;
            bridge.flush();
            result.map_err(|e| {
                log::error!("{}", e);
                JsValue::from(e)
            })
        })
    }
}

#[wasm_bindgen]
impl GridEngine {
    /// Create the engine; `config` may be omitted or partial
    #[wasm_bindgen(constructor)]
    pub fn new(config: JsValue) -> Result<GridEngine, JsValue> {
        let config: GridConfig = from_js(config)?;
        logging::init(config.log_level());
        Ok(Self {
            bridge: Bridge::new(config),
        })
    }

    /// Register every `.table` on the page and attach the document listeners.
    /// Returns the registered ids.
    pub fn init(&self) -> Result<JsValue, JsValue> {
        let tables = browser::import_tables()?;
        let ids = self.run(|grid| Ok(grid.init(tables)))?;
        self.bridge.install_listeners()?;
        to_js(&ids)
    }

    #[wasm_bindgen(js_name = initTable)]
    pub fn init_table(&self, table_id: &str) -> Result<(), JsValue> {
        let element = browser::import_table(table_id)?;
        self.run(|grid| grid.init_table(element))?;
        self.bridge.install_listeners()?;
        Ok(())
    }

    #[wasm_bindgen(js_name = updateTable)]
    pub fn update_table(&self, html: &str, table_id: &str) -> Result<(), JsValue> {
        self.run(|grid| grid.update_table(table_id, html))
    }

    /// Reload a table body from `url`
    pub fn refresh(&self, url: String, table_id: String) -> js_sys::Promise {
        let grid = Rc::clone(self.bridge.grid());
        self.promise(async move {
            remote::refresh(&grid, &url, &table_id).await?;
            Ok::<_, GridError>(JsValue::UNDEFINED)
        })
    }

    /// Load one page of a paginated table; resolves with the page context
    #[wasm_bindgen(js_name = loadPage)]
    pub fn load_page(&self, url: String, table_id: String, summary_columns: JsValue) -> Result<js_sys::Promise, JsValue> {
        let summary_columns: Vec<String> = from_js(summary_columns)?;
        let grid = Rc::clone(self.bridge.grid());
        Ok(self.promise(async move {
            let context = remote::load_page(&grid, &url, &table_id, &summary_columns).await?;
            to_js(&context).map_err(|e| GridError::Serialization(format!("{:?}", e)))
        }))
    }

    /// Swap a whole table, `ids` optionally tagging its rows in order
    #[wasm_bindgen(js_name = replaceEntireTable)]
    pub fn replace_entire_table(&self, html: String, container_id: &str, table_id: &str, ids: JsValue) -> Result<(), JsValue> {
        let reply = TableReplace {
            html,
            ids: from_js(ids)?,
        };
        let ids = reply.row_ids();
        let ids = (!ids.is_empty()).then_some(ids.as_slice());
        self.run(|grid| grid.replace_entire_table(container_id, table_id, &reply.html, ids))
    }

    /// Fetch `{html, ids}` from `url` and swap the whole table
    #[wasm_bindgen(js_name = reloadEntireTable)]
    pub fn reload_entire_table(&self, url: String, container_id: String, table_id: String) -> js_sys::Promise {
        let grid = Rc::clone(self.bridge.grid());
        self.promise(async move {
            remote::reload_entire_table(&grid, &url, &container_id, &table_id).await?;
            Ok::<_, GridError>(JsValue::UNDEFINED)
        })
    }

    /// Insert `{id, html}` before the summary row and select it
    #[wasm_bindgen(js_name = addTableRow)]
    pub fn add_table_row(&self, data: JsValue, table_id: &str) -> Result<String, JsValue> {
        let payload: RowPayload = serde_wasm_bindgen::from_value(data)?;
        self.run(|grid| grid.add_table_row(table_id, &payload))
    }

    #[wasm_bindgen(js_name = updateTableRow)]
    pub fn update_table_row(&self, data: JsValue, table_id: &str) -> Result<(), JsValue> {
        let payload: RowPayload = serde_wasm_bindgen::from_value(data)?;
        self.run(|grid| grid.update_table_row(table_id, &payload))
    }

    #[wasm_bindgen(js_name = upsertTransfer)]
    pub fn upsert_transfer(&self, data: JsValue, table_id: &str) -> Result<(), JsValue> {
        let payload: TransferPayload = serde_wasm_bindgen::from_value(data)?;
        self.run(|grid| grid.upsert_transfer(table_id, &payload))
    }

    #[wasm_bindgen(js_name = removeRow)]
    pub fn remove_row(&self, id: &str, table_id: &str) -> Result<bool, JsValue> {
        self.run(|grid| grid.remove_row(table_id, id))
    }

    /// `DELETE {url}{id}/`; resolves with the server's reply
    #[wasm_bindgen(js_name = sendDeleteRequest)]
    pub fn send_delete_request(&self, id: String, url: String, table_id: String) -> js_sys::Promise {
        let grid = Rc::clone(self.bridge.grid());
        self.promise(async move {
            let reply = remote::send_delete_request(&grid, &url, &id, &table_id).await?;
            to_js(&reply).map_err(|e| GridError::Serialization(format!("{:?}", e)))
        })
    }

    #[wasm_bindgen(js_name = getSelectedRowId)]
    pub fn get_selected_row_id(&self, table_id: &str) -> Option<String> {
        self.bridge.grid().borrow().get_selected_row_id(table_id)
    }

    #[wasm_bindgen(js_name = getRowById)]
    pub fn get_row_by_id(&self, id: &str, table_id: &str) -> Option<web_sys::Element> {
        self.bridge.grid().borrow().get_row_by_id(table_id, id)?;
        browser::live_row(table_id, &format!("[data-id=\"{}\"]", id))
    }

    #[wasm_bindgen(js_name = getSelectedRow)]
    pub fn get_selected_row(&self, table_id: &str) -> Option<web_sys::Element> {
        self.bridge.grid().borrow().get_selected_row(table_id)?;
        browser::live_row(table_id, &format!(".{}", markup::class::ROW_SELECTED))
    }

    /// Add the filter row and remember the summary columns. Resolves with
    /// how many select filters got their options.
    #[wasm_bindgen(js_name = createColumnsForTable)]
    pub fn create_columns_for_table(&self, table_id: String, column_configs: JsValue, summary: JsValue) -> Result<js_sys::Promise, JsValue> {
        let configs: Vec<FilterColumnConfig> = from_js(column_configs)?;
        let summary: Option<SummaryArg> = from_js(summary)?;
        let pending = self.run(|grid| grid.create_columns_for_table(&table_id, &configs, summary.map(SummarySpec::from)))?;
        let grid = Rc::clone(self.bridge.grid());
        Ok(self.promise(async move {
            let filled = remote::load_filter_options(&grid, &table_id, pending).await;
            Ok::<_, GridError>(JsValue::from(filled as u32))
        }))
    }

    #[wasm_bindgen(js_name = createForm)]
    pub fn create_form(&self, form_id: &str, table_id: &str, row_id: Option<String>) -> Result<(), JsValue> {
        self.run(|grid| grid.create_form(form_id, table_id, row_id.as_deref()).map(|_| ()))
    }

    #[wasm_bindgen(js_name = hideForm)]
    pub fn hide_form(&self, form_id: &str, table_id: &str) -> Result<bool, JsValue> {
        self.run(|grid| grid.hide_form(form_id, table_id))
    }

    /// Rebuild summary rows; `columns` is a list of names and `options` an
    /// optional `{grouped, total, className, ids}`
    #[wasm_bindgen(js_name = calculateTableSummary)]
    pub fn calculate_table_summary(&self, table_id: &str, columns: JsValue, options: JsValue) -> Result<usize, JsValue> {
        let columns: Vec<String> = from_js(columns)?;
        let options: SummaryOptions = from_js(options)?;
        self.run(|grid| grid.calculate_table_summary(table_id, &columns, &options))
    }

    #[wasm_bindgen(js_name = formatCurrencyValues)]
    pub fn format_currency_values(&self, table_id: &str) -> Result<(), JsValue> {
        self.run(|grid| grid.format_currency_values(table_id))
    }

    #[wasm_bindgen(js_name = formatCurrencyValuesForRow)]
    pub fn format_currency_values_for_row(&self, table_id: &str, row_id: &str) -> Result<(), JsValue> {
        self.run(|grid| grid.format_currency_values_for_row(table_id, row_id))
    }

    #[wasm_bindgen(js_name = sortTable)]
    pub fn sort_table(&self, table_id: &str, column: usize, direction: &str) -> Result<(), JsValue> {
        let direction = SortDirection::parse(direction);
        self.run(|grid| grid.sort_table(table_id, column, direction))
    }

    #[wasm_bindgen(js_name = toggleColumnVisibility)]
    pub fn toggle_column_visibility(&self, table_id: &str, column: usize) -> Result<bool, JsValue> {
        self.run(|grid| grid.toggle_column_visibility(table_id, column))
    }

    /// Filter one column; `kind` is `"text"` or `"select"`, an empty value
    /// clears it. Returns the visible row count.
    #[wasm_bindgen(js_name = setFilter)]
    pub fn set_filter(&self, table_id: &str, column: usize, kind: &str, value: &str) -> Result<usize, JsValue> {
        let kind = parse_filter_kind(kind)?;
        self.run(|grid| grid.set_filter(table_id, column, kind, value))
    }

    /// Append edit/delete buttons to every data row. The callbacks receive
    /// `(id, row, tableId)`.
    #[wasm_bindgen(js_name = addActionsColumn)]
    pub fn add_actions_column(
        &self,
        table_id: &str,
        ids: JsValue,
        on_edit: js_sys::Function,
        on_delete: js_sys::Function,
    ) -> Result<(), JsValue> {
        let ids = TableReplace {
            html: String::new(),
            ids: from_js(ids)?,
        }
        .row_ids();
        self.bridge.set_row_actions(table_id, on_edit, on_delete);
        self.run(|grid| grid.add_actions_column(table_id, &ids))
    }

    #[wasm_bindgen(js_name = addActionsToRow)]
    pub fn add_actions_to_row(&self, table_id: &str, row_id: &str) -> Result<bool, JsValue> {
        self.run(|grid| grid.add_actions_to_row(table_id, row_id))
    }

    #[wasm_bindgen(js_name = destroyTable)]
    pub fn destroy_table(&self, table_id: &str) -> bool {
        self.run(|grid| Ok(grid.destroy_table(table_id).is_some())).unwrap_or(false)
    }

    /// Tear down every table and detach the listeners
    pub fn dispose(&self) {
        self.bridge.remove_listeners();
        self.bridge.forget_row_actions();
        let _ = self.bridge.run(|grid| {
            grid.dispose_all();
            Ok(())
        });
    }

    /// Forget every table, filter, summary and the cached menu template
    pub fn reset(&self) {
        self.bridge.forget_row_actions();
        let _ = self.bridge.run(|grid| {
            grid.reset();
            Ok(())
        });
    }
}
