//! Bridge between the headless registry and the live page
//!
//! Host services read the DOM, cookies and `fetch`; [`Bridge`] owns the
//! registry, renders its queued [`Patch`]es and routes delegated document
//! events back into it.

use crate::column::SortDirection;
use crate::config::GridConfig;
use crate::dom::{Element, FragmentParser, Node};
use crate::dropdown::{ClickZone, MenuAction, Rect, COLUMN_ITEM_CLASS, DROPDOWN_CLASS, SUBMENU_CLASS};
use crate::error::GridError;
use crate::filter::FilterKind;
use crate::form::{FILTER_INPUT_CLASS, FILTER_SELECT_CLASS};
use crate::manager::{NavKey, Patch, Services, TableManager};
use crate::markup::class;
use crate::net::{HttpResponse, Notice, NoticeKind, Notifier, Transport};
use crate::persist::{LayoutSnapshot, LayoutStore};
use crate::remote;
use crate::resize::{GuideLine, TableFrame};
use crate::sizing::{ContainerMetrics, Measure, TableMetrics};
use futures::future::LocalBoxFuture;
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::future::Future;
use std::rc::{Rc, Weak};
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use wasm_bindgen_futures::{spawn_local, JsFuture};
use web_sys::{
    Document, Event, EventTarget, Headers, HtmlDocument, HtmlElement, HtmlInputElement, HtmlSelectElement,
    HtmlTemplateElement, KeyboardEvent, MouseEvent, Request, RequestInit, Response, ScrollBehavior,
    ScrollIntoViewOptions, ScrollLogicalPosition, Window,
};

const NOTICE_TIMEOUT_MS: i32 = 3000;

fn window() -> Result<Window, GridError> {
    web_sys::window().ok_or_else(|| GridError::InvalidStructure("no window".into()))
}

fn document() -> Result<Document, GridError> {
    window()?
        .document()
        .ok_or_else(|| GridError::InvalidStructure("no document".into()))
}

fn describe(e: &JsValue) -> String {
    e.as_string().unwrap_or_else(|| format!("{:?}", e))
}

fn dom_error(e: JsValue) -> GridError {
    GridError::Fragment(describe(&e))
}

fn network_error(e: JsValue) -> GridError {
    GridError::Network(describe(&e))
}

// --- import ------------------------------------------------------------------

/// Copy a live element and its subtree into the headless tree. Comments and
/// other node kinds are dropped.
pub fn import_element(live: &web_sys::Element) -> Element {
    let mut element = Element::new(live.tag_name());
    let attrs = live.attributes();
    for i in 0..attrs.length() {
        if let Some(attr) = attrs.item(i) {
            element.set_attr(&attr.name(), attr.value());
        }
    }

    let children = live.child_nodes();
    for i in 0..children.length() {
        let Some(node) = children.item(i) else { continue };
        match node.node_type() {
            web_sys::Node::ELEMENT_NODE => {
                if let Ok(child) = node.dyn_into::<web_sys::Element>() {
                    element.push(import_element(&child));
                }
            }
            web_sys::Node::TEXT_NODE => {
                if let Some(text) = node.text_content() {
                    element.nodes_mut().push(Node::Text(text));
                }
            }
            _ => {}
        }
    }
    element
}

/// Every `.table` on the page
pub fn import_tables() -> Result<Vec<Element>, GridError> {
    let list = document()?
        .query_selector_all(&format!("table.{}", class::TABLE))
        .map_err(dom_error)?;
    Ok((0..list.length())
        .filter_map(|i| list.item(i))
        .filter_map(|node| node.dyn_into::<web_sys::Element>().ok())
        .map(|live| import_element(&live))
        .collect())
}

pub fn import_table(table_id: &str) -> Result<Element, GridError> {
    document()?
        .get_element_by_id(table_id)
        .map(|live| import_element(&live))
        .ok_or_else(|| GridError::TableNotFound(table_id.to_string()))
}

/// Body row of a table on the page matching `filter`, e.g. `[data-id="7"]`
pub fn live_row(table_id: &str, filter: &str) -> Option<web_sys::Element> {
    let table = document().ok()?.get_element_by_id(table_id)?;
    table.query_selector(&format!("tbody tr{}", filter)).ok().flatten()
}

// --- host services -----------------------------------------------------------

/// Parses markup through a detached `<template>`, so table parts such as a
/// bare `<tr>` keep their structure
#[derive(Debug, Default)]
pub struct TemplateParser;

impl FragmentParser for TemplateParser {
    fn parse_fragment(&self, html: &str) -> Result<Vec<Element>, GridError> {
        let template = document()?
            .create_element("template")
            .map_err(dom_error)?
            .dyn_into::<HtmlTemplateElement>()
            .map_err(|_| GridError::Fragment("template element unavailable".into()))?;
        template.set_inner_html(html);

        let nodes = template.content().child_nodes();
        Ok((0..nodes.length())
            .filter_map(|i| nodes.item(i))
            .filter_map(|node| node.dyn_into::<web_sys::Element>().ok())
            .map(|live| import_element(&live))
            .collect())
    }
}

/// Reads the rendered table: its parent is the container, `<col>` offset
/// widths are the intrinsic widths
#[derive(Debug, Default)]
pub struct DomMeasure;

fn offset_width(element: &web_sys::Element) -> u32 {
    element
        .dyn_ref::<HtmlElement>()
        .map(|el| el.offset_width())
        .unwrap_or_else(|| element.get_bounding_client_rect().width() as i32)
        .max(0) as u32
}

impl Measure for DomMeasure {
    fn measure(&self, table_id: &str, _table: &Element) -> TableMetrics {
        let Some(live) = document().ok().and_then(|doc| doc.get_element_by_id(table_id)) else {
            log::debug!("table {:?} is not on the page yet", table_id);
            return TableMetrics::default();
        };
        let container = live
            .parent_element()
            .map(|parent| ContainerMetrics::new(parent.client_width().max(0) as u32, offset_width(&parent)))
            .unwrap_or_default();
        let intrinsic_widths = match live.query_selector_all("colgroup > col") {
            Ok(cols) => (0..cols.length())
                .filter_map(|i| cols.item(i))
                .filter_map(|node| node.dyn_into::<web_sys::Element>().ok())
                .map(|col| offset_width(&col))
                .collect(),
            Err(_) => Vec::new(),
        };
        TableMetrics {
            container,
            intrinsic_widths,
        }
    }
}

fn html_document() -> Option<HtmlDocument> {
    document().ok()?.dyn_into::<HtmlDocument>().ok()
}

fn read_cookie(name: &str) -> Option<String> {
    let cookies = html_document()?.cookie().ok()?;
    cookies
        .split(';')
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value.to_string())
}

/// Layout snapshots kept in one cookie per table
#[derive(Debug, Clone)]
pub struct CookieLayoutStore {
    prefix: String,
    expiry_days: u32,
}

impl CookieLayoutStore {
    pub fn new(config: &GridConfig) -> Self {
        Self {
            prefix: config.layout_cookie_prefix.clone(),
            expiry_days: config.layout_expiry_days,
        }
    }

    fn cookie_name(&self, table_id: &str) -> String {
        format!("{}{}", self.prefix, table_id)
    }
}

impl LayoutStore for CookieLayoutStore {
    fn load(&self, table_id: &str) -> Option<LayoutSnapshot> {
        let raw = read_cookie(&self.cookie_name(table_id))?;
        let json = String::from(js_sys::decode_uri_component(&raw).ok()?);
        match LayoutSnapshot::from_json(&json) {
            Ok(snapshot) => snapshot,
            Err(e) => {
                log::warn!("ignoring saved layout of {:?}: {}", table_id, e);
                None
            }
        }
    }

    fn save(&self, table_id: &str, snapshot: &LayoutSnapshot) {
        let json = match snapshot.to_json() {
            Ok(json) => json,
            Err(e) => {
                log::error!("cannot serialize layout of {:?}: {}", table_id, e);
                return;
            }
        };
        let expires = js_sys::Date::new_0();
        expires.set_time(expires.get_time() + f64::from(self.expiry_days) * 86_400_000.0);
        let cookie = format!(
            "{}={}; expires={}; path=/",
            self.cookie_name(table_id),
            String::from(js_sys::encode_uri_component(&json)),
            String::from(expires.to_utc_string()),
        );
        if let Some(doc) = html_document() {
            if let Err(e) = doc.set_cookie(&cookie) {
                log::warn!("cannot save layout of {:?}: {}", table_id, describe(&e));
            }
        }
    }
}

/// `fetch` with the headers the backend expects from page scripts. Deletes
/// carry the CSRF token from the `csrftoken` cookie.
#[derive(Debug, Default)]
pub struct FetchTransport;

async fn fetch_text(method: &'static str, url: String) -> Result<HttpResponse, GridError> {
    let headers = Headers::new().map_err(network_error)?;
    headers.set("X-Requested-With", "XMLHttpRequest").map_err(network_error)?;
    if method != "GET" {
        headers.set("Content-Type", "application/json").map_err(network_error)?;
        match read_cookie("csrftoken") {
            Some(token) => headers.set("X-CSRFToken", &token).map_err(network_error)?,
            None => log::warn!("no csrftoken cookie for {} {}", method, url),
        }
    }

    let init = RequestInit::new();
    init.set_method(method);
    init.set_headers(&headers);
    let request = Request::new_with_str_and_init(&url, &init).map_err(network_error)?;

    let reply = JsFuture::from(window()?.fetch_with_request(&request))
        .await
        .map_err(network_error)?;
    let response: Response = reply.dyn_into().map_err(network_error)?;
    let body = JsFuture::from(response.text().map_err(network_error)?)
        .await
        .map_err(network_error)?;
    Ok(HttpResponse::new(response.status(), body.as_string().unwrap_or_default()))
}

impl Transport for FetchTransport {
    fn get(&self, url: &str) -> LocalBoxFuture<'static, Result<HttpResponse, GridError>> {
        Box::pin(fetch_text("GET", url.to_string()))
    }

    fn delete(&self, url: &str) -> LocalBoxFuture<'static, Result<HttpResponse, GridError>> {
        Box::pin(fetch_text("DELETE", url.to_string()))
    }
}

/// Short-lived message box appended to `<body>`
#[derive(Debug, Default)]
pub struct ToastNotifier;

impl Notifier for ToastNotifier {
    fn notify(&self, notice: Notice) {
        if let Err(e) = show_notice(&notice) {
            log::warn!("cannot show notice {:?}: {}", notice, describe(&e));
        }
    }
}

fn show_notice(notice: &Notice) -> Result<(), JsValue> {
    let (modifier, icon, fallback) = match notice.kind {
        NoticeKind::Success => ("success", "fa-check-circle", "Успешно"),
        NoticeKind::Error => ("error", "fa-exclamation-circle", "Ошибка"),
    };
    let message = Element::new("div")
        .with_class("modal__message")
        .with_class(&format!("modal__message--{}", modifier))
        .with_child(Element::new("i").with_class("fas").with_class(icon))
        .with_child(Element::new("p").with_text(notice.message.as_deref().unwrap_or(fallback)));

    let document = document()?;
    let body = document.body().ok_or_else(|| JsValue::from_str("no body"))?;
    body.insert_adjacent_html("beforeend", &message.to_html())?;
    if let Some(live) = body.last_element_child() {
        let remove = Closure::once_into_js(move || live.remove());
        window()?.set_timeout_with_callback_and_timeout_and_arguments_0(remove.unchecked_ref(), NOTICE_TIMEOUT_MS)?;
    }
    Ok(())
}

fn page_services(config: &GridConfig) -> Services {
    Services {
        store: Rc::new(CookieLayoutStore::new(config)),
        measure: Rc::new(DomMeasure),
        parser: Rc::new(TemplateParser),
        transport: Rc::new(FetchTransport),
        notifier: Rc::new(ToastNotifier),
    }
}

// --- patch rendering ---------------------------------------------------------

fn query_all(root: &web_sys::Element, selector: &str) -> Vec<web_sys::Element> {
    match root.query_selector_all(selector) {
        Ok(list) => (0..list.length())
            .filter_map(|i| list.item(i))
            .filter_map(|node| node.dyn_into::<web_sys::Element>().ok())
            .collect(),
        Err(_) => Vec::new(),
    }
}

fn sync_attrs(live: &web_sys::Element, model: &Element) -> Result<(), JsValue> {
    let classes = model.class_attr();
    if classes.is_empty() {
        live.remove_attribute("class")?;
    } else {
        live.set_attribute("class", &classes)?;
    }
    let style = model.style_attr();
    if style.is_empty() {
        live.remove_attribute("style")?;
    } else {
        live.set_attribute("style", &style)?;
    }
    for (name, value) in model.attrs() {
        live.set_attribute(name, value)?;
    }
    Ok(())
}

fn header_row(table: &Element) -> Option<&Element> {
    table.thead()?.children().find(|row| !row.has_class(class::FILTER_ROW))
}

fn filter_row(table: &Element) -> Option<&Element> {
    table.thead()?.children().find(|row| row.has_class(class::FILTER_ROW))
}

fn sync_columns(live: &web_sys::Element, model: &Element) -> Result<(), JsValue> {
    sync_attrs(live, model)?;
    if let (Some(live_colgroup), Some(colgroup)) = (live.query_selector("colgroup")?, model.colgroup()) {
        live_colgroup.set_outer_html(&colgroup.to_html());
    }

    if let Some(header) = header_row(model) {
        let cells: Vec<&Element> = header.children().collect();
        let live_cells = query_all(live, &format!("thead > tr:not(.{}) > th", class::FILTER_ROW));
        if live_cells.len() == cells.len() {
            for (live_cell, cell) in live_cells.iter().zip(&cells) {
                sync_attrs(live_cell, cell)?;
                if live_cell.query_selector(&format!(".{}", class::RESIZE_HANDLE))?.is_none() {
                    live_cell.set_inner_html(&cell.inner_html());
                }
            }
        } else if let Some(live_row) = live.query_selector(&format!("thead > tr:not(.{})", class::FILTER_ROW))? {
            live_row.set_outer_html(&header.to_html());
        }
    }

    if let Some(filters) = filter_row(model) {
        let cells: Vec<&Element> = filters.children().collect();
        let live_cells = query_all(live, &format!("thead > tr.{} > td", class::FILTER_ROW));
        for (live_cell, cell) in live_cells.iter().zip(&cells) {
            sync_attrs(live_cell, cell)?;
        }
    }
    Ok(())
}

fn sync_body(live: &web_sys::Element, model: &Element) -> Result<(), JsValue> {
    let Some(tbody) = model.tbody() else { return Ok(()) };
    let live_body = match live.query_selector(&format!("tbody.{}", class::BODY))? {
        Some(body) => Some(body),
        None => live.query_selector("tbody")?,
    };
    match live_body {
        Some(body) => body.set_inner_html(&tbody.inner_html()),
        None => live.insert_adjacent_html("beforeend", &tbody.to_html())?,
    }
    Ok(())
}

/// Selects get their options once loaded; typed filter text is kept
fn sync_filter_row(live: &web_sys::Element, model: &Element) -> Result<(), JsValue> {
    let Some(filters) = filter_row(model) else { return Ok(()) };
    let Some(live_row) = live.query_selector(&format!("thead > tr.{}", class::FILTER_ROW))? else {
        if let Some(thead) = live.query_selector("thead")? {
            thead.insert_adjacent_html("beforeend", &filters.to_html())?;
        }
        return Ok(());
    };
    for select in filters.find_all(&|el| el.tag == "select") {
        let Some(column) = select.attr("data-column") else { continue };
        let selector = format!("select[data-column=\"{}\"]", column);
        if let Some(live_select) = live_row.query_selector(&selector)? {
            if live_select.child_element_count() as usize != select.child_count() {
                live_select.set_inner_html(&select.inner_html());
            }
        }
    }
    Ok(())
}

fn render_form(document: &Document, grid: &TableManager, table_id: &str) -> Result<(), JsValue> {
    let Some(form) = grid.table(table_id).and_then(|table| table.form()) else {
        return Ok(());
    };
    let html = form.element.to_html();
    match document.get_element_by_id(&form.id) {
        Some(existing) => existing.set_outer_html(&html),
        None => match document.get_element_by_id(table_id) {
            Some(live) => live.insert_adjacent_html("afterend", &html)?,
            None => log::warn!("no table {:?} to attach form {:?} to", table_id, form.id),
        },
    }
    if let Some(live_form) = document.get_element_by_id(&form.id) {
        reveal(&live_form);
    }
    Ok(())
}

fn render_overlay(document: &Document, grid: &TableManager, table_id: &str) -> Result<(), JsValue> {
    let stale = document.query_selector_all(&format!(
        ".{}[data-table=\"{}\"], .{}[data-table=\"{}\"]",
        DROPDOWN_CLASS, table_id, SUBMENU_CLASS, table_id
    ))?;
    for node in (0..stale.length()).filter_map(|i| stale.item(i)) {
        if let Ok(element) = node.dyn_into::<web_sys::Element>() {
            element.remove();
        }
    }
    let body = document.body().ok_or_else(|| JsValue::from_str("no body"))?;
    for element in grid.render_overlay(table_id) {
        body.insert_adjacent_html("beforeend", &element.to_html())?;
    }
    Ok(())
}

fn render_guide(document: &Document, table_id: &str, line: Option<GuideLine>) -> Result<(), JsValue> {
    let existing = document.query_selector(&format!(".{}[data-table=\"{}\"]", class::RESIZE_LINE, table_id))?;
    let Some(line) = line else {
        if let Some(guide) = existing {
            guide.remove();
        }
        return Ok(());
    };
    let Some(table) = document.get_element_by_id(table_id) else { return Ok(()) };
    let guide = match existing {
        Some(guide) => guide,
        None => {
            let guide = document.create_element("div")?;
            guide.set_class_name(class::RESIZE_LINE);
            guide.set_attribute("data-table", table_id)?;
            match table.parent_element() {
                Some(parent) => parent.append_child(&guide)?,
                None => table.append_child(&guide)?,
            };
            guide
        }
    };
    guide.set_attribute("style", &guide_style(line))
}

/// The guide's `left` is already relative to the table, so it is used as is
fn guide_style(line: GuideLine) -> String {
    format!("left: {}px; height: {}px;", line.left, line.height)
}

fn reveal(element: &web_sys::Element) {
    let options = ScrollIntoViewOptions::new();
    options.set_behavior(ScrollBehavior::Smooth);
    options.set_block(ScrollLogicalPosition::Nearest);
    element.scroll_into_view_with_scroll_into_view_options(&options);
}

fn render_patch(document: &Document, grid: &TableManager, patch: &Patch) -> Result<(), JsValue> {
    let live_and_model = |id: &str| match (document.get_element_by_id(id), grid.table(id)) {
        (Some(live), Some(table)) => Some((live, table.element())),
        _ => {
            log::warn!("table {:?} missing on the page or in the registry", id);
            None
        }
    };

    match patch {
        Patch::Table(id) => {
            if let Some((live, model)) = live_and_model(id) {
                sync_columns(&live, model)?;
                sync_filter_row(&live, model)?;
                sync_body(&live, model)?;
            }
        }
        Patch::Body(id) => {
            if let Some((live, model)) = live_and_model(id) {
                sync_body(&live, model)?;
            }
        }
        Patch::Columns(id) => {
            if let Some((live, model)) = live_and_model(id) {
                sync_columns(&live, model)?;
            }
        }
        Patch::Form(table_id) => render_form(document, grid, table_id)?,
        Patch::RemoveElement(id) => {
            if let Some(element) = document.get_element_by_id(id) {
                element.remove();
            }
        }
        Patch::Container { id, html } => match document.get_element_by_id(id) {
            Some(container) => container.set_inner_html(html),
            None => log::error!("{}", GridError::ContainerNotFound(id.clone())),
        },
        Patch::Overlay(table_id) => render_overlay(document, grid, table_id)?,
        Patch::Guide { table_id, line } => render_guide(document, table_id, *line)?,
        Patch::ResizeActive(active) => {
            if let Some(body) = document.body() {
                body.class_list().toggle_with_force(class::RESIZE_ACTIVE, *active)?;
            }
        }
        Patch::Reveal { table_id, row_id } => {
            let selector = format!("#{} tr[data-id=\"{}\"]", table_id, row_id);
            if let Some(row) = document.query_selector(&selector)? {
                reveal(&row);
            }
        }
    }
    Ok(())
}

// --- events ------------------------------------------------------------------

fn event_element(event: &Event) -> Option<web_sys::Element> {
    event.target()?.dyn_into::<web_sys::Element>().ok()
}

fn closest(element: &web_sys::Element, selector: &str) -> Option<web_sys::Element> {
    element.closest(selector).ok().flatten()
}

fn element_index(element: &web_sys::Element) -> usize {
    let mut index = 0;
    let mut current = element.previous_element_sibling();
    while let Some(sibling) = current {
        index += 1;
        current = sibling.previous_element_sibling();
    }
    index
}

/// Bounding box in page coordinates, for overlays appended to `<body>`
fn page_rect(element: &web_sys::Element) -> Rect {
    let rect = element.get_bounding_client_rect();
    let (dx, dy) = window()
        .map(|w| (w.scroll_x().unwrap_or(0.0), w.scroll_y().unwrap_or(0.0)))
        .unwrap_or((0.0, 0.0));
    Rect {
        left: rect.left() + dx,
        top: rect.top() + dy,
        right: rect.right() + dx,
        bottom: rect.bottom() + dy,
    }
}

/// Table id and column index of the header cell holding `element`
fn header_position(element: &web_sys::Element) -> Option<(String, usize)> {
    let th = closest(element, "th")?;
    let table = closest(&th, &format!("table.{}", class::TABLE))?;
    Some((table.id(), element_index(&th)))
}

/// Table id, row and cell index of a body cell
fn cell_position(td: &web_sys::Element) -> Option<(String, usize, usize)> {
    let tr = td.parent_element()?;
    let tbody = tr.parent_element()?;
    if !tbody.tag_name().eq_ignore_ascii_case("tbody") {
        return None;
    }
    let table = tbody.parent_element()?;
    if !table.class_list().contains(class::TABLE) {
        return None;
    }
    Some((table.id(), element_index(&tr), element_index(td)))
}

fn is_editable(element: &web_sys::Element) -> bool {
    matches!(element.tag_name().to_ascii_lowercase().as_str(), "input" | "select" | "textarea")
}

fn copy_to_clipboard(text: &str) -> Result<(), JsValue> {
    let navigator = window()?.navigator();
    let clipboard = js_sys::Reflect::get(&navigator, &JsValue::from_str("clipboard"))?;
    let write = js_sys::Reflect::get(&clipboard, &JsValue::from_str("writeText"))?.dyn_into::<js_sys::Function>()?;
    write.call1(&clipboard, &JsValue::from_str(text))?;
    Ok(())
}

struct RowActions {
    on_edit: js_sys::Function,
    on_delete: js_sys::Function,
}

struct Listener {
    target: EventTarget,
    kind: &'static str,
    callback: Closure<dyn FnMut(Event)>,
}

/// Owns the registry on the page and keeps the DOM in step with it
pub struct Bridge {
    grid: Rc<RefCell<TableManager>>,
    actions: RefCell<HashMap<String, RowActions>>,
    listeners: RefCell<Vec<Listener>>,
    pending_move: Cell<Option<f64>>,
}

impl Bridge {
    pub fn new(config: GridConfig) -> Rc<Self> {
        let services = page_services(&config);
        Rc::new(Self {
            grid: Rc::new(RefCell::new(TableManager::new(config, services))),
            actions: RefCell::new(HashMap::new()),
            listeners: RefCell::new(Vec::new()),
            pending_move: Cell::new(None),
        })
    }

    pub fn grid(&self) -> &Rc<RefCell<TableManager>> {
        &self.grid
    }

    /// Render every queued patch
    pub fn flush(&self) {
        let patches = self.grid.borrow_mut().drain_patches();
        if patches.is_empty() {
            return;
        }
        let document = match document() {
            Ok(document) => document,
            Err(e) => {
                log::error!("{}", e);
                return;
            }
        };
        let grid = self.grid.borrow();
        for patch in &patches {
            if let Err(e) = render_patch(&document, &grid, patch) {
                log::error!("cannot render {:?}: {}", patch, describe(&e));
            }
        }
    }

    /// Run `op` against the registry, log its error and render the result
    pub fn run<T>(&self, op: impl FnOnce(&mut TableManager) -> Result<T, GridError>) -> Result<T, GridError> {
        let result = op(&mut self.grid.borrow_mut());
        if let Err(e) = &result {
            log::error!("{}", e);
        }
        self.flush();
        result
    }

    /// Drive an async flow to completion in the background, then render
    pub fn spawn<F, Fut>(self: &Rc<Self>, op: F)
    where
        F: FnOnce(Rc<RefCell<TableManager>>) -> Fut,
        Fut: Future<Output = Result<(), GridError>> + 'static,
    {
        let bridge = Rc::clone(self);
        let task = op(Rc::clone(&self.grid));
        spawn_local(async move {
            if let Err(e) = task.await {
                log::error!("{}", e);
            }
            bridge.flush();
        });
    }

    pub fn set_row_actions(&self, table_id: &str, on_edit: js_sys::Function, on_delete: js_sys::Function) {
        self.actions
            .borrow_mut()
            .insert(table_id.to_string(), RowActions { on_edit, on_delete });
    }

    pub fn forget_row_actions(&self) {
        self.actions.borrow_mut().clear();
    }

    /// Attach the delegated document listeners once
    pub fn install_listeners(self: &Rc<Self>) -> Result<(), GridError> {
        if !self.listeners.borrow().is_empty() {
            return Ok(());
        }
        let document = document()?;
        self.listen(&document, "click", on_click)?;
        self.listen(&document, "mouseover", on_mouseover)?;
        self.listen(&document, "input", on_input)?;
        self.listen(&document, "change", on_change)?;
        self.listen(&document, "pointerdown", on_pointerdown)?;
        self.listen(&document, "pointermove", on_pointermove)?;
        self.listen(&document, "pointerup", on_pointerup)?;
        self.listen(&document, "pointercancel", on_pointerup)?;
        self.listen(&document, "keydown", on_keydown)?;
        log::debug!("{} document listeners installed", self.listeners.borrow().len());
        Ok(())
    }

    pub fn remove_listeners(&self) {
        for listener in self.listeners.borrow_mut().drain(..) {
            if let Err(e) = listener
                .target
                .remove_event_listener_with_callback(listener.kind, listener.callback.as_ref().unchecked_ref())
            {
                log::warn!("cannot detach {} listener: {}", listener.kind, describe(&e));
            }
        }
    }

    fn listen(self: &Rc<Self>, target: &EventTarget, kind: &'static str, handler: fn(&Rc<Bridge>, Event)) -> Result<(), GridError> {
        let weak: Weak<Bridge> = Rc::downgrade(self);
        let callback = Closure::wrap(Box::new(move |event: Event| {
            if let Some(bridge) = weak.upgrade() {
                handler(&bridge, event);
            }
        }) as Box<dyn FnMut(Event)>);
        target
            .add_event_listener_with_callback(kind, callback.as_ref().unchecked_ref())
            .map_err(dom_error)?;
        self.listeners.borrow_mut().push(Listener { target: target.clone(), kind, callback });
        Ok(())
    }

    fn show_item_submenu(self: &Rc<Self>, dropdown: &web_sys::Element, item: &web_sys::Element) {
        let Some(table_id) = dropdown.get_attribute("data-table") else { return };
        let Some(action) = item.get_attribute("data-action").as_deref().and_then(MenuAction::parse) else {
            return;
        };
        let current = self
            .grid
            .borrow()
            .table(&table_id)
            .and_then(|table| table.dropdown().submenu())
            .map(|submenu| submenu.action);
        if current == Some(action) {
            return;
        }
        let rect = page_rect(item);
        match action {
            MenuAction::Hide => self.spawn(move |grid| async move {
                remote::show_hide_submenu(&grid, &table_id, rect).await.map(|_| ())
            }),
            MenuAction::Sort => {
                let _ = self.run(|grid| grid.show_submenu(&table_id, MenuAction::Sort, rect));
            }
        }
    }

    fn invoke_row_action(&self, button: &web_sys::Element) {
        let Some(row) = closest(button, "tr") else { return };
        let Some(table) = closest(&row, "table") else { return };
        let table_id = table.id();
        let row_id = row.get_attribute("data-id").unwrap_or_default();
        let callback = {
            let actions = self.actions.borrow();
            let Some(actions) = actions.get(&table_id) else {
                log::warn!("no row actions registered for {:?}", table_id);
                return;
            };
            if button.class_list().contains("table__header--action-edit") {
                actions.on_edit.clone()
            } else {
                actions.on_delete.clone()
            }
        };
        if let Err(e) = callback.call3(
            &JsValue::NULL,
            &JsValue::from_str(&row_id),
            &row,
            &JsValue::from_str(&table_id),
        ) {
            log::error!("row action on {:?} failed: {}", row_id, describe(&e));
        }
    }

    fn apply_pending_move(&self) {
        let Some(x) = self.pending_move.take() else { return };
        let table_id = self.grid.borrow().active_resize().map(str::to_string);
        if let Some(table_id) = table_id {
            let _ = self.run(|grid| grid.resize_move(&table_id, x));
        }
    }
}

fn on_click(bridge: &Rc<Bridge>, event: Event) {
    let Some(target) = event_element(&event) else { return };

    if let Some(toggle) = closest(&target, &format!(".{}", class::COLUMN_TOGGLE)) {
        event.stop_propagation();
        if let Some((table_id, column)) = header_position(&toggle) {
            let anchor = page_rect(&toggle);
            bridge.spawn(move |grid| async move {
                remote::open_column_menu(&grid, &table_id, column, anchor).await.map(|_| ())
            });
        }
        return;
    }

    if let Some(dropdown) = closest(&target, &format!(".{}", DROPDOWN_CLASS)) {
        // touch screens have no hover, a tap opens the submenu
        if let Some(item) = closest(&target, "[data-action]") {
            bridge.show_item_submenu(&dropdown, &item);
        }
        return;
    }

    if let Some(submenu) = closest(&target, &format!(".{}", SUBMENU_CLASS)) {
        let Some(table_id) = submenu.get_attribute("data-table") else { return };
        if let Some(item) = closest(&target, "[data-sort-dir]") {
            let direction = SortDirection::parse(&item.get_attribute("data-sort-dir").unwrap_or_default());
            let _ = bridge.run(|grid| grid.choose_sort(&table_id, direction));
        }
        return;
    }

    if let Some(button) = closest(&target, ".table__header--action-edit, .table__header--action-delete") {
        event.stop_propagation();
        bridge.invoke_row_action(&button);
        return;
    }

    if target.class_list().contains("clear-button") {
        if let Some(cell) = closest(&target, &format!(".{}", class::FILTER_CELL)) {
            clear_filter_input(bridge, &cell);
            return;
        }
    }

    let _ = bridge.run(|grid| Ok(grid.handle_document_click(ClickZone::Outside)));

    if let Some(td) = closest(&target, "td") {
        if let Some((table_id, row, cell)) = cell_position(&td) {
            let _ = bridge.run(|grid| grid.select_cell(&table_id, row, cell));
        }
    }
}

fn clear_filter_input(bridge: &Rc<Bridge>, cell: &web_sys::Element) {
    let Ok(Some(input)) = cell.query_selector(&format!("input.{}", FILTER_INPUT_CLASS)) else { return };
    let Some((table_id, column)) = filter_target(&input) else { return };
    if let Some(input) = input.dyn_ref::<HtmlInputElement>() {
        input.set_value("");
    }
    let _ = bridge.run(|grid| grid.clear_filter(&table_id, column));
}

fn on_mouseover(bridge: &Rc<Bridge>, event: Event) {
    let Some(target) = event_element(&event) else { return };
    let Some(dropdown) = closest(&target, &format!(".{}", DROPDOWN_CLASS)) else { return };
    if let Some(item) = closest(&target, "[data-action]") {
        bridge.show_item_submenu(&dropdown, &item);
    }
}

fn filter_target(input: &web_sys::Element) -> Option<(String, usize)> {
    let column = input.get_attribute("data-column")?.parse().ok()?;
    let table = closest(input, &format!("table.{}", class::TABLE))?;
    Some((table.id(), column))
}

fn on_input(bridge: &Rc<Bridge>, event: Event) {
    let Some(target) = event_element(&event) else { return };
    if !target.class_list().contains(FILTER_INPUT_CLASS) {
        return;
    }
    let Some(value) = target.dyn_ref::<HtmlInputElement>().map(|input| input.value()) else { return };
    if let Some((table_id, column)) = filter_target(&target) {
        let _ = bridge.run(|grid| grid.set_filter(&table_id, column, FilterKind::Text, &value));
    }
}

fn on_change(bridge: &Rc<Bridge>, event: Event) {
    let Some(target) = event_element(&event) else { return };

    if target.class_list().contains(FILTER_SELECT_CLASS) {
        let Some(value) = target.dyn_ref::<HtmlSelectElement>().map(|select| select.value()) else { return };
        if let Some((table_id, column)) = filter_target(&target) {
            let _ = bridge.run(|grid| grid.set_filter(&table_id, column, FilterKind::Select, &value));
        }
        return;
    }

    let Some(item) = closest(&target, &format!(".{}", COLUMN_ITEM_CLASS)) else { return };
    let Some(submenu) = closest(&item, &format!(".{}", SUBMENU_CLASS)) else { return };
    let (Some(table_id), Some(column)) = (
        submenu.get_attribute("data-table"),
        item.get_attribute("data-column-index").and_then(|i| i.parse::<usize>().ok()),
    ) else {
        return;
    };
    let _ = bridge.run(|grid| grid.toggle_column_visibility(&table_id, column));
}

fn on_pointerdown(bridge: &Rc<Bridge>, event: Event) {
    let Some(target) = event_element(&event) else { return };
    let Some(handle) = closest(&target, &format!(".{}", class::RESIZE_HANDLE)) else { return };
    let Some(pointer) = event.dyn_ref::<MouseEvent>() else { return };
    event.prevent_default();
    event.stop_propagation();

    let Some((table_id, column)) = header_position(&handle) else { return };
    let Some(table) = closest(&handle, "table") else { return };
    let rect = table.get_bounding_client_rect();
    let frame = TableFrame {
        left: rect.left(),
        height: rect.height(),
    };
    let _ = bridge.run(|grid| grid.begin_resize(&table_id, column, f64::from(pointer.client_x()), frame));
}

fn on_pointermove(bridge: &Rc<Bridge>, event: Event) {
    let Some(pointer) = event.dyn_ref::<MouseEvent>() else { return };
    if bridge.grid.borrow().active_resize().is_none() {
        return;
    }
    event.prevent_default();
    let first = bridge.pending_move.replace(Some(f64::from(pointer.client_x()))).is_none();
    if !first {
        return;
    }
    // one guide update per animation frame
    let weak = Rc::downgrade(bridge);
    let frame = Closure::once_into_js(move || {
        if let Some(bridge) = weak.upgrade() {
            bridge.apply_pending_move();
        }
    });
    match window() {
        Ok(window) => {
            if let Err(e) = window.request_animation_frame(frame.unchecked_ref()) {
                log::warn!("animation frame refused: {}", describe(&e));
                bridge.apply_pending_move();
            }
        }
        Err(_) => bridge.apply_pending_move(),
    }
}

fn on_pointerup(bridge: &Rc<Bridge>, _event: Event) {
    bridge.apply_pending_move();
    let table_id = bridge.grid.borrow().active_resize().map(str::to_string);
    if let Some(table_id) = table_id {
        let _ = bridge.run(|grid| grid.end_resize(&table_id));
    }
}

fn on_keydown(bridge: &Rc<Bridge>, event: Event) {
    let Some(keys) = event.dyn_ref::<KeyboardEvent>() else { return };
    if event_element(&event).map(|target| is_editable(&target)).unwrap_or(false) {
        return;
    }
    let key = keys.key();

    if keys.ctrl_key() || keys.meta_key() {
        // Cyrillic layout puts "с" on the C key
        if matches!(key.as_str(), "c" | "C" | "с" | "С") {
            let text = bridge.grid.borrow().selected_cell_text();
            if let Some(text) = text {
                if let Err(e) = copy_to_clipboard(&text) {
                    log::warn!("copy failed: {}", describe(&e));
                }
            }
        }
        return;
    }

    if let Some(nav) = NavKey::parse(&key) {
        if let Ok(true) = bridge.run(|grid| Ok(grid.navigate(nav))) {
            event.prevent_default();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_guide_sits_at_the_table_relative_offset() {
        let style = guide_style(GuideLine { left: 180.0, height: 300.0 });
        assert_eq!(style, "left: 180px; height: 300px;");
    }
}
