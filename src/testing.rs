//! In-memory host services for tests and headless use
//!
//! [`TestHost`] bundles a memory layout store, fixed geometry, a fixture
//! fragment parser, a scripted transport and a notifier that records what it
//! was asked to show.

use crate::config::GridConfig;
use crate::dom::{Element, FragmentParser};
use crate::error::GridError;
use crate::manager::{Services, TableManager};
use crate::markup::class;
use crate::net::{HttpResponse, Notice, Notifier, Transport};
use crate::persist::MemoryLayoutStore;
use crate::sizing::{ContainerMetrics, Measure, TableMetrics};
use futures::future::{self, LocalBoxFuture};
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;

/// Returns pre-registered elements for known markup strings
#[derive(Debug, Default)]
pub struct FixtureParser {
    fragments: RefCell<HashMap<String, Vec<Element>>>,
}

impl FixtureParser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, html: &str, elements: Vec<Element>) {
        self.fragments.borrow_mut().insert(html.trim().to_string(), elements);
    }
}

impl FragmentParser for FixtureParser {
    fn parse_fragment(&self, html: &str) -> Result<Vec<Element>, GridError> {
        self.fragments
            .borrow()
            .get(html.trim())
            .cloned()
            .ok_or_else(|| GridError::Fragment(format!("no fixture for {:?}", html)))
    }
}

/// Same container for every table; each `<col>` measures `intrinsic` pixels
#[derive(Debug)]
pub struct FixedMeasure {
    container: Cell<ContainerMetrics>,
    intrinsic: Cell<u32>,
}

impl FixedMeasure {
    pub fn new(container: ContainerMetrics, intrinsic: u32) -> Self {
        Self {
            container: Cell::new(container),
            intrinsic: Cell::new(intrinsic),
        }
    }

    pub fn set_container(&self, container: ContainerMetrics) {
        self.container.set(container);
    }

    pub fn set_intrinsic(&self, width: u32) {
        self.intrinsic.set(width);
    }
}

impl Measure for FixedMeasure {
    fn measure(&self, _table_id: &str, table: &Element) -> TableMetrics {
        TableMetrics {
            container: self.container.get(),
            intrinsic_widths: vec![self.intrinsic.get(); table.header_cells().len()],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Delete,
}

/// Scripted replies keyed by method and URL. Unscripted requests fail with a
/// network error.
#[derive(Debug, Default)]
pub struct MockTransport {
    routes: RefCell<HashMap<(Method, String), Result<HttpResponse, GridError>>>,
    requests: RefCell<Vec<(Method, String)>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(&self, method: Method, url: &str, response: HttpResponse) {
        self.routes.borrow_mut().insert((method, url.to_string()), Ok(response));
    }

    pub fn fail(&self, method: Method, url: &str, error: GridError) {
        self.routes.borrow_mut().insert((method, url.to_string()), Err(error));
    }

    pub fn requests(&self) -> Vec<(Method, String)> {
        self.requests.borrow().clone()
    }

    fn reply(&self, method: Method, url: &str) -> LocalBoxFuture<'static, Result<HttpResponse, GridError>> {
        self.requests.borrow_mut().push((method, url.to_string()));
        let result = self
            .routes
            .borrow()
            .get(&(method, url.to_string()))
            .cloned()
            .unwrap_or_else(|| Err(GridError::Network(format!("no route for {}", url))));
        Box::pin(future::ready(result))
    }
}

impl Transport for MockTransport {
    fn get(&self, url: &str) -> LocalBoxFuture<'static, Result<HttpResponse, GridError>> {
        self.reply(Method::Get, url)
    }

    fn delete(&self, url: &str) -> LocalBoxFuture<'static, Result<HttpResponse, GridError>> {
        self.reply(Method::Delete, url)
    }
}

#[derive(Debug, Default)]
pub struct RecordingNotifier {
    notices: RefCell<Vec<Notice>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn notices(&self) -> Vec<Notice> {
        self.notices.borrow().clone()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, notice: Notice) {
        self.notices.borrow_mut().push(notice);
    }
}

/// Every host double, kept reachable so tests can script and inspect them
pub struct TestHost {
    pub store: Rc<MemoryLayoutStore>,
    pub measure: Rc<FixedMeasure>,
    pub parser: Rc<FixtureParser>,
    pub transport: Rc<MockTransport>,
    pub notifier: Rc<RecordingNotifier>,
}

impl TestHost {
    /// A 1201px wide container (1200px usable) and 50px intrinsic columns
    pub fn new() -> Self {
        Self {
            store: Rc::new(MemoryLayoutStore::new()),
            measure: Rc::new(FixedMeasure::new(ContainerMetrics::new(1201, 1201), 50)),
            parser: Rc::new(FixtureParser::new()),
            transport: Rc::new(MockTransport::new()),
            notifier: Rc::new(RecordingNotifier::new()),
        }
    }

    pub fn services(&self) -> Services {
        Services {
            store: self.store.clone(),
            measure: self.measure.clone(),
            parser: self.parser.clone(),
            transport: self.transport.clone(),
            notifier: self.notifier.clone(),
        }
    }

    pub fn manager(&self) -> TableManager {
        TableManager::new(GridConfig::default(), self.services())
    }
}

impl Default for TestHost {
    fn default() -> Self {
        Self::new()
    }
}

/// A `.table` with one column per `(name, type)` pair. Row `i` gets
/// `data-id` `i + 1`.
pub fn table_with(id: &str, columns: &[(&str, &str)], rows: &[Vec<String>]) -> Element {
    let mut colgroup = Element::new("colgroup");
    let mut header = Element::new("tr");
    for (name, kind) in columns {
        colgroup.push(Element::new("col"));
        header.push(
            Element::new("th")
                .with_class(class::HEADER_CELL)
                .with_attr("data-name", *name)
                .with_attr("data-column-type", *kind)
                .with_text(*name),
        );
    }
    let mut tbody = Element::new("tbody").with_class(class::BODY);
    for (i, cells) in rows.iter().enumerate() {
        tbody.push(data_row(&(i + 1).to_string(), cells));
    }
    Element::new("table")
        .with_class(class::TABLE)
        .with_attr("id", id)
        .with_child(colgroup)
        .with_child(Element::new("thead").with_child(header))
        .with_child(tbody)
}

/// A `.table__row` carrying `data-id` with one `.table__cell` per value
pub fn data_row(id: &str, cells: &[String]) -> Element {
    let mut row = Element::new("tr").with_class(class::ROW).with_attr("data-id", id);
    for text in cells {
        row.push(Element::new("td").with_class(class::CELL).with_text(text.as_str()));
    }
    row
}

/// `columns` default-typed columns `c0..` and three rows whose cells read
/// `"{row id}-{column}"`
pub fn sample_table(id: &str, columns: usize) -> Element {
    let names: Vec<String> = (0..columns).map(|c| format!("c{}", c)).collect();
    let spec: Vec<(&str, &str)> = names.iter().map(|n| (n.as_str(), "default")).collect();
    let rows: Vec<Vec<String>> = (1..=3)
        .map(|r| (0..columns).map(|c| format!("{}-{}", r, c)).collect())
        .collect();
    table_with(id, &spec, &rows)
}
