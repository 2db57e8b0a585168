//! Column menu opened from a header's toggle button
//!
//! One menu is open at a time per table. The menu offers "hide" (a submenu of
//! per-column visibility checkboxes, built from a server template) and "sort"
//! (ascending / descending). The menu tree is rendered as overlay elements the
//! bridge appends to the page body.

use crate::column::Column;
use crate::dom::Element;
use crate::error::GridError;
use crate::markup::class;
use futures::future::{LocalBoxFuture, Shared};
use serde::{Deserialize, Serialize};
use std::cell::RefCell;

pub const DROPDOWN_CLASS: &str = "table__dropdown";
pub const DROPDOWN_ITEM_CLASS: &str = "table__dropdown-item";
pub const SUBMENU_CLASS: &str = "table__submenu";
pub const COLUMN_ITEM_CLASS: &str = "table__column-item";

/// Viewport rectangle of a trigger or menu item
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Rect {
    pub left: f64,
    pub top: f64,
    pub right: f64,
    pub bottom: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MenuAction {
    Hide,
    Sort,
}

impl MenuAction {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "hide" => Some(Self::Hide),
            "sort" => Some(Self::Sort),
            _ => None,
        }
    }

    fn as_str(&self) -> &'static str {
        match self {
            Self::Hide => "hide",
            Self::Sort => "sort",
        }
    }

    fn label(&self) -> &'static str {
        match self {
            Self::Hide => "Скрыть",
            Self::Sort => "Сортировать",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Submenu {
    pub action: MenuAction,
    pub left: f64,
    pub top: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum DropdownState {
    #[default]
    Closed,
    Open {
        column: usize,
        anchor: Rect,
        submenu: Option<Submenu>,
    },
}

/// Where a document click landed relative to the open menu
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClickZone {
    Dropdown,
    Submenu,
    Trigger,
    Outside,
}

#[derive(Debug, Default)]
pub struct DropdownManager {
    state: DropdownState,
}

impl DropdownManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> &DropdownState {
        &self.state
    }

    pub fn is_open(&self) -> bool {
        matches!(self.state, DropdownState::Open { .. })
    }

    pub fn open_column(&self) -> Option<usize> {
        match self.state {
            DropdownState::Open { column, .. } => Some(column),
            DropdownState::Closed => None,
        }
    }

    /// Trigger click on `column`'s toggle button. Re-clicking the open trigger
    /// closes the menu; any other trigger replaces it. Returns whether a menu
    /// is open afterwards.
    pub fn toggle(&mut self, column: usize, anchor: Rect) -> bool {
        if self.open_column() == Some(column) {
            self.close();
            return false;
        }
        self.state = DropdownState::Open {
            column,
            anchor,
            submenu: None,
        };
        true
    }

    /// Show the submenu for `action` beside the hovered item
    pub fn show_submenu(&mut self, action: MenuAction, item: Rect) -> bool {
        match &mut self.state {
            DropdownState::Open { submenu, .. } => {
                *submenu = Some(Submenu {
                    action,
                    left: item.right,
                    top: item.top,
                });
                true
            }
            DropdownState::Closed => false,
        }
    }

    pub fn hide_submenu(&mut self) {
        if let DropdownState::Open { submenu, .. } = &mut self.state {
            *submenu = None;
        }
    }

    pub fn submenu(&self) -> Option<Submenu> {
        match self.state {
            DropdownState::Open { submenu, .. } => submenu,
            DropdownState::Closed => None,
        }
    }

    /// Document-level click. Trigger clicks are handled by [`Self::toggle`].
    /// Returns true when the click closed the menu.
    pub fn handle_document_click(&mut self, zone: ClickZone) -> bool {
        if !self.is_open() {
            return false;
        }
        let close = match zone {
            ClickZone::Dropdown | ClickZone::Trigger => false,
            ClickZone::Submenu => self.submenu().is_none(),
            ClickZone::Outside => true,
        };
        if close {
            self.close();
        }
        close
    }

    pub fn close(&mut self) {
        self.state = DropdownState::Closed;
    }

    /// Menu elements for the current state. `column_template` is the parsed
    /// server template for the visibility submenu; without it a plain list is
    /// built.
    pub fn render(&self, table_id: &str, columns: &[Column], column_template: Option<&Element>) -> Vec<Element> {
        let DropdownState::Open { column, anchor, submenu } = self.state else {
            return Vec::new();
        };

        let mut dropdown = Element::new("div")
            .with_class(DROPDOWN_CLASS)
            .with_attr("data-table", table_id)
            .with_attr("data-column-index", column.to_string())
            .with_style("left", px(anchor.left))
            .with_style("top", px(anchor.bottom));
        for action in [MenuAction::Hide, MenuAction::Sort] {
            dropdown.push(
                Element::new("div")
                    .with_class(DROPDOWN_ITEM_CLASS)
                    .with_attr("data-action", action.as_str())
                    .with_text(action.label()),
            );
        }

        let mut overlay = vec![dropdown];
        if let Some(sub) = submenu {
            let mut element = match sub.action {
                MenuAction::Hide => column_submenu(columns, column_template),
                MenuAction::Sort => sort_submenu(),
            };
            element.set_attr("data-table", table_id);
            element.set_attr("data-column-index", column.to_string());
            element.set_attr("data-action", sub.action.as_str());
            element.set_style("left", px(sub.left));
            element.set_style("top", px(sub.top));
            overlay.push(element);
        }
        overlay
    }
}

fn px(value: f64) -> String {
    format!("{}px", value)
}

fn sort_submenu() -> Element {
    let mut submenu = Element::new("div").with_class(SUBMENU_CLASS);
    for (dir, label) in [("asc", "По возрастанию"), ("desc", "По убыванию")] {
        submenu.push(
            Element::new("div")
                .with_class(DROPDOWN_ITEM_CLASS)
                .with_attr("data-sort-dir", dir)
                .with_text(label),
        );
    }
    submenu
}

/// One checkbox per column. The only column left can not be unchecked.
fn column_submenu(columns: &[Column], template: Option<&Element>) -> Element {
    let mut submenu = template.cloned().unwrap_or_else(|| Element::new("div"));
    let item_template = submenu
        .find(&|el| el.has_class(COLUMN_ITEM_CLASS))
        .cloned()
        .unwrap_or_else(|| {
            Element::new("div")
                .with_class(COLUMN_ITEM_CLASS)
                .with_child(Element::new("input").with_attr("type", "checkbox"))
                .with_child(Element::new("label"))
        });
    submenu.retain_children(|el| !el.has_class(COLUMN_ITEM_CLASS));
    submenu.set_attr("class", SUBMENU_CLASS);

    let single = columns.len() == 1;
    for column in columns {
        let mut item = item_template.clone();
        let checkbox_id = format!("column-{}", column.index);
        item.set_attr("data-column-index", column.index.to_string());
        if let Some(input) = item.find_mut(&|el| el.tag == "input") {
            input.set_id(&checkbox_id);
            toggle_attr(input, "checked", column.visible);
            toggle_attr(input, "disabled", single);
        }
        if let Some(label) = item.find_mut(&|el| el.tag == "label") {
            label.set_attr("for", &checkbox_id);
            label.push(Element::new("span").with_class("checkbox__text").with_text(column.label.trim()));
        }
        submenu.push(item);
    }
    submenu
}

fn toggle_attr(el: &mut Element, name: &str, on: bool) {
    if on {
        el.set_attr(name, "");
    } else {
        el.remove_attr(name);
    }
}

/// The template request shared by every caller that arrives while it runs
pub type TemplateFetch = Shared<LocalBoxFuture<'static, Result<String, GridError>>>;

/// Fetch-once store for the visibility submenu template.
///
/// Owned by the registry and shared by every table. Tests and page reloads can
/// seed or reset it. While the first request is out, later callers join it
/// through [`Self::in_flight`].
#[derive(Default)]
pub struct TemplateCache {
    html: RefCell<Option<String>>,
    in_flight: RefCell<Option<TemplateFetch>>,
}

impl std::fmt::Debug for TemplateCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TemplateCache")
            .field("html", &self.html)
            .field("in_flight", &self.in_flight.borrow().is_some())
            .finish()
    }
}

impl TemplateCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self) -> Option<String> {
        self.html.borrow().clone()
    }

    pub fn is_loaded(&self) -> bool {
        self.html.borrow().is_some()
    }

    pub fn store(&self, html: String) {
        *self.html.borrow_mut() = Some(html);
    }

    pub fn in_flight(&self) -> Option<TemplateFetch> {
        self.in_flight.borrow().clone()
    }

    pub fn begin(&self, fetch: TemplateFetch) {
        *self.in_flight.borrow_mut() = Some(fetch);
    }

    /// Settle the shared request. A failure leaves the cache empty so the
    /// next menu open retries.
    pub fn finish(&self, result: &Result<String, GridError>) {
        self.in_flight.borrow_mut().take();
        if let Ok(html) = result {
            self.store(html.clone());
        }
    }

    pub fn reset(&self) {
        self.html.borrow_mut().take();
        self.in_flight.borrow_mut().take();
    }
}

/// Header element the toggle button for a column sits in
pub fn toggle_button() -> Element {
    Element::new("div").with_class(class::COLUMN_TOGGLE)
}
