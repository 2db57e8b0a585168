//! Inline create/edit form and the header filter row

use crate::column::Column;
use crate::dom::Element;
use crate::markup::class;
use crate::visibility::px;
use serde::{Deserialize, Serialize};

pub const FORM_CLASS: &str = "create-form";
pub const FORM_COLUMN_CLASS: &str = "create-form__column";
pub const FILTER_INPUT_CLASS: &str = "table__filter-input";
pub const FILTER_SELECT_CLASS: &str = "table__filter-select";
const CLEAR_ICON: &str = "/static/images/close.svg";

/// An inline form rendered right after its table
#[derive(Debug, Clone, PartialEq)]
pub struct FormView {
    pub id: String,
    pub element: Element,
    /// Record id of the row being edited; the bridge centres the form on it
    pub anchor_row: Option<String>,
}

/// Where the form's buttons go: above the fields when the edited row sits
/// below the third row, otherwise below.
pub fn buttons_on_top(row_position: Option<usize>) -> bool {
    row_position.is_some_and(|pos| pos > 2)
}

fn text_input(name: &str, input_class: &str) -> Element {
    Element::new("div")
        .with_class("input-container")
        .with_child(
            Element::new("input")
                .with_attr("type", "text")
                .with_attr("name", name)
                .with_class(input_class),
        )
        .with_child(
            Element::new("img")
                .with_attr("src", CLEAR_ICON)
                .with_attr("alt", "Close")
                .with_class("clear-button"),
        )
}

fn field_name(column: &Column) -> String {
    if column.name.is_empty() {
        format!("field_{}", column.index)
    } else {
        column.name.clone()
    }
}

fn form_input(column: &Column) -> Element {
    let name = field_name(column);
    if column.kind.uses_select_input() {
        Element::new("div").with_class("select").with_child(
            Element::new("select")
                .with_class("select__input")
                .with_attr("name", name.as_str())
                .with_attr("id", format!("id_{}", name)),
        )
    } else {
        text_input(&name, "create-form__input")
    }
}

/// Build the form with one field container per column (hidden columns get a
/// `display: none` container so positions stay aligned with the table).
pub fn build_form(
    form_id: &str,
    columns: &[Column],
    min_width: u32,
    row_id: Option<&str>,
    row_position: Option<usize>,
) -> Element {
    let mut form = Element::new("form").with_class(FORM_CLASS).with_attr("id", form_id);
    if row_id.is_some() {
        form.add_class("create-form--edit");
    }

    for column in columns {
        let width = if column.width > 0 { column.width } else { min_width };
        let mut field = Element::new("div")
            .with_class(FORM_COLUMN_CLASS)
            .with_style("width", px(width));
        if !column.visible {
            field.set_style("display", "none");
        }
        if column.label.trim() == "ID" {
            if let Some(id) = row_id {
                field.push(Element::new("span").with_text(id));
            }
        } else {
            field.push(form_input(column));
        }
        form.push(field);
    }

    let placement = if buttons_on_top(row_position) {
        "create-form__buttons--top"
    } else {
        "create-form__buttons--bottom"
    };
    form.push(
        Element::new("div")
            .with_class("create-form__buttons")
            .with_class(placement)
            .with_child(
                Element::new("button")
                    .with_attr("type", "submit")
                    .with_class("button")
                    .with_text("Confirm"),
            )
            .with_child(
                Element::new("button")
                    .with_attr("type", "button")
                    .with_attr("data-action", "cancel")
                    .with_class("button")
                    .with_text("Cancel"),
            ),
    );
    form
}

/// Filter configuration for one column. A `url` makes it a select filter
/// populated from an `{id, name}` endpoint.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct FilterColumnConfig {
    pub name: String,
    #[serde(default)]
    pub url: Option<String>,
}

/// A `<select>` filter waiting for its option list
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingOptions {
    pub column: usize,
    pub url: String,
}

/// The filter row appended to `<thead>`, plus the select filters whose
/// options still need fetching
pub fn build_filter_row(
    columns: &[Column],
    configs: &[FilterColumnConfig],
    min_width: u32,
) -> (Element, Vec<PendingOptions>) {
    let mut row = Element::new("tr").with_class(class::FILTER_ROW);
    let mut pending = Vec::new();

    for column in columns {
        let mut cell = Element::new("td")
            .with_class(class::HEADER_CELL)
            .with_class(class::FILTER_CELL)
            .with_style("max-width", px(if column.width > 0 { column.width } else { min_width }));
        cell.toggle_class(class::HIDDEN, !column.visible);

        if let Some(config) = configs.iter().find(|c| c.name == column.name) {
            let index = column.index.to_string();
            let input = match &config.url {
                Some(url) => {
                    pending.push(PendingOptions {
                        column: column.index,
                        url: url.clone(),
                    });
                    Element::new("select")
                        .with_class(FILTER_SELECT_CLASS)
                        .with_attr("data-column", index.as_str())
                        .with_child(Element::new("option").with_attr("value", "").with_text(""))
                }
                None => {
                    let mut input = text_input(&field_name(column), FILTER_INPUT_CLASS);
                    input.visit_mut(&mut |el| el.set_attr("data-column", index.as_str()));
                    input
                }
            };
            cell.push(input);
        }
        row.push(cell);
    }
    (row, pending)
}

/// One option of a select filter or select input
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnOption {
    #[serde(deserialize_with = "crate::net::string_or_number")]
    pub id: String,
    pub name: String,
}

/// Replace the options of the select filter on `column`. Option values are
/// the display names since select filters compare against cell text.
pub fn fill_filter_options(filter_row: &mut Element, column: usize, options: &[ColumnOption]) -> bool {
    let wanted = column.to_string();
    let Some(select) = filter_row.find_mut(&|el| {
        el.tag == "select" && el.attr("data-column") == Some(wanted.as_str())
    }) else {
        return false;
    };
    let mut children = vec![Element::new("option").with_attr("value", "").with_text("")];
    children.extend(options.iter().map(|option| {
        Element::new("option")
            .with_attr("value", option.name.as_str())
            .with_attr("data-id", option.id.as_str())
            .with_text(option.name.as_str())
    }));
    select.set_children(children);
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::column::{ColumnType, SortDirection};

    fn columns() -> Vec<Column> {
        vec![
            Column {
                index: 0,
                name: "id".into(),
                label: "ID".into(),
                kind: ColumnType::Number,
                visible: true,
                width: 60,
                saved_width: None,
                sort: SortDirection::None,
            },
            Column {
                index: 1,
                name: "client".into(),
                label: "Client".into(),
                kind: ColumnType::Select,
                visible: true,
                width: 150,
                saved_width: None,
                sort: SortDirection::None,
            },
            Column {
                index: 2,
                name: "comment".into(),
                label: "Comment".into(),
                kind: ColumnType::Default,
                visible: false,
                width: 0,
                saved_width: Some(90),
                sort: SortDirection::None,
            },
        ]
    }

    #[test]
    fn test_form_keeps_one_field_per_column() {
        let form = build_form("order-form", &columns(), 50, Some("17"), Some(5));
        assert!(form.has_class("create-form--edit"));
        assert_eq!(form.children().filter(|el| el.has_class(FORM_COLUMN_CLASS)).count(), 3);

        let id_field = form.child(0).unwrap();
        assert_eq!(id_field.text_content(), "17");
        let client = form.child(1).unwrap();
        assert!(client.find(&|el| el.tag == "select" && el.id() == Some("id_client")).is_some());
        let hidden = form.child(2).unwrap();
        assert_eq!(hidden.style("display"), Some("none"));
        assert_eq!(hidden.style("width"), Some("50px"));

        let buttons = form.child(3).unwrap();
        assert!(buttons.has_class("create-form__buttons--top"));
    }

    #[test]
    fn test_new_record_form_buttons_at_bottom() {
        let form = build_form("f", &columns(), 50, None, None);
        assert!(!form.has_class("create-form--edit"));
        assert_eq!(form.child(0).unwrap().child_count(), 0);
        assert!(form.child(3).unwrap().has_class("create-form__buttons--bottom"));
        assert!(!buttons_on_top(Some(2)));
    }

    #[test]
    fn test_filter_row_inputs() {
        let configs = vec![
            FilterColumnConfig { name: "client".into(), url: Some("/clients/list/".into()) },
            FilterColumnConfig { name: "comment".into(), url: None },
        ];
        let (mut row, pending) = build_filter_row(&columns(), &configs, 50);
        assert_eq!(pending, vec![PendingOptions { column: 1, url: "/clients/list/".into() }]);
        assert_eq!(row.child_count(), 3);
        assert_eq!(row.child(0).unwrap().child_count(), 0);
        assert!(row.child(2).unwrap().has_class(class::HIDDEN));
        let input = row.child(2).unwrap().find(&|el| el.tag == "input").unwrap();
        assert_eq!(input.attr("data-column"), Some("2"));

        let options = vec![ColumnOption { id: "4".into(), name: "Acme".into() }];
        assert!(fill_filter_options(&mut row, 1, &options));
        let select = row.find(&|el| el.tag == "select").unwrap();
        assert_eq!(select.child_count(), 2);
        assert_eq!(select.child(1).unwrap().attr("value"), Some("Acme"));
        assert!(!fill_filter_options(&mut row, 0, &options));
    }
}
