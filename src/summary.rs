//! Summary rows holding per-column sums
//!
//! Two modes that may be combined: grouped (one summary after each run of rows
//! following a group marker row) and total (one summary at the end of the
//! body). Hidden rows (filtered out) are not summed. Existing summary rows are
//! always removed first, so repeated calls never accumulate.

use crate::column::Column;
use crate::dom::Element;
use crate::format::{parse_number, CellFormatter};
use crate::markup::class;
use crate::visibility::project_columns;
use serde::{Deserialize, Deserializer, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SummaryOptions {
    pub grouped: bool,
    pub total: bool,
    /// Class for total summary cells; without it the sign decides
    pub class_name: Option<String>,
    /// Restrict summed rows to these record ids
    #[serde(deserialize_with = "ids_as_strings")]
    pub ids: Option<Vec<String>>,
}

impl Default for SummaryOptions {
    fn default() -> Self {
        Self {
            grouped: false,
            total: true,
            class_name: None,
            ids: None,
        }
    }
}

/// Columns to sum plus options, as stored per table by the filter row
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SummarySpec {
    pub columns: Vec<String>,
    #[serde(default)]
    pub class_name: Option<String>,
}

impl SummarySpec {
    pub fn options(&self) -> SummaryOptions {
        SummaryOptions {
            class_name: self.class_name.clone(),
            ..SummaryOptions::default()
        }
    }
}

/// Summary arguments as pages pass them: a bare list of column names or
/// `{columns, className}`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum SummaryArg {
    Columns(Vec<String>),
    Spec(SummarySpec),
}

impl From<SummaryArg> for SummarySpec {
    fn from(arg: SummaryArg) -> Self {
        match arg {
            SummaryArg::Columns(columns) => SummarySpec { columns, class_name: None },
            SummaryArg::Spec(spec) => spec,
        }
    }
}

fn ids_as_strings<'de, D>(deserializer: D) -> Result<Option<Vec<String>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<Vec<serde_json::Value>> = Option::deserialize(deserializer)?;
    Ok(raw.map(|values| {
        values
            .into_iter()
            .map(|v| match v {
                serde_json::Value::String(s) => s,
                other => other.to_string(),
            })
            .collect()
    }))
}

fn id_allowed(row: &Element, ids: Option<&[String]>) -> bool {
    match ids {
        None | Some([]) => true,
        Some(ids) => row.attr("data-id").is_some_and(|id| ids.iter().any(|allowed| allowed == id)),
    }
}

fn summable(row: &Element) -> bool {
    row.tag == "tr" && row.is_data_row() && row.is_displayed()
}

/// Sum `targets` (column indexes) over `rows`; unparseable cells count as 0
fn sums(rows: &[&Element], targets: &[usize]) -> Vec<(usize, f64)> {
    targets
        .iter()
        .map(|&index| {
            let total = rows
                .iter()
                .filter_map(|row| row.child(index))
                .filter_map(|cell| parse_number(&cell.text_content()))
                .sum();
            (index, total)
        })
        .collect()
}

fn summary_row(
    columns: &[Column],
    sums: &[(usize, f64)],
    class_name: Option<&str>,
    with_actions: bool,
    formatter: &CellFormatter,
) -> Element {
    let mut row = Element::new("tr").with_class(class::ROW).with_class(class::ROW_SUMMARY);
    for column in columns {
        let mut cell = Element::new("td").with_class(class::CELL);
        if let Some(&(_, total)) = sums.iter().find(|(index, _)| *index == column.index) {
            let rounded = (total * 100.0).round() / 100.0;
            cell.add_class(class::CELL_SUMMARY);
            cell.set_text(formatter.amount(rounded));
            cell.add_class(match class_name {
                Some(name) => name,
                None if rounded >= 0.0 => class::TEXT_GREEN,
                None => class::TEXT_RED,
            });
        }
        row.push(cell);
    }
    if with_actions {
        row.push(Element::new("td").with_class(class::CELL).with_class(class::CELL_ACTIONS));
    }
    project_columns(&mut row, columns);
    row
}

/// Recompute the summary rows of `table`. Returns how many were inserted.
pub fn calculate(
    table: &mut Element,
    columns: &[Column],
    names: &[String],
    options: &SummaryOptions,
    formatter: &CellFormatter,
) -> usize {
    if names.is_empty() {
        log::warn!("no columns to sum for table {:?}", table.id().unwrap_or_default());
        return 0;
    }
    let targets: Vec<usize> = names
        .iter()
        .filter_map(|name| columns.iter().find(|c| &c.name == name).map(|c| c.index))
        .collect();
    let with_actions = table
        .thead()
        .and_then(|thead| thead.find(&|el| el.has_class(class::HEADER_ACTIONS)))
        .is_some();
    let ids = options.ids.as_deref();

    let Some(tbody) = table.tbody_mut() else { return 0 };
    tbody.retain_children(|row| !row.is_summary_row());

    let mut inserted = 0;
    let rows: Vec<&Element> = tbody.children().collect();

    let mut group_inserts: Vec<(usize, Element)> = Vec::new();
    if options.grouped && rows.iter().any(|r| r.is_group_row()) {
        let mut position = 0;
        while position < rows.len() {
            if !rows[position].is_group_row() {
                position += 1;
                continue;
            }
            let mut members: Vec<(usize, &Element)> = Vec::new();
            let mut cursor = position + 1;
            while cursor < rows.len() && !rows[cursor].is_group_row() {
                if summable(rows[cursor]) && id_allowed(rows[cursor], ids) {
                    members.push((cursor, rows[cursor]));
                }
                cursor += 1;
            }
            if let Some(&(last, _)) = members.last() {
                let member_rows: Vec<&Element> = members.iter().map(|(_, r)| *r).collect();
                let row = summary_row(
                    columns,
                    &sums(&member_rows, &targets),
                    Some(class::TEXT_BLUE),
                    with_actions,
                    formatter,
                );
                group_inserts.push((last + 1, row));
            }
            position = cursor;
        }
    }

    let total_row = if !options.grouped || options.total {
        let members: Vec<&Element> = rows
            .iter()
            .copied()
            .filter(|row| summable(row) && id_allowed(row, ids))
            .collect();
        (!members.is_empty()).then(|| {
            summary_row(
                columns,
                &sums(&members, &targets),
                options.class_name.as_deref(),
                with_actions,
                formatter,
            )
        })
    } else {
        None
    };

    for (position, row) in group_inserts.into_iter().rev() {
        tbody.insert_child(position, row);
        inserted += 1;
    }
    if let Some(row) = total_row {
        tbody.push(row);
        inserted += 1;
    }
    inserted
}
