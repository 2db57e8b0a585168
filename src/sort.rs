//! Row ordering by a column's declared type

use crate::column::{ColumnType, SortDirection};
use crate::dom::Element;
use crate::format::{parse_number, parse_percent};
use chrono::{NaiveDate, NaiveDateTime};
use std::cmp::Ordering;

const DATE_FORMATS: &[&str] = &["%d.%m.%Y", "%Y-%m-%d", "%d/%m/%Y"];
const DATETIME_FORMATS: &[&str] = &["%d.%m.%Y %H:%M", "%Y-%m-%d %H:%M", "%Y-%m-%dT%H:%M:%S"];

/// Comparable value extracted from a cell
#[derive(Debug, Clone, PartialEq)]
pub enum SortKey {
    Number(f64),
    /// Unparseable dates sort before every real date
    Date(Option<NaiveDateTime>),
    Text(String),
}

impl SortKey {
    pub fn from_cell(kind: ColumnType, text: &str) -> Self {
        let text = text.trim();
        match kind {
            ColumnType::Amount | ColumnType::Number => Self::Number(parse_number(text).unwrap_or(0.0)),
            ColumnType::Percent => Self::Number(parse_percent(text).unwrap_or(f64::NEG_INFINITY)),
            ColumnType::Date => Self::Date(parse_date(text)),
            _ => Self::Text(text.to_lowercase()),
        }
    }

    fn compare(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Self::Number(a), Self::Number(b)) => a.total_cmp(b),
            (Self::Date(a), Self::Date(b)) => a.cmp(b),
            (Self::Text(a), Self::Text(b)) => a.cmp(b),
            _ => Ordering::Equal,
        }
    }
}

pub fn parse_date(text: &str) -> Option<NaiveDateTime> {
    DATETIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(text, fmt).ok())
        .or_else(|| {
            DATE_FORMATS
                .iter()
                .find_map(|fmt| NaiveDate::parse_from_str(text, fmt).ok())
                .and_then(|date| date.and_hms_opt(0, 0, 0))
        })
}

fn cell_key(row: &Element, index: usize, kind: ColumnType) -> Option<SortKey> {
    row.child(index).map(|cell| SortKey::from_cell(kind, &cell.text_content()))
}

/// Reorder the body's rows by column `index`. The sort is stable, rows
/// missing the cell keep their relative place, and summary rows are moved
/// to the end in their existing order. `SortDirection::None` leaves the
/// order untouched.
pub fn sort_rows(tbody: &mut Element, index: usize, kind: ColumnType, direction: SortDirection) {
    if direction == SortDirection::None {
        return;
    }
    let (summaries, rows): (Vec<Element>, Vec<Element>) = tbody
        .take_children()
        .into_iter()
        .partition(|row| row.is_summary_row());

    let mut keyed: Vec<(Option<SortKey>, Element)> =
        rows.into_iter().map(|row| (cell_key(&row, index, kind), row)).collect();
    keyed.sort_by(|(a, _), (b, _)| {
        let ord = match (a, b) {
            (Some(a), Some(b)) => a.compare(b),
            _ => Ordering::Equal,
        };
        if direction == SortDirection::Desc {
            ord.reverse()
        } else {
            ord
        }
    });

    let mut ordered: Vec<Element> = keyed.into_iter().map(|(_, row)| row).collect();
    ordered.extend(summaries);
    tbody.set_children(ordered);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::markup::class;

    fn body(rows: &[&str]) -> Element {
        let mut tbody = Element::new("tbody");
        for text in rows {
            tbody.push(
                Element::new("tr")
                    .with_class(class::ROW)
                    .with_child(Element::new("td").with_text(format!("r-{}", text)))
                    .with_child(Element::new("td").with_text(*text)),
            );
        }
        tbody
    }

    fn column(tbody: &Element) -> Vec<String> {
        tbody
            .children()
            .map(|tr| tr.child(1).map(|td| td.text_content()).unwrap_or_default())
            .collect()
    }

    #[test]
    fn test_amounts_sort_signed() {
        let mut tbody = body(&["1 234,50 р.", "-200,00 р.", "15,00 р."]);
        sort_rows(&mut tbody, 1, ColumnType::Amount, SortDirection::Asc);
        assert_eq!(column(&tbody), vec!["-200,00 р.", "15,00 р.", "1 234,50 р."]);
        sort_rows(&mut tbody, 1, ColumnType::Amount, SortDirection::Desc);
        assert_eq!(column(&tbody), vec!["1 234,50 р.", "15,00 р.", "-200,00 р."]);
    }

    #[test]
    fn test_dates_and_text() {
        let mut tbody = body(&["03.02.2024", "garbage", "01.12.2023"]);
        sort_rows(&mut tbody, 1, ColumnType::Date, SortDirection::Asc);
        assert_eq!(column(&tbody), vec!["garbage", "01.12.2023", "03.02.2024"]);

        let mut tbody = body(&["beta", "Alpha", "gamma"]);
        sort_rows(&mut tbody, 1, ColumnType::Default, SortDirection::Asc);
        assert_eq!(column(&tbody), vec!["Alpha", "beta", "gamma"]);
    }

    #[test]
    fn test_percent_column() {
        let mut tbody = body(&["10%", "2.5%", "100%"]);
        sort_rows(&mut tbody, 1, ColumnType::Percent, SortDirection::Desc);
        assert_eq!(column(&tbody), vec!["100%", "10%", "2.5%"]);
    }

    #[test]
    fn test_summary_row_stays_last() {
        let mut tbody = body(&["b", "a"]);
        tbody.insert_child(
            0,
            Element::new("tr")
                .with_class(class::ROW_SUMMARY)
                .with_child(Element::new("td"))
                .with_child(Element::new("td").with_text("zzz")),
        );
        for direction in [SortDirection::Asc, SortDirection::Desc] {
            sort_rows(&mut tbody, 1, ColumnType::Default, direction);
            assert!(tbody.child(2).unwrap().is_summary_row());
        }
    }

    #[test]
    fn test_parse_date_formats() {
        assert!(parse_date("2024-02-03").is_some());
        assert!(parse_date("03.02.2024 14:30").is_some());
        assert!(parse_date("03/02/2024").is_some());
        assert_eq!(parse_date("yesterday"), None);
    }
}
