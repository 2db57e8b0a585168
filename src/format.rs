//! Numeric parsing and currency/percent cell formatting
//!
//! Amounts are rendered as `-1 234,50 р.`: space-grouped thousands, a comma
//! decimal separator, two decimals and the configured suffix. Parsing accepts
//! that form as well as raw server values such as `1234.5`.

use crate::column::{Column, ColumnType};
use crate::config::GridConfig;
use crate::dom::Element;
use crate::error::GridError;
use crate::markup::class;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;

static DECIMAL_CALL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"Decimal\("(-?[\d.]+)"\)"#).expect("valid regex"));

/// Extract a signed number from formatted cell text.
///
/// Currency suffixes and group separators are dropped. With both `,` and `.`
/// present the later one is the decimal separator; a lone `,` is a decimal
/// comma. Returns `None` when the text holds no digits.
pub fn parse_number(text: &str) -> Option<f64> {
    let last_digit = text.rfind(|c: char| c.is_ascii_digit())?;
    let first_digit = text.find(|c: char| c.is_ascii_digit())?;
    let negative = text[..first_digit].contains(['-', '−']);

    let body: String = text[first_digit..=last_digit]
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == ',' || *c == '.')
        .collect();

    let decimal_at = body.rfind([',', '.']);
    let mut normalized = String::with_capacity(body.len() + 1);
    if negative {
        normalized.push('-');
    }
    for (i, c) in body.char_indices() {
        match c {
            ',' | '.' if Some(i) == decimal_at => normalized.push('.'),
            ',' | '.' => {}
            _ => normalized.push(c),
        }
    }
    normalized.parse().ok()
}

/// Parse a percent cell (`12.5%`, `12,5 %`)
pub fn parse_percent(text: &str) -> Option<f64> {
    parse_number(&text.replace('%', ""))
}

/// `1234567` → `1 234 567`
pub fn group_thousands(digits: &str) -> String {
    let len = digits.len();
    let mut out = String::with_capacity(len + len / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (len - i) % 3 == 0 {
            out.push(' ');
        }
        out.push(c);
    }
    out
}

/// Two decimals, comma separator, grouped thousands: `-1 034,50`
pub fn format_decimal(value: f64) -> String {
    let fixed = format!("{:.2}", value.abs());
    let (int_part, frac_part) = fixed.split_once('.').unwrap_or((fixed.as_str(), "00"));
    let negative = value < 0.0 && fixed.bytes().any(|b| (b'1'..=b'9').contains(&b));
    format!(
        "{}{},{}",
        if negative { "-" } else { "" },
        group_thousands(int_part),
        frac_part
    )
}

pub fn format_amount(value: f64, suffix: &str) -> String {
    format!("{}{}", format_decimal(value), suffix)
}

/// Structured amount payload some endpoints embed in a cell, e.g.
/// `{'amount': Decimal('-200.00'), 'currency': ' р.'}`
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct MoneyPayload {
    #[serde(deserialize_with = "number_or_string")]
    pub amount: f64,
    #[serde(default)]
    pub currency: String,
}

fn number_or_string<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Number(f64),
        Text(String),
    }
    match Raw::deserialize(deserializer)? {
        Raw::Number(n) => Ok(n),
        Raw::Text(s) => s.trim().parse().map_err(serde::de::Error::custom),
    }
}

impl MoneyPayload {
    pub fn parse(text: &str) -> Result<Self, GridError> {
        let json = text.trim().replace('\'', "\"");
        let json = DECIMAL_CALL.replace_all(&json, "$1");
        Ok(serde_json::from_str(&json)?)
    }
}

/// Applies the currency and percent presentation to body cells
#[derive(Debug, Clone)]
pub struct CellFormatter {
    suffix: String,
    plain_amount: Regex,
    highlight_percent_column: Option<String>,
}

impl CellFormatter {
    pub fn new(config: &GridConfig) -> Self {
        let suffix = config.currency_suffix.clone();
        let pattern = format!(r"^[\d\s,.\-]+(\s?{})?$", regex::escape(suffix.trim()));
        Self {
            plain_amount: Regex::new(&pattern).expect("escaped suffix forms a valid regex"),
            suffix,
            highlight_percent_column: config.highlight_percent_column.clone(),
        }
    }

    pub fn suffix(&self) -> &str {
        &self.suffix
    }

    pub fn amount(&self, value: f64) -> String {
        format_amount(value, &self.suffix)
    }

    /// Reformat one amount cell. Unparseable content is logged and left as is.
    pub fn format_amount_cell(&self, cell: &mut Element) {
        cell.set_style("text-align", "right");
        let text = cell.text_content().trim().to_string();

        if text.is_empty() {
            cell.set_text("0");
            return;
        }

        if self.plain_amount.is_match(&text) {
            let had_suffix = text.ends_with(self.suffix.trim());
            match parse_number(&text) {
                Some(n) if n == 0.0 => {
                    cell.set_text(if had_suffix { format!("0{}", self.suffix) } else { "0".to_string() })
                }
                Some(n) => cell.set_text(self.amount(n)),
                None => {}
            }
            return;
        }

        match MoneyPayload::parse(&text) {
            Ok(payload) => {
                cell.set_text(format!("{}{}", format_decimal(payload.amount), payload.currency));
                cell.add_class(if payload.amount < 0.0 { class::BACK_RED } else { class::BACK_GREEN });
            }
            Err(e) => log::error!("cannot format amount cell {:?}: {}", text, e),
        }
    }

    pub fn format_percent_cell(&self, cell: &mut Element, column_name: &str) {
        cell.set_style("text-align", "center");
        let text = cell.text_content().replace('%', "").trim().to_string();
        if text.is_empty() {
            return;
        }
        cell.set_text(format!("{}%", text));

        let highlighted = self.highlight_percent_column.as_deref() == Some(column_name);
        if highlighted && parse_number(&text).is_some_and(|v| v != 0.0) {
            cell.add_class(class::CELL_CHANGED);
        }
    }

    /// Format every amount and percent cell of one row. Summary rows and
    /// summary cells are left untouched.
    pub fn format_row(&self, row: &mut Element, columns: &[Column]) {
        if row.is_summary_row() {
            return;
        }
        for column in columns {
            let Some(cell) = row.child_mut(column.index) else { continue };
            if cell.tag != "td" || cell.has_class(class::CELL_SUMMARY) {
                continue;
            }
            match column.kind {
                ColumnType::Amount => self.format_amount_cell(cell),
                ColumnType::Percent => self.format_percent_cell(cell, &column.name),
                _ => {}
            }
        }
    }

    pub fn format_table(&self, table: &mut Element, columns: &[Column]) {
        let Some(tbody) = table.tbody_mut() else { return };
        for row in tbody.children_mut().filter(|tr| tr.tag == "tr" && !tr.is_group_row()) {
            self.format_row(row, columns);
        }
    }
}
