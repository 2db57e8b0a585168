//! Column types and per-column state

use crate::dom::Element;
use crate::markup::class;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Tag on a header cell driving width range, formatting and sort order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    Select,
    Number,
    Amount,
    Percent,
    Boolean,
    Date,
    Checkbox,
    Icon,
    Fixed,
    Sign,
    #[default]
    Default,
}

/// Inclusive pixel range a computed width is clamped into
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WidthRange {
    pub min: u32,
    pub max: u32,
}

impl WidthRange {
    pub const fn new(min: u32, max: u32) -> Self {
        Self { min, max }
    }

    pub fn clamp(&self, width: u32) -> u32 {
        width.clamp(self.min, self.max)
    }
}

impl ColumnType {
    /// Parse the `data-column-type` value; unknown tags fall back to `Default`
    pub fn parse(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "select" => Self::Select,
            "number" => Self::Number,
            "amount" => Self::Amount,
            "percent" => Self::Percent,
            "boolean" => Self::Boolean,
            "date" => Self::Date,
            "checkbox" => Self::Checkbox,
            "icon" => Self::Icon,
            "fixed" => Self::Fixed,
            "sign" => Self::Sign,
            _ => Self::Default,
        }
    }

    /// Resolve a header cell's type. A `select` header marked as a sign
    /// column is sized as `sign`.
    pub fn from_header(th: &Element) -> Self {
        let kind = th.attr("data-column-type").map(Self::parse).unwrap_or_default();
        if kind == Self::Select && th.has_class(class::HEADER_SIGN) {
            Self::Sign
        } else {
            kind
        }
    }

    pub fn width_range(&self) -> WidthRange {
        match self {
            Self::Select => WidthRange::new(150, 200),
            Self::Number | Self::Amount => WidthRange::new(60, 90),
            Self::Percent | Self::Boolean | Self::Sign => WidthRange::new(50, 80),
            Self::Date => WidthRange::new(80, 80),
            Self::Checkbox => WidthRange::new(50, 100),
            Self::Icon | Self::Fixed | Self::Default => WidthRange::new(50, 200),
        }
    }

    /// Columns that keep their width when a narrow container is shared out
    pub fn is_fixed_width(&self) -> bool {
        matches!(self, Self::Fixed | Self::Checkbox | Self::Icon | Self::Percent)
    }

    /// Columns whose inline form input is a select widget
    pub fn uses_select_input(&self) -> bool {
        matches!(self, Self::Select | Self::Sign)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Select => "select",
            Self::Number => "number",
            Self::Amount => "amount",
            Self::Percent => "percent",
            Self::Boolean => "boolean",
            Self::Date => "date",
            Self::Checkbox => "checkbox",
            Self::Icon => "icon",
            Self::Fixed => "fixed",
            Self::Sign => "sign",
            Self::Default => "default",
        }
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    Asc,
    Desc,
    #[default]
    None,
}

impl SortDirection {
    pub fn parse(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "asc" => Self::Asc,
            "desc" => Self::Desc,
            _ => Self::None,
        }
    }
}

/// One column of a table, derived from its header cell.
///
/// `width > 0` exactly when the column is visible; a hidden column keeps its
/// last width in `saved_width` for restoration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Column {
    pub index: usize,
    pub name: String,
    pub label: String,
    pub kind: ColumnType,
    pub visible: bool,
    pub width: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub saved_width: Option<u32>,
    pub sort: SortDirection,
}

impl Column {
    pub fn from_header(index: usize, th: &Element) -> Self {
        Self {
            index,
            name: th.attr("data-name").unwrap_or_default().to_string(),
            label: th.text_content().trim().to_string(),
            kind: ColumnType::from_header(th),
            visible: !th.has_class(class::HIDDEN),
            width: 0,
            saved_width: None,
            sort: SortDirection::None,
        }
    }

    pub fn hide(&mut self) {
        if self.width > 0 {
            self.saved_width = Some(self.width);
        }
        self.visible = false;
        self.width = 0;
    }

    /// Reveal the column, restoring its cached width or falling back to the floor
    pub fn show(&mut self, min_width: u32) {
        self.visible = true;
        self.width = match self.saved_width {
            Some(w) if w > 0 => w,
            _ => min_width,
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_parsing() {
        assert_eq!(ColumnType::parse("amount"), ColumnType::Amount);
        assert_eq!(ColumnType::parse(" Percent "), ColumnType::Percent);
        assert_eq!(ColumnType::parse("is_enum_field"), ColumnType::Default);
    }

    #[test]
    fn test_sign_header_overrides_select() {
        let th = Element::new("th")
            .with_attr("data-column-type", "select")
            .with_class("table__cell-header table__cell-header-sign");
        assert_eq!(ColumnType::from_header(&th), ColumnType::Sign);
        assert_eq!(ColumnType::Sign.width_range(), WidthRange::new(50, 80));
    }

    #[test]
    fn test_width_ranges() {
        assert_eq!(ColumnType::Select.width_range().clamp(40), 150);
        assert_eq!(ColumnType::Amount.width_range().clamp(400), 90);
        assert_eq!(ColumnType::Date.width_range().clamp(10), 80);
        assert_eq!(ColumnType::Default.width_range().clamp(120), 120);
    }

    #[test]
    fn test_hide_show_round_trip() {
        let th = Element::new("th").with_attr("data-name", "amount").with_text(" Sum ");
        let mut column = Column::from_header(2, &th);
        assert_eq!(column.label, "Sum");
        column.width = 87;

        column.hide();
        assert_eq!((column.visible, column.width), (false, 0));
        column.show(50);
        assert_eq!((column.visible, column.width), (true, 87));

        let mut fresh = Column::from_header(0, &th);
        fresh.hide();
        fresh.show(50);
        assert_eq!(fresh.width, 50);
    }
}
