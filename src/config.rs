//! Engine configuration passed in from the page

use serde::{Deserialize, Serialize};

/// Tunables for layout, formatting and persistence.
///
/// Every field has a default so the page may pass a partial object (or none).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct GridConfig {
    /// Floor for any visible column, in pixels
    pub min_column_width: u32,
    /// Usable container width at or below which the narrow shrink applies
    pub narrow_container_width: u32,
    /// Maximum visible columns for the narrow shrink to apply
    pub narrow_max_columns: usize,
    /// Pixels kept free when a single column fills the container
    pub mobile_gutter: u32,
    /// Suffix appended to formatted amounts
    pub currency_suffix: String,
    /// Percent column whose non-zero values get the "changed" highlight
    pub highlight_percent_column: Option<String>,
    pub layout_cookie_prefix: String,
    pub layout_expiry_days: u32,
    pub dropdown_template_url: String,
    pub log_level: String,
}

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            min_column_width: 50,
            narrow_container_width: 560,
            narrow_max_columns: 4,
            mobile_gutter: 3,
            currency_suffix: " р.".to_string(),
            highlight_percent_column: Some("bonus_percentage".to_string()),
            layout_cookie_prefix: "table_widths_".to_string(),
            layout_expiry_days: 365,
            dropdown_template_url: "/components/table-dropdown/".to_string(),
            log_level: "info".to_string(),
        }
    }
}

impl GridConfig {
    pub fn from_json(json: &str) -> Result<Self, crate::GridError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn log_level(&self) -> log::LevelFilter {
        self.log_level.parse().unwrap_or(log::LevelFilter::Info)
    }
}
