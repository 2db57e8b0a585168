//! Initial column width calculation
//!
//! Widths start from each `<col>`'s intrinsic width (doubled) clamped into the
//! column type's range. Narrow containers share their width out exactly; wider
//! tables that still overflow are shrunk proportionally. Both passes finish
//! with the same pixel-by-pixel [`redistribute`] routine.

use crate::column::{Column, WidthRange};
use crate::config::GridConfig;
use crate::dom::Element;
use serde::{Deserialize, Serialize};

/// Geometry of the element wrapping a table
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContainerMetrics {
    pub client_width: u32,
    pub offset_width: u32,
}

impl ContainerMetrics {
    pub fn new(client_width: u32, offset_width: u32) -> Self {
        Self { client_width, offset_width }
    }

    /// Width the visible columns may occupy
    pub fn usable_width(&self) -> u32 {
        self.client_width.saturating_sub(1)
    }

    pub fn scrollbar_width(&self) -> u32 {
        self.offset_width.saturating_sub(self.client_width)
    }
}

/// Everything the calculator reads from the rendered page
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableMetrics {
    pub container: ContainerMetrics,
    /// Rendered width of each `<col>`, aligned with the header cells
    pub intrinsic_widths: Vec<u32>,
}

/// Measures a table as it would render on the page
pub trait Measure {
    fn measure(&self, table_id: &str, table: &Element) -> TableMetrics;
}

pub struct ColumnSizeCalculator<'a> {
    columns: &'a [Column],
    config: &'a GridConfig,
}

impl<'a> ColumnSizeCalculator<'a> {
    pub fn new(columns: &'a [Column], config: &'a GridConfig) -> Self {
        Self { columns, config }
    }

    /// Widths aligned with header order. `prior` widths are reused verbatim
    /// when present; hidden columns always get 0 on the computed path.
    pub fn calculate(&self, metrics: &TableMetrics, prior: &[u32]) -> Vec<u32> {
        if !prior.is_empty() {
            return prior.to_vec();
        }

        let visible: Vec<usize> = self.columns.iter().filter(|c| c.visible).map(|c| c.index).collect();
        let mut widths = vec![0u32; self.columns.len()];

        if let [only] = visible.as_slice() {
            widths[*only] = self.mobile_width(&metrics.container);
            return widths;
        }

        for &idx in &visible {
            let intrinsic = metrics.intrinsic_widths.get(idx).copied().unwrap_or(0);
            widths[idx] = self.range(idx).clamp(intrinsic.saturating_mul(2));
        }

        let available = metrics.container.usable_width();
        if metrics.container.client_width == 0 {
            log::debug!("container not laid out; keeping clamped widths {:?}", widths);
            return widths;
        }
        if available <= self.config.narrow_container_width && visible.len() <= self.config.narrow_max_columns {
            self.shrink_narrow(&mut widths, &visible, available);
        }

        let total = sum(&widths);
        if total > u64::from(available) && total > 0 {
            self.shrink_overflow(&mut widths, &visible, available);
        }

        log::debug!("computed column widths {:?} for usable width {}", widths, available);
        widths
    }

    fn range(&self, idx: usize) -> WidthRange {
        self.columns[idx].kind.width_range()
    }

    fn ranges(&self) -> Vec<WidthRange> {
        self.columns.iter().map(|c| c.kind.width_range()).collect()
    }

    /// A lone visible column fills the container minus scrollbar and gutter
    fn mobile_width(&self, container: &ContainerMetrics) -> u32 {
        container
            .offset_width
            .saturating_sub(container.scrollbar_width())
            .saturating_sub(self.config.mobile_gutter)
            .max(self.config.min_column_width)
    }

    /// Flexible columns are scaled so the visible total lands on `target`.
    /// Fixed-type columns keep their width unless the flexible ones run out
    /// of range before the remainder is placed.
    fn shrink_narrow(&self, widths: &mut [u32], visible: &[usize], target: u32) {
        let (fixed, flexible): (Vec<usize>, Vec<usize>) = visible
            .iter()
            .partition(|&&idx| self.columns[idx].kind.is_fixed_width());

        let flex_total: u64 = flexible.iter().map(|&i| u64::from(widths[i])).sum();
        if flex_total > 0 {
            let fixed_total: u64 = fixed.iter().map(|&i| u64::from(widths[i])).sum();
            let remaining = u64::from(target).saturating_sub(fixed_total);
            let scale = remaining as f64 / flex_total as f64;
            for &idx in &flexible {
                widths[idx] = self.range(idx).clamp(scaled(widths[idx], scale));
            }
        }

        let ranges = self.ranges();
        let diff = i64::from(target) - sum(widths) as i64;
        let residual = redistribute(widths, &flexible, &ranges, diff);
        let residual = redistribute(widths, &fixed, &ranges, residual);
        if residual != 0 {
            log::debug!("narrow shrink left {}px unallocated", residual);
        }
    }

    /// Proportional shrink of every visible column. When the type minimums
    /// already exceed `target` the table is allowed to overflow.
    fn shrink_overflow(&self, widths: &mut [u32], visible: &[usize], target: u32) {
        let total = sum(widths);
        let ratio = f64::from(target) / total as f64;
        for &idx in visible {
            widths[idx] = self.range(idx).clamp(scaled(widths[idx], ratio));
        }

        let diff = i64::from(target) - sum(widths) as i64;
        let residual = redistribute(widths, visible, &self.ranges(), diff);
        if residual < 0 {
            log::debug!("columns overflow their container by {}px at minimum widths", -residual);
        }
    }
}

fn sum(widths: &[u32]) -> u64 {
    widths.iter().map(|&w| u64::from(w)).sum()
}

fn scaled(width: u32, factor: f64) -> u32 {
    (f64::from(width) * factor).floor().max(0.0) as u32
}

/// Moves `diff` pixels onto (positive) or off (negative) the candidate
/// columns one pixel at a time, round robin, never leaving a column's range.
/// A column that cannot move further leaves the rotation. Returns the part of
/// `diff` that could not be placed.
pub fn redistribute(widths: &mut [u32], candidates: &[usize], ranges: &[WidthRange], mut diff: i64) -> i64 {
    let mut pool: Vec<usize> = candidates.to_vec();
    let mut cursor = 0;

    while diff != 0 && !pool.is_empty() {
        cursor %= pool.len();
        let idx = pool[cursor];
        let range = ranges[idx];

        if diff > 0 && widths[idx] < range.max {
            widths[idx] += 1;
            diff -= 1;
            cursor += 1;
        } else if diff < 0 && widths[idx] > range.min {
            widths[idx] -= 1;
            diff += 1;
            cursor += 1;
        } else {
            pool.remove(cursor);
        }
    }

    diff
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::column::ColumnType;

    fn columns(kinds: &[(ColumnType, bool)]) -> Vec<Column> {
        kinds
            .iter()
            .enumerate()
            .map(|(index, &(kind, visible))| Column {
                index,
                name: format!("c{}", index),
                label: String::new(),
                kind,
                visible,
                width: 0,
                saved_width: None,
                sort: Default::default(),
            })
            .collect()
    }

    fn metrics(client: u32, intrinsic: &[u32]) -> TableMetrics {
        TableMetrics {
            container: ContainerMetrics::new(client, client),
            intrinsic_widths: intrinsic.to_vec(),
        }
    }

    #[test]
    fn test_prior_widths_are_reused() {
        let cols = columns(&[(ColumnType::Default, true), (ColumnType::Amount, true)]);
        let config = GridConfig::default();
        let widths = ColumnSizeCalculator::new(&cols, &config).calculate(&metrics(1000, &[10, 10]), &[120, 77]);
        assert_eq!(widths, vec![120, 77]);
    }

    #[test]
    fn test_wide_container_clamps_by_type() {
        let cols = columns(&[
            (ColumnType::Select, true),
            (ColumnType::Amount, true),
            (ColumnType::Date, true),
            (ColumnType::Default, false),
            (ColumnType::Default, true),
            (ColumnType::Percent, true),
        ]);
        let config = GridConfig::default();
        let widths =
            ColumnSizeCalculator::new(&cols, &config).calculate(&metrics(2000, &[40, 100, 30, 60, 60, 10]), &[]);
        assert_eq!(widths, vec![150, 90, 80, 0, 120, 50]);
    }

    #[test]
    fn test_unlaid_container_only_clamps() {
        let cols = columns(&[(ColumnType::Default, true), (ColumnType::Amount, true)]);
        let config = GridConfig::default();
        let widths = ColumnSizeCalculator::new(&cols, &config).calculate(&metrics(0, &[60, 100]), &[]);
        assert_eq!(widths, vec![120, 90]);
    }

    #[test]
    fn test_single_visible_column_fills_container() {
        let cols = columns(&[(ColumnType::Default, false), (ColumnType::Amount, true)]);
        let config = GridConfig::default();
        let m = TableMetrics {
            container: ContainerMetrics::new(383, 400),
            intrinsic_widths: vec![50, 50],
        };
        let widths = ColumnSizeCalculator::new(&cols, &config).calculate(&m, &[]);
        assert_eq!(widths, vec![0, 380]);
    }

    #[test]
    fn test_narrow_container_sums_exactly() {
        let cols = columns(&[
            (ColumnType::Checkbox, true),
            (ColumnType::Default, true),
            (ColumnType::Select, true),
        ]);
        let config = GridConfig::default();
        let m = metrics(401, &[30, 90, 80]);
        let widths = ColumnSizeCalculator::new(&cols, &config).calculate(&m, &[]);

        assert_eq!(widths.iter().sum::<u32>(), 400);
        assert_eq!(widths[0], 60);
        assert!((150..=200).contains(&widths[2]));
        assert!((50..=200).contains(&widths[1]));
    }

    #[test]
    fn test_narrow_fixed_columns_take_the_remainder() {
        let cols = columns(&[(ColumnType::Checkbox, true), (ColumnType::Date, true)]);
        let config = GridConfig::default();
        let widths = ColumnSizeCalculator::new(&cols, &config).calculate(&metrics(171, &[10, 40]), &[]);
        assert_eq!(widths, vec![90, 80]);
    }

    #[test]
    fn test_overflow_shrinks_to_available() {
        let cols: Vec<Column> = columns(&[(ColumnType::Default, true); 6]);
        let config = GridConfig::default();
        let m = metrics(901, &[100; 6]);
        let widths = ColumnSizeCalculator::new(&cols, &config).calculate(&m, &[]);
        assert_eq!(widths.iter().sum::<u32>(), 900);
        assert!(widths.iter().all(|&w| (50..=200).contains(&w)));
    }

    #[test]
    fn test_overflow_stops_at_minimums() {
        let cols: Vec<Column> = columns(&[(ColumnType::Select, true); 6]);
        let config = GridConfig::default();
        let m = metrics(601, &[100; 6]);
        let widths = ColumnSizeCalculator::new(&cols, &config).calculate(&m, &[]);
        assert_eq!(widths, vec![150; 6]);
    }

    #[test]
    fn test_redistribute_round_robin_and_residual() {
        let ranges = vec![WidthRange::new(50, 52), WidthRange::new(50, 200)];
        let mut widths = vec![50, 50];
        let residual = redistribute(&mut widths, &[0, 1], &ranges, 6);
        assert_eq!(residual, 0);
        assert_eq!(widths, vec![52, 54]);

        let mut widths = vec![51, 50];
        let residual = redistribute(&mut widths, &[0, 1], &ranges, -3);
        assert_eq!(residual, -2);
        assert_eq!(widths, vec![50, 50]);
    }
}
