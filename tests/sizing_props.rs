use ledger_grid::column::{Column, ColumnType, SortDirection};
use ledger_grid::config::GridConfig;
use ledger_grid::sizing::{ColumnSizeCalculator, ContainerMetrics, TableMetrics};
use proptest::prelude::*;

const KINDS: [ColumnType; 11] = [
    ColumnType::Select,
    ColumnType::Number,
    ColumnType::Amount,
    ColumnType::Percent,
    ColumnType::Boolean,
    ColumnType::Date,
    ColumnType::Checkbox,
    ColumnType::Icon,
    ColumnType::Fixed,
    ColumnType::Sign,
    ColumnType::Default,
];

fn build(spec: &[(usize, bool)]) -> Vec<Column> {
    spec.iter()
        .enumerate()
        .map(|(index, &(kind, visible))| Column {
            index,
            name: format!("c{}", index),
            label: String::new(),
            kind: KINDS[kind % KINDS.len()],
            visible,
            width: 0,
            saved_width: None,
            sort: SortDirection::None,
        })
        .collect()
}

fn layout() -> impl Strategy<Value = (Vec<Column>, Vec<u32>, u32)> {
    prop::collection::vec((0..KINDS.len(), any::<bool>()), 2..9)
        .prop_filter("two visible columns", |spec| spec.iter().filter(|(_, v)| *v).count() >= 2)
        .prop_flat_map(|spec| {
            let n = spec.len();
            (
                Just(build(&spec)),
                prop::collection::vec(0u32..300, n),
                100u32..2000,
            )
        })
}

/// Two to four visible columns in a narrow container whose usable width the
/// type ranges can reach exactly
fn narrow_layout() -> impl Strategy<Value = (Vec<Column>, Vec<u32>, u32)> {
    prop::collection::vec(0..KINDS.len(), 2..=4)
        .prop_flat_map(|kinds| {
            let spec: Vec<(usize, bool)> = kinds.iter().map(|&k| (k, true)).collect();
            let columns = build(&spec);
            let min: u32 = columns.iter().map(|c| c.kind.width_range().min).sum();
            let max: u32 = columns.iter().map(|c| c.kind.width_range().max).sum::<u32>().min(560);
            let n = columns.len();
            (
                Just(columns),
                prop::collection::vec(0u32..300, n),
                min..=max.max(min),
            )
        })
        .prop_filter("usable width fits a narrow container", |(_, _, usable)| *usable <= 560)
}

proptest! {
    #[test]
    fn test_widths_respect_visibility_and_ranges((columns, intrinsic, client) in layout()) {
        let config = GridConfig::default();
        let metrics = TableMetrics {
            container: ContainerMetrics::new(client, client),
            intrinsic_widths: intrinsic,
        };
        let widths = ColumnSizeCalculator::new(&columns, &config).calculate(&metrics, &[]);

        prop_assert_eq!(widths.len(), columns.len());
        for (column, &width) in columns.iter().zip(&widths) {
            if column.visible {
                let range = column.kind.width_range();
                prop_assert!(width >= range.min && width <= range.max, "{:?} got {}", column.kind, width);
            } else {
                prop_assert_eq!(width, 0);
            }
        }
    }

    #[test]
    fn test_fitting_minimums_never_overflow((columns, intrinsic, client) in layout()) {
        let config = GridConfig::default();
        let usable = client - 1;
        let minimums: u32 = columns
            .iter()
            .filter(|c| c.visible)
            .map(|c| c.kind.width_range().min)
            .sum();
        prop_assume!(minimums <= usable);

        let metrics = TableMetrics {
            container: ContainerMetrics::new(client, client),
            intrinsic_widths: intrinsic,
        };
        let widths = ColumnSizeCalculator::new(&columns, &config).calculate(&metrics, &[]);
        prop_assert!(widths.iter().sum::<u32>() <= usable);
    }

    #[test]
    fn test_prior_widths_win(prior in prop::collection::vec(0u32..500, 3), client in 0u32..2000) {
        let columns = build(&[(10, true), (2, true), (0, false)]);
        let config = GridConfig::default();
        let metrics = TableMetrics {
            container: ContainerMetrics::new(client, client),
            intrinsic_widths: vec![10, 10, 10],
        };
        prop_assert_eq!(ColumnSizeCalculator::new(&columns, &config).calculate(&metrics, &prior), prior);
    }

    #[test]
    fn test_narrow_container_is_filled_exactly((columns, intrinsic, usable) in narrow_layout()) {
        let config = GridConfig::default();
        let client = usable + 1;
        let metrics = TableMetrics {
            container: ContainerMetrics::new(client, client),
            intrinsic_widths: intrinsic,
        };
        let widths = ColumnSizeCalculator::new(&columns, &config).calculate(&metrics, &[]);

        prop_assert_eq!(widths.iter().sum::<u32>(), usable);
        for (column, &width) in columns.iter().zip(&widths) {
            let range = column.kind.width_range();
            prop_assert!(width >= range.min && width <= range.max, "{:?} got {}", column.kind, width);
        }
    }
}
