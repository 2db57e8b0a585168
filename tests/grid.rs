use ledger_grid::column::SortDirection;
use ledger_grid::dom::Element;
use ledger_grid::filter::FilterKind;
use ledger_grid::manager::{Patch, TableManager};
use ledger_grid::markup::class;
use ledger_grid::net::{RowPayload, TransferPayload};
use ledger_grid::sizing::ContainerMetrics;
use ledger_grid::summary::SummaryOptions;
use ledger_grid::testing::{data_row, sample_table, table_with, TestHost};
use ledger_grid::GridError;

fn cells(values: &[&str]) -> Vec<String> {
    values.iter().map(|v| v.to_string()).collect()
}

fn ledger() -> Element {
    table_with(
        "ledger",
        &[("client", "default"), ("amount", "amount")],
        &[
            cells(&["Acme", "1500"]),
            cells(&["Globex", "2000"]),
            cells(&["Initech", "-500"]),
        ],
    )
}

fn with_ledger(host: &TestHost) -> TableManager {
    let mut grid = host.manager();
    assert_eq!(grid.init(vec![ledger()]), vec!["ledger".to_string()]);
    grid.drain_patches();
    grid
}

fn row_ids(grid: &TableManager, table_id: &str) -> Vec<String> {
    grid.table(table_id)
        .unwrap()
        .element()
        .rows()
        .iter()
        .filter_map(|tr| tr.attr("data-id").map(str::to_string))
        .collect()
}

fn cell_text(row: &Element, index: usize) -> String {
    row.child(index).unwrap().text_content().trim().to_string()
}

fn payload(id: &str, html: &str) -> RowPayload {
    RowPayload {
        id: id.to_string(),
        html: html.to_string(),
    }
}

#[test]
fn test_narrow_container_shares_width_exactly() {
    let host = TestHost::new();
    host.measure.set_container(ContainerMetrics::new(401, 401));
    host.measure.set_intrinsic(100);
    let mut grid = host.manager();
    grid.init(vec![sample_table("narrow", 3)]);

    let widths = grid.table("narrow").unwrap().column_widths();
    assert_eq!(widths.iter().sum::<u32>(), 400);
    assert!(widths.iter().all(|&w| w >= 50));
}

#[test]
fn test_wide_container_keeps_clamped_widths() {
    let host = TestHost::new();
    let mut grid = host.manager();
    grid.init(vec![sample_table("wide", 2)]);

    let table = grid.table("wide").unwrap();
    assert_eq!(table.column_widths(), vec![100, 100]);
    assert_eq!(table.element().style("width"), Some("200px"));
}

#[test]
fn test_summary_is_idempotent() {
    let host = TestHost::new();
    let mut grid = with_ledger(&host);
    let columns = vec!["amount".to_string()];

    assert_eq!(
        grid.calculate_table_summary("ledger", &columns, &SummaryOptions::default()).unwrap(),
        1
    );
    assert_eq!(
        grid.calculate_table_summary("ledger", &columns, &SummaryOptions::default()).unwrap(),
        1
    );

    let table = grid.table("ledger").unwrap();
    let rows = table.element().rows();
    assert_eq!(rows.iter().filter(|tr| tr.is_summary_row()).count(), 1);
    let summary = rows.last().unwrap();
    assert!(summary.is_summary_row());
    assert_eq!(cell_text(summary, 1), "3 000,00 р.");
    assert!(summary.child(1).unwrap().has_class(class::TEXT_GREEN));
}

fn summary_text(grid: &TableManager) -> String {
    let table = grid.table("ledger").unwrap();
    let rows = table.element().rows();
    let summary = rows.last().unwrap();
    assert!(summary.is_summary_row());
    assert_eq!(rows.iter().filter(|tr| tr.is_summary_row()).count(), 1);
    cell_text(summary, 1)
}

#[test]
fn test_summary_follows_filters_and_row_changes() {
    let host = TestHost::new();
    let mut grid = with_ledger(&host);
    grid.calculate_table_summary("ledger", &["amount".to_string()], &SummaryOptions::default())
        .unwrap();
    assert_eq!(summary_text(&grid), "3 000,00 р.");

    grid.set_filter("ledger", 0, FilterKind::Text, "acme").unwrap();
    assert_eq!(summary_text(&grid), "1 500,00 р.");

    grid.clear_filter("ledger", 0).unwrap();
    assert_eq!(summary_text(&grid), "3 000,00 р.");

    assert!(grid.remove_row("ledger", "3").unwrap());
    assert_eq!(summary_text(&grid), "3 500,00 р.");
}

#[test]
fn test_summary_replays_its_options() {
    let host = TestHost::new();
    let mut grid = with_ledger(&host);
    let options = SummaryOptions {
        class_name: Some(class::TEXT_BLUE.to_string()),
        ids: Some(vec!["1".to_string(), "3".to_string()]),
        ..SummaryOptions::default()
    };
    grid.calculate_table_summary("ledger", &["amount".to_string()], &options)
        .unwrap();
    assert_eq!(summary_text(&grid), "1 000,00 р.");

    grid.set_filter("ledger", 0, FilterKind::Text, "init").unwrap();
    assert_eq!(summary_text(&grid), "-500,00 р.");
    let table = grid.table("ledger").unwrap();
    let summary = *table.element().rows().last().unwrap();
    assert!(summary.child(1).unwrap().has_class(class::TEXT_BLUE));
    assert!(!summary.child(1).unwrap().has_class(class::TEXT_RED));
}

#[test]
fn test_sort_keeps_summary_last() {
    let host = TestHost::new();
    let mut grid = with_ledger(&host);
    grid.calculate_table_summary("ledger", &["amount".to_string()], &SummaryOptions::default())
        .unwrap();

    grid.sort_table("ledger", 1, SortDirection::Desc).unwrap();
    let table = grid.table("ledger").unwrap();
    let rows = table.element().rows();
    assert_eq!(cell_text(rows[0], 0), "Globex");
    assert_eq!(cell_text(rows[2], 0), "Initech");
    assert!(rows[3].is_summary_row());
    assert!(table.element().header_cells()[1].has_class(class::SORTED_DESC));

    let patches = grid.drain_patches();
    assert!(patches.contains(&Patch::Columns("ledger".into())));
    assert!(patches.contains(&Patch::Body("ledger".into())));
}

#[test]
fn test_filters_combine_with_and() {
    let host = TestHost::new();
    let mut grid = with_ledger(&host);

    assert_eq!(grid.set_filter("ledger", 0, FilterKind::Text, "E").unwrap(), 3);
    assert_eq!(grid.set_filter("ledger", 1, FilterKind::Text, "2 000").unwrap(), 1);
    let visible: Vec<String> = grid
        .table("ledger")
        .unwrap()
        .element()
        .rows()
        .iter()
        .filter(|tr| tr.is_displayed())
        .map(|tr| cell_text(tr, 0))
        .collect();
    assert_eq!(visible, vec!["Globex"]);

    assert_eq!(grid.clear_filter("ledger", 1).unwrap(), 3);
    assert!(matches!(
        grid.set_filter("ledger", 5, FilterKind::Text, "x"),
        Err(GridError::ColumnOutOfRange { index: 5, count: 2 })
    ));
}

#[test]
fn test_layout_round_trips_through_store() {
    let host = TestHost::new();
    let mut grid = host.manager();
    grid.init(vec![sample_table("orders", 3)]);
    assert!(grid.toggle_column_visibility("orders", 1).unwrap());
    let widths = grid.table("orders").unwrap().column_widths();
    assert_eq!(widths, vec![100, 0, 100]);

    let saved = host.store.get("orders").unwrap();
    assert_eq!(saved.hidden, vec![false, true, false]);

    let mut reloaded = host.manager();
    reloaded.init(vec![sample_table("orders", 3)]);
    let table = reloaded.table("orders").unwrap();
    assert_eq!(table.column_widths(), widths);
    assert!(!table.columns()[1].visible);
    assert!(table.element().header_cells()[1].has_class(class::HIDDEN));
}

#[test]
fn test_update_table_keeps_widths_and_hidden_columns() {
    let host = TestHost::new();
    let mut grid = host.manager();
    grid.init(vec![sample_table("orders", 2)]);
    grid.toggle_column_visibility("orders", 0).unwrap();
    host.store.clear();

    host.parser
        .register("<tr>fresh</tr>", vec![data_row("9", &cells(&["a", "b"]))]);
    grid.update_table("orders", "<tr>fresh</tr>").unwrap();

    let table = grid.table("orders").unwrap();
    assert_eq!(table.column_widths(), vec![0, 100]);
    assert!(!table.columns()[0].visible);
    let rows = table.element().rows();
    assert_eq!(rows.len(), 1);
    assert!(rows[0].child(0).unwrap().has_class(class::HIDDEN));
    assert_eq!(grid.get_selected_row_id("orders").as_deref(), Some("9"));
}

#[test]
fn test_open_form_survives_body_refresh() {
    let host = TestHost::new();
    let mut grid = host.manager();
    grid.init(vec![sample_table("orders", 2)]);
    grid.create_form("order-form", "orders", None).unwrap();
    host.parser
        .register("<tr>fresh</tr>", vec![data_row("9", &cells(&["a", "b"]))]);
    grid.drain_patches();

    grid.update_table("orders", "<tr>fresh</tr>").unwrap();
    assert_eq!(grid.table("orders").unwrap().form().map(|f| f.id.as_str()), Some("order-form"));
    assert!(grid.drain_patches().contains(&Patch::Form("orders".into())));

    assert!(grid.hide_form("order-form", "orders").unwrap());
    assert!(grid.table("orders").unwrap().form().is_none());
}

#[test]
fn test_replace_entire_table_retags_and_reinitializes() {
    let host = TestHost::new();
    let mut grid = with_ledger(&host);
    let html = "<div class=\"table-container\"><table>...</table></div>";
    let wrapper = Element::new("div")
        .with_class(class::TABLE_CONTAINER)
        .with_child(sample_table("server-id", 2));
    host.parser.register(html, vec![wrapper]);

    let ids = cells(&["a", "b", "c"]);
    grid.replace_entire_table("balances-box", "balances", html, Some(&ids)).unwrap();

    assert!(grid.contains("balances"));
    assert_eq!(row_ids(&grid, "balances"), ids);
    let patches = grid.drain_patches();
    let container = patches.iter().position(|p| matches!(p, Patch::Container { id, .. } if id == "balances-box"));
    let table = patches.iter().position(|p| *p == Patch::Table("balances".into()));
    assert!(container.unwrap() < table.unwrap());
}

#[test]
fn test_replace_without_container_places_raw_markup() {
    let host = TestHost::new();
    let mut grid = with_ledger(&host);
    host.parser.register("<p>Нет данных</p>", vec![Element::new("p").with_text("Нет данных")]);

    grid.replace_entire_table("balances-box", "balances", "<p>Нет данных</p>", None)
        .unwrap();
    assert!(!grid.contains("balances"));
    assert_eq!(
        grid.drain_patches(),
        vec![Patch::Container {
            id: "balances-box".into(),
            html: "<p>Нет данных</p>".into(),
        }]
    );
}

#[test]
fn test_added_row_sits_before_summary_and_is_selected() {
    let host = TestHost::new();
    let mut grid = with_ledger(&host);
    grid.calculate_table_summary("ledger", &["amount".to_string()], &SummaryOptions::default())
        .unwrap();
    host.parser
        .register("<tr>new</tr>", vec![data_row("", &cells(&["Umbrella", "700"]))]);

    assert_eq!(grid.add_table_row("ledger", &payload("77", "<tr>new</tr>")).unwrap(), "77");

    let table = grid.table("ledger").unwrap();
    let rows = table.element().rows();
    assert_eq!(rows.len(), 5);
    assert_eq!(rows[3].attr("data-id"), Some("77"));
    assert_eq!(cell_text(rows[3], 1), "700,00 р.");
    assert!(rows[4].is_summary_row());
    assert_eq!(grid.get_selected_row_id("ledger").as_deref(), Some("77"));
    assert!(grid.drain_patches().contains(&Patch::Reveal {
        table_id: "ledger".into(),
        row_id: "77".into(),
    }));
}

#[test]
fn test_update_row_replaces_in_place() {
    let host = TestHost::new();
    let mut grid = with_ledger(&host);
    host.parser
        .register("<tr>edit</tr>", vec![data_row("", &cells(&["Globex Corp", "2500"]))]);

    grid.update_table_row("ledger", &payload("2", "<tr>edit</tr>")).unwrap();
    let rows = grid.table("ledger").unwrap().element().rows();
    assert_eq!(rows.len(), 3);
    assert_eq!(cell_text(rows[1], 0), "Globex Corp");
    assert_eq!(rows[1].attr("data-id"), Some("2"));

    assert_eq!(
        grid.update_table_row("ledger", &payload("404", "<tr>edit</tr>")),
        Err(GridError::RowNotFound("404".into()))
    );
}

#[test]
fn test_transfer_upsert_updates_and_adds() {
    let host = TestHost::new();
    let mut grid = with_ledger(&host);
    host.parser
        .register("<tr>out</tr>", vec![data_row("", &cells(&["Acme", "-300"]))]);
    host.parser
        .register("<tr>in</tr>", vec![data_row("", &cells(&["Hooli", "300"]))]);

    let transfer = TransferPayload {
        outgoing_transaction: payload("1", "<tr>out</tr>"),
        incoming_transaction: payload("50", "<tr>in</tr>"),
    };
    grid.upsert_transfer("ledger", &transfer).unwrap();

    assert_eq!(row_ids(&grid, "ledger"), cells(&["1", "2", "3", "50"]));
    let rows = grid.table("ledger").unwrap().element().rows();
    assert_eq!(cell_text(rows[0], 1), "-300,00 р.");
    assert_eq!(grid.get_selected_row_id("ledger").as_deref(), Some("50"));
}

#[test]
fn test_remove_row_reselects_first() {
    let host = TestHost::new();
    let mut grid = with_ledger(&host);
    assert!(grid.select_cell("ledger", 2, 1).unwrap());

    assert!(grid.remove_row("ledger", "1").unwrap());
    assert_eq!(row_ids(&grid, "ledger"), cells(&["2", "3"]));
    assert_eq!(grid.get_selected_row_id("ledger").as_deref(), Some("2"));
    assert!(!grid.remove_row("ledger", "1").unwrap());
}

#[test]
fn test_destroyed_table_rejects_operations() {
    let host = TestHost::new();
    let mut grid = with_ledger(&host);
    assert!(grid.destroy_table("ledger").is_some());
    assert!(grid.is_empty());
    assert_eq!(
        grid.sort_table("ledger", 0, SortDirection::Asc),
        Err(GridError::TableNotFound("ledger".into()))
    );
}
