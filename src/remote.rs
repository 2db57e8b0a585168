//! Operations that wait on the server
//!
//! Each takes the shared registry, borrows it only between awaits and looks
//! its table up again once the reply is in. A table that disappeared in the
//! meantime drops the operation with a warning.

use crate::dropdown::{MenuAction, Rect};
use crate::error::GridError;
use crate::form::{ColumnOption, PendingOptions};
use crate::manager::TableManager;
use crate::net::{DeleteReply, HttpResponse, Notice, PageContext, TablePage, TableReplace};
use crate::summary::SummaryOptions;
use futures::FutureExt;
use std::cell::RefCell;

const DELETE_FAILED: &str = "Form submission failed";

async fn fetch(grid: &RefCell<TableManager>, url: &str) -> Result<HttpResponse, GridError> {
    let transport = grid.borrow().services().transport.clone();
    let response = transport.get(url).await?;
    if response.ok() {
        Ok(response)
    } else {
        Err(response.error("request failed"))
    }
}

fn still_registered(grid: &TableManager, table_id: &str) -> bool {
    let present = grid.contains(table_id);
    if !present {
        log::warn!("table {:?} is gone; dropping the server reply", table_id);
    }
    present
}

fn notify_error(grid: &TableManager, error: &GridError) {
    let message = match error {
        GridError::Http { message, .. } => message.clone(),
        other => other.to_string(),
    };
    grid.services().notifier.notify(Notice::error(message));
}

/// Empty the table body after a failed load and let the page know
fn fall_back_to_empty(grid: &mut TableManager, table_id: &str, summary_columns: &[String], error: &GridError) {
    log::error!("loading {:?} failed: {}", table_id, error);
    if let Err(e) = grid.clear_body(table_id) {
        log::error!("cannot clear {:?}: {}", table_id, e);
    }
    if !summary_columns.is_empty() {
        if let Err(e) = grid.calculate_table_summary(table_id, summary_columns, &SummaryOptions::default()) {
            log::warn!("summary for {:?} not rebuilt: {}", table_id, e);
        }
    }
    notify_error(grid, error);
}

/// Reload a table body from `url`, which answers with the rows' markup
pub async fn refresh(grid: &RefCell<TableManager>, url: &str, table_id: &str) -> Result<(), GridError> {
    let result = fetch(grid, url).await;

    let mut grid = grid.borrow_mut();
    if !still_registered(&grid, table_id) {
        return Ok(());
    }
    match result {
        Ok(response) => grid.update_table(table_id, &response.body),
        Err(e) => {
            fall_back_to_empty(&mut grid, table_id, &[], &e);
            Err(e)
        }
    }
}

/// Load one page of a paginated table. Rows are tagged with the ids from the
/// page context when the counts agree and the summary is rebuilt. Returns the
/// page context, or `None` when the table went away meanwhile.
pub async fn load_page(
    grid: &RefCell<TableManager>,
    url: &str,
    table_id: &str,
    summary_columns: &[String],
) -> Result<Option<PageContext>, GridError> {
    let result = match fetch(grid, url).await {
        Ok(response) => response.json::<TablePage>(),
        Err(e) => Err(e),
    };

    let mut grid = grid.borrow_mut();
    if !still_registered(&grid, table_id) {
        return Ok(None);
    }
    match result {
        Ok(page) => {
            grid.update_table(table_id, &page.html)?;
            match page.context.row_ids() {
                Some(ids) => {
                    grid.tag_rows(table_id, &ids)?;
                }
                None => log::warn!("page for {:?} carries no record ids", table_id),
            }
            if !summary_columns.is_empty() {
                grid.calculate_table_summary(table_id, summary_columns, &SummaryOptions::default())?;
            }
            log::debug!(
                "table {:?} on page {} of {}",
                table_id,
                page.context.current_page,
                page.context.total_pages
            );
            Ok(Some(page.context))
        }
        Err(e) => {
            fall_back_to_empty(&mut grid, table_id, summary_columns, &e);
            Err(e)
        }
    }
}

/// Fetch `{html, ids}` and swap the whole table inside `container_id`
pub async fn reload_entire_table(
    grid: &RefCell<TableManager>,
    url: &str,
    container_id: &str,
    table_id: &str,
) -> Result<(), GridError> {
    let result = match fetch(grid, url).await {
        Ok(response) => response.json::<TableReplace>(),
        Err(e) => Err(e),
    };
    let mut grid = grid.borrow_mut();
    match result {
        Ok(reply) => {
            let ids = reply.row_ids();
            let ids = (!ids.is_empty()).then_some(ids.as_slice());
            grid.replace_entire_table(container_id, table_id, &reply.html, ids)
        }
        Err(e) => {
            log::error!("reloading {:?} failed: {}", table_id, e);
            notify_error(&grid, &e);
            Err(e)
        }
    }
}

/// `DELETE {url}{id}/`. On success the row is removed, the first remaining
/// row selected and the parsed reply returned so callers can drop related rows.
pub async fn send_delete_request(
    grid: &RefCell<TableManager>,
    url: &str,
    id: &str,
    table_id: &str,
) -> Result<DeleteReply, GridError> {
    let transport = grid.borrow().services().transport.clone();
    let result = match transport.delete(&format!("{}{}/", url, id)).await {
        Ok(response) if response.ok() => Ok(response),
        Ok(response) => Err(response.error(DELETE_FAILED)),
        Err(e) => Err(e),
    };

    let mut grid = grid.borrow_mut();
    let response = match result {
        Ok(response) => response,
        Err(e) => {
            log::error!("delete request failed: {}", e);
            notify_error(&grid, &e);
            return Err(e);
        }
    };

    if still_registered(&grid, table_id) && grid.remove_row(table_id, id)? {
        grid.services().notifier.notify(Notice::success());
    }
    if response.body.trim().is_empty() {
        return Ok(DeleteReply::default());
    }
    Ok(response.json::<DeleteReply>().unwrap_or_else(|e| {
        log::warn!("unreadable delete reply for {}: {}", id, e);
        DeleteReply::default()
    }))
}

/// Fetch the column menu template once; later calls reuse the cached copy.
/// Callers arriving while the request is out wait on that same request.
pub async fn ensure_dropdown_template(grid: &RefCell<TableManager>) -> Result<(), GridError> {
    let request = {
        let grid = grid.borrow();
        let templates = grid.templates();
        if templates.is_loaded() {
            return Ok(());
        }
        match templates.in_flight() {
            Some(request) => request,
            None => {
                let transport = grid.services().transport.clone();
                let url = grid.config().dropdown_template_url.clone();
                let request = async move {
                    let response = transport.get(&url).await?;
                    if response.ok() {
                        Ok(response.body)
                    } else {
                        Err(response.error("request failed"))
                    }
                }
                .boxed_local()
                .shared();
                templates.begin(request.clone());
                request
            }
        }
    };
    let result = request.await;
    grid.borrow().templates().finish(&result);
    result.map(|_| ())
}

/// Toggle a column's menu. The template is fetched first so the hide
/// submenu can open right away; a failed fetch still opens the menu.
pub async fn open_column_menu(
    grid: &RefCell<TableManager>,
    table_id: &str,
    column: usize,
    anchor: Rect,
) -> Result<bool, GridError> {
    if let Err(e) = ensure_dropdown_template(grid).await {
        log::warn!("column menu template unavailable: {}", e);
    }
    grid.borrow_mut().toggle_dropdown(table_id, column, anchor)
}

/// Reveal the per-column visibility checkboxes next to the hovered item
pub async fn show_hide_submenu(grid: &RefCell<TableManager>, table_id: &str, item: Rect) -> Result<bool, GridError> {
    if let Err(e) = ensure_dropdown_template(grid).await {
        log::warn!("column menu template unavailable: {}", e);
    }
    let mut grid = grid.borrow_mut();
    if !still_registered(&grid, table_id) {
        return Ok(false);
    }
    grid.show_submenu(table_id, MenuAction::Hide, item)
}

/// Fill each select filter from its option endpoint. Returns how many were
/// filled; failures are logged and skipped.
pub async fn load_filter_options(
    grid: &RefCell<TableManager>,
    table_id: &str,
    pending: Vec<PendingOptions>,
) -> usize {
    let mut filled = 0;
    for request in pending {
        let options = match fetch(grid, &request.url).await {
            Ok(response) => response.json::<Vec<ColumnOption>>(),
            Err(e) => Err(e),
        };
        let options = match options {
            Ok(options) => options,
            Err(e) => {
                log::error!("options for column {} of {:?}: {}", request.column, table_id, e);
                continue;
            }
        };

        let mut grid = grid.borrow_mut();
        if !still_registered(&grid, table_id) {
            break;
        }
        match grid.fill_filter_options(table_id, request.column, &options) {
            Ok(true) => filled += 1,
            Ok(false) => log::warn!("no select filter on column {} of {:?}", request.column, table_id),
            Err(e) => log::error!("{}", e),
        }
    }
    filled
}
