//! Print every book's catalog and check its link invariants
//!
//! Usage: `catalog-inspect [DB_PATH]`
//!
//! Without an argument the database path comes from `INKDESK_DB_PATH` (or
//! the default). Exits non-zero if any book fails projection or the
//! invariant check.

use anyhow::Result;
use inkdesk_core::config::CatalogConfig;
use inkdesk_core::logging::init_tracing;
use inkdesk_core::services::CatalogService;
use inkdesk_core::tree::ProjectedNode;

fn render_row(row: &ProjectedNode) -> String {
    let marker = match (row.node.is_folder(), row.has_children()) {
        (true, _) => "+",
        (false, true) => "*",
        (false, false) => "-",
    };
    format!(
        "{}{} {}  [{}]",
        "  ".repeat(row.level + 1),
        marker,
        row.node.title,
        row.id()
    )
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let mut config = CatalogConfig::from_env().map_err(anyhow::Error::msg)?;
    if let Some(path) = std::env::args().nth(1) {
        config.db_path = path.into();
    }
    tracing::info!("inspecting {}", config.db_path.display());

    let service = CatalogService::open(config).await?;
    let books = service.list_books().await?;
    if books.is_empty() {
        println!("no books");
        return Ok(());
    }

    let mut problems = 0usize;
    for book in &books {
        println!("{} ({})", book.title, book.id);
        match service.catalog(&book.id).await {
            Ok(rows) if rows.is_empty() => println!("  (empty)"),
            Ok(rows) => {
                for row in &rows {
                    println!("{}", render_row(row));
                }
            }
            Err(err) => {
                problems += 1;
                println!("  projection failed: {}", err);
            }
        }
        if let Err(err) = service.check_integrity(&book.id).await {
            problems += 1;
            println!("  integrity check failed: {}", err);
        }
    }

    if problems > 0 {
        anyhow::bail!("{} problem(s) found across {} book(s)", problems, books.len());
    }
    Ok(())
}
