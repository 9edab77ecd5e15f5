//! Terminal tables for run summaries, rendered with `prettytable`.
//!
//! ```text
//! ┌──────────────────┬──────────┐
//! │ Sites processed  │ 3        │
//! │ Rows collected   │ 47       │
//! └──────────────────┴──────────┘
//! ```

use once_cell::sync::Lazy;
use prettytable::format::{FormatBuilder, LinePosition, LineSeparator, TableFormat};
use prettytable::{Cell, Row, Table};

static TABLE_FORMAT: Lazy<TableFormat> = Lazy::new(|| {
    FormatBuilder::new()
        .column_separator('│')
        .borders('│')
        .separators(&[LinePosition::Top], LineSeparator::new('─', '┬', '┌', '┐'))
        .separators(
            &[LinePosition::Title],
            LineSeparator::new('─', '┼', '├', '┤'),
        )
        .separators(
            &[LinePosition::Bottom],
            LineSeparator::new('─', '┴', '└', '┘'),
        )
        .padding(1, 1)
        .build()
});

#[derive(Debug, Clone, PartialEq)]
pub struct Entry {
    pub label: &'static str,
    pub value: String,
}

impl Entry {
    pub fn new(label: &'static str, value: impl Into<String>) -> Self {
        Entry {
            label,
            value: value.into(),
        }
    }
}

/// Labelled values shown as a two-column table.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Metrics(pub Vec<Entry>);

impl Metrics {
    pub fn build_table(&self) -> String {
        let mut table = Table::new();
        table.set_format(*TABLE_FORMAT);
        for entry in &self.0 {
            table.add_row(Row::new(vec![
                Cell::new(entry.label),
                Cell::new(&entry.value),
            ]));
        }
        table.to_string()
    }
}

/// A table with a header row, used for per-month listings.
pub fn build_grid(header: &[&str], rows: &[Vec<String>]) -> String {
    let mut table = Table::new();
    table.set_format(*TABLE_FORMAT);
    table.set_titles(Row::new(header.iter().map(|h| Cell::new(h)).collect()));
    for row in rows {
        table.add_row(Row::new(row.iter().map(|v| Cell::new(v)).collect()));
    }
    table.to_string()
}
