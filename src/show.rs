//! Plain-text table rendering used by `DataFrame::show`.

use comfy_table::Table;

const NULL_TEXT: &str = "NULL";
const ELLIPSIS: &str = "...";
const COLUMN_PADDING: u16 = 2;

/// Dashed outer and header rules, `|` column separators, no lines between rows.
const PRESET: &str = "||------|    ------";

/// Renders column names and rows as a bordered text table.
///
/// ```text
/// -----------------
/// |"ID"  |"NAME"  |
/// -----------------
/// |1     |Ram     |
/// |2     |Hari    |
/// -----------------
/// ```
pub fn render(columns: &[String], rows: &[Vec<Option<String>>], max_width: usize) -> String {
    let mut table = Table::new();
    table.load_preset(PRESET);
    table.set_header(
        columns
            .iter()
            .map(|c| truncate(&format!("\"{}\"", c), max_width)),
    );
    for row in rows {
        table.add_row(
            row.iter()
                .map(|cell| truncate(cell.as_deref().unwrap_or(NULL_TEXT), max_width)),
        );
    }
    for column in table.column_iter_mut() {
        column.set_padding((0, COLUMN_PADDING));
    }
    format!("{}\n", table)
}

fn truncate(text: &str, max_width: usize) -> String {
    if text.chars().count() <= max_width {
        return text.to_string();
    }
    if max_width <= ELLIPSIS.len() {
        return text.chars().take(max_width).collect();
    }
    let mut cut: String = text.chars().take(max_width - ELLIPSIS.len()).collect();
    cut.push_str(ELLIPSIS);
    cut
}
