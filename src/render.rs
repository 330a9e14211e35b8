// src/render.rs
// Plain-text rendering for inline results

use crate::backend::Row;

/// Widest a single cell may render before it is cut
const MAX_CELL_WIDTH: usize = 40;

/// Render rows as an aligned text table. `truncated` adds a trailing note.
pub fn render_table(columns: &[String], rows: &[Row], truncated: bool) -> String {
    if columns.is_empty() {
        return "(no columns)".to_string();
    }

    let cells: Vec<Vec<String>> = rows
        .iter()
        .map(|row| row.iter().map(|v| cell(&v.to_string())).collect())
        .collect();

    let mut widths: Vec<usize> = columns.iter().map(|c| cell(c).chars().count()).collect();
    for row in &cells {
        for (i, value) in row.iter().enumerate() {
            if let Some(w) = widths.get_mut(i) {
                *w = (*w).max(value.chars().count());
            }
        }
    }

    let format_line = |values: &[String]| -> String {
        values
            .iter()
            .zip(widths.iter())
            .map(|(v, w)| format!("{:<width$}", v, width = *w))
            .collect::<Vec<_>>()
            .join(" | ")
            .trim_end()
            .to_string()
    };

    let header: Vec<String> = columns.iter().map(|c| cell(c)).collect();
    let mut lines = vec![format_line(&header[..])];
    lines.push(
        widths
            .iter()
            .map(|w| "-".repeat(*w))
            .collect::<Vec<_>>()
            .join("-+-"),
    );
    for row in &cells {
        lines.push(format_line(&row[..]));
    }

    let noun = if rows.len() == 1 { "row" } else { "rows" };
    if truncated {
        lines.push(format!("({} {} shown, more available)", rows.len(), noun));
    } else {
        lines.push(format!("({} {})", rows.len(), noun));
    }
    lines.join("\n")
}

fn cell(value: &str) -> String {
    let flat = value.replace(['\n', '\r'], " ");
    if flat.chars().count() > MAX_CELL_WIDTH {
        let cut: String = flat.chars().take(MAX_CELL_WIDTH - 3).collect();
        format!("{}...", cut)
    } else {
        flat
    }
}
