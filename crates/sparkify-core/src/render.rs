use unicode_width::UnicodeWidthStr;

use crate::validate::{ReportOutcome, TableCount};
use crate::warehouse::ResultTable;

const NULL_CELL: &str = "NULL";
/// Cells wider than this are cut with an ellipsis.
const MAX_CELL_WIDTH: usize = 60;

/// Render rows as an aligned plain-text table with a row-count footer.
pub fn render_table(table: &ResultTable) -> String {
    let header: Vec<String> = table.columns.iter().map(|c| clip(c)).collect();
    let body: Vec<Vec<String>> = table
        .rows
        .iter()
        .map(|row| {
            row.iter()
                .map(|cell| clip(cell.as_deref().unwrap_or(NULL_CELL)))
                .collect()
        })
        .collect();

    let columns = header
        .len()
        .max(body.iter().map(Vec::len).max().unwrap_or(0));
    let mut widths = vec![0usize; columns];
    for row in std::iter::once(&header).chain(body.iter()) {
        for (i, cell) in row.iter().enumerate() {
            widths[i] = widths[i].max(cell.width());
        }
    }

    let mut out = String::new();
    if !header.is_empty() {
        push_row(&mut out, &header, &widths);
        let rule: Vec<String> = widths.iter().map(|w| "-".repeat(*w)).collect();
        out.push_str(&rule.join("-+-"));
        out.push('\n');
    }
    for row in &body {
        push_row(&mut out, row, &widths);
    }
    let rows = table.rows.len();
    out.push_str(&format!("({rows} row{})\n", if rows == 1 { "" } else { "s" }));
    out
}

fn push_row(out: &mut String, row: &[String], widths: &[usize]) {
    let cells: Vec<String> = widths
        .iter()
        .enumerate()
        .map(|(i, width)| {
            let cell = row.get(i).map(String::as_str).unwrap_or("");
            let pad = width.saturating_sub(cell.width());
            format!("{cell}{}", " ".repeat(pad))
        })
        .collect();
    out.push_str(cells.join(" | ").trim_end());
    out.push('\n');
}

fn clip(cell: &str) -> String {
    if cell.width() <= MAX_CELL_WIDTH {
        return cell.to_string();
    }
    let mut clipped = String::new();
    let mut width = 0;
    for ch in cell.chars() {
        let w = unicode_width::UnicodeWidthChar::width(ch).unwrap_or(0);
        if width + w > MAX_CELL_WIDTH - 1 {
            break;
        }
        width += w;
        clipped.push(ch);
    }
    clipped.push('…');
    clipped
}

pub fn render_counts(counts: &[TableCount]) -> String {
    let table = ResultTable {
        columns: vec!["table".to_string(), "rows".to_string()],
        rows: counts
            .iter()
            .map(|c| vec![Some(c.table.to_string()), Some(c.count.to_string())])
            .collect(),
    };
    render_table(&table)
}

/// Title, then either the table or the error that replaced it.
pub fn render_outcome(outcome: &ReportOutcome) -> String {
    let mut out = format!("== {} ({})\n", outcome.title, outcome.name);
    match &outcome.result {
        Ok(table) => out.push_str(&render_table(table)),
        Err(e) => out.push_str(&format!("error: {e}\n")),
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aligns_columns_and_shows_nulls() {
        let table = ResultTable {
            columns: vec!["first_name".to_string(), "cnt".to_string()],
            rows: vec![
                vec![Some("Chloe".to_string()), Some("689".to_string())],
                vec![None, Some("7".to_string())],
            ],
        };
        let rendered = render_table(&table);
        let lines: Vec<&str> = rendered.lines().collect();
        assert_eq!(lines[0], "first_name | cnt");
        assert_eq!(lines[1], "-----------+----");
        assert_eq!(lines[2], "Chloe      | 689");
        assert_eq!(lines[3], "NULL       | 7");
        assert_eq!(lines[4], "(2 rows)");
    }

    #[test]
    fn long_cells_are_clipped() {
        let long = "x".repeat(200);
        let table = ResultTable {
            columns: vec!["user_agent".to_string()],
            rows: vec![vec![Some(long)]],
        };
        let rendered = render_table(&table);
        let row = rendered.lines().nth(2).expect("data row");
        assert_eq!(row.width(), MAX_CELL_WIDTH);
        assert!(row.ends_with('…'));
    }

    #[test]
    fn empty_result_still_has_footer() {
        let table = ResultTable {
            columns: vec!["song_id".to_string()],
            rows: vec![],
        };
        assert!(render_table(&table).ends_with("(0 rows)\n"));
    }
}
