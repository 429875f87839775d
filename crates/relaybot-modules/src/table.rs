//! Plain-text table rendering for monospace command replies.

/// Render rows as a psql-style table:
///
/// ```text
/// +--------+---------+
/// | Module | Status  |
/// |--------+---------|
/// | core   | Enabled |
/// +--------+---------+
/// ```
pub fn render(headers: &[&str], rows: &[Vec<String>]) -> String {
    let mut widths: Vec<usize> = headers.iter().map(|h| h.len()).collect();
    for row in rows {
        for (i, cell) in row.iter().enumerate() {
            if i < widths.len() && cell.len() > widths[i] {
                widths[i] = cell.len();
            }
        }
    }

    let rule = |left: char, mid: char, right: char| {
        let mut line = String::new();
        line.push(left);
        for (i, width) in widths.iter().enumerate() {
            line.push_str(&"-".repeat(width + 2));
            line.push(if i + 1 == widths.len() { right } else { mid });
        }
        line
    };
    let render_row = |cells: &[String]| {
        let mut line = String::from("|");
        for (i, width) in widths.iter().enumerate() {
            let cell = cells.get(i).map(String::as_str).unwrap_or("");
            line.push_str(&format!(" {cell:<width$} |"));
        }
        line
    };

    let header_cells: Vec<String> = headers.iter().map(|h| h.to_string()).collect();
    let mut lines = vec![
        rule('+', '+', '+'),
        render_row(&header_cells),
        rule('|', '+', '|'),
    ];
    for row in rows {
        lines.push(render_row(row));
    }
    lines.push(rule('+', '+', '+'));
    lines.join("\n")
}
