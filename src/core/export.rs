use super::types::{SimulationError, Table, TableRow};

pub const CSV_FILENAME: &str = "csi_profitability_results.csv";

pub fn to_csv(table: &Table) -> Result<String, SimulationError> {
    let mut writer = csv::WriterBuilder::new()
        .terminator(csv::Terminator::Any(b'\n'))
        .from_writer(Vec::new());
    writer.write_record(Table::COLUMNS)?;
    for row in &table.rows {
        writer.write_record([
            row.year.to_string(),
            row.service_customers.to_string(),
            row.repeat_purchases.to_string(),
            row.total_profit.to_string(),
        ])?;
    }
    let bytes = writer
        .into_inner()
        .map_err(|e| SimulationError::Export(e.into_error().into()))?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

/// Right-aligned text table, totals first, with thousands separators.
pub fn render_text(table: &Table) -> String {
    let cells: Vec<[String; 4]> = table.rows.iter().map(format_row).collect();
    let mut widths = Table::COLUMNS.map(str::len);
    for row in &cells {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(cell.len());
        }
    }

    let mut out = String::new();
    push_line(&mut out, &Table::COLUMNS.map(String::from), &widths);
    let rule: Vec<String> = widths.iter().map(|w| "-".repeat(*w)).collect();
    out.push_str(&rule.join("  "));
    out.push('\n');
    for row in &cells {
        push_line(&mut out, row, &widths);
    }
    out
}

fn format_row(row: &TableRow) -> [String; 4] {
    [
        row.year.to_string(),
        group_thousands(row.service_customers),
        group_thousands(row.repeat_purchases),
        group_thousands(row.total_profit),
    ]
}

fn push_line(out: &mut String, cells: &[String; 4], widths: &[usize; 4]) {
    let line: Vec<String> = cells
        .iter()
        .zip(widths)
        .map(|(cell, width)| format!("{cell:>width$}"))
        .collect();
    out.push_str(&line.join("  "));
    out.push('\n');
}

fn group_thousands(value: i64) -> String {
    let digits = value.unsigned_abs().to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3 + 1);
    if value < 0 {
        grouped.push('-');
    }
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    grouped
}
