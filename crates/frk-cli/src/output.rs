use frk_core::types::{Status, StatusRecord};
use serde::Serialize;

pub fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    println!("{}", json);
    Ok(())
}

// ---------------------------------------------------------------------------
// Table
// ---------------------------------------------------------------------------

/// Left-aligned text table; columns are as wide as their widest cell.
pub struct Table {
    headers: Vec<&'static str>,
    rows: Vec<Vec<String>>,
}

impl Table {
    pub fn new(headers: &[&'static str]) -> Self {
        Self {
            headers: headers.to_vec(),
            rows: Vec::new(),
        }
    }

    pub fn row(&mut self, cells: Vec<String>) -> &mut Self {
        self.rows.push(cells);
        self
    }

    pub fn render(&self) -> String {
        let widths: Vec<usize> = (0..self.headers.len())
            .map(|col| {
                self.rows
                    .iter()
                    .filter_map(|row| row.get(col))
                    .map(String::len)
                    .fold(self.headers[col].len(), usize::max)
            })
            .collect();

        let mut out = Vec::with_capacity(self.rows.len() + 2);
        out.push(pad_line(&widths, &self.headers));
        out.push(pad_line(&widths, widths.iter().map(|&w| "-".repeat(w))));
        for row in &self.rows {
            out.push(pad_line(&widths, row));
        }
        out.join("\n")
    }

    pub fn print(&self) {
        println!("{}", self.render());
    }
}

fn pad_line<I>(widths: &[usize], cells: I) -> String
where
    I: IntoIterator,
    I::Item: AsRef<str>,
{
    let padded: Vec<String> = cells
        .into_iter()
        .zip(widths)
        .map(|(cell, &width)| format!("{:width$}", cell.as_ref()))
        .collect();
    padded.join("  ").trim_end().to_string()
}

// ---------------------------------------------------------------------------
// Status records
// ---------------------------------------------------------------------------

pub fn print_records(records: &[StatusRecord]) {
    let mut table = Table::new(&["INSTANCE", "DATABASE", "SCRIPT", "STATUS", "DETAIL"]);
    for r in records {
        table.row(vec![
            r.sql_instance.clone(),
            r.database.clone(),
            r.name.clone(),
            r.status.to_string(),
            r.detail.clone().unwrap_or_default(),
        ]);
    }
    table.print();
}

/// One-line tally, e.g. `3 installed, 1 updated, 1 skipped, 0 failed`.
pub fn summary(records: &[StatusRecord]) -> String {
    let count = |status: Status| records.iter().filter(|r| r.status == status).count();
    format!(
        "{} installed, {} updated, {} skipped, {} failed",
        count(Status::Installed),
        count(Status::Updated),
        count(Status::Skipped),
        count(Status::Error),
    )
}
