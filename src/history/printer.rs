use super::model::HistoryFilter;
use super::storage::HistoryStorage;
use crate::Result;
use comfy_table::presets::UTF8_FULL;
use comfy_table::{Attribute, Cell, Color, Table};

/// 以表格形式打印最近的运行记录（最新的在前）
pub fn list_history(storage: &HistoryStorage, filter: &HistoryFilter, limit: usize) -> Result<()> {
    let records = storage.query(filter, limit)?;

    if records.is_empty() {
        println!("No matching runs recorded");
        return Ok(());
    }

    let mut table = Table::new();
    table.load_preset(UTF8_FULL).set_header(vec![
        "ID", "Time", "Selection", "Tests", "Errors", "Failed files", "Duration", "Report",
    ]);

    for record in &records {
        let errors = if record.is_success() {
            Cell::new(record.errors).fg(Color::Green)
        } else {
            Cell::new(record.errors).fg(Color::Red)
        };

        let failed = if record.failed_files.is_empty() {
            Cell::new("-").add_attribute(Attribute::Dim)
        } else {
            let lines: Vec<String> = record
                .failed_files
                .iter()
                .filter(|f| filter.module.as_ref().is_none_or(|m| &f.module == m))
                .map(|f| format!("{}/{} ({})", f.module, f.file, f.kind))
                .collect();
            Cell::new(lines.join("\n")).fg(Color::Red)
        };

        table.add_row(vec![
            Cell::new(record.id.get(..8).unwrap_or(&record.id)),
            Cell::new(record.timestamp.format("%Y-%m-%d %H:%M:%S")),
            Cell::new(&record.selection),
            Cell::new(record.tests),
            errors,
            failed,
            Cell::new(format!("{}ms", record.duration_ms)),
            Cell::new(record.report.as_deref().unwrap_or("-")).add_attribute(Attribute::Dim),
        ]);
    }

    println!("{}", table);
    Ok(())
}
