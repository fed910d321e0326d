use std::path::Path;

use tracing::debug;

use super::records::{self, RecordValues};
use super::{IdRefs, ImportOptions, LoadError};
use crate::store::{Session, SqlValue};

/// CSV 列的含义
enum Column {
    /// `id` 列：外部 ID
    XmlId,
    /// `partner_id:id` / `partner_id/id`：引用另一条记录的外部 ID
    Reference(String),
    Plain(String),
}

impl Column {
    fn parse(header: &str) -> Self {
        let header = header.trim();
        if header == "id" {
            return Column::XmlId;
        }
        match header
            .strip_suffix(":id")
            .or_else(|| header.strip_suffix("/id"))
        {
            Some(field) => Column::Reference(field.to_string()),
            None => Column::Plain(header.to_string()),
        }
    }
}

/// 文件名（去掉 `.csv`）就是模型名，如 `data/res.partner.csv`
fn model_from_path(path: &str) -> Result<String, LoadError> {
    let stem = Path::new(path)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or_default();
    records::check_identifier(stem).map(str::to_string)
}

/// 把 CSV 内容导入到文件名对应的模型
pub fn import_csv(
    session: &mut dyn Session,
    module: &str,
    path: &str,
    content: &str,
    mut id_refs: Option<&mut IdRefs>,
    options: ImportOptions,
) -> Result<(), LoadError> {
    let model = model_from_path(path)?;
    let csv_error = |source: csv::Error| LoadError::Csv {
        path: path.to_string(),
        source,
    };

    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::Headers)
        .from_reader(content.as_bytes());
    let columns: Vec<Column> = reader
        .headers()
        .map_err(csv_error)?
        .iter()
        .map(Column::parse)
        .collect();

    let mut count = 0usize;
    for row in reader.records() {
        let row = row.map_err(csv_error)?;
        let mut record = RecordValues {
            model: model.clone(),
            xml_id: None,
            values: Vec::with_capacity(columns.len()),
        };

        for (column, cell) in columns.iter().zip(row.iter()) {
            match column {
                Column::XmlId => {
                    if !cell.is_empty() {
                        record.xml_id = Some(cell.to_string());
                    }
                }
                Column::Reference(field) => {
                    let value = if cell.is_empty() {
                        SqlValue::Null
                    } else {
                        SqlValue::Integer(records::resolve_xml_id(session, module, cell)?)
                    };
                    record.values.push((field.clone(), value));
                }
                Column::Plain(field) => {
                    let value = if cell.is_empty() {
                        SqlValue::Null
                    } else {
                        SqlValue::from(cell)
                    };
                    record.values.push((field.clone(), value));
                }
            }
        }

        records::write_record(session, module, &record, id_refs.as_deref_mut(), options)?;
        count += 1;
    }

    debug!("Imported {} {} record(s) from {}", count, model, path);
    Ok(())
}
