//! 基于外部 ID 的记录写入，供 CSV / YAML / XML 导入共用。
//!
//! 模型名 `res.partner` 对应表 `res_partner`，表必须有 `id INTEGER PRIMARY KEY`。
//! 外部 ID 记录在 `ir_model_data` 中。

use tracing::trace;

use super::{IdRefs, ImportMode, ImportOptions, LoadError};
use crate::store::{Session, SqlValue, StoreError};

const CREATE_MODEL_DATA: &str = "CREATE TABLE IF NOT EXISTS ir_model_data (
    id INTEGER PRIMARY KEY,
    module TEXT NOT NULL,
    name TEXT NOT NULL,
    model TEXT NOT NULL,
    res_id INTEGER NOT NULL,
    noupdate INTEGER NOT NULL DEFAULT 0,
    UNIQUE (module, name)
)";

/// 待写入的记录
#[derive(Debug, Clone, PartialEq)]
pub struct RecordValues {
    pub model: String,
    pub xml_id: Option<String>,
    pub values: Vec<(String, SqlValue)>,
}

/// 标识符只允许字母、数字、`_` 和 `.`
pub fn check_identifier(identifier: &str) -> Result<&str, LoadError> {
    let valid = !identifier.is_empty()
        && !identifier.starts_with(|c: char| c.is_ascii_digit())
        && identifier
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.');

    if valid {
        Ok(identifier)
    } else {
        Err(LoadError::InvalidIdentifier(identifier.to_string()))
    }
}

/// 模型名对应的表名
pub fn table_name(model: &str) -> Result<String, LoadError> {
    Ok(check_identifier(model)?.replace('.', "_"))
}

/// 拆分外部 ID：`other.name` 属于 other 模块，否则属于当前模块
pub fn split_xml_id<'a>(module: &'a str, xml_id: &'a str) -> (&'a str, &'a str) {
    match xml_id.split_once('.') {
        Some((owner, name)) => (owner, name),
        None => (module, xml_id),
    }
}

fn full_xml_id(module: &str, xml_id: &str) -> String {
    let (owner, name) = split_xml_id(module, xml_id);
    format!("{}.{}", owner, name)
}

fn ensure_model_data(session: &mut dyn Session) -> Result<(), LoadError> {
    session
        .execute(CREATE_MODEL_DATA)
        .map_err(|source| LoadError::Statement {
            statement: CREATE_MODEL_DATA.to_string(),
            source,
        })
}

/// 查找外部 ID，返回 (res_id, noupdate)
fn lookup(
    session: &mut dyn Session,
    module: &str,
    xml_id: &str,
) -> Result<Option<(i64, bool)>, LoadError> {
    ensure_model_data(session)?;
    let (owner, name) = split_xml_id(module, xml_id);
    let statement = "SELECT res_id, noupdate FROM ir_model_data WHERE module = ?1 AND name = ?2";

    let row = session
        .query_row(statement, &[owner.into(), name.into()])
        .map_err(|source| LoadError::Statement {
            statement: statement.to_string(),
            source,
        })?;

    Ok(row.and_then(|values| {
        let res_id = values.first()?.as_integer()?;
        let noupdate = values.get(1).and_then(SqlValue::as_integer).unwrap_or(0) != 0;
        Some((res_id, noupdate))
    }))
}

/// 把外部 ID 解析成记录 ID
pub fn resolve_xml_id(
    session: &mut dyn Session,
    module: &str,
    xml_id: &str,
) -> Result<i64, LoadError> {
    lookup(session, module, xml_id)?
        .map(|(res_id, _)| res_id)
        .ok_or_else(|| LoadError::UnresolvedReference {
            xml_id: full_xml_id(module, xml_id),
        })
}

/// 写入一条记录，返回它的 ID
///
/// 已存在的外部 ID：`Init` 模式总是更新；`Update` 模式下，只有在
/// `options.no_update` 为真且记录带 noupdate 标记时才跳过。
pub fn write_record(
    session: &mut dyn Session,
    module: &str,
    record: &RecordValues,
    id_refs: Option<&mut IdRefs>,
    options: ImportOptions,
) -> Result<i64, LoadError> {
    let table = table_name(&record.model)?;
    for (column, _) in &record.values {
        check_identifier(column)?;
    }

    let existing = match &record.xml_id {
        Some(xml_id) => lookup(session, module, xml_id)?,
        None => None,
    };

    let res_id = match existing {
        Some((res_id, noupdate)) => {
            let guarded = options.mode == ImportMode::Update && options.no_update && noupdate;
            if guarded {
                trace!("Skipping noupdate record {}#{}", record.model, res_id);
            } else {
                update_row(session, &table, res_id, record)?;
            }
            res_id
        }
        None => {
            let res_id = insert_row(session, &table, record)?;
            if let Some(xml_id) = &record.xml_id {
                register_xml_id(session, module, xml_id, record, res_id, options.no_update)?;
            }
            res_id
        }
    };

    if let (Some(id_refs), Some(xml_id)) = (id_refs, &record.xml_id) {
        id_refs.insert(full_xml_id(module, xml_id), res_id);
    }
    Ok(res_id)
}

/// 删除外部 ID 指向的记录；外部 ID 不存在时什么也不做
pub fn delete_record(
    session: &mut dyn Session,
    module: &str,
    model: &str,
    xml_id: &str,
) -> Result<(), LoadError> {
    let table = table_name(model)?;
    let Some((res_id, _)) = lookup(session, module, xml_id)? else {
        return Ok(());
    };

    let write_error = |source: StoreError| LoadError::Record {
        model: model.to_string(),
        xml_id: Some(xml_id.to_string()),
        source,
    };

    session
        .execute_params(&format!("DELETE FROM {} WHERE id = ?1", table), &[res_id.into()])
        .map_err(write_error)?;

    let (owner, name) = split_xml_id(module, xml_id);
    session
        .execute_params(
            "DELETE FROM ir_model_data WHERE module = ?1 AND name = ?2",
            &[owner.into(), name.into()],
        )
        .map_err(write_error)?;
    Ok(())
}

fn record_error(record: &RecordValues) -> impl Fn(StoreError) -> LoadError + '_ {
    move |source| LoadError::Record {
        model: record.model.clone(),
        xml_id: record.xml_id.clone(),
        source,
    }
}

fn update_row(
    session: &mut dyn Session,
    table: &str,
    res_id: i64,
    record: &RecordValues,
) -> Result<(), LoadError> {
    if record.values.is_empty() {
        return Ok(());
    }

    let assignments: Vec<String> = record
        .values
        .iter()
        .enumerate()
        .map(|(index, (column, _))| format!("{} = ?{}", column, index + 1))
        .collect();
    let statement = format!(
        "UPDATE {} SET {} WHERE id = ?{}",
        table,
        assignments.join(", "),
        record.values.len() + 1
    );

    let mut params: Vec<SqlValue> = record.values.iter().map(|(_, v)| v.clone()).collect();
    params.push(SqlValue::Integer(res_id));

    session
        .execute_params(&statement, &params)
        .map_err(record_error(record))?;
    Ok(())
}

fn insert_row(
    session: &mut dyn Session,
    table: &str,
    record: &RecordValues,
) -> Result<i64, LoadError> {
    let statement = if record.values.is_empty() {
        format!("INSERT INTO {} DEFAULT VALUES", table)
    } else {
        let columns: Vec<&str> = record.values.iter().map(|(c, _)| c.as_str()).collect();
        let placeholders: Vec<String> = (1..=columns.len()).map(|i| format!("?{}", i)).collect();
        format!(
            "INSERT INTO {} ({}) VALUES ({})",
            table,
            columns.join(", "),
            placeholders.join(", ")
        )
    };
    let params: Vec<SqlValue> = record.values.iter().map(|(_, v)| v.clone()).collect();

    session
        .execute_params(&statement, &params)
        .map_err(record_error(record))?;

    let row = session
        .query_row("SELECT last_insert_rowid()", &[])
        .map_err(record_error(record))?;
    Ok(row
        .and_then(|values| values.first().and_then(SqlValue::as_integer))
        .unwrap_or_default())
}

fn register_xml_id(
    session: &mut dyn Session,
    module: &str,
    xml_id: &str,
    record: &RecordValues,
    res_id: i64,
    noupdate: bool,
) -> Result<(), LoadError> {
    let (owner, name) = split_xml_id(module, xml_id);
    session
        .execute_params(
            "INSERT INTO ir_model_data (module, name, model, res_id, noupdate) VALUES (?1, ?2, ?3, ?4, ?5)",
            &[
                owner.into(),
                name.into(),
                record.model.as_str().into(),
                res_id.into(),
                SqlValue::Integer(noupdate as i64),
            ],
        )
        .map_err(record_error(record))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{Database, SqliteDatabase};
    use rusqlite::Connection;
    use tempfile::TempDir;

    fn setup() -> (TempDir, Box<dyn Session>) {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("records.db");
        Connection::open(&path)
            .unwrap()
            .execute_batch("CREATE TABLE res_partner (id INTEGER PRIMARY KEY, name TEXT, parent_id INTEGER)")
            .unwrap();
        let session = SqliteDatabase::new(path).open_session().unwrap();
        (temp_dir, session)
    }

    fn partner(xml_id: &str, name: &str) -> RecordValues {
        RecordValues {
            model: "res.partner".to_string(),
            xml_id: Some(xml_id.to_string()),
            values: vec![("name".to_string(), SqlValue::from(name))],
        }
    }

    fn partner_name(session: &mut dyn Session, id: i64) -> SqlValue {
        session
            .query_row("SELECT name FROM res_partner WHERE id = ?1", &[id.into()])
            .unwrap()
            .unwrap()
            .remove(0)
    }

    #[test]
    fn test_insert_then_update_by_xml_id() {
        let (_temp_dir, mut session) = setup();
        let mut id_refs = IdRefs::new();

        let first = write_record(
            session.as_mut(),
            "base",
            &partner("partner_a", "Alice"),
            Some(&mut id_refs),
            ImportOptions::default(),
        )
        .unwrap();
        let second = write_record(
            session.as_mut(),
            "base",
            &partner("partner_a", "Alicia"),
            None,
            ImportOptions::default(),
        )
        .unwrap();

        assert_eq!(first, second);
        assert_eq!(id_refs.get("base.partner_a"), Some(&first));
        assert_eq!(partner_name(session.as_mut(), first), SqlValue::from("Alicia"));
        assert_eq!(resolve_xml_id(session.as_mut(), "sale", "base.partner_a").unwrap(), first);
    }

    #[test]
    fn test_noupdate_guard_is_only_honoured_when_requested() {
        let (_temp_dir, mut session) = setup();
        let guarded = ImportOptions {
            mode: ImportMode::Update,
            no_update: true,
        };

        let id = write_record(session.as_mut(), "base", &partner("p", "Old"), None, guarded).unwrap();
        write_record(session.as_mut(), "base", &partner("p", "New"), None, guarded).unwrap();
        assert_eq!(partner_name(session.as_mut(), id), SqlValue::from("Old"));

        write_record(
            session.as_mut(),
            "base",
            &partner("p", "New"),
            None,
            ImportOptions::default(),
        )
        .unwrap();
        assert_eq!(partner_name(session.as_mut(), id), SqlValue::from("New"));
    }

    #[test]
    fn test_delete_and_unresolved() {
        let (_temp_dir, mut session) = setup();
        write_record(
            session.as_mut(),
            "base",
            &partner("gone", "Bob"),
            None,
            ImportOptions::default(),
        )
        .unwrap();

        delete_record(session.as_mut(), "base", "res.partner", "gone").unwrap();
        let err = resolve_xml_id(session.as_mut(), "base", "gone").unwrap_err();
        assert!(matches!(err, LoadError::UnresolvedReference { ref xml_id } if xml_id == "base.gone"));
    }

    #[test]
    fn test_identifiers() {
        assert_eq!(table_name("res.partner").unwrap(), "res_partner");
        assert!(table_name("res_partner; DROP TABLE x").is_err());
        assert!(check_identifier("1abc").is_err());
        assert_eq!(split_xml_id("sale", "base.main"), ("base", "main"));
        assert_eq!(split_xml_id("sale", "order_1"), ("sale", "order_1"));
    }
}
