//! 声明式 YAML 脚本
//!
//! 脚本是一个 YAML 序列，每一项是一个步骤：
//!
//! ```yaml
//! - Create a customer            # 纯字符串只是说明
//! - record:
//!     model: res.partner
//!     id: partner_a
//!     values:
//!       name: Alice
//!       parent_id: {ref: base.main_company}
//! - sql: |
//!     UPDATE res_partner SET city = 'Lyon';
//! - assert:
//!     sql: SELECT count(*) FROM res_partner WHERE city = 'Lyon'
//!     equals: 1
//! - delete:
//!     model: res.partner
//!     id: partner_a
//! ```

use serde_yaml::{Mapping, Value};
use tracing::{debug, trace};

use super::records::{self, RecordValues};
use super::sql::split_statements_with_lines;
use super::{IdRefs, ImportOptions, LoadError, ScriptExecutionError};
use crate::store::{Session, SqlValue};

/// 解析后的步骤
#[derive(Debug, Clone, PartialEq)]
enum Step {
    Comment(String),
    Record {
        model: String,
        xml_id: Option<String>,
        values: Mapping,
    },
    Sql(String),
    Assert {
        sql: String,
        equals: Value,
    },
    Delete {
        model: String,
        xml_id: String,
    },
}

/// 步骤内失败的位置和原因
struct StepFailure {
    line: usize,
    error: LoadError,
}

impl From<LoadError> for StepFailure {
    fn from(error: LoadError) -> Self {
        StepFailure { line: 1, error }
    }
}

/// 执行脚本
///
/// 步骤失败时返回 `ScriptExecutionError`，带上步骤文本和失败行号，
/// 运行器据此给出带行号的源码清单。
pub fn run_script(
    session: &mut dyn Session,
    module: &str,
    content: &str,
    mut id_refs: Option<&mut IdRefs>,
    options: ImportOptions,
) -> Result<(), LoadError> {
    let items = match serde_yaml::from_str::<Value>(content)? {
        Value::Sequence(items) => items,
        Value::Null => return Ok(()),
        _ => {
            return Err(LoadError::MalformedScript {
                line: 1,
                message: "a script must be a YAML sequence".to_string(),
            });
        }
    };

    let step_lines = item_lines(content);

    for (index, item) in items.iter().enumerate() {
        // 找不到位置时只能退回到文件开头
        let step_line = step_lines.get(index).copied().unwrap_or(1);
        let step = Step::parse(item, step_line)?;
        trace!("Script step {} at line {}: {:?}", index + 1, step_line, step);

        if let Err(failure) = step.apply(session, module, id_refs.as_deref_mut(), options) {
            return Err(ScriptExecutionError {
                step_line,
                line_number: failure.line,
                source_text: step.source_text(item),
                cause: Box::new(failure.error),
            }
            .into());
        }
    }

    debug!("Script of module {} ran {} step(s)", module, items.len());
    Ok(())
}

/// 顶层序列中每一项的起始行号（尽力而为）
fn item_lines(content: &str) -> Vec<usize> {
    let is_item = |trimmed: &str| trimmed == "-" || trimmed.starts_with("- ");

    let indent = content.lines().find_map(|line| {
        let trimmed = line.trim_start();
        is_item(trimmed).then(|| line.len() - trimmed.len())
    });
    let Some(indent) = indent else {
        return Vec::new();
    };

    content
        .lines()
        .enumerate()
        .filter(|(_, line)| {
            let trimmed = line.trim_start();
            line.len() - trimmed.len() == indent && is_item(trimmed)
        })
        .map(|(index, _)| index + 1)
        .collect()
}

impl Step {
    fn parse(item: &Value, line: usize) -> Result<Self, LoadError> {
        let malformed = |message: &str| LoadError::MalformedScript {
            line,
            message: message.to_string(),
        };

        let mapping = match item {
            Value::String(text) => return Ok(Step::Comment(text.clone())),
            Value::Mapping(mapping) if mapping.len() == 1 => mapping,
            _ => {
                return Err(malformed(
                    "a step is a comment string or a mapping with a single directive",
                ));
            }
        };

        let Some((Value::String(directive), body)) = mapping.iter().next() else {
            return Err(malformed("directive name must be a string"));
        };

        match directive.as_str() {
            "sql" => match body {
                Value::String(sql) => Ok(Step::Sql(sql.clone())),
                _ => Err(malformed("sql expects a string")),
            },
            "record" => {
                let model = string_field(body, "model").ok_or_else(|| malformed("record needs a model"))?;
                let values = match body.get("values") {
                    Some(Value::Mapping(values)) => values.clone(),
                    None | Some(Value::Null) => Mapping::new(),
                    Some(_) => return Err(malformed("record values must be a mapping")),
                };
                Ok(Step::Record {
                    model,
                    xml_id: string_field(body, "id"),
                    values,
                })
            }
            "assert" => {
                let sql = string_field(body, "sql").ok_or_else(|| malformed("assert needs sql"))?;
                let equals = body
                    .get("equals")
                    .cloned()
                    .ok_or_else(|| malformed("assert needs equals"))?;
                Ok(Step::Assert { sql, equals })
            }
            "delete" => Ok(Step::Delete {
                model: string_field(body, "model").ok_or_else(|| malformed("delete needs a model"))?,
                xml_id: string_field(body, "id").ok_or_else(|| malformed("delete needs an id"))?,
            }),
            other => Err(malformed(&format!("unknown directive {:?}", other))),
        }
    }

    /// 失败时展示给用户的步骤文本
    fn source_text(&self, item: &Value) -> String {
        match self {
            Step::Comment(text) | Step::Sql(text) => text.clone(),
            Step::Assert { sql, .. } => sql.clone(),
            Step::Record { .. } | Step::Delete { .. } => {
                serde_yaml::to_string(item).unwrap_or_default()
            }
        }
    }

    fn apply(
        &self,
        session: &mut dyn Session,
        module: &str,
        id_refs: Option<&mut IdRefs>,
        options: ImportOptions,
    ) -> Result<(), StepFailure> {
        match self {
            Step::Comment(_) => Ok(()),
            Step::Sql(sql) => {
                for (line, statement) in split_statements_with_lines(sql) {
                    if let Err(source) = session.execute(&statement) {
                        return Err(StepFailure {
                            line,
                            error: LoadError::Statement { statement, source },
                        });
                    }
                }
                Ok(())
            }
            Step::Record {
                model,
                xml_id,
                values,
            } => {
                let mut record = RecordValues {
                    model: model.clone(),
                    xml_id: xml_id.clone(),
                    values: Vec::with_capacity(values.len()),
                };
                for (key, value) in values {
                    let Value::String(field) = key else {
                        return Err(LoadError::MalformedScript {
                            line: 1,
                            message: format!("field name must be a string: {:?}", key),
                        }
                        .into());
                    };
                    record
                        .values
                        .push((field.clone(), to_sql_value(session, module, value)?));
                }
                records::write_record(session, module, &record, id_refs, options)?;
                Ok(())
            }
            Step::Assert { sql, equals } => {
                let expected = expected_text(equals);
                let row = session
                    .query_row(sql, &[])
                    .map_err(|source| LoadError::Statement {
                        statement: sql.clone(),
                        source,
                    })?;
                let actual = match row.as_ref().and_then(|values| values.first()) {
                    Some(value) => value.to_string(),
                    None => "no rows".to_string(),
                };

                if actual == expected {
                    Ok(())
                } else {
                    Err(LoadError::AssertionFailed {
                        query: sql.clone(),
                        expected,
                        actual,
                    }
                    .into())
                }
            }
            Step::Delete { model, xml_id } => {
                records::delete_record(session, module, model, xml_id)?;
                Ok(())
            }
        }
    }
}

fn string_field(body: &Value, key: &str) -> Option<String> {
    body.get(key).and_then(Value::as_str).map(str::to_string)
}

fn to_sql_value(
    session: &mut dyn Session,
    module: &str,
    value: &Value,
) -> Result<SqlValue, LoadError> {
    match value {
        Value::Null => Ok(SqlValue::Null),
        Value::Bool(b) => Ok(SqlValue::Integer(*b as i64)),
        Value::Number(n) => Ok(match n.as_i64() {
            Some(i) => SqlValue::Integer(i),
            None => SqlValue::Real(n.as_f64().unwrap_or_default()),
        }),
        Value::String(s) => Ok(SqlValue::Text(s.clone())),
        Value::Mapping(mapping) => match mapping.get("ref").and_then(Value::as_str) {
            Some(xml_id) => Ok(SqlValue::Integer(records::resolve_xml_id(
                session, module, xml_id,
            )?)),
            None => Err(LoadError::MalformedScript {
                line: 1,
                message: "only {ref: <external id>} mappings are allowed as values".to_string(),
            }),
        },
        other => Err(LoadError::MalformedScript {
            line: 1,
            message: format!("unsupported value: {:?}", other),
        }),
    }
}

fn expected_text(value: &Value) -> String {
    match value {
        Value::Null => "NULL".to_string(),
        Value::Bool(b) => (*b as i64).to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.clone(),
        other => serde_yaml::to_string(other).unwrap_or_default().trim().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{Database, SqliteDatabase};
    use rusqlite::Connection;
    use tempfile::TempDir;

    fn setup() -> (TempDir, Box<dyn Session>) {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("script.db");
        Connection::open(&path)
            .unwrap()
            .execute_batch(
                "CREATE TABLE res_partner (id INTEGER PRIMARY KEY, name TEXT, city TEXT, parent_id INTEGER);",
            )
            .unwrap();
        let session = SqliteDatabase::new(path).open_session().unwrap();
        (temp_dir, session)
    }

    #[test]
    fn test_item_lines() {
        let content = "# header\n- first\n- sql: |\n    SELECT 1;\n-\n  record: {}\n";
        assert_eq!(item_lines(content), vec![2, 3, 5]);
        assert!(item_lines("{}").is_empty());
    }

    #[test]
    fn test_script_success() {
        let (_temp_dir, mut session) = setup();
        let content = r#"
- Create the parent company
- record:
    model: res.partner
    id: main
    values:
      name: Main
- record:
    model: res.partner
    id: child
    values:
      name: Child
      parent_id: {ref: main}
- sql: |
    UPDATE res_partner SET city = 'Lyon'
    WHERE name = 'Child';
- assert:
    sql: SELECT count(*) FROM res_partner WHERE city = 'Lyon' AND parent_id IS NOT NULL
    equals: 1
- delete:
    model: res.partner
    id: child
- assert:
    sql: SELECT count(*) FROM res_partner
    equals: "1"
"#;

        let mut id_refs = IdRefs::new();
        run_script(
            session.as_mut(),
            "base",
            content,
            Some(&mut id_refs),
            ImportOptions::default(),
        )
        .unwrap();
        assert!(id_refs.contains_key("base.main"));
    }

    #[test]
    fn test_failing_statement_reports_step_and_line() {
        let (_temp_dir, mut session) = setup();
        let content = "- Insert and break\n- sql: |\n    INSERT INTO res_partner (name) VALUES ('A');\n    SELECT * FROM missing_table;\n";

        let err = run_script(session.as_mut(), "sale", content, None, ImportOptions::default())
            .unwrap_err();
        let script = err.script_context().expect("script context");

        assert_eq!(script.step_line, 2);
        assert_eq!(script.line_number, 2);
        assert!(script.source_text.contains("missing_table"));
        assert_eq!(script.cause.kind(), "SqlStatementError");
    }

    #[test]
    fn test_failed_assertion() {
        let (_temp_dir, mut session) = setup();
        let content = "- assert:\n    sql: SELECT count(*) FROM res_partner\n    equals: 3\n";

        let err = run_script(session.as_mut(), "sale", content, None, ImportOptions::default())
            .unwrap_err();
        let script = err.script_context().unwrap();
        match script.cause.as_ref() {
            LoadError::AssertionFailed {
                expected, actual, ..
            } => {
                assert_eq!(expected, "3");
                assert_eq!(actual, "0");
            }
            other => panic!("Expected AssertionFailed, got {:?}", other),
        }
    }

    #[test]
    fn test_malformed_scripts() {
        let (_temp_dir, mut session) = setup();

        let err = run_script(session.as_mut(), "sale", "key: value\n", None, ImportOptions::default())
            .unwrap_err();
        assert_eq!(err.kind(), "MalformedScript");

        let err = run_script(session.as_mut(), "sale", "- python: x\n", None, ImportOptions::default())
            .unwrap_err();
        assert!(matches!(err, LoadError::MalformedScript { line: 1, .. }));

        let err = run_script(session.as_mut(), "sale", "- [unclosed\n", None, ImportOptions::default())
            .unwrap_err();
        assert_eq!(err.kind(), "ScriptSyntaxError");

        run_script(session.as_mut(), "sale", "", None, ImportOptions::default()).unwrap();
    }
}
