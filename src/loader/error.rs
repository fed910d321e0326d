use std::collections::BTreeMap;
use std::path::PathBuf;

use thiserror::Error;

use crate::store::StoreError;

/// 应用测试文件时出现的错误
#[derive(Error, Debug)]
pub enum LoadError {
    #[error("file not found: {module}/{path}")]
    NotFound { module: String, path: String },

    #[error("cannot read {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("statement failed: {source}")]
    Statement {
        statement: String,
        #[source]
        source: StoreError,
    },

    #[error("invalid CSV in {path}: {source}")]
    Csv {
        path: String,
        #[source]
        source: csv::Error,
    },

    #[error("cannot write {model} record: {source}")]
    Record {
        model: String,
        xml_id: Option<String>,
        #[source]
        source: StoreError,
    },

    #[error("external id not found: {xml_id}")]
    UnresolvedReference { xml_id: String },

    #[error("invalid identifier: {0:?}")]
    InvalidIdentifier(String),

    #[error("invalid XML at byte {position}: {source}")]
    Xml {
        position: u64,
        #[source]
        source: quick_xml::Error,
    },

    #[error("malformed document: {0}")]
    MalformedDocument(String),

    #[error("invalid YAML: {0}")]
    ScriptSyntax(#[from] serde_yaml::Error),

    #[error("malformed script step at line {line}: {message}")]
    MalformedScript { line: usize, message: String },

    #[error("assertion failed: expected {expected}, got {actual}")]
    AssertionFailed {
        query: String,
        expected: String,
        actual: String,
    },

    #[error(transparent)]
    Script(#[from] ScriptExecutionError),
}

/// 脚本步骤失败时携带的源码上下文
///
/// `line_number` 是失败语句在 `source_text` 内的行号（从 1 开始），
/// `step_line` 是该步骤在脚本文件中的起始行（尽力推断）。
#[derive(Error, Debug)]
#[error("script step at line {step_line} failed: {cause}")]
pub struct ScriptExecutionError {
    pub step_line: usize,
    pub line_number: usize,
    pub source_text: String,
    #[source]
    pub cause: Box<LoadError>,
}

impl LoadError {
    /// 写入报告 `type` 属性的错误类型名
    pub fn kind(&self) -> &'static str {
        match self {
            LoadError::NotFound { .. } => "FileNotFound",
            LoadError::Read { .. } => "ReadError",
            LoadError::Statement { .. } => "SqlStatementError",
            LoadError::Csv { .. } => "CsvError",
            LoadError::Record { .. } => "RecordWriteError",
            LoadError::UnresolvedReference { .. } => "UnresolvedReference",
            LoadError::InvalidIdentifier(_) => "InvalidIdentifier",
            LoadError::Xml { .. } => "XmlError",
            LoadError::MalformedDocument(_) => "MalformedDocument",
            LoadError::ScriptSyntax(_) => "ScriptSyntaxError",
            LoadError::MalformedScript { .. } => "MalformedScript",
            LoadError::AssertionFailed { .. } => "AssertionFailed",
            LoadError::Script(_) => "ScriptExecutionError",
        }
    }

    /// 脚本执行错误（如果有）
    pub fn script_context(&self) -> Option<&ScriptExecutionError> {
        match self {
            LoadError::Script(e) => Some(e),
            _ => None,
        }
    }

    /// 最内层失败点的上下文变量
    pub fn locals(&self) -> BTreeMap<&'static str, String> {
        let mut locals = BTreeMap::new();
        match self {
            LoadError::NotFound { module, path } => {
                locals.insert("module", module.clone());
                locals.insert("path", path.clone());
            }
            LoadError::Read { path, .. } => {
                locals.insert("path", path.display().to_string());
            }
            LoadError::Statement { statement, .. } => {
                locals.insert("statement", statement.clone());
            }
            LoadError::Csv { path, source } => {
                locals.insert("path", path.clone());
                if let Some(position) = source.position() {
                    locals.insert("line", position.line().to_string());
                }
            }
            LoadError::Record { model, xml_id, .. } => {
                locals.insert("model", model.clone());
                if let Some(xml_id) = xml_id {
                    locals.insert("xml_id", xml_id.clone());
                }
            }
            LoadError::UnresolvedReference { xml_id } => {
                locals.insert("xml_id", xml_id.clone());
            }
            LoadError::InvalidIdentifier(identifier) => {
                locals.insert("identifier", identifier.clone());
            }
            LoadError::Xml { position, .. } => {
                locals.insert("position", position.to_string());
            }
            LoadError::MalformedDocument(message) => {
                locals.insert("message", message.clone());
            }
            LoadError::ScriptSyntax(e) => {
                if let Some(location) = e.location() {
                    locals.insert("line", location.line().to_string());
                    locals.insert("column", location.column().to_string());
                }
            }
            LoadError::MalformedScript { line, .. } => {
                locals.insert("line", line.to_string());
            }
            LoadError::AssertionFailed {
                query,
                expected,
                actual,
            } => {
                locals.insert("query", query.clone());
                locals.insert("expected", expected.clone());
                locals.insert("actual", actual.clone());
            }
            LoadError::Script(e) => {
                locals = e.cause.locals();
                locals.insert("step_line", e.step_line.to_string());
            }
        }
        locals
    }
}
