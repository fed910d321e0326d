use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 一次测试运行
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunRecord {
    pub id: String,

    /// 运行开始时间
    pub timestamp: DateTime<Utc>,

    /// 命令行上的选择（"all" 或逗号分隔的模块名）
    pub selection: String,

    /// 实际跑过测试文件的模块，按运行顺序
    #[serde(default)]
    pub modules: Vec<String>,

    /// 出错的测试文件
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub failed_files: Vec<FailedFile>,

    pub tests: usize,

    pub errors: usize,

    pub duration_ms: u64,

    /// 报告文件（如果写了的话）
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub report: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FailedFile {
    pub module: String,
    pub file: String,
    /// 错误类型，与 xUnit 报告里的 `type` 一致
    pub kind: String,
}

impl RunRecord {
    pub fn is_success(&self) -> bool {
        self.errors == 0
    }

    pub fn module_failed(&self, module: &str) -> bool {
        self.failed_files.iter().any(|f| f.module == module)
    }
}

/// `modtest history` 的过滤条件
#[derive(Debug, Clone, Default)]
pub struct HistoryFilter {
    /// 只看跑过该模块的运行
    pub module: Option<String>,
    /// 只看有错误的运行；与 `module` 同时给出时要求该模块本身出错
    pub failed_only: bool,
}

impl HistoryFilter {
    pub fn matches(&self, record: &RunRecord) -> bool {
        match (&self.module, self.failed_only) {
            (None, false) => true,
            (None, true) => !record.is_success(),
            (Some(module), false) => record.modules.iter().any(|m| m == module),
            (Some(module), true) => record.module_failed(module),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(modules: &[&str], failed: &[(&str, &str)]) -> RunRecord {
        RunRecord {
            id: "r".to_string(),
            timestamp: Utc::now(),
            selection: "all".to_string(),
            modules: modules.iter().map(|m| m.to_string()).collect(),
            failed_files: failed
                .iter()
                .map(|(module, file)| FailedFile {
                    module: module.to_string(),
                    file: file.to_string(),
                    kind: "SqlStatementError".to_string(),
                })
                .collect(),
            tests: 3,
            errors: failed.len(),
            duration_ms: 10,
            report: None,
        }
    }

    #[test]
    fn test_filter_matches() {
        let clean = record(&["sale", "stock"], &[]);
        let broken = record(&["sale", "stock"], &[("stock", "data/stock.move.csv")]);

        let all = HistoryFilter::default();
        assert!(all.matches(&clean) && all.matches(&broken));

        let failed = HistoryFilter { failed_only: true, ..Default::default() };
        assert!(!failed.matches(&clean));
        assert!(failed.matches(&broken));

        let sale = HistoryFilter { module: Some("sale".to_string()), failed_only: false };
        assert!(sale.matches(&clean));
        assert!(!HistoryFilter { module: Some("crm".to_string()), failed_only: false }.matches(&clean));

        // sale 本身没有出错
        let sale_failed = HistoryFilter { module: Some("sale".to_string()), failed_only: true };
        assert!(!sale_failed.matches(&broken));
        let stock_failed = HistoryFilter { module: Some("stock".to_string()), failed_only: true };
        assert!(stock_failed.matches(&broken));
    }
}
