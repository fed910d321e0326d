use crate::history::model::{FailedFile, RunRecord};
use crate::history::storage::HistoryStorage;
use crate::runner::TestSuite;
use chrono::{DateTime, Utc};
use std::path::Path;
use std::time::Duration;
use tracing::warn;
use uuid::Uuid;

/// 根据一次运行的结果构造历史记录
pub fn build_record(
    selection: &str,
    suite: &TestSuite,
    started_at: DateTime<Utc>,
    duration: Duration,
    report: Option<&Path>,
) -> RunRecord {
    let mut modules: Vec<String> = Vec::new();
    for case in &suite.test_cases {
        if !modules.contains(&case.classname) {
            modules.push(case.classname.clone());
        }
    }

    let failed_files = suite
        .test_cases
        .iter()
        .filter_map(|case| {
            case.error.as_ref().map(|error| FailedFile {
                module: case.classname.clone(),
                file: case.name.clone(),
                kind: error.kind.clone(),
            })
        })
        .collect();

    RunRecord {
        id: Uuid::new_v4().to_string(),
        timestamp: started_at,
        selection: selection.to_string(),
        modules,
        failed_files,
        tests: suite.tests,
        errors: suite.errors,
        duration_ms: duration.as_millis() as u64,
        report: report.map(|p| p.display().to_string()),
    }
}

/// 记录运行历史；写入失败只打印警告
pub fn record_run(storage: &HistoryStorage, record: &RunRecord) {
    if let Err(e) = storage.append(record) {
        warn!("Failed to save run history to {}: {}", storage.path().display(), e);
    }
}
