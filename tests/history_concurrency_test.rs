use chrono::Utc;
use modtest::history::{HistoryFilter, HistoryStorage, RunRecord};
use std::collections::HashSet;
use std::sync::Arc;
use std::thread;
use tempfile::TempDir;

fn create_dummy_record(id: String) -> RunRecord {
    RunRecord {
        id,
        timestamp: Utc::now(),
        selection: "all".to_string(),
        modules: vec!["sale".to_string(), "stock".to_string()],
        failed_files: Vec::new(),
        tests: 4,
        errors: 0,
        duration_ms: 100,
        report: Some("xunit.xml".to_string()),
    }
}

#[test]
fn test_concurrent_writes() {
    let temp_dir = TempDir::new().unwrap();
    let history_file = temp_dir.path().join("history.jsonl");

    // 每个线程使用自己的 HistoryStorage，模拟多个进程
    let history_path = Arc::new(history_file.clone());

    let mut handles = vec![];
    let thread_count = 10;
    let records_per_thread = 50;

    for i in 0..thread_count {
        let path = history_path.clone();
        handles.push(thread::spawn(move || {
            let storage = HistoryStorage::new((*path).clone());
            for j in 0..records_per_thread {
                storage
                    .append(&create_dummy_record(format!("{}-{}", i, j)))
                    .unwrap();
            }
        }));
    }

    for handle in handles {
        handle.join().unwrap();
    }

    let storage = HistoryStorage::new(history_file);
    let records = storage
        .query(&HistoryFilter::default(), usize::MAX)
        .unwrap();

    assert_eq!(records.len(), thread_count * records_per_thread);

    let ids: HashSet<_> = records.iter().map(|r| r.id.as_str()).collect();
    assert_eq!(ids.len(), thread_count * records_per_thread);
    assert!(ids.contains("9-49"));
}
