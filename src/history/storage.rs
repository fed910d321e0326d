use super::model::{HistoryFilter, RunRecord};
use crate::Result;
use fs2::FileExt;
use std::collections::VecDeque;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufRead, BufReader, BufWriter, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

const DEFAULT_DIR: &str = ".modtest";
const FILE_NAME: &str = "history.jsonl";
const DIR_ENV: &str = "MODTEST_HISTORY_DIR";

/// 超过这个大小时，追加之后顺手裁剪
const PRUNE_ABOVE_BYTES: u64 = 20 * 1024 * 1024;
const KEEP_RECORDS: usize = 10_000;

/// jsonl 运行历史：每行一个 `RunRecord`
///
/// 写入持有 `fs2` 排他锁，读取持有共享锁，多个 modtest 进程可以同时使用同一个文件。
#[derive(Debug, Clone)]
pub struct HistoryStorage {
    path: PathBuf,
}

impl HistoryStorage {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `$MODTEST_HISTORY_DIR/history.jsonl`，缺省为 `.modtest/history.jsonl`
    pub fn from_env() -> Self {
        let dir = std::env::var_os(DIR_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_DIR));
        Self::new(dir.join(FILE_NAME))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn append(&self, record: &RunRecord) -> Result<()> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)?;
        }

        let mut line = serde_json::to_string(record)?;
        line.push('\n');

        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(&self.path)?;
        file.lock_exclusive()?;

        // 一次 write_all，持锁期间不会与其他进程交错
        file.write_all(line.as_bytes())?;

        if file.metadata()?.len() > PRUNE_ABOVE_BYTES {
            let kept = prune(&mut file, KEEP_RECORDS)?;
            debug!("Pruned {} to {} records", self.path.display(), kept);
        }
        Ok(())
    }

    /// 满足过滤条件的最近 `limit` 条记录，最新的在前
    ///
    /// 文件不存在时返回空；无法解析的行被跳过。
    pub fn query(&self, filter: &HistoryFilter, limit: usize) -> Result<Vec<RunRecord>> {
        if limit == 0 {
            return Ok(Vec::new());
        }

        let file = match File::open(&self.path) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        file.lock_shared()?;

        let mut window = VecDeque::with_capacity(limit.min(64));
        for line in BufReader::new(&file).lines() {
            let Ok(record) = serde_json::from_str::<RunRecord>(&line?) else {
                continue;
            };
            if !filter.matches(&record) {
                continue;
            }
            if window.len() == limit {
                window.pop_front();
            }
            window.push_back(record);
        }

        Ok(window.into_iter().rev().collect())
    }
}

/// 只保留最后 `keep` 行；调用方持有排他锁
fn prune(file: &mut File, keep: usize) -> io::Result<usize> {
    file.seek(SeekFrom::Start(0))?;

    let mut tail = VecDeque::with_capacity(keep.min(1024));
    for line in BufReader::new(&*file).lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        if tail.len() == keep {
            tail.pop_front();
        }
        tail.push_back(line);
    }

    // 原地截断，锁一直在同一个 inode 上
    file.set_len(0)?;
    let mut writer = BufWriter::new(&*file);
    for line in &tail {
        writeln!(writer, "{}", line)?;
    }
    writer.flush()?;
    Ok(tail.len())
}
