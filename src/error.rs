use std::path::PathBuf;

use thiserror::Error;

use crate::discovery::DiscoveryError;
use crate::runner::xunit::ReportError;
use crate::store::StoreError;

#[derive(Error, Debug)]
pub enum ModtestError {
    #[error("发现测试失败: {0}")]
    Discovery(#[from] DiscoveryError),

    #[error("数据库错误: {0}")]
    Store(#[from] StoreError),

    #[error("报告生成失败: {0}")]
    Report(#[from] ReportError),

    #[error("无法写入报告 {}: {source}", .path.display())]
    ReportWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("配置错误: {0}")]
    Config(String),

    #[error("IO 错误: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON 解析错误: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

// Add conversion from anyhow::Error
impl From<anyhow::Error> for ModtestError {
    fn from(err: anyhow::Error) -> Self {
        ModtestError::Other(err.to_string())
    }
}

/// Result type for modtest crate
pub type Result<T> = std::result::Result<T, ModtestError>;
