pub mod sqlite;
pub mod types;

pub use sqlite::{SqliteDatabase, SqliteSession};
pub use types::SqlValue;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("{0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("session is closed")]
    Closed,
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// 事务会话：所有写入在 `rollback` 之前都可以被丢弃
pub trait Session {
    /// 执行一条不带参数的语句
    fn execute(&mut self, statement: &str) -> StoreResult<()>;

    /// 执行带位置参数（`?1`, `?2` ...）的语句，返回受影响的行数
    fn execute_params(&mut self, statement: &str, params: &[SqlValue]) -> StoreResult<usize>;

    /// 执行查询并返回第一行
    fn query_row(
        &mut self,
        statement: &str,
        params: &[SqlValue],
    ) -> StoreResult<Option<Vec<SqlValue>>>;

    /// 丢弃当前事务中的所有写入，并开始新的事务
    fn rollback(&mut self) -> StoreResult<()>;

    /// 关闭会话；之后的任何操作都返回 `StoreError::Closed`
    fn close(&mut self) -> StoreResult<()>;
}

/// 能够打开独立会话的数据库句柄
pub trait Database {
    fn open_session(&self) -> StoreResult<Box<dyn Session>>;
}
