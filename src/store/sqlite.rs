use std::path::{Path, PathBuf};

use rusqlite::types::{ToSqlOutput, Value, ValueRef};
use rusqlite::{Connection, ToSql, params_from_iter};
use tracing::{debug, trace, warn};

use super::types::SqlValue;
use super::{Database, Session, StoreError, StoreResult};

impl ToSql for SqlValue {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            SqlValue::Null => ToSqlOutput::Owned(Value::Null),
            SqlValue::Integer(i) => ToSqlOutput::Owned(Value::Integer(*i)),
            SqlValue::Real(r) => ToSqlOutput::Owned(Value::Real(*r)),
            SqlValue::Text(s) => ToSqlOutput::Borrowed(ValueRef::Text(s.as_bytes())),
        })
    }
}

/// SQLite 数据库文件；每个会话使用独立的连接
#[derive(Debug, Clone)]
pub struct SqliteDatabase {
    path: PathBuf,
}

impl SqliteDatabase {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Database for SqliteDatabase {
    fn open_session(&self) -> StoreResult<Box<dyn Session>> {
        let session = SqliteSession::open(&self.path)?;
        Ok(Box::new(session))
    }
}

/// 持有一个始终处于事务中的连接
pub struct SqliteSession {
    conn: Option<Connection>,
}

impl SqliteSession {
    pub fn open(path: &Path) -> StoreResult<Self> {
        let conn = Connection::open(path)?;
        conn.execute_batch("BEGIN")?;
        debug!("Opened session on {}", path.display());
        Ok(Self { conn: Some(conn) })
    }

    fn connection(&self) -> StoreResult<&Connection> {
        self.conn.as_ref().ok_or(StoreError::Closed)
    }
}

impl Session for SqliteSession {
    fn execute(&mut self, statement: &str) -> StoreResult<()> {
        trace!("execute: {}", statement);
        let conn = self.connection()?;
        let mut stmt = conn.prepare(statement)?;

        if stmt.column_count() > 0 {
            // SELECT 之类的语句：读完结果即可
            let mut rows = stmt.query([])?;
            while rows.next()?.is_some() {}
        } else {
            stmt.execute([])?;
        }
        Ok(())
    }

    fn execute_params(&mut self, statement: &str, params: &[SqlValue]) -> StoreResult<usize> {
        trace!("execute: {} {:?}", statement, params);
        let changed = self
            .connection()?
            .execute(statement, params_from_iter(params.iter()))?;
        Ok(changed)
    }

    fn query_row(
        &mut self,
        statement: &str,
        params: &[SqlValue],
    ) -> StoreResult<Option<Vec<SqlValue>>> {
        trace!("query: {} {:?}", statement, params);
        let conn = self.connection()?;
        let mut stmt = conn.prepare(statement)?;
        let columns = stmt.column_count();
        let mut rows = stmt.query(params_from_iter(params.iter()))?;

        match rows.next()? {
            Some(row) => {
                let mut values = Vec::with_capacity(columns);
                for index in 0..columns {
                    values.push(SqlValue::from(row.get_ref(index)?));
                }
                Ok(Some(values))
            }
            None => Ok(None),
        }
    }

    fn rollback(&mut self) -> StoreResult<()> {
        let conn = self.connection()?;
        // 测试文件里可能自己提交或回滚过
        if !conn.is_autocommit() {
            conn.execute_batch("ROLLBACK")?;
        }
        conn.execute_batch("BEGIN")?;
        Ok(())
    }

    fn close(&mut self) -> StoreResult<()> {
        let Some(conn) = self.conn.take() else {
            return Ok(());
        };
        if !conn.is_autocommit() {
            conn.execute_batch("ROLLBACK")?;
        }
        conn.close().map_err(|(_, e)| StoreError::Sqlite(e))?;
        debug!("Session closed");
        Ok(())
    }
}

impl Drop for SqliteSession {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take()
            && !conn.is_autocommit()
            && let Err(e) = conn.execute_batch("ROLLBACK")
        {
            warn!("Failed to roll back abandoned session: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn setup() -> (TempDir, SqliteDatabase) {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("test.db");
        let conn = Connection::open(&path).unwrap();
        conn.execute_batch("CREATE TABLE t (id INTEGER PRIMARY KEY, name TEXT)")
            .unwrap();
        (temp_dir, SqliteDatabase::new(path))
    }

    fn count_rows(db: &SqliteDatabase) -> i64 {
        let conn = Connection::open(db.path()).unwrap();
        conn.query_row("SELECT count(*) FROM t", [], |row| row.get(0))
            .unwrap()
    }

    #[test]
    fn test_rollback_discards_writes() {
        let (_temp_dir, db) = setup();
        let mut session = db.open_session().unwrap();

        session.execute("INSERT INTO t (name) VALUES ('a')").unwrap();
        let row = session
            .query_row("SELECT count(*) FROM t", &[])
            .unwrap()
            .unwrap();
        assert_eq!(row, vec![SqlValue::Integer(1)]);

        session.rollback().unwrap();
        let row = session
            .query_row("SELECT count(*) FROM t", &[])
            .unwrap()
            .unwrap();
        assert_eq!(row, vec![SqlValue::Integer(0)]);

        session.close().unwrap();
        assert_eq!(count_rows(&db), 0);
    }

    #[test]
    fn test_params_and_closed_session() {
        let (_temp_dir, db) = setup();
        let mut session = db.open_session().unwrap();

        let changed = session
            .execute_params(
                "INSERT INTO t (name) VALUES (?1)",
                &[SqlValue::from("Zoë")],
            )
            .unwrap();
        assert_eq!(changed, 1);

        let row = session
            .query_row("SELECT name FROM t WHERE name = ?1", &[SqlValue::from("Zoë")])
            .unwrap();
        assert_eq!(row, Some(vec![SqlValue::from("Zoë")]));

        session.close().unwrap();
        assert!(matches!(session.execute("SELECT 1"), Err(StoreError::Closed)));
        // 重复关闭是无害的
        session.close().unwrap();
    }

    #[test]
    fn test_select_through_execute() {
        let (_temp_dir, db) = setup();
        let mut session = db.open_session().unwrap();
        session.execute("SELECT * FROM t").unwrap();
        assert!(session.execute("SELECT * FROM missing").is_err());
    }
}
