use tracing::trace;

use super::LoadError;
use crate::store::Session;

/// 把 SQL 文本按 `;` 切分，折叠语句内部的空白，丢弃空语句
pub fn split_statements(content: &str) -> Vec<String> {
    split_statements_with_lines(content)
        .into_iter()
        .map(|(_, statement)| statement)
        .collect()
}

/// 同 [`split_statements`]，并给出每条语句在文本中的起始行号（从 1 开始）
pub fn split_statements_with_lines(content: &str) -> Vec<(usize, String)> {
    let mut statements = Vec::new();
    let mut line = 1;

    for query in content.split(';') {
        let leading = query.len() - query.trim_start().len();
        let start_line = line + query[..leading].matches('\n').count();
        line += query.matches('\n').count();

        let collapsed = query.split_whitespace().collect::<Vec<_>>().join(" ");
        if !collapsed.is_empty() {
            statements.push((start_line, collapsed));
        }
    }
    statements
}

/// 顺序执行所有语句；第一条失败的语句中止剩余语句
pub fn execute_sql(session: &mut dyn Session, content: &str) -> Result<(), LoadError> {
    for statement in split_statements(content) {
        trace!("SQL: {}", statement);
        session
            .execute(&statement)
            .map_err(|source| LoadError::Statement { statement, source })?;
    }
    Ok(())
}
