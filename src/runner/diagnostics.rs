use std::any::Any;
use std::error::Error;

use super::types::TestError;
use crate::loader::{LoadError, ScriptExecutionError};

/// 把测试文件的错误转换成报告中的 TestError
///
/// 诊断文本依次包含：错误链、脚本步骤的行号清单（`script_context` 开启且有脚本上下文时）、
/// 最内层失败点的上下文变量。
pub fn test_error(err: &LoadError, script_context: bool) -> TestError {
    let mut stack_trace = error_chain(err);

    if script_context && let Some(script) = err.script_context() {
        stack_trace.push_str("\n\n");
        stack_trace.push_str(&script_listing(script));
    }

    stack_trace.push_str(&format!(
        "\n\nLocal variables in deepest context are: {:?}",
        err.locals()
    ));

    TestError {
        kind: err.kind().to_string(),
        message: err.to_string(),
        stack_trace,
    }
}

/// 执行器 panic 时的 TestError
pub fn panic_error(payload: &(dyn Any + Send), module: &str, path: &str) -> TestError {
    let message = if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    };

    TestError {
        kind: "Panic".to_string(),
        stack_trace: format!("panicked while applying {}/{}: {}", module, path, message),
        message,
    }
}

/// 错误及其所有 source，最外层在前
pub fn error_chain(err: &(dyn Error + 'static)) -> String {
    let mut text = err.to_string();
    let mut source = err.source();
    let mut index = 0;

    if source.is_some() {
        text.push_str("\n\nCaused by:");
    }
    while let Some(cause) = source {
        text.push_str(&format!("\n    {}: {}", index, cause));
        source = cause.source();
        index += 1;
    }
    text
}

/// 带三位行号的步骤文本
pub fn numbered_listing(text: &str) -> String {
    text.lines()
        .enumerate()
        .map(|(index, line)| format!("{:03}>  {}\n", index + 1, line))
        .collect()
}

pub fn script_listing(script: &ScriptExecutionError) -> String {
    format!(
        "For yaml file, check line {} of statement (step starting at line {} of the file):\n{}",
        script.line_number,
        script.step_line,
        numbered_listing(&script.source_text)
    )
}
