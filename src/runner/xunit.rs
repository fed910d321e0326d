use std::fs;
use std::io::{self, Cursor};
use std::path::Path;
use std::string::FromUtf8Error;

use quick_xml::Writer;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use thiserror::Error;
use tracing::info;

use super::types::{TestCase, TestSuite};
use crate::error::ModtestError;

#[derive(Error, Debug)]
pub enum ReportError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("XML error: {0}")]
    Xml(#[from] quick_xml::Error),

    #[error("invalid UTF-8 in report: {0}")]
    Utf8(#[from] FromUtf8Error),
}

/// 生成 xUnit 格式的报告
///
/// 结构：`<testsuite name tests errors failures skip>`，每个测试文件一个
/// `<testcase classname name time>`，失败的文件带
/// `<error type message>诊断文本</error>`。
pub fn render(suite: &TestSuite) -> Result<String, ReportError> {
    let mut writer = Writer::new_with_indent(Cursor::new(Vec::new()), b' ', 2);

    writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;

    let tests = suite.tests.to_string();
    let errors = suite.errors.to_string();
    let failures = suite.failures.to_string();
    let skip = suite.skip.to_string();
    let root = BytesStart::new("testsuite").with_attributes([
        ("name", suite.name.as_str()),
        ("tests", tests.as_str()),
        ("errors", errors.as_str()),
        ("failures", failures.as_str()),
        ("skip", skip.as_str()),
    ]);
    writer.write_event(Event::Start(root))?;

    for test_case in &suite.test_cases {
        write_case(&mut writer, test_case)?;
    }

    writer.write_event(Event::End(BytesEnd::new("testsuite")))?;

    Ok(String::from_utf8(writer.into_inner().into_inner())?)
}

fn write_case(writer: &mut Writer<Cursor<Vec<u8>>>, test_case: &TestCase) -> Result<(), ReportError> {
    let time = format!("{:.6}", test_case.time);
    let element = BytesStart::new("testcase").with_attributes([
        ("classname", test_case.classname.as_str()),
        ("name", test_case.name.as_str()),
        ("time", time.as_str()),
    ]);

    let Some(error) = &test_case.error else {
        writer.write_event(Event::Empty(element))?;
        return Ok(());
    };

    writer.write_event(Event::Start(element))?;
    let error_element = BytesStart::new("error").with_attributes([
        ("type", error.kind.as_str()),
        ("message", error.message.as_str()),
    ]);
    writer.write_event(Event::Start(error_element))?;
    writer.write_event(Event::Text(BytesText::new(&error.stack_trace)))?;
    writer.write_event(Event::End(BytesEnd::new("error")))?;
    writer.write_event(Event::End(BytesEnd::new("testcase")))?;
    Ok(())
}

/// 生成报告并写入文件（UTF-8）
pub fn write_report(suite: &TestSuite, path: &Path) -> crate::Result<()> {
    let report = render(suite)?;
    fs::write(path, report).map_err(|source| ModtestError::ReportWrite {
        path: path.to_path_buf(),
        source,
    })?;
    info!("Report written to {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::types::TestError;
    use quick_xml::Reader;
    use std::collections::HashMap;
    use tempfile::TempDir;

    /// 解析后的元素：(名称, 属性, 文本)
    type Element = (String, HashMap<String, String>, String);

    fn parse(report: &str) -> Vec<Element> {
        let mut reader = Reader::from_str(report);
        reader.config_mut().trim_text(true);
        let mut elements: Vec<Element> = Vec::new();

        loop {
            match reader.read_event().unwrap() {
                Event::Start(e) | Event::Empty(e) => {
                    let name = String::from_utf8(e.name().as_ref().to_vec()).unwrap();
                    let attributes = e
                        .attributes()
                        .map(|a| {
                            let a = a.unwrap();
                            (
                                String::from_utf8(a.key.as_ref().to_vec()).unwrap(),
                                a.unescape_value().unwrap().into_owned(),
                            )
                        })
                        .collect();
                    elements.push((name, attributes, String::new()));
                }
                Event::Text(text) => {
                    if let Some(last) = elements.last_mut() {
                        last.2.push_str(&text.unescape().unwrap());
                    }
                }
                Event::Eof => break,
                _ => {}
            }
        }
        elements
    }

    fn sample_suite() -> TestSuite {
        let mut suite = TestSuite::default();
        suite.record(TestCase {
            classname: "sale".to_string(),
            name: "test/test1.yml".to_string(),
            time: 0.0125,
            error: Some(TestError {
                kind: "ScriptExecutionError".to_string(),
                message: "no such table: <missing> & \"quoted\"".to_string(),
                stack_trace: "001>  SELECT * FROM missing;\n002>  -- é ✓".to_string(),
            }),
        });
        suite.record(TestCase {
            classname: "sale".to_string(),
            name: "test/test2.sql".to_string(),
            time: 0.5,
            error: None,
        });
        suite
    }

    #[test]
    fn test_render_structure() {
        let report = render(&sample_suite()).unwrap();
        assert!(report.starts_with("<?xml version=\"1.0\" encoding=\"UTF-8\"?>"));

        let elements = parse(&report);
        let names: Vec<_> = elements.iter().map(|(n, _, _)| n.as_str()).collect();
        assert_eq!(names, vec!["testsuite", "testcase", "error", "testcase"]);

        let suite = &elements[0].1;
        assert_eq!(suite["name"], "modtest");
        assert_eq!(suite["tests"], "2");
        assert_eq!(suite["errors"], "1");
        assert_eq!(suite["failures"], "0");
        assert_eq!(suite["skip"], "0");

        let first = &elements[1].1;
        assert_eq!(first["classname"], "sale");
        assert_eq!(first["name"], "test/test1.yml");
        assert_eq!(first["time"], "0.012500");

        let (_, error, text) = &elements[2];
        assert_eq!(error["type"], "ScriptExecutionError");
        assert_eq!(error["message"], "no such table: <missing> & \"quoted\"");
        assert_eq!(text, "001>  SELECT * FROM missing;\n002>  -- é ✓");

        assert_eq!(elements[3].1["time"], "0.500000");
    }

    #[test]
    fn test_empty_suite() {
        let report = render(&TestSuite::default()).unwrap();
        let elements = parse(&report);
        assert_eq!(elements.len(), 1);
        assert_eq!(elements[0].1["tests"], "0");
    }

    #[test]
    fn test_write_report() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("report.xml");

        write_report(&sample_suite(), &path).unwrap();
        let written = fs::read_to_string(&path).unwrap();
        assert_eq!(written, render(&sample_suite()).unwrap());
    }

    #[test]
    fn test_write_report_to_missing_directory() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("missing").join("report.xml");

        let err = write_report(&sample_suite(), &path).unwrap_err();
        assert!(matches!(err, ModtestError::ReportWrite { .. }));
    }
}
