/// 测试套件的固定名称
pub const SUITE_NAME: &str = "modtest";

/// 测试失败的详细信息
#[derive(Debug, Clone, PartialEq)]
pub struct TestError {
    /// 错误类型名（报告中的 `type` 属性）
    pub kind: String,

    /// 错误消息（报告中的 `message` 属性）
    pub message: String,

    /// 完整的诊断文本：错误链、脚本清单、上下文变量
    pub stack_trace: String,
}

/// 单个测试文件的执行结果
#[derive(Debug, Clone, PartialEq)]
pub struct TestCase {
    /// 模块名
    pub classname: String,

    /// 测试文件路径（相对模块目录）
    pub name: String,

    /// 执行耗时（秒）
    pub time: f64,

    /// 失败信息；成功时为 None
    pub error: Option<TestError>,
}

impl TestCase {
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// 一次运行的全部结果
///
/// `failures` 和 `skip` 目前总是 0：所有失败都记为 error。
#[derive(Debug, Clone, PartialEq)]
pub struct TestSuite {
    pub name: String,
    pub tests: usize,
    pub errors: usize,
    pub failures: usize,
    pub skip: usize,
    pub test_cases: Vec<TestCase>,
}

impl TestSuite {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            tests: 0,
            errors: 0,
            failures: 0,
            skip: 0,
            test_cases: Vec::new(),
        }
    }

    /// 追加一个结果并更新计数
    pub fn record(&mut self, test_case: TestCase) {
        self.tests += 1;
        if test_case.error.is_some() {
            self.errors += 1;
        }
        self.test_cases.push(test_case);
    }

    pub fn is_success(&self) -> bool {
        self.errors == 0 && self.failures == 0
    }

    pub fn passed(&self) -> usize {
        self.tests - self.errors - self.failures - self.skip
    }

    /// 所有测试的耗时之和（秒）
    pub fn total_time(&self) -> f64 {
        self.test_cases.iter().map(|c| c.time).sum()
    }
}

impl Default for TestSuite {
    fn default() -> Self {
        Self::new(SUITE_NAME)
    }
}
