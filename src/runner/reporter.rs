use crate::runner::types::{TestCase, TestSuite};
use colored::Colorize;

/// 控制台输出
pub struct TestReporter {
    verbose: bool,
}

impl TestReporter {
    pub fn new(verbose: bool) -> Self {
        Self { verbose }
    }

    /// 打印测试开始
    pub fn print_header(&self, selection: &str) {
        println!("\nRunning module tests for {}...\n", selection.bold());
    }

    /// 打印单个测试结果
    pub fn print_case(&self, test_case: &TestCase) {
        let (symbol, color) = if test_case.is_success() {
            ("✓", "green")
        } else {
            ("✗", "red")
        };

        println!(
            " {} {} {} ({}ms)",
            symbol.color(color),
            test_case.classname.cyan(),
            test_case.name,
            (test_case.time * 1000.0).round() as u64
        );

        if let Some(error) = &test_case.error {
            println!("   {}: {}", error.kind.red().bold(), error.message);

            // verbose 模式显示完整诊断
            if self.verbose {
                for line in error.stack_trace.lines() {
                    println!("   {}", line.dimmed());
                }
            }
            println!();
        }
    }

    /// 打印全部结果
    pub fn print_suite(&self, suite: &TestSuite) {
        for test_case in &suite.test_cases {
            self.print_case(test_case);
        }
        self.print_summary(suite);
    }

    /// 打印测试摘要
    pub fn print_summary(&self, suite: &TestSuite) {
        println!("\n{}", "━".repeat(50));
        println!("{}", "Summary".bold());
        println!("{}", "━".repeat(50));

        if suite.tests == 0 {
            println!("  {}: {}", "Tests".bold(), "no test files declared".dimmed());
        } else if suite.errors == 0 {
            println!(
                "  {}: {} passed, {} total",
                "Tests".bold(),
                suite.passed().to_string().green(),
                suite.tests
            );
        } else {
            println!(
                "  {}: {} passed, {} errors, {} total",
                "Tests".bold(),
                suite.passed().to_string().green(),
                suite.errors.to_string().red(),
                suite.tests
            );
        }

        println!("  {}: {:.3}s", "Duration".bold(), suite.total_time());
        println!();
    }
}

impl Default for TestReporter {
    fn default() -> Self {
        Self::new(false)
    }
}
