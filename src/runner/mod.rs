pub mod diagnostics;
pub mod executor;
pub mod reporter;
pub mod types;
pub mod xunit;

pub use executor::{RunOptions, TestRunner};
pub use reporter::TestReporter;
pub use types::{SUITE_NAME, TestCase, TestError, TestSuite};
pub use xunit::ReportError;
