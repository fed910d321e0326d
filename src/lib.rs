pub mod config;
pub mod discovery;
pub mod error;
pub mod history;
pub mod loader;
pub mod logger;
pub mod registry;
pub mod runner;
pub mod store;

// Re-export commonly used types
pub use discovery::{ModuleSelection, TestDiscovery};
pub use error::{ModtestError, Result};
pub use runner::{TestCase, TestError, TestRunner, TestSuite};
