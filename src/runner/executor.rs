use std::panic::{self, AssertUnwindSafe};
use std::path::Path;
use std::time::Instant;

use tracing::{debug, info, warn};

use super::diagnostics;
use super::types::{TestCase, TestSuite};
use super::xunit;
use crate::Result;
use crate::discovery::{ModuleSelection, TestDiscovery, TestFile};
use crate::loader::{BuiltinImporter, FileResolver, ImportBackend, ImportOptions, TestFileLoader};
use crate::registry::{ModuleRegistry, ModuleState};
use crate::store::{Database, Session, StoreResult};

/// 运行选项
#[derive(Debug, Clone, PartialEq)]
pub struct RunOptions {
    /// "all" 选择时纳入的模块状态
    pub states: Vec<ModuleState>,

    /// 是否在脚本错误的诊断中附带步骤源码清单
    pub script_context: bool,

    /// 结构化导入选项
    pub import: ImportOptions,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            states: ModuleState::TESTABLE.to_vec(),
            script_context: true,
            import: ImportOptions::default(),
        }
    }
}

/// 运行专用的数据库会话
///
/// 离开作用域时总会被关闭，包括出错和 panic 的路径。
struct DedicatedSession {
    session: Box<dyn Session>,
    closed: bool,
}

impl DedicatedSession {
    fn open(database: &dyn Database) -> StoreResult<Self> {
        debug!("Opening dedicated test session");
        Ok(Self {
            session: database.open_session()?,
            closed: false,
        })
    }

    fn session(&mut self) -> &mut dyn Session {
        self.session.as_mut()
    }

    fn close(mut self) -> StoreResult<()> {
        debug!("Closing dedicated test session");
        self.closed = true;
        self.session.close()
    }
}

impl Drop for DedicatedSession {
    fn drop(&mut self) {
        if !self.closed {
            self.closed = true;
            if let Err(e) = self.session.close() {
                warn!("Failed to close test session: {}", e);
            }
        }
    }
}

/// 模块测试运行器
pub struct TestRunner<'a> {
    registry: &'a dyn ModuleRegistry,
    database: &'a dyn Database,
    resolver: &'a dyn FileResolver,
    importer: &'a dyn ImportBackend,
    options: RunOptions,
}

impl<'a> TestRunner<'a> {
    pub fn new(
        registry: &'a dyn ModuleRegistry,
        database: &'a dyn Database,
        resolver: &'a dyn FileResolver,
    ) -> Self {
        Self {
            registry,
            database,
            resolver,
            importer: &BuiltinImporter,
            options: RunOptions::default(),
        }
    }

    /// 替换结构化导入实现
    pub fn with_importer(mut self, importer: &'a dyn ImportBackend) -> Self {
        self.importer = importer;
        self
    }

    pub fn with_options(mut self, options: RunOptions) -> Self {
        self.options = options;
        self
    }

    pub fn options(&self) -> &RunOptions {
        &self.options
    }

    /// 运行选中模块的所有测试文件
    ///
    /// 单个文件的失败只记录在结果中；只有发现阶段和会话本身的错误会中止运行。
    /// 每个模块结束后回滚，运行结束时关闭会话。
    pub fn run(&self, selection: &ModuleSelection) -> Result<TestSuite> {
        let discovery = TestDiscovery::new(self.registry);
        let modules = discovery.resolve_modules(selection, &self.options.states)?;
        let declared = discovery.list_declared_tests(&modules)?;

        let mut dedicated = DedicatedSession::open(self.database)?;
        let loader = TestFileLoader::new(self.resolver, self.importer, self.options.import);
        let mut suite = TestSuite::default();

        for module_tests in &declared {
            info!(
                "Testing module {} ({} file(s))",
                module_tests.module,
                module_tests.files.len()
            );

            for test_file in module_tests.test_files() {
                let test_case = self.run_file(&loader, dedicated.session(), &test_file);
                suite.record(test_case);
            }

            debug!("Rolling back changes of module {}", module_tests.module);
            dedicated.session().rollback()?;
        }

        dedicated.close()?;

        info!(
            "Finished: {} test(s), {} error(s) in {:.3}s",
            suite.tests,
            suite.errors,
            suite.total_time()
        );
        Ok(suite)
    }

    /// 运行并返回 xUnit 报告文本
    pub fn run_xunit(&self, selection: &ModuleSelection) -> Result<String> {
        let suite = self.run(selection)?;
        Ok(xunit::render(&suite)?)
    }

    /// 运行并把 xUnit 报告写入文件
    ///
    /// 写入完成即返回 `true`，测试是否出错要看报告内容；写文件失败时返回 `ReportWrite`。
    pub fn run_to_file(&self, selection: &ModuleSelection, path: impl AsRef<Path>) -> Result<bool> {
        self.run_with_report(selection, Some(path.as_ref()))?;
        Ok(true)
    }

    /// 运行；给出 `report` 时同时写入 xUnit 报告，并把结果交还调用方
    pub fn run_with_report(
        &self,
        selection: &ModuleSelection,
        report: Option<&Path>,
    ) -> Result<TestSuite> {
        let suite = self.run(selection)?;
        if let Some(path) = report {
            xunit::write_report(&suite, path)?;
        }
        Ok(suite)
    }

    fn run_file(
        &self,
        loader: &TestFileLoader<'_>,
        session: &mut dyn Session,
        test_file: &TestFile,
    ) -> TestCase {
        let TestFile { module, path } = test_file;
        let start = Instant::now();

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| loader.load(session, module, path)));
        let time = start.elapsed().as_secs_f64();

        let error = match outcome {
            Ok(Ok(())) => {
                info!("{}/{} passed in {:.3}s", module, path, time);
                None
            }
            Ok(Err(e)) => {
                warn!("{}/{} failed: {}", module, path, e);
                Some(diagnostics::test_error(&e, self.options.script_context))
            }
            Err(payload) => {
                warn!("{}/{} panicked", module, path);
                Some(diagnostics::panic_error(payload.as_ref(), module, path))
            }
        };

        TestCase {
            classname: module.clone(),
            name: path.clone(),
            time,
            error,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::discovery::DiscoveryError;
    use crate::loader::{IdRefs, LoadError};
    use crate::registry::ModuleDescriptor;
    use crate::store::{SqlValue, StoreError};
    use std::cell::RefCell;
    use std::rc::Rc;

    type Journal = Rc<RefCell<Vec<String>>>;

    struct FakeRegistry;

    impl ModuleRegistry for FakeRegistry {
        fn modules_by_state(&self, _states: &[ModuleState]) -> std::result::Result<Vec<String>, DiscoveryError> {
            Ok(vec!["sale".to_string(), "stock".to_string()])
        }

        fn load_metadata(&self, module: &str) -> std::result::Result<ModuleDescriptor, DiscoveryError> {
            let test = match module {
                "sale" => vec!["test/a.sql".to_string(), "test/boom.yml".to_string()],
                "stock" => vec!["test/b.sql".to_string()],
                _ => return Err(DiscoveryError::UnknownModule(module.to_string())),
            };
            Ok(ModuleDescriptor {
                name: Some(module.to_string()),
                test,
                ..Default::default()
            })
        }
    }

    struct FakeResolver;

    impl FileResolver for FakeResolver {
        fn open_module_file(&self, _module: &str, path: &str) -> std::result::Result<String, LoadError> {
            match path {
                "test/a.sql" => Ok("INSERT INTO a VALUES (1);".to_string()),
                "test/b.sql" => Ok("FAIL;".to_string()),
                _ => Ok(String::new()),
            }
        }
    }

    struct PanickingImporter;

    impl ImportBackend for PanickingImporter {
        fn apply_csv(
            &self,
            _: &mut dyn Session,
            _: &str,
            _: &str,
            _: &str,
            _: Option<&mut IdRefs>,
            _: ImportOptions,
        ) -> std::result::Result<(), LoadError> {
            Ok(())
        }

        fn apply_script(
            &self,
            _: &mut dyn Session,
            _: &str,
            _: &str,
            _: Option<&mut IdRefs>,
            _: ImportOptions,
        ) -> std::result::Result<(), LoadError> {
            panic!("importer exploded");
        }

        fn apply_document(
            &self,
            _: &mut dyn Session,
            _: &str,
            _: &str,
            _: Option<&mut IdRefs>,
            _: ImportOptions,
        ) -> std::result::Result<(), LoadError> {
            Ok(())
        }
    }

    struct FakeSession {
        journal: Journal,
        fail_rollback: bool,
    }

    impl Session for FakeSession {
        fn execute(&mut self, statement: &str) -> StoreResult<()> {
            self.journal.borrow_mut().push(format!("execute {}", statement));
            if statement == "FAIL" {
                return Err(StoreError::Closed);
            }
            Ok(())
        }

        fn execute_params(&mut self, _: &str, _: &[SqlValue]) -> StoreResult<usize> {
            Ok(0)
        }

        fn query_row(&mut self, _: &str, _: &[SqlValue]) -> StoreResult<Option<Vec<SqlValue>>> {
            Ok(None)
        }

        fn rollback(&mut self) -> StoreResult<()> {
            self.journal.borrow_mut().push("rollback".to_string());
            if self.fail_rollback {
                return Err(StoreError::Closed);
            }
            Ok(())
        }

        fn close(&mut self) -> StoreResult<()> {
            self.journal.borrow_mut().push("close".to_string());
            Ok(())
        }
    }

    struct FakeDatabase {
        journal: Journal,
        fail_rollback: bool,
    }

    impl FakeDatabase {
        fn new(fail_rollback: bool) -> Self {
            Self {
                journal: Rc::new(RefCell::new(Vec::new())),
                fail_rollback,
            }
        }

        fn journal(&self) -> Vec<String> {
            self.journal.borrow().clone()
        }
    }

    impl Database for FakeDatabase {
        fn open_session(&self) -> StoreResult<Box<dyn Session>> {
            self.journal.borrow_mut().push("open".to_string());
            Ok(Box::new(FakeSession {
                journal: Rc::clone(&self.journal),
                fail_rollback: self.fail_rollback,
            }))
        }
    }

    #[test]
    fn test_runs_every_file_and_rolls_back_per_module() {
        let database = FakeDatabase::new(false);
        let runner = TestRunner::new(&FakeRegistry, &database, &FakeResolver)
            .with_importer(&PanickingImporter);

        let suite = runner.run(&ModuleSelection::All).unwrap();

        assert_eq!(suite.tests, 3);
        assert_eq!(suite.errors, 2);
        assert_eq!(suite.failures, 0);
        assert_eq!(suite.skip, 0);

        let names: Vec<_> = suite
            .test_cases
            .iter()
            .map(|c| format!("{}:{}", c.classname, c.name))
            .collect();
        assert_eq!(names, vec!["sale:test/a.sql", "sale:test/boom.yml", "stock:test/b.sql"]);

        assert!(suite.test_cases[0].is_success());
        let panicked = suite.test_cases[1].error.as_ref().unwrap();
        assert_eq!(panicked.kind, "Panic");
        assert_eq!(panicked.message, "importer exploded");
        let failed = suite.test_cases[2].error.as_ref().unwrap();
        assert_eq!(failed.kind, "SqlStatementError");

        assert_eq!(
            database.journal(),
            vec![
                "open",
                "execute INSERT INTO a VALUES (1)",
                "rollback",
                "execute FAIL",
                "rollback",
                "close",
            ]
        );
    }

    #[test]
    fn test_session_closed_when_rollback_fails() {
        let database = FakeDatabase::new(true);
        let runner = TestRunner::new(&FakeRegistry, &database, &FakeResolver)
            .with_importer(&PanickingImporter);

        let result = runner.run(&ModuleSelection::Modules(vec!["stock".to_string()]));

        assert!(result.is_err());
        assert_eq!(database.journal(), vec!["open", "execute FAIL", "rollback", "close"]);
    }

    #[test]
    fn test_discovery_error_aborts_before_opening_session() {
        let database = FakeDatabase::new(false);
        let runner = TestRunner::new(&FakeRegistry, &database, &FakeResolver);

        let result = runner.run(&ModuleSelection::Modules(vec!["crm".to_string()]));

        assert!(result.is_err());
        assert!(database.journal().is_empty());
    }

    #[test]
    fn test_invalid_selection_is_rejected() {
        let database = FakeDatabase::new(false);
        let runner = TestRunner::new(&FakeRegistry, &database, &FakeResolver);

        let selection = ModuleSelection::Modules(vec!["sale".to_string(), "sale".to_string()]);
        assert!(runner.run(&selection).is_err());
        assert!(database.journal().is_empty());
    }
}
