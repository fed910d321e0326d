use std::fmt;
use std::path::PathBuf;
use std::time::Instant;

use anyhow::{Context, bail};
use chrono::Utc;
use clap::{Args, Parser, Subcommand};
use comfy_table::presets::UTF8_FULL;
use comfy_table::{Attribute, Cell, Color, Table};
use inquire::MultiSelect;
use tracing::debug;

use modtest::config::{ConfigLoader, RunnerConfig};
use modtest::discovery::{ModuleSelection, TestDiscovery};
use modtest::history::{self, HistoryFilter, HistoryStorage};
use modtest::loader::ModuleFileResolver;
use modtest::registry::{AddonsRegistry, ModuleRegistry, ModuleState};
use modtest::runner::{RunOptions, TestReporter, TestRunner, xunit};
use modtest::store::SqliteDatabase;

pub type Result<T> = std::result::Result<T, anyhow::Error>;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// 配置文件（缺省时从当前目录向上查找 modtest.toml）
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// 运行模块声明的测试文件
    Run(RunArgs),

    /// 列出模块声明的测试文件
    List {
        /// 模块名；缺省为所有可测试的模块
        modules: Vec<String>,

        #[command(flatten)]
        addons: AddonsArgs,
    },

    /// 查看运行历史
    History {
        /// 显示的条数
        #[arg(short = 'n', long, default_value_t = 20)]
        limit: usize,

        /// 只看跑过该模块的运行
        #[arg(short, long, value_name = "MODULE")]
        module: Option<String>,

        /// 只看有错误的运行（与 --module 同用时要求该模块出错）
        #[arg(long)]
        failed: bool,
    },
}

#[derive(Args)]
pub struct AddonsArgs {
    /// 模块根目录（可重复，覆盖配置文件）
    #[arg(long = "addons", value_name = "DIR")]
    pub addons: Vec<PathBuf>,
}

#[derive(Args)]
pub struct RunArgs {
    /// 模块名；缺省或 "all" 表示所有可测试的模块
    pub modules: Vec<String>,

    /// 运行所有可测试的模块
    #[arg(long, conflicts_with_all = ["modules", "pick"])]
    pub all: bool,

    /// 交互式选择模块
    #[arg(long, conflicts_with = "modules")]
    pub pick: bool,

    /// 把 xUnit 报告写入文件
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// 把 xUnit 报告打印到标准输出（代替控制台摘要）
    #[arg(long)]
    pub xunit: bool,

    #[command(flatten)]
    pub addons: AddonsArgs,

    /// SQLite 数据库文件（覆盖配置文件）
    #[arg(long, value_name = "FILE")]
    pub database: Option<PathBuf>,

    /// 不在脚本错误中附带步骤源码清单
    #[arg(long)]
    pub no_script_context: bool,

    /// 显示完整的错误诊断
    #[arg(short, long)]
    pub verbose: bool,
}

/// 执行命令；返回是否成功（没有任何测试出错）
pub fn execute(cli: Cli) -> Result<bool> {
    match cli.command {
        Commands::History { limit, module, failed } => {
            let filter = HistoryFilter { module, failed_only: failed };
            history::list_history(&HistoryStorage::from_env(), &filter, limit)?;
            Ok(true)
        }
        Commands::List { modules, addons } => {
            let config = load_config(cli.config)?;
            list_tests(&config, &modules, &addons)?;
            Ok(true)
        }
        Commands::Run(args) => {
            let config = load_config(cli.config)?;
            run_tests(&config, args)
        }
    }
}

fn load_config(path: Option<PathBuf>) -> Result<RunnerConfig> {
    let config = match path {
        Some(path) => ConfigLoader::load_from_path(path)?,
        None => ConfigLoader::find_and_load()?.unwrap_or_default(),
    };
    debug!("Using config: {:?}", config);
    Ok(config)
}

fn build_registry(config: &RunnerConfig, addons: &AddonsArgs) -> Result<AddonsRegistry> {
    let roots = if addons.addons.is_empty() {
        config.addons_roots()
    } else {
        addons.addons.clone()
    };

    if roots.is_empty() {
        bail!("no addons directory configured (use --addons or addons_path in modtest.toml)");
    }
    if let Some(missing) = roots.iter().find(|root| !root.is_dir()) {
        bail!("addons directory not found: {}", missing.display());
    }
    Ok(AddonsRegistry::new(roots))
}

fn run_tests(config: &RunnerConfig, args: RunArgs) -> Result<bool> {
    let registry = build_registry(config, &args.addons)?;
    let states = config.states()?;

    let database_path = args
        .database
        .clone()
        .or_else(|| config.database_path())
        .context("no database configured (use --database or database in modtest.toml)")?;
    if !database_path.is_file() {
        bail!("database file not found: {}", database_path.display());
    }
    let database = SqliteDatabase::new(database_path);
    let resolver = ModuleFileResolver::new(registry.clone());

    let selection = if args.pick {
        pick_modules(&registry, &states)?
    } else if args.all || args.modules.is_empty() {
        ModuleSelection::All
    } else {
        ModuleSelection::from_names(args.modules.iter().cloned())
    };

    let options = RunOptions {
        states,
        script_context: config.script_context() && !args.no_script_context,
        ..RunOptions::default()
    };
    let runner = TestRunner::new(&registry, &database, &resolver).with_options(options);
    let reporter = TestReporter::new(args.verbose);

    if !args.xunit {
        reporter.print_header(&selection.to_string());
    }

    let report_path = args.output.or_else(|| config.report_path());

    let started_at = Utc::now();
    let start = Instant::now();
    let suite = runner.run_with_report(&selection, report_path.as_deref())?;
    let duration = start.elapsed();

    if args.xunit {
        println!("{}", xunit::render(&suite)?);
    } else {
        reporter.print_suite(&suite);
    }

    if config.history_enabled() {
        let record = history::build_record(
            &selection.to_string(),
            &suite,
            started_at,
            duration,
            report_path.as_deref(),
        );
        history::record_run(&HistoryStorage::from_env(), &record);
    }

    Ok(suite.is_success())
}

/// 模块选项（带状态显示）
#[derive(Clone)]
struct ModuleOption {
    name: String,
    state: ModuleState,
}

impl fmt::Display for ModuleOption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.state)
    }
}

fn pick_modules(registry: &AddonsRegistry, states: &[ModuleState]) -> Result<ModuleSelection> {
    let options = registry
        .modules_by_state(states)?
        .into_iter()
        .map(|name| {
            let state = registry.load_metadata(&name)?.state;
            Ok(ModuleOption { name, state })
        })
        .collect::<Result<Vec<_>>>()?;

    if options.is_empty() {
        bail!("no modules in states {:?}", states);
    }

    let selected = MultiSelect::new("Select modules to test:", options)
        .with_page_size(15)
        .with_help_message("Space to select, Enter to finish, type to filter")
        .prompt()
        .map_err(|e| anyhow::anyhow!("module selection canceled: {}", e))?;

    if selected.is_empty() {
        bail!("no module selected");
    }
    Ok(ModuleSelection::Modules(
        selected.into_iter().map(|o| o.name).collect(),
    ))
}

fn list_tests(config: &RunnerConfig, modules: &[String], addons: &AddonsArgs) -> Result<()> {
    let registry = build_registry(config, addons)?;
    let states = config.states()?;

    let selection = if modules.is_empty() {
        ModuleSelection::All
    } else {
        ModuleSelection::from_names(modules.iter().cloned())
    };

    let discovery = TestDiscovery::new(&registry);
    let names = discovery.resolve_modules(&selection, &states)?;
    let declared = discovery.list_declared_tests(&names)?;

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_header(vec!["Module", "State", "Test files"]);

    for module_tests in &declared {
        let state = registry.load_metadata(&module_tests.module)?.state;
        let files = if module_tests.files.is_empty() {
            Cell::new("-").add_attribute(Attribute::Dim)
        } else {
            Cell::new(module_tests.files.join("\n"))
        };
        table.add_row(vec![
            Cell::new(&module_tests.module).fg(Color::Cyan),
            Cell::new(state),
            files,
        ]);
    }

    println!("{}", table);
    Ok(())
}
