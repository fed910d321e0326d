use crate::error::{ModtestError, Result};
use crate::registry::ModuleState;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

/// 配置文件名
pub const CONFIG_FILE: &str = "modtest.toml";

/// `modtest.toml` 的内容
///
/// 所有键都是可选的；相对路径以配置文件所在目录为基准。
#[derive(Debug, Clone, Deserialize, Default, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct RunnerConfig {
    /// 模块根目录列表
    #[serde(default)]
    pub addons_path: Vec<PathBuf>,

    /// SQLite 数据库文件
    #[serde(default)]
    pub database: Option<PathBuf>,

    /// "all" 选择时纳入的模块状态
    #[serde(default)]
    pub states: Option<Vec<String>>,

    #[serde(default)]
    pub script_context: Option<bool>,

    /// 是否记录运行历史
    #[serde(default)]
    pub history: Option<bool>,

    /// 默认报告路径
    #[serde(default)]
    pub report: Option<PathBuf>,

    /// 配置文件所在目录
    #[serde(skip)]
    pub base_dir: Option<PathBuf>,
}

impl RunnerConfig {
    /// 解析后的模块状态；未配置时为 installed 与 to upgrade
    pub fn states(&self) -> Result<Vec<ModuleState>> {
        let Some(states) = &self.states else {
            return Ok(ModuleState::TESTABLE.to_vec());
        };

        states
            .iter()
            .map(|s| {
                ModuleState::parse(s)
                    .ok_or_else(|| ModtestError::Config(format!("未知的模块状态: {}", s)))
            })
            .collect()
    }

    /// 模块根目录（已解析为绝对路径）
    pub fn addons_roots(&self) -> Vec<PathBuf> {
        self.addons_path.iter().map(|p| self.resolve(p)).collect()
    }

    pub fn database_path(&self) -> Option<PathBuf> {
        self.database.as_deref().map(|p| self.resolve(p))
    }

    pub fn report_path(&self) -> Option<PathBuf> {
        self.report.as_deref().map(|p| self.resolve(p))
    }

    pub fn script_context(&self) -> bool {
        self.script_context.unwrap_or(true)
    }

    pub fn history_enabled(&self) -> bool {
        self.history.unwrap_or(true)
    }

    fn resolve(&self, path: &Path) -> PathBuf {
        match &self.base_dir {
            Some(base) if path.is_relative() => base.join(path),
            _ => path.to_path_buf(),
        }
    }
}

/// 配置文件加载器
pub struct ConfigLoader;

impl ConfigLoader {
    /// 从指定路径加载配置文件
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<RunnerConfig> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| {
            ModtestError::Config(format!("无法读取配置文件 {}: {}", path.display(), e))
        })?;

        let mut config: RunnerConfig = toml::from_str(&content).map_err(|e| {
            ModtestError::Config(format!("无法解析配置文件 {}: {}", path.display(), e))
        })?;
        config.base_dir = path.parent().map(Path::to_path_buf);
        Ok(config)
    }

    /// 查找并加载配置文件
    /// 查找顺序：
    /// 1. 当前目录
    /// 2. 父目录递归查找
    /// 3. 用户配置目录 ~/.config/modtest/
    ///
    /// 找到但无法解析的配置文件是错误；没有找到返回 None。
    pub fn find_and_load() -> Result<Option<RunnerConfig>> {
        match Self::find() {
            Some(path) => Self::load_from_path(path).map(Some),
            None => Ok(None),
        }
    }

    /// 查找配置文件路径
    pub fn find() -> Option<PathBuf> {
        let current = std::env::current_dir().ok()?;
        Self::find_from(&current).or_else(Self::user_config_path)
    }

    /// 从指定目录开始向上查找
    pub fn find_from(start: &Path) -> Option<PathBuf> {
        start
            .ancestors()
            .map(|dir| dir.join(CONFIG_FILE))
            .find(|path| path.is_file())
    }

    fn user_config_path() -> Option<PathBuf> {
        let home = dirs::home_dir()?;
        let config_path = home.join(".config").join("modtest").join(CONFIG_FILE);
        config_path.is_file().then_some(config_path)
    }
}
