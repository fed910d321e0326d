use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use thiserror::Error;
use tracing::{debug, info};

use crate::registry::{ModuleRegistry, ModuleState};

/// 选择 "所有模块" 的保留名
pub const ALL_MODULES: &str = "all";

#[derive(Error, Debug)]
pub enum DiscoveryError {
    #[error("invalid module selection: {0}")]
    InvalidSelection(String),

    #[error("unknown module: {0}")]
    UnknownModule(String),

    #[error("cannot read manifest of module {module}: {source}")]
    ManifestRead {
        module: String,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot parse manifest of module {module}: {source}")]
    ManifestParse {
        module: String,
        #[source]
        source: toml::de::Error,
    },

    #[error("module registry failure: {0}")]
    Registry(String),
}

/// 要测试的模块
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ModuleSelection {
    /// 所有处于可测试状态的模块
    #[default]
    All,
    /// 显式列出的模块，保持给定顺序
    Modules(Vec<String>),
}

impl ModuleSelection {
    /// 从名称列表构造；只要其中有 "all" 就代表全部模块
    pub fn from_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let names: Vec<String> = names.into_iter().map(Into::into).collect();
        if names.iter().any(|n| n == ALL_MODULES) {
            ModuleSelection::All
        } else {
            ModuleSelection::Modules(names)
        }
    }

    pub fn is_all(&self) -> bool {
        matches!(self, ModuleSelection::All)
    }

    /// 显式列表必须是非空、无空白、无重复的模块名
    pub fn validate(&self) -> Result<(), DiscoveryError> {
        let ModuleSelection::Modules(names) = self else {
            return Ok(());
        };

        let mut seen = HashSet::new();
        for name in names {
            if name.trim().is_empty() {
                return Err(DiscoveryError::InvalidSelection(
                    "empty module name".to_string(),
                ));
            }
            if name.chars().any(char::is_whitespace) {
                return Err(DiscoveryError::InvalidSelection(format!(
                    "module name contains whitespace: {:?}",
                    name
                )));
            }
            if !seen.insert(name.as_str()) {
                return Err(DiscoveryError::InvalidSelection(format!(
                    "module listed twice: {}",
                    name
                )));
            }
        }
        Ok(())
    }
}

impl FromStr for ModuleSelection {
    type Err = DiscoveryError;

    /// 解析 "all" 或逗号分隔的模块列表，如 "sale,stock"
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let selection = Self::from_names(s.split(',').map(str::trim));
        selection.validate()?;
        Ok(selection)
    }
}

impl fmt::Display for ModuleSelection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModuleSelection::All => f.write_str(ALL_MODULES),
            ModuleSelection::Modules(names) => f.write_str(&names.join(",")),
        }
    }
}

/// 一个声明的测试文件：(模块, 相对路径)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestFile {
    pub module: String,
    pub path: String,
}

/// 一个模块及其声明的测试文件（声明顺序）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleTests {
    pub module: String,
    pub files: Vec<String>,
}

impl ModuleTests {
    pub fn test_files(&self) -> impl Iterator<Item = TestFile> + '_ {
        self.files.iter().map(|path| TestFile {
            module: self.module.clone(),
            path: path.clone(),
        })
    }
}

/// 把模块选择展开成 (模块, 测试文件) 列表
pub struct TestDiscovery<'a> {
    registry: &'a dyn ModuleRegistry,
}

impl<'a> TestDiscovery<'a> {
    pub fn new(registry: &'a dyn ModuleRegistry) -> Self {
        Self { registry }
    }

    /// 解析模块选择
    ///
    /// "all" 查询注册表中状态属于 `states` 的模块；显式列表原样返回。
    pub fn resolve_modules(
        &self,
        selection: &ModuleSelection,
        states: &[ModuleState],
    ) -> Result<Vec<String>, DiscoveryError> {
        selection.validate()?;

        match selection {
            ModuleSelection::All => {
                let modules = self.registry.modules_by_state(states)?;
                info!("Selected {} module(s) for testing", modules.len());
                Ok(modules)
            }
            ModuleSelection::Modules(names) => Ok(names.clone()),
        }
    }

    /// 读取每个模块声明的测试文件
    ///
    /// 输出顺序与输入模块顺序一致；没有声明测试的模块得到空列表。
    pub fn list_declared_tests(
        &self,
        modules: &[String],
    ) -> Result<Vec<ModuleTests>, DiscoveryError> {
        modules
            .iter()
            .map(|module| {
                let descriptor = self.registry.load_metadata(module)?;
                debug!("Module {} declares {} test file(s)", module, descriptor.test.len());
                Ok(ModuleTests {
                    module: module.clone(),
                    files: descriptor.test,
                })
            })
            .collect()
    }
}
