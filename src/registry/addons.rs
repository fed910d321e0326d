use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, trace};

use super::ModuleRegistry;
use super::types::{ModuleDescriptor, ModuleState};
use crate::discovery::DiscoveryError;

/// 模块描述文件名
pub const MANIFEST_FILE: &str = "__manifest__.toml";

/// 基于 addons 目录的模块注册表
///
/// 每个 root 下的子目录，只要包含 `__manifest__.toml`，就是一个模块。
/// 多个 root 中出现同名模块时，先出现的 root 优先。
#[derive(Debug, Clone)]
pub struct AddonsRegistry {
    roots: Vec<PathBuf>,
}

impl AddonsRegistry {
    pub fn new<I, P>(roots: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        Self {
            roots: roots.into_iter().map(Into::into).collect(),
        }
    }

    pub fn roots(&self) -> &[PathBuf] {
        &self.roots
    }

    /// 查找模块目录
    pub fn module_path(&self, module: &str) -> Option<PathBuf> {
        if !is_plain_name(module) {
            return None;
        }
        self.roots
            .iter()
            .map(|root| root.join(module))
            .find(|dir| dir.join(MANIFEST_FILE).is_file())
    }

    /// 列出所有模块名（按 root 顺序，每个 root 内按名称排序，去重）
    pub fn module_names(&self) -> Result<Vec<String>, DiscoveryError> {
        let mut names: Vec<String> = Vec::new();

        for root in &self.roots {
            if !root.is_dir() {
                debug!("Skipping missing addons root {}", root.display());
                continue;
            }

            let entries = fs::read_dir(root).map_err(|e| {
                DiscoveryError::Registry(format!("cannot read {}: {}", root.display(), e))
            })?;

            let mut found: Vec<String> = entries
                .filter_map(|entry| entry.ok())
                .filter(|entry| entry.path().join(MANIFEST_FILE).is_file())
                .filter_map(|entry| entry.file_name().to_str().map(str::to_string))
                .collect();
            found.sort();

            for name in found {
                if !names.contains(&name) {
                    names.push(name);
                }
            }
        }

        Ok(names)
    }

    fn read_manifest(module: &str, dir: &Path) -> Result<ModuleDescriptor, DiscoveryError> {
        let path = dir.join(MANIFEST_FILE);
        trace!("Reading manifest {}", path.display());

        let content =
            fs::read_to_string(&path).map_err(|source| DiscoveryError::ManifestRead {
                module: module.to_string(),
                source,
            })?;

        toml::from_str(&content).map_err(|source| DiscoveryError::ManifestParse {
            module: module.to_string(),
            source,
        })
    }
}

impl ModuleRegistry for AddonsRegistry {
    fn modules_by_state(&self, states: &[ModuleState]) -> Result<Vec<String>, DiscoveryError> {
        let mut modules = Vec::new();

        for name in self.module_names()? {
            let descriptor = self.load_metadata(&name)?;
            if states.contains(&descriptor.state) {
                modules.push(name);
            } else {
                trace!("Module {} is {}, skipped", name, descriptor.state);
            }
        }

        debug!("{} module(s) in states {:?}", modules.len(), states);
        Ok(modules)
    }

    fn load_metadata(&self, module: &str) -> Result<ModuleDescriptor, DiscoveryError> {
        let dir = self
            .module_path(module)
            .ok_or_else(|| DiscoveryError::UnknownModule(module.to_string()))?;
        Self::read_manifest(module, &dir)
    }
}

/// 模块名必须是单个路径组件
fn is_plain_name(name: &str) -> bool {
    !name.is_empty()
        && name != "."
        && name != ".."
        && !name.contains(['/', '\\'])
}
