use std::fs;
use std::path::{Component, Path, PathBuf};

use super::LoadError;
use crate::registry::AddonsRegistry;

/// 按模块解析测试文件路径
pub trait FileResolver {
    /// 读取模块内相对路径对应的文件内容
    fn open_module_file(&self, module: &str, path: &str) -> Result<String, LoadError>;
}

/// 在 addons 目录中查找模块文件
#[derive(Debug, Clone)]
pub struct ModuleFileResolver {
    registry: AddonsRegistry,
}

impl ModuleFileResolver {
    pub fn new(registry: AddonsRegistry) -> Self {
        Self { registry }
    }

    fn resolve(&self, module: &str, path: &str) -> Option<PathBuf> {
        let relative = Path::new(path);
        // 只允许模块目录内的普通相对路径
        let inside = relative
            .components()
            .all(|c| matches!(c, Component::Normal(_) | Component::CurDir));
        if !inside {
            return None;
        }

        let full = self.registry.module_path(module)?.join(relative);
        full.is_file().then_some(full)
    }
}

impl FileResolver for ModuleFileResolver {
    fn open_module_file(&self, module: &str, path: &str) -> Result<String, LoadError> {
        let full = self
            .resolve(module, path)
            .ok_or_else(|| LoadError::NotFound {
                module: module.to_string(),
                path: path.to_string(),
            })?;

        fs::read_to_string(&full).map_err(|source| LoadError::Read { path: full, source })
    }
}
