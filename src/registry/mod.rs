pub mod addons;
pub mod types;

pub use addons::{AddonsRegistry, MANIFEST_FILE};
pub use types::{ModuleDescriptor, ModuleState};

use crate::discovery::DiscoveryError;

/// 模块注册表：知道有哪些模块、处于什么状态、声明了哪些测试文件
pub trait ModuleRegistry {
    /// 返回状态属于 `states` 的所有模块名
    fn modules_by_state(&self, states: &[ModuleState]) -> Result<Vec<String>, DiscoveryError>;

    /// 读取模块的元数据描述
    fn load_metadata(&self, module: &str) -> Result<ModuleDescriptor, DiscoveryError>;
}
