use serde::Deserialize;
use std::fmt;

/// 模块生命周期状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Default)]
pub enum ModuleState {
    #[serde(rename = "uninstallable")]
    Uninstallable,
    #[serde(rename = "uninstalled")]
    Uninstalled,
    #[default]
    #[serde(rename = "installed")]
    Installed,
    #[serde(rename = "to upgrade")]
    ToUpgrade,
    #[serde(rename = "to remove")]
    ToRemove,
    #[serde(rename = "to install")]
    ToInstall,
}

impl ModuleState {
    /// 默认参与测试的状态
    pub const TESTABLE: [ModuleState; 2] = [ModuleState::Installed, ModuleState::ToUpgrade];

    pub fn as_str(&self) -> &'static str {
        match self {
            ModuleState::Uninstallable => "uninstallable",
            ModuleState::Uninstalled => "uninstalled",
            ModuleState::Installed => "installed",
            ModuleState::ToUpgrade => "to upgrade",
            ModuleState::ToRemove => "to remove",
            ModuleState::ToInstall => "to install",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim() {
            "uninstallable" => Some(ModuleState::Uninstallable),
            "uninstalled" => Some(ModuleState::Uninstalled),
            "installed" => Some(ModuleState::Installed),
            "to upgrade" | "to_upgrade" => Some(ModuleState::ToUpgrade),
            "to remove" | "to_remove" => Some(ModuleState::ToRemove),
            "to install" | "to_install" => Some(ModuleState::ToInstall),
            _ => None,
        }
    }
}

impl fmt::Display for ModuleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 模块描述文件（`__manifest__.toml`）的内容
#[derive(Debug, Clone, Deserialize, Default, PartialEq)]
pub struct ModuleDescriptor {
    /// 显示名称
    #[serde(default)]
    pub name: Option<String>,

    #[serde(default)]
    pub version: Option<String>,

    #[serde(default)]
    pub description: Option<String>,

    /// 依赖的模块
    #[serde(default)]
    pub depends: Vec<String>,

    /// 生命周期状态，缺省为 installed
    #[serde(default)]
    pub state: ModuleState,

    /// 声明的测试文件（相对模块目录），保持声明顺序
    #[serde(default)]
    pub test: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_descriptor_defaults() {
        let descriptor: ModuleDescriptor = toml::from_str(r#"name = "Sales""#).unwrap();
        assert_eq!(descriptor.name.as_deref(), Some("Sales"));
        assert_eq!(descriptor.state, ModuleState::Installed);
        assert!(descriptor.test.is_empty());
    }

    #[test]
    fn test_descriptor_state_with_space() {
        let descriptor: ModuleDescriptor = toml::from_str(
            r#"
state = "to upgrade"
test = ["test/a.yml", "test/b.sql"]
"#,
        )
        .unwrap();
        assert_eq!(descriptor.state, ModuleState::ToUpgrade);
        assert_eq!(descriptor.test, vec!["test/a.yml", "test/b.sql"]);
    }

    #[test]
    fn test_parse_state() {
        assert_eq!(ModuleState::parse("to upgrade"), Some(ModuleState::ToUpgrade));
        assert_eq!(ModuleState::parse("to_install"), Some(ModuleState::ToInstall));
        assert_eq!(ModuleState::parse("broken"), None);
        assert_eq!(ModuleState::ToRemove.to_string(), "to remove");
    }
}
