pub mod csv_import;
pub mod document;
pub mod error;
pub mod records;
pub mod resolver;
pub mod script;
pub mod sql;

pub use error::{LoadError, ScriptExecutionError};
pub use resolver::{FileResolver, ModuleFileResolver};

use std::collections::HashMap;
use std::path::Path;

use tracing::debug;

use crate::store::Session;

/// 外部 ID 到记录 ID 的缓存
pub type IdRefs = HashMap<String, i64>;

/// 测试文件类型，由扩展名（区分大小写）决定
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    /// `.sql`：按 `;` 分割后逐条执行
    Sql,
    /// `.csv`：结构化数据导入
    Csv,
    /// `.yml`：声明式脚本
    Script,
    /// 其他扩展名：通用文档（XML）导入
    Document,
}

impl FileKind {
    pub fn from_path(path: &str) -> Self {
        match Path::new(path).extension().and_then(|ext| ext.to_str()) {
            Some("sql") => FileKind::Sql,
            Some("csv") => FileKind::Csv,
            Some("yml") => FileKind::Script,
            _ => FileKind::Document,
        }
    }
}

/// 导入模式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ImportMode {
    /// 首次安装：已存在的记录总是被覆盖
    Init,
    /// 升级：已存在的记录被更新，除非它带有 noupdate 标记且调用方要求尊重该标记
    #[default]
    Update,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ImportOptions {
    pub mode: ImportMode,
    /// 尊重已有记录的 noupdate 标记，并给新记录打上该标记
    pub no_update: bool,
}

/// 结构化导入的实现
///
/// 运行器通过它应用 `.csv`、`.yml` 和其他文档；测试或宿主平台可以替换实现。
pub trait ImportBackend {
    fn apply_csv(
        &self,
        session: &mut dyn Session,
        module: &str,
        path: &str,
        content: &str,
        id_refs: Option<&mut IdRefs>,
        options: ImportOptions,
    ) -> Result<(), LoadError>;

    fn apply_script(
        &self,
        session: &mut dyn Session,
        module: &str,
        content: &str,
        id_refs: Option<&mut IdRefs>,
        options: ImportOptions,
    ) -> Result<(), LoadError>;

    fn apply_document(
        &self,
        session: &mut dyn Session,
        module: &str,
        content: &str,
        id_refs: Option<&mut IdRefs>,
        options: ImportOptions,
    ) -> Result<(), LoadError>;
}

/// 内置的 CSV / YAML / XML 导入器
#[derive(Debug, Clone, Copy, Default)]
pub struct BuiltinImporter;

impl ImportBackend for BuiltinImporter {
    fn apply_csv(
        &self,
        session: &mut dyn Session,
        module: &str,
        path: &str,
        content: &str,
        id_refs: Option<&mut IdRefs>,
        options: ImportOptions,
    ) -> Result<(), LoadError> {
        csv_import::import_csv(session, module, path, content, id_refs, options)
    }

    fn apply_script(
        &self,
        session: &mut dyn Session,
        module: &str,
        content: &str,
        id_refs: Option<&mut IdRefs>,
        options: ImportOptions,
    ) -> Result<(), LoadError> {
        script::run_script(session, module, content, id_refs, options)
    }

    fn apply_document(
        &self,
        session: &mut dyn Session,
        module: &str,
        content: &str,
        id_refs: Option<&mut IdRefs>,
        options: ImportOptions,
    ) -> Result<(), LoadError> {
        document::import_document(session, module, content, id_refs, options)
    }
}

/// 按文件类型分发测试文件
pub struct TestFileLoader<'a> {
    resolver: &'a dyn FileResolver,
    importer: &'a dyn ImportBackend,
    options: ImportOptions,
}

impl<'a> TestFileLoader<'a> {
    pub fn new(
        resolver: &'a dyn FileResolver,
        importer: &'a dyn ImportBackend,
        options: ImportOptions,
    ) -> Self {
        Self {
            resolver,
            importer,
            options,
        }
    }

    /// 读取并应用一个测试文件；任何失败都原样返回
    pub fn load(
        &self,
        session: &mut dyn Session,
        module: &str,
        path: &str,
    ) -> Result<(), LoadError> {
        let content = self.resolver.open_module_file(module, path)?;
        let kind = FileKind::from_path(path);
        debug!("Applying {}/{} as {:?}", module, path, kind);

        match kind {
            FileKind::Sql => sql::execute_sql(session, &content),
            FileKind::Csv => {
                self.importer
                    .apply_csv(session, module, path, &content, None, self.options)
            }
            FileKind::Script => {
                self.importer
                    .apply_script(session, module, &content, None, self.options)
            }
            FileKind::Document => {
                self.importer
                    .apply_document(session, module, &content, None, self.options)
            }
        }
    }
}
