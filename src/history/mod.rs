pub mod model;
pub mod printer;
pub mod recorder;
pub mod storage;

pub use model::{FailedFile, HistoryFilter, RunRecord};
pub use printer::list_history;
pub use recorder::{build_record, record_run};
pub use storage::HistoryStorage;
