// ==========================================
// 生产排程核心 - 应用层
// ==========================================
// 职责: 装配共享连接与各层实例
// ==========================================

pub mod state;

// 重导出
pub use state::{get_default_db_path, AppState, DB_PATH_ENV};
