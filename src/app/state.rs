// ==========================================
// 生产排程核心 - 应用状态
// ==========================================
// 职责: 在一条共享连接上装配全部仓储、引擎与 API
// ==========================================

use std::sync::{Arc, Mutex};

use crate::api::{
    BookingApi, ConfigApi, DashboardApi, MachineApi, OrderStatusApi, ProductionApi, TaskApi,
};
use crate::config::config_manager::ConfigManager;
use crate::engine::cascade::StatusCascadeCoordinator;
use crate::engine::events::{OptionalEventPublisher, ProductionEventPublisher};
use crate::repository::{
    ActionLogRepository, BookingRepository, DashboardRepository, JobRepository,
    MachineRepository, OrderRepository, ReconciliationRepository, StepRepository,
};

/// 数据库路径环境变量
pub const DB_PATH_ENV: &str = "PRODUCTION_SCHEDULER_DB_PATH";

/// 应用状态
///
/// 包含所有API实例和共享资源
pub struct AppState {
    /// 数据库路径
    pub db_path: String,

    pub machine_api: Arc<MachineApi>,
    pub booking_api: Arc<BookingApi>,
    pub production_api: Arc<ProductionApi>,
    pub task_api: Arc<TaskApi>,
    pub order_status_api: Arc<OrderStatusApi>,
    pub dashboard_api: Arc<DashboardApi>,
    pub config_api: Arc<ConfigApi>,

    /// 状态级联协调器 (补偿任务直接使用)
    pub cascade: Arc<StatusCascadeCoordinator>,

    /// 操作日志仓储（用于审计追踪）
    pub action_log_repo: Arc<ActionLogRepository>,
}

impl AppState {
    /// 创建新的AppState实例 (不挂接事件发布者)
    ///
    /// # 参数
    /// - db_path: 数据库文件路径
    ///
    /// # 返回
    /// - Ok(AppState): 应用状态实例
    /// - Err(String): 初始化错误
    pub fn new(db_path: String) -> Result<Self, String> {
        Self::with_publisher(db_path, OptionalEventPublisher::none())
    }

    /// 创建挂接了事件发布者的 AppState
    pub fn with_event_publisher(
        db_path: String,
        publisher: Arc<dyn ProductionEventPublisher>,
    ) -> Result<Self, String> {
        Self::with_publisher(db_path, OptionalEventPublisher::with_publisher(publisher))
    }

    fn with_publisher(db_path: String, publisher: OptionalEventPublisher) -> Result<Self, String> {
        tracing::info!("初始化AppState，数据库路径: {}", db_path);

        // 创建数据库连接（共享连接）
        let conn = crate::db::open_sqlite_connection(&db_path)
            .map_err(|e| format!("无法打开数据库: {}", e))?;
        crate::db::init_schema(&conn).map_err(|e| format!("无法初始化数据库结构: {}", e))?;
        let conn = Arc::new(Mutex::new(conn));

        // ==========================================
        // 初始化Repository层
        // ==========================================
        let machine_repo = Arc::new(MachineRepository::new(conn.clone()));
        let booking_repo = Arc::new(BookingRepository::new(conn.clone()));
        let order_repo = Arc::new(OrderRepository::new(conn.clone()));
        let job_repo = Arc::new(JobRepository::new(conn.clone()));
        let step_repo = Arc::new(StepRepository::new(conn.clone()));
        let reconciliation_repo = Arc::new(ReconciliationRepository::new(conn.clone()));
        let dashboard_repo = Arc::new(DashboardRepository::new(conn.clone()));
        let action_log_repo = Arc::new(ActionLogRepository::new(conn.clone()));

        // 配置管理器
        let config_manager = Arc::new(
            ConfigManager::from_connection(conn.clone())
                .map_err(|e| format!("无法创建ConfigManager: {}", e))?,
        );
        let scheduling_config = config_manager
            .load_scheduling_config()
            .map_err(|e| format!("无法加载排程配置: {}", e))?;

        // ==========================================
        // 初始化Engine层
        // ==========================================
        let cascade = Arc::new(
            StatusCascadeCoordinator::new(
                job_repo.clone(),
                order_repo.clone(),
                reconciliation_repo,
                scheduling_config.retry_policy(),
            )
            .with_publisher(publisher),
        );

        // ==========================================
        // 初始化API层
        // ==========================================
        let machine_api = Arc::new(MachineApi::new(
            machine_repo.clone(),
            booking_repo.clone(),
            action_log_repo.clone(),
        ));
        let booking_api = Arc::new(BookingApi::new(
            booking_repo,
            machine_repo,
            order_repo.clone(),
            action_log_repo.clone(),
            config_manager.clone(),
        ));
        let production_api = Arc::new(ProductionApi::new(
            job_repo.clone(),
            order_repo.clone(),
            action_log_repo.clone(),
            config_manager.clone(),
            cascade.clone(),
        ));
        let task_api = Arc::new(TaskApi::new(
            step_repo,
            job_repo,
            action_log_repo.clone(),
            cascade.clone(),
        ));
        let order_status_api = Arc::new(OrderStatusApi::new(order_repo, action_log_repo.clone()));
        let dashboard_api = Arc::new(DashboardApi::new(dashboard_repo, action_log_repo.clone()));
        let config_api = Arc::new(ConfigApi::new(config_manager, action_log_repo.clone()));

        tracing::info!("AppState初始化完成");

        Ok(Self {
            db_path,
            machine_api,
            booking_api,
            production_api,
            task_api,
            order_status_api,
            dashboard_api,
            config_api,
            cascade,
            action_log_repo,
        })
    }

    /// 获取数据库路径
    pub fn get_db_path(&self) -> &str {
        &self.db_path
    }
}

// ==========================================
// 默认数据库路径辅助函数
// ==========================================

/// 获取默认数据库路径
///
/// # 返回
/// 1. 环境变量 PRODUCTION_SCHEDULER_DB_PATH (非空时)
/// 2. 用户数据目录/production-scheduler/production_scheduler.db
/// 3. ./production_scheduler.db
pub fn get_default_db_path() -> String {
    // 允许通过环境变量显式指定 DB 路径（便于调试/测试/CI）
    if let Ok(path) = std::env::var(DB_PATH_ENV) {
        let trimmed = path.trim();
        if !trimmed.is_empty() {
            return trimmed.to_string();
        }
    }

    if let Some(data_dir) = dirs::data_dir() {
        let dir = data_dir.join("production-scheduler");
        match std::fs::create_dir_all(&dir) {
            Ok(()) => return dir.join("production_scheduler.db").to_string_lossy().to_string(),
            Err(e) => tracing::warn!("无法创建数据目录 {:?}: {}", dir, e),
        }
    }

    "./production_scheduler.db".to_string()
}
