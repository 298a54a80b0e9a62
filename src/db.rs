// ==========================================
// 生产排程核心 - SQLite 连接初始化
// ==========================================
// 目标:
// - 统一所有 Connection::open 的 PRAGMA 行为（外键、busy_timeout）
// - 统一建表入口, 测试与应用使用同一份 schema
// ==========================================

use rusqlite::Connection;
use rusqlite::OptionalExtension;
use std::time::Duration;

/// 默认 busy_timeout（毫秒）
pub const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;

/// 当前代码所期望的 schema_version
pub const CURRENT_SCHEMA_VERSION: i64 = 1;

/// 统一的时间存储格式
pub const TS_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// 配置 SQLite 连接的统一 PRAGMA
///
/// 说明：
/// - foreign_keys 需要“每个连接”单独开启
/// - busy_timeout 需要“每个连接”单独配置
pub fn configure_sqlite_connection(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    conn.busy_timeout(Duration::from_millis(DEFAULT_BUSY_TIMEOUT_MS))?;
    Ok(())
}

/// 打开 SQLite 连接并应用统一配置
pub fn open_sqlite_connection(db_path: &str) -> rusqlite::Result<Connection> {
    let conn = Connection::open(db_path)?;
    configure_sqlite_connection(&conn)?;
    Ok(conn)
}

/// 初始化 schema（幂等）
///
/// machines 表上的 CHECK 约束与领域层的成对约束一致:
/// occupied ⇔ estimated_free_time 非空; 非 occupied 时占用订单也必须为空
pub fn init_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS machines (
            machine_id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            description TEXT NOT NULL DEFAULT '',
            machine_type TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'free',
            current_order_id TEXT,
            estimated_free_time TEXT,
            specifications TEXT,
            created_at TEXT NOT NULL,
            CHECK (status IN ('free', 'occupied', 'maintenance')),
            CHECK (
                (status = 'occupied' AND estimated_free_time IS NOT NULL)
                OR (status <> 'occupied' AND estimated_free_time IS NULL AND current_order_id IS NULL)
            )
        );

        CREATE TABLE IF NOT EXISTS orders (
            order_id TEXT PRIMARY KEY,
            production_status TEXT NOT NULL DEFAULT 'start',
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            updated_by TEXT,
            CHECK (production_status IN ('start', 'waiting', 'done'))
        );

        CREATE TABLE IF NOT EXISTS order_bookings (
            booking_id TEXT PRIMARY KEY,
            order_id TEXT NOT NULL REFERENCES orders(order_id),
            machine_id TEXT NOT NULL REFERENCES machines(machine_id),
            machine_name TEXT NOT NULL,
            estimated_hours INTEGER NOT NULL,
            status TEXT NOT NULL DEFAULT 'scheduled',
            start_time TEXT,
            end_time TEXT,
            created_at TEXT NOT NULL,
            CHECK (estimated_hours > 0),
            CHECK (status IN ('scheduled', 'running', 'completed'))
        );
        -- 同一订单同一机台至多一条未完成预约; 已完成的历史预约不参与
        CREATE UNIQUE INDEX IF NOT EXISTS uq_order_bookings_active
            ON order_bookings(order_id, machine_id) WHERE status <> 'completed';
        CREATE INDEX IF NOT EXISTS idx_order_bookings_machine
            ON order_bookings(machine_id, status);

        CREATE TABLE IF NOT EXISTS production_jobs (
            job_id TEXT PRIMARY KEY,
            order_id TEXT NOT NULL REFERENCES orders(order_id),
            title TEXT NOT NULL,
            description TEXT NOT NULL DEFAULT '',
            status TEXT NOT NULL DEFAULT 'created',
            priority TEXT NOT NULL DEFAULT 'medium',
            estimated_hours REAL NOT NULL DEFAULT 0,
            actual_hours REAL,
            started_at TEXT,
            created_at TEXT NOT NULL,
            completed_at TEXT,
            CHECK (status IN ('created', 'in_progress', 'completed', 'on_hold')),
            CHECK ((status = 'completed') = (completed_at IS NOT NULL))
        );
        CREATE INDEX IF NOT EXISTS idx_production_jobs_order
            ON production_jobs(order_id);

        CREATE TABLE IF NOT EXISTS production_steps (
            step_id TEXT PRIMARY KEY,
            job_id TEXT NOT NULL REFERENCES production_jobs(job_id),
            title TEXT NOT NULL,
            description TEXT NOT NULL DEFAULT '',
            assigned_worker_id TEXT,
            assigned_worker_name TEXT,
            status TEXT NOT NULL DEFAULT 'pending',
            estimated_hours REAL NOT NULL DEFAULT 0,
            actual_hours REAL,
            notes TEXT,
            created_at TEXT NOT NULL,
            completed_at TEXT,
            CHECK (status IN ('pending', 'in_progress', 'completed', 'blocked'))
        );
        CREATE INDEX IF NOT EXISTS idx_production_steps_job
            ON production_steps(job_id);
        CREATE INDEX IF NOT EXISTS idx_production_steps_worker
            ON production_steps(assigned_worker_id);

        CREATE TABLE IF NOT EXISTS cascade_reconciliation (
            entry_id TEXT PRIMARY KEY,
            order_id TEXT NOT NULL,
            job_id TEXT,
            trigger_type TEXT NOT NULL,
            error_message TEXT NOT NULL,
            attempts INTEGER NOT NULL DEFAULT 0,
            status TEXT NOT NULL DEFAULT 'pending',
            created_at TEXT NOT NULL,
            resolved_at TEXT
        );

        CREATE TABLE IF NOT EXISTS action_log (
            action_id TEXT PRIMARY KEY,
            action_type TEXT NOT NULL,
            action_ts TEXT NOT NULL,
            actor TEXT NOT NULL,
            order_id TEXT,
            machine_id TEXT,
            payload_json TEXT,
            detail TEXT
        );
        CREATE INDEX IF NOT EXISTS idx_action_log_order
            ON action_log(order_id, action_ts DESC);

        CREATE TABLE IF NOT EXISTS config_kv (
            scope_id TEXT NOT NULL,
            key TEXT NOT NULL,
            value TEXT NOT NULL,
            updated_at TEXT NOT NULL DEFAULT (datetime('now')),
            PRIMARY KEY (scope_id, key)
        );
        "#,
    )?;

    conn.execute(
        "INSERT OR IGNORE INTO schema_version (version) VALUES (?1)",
        [CURRENT_SCHEMA_VERSION],
    )?;
    Ok(())
}

/// 读取 schema_version（若表不存在则返回 None）
pub fn read_schema_version(conn: &Connection) -> rusqlite::Result<Option<i64>> {
    let has_table: bool = conn
        .query_row(
            "SELECT 1 FROM sqlite_master WHERE type='table' AND name='schema_version' LIMIT 1",
            [],
            |_row| Ok(true),
        )
        .optional()?
        .unwrap_or(false);

    if !has_table {
        return Ok(None);
    }

    let v: Option<i64> = conn.query_row("SELECT MAX(version) FROM schema_version", [], |row| row.get(0))?;
    Ok(v)
}

/// 时间 → 存储字符串
pub fn fmt_ts(ts: &chrono::NaiveDateTime) -> String {
    ts.format(TS_FORMAT).to_string()
}

/// 存储字符串 → 时间 (格式损坏时返回 None)
pub fn parse_ts(raw: &str) -> Option<chrono::NaiveDateTime> {
    chrono::NaiveDateTime::parse_from_str(raw, TS_FORMAT).ok()
}
