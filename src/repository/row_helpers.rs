// ==========================================
// 生产排程核心 - 行映射辅助函数
// ==========================================
// 存储中的枚举/时间是文本, 解析失败按 rusqlite 转换错误上抛,
// 不做静默兜底
// ==========================================

use crate::db::{parse_ts, TS_FORMAT};
use chrono::NaiveDateTime;
use rusqlite::types::Type;
use rusqlite::Row;

fn conversion_error(idx: usize, message: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, message.into())
}

/// 读取必填时间列
pub(crate) fn get_ts(row: &Row<'_>, idx: usize) -> rusqlite::Result<NaiveDateTime> {
    let raw: String = row.get(idx)?;
    parse_ts(&raw).ok_or_else(|| {
        conversion_error(idx, format!("时间格式错误 (期望 {}): {}", TS_FORMAT, raw))
    })
}

/// 读取可空时间列
pub(crate) fn get_opt_ts(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<NaiveDateTime>> {
    match row.get::<_, Option<String>>(idx)? {
        Some(raw) => parse_ts(&raw).map(Some).ok_or_else(|| {
            conversion_error(idx, format!("时间格式错误 (期望 {}): {}", TS_FORMAT, raw))
        }),
        None => Ok(None),
    }
}

/// 读取枚举列
pub(crate) fn get_enum<T>(
    row: &Row<'_>,
    idx: usize,
    parse: fn(&str) -> Option<T>,
) -> rusqlite::Result<T> {
    let raw: String = row.get(idx)?;
    parse(&raw).ok_or_else(|| conversion_error(idx, format!("未知枚举值: {}", raw)))
}
