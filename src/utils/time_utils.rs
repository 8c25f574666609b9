//! 时间工具模块
//! 审计记录中的时间戳统一为毫秒精度的 UTC 时间

use chrono::{DateTime, SecondsFormat, Utc};

/// 格式化为 ISO-8601（毫秒精度，`Z` 结尾），例如 `2024-01-01T08:00:00.123Z`
pub fn format_timestamp(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// 两个时间点之间的毫秒数，任一缺失时为 0
pub fn elapsed_ms(start: Option<&DateTime<Utc>>, end: Option<&DateTime<Utc>>) -> i64 {
    match (start, end) {
        (Some(start), Some(end)) => (*end - *start).num_milliseconds(),
        _ => 0,
    }
}
