//! 车间 CSV 的时间解析与 CFX 时间戳格式化。

use chrono::{Duration, FixedOffset, LocalResult, NaiveDateTime, NaiveTime, TimeZone, Utc};

/// 车间导出文件中实际出现过的日期时间写法。
/// chrono 的数值段同时接受补零与不补零的形式。
const DATE_TIME_FORMATS: &[&str] = &[
    "%Y/%m/%d %H:%M:%S",
    "%Y/%m/%d %H:%M",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%m/%d/%Y %H:%M:%S",
    "%m/%d/%Y %H:%M",
];

const TIME_ONLY_FORMATS: &[&str] = &["%H:%M:%S", "%H:%M"];

/// 按已知格式解析日期时间；全部失败返回 None。
pub fn parse_flexible(text: &str) -> Option<NaiveDateTime> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    DATE_TIME_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(text, format).ok())
}

/// 解析日期时间或纯时刻（HH:mm / HH:mm:ss，锚定到纪元日）。
pub fn parse_clock(text: &str) -> Option<NaiveDateTime> {
    if let Some(parsed) = parse_flexible(text) {
        return Some(parsed);
    }
    let text = text.trim();
    TIME_ONLY_FORMATS
        .iter()
        .find_map(|format| NaiveTime::parse_from_str(text, format).ok())
        .map(|time| NaiveDateTime::new(chrono::NaiveDate::default(), time))
}

/// 计算两个时刻的间隔并格式化为 `HH:MM:SS`。
///
/// 结束时刻数值上早于开始时刻时视为跨越了午夜，补一天。
/// 任一侧无法解析返回 None。
pub fn calculate_time_difference(start: &str, end: &str) -> Option<String> {
    let start = parse_clock(start)?;
    let mut end = parse_clock(end)?;
    if end < start {
        end += Duration::days(1);
    }
    let total_seconds = (end - start).num_seconds();
    Some(format!(
        "{:02}:{:02}:{:02}",
        total_seconds / 3600,
        (total_seconds % 3600) / 60,
        total_seconds % 60
    ))
}

/// 将本地挂钟时间渲染为带显式时区偏移的 ISO-8601 字符串，
/// 如 `2024-11-04T12:49:09.176499+08:00`。
pub fn format_iso8601(naive: NaiveDateTime, offset_hours: i32) -> String {
    let seconds = offset_hours.clamp(-23, 23) * 3600;
    let Some(offset) = FixedOffset::east_opt(seconds) else {
        return naive.format("%Y-%m-%dT%H:%M:%S%.6f").to_string();
    };
    match offset.from_local_datetime(&naive) {
        LocalResult::Single(stamped) | LocalResult::Ambiguous(stamped, _) => {
            stamped.format("%Y-%m-%dT%H:%M:%S%.6f%:z").to_string()
        }
        LocalResult::None => naive.format("%Y-%m-%dT%H:%M:%S%.6f").to_string(),
    }
}

/// 当前 UTC 时间的 ISO-8601 字符串（偏移 +00:00）。
pub fn now_utc_iso8601() -> String {
    Utc::now().format("%Y-%m-%dT%H:%M:%S%.6f%:z").to_string()
}

#[cfg(test)]
mod tests {
    use super::{calculate_time_difference, format_iso8601, now_utc_iso8601, parse_flexible};
    use chrono::NaiveDate;

    #[test]
    fn parses_padded_and_unpadded_forms() {
        assert!(parse_flexible("2024/1/2 8:30").is_some());
        assert!(parse_flexible("2024/01/02 08:30:15").is_some());
        assert!(parse_flexible("2024-01-02 08:30").is_some());
        assert!(parse_flexible("1/2/2024 08:30").is_some());
        assert!(parse_flexible("not a date").is_none());
        assert!(parse_flexible("").is_none());
    }

    #[test]
    fn time_difference_wraps_past_midnight() {
        assert_eq!(
            calculate_time_difference("23:50", "00:10").as_deref(),
            Some("00:20:00")
        );
    }

    #[test]
    fn time_difference_same_day() {
        assert_eq!(
            calculate_time_difference("08:00", "09:30:45").as_deref(),
            Some("01:30:45")
        );
        assert_eq!(
            calculate_time_difference("2024/1/2 8:00", "2024/1/2 8:20").as_deref(),
            Some("00:20:00")
        );
    }

    #[test]
    fn time_difference_unparseable_is_none() {
        assert!(calculate_time_difference("bogus", "00:10").is_none());
        assert!(calculate_time_difference("23:50", "").is_none());
    }

    #[test]
    fn iso8601_carries_explicit_offset() {
        let naive = NaiveDate::from_ymd_opt(2024, 11, 4)
            .expect("date")
            .and_hms_micro_opt(12, 49, 9, 176_499)
            .expect("time");
        assert_eq!(format_iso8601(naive, 8), "2024-11-04T12:49:09.176499+08:00");
        assert_eq!(format_iso8601(naive, 0), "2024-11-04T12:49:09.176499+00:00");
        assert_eq!(format_iso8601(naive, -6), "2024-11-04T12:49:09.176499-06:00");
    }

    #[test]
    fn utc_now_has_zero_offset_suffix() {
        assert!(now_utc_iso8601().ends_with("+00:00"));
    }
}
