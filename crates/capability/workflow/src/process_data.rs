//! 按序列号命名的过程数据文件：定位与测量值分解。

use domain::records::PersonalizedUnit;
use domain::time::parse_flexible;
use std::path::{Path, PathBuf};

const BACKUP_SUFFIX: &str = ".backup.csv";

/// 在过程数据目录下定位序列号对应的源文件。
///
/// 优先匹配文件名主干以序列号开头的普通 `.csv`；
/// 若只剩下上次中断留下的检查点（`*.csv.backup.csv`），
/// 返回其对应的原始路径，交由检查点机制恢复。
/// 没有匹配返回 Ok(None)。
pub(crate) async fn find_source(dir: &Path, serial: &str) -> std::io::Result<Option<PathBuf>> {
    if serial.is_empty() || !tokio::fs::try_exists(dir).await? {
        return Ok(None);
    }

    let mut names = Vec::new();
    let mut entries = tokio::fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        if let Some(name) = entry.file_name().to_str() {
            names.push(name.to_string());
        }
    }
    names.sort();

    for name in &names {
        if name.ends_with(BACKUP_SUFFIX) {
            continue;
        }
        if name.ends_with(".csv") && file_stem_of(name).starts_with(serial) {
            return Ok(Some(dir.join(name)));
        }
    }
    for name in &names {
        let Some(underlying) = name.strip_suffix(BACKUP_SUFFIX) else {
            continue;
        };
        if underlying.ends_with(".csv") && file_stem_of(underlying).starts_with(serial) {
            return Ok(Some(dir.join(underlying)));
        }
    }
    Ok(None)
}

fn file_stem_of(name: &str) -> &str {
    name.strip_suffix(".csv").unwrap_or(name)
}

/// 把过程数据行分解为个性化测量值对。
///
/// 第二行是列标签行；数据行以"首列可解析为日期时间"识别。
/// 每个数据行产出两条测量值：第 2 列（Nm）与第 3 列（degree），
/// 名称为对应标签加行计数器，状态取第 4 列。
/// 数值无法解析的行被跳过。
pub(crate) fn personalized_units(lines: &[String]) -> Vec<PersonalizedUnit> {
    if lines.len() < 2 {
        return Vec::new();
    }
    let labels: Vec<&str> = lines[1].split(',').collect();
    if labels.len() < 3 {
        return Vec::new();
    }

    let mut units = Vec::new();
    let mut counter = 1;
    for line in lines {
        let columns: Vec<&str> = line.split(',').collect();
        if columns.len() < 4 || parse_flexible(columns[0]).is_none() {
            continue;
        }
        let Ok(first) = columns[1].trim().parse::<f64>() else {
            continue;
        };
        let Ok(second) = columns[2].trim().parse::<f64>() else {
            continue;
        };
        let status = columns[3].trim();
        units.push(PersonalizedUnit::new(
            format!("{}{}", labels[1].trim(), counter),
            "Nm",
            first,
            status,
        ));
        units.push(PersonalizedUnit::new(
            format!("{}{}", labels[2].trim(), counter),
            "degree",
            second,
            status,
        ));
        counter += 1;
    }
    units
}
