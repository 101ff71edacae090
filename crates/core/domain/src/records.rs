use serde::{Deserialize, Serialize};

/// 生产信息 CSV 的一行。
///
/// 列序：ProductModel,SN,PartNum,CT,Result,StartTime,EndTime。
/// 解析后不可变。
#[derive(Debug, Clone)]
pub struct ProductionRecord {
    pub product_model: String,
    pub serial_number: String,
    pub part_number: String,
    pub cycle_time: String,
    pub result: String,
    pub start_time: String,
    pub end_time: String,
}

impl ProductionRecord {
    /// 解析一行生产数据；列数不足 7 返回 None（行被静默跳过）。
    pub fn parse_row(line: &str) -> Option<Self> {
        if line.trim().is_empty() {
            return None;
        }
        let columns: Vec<&str> = line.split(',').collect();
        if columns.len() < 7 {
            return None;
        }
        Some(Self {
            product_model: columns[0].trim().to_string(),
            serial_number: columns[1].trim().to_string(),
            part_number: columns[2].trim().to_string(),
            cycle_time: columns[3].trim().to_string(),
            result: columns[4].trim().to_string(),
            start_time: columns[5].trim().to_string(),
            end_time: columns[6].trim().to_string(),
        })
    }
}

/// 设备状态 CSV 的一行。
///
/// 列序：OPTime,Status,ErrorID,ErrorMsg；Status/ErrorID 为可空整数。
/// 行序即文件序，不重排。
#[derive(Debug, Clone)]
pub struct MachineStatusRecord {
    pub op_time: String,
    pub status: Option<i32>,
    pub error_id: Option<i32>,
    pub error_msg: String,
}

impl MachineStatusRecord {
    /// 解析一行状态数据。
    ///
    /// 列数不足 4、或 Status/ErrorID 非空但不是整数时返回 None（行被跳过）。
    pub fn parse_row(line: &str) -> Option<Self> {
        if line.trim().is_empty() {
            return None;
        }
        let columns: Vec<&str> = line.split(',').collect();
        if columns.len() < 4 {
            return None;
        }
        let status = parse_optional_i32(columns[1])?;
        let error_id = parse_optional_i32(columns[2])?;
        Some(Self {
            op_time: columns[0].trim().to_string(),
            status,
            error_id,
            error_msg: columns[3].trim().to_string(),
        })
    }
}

/// 空串 ⇒ Ok(None)；非整数 ⇒ None（调用方跳过该行）。
fn parse_optional_i32(cell: &str) -> Option<Option<i32>> {
    let cell = cell.trim();
    if cell.is_empty() {
        return Some(None);
    }
    cell.parse::<i32>().ok().map(Some)
}

/// 单条个性化测量值（来自按序列号命名的过程数据文件）。
///
/// 成员名按出站 JSON 契约保留原始大小写。
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PersonalizedUnit {
    pub name: String,
    pub unit: String,
    pub value: f64,
    pub hilim: String,
    pub lolim: String,
    pub status: String,
    pub rule: String,
    pub target: String,
}

impl PersonalizedUnit {
    pub fn new(
        name: impl Into<String>,
        unit: impl Into<String>,
        value: f64,
        status: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            unit: unit.into(),
            value,
            hilim: String::new(),
            lolim: String::new(),
            status: status.into(),
            rule: String::new(),
            target: String::new(),
        }
    }
}
