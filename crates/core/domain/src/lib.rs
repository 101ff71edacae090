pub mod envelope;
pub mod event;
pub mod records;
pub mod status;
pub mod time;

pub use envelope::CfxEnvelope;
pub use event::WorkflowEvent;
pub use records::{MachineStatusRecord, PersonalizedUnit, ProductionRecord};
pub use status::{cfx_state_code, MapBasicStatusCode};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// 设备元数据：随每条 CFX 消息体下发的站点/产线/工位标识。
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
pub struct MachineMetadata {
    pub building: String,
    pub device: String,
    pub area_name: String,
    pub organization: String,
    pub line_name: String,
    pub site_name: String,
    pub station_name: String,
    pub process_type: String,
    pub machine_name: String,
    pub created_by: String,
}

impl MachineMetadata {
    /// 构造消息体内的 `Metadata` 字典。
    ///
    /// 键名是与下游消费方的字符串契约，大小写必须逐字保留。
    pub fn to_body_map(&self) -> Map<String, Value> {
        let mut map = Map::new();
        map.insert("building".to_string(), Value::String(self.building.clone()));
        map.insert("device".to_string(), Value::String(self.device.clone()));
        map.insert(
            "area_name".to_string(),
            Value::String(self.area_name.clone()),
        );
        map.insert("org".to_string(), Value::String(self.organization.clone()));
        map.insert(
            "line_name".to_string(),
            Value::String(self.line_name.clone()),
        );
        map.insert(
            "site_name".to_string(),
            Value::String(self.site_name.clone()),
        );
        map.insert(
            "station_name".to_string(),
            Value::String(self.station_name.clone()),
        );
        map.insert(
            "Process_type".to_string(),
            Value::String(self.process_type.clone()),
        );
        map.insert(
            "machine_name".to_string(),
            Value::String(self.machine_name.clone()),
        );
        map.insert(
            "Created_by".to_string(),
            Value::String(self.created_by.clone()),
        );
        map
    }
}

#[cfg(test)]
mod tests {
    use super::MachineMetadata;

    #[test]
    fn metadata_map_keeps_contract_casing() {
        let metadata = MachineMetadata {
            process_type: "SMT".to_string(),
            created_by: "floor".to_string(),
            ..MachineMetadata::default()
        };
        let map = metadata.to_body_map();
        assert_eq!(map.get("Process_type").and_then(|v| v.as_str()), Some("SMT"));
        assert_eq!(map.get("Created_by").and_then(|v| v.as_str()), Some("floor"));
        assert!(map.contains_key("area_name"));
        assert!(map.contains_key("org"));
        assert_eq!(map.len(), 10);
    }
}
