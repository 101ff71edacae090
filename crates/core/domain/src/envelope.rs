use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// 出站 CFX 消息信封。
///
/// 成员名与 JSON 键一一对应，是与下游消费方的字符串契约；
/// `Target`/`RequestID` 为空时序列化为 JSON null。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CfxEnvelope {
    #[serde(rename = "MessageName")]
    pub message_name: String,
    #[serde(rename = "Version")]
    pub version: String,
    #[serde(rename = "TimeStamp")]
    pub time_stamp: String,
    #[serde(rename = "UniqueID")]
    pub unique_id: String,
    #[serde(rename = "Source")]
    pub source: String,
    #[serde(rename = "Target")]
    pub target: Option<String>,
    #[serde(rename = "RequestID")]
    pub request_id: Option<String>,
    #[serde(rename = "MessageBody")]
    pub message_body: Map<String, Value>,
}

impl CfxEnvelope {
    /// 以设备自身为 Source 构造信封，Target 与 RequestID 留空。
    pub fn new(
        message_name: impl Into<String>,
        version: impl Into<String>,
        time_stamp: impl Into<String>,
        unique_id: impl Into<String>,
        message_body: Map<String, Value>,
    ) -> Self {
        let unique_id = unique_id.into();
        Self {
            message_name: message_name.into(),
            version: version.into(),
            time_stamp: time_stamp.into(),
            source: unique_id.clone(),
            unique_id,
            target: None,
            request_id: None,
            message_body,
        }
    }

    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.target = Some(target.into());
        self
    }

    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }

    /// 序列化为出站 JSON 载荷。
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
