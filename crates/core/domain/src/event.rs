/// 工作流事件类型：每种事件对应一条路由地址与一个 CFX 消息名。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkflowEvent {
    Heartbeat,
    WorkStarted,
    WorkCompleted,
    UnitsProcessed,
    StationStateChanged,
    FaultOccurred,
    FaultCleared,
}

impl WorkflowEvent {
    /// 全部事件类型（拓扑声明时按此遍历）。
    pub const ALL: [WorkflowEvent; 7] = [
        WorkflowEvent::Heartbeat,
        WorkflowEvent::WorkStarted,
        WorkflowEvent::WorkCompleted,
        WorkflowEvent::UnitsProcessed,
        WorkflowEvent::StationStateChanged,
        WorkflowEvent::FaultOccurred,
        WorkflowEvent::FaultCleared,
    ];

    /// 路由地址中使用的小写事件段。
    pub fn key(&self) -> &'static str {
        match self {
            WorkflowEvent::Heartbeat => "heartbeat",
            WorkflowEvent::WorkStarted => "workstarted",
            WorkflowEvent::WorkCompleted => "workcompleted",
            WorkflowEvent::UnitsProcessed => "unitsprocessed",
            WorkflowEvent::StationStateChanged => "stationstatechanged",
            WorkflowEvent::FaultOccurred => "faultoccurred",
            WorkflowEvent::FaultCleared => "faultcleared",
        }
    }
}
