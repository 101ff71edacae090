//! 工作流引擎：把车间 CSV 导出排空为 CFX 事件并发布。
//!
//! 该模块把三类输入文件当作一次性工作队列使用：
//! 生产信息文件派生 work-started / units-processed / work-completed 三联消息
//! （共享一个事务 ID），设备状态文件派生故障发生/清除与工位状态变更，
//! 心跳独立发布。每个操作在入口处读取当前配置快照，并通过工厂
//! 取得作用域内的消息服务，用完即释放。

pub mod checkpoint;
mod process_data;

use cfx_config::ConfigMonitor;
use cfx_messaging::{routing_address, BrokerError, MessagingFactory};
use cfx_telemetry::{
    record_checkpoint_resumed, record_envelope_published, record_fault_reported,
    record_file_drained, record_heartbeat_sent, record_publish_failure, record_row_parsed,
    record_row_skipped,
};
use checkpoint::FileCheckpoint;
use domain::time::{calculate_time_difference, format_iso8601, now_utc_iso8601, parse_flexible};
use domain::{cfx_state_code, CfxEnvelope, MachineStatusRecord, MapBasicStatusCode, ProductionRecord, WorkflowEvent};
use serde_json::{json, Map, Value};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// 每次文件排空后的固定回压延迟。
const DRAIN_BACKOFF: Duration = Duration::from_secs(5);

/// 工作流层错误。行级解析问题不是错误（跳过并计数）。
#[derive(Debug, thiserror::Error)]
pub enum WorkflowError {
    #[error("file error: {0}")]
    File(String),
    #[error("broker error: {0}")]
    Broker(#[from] BrokerError),
    #[error("serialize error: {0}")]
    Serialize(String),
}

/// 工作流引擎。
pub struct MachineWorkflow {
    config: Arc<ConfigMonitor>,
    factory: Arc<dyn MessagingFactory>,
}

impl MachineWorkflow {
    pub fn new(config: Arc<ConfigMonitor>, factory: Arc<dyn MessagingFactory>) -> Self {
        Self { config, factory }
    }

    /// 声明发布侧拓扑：exchange、七类事件的队列与绑定。
    /// MQTT 侧这些调用只做登记。
    pub async fn create_topology(&self) -> Result<(), WorkflowError> {
        let config = self.config.current();
        let prefix = config.publisher.prefix.as_str();
        let service = self.factory.create_messaging_service();
        let outcome: Result<(), BrokerError> = async {
            let exchange = routing_address(prefix, WorkflowEvent::Heartbeat.key()).exchange;
            service.create_exchange(&exchange, "topic").await?;
            for event in WorkflowEvent::ALL {
                let address = routing_address(prefix, event.key());
                service.create_topic(&address.queue).await?;
                service
                    .bind_queue(&address.queue, &address.exchange, &address.routing_key)
                    .await?;
            }
            Ok(())
        }
        .await;
        if let Err(err) = service.close().await {
            warn!(target: "cfx.workflow", error = %err, "service_close_failed");
        }
        outcome?;
        info!(target: "cfx.workflow", prefix = %prefix, "topology_created");
        Ok(())
    }

    /// 发布一次心跳，然后按配置的频率延迟（至少 1 秒，每次重读配置）。
    pub async fn publish_heartbeat(&self, cancel: &CancellationToken) -> Result<(), WorkflowError> {
        let config = self.config.current();
        let info = &config.machine_info;

        let mut body = Map::new();
        body.insert("$type".to_string(), json!(format!("{}, CFX", info.heartbeat)));
        body.insert("CFXHandle".to_string(), json!(Uuid::new_v4().to_string()));
        body.insert(
            "HeartbeatFrequency".to_string(),
            json!(info.heartbeat_frequency),
        );
        body.insert("ActiveFaults".to_string(), json!(0));
        body.insert("ActiveRecipes".to_string(), json!([]));
        body.insert(
            "Metadata".to_string(),
            Value::Object(config.machine_metadata.to_body_map()),
        );

        let envelope = CfxEnvelope::new(
            &info.heartbeat,
            &info.version,
            now_utc_iso8601(),
            &info.unique_id,
            body,
        )
        .with_request_id(Uuid::new_v4().to_string());

        self.publish_event(WorkflowEvent::Heartbeat, &envelope, &config.publisher.prefix)
            .await?;
        record_heartbeat_sent();

        let delay = Duration::from_secs(info.heartbeat_frequency.max(1));
        sleep_cancellable(cancel, delay).await;
        Ok(())
    }

    /// 排空生产信息文件：每个有效行派生共享一个事务 ID 的三联消息。
    ///
    /// 检查点在成功或失败后都被删除（批次被放弃，可用性优先），
    /// 随后有固定回压延迟。
    pub async fn publish_work_process(
        &self,
        cancel: &CancellationToken,
    ) -> Result<(), WorkflowError> {
        let config = self.config.current();
        let Some(path) = config
            .csv_file_path
            .production_information_file_path
            .clone()
            .filter(|path| !path.is_empty())
        else {
            return Ok(());
        };

        let mut checkpoint = FileCheckpoint::new(Path::new(&path));
        if !checkpoint
            .acquire()
            .await
            .map_err(|err| WorkflowError::File(err.to_string()))?
        {
            debug!(target: "cfx.workflow", path = %path, "production_file_absent");
            return Ok(());
        }
        if checkpoint.resumed() {
            record_checkpoint_resumed();
        }

        let lines = checkpoint
            .read_lines()
            .await
            .map_err(|err| WorkflowError::File(err.to_string()))?;
        info!(
            target: "cfx.workflow",
            rows = lines.len().saturating_sub(1),
            "production_drain_started"
        );

        let outcome = self.drain_production(&lines, cancel).await;
        match &outcome {
            Ok(()) => info!(target: "cfx.workflow", "production_drain_completed"),
            Err(err) => {
                error!(target: "cfx.workflow", error = %err, "production_drain_failed")
            }
        }

        checkpoint.release().await;
        record_file_drained();
        sleep_cancellable(cancel, DRAIN_BACKOFF).await;
        Ok(())
    }

    async fn drain_production(
        &self,
        lines: &[String],
        cancel: &CancellationToken,
    ) -> Result<(), WorkflowError> {
        for line in lines.iter().skip(1) {
            if cancel.is_cancelled() {
                return Ok(());
            }
            if line.trim().is_empty() {
                continue;
            }
            let Some(record) = ProductionRecord::parse_row(line) else {
                record_row_skipped();
                continue;
            };
            let offset = self.config.current().machine_info.utc_offset_hours;
            let (Some(started_at), Some(ended_at)) = (
                parse_flexible(&record.start_time),
                parse_flexible(&record.end_time),
            ) else {
                warn!(
                    target: "cfx.workflow",
                    serial_number = %record.serial_number,
                    "row_timestamp_unparseable"
                );
                record_row_skipped();
                continue;
            };
            record_row_parsed();
            let started_stamp = format_iso8601(started_at, offset);
            let ended_stamp = format_iso8601(ended_at, offset);

            // 一行一个事务 ID，三联消息共享
            let transaction_id = Uuid::new_v4().to_string();
            self.publish_work_started(&transaction_id, &record, &started_stamp)
                .await?;
            self.publish_units_processed(&transaction_id, &record, &ended_stamp, cancel)
                .await?;
            self.publish_work_completed(&transaction_id, &record, &ended_stamp)
                .await?;
        }
        Ok(())
    }

    async fn publish_work_started(
        &self,
        transaction_id: &str,
        record: &ProductionRecord,
        time_stamp: &str,
    ) -> Result<(), WorkflowError> {
        let config = self.config.current();
        let info = &config.machine_info;

        let mut body = Map::new();
        body.insert(
            "$type".to_string(),
            json!(format!("{}, CFX", info.work_started)),
        );
        body.insert(
            "PrimaryIdentifier".to_string(),
            json!(record.serial_number),
        );
        body.insert("HermesIdentifier".to_string(), Value::Null);
        body.insert("TransactionID".to_string(), json!(transaction_id));
        body.insert("Line".to_string(), json!(1));
        body.insert("UnitCount".to_string(), Value::Null);
        body.insert("Units".to_string(), json!([]));
        body.insert(
            "Metadata".to_string(),
            Value::Object(config.machine_metadata.to_body_map()),
        );

        let envelope = CfxEnvelope::new(
            &info.work_started,
            &info.version,
            time_stamp,
            &info.unique_id,
            body,
        )
        .with_request_id(Uuid::new_v4().to_string());

        self.publish_event(WorkflowEvent::WorkStarted, &envelope, &config.publisher.prefix)
            .await
    }

    /// 发布 units-processed：携带按序列号命名的过程数据文件的测量值分解。
    ///
    /// 找不到目录或对应文件时跳过，不影响本批其余消息；
    /// 自身的发布失败也只记日志（work-completed 仍会发出）。
    async fn publish_units_processed(
        &self,
        transaction_id: &str,
        record: &ProductionRecord,
        time_stamp: &str,
        cancel: &CancellationToken,
    ) -> Result<(), WorkflowError> {
        let config = self.config.current();
        let Some(dir) = config
            .csv_file_path
            .process_data_files_file_path
            .clone()
            .filter(|path| !path.is_empty())
        else {
            warn!(target: "cfx.workflow", "process_data_dir_not_configured");
            return Ok(());
        };
        let dir = PathBuf::from(dir);

        let source = match process_data::find_source(&dir, &record.serial_number).await {
            Ok(Some(path)) => path,
            Ok(None) => {
                debug!(
                    target: "cfx.workflow",
                    serial_number = %record.serial_number,
                    "process_data_not_found"
                );
                return Ok(());
            }
            Err(err) => {
                warn!(
                    target: "cfx.workflow",
                    dir = %dir.display(),
                    error = %err,
                    "process_data_scan_failed"
                );
                return Ok(());
            }
        };

        let mut checkpoint = FileCheckpoint::new(&source);
        match checkpoint.acquire().await {
            Ok(true) => {}
            Ok(false) => return Ok(()),
            Err(err) => {
                warn!(
                    target: "cfx.workflow",
                    path = %source.display(),
                    error = %err,
                    "process_data_checkpoint_failed"
                );
                return Ok(());
            }
        }
        if checkpoint.resumed() {
            record_checkpoint_resumed();
        }

        let outcome: Result<(), WorkflowError> = async {
            let lines = checkpoint
                .read_lines()
                .await
                .map_err(|err| WorkflowError::File(err.to_string()))?;
            let units = process_data::personalized_units(&lines);

            let config = self.config.current();
            let info = &config.machine_info;

            let mut common = Map::new();
            common.insert(
                "$type".to_string(),
                json!("CFX.Structures.ProccessData, CFX"),
            );
            common.insert(
                "PersonalizedUnits".to_string(),
                serde_json::to_value(&units)
                    .map_err(|err| WorkflowError::Serialize(err.to_string()))?,
            );

            let mut body = Map::new();
            body.insert(
                "$type".to_string(),
                json!("CFX.Structures.SolderReflow.ReflowProcessData, CFX"),
            );
            body.insert("TransactionID".to_string(), json!(transaction_id));
            body.insert("OverallResult".to_string(), json!(record.result));
            body.insert("RecipeName".to_string(), json!("RecipeName1"));
            body.insert("CommonProcessData".to_string(), Value::Object(common));
            body.insert(
                "Metadata".to_string(),
                Value::Object(config.machine_metadata.to_body_map()),
            );
            body.insert("UnitProcessData".to_string(), json!([]));

            let envelope = CfxEnvelope::new(
                &info.units_processed,
                &info.version,
                time_stamp,
                &info.unique_id,
                body,
            );
            self.publish_event(
                WorkflowEvent::UnitsProcessed,
                &envelope,
                &config.publisher.prefix,
            )
            .await
        }
        .await;

        if let Err(err) = outcome {
            error!(
                target: "cfx.workflow",
                serial_number = %record.serial_number,
                error = %err,
                "units_processed_failed"
            );
        }
        checkpoint.release().await;
        sleep_cancellable(cancel, DRAIN_BACKOFF).await;
        Ok(())
    }

    async fn publish_work_completed(
        &self,
        transaction_id: &str,
        record: &ProductionRecord,
        time_stamp: &str,
    ) -> Result<(), WorkflowError> {
        let config = self.config.current();
        let info = &config.machine_info;

        let mut body = Map::new();
        body.insert(
            "$type".to_string(),
            json!(format!("{}, CFX", info.work_completed)),
        );
        body.insert(
            "PrimaryIdentifier".to_string(),
            json!(record.serial_number),
        );
        body.insert("HermesIdentifier".to_string(), Value::Null);
        body.insert("TransactionID".to_string(), json!(transaction_id));
        body.insert("Result".to_string(), json!(record.result));
        body.insert("UnitCount".to_string(), Value::Null);
        body.insert("Units".to_string(), json!([]));
        body.insert("PerformanceImpacts".to_string(), json!([]));
        body.insert(
            "Metadata".to_string(),
            Value::Object(config.machine_metadata.to_body_map()),
        );

        let envelope = CfxEnvelope::new(
            &info.work_completed,
            &info.version,
            time_stamp,
            &info.unique_id,
            body,
        );

        self.publish_event(
            WorkflowEvent::WorkCompleted,
            &envelope,
            &config.publisher.prefix,
        )
        .await
    }

    /// 排空设备状态文件：派生故障发生/清除与工位状态变更。
    ///
    /// 故障生命周期由文件内容推导：最后一条 Error 行即"故障发生"，
    /// 其后紧邻的一行（如有）即"故障清除"。
    pub async fn publish_machine_state(
        &self,
        cancel: &CancellationToken,
    ) -> Result<(), WorkflowError> {
        let config = self.config.current();
        let Some(path) = config
            .csv_file_path
            .machine_status_information_file_path
            .clone()
            .filter(|path| !path.is_empty())
        else {
            return Ok(());
        };

        let mut checkpoint = FileCheckpoint::new(Path::new(&path));
        if !checkpoint
            .acquire()
            .await
            .map_err(|err| WorkflowError::File(err.to_string()))?
        {
            debug!(target: "cfx.workflow", path = %path, "machine_status_file_absent");
            return Ok(());
        }
        if checkpoint.resumed() {
            record_checkpoint_resumed();
        }

        let lines = checkpoint
            .read_lines()
            .await
            .map_err(|err| WorkflowError::File(err.to_string()))?;

        let outcome = self.drain_machine_state(&lines).await;
        if let Err(err) = &outcome {
            error!(target: "cfx.workflow", error = %err, "machine_state_drain_failed");
        }

        checkpoint.release().await;
        record_file_drained();
        sleep_cancellable(cancel, DRAIN_BACKOFF).await;
        Ok(())
    }

    async fn drain_machine_state(&self, lines: &[String]) -> Result<(), WorkflowError> {
        let mut records: Vec<MachineStatusRecord> = Vec::new();
        for line in lines.iter().skip(1) {
            if line.trim().is_empty() {
                continue;
            }
            match MachineStatusRecord::parse_row(line) {
                Some(record) => {
                    record_row_parsed();
                    records.push(record);
                }
                None => record_row_skipped(),
            }
        }

        if records.is_empty() {
            warn!(target: "cfx.workflow", "machine_status_file_empty");
            return Ok(());
        }

        let Some(last_error_index) = records
            .iter()
            .rposition(|record| record.status == Some(MapBasicStatusCode::Error as i32))
        else {
            debug!(target: "cfx.workflow", "no_error_status_rows");
            return Ok(());
        };

        let config = self.config.current();
        let info = &config.machine_info;
        let offset = info.utc_offset_hours;
        let last_error = &records[last_error_index];
        let fault_id = Uuid::new_v4().to_string();
        let occurred_stamp = row_timestamp(&last_error.op_time, offset);

        // faultoccurred
        let mut stage = Map::new();
        stage.insert("StageSequence".to_string(), json!(4));
        stage.insert("StageName".to_string(), json!("Map_Inspection_4"));
        stage.insert("StageType".to_string(), json!("Inspection"));

        let mut translation = Map::new();
        translation.insert("bool".to_string(), json!(false));

        let mut fault = Map::new();
        fault.insert("TransactionID".to_string(), json!(fault_id));
        fault.insert("Cause".to_string(), json!(last_error.error_msg));
        fault.insert("Severity".to_string(), json!("Information"));
        fault.insert("FaultCode".to_string(), json!(last_error.error_id));
        fault.insert("FaultOccurrenceId".to_string(), json!(fault_id));
        fault.insert("Lane".to_string(), json!(1));
        fault.insert("Stage".to_string(), Value::Object(stage));
        fault.insert("SiteLocation".to_string(), json!("Unknown"));
        fault.insert("AccessType".to_string(), json!("Unknown"));
        fault.insert("Description".to_string(), json!(""));
        fault.insert("DescriptionTranslation".to_string(), Value::Object(translation));
        fault.insert("OccurredAt".to_string(), json!(occurred_stamp));
        fault.insert("DueDateTime".to_string(), Value::Null);

        let mut body = Map::new();
        body.insert(
            "$type".to_string(),
            json!(format!("{}, CFX", info.fault_occurred)),
        );
        body.insert("Fault".to_string(), Value::Object(fault));
        body.insert(
            "Metadata".to_string(),
            Value::Object(config.machine_metadata.to_body_map()),
        );

        let envelope = CfxEnvelope::new(
            &info.fault_occurred,
            &info.version,
            occurred_stamp,
            &info.unique_id,
            body,
        );
        self.publish_event(
            WorkflowEvent::FaultOccurred,
            &envelope,
            &config.publisher.prefix,
        )
        .await?;
        record_fault_reported();

        // faultcleared：最后一条 Error 行之后紧邻的行
        if last_error_index == records.len() - 1 {
            debug!(target: "cfx.workflow", "no_clearing_record");
            return Ok(());
        }
        let cleared = &records[last_error_index + 1];
        let cleared_stamp = row_timestamp(&cleared.op_time, offset);

        let mut operator = Map::new();
        operator.insert("OperatorIdentifier".to_string(), json!(""));
        operator.insert("ActorType".to_string(), json!(""));
        operator.insert("LastName".to_string(), json!(""));
        operator.insert("FirstName".to_string(), json!(""));
        operator.insert("LogingName".to_string(), json!(""));

        let mut body = Map::new();
        body.insert(
            "$type".to_string(),
            json!("CFX.ResourcePerformance.FaultCleared, CFX"),
        );
        body.insert("FaultOccurrenceId".to_string(), json!(fault_id));
        body.insert("Operator".to_string(), Value::Object(operator));
        body.insert(
            "Metadata".to_string(),
            Value::Object(config.machine_metadata.to_body_map()),
        );

        let envelope = CfxEnvelope::new(
            &info.fault_cleared,
            &info.version,
            cleared_stamp,
            &info.unique_id,
            body,
        )
        .with_target("Arch");
        self.publish_event(
            WorkflowEvent::FaultCleared,
            &envelope,
            &config.publisher.prefix,
        )
        .await?;

        // stationstatechanged：倒数第二行与最后一行的状态对比
        if records.len() >= 2 {
            let previous = &records[records.len() - 2];
            let last = &records[records.len() - 1];
            let old_state = cfx_state_code(previous.status);
            let new_state = cfx_state_code(last.status);
            let old_state_duration =
                if !previous.op_time.is_empty() && !last.op_time.is_empty() {
                    calculate_time_difference(&previous.op_time, &last.op_time)
                        .unwrap_or_default()
                } else {
                    String::new()
                };

            let mut body = Map::new();
            body.insert(
                "$type".to_string(),
                json!("CFX.ResourcePerformance.StationStateChanged, CFX"),
            );
            body.insert("OldState".to_string(), json!(old_state));
            body.insert("OldStateDuration".to_string(), json!(old_state_duration));
            body.insert("NewState".to_string(), json!(new_state));
            body.insert("RelatedFault".to_string(), Value::Null);
            body.insert(
                "Metadata".to_string(),
                Value::Object(config.machine_metadata.to_body_map()),
            );

            let envelope = CfxEnvelope::new(
                &info.station_state_changed,
                &info.version,
                row_timestamp(&last.op_time, offset),
                &info.unique_id,
                body,
            )
            .with_target("ARCH");
            self.publish_event(
                WorkflowEvent::StationStateChanged,
                &envelope,
                &config.publisher.prefix,
            )
            .await?;
        }

        info!(target: "cfx.workflow", "machine_state_processed");
        Ok(())
    }

    /// 发布单个事件：解析路由地址、序列化信封、作用域内取用并释放消息服务。
    async fn publish_event(
        &self,
        event: WorkflowEvent,
        envelope: &CfxEnvelope,
        prefix: &str,
    ) -> Result<(), WorkflowError> {
        let address = routing_address(prefix, event.key());
        let payload = envelope
            .to_json()
            .map_err(|err| WorkflowError::Serialize(err.to_string()))?;

        let service = self.factory.create_messaging_service();
        let published = service
            .publish_message(&address.exchange, &address.routing_key, &payload)
            .await;
        if let Err(err) = service.close().await {
            warn!(
                target: "cfx.workflow",
                service = service.name(),
                error = %err,
                "service_close_failed"
            );
        }

        match published {
            Ok(()) => {
                record_envelope_published();
                debug!(
                    target: "cfx.workflow",
                    event = event.key(),
                    routing_key = %address.routing_key,
                    "event_published"
                );
                Ok(())
            }
            Err(err) => {
                record_publish_failure();
                Err(WorkflowError::Broker(err))
            }
        }
    }

    /// 长驻循环：每个周期并发执行心跳、生产排空、状态排空三个操作，
    /// 互不阻塞；单个操作失败只记日志，循环仅因取消而退出。
    pub async fn run(&self, cancel: CancellationToken) {
        {
            let config = self.config.current();
            if !config.machine_info.unique_id.trim().is_empty() {
                if let Err(err) = self.create_topology().await {
                    warn!(target: "cfx.workflow", error = %err, "topology_setup_failed");
                }
            }
        }

        while !cancel.is_cancelled() {
            let config = self.config.current();
            if config.machine_info.unique_id.trim().is_empty() {
                debug!(target: "cfx.workflow", "unique_id_not_configured");
                if sleep_cancellable(&cancel, Duration::from_secs(1)).await {
                    break;
                }
                continue;
            }

            let (heartbeat, work, state) = tokio::join!(
                self.publish_heartbeat(&cancel),
                self.publish_work_process(&cancel),
                self.publish_machine_state(&cancel),
            );
            for (operation, result) in [
                ("heartbeat", heartbeat),
                ("work_process", work),
                ("machine_state", state),
            ] {
                if let Err(err) = result {
                    error!(
                        target: "cfx.workflow",
                        operation = operation,
                        error = %err,
                        "cycle_operation_failed"
                    );
                }
            }

            let delay = Duration::from_secs(config.machine_info.heartbeat_frequency.max(1));
            if sleep_cancellable(&cancel, delay).await {
                break;
            }
        }
        info!(target: "cfx.workflow", "workflow_loop_stopped");
    }
}

/// 启动工作流后台任务。
pub fn spawn_workflow(
    workflow: Arc<MachineWorkflow>,
    cancel: CancellationToken,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move { workflow.run(cancel).await })
}

/// 行时间戳：可解析时渲染为带偏移的 ISO-8601，否则保留原文。
fn row_timestamp(op_time: &str, offset_hours: i32) -> String {
    parse_flexible(op_time)
        .map(|naive| format_iso8601(naive, offset_hours))
        .unwrap_or_else(|| op_time.to_string())
}

/// 可取消延迟；返回是否因取消而提前返回。
async fn sleep_cancellable(cancel: &CancellationToken, delay: Duration) -> bool {
    tokio::select! {
        _ = cancel.cancelled() => true,
        _ = tokio::time::sleep(delay) => false,
    }
}
