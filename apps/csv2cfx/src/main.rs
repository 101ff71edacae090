//! CSV → CFX 桥接服务入口。
//!
//! 该二进制负责把各能力模块装配成完整链路：加载 JSON 配置并建立
//! 热更新监视、构造协议工厂、启动工作流循环，收到 ctrl-c 后通过
//! 统一的取消信号协作停机。外部设备/MES 只需把 CSV 导出落在配置
//! 指定的路径下，对应的 CFX 事件即被发布到消息中间件。

use cfx_config::{spawn_file_watch, BootstrapConfig, ConfigMonitor, LiveConfiguration};
use cfx_messaging::MessagingServiceFactory;
use cfx_telemetry::init_tracing;
use cfx_workflow::{spawn_workflow, MachineWorkflow};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 加载本地 .env（如存在），便于直接 cargo run 启动
    dotenvy::dotenv().ok();
    // 引导参数（配置文件路径、轮询周期）来自环境变量
    let bootstrap = BootstrapConfig::from_env()?;
    // 初始化结构化日志
    init_tracing();

    // 首个配置快照；之后由文件监视任务热替换
    let initial = LiveConfiguration::from_file(&bootstrap.config_path)?;
    let monitor = Arc::new(ConfigMonitor::new(initial));

    let cancel = CancellationToken::new();
    let watcher = spawn_file_watch(
        monitor.clone(),
        bootstrap.config_path.clone(),
        Duration::from_secs(bootstrap.poll_seconds),
        cancel.clone(),
    );

    // 协议工厂与工作流引擎
    let factory = Arc::new(MessagingServiceFactory::new(monitor.clone()));
    let workflow = Arc::new(MachineWorkflow::new(monitor, factory.clone()));
    let runner = spawn_workflow(workflow, cancel.clone());

    info!(
        config = %bootstrap.config_path.display(),
        "csv2cfx bridge started"
    );

    tokio::signal::ctrl_c().await?;
    info!("shutdown signal received");
    cancel.cancel();
    let _ = runner.await;
    let _ = watcher.await;
    factory.shutdown().await;
    info!("csv2cfx bridge stopped");
    Ok(())
}
