//! 双协议消息发布能力。
//!
//! 同一套 {create-topic, create-exchange, bind, publish} 能力面向两种
//! 消息中间件：AMQP（exchange/queue/routing-key 拓扑，lapin）与
//! MQTT（层级 topic 发布/订阅，rumqttc）。激活的协议由配置快照决定，
//! [`MessagingServiceFactory`] 在每次调用时重新解析，不做缓存。

mod amqp;
mod factory;
mod mqtt;
pub mod routing;

pub use amqp::{AmqpConnectionManager, AmqpMessagingService};
pub use factory::MessagingServiceFactory;
pub use mqtt::MqttMessagingService;
pub use routing::{mqtt_topic, routing_address, RoutingAddress};

use async_trait::async_trait;
use std::sync::Arc;

/// 工厂能力面：按当前协议配置给出可用的消息服务。
///
/// 工作流引擎只依赖这一接口，便于在测试中注入记录用替身。
pub trait MessagingFactory: Send + Sync {
    fn create_messaging_service(&self) -> Arc<dyn MessagingService>;
}

/// 消息中间件错误。连接/发布失败原样上抛，由调用方决定重试策略。
#[derive(Debug, thiserror::Error)]
pub enum BrokerError {
    #[error("connect error: {0}")]
    Connect(String),
    #[error("channel error: {0}")]
    Channel(String),
    #[error("topology error: {0}")]
    Topology(String),
    #[error("publish error: {0}")]
    Publish(String),
}

/// 协议无关的消息服务能力。
///
/// 调用方把返回的实例视为单次操作作用域：用完调用 [`close`]，
/// 不假设它是共享单例还是新实例。
///
/// [`close`]: MessagingService::close
#[async_trait]
pub trait MessagingService: Send + Sync {
    /// 实现方名称（日志用）。
    fn name(&self) -> &'static str;

    /// 创建队列/topic。MQTT 侧仅登记名称（topic 随首次发布隐式产生）。
    async fn create_topic(&self, name: &str) -> Result<(), BrokerError>;

    /// 创建 exchange。MQTT 侧无服务端拓扑，仅登记名称。
    async fn create_exchange(&self, name: &str, kind: &str) -> Result<(), BrokerError>;

    /// 将队列绑定到 exchange。MQTT 侧为空操作（订阅由消费方发起）。
    async fn bind_queue(
        &self,
        queue: &str,
        exchange: &str,
        routing_key: &str,
    ) -> Result<(), BrokerError>;

    /// 发布一条消息。
    ///
    /// AMQP：持久化 + mandatory（不可路由时由 broker 报错）。
    /// MQTT：topic 组合为 `prefix/exchange/routingKey`（空段省略），
    /// QoS 1，非保留。
    async fn publish_message(
        &self,
        exchange: &str,
        routing_key: &str,
        payload: &str,
    ) -> Result<(), BrokerError>;

    /// 释放本作用域的瞬时资源。共享连接不在此关闭。
    async fn close(&self) -> Result<(), BrokerError>;
}
