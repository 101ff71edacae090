//! AMQP（RabbitMQ）消息服务：共享连接 + 每次调用的瞬时 channel。

use crate::{BrokerError, MessagingService};
use async_trait::async_trait;
use cfx_config::ConfigMonitor;
use lapin::options::{
    BasicPublishOptions, ExchangeDeclareOptions, QueueBindOptions, QueueDeclareOptions,
};
use lapin::types::FieldTable;
use lapin::{BasicProperties, Channel, Connection, ConnectionProperties, ExchangeKind};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{info, warn};

/// 共享连接的显式状态。
enum ConnectionState {
    Disconnected,
    Connected(Arc<Connection>),
}

impl ConnectionState {
    fn live(&self) -> Option<Arc<Connection>> {
        match self {
            ConnectionState::Connected(connection) if connection.status().connected() => {
                Some(connection.clone())
            }
            _ => None,
        }
    }
}

/// 共享 AMQP 连接管理器。
///
/// 连接惰性建立、跨调用共享；持有的连接报告关闭后重建。
/// 读锁快路径 + 写锁下复查，避免并发调用方同时重建连接。
pub struct AmqpConnectionManager {
    config: Arc<ConfigMonitor>,
    state: RwLock<ConnectionState>,
}

impl AmqpConnectionManager {
    pub fn new(config: Arc<ConfigMonitor>) -> Self {
        Self {
            config,
            state: RwLock::new(ConnectionState::Disconnected),
        }
    }

    /// 取共享连接；处于 Disconnected 或连接已关闭时在写锁下重建。
    pub async fn get_connection(&self) -> Result<Arc<Connection>, BrokerError> {
        if let Some(connection) = self.state.read().await.live() {
            return Ok(connection);
        }

        let mut guard = self.state.write().await;
        // 写锁下复查：前一个持锁者可能已经重建完成
        if let Some(connection) = guard.live() {
            return Ok(connection);
        }

        let settings = self.config.current().rabbit_mq.clone();
        let uri = settings.amqp_uri();
        let connection = Connection::connect(&uri, ConnectionProperties::default())
            .await
            .map_err(|err| BrokerError::Connect(err.to_string()))?;
        info!(
            target: "cfx.messaging",
            host = %settings.host_name,
            port = settings.port,
            "amqp_connected"
        );
        let connection = Arc::new(connection);
        *guard = ConnectionState::Connected(connection.clone());
        Ok(connection)
    }

    /// 关闭连接并回到 Disconnected。幂等。
    pub async fn shutdown(&self) {
        let mut guard = self.state.write().await;
        if let ConnectionState::Connected(connection) =
            std::mem::replace(&mut *guard, ConnectionState::Disconnected)
        {
            if let Err(err) = connection.close(200, "shutting down").await {
                warn!(target: "cfx.messaging", error = %err, "amqp_close_failed");
            }
        }
    }
}

/// exchange/queue/routing-key 风格的消息服务。
///
/// 每次调用打开一个瞬时 channel，操作完成即弃；
/// 底层连接由 [`AmqpConnectionManager`] 共享。
pub struct AmqpMessagingService {
    manager: Arc<AmqpConnectionManager>,
}

impl AmqpMessagingService {
    pub fn new(manager: Arc<AmqpConnectionManager>) -> Self {
        Self { manager }
    }

    async fn channel(&self) -> Result<Channel, BrokerError> {
        let connection = self.manager.get_connection().await?;
        connection
            .create_channel()
            .await
            .map_err(|err| BrokerError::Channel(err.to_string()))
    }
}

fn exchange_kind(kind: &str) -> ExchangeKind {
    match kind {
        "direct" => ExchangeKind::Direct,
        "fanout" => ExchangeKind::Fanout,
        "headers" => ExchangeKind::Headers,
        _ => ExchangeKind::Topic,
    }
}

#[async_trait]
impl MessagingService for AmqpMessagingService {
    fn name(&self) -> &'static str {
        "rabbitmq"
    }

    async fn create_topic(&self, name: &str) -> Result<(), BrokerError> {
        let channel = self.channel().await?;
        channel
            .queue_declare(
                name,
                QueueDeclareOptions {
                    durable: true,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await
            .map_err(|err| BrokerError::Topology(err.to_string()))?;
        info!(target: "cfx.messaging", queue = %name, "queue_declared");
        Ok(())
    }

    async fn create_exchange(&self, name: &str, kind: &str) -> Result<(), BrokerError> {
        let channel = self.channel().await?;
        channel
            .exchange_declare(
                name,
                exchange_kind(kind),
                ExchangeDeclareOptions {
                    durable: true,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await
            .map_err(|err| BrokerError::Topology(err.to_string()))?;
        info!(target: "cfx.messaging", exchange = %name, kind = %kind, "exchange_declared");
        Ok(())
    }

    async fn bind_queue(
        &self,
        queue: &str,
        exchange: &str,
        routing_key: &str,
    ) -> Result<(), BrokerError> {
        let channel = self.channel().await?;
        channel
            .queue_bind(
                queue,
                exchange,
                routing_key,
                QueueBindOptions::default(),
                FieldTable::default(),
            )
            .await
            .map_err(|err| BrokerError::Topology(err.to_string()))?;
        info!(
            target: "cfx.messaging",
            queue = %queue,
            exchange = %exchange,
            routing_key = %routing_key,
            "queue_bound"
        );
        Ok(())
    }

    async fn publish_message(
        &self,
        exchange: &str,
        routing_key: &str,
        payload: &str,
    ) -> Result<(), BrokerError> {
        let channel = self.channel().await?;
        let properties = BasicProperties::default()
            .with_content_type("application/json".into())
            .with_delivery_mode(2); // 持久化
        let confirm = channel
            .basic_publish(
                exchange,
                routing_key,
                BasicPublishOptions {
                    mandatory: true,
                    ..Default::default()
                },
                payload.as_bytes(),
                properties,
            )
            .await
            .map_err(|err| BrokerError::Publish(err.to_string()))?;
        confirm
            .await
            .map_err(|err| BrokerError::Publish(err.to_string()))?;
        info!(
            target: "cfx.messaging",
            exchange = %exchange,
            routing_key = %routing_key,
            payload_size = payload.len(),
            "message_published"
        );
        Ok(())
    }

    async fn close(&self) -> Result<(), BrokerError> {
        // 共享连接由管理器持有，作用域结束无事可做
        Ok(())
    }
}
