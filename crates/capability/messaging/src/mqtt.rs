//! MQTT 消息服务：topic 风格发布，服务端无拓扑可建。

use crate::routing::mqtt_topic;
use crate::{BrokerError, MessagingService};
use async_trait::async_trait;
use cfx_config::ConfigMonitor;
use rumqttc::{AsyncClient, MqttOptions, QoS};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{info, warn};

struct MqttHandle {
    client: AsyncClient,
    eventloop_task: tokio::task::JoinHandle<()>,
}

/// topic 风格的消息服务。
///
/// 客户端在首次发布时按当前配置快照惰性连接；
/// create-topic/create-exchange/bind 仅为兼容 AMQP 能力面而登记名称。
/// 工厂每次调用都会给出新实例，用完必须 [`close`]。
///
/// [`close`]: MessagingService::close
pub struct MqttMessagingService {
    config: Arc<ConfigMonitor>,
    handle: Mutex<Option<MqttHandle>>,
    created_topics: Mutex<HashSet<String>>,
}

impl MqttMessagingService {
    pub fn new(config: Arc<ConfigMonitor>) -> Self {
        Self {
            config,
            handle: Mutex::new(None),
            created_topics: Mutex::new(HashSet::new()),
        }
    }

    /// 取已连接的客户端，必要时建立连接并启动事件循环任务。
    async fn client(&self) -> Result<AsyncClient, BrokerError> {
        let mut guard = self.handle.lock().await;
        if let Some(handle) = guard.as_ref() {
            return Ok(handle.client.clone());
        }

        let settings = self.config.current().mqtt.clone();
        let client_id = settings
            .client_id
            .clone()
            .filter(|id| !id.is_empty())
            .unwrap_or_else(|| format!("csv2cfx-{}", uuid::Uuid::new_v4()));
        let mut options = MqttOptions::new(client_id, settings.broker_host.clone(), settings.broker_port);
        options.set_keep_alive(Duration::from_secs(settings.keep_alive_period.max(1)));
        options.set_clean_session(settings.clean_session);
        if let (Some(username), Some(password)) =
            (settings.username.as_ref(), settings.password.as_ref())
        {
            options.set_credentials(username, password);
        }

        let (client, mut eventloop) = AsyncClient::new(options, 10);
        let eventloop_task = tokio::spawn(async move {
            loop {
                if let Err(err) = eventloop.poll().await {
                    warn!(target: "cfx.messaging", error = %err, "mqtt_eventloop_error");
                    tokio::time::sleep(Duration::from_secs(1)).await;
                }
            }
        });
        info!(
            target: "cfx.messaging",
            host = %settings.broker_host,
            port = settings.broker_port,
            "mqtt_connected"
        );
        *guard = Some(MqttHandle {
            client: client.clone(),
            eventloop_task,
        });
        Ok(client)
    }
}

#[async_trait]
impl MessagingService for MqttMessagingService {
    fn name(&self) -> &'static str {
        "mqtt"
    }

    async fn create_topic(&self, name: &str) -> Result<(), BrokerError> {
        // MQTT topic 随首次发布隐式产生，仅登记名称供观测
        self.created_topics.lock().await.insert(name.to_string());
        info!(target: "cfx.messaging", topic = %name, "topic_recorded");
        Ok(())
    }

    async fn create_exchange(&self, name: &str, kind: &str) -> Result<(), BrokerError> {
        self.created_topics.lock().await.insert(name.to_string());
        info!(target: "cfx.messaging", exchange = %name, kind = %kind, "exchange_recorded");
        Ok(())
    }

    async fn bind_queue(
        &self,
        queue: &str,
        exchange: &str,
        routing_key: &str,
    ) -> Result<(), BrokerError> {
        // 绑定由消费方订阅完成，这里仅留日志
        info!(
            target: "cfx.messaging",
            queue = %queue,
            exchange = %exchange,
            routing_key = %routing_key,
            "bind_recorded"
        );
        Ok(())
    }

    async fn publish_message(
        &self,
        exchange: &str,
        routing_key: &str,
        payload: &str,
    ) -> Result<(), BrokerError> {
        let client = self.client().await?;
        let prefix = self.config.current().mqtt.topic_prefix.clone();
        let topic = mqtt_topic(&prefix, exchange, routing_key);
        client
            .publish(topic.clone(), QoS::AtLeastOnce, false, payload.as_bytes())
            .await
            .map_err(|err| BrokerError::Publish(err.to_string()))?;
        info!(
            target: "cfx.messaging",
            topic = %topic,
            payload_size = payload.len(),
            "message_published"
        );
        Ok(())
    }

    async fn close(&self) -> Result<(), BrokerError> {
        let mut guard = self.handle.lock().await;
        if let Some(handle) = guard.take() {
            if let Err(err) = handle.client.disconnect().await {
                warn!(target: "cfx.messaging", error = %err, "mqtt_disconnect_failed");
            }
            handle.eventloop_task.abort();
        }
        Ok(())
    }
}
