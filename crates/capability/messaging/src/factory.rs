//! 协议解析工厂：每次调用读取当前配置快照，不缓存选择结果。

use crate::{
    AmqpConnectionManager, AmqpMessagingService, MessagingFactory, MessagingService,
    MqttMessagingService,
};
use cfx_config::{ConfigMonitor, Protocol};
use std::sync::Arc;

/// 按当前协议配置给出可用的 [`MessagingService`]。
///
/// AMQP 侧返回共享单例（底层连接昂贵且被池化）；
/// MQTT 侧返回新实例（客户端对象轻量）。
/// 调用方不得依赖两种生命周期中的任何一种，用完即 close。
pub struct MessagingServiceFactory {
    config: Arc<ConfigMonitor>,
    manager: Arc<AmqpConnectionManager>,
    amqp: Arc<AmqpMessagingService>,
}

impl MessagingServiceFactory {
    pub fn new(config: Arc<ConfigMonitor>) -> Self {
        let manager = Arc::new(AmqpConnectionManager::new(config.clone()));
        Self {
            amqp: Arc::new(AmqpMessagingService::new(manager.clone())),
            manager,
            config,
        }
    }

    /// 关闭共享的 AMQP 连接。幂等，进程退出时调用。
    pub async fn shutdown(&self) {
        self.manager.shutdown().await;
    }
}

impl MessagingFactory for MessagingServiceFactory {
    /// 解析当前协议并返回对应的消息服务。
    /// 未知协议值回退到 AMQP（向后兼容默认）。
    fn create_messaging_service(&self) -> Arc<dyn MessagingService> {
        match self.config.current().protocol.kind {
            Protocol::Mqtt => Arc::new(MqttMessagingService::new(self.config.clone())),
            Protocol::Amqp | Protocol::Other => self.amqp.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::MessagingServiceFactory;
    use crate::MessagingFactory;
    use cfx_config::{ConfigMonitor, LiveConfiguration, Protocol};
    use std::sync::Arc;

    fn monitor_with(kind: Protocol) -> Arc<ConfigMonitor> {
        let mut config = LiveConfiguration::default();
        config.protocol.kind = kind;
        Arc::new(ConfigMonitor::new(config))
    }

    #[test]
    fn amqp_protocol_resolves_rabbitmq_service() {
        let factory = MessagingServiceFactory::new(monitor_with(Protocol::Amqp));
        assert_eq!(factory.create_messaging_service().name(), "rabbitmq");
    }

    #[test]
    fn mqtt_protocol_resolves_mqtt_service() {
        let factory = MessagingServiceFactory::new(monitor_with(Protocol::Mqtt));
        assert_eq!(factory.create_messaging_service().name(), "mqtt");
    }

    #[test]
    fn unknown_protocol_falls_back_to_rabbitmq() {
        let factory = MessagingServiceFactory::new(monitor_with(Protocol::Other));
        assert_eq!(factory.create_messaging_service().name(), "rabbitmq");
    }

    #[test]
    fn amqp_service_is_shared_across_calls() {
        let factory = MessagingServiceFactory::new(monitor_with(Protocol::Amqp));
        let first = factory.create_messaging_service();
        let second = factory.create_messaging_service();
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn mqtt_service_is_fresh_per_call() {
        let factory = MessagingServiceFactory::new(monitor_with(Protocol::Mqtt));
        let first = factory.create_messaging_service();
        let second = factory.create_messaging_service();
        assert!(!Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn selection_follows_configuration_replacement() {
        let monitor = monitor_with(Protocol::Amqp);
        let factory = MessagingServiceFactory::new(monitor.clone());
        assert_eq!(factory.create_messaging_service().name(), "rabbitmq");

        let mut next = LiveConfiguration::default();
        next.protocol.kind = Protocol::Mqtt;
        monitor.replace(next);
        assert_eq!(factory.create_messaging_service().name(), "mqtt");
    }
}
