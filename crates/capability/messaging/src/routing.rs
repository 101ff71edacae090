//! 路由地址构造：纯函数，同一 (prefix, event) 恒得同一组地址。

/// 一种事件类型对应的 AMQP 路由三元组。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutingAddress {
    pub exchange: String,
    pub queue: String,
    pub routing_key: String,
}

/// 由路由前缀与事件段构造 exchange/queue/routing-key，全部小写。
pub fn routing_address(prefix: &str, event: &str) -> RoutingAddress {
    RoutingAddress {
        exchange: format!("{prefix}.exchange").to_lowercase(),
        queue: format!("{prefix}.{event}.queue").to_lowercase(),
        routing_key: format!("{prefix}.{event}.routing-key").to_lowercase(),
    }
}

/// 组合 MQTT topic：`prefix/exchange/routingKey`，空段省略。
pub fn mqtt_topic(prefix: &str, exchange: &str, routing_key: &str) -> String {
    [prefix, exchange, routing_key]
        .iter()
        .filter(|segment| !segment.is_empty())
        .copied()
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use super::{mqtt_topic, routing_address};

    #[test]
    fn routing_address_is_lowercased_triple() {
        let address = routing_address("Acme", "heartbeat");
        assert_eq!(address.exchange, "acme.exchange");
        assert_eq!(address.queue, "acme.heartbeat.queue");
        assert_eq!(address.routing_key, "acme.heartbeat.routing-key");
    }

    #[test]
    fn routing_address_is_pure() {
        assert_eq!(
            routing_address("acme", "faultoccurred"),
            routing_address("acme", "faultoccurred")
        );
    }

    #[test]
    fn mqtt_topic_joins_segments() {
        assert_eq!(
            mqtt_topic("cfx", "acme.exchange", "acme.heartbeat.routing-key"),
            "cfx/acme.exchange/acme.heartbeat.routing-key"
        );
    }

    #[test]
    fn mqtt_topic_omits_empty_segments() {
        assert_eq!(mqtt_topic("", "acme.exchange", "rk"), "acme.exchange/rk");
        assert_eq!(mqtt_topic("cfx", "", "rk"), "cfx/rk");
        assert_eq!(mqtt_topic("cfx", "acme.exchange", ""), "cfx/acme.exchange");
        assert_eq!(mqtt_topic("", "", ""), "");
    }
}
