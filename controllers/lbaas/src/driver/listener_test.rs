//! Unit tests for listener ensure/release

#[cfg(test)]
mod tests {
    use crate::config::{DriverConfig, SgMode};
    use crate::error::DriverError;
    use crate::test_utils::*;
    use openstack_client::{LbResourceKind, MockFailure, ProvisioningStatus};

    fn create_mode() -> DriverConfig {
        DriverConfig {
            sg_mode: SgMode::Create,
            ..test_config()
        }
    }

    #[tokio::test]
    async fn test_ensure_is_idempotent() {
        let env = TestEnv::new();
        let mut lb = seed_loadbalancer(&env.lbaas, ProvisioningStatus::Active);
        let driver = env.default_driver();

        let first = driver.ensure_listener(&mut lb, "TCP", 80, "LoadBalancer").await.unwrap().unwrap();
        let second = driver.ensure_listener(&mut lb, "TCP", 80, "LoadBalancer").await.unwrap().unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(first.name, "default/web:TCP:80");
        assert_eq!(env.lbaas.count(LbResourceKind::Listener), 1);
    }

    #[tokio::test]
    async fn test_conflict_with_nothing_found_is_retried() {
        let env = TestEnv::new();
        let mut lb = seed_loadbalancer(&env.lbaas, ProvisioningStatus::Active);
        env.lbaas.inject_failure("post_listener", MockFailure::Status(409), 1);
        let driver = env.default_driver();

        let listener = driver.ensure_listener(&mut lb, "TCP", 80, "LoadBalancer").await.unwrap().unwrap();

        assert!(listener.id.is_some());
        assert_eq!(env.lbaas.call_count("post_listener"), 2);
        assert_eq!(env.lbaas.call_count("listeners"), 1);
        assert_eq!(env.lbaas.count(LbResourceKind::Listener), 1);
    }

    #[tokio::test]
    async fn test_server_error_is_retried() {
        let env = TestEnv::new();
        let mut lb = seed_loadbalancer(&env.lbaas, ProvisioningStatus::Active);
        env.lbaas.inject_failure("post_listener", MockFailure::Status(503), 2);
        let driver = env.default_driver();

        let listener = driver.ensure_listener(&mut lb, "TCP", 80, "LoadBalancer").await.unwrap();
        assert!(listener.is_some());
        assert_eq!(env.lbaas.call_count("post_listener"), 3);
    }

    #[tokio::test]
    async fn test_bad_request_means_unsupported_protocol() {
        let env = TestEnv::new();
        let mut lb = seed_loadbalancer(&env.lbaas, ProvisioningStatus::Active);
        env.lbaas.inject_failure("post_listener", MockFailure::Status(400), 1);
        let driver = env.default_driver();

        let listener = driver.ensure_listener(&mut lb, "SCTP", 80, "LoadBalancer").await.unwrap();
        assert!(listener.is_none());
        assert_eq!(env.lbaas.call_count("post_listener"), 1);
    }

    #[tokio::test]
    async fn test_not_found_clears_state() {
        let env = TestEnv::new();
        let mut lb = seed_loadbalancer(&env.lbaas, ProvisioningStatus::Active);
        env.lbaas.inject_failure("post_listener", MockFailure::Status(404), 1);
        let driver = env.default_driver();

        let err = driver.ensure_listener(&mut lb, "TCP", 80, "LoadBalancer").await.unwrap_err();
        assert!(err.is_removed());
        assert_eq!(env.store.cleared(), vec!["default/web".to_string()]);
    }

    #[tokio::test]
    async fn test_times_out_while_load_balancer_is_busy() {
        let env = TestEnv::new();
        let mut lb = seed_loadbalancer(&env.lbaas, ProvisioningStatus::PendingUpdate);
        let driver = env.default_driver();

        let err = driver.ensure_listener(&mut lb, "TCP", 80, "LoadBalancer").await.unwrap_err();

        assert!(err.is_not_ready());
        assert!(matches!(err, DriverError::LoadBalancerNotReady { .. }));
        assert_eq!(env.lbaas.call_count("post_listener"), 0);
        assert!(env.clock.elapsed() <= test_config().activation_timeout);
    }

    #[tokio::test]
    async fn test_only_positive_timeouts_are_sent() {
        let env = TestEnv::new();
        let mut lb = seed_loadbalancer(&env.lbaas, ProvisioningStatus::Active);
        let driver = env.driver(
            DriverConfig {
                timeout_client_data: Some(50_000),
                timeout_member_data: Some(0),
                ..test_config()
            },
            no_acls(),
        );

        let listener = driver.ensure_listener(&mut lb, "TCP", 80, "LoadBalancer").await.unwrap().unwrap();
        let stored = env.lbaas.listener(listener.id.as_deref().unwrap()).unwrap();

        assert_eq!(stored.timeout_client_data, Some(50_000));
        assert_eq!(stored.timeout_member_data, None);
    }

    #[tokio::test]
    async fn test_create_mode_opens_listener_port() {
        let env = TestEnv::new();
        seed_vip_port(&env.network, &["sg-octavia"]);
        let mut lb = seed_loadbalancer(&env.lbaas, ProvisioningStatus::Active);
        let driver = env.driver(create_mode(), no_acls());

        driver.ensure_listener(&mut lb, "TCP", 80, "LoadBalancer").await.unwrap();
        driver.ensure_listener(&mut lb, "TCP", 80, "LoadBalancer").await.unwrap();

        assert_eq!(lb.security_groups.len(), 1);
        let sg_id = &lb.security_groups[0];
        let group = env.network.security_group(sg_id).unwrap();
        assert_eq!(group.name, "default/web");
        assert_eq!(env.network.call_count("create_security_group"), 1);
        assert_eq!(env.network.port(VIP_PORT_ID).unwrap().security_groups, vec![sg_id.clone()]);

        let rules = env.network.rules_of(sg_id);
        assert_eq!(rules.len(), 1);
        assert_eq!(rules[0].port_range_min, Some(80));
        assert_eq!(rules[0].protocol.as_deref(), Some("tcp"));
        assert_eq!(rules[0].remote_ip_prefix, None);
        assert_eq!(rules[0].description, "default/web:TCP:80");
    }

    #[tokio::test]
    async fn test_release_removes_listener_rule() {
        let env = TestEnv::new();
        seed_vip_port(&env.network, &[]);
        let mut lb = seed_loadbalancer(&env.lbaas, ProvisioningStatus::Active);
        let driver = env.driver(create_mode(), no_acls());

        let listener = driver.ensure_listener(&mut lb, "TCP", 80, "LoadBalancer").await.unwrap().unwrap();
        driver.ensure_listener(&mut lb, "UDP", 53, "LoadBalancer").await.unwrap();
        driver.release_listener(&lb, &listener).await.unwrap();

        assert_eq!(env.lbaas.count(LbResourceKind::Listener), 1);
        let rules = env.network.rules_of(&lb.security_groups[0]);
        assert_eq!(rules.len(), 1);
        assert_eq!(rules[0].port_range_min, Some(53));
    }

    #[tokio::test]
    async fn test_release_of_missing_listener_succeeds() {
        let env = TestEnv::new();
        let lb = seed_loadbalancer(&env.lbaas, ProvisioningStatus::Active);
        let driver = env.default_driver();
        let listener = crate::objects::Listener {
            id: Some("gone".to_string()),
            name: "default/web:TCP:80".to_string(),
            project_id: PROJECT_ID.to_string(),
            loadbalancer_id: SEEDED_LB_ID.to_string(),
            protocol: "TCP".to_string(),
            port: 80,
            timeout_client_data: None,
            timeout_member_data: None,
        };

        driver.release_listener(&lb, &listener).await.unwrap();
        assert_eq!(env.lbaas.call_count("delete_listener"), 1);
    }
}
