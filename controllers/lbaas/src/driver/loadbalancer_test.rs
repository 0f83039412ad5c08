//! Unit tests for load balancer ensure/release

#[cfg(test)]
mod tests {
    use crate::config::SgMode;
    use crate::error::DriverError;
    use crate::test_utils::*;
    use openstack_client::{LbResourceKind, MockFailure, ProvisioningStatus};

    #[tokio::test]
    async fn test_ensure_creates_once_and_then_finds() {
        let env = TestEnv::new();
        let driver = env.default_driver();
        let desired = desired_loadbalancer();

        let created = driver.ensure_loadbalancer(&desired).await.unwrap();
        let found = driver.ensure_loadbalancer(&desired).await.unwrap();

        assert!(created.id.is_some());
        assert_eq!(created.id, found.id);
        assert_eq!(env.lbaas.count(LbResourceKind::LoadBalancer), 1);
        assert_eq!(env.lbaas.call_count("post_loadbalancer"), 1);
        assert_eq!(found.provider.as_deref(), Some("amphora"));
    }

    #[tokio::test]
    async fn test_vip_port_resolved_through_fixed_ips() {
        let env = TestEnv::new();
        seed_vip_port(&env.network, &["sg-vip"]);
        let driver = env.default_driver();

        let lb = driver.ensure_loadbalancer(&desired_loadbalancer()).await.unwrap();
        assert_eq!(lb.port_id.as_deref(), Some(VIP_PORT_ID));
    }

    #[tokio::test]
    async fn test_vip_port_falls_back_to_reported_id() {
        let env = TestEnv::new();
        let driver = env.default_driver();

        let lb = driver.ensure_loadbalancer(&desired_loadbalancer()).await.unwrap();
        let reported = env.lbaas.load_balancer(lb.id.as_deref().unwrap()).unwrap().vip_port_id;
        assert_eq!(lb.port_id, reported);
    }

    #[tokio::test]
    async fn test_found_in_error_is_released_and_state_cleared() {
        let env = TestEnv::new();
        seed_loadbalancer(&env.lbaas, ProvisioningStatus::Error);
        let driver = env.default_driver();

        let err = driver.ensure_loadbalancer(&desired_loadbalancer()).await.unwrap_err();

        assert!(err.is_removed());
        assert_eq!(env.lbaas.count(LbResourceKind::LoadBalancer), 0);
        assert_eq!(env.lbaas.call_count("post_loadbalancer"), 0);
        assert_eq!(env.store.cleared(), vec!["default/web".to_string()]);
    }

    #[tokio::test]
    async fn test_pending_delete_is_ignored_by_lookup() {
        let env = TestEnv::new();
        seed_loadbalancer(&env.lbaas, ProvisioningStatus::PendingDelete);
        let driver = env.default_driver();

        let lb = driver.ensure_loadbalancer(&desired_loadbalancer()).await.unwrap();
        assert_ne!(lb.id.as_deref(), Some(SEEDED_LB_ID));
        assert_eq!(env.lbaas.call_count("post_loadbalancer"), 1);
    }

    #[tokio::test]
    async fn test_provider_mismatch_is_not_ready() {
        let env = TestEnv::new();
        env.lbaas.set_provider_override(Some("amphora"));
        let driver = env.default_driver();

        let err = driver
            .ensure_loadbalancer(&desired_loadbalancer().with_provider("ovn"))
            .await
            .unwrap_err();
        assert!(matches!(err, DriverError::ResourceNotReady(_)));
    }

    #[tokio::test]
    async fn test_requested_provider_is_kept() {
        let env = TestEnv::new();
        let driver = env.default_driver();

        let lb = driver
            .ensure_loadbalancer(&desired_loadbalancer().with_provider("ovn"))
            .await
            .unwrap();
        assert_eq!(lb.provider.as_deref(), Some("ovn"));
    }

    #[tokio::test]
    async fn test_create_failure_propagates() {
        let env = TestEnv::new();
        env.lbaas.inject_failure("post_loadbalancer", MockFailure::Status(503), 1);
        let driver = env.default_driver();

        let err = driver.ensure_loadbalancer(&desired_loadbalancer()).await.unwrap_err();
        assert_eq!(err.backend().and_then(|e| e.status_code()), Some(503));
    }

    #[tokio::test]
    async fn test_release_drops_owned_security_group() {
        let env = TestEnv::new();
        let mut lb = seed_loadbalancer(&env.lbaas, ProvisioningStatus::Active);
        let sg_id = seed_lb_security_group(&env.network, &lb);
        lb.security_groups.push(sg_id.clone());
        let driver = env.driver(
            crate::config::DriverConfig {
                sg_mode: SgMode::Create,
                ..test_config()
            },
            no_acls(),
        );

        driver.release_loadbalancer(&lb).await.unwrap();

        assert_eq!(env.lbaas.count(LbResourceKind::LoadBalancer), 0);
        assert!(env.network.security_group(&sg_id).is_none());
    }

    #[tokio::test]
    async fn test_release_keeps_group_without_enforcement_in_update_mode() {
        let env = TestEnv::new();
        let mut lb = seed_loadbalancer(&env.lbaas, ProvisioningStatus::Active);
        let sg_id = seed_lb_security_group(&env.network, &lb);
        lb.security_groups.push(sg_id.clone());
        let driver = env.driver(
            crate::config::DriverConfig {
                enforce_sg_rules: false,
                ..test_config()
            },
            no_acls(),
        );

        driver.release_loadbalancer(&lb).await.unwrap();
        assert!(env.network.security_group(&sg_id).is_some());
    }

    #[tokio::test]
    async fn test_release_of_missing_load_balancer_succeeds() {
        let env = TestEnv::new();
        let driver = env.default_driver();
        let mut lb = desired_loadbalancer();
        lb.id = Some("gone".to_string());

        driver.release_loadbalancer(&lb).await.unwrap();
        assert_eq!(env.lbaas.call_count("delete_load_balancer"), 1);
    }

    #[tokio::test]
    async fn test_get_lb_by_uuid() {
        let env = TestEnv::new();
        seed_loadbalancer(&env.lbaas, ProvisioningStatus::Active);
        let driver = env.default_driver();

        let lb = driver.get_lb_by_uuid(SEEDED_LB_ID).await.unwrap().unwrap();
        assert_eq!(lb.name, "default/web");
        assert_eq!(lb.ip.to_string(), VIP_ADDRESS);
        assert_eq!(lb.subnet_id, VIP_SUBNET_ID);
        assert!(driver.get_lb_by_uuid("missing").await.unwrap().is_none());
    }

    #[test]
    fn test_naming_and_capability_accessors() {
        let env = TestEnv::new();
        let old = env.driver(test_config(), crate::capabilities::Capabilities::default());
        let new = env.default_driver();

        assert!(!old.double_listeners_supported());
        assert!(new.double_listeners_supported());
        assert_eq!(new.get_service_loadbalancer_name("default", "web"), "default/web");
        assert_eq!(
            new.get_loadbalancer_pool_name("default/web", "default", "backend"),
            "default/web/default/backend"
        );
    }
}
