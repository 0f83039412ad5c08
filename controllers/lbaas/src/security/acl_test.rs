//! Unit tests for listener ACL updates

#[cfg(test)]
mod tests {
    use crate::config::{DriverConfig, ServiceSecurityGroupsDriver};
    use crate::driver::LbaasDriver;
    use crate::error::DriverError;
    use crate::objects::LoadBalancer;
    use crate::security::{ListenerRuleTarget, TargetPort};
    use crate::test_utils::*;
    use openstack_client::{MockFailure, ProvisioningStatus};

    const LISTENER_ID: &str = "listener-80";
    const LISTENER_NAME: &str = "default/web:TCP:80";

    fn setup(env: &TestEnv) -> (LbaasDriver, LoadBalancer) {
        let lb = seed_loadbalancer(&env.lbaas, ProvisioningStatus::Active);
        seed_listener(&env.lbaas, LISTENER_ID, LISTENER_NAME, "TCP", 80);
        seed_vip_port(&env.network, &["sg-vip"]);
        env.network.add_security_group(security_group(
            "sg-x",
            "x",
            vec![ingress_rule("x-1", "sg-x", "tcp", Some((8080, 8080)), Some("10.0.0.0/24"))],
        ));
        env.network.add_security_group(security_group(
            "sg-y",
            "y",
            vec![ingress_rule("y-1", "sg-y", "tcp", None, None)],
        ));
        let config = DriverConfig {
            service_security_groups_driver: ServiceSecurityGroupsDriver::Policy,
            ..test_config()
        };
        (env.driver(config, with_acls()), lb)
    }

    fn target() -> ListenerRuleTarget<'static> {
        ListenerRuleTarget {
            listener_id: LISTENER_ID,
            rule_name: LISTENER_NAME,
            protocol: "TCP",
            port: 80,
            target_port: TargetPort::Number(8080),
        }
    }

    fn acl(env: &TestEnv) -> (Option<Vec<String>>, bool) {
        let listener = env.lbaas.listener(LISTENER_ID).unwrap();
        (listener.allowed_cidrs, listener.admin_state_up)
    }

    #[tokio::test]
    async fn test_open_group_clears_acl() {
        let env = TestEnv::new();
        let (driver, mut lb) = setup(&env);
        lb.security_groups = vec!["sg-x".to_string(), "sg-y".to_string()];

        driver.apply_members_security_groups(&lb, &target(), None).await.unwrap();

        assert_eq!(acl(&env), (None, true));
        assert_eq!(env.network.call_count("create_security_group_rule"), 0);
    }

    #[tokio::test]
    async fn test_restrictive_group_sets_acl() {
        let env = TestEnv::new();
        let (driver, mut lb) = setup(&env);
        lb.security_groups = vec!["sg-x".to_string()];

        driver.apply_members_security_groups(&lb, &target(), None).await.unwrap();

        assert_eq!(acl(&env), (Some(vec!["10.0.0.0/24".to_string()]), true));
    }

    #[tokio::test]
    async fn test_empty_allow_set_disables_listener() {
        let env = TestEnv::new();
        let (driver, mut lb) = setup(&env);
        lb.security_groups = vec!["sg-vip".to_string()];

        driver.apply_members_security_groups(&lb, &target(), None).await.unwrap();

        assert_eq!(acl(&env), (Some(vec![]), false));
    }

    #[tokio::test]
    async fn test_acl_follows_policy_changes() {
        let env = TestEnv::new();
        let (driver, lb) = setup(&env);
        let restrictive = vec!["sg-x".to_string()];
        let open = vec!["sg-x".to_string(), "sg-y".to_string()];

        driver
            .apply_members_security_groups(&lb, &target(), Some(&restrictive))
            .await
            .unwrap();
        assert_eq!(acl(&env).0, Some(vec!["10.0.0.0/24".to_string()]));

        driver.apply_members_security_groups(&lb, &target(), Some(&open)).await.unwrap();
        assert_eq!(acl(&env), (None, true));

        driver
            .apply_members_security_groups(&lb, &target(), Some(&restrictive))
            .await
            .unwrap();
        assert_eq!(acl(&env), (Some(vec!["10.0.0.0/24".to_string()]), true));
    }

    #[tokio::test]
    async fn test_busy_load_balancer_skips_update() {
        let env = TestEnv::new();
        let (driver, lb) = setup(&env);
        env.lbaas.set_lb_status(SEEDED_LB_ID, ProvisioningStatus::PendingUpdate);

        driver
            .update_listener_acls(&lb, LISTENER_ID, Some(vec!["10.0.0.0/24".to_string()]))
            .await
            .unwrap();

        assert_eq!(env.lbaas.call_count("update_listener"), 0);
        assert_eq!(acl(&env), (None, true));
    }

    #[tokio::test]
    async fn test_rejected_update_is_not_ready() {
        let env = TestEnv::new();
        let (driver, lb) = setup(&env);
        env.lbaas.inject_failure("update_listener", MockFailure::Status(409), 1);

        let err = driver
            .update_listener_acls(&lb, LISTENER_ID, Some(vec!["10.0.0.0/24".to_string()]))
            .await
            .unwrap_err();
        assert!(matches!(err, DriverError::ResourceNotReady(_)));
    }

    #[tokio::test]
    async fn test_load_balancer_in_error_propagates_removed() {
        let env = TestEnv::new();
        let (driver, lb) = setup(&env);
        env.lbaas.set_lb_status(SEEDED_LB_ID, ProvisioningStatus::Error);

        let err = driver.update_listener_acls(&lb, LISTENER_ID, None).await.unwrap_err();
        assert!(err.is_removed());
    }
}
