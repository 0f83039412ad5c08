//! Unit tests for pool ensure/release

#[cfg(test)]
mod tests {
    use crate::objects::Listener;
    use crate::test_utils::*;
    use openstack_client::models as api;
    use openstack_client::{LbResourceKind, MockFailure, ProvisioningStatus};

    async fn listener(env: &TestEnv, lb: &mut crate::objects::LoadBalancer) -> Listener {
        env.default_driver()
            .ensure_listener(lb, "TCP", 80, "LoadBalancer")
            .await
            .unwrap()
            .unwrap()
    }

    #[tokio::test]
    async fn test_ensure_pool_behind_listener() {
        let env = TestEnv::new();
        let mut lb = seed_loadbalancer(&env.lbaas, ProvisioningStatus::Active);
        let listener = listener(&env, &mut lb).await;
        let driver = env.default_driver();

        let first = driver.ensure_pool(&lb, &listener).await.unwrap();
        let second = driver.ensure_pool(&lb, &listener).await.unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(first.name, listener.name);
        assert_eq!(first.listener_id, listener.id);
        assert_eq!(env.lbaas.count(LbResourceKind::Pool), 1);
        let stored = env.lbaas.listener(listener.id.as_deref().unwrap()).unwrap();
        assert_eq!(stored.default_pool_id, first.id);
    }

    #[tokio::test]
    async fn test_pool_attached_to_load_balancer() {
        let env = TestEnv::new();
        let lb = seed_loadbalancer(&env.lbaas, ProvisioningStatus::Active);
        let driver = env.default_driver();

        let pool = driver
            .ensure_pool_attached_to_lb(&lb, "default", "backend", "HTTP")
            .await
            .unwrap();
        assert_eq!(pool.name, "default/web/default/backend");
        assert_eq!(pool.listener_id, None);

        let again = driver
            .ensure_pool_attached_to_lb(&lb, "default", "backend", "HTTP")
            .await
            .unwrap();
        assert_eq!(pool.id, again.id);

        let by_name = driver
            .get_pool_by_name("default/web/default/backend", PROJECT_ID)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(by_name.id, pool.id);
        assert_eq!(by_name.loadbalancer_id, SEEDED_LB_ID);
        assert!(driver.get_pool_by_name("nope", PROJECT_ID).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_pool_found_in_error_is_released() {
        let env = TestEnv::new();
        let mut lb = seed_loadbalancer(&env.lbaas, ProvisioningStatus::Active);
        let listener = listener(&env, &mut lb).await;
        env.lbaas.add_pool(api::Pool {
            id: "pool-broken".to_string(),
            name: listener.name.clone(),
            project_id: PROJECT_ID.to_string(),
            description: String::new(),
            protocol: "TCP".to_string(),
            lb_algorithm: "ROUND_ROBIN".to_string(),
            listeners: vec![api::IdRef {
                id: listener.id.clone().unwrap(),
            }],
            loadbalancers: vec![api::IdRef {
                id: SEEDED_LB_ID.to_string(),
            }],
            provisioning_status: ProvisioningStatus::Error,
            tags: vec![],
        });
        let driver = env.default_driver();

        let err = driver.ensure_pool(&lb, &listener).await.unwrap_err();

        assert!(err.is_removed());
        assert_eq!(env.lbaas.call_count("delete_pool"), 1);
        assert_eq!(env.lbaas.count(LbResourceKind::Pool), 0);
        // The load balancer itself stays
        assert_eq!(env.lbaas.count(LbResourceKind::LoadBalancer), 1);
    }

    #[tokio::test]
    async fn test_missing_parent_releases_load_balancer() {
        let env = TestEnv::new();
        let mut lb = seed_loadbalancer(&env.lbaas, ProvisioningStatus::Active);
        let listener = listener(&env, &mut lb).await;
        env.lbaas.inject_failure("post_pool", MockFailure::Status(404), 1);
        let driver = env.default_driver();

        let err = driver.ensure_pool(&lb, &listener).await.unwrap_err();

        assert!(err.is_removed());
        assert_eq!(env.lbaas.count(LbResourceKind::LoadBalancer), 0);
        assert_eq!(env.store.cleared(), vec!["default/web".to_string()]);
    }

    #[tokio::test]
    async fn test_release_pool_tolerates_missing() {
        let env = TestEnv::new();
        let mut lb = seed_loadbalancer(&env.lbaas, ProvisioningStatus::Active);
        let listener = listener(&env, &mut lb).await;
        let driver = env.default_driver();
        let pool = driver.ensure_pool(&lb, &listener).await.unwrap();

        driver.release_pool(&lb, &pool).await.unwrap();
        driver.release_pool(&lb, &pool).await.unwrap();

        assert_eq!(env.lbaas.count(LbResourceKind::Pool), 0);
        assert_eq!(env.lbaas.call_count("delete_pool"), 2);
    }

    #[tokio::test]
    async fn test_release_waits_out_busy_load_balancer() {
        let env = TestEnv::new();
        let mut lb = seed_loadbalancer(&env.lbaas, ProvisioningStatus::Active);
        let listener = listener(&env, &mut lb).await;
        let driver = env.default_driver();
        let pool = driver.ensure_pool(&lb, &listener).await.unwrap();
        env.lbaas.inject_failure("delete_pool", MockFailure::Status(409), 2);

        driver.release_pool(&lb, &pool).await.unwrap();

        assert_eq!(env.lbaas.call_count("delete_pool"), 3);
        assert_eq!(env.lbaas.count(LbResourceKind::Pool), 0);
    }

    #[tokio::test]
    async fn test_plain_server_error_on_create_finds_existing_pool() {
        let env = TestEnv::new();
        let mut lb = seed_loadbalancer(&env.lbaas, ProvisioningStatus::Active);
        let listener = listener(&env, &mut lb).await;
        env.lbaas.add_pool(api::Pool {
            id: "pool-existing".to_string(),
            name: listener.name.clone(),
            project_id: PROJECT_ID.to_string(),
            description: String::new(),
            protocol: "TCP".to_string(),
            lb_algorithm: "ROUND_ROBIN".to_string(),
            listeners: vec![api::IdRef {
                id: listener.id.clone().unwrap(),
            }],
            loadbalancers: vec![api::IdRef {
                id: SEEDED_LB_ID.to_string(),
            }],
            provisioning_status: ProvisioningStatus::Active,
            tags: vec![],
        });
        env.lbaas.inject_failure("post_pool", MockFailure::Status(500), 1);
        env.lbaas.reset_calls();
        let driver = env.default_driver();

        let pool = driver.ensure_pool(&lb, &listener).await.unwrap();

        assert_eq!(pool.id.as_deref(), Some("pool-existing"));
        assert_eq!(env.lbaas.call_count("post_pool"), 1);
        assert_eq!(env.lbaas.call_count("pools"), 1);
        assert_eq!(env.lbaas.count(LbResourceKind::Pool), 1);
    }
}
