//! Octavia operations for MockLoadBalancerClient
//!
//! Handles load balancers, listeners, pools, members, L7 policies and L7 rules

use super::helpers::{conflict, lock, matches_filters, new_id, not_found, opt_text, tags, text};
use super::MockLoadBalancerClient;
use crate::error::OpenStackError;
use crate::models::*;
use serde_json::Value;

pub async fn post_resource(
    client: &MockLoadBalancerClient,
    kind: LbResourceKind,
    parent_id: Option<&str>,
    body: Value,
) -> Result<Value, OpenStackError> {
    client.book.record(&format!("post_{}", kind.resource_key()))?;

    let created = match kind {
        LbResourceKind::LoadBalancer => serde_json::to_value(create_load_balancer(client, &body)?)?,
        LbResourceKind::Listener => serde_json::to_value(create_listener(client, &body)?)?,
        LbResourceKind::Pool => serde_json::to_value(create_pool(client, &body)?)?,
        LbResourceKind::Member => {
            serde_json::to_value(create_member(client, parent_id.unwrap_or_default(), &body)?)?
        }
        LbResourceKind::L7Policy => serde_json::to_value(create_l7_policy(client, &body)?)?,
        LbResourceKind::L7Rule => {
            serde_json::to_value(create_l7_rule(client, parent_id.unwrap_or_default(), &body)?)?
        }
    };
    Ok(created)
}

fn create_load_balancer(client: &MockLoadBalancerClient, body: &Value) -> Result<LoadBalancer, OpenStackError> {
    let name = text(body, "name");
    let project_id = text(body, "project_id");
    let vip_address = opt_text(body, "vip_address");
    let vip_subnet_id = opt_text(body, "vip_subnet_id");

    let mut lbs = lock(&client.load_balancers);
    let duplicate = lbs.values().any(|lb| {
        !lb.provisioning_status.is_deleting()
            && lb.name == name
            && lb.project_id == project_id
            && lb.vip_address == vip_address
    });
    if duplicate {
        return Err(conflict(&format!("load balancer {}", name)));
    }

    let provider = lock(&client.provider_override)
        .clone()
        .or_else(|| opt_text(body, "provider"))
        .unwrap_or_else(|| "amphora".to_string());
    let now = chrono::Utc::now().to_rfc3339();
    let lb = LoadBalancer {
        id: new_id(),
        name,
        project_id,
        description: text(body, "description"),
        vip_address,
        vip_subnet_id,
        vip_port_id: Some(new_id()),
        provider: Some(provider),
        provisioning_status: *lock(&client.created_status),
        operating_status: Some("ONLINE".to_string()),
        listeners: vec![],
        pools: vec![],
        tags: tags(body),
        created_at: Some(now.clone()),
        updated_at: Some(now),
    };
    lbs.insert(lb.id.clone(), lb.clone());
    Ok(lb)
}

fn create_listener(client: &MockLoadBalancerClient, body: &Value) -> Result<Listener, OpenStackError> {
    let lb_id = text(body, "loadbalancer_id");
    let protocol = text(body, "protocol");
    let port = body
        .get("protocol_port")
        .and_then(Value::as_u64)
        .and_then(|p| u16::try_from(p).ok())
        .ok_or_else(|| OpenStackError::BadRequest("invalid protocol_port".to_string()))?;

    let mut lbs = lock(&client.load_balancers);
    let lb = lbs.get_mut(&lb_id).ok_or_else(|| not_found("load balancer", &lb_id))?;

    let mut listeners = lock(&client.listeners);
    let duplicate = listeners.values().any(|l| {
        l.loadbalancers.iter().any(|r| r.id == lb_id) && l.protocol == protocol && l.protocol_port == port
    });
    if duplicate {
        return Err(conflict(&format!("listener {}:{}", protocol, port)));
    }

    let listener = Listener {
        id: new_id(),
        name: text(body, "name"),
        project_id: text(body, "project_id"),
        description: text(body, "description"),
        protocol,
        protocol_port: port,
        loadbalancers: vec![IdRef { id: lb_id }],
        default_pool_id: None,
        provisioning_status: ProvisioningStatus::Active,
        admin_state_up: true,
        allowed_cidrs: None,
        timeout_client_data: body.get("timeout_client_data").and_then(Value::as_u64).and_then(|v| u32::try_from(v).ok()),
        timeout_member_data: body.get("timeout_member_data").and_then(Value::as_u64).and_then(|v| u32::try_from(v).ok()),
        tags: tags(body),
    };
    lb.listeners.push(IdRef { id: listener.id.clone() });
    listeners.insert(listener.id.clone(), listener.clone());
    Ok(listener)
}

fn create_pool(client: &MockLoadBalancerClient, body: &Value) -> Result<Pool, OpenStackError> {
    let lb_id = text(body, "loadbalancer_id");
    let listener_id = opt_text(body, "listener_id");
    let name = text(body, "name");

    let mut lbs = lock(&client.load_balancers);
    let lb = lbs.get_mut(&lb_id).ok_or_else(|| not_found("load balancer", &lb_id))?;
    let mut listeners = lock(&client.listeners);
    if let Some(listener_id) = &listener_id {
        if !listeners.contains_key(listener_id) {
            return Err(not_found("listener", listener_id));
        }
    }

    let mut pools = lock(&client.pools);
    let duplicate = pools.values().any(|p| match &listener_id {
        Some(listener_id) => p.listeners.iter().any(|r| &r.id == listener_id),
        None => p.name == name && p.loadbalancers.iter().any(|r| r.id == lb_id),
    });
    if duplicate {
        return Err(conflict(&format!("pool {}", name)));
    }

    let pool = Pool {
        id: new_id(),
        name,
        project_id: text(body, "project_id"),
        description: text(body, "description"),
        protocol: text(body, "protocol"),
        lb_algorithm: text(body, "lb_algorithm"),
        listeners: listener_id.iter().map(|id| IdRef { id: id.clone() }).collect(),
        loadbalancers: vec![IdRef { id: lb_id }],
        provisioning_status: ProvisioningStatus::Active,
        tags: tags(body),
    };
    if let Some(listener) = listener_id.as_ref().and_then(|id| listeners.get_mut(id)) {
        listener.default_pool_id = Some(pool.id.clone());
    }
    lb.pools.push(IdRef { id: pool.id.clone() });
    pools.insert(pool.id.clone(), pool.clone());
    Ok(pool)
}

fn create_member(client: &MockLoadBalancerClient, pool_id: &str, body: &Value) -> Result<Member, OpenStackError> {
    if !lock(&client.pools).contains_key(pool_id) {
        return Err(not_found("pool", pool_id));
    }
    let address = text(body, "address");
    let port = body
        .get("protocol_port")
        .and_then(Value::as_u64)
        .and_then(|p| u16::try_from(p).ok())
        .ok_or_else(|| OpenStackError::BadRequest("invalid protocol_port".to_string()))?;

    let mut members = lock(&client.members);
    let pool_members = members.entry(pool_id.to_string()).or_default();
    if pool_members.values().any(|m| m.address == address && m.protocol_port == port) {
        return Err(conflict(&format!("member {}:{}", address, port)));
    }

    let member = Member {
        id: new_id(),
        name: text(body, "name"),
        project_id: text(body, "project_id"),
        address,
        protocol_port: port,
        subnet_id: opt_text(body, "subnet_id"),
        provisioning_status: ProvisioningStatus::Active,
        tags: tags(body),
    };
    pool_members.insert(member.id.clone(), member.clone());
    Ok(member)
}

fn create_l7_policy(client: &MockLoadBalancerClient, body: &Value) -> Result<L7Policy, OpenStackError> {
    let listener_id = text(body, "listener_id");
    if !lock(&client.listeners).contains_key(&listener_id) {
        return Err(not_found("listener", &listener_id));
    }
    let name = text(body, "name");
    let redirect_pool_id = opt_text(body, "redirect_pool_id");

    let mut policies = lock(&client.l7_policies);
    let duplicate = policies.values().any(|p| {
        p.listener_id == listener_id && p.name == name && p.redirect_pool_id == redirect_pool_id
    });
    if duplicate {
        return Err(conflict(&format!("l7 policy {}", name)));
    }

    let policy = L7Policy {
        id: new_id(),
        name,
        project_id: text(body, "project_id"),
        description: text(body, "description"),
        listener_id,
        action: text(body, "action"),
        redirect_pool_id,
        provisioning_status: ProvisioningStatus::Active,
        tags: tags(body),
    };
    policies.insert(policy.id.clone(), policy.clone());
    Ok(policy)
}

fn create_l7_rule(client: &MockLoadBalancerClient, policy_id: &str, body: &Value) -> Result<L7Rule, OpenStackError> {
    if !lock(&client.l7_policies).contains_key(policy_id) {
        return Err(not_found("l7 policy", policy_id));
    }
    let rule_type = text(body, "type");
    let compare_type = text(body, "compare_type");
    let value = text(body, "value");

    let mut rules = lock(&client.l7_rules);
    let policy_rules = rules.entry(policy_id.to_string()).or_default();
    let duplicate = policy_rules
        .values()
        .any(|r| r.rule_type == rule_type && r.compare_type == compare_type && r.value == value);
    if duplicate {
        return Err(conflict(&format!("l7 rule {}", value)));
    }

    let rule = L7Rule {
        id: new_id(),
        rule_type,
        compare_type,
        value,
        provisioning_status: ProvisioningStatus::Active,
        tags: tags(body),
    };
    policy_rules.insert(rule.id.clone(), rule.clone());
    Ok(rule)
}

pub async fn load_balancers(
    client: &MockLoadBalancerClient,
    filters: &[(&str, &str)],
) -> Result<Vec<LoadBalancer>, OpenStackError> {
    client.book.record("load_balancers")?;
    Ok(lock(&client.load_balancers)
        .values()
        .filter(|lb| matches_filters(lb, filters))
        .cloned()
        .collect())
}

pub async fn get_load_balancer(client: &MockLoadBalancerClient, id: &str) -> Result<LoadBalancer, OpenStackError> {
    client.book.record("get_load_balancer")?;
    let mut lbs = lock(&client.load_balancers);
    let lb = lbs.get_mut(id).ok_or_else(|| not_found("load balancer", id))?;

    let mut scripts = lock(&client.status_scripts);
    if let Some(script) = scripts.get_mut(id) {
        if let Some(status) = script.pop_front() {
            lb.provisioning_status = status;
        }
    }
    Ok(lb.clone())
}

pub async fn delete_load_balancer(
    client: &MockLoadBalancerClient,
    id: &str,
    cascade: bool,
) -> Result<(), OpenStackError> {
    client.book.record("delete_load_balancer")?;
    {
        let mut ignored = lock(&client.ignored_deletes);
        if *ignored > 0 {
            *ignored -= 1;
            return Ok(());
        }
    }

    let mut lbs = lock(&client.load_balancers);
    let lb = lbs.get(id).ok_or_else(|| not_found("load balancer", id))?;
    if !cascade && (!lb.listeners.is_empty() || !lb.pools.is_empty()) {
        return Err(OpenStackError::BadRequest(format!(
            "load balancer {} still has children",
            id
        )));
    }
    lbs.remove(id);
    lock(&client.status_scripts).remove(id);

    let mut listeners = lock(&client.listeners);
    let listener_ids: Vec<String> = listeners
        .values()
        .filter(|l| l.loadbalancers.iter().any(|r| r.id == id))
        .map(|l| l.id.clone())
        .collect();
    for listener_id in &listener_ids {
        listeners.remove(listener_id);
    }

    let mut pools = lock(&client.pools);
    let pool_ids: Vec<String> = pools
        .values()
        .filter(|p| p.loadbalancers.iter().any(|r| r.id == id))
        .map(|p| p.id.clone())
        .collect();
    let mut members = lock(&client.members);
    for pool_id in &pool_ids {
        pools.remove(pool_id);
        members.remove(pool_id);
    }

    let mut policies = lock(&client.l7_policies);
    let mut rules = lock(&client.l7_rules);
    policies.retain(|policy_id, policy| {
        let keep = !listener_ids.contains(&policy.listener_id);
        if !keep {
            rules.remove(policy_id);
        }
        keep
    });
    Ok(())
}

pub async fn listeners(
    client: &MockLoadBalancerClient,
    filters: &[(&str, &str)],
) -> Result<Vec<Listener>, OpenStackError> {
    client.book.record("listeners")?;
    Ok(lock(&client.listeners)
        .values()
        .filter(|l| matches_filters(l, filters))
        .cloned()
        .collect())
}

pub async fn update_listener(
    client: &MockLoadBalancerClient,
    id: &str,
    body: Value,
) -> Result<Listener, OpenStackError> {
    client.book.record("update_listener")?;
    let mut listeners = lock(&client.listeners);
    let listener = listeners.get_mut(id).ok_or_else(|| not_found("listener", id))?;

    if let Some(cidrs) = body.get("allowed_cidrs") {
        listener.allowed_cidrs = serde_json::from_value(cidrs.clone())?;
    }
    if let Some(up) = body.get("admin_state_up").and_then(Value::as_bool) {
        listener.admin_state_up = up;
    }
    if let Some(name) = body.get("name").and_then(Value::as_str) {
        listener.name = name.to_string();
    }
    Ok(listener.clone())
}

pub async fn delete_listener(client: &MockLoadBalancerClient, id: &str) -> Result<(), OpenStackError> {
    client.book.record("delete_listener")?;
    let listener = lock(&client.listeners)
        .remove(id)
        .ok_or_else(|| not_found("listener", id))?;
    for lb_ref in &listener.loadbalancers {
        if let Some(lb) = lock(&client.load_balancers).get_mut(&lb_ref.id) {
            lb.listeners.retain(|r| r.id != id);
        }
    }
    Ok(())
}

pub async fn pools(client: &MockLoadBalancerClient, filters: &[(&str, &str)]) -> Result<Vec<Pool>, OpenStackError> {
    client.book.record("pools")?;
    Ok(lock(&client.pools)
        .values()
        .filter(|p| matches_filters(p, filters))
        .cloned()
        .collect())
}

pub async fn delete_pool(client: &MockLoadBalancerClient, id: &str) -> Result<(), OpenStackError> {
    client.book.record("delete_pool")?;
    let pool = lock(&client.pools).remove(id).ok_or_else(|| not_found("pool", id))?;
    lock(&client.members).remove(id);
    for lb_ref in &pool.loadbalancers {
        if let Some(lb) = lock(&client.load_balancers).get_mut(&lb_ref.id) {
            lb.pools.retain(|r| r.id != id);
        }
    }
    for listener in lock(&client.listeners).values_mut() {
        if listener.default_pool_id.as_deref() == Some(id) {
            listener.default_pool_id = None;
        }
    }
    Ok(())
}

pub async fn members(
    client: &MockLoadBalancerClient,
    pool_id: &str,
    filters: &[(&str, &str)],
) -> Result<Vec<Member>, OpenStackError> {
    client.book.record("members")?;
    if !lock(&client.pools).contains_key(pool_id) {
        return Err(not_found("pool", pool_id));
    }
    Ok(lock(&client.members)
        .get(pool_id)
        .map(|members| {
            members
                .values()
                .filter(|m| matches_filters(m, filters))
                .cloned()
                .collect()
        })
        .unwrap_or_default())
}

pub async fn update_member(
    client: &MockLoadBalancerClient,
    pool_id: &str,
    id: &str,
    name: &str,
) -> Result<Member, OpenStackError> {
    client.book.record("update_member")?;
    let mut members = lock(&client.members);
    let member = members
        .get_mut(pool_id)
        .and_then(|m| m.get_mut(id))
        .ok_or_else(|| not_found("member", id))?;
    member.name = name.to_string();
    Ok(member.clone())
}

pub async fn delete_member(client: &MockLoadBalancerClient, pool_id: &str, id: &str) -> Result<(), OpenStackError> {
    client.book.record("delete_member")?;
    lock(&client.members)
        .get_mut(pool_id)
        .and_then(|m| m.remove(id))
        .map(|_| ())
        .ok_or_else(|| not_found("member", id))
}

pub async fn l7_policies(
    client: &MockLoadBalancerClient,
    filters: &[(&str, &str)],
) -> Result<Vec<L7Policy>, OpenStackError> {
    client.book.record("l7_policies")?;
    Ok(lock(&client.l7_policies)
        .values()
        .filter(|p| matches_filters(p, filters))
        .cloned()
        .collect())
}

pub async fn delete_l7_policy(client: &MockLoadBalancerClient, id: &str) -> Result<(), OpenStackError> {
    client.book.record("delete_l7_policy")?;
    lock(&client.l7_policies)
        .remove(id)
        .ok_or_else(|| not_found("l7 policy", id))?;
    lock(&client.l7_rules).remove(id);
    Ok(())
}

pub async fn l7_rules(
    client: &MockLoadBalancerClient,
    l7policy_id: &str,
    filters: &[(&str, &str)],
) -> Result<Vec<L7Rule>, OpenStackError> {
    client.book.record("l7_rules")?;
    if !lock(&client.l7_policies).contains_key(l7policy_id) {
        return Err(not_found("l7 policy", l7policy_id));
    }
    Ok(lock(&client.l7_rules)
        .get(l7policy_id)
        .map(|rules| {
            rules
                .values()
                .filter(|r| matches_filters(r, filters))
                .cloned()
                .collect()
        })
        .unwrap_or_default())
}

pub async fn update_l7_rule(
    client: &MockLoadBalancerClient,
    l7policy_id: &str,
    id: &str,
    value: &str,
) -> Result<L7Rule, OpenStackError> {
    client.book.record("update_l7_rule")?;
    let mut rules = lock(&client.l7_rules);
    let rule = rules
        .get_mut(l7policy_id)
        .and_then(|r| r.get_mut(id))
        .ok_or_else(|| not_found("l7 rule", id))?;
    rule.value = value.to_string();
    Ok(rule.clone())
}

pub async fn delete_l7_rule(client: &MockLoadBalancerClient, l7policy_id: &str, id: &str) -> Result<(), OpenStackError> {
    client.book.record("delete_l7_rule")?;
    lock(&client.l7_rules)
        .get_mut(l7policy_id)
        .and_then(|r| r.remove(id))
        .map(|_| ())
        .ok_or_else(|| not_found("l7 rule", id))
}
