//! Neutron operations for MockNetworkClient
//!
//! Handles security groups, security group rules, ports, subnets and subnet pools

use super::helpers::{conflict, lock, matches_filters, new_id, not_found};
use super::MockNetworkClient;
use crate::error::OpenStackError;
use crate::models::*;

pub async fn list_security_groups(
    client: &MockNetworkClient,
    filters: &[(&str, &str)],
) -> Result<Vec<SecurityGroup>, OpenStackError> {
    client.book.record("list_security_groups")?;
    let ids: Vec<String> = lock(&client.security_groups)
        .values()
        .filter(|sg| matches_filters(sg, filters))
        .map(|sg| sg.id.clone())
        .collect();
    Ok(ids.iter().filter_map(|id| client.security_group(id)).collect())
}

pub async fn create_security_group(
    client: &MockNetworkClient,
    request: &CreateSecurityGroup,
) -> Result<SecurityGroup, OpenStackError> {
    client.book.record("create_security_group")?;
    let group = SecurityGroup {
        id: new_id(),
        name: request.name.clone(),
        project_id: request.project_id.clone(),
        description: request.description.clone().unwrap_or_default(),
        security_group_rules: vec![],
        tags: vec![],
    };
    lock(&client.security_groups).insert(group.id.clone(), group.clone());
    Ok(group)
}

pub async fn delete_security_group(client: &MockNetworkClient, id: &str) -> Result<(), OpenStackError> {
    client.book.record("delete_security_group")?;
    lock(&client.security_groups)
        .remove(id)
        .ok_or_else(|| not_found("security group", id))?;
    lock(&client.rules).retain(|_, rule| rule.security_group_id != id);
    Ok(())
}

pub async fn set_security_group_tags(
    client: &MockNetworkClient,
    id: &str,
    tags: &[String],
) -> Result<(), OpenStackError> {
    client.book.record("set_security_group_tags")?;
    let mut groups = lock(&client.security_groups);
    let group = groups.get_mut(id).ok_or_else(|| not_found("security group", id))?;
    group.tags = tags.to_vec();
    Ok(())
}

pub async fn list_security_group_rules(
    client: &MockNetworkClient,
    filters: &[(&str, &str)],
) -> Result<Vec<SecurityGroupRule>, OpenStackError> {
    client.book.record("list_security_group_rules")?;
    let mut rules: Vec<_> = lock(&client.rules)
        .values()
        .filter(|r| matches_filters(r, filters))
        .cloned()
        .collect();
    rules.sort_by(|a, b| a.id.cmp(&b.id));
    Ok(rules)
}

pub async fn create_security_group_rule(
    client: &MockNetworkClient,
    request: &CreateSecurityGroupRule,
) -> Result<SecurityGroupRule, OpenStackError> {
    client.book.record("create_security_group_rule")?;
    if !lock(&client.security_groups).contains_key(&request.security_group_id) {
        return Err(not_found("security group", &request.security_group_id));
    }

    let rule = SecurityGroupRule {
        id: new_id(),
        security_group_id: request.security_group_id.clone(),
        direction: request.direction.clone(),
        ethertype: request.ethertype.clone().unwrap_or_else(|| "IPv4".to_string()),
        protocol: request.protocol.as_ref().map(|p| p.to_lowercase()),
        port_range_min: request.port_range_min,
        port_range_max: request.port_range_max,
        remote_ip_prefix: request.remote_ip_prefix.clone(),
        remote_group_id: request.remote_group_id.clone(),
        description: request.description.clone().unwrap_or_default(),
        project_id: String::new(),
    };

    let mut rules = lock(&client.rules);
    let duplicate = rules.values().any(|r| {
        r.security_group_id == rule.security_group_id
            && r.direction == rule.direction
            && r.ethertype == rule.ethertype
            && r.protocol == rule.protocol
            && r.port_range_min == rule.port_range_min
            && r.port_range_max == rule.port_range_max
            && r.remote_ip_prefix == rule.remote_ip_prefix
            && r.remote_group_id == rule.remote_group_id
    });
    if duplicate {
        return Err(conflict("security group rule"));
    }
    rules.insert(rule.id.clone(), rule.clone());
    Ok(rule)
}

pub async fn delete_security_group_rule(client: &MockNetworkClient, id: &str) -> Result<(), OpenStackError> {
    client.book.record("delete_security_group_rule")?;
    lock(&client.rules)
        .remove(id)
        .map(|_| ())
        .ok_or_else(|| not_found("security group rule", id))
}

pub async fn list_ports(client: &MockNetworkClient, filters: &[(&str, &str)]) -> Result<Vec<Port>, OpenStackError> {
    client.book.record("list_ports")?;
    Ok(lock(&client.ports)
        .values()
        .filter(|p| matches_filters(p, filters))
        .cloned()
        .collect())
}

pub async fn get_port(client: &MockNetworkClient, id: &str) -> Result<Port, OpenStackError> {
    client.book.record("get_port")?;
    lock(&client.ports)
        .get(id)
        .cloned()
        .ok_or_else(|| not_found("port", id))
}

pub async fn update_port_security_groups(
    client: &MockNetworkClient,
    id: &str,
    security_groups: &[String],
) -> Result<Port, OpenStackError> {
    client.book.record("update_port_security_groups")?;
    let mut ports = lock(&client.ports);
    let port = ports.get_mut(id).ok_or_else(|| not_found("port", id))?;
    port.security_groups = security_groups.to_vec();
    Ok(port.clone())
}

pub async fn get_subnet(client: &MockNetworkClient, id: &str) -> Result<Subnet, OpenStackError> {
    client.book.record("get_subnet")?;
    lock(&client.subnets)
        .get(id)
        .cloned()
        .ok_or_else(|| not_found("subnet", id))
}

pub async fn get_subnet_pool(client: &MockNetworkClient, id: &str) -> Result<SubnetPool, OpenStackError> {
    client.book.record("get_subnet_pool")?;
    lock(&client.subnet_pools)
        .get(id)
        .cloned()
        .ok_or_else(|| not_found("subnet pool", id))
}
