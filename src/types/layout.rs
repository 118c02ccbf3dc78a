use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::net::IpAddr;

use crate::errors::{ErrorReason, OrchestrationError};
use crate::types::ParameterMap;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientInstance {
    pub name: String,
    pub ip_address: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default, skip_serializing_if = "ParameterMap::is_empty")]
    pub extensions: ParameterMap,
}

impl ClientInstance {
    pub fn new(name: impl Into<String>, ip_address: impl Into<String>, role: Option<&str>) -> Self {
        Self {
            name: name.into(),
            ip_address: ip_address.into(),
            role: role.map(str::to_string),
            extensions: ParameterMap::new(),
        }
    }

    pub fn ip(&self) -> Option<IpAddr> {
        self.ip_address.trim().parse().ok()
    }

    pub fn has_role(&self, role: &str) -> bool {
        self.role
            .as_deref()
            .map(|r| r.eq_ignore_ascii_case(role))
            .unwrap_or(false)
    }
}

/// Agent identities, roles and addresses participating in one experiment.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnvironmentLayout {
    #[serde(default)]
    pub clients: Vec<ClientInstance>,
}

impl EnvironmentLayout {
    pub fn new(clients: Vec<ClientInstance>) -> Self {
        Self { clients }
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let layout: EnvironmentLayout = serde_json::from_str(json).map_err(|e| {
            OrchestrationError::environment_setup(
                format!("Invalid environment layout. {}", e),
                ErrorReason::LayoutInvalid,
            )
        })?;
        layout.validate()?;
        Ok(layout)
    }

    pub fn validate(&self) -> Result<()> {
        if self.clients.is_empty() {
            return Err(OrchestrationError::environment_setup(
                "The environment layout does not define any client instances.",
                ErrorReason::EnvironmentLayoutClientInstancesNotFound,
            )
            .into());
        }

        let mut names = HashSet::new();
        for client in &self.clients {
            if !names.insert(client.name.to_lowercase()) {
                return Err(OrchestrationError::environment_setup(
                    format!(
                        "Duplicate client instance '{}' in environment layout.",
                        client.name
                    ),
                    ErrorReason::EnvironmentLayoutClientInstanceDuplicates,
                )
                .into());
            }

            if client.ip().is_none() {
                return Err(OrchestrationError::environment_setup(
                    format!(
                        "Client instance '{}' has an invalid IP address '{}'.",
                        client.name, client.ip_address
                    ),
                    ErrorReason::LayoutInvalid,
                )
                .into());
            }
        }

        Ok(())
    }

    pub fn client_count(&self) -> usize {
        self.clients.len()
    }

    pub fn instance_for(&self, agent_id: &str) -> Option<&ClientInstance> {
        self.clients
            .iter()
            .find(|c| c.name.eq_ignore_ascii_case(agent_id))
    }

    pub fn instances_in_role<'a>(&'a self, role: &'a str) -> impl Iterator<Item = &'a ClientInstance> {
        self.clients.iter().filter(move |c| c.has_role(role))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layout() -> EnvironmentLayout {
        EnvironmentLayout::new(vec![
            ClientInstance::new("agent-a", "10.0.0.1", Some("Client")),
            ClientInstance::new("agent-b", "10.0.0.2", Some("Server")),
        ])
    }

    #[test]
    fn test_layout_lookup() {
        let layout = layout();
        assert!(layout.validate().is_ok());
        assert_eq!(layout.instance_for("AGENT-B").unwrap().ip_address, "10.0.0.2");
        assert_eq!(layout.instances_in_role("server").count(), 1);
    }

    #[test]
    fn test_duplicate_names_rejected() {
        let layout = EnvironmentLayout::new(vec![
            ClientInstance::new("node", "10.0.0.1", None),
            ClientInstance::new("Node", "10.0.0.2", None),
        ]);

        let err = layout.validate().unwrap_err();
        let err = err.downcast_ref::<OrchestrationError>().unwrap();
        assert_eq!(
            err.reason(),
            Some(ErrorReason::EnvironmentLayoutClientInstanceDuplicates)
        );
    }

    #[test]
    fn test_invalid_ip_rejected() {
        let layout = EnvironmentLayout::new(vec![ClientInstance::new("node", "10.0.0.300", None)]);
        assert!(layout.validate().is_err());
    }

    #[test]
    fn test_value_equality() {
        let a = ClientInstance::new("node", "::1", Some("Server"));
        let b = ClientInstance::new("node", "::1", Some("Server"));
        let c = ClientInstance::new("node", "::1", Some("Client"));
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_layout_json() {
        let layout = EnvironmentLayout::from_json(
            r#"{"clients":[{"name":"vm1","ipAddress":"192.168.1.4","role":"Client"}]}"#,
        )
        .unwrap();
        assert!(layout.clients[0].has_role("client"));
    }
}
