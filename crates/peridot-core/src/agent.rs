//! Agents: separately running services registered to execute jobs.

use serde::{Deserialize, Serialize};

use crate::AgentId;

/// What an agent is able to read and write.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentAbilities {
    /// Can read on-disk content (code, docs, anything) and act on it.
    #[serde(rename = "is_codereader")]
    pub code_reader: bool,
    /// Can read previously created SPDX documents.
    #[serde(rename = "is_spdxreader")]
    pub spdx_reader: bool,
    /// Can write on-disk content.
    #[serde(rename = "is_codewriter")]
    pub code_writer: bool,
    /// Can generate and write an SPDX document.
    #[serde(rename = "is_spdxwriter")]
    pub spdx_writer: bool,
}

/// A registered agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Agent {
    pub id: AgentId,
    /// Short name, unique among registered agents.
    pub name: String,
    /// Whether the agent is believed to be up and able to take jobs.
    pub is_active: bool,
    pub address: String,
    pub port: u16,
    #[serde(flatten)]
    pub abilities: AgentAbilities,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_agent_json_is_flat() {
        let agent = Agent {
            id: AgentId::new(1),
            name: "scancode".to_string(),
            is_active: true,
            address: "localhost".to_string(),
            port: 9001,
            abilities: AgentAbilities {
                code_reader: true,
                spdx_writer: true,
                ..Default::default()
            },
        };

        let js = serde_json::to_value(&agent).unwrap();
        assert_eq!(js["is_codereader"], true);
        assert_eq!(js["is_spdxreader"], false);
        assert_eq!(js["is_spdxwriter"], true);
        assert!(js.get("abilities").is_none());

        let back: Agent = serde_json::from_value(js).unwrap();
        assert_eq!(back, agent);
    }
}
