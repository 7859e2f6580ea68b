//! Response payloads used at startup and for owner checks.

use serde::{Deserialize, Serialize};

use shardline_core::UserInfo;
use shardline_core::entity::snowflake;

/// `GET /gateway/bot`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GatewayBot {
    pub url: String,
    #[serde(default)]
    pub shards: u32,
}

/// `GET /oauth2/applications/@me`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApplicationInfo {
    #[serde(with = "snowflake")]
    pub id: u64,
    pub owner: UserInfo,
    #[serde(default)]
    pub team: Option<TeamInfo>,
}

impl ApplicationInfo {
    /// The owner followed by every team member.
    pub fn owner_ids(&self) -> Vec<u64> {
        let mut ids = vec![self.owner.id];
        if let Some(team) = &self.team {
            ids.extend(team.members.iter().map(|m| m.user.id));
        }
        ids
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TeamInfo {
    #[serde(default)]
    pub members: Vec<TeamMember>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TeamMember {
    pub user: UserInfo,
}
