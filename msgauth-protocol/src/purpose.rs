//! The closed set of mutation purposes a challenge can be bound to (§6).

use serde::{Deserialize, Serialize};

/// Every operation that can be authenticated via the challenge-response
/// protocol. A challenge issued for one purpose can never be proved
/// against another (§8 "cross-purpose refusal").
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Purpose {
    Send,
    Receive,
    Ack,
    RegisterUser,
    ManageGroup,
    SendGroup,
    #[serde(rename = "allowList.add")]
    AllowListAdd,
    #[serde(rename = "allowList.remove")]
    AllowListRemove,
    #[serde(rename = "allowList.clear")]
    AllowListClear,
    #[serde(rename = "denyList.add")]
    DenyListAdd,
    #[serde(rename = "denyList.remove")]
    DenyListRemove,
    #[serde(rename = "denyList.clear")]
    DenyListClear,
    #[serde(rename = "permissions.admin")]
    PermissionsAdmin,
}

impl Purpose {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Send => "send",
            Self::Receive => "receive",
            Self::Ack => "ack",
            Self::RegisterUser => "registerUser",
            Self::ManageGroup => "manageGroup",
            Self::SendGroup => "sendGroup",
            Self::AllowListAdd => "allowList.add",
            Self::AllowListRemove => "allowList.remove",
            Self::AllowListClear => "allowList.clear",
            Self::DenyListAdd => "denyList.add",
            Self::DenyListRemove => "denyList.remove",
            Self::DenyListClear => "denyList.clear",
            Self::PermissionsAdmin => "permissions.admin",
        }
    }
}

impl std::fmt::Display for Purpose {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_to_wire_tag() {
        assert_eq!(serde_json::to_string(&Purpose::AllowListAdd).unwrap(), "\"allowList.add\"");
        assert_eq!(serde_json::to_string(&Purpose::Send).unwrap(), "\"send\"");
    }

    #[test]
    fn display_matches_wire_tag() {
        assert_eq!(Purpose::DenyListClear.to_string(), "denyList.clear");
    }
}
