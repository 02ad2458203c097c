//! Access-control filter: deny-list, allow-list, and permission checks on
//! the send path (§4.8). Deny strictly dominates allow.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use msgauth_lib::errors::AuthorizationReason;
use msgauth_lib::{Aid, AuthError};
use tokio::sync::RwLock;

/// A permission an AID may hold, checked before a send when a role system
/// is configured (§3.1 "Role/permission records").
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PermissionTag {
    CanMessageDirect,
    CanMessageGroups,
}

impl PermissionTag {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CanMessageDirect => "can.message.direct",
            Self::CanMessageGroups => "can.message.groups",
        }
    }
}

/// Storage seam for allow/deny lists and permission grants. The core
/// never assumes a particular backing database — this trait is the
/// abstract transactional document store.
#[async_trait]
pub trait AccessControlStore: Send + Sync {
    async fn add_to_allow_list(&self, owner: &Aid, target: Aid);
    async fn remove_from_allow_list(&self, owner: &Aid, target: &Aid);
    async fn clear_allow_list(&self, owner: &Aid);
    async fn allow_list_contains(&self, owner: &Aid, target: &Aid) -> bool;
    async fn allow_list_is_active(&self, owner: &Aid) -> bool;

    async fn add_to_deny_list(&self, owner: &Aid, target: Aid);
    async fn remove_from_deny_list(&self, owner: &Aid, target: &Aid);
    async fn clear_deny_list(&self, owner: &Aid);
    async fn deny_list_contains(&self, owner: &Aid, target: &Aid) -> bool;

    async fn grant_permission(&self, aid: &Aid, permission: PermissionTag);
    async fn has_permission(&self, aid: &Aid, permission: PermissionTag) -> bool;
}

/// In-memory `AccessControlStore`.
#[derive(Default)]
pub struct InMemoryAccessControlStore {
    allow_lists: RwLock<HashMap<Aid, HashSet<Aid>>>,
    deny_lists: RwLock<HashMap<Aid, HashSet<Aid>>>,
    permissions: RwLock<HashMap<Aid, HashSet<PermissionTag>>>,
}

impl InMemoryAccessControlStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AccessControlStore for InMemoryAccessControlStore {
    async fn add_to_allow_list(&self, owner: &Aid, target: Aid) {
        self.allow_lists.write().await.entry(owner.clone()).or_default().insert(target);
    }

    async fn remove_from_allow_list(&self, owner: &Aid, target: &Aid) {
        if let Some(set) = self.allow_lists.write().await.get_mut(owner) {
            set.remove(target);
        }
    }

    async fn clear_allow_list(&self, owner: &Aid) {
        self.allow_lists.write().await.remove(owner);
    }

    async fn allow_list_contains(&self, owner: &Aid, target: &Aid) -> bool {
        self.allow_lists
            .read()
            .await
            .get(owner)
            .is_some_and(|set| set.contains(target))
    }

    async fn allow_list_is_active(&self, owner: &Aid) -> bool {
        self.allow_lists
            .read()
            .await
            .get(owner)
            .is_some_and(|set| !set.is_empty())
    }

    async fn add_to_deny_list(&self, owner: &Aid, target: Aid) {
        self.deny_lists.write().await.entry(owner.clone()).or_default().insert(target);
    }

    async fn remove_from_deny_list(&self, owner: &Aid, target: &Aid) {
        if let Some(set) = self.deny_lists.write().await.get_mut(owner) {
            set.remove(target);
        }
    }

    async fn clear_deny_list(&self, owner: &Aid) {
        self.deny_lists.write().await.remove(owner);
    }

    async fn deny_list_contains(&self, owner: &Aid, target: &Aid) -> bool {
        self.deny_lists
            .read()
            .await
            .get(owner)
            .is_some_and(|set| set.contains(target))
    }

    async fn grant_permission(&self, aid: &Aid, permission: PermissionTag) {
        self.permissions.write().await.entry(aid.clone()).or_default().insert(permission);
    }

    async fn has_permission(&self, aid: &Aid, permission: PermissionTag) -> bool {
        self.permissions
            .read()
            .await
            .get(aid)
            .is_some_and(|set| set.contains(&permission))
    }
}

/// Run the three-step access check of §4.8 for a direct send. Permission
/// enforcement only applies when `require_permission` is `Some` — a
/// deployment with no role system configured skips step 3 entirely.
pub async fn check_send_allowed(
    store: &dyn AccessControlStore,
    sender: &Aid,
    recipient: &Aid,
    require_permission: Option<PermissionTag>,
) -> Result<(), AuthError> {
    if store.deny_list_contains(recipient, sender).await {
        return Err(AuthError::authorization(AuthorizationReason::Denied));
    }
    if store.allow_list_is_active(recipient).await && !store.allow_list_contains(recipient, sender).await {
        return Err(AuthError::authorization(AuthorizationReason::NotAllowed));
    }
    if let Some(permission) = require_permission {
        if !store.has_permission(sender, permission).await {
            return Err(AuthError::authorization(AuthorizationReason::Permission(
                permission.as_str().to_string(),
            )));
        }
    }
    Ok(())
}
