//! Groups

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use core_kernel::{Currency, GroupId, UserId};

use crate::error::ValidationError;

/// A set of people sharing expenses in one settlement currency
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Group {
    pub id: GroupId,
    pub name: String,
    pub members: Vec<UserId>,
    /// Currency balances in this group are computed in
    pub currency: Currency,
    pub created_by: UserId,
    pub created_at: DateTime<Utc>,
}

impl Group {
    pub fn is_member(&self, user: &UserId) -> bool {
        self.members.contains(user)
    }
}

/// Input for creating a group
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupDraft {
    pub name: String,
    pub members: Vec<UserId>,
    pub currency: Currency,
    pub created_by: UserId,
}

impl GroupDraft {
    /// Starts a draft whose only member is the creator
    pub fn new(name: impl Into<String>, currency: Currency, created_by: impl Into<UserId>) -> Self {
        let created_by = created_by.into();
        Self {
            name: name.into(),
            members: vec![created_by.clone()],
            currency,
            created_by,
        }
    }

    /// Adds a member, ignoring duplicates
    pub fn member(mut self, user: impl Into<UserId>) -> Self {
        let user = user.into();
        if !self.members.contains(&user) {
            self.members.push(user);
        }
        self
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.name.trim().is_empty() {
            return Err(ValidationError::EmptyName);
        }
        if self.members.is_empty() {
            return Err(ValidationError::EmptyMembers);
        }
        Ok(())
    }
}
