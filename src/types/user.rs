//! Read-only projections of standard and reserved claims

use serde::{Deserialize, Serialize};

use super::claims::ClaimMap;

fn string_claim(claims: &ClaimMap, key: &str) -> Option<String> {
    claims.get(key).and_then(|v| v.as_str()).map(str::to_string)
}

/// Authenticated user details
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    /// Subject identifier (`sub`)
    pub id: String,
    /// `email`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    /// `given_name`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub given_name: Option<String>,
    /// `family_name`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub family_name: Option<String>,
    /// `name`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// `picture`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub picture: Option<String>,
}

impl User {
    /// Project from claims; `None` without a non-empty `sub`
    #[must_use]
    pub fn from_claims(claims: &ClaimMap) -> Option<Self> {
        let id = string_claim(claims, "sub").filter(|s| !s.is_empty())?;
        Some(Self {
            id,
            email: string_claim(claims, "email"),
            given_name: string_claim(claims, "given_name"),
            family_name: string_claim(claims, "family_name"),
            name: string_claim(claims, "name"),
            picture: string_claim(claims, "picture"),
        })
    }

    /// `name`, else given and family names joined
    #[must_use]
    pub fn display_name(&self) -> Option<String> {
        if let Some(name) = &self.name {
            return Some(name.clone());
        }
        let parts: Vec<&str> = [self.given_name.as_deref(), self.family_name.as_deref()]
            .into_iter()
            .flatten()
            .collect();
        (!parts.is_empty()).then(|| parts.join(" "))
    }
}

/// Organization the session is signed in to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Organization {
    /// `org_code`
    pub code: String,
}

impl Organization {
    /// Project from the `org_code` claim
    #[must_use]
    pub fn from_claims(claims: &ClaimMap) -> Option<Self> {
        string_claim(claims, "org_code").map(|code| Self { code })
    }
}

/// All organizations the user belongs to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserOrganizations {
    /// Codes from `org_codes`
    pub org_codes: Vec<Organization>,
}

impl UserOrganizations {
    /// Project from the `org_codes` claim
    #[must_use]
    pub fn from_claims(claims: &ClaimMap) -> Option<Self> {
        let codes = claims.get("org_codes")?.string_items();
        Some(Self {
            org_codes: codes.into_iter().map(|code| Organization { code }).collect(),
        })
    }
}

/// Permissions granted in the current organization
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Permissions {
    /// Organization the permissions apply to, when `org_code` is present
    pub organization: Option<Organization>,
    /// Permission keys from `permissions`
    pub permissions: Vec<String>,
}

impl Permissions {
    /// Project from the `permissions` and `org_code` claims
    #[must_use]
    pub fn from_claims(claims: &ClaimMap) -> Option<Self> {
        let permissions = claims.get("permissions")?.string_items();
        Some(Self {
            organization: Organization::from_claims(claims),
            permissions,
        })
    }

    /// Whether `permission` was granted (exact match)
    #[must_use]
    pub fn contains(&self, permission: &str) -> bool {
        self.permissions.iter().any(|p| p == permission)
    }
}
