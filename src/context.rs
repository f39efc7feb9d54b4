//! The anonymous caller-identity bundle passed to providers for optional row-level
//! filtering. The core never inspects its contents; providers that don't need it can ignore
//! it entirely.

use std::collections::BTreeMap;

use crate::value::ScalarValue;

/// A request-scoped identity record. All fields are optional in the sense that a provider is
/// free to ignore any or all of them.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RequestContext {
    pub user_id: Option<String>,
    pub tenant_id: Option<String>,
    pub permissions: Vec<String>,
    pub groups: Vec<String>,
    pub extra: BTreeMap<String, ScalarValue>,
}

impl RequestContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn with_tenant(mut self, tenant_id: impl Into<String>) -> Self {
        self.tenant_id = Some(tenant_id.into());
        self
    }

    pub fn has_permission(&self, permission: &str) -> bool {
        self.permissions.iter().any(|p| p == permission)
    }
}
