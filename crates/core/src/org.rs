//! Organization context — who is acting, for which company.
//!
//! Passed explicitly into the compose loop and the executor rather than
//! re-derived from ambient session state per call.

use serde::{Deserialize, Serialize};

/// The resolved organization/user identity for one request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrgContext {
    /// The organization owning the contacts and drafts
    pub org_id: String,

    /// The acting user
    pub user_id: String,

    /// Display name — outgoing messages are voiced as this person
    pub user_name: String,

    /// Company name used in prompts and signatures
    pub company_name: String,
}

impl OrgContext {
    pub fn new(
        org_id: impl Into<String>,
        user_id: impl Into<String>,
        user_name: impl Into<String>,
        company_name: impl Into<String>,
    ) -> Self {
        Self {
            org_id: org_id.into(),
            user_id: user_id.into(),
            user_name: user_name.into(),
            company_name: company_name.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn org_context_construction() {
        let org = OrgContext::new("org-1", "user-1", "Dana Reyes", "Summit Roofing");
        assert_eq!(org.org_id, "org-1");
        assert_eq!(org.company_name, "Summit Roofing");
    }
}
