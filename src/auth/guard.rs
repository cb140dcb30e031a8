use tracing::warn;

use super::Principal;
use crate::database::{Condition, DocFilter};

/// Owner fields of the owner-scoped collections.
pub mod owner_field {
    pub const COURSE: &str = "instructorEmail";
    pub const ENROLLMENT: &str = "enrolled_by";
    pub const USER: &str = "email";
}

/// Proof that the caller may act on records owned by `email`.
///
/// Only [`OwnershipGuard::authorize`] creates one, so any store filter built
/// from it was authorized first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OwnerScope {
    email: String,
}

impl OwnerScope {
    pub fn email(&self) -> &str {
        &self.email
    }

    pub fn condition(&self, owner_field: &str) -> Condition {
        Condition::eq(owner_field, self.email.as_str())
    }

    /// Restrict `filter` to records whose `owner_field` is this scope's owner.
    pub fn restrict(&self, filter: DocFilter, owner_field: &str) -> DocFilter {
        filter.with(self.condition(owner_field))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Allowed(OwnerScope),
    Denied,
}

pub struct OwnershipGuard;

impl OwnershipGuard {
    /// Decide whether `principal` may act on records owned by `requested_owner`.
    ///
    /// An absent or blank owner is allowed and scoped to the principal. A
    /// present owner must equal the principal's email exactly. No I/O.
    pub fn authorize(principal: &Principal, requested_owner: Option<&str>) -> Decision {
        match requested_owner.filter(|owner| !owner.trim().is_empty()) {
            None => Decision::Allowed(OwnerScope { email: principal.email.clone() }),
            Some(owner) if owner == principal.email => Decision::Allowed(OwnerScope { email: principal.email.clone() }),
            Some(owner) => {
                warn!("Ownership denied: principal '{}' requested scope '{}'", principal.email, owner);
                Decision::Denied
            }
        }
    }
}
