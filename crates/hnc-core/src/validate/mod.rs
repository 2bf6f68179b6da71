//! Synchronous admission policy.
//!
//! Each validator takes the forest lock, reads only, and answers fast; the
//! hierarchy validator additionally computes a list of authorization checks
//! to perform after releasing the lock. The hierarchy, anchor,
//! configuration, and namespace validators fail closed (unavailable means
//! reject); the object validator fails open so unrelated workloads are
//! never paralyzed by this controller.

pub mod anchor;
pub mod config;
pub mod hierarchy;
pub mod namespace;
pub mod object;

pub use anchor::AnchorValidator;
pub use config::ConfigValidator;
pub use hierarchy::HierarchyValidator;
pub use namespace::NamespaceValidator;
pub use object::ObjectValidator;

use derive_more::Display;

///
/// Operation
///

#[derive(Clone, Copy, Debug, Display, Eq, PartialEq)]
#[remain::sorted]
pub enum Operation {
    Create,
    Delete,
    Update,
}

///
/// ResponseCode
/// The orchestrator-native status a rejection is translated into.
///

#[derive(Clone, Copy, Debug, Display, Eq, PartialEq)]
#[remain::sorted]
pub enum ResponseCode {
    AlreadyExists,
    BadRequest,
    Conflict,
    Forbidden,
    InternalError,
    Invalid,
    ServiceUnavailable,
    Unauthorized,
}

///
/// Denial
/// One rejection: the status code plus a message naming the offending
/// namespace or object and a corrective action where one exists.
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Denial {
    pub code: ResponseCode,
    pub message: String,
}

impl std::fmt::Display for Denial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl Denial {
    /// The wire shape sent back through the admission review contract.
    #[must_use]
    pub fn into_outcome(self) -> hnc_api::ReviewOutcome {
        hnc_api::ReviewOutcome::reject(self.code.to_string(), self.message)
    }
}

/// Admission result: allowed, or denied with a status.
pub type Verdict = Result<(), Denial>;

/// Maps a verdict onto the admission review response shape.
#[must_use]
pub fn outcome(verdict: Verdict) -> hnc_api::ReviewOutcome {
    match verdict {
        Ok(()) => hnc_api::ReviewOutcome::allow(),
        Err(denial) => denial.into_outcome(),
    }
}

pub(crate) fn deny(code: ResponseCode, message: impl Into<String>) -> Verdict {
    Err(Denial {
        code,
        message: message.into(),
    })
}

///
/// Review
/// One mutation under review. `object` is the requested state (absent on
/// delete); `old_object` is the stored state (absent on create).
///

#[derive(Clone, Debug)]
pub struct Review<T> {
    pub operation: Operation,
    pub user: String,
    pub object: Option<T>,
    pub old_object: Option<T>,
}

impl<T> Review<T> {
    #[must_use]
    pub fn create(user: impl Into<String>, object: T) -> Self {
        Self {
            operation: Operation::Create,
            user: user.into(),
            object: Some(object),
            old_object: None,
        }
    }

    #[must_use]
    pub fn update(user: impl Into<String>, old_object: T, object: T) -> Self {
        Self {
            operation: Operation::Update,
            user: user.into(),
            object: Some(object),
            old_object: Some(old_object),
        }
    }

    #[must_use]
    pub fn delete(user: impl Into<String>, old_object: T) -> Self {
        Self {
            operation: Operation::Delete,
            user: user.into(),
            object: None,
            old_object: Some(old_object),
        }
    }

    /// The requested state; required for create and update.
    pub(crate) fn requested(&self) -> Result<&T, Denial> {
        self.object.as_ref().ok_or(Denial {
            code: ResponseCode::BadRequest,
            message: "the admission request carries no object".to_string(),
        })
    }

    /// The stored state; required for update and delete.
    pub(crate) fn stored(&self) -> Result<&T, Denial> {
        self.old_object.as_ref().ok_or(Denial {
            code: ResponseCode::BadRequest,
            message: "the admission request carries no stored object".to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verdicts_map_onto_the_review_contract() {
        assert!(outcome(Ok(())).allowed);

        let rejected = outcome(deny(ResponseCode::Forbidden, "not yours"));
        assert!(!rejected.allowed);
        assert_eq!(rejected.reason.as_deref(), Some("Forbidden"));
        assert_eq!(rejected.message.as_deref(), Some("not yours"));
    }

    #[test]
    fn review_constructors_carry_the_right_sides() {
        let create = Review::create("alice", 1);
        assert_eq!(create.operation, Operation::Create);
        assert!(create.requested().is_ok());
        assert!(create.stored().is_err());

        let delete = Review::delete("alice", 2);
        assert_eq!(delete.operation, Operation::Delete);
        assert!(delete.stored().is_ok());
        assert!(delete.requested().is_err());
    }
}
