/// Workflow state machines for moderation, appeals, and punishments
///
/// Every status mutation in these workflows goes through a transition
/// function `(current, event) -> Result<next, TransitionError>` evaluated
/// before anything is persisted. Handlers never assign a status directly.
use crate::error::HubResult;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Rejected state transition
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{workflow}: cannot apply {event} in state {current}")]
pub struct TransitionError {
    pub workflow: &'static str,
    pub current: &'static str,
    pub event: &'static str,
}

impl TransitionError {
    fn new(workflow: &'static str, current: &'static str, event: &'static str) -> Self {
        Self {
            workflow,
            current,
            event,
        }
    }
}

// ========== Moderation ==========

/// Moderation record status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModerationStatus {
    Pending,
    UnderReview,
    Approved,
    Rejected,
    Escalated,
}

impl ModerationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModerationStatus::Pending => "pending",
            ModerationStatus::UnderReview => "underreview",
            ModerationStatus::Approved => "approved",
            ModerationStatus::Rejected => "rejected",
            ModerationStatus::Escalated => "escalated",
        }
    }

    pub fn from_str(s: &str) -> HubResult<Self> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(ModerationStatus::Pending),
            "underreview" => Ok(ModerationStatus::UnderReview),
            "approved" => Ok(ModerationStatus::Approved),
            "rejected" => Ok(ModerationStatus::Rejected),
            "escalated" => Ok(ModerationStatus::Escalated),
            _ => Err(crate::error::HubError::Validation(format!(
                "Invalid moderation status: {}",
                s
            ))),
        }
    }

    /// Approved and Rejected are terminal; only an appeal reopens them.
    pub fn is_terminal(&self) -> bool {
        matches!(self, ModerationStatus::Approved | ModerationStatus::Rejected)
    }
}

/// Events that drive a moderation record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModerationEvent {
    StartReview,
    Approve,
    Reject,
    Escalate,
    Reopen,
}

impl ModerationEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModerationEvent::StartReview => "startreview",
            ModerationEvent::Reject => "reject",
            ModerationEvent::Approve => "approve",
            ModerationEvent::Escalate => "escalate",
            ModerationEvent::Reopen => "reopen",
        }
    }

    pub fn from_str(s: &str) -> HubResult<Self> {
        match s.to_lowercase().as_str() {
            "startreview" => Ok(ModerationEvent::StartReview),
            "approve" => Ok(ModerationEvent::Approve),
            "reject" => Ok(ModerationEvent::Reject),
            "escalate" => Ok(ModerationEvent::Escalate),
            "reopen" => Ok(ModerationEvent::Reopen),
            _ => Err(crate::error::HubError::Validation(format!(
                "Invalid moderation event: {}",
                s
            ))),
        }
    }
}

/// Moderation transition table
pub fn moderation_transition(
    current: ModerationStatus,
    event: ModerationEvent,
) -> Result<ModerationStatus, TransitionError> {
    use ModerationEvent as E;
    use ModerationStatus as S;

    match (current, event) {
        (S::Pending, E::StartReview) => Ok(S::UnderReview),
        (S::Pending, E::Approve) => Ok(S::Approved),
        (S::Pending, E::Reject) => Ok(S::Rejected),
        (S::Pending, E::Escalate) => Ok(S::Escalated),
        (S::UnderReview, E::Approve) => Ok(S::Approved),
        (S::UnderReview, E::Reject) => Ok(S::Rejected),
        (S::UnderReview, E::Escalate) => Ok(S::Escalated),
        (S::Escalated, E::StartReview) => Ok(S::UnderReview),
        (S::Escalated, E::Approve) => Ok(S::Approved),
        (S::Escalated, E::Reject) => Ok(S::Rejected),
        // Terminal states can only be reopened, which appeals do.
        (S::Approved, E::Reopen) | (S::Rejected, E::Reopen) => Ok(S::UnderReview),
        (s, e) => Err(TransitionError::new("moderation", s.as_str(), e.as_str())),
    }
}

// ========== Appeals ==========

/// Appeal record status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AppealStatus {
    Pending,
    UnderReview,
    Approved,
    Denied,
    PartiallyApproved,
    Withdrawn,
    Expired,
}

impl AppealStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AppealStatus::Pending => "pending",
            AppealStatus::UnderReview => "underreview",
            AppealStatus::Approved => "approved",
            AppealStatus::Denied => "denied",
            AppealStatus::PartiallyApproved => "partiallyapproved",
            AppealStatus::Withdrawn => "withdrawn",
            AppealStatus::Expired => "expired",
        }
    }

    pub fn from_str(s: &str) -> HubResult<Self> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(AppealStatus::Pending),
            "underreview" => Ok(AppealStatus::UnderReview),
            "approved" => Ok(AppealStatus::Approved),
            "denied" => Ok(AppealStatus::Denied),
            "partiallyapproved" => Ok(AppealStatus::PartiallyApproved),
            "withdrawn" => Ok(AppealStatus::Withdrawn),
            "expired" => Ok(AppealStatus::Expired),
            _ => Err(crate::error::HubError::Validation(format!(
                "Invalid appeal status: {}",
                s
            ))),
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, AppealStatus::Pending | AppealStatus::UnderReview)
    }
}

/// Events that drive an appeal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AppealEvent {
    StartReview,
    Approve,
    Deny,
    PartiallyApprove,
    Withdraw,
    Expire,
}

impl AppealEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            AppealEvent::StartReview => "startreview",
            AppealEvent::Approve => "approve",
            AppealEvent::Deny => "deny",
            AppealEvent::PartiallyApprove => "partiallyapprove",
            AppealEvent::Withdraw => "withdraw",
            AppealEvent::Expire => "expire",
        }
    }

    pub fn from_str(s: &str) -> HubResult<Self> {
        match s.to_lowercase().as_str() {
            "startreview" => Ok(AppealEvent::StartReview),
            "approve" => Ok(AppealEvent::Approve),
            "deny" => Ok(AppealEvent::Deny),
            "partiallyapprove" => Ok(AppealEvent::PartiallyApprove),
            "withdraw" => Ok(AppealEvent::Withdraw),
            "expire" => Ok(AppealEvent::Expire),
            _ => Err(crate::error::HubError::Validation(format!(
                "Invalid appeal event: {}",
                s
            ))),
        }
    }
}

/// Appeal transition table. A reviewer may decide directly from Pending
/// without an explicit StartReview.
pub fn appeal_transition(
    current: AppealStatus,
    event: AppealEvent,
) -> Result<AppealStatus, TransitionError> {
    use AppealEvent as E;
    use AppealStatus as S;

    match (current, event) {
        (S::Pending, E::StartReview) => Ok(S::UnderReview),
        (S::Pending | S::UnderReview, E::Approve) => Ok(S::Approved),
        (S::Pending | S::UnderReview, E::Deny) => Ok(S::Denied),
        (S::Pending | S::UnderReview, E::PartiallyApprove) => Ok(S::PartiallyApproved),
        (S::Pending | S::UnderReview, E::Withdraw) => Ok(S::Withdrawn),
        (S::Pending, E::Expire) => Ok(S::Expired),
        (s, e) => Err(TransitionError::new("appeal", s.as_str(), e.as_str())),
    }
}

// ========== Punishments ==========

/// Punishment status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PunishmentStatus {
    Active,
    Expired,
    Revoked,
}

impl PunishmentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PunishmentStatus::Active => "active",
            PunishmentStatus::Expired => "expired",
            PunishmentStatus::Revoked => "revoked",
        }
    }

    pub fn from_str(s: &str) -> HubResult<Self> {
        match s.to_lowercase().as_str() {
            "active" => Ok(PunishmentStatus::Active),
            "expired" => Ok(PunishmentStatus::Expired),
            "revoked" => Ok(PunishmentStatus::Revoked),
            _ => Err(crate::error::HubError::Validation(format!(
                "Invalid punishment status: {}",
                s
            ))),
        }
    }
}

/// Events that end a punishment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PunishmentEvent {
    Expire,
    Revoke,
}

impl PunishmentEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            PunishmentEvent::Expire => "expire",
            PunishmentEvent::Revoke => "revoke",
        }
    }
}

/// Punishment transition table
pub fn punishment_transition(
    current: PunishmentStatus,
    event: PunishmentEvent,
) -> Result<PunishmentStatus, TransitionError> {
    use PunishmentEvent as E;
    use PunishmentStatus as S;

    match (current, event) {
        (S::Active, E::Expire) => Ok(S::Expired),
        (S::Active, E::Revoke) => Ok(S::Revoked),
        (s, e) => Err(TransitionError::new("punishment", s.as_str(), e.as_str())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_moderation_happy_paths() {
        use ModerationEvent as E;
        use ModerationStatus as S;

        assert_eq!(moderation_transition(S::Pending, E::Reject), Ok(S::Rejected));
        assert_eq!(
            moderation_transition(S::Pending, E::StartReview),
            Ok(S::UnderReview)
        );
        assert_eq!(
            moderation_transition(S::UnderReview, E::Approve),
            Ok(S::Approved)
        );
        assert_eq!(
            moderation_transition(S::Escalated, E::Reject),
            Ok(S::Rejected)
        );
    }

    #[test]
    fn test_terminal_states_do_not_silently_revert() {
        use ModerationEvent as E;
        use ModerationStatus as S;

        // Once decided, only Reopen is legal.
        assert!(moderation_transition(S::Approved, E::Reject).is_err());
        assert!(moderation_transition(S::Rejected, E::Approve).is_err());
        assert!(moderation_transition(S::Rejected, E::StartReview).is_err());
        assert_eq!(
            moderation_transition(S::Rejected, E::Reopen),
            Ok(S::UnderReview)
        );
    }

    #[test]
    fn test_double_decide_is_rejected() {
        use ModerationEvent as E;
        use ModerationStatus as S;

        let first = moderation_transition(S::Pending, E::Reject).unwrap();
        let second = moderation_transition(first, E::Reject);
        assert_eq!(
            second,
            Err(TransitionError {
                workflow: "moderation",
                current: "rejected",
                event: "reject",
            })
        );
    }

    #[test]
    fn test_appeal_cannot_be_decided_twice() {
        use AppealEvent as E;
        use AppealStatus as S;

        assert_eq!(appeal_transition(S::Pending, E::Approve), Ok(S::Approved));
        assert!(appeal_transition(S::Approved, E::Deny).is_err());
        assert!(appeal_transition(S::Withdrawn, E::Approve).is_err());
    }

    #[test]
    fn test_appeal_expire_only_from_pending() {
        use AppealEvent as E;
        use AppealStatus as S;

        assert_eq!(appeal_transition(S::Pending, E::Expire), Ok(S::Expired));
        assert!(appeal_transition(S::UnderReview, E::Expire).is_err());
    }

    #[test]
    fn test_punishment_single_exit() {
        use PunishmentEvent as E;
        use PunishmentStatus as S;

        assert_eq!(punishment_transition(S::Active, E::Revoke), Ok(S::Revoked));
        assert!(punishment_transition(S::Revoked, E::Expire).is_err());
        assert!(punishment_transition(S::Expired, E::Revoke).is_err());
    }

    #[test]
    fn test_status_string_roundtrip() {
        for s in [
            ModerationStatus::Pending,
            ModerationStatus::UnderReview,
            ModerationStatus::Approved,
            ModerationStatus::Rejected,
            ModerationStatus::Escalated,
        ] {
            assert_eq!(ModerationStatus::from_str(s.as_str()).unwrap(), s);
        }
        assert!(ModerationStatus::from_str("bogus").is_err());
    }
}
