/// Moderation workflows
///
/// Records flagged content, drives decisions through explicit state
/// machines, and handles appeals and punishments with a full transition log.
pub mod appeals;
pub mod log;
pub mod punishments;
pub mod records;
pub mod state;

pub use appeals::{AppealDecision, AppealManager, AppealRecord, ReviewOutcome};
pub use log::ModerationLogEntry;
pub use punishments::{PunishmentKind, PunishmentManager, PunishmentRecord, Sanction};
pub use records::{
    ActionTaken, BatchFailure, BatchOutcome, ContentCategory, ContentType, DecisionOutcome,
    ModerationManager, ModerationRecord, Severity,
};
pub use state::{
    AppealEvent, AppealStatus, ModerationEvent, ModerationStatus, PunishmentStatus,
    TransitionError,
};
