//! Remote document store layer.

pub mod memory;
pub mod remote;

pub use memory::MemoryStore;
pub use remote::{
    DocumentSnapshot, FieldUpdates, FieldValue, Filter, FilterOp, OrderBy, OrderDirection,
    RemoteStore, SubscribeTarget, Subscription, WriteOp, MAX_BATCH_OPS,
};

/// Collection names and path helpers.
///
/// Subcollections are addressed with slash-separated paths, the way the
/// backing document store nests them.
pub mod collections {
    pub const SESSIONS: &str = "sessions";
    pub const ROUTES: &str = "routes";
    pub const SQUADS: &str = "squads";
    pub const USERS: &str = "users";

    /// Per-participant final stats: `sessions/{id}/participantStats/{userId}`.
    pub fn participant_stats(session_id: &str) -> String {
        format!("{}/{}/participantStats", SESSIONS, session_id)
    }

    /// Current position only: `sessions/{id}/locations/{userId}`.
    pub fn locations(session_id: &str) -> String {
        format!("{}/{}/locations", SESSIONS, session_id)
    }

    /// Legacy per-point route storage:
    /// `sessions/{id}/routes/{userId}/points/{timestampId}`.
    pub fn legacy_route_points(session_id: &str, user_id: &str) -> String {
        format!("{}/{}/routes/{}/points", SESSIONS, session_id, user_id)
    }

    /// V2 batched route document id inside `routes`.
    pub fn route_doc_id(session_id: &str, user_id: &str) -> String {
        format!("{}_{}", session_id, user_id)
    }
}
