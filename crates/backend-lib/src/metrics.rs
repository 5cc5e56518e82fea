// ==============
// crates/backend-lib/src/metrics.rs
// ==============
//! Central place for metric keys
pub const WS_CONNECTION: &str = "ws.connection";
pub const WS_DISCONNECTION: &str = "ws.disconnection";
pub const WS_ACTIVE: &str = "ws.active";
pub const ACCOUNT_REGISTERED: &str = "account.registered";
pub const SESSION_ISSUED: &str = "session.issued";
pub const SESSION_REVOKED: &str = "session.revoked";
pub const ROOM_CODE_ROTATED: &str = "room.code_rotated";
pub const REGISTRY_JOINED: &str = "registry.joined";
pub const REGISTRY_MEMBERS: &str = "registry.members";
pub const REGISTRY_EVICTED: &str = "registry.evicted";
pub const SYNC_APPLIED: &str = "sync.applied";
pub const SYNC_DROPPED: &str = "sync.dropped";
pub const CALL_REQUESTED: &str = "intercom.call_requested";
pub const CALL_SUPPRESSED: &str = "intercom.call_suppressed";
