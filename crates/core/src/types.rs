/// Client-side identifier of one submission. Distinct from the session id,
/// which is only known once the upload has been accepted.
pub type JobId = uuid::Uuid;

/// Opaque session token issued by the remote service.
pub type SessionId = String;

/// All timestamps are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;
