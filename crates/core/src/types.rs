/// Chat addresses (users and groups) are opaque gateway identifiers.
pub type Jid = String;

/// All timestamps are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;
