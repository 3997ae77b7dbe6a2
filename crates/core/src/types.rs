/// Backend primary keys (runs, users, uploaded DNA files) are integers.
pub type DbId = i64;

/// All timestamps are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;
