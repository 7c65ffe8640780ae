//! Core types for seedreap

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

/// Unique identifier for a persisted entity.
///
/// 128-bit, lexicographically sortable (UUID v7, which is time-ordered) and
/// stored as hyphenated lowercase text in SQLite so `ORDER BY id` follows
/// creation order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ToSchema)]
#[serde(transparent)]
pub struct Id(pub Uuid);

impl Id {
    /// Generate a fresh, time-ordered identifier
    pub fn generate() -> Self {
        Self(Uuid::now_v7())
    }

    /// Get the inner UUID value
    pub fn get(&self) -> Uuid {
        self.0
    }
}

impl std::fmt::Display for Id {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.hyphenated())
    }
}

impl std::str::FromStr for Id {
    type Err = uuid::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

impl From<Uuid> for Id {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

// Implement sqlx Type, Encode, and Decode so ids bind as TEXT columns
impl sqlx::Type<sqlx::Sqlite> for Id {
    fn type_info() -> sqlx::sqlite::SqliteTypeInfo {
        <String as sqlx::Type<sqlx::Sqlite>>::type_info()
    }

    fn compatible(ty: &sqlx::sqlite::SqliteTypeInfo) -> bool {
        <String as sqlx::Type<sqlx::Sqlite>>::compatible(ty)
    }
}

impl<'q> sqlx::Encode<'q, sqlx::Sqlite> for Id {
    fn encode_by_ref(
        &self,
        buf: &mut Vec<sqlx::sqlite::SqliteArgumentValue<'q>>,
    ) -> std::result::Result<sqlx::encode::IsNull, Box<dyn std::error::Error + Send + Sync>> {
        sqlx::Encode::<sqlx::Sqlite>::encode(self.to_string(), buf)
    }
}

impl<'r> sqlx::Decode<'r, sqlx::Sqlite> for Id {
    fn decode(
        value: sqlx::sqlite::SqliteValueRef<'r>,
    ) -> std::result::Result<Self, sqlx::error::BoxDynError> {
        let raw = <&str as sqlx::Decode<sqlx::Sqlite>>::decode(value)?;
        let id = Uuid::parse_str(raw)?;
        Ok(Self(id))
    }
}

/// Status of a download as reported by the remote torrent client
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum DownloadStatus {
    /// Actively downloading on the seedbox
    Downloading,
    /// Paused by the remote client or user
    Paused,
    /// All pieces present on the seedbox
    Complete,
    /// The remote client reported an error
    Error,
}

impl DownloadStatus {
    /// Convert integer status code to DownloadStatus
    pub fn from_i32(status: i32) -> Self {
        match status {
            0 => DownloadStatus::Downloading,
            1 => DownloadStatus::Paused,
            2 => DownloadStatus::Complete,
            3 => DownloadStatus::Error,
            _ => DownloadStatus::Error, // Default to Error for unknown status
        }
    }

    /// Convert DownloadStatus to integer status code
    pub fn to_i32(&self) -> i32 {
        match self {
            DownloadStatus::Downloading => 0,
            DownloadStatus::Paused => 1,
            DownloadStatus::Complete => 2,
            DownloadStatus::Error => 3,
        }
    }
}

/// State of a single file within a remote download
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum FileState {
    /// Still downloading on the seedbox
    Downloading,
    /// Fully present on the seedbox
    Complete,
}

impl FileState {
    /// Convert integer state code to FileState
    pub fn from_i32(state: i32) -> Self {
        match state {
            1 => FileState::Complete,
            _ => FileState::Downloading,
        }
    }

    /// Convert FileState to integer state code
    pub fn to_i32(&self) -> i32 {
        match self {
            FileState::Downloading => 0,
            FileState::Complete => 1,
        }
    }
}

/// Status of a sync job
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum SyncStatus {
    /// Created, waiting for the first file completion
    Pending,
    /// At least one file transfer has started
    Syncing,
    /// Every file transferred
    Complete,
    /// Cancelled because the download was removed
    Cancelled,
    /// A transfer failed
    Error,
}

impl SyncStatus {
    /// Convert integer status code to SyncStatus
    pub fn from_i32(status: i32) -> Self {
        match status {
            0 => SyncStatus::Pending,
            1 => SyncStatus::Syncing,
            2 => SyncStatus::Complete,
            3 => SyncStatus::Cancelled,
            4 => SyncStatus::Error,
            _ => SyncStatus::Error,
        }
    }

    /// Convert SyncStatus to integer status code
    pub fn to_i32(&self) -> i32 {
        match self {
            SyncStatus::Pending => 0,
            SyncStatus::Syncing => 1,
            SyncStatus::Complete => 2,
            SyncStatus::Cancelled => 3,
            SyncStatus::Error => 4,
        }
    }
}

/// Status of a single file within a sync job
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum SyncFileStatus {
    /// Waiting for a transfer slot
    Pending,
    /// Transfer in flight
    Syncing,
    /// Transferred and size-verified
    Complete,
    /// Transfer or verification failed
    Error,
}

impl SyncFileStatus {
    /// Convert integer status code to SyncFileStatus
    pub fn from_i32(status: i32) -> Self {
        match status {
            0 => SyncFileStatus::Pending,
            1 => SyncFileStatus::Syncing,
            2 => SyncFileStatus::Complete,
            3 => SyncFileStatus::Error,
            _ => SyncFileStatus::Error,
        }
    }

    /// Convert SyncFileStatus to integer status code
    pub fn to_i32(&self) -> i32 {
        match self {
            SyncFileStatus::Pending => 0,
            SyncFileStatus::Syncing => 1,
            SyncFileStatus::Complete => 2,
            SyncFileStatus::Error => 3,
        }
    }
}

/// Status of a move job (staging tree to final destination)
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum MoveStatus {
    /// Created, not yet started
    Pending,
    /// Files being renamed/copied
    Moving,
    /// Every file at the final destination
    Complete,
    /// A filesystem operation failed
    Error,
}

impl MoveStatus {
    /// Convert integer status code to MoveStatus
    pub fn from_i32(status: i32) -> Self {
        match status {
            0 => MoveStatus::Pending,
            1 => MoveStatus::Moving,
            2 => MoveStatus::Complete,
            3 => MoveStatus::Error,
            _ => MoveStatus::Error,
        }
    }

    /// Convert MoveStatus to integer status code
    pub fn to_i32(&self) -> i32 {
        match self {
            MoveStatus::Pending => 0,
            MoveStatus::Moving => 1,
            MoveStatus::Complete => 2,
            MoveStatus::Error => 3,
        }
    }
}

/// Status of an app notification job
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum AppJobStatus {
    /// Created, not yet triggered
    Pending,
    /// Trigger request in flight
    Running,
    /// The app acknowledged the scan command
    Complete,
    /// The trigger failed
    Error,
}

impl AppJobStatus {
    /// Convert integer status code to AppJobStatus
    pub fn from_i32(status: i32) -> Self {
        match status {
            0 => AppJobStatus::Pending,
            1 => AppJobStatus::Running,
            2 => AppJobStatus::Complete,
            3 => AppJobStatus::Error,
            _ => AppJobStatus::Error,
        }
    }

    /// Convert AppJobStatus to integer status code
    pub fn to_i32(&self) -> i32 {
        match self {
            AppJobStatus::Pending => 0,
            AppJobStatus::Running => 1,
            AppJobStatus::Complete => 2,
            AppJobStatus::Error => 3,
        }
    }
}

/// Derived, UI-facing state of a download across the whole pipeline
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "kebab-case")]
pub enum TrackedState {
    /// Observed, no pipeline activity yet
    Discovered,
    /// Downloading on the seedbox
    Downloading,
    /// Paused on the seedbox
    Paused,
    /// Downloading remotely while completed files sync locally
    DownloadingSyncing,
    /// Remote complete, files syncing to staging
    Syncing,
    /// All files staged (or moved), awaiting the next stage
    Synced,
    /// Staged tree moving to the final destination
    Moving,
    /// App notified and import acknowledged
    Imported,
    /// Remote complete with no local pipeline (no matching app)
    Complete,
    /// Some stage reported an error
    Error,
    /// Sync cancelled (download removed)
    Cancelled,
}

impl TrackedState {
    /// Convert integer state code to TrackedState
    pub fn from_i32(state: i32) -> Self {
        match state {
            0 => TrackedState::Discovered,
            1 => TrackedState::Downloading,
            2 => TrackedState::Paused,
            3 => TrackedState::DownloadingSyncing,
            4 => TrackedState::Syncing,
            5 => TrackedState::Synced,
            6 => TrackedState::Moving,
            7 => TrackedState::Imported,
            8 => TrackedState::Complete,
            9 => TrackedState::Error,
            10 => TrackedState::Cancelled,
            _ => TrackedState::Error,
        }
    }

    /// Convert TrackedState to integer state code
    pub fn to_i32(&self) -> i32 {
        match self {
            TrackedState::Discovered => 0,
            TrackedState::Downloading => 1,
            TrackedState::Paused => 2,
            TrackedState::DownloadingSyncing => 3,
            TrackedState::Syncing => 4,
            TrackedState::Synced => 5,
            TrackedState::Moving => 6,
            TrackedState::Imported => 7,
            TrackedState::Complete => 8,
            TrackedState::Error => 9,
            TrackedState::Cancelled => 10,
        }
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn generated_ids_sort_by_creation_order() {
        // UUID v7 embeds a millisecond timestamp in the high bits, so the
        // hyphenated text form sorts lexicographically by creation time.
        let a = Id::generate();
        std::thread::sleep(std::time::Duration::from_millis(2));
        let b = Id::generate();
        assert!(a.to_string() < b.to_string(), "{a} should sort before {b}");
        assert!(a < b);
    }

    #[test]
    fn id_round_trips_through_display_and_from_str() {
        let id = Id::generate();
        let parsed = Id::from_str(&id.to_string()).unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn id_from_str_rejects_garbage() {
        assert!(Id::from_str("not-a-uuid").is_err());
        assert!(Id::from_str("").is_err());
    }

    #[test]
    fn download_status_round_trips_through_i32_for_all_variants() {
        let cases = [
            (DownloadStatus::Downloading, 0),
            (DownloadStatus::Paused, 1),
            (DownloadStatus::Complete, 2),
            (DownloadStatus::Error, 3),
        ];
        for (variant, expected) in cases {
            assert_eq!(variant.to_i32(), expected);
            assert_eq!(DownloadStatus::from_i32(expected), variant);
        }
    }

    #[test]
    fn download_status_from_unknown_integer_defaults_to_error() {
        assert_eq!(
            DownloadStatus::from_i32(99),
            DownloadStatus::Error,
            "unknown status must surface visibly, not silently become Downloading"
        );
        assert_eq!(DownloadStatus::from_i32(-1), DownloadStatus::Error);
    }

    #[test]
    fn sync_status_round_trips_through_i32_for_all_variants() {
        let cases = [
            (SyncStatus::Pending, 0),
            (SyncStatus::Syncing, 1),
            (SyncStatus::Complete, 2),
            (SyncStatus::Cancelled, 3),
            (SyncStatus::Error, 4),
        ];
        for (variant, expected) in cases {
            assert_eq!(variant.to_i32(), expected);
            assert_eq!(SyncStatus::from_i32(expected), variant);
        }
    }

    #[test]
    fn tracked_state_round_trips_through_i32_for_all_variants() {
        for raw in 0..=10 {
            let state = TrackedState::from_i32(raw);
            assert_eq!(state.to_i32(), raw, "{state:?} must encode back to {raw}");
        }
    }

    #[test]
    fn tracked_state_serializes_kebab_case() {
        let json = serde_json::to_string(&TrackedState::DownloadingSyncing).unwrap();
        assert_eq!(json, "\"downloading-syncing\"");
    }

    #[test]
    fn file_state_unknown_integer_means_downloading() {
        // DownloadFile.state only distinguishes "fully present" from everything
        // else; an unknown code must never pretend the file is complete.
        assert_eq!(FileState::from_i32(7), FileState::Downloading);
    }
}
