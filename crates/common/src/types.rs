//! Lodestone application event model.
//!
//! Mirrors the JSON shape emitted by the Lodestone core on
//! `/events/all/buffer` and `/events/all/stream`. Every tagged union carries an
//! `Unknown` catch-all so a single unrecognised variant never fails decoding of
//! the surrounding event.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Milliseconds between the Unix epoch and the snowflake epoch (2015-01-01).
pub const LODESTONE_EPOCH_MS: i64 = 1_420_070_400_000;

/// Bits below the timestamp part of a snowflake.
const TIMESTAMP_SHIFT: u32 = 22;
const SEQUENCE_MASK: u64 = (1 << TIMESTAMP_SHIFT) - 1;
/// Worker and process bits all set: reserved for ids minted by this process.
const LOCAL_MARK: u64 = 0x3FF << 12;
const LOCAL_SEQUENCE_MASK: u64 = (1 << 12) - 1;

/// Globally unique, time-sortable identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Snowflake(u64);

impl Snowflake {
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Build a snowflake for `at`, using `sequence` to disambiguate ids minted
    /// within the same millisecond.
    pub fn from_parts(at: DateTime<Utc>, sequence: u64) -> Self {
        let ms = (at.timestamp_millis() - LODESTONE_EPOCH_MS).max(0) as u64;
        Self((ms << TIMESTAMP_SHIFT) | (sequence & SEQUENCE_MASK))
    }

    /// Build a snowflake for a locally created record. The worker and process
    /// bits are reserved so local ids never share a key with core events.
    pub fn local(at: DateTime<Utc>, sequence: u64) -> Self {
        Self::from_parts(at, LOCAL_MARK | (sequence & LOCAL_SEQUENCE_MASK))
    }

    pub const fn is_local(self) -> bool {
        self.0 & LOCAL_MARK == LOCAL_MARK
    }

    pub const fn as_u64(self) -> u64 {
        self.0
    }

    /// Creation time encoded in the upper bits.
    pub fn timestamp(self) -> DateTime<Utc> {
        let ms = (self.0 >> TIMESTAMP_SHIFT) as i64 + LODESTONE_EPOCH_MS;
        DateTime::from_timestamp_millis(ms).unwrap_or_default()
    }
}

impl fmt::Display for Snowflake {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Snowflake {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().parse().map(Self)
    }
}

impl Serialize for Snowflake {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Snowflake {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        use serde::de;

        struct StringOrNumber;

        impl de::Visitor<'_> for StringOrNumber {
            type Value = Snowflake;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                write!(f, "a snowflake as a decimal string or unsigned integer")
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
                v.parse().map_err(E::custom)
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> Result<Self::Value, E> {
                Ok(Snowflake(v))
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> Result<Self::Value, E> {
                u64::try_from(v).map(Snowflake).map_err(E::custom)
            }
        }

        deserializer.deserialize_any(StringOrNumber)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum EventLevel {
    #[default]
    Info,
    Warning,
    Error,
}

impl fmt::Display for EventLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Info => write!(f, "info"),
            Self::Warning => write!(f, "warning"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// One application event as delivered by the core.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub snowflake: Snowflake,
    #[serde(default)]
    pub level: EventLevel,
    pub event_inner: EventInner,
    #[serde(default)]
    pub details: String,
    #[serde(default)]
    pub caused_by: CausedBy,
}

impl Event {
    pub fn id(&self) -> Snowflake {
        self.snowflake
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.snowflake.timestamp()
    }

    /// Flat sub-variant discriminant, used as the side-effect registry key.
    pub fn kind(&self) -> EventKind {
        match &self.event_inner {
            EventInner::InstanceEvent(e) => match &e.instance_event_inner {
                InstanceEventInner::StateTransition { .. } => EventKind::InstanceStateTransition,
                InstanceEventInner::InstanceWarning { .. } => EventKind::InstanceWarning,
                InstanceEventInner::InstanceError { .. } => EventKind::InstanceError,
                InstanceEventInner::InstanceCreationFailed { .. } => {
                    EventKind::InstanceCreationFailed
                }
                InstanceEventInner::InstanceInput { .. } => EventKind::InstanceInput,
                InstanceEventInner::InstanceOutput { .. } => EventKind::InstanceOutput,
                InstanceEventInner::SystemMessage { .. } => EventKind::SystemMessage,
                InstanceEventInner::PlayerChange { .. } => EventKind::PlayerChange,
                InstanceEventInner::PlayerMessage { .. } => EventKind::PlayerMessage,
                InstanceEventInner::Unknown => EventKind::Unknown,
            },
            EventInner::UserEvent(e) => match &e.user_event_inner {
                UserEventInner::UserCreated => EventKind::UserCreated,
                UserEventInner::UserDeleted => EventKind::UserDeleted,
                UserEventInner::UserLoggedIn => EventKind::UserLoggedIn,
                UserEventInner::UserLoggedOut => EventKind::UserLoggedOut,
                UserEventInner::UsernameChanged { .. } => EventKind::UsernameChanged,
                UserEventInner::PermissionChanged => EventKind::PermissionChanged,
                UserEventInner::Unknown => EventKind::Unknown,
            },
            EventInner::MacroEvent(e) => match &e.macro_event_inner {
                MacroEventInner::Started => EventKind::MacroStarted,
                MacroEventInner::Detach => EventKind::MacroDetached,
                MacroEventInner::Stopped { .. } => EventKind::MacroStopped,
                MacroEventInner::Unknown => EventKind::Unknown,
            },
            EventInner::ProgressionEvent(e) => match &e.progression_event_inner {
                ProgressionEventInner::ProgressionStart { .. } => EventKind::ProgressionStart,
                ProgressionEventInner::ProgressionUpdate { .. } => EventKind::ProgressionUpdate,
                ProgressionEventInner::ProgressionEnd { inner, .. } => match inner {
                    Some(ProgressionEndValue::InstanceCreation(_)) => {
                        EventKind::InstanceCreationCompleted
                    }
                    Some(ProgressionEndValue::InstanceDelete { .. }) => {
                        EventKind::InstanceDeleteCompleted
                    }
                    Some(ProgressionEndValue::FsOperationCompleted { .. }) => {
                        EventKind::FsOperationCompleted
                    }
                    Some(ProgressionEndValue::Unknown) | None => EventKind::ProgressionEnd,
                },
                ProgressionEventInner::Unknown => EventKind::Unknown,
            },
            EventInner::FSEvent(_) => EventKind::FsEvent,
            EventInner::Unknown => EventKind::Unknown,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum EventInner {
    InstanceEvent(InstanceEvent),
    UserEvent(UserEvent),
    MacroEvent(MacroEvent),
    ProgressionEvent(ProgressionEvent),
    FSEvent(FsEvent),
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum CausedBy {
    User {
        user_id: String,
        user_name: String,
    },
    Instance {
        instance_uuid: String,
        instance_name: String,
    },
    System,
    #[default]
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstanceEvent {
    pub instance_uuid: String,
    pub instance_name: String,
    pub instance_event_inner: InstanceEventInner,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum InstanceEventInner {
    StateTransition {
        to: InstanceState,
    },
    InstanceWarning {
        message: String,
    },
    InstanceError {
        message: String,
    },
    InstanceCreationFailed {
        message: String,
    },
    InstanceInput {
        message: String,
    },
    InstanceOutput {
        message: String,
    },
    SystemMessage {
        message: String,
    },
    PlayerChange {
        #[serde(default)]
        player_list: Vec<Player>,
        #[serde(default)]
        players_joined: Vec<Player>,
        #[serde(default)]
        players_left: Vec<Player>,
    },
    PlayerMessage {
        player: String,
        player_message: String,
    },
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Player {
    pub name: String,
    #[serde(default)]
    pub uuid: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum InstanceState {
    Starting,
    Running,
    Stopping,
    Stopped,
    Error,
    #[serde(other)]
    Unknown,
}

impl fmt::Display for InstanceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Starting => write!(f, "Starting"),
            Self::Running => write!(f, "Running"),
            Self::Stopping => write!(f, "Stopping"),
            Self::Stopped => write!(f, "Stopped"),
            Self::Error => write!(f, "Error"),
            Self::Unknown => write!(f, "Unknown"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserEvent {
    pub user_id: String,
    pub user_event_inner: UserEventInner,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum UserEventInner {
    UserCreated,
    UserDeleted,
    UserLoggedIn,
    UserLoggedOut,
    UsernameChanged {
        new_username: String,
    },
    PermissionChanged,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MacroEvent {
    pub instance_uuid: String,
    pub macro_pid: u64,
    pub macro_event_inner: MacroEventInner,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum MacroEventInner {
    Started,
    Detach,
    Stopped {
        #[serde(default)]
        exit_status: Option<MacroExitStatus>,
    },
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum MacroExitStatus {
    Success,
    Killed,
    Error {
        error_msg: String,
    },
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressionEvent {
    /// Correlation key shared by the start, every update and the end.
    pub event_id: Snowflake,
    pub progression_event_inner: ProgressionEventInner,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ProgressionEventInner {
    ProgressionStart {
        progression_name: String,
        #[serde(default)]
        producer_id: Option<Snowflake>,
        #[serde(default)]
        total: Option<f64>,
        #[serde(default)]
        inner: Option<ProgressionStartValue>,
    },
    ProgressionUpdate {
        #[serde(default)]
        progress_message: Option<String>,
        progress: f64,
    },
    ProgressionEnd {
        success: bool,
        #[serde(default)]
        message: Option<String>,
        #[serde(default)]
        inner: Option<ProgressionEndValue>,
    },
    #[serde(other)]
    Unknown,
}

/// What a progression is about, attached to its start event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ProgressionStartValue {
    InstanceCreation {
        instance_uuid: String,
        instance_name: String,
    },
    InstanceDelete {
        instance_uuid: String,
    },
    FsOperation {
        #[serde(default)]
        instance_uuid: Option<String>,
        operation: FsOperation,
    },
    #[serde(other)]
    Unknown,
}

/// Result payload attached to a progression's end event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ProgressionEndValue {
    InstanceCreation(InstanceInfo),
    InstanceDelete {
        instance_uuid: String,
    },
    FsOperationCompleted {
        #[serde(default)]
        instance_uuid: Option<String>,
        success: bool,
        #[serde(default)]
        message: Option<String>,
    },
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceInfo {
    pub uuid: String,
    pub name: String,
    #[serde(default)]
    pub game_type: Option<String>,
    #[serde(default)]
    pub state: Option<InstanceState>,
    #[serde(default)]
    pub port: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FsEvent {
    pub operation: FsOperation,
    pub target: FsTarget,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum FsOperation {
    Read,
    Write,
    Mkdir,
    Rmdir,
    Remove,
    Move { source: String },
    Download,
    Upload,
    Unzip,
    Zip,
    #[serde(other)]
    Unknown,
}

impl fmt::Display for FsOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Read => write!(f, "read"),
            Self::Write => write!(f, "write"),
            Self::Mkdir => write!(f, "create directory"),
            Self::Rmdir => write!(f, "remove directory"),
            Self::Remove => write!(f, "remove"),
            Self::Move { .. } => write!(f, "move"),
            Self::Download => write!(f, "download"),
            Self::Upload => write!(f, "upload"),
            Self::Unzip => write!(f, "unzip"),
            Self::Zip => write!(f, "zip"),
            Self::Unknown => write!(f, "unknown operation"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum FsTarget {
    File { path: String },
    Directory { path: String },
}

impl FsTarget {
    pub fn path(&self) -> &str {
        match self {
            Self::File { path } | Self::Directory { path } => path,
        }
    }
}

/// Flat discriminant over every event sub-variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    InstanceStateTransition,
    InstanceWarning,
    InstanceError,
    InstanceCreationFailed,
    InstanceInput,
    InstanceOutput,
    SystemMessage,
    PlayerChange,
    PlayerMessage,
    UserCreated,
    UserDeleted,
    UserLoggedIn,
    UserLoggedOut,
    UsernameChanged,
    PermissionChanged,
    MacroStarted,
    MacroDetached,
    MacroStopped,
    ProgressionStart,
    ProgressionUpdate,
    ProgressionEnd,
    InstanceCreationCompleted,
    InstanceDeleteCompleted,
    FsOperationCompleted,
    FsEvent,
    Unknown,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InstanceStateTransition => "instance_state_transition",
            Self::InstanceWarning => "instance_warning",
            Self::InstanceError => "instance_error",
            Self::InstanceCreationFailed => "instance_creation_failed",
            Self::InstanceInput => "instance_input",
            Self::InstanceOutput => "instance_output",
            Self::SystemMessage => "system_message",
            Self::PlayerChange => "player_change",
            Self::PlayerMessage => "player_message",
            Self::UserCreated => "user_created",
            Self::UserDeleted => "user_deleted",
            Self::UserLoggedIn => "user_logged_in",
            Self::UserLoggedOut => "user_logged_out",
            Self::UsernameChanged => "username_changed",
            Self::PermissionChanged => "permission_changed",
            Self::MacroStarted => "macro_started",
            Self::MacroDetached => "macro_detached",
            Self::MacroStopped => "macro_stopped",
            Self::ProgressionStart => "progression_start",
            Self::ProgressionUpdate => "progression_update",
            Self::ProgressionEnd => "progression_end",
            Self::InstanceCreationCompleted => "instance_creation_completed",
            Self::InstanceDeleteCompleted => "instance_delete_completed",
            Self::FsOperationCompleted => "fs_operation_completed",
            Self::FsEvent => "fs_event",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Top-level event domains, as accepted by the `event_types` filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventType {
    InstanceEvent,
    UserEvent,
    FSEvent,
    MacroEvent,
    ProgressionEvent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InstanceEventKind {
    StateTransition,
    InstanceWarning,
    InstanceError,
    InstanceCreationFailed,
    InstanceInput,
    InstanceOutput,
    SystemMessage,
    PlayerChange,
    PlayerMessage,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UserEventKind {
    UserCreated,
    UserDeleted,
    UserLoggedIn,
    UserLoggedOut,
    UsernameChanged,
    PermissionChanged,
}

/// Inclusive range of unix seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: i64,
    pub end: i64,
}

/// Server-side filter for the buffer and stream endpoints. `None` means no
/// filter on that dimension.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct EventQuery {
    pub bearer_token: Option<String>,
    pub event_levels: Option<Vec<EventLevel>>,
    pub event_types: Option<Vec<EventType>>,
    pub instance_event_types: Option<Vec<InstanceEventKind>>,
    pub user_event_types: Option<Vec<UserEventKind>>,
    pub event_user_ids: Option<Vec<String>>,
    pub event_instance_ids: Option<Vec<String>>,
    pub time_range: Option<TimeRange>,
}

impl EventQuery {
    pub fn with_token(token: impl Into<String>) -> Self {
        Self {
            bearer_token: Some(token.into()),
            ..Self::default()
        }
    }

    pub fn levels(mut self, levels: Vec<EventLevel>) -> Self {
        self.event_levels = Some(levels);
        self
    }

    pub fn event_types(mut self, types: Vec<EventType>) -> Self {
        self.event_types = Some(types);
        self
    }

    /// JSON encoding used for the `filter` query parameter.
    pub fn to_filter_param(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}
