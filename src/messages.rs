//! Request and reply records for the server API.
//!
//! DESIGN
//! ======
//! Field names are snake_case on the wire and match the server schema; every
//! reply field is `#[serde(default)]` so older servers that omit a field still
//! decode. Only the records used by the client's typed methods live here; any
//! other API can be reached through `Client::call` with caller-defined types.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::value::{DataType, DataValue, ValueError};

// =============================================================================
// ACCOUNTS & SESSIONS
// =============================================================================

/// Credentials for `SignIn`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SignIn {
    pub username: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
}

/// Authenticated user info returned by sign-in style calls.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SignInReply {
    pub user_id: String,
    pub username: Option<String>,
    pub email: Option<String>,
    /// Session token to persist and present on reconnect.
    pub session_id: String,
    pub admin_level: f64,
    pub language: Option<String>,
    pub country: Option<String>,
    /// Server clock in milliseconds since the Unix epoch at reply time.
    pub time: f64,
}

/// Body for `ValidateSession`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ValidateSessionRequest {
    pub session_id: String,
}

/// Body for `CreateAnonymousAccount`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CreateAnonymousAccount {
    pub invite_code: Option<String>,
    pub language: Option<String>,
    pub country: Option<String>,
}

/// Body for `CreateAccount` and `ConvertToFullAccount`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CreateAccount {
    pub username: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
    pub invite_code: Option<String>,
    pub language: Option<String>,
    pub country: Option<String>,
}

/// Empty request body (`GetTime`, `GetUserInfo`).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmptyClientRequest {}

/// Empty reply body.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmptyClientReply {}

/// Reply to `GetTime`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerTime {
    /// Milliseconds since the Unix epoch.
    pub time: f64,
}

// =============================================================================
// KEY DATA
// =============================================================================

/// One key to write, with its type tag.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SetUserDataRequest {
    pub key: String,
    pub value: Value,
    pub data_type: DataType,
}

impl SetUserDataRequest {
    /// Build a write from a typed value.
    #[must_use]
    pub fn new(key: impl Into<String>, value: &DataValue) -> Self {
        let (value, data_type) = value.to_wire();
        Self { key: key.into(), value, data_type }
    }
}

/// Body for `SetUserKeys`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct UserDataRequestList {
    pub values: Vec<SetUserDataRequest>,
}

/// Reply to key writes.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SetDataReply {
    pub updated_at: f64,
}

/// Body for `GetUserKey`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct KeyRequest {
    pub key: String,
}

/// Body for `GetUserKeys`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct KeysRequest {
    pub keys: Vec<String>,
    pub since: f64,
}

/// Body for `GetAllUserKeys`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct AllKeysRequest {
    pub since: f64,
}

/// A stored key as returned by the server.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DataItemReply {
    pub id: String,
    pub key: String,
    pub value: Value,
    pub data_type: DataType,
    pub created: f64,
    pub modified: f64,
    pub deleted: bool,
}

impl DataItemReply {
    /// Typed view of the stored value.
    ///
    /// # Errors
    ///
    /// Returns an error when the value does not match its tag.
    pub fn typed_value(&self) -> Result<DataValue, ValueError> {
        DataValue::from_wire(self.value.clone(), self.data_type)
    }
}

/// Keyed set of stored values.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UserDataReply {
    pub values: HashMap<String, DataItemReply>,
}

/// Body for `GetDataKey`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GlobalKeyRequest {
    pub id: String,
    pub key: String,
}

/// Body for `GetDataKeys`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct GlobalKeysRequest {
    pub id: String,
    pub keys: Vec<String>,
    pub since: f64,
    pub include_deleted: bool,
}

/// Body for `GetAllDataKeys`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct AllGlobalKeysRequest {
    pub id: String,
    pub since: f64,
    pub include_deleted: bool,
}

/// Body for `GetKeyDataRecord`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct KeyDataRecordRequest {
    pub id: String,
}

/// Metadata for a global key-data record.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KeyDataInfo {
    pub id: String,
    pub record_type: String,
    pub owner: String,
    pub parent: Option<String>,
    pub version: f64,
    pub created: f64,
    pub modified: f64,
}

/// Body for `SetDataKeys`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SetGlobalDataRequest {
    pub id: String,
    pub values: Vec<SetUserDataRequest>,
}

// =============================================================================
// TRANSIENT VALUES
// =============================================================================

/// Body for `SetTransientValue`. Values live only as long as the resident.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SetTransientValueRequest {
    pub resident_id: String,
    pub key: String,
    pub value: Value,
}

/// Body for `SetTransientValues`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SetTransientValuesRequest {
    pub resident_id: String,
    pub values: HashMap<String, Value>,
}

/// Body for `GetTransientValue`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GetTransientValueRequest {
    pub resident_id: String,
    pub key: String,
}

/// Body for `GetTransientValues`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct GetTransientValuesRequest {
    pub resident_id: String,
    pub keys: Vec<String>,
}

/// Body for `getAllTransientValues`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct GetAllTransientValuesRequest {
    pub resident_id: String,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransientDataItemReply {
    pub value: Value,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransientDataItemsReply {
    pub values: HashMap<String, Value>,
}

// =============================================================================
// CHANNELS & MESSAGES
// =============================================================================

/// Body for `JoinChannel` and `GetChannelInfo`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct JoinChannelRequest {
    pub channel_id: String,
    pub resident_id: Option<String>,
    pub values: Option<HashMap<String, Value>>,
}

/// Body for `LeaveChannel`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct LeaveChannelRequest {
    pub channel_id: String,
    pub resident_id: Option<String>,
    pub final_values: Option<HashMap<String, Value>>,
}

/// One member of a channel.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelMemberInfo {
    pub resident_id: String,
    pub values: HashMap<String, Value>,
}

/// Channel state returned by `GetChannelInfo`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelInfo {
    pub channel_id: String,
    pub values: HashMap<String, Value>,
    pub members: HashMap<String, ChannelMemberInfo>,
}

/// Body for `SendClientMessage`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SendUserMessageRequest {
    pub to: String,
    pub message_type: String,
    pub message: String,
    pub guaranteed: bool,
}
