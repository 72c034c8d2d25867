//! Typed wrappers for the server API.
//!
//! Each method is a thin layer over [`Client::call`] with the API name and
//! record types fixed. Sign-in style calls also adopt the returned session.

use std::collections::HashMap;

use serde_json::Value;

use crate::client::Client;
use crate::messages::{
    AllGlobalKeysRequest, AllKeysRequest, ChannelInfo, CreateAccount, CreateAnonymousAccount, DataItemReply,
    EmptyClientReply, EmptyClientRequest, GetAllTransientValuesRequest, GetTransientValueRequest,
    GetTransientValuesRequest, GlobalKeyRequest, GlobalKeysRequest, JoinChannelRequest, KeyDataInfo,
    KeyDataRecordRequest, KeyRequest, KeysRequest, LeaveChannelRequest, SendUserMessageRequest, SetDataReply,
    SetGlobalDataRequest, SetTransientValueRequest, SetTransientValuesRequest, SetUserDataRequest, SignIn,
    SignInReply, TransientDataItemReply, TransientDataItemsReply, UserDataReply, UserDataRequestList,
    ValidateSessionRequest,
};
use crate::pending::Pending;
use crate::value::DataValue;

// =============================================================================
// ACCOUNTS & SESSIONS
// =============================================================================

impl Client {
    pub fn sign_in(&self, request: &SignIn) -> Pending<SignInReply> {
        self.call_signing_in("SignIn", request)
    }

    /// Sign in with a username or email and a password.
    pub fn sign_in_with(&self, username: Option<&str>, email: Option<&str>, password: &str) -> Pending<SignInReply> {
        self.sign_in(&SignIn {
            username: username.map(str::to_owned),
            email: email.map(str::to_owned),
            password: Some(password.to_owned()),
        })
    }

    pub fn validate_session(&self, session_id: &str) -> Pending<SignInReply> {
        self.call_signing_in("ValidateSession", &ValidateSessionRequest { session_id: session_id.to_owned() })
    }

    pub fn create_anonymous_account(&self, request: &CreateAnonymousAccount) -> Pending<SignInReply> {
        self.call_signing_in("CreateAnonymousAccount", request)
    }

    pub fn create_account(&self, request: &CreateAccount) -> Pending<SignInReply> {
        self.call_signing_in("CreateAccount", request)
    }

    /// Attach credentials to the signed-in anonymous account.
    pub fn convert_to_full_account(&self, request: &CreateAccount) -> Pending<SignInReply> {
        self.call_signing_in("ConvertToFullAccount", request)
    }

    /// Refresh the signed-in user's info.
    pub fn get_user_info(&self) -> Pending<SignInReply> {
        self.call_signing_in("GetUserInfo", &EmptyClientRequest {})
    }
}

// =============================================================================
// USER KEYS
// =============================================================================

impl Client {
    pub fn set_user_key(&self, key: &str, value: &DataValue) -> Pending<SetDataReply> {
        self.call("SetUserKey", &SetUserDataRequest::new(key, value))
    }

    pub fn set_user_keys(&self, values: Vec<SetUserDataRequest>) -> Pending<SetDataReply> {
        self.call("SetUserKeys", &UserDataRequestList { values })
    }

    pub fn get_user_key(&self, key: &str) -> Pending<DataItemReply> {
        self.call("GetUserKey", &KeyRequest { key: key.to_owned() })
    }

    /// Keys modified after `since` (ms since the Unix epoch; 0 for all).
    pub fn get_user_keys(&self, keys: Vec<String>, since: f64) -> Pending<UserDataReply> {
        self.call("GetUserKeys", &KeysRequest { keys, since })
    }

    pub fn get_all_user_keys(&self, since: f64) -> Pending<UserDataReply> {
        self.call("GetAllUserKeys", &AllKeysRequest { since })
    }
}

// =============================================================================
// KEY DATA RECORDS
// =============================================================================

impl Client {
    pub fn get_data_key(&self, id: &str, key: &str) -> Pending<DataItemReply> {
        self.call("GetDataKey", &GlobalKeyRequest { id: id.to_owned(), key: key.to_owned() })
    }

    pub fn get_data_keys(&self, id: &str, keys: Vec<String>, since: f64, include_deleted: bool) -> Pending<UserDataReply> {
        self.call("GetDataKeys", &GlobalKeysRequest { id: id.to_owned(), keys, since, include_deleted })
    }

    pub fn get_all_data_keys(&self, id: &str, since: f64, include_deleted: bool) -> Pending<UserDataReply> {
        self.call("GetAllDataKeys", &AllGlobalKeysRequest { id: id.to_owned(), since, include_deleted })
    }

    pub fn get_key_data_record(&self, id: &str) -> Pending<KeyDataInfo> {
        self.call("GetKeyDataRecord", &KeyDataRecordRequest { id: id.to_owned() })
    }

    pub fn set_data_keys(&self, id: &str, values: Vec<SetUserDataRequest>) -> Pending<SetDataReply> {
        self.call("SetDataKeys", &SetGlobalDataRequest { id: id.to_owned(), values })
    }
}

// =============================================================================
// TRANSIENT VALUES
// =============================================================================

impl Client {
    /// Set a value on one of the caller's channel residents.
    pub fn set_transient_value(&self, resident_id: &str, key: &str, value: Value) -> Pending<EmptyClientReply> {
        self.call(
            "SetTransientValue",
            &SetTransientValueRequest { resident_id: resident_id.to_owned(), key: key.to_owned(), value },
        )
    }

    pub fn set_transient_values(&self, resident_id: &str, values: HashMap<String, Value>) -> Pending<EmptyClientReply> {
        self.call("SetTransientValues", &SetTransientValuesRequest { resident_id: resident_id.to_owned(), values })
    }

    pub fn get_transient_value(&self, resident_id: &str, key: &str) -> Pending<TransientDataItemReply> {
        self.call(
            "GetTransientValue",
            &GetTransientValueRequest { resident_id: resident_id.to_owned(), key: key.to_owned() },
        )
    }

    pub fn get_transient_values(&self, resident_id: &str, keys: Vec<String>) -> Pending<TransientDataItemsReply> {
        self.call("GetTransientValues", &GetTransientValuesRequest { resident_id: resident_id.to_owned(), keys })
    }

    /// The server registers this API with a lowercase leading letter.
    pub fn get_all_transient_values(&self, resident_id: &str) -> Pending<TransientDataItemsReply> {
        self.call("getAllTransientValues", &GetAllTransientValuesRequest { resident_id: resident_id.to_owned() })
    }
}

// =============================================================================
// CHANNELS & MESSAGES
// =============================================================================

impl Client {
    pub fn join_channel(&self, request: &JoinChannelRequest) -> Pending<EmptyClientReply> {
        self.call("JoinChannel", request)
    }

    pub fn leave_channel(&self, request: &LeaveChannelRequest) -> Pending<EmptyClientReply> {
        self.call("LeaveChannel", request)
    }

    pub fn get_channel_info(&self, request: &JoinChannelRequest) -> Pending<ChannelInfo> {
        self.call("GetChannelInfo", request)
    }

    /// Send a message to a user or channel; delivered as a push of
    /// `message_type`.
    pub fn send_client_message(&self, to: &str, message_type: &str, message: &Value) -> Pending<EmptyClientReply> {
        self.call(
            "SendClientMessage",
            &SendUserMessageRequest {
                to: to.to_owned(),
                message_type: message_type.to_owned(),
                message: message.to_string(),
                guaranteed: false,
            },
        )
    }

    /// Join a channel, optionally as a named resident with initial values.
    pub fn join_channel_as(
        &self,
        channel_id: &str,
        resident_id: Option<&str>,
        values: Option<HashMap<String, Value>>,
    ) -> Pending<EmptyClientReply> {
        self.join_channel(&JoinChannelRequest {
            channel_id: channel_id.to_owned(),
            resident_id: resident_id.map(str::to_owned),
            values,
        })
    }
}

#[cfg(test)]
#[path = "api_test.rs"]
mod tests;
