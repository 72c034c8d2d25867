//! Local mirror of a server-side key/value record.
//!
//! A `KeyData` holds the keys of one record and tracks which of them have been
//! changed locally. `refresh` pulls only what changed since the newest
//! modification seen so far, including deletions. Writes are only allowed for
//! the record's owner.

use std::collections::{BTreeMap, HashMap};

use crate::client::Client;
use crate::error::ClientError;
use crate::messages::{DataItemReply, KeyDataInfo, SetUserDataRequest, UserDataReply};
use crate::value::{DataValue, ValueError};

#[derive(Debug, thiserror::Error)]
pub enum KeyDataError {
    #[error("not signed in")]
    NotSignedIn,
    #[error("record {0} is read-only for this user")]
    ReadOnly(String),
    #[error(transparent)]
    Client(#[from] ClientError),
}

#[derive(Debug)]
pub struct KeyData {
    client: Client,
    info: KeyDataInfo,
    keys: HashMap<String, DataItemReply>,
    dirty: BTreeMap<String, SetUserDataRequest>,
    most_recent: f64,
}

impl KeyData {
    /// Look up the record `id`, or the signed-in user's own record.
    ///
    /// # Errors
    ///
    /// `NotSignedIn` when `id` is omitted without a session; otherwise the
    /// call's error.
    pub async fn find(client: &Client, id: Option<&str>) -> Result<Self, KeyDataError> {
        let id = match id {
            Some(id) => id.to_owned(),
            None => client.user_info().ok_or(KeyDataError::NotSignedIn)?.user_id,
        };
        let info = client.get_key_data_record(&id).await?;
        Ok(Self::new(client.clone(), info))
    }

    /// `find` followed by loading every key.
    ///
    /// # Errors
    ///
    /// See [`KeyData::find`] and [`KeyData::load_all`].
    pub async fn load(client: &Client, id: Option<&str>) -> Result<Self, KeyDataError> {
        let mut data = Self::find(client, id).await?;
        data.load_all().await?;
        Ok(data)
    }

    pub(crate) fn new(client: Client, info: KeyDataInfo) -> Self {
        Self { client, info, keys: HashMap::new(), dirty: BTreeMap::new(), most_recent: 0.0 }
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.info.id
    }

    #[must_use]
    pub fn record_type(&self) -> &str {
        &self.info.record_type
    }

    #[must_use]
    pub fn owner(&self) -> &str {
        &self.info.owner
    }

    #[must_use]
    pub fn parent(&self) -> Option<&str> {
        self.info.parent.as_deref()
    }

    #[must_use]
    pub fn version(&self) -> f64 {
        self.info.version
    }

    /// Newest modification time seen, in ms since the Unix epoch.
    #[must_use]
    pub fn most_recent(&self) -> f64 {
        self.most_recent
    }

    #[must_use]
    pub fn is_dirty(&self) -> bool {
        !self.dirty.is_empty()
    }

    /// Replace local state with every key of the record.
    ///
    /// # Errors
    ///
    /// Returns the call's error; local state is left untouched.
    pub async fn load_all(&mut self) -> Result<(), ClientError> {
        let reply = self.client.get_all_data_keys(&self.info.id, 0.0, false).await?;
        self.apply_load(reply);
        Ok(())
    }

    /// Merge changes since the newest modification seen.
    ///
    /// # Errors
    ///
    /// Returns the call's error; local state is left untouched.
    pub async fn refresh(&mut self) -> Result<(), ClientError> {
        let reply = self.client.get_all_data_keys(&self.info.id, self.most_recent, true).await?;
        self.apply_refresh(reply);
        Ok(())
    }

    pub(crate) fn apply_load(&mut self, reply: UserDataReply) {
        self.keys.clear();
        self.dirty.clear();
        for item in reply.values.into_values() {
            self.most_recent = self.most_recent.max(item.modified);
            self.keys.insert(item.key.clone(), item);
        }
    }

    pub(crate) fn apply_refresh(&mut self, reply: UserDataReply) {
        for item in reply.values.into_values() {
            self.most_recent = self.most_recent.max(item.modified);
            if item.deleted {
                self.keys.remove(&item.key);
            } else {
                self.keys.insert(item.key.clone(), item);
            }
        }
    }

    /// Typed value of `key`, if present.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<Result<DataValue, ValueError>> {
        self.keys.get(key).map(DataItemReply::typed_value)
    }

    /// Raw stored item for `key`.
    #[must_use]
    pub fn item(&self, key: &str) -> Option<&DataItemReply> {
        self.keys.get(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.keys.keys().map(String::as_str)
    }

    /// Change `key` locally and mark it for the next `save`. Setting a key to
    /// its current value does nothing.
    ///
    /// # Errors
    ///
    /// `ReadOnly` unless the signed-in user owns the record.
    pub fn set(&mut self, key: &str, value: impl Into<DataValue>) -> Result<(), KeyDataError> {
        self.check_writable()?;
        let request = SetUserDataRequest::new(key, &value.into());

        if let Some(item) = self.keys.get_mut(key) {
            if item.value == request.value && item.data_type == request.data_type {
                return Ok(());
            }
            item.value = request.value.clone();
            item.data_type = request.data_type;
        } else {
            self.keys.insert(
                key.to_owned(),
                DataItemReply {
                    id: self.info.id.clone(),
                    key: key.to_owned(),
                    value: request.value.clone(),
                    data_type: request.data_type,
                    ..DataItemReply::default()
                },
            );
        }
        self.dirty.insert(key.to_owned(), request);
        Ok(())
    }

    /// Write every locally changed key. Nothing to write is a no-op.
    ///
    /// # Errors
    ///
    /// `ReadOnly` unless the signed-in user owns the record, or the call's
    /// error (changes stay marked for the next attempt).
    pub async fn save(&mut self) -> Result<(), KeyDataError> {
        self.check_writable()?;
        if self.dirty.is_empty() {
            return Ok(());
        }
        let values: Vec<SetUserDataRequest> = self.dirty.values().cloned().collect();
        self.client.set_data_keys(&self.info.id, values).await?;
        self.dirty.clear();
        Ok(())
    }

    fn check_writable(&self) -> Result<(), KeyDataError> {
        match self.client.user_info() {
            Some(user) if user.user_id == self.info.owner => Ok(()),
            _ => Err(KeyDataError::ReadOnly(self.info.id.clone())),
        }
    }
}

#[cfg(test)]
#[path = "key_data_test.rs"]
mod tests;
