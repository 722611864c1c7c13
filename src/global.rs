//! Process-wide client, for applications that only need one.
//!
//! The global client is an ordinary [`Client`] stored in process-scoped state. [`init`] creates
//! it and [`close`] tears it down.
use std::{
    collections::HashMap,
    sync::{Arc, RwLock},
};

use chrono::{DateTime, Utc};

use crate::{CacheSnapshot, Client, ClientConfig, Error, Flag, Result};

static CLIENT: RwLock<Option<Arc<Client>>> = RwLock::new(None);

fn current() -> Option<Arc<Client>> {
    // A poisoned lock means a writer panicked while swapping the client; the slot still holds a
    // valid value.
    CLIENT
        .read()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
        .clone()
}

fn set(client: Option<Arc<Client>>) -> Option<Arc<Client>> {
    let mut slot = CLIENT
        .write()
        .unwrap_or_else(|poisoned| poisoned.into_inner());
    std::mem::replace(&mut slot, client)
}

/// Create the global client.
///
/// A previously initialized global client is closed and replaced. If creation fails, the previous
/// client is left in place. Once the new client is installed, errors from closing the previous
/// one are logged and `init` succeeds.
///
/// ```no_run
/// # use flagsync::{ClientConfig, FileRetriever};
/// flagsync::init(ClientConfig::new(FileRetriever::new("flags.yaml")))?;
/// let flag = flagsync::get_flag("test-flag");
/// flagsync::close()?;
/// # Ok::<(), flagsync::Error>(())
/// ```
pub fn init(config: ClientConfig) -> Result<()> {
    let client = Arc::new(Client::new(config)?);
    if let Some(previous) = set(Some(client)) {
        if let Err(err) = previous.close() {
            log::warn!(target: "flagsync", "error while closing the previous global client: {}", err);
        }
    }
    Ok(())
}

/// Close the global client. Does nothing if it was not initialized.
pub fn close() -> Result<()> {
    match set(None) {
        Some(client) => client.close(),
        None => Ok(()),
    }
}

/// The global client, if initialized.
pub fn client() -> Option<Arc<Client>> {
    current()
}

/// See [`Client::get_flag`]. Returns `None` if the global client is not initialized.
pub fn get_flag(name: &str) -> Option<Flag> {
    current()?.get_flag(name)
}

/// See [`Client::all_flags`].
pub fn all_flags() -> Result<Arc<CacheSnapshot>> {
    Ok(current().ok_or(Error::NotInitialized)?.all_flags())
}

/// See [`Client::get_flags_from_cache`].
pub fn get_flags_from_cache() -> Result<HashMap<String, Flag>> {
    current()
        .ok_or(Error::NotInitialized)?
        .get_flags_from_cache()
}

/// See [`Client::cache_refresh_date`]. Returns `None` if the global client is not initialized.
pub fn cache_refresh_date() -> Option<DateTime<Utc>> {
    current()?.cache_refresh_date()
}
