//! Address book: wallet address to public key
//!
//! Filled by successful logins. The mint flow needs the signer's public key
//! to build a direct-sign document.

use std::sync::Arc;

use tracing::debug;

use crate::error::Result;
use crate::storage::{KeySpace, Store};

pub struct AddressBook {
    store: Arc<dyn Store>,
    keys: KeySpace,
}

impl AddressBook {
    pub fn new(store: Arc<dyn Store>, keys: KeySpace) -> Self {
        Self { store, keys }
    }

    /// Record the key for `address` unless one is already known.
    /// Returns whether a new entry was written.
    pub async fn register_if_absent(&self, address: &str, pubkey: &str) -> Result<bool> {
        let added = self
            .store
            .hash_set_if_absent(&self.keys.addressbook(), address, pubkey)
            .await?;
        if added {
            debug!("Registered public key for {}", address);
        }
        Ok(added)
    }

    pub async fn pubkey(&self, address: &str) -> Result<Option<String>> {
        Ok(self
            .store
            .hash_get(&self.keys.addressbook(), address)
            .await?)
    }
}
