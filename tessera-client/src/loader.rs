//! Deduplicating loader for on-chain objects.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use blake2::{
    digest::{Update, VariableOutput},
    Blake2bVar,
};
use futures::{future::BoxFuture, future::Shared, FutureExt};
use serde::{de::DeserializeOwned, Serialize};
use tessera_core::{wire, ObjectId};

use crate::{chain::ChainAdapter, error::ClientError};

type SharedLoad = Shared<BoxFuture<'static, Result<Arc<Vec<u8>>, Arc<ClientError>>>>;

/// Loads chain objects, deduplicating concurrent fetches of the same id.
///
/// A resolved load stays cached as its shared future; a failed load is
/// evicted so the next caller retries instead of replaying the error
/// forever.
pub struct ObjectLoader<C> {
    chain: Arc<C>,
    max_batch_size: usize,
    pending: Mutex<HashMap<ObjectId, SharedLoad>>,
}

impl<C: ChainAdapter + 'static> ObjectLoader<C> {
    pub fn new(chain: Arc<C>, max_batch_size: usize) -> Self {
        Self {
            chain,
            max_batch_size,
            pending: Mutex::new(HashMap::new()),
        }
    }

    pub async fn load(&self, id: ObjectId) -> Result<Arc<Vec<u8>>, ClientError> {
        let future = {
            let mut pending = self.pending.lock().expect("loader state mutex");
            if let Some(in_flight) = pending.get(&id) {
                in_flight.clone()
            } else {
                let chain = Arc::clone(&self.chain);
                let load = async move {
                    let mut objects = chain
                        .get_objects(&[id])
                        .await
                        .map_err(|error| Arc::new(ClientError::from(error)))?;
                    objects
                        .pop()
                        .flatten()
                        .map(Arc::new)
                        .ok_or_else(|| Arc::new(ClientError::ObjectNotFound(id)))
                }
                .boxed()
                .shared();
                pending.insert(id, load.clone());
                load
            }
        };

        let result = future.await;
        if result.is_err() {
            self.pending.lock().expect("loader state mutex").remove(&id);
        }
        result.map_err(ClientError::Shared)
    }

    /// Fetch many objects, chunked into chain calls of at most the
    /// configured batch size. Unknown ids come back as `None`.
    pub async fn load_many(
        &self,
        ids: &[ObjectId],
    ) -> Result<Vec<Option<Arc<Vec<u8>>>>, ClientError> {
        let mut objects = Vec::with_capacity(ids.len());
        for chunk in ids.chunks(self.max_batch_size.max(1)) {
            let batch = self.chain.get_objects(chunk).await?;
            objects.extend(batch.into_iter().map(|object| object.map(Arc::new)));
        }
        Ok(objects)
    }

    /// Load an object and decode it from the canonical wire format.
    pub async fn load_as<T: DeserializeOwned>(&self, id: ObjectId) -> Result<T, ClientError> {
        let bytes = self.load(id).await?;
        Ok(wire::deserialize(&bytes)?)
    }

    /// Load the dynamic field of `parent` addressed by `key`.
    pub async fn load_field<K: Serialize>(
        &self,
        parent: ObjectId,
        key: &K,
    ) -> Result<Arc<Vec<u8>>, ClientError> {
        self.load(derive_field_id(parent, key)?).await
    }
}

/// Dynamic-field ids are content-derived: blake2b-256 of the parent id
/// followed by the key's wire bytes.
pub fn derive_field_id<K: Serialize>(parent: ObjectId, key: &K) -> Result<ObjectId, ClientError> {
    let key_bytes = wire::serialize(key)?;
    let mut hasher = Blake2bVar::new(32).expect("32 is a valid blake2b output size");
    hasher.update(&parent.0);
    hasher.update(&key_bytes);
    let mut id = [0u8; 32];
    hasher
        .finalize_variable(&mut id)
        .expect("output buffer matches the requested size");
    Ok(ObjectId(id))
}
