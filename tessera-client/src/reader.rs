//! Lazy, caching reader over one stored blob.
//!
//! Every retrieval is deduplicated per reader instance: concurrent callers
//! share one in-flight future per cache key, resolved values stay cached,
//! failed loads are evicted so the next caller retries.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use futures::{
    future::{select_ok, BoxFuture, Shared},
    FutureExt,
};
use tessera_core::{
    params::{source_symbols, SourceSymbols},
    quilt::QuiltError,
    BlobId, BlobMetadataWithId,
};

use crate::{error::ClientError, quilt::QuiltReader, read::BlobStore};

type SharedLoad<T> = Shared<BoxFuture<'static, Result<T, Arc<ClientError>>>>;

enum SliverEntry {
    Pending(SharedLoad<Arc<Vec<u8>>>),
    Ready(Arc<Vec<u8>>),
}

struct ReaderState {
    full_blob: Option<SharedLoad<Arc<Vec<u8>>>>,
    fully_loading: bool,
    metadata: Option<SharedLoad<Arc<BlobMetadataWithId>>>,
    slivers: HashMap<u16, SliverEntry>,
}

pub struct BlobReader<S> {
    store: Arc<S>,
    blob_id: BlobId,
    state: Mutex<ReaderState>,
}

impl<S: BlobStore + 'static> BlobReader<S> {
    pub fn new(store: Arc<S>, blob_id: BlobId) -> Self {
        Self {
            store,
            blob_id,
            state: Mutex::new(ReaderState {
                full_blob: None,
                fully_loading: false,
                metadata: None,
                slivers: HashMap::new(),
            }),
        }
    }

    #[must_use]
    pub const fn blob_id(&self) -> &BlobId {
        &self.blob_id
    }

    #[must_use]
    pub fn quilt_reader(&self) -> QuiltReader<'_, S> {
        QuiltReader::new(self)
    }

    /// Whether a full-blob load has been started (and not failed since).
    pub(crate) fn full_blob_in_flight(&self) -> bool {
        self.state.lock().expect("reader state mutex").fully_loading
    }

    /// The whole blob, fetched once and shared with every caller.
    pub async fn get_bytes(&self) -> Result<Arc<Vec<u8>>, ClientError> {
        let future = {
            let mut state = self.state.lock().expect("reader state mutex");
            if let Some(in_flight) = &state.full_blob {
                in_flight.clone()
            } else {
                let store = Arc::clone(&self.store);
                let blob_id = self.blob_id;
                let load = async move {
                    store
                        .read_blob(&blob_id)
                        .await
                        .map(Arc::new)
                        .map_err(Arc::new)
                }
                .boxed()
                .shared();
                state.full_blob = Some(load.clone());
                state.fully_loading = true;
                load
            }
        };

        let result = future.await;
        if result.is_err() {
            let mut state = self.state.lock().expect("reader state mutex");
            state.full_blob = None;
            state.fully_loading = false;
        }
        result.map_err(ClientError::Shared)
    }

    pub async fn get_metadata(&self) -> Result<Arc<BlobMetadataWithId>, ClientError> {
        let future = {
            let mut state = self.state.lock().expect("reader state mutex");
            if let Some(in_flight) = &state.metadata {
                in_flight.clone()
            } else {
                let store = Arc::clone(&self.store);
                let blob_id = self.blob_id;
                let load = async move {
                    store
                        .get_metadata(&blob_id)
                        .await
                        .map(Arc::new)
                        .map_err(Arc::new)
                }
                .boxed()
                .shared();
                state.metadata = Some(load.clone());
                load
            }
        };

        let result = future.await;
        if result.is_err() {
            self.state.lock().expect("reader state mutex").metadata = None;
        }
        result.map_err(ClientError::Shared)
    }

    /// The bytes of one secondary sliver (one quilt column), cached by
    /// index.
    pub async fn get_secondary_sliver(&self, index: u16) -> Result<Arc<Vec<u8>>, ClientError> {
        let future = {
            let mut state = self.state.lock().expect("reader state mutex");
            match state.slivers.get(&index) {
                Some(SliverEntry::Ready(bytes)) => return Ok(Arc::clone(bytes)),
                Some(SliverEntry::Pending(in_flight)) => in_flight.clone(),
                None => {
                    let store = Arc::clone(&self.store);
                    let blob_id = self.blob_id;
                    let load = async move {
                        store
                            .get_secondary_sliver(&blob_id, index)
                            .await
                            .map(|sliver| Arc::new(sliver.symbols.data))
                            .map_err(Arc::new)
                    }
                    .boxed()
                    .shared();
                    state.slivers.insert(index, SliverEntry::Pending(load.clone()));
                    load
                }
            }
        };

        let result = future.await;
        let mut state = self.state.lock().expect("reader state mutex");
        match &result {
            Ok(bytes) => {
                state
                    .slivers
                    .insert(index, SliverEntry::Ready(Arc::clone(bytes)));
            }
            Err(_) => {
                state.slivers.remove(&index);
            }
        }
        drop(state);
        result.map_err(ClientError::Shared)
    }

    /// Column size of the blob's symbol grid, in preference order: the
    /// length of any already resolved or in-flight secondary sliver, then
    /// the loaded full blob, then fresh metadata.
    pub async fn column_size(&self) -> Result<u64, ClientError> {
        let (ready, pending) = {
            let state = self.state.lock().expect("reader state mutex");
            let mut ready = None;
            let mut pending = Vec::new();
            for entry in state.slivers.values() {
                match entry {
                    SliverEntry::Ready(bytes) => {
                        ready = Some(bytes.len() as u64);
                        break;
                    }
                    SliverEntry::Pending(in_flight) => pending.push(in_flight.clone()),
                }
            }
            (ready, pending)
        };
        if let Some(column_size) = ready {
            return Ok(column_size);
        }
        if !pending.is_empty() {
            if let Ok((bytes, _)) = select_ok(pending).await {
                return Ok(bytes.len() as u64);
            }
        }

        let full_blob = {
            let state = self.state.lock().expect("reader state mutex");
            state.full_blob.clone()
        };
        if let Some(in_flight) = full_blob {
            if let Ok(bytes) = in_flight.await {
                return grid_geometry(bytes.len() as u64, self.store.n_shards())
                    .map(|(_, _, column_size)| column_size);
            }
        }

        let metadata = self.get_metadata().await?;
        grid_geometry(metadata.metadata.unencoded_length(), self.store.n_shards())
            .map(|(_, _, column_size)| column_size)
    }

    pub(crate) fn store(&self) -> &Arc<S> {
        &self.store
    }
}

/// Recover `(symbol_size, row_size, column_size)` from a grid-aligned blob
/// length. Quilts are always stored grid-aligned, so a remainder means the
/// blob is not a quilt.
pub(crate) fn grid_geometry(
    blob_length: u64,
    n_shards: u16,
) -> Result<(u64, u64, u64), ClientError> {
    let SourceSymbols { primary, secondary } = source_symbols(n_shards);
    let total_symbols = u64::from(primary) * u64::from(secondary);
    if blob_length == 0 || blob_length % total_symbols != 0 {
        return Err(ClientError::Quilt(QuiltError::Malformed(
            "blob length is not a whole symbol grid",
        )));
    }
    let symbol_size = blob_length / total_symbols;
    Ok((
        symbol_size,
        symbol_size * u64::from(secondary),
        symbol_size * u64::from(primary),
    ))
}
