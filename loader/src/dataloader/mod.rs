mod batch;
mod key;
mod types;

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use parking_lot::RwLock;

pub use self::batch::{loader_fn, LoaderFn, NaiveBatch, ParallelBatch};
pub use self::key::LoaderKey;
pub use self::types::{LoadError, LoadResult};
use self::types::{DataLoaderState, MapKey};
use crate::config::DataLoaderConfig;
use crate::scheduler::{Notification, Scheduler};

/// The batch function behind a [`DataLoader`].
///
/// `load` receives a non-empty list of distinct keys and must return one result
/// per key, in the same order. A failure for a single key is returned as an
/// `Err` in its slot; it is cached like any other result and never retried.
pub trait Loader: Send + Sync + 'static {
	type Key: LoaderKey;
	type Value: Clone + Send + Sync + 'static;
	type Error: Clone + Send + Sync + 'static;

	fn load(&self, keys: &[Self::Key]) -> Vec<Result<Self::Value, Self::Error>>;
}

/// A cache that deduplicates and batches fetches from a [`Loader`].
///
/// Every distinct key is fetched at most once and cached until it is cleared.
///
/// With a [`Scheduler`] attached, loads issued by scheduler tasks are collected
/// and fetched together by a single low priority task, and the loading tasks
/// suspend until that fetch completes. All loads must then be issued from tasks
/// of that scheduler.
///
/// Without a scheduler, a miss is fetched immediately on the calling thread and
/// the loader can be shared between threads freely.
pub struct DataLoader<L: Loader> {
	inner: Arc<DataLoaderInner<L>>,
}

struct DataLoaderInner<L: Loader> {
	name: String,
	loader: L,
	scheduler: Option<Scheduler>,
	state: RwLock<DataLoaderState<L>>,
}

impl<L: Loader> Clone for DataLoader<L> {
	fn clone(&self) -> Self {
		Self {
			inner: self.inner.clone(),
		}
	}
}

impl<L: Loader + Default> Default for DataLoader<L> {
	fn default() -> Self {
		Self::new(L::default())
	}
}

impl<L: Loader> DataLoader<L> {
	/// Creates a loader that fetches synchronously on the calling thread.
	pub fn new(loader: L) -> Self {
		Self::with_config(DataLoaderConfig::default(), None, loader)
	}

	/// Creates a loader that batches fetches through `scheduler`.
	pub fn with_scheduler(scheduler: &Scheduler, loader: L) -> Self {
		Self::with_config(DataLoaderConfig::default(), Some(scheduler), loader)
	}

	pub fn with_config(config: DataLoaderConfig, scheduler: Option<&Scheduler>, loader: L) -> Self {
		Self {
			inner: Arc::new(DataLoaderInner {
				name: config.name.unwrap_or_else(|| std::any::type_name::<L>().to_string()),
				loader,
				scheduler: scheduler.cloned(),
				state: RwLock::new(DataLoaderState::default()),
			}),
		}
	}

	pub fn name(&self) -> &str {
		&self.inner.name
	}

	pub fn load(&self, key: L::Key) -> LoadResult<L> {
		self.load_many(std::iter::once(key))
			.pop()
			.unwrap_or(Err(LoadError::MissingResult))
	}

	/// Loads every key, returning results in the same order as the keys.
	#[tracing::instrument(skip_all, fields(name = self.inner.name.as_str()))]
	pub fn load_many(&self, keys: impl IntoIterator<Item = L::Key>) -> Vec<LoadResult<L>> {
		let keys = keys.into_iter().collect::<Vec<_>>();
		let map_keys = keys.iter().map(LoaderKey::map_key).collect::<Vec<_>>();
		let mut values = keys.iter().map(|_| None).collect::<Vec<Option<LoadResult<L>>>>();

		// Optimistic probe under the shared lock.
		let mut missing = Vec::new();
		{
			let state = self.inner.state.read();
			for (idx, map_key) in map_keys.iter().enumerate() {
				match state.cache.get(map_key) {
					Some(value) => values[idx] = Some(value.clone()),
					None => missing.push(idx),
				}
			}
		}

		if !missing.is_empty() {
			// The re-probe is required: a fetch cycle may have filled some of these keys
			// since the shared lock was released, and registering them again would fetch
			// them twice.
			let mut guard = self.inner.state.write();
			let state = &mut *guard;

			missing.retain(|&idx| match state.cache.get(&map_keys[idx]) {
				Some(value) => {
					values[idx] = Some(value.clone());
					false
				}
				None => {
					state.pending.insert(map_keys[idx].clone(), keys[idx].clone());
					true
				}
			});

			if !missing.is_empty() {
				match &self.inner.scheduler {
					Some(scheduler) => {
						let fetch_done = self.inner.schedule_fetch(scheduler, state);
						drop(guard);
						fetch_done.wait();
					}
					None => {
						self.inner.fetch_pending(state);
						drop(guard);
					}
				}

				let state = self.inner.state.read();
				for idx in missing {
					values[idx] = state.cache.get(&map_keys[idx]).cloned();
				}
			}
		}

		values
			.into_iter()
			.map(|value| {
				value.unwrap_or_else(|| {
					tracing::warn!("key was cleared before its fetched value was read");
					Err(LoadError::MissingResult)
				})
			})
			.collect()
	}

	/// Caches `value` for `key` unless the key is already cached.
	///
	/// Clear the key first to replace an existing value.
	pub fn prime(&self, key: &L::Key, value: LoadResult<L>) {
		self.inner.state.write().cache.entry(key.map_key()).or_insert(value);
	}

	pub fn clear(&self, key: &L::Key) {
		self.inner.state.write().cache.remove(&key.map_key());
	}

	pub fn clear_all(&self) {
		self.inner.state.write().cache.clear();
	}

	pub fn len(&self) -> usize {
		self.inner.state.read().cache.len()
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}
}

impl<L: Loader> DataLoaderInner<L> {
	/// Returns the notification of the queued fetch cycle, queueing one if none is
	/// in flight.
	fn schedule_fetch(self: &Arc<Self>, scheduler: &Scheduler, state: &mut DataLoaderState<L>) -> Notification {
		if let Some(fetch_done) = &state.fetch_done {
			return fetch_done.clone();
		}

		tracing::trace!(name = self.name.as_str(), pending = state.pending.len(), "scheduling fetch");

		let fetch_done = Notification::new(scheduler);
		state.fetch_done = Some(fetch_done.clone());

		scheduler.spawn_low({
			let inner = self.clone();
			let fetch_done = fetch_done.clone();
			move || {
				inner.fetch_pending(&mut inner.state.write());
				fetch_done.notify();
			}
		});

		fetch_done
	}

	/// Runs one fetch cycle over the pending keys.
	fn fetch_pending(&self, state: &mut DataLoaderState<L>) {
		state.fetch_done = None;

		let (map_keys, keys): (Vec<MapKey<L>>, Vec<L::Key>) = std::mem::take(&mut state.pending)
			.into_keys()
			.into_iter()
			.filter(|(map_key, _)| !state.cache.contains_key(map_key))
			.unzip();

		if keys.is_empty() {
			return;
		}

		tracing::debug!(name = self.name.as_str(), keys = keys.len(), "fetching batch");

		let (results, fallback) = match std::panic::catch_unwind(AssertUnwindSafe(|| self.loader.load(&keys))) {
			Ok(results) => {
				if results.len() != keys.len() {
					tracing::warn!(
						name = self.name.as_str(),
						expected = keys.len(),
						got = results.len(),
						"batch loader returned the wrong number of results"
					);
				}

				(results, LoadError::MissingResult)
			}
			Err(_) => {
				tracing::error!(name = self.name.as_str(), keys = keys.len(), "batch loader panicked");
				(Vec::new(), LoadError::Panic)
			}
		};

		let mut results = results.into_iter();
		for map_key in map_keys {
			let value = match results.next() {
				Some(result) => result.map_err(LoadError::Batch),
				None => Err(fallback.clone()),
			};

			state.cache.entry(map_key).or_insert(value);
		}
	}
}
