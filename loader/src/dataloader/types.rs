use std::hash::Hash;

use fnv::{FnvHashMap, FnvHashSet};

use super::{Loader, LoaderKey};
use crate::scheduler::Notification;

#[derive(thiserror::Error, Debug, Clone, PartialEq, Copy, Eq, Hash)]
pub enum LoadError<E> {
	#[error("batch failed with: {0}")]
	Batch(E),
	#[error("missing result")]
	MissingResult,
	#[error("panic in batch loader")]
	Panic,
}

/// The cached outcome for a single key.
#[allow(type_alias_bounds)]
pub type LoadResult<L: Loader> = Result<L::Value, LoadError<L::Error>>;

#[allow(type_alias_bounds)]
pub(super) type MapKey<L: Loader> = <<L as Loader>::Key as LoaderKey>::MapKey;

pub(super) struct DataLoaderState<L: Loader> {
	pub cache: FnvHashMap<MapKey<L>, LoadResult<L>>,
	pub pending: PendingKeys<MapKey<L>, L::Key>,
	/// Set while a fetch cycle is queued on the scheduler.
	pub fetch_done: Option<Notification>,
}

impl<L: Loader> Default for DataLoaderState<L> {
	fn default() -> Self {
		Self {
			cache: FnvHashMap::default(),
			pending: PendingKeys::default(),
			fetch_done: None,
		}
	}
}

/// Keys waiting for the next fetch cycle, deduplicated by map key and kept in
/// registration order.
pub(super) struct PendingKeys<M, K> {
	seen: FnvHashSet<M>,
	keys: Vec<(M, K)>,
}

impl<M, K> Default for PendingKeys<M, K> {
	fn default() -> Self {
		Self {
			seen: FnvHashSet::default(),
			keys: Vec::new(),
		}
	}
}

impl<M: Eq + Hash + Clone, K> PendingKeys<M, K> {
	pub fn insert(&mut self, map_key: M, key: K) {
		if self.seen.insert(map_key.clone()) {
			self.keys.push((map_key, key));
		}
	}

	pub fn len(&self) -> usize {
		self.keys.len()
	}

	pub fn into_keys(self) -> Vec<(M, K)> {
		self.keys
	}
}
