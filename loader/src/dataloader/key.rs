use std::hash::Hash;
use std::sync::Arc;

/// A key that can be requested from a [`DataLoader`](super::DataLoader).
///
/// The loader addresses its cache with [`LoaderKey::map_key`] while the original
/// key is passed through to the batch loader. This lets a key carry extra context
/// that must not affect cache identity.
pub trait LoaderKey: Clone + Send + Sync + 'static {
	type MapKey: Eq + Hash + Clone + Send + Sync + 'static;

	fn map_key(&self) -> Self::MapKey;
}

macro_rules! impl_identity_key {
	($($ty:ty),* $(,)?) => {
		$(
			impl LoaderKey for $ty {
				type MapKey = Self;

				#[inline(always)]
				fn map_key(&self) -> Self::MapKey {
					self.clone()
				}
			}
		)*
	};
}

impl_identity_key!(
	String,
	&'static str,
	Vec<u8>,
	bool,
	char,
	u8,
	u16,
	u32,
	u64,
	u128,
	usize,
	i8,
	i16,
	i32,
	i64,
	i128,
	isize,
);

impl<T: LoaderKey> LoaderKey for Arc<T> {
	type MapKey = T::MapKey;

	#[inline(always)]
	fn map_key(&self) -> Self::MapKey {
		(**self).map_key()
	}
}

impl<A: LoaderKey, B: LoaderKey> LoaderKey for (A, B) {
	type MapKey = (A::MapKey, B::MapKey);

	#[inline(always)]
	fn map_key(&self) -> Self::MapKey {
		(self.0.map_key(), self.1.map_key())
	}
}
