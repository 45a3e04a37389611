use std::marker::PhantomData;

use super::{Loader, LoaderKey};

/// A [`Loader`] backed by a batch closure.
pub struct LoaderFn<F, K, V, E> {
	f: F,
	_marker: PhantomData<fn(&[K]) -> Vec<Result<V, E>>>,
}

pub fn loader_fn<F, K, V, E>(f: F) -> LoaderFn<F, K, V, E>
where
	F: Fn(&[K]) -> Vec<Result<V, E>>,
{
	LoaderFn { f, _marker: PhantomData }
}

impl<F, K, V, E> Loader for LoaderFn<F, K, V, E>
where
	F: Fn(&[K]) -> Vec<Result<V, E>> + Send + Sync + 'static,
	K: LoaderKey,
	V: Clone + Send + Sync + 'static,
	E: Clone + Send + Sync + 'static,
{
	type Error = E;
	type Key = K;
	type Value = V;

	fn load(&self, keys: &[K]) -> Vec<Result<V, E>> {
		(self.f)(keys)
	}
}

/// Turns a single key fetch into a batch by fetching each key in turn.
pub struct NaiveBatch<F, K, V, E> {
	f: F,
	_marker: PhantomData<fn(&K) -> Result<V, E>>,
}

impl<F, K, V, E> NaiveBatch<F, K, V, E>
where
	F: Fn(&K) -> Result<V, E>,
{
	pub fn new(f: F) -> Self {
		Self { f, _marker: PhantomData }
	}
}

impl<F, K, V, E> Loader for NaiveBatch<F, K, V, E>
where
	F: Fn(&K) -> Result<V, E> + Send + Sync + 'static,
	K: LoaderKey,
	V: Clone + Send + Sync + 'static,
	E: Clone + Send + Sync + 'static,
{
	type Error = E;
	type Key = K;
	type Value = V;

	fn load(&self, keys: &[K]) -> Vec<Result<V, E>> {
		keys.iter().map(&self.f).collect()
	}
}

/// Turns a single key fetch into a batch by fetching every key on its own thread.
///
/// Results are joined in key order. A panic on any thread is resumed on the
/// calling thread once all threads have been joined.
pub struct ParallelBatch<F, K, V, E> {
	f: F,
	_marker: PhantomData<fn(&K) -> Result<V, E>>,
}

impl<F, K, V, E> ParallelBatch<F, K, V, E>
where
	F: Fn(&K) -> Result<V, E>,
{
	pub fn new(f: F) -> Self {
		Self { f, _marker: PhantomData }
	}
}

impl<F, K, V, E> Loader for ParallelBatch<F, K, V, E>
where
	F: Fn(&K) -> Result<V, E> + Send + Sync + 'static,
	K: LoaderKey,
	V: Clone + Send + Sync + 'static,
	E: Clone + Send + Sync + 'static,
{
	type Error = E;
	type Key = K;
	type Value = V;

	fn load(&self, keys: &[K]) -> Vec<Result<V, E>> {
		let f = &self.f;

		let joined = std::thread::scope(|scope| {
			let handles = keys.iter().map(|key| scope.spawn(move || f(key))).collect::<Vec<_>>();
			handles.into_iter().map(|handle| handle.join()).collect::<Vec<_>>()
		});

		joined
			.into_iter()
			.map(|result| result.unwrap_or_else(|payload| std::panic::resume_unwind(payload)))
			.collect()
	}
}
