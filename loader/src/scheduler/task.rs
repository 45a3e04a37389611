use std::sync::Arc;

use parking_lot::{Condvar, Mutex};

/// The lane a task is queued on.
///
/// Low priority tasks are only dispatched once the normal lane is empty.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Priority {
	#[default]
	Normal,
	Low,
}

pub(super) enum Work {
	/// User work handed to `spawn`. Once it returns the dispatch loop moves on to
	/// the next task on the same thread.
	Spawned(Box<dyn FnOnce() + Send>),
	/// Releases one suspended waiter. The thread that runs it stops dispatching,
	/// since the released waiter carries its own dispatch loop.
	Wake(Arc<Latch>),
}

pub(super) struct Task {
	pub priority: Priority,
	pub work: Work,
}

impl Task {
	pub fn spawned<F>(priority: Priority, f: F) -> Self
	where
		F: FnOnce() + Send + 'static,
	{
		Self {
			priority,
			work: Work::Spawned(Box::new(f)),
		}
	}

	pub fn wake(latch: Arc<Latch>) -> Self {
		Self {
			priority: Priority::Normal,
			work: Work::Wake(latch),
		}
	}
}

/// A one-shot release for a single parked thread.
#[derive(Default)]
pub(crate) struct Latch {
	released: Mutex<bool>,
	cond: Condvar,
}

impl Latch {
	pub fn release(&self) {
		let mut released = self.released.lock();
		*released = true;
		self.cond.notify_one();
	}

	pub fn wait(&self) {
		let mut released = self.released.lock();
		while !*released {
			self.cond.wait(&mut released);
		}
	}
}

#[cfg(test)]
mod tests {
	use std::sync::Arc;

	use super::Latch;

	#[test]
	fn test_latch_release_before_wait() {
		let latch = Latch::default();
		latch.release();
		latch.wait();
	}

	#[test]
	fn test_latch_release_from_other_thread() {
		let latch = Arc::new(Latch::default());

		let handle = std::thread::spawn({
			let latch = latch.clone();
			move || latch.release()
		});

		latch.wait();
		handle.join().unwrap();
	}
}
