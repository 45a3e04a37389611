use std::sync::Arc;

use parking_lot::Mutex;

use super::{Notification, Scheduler};

/// Waits for a number of scheduler tasks to complete, similar to Go's `sync.WaitGroup`.
///
/// The group fires its notification the first time the count drops to zero. It is
/// single use: once fired, [`WaitGroup::wait`] never suspends again.
#[derive(Clone)]
pub struct WaitGroup {
	count: Arc<Mutex<usize>>,
	notification: Notification,
}

impl WaitGroup {
	pub fn new(scheduler: &Scheduler) -> Self {
		Self {
			count: Arc::new(Mutex::new(0)),
			notification: Notification::new(scheduler),
		}
	}

	/// Adjusts the count by `delta`.
	///
	/// # Panics
	/// Panics if the count would go negative, which means `add` and `done` calls
	/// are mismatched.
	pub fn add(&self, delta: isize) {
		if delta > 0 && self.notification.is_notified() {
			tracing::warn!(delta, "WaitGroup reused after reaching zero, wait will not suspend");
		}

		let reached_zero = {
			let mut count = self.count.lock();
			let Some(next) = count.checked_add_signed(delta) else {
				drop(count);
				panic!("negative WaitGroup counter");
			};

			*count = next;
			next == 0 && delta != 0
		};

		if reached_zero {
			self.notification.notify();
		}
	}

	pub fn done(&self) {
		self.add(-1);
	}

	/// Suspends the current task until the count reaches zero.
	pub fn wait(&self) {
		if *self.count.lock() == 0 {
			return;
		}

		self.notification.wait();
	}

	pub fn count(&self) -> usize {
		*self.count.lock()
	}
}

#[cfg(test)]
mod tests {
	use std::sync::Arc;

	use parking_lot::Mutex;

	use crate::scheduler::{Scheduler, WaitGroup};

	#[test]
	fn test_wait_group_zero_returns_immediately() {
		Scheduler::run(|sch| {
			let wg = WaitGroup::new(sch);
			wg.wait();
			assert_eq!(wg.count(), 0);
		});
	}

	#[test]
	fn test_wait_group_waits_for_all() {
		let finished = Scheduler::run(|sch| {
			let wg = WaitGroup::new(sch);
			let finished = Arc::new(Mutex::new(0));

			for _ in 0..10 {
				wg.add(1);
				sch.spawn({
					let wg = wg.clone();
					let finished = finished.clone();
					move || {
						*finished.lock() += 1;
						wg.done();
					}
				});
			}

			wg.wait();
			assert_eq!(wg.count(), 0);
			let finished = *finished.lock();
			finished
		});

		assert_eq!(finished, 10);
	}

	#[test]
	fn test_wait_group_reaches_zero_before_wait() {
		Scheduler::run(|sch| {
			let wg = WaitGroup::new(sch);
			wg.add(2);
			wg.done();
			wg.done();
			wg.wait();
		});
	}

	#[test]
	fn test_wait_group_multiple_waiters() {
		let resumed = Scheduler::run(|sch| {
			let wg = WaitGroup::new(sch);
			let resumed = Arc::new(Mutex::new(0));
			wg.add(1);

			for _ in 0..3 {
				sch.spawn({
					let wg = wg.clone();
					let resumed = resumed.clone();
					move || {
						wg.wait();
						*resumed.lock() += 1;
					}
				});
			}

			sch.spawn_low({
				let wg = wg.clone();
				move || wg.done()
			});

			resumed
		});

		assert_eq!(*resumed.lock(), 3);
	}

	#[test]
	fn test_wait_group_add_negative_delta() {
		Scheduler::run(|sch| {
			let wg = WaitGroup::new(sch);
			wg.add(3);
			wg.add(-3);
			assert_eq!(wg.count(), 0);
			wg.wait();
		});
	}

	#[test]
	#[should_panic(expected = "negative WaitGroup counter")]
	fn test_wait_group_negative_panics() {
		Scheduler::run(|sch| {
			let wg = WaitGroup::new(sch);
			wg.add(1);
			wg.done();
			wg.done();
		});
	}

	#[test]
	fn test_wait_group_negative_in_task_surfaces_from_run() {
		let (tx, rx) = std::sync::mpsc::channel();

		std::thread::spawn(move || {
			let result = std::panic::catch_unwind(|| {
				Scheduler::run(|sch| {
					let wg = WaitGroup::new(sch);
					wg.add(2);
					sch.spawn({
						let wg = wg.clone();
						move || wg.add(-3)
					});
					wg.wait();
				})
			});

			let message = result
				.err()
				.and_then(|payload| payload.downcast_ref::<&str>().map(|message| message.to_string()));
			tx.send(message).ok();
		});

		let message = rx
			.recv_timeout(std::time::Duration::from_secs(5))
			.expect("run did not return after a task panicked");
		assert_eq!(message.as_deref(), Some("negative WaitGroup counter"));
	}

	#[test]
	fn test_wait_group_reuse_does_not_suspend() {
		Scheduler::run(|sch| {
			let wg = WaitGroup::new(sch);
			wg.add(1);
			wg.done();
			wg.wait();

			wg.add(1);
			assert_eq!(wg.count(), 1);
			// Already fired, so this returns without suspending.
			wg.wait();
		});
	}
}
