use std::sync::Arc;

use parking_lot::Mutex;

use super::task::Latch;
use super::Scheduler;

/// A one-shot broadcast that suspends scheduler tasks until it fires.
///
/// Once notified it stays notified: later calls to [`Notification::wait`] return
/// immediately.
#[derive(Clone)]
pub struct Notification {
	scheduler: Scheduler,
	state: Arc<Mutex<NotificationState>>,
}

#[derive(Default)]
struct NotificationState {
	notified: bool,
	waiters: Vec<Arc<Latch>>,
}

impl Notification {
	pub fn new(scheduler: &Scheduler) -> Self {
		Self {
			scheduler: scheduler.clone(),
			state: Arc::new(Mutex::new(NotificationState::default())),
		}
	}

	pub fn is_notified(&self) -> bool {
		self.state.lock().notified
	}

	/// Suspends the current task until [`Notification::notify`] is called.
	///
	/// Must be called from a task running on the scheduler this notification was
	/// created with.
	pub fn wait(&self) {
		let latch = {
			let mut state = self.state.lock();
			if state.notified {
				return;
			}

			let latch = Arc::new(Latch::default());
			state.waiters.push(latch.clone());
			latch
		};

		self.scheduler.suspend(&latch);
	}

	/// Marks the notification as fired and queues every current waiter to resume at
	/// normal priority.
	pub fn notify(&self) {
		let waiters = {
			let mut state = self.state.lock();
			state.notified = true;
			std::mem::take(&mut state.waiters)
		};

		if !waiters.is_empty() {
			tracing::trace!(waiters = waiters.len(), "notification fired");
		}

		for latch in waiters {
			self.scheduler.wake(latch);
		}
	}
}

impl std::fmt::Debug for Notification {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		let state = self.state.lock();
		f.debug_struct("Notification")
			.field("notified", &state.notified)
			.field("waiters", &state.waiters.len())
			.finish()
	}
}
