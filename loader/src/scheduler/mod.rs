mod notification;
mod task;
mod wait_group;

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::{Condvar, Mutex};

pub use self::notification::Notification;
pub use self::task::Priority;
use self::task::{Latch, Task, Work};
pub use self::wait_group::WaitGroup;
use crate::config::SchedulerConfig;

/// A cooperative executor where exactly one task runs application code at a time.
///
/// Use [`Scheduler::run`] to start a root task. The root task, and every task it
/// spawns, can spawn further tasks with [`Scheduler::spawn`] (normal priority) or
/// [`Scheduler::spawn_low`] (low priority). `run` returns once every spawned task
/// has finished.
///
/// Scheduling happens when the active task finishes or suspends on
/// [`Notification::wait`]. Low priority tasks are not dispatched while any normal
/// priority task is queued, and tasks of the same priority are dispatched last in,
/// first out. The [`DataLoader`](crate::dataloader::DataLoader) relies on this:
/// loads are registered at normal priority and the batched fetch runs at low
/// priority, so every load issued in a burst lands in the same batch.
///
/// `Notification::wait` is the only legal way for a task to block. Blocking on a
/// mutex, channel or thread join that another task is meant to release will
/// deadlock the scheduler, since nothing else runs while the blocked task is
/// active.
///
/// A task never moves between threads. Dispatching is a loop on a dispatch
/// thread; when a task suspends, a fresh thread takes over the loop so the call
/// stack does not grow with the number of suspensions. The thread calling
/// [`Scheduler::run`] only waits for the task tree to finish.
#[derive(Clone)]
pub struct Scheduler(Arc<SchedulerInner>);

struct SchedulerInner {
	config: SchedulerConfig,
	queues: Mutex<Queues>,
	progress: Mutex<Progress>,
	finished: Condvar,
	panic: Mutex<Option<Box<dyn Any + Send>>>,
	thread_id: AtomicU64,
}

#[derive(Default)]
struct Queues {
	// Both lanes are used as stacks.
	normal: Vec<Task>,
	low: Vec<Task>,
}

#[derive(Default)]
struct Progress {
	/// Spawned tasks that have not returned yet, suspended ones included.
	running: usize,
	/// A dispatch loop ran dry while tasks were still suspended. Nothing can
	/// resume them anymore.
	stalled: bool,
}

impl Queues {
	fn push(&mut self, task: Task) {
		match task.priority {
			Priority::Normal => self.normal.push(task),
			Priority::Low => self.low.push(task),
		}
	}

	fn pop(&mut self) -> Option<Task> {
		self.normal.pop().or_else(|| self.low.pop())
	}
}

impl Scheduler {
	fn new(config: SchedulerConfig) -> Self {
		Self(Arc::new(SchedulerInner {
			config,
			queues: Mutex::new(Queues::default()),
			progress: Mutex::new(Progress::default()),
			finished: Condvar::new(),
			panic: Mutex::new(None),
			thread_id: AtomicU64::new(0),
		}))
	}

	/// Runs `f` as the root task of a new scheduler and returns its output once the
	/// whole task tree has finished.
	///
	/// If any task panicked, the first panic is resumed here once the remaining
	/// tasks have settled. Tasks left suspended because the panicking task never
	/// woke them are abandoned.
	pub fn run<F, R>(f: F) -> R
	where
		F: FnOnce(&Scheduler) -> R + Send + 'static,
		R: Send + 'static,
	{
		Self::run_with_config(SchedulerConfig::default(), f)
	}

	pub fn run_with_config<F, R>(config: SchedulerConfig, f: F) -> R
	where
		F: FnOnce(&Scheduler) -> R + Send + 'static,
		R: Send + 'static,
	{
		let scheduler = Self::new(config);
		let output = Arc::new(Mutex::new(None));

		scheduler.spawn({
			let scheduler = scheduler.clone();
			let output = output.clone();
			move || {
				let result = f(&scheduler);
				*output.lock() = Some(result);
			}
		});

		scheduler.start_dispatcher();
		scheduler.wait_finished();

		if let Some(payload) = scheduler.0.panic.lock().take() {
			std::panic::resume_unwind(payload);
		}

		let output = output.lock().take();
		match output {
			Some(output) => output,
			None => unreachable!("root task finished without producing an output"),
		}
	}

	/// Queues `f` at normal priority.
	///
	/// Must be called from a task running on this scheduler.
	pub fn spawn<F>(&self, f: F)
	where
		F: FnOnce() + Send + 'static,
	{
		self.spawn_with_priority(Priority::Normal, f);
	}

	/// Queues `f` at low priority.
	///
	/// Must be called from a task running on this scheduler.
	pub fn spawn_low<F>(&self, f: F)
	where
		F: FnOnce() + Send + 'static,
	{
		self.spawn_with_priority(Priority::Low, f);
	}

	pub fn spawn_with_priority<F>(&self, priority: Priority, f: F)
	where
		F: FnOnce() + Send + 'static,
	{
		self.0.progress.lock().running += 1;
		self.0.queues.lock().push(Task::spawned(priority, f));
	}

	/// Queues the release of a suspended waiter.
	pub(crate) fn wake(&self, latch: Arc<Latch>) {
		self.0.queues.lock().push(Task::wake(latch));
	}

	/// Parks the current thread until `latch` is released, handing the dispatch
	/// loop over to a fresh thread in the meantime.
	pub(crate) fn suspend(&self, latch: &Latch) {
		self.start_dispatcher();
		latch.wait();
	}

	/// Runs the dispatch loop on a new thread, or inline if no thread can be spawned.
	fn start_dispatcher(&self) {
		let id = self.0.thread_id.fetch_add(1, Ordering::Relaxed);

		let mut builder = std::thread::Builder::new().name(format!("{}-{}", self.0.config.thread_name, id));
		if let Some(stack_size) = self.0.config.stack_size {
			builder = builder.stack_size(stack_size);
		}

		let scheduler = self.clone();
		match builder.spawn(move || scheduler.dispatch()) {
			Ok(_) => {
				tracing::trace!(thread = id, "dispatching on a new thread");
			}
			Err(err) => {
				tracing::warn!(%err, "failed to spawn dispatch thread, dispatching inline");
				self.dispatch();
			}
		}
	}

	fn dispatch(&self) {
		loop {
			let task = self.0.queues.lock().pop();
			let Some(task) = task else {
				let mut progress = self.0.progress.lock();
				if progress.running > 0 {
					tracing::warn!(
						running = progress.running,
						"scheduler is idle but tasks are suspended with nothing left to wake them"
					);
					progress.stalled = true;
					self.0.finished.notify_all();
				}

				return;
			};

			match task.work {
				Work::Spawned(f) => {
					tracing::trace!(priority = ?task.priority, "dispatching task");

					if let Err(payload) = std::panic::catch_unwind(AssertUnwindSafe(f)) {
						tracing::error!("task panicked");
						self.0.panic.lock().get_or_insert(payload);
					}

					self.task_finished();
				}
				Work::Wake(latch) => {
					latch.release();
					return;
				}
			}
		}
	}

	fn task_finished(&self) {
		let mut progress = self.0.progress.lock();
		progress.running -= 1;
		if progress.running == 0 {
			self.0.finished.notify_all();
		}
	}

	/// Blocks until every task has returned, or until the scheduler stalled after a
	/// task panicked.
	fn wait_finished(&self) {
		let mut progress = self.0.progress.lock();
		while progress.running > 0 && !(progress.stalled && self.0.panic.lock().is_some()) {
			self.0.finished.wait(&mut progress);
		}
	}
}

impl std::fmt::Debug for Scheduler {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		let queues = self.0.queues.lock();
		f.debug_struct("Scheduler")
			.field("normal", &queues.normal.len())
			.field("low", &queues.low.len())
			.field("running", &self.0.progress.lock().running)
			.finish()
	}
}
