use std::cell::Cell;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

// Source of time for the completion poll loop
pub trait Clock {
	fn now(&self) -> Instant;
	fn sleep(&self, d:Duration);
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
	fn now(&self) -> Instant { Instant::now() }
	fn sleep(&self, d:Duration) { thread::sleep(d) }
}

// A clock that only moves when slept on.  Lets the poll loop be driven without waiting in real time.
#[derive(Debug)]
pub struct ManualClock {
	now: Cell<Instant>,
	slept: Cell<Duration>,
}

impl ManualClock {
	pub fn new() -> Self { Self { now: Cell::new(Instant::now()), slept: Cell::new(Duration::from_secs(0)) } }

	pub fn advance(&self, d:Duration) { self.now.set(self.now.get() + d); }

	// Total time spent in `sleep`
	pub fn slept(&self) -> Duration { self.slept.get() }
}

impl Default for ManualClock {
	fn default() -> Self { Self::new() }
}

impl Clock for ManualClock {
	fn now(&self) -> Instant { self.now.get() }

	fn sleep(&self, d:Duration) {
		self.advance(d);
		self.slept.set(self.slept.get() + d);
	}
}

impl<C: Clock> Clock for &C {
	fn now(&self) -> Instant { (**self).now() }
	fn sleep(&self, d:Duration) { (**self).sleep(d) }
}

// Shared flag for stopping an acquisition that runs on another thread.  Checked between polls.
#[derive(Debug, Default, Clone)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
	pub fn new() -> Self { Self::default() }
	pub fn cancel(&self) { self.0.store(true, Ordering::SeqCst) }
	pub fn is_cancelled(&self) -> bool { self.0.load(Ordering::SeqCst) }
}
