//! Free-running tick loops for the two domains.
//!
//! A domain is anything that implements [`DomainEngine`]: one `poll` is one
//! tick of that domain. [`spawn_domain`] gives an engine a thread of its own
//! so the two halves of a crossing run with no shared pacing at all.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use tracing::debug;

pub trait DomainEngine: Send {
    /// Runs one tick. Returns the amount of work performed; zero means idle.
    fn poll(&mut self) -> usize;

    fn name(&self) -> &'static str;

    /// Lets a spawned engine end its thread on its own.
    fn is_done(&self) -> bool {
        false
    }
}

/// Engine running on its own thread.
pub struct DomainHandle<E> {
    stop: Arc<AtomicBool>,
    join: JoinHandle<E>,
}

impl<E> DomainHandle<E> {
    /// Asks the thread to exit after its current tick.
    pub fn stop(&self) {
        self.stop.store(true, Ordering::Release);
    }

    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    /// Waits for the thread and hands the engine back.
    pub fn join(self) -> thread::Result<E> {
        self.join.join()
    }

    pub fn stop_and_join(self) -> thread::Result<E> {
        self.stop();
        self.join()
    }
}

/// Drives `engine` on a dedicated thread until it reports done or is stopped.
pub fn spawn_domain<E>(engine: E) -> std::io::Result<DomainHandle<E>>
where
    E: DomainEngine + 'static,
{
    let stop = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&stop);
    let name = engine.name();
    let join = thread::Builder::new()
        .name(format!("domain-{name}"))
        .spawn(move || {
            let mut engine = engine;
            let mut ticks = 0u64;
            while !flag.load(Ordering::Acquire) && !engine.is_done() {
                if engine.poll() == 0 {
                    thread::yield_now();
                }
                ticks += 1;
            }
            debug!(name, ticks, "domain thread exiting");
            engine
        })?;
    Ok(DomainHandle { stop, join })
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Countdown {
        remaining: usize,
    }

    impl DomainEngine for Countdown {
        fn poll(&mut self) -> usize {
            if self.remaining == 0 {
                return 0;
            }
            self.remaining -= 1;
            1
        }

        fn name(&self) -> &'static str {
            "countdown"
        }

        fn is_done(&self) -> bool {
            self.remaining == 0
        }
    }

    #[test]
    fn spawned_domain_finishes_and_returns_engine() {
        let handle = spawn_domain(Countdown { remaining: 1_000 }).expect("spawn domain");
        let engine = handle.join().expect("domain thread panicked");
        assert_eq!(engine.remaining, 0);
    }

    #[test]
    fn spawned_domain_honours_stop() {
        struct Forever;
        impl DomainEngine for Forever {
            fn poll(&mut self) -> usize {
                0
            }
            fn name(&self) -> &'static str {
                "forever"
            }
        }

        let handle = spawn_domain(Forever).expect("spawn domain");
        handle.stop_and_join().expect("domain thread panicked");
    }
}
