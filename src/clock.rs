//! Time source for polling loops and settle delays
//!
//! Every wait in the fetch pass goes through [`Clock`] so tests can run the
//! full workflow without touching the wall clock.

use std::time::{Duration, Instant};

#[allow(async_fn_in_trait)]
pub trait Clock {
    fn now(&self) -> Instant;

    async fn sleep(&self, duration: Duration);
}

impl<C: Clock + ?Sized> Clock for &C {
    fn now(&self) -> Instant {
        (**self).now()
    }

    async fn sleep(&self, duration: Duration) {
        (**self).sleep(duration).await
    }
}

/// Real clock backed by tokio's timer
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioClock;

impl Clock for TokioClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

#[cfg(test)]
pub use fake::FakeClock;
