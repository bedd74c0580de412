//! # Shutdown Management
//!
//! Traits and types for graceful shutdown of long-running components (the tick
//! ingest loop, the SMS event writer, reconciler loops). `spec.md` §5 requires
//! that shutdown flush the event-writer queue before broker sessions close;
//! components that own such a queue implement [`AsyncShutdown`], components that
//! can stop immediately implement [`SyncShutdown`].

use serde::{Deserialize, Serialize};
use std::future::Future;

/// Components that can shut down immediately, without awaiting anything.
pub trait SyncShutdown {
    type Result;
    fn shutdown(&mut self) -> Self::Result;
}

/// Components that must perform async work to shut down cleanly (flush a queue,
/// await in-flight broker calls, close a WebSocket session).
pub trait AsyncShutdown {
    type Result;
    fn shutdown(&mut self) -> impl Future<Output = Self::Result>;
}

/// Signal broadcast to trigger a coordinated shutdown of every component.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Deserialize, Serialize)]
pub struct Shutdown;
