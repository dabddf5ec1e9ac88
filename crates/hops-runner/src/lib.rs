//! Sequence orchestration for hops
//!
//! The runner turns notify messages into call requests. Every sequence is
//! pinned to one automations hash on first sight, so every node handling it
//! evaluates the same automations even while their local files differ.
//!
//! # Architecture
//!
//! ```text
//!   files ──► AutomationsLoader ──► object store (hopsconf-<hash>)
//!                 ▲     │
//!  ReloadController     │ pinned automations
//!                 │     ▼
//! notify msg ──► Runner ──► request msgs / on done results
//!
//! Scheduler ──► schedule source events ──► notify
//! ```
//!
//! # Key Types
//!
//! - [`AutomationsLoader`] - local snapshot, pinning and remote resolution
//! - [`Runner`] - the [`hops_broker::SequenceHandler`] that dispatches calls
//! - [`Scheduler`] - cron schedules publishing source events
//! - [`ReloadController`] - file watcher driving tolerant reloads

mod clock;
mod error;
mod loader;
mod reload;
mod runner;
mod scheduler;

pub use clock::{Clock, FakeClock, SystemClock};
pub use error::{RunnerError, RunnerResult};
pub use loader::{object_key, AutomationsLoader, DEFAULT_CACHE_TTL};
pub use reload::{ReloadController, DEFAULT_DEBOUNCE};
pub use runner::{plan, Dispatch, Runner, PIPELINE_ERRORED, RUNNER_CONSUMER, RUNNER_MAX_DELIVER};
pub use scheduler::{fire, schedule_event, Scheduler, SCHEDULE_EVENT};
