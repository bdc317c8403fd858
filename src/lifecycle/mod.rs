//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Signals (signals.rs):
//!     armed first → SIGTERM/SIGINT or application halt → QuitReason
//!
//! Startup (startup.rs):
//!     spawn start() → first error or window elapsed → StartupOutcome
//!
//! Shutdown (shutdown.rs):
//!     every running thing registers a cleanup → executed in reverse
//!
//! Scoped resources (guard.rs, profiler.rs):
//!     acquire → release exactly once, even on early return or unwind
//! ```
//!
//! # Design Decisions
//! - Ordered startup: dependencies first, listeners last
//! - Ordered shutdown: exact reverse of what actually started
//! - A failed cleanup is logged; the rest of the plan still runs

pub mod guard;
pub mod profiler;
pub mod shutdown;
pub mod signals;
pub mod startup;

pub use guard::{Resource, ScopedResource};
pub use profiler::CpuProfiler;
pub use shutdown::{CleanupError, Shutdown, ShutdownListener, ShutdownPlan, ShutdownReport};
pub use signals::{HaltCondition, QuitReason, QuitTrigger, QuitWaiter, SignalError};
pub use startup::{race_start, StartupOutcome, StartupWindow, DEFAULT_STARTUP_WINDOW};
