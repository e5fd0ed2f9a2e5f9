//! # TALLY Sync
//!
//! A cyclic barrier for a fixed party of threads, with one trip action that
//! runs exactly once per cohort, on the thread of the last arrival, before
//! anyone is released.
//!
//! ## Lifecycle
//!
//! ```text
//!   waiting ──(last arrival)──> tripping ──(action Ok)──> waiting (generation + 1)
//!      │                            │
//!      │ cancel / timeout / abort   │ action Err / panic
//!      ▼                            ▼
//!   broken  <───────────────────────┘   (terminal: every wait fails fast)
//! ```
//!
//! ## Example
//!
//! ```rust
//! use std::num::NonZeroUsize;
//! use std::sync::Arc;
//! use std::thread;
//! use tally_sync::CyclicBarrier;
//!
//! let parties = NonZeroUsize::new(3).unwrap();
//! let barrier = Arc::new(CyclicBarrier::new(parties, |generation: u64| {
//!     println!("cohort {generation} complete");
//!     Ok::<(), std::convert::Infallible>(())
//! }));
//!
//! let handles: Vec<_> = (0..3)
//!     .map(|_| {
//!         let barrier = Arc::clone(&barrier);
//!         thread::spawn(move || barrier.wait().map(|arrival| arrival.ordinal))
//!     })
//!     .collect();
//!
//! for handle in handles {
//!     assert!(handle.join().unwrap().is_ok());
//! }
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod action;
pub mod barrier;
pub mod cancel;
pub mod error;

pub use action::{NoAction, TripAction};
pub use barrier::{Arrival, CyclicBarrier};
pub use cancel::CancelHandle;
pub use error::{BarrierError, BarrierResult, BrokenCause};
