//! keypulse - key press classifier
//!
//! Watches raw key press and release transitions and recognises single,
//! double and long presses per key. Recognised presses are published as
//! short ON/OFF pulses on per-key topics, with discovery metadata
//! announced the first time a key is seen.
//!
//! ```
//! use keypulse::classifier::{ActionKind, Classifier, Thresholds};
//! use keypulse::scheduler::ManualScheduler;
//! use std::sync::{mpsc, Arc};
//!
//! let scheduler = Arc::new(ManualScheduler::new());
//! let (tx, rx) = mpsc::channel();
//! let classifier = Classifier::new(Thresholds::default(), scheduler.clone(), Arc::new(tx));
//!
//! let key = "A".into();
//! classifier.on_press(&key, scheduler.at_ms(0));
//! classifier.on_release(&key, scheduler.at_ms(50));
//! scheduler.advance_to(scheduler.at_ms(300));
//!
//! assert_eq!(rx.try_recv().map(|a| a.kind), Ok(ActionKind::Single));
//! ```

pub mod classifier;
pub mod config;
pub mod keyboard;
pub mod scheduler;
pub mod sink;
pub mod ui;

pub use config::Config;
