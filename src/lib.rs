//! Host loop for a cycle-stepped CHIP-8 VM.
//!
//! ## Design
//!
//! * the VM is behind a binding trait; the host never owns VM memory, only
//!   handles into it which go stale on every reset/load
//! * fixed-rate host tick (60Hz by default), driven from the main loop
//!   rather than a timer thread; at most one timer alive at a time
//! * presentation always happens on the host tick:
//!    - cooperative: tick → one VM cycle → read video → present
//!    - offloaded: VM runs on its own thread posting frame-ready messages;
//!      tick → drain messages → present the newest
//! * keys go through a swappable symbol → keypad mapping; reset is wired
//!   straight to the VM
//! * nothing touches the VM until it has reported ready
//!
//! Model
//!
//! main
//!  |-- config, logging
//!  |-- catalog → background fetch → RomFetched
//!  |-- VM (local or worker) → Ready
//!  `-- app::run
//!       |-- input.poll_events(until next tick)
//!       |-- host.dispatch(event)   // gate, then session
//!       `-- host.run_due(now)      // scheduler → backend.tick → presenter → display
pub mod app;
pub mod backend;
pub mod catalog;
pub mod config;
pub mod display;
pub mod error;
pub mod input;
pub mod keymap;
pub mod machine;
pub mod memory;
pub mod presenter;
pub mod scheduler;
pub mod session;
pub mod vm;
pub mod worker;
