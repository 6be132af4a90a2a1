//! MTB Differential-Testing Harness
//!
//! Drives an oracle and a real implementation of the same capability set in
//! lock-step, and hosts the demo systems built on the component model.
//!
//! # Core Principle: Preconditions From the Oracle
//!
//! The driver never calls an operation the oracle does not enable. Anything
//! the real implementation then rejects is a genuine disagreement:
//!
//! ```text
//! ┌──────────────┐ intent ┌──────────────┐  call  ┌────────────────────┐
//! │ ChaCha8 RNG  │───────►│  AtmHarness  │───────►│  Proxy<dyn Atm>    │
//! │ (one seed)   │        │ precondition │        │  CallLog ◄─ record │
//! └──────────────┘        └──────────────┘        └──┬──────────────┬──┘
//!                                                    │              │
//!                                              ┌─────▼─────┐  ┌─────▼────┐
//!                                              │ AtmOracle │  │ RealAtm  │
//!                                              └───────────┘  └──────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use mtb_sim::{run_seeded, DriverConfig};
//!
//! let report = run_seeded(&DriverConfig::default().with_seed(7))?;
//! for line in report.rendered_calls() {
//!     println!("{}", line);
//! }
//! ```

pub mod atm;
mod driver;
mod exporter;
pub mod thermostat;

pub use atm::{Atm, AtmError, AtmOracle, AtmState, Card, MenuItem, RealAtm, MAX_PIN_TRIES};
pub use driver::{replay_calls, run_seeded, AtmHarness, DriverConfig, Intent, RunReport};
pub use exporter::LogExport;
pub use thermostat::Thermostat;
