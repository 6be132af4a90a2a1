//! MTB Differential-Testing Proxy
//!
//! This crate lets a test driver treat several independent implementations of
//! the same capability set as one addressable unit. A single scripted or
//! randomized call sequence exercises all of them identically, while every
//! call is recorded for post-mortem diagnosis.
//!
//! # Core Principle: One Log, Many Implementations
//!
//! ```text
//! ┌──────────────┐   op(args)   ┌───────────────────────────────┐
//! │ Test driver  │─────────────►│        Proxy<dyn Trait>        │
//! └──────────────┘              │  1. CallLog::record(Call)      │
//!                               │  2. forward to each target     │
//!                               └──────┬──────────────┬──────────┘
//!                                      │              │
//!                                 ┌────▼────┐    ┌────▼────┐
//!                                 │ Oracle  │    │  Real   │   ...
//!                                 └─────────┘    └─────────┘
//! ```
//!
//! Any failing run is reproducible by replaying the same log against fresh
//! instances of the same implementations (see [`replay`]).
//!
//! # Example
//!
//! ```ignore
//! use mtb_proxy::{capability_set, CallLog, Proxy, Shared};
//!
//! capability_set! {
//!     pub trait Counter {
//!         type Error = CounterError;
//!
//!         fn add(&mut self, amount: u32);
//!     }
//! }
//!
//! let log = CallLog::new();
//! let oracle: Shared<dyn Counter> = Rc::new(RefCell::new(OracleCounter::default()));
//! let real: Shared<dyn Counter> = Rc::new(RefCell::new(RealCounter::default()));
//! let mut proxy: Proxy<dyn Counter> = Proxy::new(vec![oracle, real], log.clone())?;
//!
//! proxy.add(3)?;
//! assert_eq!(log.render(), vec!["add(3)"]);
//! ```

mod call;
mod capability;
mod error;
mod proxy;

pub use call::{ArgCursor, Call, CallArg, CallLog};
pub use capability::{
    CapabilityDescriptor, CapabilitySet, Lifecycle, OperationDescriptor, ParamDescriptor,
};
pub use error::ProxyError;
pub use proxy::{replay, Proxy, Shared};
