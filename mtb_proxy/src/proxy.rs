//! The mirroring proxy and log replay.

use crate::call::{Call, CallLog};
use crate::capability::{CapabilitySet, Lifecycle};
use crate::error::ProxyError;
use std::cell::RefCell;
use std::rc::Rc;
use tracing::debug;

/// Shared handle to an implementation wrapped by a proxy.
///
/// The proxy only mediates calls; the driver keeps its own handles to inspect
/// implementation state (e.g. the oracle's current state) between calls.
pub type Shared<I> = Rc<RefCell<I>>;

/// Wraps several implementations of one capability set behind one handle.
///
/// Every mirrored operation is appended to the shared [`CallLog`] and then
/// forwarded, strictly in registration order, to every implementation.
/// Operations are fire-and-forget: the first implementation error stops the
/// fan-out and is returned to the caller unchanged.
pub struct Proxy<I: ?Sized> {
    /// Wrapped implementations, in forwarding order
    targets: Vec<Shared<I>>,

    /// Log shared with the driver
    log: CallLog,
}

impl<I: CapabilitySet + ?Sized> Proxy<I> {
    /// Creates a proxy over `targets`, recording into `log`.
    pub fn new(targets: Vec<Shared<I>>, log: CallLog) -> Result<Self, ProxyError> {
        let descriptor = I::descriptor();
        descriptor.validate()?;

        if targets.is_empty() {
            return Err(ProxyError::NoImplementations(descriptor.name.to_string()));
        }

        debug!(
            "Proxy for {} over {} implementation(s): {:?}",
            descriptor.name,
            targets.len(),
            descriptor.operation_names()
        );

        Ok(Self { targets, log })
    }
}

impl<I: ?Sized> Proxy<I> {
    /// Returns the shared call log.
    pub fn log(&self) -> &CallLog {
        &self.log
    }

    /// Returns the number of wrapped implementations.
    pub fn implementation_count(&self) -> usize {
        self.targets.len()
    }

    /// Records `call`, then runs `forward` on every implementation in order.
    ///
    /// Generated proxies call this for each operation; hand-written proxies
    /// can use it to mirror an operation the macro does not cover.
    pub fn mirror<E, F>(&self, call: Call, mut forward: F) -> Result<(), E>
    where
        E: From<ProxyError>,
        F: FnMut(&mut I) -> Result<(), E>,
    {
        debug!("mirror {}", call);
        let operation = call.name().to_string();
        self.log.record(call);

        for (index, target) in self.targets.iter().enumerate() {
            let mut target = target.try_borrow_mut().map_err(|_| ProxyError::Busy {
                operation: operation.clone(),
                index,
            })?;
            forward(&mut *target)?;
        }

        Ok(())
    }
}

impl<I: ?Sized> Lifecycle for Proxy<I> {}

/// Re-issues `calls` on `target`, in order.
///
/// Replaying a failing run's log against fresh implementations reproduces
/// the failure. Returns the number of calls applied.
pub fn replay<I>(calls: &[Call], target: &mut I) -> Result<usize, I::Error>
where
    I: CapabilitySet + ?Sized,
{
    for (applied, call) in calls.iter().enumerate() {
        debug!("replay #{} {}", applied, call);
        target.dispatch(call)?;
    }
    Ok(calls.len())
}
