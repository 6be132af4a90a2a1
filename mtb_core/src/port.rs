//! Typed input and output ports.
//!
//! Ports are shallow handles: cloning a `PortOut` or `PortIn` yields another
//! handle to the same endpoint. A component keeps its ports as (serde-skipped)
//! fields and registers them in [`Component::declare`](crate::Component::declare);
//! wiring code clones them out of the component to connect them.
//!
//! ```text
//!   PortOut<T> ──send(v)──► PortIn<T> ──► receiver action (owner, v)
//!        │                     ▲
//!        └── latest (cached) ──┘ replayed once on late connect
//! ```

use crate::action::Action;
use crate::error::ModelError;
use serde::Serialize;
use serde_json::Value;
use std::cell::{OnceCell, RefCell};
use std::fmt;
use std::marker::PhantomData;
use std::rc::Rc;
use tracing::debug;

/// Direction of a port, as seen from its owner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PortDirection {
    In,
    Out,
}

/// Snapshot of a port's metadata.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PortInfo {
    pub name: String,
    pub type_name: String,
    pub direction: PortDirection,

    /// Labels (`Owner.port`) of the endpoints on the other side
    pub connections: Vec<String>,

    /// Only meaningful for output ports
    pub cached: bool,

    /// Latest value of a cached output port, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latest: Option<Value>,
}

/// Type-erased view of a port, held by [`ComponentInfo`](crate::ComponentInfo).
pub trait PortMeta {
    fn name(&self) -> &str;

    fn direction(&self) -> PortDirection;

    fn info(&self) -> Result<PortInfo, ModelError>;

    /// Records the owning component's display name.
    ///
    /// A port belongs to one component; claiming it again fails.
    fn set_owner(&self, owner: &str) -> Result<(), ModelError>;
}

/// Last path segment of a type name, generics kept.
///
/// `alloc::string::String` becomes `String`, `core::option::Option<i32>`
/// becomes `Option<i32>`.
pub fn short_type_name<T: ?Sized>() -> String {
    let full = std::any::type_name::<T>();
    let mut out = String::with_capacity(full.len());
    let mut segment = String::new();

    for ch in full.chars() {
        match ch {
            '<' | '>' | ',' | ' ' | '(' | ')' | '[' | ']' | ';' | '&' => {
                out.push_str(segment.rsplit("::").next().unwrap_or(&segment));
                segment.clear();
                out.push(ch);
            }
            _ => segment.push(ch),
        }
    }
    out.push_str(segment.rsplit("::").next().unwrap_or(&segment));
    out
}

fn label(owner: &OnceCell<String>, name: &str) -> String {
    match owner.get() {
        Some(owner) => format!("{}.{}", owner, name),
        None => name.to_string(),
    }
}

fn claim(cell: &OnceCell<String>, name: &str, owner: &str) -> Result<(), ModelError> {
    if cell.get().is_some() {
        return Err(ModelError::modeling(format!(
            "Port {} is already registered, cannot register it on {}",
            label(cell, name),
            owner
        )));
    }
    cell.get_or_init(|| owner.to_string());
    Ok(())
}

struct Receiver {
    action: Action,
}

struct PortInInner {
    name: String,
    owner: OnceCell<String>,
    receiver: RefCell<Option<Receiver>>,
    sources: RefCell<Vec<String>>,
}

/// Inbound endpoint carrying values of type `T`.
///
/// Before it can be connected, exactly one receiver action must be bound to
/// it via [`Declarations::receiver`](crate::Declarations::receiver).
pub struct PortIn<T> {
    inner: Rc<PortInInner>,
    _marker: PhantomData<fn(T)>,
}

impl<T> Clone for PortIn<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            _marker: PhantomData,
        }
    }
}

impl<T: Serialize + Clone + 'static> PortIn<T> {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            inner: Rc::new(PortInInner {
                name: name.into(),
                owner: OnceCell::new(),
                receiver: RefCell::new(None),
                sources: RefCell::new(Vec::new()),
            }),
            _marker: PhantomData,
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// `Owner.port`, once the owning component is built.
    pub fn label(&self) -> String {
        label(&self.inner.owner, &self.inner.name)
    }

    /// Returns true if a receiver action is bound.
    pub fn has_receiver(&self) -> bool {
        self.inner.receiver.borrow().is_some()
    }

    /// Name of the bound receiver action.
    pub fn receiver_name(&self) -> Option<String> {
        self.inner
            .receiver
            .borrow()
            .as_ref()
            .map(|r| r.action.name().to_string())
    }

    /// Returns true if at least one output port feeds this port.
    pub fn is_connected(&self) -> bool {
        !self.inner.sources.borrow().is_empty()
    }

    /// Connects `source` to this port.
    ///
    /// Same operation as [`PortOut::connect_to`].
    pub fn connect(&self, source: &PortOut<T>) -> Result<(), ModelError> {
        source.connect_to(self)
    }

    pub(crate) fn bind(&self, action: Action) -> Result<(), ModelError> {
        let mut receiver = self.inner.receiver.borrow_mut();
        if let Some(existing) = receiver.as_ref() {
            return Err(ModelError::modeling(format!(
                "Multiple receivers for input port {}: {} is already bound, cannot bind {}",
                self.label(),
                existing.action.name(),
                action.name()
            )));
        }
        *receiver = Some(Receiver { action });
        Ok(())
    }

    fn receiver_action(&self) -> Result<Action, ModelError> {
        self.inner
            .receiver
            .borrow()
            .as_ref()
            .map(|r| r.action.clone())
            .ok_or_else(|| {
                ModelError::modeling(format!(
                    "Input port {} has no receiver. Did you forget to declare one?",
                    self.label()
                ))
            })
    }

    fn receive(&self, value: &T) -> Result<(), ModelError> {
        let action = self.receiver_action()?;
        let value = serde_json::to_value(value)?;
        action.invoke(vec![value])
    }
}

impl<T: Serialize + Clone + 'static> PortMeta for PortIn<T> {
    fn name(&self) -> &str {
        &self.inner.name
    }

    fn direction(&self) -> PortDirection {
        PortDirection::In
    }

    fn info(&self) -> Result<PortInfo, ModelError> {
        Ok(PortInfo {
            name: self.inner.name.clone(),
            type_name: short_type_name::<T>(),
            direction: PortDirection::In,
            connections: self.inner.sources.borrow().clone(),
            cached: false,
            latest: None,
        })
    }

    fn set_owner(&self, owner: &str) -> Result<(), ModelError> {
        claim(&self.inner.owner, &self.inner.name, owner)
    }
}

impl<T> fmt::Debug for PortIn<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PortIn")
            .field("name", &self.inner.name)
            .field("owner", &self.inner.owner.get())
            .field("sources", &self.inner.sources.borrow())
            .finish()
    }
}

struct PortOutInner<T> {
    name: String,
    owner: OnceCell<String>,
    cached: bool,
    latest: RefCell<Option<T>>,
    receivers: RefCell<Vec<PortIn<T>>>,
}

/// Outbound endpoint carrying values of type `T`.
pub struct PortOut<T> {
    inner: Rc<PortOutInner<T>>,
}

impl<T> Clone for PortOut<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T: Serialize + Clone + 'static> PortOut<T> {
    /// Creates a cached output port.
    ///
    /// A cached port remembers the last value sent and delivers it once to
    /// any input connected afterwards.
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_cache(name, true)
    }

    /// Creates an output port that only delivers values sent after connection.
    pub fn uncached(name: impl Into<String>) -> Self {
        Self::with_cache(name, false)
    }

    fn with_cache(name: impl Into<String>, cached: bool) -> Self {
        Self {
            inner: Rc::new(PortOutInner {
                name: name.into(),
                owner: OnceCell::new(),
                cached,
                latest: RefCell::new(None),
                receivers: RefCell::new(Vec::new()),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn label(&self) -> String {
        label(&self.inner.owner, &self.inner.name)
    }

    pub fn is_cached(&self) -> bool {
        self.inner.cached
    }

    /// Most recent value sent through a cached port.
    pub fn latest_value(&self) -> Option<T> {
        self.inner.latest.borrow().clone()
    }

    /// Number of connected input ports.
    pub fn receiver_count(&self) -> usize {
        self.inner.receivers.borrow().len()
    }

    /// Connects this port to `target`.
    ///
    /// Fails if `target` has no receiver. On success the receiver action is
    /// marked connected and, for a cached port that has already sent a value,
    /// that value is delivered to `target` once. If that delivery fails the
    /// connection is undone before the error is returned.
    pub fn connect_to(&self, target: &PortIn<T>) -> Result<(), ModelError> {
        let action = target.receiver_action()?;
        let was_connected = action.is_connected();
        let source = self.label();

        debug!("connect {} -> {}", source, target.label());
        self.inner.receivers.borrow_mut().push(target.clone());
        target.inner.sources.borrow_mut().push(source.clone());
        action.set_connected(true);

        let replay = if self.inner.cached {
            self.inner.latest.borrow().clone()
        } else {
            None
        };
        if let Some(value) = replay {
            debug!("replay cached {} -> {}", source, target.label());
            if let Err(e) = target.receive(&value) {
                self.disconnect(target, &source);
                action.set_connected(was_connected);
                return Err(e);
            }
        }
        Ok(())
    }

    fn disconnect(&self, target: &PortIn<T>, source: &str) {
        let mut receivers = self.inner.receivers.borrow_mut();
        if let Some(pos) = receivers
            .iter()
            .rposition(|r| Rc::ptr_eq(&r.inner, &target.inner))
        {
            receivers.remove(pos);
        }
        let mut sources = target.inner.sources.borrow_mut();
        if let Some(pos) = sources.iter().rposition(|s| s == source) {
            sources.remove(pos);
        }
    }

    /// Sends `value` to every connected input, in connection order.
    ///
    /// Delivery is synchronous and stops at the first receiver error.
    pub fn send(&self, value: T) -> Result<(), ModelError> {
        debug!("send {} to {} receiver(s)", self.label(), self.receiver_count());
        if self.inner.cached {
            *self.inner.latest.borrow_mut() = Some(value.clone());
        }

        // Receivers may connect further ports while handling the value
        let receivers = self.inner.receivers.borrow().clone();
        for receiver in &receivers {
            receiver.receive(&value)?;
        }
        Ok(())
    }
}

impl<T: Serialize + Clone + 'static> PortMeta for PortOut<T> {
    fn name(&self) -> &str {
        &self.inner.name
    }

    fn direction(&self) -> PortDirection {
        PortDirection::Out
    }

    fn info(&self) -> Result<PortInfo, ModelError> {
        let latest = match self.inner.latest.borrow().as_ref() {
            Some(value) => Some(serde_json::to_value(value)?),
            None => None,
        };
        Ok(PortInfo {
            name: self.inner.name.clone(),
            type_name: short_type_name::<T>(),
            direction: PortDirection::Out,
            connections: self
                .inner
                .receivers
                .borrow()
                .iter()
                .map(PortIn::label)
                .collect(),
            cached: self.inner.cached,
            latest,
        })
    }

    fn set_owner(&self, owner: &str) -> Result<(), ModelError> {
        claim(&self.inner.owner, &self.inner.name, owner)
    }
}

impl<T> fmt::Debug for PortOut<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PortOut")
            .field("name", &self.inner.name)
            .field("owner", &self.inner.owner.get())
            .field("cached", &self.inner.cached)
            .field("receivers", &self.inner.receivers.borrow().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_type_name_strips_paths() {
        assert_eq!(short_type_name::<String>(), "String");
        assert_eq!(short_type_name::<Option<String>>(), "Option<String>");
        assert_eq!(short_type_name::<i32>(), "i32");
        assert_eq!(short_type_name::<Vec<(u8, String)>>(), "Vec<(u8, String)>");
    }

    #[test]
    fn test_connect_without_receiver_is_modeling_error() {
        let out: PortOut<i32> = PortOut::new("d_out");
        let input: PortIn<i32> = PortIn::new("d_in");

        let err = out.connect_to(&input).unwrap_err();
        assert!(err.is_modeling());
        assert!(err.to_string().contains("d_in"));
        assert_eq!(out.receiver_count(), 0);
        assert!(!input.is_connected());
    }

    #[test]
    fn test_cached_port_keeps_latest_value() {
        let out: PortOut<String> = PortOut::new("label");
        assert_eq!(out.latest_value(), None);

        out.send("a".to_string()).unwrap();
        out.send("b".to_string()).unwrap();
        assert_eq!(out.latest_value(), Some("b".to_string()));
    }

    #[test]
    fn test_uncached_port_keeps_nothing() {
        let out: PortOut<u8> = PortOut::uncached("pulse");
        out.send(1).unwrap();

        assert!(!out.is_cached());
        assert_eq!(out.latest_value(), None);
        assert_eq!(out.info().unwrap().latest, None);
    }

    #[test]
    fn test_port_labels_include_owner() {
        let out: PortOut<u8> = PortOut::new("level");
        assert_eq!(out.label(), "level");

        out.set_owner("Tank").unwrap();
        let err = out.set_owner("Other").unwrap_err();
        assert!(err.is_modeling());
        assert!(err.to_string().contains("Tank.level"));
        assert_eq!(out.label(), "Tank.level");
        assert_eq!(out.info().unwrap().type_name, "u8");
    }
}
