//! Capability sets: the named operations a proxy mirrors.
//!
//! A capability set is an ordinary trait. The [`capability_set!`] macro
//! declares such a trait and derives everything the proxy needs from the same
//! declaration:
//!
//! - the trait itself, every operation returning `Result<(), Error>`
//! - `impl CapabilitySet for dyn Trait` (descriptor + replay dispatch)
//! - `impl Trait for Proxy<dyn Trait>` (record, then forward to every target)
//!
//! Operations declared inside the macro are the proxyable actions. Hooks that
//! should not be mirrored belong in [`Lifecycle`] instead.

use crate::call::Call;
use crate::error::ProxyError;
use std::collections::HashSet;

/// A single parameter of a capability-set operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParamDescriptor {
    pub name: &'static str,
    pub type_name: &'static str,
}

/// One proxyable operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationDescriptor {
    pub name: &'static str,
    pub params: Vec<ParamDescriptor>,
}

/// Description of a capability set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapabilityDescriptor {
    /// Trait name
    pub name: &'static str,

    /// Proxyable operations, in declaration order
    pub operations: Vec<OperationDescriptor>,
}

impl CapabilityDescriptor {
    /// Checks the descriptor describes an interface a proxy can mirror.
    ///
    /// A valid set has a name, at least one operation, and unique non-empty
    /// operation and parameter names.
    pub fn validate(&self) -> Result<(), ProxyError> {
        if self.name.trim().is_empty() {
            return Err(ProxyError::invalid("<unnamed>", "capability set has no name"));
        }
        if self.operations.is_empty() {
            return Err(ProxyError::invalid(self.name, "no proxyable operations"));
        }

        let mut seen = HashSet::new();
        for op in &self.operations {
            if op.name.trim().is_empty() {
                return Err(ProxyError::invalid(self.name, "operation with empty name"));
            }
            if !seen.insert(op.name) {
                return Err(ProxyError::invalid(
                    self.name,
                    format!("duplicate operation {}", op.name),
                ));
            }

            let mut params = HashSet::new();
            for param in &op.params {
                if !params.insert(param.name) {
                    return Err(ProxyError::invalid(
                        self.name,
                        format!("duplicate parameter {} in {}", param.name, op.name),
                    ));
                }
            }
        }

        Ok(())
    }

    /// Looks up an operation by name.
    pub fn operation(&self, name: &str) -> Option<&OperationDescriptor> {
        self.operations.iter().find(|op| op.name == name)
    }

    /// Returns operation names in declaration order.
    pub fn operation_names(&self) -> Vec<&'static str> {
        self.operations.iter().map(|op| op.name).collect()
    }
}

/// A trait whose operations can be mirrored and replayed.
///
/// Implemented for `dyn Trait` by [`capability_set!`]; implementing it by hand
/// is possible for interfaces that need custom dispatch.
pub trait CapabilitySet {
    /// Error type shared by every operation of the set.
    type Error: From<ProxyError>;

    /// Describes the proxyable operations.
    fn descriptor() -> CapabilityDescriptor;

    /// Re-issues a logged call on `self`.
    fn dispatch(&mut self, call: &Call) -> Result<(), Self::Error>;
}

/// Lifecycle hooks that are never mirrored.
///
/// The proxy's own implementation is a no-op, so calling `init` on a proxy
/// does not reach the wrapped implementations.
pub trait Lifecycle {
    fn init(&mut self) {}

    fn teardown(&mut self) {}
}

/// Declares a capability-set trait and its mirroring proxy.
///
/// ```ignore
/// capability_set! {
///     /// Operations every counter implementation accepts.
///     pub trait Counter {
///         type Error = CounterError;
///
///         fn add(&mut self, amount: u32);
///         fn reset(&mut self);
///     }
/// }
/// ```
///
/// Argument types must be `Clone + Debug + Serialize + DeserializeOwned`, and
/// the error type must implement `From<ProxyError>`.
#[macro_export]
macro_rules! capability_set {
    (
        $(#[$meta:meta])*
        $vis:vis trait $name:ident {
            type Error = $err:ty;
            $(
                $(#[$op_meta:meta])*
                fn $op:ident(&mut self $(, $arg:ident : $ty:ty)* $(,)?);
            )+
        }
    ) => {
        $(#[$meta])*
        $vis trait $name {
            $(
                $(#[$op_meta])*
                fn $op(&mut self $(, $arg: $ty)*) -> ::core::result::Result<(), $err>;
            )+
        }

        impl $crate::CapabilitySet for dyn $name {
            type Error = $err;

            fn descriptor() -> $crate::CapabilityDescriptor {
                $crate::CapabilityDescriptor {
                    name: stringify!($name),
                    operations: vec![
                        $(
                            $crate::OperationDescriptor {
                                name: stringify!($op),
                                params: vec![
                                    $(
                                        $crate::ParamDescriptor {
                                            name: stringify!($arg),
                                            type_name: stringify!($ty),
                                        }
                                    ),*
                                ],
                            }
                        ),+
                    ],
                }
            }

            fn dispatch(&mut self, call: &$crate::Call) -> ::core::result::Result<(), $err> {
                $(
                    if call.name() == stringify!($op) {
                        let params: &[&str] = &[$(stringify!($arg)),*];
                        #[allow(unused_mut, unused_variables)]
                        let mut cursor = $crate::ArgCursor::new(call, params.len())?;
                        $(
                            let $arg: $ty = cursor.take(stringify!($arg))?;
                        )*
                        return self.$op($($arg),*);
                    }
                )+
                Err($crate::ProxyError::UnknownOperation(call.name().to_string()).into())
            }
        }

        impl $name for $crate::Proxy<dyn $name> {
            $(
                fn $op(&mut self $(, $arg: $ty)*) -> ::core::result::Result<(), $err> {
                    let call = $crate::Call::new(
                        stringify!($op),
                        vec![
                            $(
                                $crate::CallArg::capture(stringify!($op), stringify!($arg), &$arg)?
                            ),*
                        ],
                    );
                    self.mirror(call, |target| {
                        target.$op($(::core::clone::Clone::clone(&$arg)),*)
                    })
                }
            )+
        }
    };
}
