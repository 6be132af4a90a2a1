//! MTB Core - Component, Port and Action Model
//!
//! Describes simulated hardware/software systems as components wired together
//! by typed ports:
//! 1. **Actions**: named operations with typed, defaultable parameters
//! 2. **Ports**: `PortOut<T>` → `PortIn<T>` dataflow, with cached replay on late connection
//! 3. **Introspection**: component names, actions, ports and variables for
//!    renderers, GUIs and test drivers

pub mod action;
pub mod component;
pub mod error;
pub mod inspect;
pub mod mirror;
pub mod port;
pub mod system;
pub mod value;

// Re-export key types for convenience
pub use action::{Action, ActionDecl, ActionParam, Args, ParamDecl, MAX_DEFERRED_DELIVERIES};
pub use component::{Component, ComponentDescription, ComponentInfo, Declarations, Instance, Variable};
pub use error::ModelError;
pub use inspect::VariableTree;
pub use mirror::ActionMirror;
pub use port::{PortDirection, PortIn, PortInfo, PortOut};
pub use system::{Member, Model, System, SystemDescription};
pub use value::{FieldInfo, ParamType, TypeInfo, TypeKind};
