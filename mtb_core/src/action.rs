//! Actions and their parameters.
//!
//! An action is declared once, as an [`ActionDecl`], while a component is
//! being built. Declaration only registers metadata (parameter types and
//! default providers); invoking the resulting [`Action`] calls the handler
//! with exactly the arguments it was given.
//!
//! Arguments travel as `serde_json::Value`s so that a GUI, a test driver or a
//! replayed call log can invoke any action without knowing its Rust type.

use crate::error::ModelError;
use crate::value::{structural_value, ParamType, TypeInfo};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::fmt;
use std::rc::{Rc, Weak};
use tracing::debug;

/// Deliveries a component accepts while one of its handlers is running,
/// per outermost invocation.
pub const MAX_DEFERRED_DELIVERIES: usize = 1000;

type Handler<C> = Rc<dyn Fn(&mut C, &mut Args) -> Result<(), ModelError>>;
type Provider<C> = Rc<dyn Fn(&C) -> Result<Value, ModelError>>;
type BoundProvider = Rc<dyn Fn() -> Result<Value, ModelError>>;
type BoundCall = Rc<dyn Fn(Vec<Value>) -> Result<(), ModelError>>;
type ZeroFn = fn() -> Result<Value, ModelError>;
type Deferred<C> = Box<dyn FnOnce(&mut C) -> Result<(), ModelError>>;

/// Per-component queue of invocations that arrived while the component was
/// already executing a handler (feedback through its own ports).
///
/// Queued invocations run in arrival order once the running handler returns,
/// under the same borrow, so every handler runs to completion before the
/// next one starts.
pub(crate) struct Mailbox<C> {
    running: Cell<bool>,
    pending: RefCell<VecDeque<Deferred<C>>>,
}

impl<C> Mailbox<C> {
    pub(crate) fn new() -> Self {
        Self {
            running: Cell::new(false),
            pending: RefCell::new(VecDeque::new()),
        }
    }

    fn defer(&self, deferred: Deferred<C>) {
        self.pending.borrow_mut().push_back(deferred);
    }

    /// Runs `first`, then drains whatever was queued meanwhile.
    ///
    /// Stops at the first error and drops the rest of the queue.
    fn run<F>(&self, component: &str, state: &mut C, first: F) -> Result<(), ModelError>
    where
        F: FnOnce(&mut C) -> Result<(), ModelError>,
    {
        self.running.set(true);
        let mut result = first(&mut *state);
        let mut delivered = 0;

        while result.is_ok() {
            let next = self.pending.borrow_mut().pop_front();
            let Some(deferred) = next else { break };
            delivered += 1;
            if delivered > MAX_DEFERRED_DELIVERIES {
                result = Err(ModelError::FeedbackLimit {
                    component: component.to_string(),
                    limit: MAX_DEFERRED_DELIVERIES,
                });
                break;
            }
            result = deferred(&mut *state);
        }

        self.pending.borrow_mut().clear();
        self.running.set(false);
        result
    }
}

/// Declaration of one action parameter.
pub struct ParamDecl<C> {
    name: String,
    ty: Option<(TypeInfo, ZeroFn)>,
    provider: Option<Provider<C>>,
}

impl<C: 'static> ParamDecl<C> {
    /// Declares a parameter of type `T`.
    pub fn typed<T: ParamType>(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ty: Some((T::type_info(), structural_value::<T>)),
            provider: None,
        }
    }

    /// Declares a parameter by name only.
    ///
    /// Declarations assembled from tables may lack a type; building a
    /// component with such a parameter fails with `ModelError::Modeling`.
    pub fn untyped(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ty: None,
            provider: None,
        }
    }

    /// Registers a default-value provider evaluated against the owner.
    pub fn default_with<T, F>(mut self, provider: F) -> Self
    where
        T: Serialize,
        F: Fn(&C) -> T + 'static,
    {
        self.provider = Some(Rc::new(move |owner: &C| Ok(serde_json::to_value(provider(owner))?)));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Declaration of an action: name, parameters and handler.
pub struct ActionDecl<C> {
    name: String,
    params: Vec<ParamDecl<C>>,
    handler: Handler<C>,
}

impl<C: 'static> ActionDecl<C> {
    /// Declares an action whose handler reads its arguments from [`Args`].
    pub fn new<F>(name: impl Into<String>, handler: F) -> Self
    where
        F: Fn(&mut C, &mut Args) -> Result<(), ModelError> + 'static,
    {
        Self {
            name: name.into(),
            params: Vec::new(),
            handler: Rc::new(handler),
        }
    }

    /// Appends a parameter.
    pub fn param(mut self, param: ParamDecl<C>) -> Self {
        self.params.push(param);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Turns the declaration into an owner-bound action.
    ///
    /// Fails if any parameter lacks a type.
    pub(crate) fn bind(
        self,
        owner: &Weak<RefCell<C>>,
        mailbox: &Rc<Mailbox<C>>,
        component: &str,
    ) -> Result<Action, ModelError> {
        let mut params = Vec::with_capacity(self.params.len());
        for decl in self.params {
            let (ty, zero) = decl.ty.ok_or_else(|| {
                ModelError::modeling(format!(
                    "Missing type annotation for action {:?} param {:?}",
                    self.name, decl.name
                ))
            })?;

            let provider = decl.provider.map(|provider| {
                let owner = owner.clone();
                let component = component.to_string();
                let bound: BoundProvider = Rc::new(move || {
                    let owner = owner
                        .upgrade()
                        .ok_or_else(|| ModelError::Detached(component.clone()))?;
                    let state = owner
                        .try_borrow()
                        .map_err(|_| ModelError::Reentrant(component.clone()))?;
                    provider(&state)
                });
                bound
            });

            params.push(ActionParam {
                name: decl.name,
                ty,
                zero,
                provider,
            });
        }

        let param_names: Vec<String> = params.iter().map(|p| p.name.clone()).collect();
        let handler = self.handler;
        let owner = owner.clone();
        let action_name = self.name.clone();
        let component_name = component.to_string();
        let mailbox = mailbox.clone();
        let call: BoundCall = Rc::new(move |values: Vec<Value>| {
            let owner = owner
                .upgrade()
                .ok_or_else(|| ModelError::Detached(component_name.clone()))?;
            let mut args = Args::new(&action_name, param_names.clone(), values);

            let mut state = match owner.try_borrow_mut() {
                Ok(state) => state,
                Err(_) if mailbox.running.get() => {
                    debug!("defer {}.{} until the running handler returns", component_name, action_name);
                    let handler = handler.clone();
                    mailbox.defer(Box::new(move |state: &mut C| handler(state, &mut args)));
                    return Ok(());
                }
                Err(_) => return Err(ModelError::Reentrant(component_name.clone())),
            };
            mailbox.run(&component_name, &mut *state, |state| handler(state, &mut args))
        });

        Ok(Action {
            name: self.name,
            component: component.to_string(),
            params: params.into(),
            connected: Rc::new(Cell::new(false)),
            call,
        })
    }
}

/// Positional arguments handed to an action handler.
pub struct Args {
    action: String,
    names: Vec<String>,
    values: std::vec::IntoIter<Value>,
    next: usize,
}

impl Args {
    fn new(action: &str, names: Vec<String>, values: Vec<Value>) -> Self {
        Self {
            action: action.to_string(),
            names,
            values: values.into_iter(),
            next: 0,
        }
    }

    /// Decodes the next argument.
    pub fn take<T: DeserializeOwned>(&mut self) -> Result<T, ModelError> {
        let param = self
            .names
            .get(self.next)
            .cloned()
            .unwrap_or_else(|| format!("#{}", self.next));
        let value = self.values.next().ok_or_else(|| ModelError::Arity {
            action: self.action.clone(),
            expected: self.next + 1,
            got: self.next,
        })?;
        self.next += 1;

        serde_json::from_value(value).map_err(|source| ModelError::Argument {
            action: self.action.clone(),
            param,
            source,
        })
    }

    /// Returns the number of arguments not yet taken.
    pub fn remaining(&self) -> usize {
        self.values.len()
    }
}

/// An owner-bound action parameter.
#[derive(Clone)]
pub struct ActionParam {
    name: String,
    ty: TypeInfo,
    zero: ZeroFn,
    provider: Option<BoundProvider>,
}

impl ActionParam {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn type_info(&self) -> &TypeInfo {
        &self.ty
    }

    /// Returns true if a default provider was registered.
    pub fn has_provider(&self) -> bool {
        self.provider.is_some()
    }

    /// Returns the default value for this parameter.
    ///
    /// A registered provider is evaluated against the owner's current state
    /// and its result is returned as an independent copy; a null result falls
    /// back to the structural default of the parameter type.
    pub fn get_default_value(&self) -> Result<Value, ModelError> {
        if let Some(provider) = &self.provider {
            let value = provider()?;
            if !value.is_null() {
                return Ok(value);
            }
        }
        self.structural_default()
    }

    /// Returns the default derived from the parameter type alone.
    pub fn structural_default(&self) -> Result<Value, ModelError> {
        (self.zero)()
    }
}

impl fmt::Debug for ActionParam {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActionParam")
            .field("name", &self.name)
            .field("type", &self.ty.name)
            .field("has_provider", &self.provider.is_some())
            .finish()
    }
}

/// A named, owner-bound operation exposed by a component.
#[derive(Clone)]
pub struct Action {
    name: String,
    component: String,
    params: Rc<[ActionParam]>,
    connected: Rc<Cell<bool>>,
    call: BoundCall,
}

impl Action {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Display name of the owning component.
    pub fn component(&self) -> &str {
        &self.component
    }

    pub fn params(&self) -> &[ActionParam] {
        &self.params
    }

    pub fn param(&self, name: &str) -> Option<&ActionParam> {
        self.params.iter().find(|p| p.name == name)
    }

    /// True once the receiver port behind this action has been connected.
    ///
    /// Connected actions are driven by dataflow and should not be triggered
    /// manually.
    pub fn is_connected(&self) -> bool {
        self.connected.get()
    }

    pub(crate) fn set_connected(&self, connected: bool) {
        self.connected.set(connected);
    }

    /// Invokes the action with positional arguments.
    pub fn invoke(&self, args: Vec<Value>) -> Result<(), ModelError> {
        if args.len() != self.params.len() {
            return Err(ModelError::Arity {
                action: self.name.clone(),
                expected: self.params.len(),
                got: args.len(),
            });
        }
        (self.call)(args)
    }

    /// Returns the default value of one of this action's parameters.
    pub fn get_default_value(&self, param: &ActionParam) -> Result<Value, ModelError> {
        param.get_default_value()
    }

    /// Returns defaults for every parameter, in order.
    pub fn default_args(&self) -> Result<Vec<Value>, ModelError> {
        self.params.iter().map(ActionParam::get_default_value).collect()
    }

    /// Invokes the action with its default arguments.
    pub fn invoke_with_defaults(&self) -> Result<(), ModelError> {
        let args = self.default_args()?;
        self.invoke(args)
    }
}

impl fmt::Debug for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Action")
            .field("name", &self.name)
            .field("component", &self.component)
            .field("params", &self.params)
            .field("connected", &self.connected.get())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct Counter {
        d: i64,
        history: Vec<i64>,
    }

    fn bind(decl: ActionDecl<Counter>, owner: &Rc<RefCell<Counter>>) -> Result<Action, ModelError> {
        decl.bind(&Rc::downgrade(owner), &Rc::new(Mailbox::new()), "Counter")
    }

    fn counter(d: i64) -> Rc<RefCell<Counter>> {
        Rc::new(RefCell::new(Counter {
            d,
            history: Vec::new(),
        }))
    }

    fn set_d() -> ActionDecl<Counter> {
        ActionDecl::new("set_d", |c: &mut Counter, args: &mut Args| {
            c.d = args.take()?;
            c.history.push(c.d);
            Ok(())
        })
        .param(ParamDecl::typed::<i64>("d").default_with(|c: &Counter| c.d))
    }

    #[test]
    fn test_action_invocation_forwards_arguments() {
        let owner = counter(0);
        let action = bind(set_d(), &owner).unwrap();

        action.invoke(vec![json!(2)]).unwrap();

        assert_eq!(owner.borrow().d, 2);
        assert_eq!(action.params().len(), 1);
        assert_eq!(action.params()[0].name(), "d");
        assert_eq!(action.params()[0].type_info().name, "i64");
    }

    #[test]
    fn test_default_tracks_current_state() {
        let owner = counter(5);
        let action = bind(set_d(), &owner).unwrap();
        let param = &action.params()[0];

        assert_eq!(action.get_default_value(param).unwrap(), json!(5));
        action.invoke(vec![json!(9)]).unwrap();
        assert_eq!(action.get_default_value(param).unwrap(), json!(9));
    }

    #[test]
    fn test_mutating_default_does_not_touch_owner() {
        let owner = counter(5);
        let action = bind(set_d(), &owner).unwrap();

        let mut default = action.default_args().unwrap().remove(0);
        default = json!(default.as_i64().unwrap() + 100);

        assert_eq!(default, json!(105));
        assert_eq!(owner.borrow().d, 5);
    }

    #[test]
    fn test_default_falls_back_to_structural_default() {
        let owner = counter(0);
        let decl = ActionDecl::new("pick", |_: &mut Counter, _: &mut Args| Ok(()))
            .param(ParamDecl::typed::<String>("label"))
            .param(ParamDecl::typed::<Option<u8>>("slot").default_with(|_: &Counter| None::<u8>));
        let action = bind(decl, &owner).unwrap();

        assert_eq!(action.default_args().unwrap(), vec![json!(""), Value::Null]);
    }

    #[test]
    fn test_unsupported_default_is_reported() {
        let owner = counter(0);
        let decl = ActionDecl::new("load", |_: &mut Counter, _: &mut Args| Ok(()))
            .param(ParamDecl::typed::<Vec<i64>>("values"));
        let action = bind(decl, &owner).unwrap();

        assert!(matches!(
            action.default_args(),
            Err(ModelError::UnsupportedDefault(_))
        ));
    }

    #[test]
    fn test_untyped_param_is_rejected_at_bind() {
        let owner = counter(0);
        let decl = ActionDecl::new("a", |_: &mut Counter, _: &mut Args| Ok(()))
            .param(ParamDecl::untyped("inc"));

        let err = bind(decl, &owner).unwrap_err();
        assert!(err.is_modeling());
        assert!(err.to_string().contains("\"inc\""));
    }

    #[test]
    fn test_arity_and_argument_errors() {
        let owner = counter(0);
        let action = bind(set_d(), &owner).unwrap();

        assert!(matches!(
            action.invoke(vec![]),
            Err(ModelError::Arity { expected: 1, got: 0, .. })
        ));
        assert!(matches!(
            action.invoke(vec![json!("nine")]),
            Err(ModelError::Argument { .. })
        ));
        assert!(owner.borrow().history.is_empty());
    }

    #[test]
    fn test_dropped_owner_is_detected() {
        let owner = counter(0);
        let action = bind(set_d(), &owner).unwrap();
        drop(owner);

        assert!(matches!(action.invoke(vec![json!(1)]), Err(ModelError::Detached(_))));
    }

    #[test]
    fn test_borrowed_owner_is_reentrant() {
        let owner = counter(0);
        let action = bind(set_d(), &owner).unwrap();

        let guard = owner.borrow_mut();
        assert!(matches!(action.invoke(vec![json!(1)]), Err(ModelError::Reentrant(_))));
        drop(guard);

        assert!(owner.borrow().history.is_empty());
        action.invoke(vec![json!(1)]).unwrap();
        assert_eq!(owner.borrow().history, vec![1]);
    }
}
