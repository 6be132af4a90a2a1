//! Components: user types exposing actions, ports and variables.
//!
//! A component is an ordinary serde-serializable struct. Its actions and ports
//! are registered explicitly in [`Component::declare`]; its variables are its
//! serialized fields, minus any whose name starts with `_`.
//!
//! ```ignore
//! #[derive(Serialize)]
//! struct Heater {
//!     on: bool,
//!     #[serde(skip)]
//!     demand: PortIn<bool>,
//! }
//!
//! impl Component for Heater {
//!     fn declare(&self, decl: &mut Declarations<Self>) -> Result<(), ModelError> {
//!         decl.receiver(
//!             &self.demand,
//!             ActionDecl::new("switch", |h: &mut Self, args: &mut Args| {
//!                 h.on = args.take()?;
//!                 Ok(())
//!             })
//!             .param(ParamDecl::typed::<bool>("on")),
//!         )
//!     }
//! }
//!
//! let heater = Instance::new(Heater { on: false, demand: PortIn::new("demand") })?;
//! ```

use crate::action::{Action, ActionDecl, Mailbox};
use crate::error::ModelError;
use crate::inspect::VariableTree;
use crate::port::{PortDirection, PortIn, PortInfo, PortMeta, PortOut};
use crate::value::ParamType;
use serde::Serialize;
use serde_json::Value;
use std::cell::{Ref, RefCell, RefMut};
use std::collections::HashSet;
use std::fmt;
use std::ops::Deref;
use std::rc::{Rc, Weak};
use tracing::info;

/// A modelled hardware or software element.
pub trait Component: Serialize + Sized + 'static {
    /// Registers every action and port of the component.
    fn declare(&self, decl: &mut Declarations<Self>) -> Result<(), ModelError>;

    /// Runs once after declaration succeeded.
    fn init(&mut self) -> Result<(), ModelError> {
        Ok(())
    }

    /// Human-readable name, derived from the type name by default.
    fn display_name() -> String {
        split_camel_case(&crate::port::short_type_name::<Self>())
    }

    /// Variables holding keyed maps rather than records.
    ///
    /// Both serialize to JSON objects; listing a variable here makes its
    /// inspection tree show `name (map)` with `[key]` children.
    fn map_variables() -> &'static [&'static str] {
        &[]
    }
}

/// Splits `CamelCase` into words: `RealAtm` becomes `Real Atm`.
///
/// Runs of capitals stay together, so `ATMOracle` is unchanged.
pub fn split_camel_case(name: &str) -> String {
    let mut words: Vec<String> = Vec::new();
    for ch in name.chars() {
        let split = match words.last().and_then(|w| w.chars().last()) {
            Some(prev) => ch.is_uppercase() && !prev.is_uppercase(),
            None => true,
        };
        match words.last_mut() {
            Some(word) if !split => word.push(ch),
            _ => words.push(ch.to_string()),
        }
    }
    words.join(" ")
}

/// Collects a component's actions and ports during [`Component::declare`].
pub struct Declarations<C> {
    owner: Weak<RefCell<C>>,
    mailbox: Rc<Mailbox<C>>,
    component: String,
    actions: Vec<Action>,
    inputs: Vec<Box<dyn PortMeta>>,
    outputs: Vec<Box<dyn PortMeta>>,
}

impl<C: Component> Declarations<C> {
    fn new(owner: Weak<RefCell<C>>, component: String) -> Self {
        Self {
            owner,
            mailbox: Rc::new(Mailbox::new()),
            component,
            actions: Vec::new(),
            inputs: Vec::new(),
            outputs: Vec::new(),
        }
    }

    fn push_action(&mut self, decl: ActionDecl<C>) -> Result<Action, ModelError> {
        if self.actions.iter().any(|a| a.name() == decl.name()) {
            return Err(ModelError::modeling(format!(
                "Duplicate action {} in {}",
                decl.name(),
                self.component
            )));
        }
        let action = decl.bind(&self.owner, &self.mailbox, &self.component)?;
        self.actions.push(action.clone());
        Ok(action)
    }

    fn check_port_name(&self, name: &str) -> Result<(), ModelError> {
        let taken = self
            .inputs
            .iter()
            .chain(self.outputs.iter())
            .any(|p| p.name() == name);
        if taken {
            return Err(ModelError::modeling(format!(
                "Duplicate port {} in {}",
                name, self.component
            )));
        }
        Ok(())
    }

    /// Registers a manually triggered action.
    pub fn action(&mut self, decl: ActionDecl<C>) -> Result<(), ModelError> {
        self.push_action(decl).map(|_| ())
    }

    /// Registers an input port.
    pub fn port_in<T>(&mut self, port: &PortIn<T>) -> Result<(), ModelError>
    where
        T: Serialize + Clone + 'static,
    {
        self.check_port_name(port.name())?;
        port.set_owner(&self.component)?;
        self.inputs.push(Box::new(port.clone()));
        Ok(())
    }

    /// Registers an output port.
    pub fn port_out<T>(&mut self, port: &PortOut<T>) -> Result<(), ModelError>
    where
        T: Serialize + Clone + 'static,
    {
        self.check_port_name(port.name())?;
        port.set_owner(&self.component)?;
        self.outputs.push(Box::new(port.clone()));
        Ok(())
    }

    /// Registers `decl` as an action and binds it as `port`'s receiver.
    ///
    /// The port is registered as an input too if it was not already. The
    /// action must take exactly one parameter of the port's type. A port
    /// accepts a single receiver; binding a second one fails and leaves the
    /// first in place.
    pub fn receiver<T>(&mut self, port: &PortIn<T>, decl: ActionDecl<C>) -> Result<(), ModelError>
    where
        T: ParamType,
    {
        if port.has_receiver() {
            return Err(ModelError::modeling(format!(
                "Multiple receivers for input port {}.{}: cannot bind {}",
                self.component,
                port.name(),
                decl.name()
            )));
        }

        let action = decl.bind(&self.owner, &self.mailbox, &self.component)?;
        let expected = T::type_info();
        match action.params() {
            [param] if *param.type_info() == expected => {}
            params => {
                return Err(ModelError::modeling(format!(
                    "Receiver {} for port {} must take one {} parameter, found {}",
                    action.name(),
                    port.name(),
                    expected,
                    params
                        .iter()
                        .map(|p| p.type_info().to_string())
                        .collect::<Vec<_>>()
                        .join(", ")
                )));
            }
        }
        if self.actions.iter().any(|a| a.name() == action.name()) {
            return Err(ModelError::modeling(format!(
                "Duplicate action {} in {}",
                action.name(),
                self.component
            )));
        }

        if !self.inputs.iter().any(|p| p.name() == port.name()) {
            self.port_in(port)?;
        }
        port.bind(action.clone())?;
        self.actions.push(action);
        Ok(())
    }
}

/// A component variable: a public serialized field.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Variable {
    pub name: String,
    pub value: Value,
}

/// Action summary used by descriptions.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActionInfo {
    pub name: String,
    pub params: Vec<ParamInfo>,
    pub connected: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParamInfo {
    pub name: String,
    #[serde(rename = "type")]
    pub type_name: String,
}

/// Serializable snapshot of a component's metadata and state.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComponentDescription {
    pub name: String,
    pub type_name: String,
    pub actions: Vec<ActionInfo>,
    pub input_ports: Vec<PortInfo>,
    pub output_ports: Vec<PortInfo>,
    pub variables: Vec<Variable>,
}

type VariableReader = Box<dyn Fn() -> Result<Vec<Variable>, ModelError>>;

/// Type-erased metadata of a built component.
///
/// Everything a renderer, GUI or driver needs without knowing the concrete
/// component type.
pub struct ComponentInfo {
    name: String,
    type_name: String,
    actions: Vec<Action>,
    inputs: Vec<Box<dyn PortMeta>>,
    outputs: Vec<Box<dyn PortMeta>>,
    variables: VariableReader,
    map_variables: &'static [&'static str],
}

impl ComponentInfo {
    /// Display name (`Real Atm`).
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Rust type name (`RealAtm`).
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    /// All actions, in declaration order.
    pub fn actions(&self) -> &[Action] {
        &self.actions
    }

    pub fn action(&self, name: &str) -> Result<&Action, ModelError> {
        self.actions
            .iter()
            .find(|a| a.name() == name)
            .ok_or_else(|| ModelError::UnknownAction {
                component: self.name.clone(),
                action: name.to_string(),
            })
    }

    /// Actions not driven by a connected input port.
    pub fn manual_actions(&self) -> Vec<&Action> {
        self.actions.iter().filter(|a| !a.is_connected()).collect()
    }

    pub fn input_ports(&self) -> Result<Vec<PortInfo>, ModelError> {
        self.inputs.iter().map(|p| p.info()).collect()
    }

    pub fn output_ports(&self) -> Result<Vec<PortInfo>, ModelError> {
        self.outputs.iter().map(|p| p.info()).collect()
    }

    /// Current variable values, in field order.
    pub fn variables(&self) -> Result<Vec<Variable>, ModelError> {
        (self.variables)()
    }

    /// One inspection tree per variable.
    pub fn variable_trees(&self) -> Result<Vec<VariableTree>, ModelError> {
        Ok(self
            .variables()?
            .iter()
            .map(|v| {
                if self.map_variables.contains(&v.name.as_str()) {
                    VariableTree::build_map(&v.name, &v.value)
                } else {
                    VariableTree::build(&v.name, &v.value)
                }
            })
            .collect())
    }

    /// Invokes the named action.
    pub fn invoke(&self, action: &str, args: Vec<Value>) -> Result<(), ModelError> {
        self.action(action)?.invoke(args)
    }

    pub fn describe(&self) -> Result<ComponentDescription, ModelError> {
        Ok(ComponentDescription {
            name: self.name.clone(),
            type_name: self.type_name.clone(),
            actions: self
                .actions
                .iter()
                .map(|a| ActionInfo {
                    name: a.name().to_string(),
                    params: a
                        .params()
                        .iter()
                        .map(|p| ParamInfo {
                            name: p.name().to_string(),
                            type_name: p.type_info().to_string(),
                        })
                        .collect(),
                    connected: a.is_connected(),
                })
                .collect(),
            input_ports: self.input_ports()?,
            output_ports: self.output_ports()?,
            variables: self.variables()?,
        })
    }

    fn port(&self, direction: PortDirection, name: &str) -> Option<&dyn PortMeta> {
        let ports = match direction {
            PortDirection::In => &self.inputs,
            PortDirection::Out => &self.outputs,
        };
        ports.iter().find(|p| p.name() == name).map(|p| p.as_ref())
    }

    /// Metadata of a single port.
    pub fn port_info(&self, direction: PortDirection, name: &str) -> Result<Option<PortInfo>, ModelError> {
        self.port(direction, name).map(|p| p.info()).transpose()
    }
}

impl fmt::Debug for ComponentInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentInfo")
            .field("name", &self.name)
            .field("actions", &self.actions)
            .field("inputs", &self.inputs.iter().map(|p| p.name()).collect::<Vec<_>>())
            .field("outputs", &self.outputs.iter().map(|p| p.name()).collect::<Vec<_>>())
            .finish()
    }
}

fn read_variables<C: Serialize>(owner: &Weak<RefCell<C>>, component: &str) -> Result<Vec<Variable>, ModelError> {
    let owner = owner
        .upgrade()
        .ok_or_else(|| ModelError::Detached(component.to_string()))?;
    let state = owner
        .try_borrow()
        .map_err(|_| ModelError::Reentrant(component.to_string()))?;

    match serde_json::to_value(&*state)? {
        Value::Object(fields) => Ok(fields
            .into_iter()
            .filter(|(name, _)| !name.starts_with('_'))
            .map(|(name, value)| Variable { name, value })
            .collect()),
        Value::Null => Ok(Vec::new()),
        other => Ok(vec![Variable {
            name: "value".to_string(),
            value: other,
        }]),
    }
}

/// A built component: shared state plus its metadata.
///
/// Cloning is shallow.
pub struct Instance<C> {
    state: Rc<RefCell<C>>,
    info: Rc<ComponentInfo>,
}

impl<C> Clone for Instance<C> {
    fn clone(&self) -> Self {
        Self {
            state: self.state.clone(),
            info: self.info.clone(),
        }
    }
}

impl<C: Component> Instance<C> {
    /// Builds a component.
    ///
    /// Runs [`Component::declare`], then [`Component::init`]. A declaration
    /// error (untyped parameter, duplicate name, double receiver binding) is
    /// returned before `init` runs.
    pub fn new(state: C) -> Result<Self, ModelError> {
        let name = C::display_name();
        info!("Initializing {}", name);

        let state = Rc::new(RefCell::new(state));
        let owner = Rc::downgrade(&state);

        let mut decl = Declarations::new(owner.clone(), name.clone());
        state.borrow().declare(&mut decl)?;

        state.borrow_mut().init()?;

        let variable_owner = owner;
        let variable_name = name.clone();
        let info = ComponentInfo {
            name,
            type_name: crate::port::short_type_name::<C>(),
            actions: decl.actions,
            inputs: decl.inputs,
            outputs: decl.outputs,
            variables: Box::new(move || read_variables(&variable_owner, &variable_name)),
            map_variables: C::map_variables(),
        };

        Ok(Self {
            state,
            info: Rc::new(info),
        })
    }
}

impl<C> Instance<C> {
    /// Borrows the component state.
    ///
    /// Drop the guard before sending on the component's ports.
    pub fn state(&self) -> Ref<'_, C> {
        self.state.borrow()
    }

    pub fn state_mut(&self) -> RefMut<'_, C> {
        self.state.borrow_mut()
    }

    /// Shared handle to the type-erased metadata.
    pub fn info(&self) -> Rc<ComponentInfo> {
        self.info.clone()
    }
}

impl<C> Deref for Instance<C> {
    type Target = ComponentInfo;

    fn deref(&self) -> &ComponentInfo {
        &self.info
    }
}

impl<C: fmt::Debug> fmt::Debug for Instance<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Instance")
            .field("name", &self.info.name)
            .field("state", &self.state)
            .finish()
    }
}

/// Names declared more than once, in first-seen order.
pub(crate) fn duplicates<'a>(names: impl IntoIterator<Item = &'a str>) -> Vec<&'a str> {
    let mut seen = HashSet::new();
    let mut dup = Vec::new();
    for name in names {
        if !seen.insert(name) && !dup.contains(&name) {
            dup.push(name);
        }
    }
    dup
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::{Args, ParamDecl, MAX_DEFERRED_DELIVERIES};
    use serde_json::json;
    use std::cell::Cell;

    thread_local! {
        static INIT_RUNS: Cell<usize> = Cell::new(0);
    }

    #[derive(Serialize)]
    struct TestComponent {
        d: i32,
        last: Option<i32>,
        _scratch: u8,
        #[serde(skip)]
        d_in: PortIn<i32>,
        #[serde(skip)]
        d_out: PortOut<i32>,
        #[serde(skip)]
        u_out: PortOut<i32>,
    }

    impl TestComponent {
        fn new() -> Self {
            Self {
                d: 0,
                last: None,
                _scratch: 0,
                d_in: PortIn::new("d_in"),
                d_out: PortOut::new("d_out"),
                u_out: PortOut::uncached("u_out"),
            }
        }
    }

    impl Component for TestComponent {
        fn declare(&self, decl: &mut Declarations<Self>) -> Result<(), ModelError> {
            decl.action(
                ActionDecl::new("set_d", |c: &mut Self, args: &mut Args| {
                    c.d = args.take()?;
                    Ok(())
                })
                .param(ParamDecl::typed::<i32>("d").default_with(|c: &Self| c.d)),
            )?;
            decl.port_out(&self.d_out)?;
            decl.port_out(&self.u_out)?;
            decl.receiver(
                &self.d_in,
                ActionDecl::new("on_d", |c: &mut Self, args: &mut Args| {
                    c.last = Some(args.take()?);
                    Ok(())
                })
                .param(ParamDecl::typed::<i32>("d")),
            )
        }
    }

    #[derive(Debug, Serialize)]
    struct Untyped {
        n: i32,
    }

    impl Component for Untyped {
        fn declare(&self, decl: &mut Declarations<Self>) -> Result<(), ModelError> {
            decl.action(
                ActionDecl::new("a", |c: &mut Self, args: &mut Args| {
                    c.n += args.take::<i32>()?;
                    Ok(())
                })
                .param(ParamDecl::untyped("inc")),
            )
        }

        fn init(&mut self) -> Result<(), ModelError> {
            INIT_RUNS.with(|runs| runs.set(runs.get() + 1));
            Ok(())
        }
    }

    #[derive(Debug, Serialize)]
    struct DoubleBound {
        #[serde(skip)]
        input: PortIn<i32>,
    }

    impl Component for DoubleBound {
        fn declare(&self, decl: &mut Declarations<Self>) -> Result<(), ModelError> {
            let noop = |_: &mut Self, args: &mut Args| args.take::<i32>().map(|_| ());
            decl.receiver(
                &self.input,
                ActionDecl::new("first", noop).param(ParamDecl::typed::<i32>("v")),
            )?;
            decl.receiver(
                &self.input,
                ActionDecl::new("second", noop).param(ParamDecl::typed::<i32>("v")),
            )
        }
    }

    /// Counts down through its own output port until it reaches zero.
    #[derive(Serialize)]
    struct Echo {
        trace: Vec<String>,
        seen: Vec<i32>,
        #[serde(skip)]
        input: PortIn<i32>,
        #[serde(skip)]
        output: PortOut<i32>,
    }

    impl Echo {
        fn new() -> Self {
            Self {
                trace: Vec::new(),
                seen: Vec::new(),
                input: PortIn::new("input"),
                output: PortOut::uncached("output"),
            }
        }
    }

    impl Component for Echo {
        fn declare(&self, decl: &mut Declarations<Self>) -> Result<(), ModelError> {
            decl.port_out(&self.output)?;
            decl.action(
                ActionDecl::new("ping", |e: &mut Self, args: &mut Args| {
                    let v: i32 = args.take()?;
                    e.trace.push(format!("ping {}", v));
                    e.output.send(v)?;
                    e.trace.push("ping done".to_string());
                    Ok(())
                })
                .param(ParamDecl::typed::<i32>("v")),
            )?;
            decl.receiver(
                &self.input,
                ActionDecl::new("on_input", |e: &mut Self, args: &mut Args| {
                    let v: i32 = args.take()?;
                    e.trace.push(format!("seen {}", v));
                    e.seen.push(v);
                    if v != 0 {
                        e.output.send(v - 1)?;
                    }
                    Ok(())
                })
                .param(ParamDecl::typed::<i32>("v")),
            )
        }
    }

    #[derive(Serialize)]
    struct Sink {
        values: Vec<i32>,
        #[serde(skip)]
        input: PortIn<i32>,
    }

    impl Component for Sink {
        fn declare(&self, decl: &mut Declarations<Self>) -> Result<(), ModelError> {
            decl.receiver(
                &self.input,
                ActionDecl::new("store", |s: &mut Self, args: &mut Args| {
                    s.values.push(args.take()?);
                    Ok(())
                })
                .param(ParamDecl::typed::<i32>("v")),
            )
        }
    }

    #[derive(Serialize)]
    struct Server {
        served: u32,
        #[serde(skip)]
        request: PortIn<i32>,
        #[serde(skip)]
        response: PortOut<i32>,
    }

    impl Component for Server {
        fn declare(&self, decl: &mut Declarations<Self>) -> Result<(), ModelError> {
            decl.port_out(&self.response)?;
            decl.receiver(
                &self.request,
                ActionDecl::new("serve", |s: &mut Self, args: &mut Args| {
                    let v: i32 = args.take()?;
                    s.served += 1;
                    s.response.send(v * 2)
                })
                .param(ParamDecl::typed::<i32>("v")),
            )
        }
    }

    #[derive(Serialize)]
    struct Positive {
        accepted: Vec<i32>,
        #[serde(skip)]
        input: PortIn<i32>,
    }

    impl Component for Positive {
        fn declare(&self, decl: &mut Declarations<Self>) -> Result<(), ModelError> {
            decl.receiver(
                &self.input,
                ActionDecl::new("accept", |p: &mut Self, args: &mut Args| {
                    let v: i32 = args.take()?;
                    if v < 0 {
                        return Err(ModelError::rejected("accept", "negative value"));
                    }
                    p.accepted.push(v);
                    Ok(())
                })
                .param(ParamDecl::typed::<i32>("v")),
            )
        }
    }

    #[derive(Debug, Serialize)]
    struct Borrower {
        #[serde(skip)]
        out: PortOut<i32>,
    }

    impl Component for Borrower {
        fn declare(&self, decl: &mut Declarations<Self>) -> Result<(), ModelError> {
            decl.port_out(&self.out)
        }
    }

    #[derive(Serialize)]
    struct Ledger {
        balances: std::collections::BTreeMap<String, i64>,
        holder: Holder,
    }

    #[derive(Serialize)]
    struct Holder {
        name: String,
    }

    impl Component for Ledger {
        fn declare(&self, _: &mut Declarations<Self>) -> Result<(), ModelError> {
            Ok(())
        }

        fn map_variables() -> &'static [&'static str] {
            &["balances"]
        }
    }

    #[test]
    fn test_split_camel_case() {
        assert_eq!(split_camel_case("RealAtm"), "Real Atm");
        assert_eq!(split_camel_case("ATMOracle"), "ATMOracle");
        assert_eq!(split_camel_case("Heater"), "Heater");
        assert_eq!(TestComponent::display_name(), "Test Component");
    }

    #[test]
    fn test_component_registers_actions_ports_and_variables() {
        let c = Instance::new(TestComponent::new()).unwrap();

        let names: Vec<&str> = c.actions().iter().map(|a| a.name()).collect();
        assert_eq!(names, vec!["set_d", "on_d"]);
        assert_eq!(c.input_ports().unwrap().len(), 1);
        assert_eq!(c.output_ports().unwrap()[0].name, "d_out");
        assert_eq!(c.type_name(), "TestComponent");

        let vars: Vec<String> = c.variables().unwrap().into_iter().map(|v| v.name).collect();
        assert_eq!(vars, vec!["d", "last"]);
    }

    #[test]
    fn test_action_invocation_updates_state() {
        let c = Instance::new(TestComponent::new()).unwrap();
        c.invoke("set_d", vec![json!(2)]).unwrap();
        assert_eq!(c.state().d, 2);

        assert!(matches!(
            c.invoke("nope", vec![]),
            Err(ModelError::UnknownAction { .. })
        ));
    }

    #[test]
    fn test_untyped_param_fails_before_init() {
        INIT_RUNS.with(|runs| runs.set(0));
        let err = Instance::new(Untyped { n: 0 }).unwrap_err();

        assert!(err.is_modeling());
        assert!(err.to_string().contains("Missing type annotation"));
        assert_eq!(INIT_RUNS.with(|runs| runs.get()), 0);
    }

    #[test]
    fn test_cached_port_replays_on_connect() {
        let c = Instance::new(TestComponent::new()).unwrap();
        let (out, input) = {
            let s = c.state();
            (s.d_out.clone(), s.d_in.clone())
        };

        out.send(1).unwrap();
        assert_eq!(c.state().last, None);

        input.connect(&out).unwrap();
        assert_eq!(c.state().last, Some(1));
        assert!(c.action("on_d").unwrap().is_connected());
        assert!(!c.action("set_d").unwrap().is_connected());
    }

    #[test]
    fn test_uncached_port_does_not_replay() {
        let c = Instance::new(TestComponent::new()).unwrap();
        let (out, input) = {
            let s = c.state();
            (s.u_out.clone(), s.d_in.clone())
        };

        out.send(1).unwrap();
        out.connect_to(&input).unwrap();
        assert_eq!(c.state().last, None);

        out.send(2).unwrap();
        assert_eq!(c.state().last, Some(2));
    }

    #[test]
    fn test_manual_actions_exclude_connected_receivers() {
        let c = Instance::new(TestComponent::new()).unwrap();
        assert_eq!(c.manual_actions().len(), 2);

        let (out, input) = {
            let s = c.state();
            (s.d_out.clone(), s.d_in.clone())
        };
        out.connect_to(&input).unwrap();

        let manual: Vec<&str> = c.manual_actions().into_iter().map(|a| a.name()).collect();
        assert_eq!(manual, vec!["set_d"]);
        assert_eq!(
            c.output_ports().unwrap()[0].connections,
            vec!["Test Component.d_in".to_string()]
        );
    }

    #[test]
    fn test_second_receiver_binding_is_rejected() {
        let input = PortIn::new("input");
        let err = Instance::new(DoubleBound { input: input.clone() }).unwrap_err();

        assert!(err.is_modeling());
        assert_eq!(input.receiver_name().as_deref(), Some("first"));
    }

    #[test]
    fn test_default_value_tracks_state_and_is_a_copy() {
        let c = Instance::new(TestComponent::new()).unwrap();
        c.state_mut().d = 5;

        let action = c.action("set_d").unwrap();
        let param = &action.params()[0];
        assert_eq!(action.get_default_value(param).unwrap(), json!(5));

        action.invoke(vec![json!(9)]).unwrap();
        let mut value = action.get_default_value(param).unwrap();
        assert_eq!(value, json!(9));

        value = json!(value.as_i64().unwrap() * 2);
        assert_eq!(value, json!(18));
        assert_eq!(c.state().d, 9);
    }

    #[test]
    fn test_describe_reports_current_state() {
        let c = Instance::new(TestComponent::new()).unwrap();
        c.invoke("set_d", vec![json!(3)]).unwrap();

        let desc = c.describe().unwrap();
        assert_eq!(desc.name, "Test Component");
        assert_eq!(desc.actions[0].params[0].type_name, "i32");
        assert_eq!(desc.variables[0], Variable { name: "d".into(), value: json!(3) });
    }

    #[test]
    fn test_duplicates_helper() {
        assert_eq!(duplicates(["a", "b", "a", "a", "c", "b"]), vec!["a", "b"]);
        assert!(duplicates(["a"]).is_empty());
    }

    #[test]
    fn test_self_feedback_runs_after_the_sending_handler() {
        let echo = Instance::new(Echo::new()).unwrap();
        let sink = Instance::new(Sink {
            values: Vec::new(),
            input: PortIn::new("input"),
        })
        .unwrap();
        let output = echo.state().output.clone();
        output.connect_to(&echo.state().input.clone()).unwrap();
        output.connect_to(&sink.state().input.clone()).unwrap();

        echo.invoke("ping", vec![json!(2)]).unwrap();

        let state = echo.state();
        assert_eq!(state.seen, vec![2, 1, 0]);
        assert_eq!(
            state.trace,
            vec!["ping 2", "ping done", "seen 2", "seen 1", "seen 0"]
        );
        assert_eq!(sink.state().values, vec![2, 1, 0]);
    }

    #[test]
    fn test_request_response_loop_between_components() {
        let client = Instance::new(Echo::new()).unwrap();
        let server = Instance::new(Server {
            served: 0,
            request: PortIn::new("request"),
            response: PortOut::uncached("response"),
        })
        .unwrap();
        client
            .state()
            .output
            .clone()
            .connect_to(&server.state().request.clone())
            .unwrap();
        server
            .state()
            .response
            .clone()
            .connect_to(&client.state().input.clone())
            .unwrap();

        client.invoke("ping", vec![json!(0)]).unwrap();

        assert_eq!(server.state().served, 1);
        assert_eq!(client.state().seen, vec![0]);
        assert_eq!(client.state().trace, vec!["ping 0", "ping done", "seen 0"]);
    }

    #[test]
    fn test_endless_feedback_hits_the_delivery_limit() {
        let echo = Instance::new(Echo::new()).unwrap();
        let output = echo.state().output.clone();
        output.connect_to(&echo.state().input.clone()).unwrap();

        let err = echo.invoke("ping", vec![json!(-1)]).unwrap_err();
        assert!(matches!(
            err,
            ModelError::FeedbackLimit { limit: MAX_DEFERRED_DELIVERIES, .. }
        ));
        assert_eq!(echo.state().seen.len(), MAX_DEFERRED_DELIVERIES);

        echo.state_mut().seen.clear();
        echo.invoke("ping", vec![json!(1)]).unwrap();
        assert_eq!(echo.state().seen, vec![1, 0]);
    }

    #[test]
    fn test_held_state_guard_blocks_invocation() {
        let c = Instance::new(TestComponent::new()).unwrap();
        let guard = c.state_mut();

        assert!(matches!(
            c.invoke("set_d", vec![json!(1)]),
            Err(ModelError::Reentrant(_))
        ));
        drop(guard);
        assert_eq!(c.state().d, 0);
    }

    #[test]
    fn test_failed_cached_replay_leaves_port_unwired() {
        let p = Instance::new(Positive {
            accepted: Vec::new(),
            input: PortIn::new("input"),
        })
        .unwrap();
        let input = p.state().input.clone();
        let out: PortOut<i32> = PortOut::new("level");

        out.send(-1).unwrap();
        let err = out.connect_to(&input).unwrap_err();
        assert!(matches!(err, ModelError::Rejected { .. }));
        assert_eq!(out.receiver_count(), 0);
        assert!(!input.is_connected());
        assert!(!p.action("accept").unwrap().is_connected());
        assert_eq!(p.manual_actions().len(), 1);

        out.send(4).unwrap();
        out.connect_to(&input).unwrap();
        assert_eq!(p.state().accepted, vec![4]);
        assert!(p.action("accept").unwrap().is_connected());
    }

    #[test]
    fn test_port_cannot_join_a_second_component() {
        let c = Instance::new(TestComponent::new()).unwrap();
        let out = c.state().d_out.clone();

        let err = Instance::new(Borrower { out: out.clone() }).unwrap_err();
        assert!(err.is_modeling());
        assert_eq!(out.label(), "Test Component.d_out");
    }

    #[test]
    fn test_map_variables_are_shown_as_maps() {
        let ledger = Instance::new(Ledger {
            balances: [("alice".to_string(), 5)].into_iter().collect(),
            holder: Holder { name: "bob".to_string() },
        })
        .unwrap();

        let trees = ledger.variable_trees().unwrap();
        assert_eq!(trees[0].id, "balances (map)");
        assert_eq!(trees[0].children.as_ref().unwrap()[0].id, "[alice]: 5");
        assert_eq!(trees[1].id, "holder");
        assert_eq!(trees[1].children.as_ref().unwrap()[0].id, "name: bob");
    }
}
