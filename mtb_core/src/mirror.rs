//! Mirroring component actions across several instances.
//!
//! [`ActionMirror`] is the component-model counterpart of
//! [`mtb_proxy::Proxy`]: instead of a typed capability set it mirrors the
//! manual actions that several components have in common, which is what a
//! GUI or a table-driven test sees.

use crate::component::ComponentInfo;
use crate::error::ModelError;
use mtb_proxy::{Call, CallArg, CallLog};
use serde_json::Value;
use std::rc::Rc;
use tracing::debug;

/// Forwards each action invocation to every wrapped component, in order.
#[derive(Debug)]
pub struct ActionMirror {
    targets: Vec<Rc<ComponentInfo>>,
    log: CallLog,
}

fn signature(component: &ComponentInfo) -> Vec<(String, usize)> {
    component
        .actions()
        .iter()
        .map(|a| (a.name().to_string(), a.params().len()))
        .collect()
}

impl ActionMirror {
    /// Wraps `targets`, recording into `log`.
    ///
    /// Every target must expose the same action names with the same arity.
    pub fn new(targets: Vec<Rc<ComponentInfo>>, log: CallLog) -> Result<Self, ModelError> {
        let first = targets
            .first()
            .ok_or_else(|| ModelError::modeling("Action mirror needs at least one component"))?;

        let expected = signature(first);
        for other in &targets[1..] {
            if signature(other) != expected {
                return Err(ModelError::modeling(format!(
                    "{} and {} do not expose the same actions",
                    first.name(),
                    other.name()
                )));
            }
        }

        debug!(
            "Action mirror over {:?}",
            targets.iter().map(|t| t.name()).collect::<Vec<_>>()
        );
        Ok(Self { targets, log })
    }

    pub fn log(&self) -> &CallLog {
        &self.log
    }

    /// Action names shared by the wrapped components.
    pub fn action_names(&self) -> Vec<&str> {
        self.targets
            .first()
            .map(|t| t.actions().iter().map(|a| a.name()).collect())
            .unwrap_or_default()
    }

    /// Records `action(args)`, then invokes it on every component.
    ///
    /// Actions fed by a connected input port are rejected.
    pub fn invoke(&self, action: &str, args: Vec<Value>) -> Result<(), ModelError> {
        let mut params = None;
        for target in &self.targets {
            let found = target.action(action)?;
            if found.is_connected() {
                return Err(ModelError::modeling(format!(
                    "Action {} of {} is driven by a connected port",
                    action,
                    target.name()
                )));
            }
            params.get_or_insert_with(|| found.params().to_vec());
        }

        let params = params.unwrap_or_default();
        let rendered = args
            .iter()
            .enumerate()
            .map(|(index, value)| match params.get(index) {
                Some(param) => CallArg::with_rendering(value.clone(), param.type_info().render(value)),
                None => CallArg::from_value(value.clone()),
            })
            .collect();
        let call = Call::new(action, rendered);
        debug!("mirror {}", call);
        self.log.record(call);

        for target in &self.targets {
            target.invoke(action, args.clone())?;
        }
        Ok(())
    }

    /// Invokes the action with the first component's default arguments.
    pub fn invoke_with_defaults(&self, action: &str) -> Result<(), ModelError> {
        let args = match self.targets.first() {
            Some(first) => first.action(action)?.default_args()?,
            None => Vec::new(),
        };
        self.invoke(action, args)
    }

    /// Re-issues `calls` in order. Returns the number applied.
    pub fn replay(&self, calls: &[Call]) -> Result<usize, ModelError> {
        for call in calls {
            self.invoke(call.name(), call.values())?;
        }
        Ok(calls.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::{ActionDecl, Args, ParamDecl};
    use crate::component::{Component, Declarations, Instance};
    use crate::port::{PortIn, PortOut};
    use serde::Serialize;
    use serde_json::json;

    #[derive(Serialize)]
    struct Tally {
        total: i64,
        step: i64,
        #[serde(skip)]
        feed: PortIn<i64>,
    }

    impl Tally {
        fn new(step: i64) -> Self {
            Self {
                total: 0,
                step,
                feed: PortIn::new("feed"),
            }
        }
    }

    impl Component for Tally {
        fn declare(&self, decl: &mut Declarations<Self>) -> Result<(), ModelError> {
            decl.action(
                ActionDecl::new("add", |t: &mut Self, args: &mut Args| {
                    let n: i64 = args.take()?;
                    t.total += n * t.step;
                    Ok(())
                })
                .param(ParamDecl::typed::<i64>("n").default_with(|_: &Self| 1)),
            )?;
            decl.receiver(
                &self.feed,
                ActionDecl::new("on_feed", |t: &mut Self, args: &mut Args| {
                    t.total = args.take()?;
                    Ok(())
                })
                .param(ParamDecl::typed::<i64>("total")),
            )
        }
    }

    #[derive(Debug, Clone, Copy, PartialEq, Serialize, serde::Deserialize)]
    enum Item {
        Withdraw,
        Balance,
    }

    crate::enum_param!(Item { Withdraw, Balance });

    #[derive(Serialize)]
    struct Kiosk {
        chosen: Option<Item>,
    }

    impl Component for Kiosk {
        fn declare(&self, decl: &mut Declarations<Self>) -> Result<(), ModelError> {
            decl.action(
                ActionDecl::new("choose", |k: &mut Self, args: &mut Args| {
                    k.chosen = Some(args.take()?);
                    Ok(())
                })
                .param(ParamDecl::typed::<Item>("item")),
            )
        }
    }

    #[derive(Serialize)]
    struct Other;

    impl Component for Other {
        fn declare(&self, decl: &mut Declarations<Self>) -> Result<(), ModelError> {
            decl.action(ActionDecl::new("noop", |_: &mut Self, _: &mut Args| Ok(())))
        }
    }

    #[test]
    fn test_mirror_invokes_every_component() {
        let a = Instance::new(Tally::new(1)).unwrap();
        let b = Instance::new(Tally::new(10)).unwrap();
        let log = CallLog::new();
        let mirror = ActionMirror::new(vec![a.info(), b.info()], log.clone()).unwrap();

        mirror.invoke("add", vec![json!(2)]).unwrap();
        mirror.invoke_with_defaults("add").unwrap();

        assert_eq!(a.state().total, 3);
        assert_eq!(b.state().total, 30);
        assert_eq!(log.render(), vec!["add(2)".to_string(), "add(1)".to_string()]);
    }

    #[test]
    fn test_mirror_rejects_mismatched_components() {
        let a = Instance::new(Tally::new(1)).unwrap();
        let o = Instance::new(Other).unwrap();

        let err = ActionMirror::new(vec![a.info(), o.info()], CallLog::new()).unwrap_err();
        assert!(err.is_modeling());
        assert!(ActionMirror::new(vec![], CallLog::new()).is_err());
    }

    #[test]
    fn test_mirror_rejects_connected_actions() {
        let a = Instance::new(Tally::new(1)).unwrap();
        let source: PortOut<i64> = PortOut::new("source");
        source.connect_to(&a.state().feed.clone()).unwrap();

        let log = CallLog::new();
        let mirror = ActionMirror::new(vec![a.info()], log.clone()).unwrap();

        assert!(mirror.invoke("on_feed", vec![json!(7)]).unwrap_err().is_modeling());
        assert!(log.is_empty());
        assert_eq!(mirror.action_names(), vec!["add", "on_feed"]);
    }

    #[test]
    fn test_mirror_replay_reproduces_state() {
        let a = Instance::new(Tally::new(2)).unwrap();
        let log = CallLog::new();
        let mirror = ActionMirror::new(vec![a.info()], log.clone()).unwrap();
        mirror.invoke("add", vec![json!(1)]).unwrap();
        mirror.invoke("add", vec![json!(4)]).unwrap();

        let fresh = Instance::new(Tally::new(2)).unwrap();
        let replay_log = CallLog::new();
        let replayed = ActionMirror::new(vec![fresh.info()], replay_log.clone()).unwrap();

        assert_eq!(replayed.replay(&log.snapshot()).unwrap(), 2);
        assert_eq!(fresh.state().total, a.state().total);
        assert_eq!(replay_log.render(), log.render());
    }

    #[test]
    fn test_mirror_renders_enum_arguments_by_name() {
        let a = Instance::new(Kiosk { chosen: None }).unwrap();
        let log = CallLog::new();
        let mirror = ActionMirror::new(vec![a.info()], log.clone()).unwrap();

        mirror.invoke("choose", vec![json!("Balance")]).unwrap();
        mirror.invoke_with_defaults("choose").unwrap();

        assert_eq!(
            log.render(),
            vec!["choose(Balance)".to_string(), "choose(Withdraw)".to_string()]
        );
        assert_eq!(log.snapshot()[0].values(), vec![json!("Balance")]);
        assert_eq!(a.state().chosen, Some(Item::Withdraw));
    }
}
