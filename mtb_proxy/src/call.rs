//! Call records and the shared call log.
//!
//! Every intercepted invocation becomes an immutable [`Call`]. Arguments keep
//! both their serialized value (so a log can be replayed against fresh
//! implementations) and a human-readable rendering (so a failing run can be
//! read at a glance).

use crate::error::ProxyError;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fmt;
use std::fs::File;
use std::io::Write;
use std::path::Path;
use std::rc::Rc;

/// A single recorded argument.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallArg {
    /// Serialized value, used for replay
    value: Value,

    /// Rendering used in `name(arg, ...)` output
    rendered: String,
}

impl CallArg {
    /// Captures a typed argument.
    ///
    /// The rendering is the argument's `Debug` form, so enum variants show up
    /// by their symbolic name rather than their serialized index or tag.
    pub fn capture<T>(operation: &str, param: &str, arg: &T) -> Result<Self, ProxyError>
    where
        T: Serialize + fmt::Debug,
    {
        let value = serde_json::to_value(arg).map_err(|source| ProxyError::Capture {
            operation: operation.to_string(),
            param: param.to_string(),
            source,
        })?;

        Ok(Self {
            value,
            rendered: format!("{:?}", arg),
        })
    }

    /// Wraps an already-serialized value (dynamic callers such as action mirrors).
    pub fn from_value(value: Value) -> Self {
        let rendered = value.to_string();
        Self { value, rendered }
    }

    /// Wraps a serialized value together with a rendering chosen by the caller.
    pub fn with_rendering(value: Value, rendered: impl Into<String>) -> Self {
        Self {
            value,
            rendered: rendered.into(),
        }
    }

    /// Returns the serialized value.
    pub fn value(&self) -> &Value {
        &self.value
    }

    /// Returns the human-readable rendering.
    pub fn rendered(&self) -> &str {
        &self.rendered
    }

    /// Decodes the argument back into its parameter type.
    pub fn decode<T: DeserializeOwned>(&self, operation: &str, param: &str) -> Result<T, ProxyError> {
        serde_json::from_value(self.value.clone()).map_err(|source| ProxyError::Decode {
            operation: operation.to_string(),
            param: param.to_string(),
            source,
        })
    }
}

impl fmt::Display for CallArg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.rendered)
    }
}

/// One intercepted invocation: `{name, positional args, keyword args}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Call {
    name: String,
    args: Vec<CallArg>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    kwargs: BTreeMap<String, CallArg>,
}

impl Call {
    /// Creates a call with positional arguments only.
    pub fn new(name: impl Into<String>, args: Vec<CallArg>) -> Self {
        Self {
            name: name.into(),
            args,
            kwargs: BTreeMap::new(),
        }
    }

    /// Adds a keyword argument.
    pub fn with_kwarg(mut self, key: impl Into<String>, arg: CallArg) -> Self {
        self.kwargs.insert(key.into(), arg);
        self
    }

    /// Returns the operation name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the positional arguments in order.
    pub fn args(&self) -> &[CallArg] {
        &self.args
    }

    /// Returns the keyword arguments, sorted by key.
    pub fn kwargs(&self) -> &BTreeMap<String, CallArg> {
        &self.kwargs
    }

    /// Returns the positional argument values.
    pub fn values(&self) -> Vec<Value> {
        self.args.iter().map(|arg| arg.value.clone()).collect()
    }
}

impl fmt::Display for Call {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", self.name)?;
        let positional = self.args.iter().map(|arg| arg.rendered.clone());
        let keyword = self
            .kwargs
            .iter()
            .map(|(key, arg)| format!("{}={}", key, arg.rendered));
        let rendered: Vec<String> = positional.chain(keyword).collect();
        write!(f, "{})", rendered.join(", "))
    }
}

/// Positional reader over a logged call, used when dispatching a replay.
pub struct ArgCursor<'a> {
    call: &'a Call,
    next: usize,
}

impl<'a> ArgCursor<'a> {
    /// Creates a cursor, checking the call carries exactly `expected` arguments.
    pub fn new(call: &'a Call, expected: usize) -> Result<Self, ProxyError> {
        if call.args.len() != expected {
            return Err(ProxyError::arity(&call.name, expected, call.args.len()));
        }
        Ok(Self { call, next: 0 })
    }

    /// Decodes the next positional argument.
    pub fn take<T: DeserializeOwned>(&mut self, param: &str) -> Result<T, ProxyError> {
        let arg = self
            .call
            .args
            .get(self.next)
            .ok_or_else(|| ProxyError::arity(&self.call.name, self.next + 1, self.call.args.len()))?;
        self.next += 1;
        arg.decode(&self.call.name, param)
    }
}

/// Shared, append-only log of intercepted calls.
///
/// Cloning a `CallLog` is shallow: every clone appends to and reads from the
/// same underlying sequence. The log is constructed explicitly per run and
/// handed to each proxy that should record into it.
#[derive(Debug, Clone, Default)]
pub struct CallLog {
    calls: Rc<RefCell<Vec<Call>>>,
}

impl CallLog {
    /// Creates an empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a log pre-filled with calls (e.g. loaded from an export).
    pub fn from_calls(calls: Vec<Call>) -> Self {
        Self {
            calls: Rc::new(RefCell::new(calls)),
        }
    }

    /// Appends a call.
    pub fn record(&self, call: Call) {
        self.calls.borrow_mut().push(call);
    }

    /// Returns the number of recorded calls.
    pub fn len(&self) -> usize {
        self.calls.borrow().len()
    }

    /// Returns true if nothing has been recorded.
    pub fn is_empty(&self) -> bool {
        self.calls.borrow().is_empty()
    }

    /// Returns a copy of the recorded calls, in interception order.
    pub fn snapshot(&self) -> Vec<Call> {
        self.calls.borrow().clone()
    }

    /// Returns the most recent call.
    pub fn last(&self) -> Option<Call> {
        self.calls.borrow().last().cloned()
    }

    /// Removes every recorded call.
    pub fn clear(&self) {
        self.calls.borrow_mut().clear();
    }

    /// Returns true if both handles share the same underlying log.
    pub fn shares_with(&self, other: &CallLog) -> bool {
        Rc::ptr_eq(&self.calls, &other.calls)
    }

    /// Renders every call as `name(arg, ...)`, one per entry.
    pub fn render(&self) -> Vec<String> {
        self.calls.borrow().iter().map(|call| call.to_string()).collect()
    }

    /// Serializes the log to pretty JSON.
    pub fn to_json(&self) -> Result<String, ProxyError> {
        Ok(serde_json::to_string_pretty(&*self.calls.borrow())?)
    }

    /// Parses calls from JSON produced by [`CallLog::to_json`].
    pub fn calls_from_json(json: &str) -> Result<Vec<Call>, ProxyError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Builds a fresh log from JSON produced by [`CallLog::to_json`].
    pub fn from_json(json: &str) -> Result<Self, ProxyError> {
        Ok(Self::from_calls(Self::calls_from_json(json)?))
    }

    /// Writes the log to a JSON file.
    pub fn write_to_file(&self, path: impl AsRef<Path>) -> Result<(), ProxyError> {
        let json = self.to_json()?;
        let mut file = File::create(path)?;
        file.write_all(json.as_bytes())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
    enum Colour {
        Red,
        Green,
    }

    #[test]
    fn test_call_rendering_uses_symbolic_enum_names() {
        let call = Call::new(
            "paint",
            vec![
                CallArg::capture("paint", "colour", &Colour::Green).unwrap(),
                CallArg::capture("paint", "coats", &2u32).unwrap(),
                CallArg::capture("paint", "label", &"door".to_string()).unwrap(),
            ],
        );

        assert_eq!(call.to_string(), r#"paint(Green, 2, "door")"#);
    }

    #[test]
    fn test_call_rendering_includes_kwargs() {
        let call = Call::new("move_to", vec![CallArg::from_value(json!(3))])
            .with_kwarg("speed", CallArg::from_value(json!(1.5)));

        assert_eq!(call.to_string(), "move_to(3, speed=1.5)");
        assert_eq!(call.kwargs().len(), 1);
    }

    #[test]
    fn test_call_without_args_renders_empty_parens() {
        assert_eq!(Call::new("cancel", vec![]).to_string(), "cancel()");
    }

    #[test]
    fn test_arg_decode_restores_value() {
        let arg = CallArg::capture("paint", "colour", &Colour::Red).unwrap();
        let colour: Colour = arg.decode("paint", "colour").unwrap();
        assert_eq!(colour, Colour::Red);

        let err = arg.decode::<u32>("paint", "colour").unwrap_err();
        assert!(matches!(err, ProxyError::Decode { .. }));
    }

    #[test]
    fn test_arg_cursor_checks_arity() {
        let call = Call::new("paint", vec![CallArg::from_value(json!(1))]);
        assert!(matches!(
            ArgCursor::new(&call, 2),
            Err(ProxyError::Arity { expected: 2, got: 1, .. })
        ));

        let mut cursor = ArgCursor::new(&call, 1).unwrap();
        let value: u8 = cursor.take("coats").unwrap();
        assert_eq!(value, 1);
    }

    #[test]
    fn test_call_log_clones_share_entries() {
        let log = CallLog::new();
        let shared = log.clone();

        shared.record(Call::new("a", vec![]));
        log.record(Call::new("b", vec![]));

        assert_eq!(log.len(), 2);
        assert!(log.shares_with(&shared));
        assert_eq!(shared.render(), vec!["a()".to_string(), "b()".to_string()]);
        assert!(!log.shares_with(&CallLog::new()));
    }

    #[test]
    fn test_call_log_json_round_trip_keeps_rendering() {
        let log = CallLog::new();
        log.record(Call::new(
            "paint",
            vec![CallArg::capture("paint", "colour", &Colour::Green).unwrap()],
        ));

        let calls = CallLog::calls_from_json(&log.to_json().unwrap()).unwrap();
        assert_eq!(calls, log.snapshot());
        assert_eq!(calls[0].to_string(), "paint(Green)");

        let restored = CallLog::from_json(&log.to_json().unwrap()).unwrap();
        assert_eq!(restored.render(), log.render());
        assert!(!restored.shares_with(&log));
    }
}
