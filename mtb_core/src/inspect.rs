//! Variable inspection trees.
//!
//! Turns a variable value into a labelled tree for display, and marks which
//! nodes changed between two snapshots so a viewer can highlight them.

use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;

/// Values longer than this are truncated in labels.
pub const LABEL_VALUE_LIMIT: usize = 10;

/// One node of an inspection tree.
///
/// `id` is the label (`name: value`, `name (list)`, ...). Leaf values have no
/// children; records and lists always carry a (possibly empty) child list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VariableTree {
    pub id: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub children: Option<Vec<VariableTree>>,

    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub changed: bool,
}

impl VariableTree {
    fn leaf(id: String) -> Self {
        Self {
            id,
            children: None,
            changed: false,
        }
    }

    fn branch(id: String, children: Vec<VariableTree>) -> Self {
        Self {
            id,
            children: Some(children),
            changed: false,
        }
    }

    /// Builds the tree for variable `name` holding `value`.
    ///
    /// Serialized structs and maps both arrive as JSON objects and are shown
    /// as records: a node labelled `name` with one child per field. Use
    /// [`VariableTree::build_map`] for values known to be maps.
    pub fn build(name: &str, value: &Value) -> Self {
        match value {
            Value::Null => Self::leaf(format!("{}: <undefined>", name)),
            Value::Array(items) => {
                let kind = if items.is_empty() { "empty list" } else { "list" };
                let children = items
                    .iter()
                    .enumerate()
                    .map(|(i, item)| Self::build(&format!("[{}]", i), item))
                    .collect();
                Self::branch(format!("{} ({})", name, kind), children)
            }
            Value::Object(fields) => {
                let children = fields
                    .iter()
                    .map(|(field, item)| Self::build(field, item))
                    .collect();
                Self::branch(name.to_string(), children)
            }
            scalar => Self::leaf(format!("{}: {}", name, format_value(scalar))),
        }
    }

    /// Builds the tree for a keyed map: `name (map)` with one `[key]` child
    /// per entry.
    ///
    /// Values that are not JSON objects are built as by [`VariableTree::build`].
    pub fn build_map(name: &str, value: &Value) -> Self {
        match value {
            Value::Object(entries) => {
                let kind = if entries.is_empty() { "empty map" } else { "map" };
                let children = entries
                    .iter()
                    .map(|(key, item)| {
                        let label = format!("[{}]", truncate(key, LABEL_VALUE_LIMIT));
                        Self::build(&label, item)
                    })
                    .collect();
                Self::branch(format!("{} ({})", name, kind), children)
            }
            other => Self::build(name, other),
        }
    }

    /// Marks nodes of `new` whose label differs from `old`.
    ///
    /// A node is changed if it is new, if its label changed, or if any child
    /// changed. Children are matched by label, independent of order.
    pub fn mark_changes(old: Option<&VariableTree>, new: &mut VariableTree) {
        let old = match old {
            Some(old) if old.id == new.id => old,
            _ => {
                new.changed = true;
                return;
            }
        };

        let old_children: HashMap<&str, &VariableTree> = old
            .children
            .iter()
            .flatten()
            .map(|child| (child.id.as_str(), child))
            .collect();

        let mut any_changed = false;
        for child in new.children.iter_mut().flatten() {
            Self::mark_changes(old_children.get(child.id.as_str()).copied(), child);
            any_changed |= child.changed;
        }
        if any_changed {
            new.changed = true;
        }
    }

    /// Number of nodes flagged as changed, this one included.
    pub fn changed_count(&self) -> usize {
        let own = usize::from(self.changed);
        own + self
            .children
            .iter()
            .flatten()
            .map(VariableTree::changed_count)
            .sum::<usize>()
    }
}

/// Renders a scalar for a label: strings unquoted, long values truncated.
pub fn format_value(value: &Value) -> String {
    let text = match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    truncate(&text, LABEL_VALUE_LIMIT)
}

/// Cuts `text` to `limit` characters, appending `...` when shortened.
///
/// A limit of zero disables truncation.
pub fn truncate(text: &str, limit: usize) -> String {
    if limit > 0 && text.chars().count() > limit {
        let head: String = text.chars().take(limit).collect();
        format!("{}...", head)
    } else {
        text.to_string()
    }
}
