//! Systems and models: named groupings of component instances.

use crate::component::{duplicates, ComponentDescription, ComponentInfo, Instance};
use crate::error::ModelError;
use serde::Serialize;
use std::rc::Rc;
use tracing::debug;

/// A component placed in a system under an instance name.
#[derive(Debug, Clone)]
pub struct Member {
    /// Instance name within the system (`controller`)
    pub name: String,

    pub component: Rc<ComponentInfo>,
}

/// Serializable snapshot of a system.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SystemDescription {
    pub name: String,
    pub components: Vec<MemberDescription>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MemberDescription {
    pub instance: String,
    #[serde(flatten)]
    pub component: ComponentDescription,
}

/// An ordered, immutable grouping of components. Systems carry no behavior.
#[derive(Debug, Clone)]
pub struct System {
    name: String,
    members: Vec<Member>,
}

/// Builder for [`System`].
#[derive(Debug)]
pub struct SystemBuilder {
    name: String,
    members: Vec<Member>,
}

impl SystemBuilder {
    /// Adds `instance` under `name`. Members keep insertion order.
    pub fn component<C>(mut self, name: impl Into<String>, instance: &Instance<C>) -> Self {
        self.members.push(Member {
            name: name.into(),
            component: instance.info(),
        });
        self
    }

    /// Adds already type-erased component metadata.
    pub fn member(mut self, name: impl Into<String>, component: Rc<ComponentInfo>) -> Self {
        self.members.push(Member {
            name: name.into(),
            component,
        });
        self
    }

    /// Fails if an instance name is used twice.
    pub fn build(self) -> Result<System, ModelError> {
        let dup = duplicates(self.members.iter().map(|m| m.name.as_str()));
        if !dup.is_empty() {
            return Err(ModelError::modeling(format!(
                "System {} has duplicate component names: {}",
                self.name,
                dup.join(", ")
            )));
        }

        debug!("System {} with {} component(s)", self.name, self.members.len());
        Ok(System {
            name: self.name,
            members: self.members,
        })
    }
}

impl System {
    pub fn builder(name: impl Into<String>) -> SystemBuilder {
        SystemBuilder {
            name: name.into(),
            members: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Members in declaration order.
    pub fn components(&self) -> &[Member] {
        &self.members
    }

    /// Looks up a member by instance name.
    pub fn component(&self, name: &str) -> Option<&Rc<ComponentInfo>> {
        self.members
            .iter()
            .find(|m| m.name == name)
            .map(|m| &m.component)
    }

    pub fn describe(&self) -> Result<SystemDescription, ModelError> {
        let components = self
            .members
            .iter()
            .map(|m| {
                Ok(MemberDescription {
                    instance: m.name.clone(),
                    component: m.component.describe()?,
                })
            })
            .collect::<Result<Vec<_>, ModelError>>()?;

        Ok(SystemDescription {
            name: self.name.clone(),
            components,
        })
    }
}

/// An ordered collection of systems.
#[derive(Debug, Clone, Default)]
pub struct Model {
    systems: Vec<System>,
}

impl Model {
    /// Fails if two systems share a name.
    pub fn new(systems: Vec<System>) -> Result<Self, ModelError> {
        let dup = duplicates(systems.iter().map(System::name));
        if !dup.is_empty() {
            return Err(ModelError::modeling(format!(
                "Model has duplicate system names: {}",
                dup.join(", ")
            )));
        }
        Ok(Self { systems })
    }

    pub fn systems(&self) -> &[System] {
        &self.systems
    }

    pub fn system(&self, name: &str) -> Option<&System> {
        self.systems.iter().find(|s| s.name == name)
    }
}
