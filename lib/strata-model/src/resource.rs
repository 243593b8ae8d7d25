use serde::{Deserialize, Serialize};

use crate::Attributes;

/// A resource.
///
/// Resources describe the entity producing telemetry, such as a service instance or a host.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
pub struct Resource {
    /// Resource attributes.
    pub attributes: Attributes,

    /// Number of attributes that were discarded before reaching the encoder.
    pub dropped_attributes_count: u32,
}

impl Resource {
    /// Creates a new `Resource` with the given attributes.
    pub fn from_attributes(attributes: Attributes) -> Self {
        Self {
            attributes,
            dropped_attributes_count: 0,
        }
    }
}

/// An instrumentation scope.
///
/// Scopes describe the library or component that produced a set of spans or metrics.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
pub struct Scope {
    /// Scope name.
    pub name: String,

    /// Scope version.
    pub version: String,

    /// Scope attributes.
    pub attributes: Attributes,

    /// Number of attributes that were discarded before reaching the encoder.
    pub dropped_attributes_count: u32,
}

impl Scope {
    /// Creates a new `Scope` with the given name and version.
    pub fn new<N, V>(name: N, version: V) -> Self
    where
        N: Into<String>,
        V: Into<String>,
    {
        Self {
            name: name.into(),
            version: version.into(),
            attributes: Attributes::new(),
            dropped_attributes_count: 0,
        }
    }

    /// Sets the attributes of the scope.
    pub fn with_attributes(mut self, attributes: Attributes) -> Self {
        self.attributes = attributes;
        self
    }
}
