use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PluginId(pub String);

impl PluginId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PluginId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Plugins installed at a point in time, in the order the host reported them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PluginRoster(Vec<PluginId>);

impl PluginRoster {
    pub fn new(plugins: Vec<PluginId>) -> Self {
        Self(plugins)
    }

    pub fn iter(&self) -> impl Iterator<Item = &PluginId> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Plugins present in `self` but not in `before`, keeping `self`'s order.
    pub fn newly_added(&self, before: &PluginRoster) -> Vec<PluginId> {
        let known: HashSet<&str> = before.iter().map(PluginId::as_str).collect();

        self.0
            .iter()
            .filter(|plugin| !known.contains(plugin.as_str()))
            .cloned()
            .collect()
    }
}

impl<S: Into<String>> FromIterator<S> for PluginRoster {
    fn from_iter<T: IntoIterator<Item = S>>(iter: T) -> Self {
        Self(iter.into_iter().map(PluginId::new).collect())
    }
}
