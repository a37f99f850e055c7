//! Per-name results of bulk plugin operations

use std::sync::Arc;

use crate::application::errors::PluginError;
use crate::plugins::unit::PluginUnit;

/// Result of an enable/disable request for one plugin
#[derive(Debug, Clone)]
pub enum StateChange {
    /// The hook ran (or was absent) and the state flipped
    Changed(Arc<PluginUnit>),
    /// The plugin was already in the requested state; nothing was invoked
    Unchanged(Arc<PluginUnit>),
}

impl StateChange {
    pub fn unit(&self) -> &Arc<PluginUnit> {
        match self {
            StateChange::Changed(unit) | StateChange::Unchanged(unit) => unit,
        }
    }

    pub fn is_changed(&self) -> bool {
        matches!(self, StateChange::Changed(_))
    }
}

/// Outcome of one bulk operation, keyed by plugin name in request order
#[derive(Debug, Clone)]
pub struct Outcomes<T> {
    entries: Vec<(String, Result<T, PluginError>)>,
}

impl<T> Outcomes<T> {
    pub(crate) fn new(entries: Vec<(String, Result<T, PluginError>)>) -> Self {
        Self { entries }
    }

    pub fn empty() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    pub fn get(&self, name: &str) -> Option<&Result<T, PluginError>> {
        self.entries
            .iter()
            .find(|(entry, _)| entry == name)
            .map(|(_, result)| result)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Result<T, PluginError>)> {
        self.entries.iter().map(|(name, result)| (name.as_str(), result))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(name, _)| name.as_str())
    }

    /// Names whose operation succeeded
    pub fn succeeded(&self) -> Vec<&str> {
        self.iter()
            .filter(|(_, result)| result.is_ok())
            .map(|(name, _)| name)
            .collect()
    }

    /// Names whose operation failed, with their errors
    pub fn failed(&self) -> Vec<(&str, &PluginError)> {
        self.iter()
            .filter_map(|(name, result)| result.as_ref().err().map(|e| (name, e)))
            .collect()
    }

    /// True when every name succeeded
    pub fn is_clean(&self) -> bool {
        self.entries.iter().all(|(_, result)| result.is_ok())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<T> IntoIterator for Outcomes<T> {
    type Item = (String, Result<T, PluginError>);
    type IntoIter = std::vec::IntoIter<Self::Item>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

/// De-duplicate a name list, keeping the first occurrence of each name
pub(crate) fn dedup_names<S: AsRef<str>>(names: &[S]) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    names
        .iter()
        .map(|name| name.as_ref())
        .filter(|name| seen.insert(*name))
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dedup_keeps_first_occurrence() {
        let names = dedup_names(&["b", "a", "b", "c", "a"]);
        assert_eq!(names, vec!["b", "a", "c"]);
    }

    #[test]
    fn test_outcome_queries() {
        let outcomes: Outcomes<u32> = Outcomes::new(vec![
            ("echo".to_string(), Ok(1)),
            ("trace".to_string(), Err(PluginError::NotLoaded("trace".into()))),
        ]);

        assert_eq!(outcomes.len(), 2);
        assert_eq!(outcomes.succeeded(), vec!["echo"]);
        assert_eq!(outcomes.failed().len(), 1);
        assert!(!outcomes.is_clean());
        assert!(matches!(outcomes.get("echo"), Some(Ok(1))));
        assert!(outcomes.get("missing").is_none());
    }
}
