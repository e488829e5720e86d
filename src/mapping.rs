//! Collapsing the fine-grained TACO ontology onto the six TrashNet classes.

use std::collections::{BTreeMap, HashMap};

use crate::config::{CATEGORY_MAPPING, TACO_CLASSES, TRASHNET_CLASSES};
use crate::error::{PipelineError, Result};

/// Many-to-one label mapping resolved against an ordered target class list.
#[derive(Debug, Clone)]
pub struct CategoryMapping {
    targets: Vec<String>,
    table: HashMap<String, usize>,
}

impl CategoryMapping {
    /// Build a mapping, rejecting entries whose target is not in `targets`.
    pub fn new<S: AsRef<str>>(pairs: &[(S, S)], targets: &[S]) -> Result<Self> {
        let targets: Vec<String> = targets.iter().map(|t| t.as_ref().to_string()).collect();
        let mut table = HashMap::with_capacity(pairs.len());
        for (source, target) in pairs {
            let (source, target) = (source.as_ref(), target.as_ref());
            let id = targets.iter().position(|t| t == target).ok_or_else(|| {
                PipelineError::Config(format!(
                    "mapping for '{}' points at unknown class '{}'",
                    source, target
                ))
            })?;
            if table.insert(source.to_string(), id).is_some() {
                return Err(PipelineError::Config(format!(
                    "label '{}' is mapped more than once",
                    source
                )));
            }
        }
        Ok(Self { targets, table })
    }

    /// The fixed TACO to TrashNet mapping, checked to cover every TACO class.
    pub fn taco_to_trashnet() -> Result<Self> {
        let mapping = Self::new(CATEGORY_MAPPING, TRASHNET_CLASSES)?;
        mapping.ensure_covers(TACO_CLASSES)?;
        Ok(mapping)
    }

    /// Target class index for `label`; unmapped labels are a configuration error.
    pub fn resolve(&self, label: &str) -> Result<usize> {
        self.table.get(label).copied().ok_or_else(|| {
            PipelineError::Config(format!("no category mapping for label '{}'", label))
        })
    }

    pub fn resolve_name(&self, label: &str) -> Result<&str> {
        self.resolve(label).map(|id| self.targets[id].as_str())
    }

    /// Fails on the first label in `labels` that has no entry.
    pub fn ensure_covers<S: AsRef<str>>(&self, labels: &[S]) -> Result<()> {
        for label in labels {
            self.resolve(label.as_ref())?;
        }
        Ok(())
    }

    pub fn targets(&self) -> &[String] {
        &self.targets
    }

    /// Source labels grouped under each target, for logging.
    pub fn groups(&self) -> BTreeMap<&str, Vec<&str>> {
        let mut groups: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
        for (source, &id) in &self.table {
            groups
                .entry(self.targets[id].as_str())
                .or_default()
                .push(source.as_str());
        }
        for sources in groups.values_mut() {
            sources.sort_unstable();
        }
        groups
    }
}
