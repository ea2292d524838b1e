use std::collections::HashSet;
use std::path::Path;

use super::InferenceError;

/// Class names in classifier output order. Index `i` names output element `i`.
#[derive(Debug, Clone)]
pub struct ClassLabels {
    names: Vec<String>,
}

impl ClassLabels {
    pub fn new(names: Vec<String>) -> Result<Self, InferenceError> {
        if names.is_empty() {
            return Err(InferenceError::Configuration(
                "label manifest is empty".to_string(),
            ));
        }

        let mut seen = HashSet::with_capacity(names.len());
        for (i, name) in names.iter().enumerate() {
            if name.trim().is_empty() {
                return Err(InferenceError::Configuration(format!(
                    "label {} is blank",
                    i
                )));
            }
            if !seen.insert(name.as_str()) {
                return Err(InferenceError::Configuration(format!(
                    "label '{}' appears more than once",
                    name
                )));
            }
        }

        Ok(Self { names })
    }

    /// Reads a JSON array of strings, e.g. `class_names.json`.
    pub fn load(path: &Path) -> Result<Self, InferenceError> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            InferenceError::Configuration(format!(
                "failed to read label manifest {}: {}",
                path.display(),
                e
            ))
        })?;
        Self::from_json(&contents)
    }

    pub fn from_json(contents: &str) -> Result<Self, InferenceError> {
        let names: Vec<String> = serde_json::from_str(contents).map_err(|e| {
            InferenceError::Configuration(format!("label manifest is not a JSON string array: {}", e))
        })?;
        Self::new(names)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn get(&self, index: usize) -> Option<&str> {
        self.names.get(index).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(String::as_str)
    }
}
