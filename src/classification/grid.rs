use std::collections::BTreeMap;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/**
Candidate values per hyperparameter. The search space is their Cartesian
product.

Enumeration order is fixed: parameters are sorted by name and the first
parameter varies slowest. Tuning ties are broken on this order.

Read from JSON as `{"C": [1, 10], "gamma": [0.01, 0.1]}`.
 */
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HyperparameterGrid(BTreeMap<String, Vec<f64>>);

impl HyperparameterGrid {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, candidates: impl Into<Vec<f64>>) -> Self {
        self.0.insert(name.into(), candidates.into());
        self
    }

    pub fn from_json_file(path: &Path) -> Result<Self> {
        let file = BufReader::new(File::open(path)?);
        Ok(serde_json::from_reader(file)?)
    }

    pub fn validate(&self) -> Result<()> {
        if self.0.is_empty() {
            return Err(Error::Configuration("hyperparameter grid has no parameter".into()));
        }
        for (name, candidates) in &self.0 {
            if candidates.is_empty() {
                return Err(Error::Configuration(format!("no candidate value for {}", name)));
            }
            if let Some(bad) = candidates.iter().find(|v| !v.is_finite()) {
                return Err(Error::Configuration(format!("{} candidate {} is not finite", name, bad)));
            }
        }
        Ok(())
    }

    /// Every point of the grid, in enumeration order.
    pub fn configurations(&self) -> Result<Vec<Configuration>> {
        self.validate()?;
        let mut configurations = vec![Configuration::default()];
        for (name, candidates) in &self.0 {
            configurations = configurations
                .iter()
                .flat_map(|config| {
                    candidates
                        .iter()
                        .map(move |value| config.clone().with(name.clone(), *value))
                })
                .collect();
        }
        Ok(configurations)
    }
}

/// One value per hyperparameter.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Configuration(BTreeMap<String, f64>);

impl Configuration {
    pub fn with(mut self, name: impl Into<String>, value: f64) -> Self {
        self.0.insert(name.into(), value);
        self
    }

    pub fn get(&self, name: &str) -> Result<f64> {
        self.0
            .get(name)
            .copied()
            .ok_or_else(|| Error::Configuration(format!("configuration {} has no {}", self, name)))
    }
}

impl std::fmt::Display for Configuration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{{")?;
        for (i, (name, value)) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}: {}", name, value)?;
        }
        write!(f, "}}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cartesian_product_in_enumeration_order() {
        let grid = HyperparameterGrid::new()
            .with("gamma", vec![0.1, 1.0])
            .with("C", vec![1.0, 10.0, 100.0]);
        let configs = grid.configurations().unwrap();
        assert_eq!(configs.len(), 6);
        let points = configs
            .iter()
            .map(|c| (c.get("C").unwrap(), c.get("gamma").unwrap()))
            .collect::<Vec<_>>();
        assert_eq!(
            points,
            vec![(1.0, 0.1), (1.0, 1.0), (10.0, 0.1), (10.0, 1.0), (100.0, 0.1), (100.0, 1.0)]
        );
    }

    #[test]
    fn empty_candidate_set_is_malformed() {
        let grid = HyperparameterGrid::new().with("C", vec![1.0]).with("gamma", Vec::<f64>::new());
        assert!(matches!(grid.configurations(), Err(Error::Configuration(_))));
        assert!(matches!(HyperparameterGrid::new().validate(), Err(Error::Configuration(_))));
    }

    #[test]
    fn reads_json_object() {
        let grid: HyperparameterGrid = serde_json::from_str(r#"{"C": [1, 10], "gamma": [0.5]}"#).unwrap();
        assert_eq!(grid, HyperparameterGrid::new().with("C", vec![1.0, 10.0]).with("gamma", vec![0.5]));
    }

    #[test]
    fn missing_parameter_is_reported() {
        let config = Configuration::default().with("C", 1.0);
        assert_eq!(config.to_string(), "{C: 1}");
        assert!(matches!(config.get("gamma"), Err(Error::Configuration(_))));
    }
}
