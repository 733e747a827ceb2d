//! Solver configuration as read from TOML.

use std::fs;
use std::path::Path;

use ndarray::Array1;
use serde::{Deserialize, Serialize};

use crate::BfgsError;
use crate::driver::Settings;
use crate::line_search::BacktrackingLineSearch;

/// The built-in objectives the command line can select.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ObjectiveKind {
    #[default]
    Rosenbrock,
    Quartic,
}

impl ObjectiveKind {
    /// The number of variables the objective requires, if fixed.
    pub fn dimension(self) -> Option<usize> {
        match self {
            ObjectiveKind::Rosenbrock => Some(2),
            ObjectiveKind::Quartic => None,
        }
    }

    pub fn default_start(self) -> Vec<f64> {
        match self {
            ObjectiveKind::Rosenbrock => vec![-1.2, 1.0],
            ObjectiveKind::Quartic => vec![10.0],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SolverConfig {
    pub objective: ObjectiveKind,
    /// Empty means the objective's conventional starting point.
    pub initial_point: Vec<f64>,
    pub max_iterations: usize,
    pub tolerance: f64,
    pub restart_on_indefinite: bool,
    pub line_search: BacktrackingLineSearch,
}

impl Default for SolverConfig {
    fn default() -> Self {
        let settings = Settings::default();
        Self {
            objective: ObjectiveKind::default(),
            initial_point: Vec::new(),
            max_iterations: settings.max_iterations,
            tolerance: settings.tolerance,
            restart_on_indefinite: settings.restart_on_indefinite,
            line_search: settings.line_search,
        }
    }
}

impl SolverConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, BfgsError> {
        let text = fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    pub fn from_toml_str(text: &str) -> Result<Self, BfgsError> {
        let config: SolverConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> Result<String, BfgsError> {
        toml::to_string_pretty(self).map_err(|e| BfgsError::ConfigParse(e.to_string()))
    }

    pub fn validate(&self) -> Result<(), BfgsError> {
        self.settings().validate()?;
        let x0 = self.start();
        if x0.is_empty() {
            return Err(BfgsError::EmptyProblem);
        }
        if let Some(expected) = self.objective.dimension()
            && expected != x0.len()
        {
            return Err(BfgsError::DimensionMismatch {
                expected,
                found: x0.len(),
            });
        }
        Ok(())
    }

    pub fn settings(&self) -> Settings {
        Settings {
            max_iterations: self.max_iterations,
            tolerance: self.tolerance,
            line_search: self.line_search,
            restart_on_indefinite: self.restart_on_indefinite,
        }
    }

    /// The configured starting point, or the objective's default one.
    pub fn start(&self) -> Array1<f64> {
        if self.initial_point.is_empty() {
            Array1::from(self.objective.default_start())
        } else {
            Array1::from(self.initial_point.clone())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{ObjectiveKind, SolverConfig};
    use crate::BfgsError;
    use crate::line_search::DecreaseRule;
    use ndarray::array;

    #[test]
    fn empty_file_gives_reference_defaults() {
        let config = SolverConfig::from_toml_str("").unwrap();
        assert_eq!(config, SolverConfig::default());
        assert_eq!(config.max_iterations, 100);
        assert_eq!(config.tolerance, 1e-9);
        assert_eq!(config.line_search.initial_step, 2.0);
        assert_eq!(config.line_search.max_halvings, 100);
        assert_eq!(config.start(), array![-1.2, 1.0]);
    }

    #[test]
    fn full_file_is_parsed() {
        let text = r#"
            objective = "quartic"
            initial_point = [10.0, -3.0]
            max_iterations = 250
            tolerance = 1e-8
            restart_on_indefinite = true

            [line_search]
            max_halvings = 60
            rule = { armijo = { c1 = 1e-4 } }
        "#;
        let config = SolverConfig::from_toml_str(text).unwrap();
        assert_eq!(config.objective, ObjectiveKind::Quartic);
        assert_eq!(config.start(), array![10.0, -3.0]);
        assert_eq!(config.max_iterations, 250);
        assert!(config.restart_on_indefinite);
        assert_eq!(config.line_search.max_halvings, 60);
        assert_eq!(config.line_search.shrink, 0.5);
        assert_eq!(config.line_search.rule, DecreaseRule::Armijo { c1: 1e-4 });
    }

    #[test]
    fn rosenbrock_needs_two_variables() {
        let err = SolverConfig::from_toml_str("initial_point = [1.0, 2.0, 3.0]").unwrap_err();
        assert_eq!(
            err,
            BfgsError::DimensionMismatch {
                expected: 2,
                found: 3
            }
        );
    }

    #[test]
    fn bad_values_are_rejected() {
        assert!(matches!(
            SolverConfig::from_toml_str("tolerance = -1.0"),
            Err(BfgsError::InvalidTolerance(_))
        ));
        assert!(matches!(
            SolverConfig::from_toml_str("[line_search]\nshrink = 2.0"),
            Err(BfgsError::InvalidLineSearch(_))
        ));
        assert!(matches!(
            SolverConfig::from_toml_str("tolerence = 1e-6"),
            Err(BfgsError::ConfigParse(_))
        ));
    }

    #[test]
    fn config_survives_a_toml_round_trip() {
        let config = SolverConfig {
            objective: ObjectiveKind::Quartic,
            initial_point: vec![4.0],
            ..SolverConfig::default()
        };
        let text = config.to_toml_string().unwrap();
        assert_eq!(SolverConfig::from_toml_str(&text).unwrap(), config);
    }
}
