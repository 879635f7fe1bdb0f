use serde::{Deserialize, Serialize};

/// Solver settings. A fresh reasoner is built from these every round.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdmmConfig {
    /// Iteration budget; exhausting it is reported, not raised.
    pub max_iterations: usize,
    /// ADMM step size ρ.
    pub step_size: f64,
    pub epsilon_abs: f64,
    pub epsilon_rel: f64,
    /// Check residuals every this many iterations.
    pub check_interval: usize,
}

impl Default for AdmmConfig {
    fn default() -> Self {
        Self {
            max_iterations: 25_000,
            step_size: 1.0,
            epsilon_abs: 1e-5,
            epsilon_rel: 1e-3,
            check_interval: 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config: AdmmConfig =
            serde_json::from_str(r#"{ "max_iterations": 50, "step_size": 2.0 }"#).unwrap();
        assert_eq!(config.max_iterations, 50);
        assert_eq!(config.step_size, 2.0);
        assert_eq!(config.epsilon_abs, AdmmConfig::default().epsilon_abs);
        assert_eq!(config.check_interval, 1);
    }
}
