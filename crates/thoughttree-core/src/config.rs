use crate::error::{Result, ThoughtTreeError};

/// Tunables for the thought-tree search.
///
/// Every knob can be overridden through a `THOUGHTTREE_*` environment
/// variable; unparseable values fall back to the compiled default.
#[derive(Debug, Clone)]
pub struct SearchConfig {
    /// Candidate thoughts generated per expansion round (K)
    pub candidates_per_expansion: usize,
    /// Independent reward samples per candidate (M)
    pub reward_samples: usize,
    /// Subtracted from any reward sample above 95 to discourage saturation
    pub overscore_penalty: f64,
    /// Q-value at which a node ends the search outright
    pub terminal_score_threshold: f64,
    /// All consecutive ancestor Q deltas below this mark diminishing returns
    pub diminishing_returns_threshold: f64,
    /// Hard cap on the estimated depth budget
    pub depth_cap: usize,
    /// UCT exploration weight (C)
    pub uct_exploration: f64,
    /// UCT denominator guard (E)
    pub uct_epsilon: f64,
    /// Attempts at re-eliciting a reply that carries a score tag
    pub score_parse_retries: u32,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            candidates_per_expansion: 3,
            reward_samples: 3,
            overscore_penalty: 5.0,
            terminal_score_threshold: 90.0,
            diminishing_returns_threshold: 5.0,
            depth_cap: 8,
            uct_exploration: 1.5,
            uct_epsilon: 1e-6,
            score_parse_retries: 10,
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.parse::<T>().ok())
}

impl SearchConfig {
    /// Defaults overlaid with `THOUGHTTREE_*` environment overrides.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            candidates_per_expansion: env_parse("THOUGHTTREE_CANDIDATES")
                .unwrap_or(defaults.candidates_per_expansion),
            reward_samples: env_parse("THOUGHTTREE_REWARD_SAMPLES")
                .unwrap_or(defaults.reward_samples),
            overscore_penalty: env_parse("THOUGHTTREE_OVERSCORE_PENALTY")
                .unwrap_or(defaults.overscore_penalty),
            terminal_score_threshold: env_parse("THOUGHTTREE_TERMINAL_SCORE")
                .unwrap_or(defaults.terminal_score_threshold),
            diminishing_returns_threshold: env_parse("THOUGHTTREE_DIMINISHING_THRESHOLD")
                .unwrap_or(defaults.diminishing_returns_threshold),
            depth_cap: env_parse("THOUGHTTREE_DEPTH_CAP").unwrap_or(defaults.depth_cap),
            uct_exploration: env_parse("THOUGHTTREE_UCT_C").unwrap_or(defaults.uct_exploration),
            uct_epsilon: env_parse("THOUGHTTREE_UCT_E").unwrap_or(defaults.uct_epsilon),
            score_parse_retries: env_parse("THOUGHTTREE_SCORE_RETRIES")
                .unwrap_or(defaults.score_parse_retries),
        }
    }

    /// Reject degenerate settings before any oracle traffic happens.
    pub fn validate(&self) -> Result<()> {
        if self.candidates_per_expansion == 0 {
            return Err(ThoughtTreeError::Config(
                "candidates_per_expansion must be at least 1".into(),
            ));
        }
        if self.reward_samples == 0 {
            return Err(ThoughtTreeError::Config(
                "reward_samples must be at least 1".into(),
            ));
        }
        if self.depth_cap == 0 {
            return Err(ThoughtTreeError::Config("depth_cap must be at least 1".into()));
        }
        if self.score_parse_retries == 0 {
            return Err(ThoughtTreeError::Config(
                "score_parse_retries must be at least 1".into(),
            ));
        }
        if self.uct_epsilon <= 0.0 {
            return Err(ThoughtTreeError::Config("uct_epsilon must be positive".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        assert!(SearchConfig::default().validate().is_ok());
    }

    #[test]
    fn zero_candidates_rejected() {
        let config = SearchConfig {
            candidates_per_expansion: 0,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ThoughtTreeError::Config(_))
        ));
    }

    #[test]
    fn zero_reward_samples_rejected() {
        let config = SearchConfig {
            reward_samples: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn zero_depth_cap_rejected() {
        let config = SearchConfig {
            depth_cap: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
