//! Three-point estimation of the search depth budget.
//!
//! Before a turn's search starts, the model is asked three times how many
//! reasoning steps the query needs, under an optimistic, a most-likely and a
//! pessimistic framing. The framings are combined with a PERT-style weighted
//! mean and capped by the configured budget ceiling.

use thoughttree_core::{
    GenerationConfig, Message, Result, SearchConfig, ThoughtTreeError,
};
use thoughttree_engine::{prompts, score};
use thoughttree_llm::LlmProvider;
use tracing::{debug, warn};

pub const ESTIMATE_FRAMINGS: [&str; 3] = ["optimistic", "most likely", "pessimistic"];

/// `(optimistic + 4 * likely + pessimistic) / 6`, floored to an integer,
/// floored again at 1 and capped at `cap`
pub fn combine_estimates(optimistic: u64, likely: u64, pessimistic: u64, cap: usize) -> usize {
    let weighted = (optimistic + 4 * likely + pessimistic) / 6;
    (weighted.max(1) as usize).min(cap)
}

/// Elicit the three framed estimates and combine them into a depth budget.
///
/// `history` must end with the user's query; the estimation prompt replaces
/// that last message so the query is only stated once.
pub async fn estimate_depth_budget(
    provider: &dyn LlmProvider,
    history: &[Message],
    config: &SearchConfig,
    generation: &GenerationConfig,
) -> Result<usize> {
    let (query, base) = match history.split_last() {
        Some((last, base)) => (last.content.as_str(), base),
        None => {
            return Err(ThoughtTreeError::Config(
                "conversation transcript is empty".into(),
            ))
        }
    };

    let mut estimates = [0u64; 3];
    for (slot, framing) in estimates.iter_mut().zip(ESTIMATE_FRAMINGS) {
        let mut transcript = base.to_vec();
        transcript.push(Message::user(prompts::depth_estimate_prompt(query, framing)));
        let raw = elicit_integer(provider, &transcript, generation, config.score_parse_retries)
            .await?;
        // Individual estimates are floored at one step
        *slot = raw.max(1) as u64;
        debug!(framing, estimate = *slot, "depth estimate sample");
    }

    let budget = combine_estimates(estimates[0], estimates[1], estimates[2], config.depth_cap);
    debug!(?estimates, budget, "combined depth budget");
    Ok(budget)
}

async fn elicit_integer(
    provider: &dyn LlmProvider,
    transcript: &[Message],
    generation: &GenerationConfig,
    retries: u32,
) -> Result<i64> {
    for attempt in 1..=retries {
        let reply = provider.generate_chat(transcript, generation).await?.content;
        if let Some(value) = score::extract_score_tag(&reply) {
            return Ok(value);
        }
        warn!(attempt, "estimate reply carried no output tag, retrying");
    }
    Err(ThoughtTreeError::ScoreTagMissing { attempts: retries })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn weighted_mean_matches_the_documented_example() {
        // (2 + 4*3 + 10) / 6 = 4
        assert_eq!(combine_estimates(2, 3, 10, 8), 4);
    }

    #[test]
    fn combined_estimate_is_floored_at_one() {
        // (1 + 4 + 1) / 6 = 1 exactly; (0-ish inputs cannot occur, samples
        // are pre-floored) but integer division can still reach 0
        assert_eq!(combine_estimates(1, 1, 1, 8), 1);
        assert_eq!(combine_estimates(1, 1, 2, 8), 1);
    }

    #[test]
    fn combined_estimate_is_capped() {
        assert_eq!(combine_estimates(40, 40, 40, 8), 8);
        assert_eq!(combine_estimates(40, 40, 40, 3), 3);
    }
}
