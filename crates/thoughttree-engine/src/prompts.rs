//! Prompt templates for the reasoning search.
//!
//! Templates carry `$QUERY` / `$THOUGHTS` / `$ESTIMATE_TYPE` placeholders
//! substituted by the helper functions below.

/// System prompt installed at the top of every conversation
pub const SYSTEM_PROMPT: &str = "You are a careful reasoning assistant. You think in small, explicit steps \
before answering. When asked for a numeric judgement you always include it \
inside <output></output> tags.";

/// Asks for the next reasoning step given the thoughts so far
pub const EXPANSION_PROMPT: &str = "Above, inside <thoughts></thoughts>, is your reasoning so far about my last \
request. Write the single next reasoning step. Do not answer the request \
yet and do not repeat earlier steps; produce one new step that moves the \
reasoning forward.";

/// Critiques a drafted step against the original query
pub const FEEDBACK_PROMPT: &str = "The original request was:\n\n$QUERY\n\nCritique the reasoning step you just \
wrote. Point out factual errors, logical gaps, and anything that drifts \
away from the request. Be specific and terse.";

/// Asks for a revision of the drafted step using the critique
pub const REFINE_PROMPT: &str = "The original request was:\n\n$QUERY\n\nRewrite the reasoning step, fixing \
every problem raised in the critique. Reply with the revised step only, no \
preamble and no commentary.";

/// Elicits a numeric quality judgement for a reasoning step
pub const EVALUATION_PROMPT: &str = "The original request was:\n\n$QUERY\n\nJudge how much the reasoning step \
above improves the chances of answering the request correctly. Reply with \
an integer from -100 (actively harmful) to 100 (the request is now fully \
resolved), wrapped as <output>SCORE</output>.";

/// Produces the final user-facing answer from the winning thought chain
pub const GENERATION_PROMPT: &str = "My request is:\n\n$QUERY\n\nYou have already reasoned about it:\n\n$THOUGHTS\n\nUsing that reasoning, answer the request directly. Do not mention the \
reasoning steps or these instructions.";

/// Elicits one three-point estimate of the reasoning steps needed
pub const DEPTH_ESTIMATE_PROMPT: &str = "My request is:\n\n$QUERY\n\nGive a $ESTIMATE_TYPE estimate of how many distinct reasoning steps you \
would need before answering it well. Reply with a single positive integer \
wrapped as <output>STEPS</output>.";

pub fn feedback_prompt(query: &str) -> String {
    FEEDBACK_PROMPT.replace("$QUERY", query)
}

pub fn refine_prompt(query: &str) -> String {
    REFINE_PROMPT.replace("$QUERY", query)
}

pub fn evaluation_prompt(query: &str) -> String {
    EVALUATION_PROMPT.replace("$QUERY", query)
}

pub fn generation_prompt(query: &str, thoughts: &str) -> String {
    GENERATION_PROMPT
        .replace("$QUERY", query)
        .replace("$THOUGHTS", thoughts)
}

pub fn depth_estimate_prompt(query: &str, estimate_type: &str) -> String {
    DEPTH_ESTIMATE_PROMPT
        .replace("$QUERY", query)
        .replace("$ESTIMATE_TYPE", estimate_type)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn placeholders_are_substituted() {
        let rendered = feedback_prompt("why is the sky blue?");
        assert!(rendered.contains("why is the sky blue?"));
        assert!(!rendered.contains("$QUERY"));

        let rendered = generation_prompt("q", "<thoughts>\nt\n</thoughts>");
        assert!(rendered.contains("<thoughts>"));
        assert!(!rendered.contains("$THOUGHTS"));

        let rendered = depth_estimate_prompt("q", "pessimistic");
        assert!(rendered.contains("pessimistic"));
        assert!(!rendered.contains("$ESTIMATE_TYPE"));
    }

    #[test]
    fn evaluation_prompt_demands_the_score_tag() {
        assert!(EVALUATION_PROMPT.contains("<output>"));
        assert!(DEPTH_ESTIMATE_PROMPT.contains("<output>"));
    }
}
