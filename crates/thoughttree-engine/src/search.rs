use crate::prompts;
use crate::score;
use crate::tree::{Candidate, NodeId, TerminalReason, ThoughtTree};
use async_stream::stream;
use futures::Stream;
use serde::Serialize;
use std::sync::Arc;
use thoughttree_core::{GenerationConfig, Message, Result, SearchConfig, ThoughtTreeError};
use thoughttree_llm::LlmProvider;
use tracing::{debug, info, warn};

/// Progress emitted after each search round; the terminating element carries
/// `finished = true` and a reason.
#[derive(Debug, Clone, Serialize)]
pub struct SearchSnapshot {
    pub finished: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<TerminalReason>,
    /// Thought chain root -> frontier, rendered as a thoughts block
    pub thoughts: String,
    /// Frontier node's Q-value
    pub score: f64,
}

/// Drives the expand / score / backpropagate / select cycle over a thought
/// tree, one tree per user turn.
pub struct SearchEngine {
    provider: Arc<dyn LlmProvider>,
    config: SearchConfig,
    generation: GenerationConfig,
}

impl SearchEngine {
    pub fn new(
        provider: Arc<dyn LlmProvider>,
        config: SearchConfig,
        generation: GenerationConfig,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            provider,
            config,
            generation,
        })
    }

    /// Run the search for one user turn.
    ///
    /// `history` is the externally owned conversation transcript ending in
    /// the user's query; `depth_budget` bounds the tree depth. The returned
    /// stream is lazy and finite: zero or more unfinished snapshots, then
    /// exactly one finished snapshot (or an error, which ends the turn).
    pub fn run(
        &self,
        history: Vec<Message>,
        depth_budget: usize,
    ) -> Result<impl Stream<Item = Result<SearchSnapshot>> + '_> {
        if depth_budget == 0 {
            return Err(ThoughtTreeError::Config(
                "depth budget must be at least 1".into(),
            ));
        }
        let query = history
            .last()
            .map(|m| m.content.clone())
            .ok_or_else(|| {
                ThoughtTreeError::Config("conversation transcript is empty".into())
            })?;

        Ok(stream! {
            let mut tree = ThoughtTree::new();
            let mut frontier = tree.root();
            let mut round = 0usize;

            loop {
                if let Some(reason) = tree.get(frontier).terminal {
                    info!(
                        rounds = round,
                        score = tree.get(frontier).score,
                        ?reason,
                        "search finished"
                    );
                    yield Ok(SearchSnapshot {
                        finished: true,
                        reason: Some(reason),
                        thoughts: tree.thought_block(frontier),
                        score: tree.get(frontier).score,
                    });
                    return;
                }

                yield Ok(SearchSnapshot {
                    finished: false,
                    reason: None,
                    thoughts: tree.thought_block(frontier),
                    score: tree.get(frontier).score,
                });

                debug!(round, nodes = tree.len(), "expanding frontier");
                if let Err(e) = self
                    .expand(&mut tree, frontier, &history, &query, depth_budget)
                    .await
                {
                    yield Err(e);
                    return;
                }

                self.backpropagate(&mut tree, frontier);
                self.update_selection_values(&mut tree, frontier);
                // Expansion always attaches at least one child
                frontier = self
                    .select_child(&tree, frontier)
                    .expect("expanded node has children");
                round += 1;
            }
        })
    }

    /// Generate up to K candidate children for `node` and attach them.
    ///
    /// Each candidate goes through draft, critique, refine and M-sample
    /// scoring before its terminal reason is decided. Once a non-root node
    /// produces a child better than itself, the rest of the round is
    /// skipped.
    async fn expand(
        &self,
        tree: &mut ThoughtTree,
        node: NodeId,
        history: &[Message],
        query: &str,
        depth_budget: usize,
    ) -> Result<()> {
        let context = tree.context_block(node);
        let node_score = tree.get(node).score;
        let ancestor_scores = tree.score_history(node);
        let child_depth = tree.depth(node) + 1;

        for i in 0..self.config.candidates_per_expansion {
            debug!(
                candidate = i + 1,
                total = self.config.candidates_per_expansion,
                "drafting reasoning step"
            );
            let mut transcript = history.to_vec();
            transcript.push(Message::assistant(context.clone()));
            transcript.push(Message::user(prompts::EXPANSION_PROMPT));
            let draft = self
                .provider
                .generate_chat(&transcript, &self.generation)
                .await?
                .content;
            transcript.push(Message::assistant(draft));

            debug!("critiquing drafted step");
            transcript.push(Message::user(prompts::feedback_prompt(query)));
            let critique = self
                .provider
                .generate_chat(&transcript, &self.generation)
                .await?
                .content;
            transcript.push(Message::assistant(critique));

            debug!("refining drafted step");
            transcript.push(Message::user(prompts::refine_prompt(query)));
            let thought = self
                .provider
                .generate_chat(&transcript, &self.generation)
                .await?
                .content;

            let mut eval_transcript = history.to_vec();
            eval_transcript.push(Message::assistant(context.clone()));
            eval_transcript.push(Message::user(prompts::EXPANSION_PROMPT));
            eval_transcript.push(Message::assistant(thought.clone()));
            eval_transcript.push(Message::user(prompts::evaluation_prompt(query)));
            let samples = self.sample_rewards(&eval_transcript).await?;

            let score = score::aggregate(&samples);
            let visits = self.config.reward_samples as u32;
            let terminal =
                self.terminal_reason(score, &ancestor_scores, child_depth, depth_budget);

            info!(candidate = i + 1, score, ?terminal, "attached candidate");
            tree.attach(
                node,
                Candidate {
                    thought,
                    score,
                    visits,
                    terminal,
                },
            );

            // Greedy bail-out: compares against the expanding node itself,
            // not the best sibling of this round
            if !tree.is_root(node) && score > node_score {
                debug!(
                    skipped = self.config.candidates_per_expansion - i - 1,
                    "candidate beats its parent, ending round early"
                );
                break;
            }
        }
        Ok(())
    }

    /// Collect M adjusted reward samples for a candidate step
    async fn sample_rewards(&self, transcript: &[Message]) -> Result<Vec<f64>> {
        let mut samples = Vec::with_capacity(self.config.reward_samples);
        for s in 0..self.config.reward_samples {
            debug!(sample = s + 1, total = self.config.reward_samples, "scoring step");
            let raw = self.elicit_score(transcript).await?;
            samples.push(score::adjust_sample(raw, self.config.overscore_penalty));
        }
        Ok(samples)
    }

    /// Re-ask until the reply carries a score tag, up to the retry bound
    async fn elicit_score(&self, transcript: &[Message]) -> Result<i64> {
        for attempt in 1..=self.config.score_parse_retries {
            let reply = self
                .provider
                .generate_chat(transcript, &self.generation)
                .await?
                .content;
            if let Some(value) = score::extract_score_tag(&reply) {
                return Ok(value);
            }
            warn!(attempt, "evaluation reply carried no score tag, retrying");
        }
        Err(ThoughtTreeError::ScoreTagMissing {
            attempts: self.config.score_parse_retries,
        })
    }

    /// Terminality policy, strict precedence: definite completion, then
    /// diminishing returns, then max depth.
    fn terminal_reason(
        &self,
        score: f64,
        ancestor_scores: &[f64],
        depth: usize,
        depth_budget: usize,
    ) -> Option<TerminalReason> {
        if score >= self.config.terminal_score_threshold {
            return Some(TerminalReason::DefiniteCompletion);
        }
        // Needs at least two ancestor Q-values to form a difference
        if ancestor_scores.len() >= 2 {
            let flat = ancestor_scores
                .windows(2)
                .all(|w| (w[1] - w[0]).abs() < self.config.diminishing_returns_threshold);
            if flat {
                return Some(TerminalReason::DiminishingReturns);
            }
        }
        if depth >= depth_budget {
            return Some(TerminalReason::MaxDepthReached);
        }
        None
    }

    /// Walk from the expanded node to the root, pulling each Q-value halfway
    /// toward its best child's
    fn backpropagate(&self, tree: &mut ThoughtTree, from: NodeId) {
        let mut cursor = Some(from);
        while let Some(id) = cursor {
            let best_child = tree
                .children(id)
                .iter()
                .map(|c| tree.get(*c).score)
                .fold(f64::NEG_INFINITY, f64::max);
            if best_child.is_finite() {
                let node = tree.get_mut(id);
                node.score = 0.5 * (node.score + best_child);
            }
            cursor = tree.get(id).parent;
        }
    }

    /// Recompute UCT selection values for the children of `node`
    fn update_selection_values(&self, tree: &mut ThoughtTree, node: NodeId) {
        let base = tree.get(node).score;
        let ln_visits = ((tree.get(node).visits as f64) + 1.0).ln();
        let children: Vec<NodeId> = tree.children(node).to_vec();
        for child_id in children {
            let child = tree.get_mut(child_id);
            child.selection_value = base
                + self.config.uct_exploration
                    * (ln_visits / (child.visits as f64 + self.config.uct_epsilon)).sqrt();
        }
    }

    /// Argmax over the children's selection values; the first maximum wins
    /// so ties break deterministically by encounter order
    fn select_child(&self, tree: &ThoughtTree, node: NodeId) -> Option<NodeId> {
        let mut best: Option<(NodeId, f64)> = None;
        for &child in tree.children(node) {
            let value = tree.get(child).selection_value;
            match best {
                Some((_, best_value)) if value <= best_value => {}
                _ => best = Some((child, value)),
            }
        }
        best.map(|(id, _)| id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use thoughttree_llm::{LlmResponse, LlmStream};

    struct NullProvider;

    #[async_trait]
    impl LlmProvider for NullProvider {
        async fn generate_chat(
            &self,
            _messages: &[Message],
            _config: &GenerationConfig,
        ) -> Result<LlmResponse> {
            Err(ThoughtTreeError::Provider("no oracle in this test".into()))
        }

        async fn generate_chat_stream(
            &self,
            _messages: &[Message],
            _config: &GenerationConfig,
        ) -> Result<LlmStream> {
            Err(ThoughtTreeError::Provider("no oracle in this test".into()))
        }

        async fn is_available(&self) -> bool {
            false
        }

        fn model_name(&self) -> &str {
            "null"
        }
    }

    fn engine(config: SearchConfig) -> SearchEngine {
        SearchEngine::new(Arc::new(NullProvider), config, GenerationConfig::default()).unwrap()
    }

    fn child(tree: &mut ThoughtTree, parent: NodeId, score: f64, visits: u32) -> NodeId {
        tree.attach(
            parent,
            Candidate {
                thought: format!("step {score}"),
                score,
                visits,
                terminal: None,
            },
        )
    }

    #[test]
    fn invalid_config_is_rejected_eagerly() {
        let config = SearchConfig {
            reward_samples: 0,
            ..Default::default()
        };
        assert!(SearchEngine::new(
            Arc::new(NullProvider),
            config,
            GenerationConfig::default()
        )
        .is_err());
    }

    #[test]
    fn zero_depth_budget_is_rejected() {
        let engine = engine(SearchConfig::default());
        assert!(engine.run(vec![Message::user("q")], 0).is_err());
        assert!(engine.run(Vec::new(), 3).is_err());
    }

    #[test]
    fn backpropagation_blends_halfway_toward_best_child() {
        let eng = engine(SearchConfig::default());
        let mut tree = ThoughtTree::new();
        let root = tree.root();
        let a = child(&mut tree, root, 40.0, 3);
        child(&mut tree, a, 80.0, 3);
        child(&mut tree, a, 20.0, 3);

        eng.backpropagate(&mut tree, a);
        // a: 0.5 * (40 + 80); root: 0.5 * (0 + 60)
        assert_eq!(tree.get(a).score, 60.0);
        assert_eq!(tree.score_history(a), vec![30.0, 60.0]);
    }

    #[test]
    fn backpropagation_decays_toward_best_child() {
        let eng = engine(SearchConfig::default());
        let mut tree = ThoughtTree::new();
        let root = tree.root();
        child(&mut tree, root, 50.0, 3);

        eng.backpropagate(&mut tree, root);
        assert_eq!(tree.get(root).score, 25.0);
        // Repeated rounds with unchanged children keep halving the gap; the
        // blend is a fixed point only once parent and best child agree
        eng.backpropagate(&mut tree, root);
        assert_eq!(tree.get(root).score, 37.5);

        tree.get_mut(root).score = 50.0;
        eng.backpropagate(&mut tree, root);
        assert_eq!(tree.get(root).score, 50.0);
    }

    #[test]
    fn selection_prefers_under_sampled_children() {
        let eng = engine(SearchConfig::default());
        let mut tree = ThoughtTree::new();
        let root = tree.root();
        let a = child(&mut tree, root, 10.0, 3);
        let b = child(&mut tree, a, 5.0, 9);
        let c = child(&mut tree, a, 5.0, 1);

        eng.update_selection_values(&mut tree, a);
        // Same base score; fewer visits means a bigger exploration bonus
        assert!(tree.get(c).selection_value > tree.get(b).selection_value);
        assert_eq!(eng.select_child(&tree, a), Some(c));
    }

    #[test]
    fn selection_ties_break_to_first_child() {
        let eng = engine(SearchConfig::default());
        let mut tree = ThoughtTree::new();
        let root = tree.root();
        let a = child(&mut tree, root, 30.0, 3);
        let b = child(&mut tree, root, 70.0, 3);

        // Root has zero visits, so ln(0 + 1) = 0 wipes out the exploration
        // term: every child gets the same selection value
        eng.update_selection_values(&mut tree, root);
        assert_eq!(tree.get(a).selection_value, tree.get(b).selection_value);
        assert_eq!(eng.select_child(&tree, root), Some(a));
    }

    #[test]
    fn definite_completion_outranks_other_reasons() {
        let eng = engine(SearchConfig::default());
        // Flat ancestor history and exhausted depth, but the score clears
        // the completion threshold
        let reason = eng.terminal_reason(95.0, &[1.0, 2.0], 5, 5);
        assert_eq!(reason, Some(TerminalReason::DefiniteCompletion));
    }

    #[test]
    fn diminishing_returns_needs_two_history_points() {
        let eng = engine(SearchConfig::default());
        assert_eq!(eng.terminal_reason(10.0, &[0.0], 1, 5), None);
        assert_eq!(
            eng.terminal_reason(10.0, &[3.0, 4.0], 1, 5),
            Some(TerminalReason::DiminishingReturns)
        );
        // One large jump in the history defeats the check
        assert_eq!(eng.terminal_reason(10.0, &[3.0, 4.0, 60.0], 1, 5), None);
    }

    #[test]
    fn max_depth_is_the_fallback_reason() {
        let eng = engine(SearchConfig::default());
        assert_eq!(
            eng.terminal_reason(10.0, &[0.0], 3, 3),
            Some(TerminalReason::MaxDepthReached)
        );
        assert_eq!(eng.terminal_reason(10.0, &[0.0], 2, 3), None);
    }

    #[test]
    fn snapshot_serializes_like_the_wire_contract() {
        let snapshot = SearchSnapshot {
            finished: true,
            reason: Some(TerminalReason::MaxDepthReached),
            thoughts: "<thoughts>\n\n</thoughts>".into(),
            score: 12.5,
        };
        let json = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(json["finished"], true);
        assert_eq!(json["reason"], "max-depth-reached");

        let unfinished = SearchSnapshot {
            finished: false,
            reason: None,
            thoughts: String::new(),
            score: 0.0,
        };
        let json = serde_json::to_value(&unfinished).unwrap();
        assert!(json.get("reason").is_none());
    }
}
