use serde::{Deserialize, Serialize};

/// Handle into the tree arena.
///
/// Nodes own their children through handles; `parent` is a plain
/// back-reference, so the arena never forms an ownership cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(usize);

/// Why the search stopped at a node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TerminalReason {
    DefiniteCompletion,
    DiminishingReturns,
    MaxDepthReached,
}

/// One step of reasoning in the thought tree
#[derive(Debug)]
pub struct ThoughtNode {
    /// Refined reasoning content, immutable once set; empty at the root
    pub thought: String,
    /// Aggregate quality estimate (Q), roughly [-100, 100]
    pub score: f64,
    /// Reward samples that produced `score` (N); set once after scoring
    pub visits: u32,
    /// UCT value, recomputed by the parent each round
    pub selection_value: f64,
    pub terminal: Option<TerminalReason>,
    pub parent: Option<NodeId>,
    pub children: Vec<NodeId>,
}

/// Candidate produced by an expansion round, fully formed before attachment
#[derive(Debug)]
pub struct Candidate {
    pub thought: String,
    pub score: f64,
    pub visits: u32,
    pub terminal: Option<TerminalReason>,
}

/// Arena of thought nodes for a single user turn
pub struct ThoughtTree {
    nodes: Vec<ThoughtNode>,
}

impl ThoughtTree {
    pub fn new() -> Self {
        Self {
            nodes: vec![ThoughtNode {
                thought: String::new(),
                score: 0.0,
                visits: 0,
                selection_value: 0.0,
                terminal: None,
                parent: None,
                children: Vec::new(),
            }],
        }
    }

    pub fn root(&self) -> NodeId {
        NodeId(0)
    }

    pub fn get(&self, id: NodeId) -> &ThoughtNode {
        &self.nodes[id.0]
    }

    pub fn get_mut(&mut self, id: NodeId) -> &mut ThoughtNode {
        &mut self.nodes[id.0]
    }

    pub fn is_root(&self, id: NodeId) -> bool {
        id.0 == 0
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Always false in practice: the arena is seeded with the root
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        &self.nodes[id.0].children
    }

    pub fn attach(&mut self, parent: NodeId, candidate: Candidate) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(ThoughtNode {
            thought: candidate.thought,
            score: candidate.score,
            visits: candidate.visits,
            selection_value: 0.0,
            terminal: candidate.terminal,
            parent: Some(parent),
            children: Vec::new(),
        });
        self.nodes[parent.0].children.push(id);
        id
    }

    /// Edges between the root and `id`; the root itself is at depth 0
    pub fn depth(&self, id: NodeId) -> usize {
        let mut depth = 0;
        let mut cursor = self.nodes[id.0].parent;
        while let Some(up) = cursor {
            depth += 1;
            cursor = self.nodes[up.0].parent;
        }
        depth
    }

    /// Node handles from the root down to and including `id`
    fn lineage(&self, id: NodeId) -> Vec<NodeId> {
        let mut chain = vec![id];
        let mut cursor = self.nodes[id.0].parent;
        while let Some(up) = cursor {
            chain.push(up);
            cursor = self.nodes[up.0].parent;
        }
        chain.reverse();
        chain
    }

    /// Q-values from the root down to and including `id`
    pub fn score_history(&self, id: NodeId) -> Vec<f64> {
        self.lineage(id)
            .into_iter()
            .map(|n| self.nodes[n.0].score)
            .collect()
    }

    fn render_block(&self, chain: &[NodeId]) -> String {
        let steps: Vec<&str> = chain.iter().map(|n| self.nodes[n.0].thought.as_str()).collect();
        format!("<thoughts>\n{}\n</thoughts>", steps.join("\n\n"))
    }

    /// Thought chain root..=`id` rendered as a thoughts block
    pub fn thought_block(&self, id: NodeId) -> String {
        self.render_block(&self.lineage(id))
    }

    /// Thoughts of the strict ancestors of `id`, rendered as a block.
    ///
    /// A node expands against its ancestors' reasoning only; its own step
    /// is not part of the drafting context.
    pub fn context_block(&self, id: NodeId) -> String {
        let chain = self.lineage(id);
        self.render_block(&chain[..chain.len() - 1])
    }
}

impl Default for ThoughtTree {
    fn default() -> Self {
        Self::new()
    }
}
