//! Token trie over lexicon phrases
//!
//! One node per distinct phrase prefix. Walking the trie token by token from
//! every start position finds every phrase occurrence in a single pass over
//! the text, independent of how many phrases the lexicon holds.

use std::collections::HashMap;

/// Arena index of a trie node.
pub type NodeIndex = usize;

#[derive(Debug, Clone, Default)]
struct TrieNode {
    children: HashMap<String, NodeIndex>,
    /// Lexicon rank of the phrase ending here
    terminal: Option<usize>,
}

/// Arena-backed token trie.
#[derive(Debug, Clone)]
pub struct PhraseTrie {
    nodes: Vec<TrieNode>,
}

impl Default for PhraseTrie {
    fn default() -> Self {
        Self::new()
    }
}

impl PhraseTrie {
    pub const ROOT: NodeIndex = 0;

    pub fn new() -> Self {
        Self {
            nodes: vec![TrieNode::default()],
        }
    }

    /// Insert a phrase. The first insertion of a token sequence wins.
    pub fn insert(&mut self, tokens: &[String], rank: usize) {
        let mut node = Self::ROOT;
        for token in tokens {
            node = match self.nodes[node].children.get(token) {
                Some(&next) => next,
                None => {
                    let next = self.nodes.len();
                    self.nodes.push(TrieNode::default());
                    self.nodes[node].children.insert(token.clone(), next);
                    next
                }
            };
        }
        self.nodes[node].terminal.get_or_insert(rank);
    }

    /// Follow one token from `node`.
    pub fn step(&self, node: NodeIndex, token: &str) -> Option<NodeIndex> {
        self.nodes[node].children.get(token).copied()
    }

    /// Lexicon rank of the phrase ending at `node`, if any.
    pub fn terminal(&self, node: NodeIndex) -> Option<usize> {
        self.nodes[node].terminal
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn toks(s: &str) -> Vec<String> {
        s.split(' ').map(str::to_string).collect()
    }

    #[test]
    fn test_walk_finds_nested_phrases() {
        let mut trie = PhraseTrie::new();
        trie.insert(&toks("large language models"), 0);
        trie.insert(&toks("language models"), 1);

        let large = trie.step(PhraseTrie::ROOT, "large").unwrap();
        assert_eq!(trie.terminal(large), None);
        let language = trie.step(large, "language").unwrap();
        let models = trie.step(language, "models").unwrap();
        assert_eq!(trie.terminal(models), Some(0));

        let language = trie.step(PhraseTrie::ROOT, "language").unwrap();
        let models = trie.step(language, "models").unwrap();
        assert_eq!(trie.terminal(models), Some(1));
    }

    #[test]
    fn test_shared_prefix_nodes() {
        let mut trie = PhraseTrie::new();
        trie.insert(&toks("neural network"), 0);
        trie.insert(&toks("neural networks"), 1);
        // root + neural + network + networks
        assert_eq!(trie.node_count(), 4);
    }

    #[test]
    fn test_first_insert_wins() {
        let mut trie = PhraseTrie::new();
        trie.insert(&toks("web"), 3);
        trie.insert(&toks("web"), 7);
        let web = trie.step(PhraseTrie::ROOT, "web").unwrap();
        assert_eq!(trie.terminal(web), Some(3));
    }

    #[test]
    fn test_missing_step() {
        let trie = PhraseTrie::new();
        assert!(trie.step(PhraseTrie::ROOT, "anything").is_none());
    }
}
