// Licensed to the Apache Software Foundation (ASF) under one
// or more contributor license agreements.  See the NOTICE file
// distributed with this work for additional information
// regarding copyright ownership.  The ASF licenses this file
// to you under the Apache License, Version 2.0 (the
// "License"); you may not use this file except in compliance
// with the License.  You may obtain a copy of the License at
//
//   http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing,
// software distributed under the License is distributed on an
// "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied.  See the License for the
// specific language governing permissions and limitations
// under the License.

//! AMQP-style pattern-matching trie.
//!
//! Patterns are dot-separated segments; `*` matches exactly one segment,
//! `#` matches zero or more. Terminal nodes carry subscribers (id + name).
//! Nodes live in an index-based arena with a free list, children are owned
//! `Vec`s of node ids, and every traversal (matching, listing, teardown)
//! uses an explicit work stack, so arbitrarily deep patterns cannot
//! overflow the call stack.

pub mod snapshot;

use std::collections::HashSet;

/// One dot-separated component of a pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Literal(String),
    Star,
    Hash,
}

impl Segment {
    fn parse(text: &str) -> Self {
        match text {
            "*" => Self::Star,
            "#" => Self::Hash,
            literal => Self::Literal(literal.to_string()),
        }
    }

    fn as_str(&self) -> &str {
        match self {
            Self::Literal(literal) => literal,
            Self::Star => "*",
            Self::Hash => "#",
        }
    }
}

/// An (id, name) pair attached to a terminal pattern node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subscriber {
    pub id: u64,
    pub name: String,
}

pub(crate) type NodeId = usize;

#[derive(Debug, Clone)]
pub(crate) struct Node {
    pub(crate) segment: Segment,
    pub(crate) children: Vec<NodeId>,
    pub(crate) subscribers: Vec<Subscriber>,
    pub(crate) terminal: bool,
}

impl Node {
    fn new(segment: Segment) -> Self {
        Self {
            segment,
            children: Vec::new(),
            subscribers: Vec::new(),
            terminal: false,
        }
    }
}

/// The routing trie. Node 0 is the root and is never freed.
#[derive(Debug, Clone)]
pub struct PatternTrie {
    pub(crate) nodes: Vec<Node>,
    free: Vec<NodeId>,
}

impl Default for PatternTrie {
    fn default() -> Self {
        Self::new()
    }
}

impl PatternTrie {
    pub fn new() -> Self {
        Self {
            nodes: vec![Node::new(Segment::Literal(String::new()))],
            free: Vec::new(),
        }
    }

    pub(crate) const ROOT: NodeId = 0;

    fn alloc(&mut self, segment: Segment) -> NodeId {
        match self.free.pop() {
            Some(id) => {
                self.nodes[id] = Node::new(segment);
                id
            }
            None => {
                self.nodes.push(Node::new(segment));
                self.nodes.len() - 1
            }
        }
    }

    fn find_child(&self, node: NodeId, segment: &Segment) -> Option<NodeId> {
        self.nodes[node]
            .children
            .iter()
            .copied()
            .find(|&child| self.nodes[child].segment == *segment)
    }

    /// Walk `pattern`, returning the node path (excluding the root), or
    /// `None` when some segment is missing.
    fn walk(&self, pattern: &str) -> Option<Vec<NodeId>> {
        let mut path = Vec::new();
        let mut node = Self::ROOT;
        for text in pattern.split('.') {
            let segment = Segment::parse(text);
            node = self.find_child(node, &segment)?;
            path.push(node);
        }
        Some(path)
    }

    /// Add `subscriber` under `pattern`, creating nodes as needed.
    ///
    /// Re-adding an id that is already subscribed updates the name in
    /// place. Returns `false` for an empty pattern.
    pub fn add(&mut self, pattern: &str, subscriber: Subscriber) -> bool {
        if pattern.is_empty() {
            return false;
        }
        let mut node = Self::ROOT;
        for text in pattern.split('.') {
            let segment = Segment::parse(text);
            node = match self.find_child(node, &segment) {
                Some(child) => child,
                None => {
                    let child = self.alloc(segment);
                    self.nodes[node].children.push(child);
                    child
                }
            };
        }
        self.nodes[node].terminal = true;
        let subscribers = &mut self.nodes[node].subscribers;
        match subscribers.iter_mut().find(|s| s.id == subscriber.id) {
            Some(existing) => existing.name = subscriber.name,
            None => subscribers.push(subscriber),
        }
        true
    }

    /// Remove a whole pattern with all its subscribers. Returns whether
    /// the pattern existed.
    pub fn remove(&mut self, pattern: &str) -> bool {
        let Some(path) = self.walk(pattern) else {
            return false;
        };
        let Some(&leaf) = path.last() else {
            return false;
        };
        if !self.nodes[leaf].terminal {
            return false;
        }
        self.nodes[leaf].terminal = false;
        self.nodes[leaf].subscribers.clear();
        self.prune(&path);
        true
    }

    /// Remove one subscriber from a pattern; the pattern disappears when
    /// its last subscriber does. Returns whether the subscriber existed.
    pub fn unsubscribe(&mut self, pattern: &str, id: u64) -> bool {
        let Some(path) = self.walk(pattern) else {
            return false;
        };
        let Some(&leaf) = path.last() else {
            return false;
        };
        let node = &mut self.nodes[leaf];
        if !node.terminal {
            return false;
        }
        let before = node.subscribers.len();
        node.subscribers.retain(|s| s.id != id);
        if node.subscribers.len() == before {
            return false;
        }
        if node.subscribers.is_empty() {
            node.terminal = false;
            self.prune(&path);
        }
        true
    }

    /// Free childless non-terminal nodes along `path`, leaf to root.
    fn prune(&mut self, path: &[NodeId]) {
        for window in (1..=path.len()).rev() {
            let node = path[window - 1];
            if self.nodes[node].terminal || !self.nodes[node].children.is_empty() {
                break;
            }
            let parent = if window >= 2 { path[window - 2] } else { Self::ROOT };
            self.nodes[parent].children.retain(|&c| c != node);
            self.nodes[node].subscribers = Vec::new();
            self.free.push(node);
        }
    }

    /// All subscribers whose patterns match `input`, deduplicated by id in
    /// discovery order.
    pub fn matches(&self, input: &str) -> Vec<&Subscriber> {
        let segments: Vec<&str> = input.split('.').collect();
        let mut results = Vec::new();
        let mut seen_subscribers = HashSet::new();
        let mut visited = HashSet::new();
        let mut stack = vec![(Self::ROOT, 0_usize)];

        while let Some((node, index)) = stack.pop() {
            if !visited.insert((node, index)) {
                continue;
            }
            if index == segments.len() && self.nodes[node].terminal {
                for subscriber in &self.nodes[node].subscribers {
                    if seen_subscribers.insert(subscriber.id) {
                        results.push(subscriber);
                    }
                }
            }
            for &child in &self.nodes[node].children {
                match &self.nodes[child].segment {
                    Segment::Literal(literal) => {
                        if index < segments.len() && literal == segments[index] {
                            stack.push((child, index + 1));
                        }
                    }
                    Segment::Star => {
                        if index < segments.len() {
                            stack.push((child, index + 1));
                        }
                    }
                    Segment::Hash => {
                        for next in index..=segments.len() {
                            stack.push((child, next));
                        }
                    }
                }
            }
        }
        results
    }

    /// Every stored pattern, in trie order.
    pub fn patterns(&self) -> Vec<String> {
        let mut patterns = Vec::new();
        let mut stack: Vec<(NodeId, String)> = self.nodes[Self::ROOT]
            .children
            .iter()
            .rev()
            .map(|&child| (child, self.nodes[child].segment.as_str().to_string()))
            .collect();

        while let Some((node, pattern)) = stack.pop() {
            if self.nodes[node].terminal {
                patterns.push(pattern.clone());
            }
            for &child in self.nodes[node].children.iter().rev() {
                let mut extended = pattern.clone();
                extended.push('.');
                extended.push_str(self.nodes[child].segment.as_str());
                stack.push((child, extended));
            }
        }
        patterns
    }

    /// Number of stored patterns (terminal nodes).
    pub fn pattern_count(&self) -> usize {
        self.live_nodes().filter(|&id| self.nodes[id].terminal).count()
    }

    /// Number of live nodes, the root included.
    pub fn node_count(&self) -> usize {
        self.nodes.len() - self.free.len()
    }

    /// Total subscribers across all patterns.
    pub fn subscriber_count(&self) -> usize {
        self.live_nodes()
            .map(|id| self.nodes[id].subscribers.len())
            .sum()
    }

    fn live_nodes(&self) -> impl Iterator<Item = NodeId> + '_ {
        // Freed ids sit in `free`; everything else is reachable.
        let free: HashSet<NodeId> = self.free.iter().copied().collect();
        (0..self.nodes.len()).filter(move |id| !free.contains(id))
    }
}
