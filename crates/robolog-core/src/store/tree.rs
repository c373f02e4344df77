//! Hierarchical signal tree
//!
//! A nested mapping from path segments to either groups or leaves. The tree
//! is generic over the leaf type so the same walk/upsert logic serves the
//! offline matrix leaves, the realtime deque leaves and the text log.

use std::collections::BTreeMap;

use super::{join_path, StoreError};

/// A node in the signal tree
#[derive(Debug, Clone, PartialEq)]
pub enum SignalNode<L> {
    /// Internal node
    Group(BTreeMap<String, SignalNode<L>>),
    /// Terminal node
    Leaf(L),
}

impl<L> SignalNode<L> {
    /// The leaf, if this node is one
    pub fn as_leaf(&self) -> Option<&L> {
        match self {
            SignalNode::Leaf(leaf) => Some(leaf),
            SignalNode::Group(_) => None,
        }
    }
}

/// Root of a signal hierarchy
#[derive(Debug, Clone, PartialEq)]
pub struct SignalTree<L> {
    root: BTreeMap<String, SignalNode<L>>,
}

impl<L> Default for SignalTree<L> {
    fn default() -> Self {
        Self {
            root: BTreeMap::new(),
        }
    }
}

impl<L> SignalTree<L> {
    /// Empty tree
    pub fn new() -> Self {
        Self::default()
    }

    /// True when the tree holds no node at all
    pub fn is_empty(&self) -> bool {
        self.root.is_empty()
    }

    /// Drop every node
    pub fn clear(&mut self) {
        self.root.clear();
    }

    /// Resolve a path to any node
    pub fn resolve_node<S: AsRef<str>>(&self, path: &[S]) -> Option<&SignalNode<L>> {
        let (first, rest) = path.split_first()?;
        let mut node = self.root.get(first.as_ref())?;
        for segment in rest {
            node = match node {
                SignalNode::Group(children) => children.get(segment.as_ref())?,
                SignalNode::Leaf(_) => return None,
            };
        }
        Some(node)
    }

    /// Resolve a path to a leaf
    pub fn resolve<S: AsRef<str>>(&self, path: &[S]) -> Option<&L> {
        self.resolve_node(path).and_then(SignalNode::as_leaf)
    }

    /// Resolve a path to a leaf for mutation
    pub fn resolve_mut<S: AsRef<str>>(&mut self, path: &[S]) -> Option<&mut L> {
        let (last, parents) = path.split_last()?;
        match self.group_mut(parents)?.get_mut(last.as_ref())? {
            SignalNode::Leaf(leaf) => Some(leaf),
            SignalNode::Group(_) => None,
        }
    }

    /// True when `path` names a group or a leaf
    pub fn contains<S: AsRef<str>>(&self, path: &[S]) -> bool {
        self.resolve_node(path).is_some()
    }

    /// Walk `path`, creating missing groups and reusing existing ones, and
    /// return the leaf at its end. The leaf is created with `make` if absent.
    pub fn upsert_leaf<S, F>(&mut self, path: &[S], make: F) -> Result<&mut L, StoreError>
    where
        S: AsRef<str>,
        F: FnOnce() -> L,
    {
        let (last, parents) = path.split_last().ok_or(StoreError::EmptyPath)?;
        let children = self.ensure_group(parents, path)?;
        match children
            .entry(last.as_ref().to_string())
            .or_insert_with(|| SignalNode::Leaf(make()))
        {
            SignalNode::Leaf(leaf) => Ok(leaf),
            SignalNode::Group(_) => Err(conflict(path, last.as_ref())),
        }
    }

    /// Insert or replace the leaf at `path`, returning the previous one
    pub fn insert_leaf<S: AsRef<str>>(&mut self, path: &[S], leaf: L) -> Result<Option<L>, StoreError> {
        let (last, parents) = path.split_last().ok_or(StoreError::EmptyPath)?;
        let children = self.ensure_group(parents, path)?;
        match children.get_mut(last.as_ref()) {
            Some(SignalNode::Leaf(slot)) => Ok(Some(std::mem::replace(slot, leaf))),
            Some(SignalNode::Group(_)) => Err(conflict(path, last.as_ref())),
            None => {
                children.insert(last.as_ref().to_string(), SignalNode::Leaf(leaf));
                Ok(None)
            }
        }
    }

    /// Remove the node at `path`
    pub fn remove<S: AsRef<str>>(&mut self, path: &[S]) -> Option<SignalNode<L>> {
        let (last, parents) = path.split_last()?;
        self.group_mut(parents)?.remove(last.as_ref())
    }

    /// Every leaf path, depth first in key order
    pub fn leaf_paths(&self) -> Vec<Vec<String>> {
        let mut paths = Vec::new();
        let mut stack: Vec<(Vec<String>, &BTreeMap<String, SignalNode<L>>)> =
            vec![(Vec::new(), &self.root)];
        while let Some((prefix, children)) = stack.pop() {
            // Reverse so the stack yields keys in ascending order
            for (name, node) in children.iter().rev() {
                let mut path = prefix.clone();
                path.push(name.clone());
                match node {
                    SignalNode::Leaf(_) => paths.push(path),
                    SignalNode::Group(next) => stack.push((path, next)),
                }
            }
        }
        paths.sort();
        paths
    }

    /// Apply `f` to every leaf
    pub fn for_each_leaf_mut<F: FnMut(&[String], &mut L)>(&mut self, mut f: F) {
        fn walk<L, F: FnMut(&[String], &mut L)>(
            prefix: &mut Vec<String>,
            children: &mut BTreeMap<String, SignalNode<L>>,
            f: &mut F,
        ) {
            for (name, node) in children.iter_mut() {
                prefix.push(name.clone());
                match node {
                    SignalNode::Leaf(leaf) => f(prefix.as_slice(), leaf),
                    SignalNode::Group(next) => walk(prefix, next, f),
                }
                prefix.pop();
            }
        }
        walk(&mut Vec::new(), &mut self.root, &mut f);
    }

    /// Walk `parents`, creating missing groups. `full` is only used for errors.
    fn ensure_group<S: AsRef<str>>(
        &mut self,
        parents: &[S],
        full: &[S],
    ) -> Result<&mut BTreeMap<String, SignalNode<L>>, StoreError> {
        let mut children = &mut self.root;
        for segment in parents {
            let node = children
                .entry(segment.as_ref().to_string())
                .or_insert_with(|| SignalNode::Group(BTreeMap::new()));
            children = match node {
                SignalNode::Group(next) => next,
                SignalNode::Leaf(_) => return Err(conflict(full, segment.as_ref())),
            };
        }
        Ok(children)
    }

    fn group_mut<S: AsRef<str>>(&mut self, path: &[S]) -> Option<&mut BTreeMap<String, SignalNode<L>>> {
        let mut children = &mut self.root;
        for segment in path {
            children = match children.get_mut(segment.as_ref())? {
                SignalNode::Group(next) => next,
                SignalNode::Leaf(_) => return None,
            };
        }
        Some(children)
    }
}

fn conflict<S: AsRef<str>>(path: &[S], segment: &str) -> StoreError {
    StoreError::PathConflict {
        path: join_path(path),
        segment: segment.to_string(),
    }
}
