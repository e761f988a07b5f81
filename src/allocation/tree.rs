//! # Allocation Tree
//!
//! Records which archetype instance was generated from which. Nodes live in
//! an arena keyed by [`NodeId`]; parent and child links are identifiers.
//!
//! Child order is insertion order and is significant: searches and
//! listings visit children in the order they were added.

use crate::archetype::ArchetypeId;
use crate::rooms::RoomInstanceId;
use crate::{AllocationError, AllocationResult};
use log::error;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;

/// Identifier of a node in an [`AllocationTree`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodeId(pub usize);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "N{}", self.0)
    }
}

#[derive(Debug, Clone)]
struct TreeNode {
    archetype: ArchetypeId,
    room: Option<RoomInstanceId>,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

/// Parent/child structure over archetype instances.
///
/// # Examples
///
/// ```
/// use room_allocation::{AllocationTree, ArchetypeId};
///
/// let mut tree = AllocationTree::new();
/// let root = tree.initialise(ArchetypeId(0), None);
/// let child = tree.add_child(root, ArchetypeId(1), None).unwrap();
/// let grandchild = tree.add_child(child, ArchetypeId(2), None).unwrap();
///
/// tree.make_root(grandchild).unwrap();
/// assert_eq!(tree.root(), Some(grandchild));
/// assert_eq!(tree.node_count(), 3);
/// assert_eq!(tree.distance_between(root, grandchild).unwrap(), 2);
/// ```
#[derive(Debug, Clone, Default)]
pub struct AllocationTree {
    nodes: BTreeMap<NodeId, TreeNode>,
    root: Option<NodeId>,
    next_id: usize,
}

impl AllocationTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Discards every node and starts a new tree rooted at `archetype`.
    pub fn initialise(&mut self, archetype: ArchetypeId, room: Option<RoomInstanceId>) -> NodeId {
        self.nodes.clear();
        let id = self.allocate(archetype, room, None);
        self.root = Some(id);
        id
    }

    pub fn clear(&mut self) {
        self.nodes.clear();
        self.root = None;
    }

    fn allocate(
        &mut self,
        archetype: ArchetypeId,
        room: Option<RoomInstanceId>,
        parent: Option<NodeId>,
    ) -> NodeId {
        let id = NodeId(self.next_id);
        self.next_id += 1;
        self.nodes.insert(
            id,
            TreeNode {
                archetype,
                room,
                parent,
                children: Vec::new(),
            },
        );
        id
    }

    fn node(&self, id: NodeId) -> AllocationResult<&TreeNode> {
        self.nodes
            .get(&id)
            .ok_or_else(|| AllocationError::UnknownNode(id.to_string()))
    }

    fn node_mut(&mut self, id: NodeId) -> AllocationResult<&mut TreeNode> {
        self.nodes
            .get_mut(&id)
            .ok_or_else(|| AllocationError::UnknownNode(id.to_string()))
    }

    pub fn root(&self) -> Option<NodeId> {
        self.root
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.nodes.contains_key(&id)
    }

    pub fn archetype(&self, id: NodeId) -> Option<ArchetypeId> {
        self.nodes.get(&id).map(|n| n.archetype)
    }

    pub fn room(&self, id: NodeId) -> Option<RoomInstanceId> {
        self.nodes.get(&id).and_then(|n| n.room)
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes.get(&id).and_then(|n| n.parent)
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        self.nodes
            .get(&id)
            .map(|n| n.children.as_slice())
            .unwrap_or(&[])
    }

    /// Appends a new node under `parent`.
    pub fn add_child(
        &mut self,
        parent: NodeId,
        archetype: ArchetypeId,
        room: Option<RoomInstanceId>,
    ) -> AllocationResult<NodeId> {
        self.node(parent)?;
        let child = self.allocate(archetype, room, Some(parent));
        self.node_mut(parent)?.children.push(child);
        Ok(child)
    }

    /// Appends a new node under the node holding `parent`.
    pub fn add_to_parent_archetype(
        &mut self,
        parent: ArchetypeId,
        archetype: ArchetypeId,
        room: Option<RoomInstanceId>,
    ) -> AllocationResult<NodeId> {
        let node = self.find(parent).ok_or_else(|| {
            AllocationError::UnknownArchetype(format!("{} is not in the allocation tree", parent))
        })?;
        self.add_child(node, archetype, room)
    }

    /// Depth-first pre-order search below `from`, self before children.
    pub fn find_by_archetype(&self, from: NodeId, archetype: ArchetypeId) -> Option<NodeId> {
        let mut stack = vec![from];
        while let Some(id) = stack.pop() {
            let node = self.nodes.get(&id)?;
            if node.archetype == archetype {
                return Some(id);
            }
            stack.extend(node.children.iter().rev());
        }
        None
    }

    /// Searches the whole tree from its root.
    pub fn find(&self, archetype: ArchetypeId) -> Option<NodeId> {
        self.root.and_then(|root| self.find_by_archetype(root, archetype))
    }

    /// Records the materialized room of `archetype`.
    pub fn update_room(
        &mut self,
        archetype: ArchetypeId,
        room: Option<RoomInstanceId>,
    ) -> AllocationResult<()> {
        match self.find(archetype) {
            Some(node) => {
                self.node_mut(node)?.room = room;
                Ok(())
            }
            None => {
                error!("Could not find archetype {} in tree", archetype);
                Err(AllocationError::UnknownArchetype(format!(
                    "{} is not in the allocation tree",
                    archetype
                )))
            }
        }
    }

    /// Removes every descendant of `node` and empties its child list.
    ///
    /// `node` itself stays attached to its parent; use [`detach`](Self::detach)
    /// to unlink it. Returns the archetypes of the removed descendants.
    pub fn remove_subtree(&mut self, node: NodeId) -> AllocationResult<Vec<ArchetypeId>> {
        let children = std::mem::take(&mut self.node_mut(node)?.children);
        let mut removed = Vec::new();
        let mut stack = children;
        while let Some(id) = stack.pop() {
            if let Some(descendant) = self.nodes.remove(&id) {
                removed.push(descendant.archetype);
                stack.extend(descendant.children);
            }
        }
        Ok(removed)
    }

    /// Unlinks `node` from its parent's child list and drops it.
    ///
    /// Any remaining children of `node` become parentless and unreachable,
    /// so callers clear them first with [`remove_subtree`](Self::remove_subtree).
    pub fn detach(&mut self, node: NodeId) -> AllocationResult<ArchetypeId> {
        if self.root == Some(node) {
            return Err(AllocationError::InvalidState(format!(
                "cannot detach the root node {}",
                node
            )));
        }
        let removed = self
            .nodes
            .remove(&node)
            .ok_or_else(|| AllocationError::UnknownNode(node.to_string()))?;
        if let Some(parent) = removed.parent {
            self.node_mut(parent)?.children.retain(|c| *c != node);
        }
        for orphan in &removed.children {
            if let Some(child) = self.nodes.get_mut(orphan) {
                child.parent = None;
            }
        }
        Ok(removed.archetype)
    }

    /// Makes `node` the root by reversing every edge on its path to the
    /// current root. A no-op if `node` already is the root.
    pub fn make_root(&mut self, node: NodeId) -> AllocationResult<()> {
        let mut path = vec![node];
        let mut current = self.node(node)?.parent;
        while let Some(id) = current {
            path.push(id);
            current = self.node(id)?.parent;
        }
        if path.len() < 2 {
            return Ok(());
        }

        // path runs from node up to the old root; flip each edge in turn
        for pair in path.windows(2).rev() {
            let (child, parent) = (pair[0], pair[1]);
            let parent_node = self.node_mut(parent)?;
            parent_node.children.retain(|c| *c != child);
            parent_node.parent = Some(child);
            self.node_mut(child)?.children.push(parent);
        }
        self.node_mut(node)?.parent = None;
        self.root = Some(node);
        Ok(())
    }

    /// Number of edges between the node and the root.
    pub fn depth(&self, node: NodeId) -> AllocationResult<usize> {
        let mut depth = 0;
        let mut current = self.node(node)?.parent;
        while let Some(id) = current {
            depth += 1;
            current = self.node(id)?.parent;
            if depth > self.nodes.len() {
                return Err(self.violation(format!("cycle above node {}", node)));
            }
        }
        Ok(depth)
    }

    /// Number of edges on the tree path between `a` and `b`.
    ///
    /// The path runs through the lowest common ancestor of the two nodes,
    /// not through the root, so siblings are always two edges apart.
    ///
    /// Both nodes must belong to the same tree; a missing path is a broken
    /// invariant and is reported as
    /// [`AllocationError::TreeConsistencyViolation`].
    pub fn distance_between(&self, a: NodeId, b: NodeId) -> AllocationResult<usize> {
        let mut ancestors_of_a = HashMap::new();
        let mut steps = 0;
        let mut current = Some(a);
        while let Some(id) = current {
            ancestors_of_a.insert(id, steps);
            steps += 1;
            current = self.node(id)?.parent;
        }

        let mut steps = 0;
        let mut current = Some(b);
        while let Some(id) = current {
            if let Some(from_a) = ancestors_of_a.get(&id) {
                return Ok(from_a + steps);
            }
            steps += 1;
            current = self.node(id)?.parent;
        }

        Err(self.violation(format!("could not establish link between {} and {}", a, b)))
    }

    /// Number of nodes reachable from the root.
    pub fn node_count(&self) -> usize {
        self.reachable().len()
    }

    /// Nodes reachable from the root in pre-order.
    pub fn reachable(&self) -> Vec<NodeId> {
        let mut order = Vec::new();
        let mut stack: Vec<NodeId> = self.root.into_iter().collect();
        while let Some(id) = stack.pop() {
            if let Some(node) = self.nodes.get(&id) {
                order.push(id);
                stack.extend(node.children.iter().rev());
            }
        }
        order
    }

    /// Archetypes of every node reachable from the root.
    pub fn archetypes(&self) -> Vec<ArchetypeId> {
        self.reachable()
            .into_iter()
            .filter_map(|id| self.archetype(id))
            .collect()
    }

    /// Nodes whose archetype no longer exists according to `exists`.
    pub fn clean<F>(&self, exists: F) -> Vec<NodeId>
    where
        F: Fn(ArchetypeId) -> bool,
    {
        self.reachable()
            .into_iter()
            .filter(|id| self.archetype(*id).is_some_and(|a| !exists(a)))
            .collect()
    }

    /// Printable listing of the tree, one node per line, indented by depth.
    pub fn describe(&self) -> String {
        let mut out = String::new();
        let mut stack: Vec<(NodeId, usize)> = self.root.map(|r| (r, 0)).into_iter().collect();
        while let Some((id, depth)) = stack.pop() {
            let Some(node) = self.nodes.get(&id) else {
                continue;
            };
            let label = if depth == 0 { "Tree Root" } else { "Child" };
            out.push_str(&format!(
                "{}{}: {} ({}){}\n",
                "  ".repeat(depth),
                label,
                node.archetype,
                id,
                if node.room.is_some() { " [room]" } else { "" }
            ));
            stack.extend(node.children.iter().rev().map(|c| (*c, depth + 1)));
        }
        out
    }

    fn violation(&self, message: String) -> AllocationError {
        error!("Allocation tree invariant broken: {}", message);
        AllocationError::TreeConsistencyViolation(message)
    }
}
