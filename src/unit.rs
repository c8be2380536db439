//! Functions and units (spec §3.3): the containers that own node arenas.

use std::collections::HashMap;

use crate::node::{Node, NodeId, NodeKind};
use crate::ty::Type;

/// A struct type declared at unit scope (spec §3.2 `TypeDecl`).
///
/// Spec §3.3 pins a `Unit` to "an ordered linked list of `FnDecl` nodes";
/// struct declarations are therefore kept as a side table on [`Unit`] rather
/// than folded into the same linked list, which would contradict that line.
/// Noted in DESIGN.md as a resolved Open Question.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TypeDecl {
    pub name: String,
    pub fields: Vec<(String, Type)>,
}

/// A function's argument list, body, and the arena both live in.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Function {
    pub name: String,
    pub ret_ty: Type,
    /// Sequential local index -> declaring `Alloca`/`AllocaArray` node.
    /// Stable across the reorder pass, since reordering only edits the
    /// linked-list `prev`/`next` chain, never `NodeId`s.
    pub locals: Vec<NodeId>,
    /// Local indices of the parameters, in declaration order.
    pub params: Vec<u32>,
    pub entry: Option<NodeId>,
    nodes: Vec<Node>,
    next_instr_idx: u32,
}

impl Function {
    pub fn new(name: impl Into<String>, ret_ty: Type) -> Self {
        Function {
            name: name.into(),
            ret_ty,
            locals: Vec::new(),
            params: Vec::new(),
            entry: None,
            nodes: Vec::new(),
            next_instr_idx: 0,
        }
    }

    pub fn get(&self, id: NodeId) -> &Node {
        &self.nodes[id.0 as usize]
    }

    pub fn get_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id.0 as usize]
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Allocates a node in the arena without linking it into the list. The
    /// caller is responsible for wiring `prev`/`next` - see
    /// [`Function::push_back`] for the common case.
    pub fn alloc(&mut self, kind: NodeKind) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        let instr_idx = self.next_instr_idx;
        self.next_instr_idx += 1;
        self.nodes.push(Node::new(instr_idx, kind));
        id
    }

    /// Allocates a node and appends it after the current tail of the body
    /// list, or makes it the entry if the body is empty.
    pub fn push_back(&mut self, tail: &mut Option<NodeId>, kind: NodeKind) -> NodeId {
        let id = self.alloc(kind);
        match *tail {
            None => {
                self.entry.get_or_insert(id);
            }
            Some(prev_id) => {
                self.get_mut(prev_id).next = Some(id);
                self.get_mut(id).prev = Some(prev_id);
            }
        }
        *tail = Some(id);
        id
    }

    /// Inserts `id` immediately before `before`, relinking `prev`/`next`.
    /// Used by SSA construction to place a phi at the head of a block.
    pub fn insert_before(&mut self, before: NodeId, id: NodeId) {
        let prev = self.get(before).prev;
        self.get_mut(id).prev = prev;
        self.get_mut(id).next = Some(before);
        self.get_mut(before).prev = Some(id);
        if let Some(p) = prev {
            self.get_mut(p).next = Some(id);
        } else if self.entry == Some(before) {
            self.entry = Some(id);
        }
    }

    /// The "unlink and free" primitive (spec §5): removes `id` from the
    /// linked list and clears its CFG edges, fixing up neighbors atomically.
    /// The arena slot is retained (as a dangling, unreferenced `Node`) so
    /// that `NodeId`s handed out earlier never dangle across a deletion;
    /// only list/CFG membership is invalidated.
    pub fn unlink(&mut self, id: NodeId) {
        let (prev, next) = {
            let n = self.get(id);
            (n.prev, n.next)
        };
        match prev {
            Some(p) => self.get_mut(p).next = next,
            None => self.entry = next,
        }
        if let Some(n) = next {
            self.get_mut(n).prev = prev;
        }
        for p in std::mem::take(&mut self.get_mut(id).preds) {
            self.get_mut(p).succs.retain(|&s| s != id);
        }
        for s in std::mem::take(&mut self.get_mut(id).succs) {
            self.get_mut(s).preds.retain(|&p| p != id);
        }
        let n = self.get_mut(id);
        n.prev = None;
        n.next = None;
    }

    /// Walks the body in list order starting from the entry.
    pub fn iter(&self) -> FunctionIter<'_> {
        FunctionIter {
            func: self,
            cursor: self.entry,
        }
    }

    pub fn node_ids(&self) -> Vec<NodeId> {
        self.iter().map(|(id, _)| id).collect()
    }

    /// Looks up the declaring alloca node for a local symbol index.
    pub fn local_node(&self, idx: u32) -> Option<NodeId> {
        self.locals.get(idx as usize).copied()
    }
}

pub struct FunctionIter<'a> {
    func: &'a Function,
    cursor: Option<NodeId>,
}

impl<'a> Iterator for FunctionIter<'a> {
    type Item = (NodeId, &'a Node);

    fn next(&mut self) -> Option<Self::Item> {
        let id = self.cursor?;
        let node = self.func.get(id);
        self.cursor = node.next;
        Some((id, node))
    }
}

/// A translation unit: named functions plus any struct declarations.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Unit {
    pub type_decls: Vec<TypeDecl>,
    pub functions: Vec<Function>,
}

impl Unit {
    pub fn new() -> Self {
        Unit::default()
    }

    pub fn function(&self, name: &str) -> Option<&Function> {
        self.functions.iter().find(|f| f.name == name)
    }

    pub fn function_mut(&mut self, name: &str) -> Option<&mut Function> {
        self.functions.iter_mut().find(|f| f.name == name)
    }

    /// `name -> (ret type)` for every function, built once by the type pass
    /// (spec §4.3 step 1) and read-only thereafter.
    pub fn signatures(&self) -> HashMap<String, Type> {
        self.functions
            .iter()
            .map(|f| (f.name.clone(), f.ret_ty.clone()))
            .collect()
    }
}
