//! Block-structure builder: folds a flat list of template lines into a tree
//! whose nesting mirrors the Loop/Condition regions of the template.

use crate::element::{ElementKind, ExpressionTree};
use log::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    /// A plain output line.
    Line,
    /// A `{Loop(...)}` region; children are the loop body.
    Loop,
    /// A `{Condition(...)}` region; children are the guarded body.
    Condition,
}

/// One node of the block tree. The node owns its line's parsed form; the
/// tree attributes double as the node's attributes (loop name, level,
/// source, guard expression).
#[derive(Debug, Clone)]
pub struct ActionNode {
    pub kind: NodeKind,
    pub tree: ExpressionTree,
    pub children: Vec<usize>,
    pub parent: Option<usize>,
}

impl ActionNode {
    pub fn name(&self) -> Option<&str> {
        self.tree.attr("name")
    }
}

/// The block tree for one template render. Nodes live in an arena so parent
/// links are plain indices.
#[derive(Debug, Clone, Default)]
pub struct ActionTree {
    pub nodes: Vec<ActionNode>,
    pub roots: Vec<usize>,
}

/// The structural command found at a line's outermost nesting level.
#[derive(Debug, Clone, PartialEq)]
enum Structural {
    Continue { offset: usize },
    LoopStart,
    ConditionStart,
    LoopEnd,
    ConditionEnd,
    SaveFileSplit { offset: usize },
}

impl ActionTree {
    /// Assemble the tree from already include-expanded template lines.
    pub fn build(lines: &[String]) -> ActionTree {
        let mut lines: Vec<String> = lines.to_vec();
        let mut tree = ActionTree::default();
        // None = inserting at the top level.
        let mut insertion: Option<usize> = None;

        let mut i = 0;
        while i < lines.len() {
            let parsed = ExpressionTree::parse(&lines[i]);
            match outer_structural(&parsed) {
                Some(Structural::Continue { offset }) => {
                    // Fold the next line onto this one (truncated at the
                    // continue marker) and reprocess in place.
                    let mut merged = lines[i][..offset].to_string();
                    if i + 1 < lines.len() {
                        merged.push_str(&lines.remove(i + 1));
                    }
                    lines[i] = merged;
                }
                Some(Structural::SaveFileSplit { offset }) => {
                    // The save command starts its own line; everything before
                    // it stays here, and this index is reprocessed.
                    let tail = lines[i][offset..].to_string();
                    lines[i].truncate(offset);
                    lines.insert(i + 1, tail);
                }
                Some(Structural::LoopStart) => {
                    let id = tree.push(NodeKind::Loop, parsed, insertion);
                    insertion = Some(id);
                    i += 1;
                }
                Some(Structural::ConditionStart) => {
                    let id = tree.push(NodeKind::Condition, parsed, insertion);
                    insertion = Some(id);
                    i += 1;
                }
                Some(Structural::LoopEnd) => {
                    tree.close_block(NodeKind::Loop, parsed.attr("name"), &mut insertion);
                    i += 1;
                }
                Some(Structural::ConditionEnd) => {
                    tree.close_block(NodeKind::Condition, parsed.attr("name"), &mut insertion);
                    i += 1;
                }
                None => {
                    tree.push(NodeKind::Line, parsed, insertion);
                    i += 1;
                }
            }
        }
        tree
    }

    fn push(&mut self, kind: NodeKind, tree: ExpressionTree, insertion: Option<usize>) -> usize {
        let id = self.nodes.len();
        self.nodes.push(ActionNode {
            kind,
            tree,
            children: Vec::new(),
            parent: insertion,
        });
        match insertion {
            Some(parent) => self.nodes[parent].children.push(id),
            None => self.roots.push(id),
        }
        id
    }

    /// Close the innermost open block of `kind`; with a name, close all the
    /// way out to the matching named block. A name that matches nothing
    /// falls back to the nearest same-kind block.
    fn close_block(&mut self, kind: NodeKind, name: Option<&str>, insertion: &mut Option<usize>) {
        if let Some(wanted) = name {
            let mut cur = *insertion;
            while let Some(idx) = cur {
                let node = &self.nodes[idx];
                if node.kind == kind
                    && node.name().is_some_and(|n| n.eq_ignore_ascii_case(wanted))
                {
                    *insertion = node.parent;
                    return;
                }
                cur = node.parent;
            }
            warn!("no open {kind:?} block named {wanted:?}; closing the nearest one");
        }
        let mut cur = *insertion;
        while let Some(idx) = cur {
            if self.nodes[idx].kind == kind {
                *insertion = self.nodes[idx].parent;
                return;
            }
            cur = self.nodes[idx].parent;
        }
        warn!("end of {kind:?} block with none open; line dropped");
    }
}

/// Inspect only the outermost nesting level of a parsed line for the
/// structural command that decides how the builder treats it.
fn outer_structural(tree: &ExpressionTree) -> Option<Structural> {
    for &idx in &tree.root().children {
        let el = &tree.arena[idx];
        if el.kind != ElementKind::Command {
            continue;
        }
        let name = tree.command_name(idx).to_ascii_lowercase();
        match name.as_str() {
            "continue" => return Some(Structural::Continue { offset: el.offset }),
            "loop" => return Some(Structural::LoopStart),
            "condition" => return Some(Structural::ConditionStart),
            "endloop" => return Some(Structural::LoopEnd),
            "endcondition" => return Some(Structural::ConditionEnd),
            "savefile" if el.offset > 0 => {
                return Some(Structural::SaveFileSplit { offset: el.offset })
            }
            _ => {}
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lines(strs: &[&str]) -> Vec<String> {
        strs.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn flat_lines_become_root_line_nodes() {
        let tree = ActionTree::build(&lines(&["a", "b", "c"]));
        assert_eq!(tree.roots.len(), 3);
        assert!(tree.nodes.iter().all(|n| n.kind == NodeKind::Line));
    }

    #[test]
    fn loop_blocks_nest_their_body() {
        let tree = ActionTree::build(&lines(&[
            "{Loop(Name:Outer)}",
            "body",
            "{EndLoop}",
            "after",
        ]));
        assert_eq!(tree.roots.len(), 2);
        let outer = &tree.nodes[tree.roots[0]];
        assert_eq!(outer.kind, NodeKind::Loop);
        assert_eq!(outer.children.len(), 1);
        assert_eq!(tree.nodes[outer.children[0]].kind, NodeKind::Line);
        assert_eq!(tree.nodes[tree.roots[1]].kind, NodeKind::Line);
    }

    #[test]
    fn unnamed_end_closes_the_innermost_block() {
        let tree = ActionTree::build(&lines(&[
            "{Loop(Name:A)}",
            "{Loop(Name:B)}",
            "inner",
            "{EndLoop}",
            "outer tail",
            "{EndLoop}",
        ]));
        assert_eq!(tree.roots.len(), 1);
        let a = &tree.nodes[tree.roots[0]];
        assert_eq!(a.name(), Some("A"));
        // B plus the trailing line live under A.
        assert_eq!(a.children.len(), 2);
        let b = &tree.nodes[a.children[0]];
        assert_eq!(b.name(), Some("B"));
        assert_eq!(b.children.len(), 1);
    }

    #[test]
    fn named_end_closes_out_to_the_named_block() {
        let tree = ActionTree::build(&lines(&[
            "{Loop(Name:A)}",
            "{Loop(Name:B)}",
            "inner",
            "{EndLoop(Name:A)}",
            "top again",
        ]));
        // The named end escapes both open loops at once.
        assert_eq!(tree.roots.len(), 2);
        assert_eq!(tree.nodes[tree.roots[1]].kind, NodeKind::Line);
    }

    #[test]
    fn conditions_and_loops_close_independently() {
        let tree = ActionTree::build(&lines(&[
            "{Loop(Name:A)}",
            "{Condition(Expression:1=1)}",
            "guarded",
            "{EndCondition}",
            "{EndLoop}",
        ]));
        let a = &tree.nodes[tree.roots[0]];
        assert_eq!(a.children.len(), 1);
        let cond = &tree.nodes[a.children[0]];
        assert_eq!(cond.kind, NodeKind::Condition);
        assert_eq!(cond.children.len(), 1);
    }

    #[test]
    fn continue_merges_with_the_next_line() {
        let tree = ActionTree::build(&lines(&["Hello, {Continue}", "World"]));
        assert_eq!(tree.roots.len(), 1);
        assert_eq!(tree.nodes[tree.roots[0]].tree.render_root(), "Hello, World");
    }

    #[test]
    fn continue_on_the_last_line_just_truncates() {
        let tree = ActionTree::build(&lines(&["tail {Continue}"]));
        assert_eq!(tree.roots.len(), 1);
        assert_eq!(tree.nodes[tree.roots[0]].tree.render_root(), "tail ");
    }

    #[test]
    fn mid_line_savefile_is_split_onto_its_own_line() {
        let tree = ActionTree::build(&lines(&["last line{SaveFile}"]));
        assert_eq!(tree.roots.len(), 2);
        assert_eq!(tree.nodes[tree.roots[0]].tree.render_root(), "last line");
        assert_eq!(tree.nodes[tree.roots[1]].tree.render_root(), "{SaveFile}");
    }

    #[test]
    fn leading_savefile_is_left_alone() {
        let tree = ActionTree::build(&lines(&["{SaveFile(out)}"]));
        assert_eq!(tree.roots.len(), 1);
        assert_eq!(tree.nodes[tree.roots[0]].kind, NodeKind::Line);
    }

    #[test]
    fn stray_end_is_dropped() {
        let tree = ActionTree::build(&lines(&["{EndLoop}", "after"]));
        assert_eq!(tree.roots.len(), 1);
        assert_eq!(tree.nodes[tree.roots[0]].tree.render_root(), "after");
    }
}
