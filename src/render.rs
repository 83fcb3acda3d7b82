//! The action-node walker: drives loops and conditions against the data
//! source, reduces each literal line, and accumulates the output buffer.

use crate::action::{ActionTree, NodeKind};
use crate::data::DataSource;
use crate::element::{AttrMap, ExpressionTree};
use crate::error::RenderError;
use crate::expr;
use crate::postprocess::{collapse_escapes, postprocess};
use crate::resolve::Reduced;
use indexmap::IndexMap;
use log::warn;

/// A resolved line equal to this marker is dropped from the output.
pub const SKIP_MARKER: &str = "%skip%";

/// Ancestor attribute maps, innermost first. Loop/Condition parameters
/// shadow the configuration table through this chain.
#[derive(Debug, Clone, Default)]
pub struct ScopeChain {
    pub frames: Vec<AttrMap>,
}

impl ScopeChain {
    pub fn lookup(&self, name: &str) -> Option<String> {
        let key = name.to_ascii_lowercase();
        self.frames.iter().find_map(|f| f.get(&key).cloned())
    }
}

/// Per-render mutable state. Rebuilt for every render invocation; nothing
/// here survives across renders.
#[derive(Debug, Default)]
pub struct RenderSession {
    pub component: Option<String>,
    pub element: Option<String>,
    /// Stack of (component, element) pairs used to restore outer loop
    /// selection, tolerant of uneven returns from inner levels.
    pub follower: Vec<(Option<String>, Option<String>)>,
    /// Config entries written by `SetValue` during this render; consulted
    /// before the data source's table.
    pub config_overrides: IndexMap<String, String>,
    pub output: Vec<String>,
    pub dirty: bool,
}

/// Lines produced since the last explicit save, plus whether any exist.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderOutput {
    pub lines: Vec<String>,
    pub dirty: bool,
}

/// Walks one [`ActionTree`] against a data source. One renderer per render.
pub struct Renderer<'d> {
    pub data: &'d mut dyn DataSource,
    pub session: RenderSession,
}

/// Which selection a loop iteration applies. A `None` component keeps the
/// current one; the element is always replaced (cleared for component-level
/// iterations).
#[derive(Debug, Clone)]
struct LoopCandidate {
    component: Option<String>,
    element: Option<String>,
}

impl<'d> Renderer<'d> {
    pub fn new(data: &'d mut dyn DataSource) -> Self {
        Self {
            data,
            session: RenderSession::default(),
        }
    }

    /// Walk the whole tree and return the post-processed output.
    pub fn run(&mut self, tree: &mut ActionTree) -> RenderOutput {
        let roots = tree.roots.clone();
        self.walk_list(tree, &roots);
        let unit = self.indent_unit();
        let lines = collapse_escapes(&postprocess(&self.session.output, &unit));
        self.session.output.clear();
        let dirty = !lines.is_empty();
        RenderOutput { lines, dirty }
    }

    fn walk_list(&mut self, t: &mut ActionTree, ids: &[usize]) {
        for &id in ids {
            self.walk(t, id);
        }
    }

    fn walk(&mut self, t: &mut ActionTree, id: usize) {
        match t.nodes[id].kind {
            NodeKind::Line => self.walk_line(t, id),
            NodeKind::Condition => self.walk_condition(t, id),
            NodeKind::Loop => self.walk_loop(t, id),
        }
    }

    fn walk_line(&mut self, t: &mut ActionTree, id: usize) {
        let scope = self.scope_chain(t, id);
        let reduced = match self.reduce(&t.nodes[id].tree, &scope) {
            Ok(r) => r,
            Err(RenderError::FixpointOverflow { max, text }) => {
                warn!("line did not settle after {max} passes; emitting best effort");
                Reduced {
                    text,
                    skip: false,
                    node_sets: Vec::new(),
                }
            }
        };
        if !reduced.node_sets.is_empty() {
            let target = attr_target(t, id);
            for (name, value) in &reduced.node_sets {
                t.nodes[target].tree.set_attr(name, value.clone());
            }
        }
        if reduced.text == SKIP_MARKER || reduced.skip {
            return;
        }
        self.session.output.push(reduced.text);
        self.session.dirty = true;
    }

    fn walk_condition(&mut self, t: &mut ActionTree, id: usize) {
        let scope = self.scope_chain(t, id);
        let guard = t.nodes[id].tree.attr("expression").map(String::from);
        if self.guard_passes(guard.as_deref(), &scope) {
            let kids = t.nodes[id].children.clone();
            self.walk_list(t, &kids);
        }
    }

    fn walk_loop(&mut self, t: &mut ActionTree, id: usize) {
        let scope = self.scope_chain(t, id);
        let candidates = self.loop_candidates(t, id, &scope);
        let guard = t.nodes[id].tree.attr("expression").map(String::from);

        // Pass 1 (lookahead): find which candidates pass the guard, so the
        // emission pass knows the last one up front.
        let saved = (self.session.component.clone(), self.session.element.clone());
        let mut passing = Vec::new();
        for (i, cand) in candidates.iter().enumerate() {
            self.apply_candidate(cand);
            if self.guard_passes(guard.as_deref(), &scope) {
                passing.push(i);
            }
        }
        self.session.component = saved.0;
        self.session.element = saved.1;

        // Pass 2 (emission).
        let total = passing.len();
        for (k, &ci) in passing.iter().enumerate() {
            let depth = self.session.follower.len();
            self.session
                .follower
                .push((self.session.component.clone(), self.session.element.clone()));
            self.apply_candidate(&candidates[ci]);
            {
                let tree = &mut t.nodes[id].tree;
                tree.set_attr("isfirst", if k == 0 { "true" } else { "false" });
                tree.set_attr("islast", if k + 1 == total { "true" } else { "false" });
            }
            let kids = t.nodes[id].children.clone();
            self.walk_list(t, &kids);
            // Pop back to this iteration's depth, tolerating whatever an
            // inner loop left behind, and restore the recorded selection.
            self.session.follower.truncate(depth + 1);
            if let Some((c, e)) = self.session.follower.pop() {
                self.session.component = c;
                self.session.element = e;
            }
        }
    }

    fn loop_candidates(
        &mut self,
        t: &ActionTree,
        id: usize,
        scope: &ScopeChain,
    ) -> Vec<LoopCandidate> {
        let node = &t.nodes[id];
        let level = node
            .tree
            .attr("level")
            .map(|s| s.to_ascii_lowercase())
            .unwrap_or_else(|| "component".to_string());
        let source = node.tree.attr("source").map(String::from);
        let src_list = source.map(|src| self.reduce_list(&src, scope));

        if level == "element" {
            if let Some(entries) = src_list {
                if self.session.component.is_none() {
                    warn!("element loop with a source but no current component iterates nothing");
                    return Vec::new();
                }
                return entries
                    .into_iter()
                    .map(|e| LoopCandidate {
                        component: None,
                        element: Some(e),
                    })
                    .collect();
            }
            if let Some(component) = self.session.component.clone() {
                return self
                    .data
                    .entry_names(&component)
                    .into_iter()
                    .map(|e| LoopCandidate {
                        component: None,
                        element: Some(e),
                    })
                    .collect();
            }
            // No selection: iterate entries across every default component.
            let mut out = Vec::new();
            for component in self.data.component_names() {
                for entry in self.data.entry_names(&component) {
                    out.push(LoopCandidate {
                        component: Some(component.clone()),
                        element: Some(entry),
                    });
                }
            }
            out
        } else {
            let names = src_list.unwrap_or_else(|| self.data.component_names());
            names
                .into_iter()
                .map(|c| LoopCandidate {
                    component: Some(c),
                    element: None,
                })
                .collect()
        }
    }

    fn apply_candidate(&mut self, cand: &LoopCandidate) {
        if let Some(c) = &cand.component {
            self.session.component = Some(c.clone());
        }
        self.session.element = cand.element.clone();
    }

    /// Reduce a source expression and split it into a name list.
    fn reduce_list(&mut self, text: &str, scope: &ScopeChain) -> Vec<String> {
        self.reduce_text(text, scope)
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from)
            .collect()
    }

    /// Reduce a fragment of template text to flat text, logging instead of
    /// failing on overflow.
    pub(crate) fn reduce_text(&mut self, text: &str, scope: &ScopeChain) -> String {
        match self.reduce(&ExpressionTree::parse(text), scope) {
            Ok(r) => {
                if !r.node_sets.is_empty() {
                    warn!("SetNodeValue has no target in attribute position; ignored");
                }
                r.text
            }
            Err(RenderError::FixpointOverflow { max, text }) => {
                warn!("fragment did not settle after {max} passes");
                text
            }
        }
    }

    /// Evaluate a guard expression; absent or blank guards pass, malformed
    /// guards are logged and fail.
    fn guard_passes(&mut self, guard: Option<&str>, scope: &ScopeChain) -> bool {
        let Some(guard) = guard else { return true };
        if guard.trim().is_empty() {
            return true;
        }
        let resolved = self.reduce_text(guard, scope);
        match expr::evaluate(resolved.trim()) {
            Ok(pass) => pass,
            Err(e) => {
                warn!("guard {guard:?} failed to evaluate ({e}); treated as false");
                false
            }
        }
    }

    /// Collect the Loop/Condition attribute maps from `id` up to the root,
    /// innermost first.
    pub(crate) fn scope_chain(&self, t: &ActionTree, id: usize) -> ScopeChain {
        let mut frames = Vec::new();
        let mut cur = Some(id);
        while let Some(idx) = cur {
            let node = &t.nodes[idx];
            if node.kind != NodeKind::Line {
                frames.push(node.tree.attrs.clone());
            }
            cur = node.parent;
        }
        ScopeChain { frames }
    }

    pub(crate) fn indent_unit(&mut self) -> String {
        let scope = ScopeChain::default();
        let ch = self
            .lookup_config(&scope, "TabCharacter")
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| "\t".to_string());
        let count = self
            .lookup_config(&scope, "TabCount")
            .and_then(|s| s.trim().parse().ok())
            .unwrap_or(1usize);
        ch.repeat(count)
    }

    /// Post-process and hand off everything accumulated so far, then start
    /// the buffer fresh (the `SaveFile` command).
    pub(crate) fn save_now(&mut self, name: Option<&str>) {
        let unit = self.indent_unit();
        let lines = collapse_escapes(&postprocess(&self.session.output, &unit));
        self.data.save_output(name, lines);
        self.session.output.clear();
        self.session.dirty = false;
    }
}

/// Where `SetNodeValue` writes land: the node itself for Loop/Condition
/// lines, otherwise the nearest enclosing block.
fn attr_target(t: &ActionTree, id: usize) -> usize {
    let mut cur = Some(id);
    while let Some(idx) = cur {
        if t.nodes[idx].kind != NodeKind::Line {
            return idx;
        }
        cur = t.nodes[idx].parent;
    }
    id
}
