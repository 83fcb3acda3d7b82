//! The reduce fixpoint: repeatedly substitute references and command
//! results inward-to-outward, re-parsing the flattened text until no
//! resolvable syntax remains.

use crate::element::{Delim, ElementKind, ExpressionTree};
use crate::error::RenderError;
use crate::render::{Renderer, ScopeChain};
use log::debug;

/// Passes before a reduce is declared non-terminating (a configuration
/// value referencing itself, directly or transitively).
pub const MAX_REDUCE_PASSES: usize = 64;

/// The outcome of reducing one line.
#[derive(Debug, Default)]
pub struct Reduced {
    pub text: String,
    /// Set when the line resolved empty and a command flagged it can-skip;
    /// the walker drops the line instead of emitting a blank.
    pub skip: bool,
    /// Deferred `SetNodeValue` writes for the owning node's attributes.
    pub node_sets: Vec<(String, String)>,
}

impl Renderer<'_> {
    /// Resolve a parsed line to flat text. The given tree is cloned first,
    /// so the stored parse stays reusable for the next iteration of the
    /// same block under a different selection.
    pub fn reduce(
        &mut self,
        tree: &ExpressionTree,
        scope: &ScopeChain,
    ) -> Result<Reduced, RenderError> {
        let mut can_skip = false;
        let mut node_sets = Vec::new();
        let mut work = tree.clone();

        for _pass in 0..MAX_REDUCE_PASSES {
            if !work.has_unresolved() {
                let text = work.render_root();
                let skip = can_skip && text.is_empty();
                return Ok(Reduced {
                    text,
                    skip,
                    node_sets,
                });
            }

            // Deepest first, then document order, so inner references are
            // flat by the time their enclosing command's parameters render.
            for idx in work.unresolved() {
                match work.arena[idx].kind {
                    ElementKind::ConfigRef => {
                        let name = work.inner_text(idx);
                        let name = name.trim();
                        let value = self.lookup_config(scope, name).unwrap_or_else(|| {
                            debug!("config reference {name:?} not found");
                            String::new()
                        });
                        work.splice_value(idx, &value);
                    }
                    ElementKind::FieldRef => {
                        let name = work.inner_text(idx);
                        let name = name.trim();
                        let value = self.lookup_field(name).unwrap_or_else(|| {
                            debug!("field reference {name:?} not found");
                            String::new()
                        });
                        work.splice_value(idx, &value);
                    }
                    ElementKind::Command => {
                        let name = work.command_name(idx);
                        let mut params = command_params(&work, idx);
                        // Substituted values may have introduced fresh
                        // references into the parameters; resolve them
                        // before dispatching.
                        if params.contains('{') || params.contains('[') {
                            let sub = self.reduce(&ExpressionTree::parse(&params), scope)?;
                            node_sets.extend(sub.node_sets);
                            params = sub.text;
                        }
                        let reply = self.run_command(scope, &name, &params);
                        can_skip |= reply.can_skip;
                        node_sets.extend(reply.node_sets);
                        work.splice_value(idx, &reply.text);
                    }
                    _ => {}
                }
            }

            // Values spliced in may themselves contain reference syntax;
            // re-parse the flat text and go again until stable.
            let flat = work.render_root();
            work = ExpressionTree::parse(&flat);
        }

        Err(RenderError::FixpointOverflow {
            max: MAX_REDUCE_PASSES,
            text: work.render_root(),
        })
    }

    /// Config lookup order: enclosing block attributes, then values set
    /// during this render, then the supplied table.
    pub(crate) fn lookup_config(&mut self, scope: &ScopeChain, name: &str) -> Option<String> {
        if let Some(v) = scope.lookup(name) {
            return Some(v);
        }
        let key = name.to_ascii_lowercase();
        if let Some(v) = self
            .session
            .config_overrides
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(&key))
            .map(|(_, v)| v.clone())
        {
            return Some(v);
        }
        self.data.config_value(name)
    }

    /// Field lookup with an optional scope prefix: `element:`/`entry:`/
    /// `field:` target the current record, `component:`/`object:` the
    /// sheet's base definition. Unprefixed names try the current record,
    /// the base definition, then any record in the sheet.
    pub(crate) fn lookup_field(&mut self, name: &str) -> Option<String> {
        let component = self.session.component.clone()?;
        if let Some((prefix, rest)) = name.split_once(':') {
            let rest = rest.trim();
            return match prefix.trim().to_ascii_lowercase().as_str() {
                "element" | "entry" | "field" => {
                    let entry = self.session.element.clone()?;
                    self.data.field(&component, Some(&entry), rest)
                }
                "component" | "object" => self.data.field(&component, None, rest),
                _ => None,
            };
        }
        if let Some(entry) = self.session.element.clone() {
            if let Some(v) = self.data.field(&component, Some(&entry), name) {
                return Some(v);
            }
        }
        if let Some(v) = self.data.field(&component, None, name) {
            return Some(v);
        }
        self.data.field_in_any_entry(&component, name)
    }
}

/// A command's resolved parameter text: its parameter-list children,
/// rendered and stripped of their parentheses.
fn command_params(tree: &ExpressionTree, idx: usize) -> String {
    let mut out = String::new();
    for &child in &tree.arena[idx].children {
        if tree.arena[child].delim == Some(Delim::Paren) {
            let rendered = tree.render(child);
            out.push_str(
                rendered
                    .trim_start_matches('(')
                    .trim_end_matches(')'),
            );
        }
    }
    out
}
