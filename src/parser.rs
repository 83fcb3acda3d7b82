//! Line tokenizer: turns one line of template text into an [`ExpressionTree`].
//!
//! Scanning is a single pass over the characters with a "current element"
//! cursor. Open brackets descend into a new child (after writing the child's
//! placeholder tag into the parent's text), closers ascend. Doubled brackets
//! are hidden behind sentinel characters before the scan so they are never
//! mistaken for placeholder syntax, then restored once the tree is built.

use crate::element::{Delim, ElementKind, ExpressionTree};

// Length-preserving stand-ins for escaped (doubled) brackets. Using one
// sentinel per doubled character keeps every source offset valid.
const HIDE_OPEN_BRACE: char = '\u{11}';
const HIDE_CLOSE_BRACE: char = '\u{12}';
const HIDE_OPEN_BRACKET: char = '\u{13}';
const HIDE_CLOSE_BRACKET: char = '\u{14}';

fn hide_for(ch: char) -> Option<char> {
    match ch {
        '{' => Some(HIDE_OPEN_BRACE),
        '}' => Some(HIDE_CLOSE_BRACE),
        '[' => Some(HIDE_OPEN_BRACKET),
        ']' => Some(HIDE_CLOSE_BRACKET),
        _ => None,
    }
}

fn unhide(ch: char) -> char {
    match ch {
        HIDE_OPEN_BRACE => '{',
        HIDE_CLOSE_BRACE => '}',
        HIDE_OPEN_BRACKET => '[',
        HIDE_CLOSE_BRACKET => ']',
        other => other,
    }
}

fn hide_escapes(line: &str) -> String {
    let mut out = String::with_capacity(line.len());
    let mut chars = line.chars().peekable();
    while let Some(ch) = chars.next() {
        if let Some(hidden) = hide_for(ch) {
            if chars.peek() == Some(&ch) {
                chars.next();
                out.push(hidden);
                out.push(hidden);
                continue;
            }
        }
        out.push(ch);
    }
    out
}

impl ExpressionTree {
    /// Parse one line of template text.
    pub fn parse(line: &str) -> ExpressionTree {
        parse(line)
    }
}

pub fn parse(line: &str) -> ExpressionTree {
    let hidden = hide_escapes(line);
    let mut tree = ExpressionTree::new();
    let mut cur = ExpressionTree::ROOT;

    for (offset, ch) in hidden.char_indices() {
        match ch {
            '(' => {
                // A `(` directly after a config-reference turns it into a
                // command call; either way the parameter list becomes a new
                // child element.
                let el = &mut tree.arena[cur];
                if el.delim == Some(Delim::Brace) && el.kind == ElementKind::ConfigRef {
                    el.kind = ElementKind::Command;
                }
                cur = tree.push_child(cur, ElementKind::Literal, Delim::Paren, offset);
                tree.arena[cur].text.push('(');
            }
            '[' => {
                cur = tree.push_child(cur, ElementKind::FieldRef, Delim::Bracket, offset);
                tree.arena[cur].text.push('[');
            }
            '{' => {
                cur = tree.push_child(cur, ElementKind::ConfigRef, Delim::Brace, offset);
                tree.arena[cur].text.push('{');
            }
            ')' | ']' | '}' => {
                tree.arena[cur].text.push(ch);
                if ch == '}' {
                    reclassify_keyword(&mut tree, cur, offset);
                }
                // Any closer closes the innermost open group; a stray closer
                // at the root stays literal text.
                if let Some(parent) = tree.arena[cur].parent {
                    cur = parent;
                }
            }
            ',' => {
                tree.arena[cur].delimited = true;
                tree.arena[cur].text.push(',');
            }
            ':' => {
                tree.arena[cur].name_value = true;
                tree.arena[cur].text.push(':');
            }
            ';' => {
                tree.arena[cur].list = true;
                tree.arena[cur].text.push(';');
            }
            other => tree.arena[cur].text.push(other),
        }
    }

    restore_escapes(&mut tree);
    eliminate_false_variables(&mut tree);
    extract_attributes(&mut tree);
    tree
}

/// Recognize the zero-argument brace keywords when their `}` arrives.
/// `Continue`/`EndLoop`/`EndCondition`/`SaveFile` become commands;
/// `IncIndent`/`DecIndent` become delayed commands for the post-processor.
/// Each gets an empty parameter-list child so every command is a call.
fn reclassify_keyword(tree: &mut ExpressionTree, idx: usize, offset: usize) {
    let el = &tree.arena[idx];
    if el.kind != ElementKind::ConfigRef || !el.children.is_empty() {
        return;
    }
    let inner: String = el
        .text
        .trim_start_matches('{')
        .trim_end_matches('}')
        .trim()
        .to_ascii_lowercase();
    let kind = match inner.as_str() {
        "continue" | "endloop" | "endcondition" | "savefile" => ElementKind::Command,
        "incindent" | "decindent" => ElementKind::DelayedCommand,
        _ => return,
    };
    tree.arena[idx].kind = kind;
    // Re-open the element so the parameter tag lands before the `}`.
    tree.arena[idx].text.pop();
    tree.push_child(idx, ElementKind::Literal, Delim::Paren, offset);
    tree.arena[idx].text.push('}');
}

fn restore_escapes(tree: &mut ExpressionTree) {
    for el in &mut tree.arena {
        if el.text.chars().any(|c| {
            matches!(
                c,
                HIDE_OPEN_BRACE | HIDE_CLOSE_BRACE | HIDE_OPEN_BRACKET | HIDE_CLOSE_BRACKET
            )
        }) {
            el.text = el.text.chars().map(unhide).collect();
        }
    }
}

fn is_ident(s: &str, allow_dot: bool) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || (allow_dot && c == '.'))
}

fn well_delimited(tree: &ExpressionTree, idx: usize) -> bool {
    let el = &tree.arena[idx];
    match el.delim {
        Some(d) => el.text.starts_with(d.open()) && el.text.ends_with(d.close()),
        None => true,
    }
}

/// Demote speculative classifications whose literal text fails the naming
/// convention for the claimed kind. Until this pass has run once the flags
/// are advisory only.
fn eliminate_false_variables(tree: &mut ExpressionTree) {
    for idx in 1..tree.arena.len() {
        let demote = match tree.arena[idx].kind {
            ElementKind::ConfigRef => {
                !well_delimited(tree, idx)
                    || (tree.arena[idx].children.is_empty()
                        && !is_ident(tree.inner_text(idx).trim(), true))
            }
            ElementKind::FieldRef => {
                let inner = tree.inner_text(idx);
                let inner = inner.trim();
                let named_ok = match inner.split_once(':') {
                    Some((scope, name)) => is_ident(scope, false) && is_ident(name, false),
                    None => is_ident(inner, false),
                };
                !well_delimited(tree, idx) || (tree.arena[idx].children.is_empty() && !named_ok)
            }
            ElementKind::Command => {
                !well_delimited(tree, idx) || !is_ident(&tree.command_name(idx), false)
            }
            _ => false,
        };
        if demote {
            tree.arena[idx].kind = ElementKind::Literal;
        }
    }
}

/// Collect every `name:value` (optionally `;`-separated) token found in a
/// parameter list into the tree's attribute map, last write wins. The
/// split runs over the *tagged* text, where nested elements are still
/// opaque `@seq#id` tags, so a `;` or `:` inside a nested command never
/// truncates a value; fragments are rendered back to source text after
/// the split. Values keep nested reference text verbatim for later
/// resolution.
fn extract_attributes(tree: &mut ExpressionTree) {
    let mut found: Vec<(String, String)> = Vec::new();
    for idx in 1..tree.arena.len() {
        let el = &tree.arena[idx];
        if el.delim != Some(Delim::Paren) || !el.name_value {
            continue;
        }
        let inner = el
            .text
            .trim_start_matches('(')
            .trim_end_matches(')')
            .to_string();
        for part in inner.split(';') {
            if let Some((name, value)) = part.split_once(':') {
                let name = name.trim();
                if is_ident(name, false) {
                    let value = tree.render_fragment(idx, value);
                    found.push((name.to_string(), value.trim().to_string()));
                }
            }
        }
    }
    for (name, value) in found {
        tree.set_attr(&name, value);
    }
}
