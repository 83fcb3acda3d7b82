//! The command catalog: everything invocable as `{Name(params)}` from a
//! template line. Parameters arrive already resolved to flat text.
//!
//! Commands that only steer the render (selection, value setting, saving)
//! return no text and flag the owning line can-skip so a line that is
//! nothing but the command vanishes from the output.

use crate::render::{Renderer, ScopeChain};
use log::{debug, warn};

/// What one command invocation hands back to the reducer.
#[derive(Debug, Default)]
pub struct CommandReply {
    pub text: String,
    pub can_skip: bool,
    pub node_sets: Vec<(String, String)>,
}

impl CommandReply {
    fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Self::default()
        }
    }

    fn silent() -> Self {
        Self {
            can_skip: true,
            ..Self::default()
        }
    }
}

impl Renderer<'_> {
    pub(crate) fn run_command(
        &mut self,
        scope: &ScopeChain,
        name: &str,
        params: &str,
    ) -> CommandReply {
        match name.to_ascii_lowercase().as_str() {
            "an" => CommandReply::text(indefinite_article(params.trim())),
            "plural" => CommandReply::text(pluralize(params.trim())),
            "upper" => CommandReply::text(params.to_uppercase()),
            "lower" => CommandReply::text(params.to_lowercase()),
            "proper" => CommandReply::text(proper_case(params)),
            "sortasc" => CommandReply::text(sort_list(params, false)),
            "sortdesc" => CommandReply::text(sort_list(params, true)),
            "indexof" => CommandReply::text(index_of(params)),
            "iif" => CommandReply::text(iif(params)),
            "ifnull" => CommandReply::text(if_null(params)),
            "storagetype" => CommandReply::text(self.storage_type(scope, params.trim())),
            "componentcount" => CommandReply::text(self.data.component_names().len().to_string()),
            "componentnames" => CommandReply::text(self.data.component_names().join(",")),
            "elementcount" => {
                let n = match &self.session.component {
                    Some(c) => self.data.entry_names(c).len(),
                    None => 0,
                };
                CommandReply::text(n.to_string())
            }
            "elementnames" => {
                let names = match &self.session.component {
                    Some(c) => self.data.entry_names(c),
                    None => Vec::new(),
                };
                CommandReply::text(names.join(","))
            }
            "setcomponent" => {
                self.session.component = Some(params.trim().to_string());
                self.session.element = None;
                CommandReply::silent()
            }
            "setelement" => {
                self.session.element = Some(params.trim().to_string());
                CommandReply::silent()
            }
            "setvalue" => {
                match params.split_once(',') {
                    Some((name, value)) => {
                        self.session
                            .config_overrides
                            .insert(name.trim().to_ascii_lowercase(), value.trim().to_string());
                    }
                    None => warn!("SetValue expects name,value; got {params:?}"),
                }
                CommandReply::silent()
            }
            "setnodevalue" => {
                let mut reply = CommandReply::silent();
                match params.split_once(',') {
                    Some((name, value)) => {
                        reply
                            .node_sets
                            .push((name.trim().to_string(), value.trim().to_string()));
                    }
                    None => warn!("SetNodeValue expects name,value; got {params:?}"),
                }
                reply
            }
            "savefile" => {
                let name = params.trim();
                let name = (!name.is_empty()).then_some(name);
                self.save_now(name);
                CommandReply::silent()
            }
            // Structural names the builder already consumed; a stray one
            // (e.g. inside a never-built region) is a no-op.
            "continue" | "endloop" | "endcondition" | "loop" | "condition" => {
                CommandReply::text("")
            }
            other => {
                debug!("unknown command {other:?} resolves empty");
                CommandReply::text("")
            }
        }
    }

    /// General-type to storage-type mapping: a `StorageType.<name>` config
    /// entry overrides the builtin table; unmapped names pass through.
    fn storage_type(&mut self, scope: &ScopeChain, general: &str) -> String {
        if let Some(v) = self.lookup_config(scope, &format!("StorageType.{general}")) {
            return v;
        }
        match general.to_ascii_lowercase().as_str() {
            "string" | "text" => "TEXT",
            "int" | "integer" | "long" => "INTEGER",
            "float" | "double" | "number" | "decimal" => "REAL",
            "bool" | "boolean" => "BOOLEAN",
            "date" | "datetime" | "timestamp" => "TIMESTAMP",
            "guid" | "uuid" => "UUID",
            "binary" | "blob" => "BLOB",
            _ => general,
        }
        .to_string()
    }
}

/// Article selection by leading-vowel heuristic; no irregular-word list.
fn indefinite_article(word: &str) -> String {
    if word.is_empty() {
        return String::new();
    }
    let article = match word.chars().next().unwrap().to_ascii_lowercase() {
        'a' | 'e' | 'i' | 'o' | 'u' => "an",
        _ => "a",
    };
    format!("{article} {word}")
}

/// Regular-noun pluralization only; no irregular-word list.
fn pluralize(word: &str) -> String {
    if word.is_empty() {
        return String::new();
    }
    let lower = word.to_ascii_lowercase();
    if lower.ends_with('s')
        || lower.ends_with('x')
        || lower.ends_with('z')
        || lower.ends_with("ch")
        || lower.ends_with("sh")
    {
        return format!("{word}es");
    }
    if let Some(stem) = word.strip_suffix('y') {
        let before = stem.chars().last();
        if before.is_some_and(|c| !matches!(c.to_ascii_lowercase(), 'a' | 'e' | 'i' | 'o' | 'u')) {
            return format!("{stem}ies");
        }
    }
    format!("{word}s")
}

fn proper_case(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut at_word_start = true;
    for ch in text.chars() {
        if ch.is_alphanumeric() {
            if at_word_start {
                out.extend(ch.to_uppercase());
            } else {
                out.extend(ch.to_lowercase());
            }
            at_word_start = false;
        } else {
            out.push(ch);
            at_word_start = true;
        }
    }
    out
}

fn sort_list(params: &str, descending: bool) -> String {
    let mut items: Vec<&str> = params.split(',').map(str::trim).collect();
    items.sort_by_key(|s| s.to_ascii_lowercase());
    if descending {
        items.reverse();
    }
    items.join(",")
}

/// Character index of the needle in the haystack, or -1.
fn index_of(params: &str) -> String {
    match params.split_once(',') {
        Some((haystack, needle)) => match haystack.find(needle.trim()) {
            Some(byte_pos) => haystack[..byte_pos].chars().count().to_string(),
            None => "-1".to_string(),
        },
        None => "-1".to_string(),
    }
}

/// `iif(cond,then,else)`. A condition containing `;` is an equality pair
/// (numeric-aware); anything else goes through the expression evaluator.
/// A malformed condition logs and takes the else branch.
fn iif(params: &str) -> String {
    let (cond, rest) = match params.split_once(',') {
        Some(pair) => pair,
        None => return String::new(),
    };
    let (then_branch, else_branch) = rest.split_once(',').unwrap_or((rest, ""));
    let pass = match cond.split_once(';') {
        Some((lhs, rhs)) => values_equal(lhs.trim(), rhs.trim()),
        None => match crate::expr::evaluate(cond.trim()) {
            Ok(b) => b,
            Err(e) => {
                warn!("iif condition {cond:?} failed ({e}); taking the else branch");
                false
            }
        },
    };
    let picked = if pass { then_branch } else { else_branch };
    picked.trim().to_string()
}

fn values_equal(lhs: &str, rhs: &str) -> bool {
    if let (Ok(l), Ok(r)) = (lhs.parse::<f64>(), rhs.parse::<f64>()) {
        return l == r;
    }
    lhs.eq_ignore_ascii_case(rhs)
}

fn if_null(params: &str) -> String {
    match params.split_once(',') {
        Some((first, fallback)) => {
            let first = first.trim();
            if first.is_empty() {
                fallback.trim().to_string()
            } else {
                first.to_string()
            }
        }
        None => params.trim().to_string(),
    }
}
