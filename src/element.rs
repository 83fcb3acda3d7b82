use indexmap::IndexMap;

/// Name/value attributes extracted from a parsed line. Keys are stored
/// lowercased; lookups are case-insensitive.
pub type AttrMap = IndexMap<String, String>;

/// What an element resolves as. Assigned during scanning, demoted to
/// `Literal` by the false-variable pass when the text fails the naming
/// convention for the claimed kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElementKind {
    Literal,
    ConfigRef,
    FieldRef,
    Command,
    /// A command that is deliberately left unresolved and handed to the
    /// post-processor as literal marker text (`{IncIndent}`/`{DecIndent}`).
    DelayedCommand,
}

/// Which bracket opened an element. The root run of a line has none.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delim {
    Brace,
    Bracket,
    Paren,
}

impl Delim {
    pub fn open(self) -> char {
        match self {
            Delim::Brace => '{',
            Delim::Bracket => '[',
            Delim::Paren => '(',
        }
    }

    pub fn close(self) -> char {
        match self {
            Delim::Brace => '}',
            Delim::Bracket => ']',
            Delim::Paren => ')',
        }
    }
}

/// One node of a parsed line. The text buffer holds literal characters
/// plus `@<seq>#<id>` tags marking where each child substitutes back in.
#[derive(Debug, Clone, PartialEq)]
pub struct Element {
    pub text: String,
    pub kind: ElementKind,
    pub delim: Option<Delim>,
    pub children: Vec<usize>,
    pub parent: Option<usize>,
    /// Sibling-local index, the `seq` half of this element's tag.
    pub seq: usize,
    /// Offset of the opening bracket in the source line.
    pub offset: usize,
    pub delimited: bool,
    pub name_value: bool,
    pub list: bool,
}

impl Element {
    fn new(kind: ElementKind, delim: Option<Delim>, seq: usize, offset: usize) -> Self {
        Self {
            text: String::new(),
            kind,
            delim,
            children: Vec::new(),
            parent: None,
            seq,
            offset,
            delimited: false,
            name_value: false,
            list: false,
        }
    }

    /// True once a reference or command has been spliced out (or never was
    /// one). Only these three kinds block the reduce fixpoint.
    pub fn is_unresolved(&self) -> bool {
        matches!(
            self.kind,
            ElementKind::ConfigRef | ElementKind::FieldRef | ElementKind::Command
        )
    }
}

/// The parsed form of one template line: an arena of elements rooted at
/// index 0, plus the attribute map collected from name:value tokens.
///
/// Parent links are plain arena indices, so cloning the whole tree before
/// a reduce pass is a straight `Vec` clone with no pointer fixup.
#[derive(Debug, Clone, PartialEq)]
pub struct ExpressionTree {
    pub arena: Vec<Element>,
    pub attrs: AttrMap,
}

impl ExpressionTree {
    pub fn new() -> Self {
        Self {
            arena: vec![Element::new(ElementKind::Literal, None, 0, 0)],
            attrs: AttrMap::new(),
        }
    }

    pub const ROOT: usize = 0;

    pub fn root(&self) -> &Element {
        &self.arena[Self::ROOT]
    }

    /// Append a child under `parent`, writing its placeholder tag into the
    /// parent's text, and return its arena index (the tag's global id).
    pub fn push_child(
        &mut self,
        parent: usize,
        kind: ElementKind,
        delim: Delim,
        offset: usize,
    ) -> usize {
        let id = self.arena.len();
        let seq = self.arena[parent].children.len();
        let mut child = Element::new(kind, Some(delim), seq, offset);
        child.parent = Some(parent);
        self.arena.push(child);
        self.arena[parent].children.push(id);
        let tag = Self::tag(seq, id);
        self.arena[parent].text.push_str(&tag);
        id
    }

    pub fn tag(seq: usize, id: usize) -> String {
        format!("@{seq}#{id}")
    }

    /// Parse a placeholder tag at `pos` (which must point at `@`).
    /// Returns (seq, id, byte length) or None if the text is not a tag.
    fn tag_at(text: &str, pos: usize) -> Option<(usize, usize, usize)> {
        let rest = &text[pos + 1..];
        let seq_len = rest.chars().take_while(|c| c.is_ascii_digit()).count();
        if seq_len == 0 || !rest[seq_len..].starts_with('#') {
            return None;
        }
        let after_hash = &rest[seq_len + 1..];
        let id_len = after_hash.chars().take_while(|c| c.is_ascii_digit()).count();
        if id_len == 0 {
            return None;
        }
        let seq = rest[..seq_len].parse().ok()?;
        let id = after_hash[..id_len].parse().ok()?;
        Some((seq, id, 1 + seq_len + 1 + id_len))
    }

    /// Render an element's text with every child tag substituted by that
    /// child's own rendered text, recursively. Unreferenced children (ones
    /// whose tag was already spliced away) contribute nothing.
    pub fn render(&self, idx: usize) -> String {
        self.render_fragment(idx, &self.arena[idx].text)
    }

    /// Render an arbitrary slice of `idx`'s tagged text, substituting the
    /// tags of that element's children. Attribute extraction splits the
    /// tagged text first and renders each fragment through here.
    pub(crate) fn render_fragment(&self, idx: usize, text: &str) -> String {
        let el = &self.arena[idx];
        let mut out = String::with_capacity(text.len());
        let mut pos = 0;
        while pos < text.len() {
            let rest = &text[pos..];
            if rest.starts_with('@') {
                if let Some((seq, id, len)) = Self::tag_at(text, pos) {
                    if el.children.contains(&id) && self.arena[id].seq == seq {
                        out.push_str(&self.render(id));
                        pos += len;
                        continue;
                    }
                }
            }
            let ch = rest.chars().next().unwrap();
            out.push(ch);
            pos += ch.len_utf8();
        }
        out
    }

    pub fn render_root(&self) -> String {
        self.render(Self::ROOT)
    }

    /// Replace `child`'s tag in its parent's text with `value` and clear the
    /// child so it no longer counts as unresolved. The tag match requires a
    /// non-digit after the id, so `@0#1` never matches inside `@0#12`.
    pub fn splice_value(&mut self, child: usize, value: &str) {
        let (parent, seq) = {
            let el = &self.arena[child];
            (el.parent.unwrap_or(Self::ROOT), el.seq)
        };
        let tag = Self::tag(seq, child);
        let text = std::mem::take(&mut self.arena[parent].text);
        let mut out = String::with_capacity(text.len() + value.len());
        let mut pos = 0;
        while pos < text.len() {
            let rest = &text[pos..];
            if rest.starts_with(&tag) {
                let after = &rest[tag.len()..];
                if !after.chars().next().is_some_and(|c| c.is_ascii_digit()) {
                    out.push_str(value);
                    pos += tag.len();
                    continue;
                }
            }
            let ch = rest.chars().next().unwrap();
            out.push(ch);
            pos += ch.len_utf8();
        }
        self.arena[parent].text = out;
        let el = &mut self.arena[child];
        el.text.clear();
        el.kind = ElementKind::Literal;
    }

    pub fn depth(&self, idx: usize) -> usize {
        let mut d = 0;
        let mut cur = idx;
        while let Some(p) = self.arena[cur].parent {
            d += 1;
            cur = p;
        }
        d
    }

    /// All reference/command elements still awaiting resolution, deepest
    /// first, then document order within a depth.
    pub fn unresolved(&self) -> Vec<usize> {
        let mut ids: Vec<usize> = (0..self.arena.len())
            .filter(|&i| self.arena[i].is_unresolved())
            .collect();
        ids.sort_by(|&a, &b| self.depth(b).cmp(&self.depth(a)).then(a.cmp(&b)));
        ids
    }

    pub fn has_unresolved(&self) -> bool {
        self.arena.iter().any(|e| e.is_unresolved())
    }

    /// The element's text without its surrounding delimiter pair, when the
    /// pair is actually present.
    pub fn inner_text(&self, idx: usize) -> String {
        let el = &self.arena[idx];
        let mut s = el.text.as_str();
        if let Some(d) = el.delim {
            if let Some(rest) = s.strip_prefix(d.open()) {
                s = rest;
            }
            if let Some(rest) = s.strip_suffix(d.close()) {
                s = rest;
            }
        }
        s.to_string()
    }

    /// The command name of a brace-opened command element: the text between
    /// the `{` and the first tag (its parameter list) or the closing `}`.
    pub fn command_name(&self, idx: usize) -> String {
        let inner = self.inner_text(idx);
        let name = match inner.find('@') {
            Some(at) => &inner[..at],
            None => inner.as_str(),
        };
        name.trim().to_string()
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs.get(&name.to_ascii_lowercase()).map(String::as_str)
    }

    pub fn set_attr(&mut self, name: &str, value: impl Into<String>) {
        self.attrs.insert(name.to_ascii_lowercase(), value.into());
    }
}

impl Default for ExpressionTree {
    fn default() -> Self {
        Self::new()
    }
}
