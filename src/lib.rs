//! weft: a line-oriented template engine for data-driven text generation.
//!
//! A template is a list of lines. Placeholders reference a configuration
//! table (`{Name}`), fields of the currently selected data record
//! (`[scope:Field]`), or commands (`{Upper(...)}`); structural commands
//! (`{Loop}`, `{Condition}`, `{Continue}`, `{SaveFile}` and their ends)
//! shape the lines into a block tree that is walked against a
//! [`DataSource`].
//!
//! The pipeline:
//! 1. Each line is parsed into an addressable expression tree
//!    ([`ExpressionTree`]).
//! 2. The line list is shaped into an [`ActionTree`] of literal lines,
//!    loops, and conditions.
//! 3. A [`Renderer`] walks the tree, reducing every line to flat text by
//!    fixpoint substitution against the data source.
//! 4. A post-processing pass applies deferred indentation markers and
//!    collapses doubled brackets.
//!
//! The engine never touches the filesystem: templates come in as strings
//! and output leaves through [`DataSource::save_output`]. The bundled
//! [`Project`] type implements the trait over in-memory maps and
//! deserializes from JSON via serde.
//!
//! ```
//! use weft::{render, Project};
//!
//! let mut project = Project::new();
//! project.set_config("Name", "World");
//! let lines = vec!["Hello, {Name}!".to_string()];
//! let out = render(&lines, &mut project);
//! assert_eq!(out.lines, vec!["Hello, World!"]);
//! ```

mod action;
mod commands;
mod data;
mod element;
mod error;
mod expr;
mod parser;
mod postprocess;
mod render;
mod resolve;

pub use action::{ActionNode, ActionTree, NodeKind};
pub use data::{DataSource, Project, Record, SavedOutput, Sheet, BLANK_SENTINEL};
pub use element::{AttrMap, Delim, Element, ElementKind, ExpressionTree};
pub use error::RenderError;
pub use expr::{evaluate, ExprError};
pub use postprocess::{collapse_escapes, postprocess};
pub use render::{RenderOutput, RenderSession, Renderer, ScopeChain, SKIP_MARKER};
pub use resolve::MAX_REDUCE_PASSES;

/// Render a template against a data source: build the action tree, walk
/// it, post-process, and return whatever was not claimed by an explicit
/// `{SaveFile}` along the way.
pub fn render(lines: &[String], data: &mut dyn DataSource) -> RenderOutput {
    let mut tree = ActionTree::build(lines);
    Renderer::new(data).run(&mut tree)
}
