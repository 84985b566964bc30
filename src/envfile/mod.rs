//! Structure-preserving model of a shell environment defaults file.
//!
//! This module is the heart of envpanel. It turns a `KEY=VALUE` file into
//! something that can be edited field by field and written back without
//! disturbing anything the user did not touch.
//!
//! # Components
//!
//! - [`parse_line`]: classifies one raw line as an [`Assignment`](crate::models::Assignment)
//!   or as structure to keep verbatim
//! - [`FileModel`]: ordered skeleton of the file plus a name → assignment map,
//!   with the edit operations (set, enable/disable, quote, add, remove)
//! - [`is_valid`]: advisory check of a value against the
//!   [`VariableRegistry`](crate::models::VariableRegistry)
//! - [`Renderer`]: regenerates text in [`RenderMode::Structured`] or [`RenderMode::Fresh`]
//! - [`generate_template`]: starter file for services without one
//!
//! # Round-trip guarantee
//!
//! For any input, rendering an unedited model in structured mode reproduces the
//! input byte-for-byte, except that only the last of several duplicate
//! assignments for one name survives.
//!
//! ```ignore
//! use envpanel::envfile::{FileModel, RenderMode, Renderer};
//! use envpanel::models::VariableRegistry;
//!
//! let registry = VariableRegistry::builtin();
//! let mut model = FileModel::load("# settings\nPORT=8080\n");
//! model.set_value("PORT", "9090");
//!
//! let text = Renderer::new(&registry, "aiscot").render(&model, RenderMode::Structured, true);
//! assert_eq!(text, "# settings\nPORT=9090\n");
//! ```
//!
//! Nothing here is a general shell parser: no expansion, substitution,
//! multi-line values or arrays.

pub mod model;
pub mod parser;
pub mod renderer;
pub mod template;
pub mod validator;

pub use model::{EnvFileError, FileModel, StructuralElement};
pub use parser::{ParsedLine, is_valid_identifier, parse_line};
pub use renderer::{RenderMode, Renderer, generate_line};
pub use template::generate_template;
pub use validator::is_valid;
