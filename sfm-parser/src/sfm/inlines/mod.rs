//! Inline (in-field) marker resolution.
//!
//! Distinct from the top-level backslash markers, a field's text can carry
//! its own begin/end markup (`|fv{...}`, `**...**`). The resolver turns
//! those spans into nested elements, keeping the output well-formed even
//! when the input's end markers arrive out of order.

pub mod resolver;

pub use resolver::resolve_field;
