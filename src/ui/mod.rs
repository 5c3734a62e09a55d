//! Music Vis Backend editor
//!
//! - `state`: data model and events
//! - `components`: reusable control builders
//! - `layout`: top-level layout
//! - `meters`: spectrum and chroma views

pub mod components;
pub mod layout;
pub mod meters;
pub mod state;

pub use layout::build_ui;
