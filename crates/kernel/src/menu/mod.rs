//! Menu system for permission-gated navigation.
//!
//! Menus are declared by plugins as flat records and provide:
//! - A parent-linked, ordered navigation tree
//! - AND/OR permission requirements per entry
//! - Per-user filtered views, cached until the catalog or the user changes

mod filter;
mod service;
mod tree;

pub use filter::{VisibilityPolicy, filter_for_user, is_permitted};
pub use service::MenuService;
pub use tree::{MenuNode, build_tree, find_in};
