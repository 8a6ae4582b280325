mod commit;
mod kind;
mod tree;

pub use commit::{Commit, Signature};
pub use kind::ObjectKind;
pub(crate) use tree::validate_entry_name;
pub use tree::{git_tree_name_cmp, FileMode, Tree, TreeEntry};
