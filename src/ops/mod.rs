//! path-level operations on a repository

mod cat;
mod commit;
mod log;
mod ls_tree;
mod path;

pub use cat::{cat, read_file};
pub use commit::commit_file;
pub use log::{log, LogEntry};
pub use ls_tree::{list_tree, ls_tree, LsTreeEntry};
pub use path::{find_blob, find_tree, root_tree, split_commit_path, split_path};
