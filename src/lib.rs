//! libellus - path-addressed access to a git repository
//!
//! exposes one branch of an ordinary git repository as a small file
//! store: list a directory, read a file, and commit a new revision that
//! rewrites exactly one path while keeping all other history.
//!
//! # Core concepts
//!
//! - **Blob**: file content, stored as a git blob
//! - **Tree**: a directory listing in git's canonical encoding and order
//! - **Commit**: a snapshot of a root tree with author, parents and message
//! - **Ref**: a named pointer to a commit, loose, packed or symbolic
//!
//! objects are read from loose storage and from pack files; new objects are
//! always written loose. an object id is the SHA-1 of `<kind> <len>\0<body>`,
//! so repositories stay readable by git itself.
//!
//! # Example usage
//!
//! ```no_run
//! use libellus::{Repo, Repository};
//! use std::path::Path;
//!
//! // initialize a bare repository
//! Repo::init(Path::new("/path/to/wiki.git")).unwrap();
//!
//! // commit a file and read it back
//! let wiki = Repository::open(Path::new("/path/to/wiki.git")).unwrap();
//! wiki.commit("add front page\n", "pages/index.md", b"# welcome").unwrap();
//! let page = wiki.read("pages/index.md").unwrap();
//! assert_eq!(page.as_deref(), Some(&b"# welcome"[..]));
//!
//! for file in wiki.list("pages").unwrap().unwrap_or_default() {
//!     println!("{} {}", file.oid, file.name);
//! }
//! ```

mod config;
mod error;
mod lockfile;
mod oid;
mod refs;
mod repo;
mod repository;

pub mod object;
pub mod ops;
pub mod types;

pub use config::{Config, Identity, DEFAULT_REFNAME};
pub use error::{Error, IoResultExt, Result};
pub use lockfile::Lockfile;
pub use object::{
    count_objects, object_exists, peel_to_commit, read_blob, read_commit, read_object, read_tree,
    write_blob, write_commit, write_object, write_tree,
};
pub use oid::{compute_object_hash, object_header, ObjectHasher, Oid};
pub use refs::{
    canonical_name, dwim_candidates, list_refs, read_ref, ref_exists, resolve_ref, update_ref,
    validate_ref_name, write_ref,
};
pub use repo::Repo;
pub use repository::{File, Repository};
pub use types::{Commit, FileMode, ObjectKind, Signature, Tree, TreeEntry};
