use crate::error::Result;
use crate::object::{read_object_of_kind, write_object};
use crate::oid::Oid;
use crate::repo::Repo;
use crate::types::{ObjectKind, Tree};

/// write a tree to the object store in git's canonical encoding
pub fn write_tree(repo: &Repo, tree: &Tree) -> Result<Oid> {
    write_object(repo, ObjectKind::Tree, &tree.encode())
}

/// read and decode a tree
pub fn read_tree(repo: &Repo, oid: &Oid) -> Result<Tree> {
    let body = read_object_of_kind(repo, oid, ObjectKind::Tree)?;
    Tree::decode(&body)
}
