use std::collections::HashSet;
use std::fmt;

use crate::error::Result;
use crate::object::{peel_to_commit, read_commit};
use crate::oid::Oid;
use crate::refs::resolve_ref;
use crate::repo::Repo;
use crate::types::Commit;

/// commit with its id for log output
#[derive(Debug, Clone)]
pub struct LogEntry {
    pub oid: Oid,
    pub commit: Commit,
}

/// first-parent history of a ref, newest first
pub fn log(repo: &Repo, ref_name: &str, max_count: Option<usize>) -> Result<Vec<LogEntry>> {
    let mut next = Some(peel_to_commit(repo, &resolve_ref(repo, ref_name)?)?);
    let mut entries = Vec::new();
    let mut visited = HashSet::new();

    while let Some(oid) = next {
        if max_count.is_some_and(|max| entries.len() >= max) || !visited.insert(oid) {
            break;
        }

        let commit = read_commit(repo, &oid)?;
        next = commit.parent().copied();
        entries.push(LogEntry { oid, commit });
    }

    Ok(entries)
}

impl fmt::Display for LogEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "commit {}", self.oid)?;
        let author = &self.commit.author;
        writeln!(f, "Author: {} <{}>", author.name, author.email)?;
        match author.datetime() {
            Some(date) => writeln!(f, "Date:   {}", date.format("%a %b %-d %H:%M:%S %Y %z"))?,
            None => writeln!(f, "Date:   {}", author.time)?,
        }

        writeln!(f)?;
        for line in self.commit.message.lines() {
            writeln!(f, "    {}", line)?;
        }

        Ok(())
    }
}
