use std::fmt;

use chrono::{DateTime, FixedOffset, Local, TimeZone};

use crate::error::{Error, Result};
use crate::oid::Oid;

/// author or committer identity with a timestamp
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Signature {
    pub name: String,
    pub email: String,
    /// unix timestamp (seconds since epoch)
    pub time: i64,
    /// offset from UTC in minutes (east positive)
    pub offset_minutes: i32,
}

impl Signature {
    pub fn new(
        name: impl Into<String>,
        email: impl Into<String>,
        time: i64,
        offset_minutes: i32,
    ) -> Self {
        Self {
            name: name.into(),
            email: email.into(),
            time,
            offset_minutes,
        }
    }

    /// signature stamped with the current local time
    pub fn now(name: impl Into<String>, email: impl Into<String>) -> Self {
        let now = Local::now();
        Self::new(
            name,
            email,
            now.timestamp(),
            now.offset().local_minus_utc() / 60,
        )
    }

    /// timestamp in the signer's own offset
    pub fn datetime(&self) -> Option<DateTime<FixedOffset>> {
        let offset = FixedOffset::east_opt(self.offset_minutes * 60)?;
        offset.timestamp_opt(self.time, 0).single()
    }

    /// parse `Name <email> 1700000000 +0100`
    pub fn parse(s: &str) -> Result<Self> {
        let open = s
            .find('<')
            .ok_or_else(|| malformed("signature missing '<'"))?;
        let close = s
            .rfind('>')
            .filter(|&close| close > open)
            .ok_or_else(|| malformed("signature missing '>'"))?;

        let name = s[..open].trim_end().to_string();
        let email = s[open + 1..close].to_string();

        let mut rest = s[close + 1..].split_whitespace();
        let time = rest
            .next()
            .and_then(|t| t.parse::<i64>().ok())
            .ok_or_else(|| malformed("signature missing timestamp"))?;
        let offset_minutes = match rest.next() {
            Some(tz) => parse_offset(tz).ok_or_else(|| malformed("bad timezone"))?,
            None => 0,
        };

        Ok(Self {
            name,
            email,
            time,
            offset_minutes,
        })
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.offset_minutes < 0 { '-' } else { '+' };
        let abs = self.offset_minutes.unsigned_abs();
        write!(
            f,
            "{} <{}> {} {}{:02}{:02}",
            self.name,
            self.email,
            self.time,
            sign,
            abs / 60,
            abs % 60
        )
    }
}

fn parse_offset(tz: &str) -> Option<i32> {
    let (sign, digits) = match tz.as_bytes().first()? {
        b'+' => (1, &tz[1..]),
        b'-' => (-1, &tz[1..]),
        _ => return None,
    };
    if digits.len() != 4 || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let hours: i32 = digits[..2].parse().ok()?;
    let minutes: i32 = digits[2..].parse().ok()?;
    Some(sign * (hours * 60 + minutes))
}

fn malformed(message: &str) -> Error {
    Error::CorruptObjectMessage(format!("malformed commit: {}", message))
}

/// a commit object pointing to a tree
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Commit {
    /// root tree id
    pub tree: Oid,
    /// parent commit ids (empty for initial, 1 for linear, 2+ for merge)
    pub parents: Vec<Oid>,
    pub author: Signature,
    pub committer: Signature,
    /// commit message, stored verbatim
    pub message: String,
    /// headers other than tree/parent/author/committer (encoding, gpgsig, ...)
    pub extra_headers: Vec<(String, String)>,
}

impl Commit {
    /// create a new commit; the committer is the author
    pub fn new(
        tree: Oid,
        parents: Vec<Oid>,
        author: Signature,
        message: impl Into<String>,
    ) -> Self {
        Self {
            tree,
            parents,
            committer: author.clone(),
            author,
            message: message.into(),
            extra_headers: vec![],
        }
    }

    /// commit time (committer timestamp)
    pub fn timestamp(&self) -> i64 {
        self.committer.time
    }

    /// first parent, if any
    pub fn parent(&self) -> Option<&Oid> {
        self.parents.first()
    }

    /// is this an initial commit (no parents)
    pub fn is_root(&self) -> bool {
        self.parents.is_empty()
    }

    /// is this a merge commit (multiple parents)
    pub fn is_merge(&self) -> bool {
        self.parents.len() > 1
    }

    /// canonical body bytes
    pub fn encode(&self) -> Vec<u8> {
        let mut out = String::new();
        out.push_str(&format!("tree {}\n", self.tree));
        for parent in &self.parents {
            out.push_str(&format!("parent {}\n", parent));
        }
        out.push_str(&format!("author {}\n", self.author));
        out.push_str(&format!("committer {}\n", self.committer));
        for (key, value) in &self.extra_headers {
            // multi-line values continue with a leading space
            out.push_str(&format!("{} {}\n", key, value.replace('\n', "\n ")));
        }
        out.push('\n');
        out.push_str(&self.message);
        out.into_bytes()
    }

    /// parse commit body bytes
    pub fn decode(data: &[u8]) -> Result<Commit> {
        let (header, message) = match data.windows(2).position(|w| w == b"\n\n") {
            Some(pos) => (&data[..pos], &data[pos + 2..]),
            None => (data.strip_suffix(b"\n").unwrap_or(data), &b""[..]),
        };
        let header = String::from_utf8_lossy(header);

        let mut headers: Vec<(String, String)> = Vec::new();
        for line in header.split('\n') {
            if let Some(cont) = line.strip_prefix(' ') {
                let (_, value) = headers
                    .last_mut()
                    .ok_or_else(|| malformed("continuation before first header"))?;
                value.push('\n');
                value.push_str(cont);
                continue;
            }
            let (key, value) = line
                .split_once(' ')
                .ok_or_else(|| malformed(&format!("bad header line {:?}", line)))?;
            headers.push((key.to_string(), value.to_string()));
        }

        let mut tree = None;
        let mut parents = Vec::new();
        let mut author = None;
        let mut committer = None;
        let mut extra_headers = Vec::new();

        for (key, value) in headers {
            match key.as_str() {
                "tree" if tree.is_none() => tree = Some(Oid::from_hex(&value)?),
                "parent" => parents.push(Oid::from_hex(&value)?),
                "author" if author.is_none() => author = Some(Signature::parse(&value)?),
                "committer" if committer.is_none() => {
                    committer = Some(Signature::parse(&value)?)
                }
                _ => extra_headers.push((key, value)),
            }
        }

        Ok(Commit {
            tree: tree.ok_or_else(|| malformed("missing tree"))?,
            parents,
            author: author.ok_or_else(|| malformed("missing author"))?,
            committer: committer.ok_or_else(|| malformed("missing committer"))?,
            message: String::from_utf8_lossy(message).into_owned(),
            extra_headers,
        })
    }
}
