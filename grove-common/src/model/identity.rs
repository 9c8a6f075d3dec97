use std::fmt;

use serde::{Deserialize, Serialize};

/// Canonical key identifying one package across every requirement site.
///
/// Two requirements that spell the "same" package differently (case,
/// URL scheme, trailing `.git`) must collapse onto one identity so the
/// solver assigns them a single version.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PackageIdentity(String);

impl PackageIdentity {
    pub fn new(raw: &str) -> Self {
        Self(canonicalize(raw))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PackageIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for PackageIdentity {
    fn from(raw: &str) -> Self {
        Self::new(raw)
    }
}

fn canonicalize(raw: &str) -> String {
    let mut key = raw.trim().to_ascii_lowercase();

    // URL-derived identities: the scheme and a trailing `.git` carry no
    // identity information.
    for scheme in ["https://", "http://", "ssh://", "git://"] {
        if let Some(rest) = key.strip_prefix(scheme) {
            key = rest.to_string();
            break;
        }
    }
    // scp-like form: git@host:owner/repo
    if let Some(rest) = key.strip_prefix("git@") {
        key = rest.replacen(':', "/", 1);
    }
    if let Some(rest) = key.strip_suffix(".git") {
        key = rest.to_string();
    }
    while key.ends_with('/') {
        key.pop();
    }
    key
}
