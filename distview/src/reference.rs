use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use thiserror::Error;

/// Longest repository name the registry accepts, domain included.
pub const NAME_TOTAL_LENGTH_MAX: usize = 255;

static NAME_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    let path_component = r"[a-z0-9]+(?:(?:\.|_|__|-+)[a-z0-9]+)*";
    let domain_component = r"(?:[a-zA-Z0-9]|[a-zA-Z0-9][a-zA-Z0-9-]*[a-zA-Z0-9])";
    let domain = format!(r"{domain_component}(?:\.{domain_component})*(?::[0-9]+)?");
    Regex::new(&format!(
        r"^(?:{domain}/)?{path_component}(?:/{path_component})*$"
    ))
    .expect("repository name grammar is a valid regex")
});

static TAG_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9_][A-Za-z0-9_.-]{0,127}$").expect("tag grammar is a valid regex")
});

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NameError {
    #[error("repository name must have at least one component")]
    Empty,

    #[error("repository name must not be more than {NAME_TOTAL_LENGTH_MAX} characters: {0}")]
    TooLong(String),

    #[error("invalid reference format: {0}")]
    InvalidFormat(String),
}

/// A repository name that parsed under the registry's reference grammar,
/// e.g. `library/ubuntu` or `registry.example.com:5000/team/app`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RepositoryName(String);

impl RepositoryName {
    pub fn parse(name: &str) -> Result<Self, NameError> {
        if name.is_empty() {
            return Err(NameError::Empty);
        }
        if name.len() > NAME_TOTAL_LENGTH_MAX {
            return Err(NameError::TooLong(name.to_string()));
        }
        if !NAME_PATTERN.is_match(name) {
            return Err(NameError::InvalidFormat(name.to_string()));
        }
        Ok(Self(name.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Slash separated components, used to locate the repository on disk.
    pub fn components(&self) -> impl Iterator<Item = &str> {
        self.0.split('/')
    }
}

impl FromStr for RepositoryName {
    type Err = NameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for RepositoryName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for RepositoryName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

pub fn is_valid_tag(tag: &str) -> bool {
    TAG_PATTERN.is_match(tag)
}
