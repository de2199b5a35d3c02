use std::env;
use std::path::PathBuf;
use std::str::FromStr;

const DEFAULT_STORE_ROOT: &str = "/var/lib/registry";
const DEFAULT_LIST_LIMIT: usize = 100;

/// What a batch command does when one of its items fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ErrorPolicy {
    /// Abort the whole command on the first failure.
    #[default]
    FailFast,
    /// Log the failure, skip the item and report it once the command ends.
    BestEffort,
}

/// Which implementation unpacks layer blobs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ExtractorKind {
    /// Pipe each blob through the system `tar`.
    #[default]
    Tar,
    /// Decompress and unpack in-process.
    Builtin,
}

impl FromStr for ExtractorKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "tar" => Ok(ExtractorKind::Tar),
            "builtin" => Ok(ExtractorKind::Builtin),
            other => Err(format!("unknown extractor '{other}', expected 'tar' or 'builtin'")),
        }
    }
}

pub fn get_store_root() -> PathBuf {
    let root = env::var("DISTVIEW_ROOT").unwrap_or(DEFAULT_STORE_ROOT.to_string());
    expand_home(&root)
}

pub fn get_list_limit() -> usize {
    parse_list_limit(env::var("DISTVIEW_LIST_LIMIT").ok().as_deref())
}

pub fn get_error_policy() -> ErrorPolicy {
    parse_error_policy(env::var("DISTVIEW_KEEP_GOING").ok().as_deref())
}

pub fn get_extractor_kind() -> ExtractorKind {
    parse_extractor_kind(env::var("DISTVIEW_EXTRACTOR").ok().as_deref())
}

pub fn expand_home(path: &str) -> PathBuf {
    if path == "~" || path.starts_with("~/") {
        if let Some(home_dir) = dirs::home_dir() {
            return match path.strip_prefix("~/") {
                Some(rest) => home_dir.join(rest),
                None => home_dir,
            };
        }
    }

    path.into()
}

fn parse_list_limit(value: Option<&str>) -> usize {
    let Some(value) = value else {
        return DEFAULT_LIST_LIMIT;
    };
    match value.trim().parse::<usize>() {
        Ok(limit) => limit,
        Err(e) => {
            tracing::warn!(
                var = "DISTVIEW_LIST_LIMIT",
                value,
                error = %e,
                default = DEFAULT_LIST_LIMIT,
                "ignoring invalid list limit"
            );
            DEFAULT_LIST_LIMIT
        }
    }
}

fn parse_extractor_kind(value: Option<&str>) -> ExtractorKind {
    let Some(value) = value else {
        return ExtractorKind::default();
    };
    value.parse().unwrap_or_else(|e: String| {
        tracing::warn!(var = "DISTVIEW_EXTRACTOR", value, error = %e, "ignoring invalid extractor");
        ExtractorKind::default()
    })
}

fn parse_error_policy(value: Option<&str>) -> ErrorPolicy {
    match value.map(|v| v.trim().to_ascii_lowercase()).as_deref() {
        Some("1" | "true" | "yes") => ErrorPolicy::BestEffort,
        _ => ErrorPolicy::FailFast,
    }
}
