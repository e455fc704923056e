use regex::Regex;

use crate::common::errors::{BackupError, BackupResult};

/// Decides whether a file is included, based on its base name only.
///
/// Patterns are unanchored regular expressions; a name is included when
/// any of them matches. No patterns means everything is included.
#[derive(Debug, Clone, Default)]
pub struct PathMatcher {
    patterns: Vec<Regex>,
}

impl PathMatcher {
    pub fn new<S: AsRef<str>>(filters: &[S]) -> BackupResult<Self> {
        let patterns = filters
            .iter()
            .map(|f| {
                let f = f.as_ref();
                Regex::new(f).map_err(|source| BackupError::Filter {
                    pattern: f.to_string(),
                    source,
                })
            })
            .collect::<BackupResult<Vec<_>>>()?;
        Ok(Self { patterns })
    }

    pub fn matches(&self, base_name: &str) -> bool {
        self.patterns.is_empty() || self.patterns.iter().any(|re| re.is_match(base_name))
    }
}

/// `matches(name, filters)` with absent and empty filters treated alike
pub fn matches(base_name: &str, filters: Option<&[String]>) -> BackupResult<bool> {
    match filters {
        None => Ok(true),
        Some(f) => Ok(PathMatcher::new(f)?.matches(base_name)),
    }
}
