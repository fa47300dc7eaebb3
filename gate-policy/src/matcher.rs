//! Cached tool-name pattern matching.

use std::collections::HashMap;
use std::sync::RwLock;

use regex::RegexBuilder;
use tracing::{debug, warn};

/// Compile-size ceiling for operator-supplied patterns. The regex engine
/// guarantees linear-time matching, so this bound plus the tool-name
/// length cap replaces a wall-clock match timeout.
const PATTERN_SIZE_LIMIT: usize = 1 << 20;

#[derive(Debug)]
enum CachedPattern {
    /// Anchored, case-insensitive compiled pattern.
    Regex(regex::Regex),
    /// Fallback for patterns that failed to compile: exact
    /// case-insensitive equality against the raw pattern text.
    Literal(String),
}

impl CachedPattern {
    fn compile(pattern: &str) -> Self {
        match RegexBuilder::new(&format!("^(?:{pattern})$"))
            .case_insensitive(true)
            .size_limit(PATTERN_SIZE_LIMIT)
            .build()
        {
            Ok(regex) => Self::Regex(regex),
            Err(err) => {
                warn!(pattern, error = %err, "pattern failed to compile, falling back to exact match");
                Self::Literal(pattern.to_owned())
            }
        }
    }

    fn matches(&self, tool_name: &str) -> bool {
        match self {
            Self::Regex(regex) => regex.is_match(tool_name),
            Self::Literal(pattern) => pattern.eq_ignore_ascii_case(tool_name),
        }
    }
}

/// Matcher with a pattern-text-keyed cache of compiled patterns.
///
/// Keying by the full pattern text makes staleness impossible: a changed
/// pattern is a different key, so a recompile happens on first use and
/// retired entries are dropped by [`PatternMatcher::sync`].
#[derive(Debug, Default)]
pub struct PatternMatcher {
    cache: RwLock<HashMap<String, CachedPattern>>,
}

impl PatternMatcher {
    /// Creates a matcher with an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self {
            cache: RwLock::new(HashMap::new()),
        }
    }

    /// Tests a tool name against a pattern.
    ///
    /// An absent, empty, or `*` pattern matches every tool. A concrete
    /// pattern never matches an absent tool name. Otherwise the pattern
    /// is treated as an anchored, case-insensitive regular expression,
    /// compiled lazily and cached; a malformed pattern degrades to exact
    /// case-insensitive equality instead of erroring.
    ///
    /// # Panics
    ///
    /// Panics if the internal cache lock has been poisoned.
    #[must_use]
    pub fn matches(&self, tool_name: Option<&str>, pattern: Option<&str>) -> bool {
        let pattern = match pattern {
            None => return true,
            Some(text) if text.is_empty() || text == "*" => return true,
            Some(text) => text,
        };
        let Some(tool_name) = tool_name else {
            return false;
        };

        {
            let cache = self.cache.read().expect("pattern cache poisoned");
            if let Some(cached) = cache.get(pattern) {
                return cached.matches(tool_name);
            }
        }

        let compiled = CachedPattern::compile(pattern);
        let matched = compiled.matches(tool_name);
        let mut cache = self.cache.write().expect("pattern cache poisoned");
        cache.entry(pattern.to_owned()).or_insert(compiled);
        matched
    }

    /// Drops cache entries for patterns no longer configured.
    ///
    /// # Panics
    ///
    /// Panics if the internal cache lock has been poisoned.
    pub fn sync(&self, live_patterns: &[String]) {
        let mut cache = self.cache.write().expect("pattern cache poisoned");
        let before = cache.len();
        cache.retain(|pattern, _| live_patterns.iter().any(|live| live == pattern));
        if cache.len() != before {
            debug!(
                retired = before - cache.len(),
                retained = cache.len(),
                "pattern cache resynced"
            );
        }
    }

    /// Number of compiled patterns currently cached.
    ///
    /// # Panics
    ///
    /// Panics if the internal cache lock has been poisoned.
    #[must_use]
    pub fn cached_patterns(&self) -> usize {
        self.cache.read().expect("pattern cache poisoned").len()
    }
}
