//! Classify failures as transient or terminal from their messages.

use crate::error::ErrorClass;
use regex::{RegexSet, RegexSetBuilder};
use std::error::Error as StdError;
use std::sync::LazyLock;

/// Message fragments that identify connectivity, timeout and partial-download
/// failures. Matched case-insensitively anywhere in the message.
pub const DEFAULT_TRANSIENT_PATTERNS: &[&str] = &[
    r"chunkloaderror",
    r"loading (css )?chunk \S+ failed",
    r"failed to fetch dynamically imported module",
    r"error loading dynamically imported module",
    r"importing a module script failed",
    r"networkerror",
    r"network (error|request failed)",
    r"failed to fetch",
    r"load failed",
    r"timed? ?out",
    r"timeout",
    r"econnreset|econnrefused|econnaborted",
    r"connection (reset|refused|closed|aborted)",
    r"unexpected end of (file|stream|data)",
    r"incomplete (read|download|body)",
    r"partial (content|download|transfer)",
];

static DEFAULT_SET: LazyLock<RegexSet> = LazyLock::new(|| {
    RegexSetBuilder::new(DEFAULT_TRANSIENT_PATTERNS)
        .case_insensitive(true)
        .build()
        .expect("Failed to compile built-in transient error patterns")
});

/// Decides whether a failed attempt is worth repeating.
///
/// Closures of the shape `Fn(&(dyn Error + 'static)) -> bool` implement this
/// trait, returning `true` for retriable errors.
pub trait RetryClassifier: Send + Sync {
    /// Classify a failure.
    fn classify(&self, error: &(dyn StdError + 'static)) -> ErrorClass;

    /// Shorthand for `classify(error).is_transient()`.
    fn is_retriable(&self, error: &(dyn StdError + 'static)) -> bool {
        self.classify(error).is_transient()
    }
}

impl<F> RetryClassifier for F
where
    F: Fn(&(dyn StdError + 'static)) -> bool + Send + Sync,
{
    fn classify(&self, error: &(dyn StdError + 'static)) -> ErrorClass {
        if self(error) {
            ErrorClass::Transient
        } else {
            ErrorClass::Terminal
        }
    }
}

/// Treats every failure as transient. Used by the single-flight invoker,
/// which retries on any error.
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysRetry;

impl RetryClassifier for AlwaysRetry {
    fn classify(&self, _error: &(dyn StdError + 'static)) -> ErrorClass {
        ErrorClass::Transient
    }
}

/// Treats every failure as terminal.
#[derive(Debug, Clone, Copy, Default)]
pub struct NeverRetry;

impl RetryClassifier for NeverRetry {
    fn classify(&self, _error: &(dyn StdError + 'static)) -> ErrorClass {
        ErrorClass::Terminal
    }
}

/// Pattern-based classifier.
///
/// The error's own message and every message in its `source()` chain are
/// checked; one match anywhere makes the failure transient.
#[derive(Debug, Clone)]
pub struct MessagePatterns {
    set: RegexSet,
}

impl Default for MessagePatterns {
    fn default() -> Self {
        Self {
            set: DEFAULT_SET.clone(),
        }
    }
}

impl MessagePatterns {
    /// Build a classifier from custom patterns, replacing the defaults.
    pub fn new<I, S>(patterns: I) -> Result<Self, regex::Error>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let set = RegexSetBuilder::new(patterns)
            .case_insensitive(true)
            .build()?;
        Ok(Self { set })
    }

    /// Build a classifier from the defaults plus extra patterns.
    pub fn with_extra<I, S>(extra: I) -> Result<Self, regex::Error>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut all: Vec<String> = DEFAULT_TRANSIENT_PATTERNS
            .iter()
            .map(|p| (*p).to_string())
            .collect();
        all.extend(extra.into_iter().map(|p| p.as_ref().to_string()));
        Self::new(all)
    }

    /// Whether a bare message matches any pattern.
    pub fn matches_message(&self, message: &str) -> bool {
        self.set.is_match(message)
    }
}

impl RetryClassifier for MessagePatterns {
    fn classify(&self, error: &(dyn StdError + 'static)) -> ErrorClass {
        let mut current: Option<&(dyn StdError + 'static)> = Some(error);
        while let Some(err) = current {
            if self.matches_message(&err.to_string()) {
                return ErrorClass::Transient;
            }
            current = err.source();
        }
        ErrorClass::Terminal
    }
}

/// Classify with the built-in patterns.
pub fn classify(error: &(dyn StdError + 'static)) -> ErrorClass {
    MessagePatterns::default().classify(error)
}
