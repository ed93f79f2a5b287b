use regex::Regex;

/// Decides whether one output line means the process has become operational.
pub trait ReadinessProbe: Send + Sync {
    fn is_ready(&self, line: &str) -> bool;

    /// Human readable form for logs.
    fn describe(&self) -> String {
        "custom predicate".to_string()
    }
}

impl<F> ReadinessProbe for F
where
    F: Fn(&str) -> bool + Send + Sync,
{
    fn is_ready(&self, line: &str) -> bool {
        self(line)
    }
}

/// Ready when the line contains a fixed piece of text.
#[derive(Debug, Clone)]
pub struct ContainsText {
    needle: String,
}

impl ContainsText {
    pub fn new(needle: impl Into<String>) -> Self {
        Self {
            needle: needle.into(),
        }
    }
}

impl ReadinessProbe for ContainsText {
    fn is_ready(&self, line: &str) -> bool {
        line.contains(self.needle.as_str())
    }

    fn describe(&self) -> String {
        format!("text '{}'", self.needle)
    }
}

/// Ready when the line matches a regular expression.
#[derive(Debug, Clone)]
pub struct MatchesPattern {
    pattern: Regex,
}

impl MatchesPattern {
    pub fn new(pattern: &str) -> Result<Self, regex::Error> {
        Ok(Self {
            pattern: Regex::new(pattern)?,
        })
    }
}

impl ReadinessProbe for MatchesPattern {
    fn is_ready(&self, line: &str) -> bool {
        self.pattern.is_match(line)
    }

    fn describe(&self) -> String {
        format!("pattern /{}/", self.pattern.as_str())
    }
}
