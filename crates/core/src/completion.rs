//! Lesson Completion Detector
//!
//! The tutor announces a finished lesson in plain language ("Dia 7 concluído!").
//! The detector scans a frozen reply for those phrasings and reports at most one
//! lesson number per turn. The phrasings are heuristics, not protocol: only the
//! configured patterns are recognised.

use regex::{Regex, RegexBuilder};

/// The phrasings the tutor is instructed to use, in priority order.
pub const DEFAULT_PATTERNS: &[&str] = &[
    r"dia (\d+) conclu[ií]do",
    r"completamos o dia (\d+)",
    r"finalizamos a aula (\d+)",
    r"aula (\d+) finalizada",
];

#[derive(Debug, thiserror::Error)]
pub enum PatternError {
    #[error("invalid completion pattern '{pattern}': {source}")]
    Invalid {
        pattern: String,
        #[source]
        source: regex::Error,
    },
    #[error("completion pattern '{0}' must capture the lesson number in its first group")]
    MissingCapture(String),
}

#[derive(Debug, Clone)]
pub struct CompletionDetector {
    patterns: Vec<Regex>,
    max_lesson: u32,
}

impl CompletionDetector {
    /// Compiles an ordered list of case-insensitive patterns.
    ///
    /// Each pattern must contain at least one capture group; the first group
    /// holds the lesson number.
    pub fn new<I, P>(patterns: I, max_lesson: u32) -> Result<Self, PatternError>
    where
        I: IntoIterator<Item = P>,
        P: AsRef<str>,
    {
        let patterns = patterns
            .into_iter()
            .map(|pattern| {
                let pattern = pattern.as_ref();
                let regex = RegexBuilder::new(pattern)
                    .case_insensitive(true)
                    .build()
                    .map_err(|source| PatternError::Invalid {
                        pattern: pattern.to_string(),
                        source,
                    })?;
                if regex.captures_len() < 2 {
                    return Err(PatternError::MissingCapture(pattern.to_string()));
                }
                Ok(regex)
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            patterns,
            max_lesson,
        })
    }

    /// The built-in phrasings.
    pub fn with_defaults(max_lesson: u32) -> Self {
        Self::new(DEFAULT_PATTERNS, max_lesson).expect("built-in completion patterns compile")
    }

    pub fn max_lesson(&self) -> u32 {
        self.max_lesson
    }

    /// Returns the lesson named by the first pattern that matches anywhere in
    /// `text`, if that lesson lies within `1..=max_lesson`.
    ///
    /// Only the first matching pattern is considered; an out-of-range number
    /// yields `None` even if a later pattern would also match.
    pub fn detect(&self, text: &str) -> Option<u32> {
        let captures = self.patterns.iter().find_map(|p| p.captures(text))?;
        let lesson: u32 = captures.get(1)?.as_str().parse().ok()?;
        (1..=self.max_lesson).contains(&lesson).then_some(lesson)
    }
}
