//! Command-line arguments for the terminal client.

use clap::Parser;
use mentor_core::{
    completion::{CompletionDetector, DEFAULT_PATTERNS, PatternError},
    course::TOTAL_LESSONS,
};

#[derive(Parser, Debug)]
#[command(name = "mentor-chat")]
#[command(version, about = "Chat with the crypto trading tutor from the terminal", long_about = None)]
pub struct Args {
    /// Base URL of the relay service.
    #[arg(long, env = "MENTOR_RELAY_URL", default_value = "http://localhost:3000")]
    pub relay_url: String,

    /// Learner id sent as `x-user-id`.
    #[arg(long, env = "MENTOR_USER")]
    pub user: String,

    /// Lesson (day) whose conversation to continue.
    #[arg(long, default_value_t = 1, value_parser = clap::value_parser!(u32).range(1..))]
    pub lesson: u32,

    /// Number of lessons in the course; completion markers above it are ignored.
    #[arg(long, default_value_t = TOTAL_LESSONS)]
    pub course_size: u32,

    /// Replaces the built-in completion phrasings. Repeat to give several, in
    /// priority order; each needs one capture group for the lesson number.
    #[arg(long = "completion-pattern", value_name = "REGEX")]
    pub completion_patterns: Vec<String>,
}

impl Args {
    pub fn detector(&self) -> Result<CompletionDetector, PatternError> {
        if self.completion_patterns.is_empty() {
            CompletionDetector::new(DEFAULT_PATTERNS.iter().copied(), self.course_size)
        } else {
            CompletionDetector::new(&self.completion_patterns, self.course_size)
        }
    }
}
