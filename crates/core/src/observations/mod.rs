//! Observations - single metric samples on their way to the output sink.

use chrono::{DateTime, Utc};

/// One (timestamp, username, metric field, value) sample.
#[derive(Debug, Clone, PartialEq)]
pub struct Observation {
    pub timestamp: DateTime<Utc>,
    pub username: String,
    /// Dotted metric path below the username, e.g. `sleep.score`.
    pub field: String,
    pub value: f64,
}

impl Observation {
    pub fn new(
        timestamp: DateTime<Utc>,
        username: impl Into<String>,
        field: impl Into<String>,
        value: f64,
    ) -> Self {
        Self {
            timestamp,
            username: username.into(),
            field: field.into(),
            value,
        }
    }

    /// Renders the plaintext line `<prefix><username>.<field> <value> <unix-seconds>\n`.
    pub fn render_line(&self, prefix: &str) -> String {
        format!(
            "{}{}.{} {:.6} {}\n",
            prefix,
            self.username,
            self.field,
            self.value,
            self.timestamp.timestamp()
        )
    }
}
