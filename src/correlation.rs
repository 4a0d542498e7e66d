use std::fmt;
use uuid::Uuid;

/// Correlation id attached to a store handle and echoed in its log lines.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CorrelationId(String);

impl CorrelationId {
    pub fn new() -> Self { Self(Uuid::new_v4().to_string()) }

    /// Adopt an upstream id (e.g. a request id from the views layer); blank input generates a fresh one.
    pub fn from_opt_str(s: Option<&str>) -> Self {
        match s.map(str::trim) {
            Some(v) if !v.is_empty() => match Uuid::parse_str(v) {
                Ok(u) => Self(u.to_string()),
                Err(_) => Self(v.to_string()),
            },
            _ => Self::new(),
        }
    }

    pub fn as_str(&self) -> &str { &self.0 }
}

impl Default for CorrelationId {
    fn default() -> Self { Self::new() }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{}", self.0) }
}
