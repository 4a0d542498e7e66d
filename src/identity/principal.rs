use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Principal {
    pub user_id: String,
    #[serde(default)]
    pub username: String,
    /// Short initials used in file identifiers; derived from the username when unset.
    #[serde(default)]
    pub abbr: Option<String>,
}

impl Principal {
    pub fn new(user_id: impl Into<String>, username: impl Into<String>) -> Self {
        Self { user_id: user_id.into(), username: username.into(), abbr: None }
    }

    pub fn with_abbr(mut self, abbr: impl Into<String>) -> Self {
        self.abbr = Some(abbr.into());
        self
    }

    /// Abbreviation for identifiers: explicit `abbr`, else the first three
    /// alphanumerics of the username (or user id), uppercased.
    pub fn abbreviation(&self) -> String {
        if let Some(a) = self.abbr.as_deref().map(str::trim).filter(|a| !a.is_empty()) {
            return a.to_uppercase();
        }
        let source = if self.username.trim().is_empty() { &self.user_id } else { &self.username };
        let abbr: String = source.chars().filter(|c| c.is_alphanumeric()).take(3).collect();
        if abbr.is_empty() { "ANON".to_string() } else { abbr.to_uppercase() }
    }

    pub fn display_name(&self) -> &str {
        if self.username.is_empty() { &self.user_id } else { &self.username }
    }
}

impl fmt::Display for Principal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}]", self.display_name(), self.user_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn abbreviation_prefers_explicit_value() {
        let p = Principal::new("7", "smari").with_abbr("sb");
        assert_eq!(p.abbreviation(), "SB");
    }

    #[test]
    fn abbreviation_from_username_or_id() {
        assert_eq!(Principal::new("7", "j.doe").abbreviation(), "JDO");
        assert_eq!(Principal::new("u42", "").abbreviation(), "U42");
        assert_eq!(Principal::new("--", "").abbreviation(), "ANON");
    }

    #[test]
    fn display_includes_id() {
        assert_eq!(Principal::new("7", "smari").to_string(), "smari [7]");
        assert_eq!(Principal::new("7", "").to_string(), "7 [7]");
    }
}
