//! Identifier of the database the daemon serves.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::ports::SupervisorError;

/// Name of the data set the daemon is bound to.
///
/// Always non-empty and free of surrounding whitespace; construct it with
/// [`Target::new`] so that invariant holds everywhere a target is passed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Target(String);

impl Target {
    /// Validate and wrap a target identifier.
    pub fn new(name: impl Into<String>) -> Result<Self, SupervisorError> {
        let name = name.into();
        let trimmed = name.trim();
        if trimmed.is_empty() {
            return Err(SupervisorError::EmptyTarget);
        }
        if trimmed.len() == name.len() {
            Ok(Self(name))
        } else {
            Ok(Self(trimmed.to_string()))
        }
    }

    /// The identifier as passed to the daemon.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for Target {
    type Error = SupervisorError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Target> for String {
    fn from(target: Target) -> Self {
        target.0
    }
}

impl AsRef<str> for Target {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_blank_names() {
        assert!(matches!(Target::new(""), Err(SupervisorError::EmptyTarget)));
        assert!(matches!(
            Target::new("   \t"),
            Err(SupervisorError::EmptyTarget)
        ));
    }

    #[test]
    fn test_trims_whitespace() {
        let target = Target::new("  papers \n").unwrap();
        assert_eq!(target.as_str(), "papers");
        assert_eq!(target, Target::new("papers").unwrap());
    }

    #[test]
    fn test_serde_validates() {
        let target: Target = serde_json::from_str("\"notes\"").unwrap();
        assert_eq!(target.to_string(), "notes");
        assert!(serde_json::from_str::<Target>("\"\"").is_err());
    }
}
