//! `${...}` variable substitution in launch parameter strings

use crate::error::{Error, Result};
use std::collections::HashMap;

const ENV_VAR_PREFIX: &str = "env_var:";

/// Expands variable references inside a string
pub trait StringSubstitution: Send + Sync {
    fn substitute(&self, input: &str) -> Result<String>;
}

/// Leaves every string untouched
#[derive(Debug, Default, Clone, Copy)]
pub struct NoSubstitution;

impl StringSubstitution for NoSubstitution {
    fn substitute(&self, input: &str) -> Result<String> {
        Ok(input.to_string())
    }
}

type Lookup = Box<dyn Fn(&str) -> Option<String> + Send + Sync>;

/// Replaces `${env_var:NAME}` with the value of environment variable `NAME`.
///
/// Any other `${...}` reference, or an undefined variable, is an error.
/// An unterminated `${` is kept literally.
pub struct EnvSubstitution {
    lookup: Lookup,
}

impl Default for EnvSubstitution {
    fn default() -> Self {
        Self::new()
    }
}

impl EnvSubstitution {
    /// Resolve against the process environment
    pub fn new() -> Self {
        Self {
            lookup: Box::new(|name| std::env::var(name).ok()),
        }
    }

    /// Resolve against a fixed set of variables
    pub fn from_vars(vars: HashMap<String, String>) -> Self {
        Self {
            lookup: Box::new(move |name| vars.get(name).cloned()),
        }
    }

    fn resolve(&self, reference: &str) -> Result<String> {
        let name = reference.strip_prefix(ENV_VAR_PREFIX).ok_or_else(|| {
            Error::Substitution(format!("Reference to undefined variable {}", reference))
        })?;
        (self.lookup)(name).ok_or_else(|| {
            Error::Substitution(format!("Environment variable {} is not defined", name))
        })
    }
}

impl StringSubstitution for EnvSubstitution {
    fn substitute(&self, input: &str) -> Result<String> {
        let mut out = String::with_capacity(input.len());
        let mut rest = input;

        while let Some(start) = rest.find("${") {
            let Some(len) = rest[start + 2..].find('}') else {
                break;
            };
            out.push_str(&rest[..start]);
            out.push_str(&self.resolve(&rest[start + 2..start + 2 + len])?);
            rest = &rest[start + 2 + len + 1..];
        }
        out.push_str(rest);

        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars() -> EnvSubstitution {
        EnvSubstitution::from_vars(HashMap::from([
            ("HOME".to_string(), "/home/dev".to_string()),
            ("PORT".to_string(), "5678".to_string()),
        ]))
    }

    #[test]
    fn test_plain_strings_unchanged() {
        assert_eq!(vars().substitute("main.py").unwrap(), "main.py");
        assert_eq!(NoSubstitution.substitute("${env_var:X}").unwrap(), "${env_var:X}");
    }

    #[test]
    fn test_env_vars_expanded() {
        let s = vars()
            .substitute("${env_var:HOME}/app:${env_var:PORT}")
            .unwrap();
        assert_eq!(s, "/home/dev/app:5678");
    }

    #[test]
    fn test_undefined_variable_is_error() {
        let err = vars().substitute("${env_var:MISSING}").unwrap_err();
        assert!(err.to_string().contains("MISSING"));

        let err = vars().substitute("${workspace_loc}").unwrap_err();
        assert!(matches!(err, Error::Substitution(_)));
    }

    #[test]
    fn test_unterminated_reference_kept() {
        assert_eq!(vars().substitute("cost ${5").unwrap(), "cost ${5");
    }
}
