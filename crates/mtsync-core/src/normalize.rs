//! Input validation for values that leave the process
//!
//! The interface name ends up as an argument to an external `ip` invocation,
//! so it is checked against a deny-list of shell metacharacters before it is
//! used anywhere. Addresses are not normalized: identity is the exact text
//! published by the source.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Characters that are never allowed in an interface name
pub const FORBIDDEN_INTERFACE_CHARS: &[char] = &[
    ';', '|', '&', '$', '`', '(', ')', '{', '}', '[', ']', '<', '>', '*', '?', '!', '\\', '\'',
    '"',
];

/// Validate a raw interface name
///
/// Surrounding whitespace is trimmed first. Returns the trimmed name, or
/// [`Error::InvalidInput`] if it is empty or contains a forbidden character.
pub fn validate_interface_name(raw: &str) -> Result<String> {
    let name = raw.trim();

    if name.is_empty() {
        return Err(Error::invalid_input("Interface name cannot be empty"));
    }

    if let Some(c) = name.chars().find(|c| FORBIDDEN_INTERFACE_CHARS.contains(c)) {
        return Err(Error::invalid_input(format!(
            "Invalid character {:?} found in interface name",
            c
        )));
    }

    Ok(name.to_string())
}

/// An interface name that passed [`validate_interface_name`]
///
/// The only way to build one is through validation, so anything holding an
/// `InterfaceName` can hand it to a subprocess.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct InterfaceName(String);

impl InterfaceName {
    /// Validate and wrap a raw interface name
    pub fn parse(raw: &str) -> Result<Self> {
        validate_interface_name(raw).map(Self)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for InterfaceName {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<InterfaceName> for String {
    fn from(name: InterfaceName) -> Self {
        name.0
    }
}

impl AsRef<str> for InterfaceName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for InterfaceName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
