//! Version Constraint Engine
//!
//! Parses plugin versions (`MAJOR.MINOR.PATCH[-tag]`) and dependency
//! constraints (`>=1.2.0`, `~1.4.0`, ...), and decides whether a version
//! satisfies a constraint. Everything here is pure.
//!
//! # Ordering
//!
//! Versions compare by major, minor, then patch. When those are equal a
//! release ranks above any pre-release of the same triple, and two
//! pre-releases compare their tags lexically (`1.0.0-alpha < 1.0.0-beta`).
//!
//! # Constraint Operators
//!
//! | Operator | Meaning |
//! |---|---|
//! | `==` (or no operator) | exactly this version |
//! | `>=` `<=` `>` `<` | ordered comparison |
//! | `~` | same major and minor, and not older |
//! | `*` | any version |

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

/// Errors produced while parsing versions and constraints
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum VersionError {
    /// The string is not `N.N.N[-tag]`
    #[error("invalid version format '{0}': expected MAJOR.MINOR.PATCH[-tag]")]
    InvalidVersionFormat(String),

    /// The string is not `[operator]version`
    #[error("invalid constraint format '{input}': {reason}")]
    InvalidConstraintFormat { input: String, reason: String },
}

/// A parsed plugin version
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Version {
    pub major: u64,
    pub minor: u64,
    pub patch: u64,
    /// Pre-release tag, without the leading `-`
    pub pre: Option<String>,
}

impl Version {
    /// Create a release version
    pub const fn new(major: u64, minor: u64, patch: u64) -> Self {
        Self {
            major,
            minor,
            patch,
            pre: None,
        }
    }

    /// Attach a pre-release tag
    pub fn with_pre(mut self, tag: impl Into<String>) -> Self {
        self.pre = Some(tag.into());
        self
    }

    /// Parse `N.N.N[-tag]`
    pub fn parse(input: &str) -> Result<Self, VersionError> {
        let invalid = || VersionError::InvalidVersionFormat(input.to_string());
        let s = input.trim();

        let (core, pre) = match s.split_once('-') {
            Some((core, tag)) => {
                if tag.is_empty() || !tag.chars().all(is_tag_char) {
                    return Err(invalid());
                }
                (core, Some(tag.to_string()))
            }
            None => (s, None),
        };

        let mut parts = core.split('.');
        let mut next_number = || -> Result<u64, VersionError> {
            let part = parts.next().ok_or_else(invalid)?;
            if part.is_empty() || !part.bytes().all(|b| b.is_ascii_digit()) {
                return Err(invalid());
            }
            part.parse().map_err(|_| invalid())
        };

        let major = next_number()?;
        let minor = next_number()?;
        let patch = next_number()?;
        if parts.next().is_some() {
            return Err(invalid());
        }

        Ok(Self {
            major,
            minor,
            patch,
            pre,
        })
    }

    /// Whether this is a pre-release
    pub fn is_prerelease(&self) -> bool {
        self.pre.is_some()
    }

    /// Equivalent `semver` version, used for host compatibility checks
    pub fn to_semver(&self) -> Option<semver::Version> {
        semver::Version::parse(&self.to_string()).ok()
    }
}

fn is_tag_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '.' || c == '-'
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        self.major
            .cmp(&other.major)
            .then(self.minor.cmp(&other.minor))
            .then(self.patch.cmp(&other.patch))
            .then_with(|| match (&self.pre, &other.pre) {
                (None, None) => Ordering::Equal,
                (None, Some(_)) => Ordering::Greater,
                (Some(_), None) => Ordering::Less,
                (Some(a), Some(b)) => a.cmp(b),
            })
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)?;
        if let Some(pre) = &self.pre {
            write!(f, "-{pre}")?;
        }
        Ok(())
    }
}

impl FromStr for Version {
    type Err = VersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Version {
    type Error = VersionError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::parse(&s)
    }
}

impl From<Version> for String {
    fn from(v: Version) -> Self {
        v.to_string()
    }
}

/// Constraint operator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    Eq,
    Ge,
    Le,
    Gt,
    Lt,
    /// Same major and minor, at least the given version
    Tilde,
    /// Matches every version
    Any,
}

impl Op {
    /// Operator tokens, longest first so `>=` wins over `>`
    const TOKENS: [(&'static str, Op); 6] = [
        ("==", Op::Eq),
        (">=", Op::Ge),
        ("<=", Op::Le),
        (">", Op::Gt),
        ("<", Op::Lt),
        ("~", Op::Tilde),
    ];

    fn as_str(&self) -> &'static str {
        match self {
            Op::Eq => "==",
            Op::Ge => ">=",
            Op::Le => "<=",
            Op::Gt => ">",
            Op::Lt => "<",
            Op::Tilde => "~",
            Op::Any => "*",
        }
    }
}

impl fmt::Display for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A dependency constraint: operator plus version
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Constraint {
    pub op: Op,
    pub version: Version,
}

impl Constraint {
    pub fn new(op: Op, version: Version) -> Self {
        Self { op, version }
    }

    /// Constraint matching every version
    pub fn any() -> Self {
        Self::new(Op::Any, Version::new(0, 0, 0))
    }

    /// Exact match on `version`
    pub fn exact(version: Version) -> Self {
        Self::new(Op::Eq, version)
    }

    /// Parse `[op]version`; a bare version means `==`
    pub fn parse(input: &str) -> Result<Self, VersionError> {
        let s = input.trim();
        if s.is_empty() {
            return Err(VersionError::InvalidConstraintFormat {
                input: input.to_string(),
                reason: "empty constraint".to_string(),
            });
        }
        if s == "*" {
            return Ok(Self::any());
        }

        let (op, rest) = Op::TOKENS
            .iter()
            .find_map(|(token, op)| s.strip_prefix(token).map(|rest| (*op, rest)))
            .unwrap_or((Op::Eq, s));

        let version =
            Version::parse(rest).map_err(|_| VersionError::InvalidConstraintFormat {
                input: input.to_string(),
                reason: format!("'{}' is not a valid version", rest.trim()),
            })?;

        Ok(Self { op, version })
    }

    /// Whether `v` satisfies this constraint
    pub fn matches(&self, v: &Version) -> bool {
        let ord = compare(v, &self.version);
        match self.op {
            Op::Eq => ord == Ordering::Equal,
            Op::Ge => ord != Ordering::Less,
            Op::Le => ord != Ordering::Greater,
            Op::Gt => ord == Ordering::Greater,
            Op::Lt => ord == Ordering::Less,
            Op::Tilde => {
                v.major == self.version.major
                    && v.minor == self.version.minor
                    && ord != Ordering::Less
            }
            Op::Any => true,
        }
    }
}

impl fmt::Display for Constraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.op {
            Op::Any => f.write_str("*"),
            op => write!(f, "{op}{}", self.version),
        }
    }
}

impl FromStr for Constraint {
    type Err = VersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Constraint {
    type Error = VersionError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::parse(&s)
    }
}

impl From<Constraint> for String {
    fn from(c: Constraint) -> Self {
        c.to_string()
    }
}

/// Parse a version string
pub fn parse_version(s: &str) -> Result<Version, VersionError> {
    Version::parse(s)
}

/// Parse a constraint string
pub fn parse_constraint(s: &str) -> Result<Constraint, VersionError> {
    Constraint::parse(s)
}

/// Total order over versions
pub fn compare(a: &Version, b: &Version) -> Ordering {
    a.cmp(b)
}

/// Whether `v` satisfies `c`
pub fn satisfies(v: &Version, c: &Constraint) -> bool {
    c.matches(v)
}
