//! Domain model: roles, the secrets they need, and the realms allowed to
//! assume them.
//!
//! # Example YAML
//!
//! ```yaml
//! name: app1
//! team: team5
//! secrets:
//!   - name: foo
//!     team: team5
//!     generator:
//!       type: alpha
//!       length: 10
//! realms:
//!   - type: tls
//!     principals: ["www.scribd.com"]
//! ```

use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::generator::Generator;
use crate::{Error, Result};

/// Identity unit requesting secrets and access.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Role {
    /// Role name, unique within its team.
    pub name: String,
    /// Owning team.
    pub team: String,
    /// Secrets this role may obtain, in declaration order.
    #[serde(default)]
    pub secrets: Vec<Secret>,
    /// Trust realms through which the role may be assumed.
    #[serde(default)]
    pub realms: Vec<Realm>,
}

/// Declarative template for a backend-generated secret.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Secret {
    /// Secret name.
    pub name: String,
    /// Team whose namespace holds the secret; empty means "the owning
    /// role's team".
    ///
    /// Any team is accepted: a role may read a secret owned by another team,
    /// and the grant path is built under that team's namespace.
    #[serde(default)]
    pub team: String,
    /// How the backend should produce the value.
    pub generator: Generator,
}

/// Trust mechanism tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RealmKind {
    /// Certificate-based authentication.
    Tls,
}

impl fmt::Display for RealmKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tls => f.write_str("tls"),
        }
    }
}

/// Trust boundary and its authorized principals.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Realm {
    /// Trust mechanism.
    #[serde(rename = "type")]
    pub kind: RealmKind,
    /// Principals (for `tls`: hostnames / certificate common names).
    #[serde(default)]
    pub principals: Vec<String>,
}

impl Realm {
    /// A `tls` realm for the given principals.
    pub fn tls<I, S>(principals: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            kind: RealmKind::Tls,
            principals: principals.into_iter().map(Into::into).collect(),
        }
    }
}

impl Secret {
    /// Team this secret is namespaced under.
    #[must_use]
    pub fn namespace<'a>(&'a self, role: &'a Role) -> &'a str {
        if self.team.is_empty() {
            &role.team
        } else {
            &self.team
        }
    }
}

impl Role {
    /// Check the structural invariants of a role.
    ///
    /// Name and team must be non-empty, every secret must be named, and every
    /// `tls` realm must carry at least one principal. A secret's team is not
    /// checked against the role's; see [`Secret::team`].
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(Error::InvalidRole("role name is empty".to_string()));
        }
        if self.team.trim().is_empty() {
            return Err(Error::InvalidRole(format!(
                "role '{}' has no team",
                self.name
            )));
        }
        if let Some(idx) = self.secrets.iter().position(|s| s.name.trim().is_empty()) {
            return Err(Error::InvalidRole(format!(
                "role '{}' secret #{idx} has no name",
                self.name
            )));
        }
        for realm in &self.realms {
            if realm.kind == RealmKind::Tls
                && realm.principals.iter().all(|p| p.trim().is_empty())
            {
                return Err(Error::InvalidRole(format!(
                    "role '{}' has a tls realm without principals",
                    self.name
                )));
            }
        }
        Ok(())
    }

    /// Realms of the given kind, in declaration order.
    pub fn realms_of(&self, kind: RealmKind) -> impl Iterator<Item = &Realm> {
        self.realms.iter().filter(move |r| r.kind == kind)
    }

    /// Load and validate a role from a YAML file.
    pub fn from_yaml_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let role: Self = serde_yaml::from_str(&text)?;
        role.validate()?;
        Ok(role)
    }
}
