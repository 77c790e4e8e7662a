//! TLS certificate-auth role reconciliation.
//!
//! A role's certificate-auth document lives at
//! `auth/{mount}/certs/{team}-{role}-{environment}`. It moves through two
//! states:
//!
//! ```text
//! Absent --write_tls_auth--> Written(P) --add/remove--> Written(P')
//!    ^                           |
//!    +------delete_tls_auth------+
//! ```
//!
//! Add and remove never create or delete the document.
//!
//! # Policy set invariant
//!
//! `policies` and `token_policies` always hold the same names, in insertion
//! order, without duplicates. Adds append; removes keep the relative order of
//! what remains.
//!
//! # Concurrency
//!
//! Add and remove are read-modify-write against a shared document with no
//! version check: two callers mutating the same role concurrently race and
//! the last writer wins. Callers must sequence operations on one
//! `(role, environment)` key themselves.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use tracing::{debug, info};

use crate::audit::{self, AuditEvent};
use crate::backend::Document;
use crate::cidr;
use crate::diff::MapDiff;
use crate::keymaster::KeyMaster;
use crate::model::{RealmKind, Role};
use crate::policy::{Policy, policy_name};
use crate::{Error, Result};

const POLICIES: &str = "policies";
const TOKEN_POLICIES: &str = "token_policies";
const CIDR_FIELDS: [&str; 2] = ["bound_cidrs", "token_bound_cidrs"];

/// Immutable per-write settings for TLS-auth documents.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TlsAuthSettings {
    /// PEM CA certificate embedded as `certificate`. Not validated.
    pub ca_cert: String,
    /// When `false`, `bound_cidrs` and `token_bound_cidrs` are omitted.
    pub ip_restrict: bool,
}

/// Ordered, duplicate-free list of policy names.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PolicySet(Vec<String>);

impl PolicySet {
    /// Build from names, dropping blanks and later duplicates.
    pub fn from_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut set = Self::default();
        for name in names {
            set.insert(name);
        }
        set
    }

    /// Append `name` unless present. Returns `true` if the set changed.
    pub fn insert(&mut self, name: impl Into<String>) -> bool {
        let name = name.into();
        if name.trim().is_empty() || self.contains(&name) {
            return false;
        }
        self.0.push(name);
        true
    }

    /// Remove `name` if present. Returns `true` if the set changed.
    pub fn remove(&mut self, name: &str) -> bool {
        match self.0.iter().position(|n| n == name) {
            Some(idx) => {
                self.0.remove(idx);
                true
            }
            None => false,
        }
    }

    /// Whether `name` is attached.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.0.iter().any(|n| n == name)
    }

    /// Names in insertion order.
    #[must_use]
    pub fn as_slice(&self) -> &[String] {
        &self.0
    }

    /// Number of names.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// `true` when no policy is attached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    fn to_value(&self) -> Value {
        Value::Array(self.0.iter().cloned().map(Value::String).collect())
    }
}

/// Typed projection of a certificate-auth role document.
///
/// Only the wire form ([`Document`]) crosses the backend boundary; use
/// [`TlsAuthRoleDocument::to_document`] and
/// [`TlsAuthRoleDocument::from_document`] to convert.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TlsAuthRoleDocument {
    /// Certificate common names allowed to log in.
    #[serde(default)]
    pub allowed_common_names: Vec<String>,
    /// Allowed DNS SANs.
    #[serde(default)]
    pub allowed_dns_sans: Vec<String>,
    /// Allowed email SANs.
    #[serde(default)]
    pub allowed_email_sans: Vec<String>,
    /// Allowed names (legacy).
    #[serde(default)]
    pub allowed_names: Vec<String>,
    /// Allowed organizational units.
    #[serde(default)]
    pub allowed_organizational_units: Vec<String>,
    /// Allowed URI SANs.
    #[serde(default)]
    pub allowed_uri_sans: Vec<String>,
    /// Required certificate extensions.
    #[serde(default)]
    pub required_extensions: Vec<String>,
    /// PEM CA certificate.
    #[serde(default)]
    pub certificate: String,
    /// Equal to the role's policy name.
    #[serde(default)]
    pub display_name: String,
    /// Source CIDRs allowed to authenticate.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bound_cidrs: Option<Vec<String>>,
    /// Source CIDRs allowed to use issued tokens.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_bound_cidrs: Option<Vec<String>>,
    /// Do not attach the `default` policy.
    #[serde(default)]
    pub token_no_default_policy: bool,
    /// Maximum token TTL in seconds.
    #[serde(default, deserialize_with = "lenient_u64")]
    pub token_max_ttl: u64,
    /// Periodic token period in seconds.
    #[serde(default, deserialize_with = "lenient_u64")]
    pub token_period: u64,
    /// Token TTL in seconds.
    #[serde(default, deserialize_with = "lenient_u64")]
    pub token_ttl: u64,
    /// Explicit maximum TTL in seconds.
    #[serde(default, deserialize_with = "lenient_u64")]
    pub token_explicit_max_ttl: u64,
    /// Allowed token uses (0 = unlimited).
    #[serde(default, deserialize_with = "lenient_u64")]
    pub token_num_uses: u64,
    /// Token type.
    #[serde(default = "default_token_type")]
    pub token_type: String,
    /// Attached policies.
    #[serde(default)]
    pub policies: Vec<String>,
    /// Attached token policies; always equal to `policies`.
    #[serde(default)]
    pub token_policies: Vec<String>,
}

fn default_token_type() -> String {
    "default".to_string()
}

/// Accept a number, a numeric string, or null (as zero).
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn lenient_u64<'de, D>(deserializer: D) -> std::result::Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Error as _;

    match Value::deserialize(deserializer)? {
        Value::Null => Ok(0),
        Value::Number(n) => n
            .as_u64()
            .or_else(|| {
                n.as_f64()
                    .filter(|f| f.fract() == 0.0 && *f >= 0.0)
                    .map(|f| f as u64)
            })
            .ok_or_else(|| D::Error::custom(format!("expected non-negative integer, got {n}"))),
        Value::String(s) if s.is_empty() => Ok(0),
        Value::String(s) => s
            .parse()
            .map_err(|_| D::Error::custom(format!("expected integer, got '{s}'"))),
        other => Err(D::Error::custom(format!("expected integer, got {other}"))),
    }
}

impl TlsAuthRoleDocument {
    /// Compose the desired document for `role` in `environment`.
    ///
    /// - `allowed_common_names`: union of all `tls` realm principals, in order.
    /// - `bound_cidrs` / `token_bound_cidrs`: normalized `addresses`, only when
    ///   `settings.ip_restrict` is set.
    /// - `policies` / `token_policies`: `policy_names` without duplicates.
    pub fn desired<S: AsRef<str>>(
        role: &Role,
        environment: &str,
        policy_names: &[String],
        addresses: &[S],
        settings: &TlsAuthSettings,
    ) -> Result<Self> {
        let display_name = policy_name(role, environment)?;
        role.validate()?;

        let mut common_names: Vec<String> = Vec::new();
        let mut has_tls_realm = false;
        for realm in role.realms_of(RealmKind::Tls) {
            has_tls_realm = true;
            for principal in &realm.principals {
                let principal = principal.trim();
                if !principal.is_empty() && !common_names.iter().any(|n| n == principal) {
                    common_names.push(principal.to_string());
                }
            }
        }
        if !has_tls_realm {
            return Err(Error::InvalidRole(format!(
                "role '{}' has no tls realm",
                role.name
            )));
        }

        let bound = if settings.ip_restrict {
            Some(cidr::normalize(addresses)?)
        } else {
            None
        };

        let policies = PolicySet::from_names(policy_names.iter().cloned());

        Ok(Self {
            allowed_common_names: common_names,
            allowed_dns_sans: Vec::new(),
            allowed_email_sans: Vec::new(),
            allowed_names: Vec::new(),
            allowed_organizational_units: Vec::new(),
            allowed_uri_sans: Vec::new(),
            required_extensions: Vec::new(),
            certificate: settings.ca_cert.clone(),
            display_name,
            token_bound_cidrs: bound.clone(),
            bound_cidrs: bound,
            token_no_default_policy: false,
            token_max_ttl: 0,
            token_period: 0,
            token_ttl: 0,
            token_explicit_max_ttl: 0,
            token_num_uses: 0,
            token_type: default_token_type(),
            policies: policies.0.clone(),
            token_policies: policies.0,
        })
    }

    /// Convert to the backend wire form.
    pub fn to_document(&self) -> Result<Document> {
        match serde_json::to_value(self)? {
            Value::Object(map) => Ok(map),
            other => Err(Error::InvalidConfiguration(format!(
                "role document serialized to non-object {other}"
            ))),
        }
    }

    /// Parse the backend wire form.
    pub fn from_document(document: Document) -> Result<Self> {
        Ok(serde_json::from_value(Value::Object(document))?)
    }
}

/// Read a policy-name list field; absent or null reads as empty.
fn policy_list(document: &Document, key: &str) -> Result<Vec<String>> {
    match document.get(key) {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(Value::Array(items)) => items
            .iter()
            .map(|item| match item {
                Value::String(s) => Ok(s.clone()),
                other => Err(Error::BackendUnavailable(format!(
                    "unexpected entry {other} in '{key}'"
                ))),
            })
            .collect(),
        Some(Value::String(s)) => Ok(s
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect()),
        Some(other) => Err(Error::BackendUnavailable(format!(
            "unexpected value {other} for '{key}'"
        ))),
    }
}

/// Rewrite the CIDR lists of a backend document in canonical prefix form.
fn canonicalize_cidrs(document: &mut Document) {
    for field in CIDR_FIELDS {
        if let Some(Value::Array(items)) = document.get(field) {
            let Some(addresses) = items
                .iter()
                .map(Value::as_str)
                .collect::<Option<Vec<_>>>()
            else {
                continue;
            };
            // Malformed entries are left for the diff to report.
            if let Ok(normalized) = cidr::normalize(&addresses) {
                document.insert(field.to_string(), Value::from(normalized));
            }
        }
    }
}

#[derive(Clone, Copy)]
enum PolicyChange {
    Add,
    Remove,
}

impl KeyMaster {
    /// Write the full certificate-auth document for `role` in `environment`.
    ///
    /// Replaces whatever exists. Writing the same inputs twice leaves the same
    /// remote document.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidRole`] if the role is malformed or has no `tls` realm,
    /// [`Error::InvalidAddress`] for a malformed address,
    /// [`Error::BackendUnavailable`] on backend failure.
    pub async fn write_tls_auth<S: AsRef<str>>(
        &self,
        role: &Role,
        environment: &str,
        policy_names: &[String],
        addresses: &[S],
        settings: &TlsAuthSettings,
    ) -> Result<()> {
        let desired =
            TlsAuthRoleDocument::desired(role, environment, policy_names, addresses, settings)?;
        let path = self.tls_auth_path(&desired.display_name);

        debug!(
            path = %path,
            common_names = desired.allowed_common_names.len(),
            ip_restrict = settings.ip_restrict,
            "Writing TLS auth role"
        );
        self.backend.write(&path, &desired.to_document()?).await?;

        info!(path = %path, policies = ?desired.policies, "TLS auth role written");
        audit::emit(&AuditEvent::tls_role_written(&path, &desired.policies));
        Ok(())
    }

    /// Fetch the current certificate-auth document verbatim.
    ///
    /// # Errors
    ///
    /// [`Error::NotFound`] if no document exists,
    /// [`Error::BackendUnavailable`] on backend failure.
    pub async fn read_tls_auth(&self, role: &Role, environment: &str) -> Result<Document> {
        let path = self.tls_auth_path(&policy_name(role, environment)?);
        self.backend
            .read(&path)
            .await?
            .ok_or_else(|| Error::NotFound(format!("no TLS auth role at {path}")))
    }

    /// Fetch and parse the current certificate-auth document.
    pub async fn read_tls_auth_document(
        &self,
        role: &Role,
        environment: &str,
    ) -> Result<TlsAuthRoleDocument> {
        TlsAuthRoleDocument::from_document(self.read_tls_auth(role, environment).await?)
    }

    /// Attach `policy` to the role's certificate-auth document.
    ///
    /// Adding a policy that is already attached succeeds without writing.
    /// Not guarded against concurrent writers; see the module docs.
    ///
    /// # Errors
    ///
    /// [`Error::NotFound`] if the document does not exist yet.
    pub async fn add_policy_to_tls_role(
        &self,
        role: &Role,
        environment: &str,
        policy: &Policy,
    ) -> Result<()> {
        self.change_policies(role, environment, &policy.name, PolicyChange::Add)
            .await
    }

    /// Detach `policy` from the role's certificate-auth document.
    ///
    /// Removing a policy that is not attached succeeds without writing. Every
    /// other field is preserved. Not guarded against concurrent writers; see
    /// the module docs.
    ///
    /// # Errors
    ///
    /// [`Error::NotFound`] if the document does not exist.
    pub async fn remove_policy_from_tls_role(
        &self,
        role: &Role,
        environment: &str,
        policy: &Policy,
    ) -> Result<()> {
        self.change_policies(role, environment, &policy.name, PolicyChange::Remove)
            .await
    }

    /// Check that the stored document carries everything `write_tls_auth`
    /// would write for these inputs.
    ///
    /// Fields the backend adds on its own are ignored, name lists are
    /// compared as multisets, and the backend's CIDRs are normalized first
    /// (Vault reports host routes as bare addresses).
    ///
    /// # Errors
    ///
    /// [`Error::StructuralMismatch`] listing every difference,
    /// [`Error::NotFound`] if the document does not exist.
    pub async fn verify_tls_auth<S: AsRef<str>>(
        &self,
        role: &Role,
        environment: &str,
        policy_names: &[String],
        addresses: &[S],
        settings: &TlsAuthSettings,
    ) -> Result<()> {
        let expected =
            TlsAuthRoleDocument::desired(role, environment, policy_names, addresses, settings)?
                .to_document()?;
        let mut actual = self.read_tls_auth(role, environment).await?;
        canonicalize_cidrs(&mut actual);

        MapDiff::new()
            .unordered("allowed_common_names")
            .unordered("bound_cidrs")
            .unordered("token_bound_cidrs")
            .unordered(POLICIES)
            .unordered(TOKEN_POLICIES)
            .allow_extra_keys()
            .diff(&expected, &actual)
    }

    /// Delete the role's certificate-auth document.
    pub async fn delete_tls_auth(&self, role: &Role, environment: &str) -> Result<()> {
        let path = self.tls_auth_path(&policy_name(role, environment)?);
        self.backend.delete(&path).await?;
        audit::emit(&AuditEvent::tls_role_deleted(&path));
        Ok(())
    }

    async fn change_policies(
        &self,
        role: &Role,
        environment: &str,
        policy: &str,
        change: PolicyChange,
    ) -> Result<()> {
        let path = self.tls_auth_path(&policy_name(role, environment)?);
        let mut document = self
            .backend
            .read(&path)
            .await?
            .ok_or_else(|| Error::NotFound(format!("no TLS auth role at {path}")))?;

        let policies = policy_list(&document, POLICIES)?;
        let token_policies = policy_list(&document, TOKEN_POLICIES)?;

        // Drifted lists are merged, `policies` order first.
        let mut set = PolicySet::from_names(policies.iter().chain(&token_policies).cloned());
        let in_sync = policies == token_policies && set.len() == policies.len();

        let changed = match change {
            PolicyChange::Add => set.insert(policy),
            PolicyChange::Remove => set.remove(policy),
        };

        if !changed && in_sync {
            debug!(path = %path, policy, "Policy set unchanged");
            audit::emit(&AuditEvent::unchanged(&path, policy));
            return Ok(());
        }

        document.insert(POLICIES.to_string(), set.to_value());
        document.insert(TOKEN_POLICIES.to_string(), set.to_value());
        self.backend.write(&path, &document).await?;

        let event = match change {
            PolicyChange::Add => AuditEvent::policy_added(&path, policy, set.as_slice()),
            PolicyChange::Remove => AuditEvent::policy_removed(&path, policy, set.as_slice()),
        };
        info!(
            path = %path,
            policy,
            policies = ?set.as_slice(),
            event = event.event,
            "TLS auth policies updated"
        );
        audit::emit(&event);
        Ok(())
    }
}
