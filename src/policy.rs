//! Policy synthesis: derives a policy identity and document from a role.
//!
//! # Design
//!
//! Synthesis is a pure function of `(role, environment)`:
//!
//! - **Name**: `{team}-{role}-{environment}`.
//! - **Document**: one grant per secret, in the role's secret order. Each
//!   grant carries the secret's path, the capabilities it allows and the
//!   description of the generator the backend uses to mint the value.
//!
//! Nothing here talks to the backend; [`crate::KeyMaster::write_policy`]
//! pushes the rendered HCL.
//!
//! ## Secret paths
//!
//! | Secret team | Path |
//! |-------------|------|
//! | set | `{secret.team}/data/{environment}/{secret.name}` |
//! | empty | `{role.team}/data/{environment}/{secret.name}` |

use std::fmt::Write as _;

use serde::{Deserialize, Serialize};

use crate::generator::{Describe, GeneratorDescription};
use crate::model::Role;
use crate::{Error, Result};

/// KV mount segment between the team and the environment.
const SECRET_DATA_SEGMENT: &str = "data";

/// Capability granted on a secret path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Capability {
    /// Read the secret.
    Read,
    /// List keys under the path.
    List,
}

impl Capability {
    fn as_str(self) -> &'static str {
        match self {
            Self::Read => "read",
            Self::List => "list",
        }
    }
}

/// One path grant inside a policy document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyGrant {
    /// Secret name the grant was derived from.
    pub secret: String,
    /// Backend path.
    pub path: String,
    /// Capabilities allowed on `path`.
    pub capabilities: Vec<Capability>,
    /// How the backend generates the secret value.
    pub generator: GeneratorDescription,
}

/// What a policy grants, in secret order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyDocument {
    /// Path grants.
    pub grants: Vec<PolicyGrant>,
}

impl PolicyDocument {
    /// Render the document as Vault HCL.
    ///
    /// Output is deterministic: grants appear in document order and
    /// capabilities in grant order.
    #[must_use]
    pub fn to_hcl(&self) -> String {
        let mut out = String::new();
        for (i, grant) in self.grants.iter().enumerate() {
            if i > 0 {
                out.push('\n');
            }
            let caps = grant
                .capabilities
                .iter()
                .map(|c| format!("\"{}\"", c.as_str()))
                .collect::<Vec<_>>()
                .join(", ");
            // Writing into a String cannot fail.
            let _ = writeln!(out, "path \"{}\" {{", grant.path);
            let _ = writeln!(out, "  capabilities = [{caps}]");
            out.push_str("}\n");
        }
        out
    }
}

/// Synthesized policy: a deterministic name plus its document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Policy {
    /// `{team}-{role}-{environment}`
    pub name: String,
    /// Granted paths.
    pub document: PolicyDocument,
}

/// Check that an environment name is usable in names and paths.
pub fn validate_environment(environment: &str) -> Result<()> {
    if environment.trim().is_empty() {
        return Err(Error::InvalidEnvironment(
            "environment name is empty".to_string(),
        ));
    }
    if environment.contains('/') {
        return Err(Error::InvalidEnvironment(format!(
            "environment '{environment}' must not contain '/'"
        )));
    }
    Ok(())
}

/// Compute the canonical policy name for a role in an environment.
pub fn policy_name(role: &Role, environment: &str) -> Result<String> {
    if role.team.trim().is_empty() || role.name.trim().is_empty() {
        return Err(Error::InvalidRole(
            "role team and name must both be set".to_string(),
        ));
    }
    validate_environment(environment)?;
    Ok(format!("{}-{}-{}", role.team, role.name, environment))
}

/// Synthesize the policy for `role` in `environment`.
///
/// Calling this twice with the same inputs yields identical output.
pub fn new_policy(role: &Role, environment: &str) -> Result<Policy> {
    let name = policy_name(role, environment)?;
    role.validate()?;

    let grants = role
        .secrets
        .iter()
        .map(|secret| PolicyGrant {
            secret: secret.name.clone(),
            path: format!(
                "{}/{SECRET_DATA_SEGMENT}/{environment}/{}",
                secret.namespace(role),
                secret.name
            ),
            capabilities: vec![Capability::Read],
            generator: secret.generator.describe(),
        })
        .collect();

    Ok(Policy {
        name,
        document: PolicyDocument { grants },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generator::Generator;
    use crate::model::{Realm, Secret};
    use proptest::prelude::*;

    fn app1() -> Role {
        Role {
            name: "app1".to_string(),
            team: "team5".to_string(),
            secrets: vec![Secret {
                name: "foo".to_string(),
                team: "team5".to_string(),
                generator: Generator::alpha(10).unwrap(),
            }],
            realms: vec![Realm::tls(["www.scribd.com"])],
        }
    }

    #[test]
    fn name_is_team_role_environment() {
        let policy = new_policy(&app1(), "production").unwrap();
        assert_eq!(policy.name, "team5-app1-production");
    }

    #[test]
    fn one_grant_per_secret_in_order() {
        // GIVEN: a role with two secrets, the second in another team
        let mut role = app1();
        role.secrets.push(Secret {
            name: "bar".to_string(),
            team: "team6".to_string(),
            generator: Generator::hex(32).unwrap(),
        });

        // WHEN: synthesize
        let policy = new_policy(&role, "staging").unwrap();

        // THEN: grants follow secret order and namespacing
        let paths: Vec<_> = policy.document.grants.iter().map(|g| g.path.as_str()).collect();
        assert_eq!(paths, vec!["team5/data/staging/foo", "team6/data/staging/bar"]);
        assert_eq!(policy.document.grants[1].generator.kind, "hex");
    }

    #[test]
    fn empty_secret_team_uses_role_team() {
        let mut role = app1();
        role.secrets[0].team = String::new();
        let policy = new_policy(&role, "production").unwrap();
        assert_eq!(policy.document.grants[0].path, "team5/data/production/foo");
    }

    #[test]
    fn empty_team_is_invalid_role() {
        let mut role = app1();
        role.team = String::new();
        assert!(matches!(new_policy(&role, "production"), Err(Error::InvalidRole(_))));
    }

    #[test]
    fn empty_name_is_invalid_role() {
        let mut role = app1();
        role.name = String::new();
        assert!(matches!(new_policy(&role, "production"), Err(Error::InvalidRole(_))));
    }

    #[test]
    fn empty_environment_is_invalid() {
        assert!(matches!(
            new_policy(&app1(), ""),
            Err(Error::InvalidEnvironment(_))
        ));
    }

    #[test]
    fn environment_with_slash_is_invalid() {
        assert!(matches!(
            new_policy(&app1(), "prod/eu"),
            Err(Error::InvalidEnvironment(_))
        ));
    }

    #[test]
    fn role_without_secrets_yields_empty_document() {
        let mut role = app1();
        role.secrets.clear();
        let policy = new_policy(&role, "production").unwrap();
        assert!(policy.document.grants.is_empty());
        assert_eq!(policy.document.to_hcl(), "");
    }

    #[test]
    fn renders_hcl() {
        let policy = new_policy(&app1(), "production").unwrap();
        assert_eq!(
            policy.document.to_hcl(),
            "path \"team5/data/production/foo\" {\n  capabilities = [\"read\"]\n}\n"
        );
    }

    proptest! {
        /// Synthesizing twice yields byte-identical output.
        #[test]
        fn synthesis_is_idempotent(
            team in "[a-z][a-z0-9]{0,8}",
            name in "[a-z][a-z0-9]{0,8}",
            env in "[a-z]{1,10}",
            secrets in proptest::collection::vec(("[a-z]{1,6}", 1u32..64), 0..5),
        ) {
            let role = Role {
                name,
                team,
                secrets: secrets
                    .into_iter()
                    .map(|(n, len)| Secret {
                        name: n,
                        team: String::new(),
                        generator: Generator::alpha(len).unwrap(),
                    })
                    .collect(),
                realms: vec![],
            };
            let a = new_policy(&role, &env).unwrap();
            let b = new_policy(&role, &env).unwrap();
            prop_assert_eq!(&a, &b);
            prop_assert_eq!(
                serde_json::to_vec(&a).unwrap(),
                serde_json::to_vec(&b).unwrap()
            );
            prop_assert_eq!(a.document.to_hcl(), b.document.to_hcl());
        }
    }
}
