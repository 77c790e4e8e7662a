//! End-to-end TLS auth reconciliation against the in-memory backend.

use std::sync::Arc;

use keymaster::{
    Error, KeyMaster,
    backend::{Document, InMemoryBackend},
    diff::map_diff,
    generator::Generator,
    model::{Realm, Role, Secret},
    tls_auth::TlsAuthSettings,
};
use pretty_assertions::assert_eq;
use serde_json::{Value, json};

const CA: &str = "-----BEGIN CERTIFICATE-----\nMIIBfake\n-----END CERTIFICATE-----\n";

fn app1() -> Role {
    Role {
        name: "app1".to_string(),
        team: "team5".to_string(),
        secrets: vec![Secret {
            name: "foo".to_string(),
            team: String::new(),
            generator: Generator::alpha(10).unwrap(),
        }],
        realms: vec![Realm::tls(["www.scribd.com"])],
    }
}

fn app3() -> Role {
    Role {
        name: "app3".to_string(),
        team: "team6".to_string(),
        secrets: vec![Secret {
            name: "baz".to_string(),
            team: String::new(),
            generator: Generator::alpha(10).unwrap(),
        }],
        realms: vec![Realm::tls(["app3.example.com"])],
    }
}

fn settings() -> TlsAuthSettings {
    TlsAuthSettings {
        ca_cert: CA.to_string(),
        ip_restrict: true,
    }
}

fn expected(policies: &[&str]) -> Document {
    let Value::Object(map) = json!({
        "allowed_common_names": ["www.scribd.com"],
        "allowed_dns_sans": [],
        "allowed_email_sans": [],
        "allowed_names": [],
        "allowed_organizational_units": [],
        "allowed_uri_sans": [],
        "required_extensions": [],
        "certificate": CA,
        "display_name": "team5-app1-production",
        "bound_cidrs": ["10.1.2.3/32", "2001:db8::1/128"],
        "token_bound_cidrs": ["10.1.2.3/32", "2001:db8::1/128"],
        "token_no_default_policy": false,
        "token_max_ttl": 0,
        "token_period": 0,
        "token_ttl": 0,
        "token_explicit_max_ttl": 0,
        "token_num_uses": 0,
        "token_type": "default",
        "policies": policies,
        "token_policies": policies,
    }) else {
        unreachable!()
    };
    map
}

fn engine() -> (Arc<InMemoryBackend>, KeyMaster) {
    let backend = Arc::new(InMemoryBackend::new());
    let km = KeyMaster::new(backend.clone());
    (backend, km)
}

#[tokio::test]
async fn write_add_remove_round_trip() {
    // GIVEN: app1 written with its own policy
    let (backend, km) = engine();
    let role = app1();
    let own = KeyMaster::new_policy(&role, "production").unwrap();
    km.write_tls_auth(
        &role,
        "production",
        &[own.name.clone()],
        &["10.1.2.3", "2001:db8::1"],
        &settings(),
    )
    .await
    .unwrap();
    assert_eq!(
        backend.paths(),
        vec!["auth/cert/certs/team5-app1-production".to_string()]
    );

    // THEN: the stored document matches exactly
    let original = km.read_tls_auth(&role, "production").await.unwrap();
    map_diff(&expected(&["team5-app1-production"]), &original).unwrap();

    // WHEN: attach app3's policy
    let other = KeyMaster::new_policy(&app3(), "production").unwrap();
    km.add_policy_to_tls_role(&role, "production", &other)
        .await
        .unwrap();

    // THEN: both policies are attached, everything else unchanged
    let added = km.read_tls_auth(&role, "production").await.unwrap();
    map_diff(
        &expected(&["team5-app1-production", "team6-app3-production"]),
        &added,
    )
    .unwrap();

    // WHEN: detach it again
    km.remove_policy_from_tls_role(&role, "production", &other)
        .await
        .unwrap();

    // THEN: the original document is restored exactly
    let restored = km.read_tls_auth(&role, "production").await.unwrap();
    assert_eq!(restored, original);
}

#[tokio::test]
async fn repeated_add_writes_once() {
    // GIVEN: a written role
    let (backend, km) = engine();
    let role = app1();
    let own = KeyMaster::new_policy(&role, "production").unwrap();
    km.write_tls_auth(
        &role,
        "production",
        &[own.name],
        &["10.1.2.3"],
        &settings(),
    )
    .await
    .unwrap();
    let other = KeyMaster::new_policy(&app3(), "production").unwrap();

    // WHEN: add the same policy twice
    km.add_policy_to_tls_role(&role, "production", &other)
        .await
        .unwrap();
    km.add_policy_to_tls_role(&role, "production", &other)
        .await
        .unwrap();

    // THEN: only the first add reached the backend
    assert_eq!(backend.write_count(), 2);
    let doc = km.read_tls_auth_document(&role, "production").await.unwrap();
    assert_eq!(
        doc.policies,
        vec!["team5-app1-production", "team6-app3-production"]
    );
    assert_eq!(doc.policies, doc.token_policies);
}

#[tokio::test]
async fn add_before_write_is_not_found() {
    let (backend, km) = engine();
    let other = KeyMaster::new_policy(&app3(), "production").unwrap();

    let err = km
        .add_policy_to_tls_role(&app1(), "production", &other)
        .await
        .unwrap_err();

    assert!(matches!(err, Error::NotFound(_)), "got {err:?}");
    assert!(backend.paths().is_empty());
}

#[tokio::test]
async fn environments_are_isolated() {
    // GIVEN: the same role written in two environments
    let (backend, km) = engine();
    let role = app1();
    for env in ["staging", "production"] {
        let own = KeyMaster::new_policy(&role, env).unwrap();
        km.write_tls_auth(&role, env, &[own.name], &["10.1.2.3"], &settings())
            .await
            .unwrap();
    }

    // WHEN: delete staging
    km.delete_tls_auth(&role, "staging").await.unwrap();

    // THEN: production is untouched
    assert_eq!(
        backend.paths(),
        vec!["auth/cert/certs/team5-app1-production".to_string()]
    );
    assert!(matches!(
        km.read_tls_auth(&role, "staging").await,
        Err(Error::NotFound(_))
    ));
}

#[tokio::test]
async fn policy_and_role_written_together() {
    // GIVEN: a fresh backend
    let (backend, km) = engine();
    let role = app1();

    // WHEN: write both the policy and the role document
    let policy = KeyMaster::new_policy(&role, "production").unwrap();
    km.write_policy(&policy).await.unwrap();
    km.write_tls_auth(
        &role,
        "production",
        &[policy.name.clone()],
        &["10.1.2.3"],
        &settings(),
    )
    .await
    .unwrap();

    // THEN: both documents exist under their canonical paths
    assert_eq!(
        backend.paths(),
        vec![
            "auth/cert/certs/team5-app1-production".to_string(),
            "sys/policy/team5-app1-production".to_string(),
        ]
    );
}
