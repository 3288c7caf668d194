//! Tests for the [`Storage`] trait.
//!
//! Every test runs against all three engines, which must agree exactly.

use super::*;
use crate::zones::canonical_name;
use tempfile::TempDir;

const TOKEN_A: &str = "LPsIwTo7o8BoG0-vjCyGQGBWSVIPxI-i_X336eUOQZo";
const TOKEN_B: &str = "AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA";

struct Backend {
    name: &'static str,
    storage: DynStorage,
    // Keeps the database files alive for the duration of the test.
    _dir: TempDir,
}

async fn backends() -> Vec<Backend> {
    let mut backends = Vec::new();
    for config in ["memory", "sqlite", "redb"] {
        let dir = tempfile::tempdir().unwrap();
        backends.push(Backend {
            name: config,
            storage: open(&storage_config(config, &dir), false).await.unwrap(),
            _dir: dir,
        });
    }
    backends
}

fn storage_config(kind: &str, dir: &TempDir) -> StorageConfig {
    match kind {
        "memory" => StorageConfig::Memory,
        "sqlite" => StorageConfig::Sqlite {
            path: dir.path().join("acme.db"),
        },
        _ => StorageConfig::Redb {
            path: dir.path().join("acme.redb"),
            gc_interval: kv::default_gc_interval(),
        },
    }
}

fn name(s: &str) -> LowerName {
    canonical_name(s).unwrap()
}

fn account(username: &str, zone: &str, allowed: &[&str]) -> Account {
    Account {
        username: username.to_string(),
        password_digest: format!("digest-of-{username}"),
        zone: name(zone),
        allowed_ips: CidrList::parse(allowed).unwrap(),
    }
}

#[tokio::test]
async fn present_is_idempotent() {
    for backend in backends().await {
        let fqdn = name("_acme-challenge.example.org");
        for _ in 0..3 {
            backend.storage.present_record(&fqdn, TOKEN_A).await.unwrap();
        }
        let values = backend.storage.get_records(&fqdn).await.unwrap();
        assert_eq!(values, vec![TOKEN_A], "{}", backend.name);
    }
}

#[tokio::test]
async fn records_are_kept_per_fqdn() {
    for backend in backends().await {
        let first = name("_acme-challenge.example.org");
        let second = name("_acme-challenge.sub.example.org");
        backend.storage.present_record(&first, TOKEN_A).await.unwrap();
        backend.storage.present_record(&first, TOKEN_B).await.unwrap();
        backend.storage.present_record(&second, TOKEN_B).await.unwrap();

        let mut values = backend.storage.get_records(&first).await.unwrap();
        values.sort();
        assert_eq!(values, vec![TOKEN_B, TOKEN_A], "{}", backend.name);
        assert_eq!(
            backend.storage.get_records(&second).await.unwrap(),
            vec![TOKEN_B],
            "{}",
            backend.name
        );
    }
}

#[tokio::test]
async fn missing_records_are_not_found() {
    for backend in backends().await {
        let fqdn = name("_acme-challenge.example.org");
        let result = backend.storage.get_records(&fqdn).await;
        assert!(
            matches!(result, Err(Error::RecordNotFound(ref missing)) if *missing == fqdn),
            "{}: {result:?}",
            backend.name
        );
    }
}

#[tokio::test]
async fn removing_last_value_leaves_not_found() {
    for backend in backends().await {
        let fqdn = name("_acme-challenge.example.org");
        backend.storage.present_record(&fqdn, TOKEN_A).await.unwrap();
        backend.storage.present_record(&fqdn, TOKEN_B).await.unwrap();

        backend.storage.cleanup_record(&fqdn, TOKEN_A).await.unwrap();
        assert_eq!(
            backend.storage.get_records(&fqdn).await.unwrap(),
            vec![TOKEN_B],
            "{}",
            backend.name
        );

        backend.storage.cleanup_record(&fqdn, TOKEN_B).await.unwrap();
        let result = backend.storage.get_records(&fqdn).await;
        assert!(result.unwrap_err().is_not_found(), "{}", backend.name);
    }
}

#[tokio::test]
async fn cleanup_outcomes() {
    for backend in backends().await {
        let fqdn = name("_acme-challenge.example.org");

        // Nothing was ever presented.
        backend.storage.cleanup_record(&fqdn, TOKEN_A).await.unwrap();

        backend.storage.present_record(&fqdn, TOKEN_A).await.unwrap();
        let result = backend.storage.cleanup_record(&fqdn, TOKEN_B).await;
        assert!(
            matches!(result, Err(Error::ValueNotFound { ref value, .. }) if value == TOKEN_B),
            "{}: {result:?}",
            backend.name
        );
        assert_eq!(
            backend.storage.get_records(&fqdn).await.unwrap(),
            vec![TOKEN_A],
            "{}",
            backend.name
        );
    }
}

#[tokio::test]
async fn account_round_trip() {
    for backend in backends().await {
        let registered = account("alice", "example.org", &["192.168.1.1", "10.0.0.0/24"]);
        backend.storage.register_account(&registered).await.unwrap();

        let found = backend
            .storage
            .get_account("alice", &name("example.org"))
            .await
            .unwrap();
        assert_eq!(found, registered, "{}", backend.name);
    }
}

#[tokio::test]
async fn duplicate_accounts_are_rejected() {
    for backend in backends().await {
        backend
            .storage
            .register_account(&account("alice", "example.org", &[]))
            .await
            .unwrap();

        let result = backend
            .storage
            .register_account(&account("alice", "example.org", &["10.0.0.1"]))
            .await;
        assert!(
            matches!(result, Err(Error::AccountExists { ref username, .. }) if username == "alice"),
            "{}: {result:?}",
            backend.name
        );

        // Same username, different zone.
        backend
            .storage
            .register_account(&account("alice", "example.net", &[]))
            .await
            .unwrap();
        // Same zone, different username.
        backend
            .storage
            .register_account(&account("bob", "example.org", &[]))
            .await
            .unwrap();

        // The first registration is untouched.
        let found = backend
            .storage
            .get_account("alice", &name("example.org"))
            .await
            .unwrap();
        assert!(found.allowed_ips.is_empty(), "{}", backend.name);
    }
}

#[tokio::test]
async fn longest_zone_wins() {
    for backend in backends().await {
        for zone in ["a", "b.a", "other.org"] {
            backend
                .storage
                .register_account(&account("alice", zone, &[]))
                .await
                .unwrap();
        }
        backend
            .storage
            .register_account(&account("bob", "c.b.a", &[]))
            .await
            .unwrap();

        let cases = [
            ("x.b.a", "b.a."),
            ("_acme-challenge.b.a", "b.a."),
            ("b.a", "b.a."),
            ("x.a", "a."),
            ("a", "a."),
            // bob's deeper zone doesn't belong to alice.
            ("x.c.b.a", "b.a."),
        ];
        for (queried, expected) in cases {
            let found = backend
                .storage
                .get_account("alice", &name(queried))
                .await
                .unwrap();
            assert_eq!(
                found.zone.to_string(),
                expected,
                "{}: lookup of {queried}",
                backend.name
            );
        }
    }
}

#[tokio::test]
async fn account_lookup_misses() {
    for backend in backends().await {
        backend
            .storage
            .register_account(&account("alice", "example.org", &[]))
            .await
            .unwrap();

        for (username, queried) in [
            ("alice", "badexample.org"),
            ("alice", "org"),
            ("alice", "example.com"),
            ("mallory", "example.org"),
            ("alic", "example.org"),
        ] {
            let result = backend.storage.get_account(username, &name(queried)).await;
            assert!(
                matches!(result, Err(Error::AccountNotFound { .. })),
                "{}: {username} / {queried}: {result:?}",
                backend.name
            );
        }
    }
}

#[tokio::test]
async fn concurrent_reads_and_writes() {
    for backend in backends().await {
        let fqdn = name("_acme-challenge.example.org");
        let mut tasks = Vec::new();
        for i in 0..16 {
            let storage = Arc::clone(&backend.storage);
            let fqdn = fqdn.clone();
            tasks.push(tokio::spawn(async move {
                storage.present_record(&fqdn, &format!("value-{i:02}")).await.unwrap();
                // Either outcome is fine mid-flight; it just mustn't fault.
                match storage.get_records(&fqdn).await {
                    Ok(_) | Err(Error::RecordNotFound(_)) => {}
                    Err(err) => panic!("unexpected error: {err}"),
                }
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }
        let values = backend.storage.get_records(&fqdn).await.unwrap();
        assert_eq!(values.len(), 16, "{}", backend.name);
    }
}

#[tokio::test]
async fn memory_read_only_rejects_writes() {
    let storage = open(&StorageConfig::Memory, true).await.unwrap();
    let fqdn = name("_acme-challenge.example.org");
    assert!(matches!(
        storage.present_record(&fqdn, TOKEN_A).await,
        Err(Error::ReadOnly)
    ));
    assert!(matches!(
        storage.cleanup_record(&fqdn, TOKEN_A).await,
        Err(Error::ReadOnly)
    ));
    assert!(matches!(
        storage.register_account(&account("alice", "example.org", &[])).await,
        Err(Error::ReadOnly)
    ));
    assert!(storage.get_records(&fqdn).await.unwrap_err().is_not_found());
}

#[tokio::test]
async fn read_only_never_mutates_persistent_storage() {
    for kind in ["sqlite", "redb"] {
        let dir = tempfile::tempdir().unwrap();
        let config = storage_config(kind, &dir);
        let fqdn = name("_acme-challenge.example.org");
        let other = name("_acme-challenge.other.example.org");

        let storage = open(&config, false).await.unwrap();
        storage.present_record(&fqdn, TOKEN_A).await.unwrap();
        storage
            .register_account(&account("alice", "example.org", &[]))
            .await
            .unwrap();
        storage.close().await.unwrap();

        let storage = open(&config, true).await.unwrap();
        assert_eq!(storage.get_records(&fqdn).await.unwrap(), vec![TOKEN_A], "{kind}");
        assert_eq!(
            storage
                .get_account("alice", &fqdn)
                .await
                .unwrap()
                .zone
                .to_string(),
            "example.org.",
            "{kind}"
        );
        for result in [
            storage.present_record(&other, TOKEN_B).await,
            storage.present_record(&fqdn, TOKEN_B).await,
            storage.cleanup_record(&fqdn, TOKEN_A).await,
            storage
                .register_account(&account("bob", "example.org", &[]))
                .await,
        ] {
            assert!(matches!(result, Err(Error::ReadOnly)), "{kind}: {result:?}");
        }
        storage.close().await.unwrap();

        let storage = open(&config, false).await.unwrap();
        assert_eq!(storage.get_records(&fqdn).await.unwrap(), vec![TOKEN_A], "{kind}");
        assert!(storage.get_records(&other).await.unwrap_err().is_not_found(), "{kind}");
        assert!(
            storage
                .get_account("bob", &fqdn)
                .await
                .unwrap_err()
                .is_not_found(),
            "{kind}"
        );
        storage.close().await.unwrap();
    }
}

#[tokio::test]
async fn config_accounts_survive_restart() {
    use crate::password::PasswordHasher;
    use std::str::FromStr;

    let config = serde_json::json!({
        "zones": ["example.org"],
        "dns_udp_bind_addr": "127.0.0.1:5353",
        "dns_tcp_bind_addr": "127.0.0.1:5353",
        "password_cost": 1,
        "accounts": [
            {"username": "alice", "password": "secret", "zone": "example.org", "allowfrom": ["10.0.0.0/8"]},
        ],
    });
    let config = Config::from_str(&config.to_string()).unwrap();
    let fqdn = name("_acme-challenge.example.org");

    for kind in ["sqlite", "redb"] {
        let dir = tempfile::tempdir().unwrap();
        let storage_config = storage_config(kind, &dir);

        let storage = open(&storage_config, false).await.unwrap();
        register_config_accounts(&config, &storage).await.unwrap();
        let first = storage.get_account("alice", &fqdn).await.unwrap();
        storage.close().await.unwrap();

        let storage = open(&storage_config, false).await.unwrap();
        register_config_accounts(&config, &storage).await.unwrap();
        let stored = storage.get_account("alice", &fqdn).await.unwrap();
        assert_eq!(stored, first, "{kind}");
        assert!(PasswordHasher::verify(&stored.password_digest, "secret"), "{kind}");
        assert!(!PasswordHasher::verify(&stored.password_digest, "other"), "{kind}");
        assert!(stored.allowed_ips.contains("10.1.2.3".parse().unwrap()), "{kind}");
        storage.close().await.unwrap();
    }
}
