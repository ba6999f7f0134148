use pf::catalog::{extract_ports, Catalog, HealthCheckKind};
use tempfile::TempDir;

fn catalog_in(dir: &TempDir) -> Catalog {
    Catalog::at(dir.path().join("services.json"))
}

#[test]
fn missing_file_reads_as_empty_catalog() {
    let dir = tempfile::tempdir().unwrap();
    let catalog = catalog_in(&dir);

    let data = catalog.load().unwrap();
    assert!(data.services.is_empty());
    assert!(data.groups.is_empty());
    assert!(catalog.all_service_names().unwrap().is_empty());
}

#[test]
fn add_get_delete_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let catalog = catalog_in(&dir);

    catalog
        .add_service("db", "kubectl port-forward svc/postgres 5432:5432")
        .unwrap();
    catalog
        .add_service("redis", "kubectl port-forward svc/redis 6379:6379")
        .unwrap();

    let def = catalog.get_service("db").unwrap();
    assert_eq!(def.command, "kubectl port-forward svc/postgres 5432:5432");
    assert_eq!(def.health_check, HealthCheckKind::Auto);

    let names = catalog.all_service_names().unwrap();
    assert_eq!(names, vec!["db".to_string(), "redis".to_string()]);

    catalog.delete_service("db").unwrap();
    assert!(catalog.get_service("db").is_err());
    assert!(catalog.delete_service("db").is_err());
}

#[test]
fn legacy_flat_format_is_read_and_rewritten_nested() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("services.json");
    std::fs::write(
        &path,
        r#"{ "db": "kubectl port-forward svc/pg 5432:5432", "web": "ssh -L 8080:web:80 box" }"#,
    )
    .unwrap();

    let catalog = Catalog::at(path.clone());
    let data = catalog.load().unwrap();
    assert_eq!(data.services.len(), 2);
    assert_eq!(
        data.services["db"].command,
        "kubectl port-forward svc/pg 5432:5432"
    );

    // Next save migrates to the nested shape, keys preserved
    catalog.save(&data).unwrap();
    let raw: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    assert!(raw.get("services").is_some());
    assert_eq!(
        raw["services"]["db"],
        serde_json::json!("kubectl port-forward svc/pg 5432:5432")
    );
    assert_eq!(raw["services"]["web"], serde_json::json!("ssh -L 8080:web:80 box"));
}

#[test]
fn save_load_round_trip_preserves_contents() {
    let dir = tempfile::tempdir().unwrap();
    let catalog = catalog_in(&dir);

    catalog.add_service("db", "kubectl port-forward svc/pg 5432:5432").unwrap();
    catalog.add_service("api", "ssh -L 3000:api:3000 bastion").unwrap();
    catalog
        .add_group("backend", &["db".to_string(), "api".to_string()])
        .unwrap();

    let first = catalog.load().unwrap();
    catalog.save(&first).unwrap();
    let second = catalog.load().unwrap();

    assert_eq!(first.services, second.services);
    assert_eq!(first.groups, second.groups);
}

#[test]
fn groups_validate_members_and_name_shadowing() {
    let dir = tempfile::tempdir().unwrap();
    let catalog = catalog_in(&dir);

    catalog.add_service("db", "kubectl port-forward svc/pg 5432:5432").unwrap();

    // Unknown member
    assert!(catalog
        .add_group("backend", &["db".to_string(), "ghost".to_string()])
        .is_err());

    // Group shadowing a service name
    assert!(catalog.add_group("db", &["db".to_string()]).is_err());

    catalog.add_group("backend", &["db".to_string()]).unwrap();
    assert_eq!(catalog.get_group("backend").unwrap(), vec!["db".to_string()]);

    catalog.delete_group("backend").unwrap();
    assert!(catalog.get_group("backend").is_err());
    assert!(catalog.delete_group("backend").is_err());
}

#[test]
fn name_conflict_is_only_reported_when_both_exist() {
    let dir = tempfile::tempdir().unwrap();
    let catalog = catalog_in(&dir);

    catalog.add_service("db", "kubectl port-forward svc/pg 5432:5432").unwrap();
    assert!(!catalog.name_conflict("db").unwrap());

    // Only way to get a conflict is a group created before the service
    catalog.add_group("team", &["db".to_string()]).unwrap();
    catalog.add_service("team", "ssh -L 9000:x:90 host").unwrap();
    assert!(catalog.name_conflict("team").unwrap());
}

#[test]
fn validation_rejects_bad_names_and_commands() {
    let dir = tempfile::tempdir().unwrap();
    let catalog = catalog_in(&dir);

    assert!(catalog.add_service("bad/name", "sleep 1 # 1:1").is_err());
    assert!(catalog.add_service("", "sleep 1 # 1:1").is_err());
    assert!(catalog.add_service(&"n".repeat(51), "sleep 1 # 1:1").is_err());
    assert!(catalog.add_service("ok", "").is_err());
    assert!(catalog.add_service("ok", &"c".repeat(1001)).is_err());
    assert!(catalog.add_service("ok", "rm -rf / # 1:1").is_err());

    // Nothing was persisted by the failed attempts
    assert!(catalog.all_service_names().unwrap().is_empty());
}

#[test]
fn port_extraction_law() {
    // Any command containing <a>:<b> yields (a, b)
    for (command, local, remote) in [
        ("kubectl port-forward svc/pg 5432:5432", "5432", "5432"),
        ("ssh -L 8080:internal:80 bastion", "8080", "80"),
        ("something 1:2 other 3:4", "1", "2"),
    ] {
        let (l, r) = extract_ports(command).unwrap();
        assert_eq!((l.as_str(), r.as_str()), (local, remote));
    }

    // Commands without a pair are rejected
    assert!(extract_ports("kubectl get pods").is_none());
    assert!(extract_ports("ssh bastion").is_none());
}

#[test]
fn extended_definitions_survive_the_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let catalog = catalog_in(&dir);

    catalog.add_service("api", "ssh -L 3000:api:3000 box").unwrap();

    let mut data = catalog.load().unwrap();
    let def = data.services.get_mut("api").unwrap();
    def.health_check = HealthCheckKind::Http;
    def.health_path = Some("/healthz".to_string());
    catalog.save(&data).unwrap();

    let reloaded = catalog.get_service("api").unwrap();
    assert_eq!(reloaded.health_check, HealthCheckKind::Http);
    assert_eq!(reloaded.health_path.as_deref(), Some("/healthz"));
}
