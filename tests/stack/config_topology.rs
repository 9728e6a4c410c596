// ABOUTME: Behavioral tests for loading configuration and selecting connections
// Verifies a realistic config file end to end through AppConfig and Topology

use std::fs;

use tempfile::TempDir;

use replwatch::config::{AppConfig, Filters, LimiterKind};

const CONFIG: &str = r#"
[client]
max_concurrent_calls = 4
limiter = "semaphore"

[[groups]]
name = "Shares"
id = "{6f1b7c4e-2d8a-4c1e-9a3b-0c5d7e9f1a2b}"
folders = ["Public"]

[[groups.members]]
host = "FS01.corp.example"
connections = [{ from = "fs02.corp.example" }, { from = "fs03.corp.example", enabled = false }]

[[groups.members]]
host = "fs02.corp.example"
connections = [{ from = "fs01.corp.example" }]

[[groups]]
name = "Profiles"
id = "0d3c2a1b-5e6f-4a7b-8c9d-0e1f2a3b4c5d"

[[groups.members]]
host = "fs03.corp.example"
connections = [{ from = "fs01.corp.example" }]
"#;

fn load() -> AppConfig {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("config.toml");
    fs::write(&path, CONFIG).unwrap();
    AppConfig::load(&path).unwrap()
}

fn patterns(list: &[&str]) -> Vec<regex::Regex> {
    Filters::compile(&list.iter().map(ToString::to_string).collect::<Vec<_>>()).unwrap()
}

#[test]
fn test_config_file_selects_enabled_connections() {
    let config = load();
    assert_eq!(config.client.max_concurrent_calls, 4);
    assert_eq!(config.client.limiter, LimiterKind::Semaphore);

    let connections = config.topology().connections(&Filters::default());
    let pairs: Vec<(&str, &str)> = connections
        .iter()
        .map(|c| (c.from.as_str(), c.to.as_str()))
        .collect();
    assert_eq!(
        pairs,
        vec![
            ("fs02.corp.example", "fs01.corp.example"),
            ("fs01.corp.example", "fs02.corp.example"),
            ("fs01.corp.example", "fs03.corp.example"),
        ]
    );
}

#[test]
fn test_filters_narrow_the_selection() {
    let config = load();
    let filters = Filters {
        groups: patterns(&["shares"]),
        skip: patterns(&["^fs02"]),
        ..Filters::default()
    };
    assert!(config.topology().connections(&filters).is_empty());

    let filters = Filters {
        member: patterns(&["fs03"]),
        ..Filters::default()
    };
    let connections = config.topology().connections(&filters);
    assert_eq!(connections.len(), 1);
    assert_eq!(connections[0].group, "Profiles");
}

#[test]
fn test_braced_group_id_is_accepted() {
    let config = load();
    let group = config
        .topology()
        .group("6f1b7c4e-2d8a-4c1e-9a3b-0c5d7e9f1a2b")
        .unwrap();
    assert_eq!(group.name, "Shares");
}
