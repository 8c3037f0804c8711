use trellis_domain::config::Config;

#[test]
fn default_host_is_localhost() {
    let config = Config::default();
    assert_eq!(config.server.host, "127.0.0.1");
}

#[test]
fn explicit_server_section_parses() {
    let toml_str = r#"
[server]
host = "0.0.0.0"
port = 3210
"#;
    let config: Config = toml::from_str(toml_str).unwrap();
    assert_eq!(config.server.host, "0.0.0.0");
    assert_eq!(config.server.port, 3210);
}

#[test]
fn empty_config_uses_documented_defaults() {
    let config: Config = toml::from_str("").unwrap();
    assert_eq!(config.tools.shell.timeout_secs, 30);
    assert_eq!(config.tools.shell.max_output_bytes, 4096);
    assert_eq!(config.tools.event_field_cap, 2048);
    assert_eq!(config.retrieval.chunk_size, 2000);
    assert_eq!(config.retrieval.chunk_overlap, 200);
    assert_eq!(config.router.precheck_min_confidence, 0.8);
    assert_eq!(config.router.classifier_min_confidence, 0.5);
    assert_eq!(config.heartbeat.ttl_secs, 20);
    assert_eq!(config.heartbeat.interval_secs, 10);
    assert_eq!(config.llm.max_retries, 3);
    assert_eq!(config.llm.retry_backoff_ms, 250);
}

#[test]
fn role_models_fall_back_to_none() {
    let config = Config::default();
    assert!(config.llm.roles.classifier.is_none());
    assert!(config.llm.roles.planner.is_none());
}

#[test]
fn partial_llm_section_keeps_other_defaults() {
    let toml_str = r#"
[llm]
default_model = "gpt-4o-mini"

[llm.roles]
planner = "gpt-4o"
"#;
    let config: Config = toml::from_str(toml_str).unwrap();
    assert_eq!(config.llm.default_model, "gpt-4o-mini");
    assert_eq!(config.llm.roles.planner.as_deref(), Some("gpt-4o"));
    assert!(config.llm.roles.responder.is_none());
    assert_eq!(config.llm.request_timeout_secs, 120);
}

#[test]
fn inadequate_markers_have_defaults() {
    let config = Config::default();
    assert!(!config.router.inadequate_markers.is_empty());
    assert!(config
        .router
        .inadequate_markers
        .iter()
        .all(|m| m.chars().all(|c| !c.is_uppercase())));
}
