use chat_session_relay::config::{AppConfig, EngineKind, LogFormat, OverlapPolicy};
use serial_test::serial;
use std::env;
use std::io::Write;

const BIN: &str = "chat-session-relay";

// Helper to clear environment variables that might interfere with tests
fn clear_env_vars() {
    unsafe {
        for key in [
            "CHAT_SERVER__PORT",
            "CHAT_SESSION__HISTORY_WINDOW",
            "CHAT_SESSION__SYSTEM_PROMPT",
            "CHAT_ENGINE__PROVIDER",
            "CHAT_ENGINE__BASE_URL",
            "CHAT_ENGINE__MODEL",
            "CHAT_LOG__FORMAT",
            "CONFIG_FILE",
            "PORT",
            "ENGINE_PROVIDER",
            "HISTORY_WINDOW",
            "OVERLAP_POLICY",
        ] {
            env::remove_var(key);
        }
    }
}

fn yaml_file(contents: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::Builder::new()
        .suffix(".yaml")
        .tempfile()
        .expect("Failed to create temp config");
    file.write_all(contents.as_bytes())
        .expect("Failed to write temp config");
    file
}

#[test]
#[serial]
fn test_default_config() {
    clear_env_vars();

    let config = AppConfig::load_from_args([BIN]).expect("defaults should load");
    assert_eq!(config.server.port, 8000);
    assert_eq!(config.server.host, "0.0.0.0");
    assert_eq!(config.session.history_window, 6);
    assert_eq!(config.session.overlap_policy, OverlapPolicy::Preempt);
    assert_eq!(config.generation.max_new_tokens, 500);
    assert!((config.generation.temperature - 0.9).abs() < f32::EPSILON);
    assert_eq!(config.engine.provider, EngineKind::Echo);
    assert_eq!(config.log.format, LogFormat::Compact);
    assert!(!config.session.system_prompt.is_empty());
}

#[test]
#[serial]
fn test_env_override() {
    clear_env_vars();
    unsafe {
        env::set_var("CHAT_SERVER__PORT", "9090");
        env::set_var("CHAT_SESSION__HISTORY_WINDOW", "10");
        env::set_var("CHAT_LOG__FORMAT", "json");
    }

    let config = AppConfig::load_from_args([BIN]).expect("Failed to load config");
    assert_eq!(config.server.port, 9090);
    assert_eq!(config.session.history_window, 10);
    assert_eq!(config.log.format, LogFormat::Json);

    clear_env_vars();
}

#[test]
#[serial]
fn test_file_load() {
    clear_env_vars();

    let file = yaml_file(
        r#"
server:
  port: 7070
session:
  system_prompt: "You only speak in haiku."
  overlap_policy: reject
generation:
  max_new_tokens: 64
"#,
    );
    unsafe {
        env::set_var("CONFIG_FILE", file.path());
    }

    let config = AppConfig::load_from_args([BIN]).expect("Failed to load config from file");
    assert_eq!(config.server.port, 7070);
    assert_eq!(config.session.system_prompt, "You only speak in haiku.");
    assert_eq!(config.session.overlap_policy, OverlapPolicy::Reject);
    assert_eq!(config.generation.max_new_tokens, 64);
    // Untouched keys keep their defaults.
    assert_eq!(config.session.history_window, 6);

    clear_env_vars();
}

#[test]
#[serial]
fn test_env_beats_file() {
    clear_env_vars();

    let file = yaml_file("server:\n  port: 7070\n");
    unsafe {
        env::set_var("CONFIG_FILE", file.path());
        env::set_var("CHAT_SERVER__PORT", "7171");
    }

    let config = AppConfig::load_from_args([BIN]).expect("Failed to load config");
    assert_eq!(config.server.port, 7171);

    clear_env_vars();
}

#[test]
#[serial]
fn test_cli_override() {
    clear_env_vars();
    unsafe {
        env::set_var("CHAT_SERVER__PORT", "9090");
    }

    let config = AppConfig::load_from_args([
        BIN,
        "--port",
        "5050",
        "--history-window",
        "2",
        "--overlap-policy",
        "Reject",
    ])
    .expect("Failed to load config");
    assert_eq!(config.server.port, 5050);
    assert_eq!(config.session.history_window, 2);
    assert_eq!(config.session.overlap_policy, OverlapPolicy::Reject);

    clear_env_vars();
}

#[test]
#[serial]
fn test_system_prompt_file() {
    clear_env_vars();

    let mut prompt = tempfile::NamedTempFile::new().unwrap();
    write!(prompt, "Answer like a pirate.").unwrap();
    let file = yaml_file(&format!(
        "session:\n  system_prompt_file: \"{}\"\n",
        prompt.path().display()
    ));

    let config = AppConfig::load_from_args([BIN, "--config", &file.path().to_string_lossy()])
        .expect("Failed to load config");
    assert_eq!(config.session.system_prompt, "Answer like a pirate.");

    clear_env_vars();
}

#[test]
#[serial]
fn test_zero_history_window_rejected() {
    clear_env_vars();

    let result = AppConfig::load_from_args([BIN, "--history-window", "0"]);
    assert!(result.is_err());
}

#[test]
#[serial]
fn test_openai_engine_requires_base_url() {
    clear_env_vars();
    unsafe {
        env::set_var("CHAT_ENGINE__MODEL", "llama-3.2-3b");
    }

    let err = AppConfig::load_from_args([BIN, "--engine", "openai"])
        .expect_err("openai without base_url must fail");
    assert!(err.to_string().contains("base_url"));

    unsafe {
        env::set_var("CHAT_ENGINE__BASE_URL", "http://localhost:8080");
    }
    let config = AppConfig::load_from_args([BIN, "--engine", "openai"])
        .expect("openai with base_url and model should load");
    assert_eq!(config.engine.provider, EngineKind::OpenAi);
    assert_eq!(config.engine.model.as_deref(), Some("llama-3.2-3b"));

    clear_env_vars();
}

#[test]
#[serial]
fn test_missing_explicit_file_fails() {
    clear_env_vars();

    let result = AppConfig::load_from_args([BIN, "--config", "/nonexistent/relay.yaml"]);
    assert!(result.is_err());
}
