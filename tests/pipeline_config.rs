use std::sync::Mutex;

use tempfile::NamedTempFile;

use emberwatch::config::PipelineConfig;

static ENV_LOCK: Mutex<()> = Mutex::new(());

fn clear_env() {
    for key in [
        "EMBERWATCH_CONFIG",
        "EMBERWATCH_SOURCE_URL",
        "EMBERWATCH_CAPTURE_INTERVAL_SECS",
        "EMBERWATCH_CONTROL_ADDR",
        "EMBERWATCH_BROKER_ADDR",
        "EMBERWATCH_BROKER_USERNAME",
        "EMBERWATCH_BROKER_PASSWORD",
        "EMBERWATCH_TOPIC_PREFIX",
        "EMBERWATCH_STORE_PATH",
        "EMBERWATCH_MODEL",
        "EMBERWATCH_MODEL_INPUT_SIZE",
        "EMBERWATCH_CHAT_ID",
        "EMBERWATCH_BOT_TOKEN",
        "EMBERWATCH_TELEGRAM_API_BASE",
        "EMBERWATCH_MAX_DELIVERY_ATTEMPTS",
    ] {
        std::env::remove_var(key);
    }
}

#[test]
fn defaults_apply_without_file_or_env() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let cfg = PipelineConfig::load(None).expect("load config");

    assert_eq!(cfg.source_url, "stub://scene");
    assert_eq!(cfg.capture_interval_secs, 5);
    assert_eq!(cfg.control_addr, "127.0.0.1:7870");
    assert_eq!(cfg.broker_addr, "127.0.0.1:1883");
    assert_eq!(cfg.topic_prefix, "emberwatch");
    assert_eq!(cfg.store_path, "emberwatch.db");
    assert_eq!(cfg.model, "fixed:0.0");
    assert_eq!(cfg.max_delivery_attempts, 10);
    assert!(cfg.chat_id.is_empty());
    assert!(cfg.bot_token.is_empty());

    clear_env();
}

#[test]
fn loads_config_from_file_and_env_overrides() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let mut file = NamedTempFile::new().expect("temp config");
    let json = r#"{
        "source": { "url": "http://camera-7/snapshot.jpg" },
        "capture": { "interval_secs": 12, "control_addr": "127.0.0.1:7999" },
        "broker": {
            "addr": "mqtt://broker.plant:1883",
            "username": "pipeline",
            "topic_prefix": "plant7"
        },
        "store": { "path": "plant7.db" },
        "inference": { "model": "fire.onnx", "input_size": 224 },
        "telegram": {
            "chat_id": "-100200300",
            "bot_token": "123:abc",
            "max_delivery_attempts": 4
        }
    }"#;
    std::io::Write::write_all(&mut file, json.as_bytes()).expect("write config");

    std::env::set_var("EMBERWATCH_CONFIG", file.path());
    std::env::set_var("EMBERWATCH_CAPTURE_INTERVAL_SECS", "3");
    std::env::set_var("EMBERWATCH_BOT_TOKEN", "456:def");

    let cfg = PipelineConfig::load(None).expect("load config");

    assert_eq!(cfg.source_url, "http://camera-7/snapshot.jpg");
    assert_eq!(cfg.capture_interval_secs, 3);
    assert_eq!(cfg.control_addr, "127.0.0.1:7999");
    assert_eq!(cfg.broker_addr, "mqtt://broker.plant:1883");
    assert_eq!(cfg.broker_username.as_deref(), Some("pipeline"));
    assert_eq!(cfg.topic_prefix, "plant7");
    assert_eq!(cfg.store_path, "plant7.db");
    assert_eq!(cfg.model, "fire.onnx");
    assert_eq!(cfg.model_input_size, 224);
    assert_eq!(cfg.chat_id, "-100200300");
    assert_eq!(cfg.bot_token, "456:def");
    assert_eq!(cfg.max_delivery_attempts, 4);

    clear_env();
}

#[test]
fn explicit_path_wins_over_env_path() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let mut env_file = NamedTempFile::new().expect("temp config");
    std::io::Write::write_all(
        &mut env_file,
        br#"{ "broker": { "topic_prefix": "from_env_file" } }"#,
    )
    .expect("write config");
    let mut flag_file = NamedTempFile::new().expect("temp config");
    std::io::Write::write_all(
        &mut flag_file,
        br#"{ "broker": { "topic_prefix": "from_flag_file" } }"#,
    )
    .expect("write config");

    std::env::set_var("EMBERWATCH_CONFIG", env_file.path());
    let cfg = PipelineConfig::load(Some(flag_file.path())).expect("load config");
    assert_eq!(cfg.topic_prefix, "from_flag_file");

    clear_env();
}

#[test]
fn zero_interval_is_rejected_from_any_layer() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let mut file = NamedTempFile::new().expect("temp config");
    std::io::Write::write_all(&mut file, br#"{ "capture": { "interval_secs": 0 } }"#)
        .expect("write config");
    std::env::set_var("EMBERWATCH_CONFIG", file.path());
    assert!(PipelineConfig::load(None).is_err());

    clear_env();
    std::env::set_var("EMBERWATCH_CAPTURE_INTERVAL_SECS", "0");
    assert!(PipelineConfig::load(None).is_err());

    clear_env();
}

#[test]
fn wildcard_topic_prefix_is_rejected() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    std::env::set_var("EMBERWATCH_TOPIC_PREFIX", "plant/#");
    assert!(PipelineConfig::load(None).is_err());

    clear_env();
}

#[test]
fn unparseable_numeric_env_is_an_error() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    std::env::set_var("EMBERWATCH_MAX_DELIVERY_ATTEMPTS", "many");
    assert!(PipelineConfig::load(None).is_err());

    clear_env();
}

#[test]
fn missing_config_file_is_an_error() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    std::env::set_var("EMBERWATCH_CONFIG", "/nonexistent/emberwatch.json");
    assert!(PipelineConfig::load(None).is_err());

    clear_env();
}
