use device_bridge::config::{ConfigError, ConfigLoader, VendorMode};
use std::{
    env, fs,
    path::PathBuf,
    sync::{Mutex, MutexGuard, OnceLock},
    time::Duration,
};
use tempfile::TempDir;

fn env_lock() -> &'static Mutex<()> {
    static LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    LOCK.get_or_init(|| Mutex::new(()))
}

fn env_guard() -> MutexGuard<'static, ()> {
    env_lock()
        .lock()
        .unwrap_or_else(|poison| poison.into_inner())
}

fn clear_env() {
    let keys: Vec<String> = env::vars()
        .map(|(key, _)| key)
        .filter(|key| key.starts_with("BRIDGE_"))
        .collect();
    for key in keys {
        unsafe {
            env::remove_var(key);
        }
    }
}

fn write_env_file(dir: &TempDir, name: &str, contents: &str) {
    let path = dir.path().join(name);
    fs::write(path, contents).unwrap();
}

fn loader_for(dir: &TempDir) -> ConfigLoader {
    ConfigLoader::with_base_dir(PathBuf::from(dir.path()))
}

#[test]
fn loads_defaults_when_no_env_present() {
    let _guard = env_guard();
    clear_env();

    let temp_dir = TempDir::new().unwrap();
    let cfg = loader_for(&temp_dir)
        .load()
        .expect("config loads with defaults");

    assert_eq!(cfg.profile, "local");
    assert_eq!(cfg.api_bind_addr, "0.0.0.0:8080");
    assert_eq!(cfg.log_level, "info");
    assert_eq!(cfg.vendor.mode, VendorMode::Http);
    assert_eq!(cfg.vendor.api_base, "https://dapi.microshare.io");
    assert_eq!(cfg.vendor.page_size, 2000);
    assert_eq!(cfg.cache.topology_ttl_seconds, 3600);
    assert_eq!(cfg.cache.device_ttl_seconds, 300);
    assert_eq!(cfg.retry.max_attempts, 3);
    assert!(cfg.operator_tokens.is_empty());
    assert!(!cfg.erp.is_enabled());
    cfg.bind_addr().expect("default bind addr parses");
    clear_env();
}

#[test]
fn layered_env_files_apply_in_order() {
    let _guard = env_guard();
    clear_env();

    let temp_dir = TempDir::new().unwrap();
    write_env_file(&temp_dir, ".env", "BRIDGE_API_BIND_ADDR=127.0.0.1:3000\n");
    write_env_file(
        &temp_dir,
        ".env.test",
        "BRIDGE_API_BIND_ADDR=192.168.0.10:5000\nBRIDGE_CACHE_DEVICE_TTL_SECONDS=60\n",
    );
    write_env_file(
        &temp_dir,
        ".env.test.local",
        "BRIDGE_API_BIND_ADDR=10.0.0.5:6000\n",
    );

    // Select profile via .env.local before profile-specific files load.
    write_env_file(
        &temp_dir,
        ".env.local",
        "BRIDGE_PROFILE=test\nBRIDGE_API_BIND_ADDR=127.0.0.1:4000\nBRIDGE_OPERATOR_TOKEN=test-token-for-layered-test\n",
    );

    let cfg = loader_for(&temp_dir)
        .load()
        .expect("config loads with layered env files");

    assert_eq!(cfg.profile, "test");
    assert_eq!(cfg.api_bind_addr, "10.0.0.5:6000");
    assert_eq!(cfg.cache.device_ttl(), Duration::from_secs(60));
    assert_eq!(cfg.operator_tokens, vec!["test-token-for-layered-test"]);
    clear_env();
}

#[test]
fn os_environment_has_highest_precedence() {
    let _guard = env_guard();
    clear_env();

    let temp_dir = TempDir::new().unwrap();
    write_env_file(
        &temp_dir,
        ".env",
        "BRIDGE_API_BIND_ADDR=127.0.0.1:3000\nBRIDGE_VENDOR_MODE=http\n",
    );

    unsafe {
        env::set_var("BRIDGE_API_BIND_ADDR", "0.0.0.0:9090");
        env::set_var("BRIDGE_VENDOR_MODE", "in_memory");
    }

    let cfg = loader_for(&temp_dir)
        .load()
        .expect("config loads with env override");
    assert_eq!(cfg.api_bind_addr, "0.0.0.0:9090");
    assert_eq!(cfg.vendor.mode, VendorMode::InMemory);

    clear_env();
}

#[test]
fn operator_tokens_list_takes_priority() {
    let _guard = env_guard();
    clear_env();

    let temp_dir = TempDir::new().unwrap();
    write_env_file(
        &temp_dir,
        ".env",
        "BRIDGE_OPERATOR_TOKEN=single\nBRIDGE_OPERATOR_TOKENS=\"one, two ,,three\"\n",
    );

    let cfg = loader_for(&temp_dir).load().expect("config loads");
    assert_eq!(cfg.operator_tokens, vec!["one", "two", "three"]);

    let json = cfg.redacted_json().unwrap();
    assert!(!json.contains("two"));
    clear_env();
}

#[test]
fn invalid_bind_addr_returns_error() {
    let _guard = env_guard();
    clear_env();

    let temp_dir = TempDir::new().unwrap();
    write_env_file(&temp_dir, ".env", "BRIDGE_API_BIND_ADDR=not-an-addr\n");

    let err = loader_for(&temp_dir).load().unwrap_err();
    assert!(matches!(err, ConfigError::InvalidBindAddr { .. }));
    clear_env();
}

#[test]
fn http_vendor_requires_token_outside_local_profiles() {
    let _guard = env_guard();
    clear_env();

    let temp_dir = TempDir::new().unwrap();
    write_env_file(&temp_dir, ".env", "BRIDGE_PROFILE=production\n");

    let err = loader_for(&temp_dir).load().unwrap_err();
    assert!(matches!(err, ConfigError::MissingVendorToken));

    unsafe {
        env::set_var("BRIDGE_VENDOR_TOKEN", "vendor-token");
    }
    let cfg = loader_for(&temp_dir)
        .load()
        .expect("token satisfies production profile");
    assert_eq!(cfg.vendor.token.as_deref(), Some("vendor-token"));
    clear_env();
}

#[test]
fn out_of_range_values_are_rejected() {
    let _guard = env_guard();
    clear_env();

    let cases = [
        ("BRIDGE_VENDOR_DISCOVERY_TIMEOUT_MS=500", "discovery"),
        ("BRIDGE_VENDOR_CLUSTER_TIMEOUT_MS=30000", "cluster"),
        ("BRIDGE_CACHE_DEVICE_TTL_SECONDS=7200", "ttl"),
        ("BRIDGE_RETRY_MAX_ATTEMPTS=9", "attempts"),
        ("BRIDGE_VENDOR_MODE=grpc", "mode"),
        ("BRIDGE_VENDOR_API_BASE=ftp://vendor.example", "base"),
    ];

    for (line, label) in cases {
        let temp_dir = TempDir::new().unwrap();
        write_env_file(&temp_dir, ".env", &format!("{line}\n"));
        let err = loader_for(&temp_dir).load().unwrap_err();
        let matched = match label {
            "discovery" => matches!(err, ConfigError::InvalidDiscoveryTimeout { .. }),
            "cluster" => matches!(err, ConfigError::InvalidClusterTimeout { .. }),
            "ttl" => matches!(err, ConfigError::InvalidCacheTtl { .. }),
            "attempts" => matches!(err, ConfigError::InvalidRetryAttempts { .. }),
            "mode" => matches!(err, ConfigError::InvalidVendorMode { .. }),
            "base" => matches!(err, ConfigError::InvalidVendorApiBase { .. }),
            _ => false,
        };
        assert!(matched, "{line} produced unexpected error: {err}");
    }
    clear_env();
}

#[test]
fn erp_settings_build_client_config() {
    let _guard = env_guard();
    clear_env();

    let temp_dir = TempDir::new().unwrap();
    write_env_file(
        &temp_dir,
        ".env",
        "BRIDGE_ERP_URL=https://erp.example.com/\nBRIDGE_ERP_DATABASE=bakery\nBRIDGE_ERP_USERNAME=bridge\nBRIDGE_ERP_PASSWORD=secret\nBRIDGE_ERP_CATEGORY_ID=7\n",
    );

    let cfg = loader_for(&temp_dir).load().expect("config loads");
    let odoo = cfg.erp.odoo().unwrap().expect("ERP enabled");
    assert_eq!(odoo.category_id, 7);
    assert_eq!(odoo.database, "bakery");
    assert!(!cfg.redacted_json().unwrap().contains("secret"));
    clear_env();
}
