use std::ffi::OsString;
use std::fs;
use std::path::PathBuf;
use std::process::{Command, Output};
use std::sync::Arc;

use chrono::{TimeZone, Utc};
use colloquy_core::{AuthFlow, ConversationStore, Database, LocalIdentityProvider};
use tempfile::TempDir;

struct CliTestEnv {
    _temp_dir: TempDir,
    home: PathBuf,
    work: PathBuf,
    xdg_data: PathBuf,
    xdg_config: PathBuf,
    xdg_state: PathBuf,
}

impl CliTestEnv {
    fn new() -> Self {
        let temp_dir = TempDir::new().expect("failed to create temp dir");
        let base = temp_dir.path().to_path_buf();
        let home = base.join("home");
        let work = base.join("work");
        let xdg_data = base.join("xdg-data");
        let xdg_config = base.join("xdg-config");
        let xdg_state = base.join("xdg-state");

        for dir in [&home, &work, &xdg_data, &xdg_config, &xdg_state] {
            fs::create_dir_all(dir).expect("failed to create test directory");
        }

        Self {
            _temp_dir: temp_dir,
            home,
            work,
            xdg_data,
            xdg_config,
            xdg_state,
        }
    }

    fn db_path(&self) -> PathBuf {
        self.xdg_data.join("colloquy/data.db")
    }

    fn write_config(&self, toml: &str) {
        let path = self.xdg_config.join("colloquy/config.toml");
        fs::create_dir_all(path.parent().expect("missing config parent"))
            .expect("failed to create config directory");
        fs::write(path, toml).expect("failed to write config");
    }
}

fn run_ask(env: &CliTestEnv, args: &[&str]) -> Output {
    let bin_path = PathBuf::from(assert_cmd::cargo::cargo_bin!("colloquy-ask"));

    Command::new(bin_path)
        .args(args)
        .current_dir(&env.work)
        .env("HOME", &env.home)
        .env("XDG_DATA_HOME", &env.xdg_data)
        .env("XDG_CONFIG_HOME", &env.xdg_config)
        .env("XDG_STATE_HOME", &env.xdg_state)
        .env_remove("COLLOQUY_API_KEY")
        .output()
        .unwrap_or_else(|e| panic!("failed to execute colloquy-ask: {e}"))
}

fn assert_success(args: &[&str], output: &Output) {
    if output.status.success() {
        return;
    }

    let rendered_args = args
        .iter()
        .map(|arg| OsString::from(arg).to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join(" ");
    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    panic!(
        "colloquy-ask {rendered_args} failed\nstatus: {}\nstdout:\n{}\nstderr:\n{}",
        output.status, stdout, stderr
    );
}

#[test]
fn models_lists_catalog_grouped_by_kind() {
    let env = CliTestEnv::new();

    let output = run_ask(&env, &["models"]);
    assert_success(&["models"], &output);

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Text Models:"), "got:\n{stdout}");
    assert!(stdout.contains("Image Generation:"), "got:\n{stdout}");
    assert!(stdout.contains("Vision Models:"), "got:\n{stdout}");
    assert!(
        stdout.contains("provider-3/qwen-2.5-72b") && stdout.contains("(default)"),
        "expected default model marker, got:\n{stdout}"
    );
    assert!(stdout.contains("upgrade required"), "got:\n{stdout}");

    // Logging goes to the state directory, never to stdout
    assert!(env.xdg_state.join("colloquy").exists());
}

#[test]
fn models_json_marks_default_and_plan() {
    let env = CliTestEnv::new();

    let args = ["models", "--format", "json"];
    let output = run_ask(&env, &args);
    assert_success(&args, &output);

    let models: serde_json::Value =
        serde_json::from_slice(&output.stdout).expect("models output is not JSON");
    let models = models.as_array().expect("expected a JSON array");
    assert_eq!(models.len(), 16);

    let defaults: Vec<_> = models.iter().filter(|m| m["default"] == true).collect();
    assert_eq!(defaults.len(), 1);
    assert_eq!(defaults[0]["id"], "provider-3/qwen-2.5-72b");
    assert_eq!(defaults[0]["kind"], "text");
    assert_eq!(defaults[0]["available"], true);
}

#[test]
fn image_rejects_non_image_file() {
    let env = CliTestEnv::new();
    fs::write(env.work.join("notes.txt"), "just text").expect("failed to write notes");

    let output = run_ask(&env, &["image", "notes.txt"]);

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(
        stderr.contains("Please select an image file"),
        "got stderr:\n{stderr}"
    );
}

#[test]
fn ask_reports_unreachable_endpoint() {
    let env = CliTestEnv::new();
    let port = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("failed to bind");
        listener.local_addr().expect("no local addr").port()
    };
    env.write_config(&format!(
        r#"
[completion]
endpoints = ["http://127.0.0.1:{port}/v1/chat/completions"]
api_key = "test-key"
timeout_secs = 2
probe_on_start = false

[search]
enabled = false
"#
    ));

    let output = run_ask(&env, &["ask", "Hello"]);

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(
        stderr.contains("network connectivity issue"),
        "got stderr:\n{stderr}"
    );
}

#[test]
fn image_exits_nonzero_when_analysis_fails() {
    let env = CliTestEnv::new();
    let port = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("failed to bind");
        listener.local_addr().expect("no local addr").port()
    };
    env.write_config(&format!(
        r#"
[completion]
endpoints = ["http://127.0.0.1:{port}/v1/chat/completions"]
api_key = "test-key"
timeout_secs = 2
probe_on_start = false
"#
    ));
    fs::write(
        env.work.join("pixel.png"),
        [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A],
    )
    .expect("failed to write image");

    let output = run_ask(&env, &["image", "pixel.png"]);

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Uploaded pixel.png"), "got stderr:\n{stderr}");
    assert!(
        stderr.contains("image analysis failed"),
        "got stderr:\n{stderr}"
    );
}

#[test]
fn chats_requires_account() {
    let env = CliTestEnv::new();

    let output = run_ask(&env, &["chats"]);

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("--email"), "got stderr:\n{stderr}");
}

#[test]
fn chats_rejects_unknown_account() {
    let env = CliTestEnv::new();

    let output = run_ask(
        &env,
        &["chats", "--email", "nobody@example.com", "--password", "secret1"],
    );

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Login failed. "), "got stderr:\n{stderr}");
}

#[test]
fn chats_signs_in_and_records_last_login() {
    let env = CliTestEnv::new();
    let long_ago = Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap();

    let uid = {
        let db = Arc::new(Database::open(&env.db_path()).expect("failed to open database"));
        db.migrate().expect("failed to migrate");
        let provider = LocalIdentityProvider::new(Arc::clone(&db));
        let store = ConversationStore::new(db);
        let identity = AuthFlow::new(&provider, &store)
            .sign_up("Ada", "ada@example.com", "secret1")
            .expect("failed to sign up");

        let mut profile = store
            .profile(&identity.uid)
            .expect("failed to read profile")
            .expect("missing profile");
        profile.last_login = long_ago;
        store
            .save_profile(&identity.uid, &profile)
            .expect("failed to save profile");
        identity.uid
    };

    let args = ["chats", "--email", "ada@example.com", "--password", "secret1"];
    let output = run_ask(&env, &args);
    assert_success(&args, &output);
    assert!(String::from_utf8_lossy(&output.stdout).contains("No chats yet"));

    let db = Arc::new(Database::open(&env.db_path()).expect("failed to reopen database"));
    let profile = ConversationStore::new(db)
        .profile(&uid)
        .expect("failed to read profile")
        .expect("missing profile");
    assert!(profile.last_login > long_ago, "{:?}", profile.last_login);
}
