use reshadeck_daemon_protocol::{Method, Request, Response, PROTOCOL_VERSION};
use serde_json::{json, Value};
use std::fs;
use std::io::{Read, Write};
use std::os::unix::fs::PermissionsExt;
use std::os::unix::net::UnixStream;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::thread::sleep;
use std::time::{Duration, Instant};
use tempfile::TempDir;

struct DaemonGuard {
    child: Child,
}

impl Drop for DaemonGuard {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

/// Temp layout for one daemon: settings, plugin dir with a recording
/// activation script, a fake home and an empty coredump directory.
struct Sandbox {
    root: TempDir,
}

impl Sandbox {
    fn new() -> Self {
        let root = TempDir::new().expect("Failed to create temp dir");
        let sandbox = Sandbox { root };
        fs::create_dir_all(sandbox.settings_dir()).unwrap();
        fs::create_dir_all(sandbox.dumps_dir()).unwrap();
        fs::create_dir_all(sandbox.shader_dest()).unwrap();
        fs::write(sandbox.shader_dest().join("CAS.fx"), "// cas").unwrap();
        fs::write(sandbox.shader_dest().join("Vibrant.fx"), "// vibrant").unwrap();

        let shaders = sandbox.plugin_dir().join("shaders");
        fs::create_dir_all(&shaders).unwrap();
        let script = shaders.join("set_shader.sh");
        fs::write(
            &script,
            format!(
                "#!/bin/sh\necho \"$1\" >> \"{}\"\n",
                sandbox.activation_log().display()
            ),
        )
        .unwrap();
        fs::set_permissions(&script, fs::Permissions::from_mode(0o755)).unwrap();

        fs::write(
            sandbox.settings_dir().join("reshadeck.toml"),
            format!(
                "debounce_secs = 0.2\nmonitor_poll_secs = 0.1\nmonitor_window_secs = 0.5\n\
                 startup_delay_secs = 0.0\ncoredump_dir = \"{}\"\n",
                sandbox.dumps_dir().display()
            ),
        )
        .unwrap();
        sandbox
    }

    fn settings_dir(&self) -> PathBuf {
        self.root.path().join("settings")
    }

    fn plugin_dir(&self) -> PathBuf {
        self.root.path().join("plugin")
    }

    fn home(&self) -> PathBuf {
        self.root.path().join("home")
    }

    fn dumps_dir(&self) -> PathBuf {
        self.root.path().join("dumps")
    }

    fn shader_dest(&self) -> PathBuf {
        self.home()
            .join(".local/share/gamescope/reshade/Shaders")
    }

    fn activation_log(&self) -> PathBuf {
        self.root.path().join("activations.log")
    }

    fn socket(&self) -> PathBuf {
        self.root.path().join("run").join("reshadeck.sock")
    }

    fn spawn(&self) -> DaemonGuard {
        let child = Command::new(env!("CARGO_BIN_EXE_reshadeck-daemon"))
            .env("DECKY_PLUGIN_SETTINGS_DIR", self.settings_dir())
            .env("DECKY_PLUGIN_DIR", self.plugin_dir())
            .env("DECKY_USER_HOME", self.home())
            .env_remove("DECKY_PLUGIN_LOG_DIR")
            .env("RESHADECK_SOCKET", self.socket())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .expect("Failed to spawn reshadeck-daemon");
        wait_for_socket(&self.socket(), Duration::from_secs(5));
        DaemonGuard { child }
    }

    fn activations(&self) -> Vec<String> {
        fs::read_to_string(self.activation_log())
            .unwrap_or_default()
            .lines()
            .map(str::to_string)
            .collect()
    }

    fn config(&self) -> Value {
        let raw = fs::read_to_string(self.settings_dir().join("config.json"))
            .expect("config.json should exist");
        serde_json::from_str(&raw).expect("config.json should be JSON")
    }
}

fn wait_for_socket(path: &Path, timeout: Duration) {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if UnixStream::connect(path).is_ok() {
            return;
        }
        sleep(Duration::from_millis(25));
    }
    panic!("Timed out waiting for daemon socket at {}", path.display());
}

fn send_request(socket: &Path, request: Request) -> Response {
    let mut stream = UnixStream::connect(socket).expect("Failed to connect to daemon socket");
    serde_json::to_writer(&mut stream, &request).expect("Failed to serialize request");
    stream.write_all(b"\n").expect("Failed to write request");
    stream.flush().ok();
    read_response(&mut stream)
}

fn read_response(stream: &mut UnixStream) -> Response {
    let mut buffer = Vec::new();
    let mut chunk = [0u8; 4096];

    loop {
        let n = stream.read(&mut chunk).expect("Failed to read response");
        if n == 0 {
            break;
        }
        buffer.extend_from_slice(&chunk[..n]);
        if buffer.contains(&b'\n') {
            break;
        }
    }

    let end = buffer
        .iter()
        .position(|b| *b == b'\n')
        .unwrap_or(buffer.len());
    serde_json::from_slice(&buffer[..end]).expect("Failed to parse response JSON")
}

fn call(socket: &Path, method: Method, params: Option<Value>) -> Response {
    send_request(socket, Request::new(method, params))
}

#[test]
fn health_reports_protocol_and_defaults() {
    let sandbox = Sandbox::new();
    let _guard = sandbox.spawn();

    let response = call(&sandbox.socket(), Method::GetHealth, None);
    assert!(response.ok, "health failed: {:?}", response.error);
    let data = response.data.expect("health data");
    assert_eq!(data["status"], "ok");
    assert_eq!(data["protocol_version"], PROTOCOL_VERSION);
    assert_eq!(data["master_enabled"], true);
}

#[test]
fn set_shader_activates_and_persists() {
    let sandbox = Sandbox::new();
    let _guard = sandbox.spawn();
    let socket = sandbox.socket();

    let list = call(&socket, Method::GetShaderList, None);
    assert_eq!(list.data.unwrap(), json!(["CAS.fx", "Vibrant.fx"]));

    let response = call(
        &socket,
        Method::SetShader,
        Some(json!({"shader_name": "CAS.fx"})),
    );
    assert!(response.ok, "set_shader failed: {:?}", response.error);

    let current = call(&socket, Method::GetCurrentShader, None);
    assert_eq!(current.data.unwrap(), json!("CAS.fx"));
    assert_eq!(sandbox.activations(), vec!["CAS.fx".to_string()]);
    assert_eq!(sandbox.config()["scopes"]["_global"]["shader"], "CAS.fx");
}

#[test]
fn master_switch_off_clears_effect() {
    let sandbox = Sandbox::new();
    let _guard = sandbox.spawn();
    let socket = sandbox.socket();

    call(
        &socket,
        Method::SetShader,
        Some(json!({"shader_name": "Vibrant.fx"})),
    );
    let response = call(
        &socket,
        Method::SetMasterEnabled,
        Some(json!({"enabled": false})),
    );
    assert_eq!(response.data.unwrap(), json!(false));
    assert_eq!(sandbox.config()["master_enabled"], false);
    assert_eq!(
        sandbox.activations().last().map(String::as_str),
        Some("None")
    );
}

#[test]
fn param_edit_without_shader_is_an_error() {
    let sandbox = Sandbox::new();
    let _guard = sandbox.spawn();

    let response = call(
        &sandbox.socket(),
        Method::SetShaderParam,
        Some(json!({"name": "Sharpness", "value": 0.3})),
    );
    assert!(!response.ok);
    assert_eq!(response.error.unwrap().code, "no_shader_selected");
}

#[test]
fn rejects_protocol_mismatch_and_garbage() {
    let sandbox = Sandbox::new();
    let _guard = sandbox.spawn();
    let socket = sandbox.socket();

    let mut request = Request::new(Method::GetHealth, None);
    request.protocol_version = PROTOCOL_VERSION + 1;
    let response = send_request(&socket, request);
    assert_eq!(response.error.unwrap().code, "protocol_mismatch");

    let mut stream = UnixStream::connect(&socket).unwrap();
    stream.write_all(b"not json\n").unwrap();
    let response = read_response(&mut stream);
    assert_eq!(response.error.unwrap().code, "invalid_json");

    let mut stream = UnixStream::connect(&socket).unwrap();
    stream.write_all(b"\n").unwrap();
    let response = read_response(&mut stream);
    assert_eq!(response.error.unwrap().code, "empty_request");
}

#[test]
fn scope_change_reports_per_game_resolution() {
    let sandbox = Sandbox::new();
    fs::write(
        sandbox.settings_dir().join("config.json"),
        serde_json::to_string(&json!({
            "schema_version": 1,
            "master_enabled": true,
            "scopes": {
                "_global": {"display_name": "Global", "shader": "None"},
                "1091500": {"display_name": "Cyberpunk 2077", "shader": "CAS.fx", "per_game": true}
            }
        }))
        .unwrap(),
    )
    .unwrap();
    let _guard = sandbox.spawn();
    let socket = sandbox.socket();

    let response = call(
        &socket,
        Method::SetCurrentGameInfo,
        Some(json!({"appid": 1091500, "appname": "Cyberpunk 2077"})),
    );
    let data = response.data.unwrap();
    assert_eq!(data["changed"], "switched");
    assert_eq!(data["scope"]["config_key"], "1091500");

    let current = call(&socket, Method::GetCurrentShader, None);
    assert_eq!(current.data.unwrap(), json!("CAS.fx"));
}
