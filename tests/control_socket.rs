// SPDX-License-Identifier: GPL-3.0-only
//! Drives the daemon over a real Unix socket with sysfs displays backed by
//! temporary directories

use std::path::{Path, PathBuf};

use backlightd::client;
use backlightd::command::ResponseKind;
use backlightd::config::Config;
use backlightd::daemon::ControlServer;
use tempfile::TempDir;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

struct Daemon {
    socket: PathBuf,
    shutdown: oneshot::Sender<()>,
    task: JoinHandle<anyhow::Result<()>>,
}

impl Daemon {
    async fn start(dir: &Path, config: &str) -> Self {
        let config = Config::parse(config).unwrap();
        let socket = dir.join("backlight");
        let server = ControlServer::start(&config, socket.clone()).await.unwrap();
        let listener = server.bind().unwrap();
        let (shutdown, rx) = oneshot::channel();
        let task = tokio::spawn(server.run(listener, async move {
            let _ = rx.await;
        }));
        Self {
            socket,
            shutdown,
            task,
        }
    }

    async fn request(&self, line: &str) -> (ResponseKind, Vec<String>) {
        let response = client::send(&self.socket, line).await.unwrap();
        let kind = ResponseKind::from_response(&response).unwrap();
        (kind, response.lines().map(str::to_string).collect())
    }

    async fn stop(self) {
        self.shutdown.send(()).unwrap();
        self.task.await.unwrap().unwrap();
        assert!(!self.socket.exists());
    }
}

fn device(dir: &TempDir, name: &str, power: Option<&str>) -> PathBuf {
    let path = dir.path().join(name);
    std::fs::create_dir(&path).unwrap();
    std::fs::write(path.join("brightness"), "0\n").unwrap();
    if let Some(power) = power {
        std::fs::write(path.join("bl_power"), power).unwrap();
    }
    path
}

fn read(path: &Path, file: &str) -> String {
    std::fs::read_to_string(path.join(file))
        .unwrap()
        .trim()
        .to_string()
}

#[tokio::test]
async fn test_level_and_power_requests() {
    let dir = tempfile::tempdir().unwrap();
    let laptop = device(&dir, "laptop", Some("0\n"));
    let desk = device(&dir, "desk", None);
    let config = format!(
        r#"
steps = 9
default_level = 4

[[display]]
name = "laptop"
brightness_control = "sysfs:{laptop}"
onoff_control = "sysfs:{laptop}"
max = 100

[[display]]
name = "desk"
brightness_control = "sysfs:{desk}"
max = 200
"#,
        laptop = laptop.display(),
        desk = desk.display(),
    );
    let daemon = Daemon::start(dir.path(), &config).await;

    // default level applied at startup
    assert_eq!(read(&laptop, "brightness"), "56");
    assert_eq!(read(&desk, "brightness"), "111");

    let (kind, lines) = daemon.request("status").await;
    assert_eq!(kind, ResponseKind::Ok);
    assert_eq!(
        lines,
        [
            "ok",
            "level 4/9",
            "power on",
            "display laptop raw=56 power=on leader",
            "display desk raw=111 power=none",
        ]
    );

    let (kind, lines) = daemon.request("max").await;
    assert_eq!(kind, ResponseKind::Ok);
    assert_eq!(lines[1], "level 0/9");
    assert_eq!(read(&laptop, "brightness"), "100");
    assert_eq!(read(&desk, "brightness"), "200");

    // an unchanged raw value is not written again
    std::fs::write(laptop.join("brightness"), "7").unwrap();
    let (kind, _) = daemon.request("set-level 0").await;
    assert_eq!(kind, ResponseKind::Ok);
    assert_eq!(read(&laptop, "brightness"), "7");

    let (_, lines) = daemon.request("down").await;
    assert_eq!(lines[1], "level 1/9");
    assert_eq!(read(&laptop, "brightness"), "89");
    let (_, lines) = daemon.request("up").await;
    assert_eq!(lines[1], "level 0/9");
    let (_, lines) = daemon.request("inc").await;
    assert_eq!(lines[1], "level 0/9");
    let (_, lines) = daemon.request("min").await;
    assert_eq!(lines[1], "level 9/9");
    assert_eq!(read(&laptop, "brightness"), "0");
    let (_, lines) = daemon.request("default").await;
    assert_eq!(lines[1], "level 4/9");

    let (kind, lines) = daemon.request("off").await;
    assert_eq!(kind, ResponseKind::Ok);
    assert_eq!(lines[2], "power off");
    assert_eq!(read(&laptop, "bl_power"), "4");

    let (kind, lines) = daemon.request("toggle").await;
    assert_eq!(kind, ResponseKind::Ok);
    assert_eq!(lines[2], "power on");
    assert_eq!(read(&laptop, "bl_power"), "0");

    let (kind, lines) = daemon.request("off laptop").await;
    assert_eq!(kind, ResponseKind::Ok);
    assert_eq!(lines[3], "display laptop raw=56 power=off leader");

    let (kind, lines) = daemon.request("on all").await;
    assert_eq!(kind, ResponseKind::Ok);
    assert_eq!(lines[2], "power on");
    assert_eq!(read(&laptop, "bl_power"), "0");

    daemon.stop().await;
}

#[tokio::test]
async fn test_rejected_requests() {
    let dir = tempfile::tempdir().unwrap();
    let laptop = device(&dir, "laptop", Some("0"));
    let desk = device(&dir, "desk", None);
    let config = format!(
        r#"
[[display]]
name = "laptop"
brightness_control = "sysfs:{laptop}"
onoff_control = "sysfs:{laptop}"
max = 100

[[display]]
name = "desk"
brightness_control = "sysfs:{desk}"
gamma = 1
"#,
        laptop = laptop.display(),
        desk = desk.display(),
    );
    let daemon = Daemon::start(dir.path(), &config).await;

    for (request, expected) in [
        ("set-level 10", "error invalid-level: level 10 is outside 0..=9"),
        ("set-level -1", "error invalid-level: level -1 is outside 0..=9"),
        ("on nosuch", "error unknown-display: no display named nosuch"),
        ("off desk", "error no-power-control: desk has no on/off control"),
    ] {
        let (kind, lines) = daemon.request(request).await;
        assert_eq!(kind, ResponseKind::Error, "request {:?}", request);
        assert_eq!(lines, [expected], "request {:?}", request);
    }

    let (kind, lines) = daemon.request("frobnicate").await;
    assert_eq!(kind, ResponseKind::Error);
    assert!(lines[0].starts_with("error invalid-request:"));

    // the rejected requests left the level alone
    let (_, lines) = daemon.request("status").await;
    assert_eq!(lines[1], "level 4/9");

    daemon.stop().await;
}

#[tokio::test]
async fn test_failing_display_gives_partial_response() {
    let dir = tempfile::tempdir().unwrap();
    let laptop = device(&dir, "laptop", None);
    let missing = dir.path().join("missing").join("brightness");
    let config = format!(
        r#"
[[display]]
name = "laptop"
brightness_control = "sysfs:{laptop}"
max = 100

[[display]]
name = "gone"
brightness_control = "sysfs:{missing}"
max = 100
"#,
        laptop = laptop.display(),
        missing = missing.display(),
    );
    let daemon = Daemon::start(dir.path(), &config).await;

    let (kind, lines) = daemon.request("set-level 0").await;
    assert_eq!(kind, ResponseKind::Partial);
    assert_eq!(kind.exit_code(), 1);
    assert!(lines[1].starts_with("failed gone io:"), "{:?}", lines);
    assert!(lines.contains(&"level 0/9".to_string()));
    assert!(lines.contains(&"display gone raw=unknown power=none".to_string()));
    assert_eq!(read(&laptop, "brightness"), "100");

    // power requests need an on/off control somewhere
    let (kind, lines) = daemon.request("toggle").await;
    assert_eq!(kind, ResponseKind::Error);
    assert!(lines[0].starts_with("error no-power-control:"));

    daemon.stop().await;
}

#[tokio::test]
async fn test_stale_socket_is_replaced() {
    let dir = tempfile::tempdir().unwrap();
    let laptop = device(&dir, "laptop", None);
    std::fs::write(dir.path().join("backlight"), "stale").unwrap();
    let config = format!(
        "[[display]]\nname = \"laptop\"\nbrightness_control = \"sysfs:{}\"\nmax = 100\n",
        laptop.display()
    );
    let daemon = Daemon::start(dir.path(), &config).await;
    let (kind, _) = daemon.request("status").await;
    assert_eq!(kind, ResponseKind::Ok);
    daemon.stop().await;
}
