//! Integration tests for imgcache

mod cli_tests {
    use assert_cmd::{cargo::cargo_bin_cmd, Command};
    use predicates::prelude::*;
    use std::io::{Read, Write};
    use std::net::TcpListener;
    use std::path::{Path, PathBuf};
    use tempfile::TempDir;

    fn imgcache() -> Command {
        cargo_bin_cmd!("imgcache")
    }

    /// Config file pointing the cache at `<temp>/cache`
    fn write_config(temp: &TempDir, max_total_mb: u64) -> PathBuf {
        let cache_dir = temp.path().join("cache");
        let config_path = temp.path().join("config.toml");
        std::fs::write(
            &config_path,
            format!(
                "[cache]\ndir = {:?}\nmax_total_mb = {}\nlock_retry_ms = 5\n",
                cache_dir.display().to_string(),
                max_total_mb
            ),
        )
        .unwrap();
        config_path
    }

    fn with_config(config: &Path) -> Command {
        let mut cmd = imgcache();
        cmd.arg("--config").arg(config);
        cmd
    }

    /// Serve one canned 200 response and return an image URL on it
    fn serve_once(body: &'static str) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();

        std::thread::spawn(move || {
            if let Ok((mut stream, _)) = listener.accept() {
                let mut buf = [0u8; 4096];
                let mut request = Vec::new();
                while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                    match stream.read(&mut buf) {
                        Ok(0) | Err(_) => break,
                        Ok(n) => request.extend_from_slice(&buf[..n]),
                    }
                }
                let response = format!(
                    "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    body.len(),
                    body
                );
                let _ = stream.write_all(response.as_bytes());
            }
        });

        format!("http://{addr}/photos/cat.png")
    }

    #[test]
    fn help_displays() {
        imgcache()
            .arg("--help")
            .assert()
            .success()
            .stdout(predicate::str::contains("disk cache for remote images"));
    }

    #[test]
    fn version_displays() {
        imgcache()
            .arg("--version")
            .assert()
            .success()
            .stdout(predicate::str::contains("imgcache"));
    }

    #[test]
    fn config_path_honors_flag() {
        let temp = TempDir::new().unwrap();
        let config = write_config(&temp, 50);

        with_config(&config)
            .args(["config", "path"])
            .assert()
            .success()
            .stdout(predicate::str::contains("config.toml"));
    }

    #[test]
    fn config_show() {
        let temp = TempDir::new().unwrap();
        let config = write_config(&temp, 12);

        with_config(&config)
            .args(["config", "show"])
            .assert()
            .success()
            .stdout(predicate::str::contains("[general]"))
            .stdout(predicate::str::contains("max_total_mb = 12"));
    }

    #[test]
    fn config_init_writes_defaults() {
        let temp = TempDir::new().unwrap();
        let config = temp.path().join("nested").join("config.toml");

        with_config(&config)
            .args(["config", "init"])
            .assert()
            .success()
            .stdout(predicate::str::contains("Configuration initialized"));
        assert!(config.exists());

        with_config(&config)
            .args(["config", "init"])
            .assert()
            .success()
            .stdout(predicate::str::contains("already exists"));
    }

    #[test]
    fn invalid_config_reports_hint() {
        let temp = TempDir::new().unwrap();
        let config = temp.path().join("config.toml");
        std::fs::write(&config, "[cache]\nmax_total_mb = \"lots\"\n").unwrap();

        with_config(&config)
            .arg("stats")
            .assert()
            .failure()
            .stderr(predicate::str::contains("Invalid configuration"))
            .stderr(predicate::str::contains("Hint:"));
    }

    #[test]
    fn stats_on_empty_cache() {
        let temp = TempDir::new().unwrap();
        let config = write_config(&temp, 50);

        with_config(&config)
            .arg("stats")
            .assert()
            .success()
            .stdout(predicate::str::contains("Entries"))
            .stdout(predicate::str::contains("50.0 MB"));
    }

    #[test]
    fn list_empty() {
        let temp = TempDir::new().unwrap();
        let config = write_config(&temp, 50);

        with_config(&config)
            .arg("list")
            .assert()
            .success()
            .stdout(predicate::str::contains("No cached images"));

        with_config(&config)
            .args(["list", "--format", "json"])
            .assert()
            .success()
            .stdout(predicate::str::contains("[]"));
    }

    #[test]
    fn unreachable_url_is_unloaded() {
        let temp = TempDir::new().unwrap();
        let config = write_config(&temp, 50);
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        with_config(&config)
            .args(["fetch", "avatar-1", &format!("http://{addr}/a.png")])
            .assert()
            .success()
            .stdout(predicate::str::contains("[UNLOADED]"));

        with_config(&config)
            .args(["list", "--format", "plain"])
            .assert()
            .success()
            .stdout(predicate::str::is_empty());
    }

    #[test]
    fn fetch_then_list_and_clear() {
        let temp = TempDir::new().unwrap();
        let config = write_config(&temp, 50);
        let url = serve_once("not really a png");

        with_config(&config)
            .args(["fetch", "avatar-1", &url])
            .assert()
            .success()
            .stdout(predicate::str::contains("[LOADED]"))
            .stdout(predicate::str::contains(".png"));

        // Second fetch under another id is a local hit; the server is gone.
        with_config(&config)
            .args(["fetch", "avatar-2", &url])
            .assert()
            .success()
            .stdout(predicate::str::contains("[LOADED]"));

        with_config(&config)
            .args(["list", "--format", "json"])
            .assert()
            .success()
            .stdout(predicate::str::contains("\"refs\": 2"))
            .stdout(predicate::str::contains("avatar-1"))
            .stdout(predicate::str::contains("avatar-2"));

        with_config(&config)
            .args(["clear", "--yes"])
            .assert()
            .success()
            .stdout(predicate::str::contains("cleared 1 image(s)"));

        with_config(&config)
            .arg("list")
            .assert()
            .success()
            .stdout(predicate::str::contains("No cached images"));
    }

    #[test]
    fn reconcile_removes_stray_files() {
        let temp = TempDir::new().unwrap();
        let config = write_config(&temp, 50);
        let cache_dir = temp.path().join("cache");
        std::fs::create_dir_all(&cache_dir).unwrap();
        std::fs::write(cache_dir.join("leftover.jpg"), b"x").unwrap();

        with_config(&config)
            .args(["reconcile", "--dry-run"])
            .assert()
            .success()
            .stdout(predicate::str::contains("Would remove 0 record(s) and 1 file(s)"));
        assert!(cache_dir.join("leftover.jpg").exists());

        with_config(&config)
            .arg("reconcile")
            .assert()
            .success()
            .stdout(predicate::str::contains("Removed 0 record(s) and 1 file(s)"));
        assert!(!cache_dir.join("leftover.jpg").exists());

        with_config(&config)
            .arg("reconcile")
            .assert()
            .success()
            .stdout(predicate::str::contains("records and files agree"));
    }

    #[test]
    fn clear_on_empty_cache() {
        let temp = TempDir::new().unwrap();
        let config = write_config(&temp, 50);

        with_config(&config)
            .args(["clear", "--yes"])
            .assert()
            .success()
            .stdout(predicate::str::contains("already empty"));
    }
}
