//! Integration tests for precache

mod support {
    use assert_cmd::{cargo::cargo_bin_cmd, Command};
    use std::collections::HashMap;
    use std::io::{BufRead, BufReader, Write};
    use std::net::{TcpListener, TcpStream};
    use std::path::{Path, PathBuf};
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::{Arc, Mutex};
    use std::thread;
    use tempfile::TempDir;

    type Routes = HashMap<String, (u16, String)>;

    /// Throwaway HTTP/1.1 origin serving fixed bodies, one response per
    /// connection
    pub struct Origin {
        pub url: String,
        routes: Arc<Mutex<Routes>>,
        hits: Arc<Mutex<HashMap<String, usize>>>,
        offline: Arc<AtomicBool>,
    }

    impl Origin {
        pub fn start() -> Self {
            let listener = TcpListener::bind("127.0.0.1:0").unwrap();
            let url = format!("http://{}", listener.local_addr().unwrap());
            let origin = Self {
                url,
                routes: Arc::default(),
                hits: Arc::default(),
                offline: Arc::default(),
            };

            let routes = origin.routes.clone();
            let hits = origin.hits.clone();
            let offline = origin.offline.clone();
            thread::spawn(move || {
                for stream in listener.incoming().flatten() {
                    if offline.load(Ordering::SeqCst) {
                        drop(stream);
                        continue;
                    }
                    let _ = serve(stream, &routes, &hits);
                }
            });

            origin
        }

        pub fn route(&self, path: &str, status: u16, body: &str) -> &Self {
            self.routes
                .lock()
                .unwrap()
                .insert(path.to_string(), (status, body.to_string()));
            self
        }

        pub fn hits(&self, path: &str) -> usize {
            self.hits.lock().unwrap().get(path).copied().unwrap_or(0)
        }

        pub fn set_offline(&self, offline: bool) {
            self.offline.store(offline, Ordering::SeqCst);
        }
    }

    fn serve(
        stream: TcpStream,
        routes: &Mutex<Routes>,
        hits: &Mutex<HashMap<String, usize>>,
    ) -> std::io::Result<()> {
        let mut reader = BufReader::new(stream.try_clone()?);
        let mut request_line = String::new();
        reader.read_line(&mut request_line)?;
        loop {
            let mut line = String::new();
            if reader.read_line(&mut line)? == 0 || line == "\r\n" {
                break;
            }
        }

        let path = request_line
            .split_whitespace()
            .nth(1)
            .unwrap_or("/")
            .to_string();
        *hits.lock().unwrap().entry(path.clone()).or_default() += 1;

        let (status, body) = routes
            .lock()
            .unwrap()
            .get(&path)
            .cloned()
            .unwrap_or((404, "not found".to_string()));

        let mut stream = stream;
        write!(
            stream,
            "HTTP/1.1 {status} X\r\nContent-Type: text/plain\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
            body.len()
        )?;
        stream.flush()
    }

    /// Config file plus storage root in a temp dir
    pub struct Host {
        pub dir: TempDir,
        pub config: PathBuf,
    }

    impl Host {
        pub fn new(origin: &str, generation: &str, manifest: &[&str]) -> Self {
            let dir = TempDir::new().unwrap();
            let config = dir.path().join("config.toml");
            let host = Self { dir, config };
            host.write_config(origin, generation, manifest);
            host
        }

        pub fn write_config(&self, origin: &str, generation: &str, manifest: &[&str]) {
            let entries: Vec<String> = manifest.iter().map(|e| format!("'{e}'")).collect();
            let content = format!(
                "[controller]\n\
                 generation = '{generation}'\n\
                 origin = '{origin}'\n\
                 manifest = [{}]\n\
                 \n\
                 [network]\n\
                 timeout_secs = 5\n\
                 \n\
                 [storage]\n\
                 root = '{}'\n",
                entries.join(", "),
                self.root().display()
            );
            std::fs::write(&self.config, content).unwrap();
        }

        pub fn root(&self) -> PathBuf {
            self.dir.path().join("store")
        }

        pub fn audit_log(&self) -> String {
            std::fs::read_to_string(self.root().join("audit.log")).unwrap_or_default()
        }

        pub fn cmd(&self) -> Command {
            let mut cmd = cargo_bin_cmd!("precache");
            cmd.env("PRECACHE_CONFIG", &self.config);
            cmd
        }

        pub fn config_path(&self) -> &Path {
            &self.config
        }
    }

    /// Port nothing listens on
    pub fn dead_origin() -> String {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let url = format!("http://{}", listener.local_addr().unwrap());
        drop(listener);
        url
    }
}

mod cli_tests {
    use super::support::{dead_origin, Host};
    use assert_cmd::{cargo::cargo_bin_cmd, Command};
    use predicates::prelude::*;

    fn precache() -> Command {
        cargo_bin_cmd!("precache")
    }

    #[test]
    fn help_displays() {
        precache()
            .arg("--help")
            .assert()
            .success()
            .stdout(predicate::str::contains("cache controller"));
    }

    #[test]
    fn version_displays() {
        precache()
            .arg("--version")
            .assert()
            .success()
            .stdout(predicate::str::contains("precache"));
    }

    #[test]
    fn config_path() {
        let host = Host::new("http://127.0.0.1:9", "v1", &["/"]);
        host.cmd()
            .args(["config", "path"])
            .assert()
            .success()
            .stdout(predicate::str::contains(
                host.config_path().display().to_string(),
            ));
    }

    #[test]
    fn config_show() {
        let host = Host::new("http://127.0.0.1:9", "v1", &["/"]);
        host.cmd()
            .args(["config", "show"])
            .assert()
            .success()
            .stdout(predicate::str::contains("[controller]"))
            .stdout(predicate::str::contains("generation = \"v1\""));
    }

    #[test]
    fn invalid_config_fails() {
        let host = Host::new("http://127.0.0.1:9", "v1", &["/"]);
        std::fs::write(host.config_path(), "[controller\n").unwrap();

        host.cmd()
            .arg("status")
            .assert()
            .failure()
            .stderr(predicate::str::contains("Invalid configuration"));
    }

    #[test]
    fn status_unregistered() {
        let host = Host::new("http://127.0.0.1:9", "v1", &["/"]);
        host.cmd()
            .arg("status")
            .assert()
            .success()
            .stdout(predicate::str::contains("No controller registered"));
    }

    #[test]
    fn list_empty() {
        let host = Host::new("http://127.0.0.1:9", "v1", &["/"]);
        host.cmd()
            .arg("list")
            .assert()
            .success()
            .stdout(predicate::str::contains("No cache generations found"));
    }

    #[test]
    fn activate_without_install() {
        let host = Host::new("http://127.0.0.1:9", "v1", &["/"]);
        host.cmd()
            .arg("activate")
            .assert()
            .failure()
            .stderr(predicate::str::contains("No generation is waiting"))
            .stderr(predicate::str::contains("Hint:"));
    }

    #[test]
    fn install_against_unreachable_origin() {
        let host = Host::new(&dead_origin(), "v1", &["/", "/index.html"]);
        host.cmd()
            .arg("install")
            .assert()
            .failure()
            .stderr(predicate::str::contains("while installing"))
            .stderr(predicate::str::contains("Hint:"));

        host.cmd()
            .arg("status")
            .assert()
            .success()
            .stdout(predicate::str::contains("install-failed"));

        assert!(host.audit_log().contains("install.failed"));
    }

    #[test]
    fn install_rejects_bad_generation_name() {
        let host = Host::new("http://127.0.0.1:9", "v1", &["/"]);
        host.cmd()
            .args(["install", "--generation", "../escape"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Invalid generation name"));
    }
}

/// End-to-end lifecycle runs against a local origin
mod lifecycle_tests {
    use super::support::{Host, Origin};
    use predicates::prelude::*;

    const MANIFEST: &[&str] = &["./", "./index.html", "./app.js"];

    fn app_origin() -> Origin {
        let origin = Origin::start();
        origin
            .route("/", 200, "<html>root v1</html>")
            .route("/index.html", 200, "<html>index v1</html>")
            .route("/app.js", 200, "console.log('v1')")
            .route("/extra.txt", 200, "extra");
        origin
    }

    #[test]
    fn first_visit_then_cached_fetch() {
        let origin = app_origin();
        let host = Host::new(&origin.url, "app-cache-v1", MANIFEST);

        host.cmd()
            .arg("install")
            .assert()
            .success()
            .stdout(predicate::str::contains("Activated app-cache-v1"));

        for path in ["/", "/index.html", "/app.js"] {
            assert_eq!(origin.hits(path), 1, "{path} fetched once at install");
        }

        host.cmd()
            .args(["fetch", "/index.html"])
            .assert()
            .success()
            .stdout("<html>index v1</html>")
            .stderr(predicate::str::contains("200 text/plain from cache"));

        assert_eq!(origin.hits("/index.html"), 1);
        assert!(host.audit_log().contains("generation.activated"));
    }

    #[test]
    fn offline_reload_served_from_cache() {
        let origin = app_origin();
        let host = Host::new(&origin.url, "app-cache-v1", MANIFEST);
        host.cmd().arg("install").assert().success();

        origin.set_offline(true);

        for (path, body) in [("/", "<html>root v1</html>"), ("/app.js", "console.log('v1')")] {
            host.cmd()
                .args(["fetch", path])
                .assert()
                .success()
                .stdout(body)
                .stderr(predicate::str::contains("from cache"));
        }

        host.cmd()
            .args(["fetch", "/extra.txt"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Network error"));
    }

    #[test]
    fn uncached_resources_pass_through_without_write_back() {
        let origin = app_origin();
        let host = Host::new(&origin.url, "app-cache-v1", MANIFEST);
        host.cmd().arg("install").assert().success();

        for _ in 0..2 {
            host.cmd()
                .args(["fetch", "/extra.txt"])
                .assert()
                .success()
                .stdout("extra")
                .stderr(predicate::str::contains("from network"));
        }
        assert_eq!(origin.hits("/extra.txt"), 2);

        host.cmd()
            .args(["fetch", "/missing.png", "-i"])
            .assert()
            .success()
            .stdout(predicate::str::starts_with("HTTP 404"));
    }

    #[test]
    fn failed_install_leaves_nothing_active() {
        let origin = app_origin();
        origin.route("/app.js", 500, "boom");
        let host = Host::new(&origin.url, "app-cache-v1", MANIFEST);

        host.cmd()
            .arg("install")
            .assert()
            .failure()
            .stderr(predicate::str::contains("returned HTTP 500"));

        // Nothing active: requests go straight to the origin
        host.cmd()
            .args(["fetch", "/index.html"])
            .assert()
            .success()
            .stderr(predicate::str::contains("from network"));

        host.cmd()
            .arg("activate")
            .assert()
            .failure()
            .stderr(predicate::str::contains("install-failed -> active"));

        // Retry once the origin recovers
        origin.route("/app.js", 200, "console.log('v1')");
        host.cmd().arg("install").assert().success();
        host.cmd()
            .args(["fetch", "/app.js"])
            .assert()
            .success()
            .stderr(predicate::str::contains("from cache"));
    }

    #[test]
    fn new_generation_supersedes_previous() {
        let origin = app_origin();
        let host = Host::new(&origin.url, "app-cache-v1", MANIFEST);
        host.cmd().arg("install").assert().success();

        origin.route("/index.html", 200, "<html>index v2</html>");
        host.write_config(&origin.url, "app-cache-v2", MANIFEST);

        host.cmd()
            .args(["install", "--no-activate"])
            .assert()
            .success()
            .stdout(predicate::str::contains("waiting"));

        // Still answered by v1 until activation
        host.cmd()
            .args(["fetch", "/index.html"])
            .assert()
            .success()
            .stdout("<html>index v1</html>");

        host.cmd()
            .arg("activate")
            .assert()
            .success()
            .stdout(predicate::str::contains("superseded app-cache-v1"));

        host.cmd()
            .args(["fetch", "/index.html"])
            .assert()
            .success()
            .stdout("<html>index v2</html>")
            .stderr(predicate::str::contains("from cache"));

        host.cmd()
            .args(["list", "--format", "table"])
            .assert()
            .success()
            .stdout(predicate::str::contains("app-cache-v1"))
            .stdout(predicate::str::contains("superseded"));

        host.cmd()
            .args(["prune", "-y"])
            .assert()
            .success()
            .stdout(predicate::str::contains("removed 1 generation(s)"));

        host.cmd()
            .args(["list", "--format", "plain"])
            .assert()
            .success()
            .stdout("app-cache-v2\n");

        let audit = host.audit_log();
        assert!(audit.contains("generation.superseded"));
        assert!(audit.contains("generation.pruned"));
    }

    #[test]
    fn reinstalling_active_generation_rejected() {
        let origin = app_origin();
        let host = Host::new(&origin.url, "app-cache-v1", MANIFEST);
        host.cmd().arg("install").assert().success();

        host.cmd()
            .arg("install")
            .assert()
            .failure()
            .stderr(predicate::str::contains("already active"))
            .stderr(predicate::str::contains("Bump controller.generation"));
    }

    #[test]
    fn status_json_reports_active() {
        let origin = app_origin();
        let host = Host::new(&origin.url, "app-cache-v1", MANIFEST);
        host.cmd().arg("install").assert().success();

        let output = host
            .cmd()
            .args(["status", "--format", "json"])
            .output()
            .unwrap();
        assert!(output.status.success());

        let status: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
        assert_eq!(status["active"]["generation"], "app-cache-v1");
        assert_eq!(status["active"]["state"], "active");
        assert!(status["pending"].is_null());
    }

    #[test]
    fn fetch_writes_output_file() {
        let origin = app_origin();
        let host = Host::new(&origin.url, "app-cache-v1", MANIFEST);
        host.cmd().arg("install").assert().success();

        let out = host.dir.path().join("app.js");
        host.cmd()
            .args(["fetch", "./app.js", "-o"])
            .arg(&out)
            .assert()
            .success()
            .stdout("");

        assert_eq!(std::fs::read_to_string(out).unwrap(), "console.log('v1')");
    }
}
