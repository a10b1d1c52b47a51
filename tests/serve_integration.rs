use std::fs;
use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::path::PathBuf;
use std::process::{Child, Command, Output, Stdio};
use std::thread;
use std::time::{Duration, SystemTime};

use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use tempfile::TempDir;

const STARTUP_TIMEOUT: Duration = Duration::from_secs(10);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);
const MAX_FILE_SIZE: u64 = 16 * 1024 * 1024;

#[derive(Clone, Copy, Default)]
struct FixtureOptions {
    include_large_file: bool,
}

struct Fixture {
    _tmp: TempDir,
    root: PathBuf,
}

impl Fixture {
    fn new(opts: FixtureOptions) -> Self {
        let tmp = tempfile::tempdir().expect("create tempdir");
        let root = tmp.path().to_path_buf();

        let content = root.join("content");
        fs::create_dir_all(&content).expect("create content dir");
        fs::write(
            content.join("intro.md"),
            "---\ntitle: Intro\ntags: [ruby]\nimage: /img/cover.png\nimage_display: none\n---\n\nHello.\n\n```ruby\ndef greet\n  puts \"hi\"\nend\n```\n\n<script>alert(1)</script>\n",
        )
        .expect("write intro");
        fs::write(
            content.join("deep-dive.md"),
            "---\ntitle: Deep Dive\npriority_title: The Deep Dive\ntags: [ruby, erb]\n---\n\n```erb\n<%= @post.title %>\n```\n",
        )
        .expect("write deep dive");
        fs::write(
            content.join("unrelated.md"),
            "---\ntitle: Unrelated\ntags: css\n---\n\n| A | B |\n|---|---|\n| 1 | 2 |\n",
        )
        .expect("write unrelated");

        let img = root.join("static/img");
        fs::create_dir_all(&img).expect("create static dir");
        fs::write(
            img.join("cover.png"),
            [0x89, b'P', b'N', b'G', b'\r', b'\n', 0x1A, b'\n'],
        )
        .expect("write image");

        if opts.include_large_file {
            let public = root.join("public");
            fs::create_dir_all(&public).expect("create output dir");
            let file = fs::File::create(public.join("oversized.html")).expect("create oversized file");
            file.set_len(MAX_FILE_SIZE + 1).expect("set oversized file len");
        }

        Self { _tmp: tmp, root }
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(bin_path());
        cmd.current_dir(&self.root);
        cmd
    }
}

struct ResponseSnapshot {
    status: u16,
    headers: HeaderMap,
    body: Vec<u8>,
}

impl ResponseSnapshot {
    fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    fn header(&self, name: &str) -> Option<String> {
        self.headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.to_owned())
    }

    fn context(&self) -> String {
        let mut hdrs = String::new();
        for (k, v) in &self.headers {
            let value = v.to_str().unwrap_or("<non-utf8>");
            hdrs.push_str(&format!("{}: {}\n", k.as_str(), value));
        }
        format!(
            "status={}\nheaders:\n{}\nbody:\n{}",
            self.status,
            hdrs,
            self.body_text()
        )
    }
}

struct ServerHandle {
    child: Option<Child>,
    base_url: String,
    port: u16,
}

impl ServerHandle {
    fn new(scenario: &str, fixture: &Fixture) -> Self {
        let port = free_port();
        eprintln!("[TEST] scenario={} port={}", scenario, port);

        let mut child = fixture
            .command()
            .arg("serve")
            .arg("--bind")
            .arg("127.0.0.1")
            .arg("--port")
            .arg(port.to_string())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .expect("spawn blogsmith serve");

        let base_url = format!("http://127.0.0.1:{port}");
        wait_for_server_ready(&mut child, &base_url);

        Self {
            child: Some(child),
            base_url,
            port,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn shutdown_with_sigint(mut self) -> Output {
        let mut child = self.child.take().expect("server child exists");
        send_sigint(child.id());
        wait_with_timeout(&mut child, Duration::from_secs(5));
        child.wait_with_output().expect("collect server output")
    }
}

impl Drop for ServerHandle {
    fn drop(&mut self) {
        let Some(child) = self.child.as_mut() else {
            return;
        };
        if child.try_wait().ok().flatten().is_none() {
            let _ = child.kill();
        }
        let _ = child.wait();
    }
}

fn bin_path() -> String {
    std::env::var("CARGO_BIN_EXE_blogsmith").expect("CARGO_BIN_EXE_blogsmith is set by cargo test")
}

fn client() -> Client {
    Client::builder()
        .timeout(REQUEST_TIMEOUT)
        .build()
        .expect("build reqwest client")
}

fn client_no_auto_decode() -> Client {
    Client::builder()
        .timeout(REQUEST_TIMEOUT)
        .no_gzip()
        .no_brotli()
        .build()
        .expect("build reqwest client")
}

fn fetch(client: &Client, url: &str) -> ResponseSnapshot {
    fetch_with_headers(client, url, &[])
}

fn fetch_with_headers(client: &Client, url: &str, headers: &[(&str, &str)]) -> ResponseSnapshot {
    let mut map = HeaderMap::new();
    for (k, v) in headers {
        let name = HeaderName::from_bytes(k.as_bytes()).expect("valid header name");
        let value = HeaderValue::from_str(v).expect("valid header value");
        map.insert(name, value);
    }

    let resp = client
        .get(url)
        .headers(map)
        .send()
        .unwrap_or_else(|e| panic!("GET {} failed: {e}", url));
    let status = resp.status().as_u16();
    let out_headers = resp.headers().clone();
    let body = resp
        .bytes()
        .unwrap_or_else(|e| panic!("read body for {} failed: {e}", url))
        .to_vec();

    ResponseSnapshot {
        status,
        headers: out_headers,
        body,
    }
}

fn free_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind free port");
    listener.local_addr().expect("local addr").port()
}

fn wait_for_server_ready(child: &mut Child, base_url: &str) {
    let ready_client = Client::builder()
        .timeout(Duration::from_millis(300))
        .build()
        .expect("build readiness client");

    let start = std::time::Instant::now();
    loop {
        if let Some(status) = child.try_wait().expect("try_wait server") {
            let mut stdout = String::new();
            let mut stderr = String::new();
            if let Some(mut out) = child.stdout.take() {
                let _ = out.read_to_string(&mut stdout);
            }
            if let Some(mut err) = child.stderr.take() {
                let _ = err.read_to_string(&mut stderr);
            }
            panic!(
                "server exited early status={}\nstdout:\n{}\nstderr:\n{}",
                status, stdout, stderr
            );
        }

        if ready_client.get(format!("{}/", base_url)).send().is_ok() {
            return;
        }

        if start.elapsed() > STARTUP_TIMEOUT {
            panic!("server did not become ready within {:?}", STARTUP_TIMEOUT);
        }

        thread::sleep(Duration::from_millis(50));
    }
}

fn assert_status(resp: &ResponseSnapshot, expected: u16) {
    assert_eq!(
        resp.status,
        expected,
        "unexpected HTTP status\n{}",
        resp.context()
    );
}

fn assert_header_contains(resp: &ResponseSnapshot, name: &str, needle: &str) {
    let value = resp
        .header(name)
        .unwrap_or_else(|| panic!("missing header '{}'\n{}", name, resp.context()));
    assert!(
        value.contains(needle),
        "header '{}' value '{}' does not contain '{}'\n{}",
        name,
        value,
        needle,
        resp.context()
    );
}

fn assert_body_contains(resp: &ResponseSnapshot, needle: &str) {
    assert!(
        resp.body_text().contains(needle),
        "body does not contain '{}'\n{}",
        needle,
        resp.context()
    );
}

fn wait_with_timeout(child: &mut Child, timeout: Duration) {
    let start = std::time::Instant::now();
    loop {
        if child.try_wait().expect("try_wait child").is_some() {
            return;
        }
        if start.elapsed() >= timeout {
            return;
        }
        thread::sleep(Duration::from_millis(25));
    }
}

#[cfg(unix)]
fn send_sigint(pid: u32) {
    let status = Command::new("kill")
        .arg("-INT")
        .arg(pid.to_string())
        .status()
        .expect("send SIGINT");
    assert!(status.success(), "kill -INT failed for pid {pid}");
}

#[cfg(not(unix))]
fn send_sigint(_pid: u32) {
    panic!("SIGINT test is only supported on unix");
}

fn raw_http_status(port: u16, path: &str) -> u16 {
    let mut stream = TcpStream::connect(("127.0.0.1", port)).expect("connect raw http");
    stream
        .set_read_timeout(Some(Duration::from_secs(2)))
        .expect("set read timeout");
    stream
        .set_write_timeout(Some(Duration::from_secs(2)))
        .expect("set write timeout");
    let req = format!(
        "GET {} HTTP/1.1\r\nHost: 127.0.0.1:{}\r\nConnection: close\r\n\r\n",
        path, port
    );
    stream.write_all(req.as_bytes()).expect("write raw request");

    let mut bytes = Vec::new();
    stream.read_to_end(&mut bytes).expect("read raw response");
    let text = String::from_utf8_lossy(&bytes);
    let status_line = text.lines().next().expect("status line present");
    let code = status_line
        .split_whitespace()
        .nth(1)
        .expect("status code present");
    code.parse::<u16>().expect("parse status code")
}

// ---------------------------------------------------------------------------
// build / related
// ---------------------------------------------------------------------------

#[test]
fn test_build_writes_site() {
    let fixture = Fixture::new(FixtureOptions::default());
    let output = fixture.command().arg("build").output().expect("run build");
    assert!(
        output.status.success(),
        "build failed\nstderr:\n{}",
        String::from_utf8_lossy(&output.stderr)
    );
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.starts_with("built 7 pages (3 articles, 3 tags, 2 code blocks)"), "{stdout}");

    let public = fixture.root.join("public");
    for page in ["index.html", "articles/intro.html", "tags/erb.html", "assets/site.css", "img/cover.png"] {
        assert!(public.join(page).is_file(), "missing {page}");
    }
}

#[test]
fn test_build_erb_variant_flag() {
    let fixture = Fixture::new(FixtureOptions::default());
    let output = fixture
        .command()
        .args(["build", "--highlight", "ruby-erb", "--out", "site"])
        .output()
        .expect("run build");
    assert!(output.status.success());
    let page = fs::read_to_string(fixture.root.join("site/articles/deep-dive.html")).expect("read page");
    assert!(page.contains("class=\"highlight language-erb\""), "{page}");
}

#[test]
fn test_build_missing_content_fails() {
    let fixture = Fixture::new(FixtureOptions::default());
    let output = fixture
        .command()
        .args(["build", "--source", "no-such-dir"])
        .output()
        .expect("run build");
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Error: "), "{stderr}");
    assert!(stderr.contains("no-such-dir"), "{stderr}");
}

#[test]
fn test_related_plain_and_json() {
    let fixture = Fixture::new(FixtureOptions::default());

    let output = fixture
        .command()
        .args(["related", "Intro", "--tag", "ruby"])
        .output()
        .expect("run related");
    assert!(output.status.success());
    assert_eq!(
        String::from_utf8_lossy(&output.stdout),
        "The Deep Dive\t/articles/deep-dive.html\n"
    );

    let output = fixture
        .command()
        .args(["related", "Intro", "--tag", "ruby", "--json"])
        .output()
        .expect("run related --json");
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("\"title\":\"The Deep Dive\""), "{stdout}");
    assert!(stdout.contains("\"tags\":[\"erb\",\"ruby\"]"), "{stdout}");

    let output = fixture
        .command()
        .args(["related", "Intro", "--tag", "haskell"])
        .output()
        .expect("run related");
    assert!(output.status.success());
    assert!(output.stdout.is_empty());
}

// ---------------------------------------------------------------------------
// serve
// ---------------------------------------------------------------------------

#[test]
fn test_serve_index_html() {
    let fixture = Fixture::new(FixtureOptions::default());
    let server = ServerHandle::new("test_serve_index_html", &fixture);

    let resp = fetch(&client(), &server.url("/"));
    assert_status(&resp, 200);
    assert_header_contains(&resp, "content-type", "text/html");
    assert_body_contains(&resp, "<a href=\"/articles/deep-dive.html\">The Deep Dive</a>");
}

#[test]
fn test_serve_article_is_highlighted_and_collapsed() {
    let fixture = Fixture::new(FixtureOptions::default());
    let server = ServerHandle::new("test_serve_article_is_highlighted_and_collapsed", &fixture);

    let resp = fetch(&client(), &server.url("/articles/intro.html"));
    assert_status(&resp, 200);
    assert_body_contains(&resp, "class=\"highlight language-ruby\"");
    assert_body_contains(&resp, "style=\"display: none\"");
    assert_body_contains(&resp, "<h2>More on ruby</h2>");
    assert!(!resp.body_text().contains("<script>"), "{}", resp.context());
}

#[test]
fn test_serve_extensionless_resolves() {
    let fixture = Fixture::new(FixtureOptions::default());
    let server = ServerHandle::new("test_serve_extensionless_resolves", &fixture);

    let resp = fetch(&client(), &server.url("/tags/ruby"));
    assert_status(&resp, 200);
    assert_body_contains(&resp, "/articles/intro.html");
}

#[test]
fn test_serve_static_asset_image() {
    let fixture = Fixture::new(FixtureOptions::default());
    let server = ServerHandle::new("test_serve_static_asset_image", &fixture);

    let resp = fetch(&client(), &server.url("/img/cover.png"));
    assert_status(&resp, 200);
    assert_header_contains(&resp, "content-type", "image/png");
}

#[test]
fn test_serve_stylesheet() {
    let fixture = Fixture::new(FixtureOptions::default());
    let server = ServerHandle::new("test_serve_stylesheet", &fixture);

    let resp = fetch(&client(), &server.url("/assets/site.css"));
    assert_status(&resp, 200);
    assert_header_contains(&resp, "content-type", "text/css");
    assert_body_contains(&resp, ".site-header");
}

#[test]
fn test_serve_missing_is_404() {
    let fixture = Fixture::new(FixtureOptions::default());
    let server = ServerHandle::new("test_serve_missing_is_404", &fixture);

    let resp = fetch(&client(), &server.url("/articles/nope.html"));
    assert_status(&resp, 404);
    assert_header_contains(&resp, "x-content-type-options", "nosniff");
}

#[test]
fn test_serve_traversal_denied() {
    let fixture = Fixture::new(FixtureOptions::default());
    let server = ServerHandle::new("test_serve_traversal_denied", &fixture);

    assert_eq!(raw_http_status(server.port, "/../content/intro.md"), 404);
    assert_eq!(raw_http_status(server.port, "/%2e%2e/content/intro.md"), 404);
}

#[test]
fn test_serve_nosniff_header() {
    let fixture = Fixture::new(FixtureOptions::default());
    let server = ServerHandle::new("test_serve_nosniff_header", &fixture);

    let resp = fetch(&client(), &server.url("/articles/intro.html"));
    assert_header_contains(&resp, "x-content-type-options", "nosniff");
    assert!(resp.header("last-modified").is_some(), "{}", resp.context());
}

#[test]
fn test_serve_304_on_modified_since() {
    let fixture = Fixture::new(FixtureOptions::default());
    let server = ServerHandle::new("test_serve_304_on_modified_since", &fixture);

    let future = httpdate::fmt_http_date(SystemTime::now() + Duration::from_secs(24 * 60 * 60));
    let resp = fetch_with_headers(
        &client(),
        &server.url("/articles/intro.html"),
        &[("if-modified-since", &future)],
    );
    assert_status(&resp, 304);
    assert!(resp.body.is_empty(), "304 must have empty body\n{}", resp.context());
}

#[test]
fn test_serve_200_on_modified_since_older() {
    let fixture = Fixture::new(FixtureOptions::default());
    let server = ServerHandle::new("test_serve_200_on_modified_since_older", &fixture);

    let resp = fetch_with_headers(
        &client(),
        &server.url("/articles/intro.html"),
        &[("if-modified-since", "Thu, 01 Jan 1970 00:00:00 GMT")],
    );
    assert_status(&resp, 200);
    assert!(!resp.body.is_empty());
}

#[test]
fn test_serve_compression_gzip() {
    let fixture = Fixture::new(FixtureOptions::default());
    let server = ServerHandle::new("test_serve_compression_gzip", &fixture);

    let resp = fetch_with_headers(
        &client_no_auto_decode(),
        &server.url("/"),
        &[("accept-encoding", "gzip")],
    );
    assert_status(&resp, 200);
    assert_eq!(resp.header("content-encoding").as_deref(), Some("gzip"), "{}", resp.context());
}

#[test]
fn test_serve_file_too_large() {
    let fixture = Fixture::new(FixtureOptions {
        include_large_file: true,
    });
    let server = ServerHandle::new("test_serve_file_too_large", &fixture);

    let resp = fetch(&client(), &server.url("/oversized.html"));
    assert_status(&resp, 413);
}

#[cfg(unix)]
#[test]
fn test_serve_graceful_shutdown() {
    let fixture = Fixture::new(FixtureOptions::default());
    let server = ServerHandle::new("test_serve_graceful_shutdown", &fixture);

    let output = server.shutdown_with_sigint();
    assert!(
        output.status.success(),
        "server should exit cleanly on SIGINT\nstdout:\n{}\nstderr:\n{}",
        String::from_utf8_lossy(&output.stdout),
        String::from_utf8_lossy(&output.stderr)
    );
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("serving "), "{stdout}");
}
