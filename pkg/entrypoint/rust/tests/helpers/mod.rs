// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

#![allow(dead_code)]

use http_body_util::{BodyExt, Full};
use hyper::body::{Bytes, Incoming};
use hyper::http::request::Parts;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use std::collections::{BTreeMap, HashMap};
use std::convert::Infallible;
use std::io::{BufRead, BufReader};
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Output, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::oneshot;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);
pub const SESSION_TOKEN: &str = "mock-session-token";

pub const INSTANCE_IP: &str = "10.0.0.12";
pub const INSTANCE_ID: &str = "i-0123456789abcdef0";
pub const INSTANCE_HOSTNAME: &str = "ip-10-0-0-12.ec2.internal";
pub const INSTANCE_AZ: &str = "us-east-1a";

// ---------------------------------------------------------------------------
// HTTP test server
// ---------------------------------------------------------------------------

type Handler = dyn Fn(&Parts, Bytes) -> Response<Full<Bytes>> + Send + Sync;

/// hyper http1 server on its own thread and runtime, so both sync and async
/// tests can use it. Request bodies are collected before `handler` runs.
pub struct TestServer {
    url: String,
    shutdown: Option<oneshot::Sender<()>>,
    thread: Option<std::thread::JoinHandle<()>>,
}

impl TestServer {
    pub fn start(
        handler: impl Fn(&Parts, Bytes) -> Response<Full<Bytes>> + Send + Sync + 'static,
    ) -> Self {
        let listener =
            std::net::TcpListener::bind("127.0.0.1:0").expect("failed to bind test listener");
        listener
            .set_nonblocking(true)
            .expect("failed to set listener non-blocking");
        let url = format!("http://{}", listener.local_addr().unwrap());

        let handler: Arc<Handler> = Arc::new(handler);
        let (shutdown, mut shutdown_rx) = oneshot::channel::<()>();

        let thread = std::thread::spawn(move || {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .expect("failed to build test server runtime");
            runtime.block_on(async move {
                let listener = tokio::net::TcpListener::from_std(listener)
                    .expect("failed to register test listener");
                loop {
                    tokio::select! {
                        _ = &mut shutdown_rx => break,
                        accepted = listener.accept() => {
                            let Ok((stream, _)) = accepted else { continue };
                            let handler = Arc::clone(&handler);
                            tokio::spawn(async move {
                                let service = service_fn(move |req: Request<Incoming>| {
                                    let handler = Arc::clone(&handler);
                                    async move {
                                        let (parts, body) = req.into_parts();
                                        let body = body
                                            .collect()
                                            .await
                                            .map(|b| b.to_bytes())
                                            .unwrap_or_default();
                                        Ok::<_, Infallible>(handler(&parts, body))
                                    }
                                });
                                let _ = http1::Builder::new()
                                    .serve_connection(TokioIo::new(stream), service)
                                    .await;
                            });
                        }
                    }
                }
            });
        });

        Self {
            url,
            shutdown: Some(shutdown),
            thread: Some(thread),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

fn respond(status: StatusCode, body: impl Into<Bytes>) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(body.into()));
    *response.status_mut() = status;
    response
}

/// Accepts connections and reads nothing, never answering.
pub struct StalledEndpoint {
    url: String,
    stop: Arc<AtomicBool>,
    thread: Option<std::thread::JoinHandle<()>>,
}

impl StalledEndpoint {
    pub fn start() -> Self {
        let listener =
            std::net::TcpListener::bind("127.0.0.1:0").expect("failed to bind stalled listener");
        listener
            .set_nonblocking(true)
            .expect("failed to set listener non-blocking");
        let url = format!("http://{}", listener.local_addr().unwrap());
        let stop = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&stop);

        let thread = std::thread::spawn(move || {
            let mut held = Vec::new();
            while !flag.load(Ordering::Relaxed) {
                match listener.accept() {
                    Ok((stream, _)) => held.push(stream),
                    Err(_) => std::thread::sleep(Duration::from_millis(10)),
                }
            }
        });

        Self {
            url,
            stop,
            thread: Some(thread),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

impl Drop for StalledEndpoint {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

// ---------------------------------------------------------------------------
// Mock instance metadata service
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetadataMode {
    /// Token requests are refused; fields are served without a token.
    V1Only,
    /// Fields are only served with a valid session token.
    V2Required,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedRequest {
    pub method: String,
    pub path: String,
    pub token: Option<String>,
}

struct MetadataState {
    mode: MetadataMode,
    fields: HashMap<String, String>,
    requests: Mutex<Vec<RecordedRequest>>,
}

impl MetadataState {
    fn handle(&self, req: &Parts) -> Response<Full<Bytes>> {
        let path = req.uri.path().to_string();
        let token = req
            .headers
            .get("x-aws-ec2-metadata-token")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        self.requests.lock().unwrap().push(RecordedRequest {
            method: req.method.to_string(),
            path: path.clone(),
            token: token.clone(),
        });

        if req.method == Method::PUT && path == "/latest/api/token" {
            return match self.mode {
                MetadataMode::V1Only => respond(StatusCode::FORBIDDEN, ""),
                MetadataMode::V2Required => respond(StatusCode::OK, SESSION_TOKEN),
            };
        }

        let Some(field) = path.strip_prefix("/latest/meta-data/") else {
            return respond(StatusCode::NOT_FOUND, "");
        };
        if req.method != Method::GET {
            return respond(StatusCode::METHOD_NOT_ALLOWED, "");
        }
        if self.mode == MetadataMode::V2Required && token.as_deref() != Some(SESSION_TOKEN) {
            return respond(StatusCode::UNAUTHORIZED, "");
        }
        match self.fields.get(field) {
            Some(value) => respond(StatusCode::OK, value.clone()),
            None => respond(StatusCode::NOT_FOUND, ""),
        }
    }
}

/// Default identity served by the mock.
pub fn instance_fields() -> HashMap<String, String> {
    [
        ("local-ipv4", INSTANCE_IP),
        ("instance-id", INSTANCE_ID),
        ("local-hostname", INSTANCE_HOSTNAME),
        ("placement/availability-zone", INSTANCE_AZ),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect()
}

/// EC2-style metadata endpoint.
pub struct MetadataServer {
    state: Arc<MetadataState>,
    server: TestServer,
}

impl MetadataServer {
    pub fn start(mode: MetadataMode) -> Self {
        Self::start_with(mode, instance_fields())
    }

    pub fn start_with(mode: MetadataMode, fields: HashMap<String, String>) -> Self {
        let state = Arc::new(MetadataState {
            mode,
            fields,
            requests: Mutex::new(Vec::new()),
        });
        let server_state = Arc::clone(&state);
        let server = TestServer::start(move |req, _| server_state.handle(req));
        Self { state, server }
    }

    pub fn url(&self) -> &str {
        self.server.url()
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.state.requests.lock().unwrap().clone()
    }
}

// ---------------------------------------------------------------------------
// Mock S3
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct S3Request {
    pub method: String,
    pub path: String,
    pub headers: HashMap<String, String>,
    pub body: Vec<u8>,
}

#[derive(Default)]
struct S3State {
    buckets: Mutex<BTreeMap<String, BTreeMap<String, Vec<u8>>>>,
    lag: Mutex<HashMap<String, u32>>,
    hide_from_head: AtomicBool,
    requests: Mutex<Vec<S3Request>>,
}

impl S3State {
    fn handle(&self, req: &Parts, body: Bytes) -> Response<Full<Bytes>> {
        let path = req.uri.path().to_string();
        let headers: HashMap<String, String> = req
            .headers
            .iter()
            .filter_map(|(k, v)| Some((k.as_str().to_string(), v.to_str().ok()?.to_string())))
            .collect();
        let body = if headers.contains_key("x-amz-decoded-content-length") {
            decode_aws_chunked(&body)
        } else {
            body.to_vec()
        };
        self.requests.lock().unwrap().push(S3Request {
            method: req.method.to_string(),
            path: path.clone(),
            headers,
            body: body.clone(),
        });

        let (bucket, key) = path
            .trim_start_matches('/')
            .split_once('/')
            .map(|(b, k)| (b.to_string(), k.to_string()))
            .unwrap_or_else(|| (path.trim_start_matches('/').to_string(), String::new()));
        let mut buckets = self.buckets.lock().unwrap();

        if key.is_empty() {
            let exists = buckets.contains_key(&bucket);
            return if req.method == Method::HEAD {
                if exists && !self.hide_from_head.load(Ordering::Relaxed) {
                    respond(StatusCode::OK, "")
                } else {
                    respond(StatusCode::NOT_FOUND, "")
                }
            } else if req.method == Method::PUT {
                if exists {
                    s3_error(StatusCode::CONFLICT, "BucketAlreadyOwnedByYou")
                } else {
                    buckets.insert(bucket, BTreeMap::new());
                    respond(StatusCode::OK, "")
                }
            } else {
                respond(StatusCode::METHOD_NOT_ALLOWED, "")
            };
        }

        if req.method == Method::GET
            && let Some(remaining) = self.lag.lock().unwrap().get_mut(&bucket)
            && *remaining > 0
        {
            *remaining -= 1;
            return s3_error(StatusCode::NOT_FOUND, "NoSuchBucket");
        }
        let Some(objects) = buckets.get_mut(&bucket) else {
            return s3_error(StatusCode::NOT_FOUND, "NoSuchBucket");
        };
        if req.method == Method::GET {
            match objects.get(&key) {
                Some(content) => respond(StatusCode::OK, content.clone()),
                None => s3_error(StatusCode::NOT_FOUND, "NoSuchKey"),
            }
        } else if req.method == Method::PUT {
            objects.insert(key, body);
            respond(StatusCode::OK, "")
        } else {
            respond(StatusCode::METHOD_NOT_ALLOWED, "")
        }
    }
}

fn s3_error(status: StatusCode, code: &str) -> Response<Full<Bytes>> {
    let body = format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n\
         <Error><Code>{code}</Code><Message>{code}</Message><RequestId>mock</RequestId></Error>"
    );
    let mut response = respond(status, body);
    response
        .headers_mut()
        .insert("content-type", "application/xml".parse().unwrap());
    response
}

/// Strip `aws-chunked` framing: `<hex size>[;ext]\r\n<data>\r\n` until a zero
/// sized chunk.
fn decode_aws_chunked(mut raw: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    while let Some(eol) = raw.windows(2).position(|w| w == b"\r\n") {
        let header = String::from_utf8_lossy(&raw[..eol]);
        let size_hex = header.split(';').next().unwrap_or_default().trim();
        let Ok(size) = usize::from_str_radix(size_hex, 16) else {
            break;
        };
        if size == 0 {
            break;
        }
        let start = eol + 2;
        out.extend_from_slice(&raw[start..start + size]);
        raw = &raw[(start + size + 2).min(raw.len())..];
    }
    out
}

/// Path-style S3 endpoint keeping buckets in memory. Answers with S3 XML
/// error bodies.
pub struct S3Server {
    state: Arc<S3State>,
    server: TestServer,
}

impl S3Server {
    pub fn start() -> Self {
        let state = Arc::new(S3State::default());
        let server_state = Arc::clone(&state);
        let server = TestServer::start(move |req, body| server_state.handle(req, body));
        Self { state, server }
    }

    pub fn url(&self) -> &str {
        self.server.url()
    }

    pub fn create_bucket(&self, bucket: &str) {
        self.state
            .buckets
            .lock()
            .unwrap()
            .entry(bucket.to_string())
            .or_default();
    }

    pub fn insert(&self, bucket: &str, key: &str, content: impl Into<Vec<u8>>) {
        self.state
            .buckets
            .lock()
            .unwrap()
            .entry(bucket.to_string())
            .or_default()
            .insert(key.to_string(), content.into());
    }

    pub fn object(&self, bucket: &str, key: &str) -> Option<Vec<u8>> {
        self.state.buckets.lock().unwrap().get(bucket)?.get(key).cloned()
    }

    pub fn has_bucket(&self, bucket: &str) -> bool {
        self.state.buckets.lock().unwrap().contains_key(bucket)
    }

    /// Answer `NoSuchBucket` to the next `answers` object reads in `bucket`.
    pub fn lag_bucket(&self, bucket: &str, answers: u32) {
        self.state
            .lag
            .lock()
            .unwrap()
            .insert(bucket.to_string(), answers);
    }

    /// Make HeadBucket report every bucket missing, as if another writer
    /// created it between the check and the create.
    pub fn hide_buckets_from_head(&self) {
        self.state.hide_from_head.store(true, Ordering::Relaxed);
    }

    pub fn requests(&self) -> Vec<S3Request> {
        self.state.requests.lock().unwrap().clone()
    }

    pub fn requests_matching(&self, method: &str, path: &str) -> Vec<S3Request> {
        self.requests()
            .into_iter()
            .filter(|r| r.method == method && r.path == path)
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Fake Prometheus
// ---------------------------------------------------------------------------

/// Shell script standing in for Prometheus. It records its pid, argv and
/// environment, then idles until SIGTERM.
pub struct FakePrometheus {
    pub binary: PathBuf,
    out_dir: PathBuf,
}

impl FakePrometheus {
    pub fn install(dir: &Path) -> Self {
        let out_dir = dir.join("fake-prometheus");
        std::fs::create_dir_all(&out_dir).expect("failed to create fake prometheus output dir");
        let binary = dir.join("bin").join("prometheus");
        std::fs::create_dir_all(binary.parent().unwrap()).unwrap();

        let out = out_dir.display();
        let script = format!(
            r#"#!/bin/sh
out="{out}"
: > "$out/args"
for arg in "$@"; do printf '%s\n' "$arg" >> "$out/args"; done
env > "$out/env"
trap 'echo TERM > "$out/signal"; exit 0' TERM
echo $$ > "$out/pid.tmp"
mv "$out/pid.tmp" "$out/pid"
while :; do sleep 0.1; done
"#
        );
        std::fs::write(&binary, script).expect("failed to write fake prometheus");
        std::fs::set_permissions(&binary, std::fs::Permissions::from_mode(0o755)).unwrap();
        Self { binary, out_dir }
    }

    /// Wait until the script has recorded its invocation.
    pub fn wait_started(&self, timeout: Duration) -> bool {
        wait_for(timeout, || self.out_dir.join("pid").exists())
    }

    pub fn wait_for_signal(&self, timeout: Duration) -> bool {
        wait_for(timeout, || self.out_dir.join("signal").exists())
    }

    pub fn pid(&self) -> u32 {
        self.read("pid").trim().parse().expect("invalid pid file")
    }

    pub fn args(&self) -> Vec<String> {
        self.read("args").lines().map(str::to_string).collect()
    }

    pub fn env(&self) -> HashMap<String, String> {
        self.read("env")
            .lines()
            .filter_map(|l| l.split_once('='))
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn read(&self, name: &str) -> String {
        let path = self.out_dir.join(name);
        std::fs::read_to_string(&path)
            .unwrap_or_else(|e| panic!("failed to read {}: {e}", path.display()))
    }
}

// ---------------------------------------------------------------------------
// Entrypoint process
// ---------------------------------------------------------------------------

fn entrypoint_command(args: &[&str], env: &[(&str, &str)]) -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_prometheus-entrypoint"));
    cmd.args(args)
        .env_clear()
        .env("PATH", std::env::var("PATH").unwrap_or_default())
        .env("ENTRYPOINT_LOG_LEVEL", "debug")
        .envs(env.iter().copied());
    cmd
}

/// Run the entrypoint to completion, for invocations that are expected to
/// exit on their own.
pub fn run_entrypoint(args: &[&str], env: &[(&str, &str)]) -> Output {
    entrypoint_command(args, env)
        .output()
        .expect("failed to run prometheus-entrypoint")
}

/// Handle to an entrypoint that is expected to exec a long running process.
pub struct EntrypointHandle {
    child: Child,
    log_lines: Arc<Mutex<Vec<String>>>,
    _stderr_thread: std::thread::JoinHandle<()>,
}

impl EntrypointHandle {
    pub fn start(args: &[&str], env: &[(&str, &str)]) -> Self {
        let mut child = entrypoint_command(args, env)
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .expect("failed to start prometheus-entrypoint");

        let stderr = child.stderr.take().expect("failed to capture stderr");
        let log_lines = Arc::new(Mutex::new(Vec::<String>::new()));
        let lines = Arc::clone(&log_lines);
        let stderr_thread = std::thread::spawn(move || {
            for line in BufReader::new(stderr).lines() {
                match line {
                    Ok(l) => {
                        eprintln!("[entrypoint] {l}");
                        lines.lock().unwrap().push(l);
                    }
                    Err(_) => break,
                }
            }
        });

        Self {
            child,
            log_lines,
            _stderr_thread: stderr_thread,
        }
    }

    pub fn pid(&self) -> u32 {
        self.child.id()
    }

    pub fn logs(&self) -> Vec<String> {
        self.log_lines.lock().unwrap().clone()
    }

    pub fn send_signal(&self, sig: Signal) {
        signal::kill(Pid::from_raw(self.child.id() as i32), sig)
            .expect("failed to send signal to entrypoint");
    }

    pub fn wait_with_timeout(&mut self, timeout: Duration) -> ExitStatus {
        let deadline = Instant::now() + timeout;
        loop {
            match self.child.try_wait().expect("failed to check entrypoint status") {
                Some(status) => return status,
                None => {
                    if Instant::now() >= deadline {
                        self.child.kill().ok();
                        return self.child.wait().expect("failed to wait on killed entrypoint");
                    }
                    std::thread::sleep(Duration::from_millis(50));
                }
            }
        }
    }
}

impl Drop for EntrypointHandle {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

pub fn wait_for(timeout: Duration, mut ready: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    loop {
        if ready() {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        std::thread::sleep(Duration::from_millis(50));
    }
}
