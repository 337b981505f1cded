//! Fakes for the pipeline's collaborators and a one-shot HTTP responder.

use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::io::{self, Read, Write};
use std::net::TcpListener;
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

use crate::db::Database;
use crate::error::{AnnotationError, Result};
use crate::inference::{InferenceGateway, InferenceOperation};
use crate::storage::{ObjectStore, UrlSigner};
use crate::translation::Translator;

/// Answers exactly one HTTP request with a canned response and hands back
/// the raw request text.
pub struct OneShotServer {
    pub url: String,
    handle: JoinHandle<String>,
}

impl OneShotServer {
    pub fn request(self) -> String {
        self.handle.join().unwrap()
    }
}

pub fn serve_once(status: u16, body: &str) -> OneShotServer {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let url = format!("http://{}", listener.local_addr().unwrap());
    let body = body.to_string();

    let handle = thread::spawn(move || {
        let (mut stream, _) = listener.accept().unwrap();
        let request = read_request(&mut stream);
        let response = format!(
            "HTTP/1.1 {} {}\r\nContent-Type: text/plain;charset=UTF-8\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
            status,
            if status < 400 { "OK" } else { "Error" },
            body.len(),
            body
        );
        stream.write_all(response.as_bytes()).unwrap();
        stream.flush().unwrap();
        request
    });

    OneShotServer { url, handle }
}

fn read_request(stream: &mut impl Read) -> String {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    loop {
        let n = stream.read(&mut chunk).unwrap();
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);

        if let Some(end) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            let head = String::from_utf8_lossy(&buf[..end]).to_lowercase();
            let content_length = head
                .lines()
                .find_map(|line| line.strip_prefix("content-length:"))
                .and_then(|v| v.trim().parse::<usize>().ok())
                .unwrap_or(0);
            if buf.len() >= end + 4 + content_length {
                break;
            }
        }
    }
    String::from_utf8_lossy(&buf).into_owned()
}

pub fn memory_db() -> Database {
    let db = Database::open_in_memory().unwrap();
    db.initialize().unwrap();
    db
}

pub fn count_rows(db: &Database, table: &str) -> i64 {
    db.conn
        .query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |row| row.get(0))
        .unwrap()
}

#[derive(Default, Clone)]
pub struct FakeStore {
    pub keys: Arc<Mutex<Vec<String>>>,
    pub fail: bool,
}

impl ObjectStore for FakeStore {
    fn put(&self, key: &str, _bytes: &[u8]) -> io::Result<()> {
        if self.fail {
            return Err(io::Error::new(io::ErrorKind::PermissionDenied, "bucket is read-only"));
        }
        self.keys.lock().unwrap().push(key.to_string());
        Ok(())
    }
}

#[derive(Default)]
pub struct FakeSigner {
    pub fail_keys_with_prefix: Option<String>,
}

impl UrlSigner for FakeSigner {
    fn sign(&self, key: &str, expires_at: DateTime<Utc>) -> io::Result<String> {
        if let Some(prefix) = &self.fail_keys_with_prefix {
            if key.starts_with(prefix.as_str()) {
                return Err(io::Error::new(io::ErrorKind::Other, "signing service unavailable"));
            }
        }
        Ok(format!("https://signed.test/{}?exp={}", key, expires_at.timestamp()))
    }
}

/// Canned inference results; records the URLs it was called with.
#[derive(Clone)]
pub struct FakeInference {
    pub caption: std::result::Result<String, String>,
    pub categories: std::result::Result<Vec<String>, String>,
    pub calls: Arc<Mutex<Vec<(InferenceOperation, String)>>>,
}

impl FakeInference {
    pub fn new(caption: &str, categories: &[&str]) -> Self {
        Self {
            caption: Ok(caption.to_string()),
            categories: Ok(categories.iter().map(|s| s.to_string()).collect()),
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

impl InferenceGateway for FakeInference {
    fn request_caption(&self, signed_url: &str) -> Result<String> {
        let operation = InferenceOperation::Captioning;
        self.calls.lock().unwrap().push((operation, signed_url.to_string()));
        self.caption
            .clone()
            .map_err(|reason| AnnotationError::Inference { operation, reason })
    }

    fn request_categories(&self, signed_url: &str) -> Result<Vec<String>> {
        let operation = InferenceOperation::Classification;
        self.calls.lock().unwrap().push((operation, signed_url.to_string()));
        self.categories
            .clone()
            .map_err(|reason| AnnotationError::Inference { operation, reason })
    }
}

/// Dictionary translator; words in `failing` raise an error, unknown words pass through.
#[derive(Default, Clone)]
pub struct FakeTranslator {
    pub dictionary: HashMap<String, String>,
    pub failing: HashSet<String>,
    pub calls: Arc<Mutex<Vec<String>>>,
}

impl FakeTranslator {
    pub fn with(pairs: &[(&str, &str)]) -> Self {
        Self {
            dictionary: pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            ..Self::default()
        }
    }

    pub fn failing_on(mut self, text: &str) -> Self {
        self.failing.insert(text.to_string());
        self
    }
}

impl Translator for FakeTranslator {
    fn translate(&self, text: &str) -> anyhow::Result<String> {
        self.calls.lock().unwrap().push(text.to_string());
        if self.failing.contains(text) {
            anyhow::bail!("quota exceeded");
        }
        Ok(self
            .dictionary
            .get(text)
            .cloned()
            .unwrap_or_else(|| text.to_string()))
    }

    fn provider_name(&self) -> &'static str {
        "fake"
    }
}
