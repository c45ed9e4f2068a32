//! Scripted in-process Postgres server for integration tests
//!
//! Speaks enough of the server side of the protocol to exercise startup
//! (trust, clear-text, MD5, SCRAM-SHA-256), simple queries and the extended
//! query flow. Tables live in memory and every column is TEXT.

#![allow(dead_code)]

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use hmac::{Hmac, Mac};
use pgwire_pool::{ClientConfig, Password};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

const TEXT_OID: i32 = 25;
const NAME_OID: i32 = 19;
const SCRAM_SALT: &[u8] = b"mock-server-salt";
const SCRAM_ITERATIONS: u32 = 4096;

/// How the server authenticates clients
#[derive(Debug, Clone)]
pub enum Auth {
    Trust,
    Cleartext(&'static str),
    Md5(&'static str),
    Scram(&'static str),
    /// Runs SCRAM but sends a server signature the client must reject
    ScramForgedSignature(&'static str),
    /// Runs SCRAM but answers the client-final with AuthenticationOk directly
    ScramSkipFinal(&'static str),
    /// Asks for Kerberos V5 (code 2)
    Kerberos,
}

/// Counters the tests assert on
#[derive(Debug, Default)]
pub struct Stats {
    pub connections: AtomicUsize,
    pub parses: AtomicUsize,
    pub binds: AtomicUsize,
    pub simple_queries: AtomicUsize,
    pub terminates: AtomicUsize,
}

impl Stats {
    pub fn get(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }
}

type Table = Vec<Vec<(String, Option<String>)>>;

pub struct MockServer {
    pub port: u16,
    pub stats: Arc<Stats>,
    tables: Arc<Mutex<HashMap<String, Table>>>,
    task: JoinHandle<()>,
}

/// Route client logs to the test output; filter with `RUST_LOG`
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

impl MockServer {
    pub async fn start(auth: Auth) -> Self {
        init_tracing();
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let stats = Arc::new(Stats::default());
        let tables: Arc<Mutex<HashMap<String, Table>>> = Arc::default();
        tables.lock().unwrap().insert("todos".into(), Vec::new());

        let task = {
            let stats = stats.clone();
            let tables = tables.clone();
            tokio::spawn(async move {
                loop {
                    let Ok((socket, _)) = listener.accept().await else {
                        return;
                    };
                    stats.connections.fetch_add(1, Ordering::SeqCst);
                    let session = ServerSession {
                        socket,
                        auth: auth.clone(),
                        stats: stats.clone(),
                        tables: tables.clone(),
                        statements: HashMap::new(),
                        portal: None,
                    };
                    tokio::spawn(async move {
                        let _ = session.run().await;
                    });
                }
            })
        };

        Self {
            port,
            stats,
            tables,
            task,
        }
    }

    /// Client configuration pointing at this server
    pub fn config(&self, password: Password) -> ClientConfig {
        let mut builder = ClientConfig::builder("todo", "alice").tcp("127.0.0.1", self.port);
        builder = match password {
            Password::Literal(p) => builder.password(p),
            Password::Peer => builder.peer(),
            Password::Trust => builder.trust(),
        };
        builder.build().unwrap()
    }

    pub fn rows(&self, table: &str) -> usize {
        self.tables
            .lock()
            .unwrap()
            .get(table)
            .map_or(0, |rows| rows.len())
    }
}

impl Drop for MockServer {
    fn drop(&mut self) {
        self.task.abort();
    }
}

pub fn frame(tag: u8, body: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(body.len() + 5);
    out.push(tag);
    out.extend_from_slice(&((body.len() + 4) as i32).to_be_bytes());
    out.extend_from_slice(body);
    out
}

fn auth_frame(code: i32, extra: &[u8]) -> Vec<u8> {
    let mut body = code.to_be_bytes().to_vec();
    body.extend_from_slice(extra);
    frame(b'R', &body)
}

fn error_frame(severity: &str, code: &str, message: &str) -> Vec<u8> {
    let mut body = Vec::new();
    for (field, value) in [(b'S', severity), (b'V', severity), (b'C', code), (b'M', message)] {
        body.push(field);
        body.extend_from_slice(value.as_bytes());
        body.push(0);
    }
    body.push(0);
    frame(b'E', &body)
}

fn row_description(columns: &[(String, i32)]) -> Vec<u8> {
    let mut body = (columns.len() as i16).to_be_bytes().to_vec();
    for (name, oid) in columns {
        body.extend_from_slice(name.as_bytes());
        body.push(0);
        body.extend_from_slice(&0i32.to_be_bytes());
        body.extend_from_slice(&0i16.to_be_bytes());
        body.extend_from_slice(&oid.to_be_bytes());
        body.extend_from_slice(&(-1i16).to_be_bytes());
        body.extend_from_slice(&(-1i32).to_be_bytes());
        body.extend_from_slice(&0i16.to_be_bytes());
    }
    frame(b'T', &body)
}

fn data_row(values: &[Option<String>]) -> Vec<u8> {
    let mut body = (values.len() as i16).to_be_bytes().to_vec();
    for value in values {
        match value {
            Some(v) => {
                body.extend_from_slice(&(v.len() as i32).to_be_bytes());
                body.extend_from_slice(v.as_bytes());
            }
            None => body.extend_from_slice(&(-1i32).to_be_bytes()),
        }
    }
    frame(b'D', &body)
}

fn command_complete(tag: &str) -> Vec<u8> {
    let mut body = tag.as_bytes().to_vec();
    body.push(0);
    frame(b'C', &body)
}

struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn cstr(&mut self) -> String {
        let end = self.buf[self.pos..]
            .iter()
            .position(|&b| b == 0)
            .map_or(self.buf.len(), |p| self.pos + p);
        let s = String::from_utf8_lossy(&self.buf[self.pos..end]).into_owned();
        self.pos = (end + 1).min(self.buf.len());
        s
    }

    fn i16(&mut self) -> i16 {
        let v = i16::from_be_bytes([self.buf[self.pos], self.buf[self.pos + 1]]);
        self.pos += 2;
        v
    }

    fn i32(&mut self) -> i32 {
        let mut b = [0u8; 4];
        b.copy_from_slice(&self.buf[self.pos..self.pos + 4]);
        self.pos += 4;
        i32::from_be_bytes(b)
    }

    fn bytes(&mut self, n: usize) -> &'a [u8] {
        let out = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        out
    }
}

fn hmac(key: &[u8], data: &[u8]) -> Vec<u8> {
    let mut mac = Hmac::<Sha256>::new_from_slice(key).unwrap();
    mac.update(data);
    mac.finalize().into_bytes().to_vec()
}

fn md5_hex(data: &[u8]) -> String {
    format!("{:x}", md5::compute(data))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScramEnding {
    Verified,
    Forged,
    Skipped,
}

struct Portal {
    sql: String,
}

struct ServerSession {
    socket: TcpStream,
    auth: Auth,
    stats: Arc<Stats>,
    tables: Arc<Mutex<HashMap<String, Table>>>,
    statements: HashMap<String, String>,
    portal: Option<Portal>,
}

impl ServerSession {
    async fn run(mut self) -> io::Result<()> {
        let user = self.read_startup().await?;
        if !self.authenticate(&user).await? {
            return Ok(());
        }

        let mut out = auth_frame(0, &[]);
        out.extend(frame(b'S', b"server_version\x0016.0\x00"));
        out.extend(frame(b'K', &[0, 0, 0, 42, 0, 0, 0, 7]));
        out.extend(frame(b'Z', b"I"));
        self.socket.write_all(&out).await?;

        while let Some((tag, body)) = self.read_frame().await? {
            match tag {
                b'Q' => {
                    self.stats.simple_queries.fetch_add(1, Ordering::SeqCst);
                    let sql = Reader::new(&body).cstr();
                    let mut out = self.execute(&sql, true).await;
                    out.extend(frame(b'Z', b"I"));
                    self.socket.write_all(&out).await?;
                }
                b'P' => {
                    self.stats.parses.fetch_add(1, Ordering::SeqCst);
                    let mut r = Reader::new(&body);
                    let name = r.cstr();
                    let query = r.cstr();
                    self.statements.insert(name, query);
                    self.socket.write_all(&frame(b'1', &[])).await?;
                }
                b'B' => {
                    self.stats.binds.fetch_add(1, Ordering::SeqCst);
                    let out = self.bind(&body);
                    self.socket.write_all(&out).await?;
                }
                b'D' => {}
                b'E' => {
                    let sql = self.portal.take().map(|p| p.sql).unwrap_or_default();
                    let out = self.execute(&sql, false).await;
                    self.socket.write_all(&out).await?;
                }
                b'S' => self.socket.write_all(&frame(b'Z', b"I")).await?,
                b'X' => {
                    self.stats.terminates.fetch_add(1, Ordering::SeqCst);
                    return Ok(());
                }
                _ => {
                    let out = error_frame("FATAL", "08P01", "unexpected message");
                    self.socket.write_all(&out).await?;
                    return Ok(());
                }
            }
        }
        Ok(())
    }

    async fn read_startup(&mut self) -> io::Result<String> {
        let len = self.socket.read_i32().await? as usize;
        let mut body = vec![0u8; len - 4];
        self.socket.read_exact(&mut body).await?;

        let mut r = Reader::new(&body);
        assert_eq!(r.i32(), 196608, "protocol version");
        let mut user = String::new();
        loop {
            let key = r.cstr();
            if key.is_empty() {
                break;
            }
            let value = r.cstr();
            if key == "user" {
                user = value;
            }
        }
        Ok(user)
    }

    async fn read_frame(&mut self) -> io::Result<Option<(u8, Vec<u8>)>> {
        let tag = match self.socket.read_u8().await {
            Ok(tag) => tag,
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
            Err(e) => return Err(e),
        };
        let len = self.socket.read_i32().await? as usize;
        let mut body = vec![0u8; len - 4];
        self.socket.read_exact(&mut body).await?;
        Ok(Some((tag, body)))
    }

    async fn reject(&mut self, message: &str) -> io::Result<bool> {
        let out = error_frame("FATAL", "28P01", message);
        self.socket.write_all(&out).await?;
        Ok(false)
    }

    async fn expect_password(&mut self) -> io::Result<Vec<u8>> {
        match self.read_frame().await? {
            Some((b'p', body)) => Ok(body),
            Some((b'X', _)) => {
                self.stats.terminates.fetch_add(1, Ordering::SeqCst);
                Err(io::Error::new(io::ErrorKind::ConnectionAborted, "client hung up"))
            }
            _ => Err(io::Error::new(io::ErrorKind::InvalidData, "expected password")),
        }
    }

    async fn authenticate(&mut self, user: &str) -> io::Result<bool> {
        match self.auth.clone() {
            Auth::Trust => Ok(true),
            Auth::Kerberos => {
                self.socket.write_all(&auth_frame(2, &[])).await?;
                // The client hangs up
                let _ = self.read_frame().await;
                Ok(false)
            }
            Auth::Cleartext(password) => {
                self.socket.write_all(&auth_frame(3, &[])).await?;
                let body = self.expect_password().await?;
                if Reader::new(&body).cstr() == password {
                    Ok(true)
                } else {
                    self.reject("password authentication failed").await
                }
            }
            Auth::Md5(password) => {
                let salt = [9u8, 8, 7, 6];
                self.socket.write_all(&auth_frame(5, &salt)).await?;
                let body = self.expect_password().await?;

                let inner = md5_hex(format!("{}{}", password, user).as_bytes());
                let mut outer = inner.into_bytes();
                outer.extend_from_slice(&salt);
                let expected = format!("md5{}", md5_hex(&outer));

                if Reader::new(&body).cstr() == expected {
                    Ok(true)
                } else {
                    self.reject("password authentication failed").await
                }
            }
            Auth::Scram(password) => self.scram(password, ScramEnding::Verified).await,
            Auth::ScramForgedSignature(password) => {
                self.scram(password, ScramEnding::Forged).await
            }
            Auth::ScramSkipFinal(password) => self.scram(password, ScramEnding::Skipped).await,
        }
    }

    async fn scram(&mut self, password: &str, ending: ScramEnding) -> io::Result<bool> {
        self.socket
            .write_all(&auth_frame(10, b"SCRAM-SHA-256\0\0"))
            .await?;

        let body = self.expect_password().await?;
        let mut r = Reader::new(&body);
        assert_eq!(r.cstr(), "SCRAM-SHA-256");
        let len = r.i32() as usize;
        let client_first = String::from_utf8(r.bytes(len).to_vec()).unwrap();
        let client_nonce = client_first
            .strip_prefix("n,,n=*,r=")
            .expect("client-first without channel binding")
            .to_string();

        let nonce = format!("{}3rfcNHYJY1ZVvWVs7j", client_nonce);
        let salt = BASE64.encode(SCRAM_SALT);
        let server_first = format!("r={},s={},i={}", nonce, salt, SCRAM_ITERATIONS);
        self.socket
            .write_all(&auth_frame(11, server_first.as_bytes()))
            .await?;

        let body = self.expect_password().await?;
        let client_final = String::from_utf8(body).unwrap();
        let (without_proof, proof) = client_final
            .rsplit_once(",p=")
            .expect("client-final with proof");
        assert_eq!(without_proof, format!("c=biws,r={}", nonce));

        let mut salted = [0u8; 32];
        pbkdf2::pbkdf2_hmac::<Sha256>(
            password.as_bytes(),
            SCRAM_SALT,
            SCRAM_ITERATIONS,
            &mut salted,
        );
        let client_key = hmac(&salted, b"Client Key");
        let stored_key = Sha256::digest(&client_key);
        let auth_message = format!(
            "n=*,r={},{},{}",
            client_nonce, server_first, without_proof
        );
        let signature = hmac(&stored_key, auth_message.as_bytes());
        let proof = BASE64.decode(proof).unwrap_or_default();
        let recovered: Vec<u8> = proof
            .iter()
            .zip(signature.iter())
            .map(|(a, b)| a ^ b)
            .collect();
        if proof.len() != 32 || Sha256::digest(&recovered) != stored_key {
            return self.reject("password authentication failed").await;
        }

        if ending == ScramEnding::Skipped {
            return Ok(true);
        }

        let server_key = hmac(&salted, b"Server Key");
        let mut server_signature = hmac(&server_key, auth_message.as_bytes());
        let forge = ending == ScramEnding::Forged;
        if forge {
            server_signature[0] ^= 0xff;
        }
        let server_final = format!("v={}", BASE64.encode(server_signature));
        self.socket
            .write_all(&auth_frame(12, server_final.as_bytes()))
            .await?;
        if forge {
            // The client must hang up instead of waiting for AuthenticationOk
            let _ = self.read_frame().await;
            return Ok(false);
        }
        Ok(true)
    }

    fn bind(&mut self, body: &[u8]) -> Vec<u8> {
        let mut r = Reader::new(body);
        let _portal = r.cstr();
        let statement = r.cstr();
        let formats: Vec<i16> = (0..r.i16()).map(|_| r.i16()).collect();
        let count = r.i16() as usize;

        let mut values = Vec::with_capacity(count);
        for i in 0..count {
            let len = r.i32();
            if len < 0 {
                values.push("null".to_string());
                continue;
            }
            let raw = r.bytes(len as usize);
            let binary = formats.get(i).or(formats.first()).copied() == Some(1);
            values.push(if binary {
                format!("'\\x{}'", raw.iter().map(|b| format!("{:02x}", b)).collect::<String>())
            } else {
                format!("'{}'", String::from_utf8_lossy(raw).replace('\'', "''"))
            });
        }

        let Some(template) = self.statements.get(&statement) else {
            return error_frame("ERROR", "26000", "prepared statement does not exist");
        };
        let mut sql = template.clone();
        for (i, value) in values.iter().enumerate().rev() {
            sql = sql.replace(&format!("${}", i + 1), value);
        }
        self.portal = Some(Portal { sql });
        frame(b'2', &[])
    }

    async fn execute(&mut self, sql: &str, simple: bool) -> Vec<u8> {
        let sql = sql.trim().trim_end_matches(';').trim();

        if let Some(secs) = sql
            .strip_prefix("SELECT pg_sleep(")
            .and_then(|rest| rest.strip_suffix(')'))
        {
            let secs: f64 = secs.trim_matches('\'').parse().unwrap_or(0.0);
            tokio::time::sleep(Duration::from_secs_f64(secs)).await;
            let mut out = row_description(&[("pg_sleep".into(), TEXT_OID)]);
            out.extend(data_row(&[None]));
            out.extend(command_complete("SELECT 1"));
            return out;
        }

        let result = {
            let mut tables = self.tables.lock().unwrap();
            run_sql(&mut tables, sql)
        };
        match result {
            Ok(Outcome::Rows { columns, rows }) => {
                let mut out = row_description(&columns);
                for row in &rows {
                    out.extend(data_row(row));
                }
                out.extend(command_complete(&format!("SELECT {}", rows.len())));
                out
            }
            Ok(Outcome::Command(tag)) => {
                let mut out = if simple { Vec::new() } else { frame(b'n', &[]) };
                out.extend(command_complete(&tag));
                out
            }
            Err(message) => error_frame("ERROR", "42601", &message),
        }
    }
}

enum Outcome {
    Rows {
        columns: Vec<(String, i32)>,
        rows: Vec<Vec<Option<String>>>,
    },
    Command(String),
}

/// Split on commas outside single quotes
fn split_list(s: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut quoted = false;
    for c in s.chars() {
        match c {
            '\'' => {
                quoted = !quoted;
                current.push(c);
            }
            ',' if !quoted => parts.push(std::mem::take(&mut current).trim().to_string()),
            _ => current.push(c),
        }
    }
    parts.push(current.trim().to_string());
    parts
}

fn literal(s: &str) -> Option<String> {
    let s = s.trim();
    if s.eq_ignore_ascii_case("null") {
        return None;
    }
    match s.strip_prefix('\'').and_then(|v| v.strip_suffix('\'')) {
        Some(inner) => Some(inner.replace("''", "'")),
        None => Some(s.to_string()),
    }
}

fn parse_conditions(clause: Option<&str>) -> Result<Vec<(String, Option<String>)>, String> {
    let Some(clause) = clause else {
        return Ok(Vec::new());
    };
    clause
        .split(" AND ")
        .map(|cond| {
            let (column, value) = cond
                .split_once(" = ")
                .ok_or_else(|| format!("unsupported condition {:?}", cond))?;
            Ok((column.trim().to_string(), literal(value)))
        })
        .collect()
}

fn matches(row: &[(String, Option<String>)], conditions: &[(String, Option<String>)]) -> bool {
    conditions.iter().all(|(column, value)| {
        row.iter()
            .any(|(c, v)| c == column && v.is_some() && v == value)
    })
}

fn run_sql(tables: &mut HashMap<String, Table>, sql: &str) -> Result<Outcome, String> {
    if sql.starts_with("SELECT table_name FROM information_schema.tables") {
        let mut names: Vec<&String> = tables.keys().collect();
        names.sort();
        return Ok(Outcome::Rows {
            columns: vec![("table_name".into(), NAME_OID)],
            rows: names.into_iter().map(|n| vec![Some(n.clone())]).collect(),
        });
    }

    if let Some(rest) = sql.strip_prefix("INSERT INTO ") {
        let (table, rest) = rest
            .split_once(" (")
            .ok_or("syntax error in INSERT")?;
        let (columns, rest) = rest.split_once(") VALUES (").ok_or("syntax error in INSERT")?;
        let values = rest.strip_suffix(')').ok_or("syntax error in INSERT")?;
        let columns = split_list(columns);
        let values = split_list(values);
        if columns.len() != values.len() {
            return Err("INSERT has more expressions than target columns".into());
        }
        let rows = tables
            .get_mut(table)
            .ok_or_else(|| format!("relation \"{}\" does not exist", table))?;
        rows.push(
            columns
                .into_iter()
                .zip(values.iter().map(|v| literal(v)))
                .collect(),
        );
        return Ok(Outcome::Command("INSERT 0 1".into()));
    }

    if let Some(rest) = sql.strip_prefix("DELETE FROM ") {
        let (table, clause) = match rest.split_once(" WHERE ") {
            Some((t, c)) => (t, Some(c)),
            None => (rest, None),
        };
        let conditions = parse_conditions(clause)?;
        let rows = tables
            .get_mut(table)
            .ok_or_else(|| format!("relation \"{}\" does not exist", table))?;
        let before = rows.len();
        rows.retain(|row| !matches(row, &conditions));
        return Ok(Outcome::Command(format!("DELETE {}", before - rows.len())));
    }

    if let Some(rest) = sql.strip_prefix("SELECT ") {
        let (columns, rest) = rest.split_once(" FROM ").ok_or("syntax error in SELECT")?;
        let (table, clause) = match rest.split_once(" WHERE ") {
            Some((t, c)) => (t, Some(c)),
            None => (rest, None),
        };
        let conditions = parse_conditions(clause)?;
        let rows = tables
            .get(table)
            .ok_or_else(|| format!("relation \"{}\" does not exist", table))?;

        let selected: Vec<String> = if columns == "*" {
            rows.first()
                .map(|row| row.iter().map(|(c, _)| c.clone()).collect())
                .unwrap_or_else(|| vec!["id".to_string()])
        } else {
            split_list(columns)
        };

        let out = rows
            .iter()
            .filter(|row| matches(row, &conditions))
            .map(|row| {
                selected
                    .iter()
                    .map(|c| row.iter().find(|(n, _)| n == c).and_then(|(_, v)| v.clone()))
                    .collect()
            })
            .collect();
        return Ok(Outcome::Rows {
            columns: selected.into_iter().map(|c| (c, TEXT_OID)).collect(),
            rows: out,
        });
    }

    Err(format!("syntax error at or near {:?}", sql))
}
