//! Minimal stand-in for the profile API, served on a loopback port.

#![allow(dead_code)]

use std::collections::HashMap;
use std::io::{BufRead, BufReader, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;

/// Route status that accepts the request and never answers.
pub const NO_REPLY: u16 = 0;

/// A running mock registry. Names without a route answer 404.
pub struct MockRegistry {
    pub base: String,
    hits: Arc<AtomicUsize>,
}

impl MockRegistry {
    /// Serve `routes` of `(name, status, body)`.
    pub fn serve(routes: &[(&str, u16, &str)]) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind mock registry");
        let addr = listener.local_addr().expect("mock registry address");
        let routes: Arc<HashMap<String, (u16, String)>> = Arc::new(
            routes
                .iter()
                .map(|(name, status, body)| (name.to_string(), (*status, body.to_string())))
                .collect(),
        );
        let hits = Arc::new(AtomicUsize::new(0));

        let served = Arc::clone(&hits);
        thread::spawn(move || {
            for stream in listener.incoming().flatten() {
                let routes = Arc::clone(&routes);
                let served = Arc::clone(&served);
                thread::spawn(move || {
                    served.fetch_add(1, Ordering::SeqCst);
                    respond(stream, &routes);
                });
            }
        });

        Self {
            base: format!("http://{addr}/users/profiles/minecraft"),
            hits,
        }
    }

    /// Requests received so far.
    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }
}

fn respond(mut stream: TcpStream, routes: &HashMap<String, (u16, String)>) {
    let Ok(read_half) = stream.try_clone() else {
        return;
    };
    let mut reader = BufReader::new(read_half);
    let mut request_line = String::new();
    if reader.read_line(&mut request_line).is_err() {
        return;
    }
    loop {
        let mut header = String::new();
        match reader.read_line(&mut header) {
            Ok(0) => break,
            Ok(_) if header.trim().is_empty() => break,
            Ok(_) => {}
            Err(_) => return,
        }
    }

    let path = request_line.split_whitespace().nth(1).unwrap_or("/");
    let name = path.rsplit('/').next().unwrap_or_default();
    let (status, body) = routes
        .get(name)
        .cloned()
        .unwrap_or((404, String::new()));
    if status == NO_REPLY {
        thread::sleep(Duration::from_secs(5));
        return;
    }
    let reason = match status {
        200 => "OK",
        204 => "No Content",
        404 => "Not Found",
        429 => "Too Many Requests",
        _ => "Internal Server Error",
    };
    let response = format!(
        "HTTP/1.1 {status} {reason}\r\n\
         Content-Type: application/json\r\n\
         Content-Length: {}\r\n\
         Connection: close\r\n\r\n{body}",
        body.len()
    );
    let _ = stream.write_all(response.as_bytes());
    let _ = stream.flush();
}
