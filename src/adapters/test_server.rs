//! One-shot HTTP/1.1 listener for host adapter tests.
//!
//! Accepts a single connection on `127.0.0.1:<ephemeral>`, records the raw
//! request (headers and body), replies with a canned response, and closes.

use std::io::{Read, Write};
use std::net::{Shutdown, TcpListener};
use std::thread::JoinHandle;

pub(crate) struct OneShot {
    port: u16,
    handle: JoinHandle<String>,
}

impl OneShot {
    pub(crate) fn base_url(&self) -> String {
        format!("http://127.0.0.1:{}", self.port)
    }

    /// Wait for the exchange to finish and return the raw request text.
    pub(crate) fn request(self) -> String {
        self.handle.join().unwrap()
    }
}

pub(crate) fn serve_once(response: Vec<u8>) -> OneShot {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();

    let handle = std::thread::spawn(move || {
        let (mut stream, _) = listener.accept().unwrap();
        let mut raw = Vec::new();
        let mut chunk = [0u8; 512];

        let header_end = loop {
            let n = stream.read(&mut chunk).unwrap();
            if n == 0 {
                break raw.len();
            }
            raw.extend_from_slice(&chunk[..n]);
            if let Some(pos) = find(&raw, b"\r\n\r\n") {
                break pos + 4;
            }
        };

        let head = String::from_utf8_lossy(&raw[..header_end]).to_ascii_lowercase();
        let body_len = head
            .lines()
            .find_map(|l| l.strip_prefix("content-length:"))
            .and_then(|v| v.trim().parse::<usize>().ok())
            .unwrap_or(0);
        while raw.len() < header_end + body_len {
            let n = stream.read(&mut chunk).unwrap();
            if n == 0 {
                break;
            }
            raw.extend_from_slice(&chunk[..n]);
        }

        stream.write_all(&response).unwrap();
        stream.flush().unwrap();
        let _ = stream.shutdown(Shutdown::Both);
        String::from_utf8_lossy(&raw).into_owned()
    });

    OneShot { port, handle }
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}
