//! Brute-force reachability guessing.
//!
//! Tries a TCP connect to every `prefix.domain:port` combination of the
//! common mail host names and ports. A completed connect is closed right away
//! and recorded as `host:port`; nothing is spoken on the connection.

use std::sync::Arc;
use std::time::Duration;

use futures::stream::{FuturesUnordered, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{Mutex, Semaphore};

/// Host name prefixes and ports probed per protocol family.
pub const GUESS_MATRIX: [(&str, [&str; 5], [u16; 2]); 3] = [
    ("SMTP", ["smtp.", "smtps.", "mail.", "submission.", "mx."], [465, 587]),
    ("IMAP", ["imap.", "imap4.", "imaps.", "mail.", "mx."], [143, 993]),
    ("POP", ["pop.", "pop3.", "pop3s.", "mail.", "mx."], [110, 995]),
];

/// Probes the guess matrix for one domain.
#[derive(Debug, Clone)]
pub struct GuessResolver {
    timeout: Duration,
    max_concurrency: usize,
}

/// Every `(host, port)` pair of the guess matrix for `domain`.
pub fn guess_targets(domain: &str) -> Vec<(String, u16)> {
    GUESS_MATRIX
        .iter()
        .flat_map(|(_, prefixes, ports)| {
            ports.iter().flat_map(move |port| {
                prefixes
                    .iter()
                    .map(move |prefix| (format!("{prefix}{domain}"), *port))
            })
        })
        .collect()
}

impl GuessResolver {
    /// Creates a resolver with a per-connect `timeout` and at most
    /// `max_concurrency` connects in flight.
    pub fn new(timeout: Duration, max_concurrency: usize) -> Self {
        Self {
            timeout,
            max_concurrency: max_concurrency.max(1),
        }
    }

    /// Returns the reachable `host:port` strings for `domain`, sorted.
    pub async fn guess(&self, domain: &str) -> Vec<String> {
        self.probe(guess_targets(domain)).await
    }

    /// Connects to every target and returns those that accepted, sorted.
    pub async fn probe(&self, targets: Vec<(String, u16)>) -> Vec<String> {
        let semaphore = Arc::new(Semaphore::new(self.max_concurrency));
        let reachable = Arc::new(Mutex::new(Vec::new()));
        let mut tasks = FuturesUnordered::new();

        for (host, port) in targets {
            let semaphore = Arc::clone(&semaphore);
            let reachable = Arc::clone(&reachable);
            let timeout = self.timeout;
            tasks.push(tokio::spawn(async move {
                let Ok(_permit) = semaphore.acquire_owned().await else {
                    return;
                };
                let connect = TcpStream::connect((host.as_str(), port));
                if let Ok(Ok(stream)) = tokio::time::timeout(timeout, connect).await {
                    drop(stream);
                    reachable.lock().await.push(format!("{host}:{port}"));
                }
            }));
        }

        while let Some(joined) = tasks.next().await {
            if let Err(e) = joined {
                log::warn!("Guess probe task failed: {e}");
            }
        }

        let mut found = std::mem::take(&mut *reachable.lock().await);
        found.sort();
        found
    }
}
