//! Connection pools keyed by retry count.
//!
//! A [`PooledConnection`] wraps one keep-alive `ureq::Agent` together with
//! the number of times it re-attempts a failed connection. Because that
//! retry count is fixed at creation, each distinct value gets its own pool.

use std::collections::HashMap;
use std::error::Error as _;
use std::io;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tracing::debug;

use crate::auth::Credential;
use crate::url::Endpoint;

/// One HTTP request, ready to be (re)sent.
#[derive(Debug)]
pub struct Outgoing<'a> {
    pub method: &'a str,
    pub url: String,
    /// Request-URI (path and query), needed for Digest signing.
    pub uri: String,
    pub timeout: Duration,
    pub headers: &'a [(String, String)],
    pub body: Option<&'a [u8]>,
}

impl<'a> Outgoing<'a> {
    pub fn get(endpoint: &Endpoint, command: &str, timeout: Duration) -> Self {
        Self {
            method: "GET",
            url: endpoint.url(command),
            uri: endpoint.request_uri(command),
            timeout,
            headers: &[],
            body: None,
        }
    }

    pub fn post(
        endpoint: &Endpoint,
        command: &str,
        timeout: Duration,
        headers: &'a [(String, String)],
        body: &'a [u8],
    ) -> Self {
        Self {
            method: "POST",
            url: endpoint.url(command),
            uri: endpoint.request_uri(command),
            timeout,
            headers,
            body: Some(body),
        }
    }

    pub(crate) fn send(
        &self,
        agent: &ureq::Agent,
        authorization: Option<&str>,
    ) -> Result<ureq::Response, ureq::Error> {
        let mut request = agent.request(self.method, &self.url).timeout(self.timeout);
        for (name, value) in self.headers {
            request = request.set(name, value);
        }
        if let Some(authorization) = authorization {
            request = request.set("Authorization", authorization);
        }

        match self.body {
            Some(body) => request.send_bytes(body),
            None => request.call(),
        }
    }
}

pub struct PooledConnection {
    retries: u32,
    agent: ureq::Agent,
}

impl PooledConnection {
    pub fn new(retries: u32) -> Self {
        let agent = ureq::AgentBuilder::new()
            .user_agent(concat!("ipcam-cgi/", env!("CARGO_PKG_VERSION")))
            .build();
        Self { retries, agent }
    }

    pub fn retries(&self) -> u32 {
        self.retries
    }

    /// Sends `request`, re-attempting up to `retries` times when the
    /// connection itself cannot be established.
    pub(crate) fn execute(
        &self,
        credential: &Credential,
        request: &Outgoing<'_>,
    ) -> Result<ureq::Response, ureq::Error> {
        let mut reconnects = 0;
        loop {
            match credential.send(&self.agent, request) {
                Err(ureq::Error::Transport(transport))
                    if transport.kind() == ureq::ErrorKind::ConnectionFailed
                        && reconnects < self.retries =>
                {
                    reconnects += 1;
                    debug!(url = %request.url, reconnects, error = %transport, "reconnecting");
                }
                other => return other,
            }
        }
    }
}

/// Lazily-populated map of retry count to pool. Entries live as long as the
/// map itself.
#[derive(Default)]
pub struct ConnectionPool {
    connections: Mutex<HashMap<u32, Arc<PooledConnection>>>,
}

impl ConnectionPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the pool for `retries`, creating it on first use.
    pub fn get(&self, retries: u32) -> Arc<PooledConnection> {
        let mut connections = self
            .connections
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        let connection = connections.entry(retries).or_insert_with(|| {
            debug!(retries, "creating connection pool");
            Arc::new(PooledConnection::new(retries))
        });
        Arc::clone(connection)
    }

    /// Retry counts that have a pool, ascending.
    pub fn retry_counts(&self) -> Vec<u32> {
        let connections = self
            .connections
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let mut keys: Vec<u32> = connections.keys().copied().collect();
        keys.sort_unstable();
        keys
    }

    pub fn len(&self) -> usize {
        self.connections
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// True when `err` is a timeout while waiting for or reading the response.
/// Connect timeouts surface as `ConnectionFailed` and do not count.
pub(crate) fn is_read_timeout(err: &ureq::Error) -> bool {
    let ureq::Error::Transport(transport) = err else {
        return false;
    };
    if transport.kind() != ureq::ErrorKind::Io {
        return false;
    }

    transport
        .source()
        .and_then(|source| source.downcast_ref::<io::Error>())
        .is_some_and(|e| matches!(e.kind(), io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn same_retry_count_shares_one_pool() {
        let pool = ConnectionPool::new();
        assert!(pool.is_empty());

        let first = pool.get(3);
        let second = pool.get(3);
        let other = pool.get(0);

        assert!(Arc::ptr_eq(&first, &second));
        assert!(!Arc::ptr_eq(&first, &other));
        assert_eq!(first.retries(), 3);
        assert_eq!(other.retries(), 0);
        assert_eq!(pool.retry_counts(), vec![0, 3]);
    }

    #[test]
    fn concurrent_requests_create_one_pool_per_key() {
        let pool = Arc::new(ConnectionPool::new());

        let handles: Vec<_> = (0..16)
            .map(|i| {
                let pool = Arc::clone(&pool);
                thread::spawn(move || (i % 2, pool.get(i % 2)))
            })
            .collect();

        let results: Vec<(u32, Arc<PooledConnection>)> =
            handles.into_iter().map(|h| h.join().unwrap()).collect();

        assert_eq!(pool.len(), 2);
        for (key, connection) in &results {
            assert!(Arc::ptr_eq(connection, &pool.get(*key)));
        }
    }

    #[test]
    fn status_errors_are_not_read_timeouts() {
        let response = ureq::Response::new(500, "Internal Server Error", "").unwrap();
        assert!(!is_read_timeout(&ureq::Error::Status(500, response)));
    }
}
