//! In process transport replaying canned responses

use std::{
    sync::atomic::{AtomicUsize, Ordering},
    time::Duration,
};

use parking_lot::Mutex;
use reqwest::StatusCode;

use super::{FetchError, Request, Response, Transport};

/// Canned reply
#[derive(Clone)]
enum Reply {
    Body(StatusCode, String),
    Timeout,
}

/// Transport matching request URLs against registered fragments.
/// The longest matching fragment wins, unmatched requests get a 404.
pub(crate) struct FakeTransport {
    routes: Mutex<Vec<(String, Reply)>>,
    requests: Mutex<Vec<Request>>,
    delay: Option<Duration>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl FakeTransport {
    pub(crate) fn new() -> Self {
        Self {
            routes: Mutex::default(),
            requests: Mutex::default(),
            delay: None,
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    /// Delay every response, to observe concurrency
    pub(crate) fn with_delay(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::new()
        }
    }

    fn set_route(&self, fragment: &str, reply: Reply) {
        let mut routes = self.routes.lock();
        routes.retain(|(f, _)| f != fragment);
        routes.push((fragment.to_owned(), reply));
    }

    /// Register (or replace) a response for URLs containing `fragment`
    pub(crate) fn route(&self, fragment: &str, status: u16, body: &str) {
        #[expect(clippy::unwrap_used)]
        let status = StatusCode::from_u16(status).unwrap();
        self.set_route(fragment, Reply::Body(status, body.to_owned()));
    }

    /// Make URLs containing `fragment` time out
    pub(crate) fn route_timeout(&self, fragment: &str) {
        self.set_route(fragment, Reply::Timeout);
    }

    /// All requests received so far
    pub(crate) fn requests(&self) -> Vec<Request> {
        self.requests.lock().clone()
    }

    /// Count of requests whose URL contains `fragment`
    pub(crate) fn count(&self, fragment: &str) -> usize {
        self.requests
            .lock()
            .iter()
            .filter(|r| r.url.as_str().contains(fragment))
            .count()
    }

    /// Highest number of requests observed in flight at the same time
    pub(crate) fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn reply_for(&self, url: &str) -> Reply {
        self.routes
            .lock()
            .iter()
            .filter(|(f, _)| url.contains(f.as_str()))
            .max_by_key(|(f, _)| f.len())
            .map_or_else(
                || Reply::Body(StatusCode::NOT_FOUND, "{}".to_owned()),
                |(_, r)| r.clone(),
            )
    }
}

#[async_trait::async_trait]
impl Transport for FakeTransport {
    async fn execute(&self, request: Request) -> Result<Response, FetchError> {
        let url = request.url.to_string();
        self.requests.lock().push(request);
        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(current, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        match self.reply_for(&url) {
            Reply::Body(status, body) => Ok(Response {
                status,
                body: body.into_bytes(),
            }),
            Reply::Timeout => Err(FetchError::Timeout(url)),
        }
    }
}
