//! Scripted in-memory transport for exercising the pipeline offline

use super::{ApiRequest, ApiResponse, Transport, TransportError};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

#[derive(Debug, Clone)]
enum Reply {
    Status(u16, String),
    Timeout,
    Refused,
}

impl Reply {
    fn into_result(self, timeout: Duration) -> Result<ApiResponse, TransportError> {
        match self {
            Reply::Status(status, body) => Ok(ApiResponse { status, body }),
            Reply::Timeout => Err(TransportError::Timeout(timeout)),
            Reply::Refused => Err(TransportError::Connect("connection refused".to_string())),
        }
    }
}

struct Route {
    fragment: String,
    replies: VecDeque<Reply>,
}

/// Replays canned replies keyed by URL fragment.
///
/// The first registered route whose fragment occurs in the request URL
/// answers. Queued replies are consumed in order; the last one sticks.
/// Unrouted API calls are refused; unrouted probes time out.
#[derive(Default)]
pub struct ScriptedTransport {
    routes: Mutex<Vec<Route>>,
    probe_routes: Mutex<Vec<Route>>,
    requests: Mutex<Vec<ApiRequest>>,
    probes: Mutex<Vec<String>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(routes: &Mutex<Vec<Route>>, fragment: &str, reply: Reply) {
        let mut routes = routes.lock().unwrap();
        if let Some(route) = routes.iter_mut().find(|r| r.fragment == fragment) {
            route.replies.push_back(reply);
        } else {
            routes.push(Route {
                fragment: fragment.to_string(),
                replies: VecDeque::from([reply]),
            });
        }
    }

    fn answer(routes: &Mutex<Vec<Route>>, url: &str) -> Option<Reply> {
        let mut routes = routes.lock().unwrap();
        let route = routes.iter_mut().find(|r| url.contains(&r.fragment))?;
        if route.replies.len() > 1 {
            route.replies.pop_front()
        } else {
            route.replies.front().cloned()
        }
    }

    pub fn reply(self, fragment: &str, status: u16, body: &str) -> Self {
        Self::push(&self.routes, fragment, Reply::Status(status, body.to_string()));
        self
    }

    pub fn timeout(self, fragment: &str) -> Self {
        Self::push(&self.routes, fragment, Reply::Timeout);
        self
    }

    pub fn refuse(self, fragment: &str) -> Self {
        Self::push(&self.routes, fragment, Reply::Refused);
        self
    }

    /// Answer probes through proxies whose URL contains `fragment`
    pub fn probe_reply(self, fragment: &str, status: u16, body: &str) -> Self {
        Self::push(&self.probe_routes, fragment, Reply::Status(status, body.to_string()));
        self
    }

    pub fn probe_refuse(self, fragment: &str) -> Self {
        Self::push(&self.probe_routes, fragment, Reply::Refused);
        self
    }

    /// Every API request issued so far, in order
    pub fn requests(&self) -> Vec<ApiRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn calls_to(&self, fragment: &str) -> usize {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.url.contains(fragment))
            .count()
    }

    /// Proxy URLs probed so far, in order
    pub fn probes(&self) -> Vec<String> {
        self.probes.lock().unwrap().clone()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn execute(&self, request: ApiRequest) -> Result<ApiResponse, TransportError> {
        let timeout = request.timeout;
        let reply = Self::answer(&self.routes, &request.url).unwrap_or(Reply::Refused);
        self.requests.lock().unwrap().push(request);
        reply.into_result(timeout)
    }

    async fn probe(
        &self,
        proxy_url: &str,
        _target: &str,
        timeout: Duration,
    ) -> Result<ApiResponse, TransportError> {
        self.probes.lock().unwrap().push(proxy_url.to_string());
        Self::answer(&self.probe_routes, proxy_url)
            .unwrap_or(Reply::Timeout)
            .into_result(timeout)
    }
}
