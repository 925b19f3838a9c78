//! Local HTTP stub used by the async tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// Serves fixed bodies by path. Unknown paths get 404; HEAD gets the status
/// only; a 3xx route sends its body as the `Location` header.
pub struct StubServer {
    base_url: String,
    state: Arc<StubState>,
    handles: Vec<thread::JoinHandle<()>>,
}

struct StubState {
    routes: HashMap<String, (u16, String)>,
    delay: Duration,
    shutdown: AtomicBool,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
}

impl StubServer {
    pub fn start(routes: Vec<(&str, u16, &str)>) -> Self {
        let routes: HashMap<String, (u16, String)> = routes
            .into_iter()
            .map(|(path, status, body)| (path.to_string(), (status, body.to_string())))
            .collect();
        Self::start_owned(routes)
    }

    pub fn start_owned(routes: HashMap<String, (u16, String)>) -> Self {
        Self::start_workers(routes, 1, Duration::ZERO)
    }

    /// `workers` threads answer in parallel, each holding a request for `delay`.
    pub fn start_workers(
        routes: HashMap<String, (u16, String)>,
        workers: usize,
        delay: Duration,
    ) -> Self {
        let server =
            Arc::new(tiny_http::Server::http("127.0.0.1:0").expect("start tiny_http server"));
        let base_url = format!("http://{}", server.server_addr());
        let state = Arc::new(StubState {
            routes,
            delay,
            shutdown: AtomicBool::new(false),
            in_flight: AtomicUsize::new(0),
            peak_in_flight: AtomicUsize::new(0),
        });

        let handles = (0..workers.max(1))
            .map(|_| {
                let server = Arc::clone(&server);
                let state = Arc::clone(&state);
                thread::spawn(move || serve(&server, &state))
            })
            .collect();

        Self {
            base_url,
            state,
            handles,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Highest number of requests that were being answered at the same time.
    pub fn peak_in_flight(&self) -> usize {
        self.state.peak_in_flight.load(Ordering::SeqCst)
    }
}

fn serve(server: &tiny_http::Server, state: &StubState) {
    while !state.shutdown.load(Ordering::SeqCst) {
        let request = match server.recv_timeout(Duration::from_millis(20)) {
            Ok(Some(req)) => req,
            Ok(None) => continue,
            Err(_) => break,
        };

        let now = state.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        state.peak_in_flight.fetch_max(now, Ordering::SeqCst);
        if !state.delay.is_zero() {
            thread::sleep(state.delay);
        }
        // Released before answering: once the client sees the response it
        // may start its next request.
        state.in_flight.fetch_sub(1, Ordering::SeqCst);

        let (status, body) = state
            .routes
            .get(request.url())
            .cloned()
            .unwrap_or((404, "not found".to_string()));

        let mut headers = Vec::new();
        if (300..400).contains(&status) {
            headers.push(
                tiny_http::Header::from_bytes(&b"Location"[..], body.as_bytes())
                    .expect("location header"),
            );
        }

        let _ = if *request.method() == tiny_http::Method::Head {
            let mut response = tiny_http::Response::empty(status);
            for header in headers {
                response.add_header(header);
            }
            request.respond(response)
        } else {
            headers.push(
                tiny_http::Header::from_bytes(
                    &b"Content-Type"[..],
                    &b"text/html; charset=utf-8"[..],
                )
                .expect("static header"),
            );
            let mut response = tiny_http::Response::from_string(body).with_status_code(status);
            for header in headers {
                response.add_header(header);
            }
            request.respond(response)
        };
    }
}

impl Drop for StubServer {
    fn drop(&mut self) {
        self.state.shutdown.store(true, Ordering::SeqCst);
        for handle in self.handles.drain(..) {
            let _ = handle.join();
        }
    }
}
