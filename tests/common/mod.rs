#![allow(dead_code)]

pub mod test_server {
    use std::sync::Once;

    /// Ensures May coroutines are configured only once
    static MAY_INIT: Once = Once::new();

    pub fn setup_may_runtime() {
        MAY_INIT.call_once(|| {
            may::config().set_stack_size(0x8000);
        });
    }
}

pub mod http {
    use brrtserve::server::AppService;
    use std::io::{Cursor, Read, Write};
    use std::net::{SocketAddr, TcpStream};
    use std::time::Duration;

    /// One response parsed off the wire
    #[derive(Debug, Clone)]
    pub struct WireResponse {
        pub status: u16,
        pub headers: Vec<(String, String)>,
        pub body: Vec<u8>,
    }

    impl WireResponse {
        pub fn header(&self, name: &str) -> Option<&str> {
            self.headers
                .iter()
                .find(|(k, _)| k.eq_ignore_ascii_case(name))
                .map(|(_, v)| v.as_str())
        }

        pub fn headers_named(&self, name: &str) -> Vec<&str> {
            self.headers
                .iter()
                .filter(|(k, _)| k.eq_ignore_ascii_case(name))
                .map(|(_, v)| v.as_str())
                .collect()
        }

        pub fn text(&self) -> String {
            String::from_utf8_lossy(&self.body).into_owned()
        }

        pub fn json(&self) -> serde_json::Value {
            serde_json::from_slice(&self.body).unwrap()
        }

        /// Value of the session cookie, if one was set
        pub fn session_cookie(&self) -> Option<String> {
            self.headers_named("Set-Cookie")
                .into_iter()
                .find_map(|c| c.strip_prefix("BRRTSESSIONID="))
                .map(|rest| rest.split(';').next().unwrap_or_default().to_string())
        }
    }

    fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
        haystack.windows(needle.len()).position(|w| w == needle)
    }

    /// Split a byte stream into responses.
    ///
    /// Sized responses are cut at `Content-Length`; an unsized one takes the rest.
    pub fn parse_responses(mut raw: &[u8]) -> Vec<WireResponse> {
        let mut out = Vec::new();
        while !raw.is_empty() {
            let head_end = find(raw, b"\r\n\r\n").expect("response head");
            let head = std::str::from_utf8(&raw[..head_end]).unwrap();
            let mut lines = head.split("\r\n");
            let status_line = lines.next().unwrap();
            let status = status_line
                .split(' ')
                .nth(1)
                .and_then(|s| s.parse().ok())
                .unwrap();
            let headers: Vec<(String, String)> = lines
                .filter_map(|l| l.split_once(": "))
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect();
            let rest = &raw[head_end + 4..];
            let length = headers
                .iter()
                .find(|(k, _)| k.eq_ignore_ascii_case("Content-Length"))
                .map(|(_, v)| v.parse::<usize>().unwrap());
            let (body, remaining) = match length {
                Some(n) => (rest[..n].to_vec(), &rest[n..]),
                None => (rest.to_vec(), &rest[rest.len()..]),
            };
            out.push(WireResponse {
                status,
                headers,
                body,
            });
            raw = remaining;
        }
        out
    }

    /// Run raw request bytes through the connection loop in memory
    pub fn serve_raw(service: &AppService, raw: &[u8]) -> Vec<WireResponse> {
        let mut out = Vec::new();
        service.serve(Cursor::new(raw.to_vec()), &mut out).unwrap();
        parse_responses(&out)
    }

    /// Send one request over TCP and read until the server closes
    pub fn send_request(addr: SocketAddr, raw: &str) -> WireResponse {
        let mut stream = TcpStream::connect(addr).unwrap();
        stream
            .set_read_timeout(Some(Duration::from_secs(5)))
            .unwrap();
        stream.write_all(raw.as_bytes()).unwrap();
        let mut buf = Vec::new();
        stream.read_to_end(&mut buf).unwrap();
        parse_responses(&buf).remove(0)
    }
}

pub mod fixtures {
    use brrtserve::dispatcher::{Dispatcher, DispatcherConfig, ExceptionHandler};
    use brrtserve::pool::ConnectionManager;
    use brrtserve::registry::Components;
    use brrtserve::router::{RouteDef, RouteTable};
    use brrtserve::server::Request;
    use brrtserve::session::SessionStore;
    use http::Method;
    use std::fmt;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    /// Assemble a dispatcher around the given routes and components
    pub fn dispatcher(
        routes: Vec<RouteDef>,
        components: Components,
        exception_handlers: Vec<ExceptionHandler>,
        config: DispatcherConfig,
    ) -> Dispatcher {
        let mut table = RouteTable::new();
        for def in routes {
            table.register(def).unwrap();
        }
        let mut dispatcher = Dispatcher::new(
            Arc::new(table),
            Arc::new(SessionStore::new()),
            Arc::new(components),
            config,
        );
        for handler in exception_handlers {
            dispatcher.add_exception_handler(handler);
        }
        dispatcher
    }

    pub fn get(path: &str) -> Request {
        Request::new(Method::GET, path, "HTTP/1.1")
    }

    pub fn request(method: Method, path: &str) -> Request {
        Request::new(method, path, "HTTP/1.1")
    }

    /// Failure reported by [`CountingManager`]
    #[derive(Debug)]
    pub struct RefusedError;

    impl fmt::Display for RefusedError {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "connection refused")
        }
    }

    impl std::error::Error for RefusedError {}

    /// Fake connection: a serial number plus a transaction flag
    #[derive(Debug)]
    pub struct FakeConnection {
        pub serial: usize,
        pub in_transaction: bool,
    }

    /// Counts every manager call; optionally refuses to connect or commit
    #[derive(Debug, Default)]
    pub struct CountingManager {
        pub connects: AtomicUsize,
        pub resets: AtomicUsize,
        pub commits: AtomicUsize,
        pub rollbacks: AtomicUsize,
        pub refuse_connect: bool,
        pub refuse_commit: bool,
    }

    impl ConnectionManager for CountingManager {
        type Connection = FakeConnection;
        type Error = RefusedError;

        fn connect(&self) -> Result<FakeConnection, RefusedError> {
            if self.refuse_connect {
                return Err(RefusedError);
            }
            let serial = self.connects.fetch_add(1, Ordering::SeqCst);
            Ok(FakeConnection {
                serial,
                in_transaction: false,
            })
        }

        fn reset(&self, conn: &mut FakeConnection) -> Result<(), RefusedError> {
            self.resets.fetch_add(1, Ordering::SeqCst);
            conn.in_transaction = false;
            Ok(())
        }

        fn begin(&self, conn: &mut FakeConnection) -> Result<(), RefusedError> {
            conn.in_transaction = true;
            Ok(())
        }

        fn commit(&self, _conn: &mut FakeConnection) -> Result<(), RefusedError> {
            if self.refuse_commit {
                return Err(RefusedError);
            }
            self.commits.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn rollback(&self, conn: &mut FakeConnection) -> Result<(), RefusedError> {
            self.rollbacks.fetch_add(1, Ordering::SeqCst);
            conn.in_transaction = false;
            Ok(())
        }
    }
}
