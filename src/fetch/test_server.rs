//! Minimal HTTP/1.1 server on localhost for fetcher tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use url::Url;

/// Canned reply for one path.
#[derive(Debug, Clone)]
pub struct Route {
    path: &'static str,
    status: u16,
    location: Option<&'static str>,
    body: &'static str,
}

impl Route {
    pub fn ok(path: &'static str, body: &'static str) -> Self {
        Route {
            path,
            status: 200,
            location: None,
            body,
        }
    }

    pub fn redirect(path: &'static str, location: &'static str) -> Self {
        Route {
            path,
            status: 302,
            location: Some(location),
            body: "",
        }
    }
}

/// Serves `routes` until dropped; any other path answers 404.
pub struct TestServer {
    base: Url,
    hits: Arc<AtomicUsize>,
    task: tokio::task::JoinHandle<()>,
}

impl TestServer {
    pub async fn start(routes: Vec<Route>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = Url::parse(&format!("http://{}/", listener.local_addr().unwrap())).unwrap();
        let hits = Arc::new(AtomicUsize::new(0));
        let routes = Arc::new(routes);

        let task = tokio::spawn({
            let hits = Arc::clone(&hits);
            async move {
                while let Ok((stream, _)) = listener.accept().await {
                    let hits = Arc::clone(&hits);
                    let routes = Arc::clone(&routes);
                    tokio::spawn(async move {
                        let _ = serve(stream, &routes, &hits).await;
                    });
                }
            }
        });

        TestServer { base, hits, task }
    }

    pub fn url(&self, path: &str) -> Url {
        self.base.join(path).unwrap()
    }

    /// Requests received so far.
    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn serve(mut stream: TcpStream, routes: &[Route], hits: &AtomicUsize) -> std::io::Result<()> {
    let mut request = Vec::new();
    let mut buf = [0u8; 1024];
    while !request.windows(4).any(|w| w == b"\r\n\r\n") {
        let n = stream.read(&mut buf).await?;
        if n == 0 {
            return Ok(());
        }
        request.extend_from_slice(&buf[..n]);
    }
    hits.fetch_add(1, Ordering::SeqCst);

    let head = String::from_utf8_lossy(&request);
    let path = head.split_whitespace().nth(1).unwrap_or("/");
    let (status, location, body) = match routes.iter().find(|r| r.path == path) {
        Some(route) => (route.status, route.location, route.body),
        None => (404, None, "not found"),
    };

    let mut response = format!("HTTP/1.1 {status} X\r\nConnection: close\r\nContent-Length: {}\r\n", body.len());
    if let Some(location) = location {
        response.push_str(&format!("Location: {location}\r\n"));
    }
    response.push_str("\r\n");
    response.push_str(body);

    stream.write_all(response.as_bytes()).await?;
    stream.shutdown().await
}
