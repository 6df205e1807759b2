//! A minimal LiveReload protocol server.
//!
//! Browser extensions and the `livereload.js` client connect over WebSocket,
//! greet with a `hello` command and then wait for `reload` commands. Plain
//! HTTP requests for `/livereload.js` on the same port get the client script,
//! so pages can include it without a browser extension. The server runs on
//! two OS threads: one accepting and greeting new clients, one broadcasting
//! reloads to every connected client.

use std::io::{BufRead, BufReader, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::mpsc::{Receiver, Sender};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tungstenite::WebSocket;

const PROTOCOL: &str = "http://livereload.com/protocols/official-7";
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(5);
const MAX_CLIENTS: usize = 10;
const SCRIPT_PATH: &str = "/livereload.js";
const CLIENT_SCRIPT: &str = include_str!("livereload.js");

type Clients = Arc<Mutex<Vec<WebSocket<TcpStream>>>>;

#[derive(Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "lowercase")]
enum Command {
    Hello {
        #[serde(default)]
        protocols: Vec<String>,
        #[serde(
            rename = "serverName",
            default,
            skip_serializing_if = "Option::is_none"
        )]
        server_name: Option<String>,
    },
    Reload {
        path: String,
        #[serde(rename = "liveCSS")]
        live_css: bool,
    },
    #[serde(other)]
    Unknown,
}

impl Command {
    fn greeting() -> Self {
        Command::Hello {
            protocols: vec![PROTOCOL.to_string()],
            server_name: Some(env!("CARGO_PKG_NAME").to_string()),
        }
    }
}

pub(crate) struct LiveReload {
    port: u16,
    tx: Sender<String>,
}

impl LiveReload {
    /// Bind the server on `port`, falling back to any free port when it is
    /// taken.
    pub(crate) fn start(port: u16) -> std::io::Result<Self> {
        let (listener, port) = reserve_port(port)?;
        let clients = Clients::default();

        let (tx, rx) = std::sync::mpsc::channel();
        std::thread::spawn({
            let clients = clients.clone();
            move || accept_clients(listener, clients)
        });
        std::thread::spawn(move || broadcast_reloads(rx, clients));

        Ok(Self { port, tx })
    }

    pub(crate) fn port(&self) -> u16 {
        self.port
    }

    /// Tell every connected browser that `path` changed.
    pub(crate) fn reload(&self, path: &str) {
        let command = Command::Reload {
            path: path.to_string(),
            live_css: true,
        };

        match serde_json::to_string(&command) {
            Ok(message) => {
                if self.tx.send(message).is_err() {
                    tracing::error!("live reload server is gone");
                }
            }
            Err(e) => tracing::error!("couldn't encode reload: {e}"),
        }
    }
}

fn reserve_port(port: u16) -> std::io::Result<(TcpListener, u16)> {
    let listener = match TcpListener::bind(("127.0.0.1", port)) {
        Ok(sock) => sock,
        Err(e) => {
            tracing::warn!("live reload port {port} unavailable ({e}), picking another");
            TcpListener::bind("127.0.0.1:0")?
        }
    };

    let addr = listener.local_addr()?;
    Ok((listener, addr.port()))
}

fn accept_clients(listener: TcpListener, clients: Clients) {
    for stream in listener.incoming() {
        let stream = match stream {
            Ok(stream) => stream,
            Err(e) => {
                tracing::debug!("live reload connection failed: {e}");
                continue;
            }
        };

        if let Err(e) = handle(stream, &clients) {
            tracing::debug!("live reload handshake failed: {e}");
        }
    }
}

fn handle(stream: TcpStream, clients: &Clients) -> anyhow::Result<()> {
    stream.set_read_timeout(Some(HANDSHAKE_TIMEOUT))?;

    if wants_script(&stream)? {
        serve_script(stream)
    } else {
        greet(stream, clients)
    }
}

/// Peek at the request line without consuming it, so a WebSocket handshake
/// can still read the whole request.
fn wants_script(stream: &TcpStream) -> std::io::Result<bool> {
    let mut buf = [0; 512];
    loop {
        let n = stream.peek(&mut buf)?;
        let head = &buf[..n];

        if let Some(end) = head.windows(2).position(|w| w == b"\r\n") {
            let line = String::from_utf8_lossy(&head[..end]);
            let mut parts = line.split_whitespace();
            let method = parts.next();
            let path = parts.next().and_then(|target| target.split('?').next());
            return Ok(method == Some("GET") && path == Some(SCRIPT_PATH));
        }

        if n == 0 || n == buf.len() {
            return Ok(false);
        }
        std::thread::sleep(Duration::from_millis(5));
    }
}

fn serve_script(stream: TcpStream) -> anyhow::Result<()> {
    let mut reader = BufReader::new(stream);
    let mut line = String::new();
    loop {
        line.clear();
        if reader.read_line(&mut line)? == 0 || line.trim_end().is_empty() {
            break;
        }
    }

    let mut stream = reader.into_inner();
    write!(
        stream,
        "HTTP/1.1 200 OK\r\n\
         Content-Type: application/javascript; charset=utf-8\r\n\
         Content-Length: {}\r\n\
         Connection: close\r\n\r\n{CLIENT_SCRIPT}",
        CLIENT_SCRIPT.len()
    )?;
    stream.flush()?;

    tracing::debug!("served {SCRIPT_PATH}");
    Ok(())
}

/// Wait for the client's `hello` and answer it. The client becomes visible
/// to the broadcast thread before the answer can reach it.
fn greet(stream: TcpStream, clients: &Clients) -> anyhow::Result<()> {
    let mut socket = tungstenite::accept(stream)?;

    let message = socket.read()?;
    match serde_json::from_str::<Command>(message.to_text()?)? {
        Command::Hello { .. } => {}
        other => anyhow::bail!("expected hello, got {other:?}"),
    }

    socket.get_ref().set_read_timeout(None)?;

    let greeting = serde_json::to_string(&Command::greeting())?;
    let mut clients = clients
        .lock()
        .map_err(|_| anyhow::anyhow!("client list poisoned"))?;
    socket.send(greeting.into())?;
    clients.push(socket);

    tracing::debug!("browser connected, {} total", clients.len());
    Ok(())
}

fn broadcast_reloads(rx: Receiver<String>, clients: Clients) {
    while let Ok(message) = rx.recv() {
        let Ok(mut clients) = clients.lock() else {
            return;
        };

        let mut broken = vec![];
        for (i, socket) in clients.iter_mut().enumerate() {
            match socket.send(message.as_str().into()) {
                Ok(_) => {}
                Err(tungstenite::Error::Io(_))
                | Err(tungstenite::Error::ConnectionClosed)
                | Err(tungstenite::Error::AlreadyClosed) => broken.push(i),
                Err(e) => tracing::error!("live reload: {e:?}"),
            }
        }

        for i in broken.into_iter().rev() {
            clients.remove(i);
        }

        // Close all but the most recent connections
        let len = clients.len();
        if len > MAX_CLIENTS {
            for mut socket in clients.drain(0..len - MAX_CLIENTS) {
                socket.close(None).ok();
            }
        }

        tracing::debug!("reload sent to {} browsers", clients.len());
    }
}
