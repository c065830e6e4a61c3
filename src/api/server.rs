use crate::domain::replay::{Direction, HighlightMode, ReplaySession};
use crate::domain::steps::StepsDocument;
use crate::infrastructure::playback::{lock_session, PlaybackDriver};
use anyhow::{Context, Result};
use serde::Deserialize;
use serde_json::{json, Value};
use std::io::{BufRead, BufReader, Write};
use std::net::{SocketAddr, TcpListener, TcpStream, ToSocketAddrs};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;
use tracing::{debug, info, warn};

pub const DEFAULT_PORT: u16 = 4599;
pub const DEFAULT_INTERVAL: Duration = Duration::from_millis(500);

/// `{"command": "SEEK", "params": {"index": 3}}`
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "command", content = "params", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Command {
    Ping,
    State,
    Frame,
    StepForward,
    StepBack,
    Play { direction: Direction },
    Pause,
    Seek { index: Option<usize> },
    /// `outgoing` / `incoming` switch the highlight directions; omitted
    /// flags keep their current value.
    Select {
        node: Option<String>,
        #[serde(default)]
        outgoing: Option<bool>,
        #[serde(default)]
        incoming: Option<bool>,
    },
    Highlight { node: String },
    Search { query: String },
    ContinueFrom { node: String },
    /// Steps of one tab of the embedded step metadata.
    Steps { tab: String },
    Shutdown,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum Request {
    Known(Command),
    Unrecognized(Value),
}

/// State shared by every connection.
#[derive(Clone)]
pub struct ServerContext {
    pub driver: PlaybackDriver,
    pub steps: Option<Arc<StepsDocument>>,
}

pub struct ReplayServer {
    listener: TcpListener,
    context: ServerContext,
    shutdown: Arc<AtomicBool>,
}

impl ReplayServer {
    pub fn bind<A: ToSocketAddrs>(addr: A, session: ReplaySession, interval: Duration) -> Result<Self> {
        let listener = TcpListener::bind(addr).context("Failed to bind replay server")?;
        Ok(Self {
            listener,
            context: ServerContext {
                driver: PlaybackDriver::new(Arc::new(Mutex::new(session)), interval),
                steps: None,
            },
            shutdown: Arc::new(AtomicBool::new(false)),
        })
    }

    pub fn with_steps(mut self, steps: Option<StepsDocument>) -> Self {
        self.context.steps = steps.map(Arc::new);
        self
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Accept connections until a client sends `SHUTDOWN`.
    pub fn serve(self) -> Result<()> {
        let local = self.local_addr()?;
        info!(%local, "replay server listening");

        for stream in self.listener.incoming() {
            if self.shutdown.load(Ordering::SeqCst) {
                break;
            }
            match stream {
                Ok(stream) => {
                    let context = self.context.clone();
                    let shutdown = Arc::clone(&self.shutdown);
                    thread::spawn(move || {
                        if let Err(e) = handle_connection(stream, &context, &shutdown, local) {
                            warn!(error = %e, "connection error");
                        }
                    });
                }
                Err(e) => warn!(error = %e, "accept error"),
            }
        }

        info!("replay server stopped");
        Ok(())
    }
}

fn handle_connection(
    mut stream: TcpStream,
    context: &ServerContext,
    shutdown: &AtomicBool,
    local: SocketAddr,
) -> Result<()> {
    let mut reader = BufReader::new(stream.try_clone()?);
    let mut line = String::new();

    loop {
        line.clear();
        if reader.read_line(&mut line)? == 0 {
            break;
        }
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        let request = serde_json::from_str::<Request>(trimmed);
        let stop = matches!(request, Ok(Request::Known(Command::Shutdown)));
        let response = match request
            .context("Invalid JSON format")
            .and_then(|req| process_request(req, context))
        {
            Ok(data) => json!({ "status": "success", "data": data }),
            Err(e) => json!({ "status": "error", "message": e.to_string() }),
        };

        stream.write_all(serde_json::to_string(&response)?.as_bytes())?;
        stream.write_all(b"\n")?;

        if stop {
            info!("shutdown requested");
            context.driver.pause()?;
            shutdown.store(true, Ordering::SeqCst);
            // Wake the accept loop so it observes the flag.
            let _ = TcpStream::connect(local);
            break;
        }
    }
    Ok(())
}

pub fn process_request(request: Request, context: &ServerContext) -> Result<Value> {
    let command = match request {
        Request::Known(command) => command,
        Request::Unrecognized(value) => {
            let name = value
                .get("command")
                .and_then(Value::as_str)
                .unwrap_or("<missing>");
            anyhow::bail!("Unrecognized command: {}", name);
        }
    };
    debug!(?command, "processing command");
    let driver = &context.driver;

    match command {
        Command::Ping => Ok(json!("PONG")),
        Command::Shutdown => Ok(json!("Shutting down...")),
        Command::Play { direction } => {
            let started = driver.play(direction)?;
            let session = lock_session(driver.session())?;
            Ok(json!({ "started": started, "state": snapshot(&session) }))
        }
        Command::Pause => {
            driver.pause()?;
            let session = lock_session(driver.session())?;
            Ok(snapshot(&session))
        }
        Command::Steps { tab } => {
            let document = context
                .steps
                .as_deref()
                .context("No step metadata loaded")?;
            Ok(json!({ "tab": tab, "steps": document.steps_for_tab(&tab) }))
        }
        command => {
            let mut session = lock_session(driver.session())?;
            apply_command(command, &mut session)
        }
    }
}

fn apply_command(command: Command, session: &mut ReplaySession) -> Result<Value> {
    let value = match command {
        Command::State => snapshot(session),
        Command::Frame => serde_json::to_value(session.frame())?,
        Command::StepForward => {
            session.step_forward();
            snapshot(session)
        }
        Command::StepBack => {
            session.step_back();
            snapshot(session)
        }
        Command::Seek { index } => {
            session.seek(index);
            snapshot(session)
        }
        Command::Select {
            node,
            outgoing,
            incoming,
        } => {
            let current = session.state().highlight;
            session.set_highlight_mode(HighlightMode {
                outgoing: outgoing.unwrap_or(current.outgoing),
                incoming: incoming.unwrap_or(current.incoming),
            });
            session.select(node);
            serde_json::to_value(session.frame())?
        }
        Command::Highlight { node } => serde_json::to_value(session.highlight_set(&node))?,
        Command::Search { query } => json!({ "match": session.search(&query) }),
        Command::ContinueFrom { node } => {
            json!({ "index": session.continue_from(&node), "state": snapshot(session) })
        }
        other => anyhow::bail!("Command {:?} is not handled here", other),
    };
    Ok(value)
}

fn snapshot(session: &ReplaySession) -> Value {
    json!({
        "cursor": session.state().cursor,
        "direction": session.state().direction,
        "selected": session.state().selected,
        "highlight": session.state().highlight,
        "phase": session.state().phase(),
        "current": session.current_edge(),
        "length": session.len(),
    })
}
