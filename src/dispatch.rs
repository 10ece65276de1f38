//! One request in, one response out.
//!
//! [`serve_once`] is the whole life of the process: read a frame, turn it
//! into a [`Request`], run it against a fresh [`StoreScanner`] bound to the
//! caller's session handle, write the response frame.

use chrono::Utc;
use futures::StreamExt;
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{debug, info, warn};

use crate::agent::{AgentController, AgentError};
use crate::channel::{self, ReadOutcome};
use crate::config::Config;
use crate::protocol::{Command, Request, Response};
use crate::session::SessionHandle;
use crate::store::StoreScanner;

/// Executes validated requests.
pub struct Dispatcher {
    config: Config,
}

impl Dispatcher {
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    fn scanner(&self, session: Option<SessionHandle>) -> StoreScanner {
        let mut agent = AgentController::new(self.config.clone());
        if let Some(handle) = session {
            if handle.is_expired(Utc::now()) {
                debug!(pid = handle.pid, "Session handle is past its expiry");
            }
            agent.open(handle);
        }
        StoreScanner::new(agent, &self.config.store_dir)
    }

    /// Run one request.
    ///
    /// Only a failed agent start is an error; every other failure has
    /// already been reduced to a benign response.
    pub async fn dispatch(&self, request: Request) -> Result<Response, AgentError> {
        let Request { command, session } = request;
        debug!(command = command.name(), has_session = session.is_some(), "Dispatching");

        let mut scanner = self.scanner(session);

        let response = match command {
            Command::Setup => {
                let outcome = scanner.agent_mut().start_agent().await?;
                debug!(?outcome, "Agent ready");

                // Pull one record so gpg asks for the passphrase now.
                {
                    let records = scanner.iterate();
                    futures::pin_mut!(records);
                    if records.next().await.is_none() {
                        debug!("Store yielded no records during setup");
                    }
                }

                match scanner.agent().handle() {
                    Some(handle) => Response::Session(handle.clone()),
                    None => Response::Empty,
                }
            }
            Command::Teardown => {
                let outcome = scanner.agent().stop_agent();
                debug!(?outcome, "Teardown finished");
                Response::Empty
            }
            Command::Running => Response::Running(scanner.agent().is_running()),
            Command::Find { url } => match scanner.find(&url).await {
                Some(record) => {
                    info!("Found credentials for request");
                    Response::Found(record)
                }
                None => {
                    info!("No credentials matched request");
                    Response::Empty
                }
            },
            Command::Ignored { reason } => {
                debug!(%reason, "Ignoring request");
                Response::Empty
            }
        };

        Ok(response)
    }
}

/// Serve exactly one request from `reader` to `writer`.
///
/// Transport problems (end of input, oversized or malformed frames) are
/// answered with `{}`. A failed agent start is returned without writing a
/// response.
pub async fn serve_once<R, W>(config: &Config, reader: &mut R, writer: &mut W) -> anyhow::Result<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let request = match channel::read_frame(reader, config.max_frame_len).await {
        Ok(ReadOutcome::Message(payload)) => Request::from_json(payload),
        Ok(ReadOutcome::EndOfInput) => {
            debug!("End of input before a request");
            Request::ignored("end of input")
        }
        Err(e) => {
            warn!("Unreadable request frame: {}", e);
            Request::ignored(format!("unreadable frame: {}", e))
        }
    };

    let response = Dispatcher::new(config.clone()).dispatch(request).await?;
    channel::write_frame(writer, &response.into_json()).await?;
    Ok(())
}
