//! Operator console: a log-based [`WalletUi`] and stdin commands.
//!
//! ```text
//! connect <tc:// link>          handle a connect link
//! requests                      list pending relay requests
//! approve-tx <from> <boc>       answer sendTransaction with a signed BOC
//! approve-sign <from>           sign and answer signData
//! reject <from>                 decline a pending request
//! apps                          list connected apps
//! disconnect <app url>          disconnect an app
//! quit
//! ```

use bridge::ui::{ConnectPrompt, Decision, SignDataPrompt, TransactionPrompt, WalletUi};
use bridge::pending::PendingRequest;
use bridge::handshake::HandshakeResult;
use bridge::{BridgeError, BridgeService};
use transport::BoxFuture;

// ---------------------------------------------------------------------------
// ConsoleUi
// ---------------------------------------------------------------------------

/// Logs prompts instead of showing them.
///
/// Connects follow `auto_approve`. There is no webview, so transaction and
/// signData prompts (injected only) are declined; relay requests are queued
/// and answered with console commands.
pub struct ConsoleUi {
    auto_approve: bool,
}

impl ConsoleUi {
    pub fn new(auto_approve: bool) -> Self {
        Self { auto_approve }
    }
}

impl WalletUi for ConsoleUi {
    fn approve_connect<'a>(&'a self, prompt: &'a ConnectPrompt) -> BoxFuture<'a, Decision> {
        tracing::info!(
            app = %prompt.manifest.name,
            domain = %prompt.domain,
            items = prompt.request.items.len(),
            approved = self.auto_approve,
            "connect request"
        );
        let decision = if self.auto_approve {
            Decision::Approve(())
        } else {
            Decision::Reject
        };
        Box::pin(async move { decision })
    }

    fn approve_transaction<'a>(&'a self, prompt: &'a TransactionPrompt) -> BoxFuture<'a, Decision<String>> {
        tracing::warn!(app = %prompt.app.url, "injected transaction declined: no webview");
        Box::pin(async { Decision::Reject })
    }

    fn approve_sign_data<'a>(&'a self, prompt: &'a SignDataPrompt) -> BoxFuture<'a, Decision> {
        tracing::warn!(app = %prompt.app.url, "injected signData declined: no webview");
        Box::pin(async { Decision::Reject })
    }

    fn notify_pending(&self, request: &PendingRequest) {
        tracing::info!(from = %request.from, id = %request.id, method = %request.method, "request awaiting decision");
    }

    fn toast(&self, message: &str) {
        tracing::info!("{message}");
    }
}

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Connect(String),
    Requests,
    ApproveTransaction { from: String, boc: String },
    ApproveSignData { from: String },
    Reject { from: String },
    Apps,
    Disconnect { url: String },
    Quit,
}

impl Command {
    /// Parses one console line. Blank lines yield `Ok(None)`.
    pub fn parse(line: &str) -> Result<Option<Self>, String> {
        let mut words = line.split_whitespace();
        let Some(verb) = words.next() else {
            return Ok(None);
        };
        let mut arg = |name: &str| {
            words
                .next()
                .map(str::to_string)
                .ok_or_else(|| format!("{verb}: missing <{name}>"))
        };
        let command = match verb {
            "connect" => Self::Connect(arg("link")?),
            "requests" => Self::Requests,
            "approve-tx" => Self::ApproveTransaction {
                from: arg("from")?,
                boc: arg("boc")?,
            },
            "approve-sign" => Self::ApproveSignData { from: arg("from")? },
            "reject" => Self::Reject { from: arg("from")? },
            "apps" => Self::Apps,
            "disconnect" => Self::Disconnect { url: arg("app url")? },
            "quit" | "exit" => Self::Quit,
            other => return Err(format!("unknown command: {other}")),
        };
        Ok(Some(command))
    }
}

/// Runs `command`. Returns `false` when the console should close.
pub async fn execute(service: &BridgeService, command: Command) -> Result<bool, BridgeError> {
    let address = service.address();
    match command {
        Command::Connect(link) => {
            let outcome = service.handle_connect_link(&link).await?;
            match outcome.result {
                HandshakeResult::Connected(app) => {
                    tracing::info!(app = %app.url, client = %outcome.client_session_id, "connected")
                }
                HandshakeResult::Rejected(err) => {
                    tracing::info!(code = err.payload.code, reason = %err.payload.message, "connect rejected")
                }
            }
        }
        Command::Requests => {
            for request in service.active_requests()? {
                tracing::info!(from = %request.from, id = %request.id, method = %request.method, params = ?request.params, "pending");
            }
        }
        Command::ApproveTransaction { from, boc } => {
            service.approve_transaction(&from, &boc).await?;
            tracing::info!(%from, "transaction approved");
        }
        Command::ApproveSignData { from } => {
            let result = service.approve_sign_data(&from).await?;
            tracing::info!(%from, signature = %result.signature, "data signed");
        }
        Command::Reject { from } => {
            service.reject(&from).await?;
            tracing::info!(%from, "request rejected");
        }
        Command::Apps => {
            let connections = service.connections().connections(&address)?;
            for app in service.connections().apps(&address)?.values() {
                let sessions = connections.get(&app.key()).map_or(0, Vec::len);
                tracing::info!(url = %app.url, name = %app.name, sessions, "app");
            }
        }
        Command::Disconnect { url } => {
            service.disconnect(&url).await?;
            tracing::info!(%url, "disconnected");
        }
        Command::Quit => return Ok(false),
    }
    Ok(true)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
