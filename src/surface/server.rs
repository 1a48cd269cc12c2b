use super::protocol::{SurfaceContent, SurfaceMessage};
use crate::capture::Replacement;
use crate::debugger::Debugger;
use serde_json::{json, Value};
use std::io::{self, BufRead, Write};
use tracing::{debug, warn};

/// Synchronous request/reply server for editor front ends: one JSON
/// message per line on stdin, one reply per line on stdout. Everything
/// runs on the controlling thread.
pub struct SurfaceServer {
    seq: u64,
    debugger: Debugger,
}

impl SurfaceServer {
    pub fn new(debugger: Debugger) -> Self {
        SurfaceServer { seq: 0, debugger }
    }

    fn next_seq(&mut self) -> u64 {
        self.seq += 1;
        self.seq
    }

    fn reply(
        &mut self,
        request_seq: u64,
        success: bool,
        warning: Option<String>,
        body: Option<Value>,
    ) -> SurfaceMessage {
        SurfaceMessage {
            seq: self.next_seq(),
            msg_type: "reply".to_string(),
            content: SurfaceContent::Reply {
                request_seq,
                success,
                warning,
                body,
            },
        }
    }

    /// Handle one decoded message. `None` means the peer disconnected.
    pub fn handle(&mut self, msg: SurfaceMessage) -> Option<SurfaceMessage> {
        let SurfaceContent::Request { command, arguments } = msg.content else {
            warn!("ignoring non-request message");
            return Some(self.reply(msg.seq, false, Some("expected a request".into()), None));
        };
        debug!(seq = msg.seq, %command, "request");
        match command.as_str() {
            "capture" => {
                let text = str_arg(&arguments, "text");
                let cursor = arguments
                    .as_ref()
                    .and_then(|a| a.get("cursor"))
                    .and_then(Value::as_u64)
                    .unwrap_or(0) as usize;
                match self.debugger.capture(&text, cursor) {
                    Ok(replacement) => {
                        let body = replacement_body(&replacement);
                        Some(self.reply(msg.seq, true, None, Some(body)))
                    }
                    Err(err) => Some(self.reply(msg.seq, false, Some(err.to_string()), None)),
                }
            }
            "stacktrace" => {
                let text = str_arg(&arguments, "text");
                match self.debugger.capture_stacktrace(&text) {
                    Ok(replacements) => {
                        let body = json!({
                            "replacements": replacements
                                .iter()
                                .map(replacement_body)
                                .collect::<Vec<_>>(),
                        });
                        Some(self.reply(msg.seq, true, None, Some(body)))
                    }
                    Err(err) => Some(self.reply(msg.seq, false, Some(err.to_string()), None)),
                }
            }
            "eval" => {
                let text = str_arg(&arguments, "text");
                match self.debugger.eval(&text) {
                    Ok(value) => Some(self.reply(
                        msg.seq,
                        true,
                        None,
                        Some(json!({ "value": value.to_string() })),
                    )),
                    Err(err) => Some(self.reply(msg.seq, false, Some(err.to_string()), None)),
                }
            }
            "stashes" => {
                let ids: Vec<String> = self
                    .debugger
                    .store
                    .ids()
                    .iter()
                    .map(|id| id.to_string())
                    .collect();
                Some(self.reply(msg.seq, true, None, Some(json!({ "ids": ids }))))
            }
            "disconnect" => None,
            other => Some(self.reply(
                msg.seq,
                false,
                Some(format!("unknown command `{other}`")),
                None,
            )),
        }
    }

    /// Decode one wire line and produce the encoded reply, or `None` on
    /// disconnect.
    pub fn handle_line(&mut self, line: &str) -> Option<String> {
        let msg: SurfaceMessage = match serde_json::from_str(line) {
            Ok(msg) => msg,
            Err(err) => {
                let reply = self.reply(0, false, Some(format!("malformed message: {err}")), None);
                return serde_json::to_string(&reply).ok();
            }
        };
        let reply = self.handle(msg)?;
        serde_json::to_string(&reply).ok()
    }
}

fn str_arg(arguments: &Option<Value>, key: &str) -> String {
    arguments
        .as_ref()
        .and_then(|a| a.get(key))
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

fn replacement_body(replacement: &Replacement) -> Value {
    json!({
        "replacement": replacement.text,
        "stashId": replacement.stash_id.to_string(),
        "callee": replacement.callee,
    })
}

/// Serve until stdin closes or a disconnect request arrives.
pub fn serve(debugger: Debugger) -> io::Result<()> {
    let mut server = SurfaceServer::new(debugger);
    let stdin = io::stdin();
    let mut stdout = io::stdout();
    for line in stdin.lock().lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        match server.handle_line(&line) {
            Some(reply) => {
                writeln!(stdout, "{reply}")?;
                stdout.flush()?;
            }
            None => break,
        }
    }
    Ok(())
}
