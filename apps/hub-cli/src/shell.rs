//! Line-oriented operator shell.

use std::sync::Arc;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};

use clickerhub_hub_core::Hub;

const HELP: &str = "\
commands:
  connect <address>   log in to the session server at <address>
  list                list consumer keys and whether they are enabled
  enable <key>        enable a consumer key
  disable <key>       disable a consumer key
  status              show connection state and open groups
  quit                shut the hub down";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Connect(String),
    List,
    Enable(String),
    Disable(String),
    Status,
    Help,
    Quit,
}

impl Command {
    pub fn parse(line: &str) -> Result<Option<Self>, String> {
        let mut words = line.split_whitespace();
        let Some(verb) = words.next() else {
            return Ok(None);
        };
        let arg = words.next().map(str::to_string);
        if words.next().is_some() {
            return Err(format!("too many arguments for '{verb}'"));
        }

        let need = |arg: Option<String>, what: &str| {
            arg.ok_or_else(|| format!("usage: {verb} <{what}>"))
        };
        let command = match verb.to_ascii_lowercase().as_str() {
            "connect" => Self::Connect(need(arg, "address")?),
            "enable" => Self::Enable(need(arg, "key")?),
            "disable" => Self::Disable(need(arg, "key")?),
            "list" | "ls" => Self::List,
            "status" => Self::Status,
            "help" | "?" => Self::Help,
            "quit" | "exit" => Self::Quit,
            other => return Err(format!("unknown command '{other}', try 'help'")),
        };
        Ok(Some(command))
    }
}

/// Runs `command` against `hub` and returns the text to show.
pub async fn execute(hub: &Hub, command: Command) -> String {
    match command {
        Command::Connect(address) => match hub.set_server_address(&address).await {
            Ok(()) => format!("connected to {address}"),
            Err(e) => format!("connect failed: {e}"),
        },
        Command::List => {
            let status = hub.status().await;
            let mut out = Vec::new();
            out.extend(status.available.iter().map(|k| format!("[x] {k}")));
            out.extend(status.disabled.iter().map(|k| format!("[ ] {k}")));
            if out.is_empty() {
                "no consumers registered".into()
            } else {
                out.join("\n")
            }
        }
        Command::Enable(key) => toggle(hub, &key, true).await,
        Command::Disable(key) => toggle(hub, &key, false).await,
        Command::Status => {
            let status = hub.status().await;
            let groups = if status.open_groups.is_empty() {
                "none".to_string()
            } else {
                status.open_groups.join(", ")
            };
            format!(
                "state: {:?}\nserver: {}\nopen groups: {groups}",
                status.state,
                status.address.as_deref().unwrap_or("-"),
            )
        }
        Command::Help => HELP.into(),
        Command::Quit => "bye".into(),
    }
}

async fn toggle(hub: &Hub, key: &str, enabled: bool) -> String {
    match hub.set_consumer_enabled(key, enabled).await {
        Ok(()) if enabled => format!("{key} enabled"),
        Ok(()) => format!("{key} disabled"),
        Err(e) => e.to_string(),
    }
}

/// Reads commands from `input` until `quit` or end of input.
pub async fn run<R, W>(hub: Arc<Hub>, input: R, mut output: W) -> std::io::Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut lines = input.lines();
    while let Some(line) = lines.next_line().await? {
        let reply = match Command::parse(&line) {
            Ok(None) => continue,
            Ok(Some(Command::Quit)) => break,
            Ok(Some(command)) => execute(&hub, command).await,
            Err(e) => e,
        };
        output.write_all(reply.as_bytes()).await?;
        output.write_all(b"\n").await?;
        output.flush().await?;
    }
    Ok(())
}
