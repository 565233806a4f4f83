use std::time::Duration;

use serde::{Deserialize, Serialize};

/// TCP port the session server accepts response-collection clients on.
pub const LOGIN_PORT: u16 = 7171;

/// Timeout for a single TCP connect attempt.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Connect attempts per connect/reconnect event before giving up.
pub const MAX_CONNECT_ATTEMPTS: u32 = 2;

/// Fixed pause between failed connect attempts.
pub const CONNECT_RETRY_BACKOFF: Duration = Duration::from_millis(100);

/// How often a liveness probe is sent.
pub const HEARTBEAT_PERIOD: Duration = Duration::from_secs(15);

/// Delay before the first liveness probe after connecting.
pub const HEARTBEAT_INITIAL_DELAY: Duration = Duration::from_secs(15);

/// Longest inbound line accepted before the connection is dropped (1 MB).
pub const MAX_LINE_LENGTH: usize = 1024 * 1024;

/// Liveness probe sent by the client.
pub const HEARTBEAT_PROBE: &str = "AreYouStillThere";

/// Liveness acknowledgement sent back by the server.
pub const HEARTBEAT_ACK: &str = "YesImHere";

/// Keyword opening a question for one or more groups.
pub const OPEN_KEYWORD: &str = "Open";

/// Keyword opening a click-pad question (same payload as [`OPEN_KEYWORD`]).
pub const OPEN_CLICK_PAD_KEYWORD: &str = "OpenClickPad";

/// Keyword closing one or more groups.
pub const CLOSE_KEYWORD: &str = "Close";

/// Keyword of the capability announcement.
pub const CAPABILITY_KEYWORD: &str = "IConsume";

/// Widget type: push button. Its label is a countable option.
pub const WIDGET_BUTTON: &str = "B";

/// Widget type: toggle. Its label is a countable option.
pub const WIDGET_TOGGLE: &str = "TOG";

/// Widget type: combo box. Its choices are countable options.
pub const WIDGET_COMBO: &str = "COMBO";

/// The delimiter tokens of the line protocol, outermost first.
///
/// The default set uses two-character escapes prefixed with `` `/ `` so
/// that natural-language question text never collides with them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Delimiters {
    /// Separates top-level fields (keyword, participant, group, ...).
    pub field: String,
    /// Separates the question, consumer and group segments of an Open.
    pub group: String,
    /// Separates list items (groups, consumer keys, answers, widgets).
    pub item: String,
    /// Separates the parts of one item (`name<option>spec`).
    pub option: String,
    /// Separates the choices of a combo widget.
    pub choice: String,
}

impl Default for Delimiters {
    fn default() -> Self {
        Self {
            field: "`/;".into(),
            group: "`/&".into(),
            item: "`/,".into(),
            option: "`/:".into(),
            choice: "`/~".into(),
        }
    }
}

impl Delimiters {
    /// Single-character delimiters (`;`, `&`, `,`, `:`, `~`).
    pub fn plain() -> Self {
        Self {
            field: ";".into(),
            group: "&".into(),
            item: ",".into(),
            option: ":".into(),
            choice: "~".into(),
        }
    }

    /// Joins `parts` with the field separator.
    pub fn join_fields<S: AsRef<str>>(&self, parts: &[S]) -> String {
        join(parts, &self.field)
    }

    /// Joins `parts` with the item separator.
    pub fn join_items<S: AsRef<str>>(&self, parts: &[S]) -> String {
        join(parts, &self.item)
    }

    /// Joins `parts` with the option separator.
    pub fn join_options<S: AsRef<str>>(&self, parts: &[S]) -> String {
        join(parts, &self.option)
    }
}

fn join<S: AsRef<str>>(parts: &[S], sep: &str) -> String {
    let mut out = String::new();
    for (i, part) in parts.iter().enumerate() {
        if i > 0 {
            out.push_str(sep);
        }
        out.push_str(part.as_ref());
    }
    out
}
