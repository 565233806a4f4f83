use std::fmt;
use std::str::FromStr;

use crate::constants::{Delimiters, WIDGET_BUTTON, WIDGET_COMBO, WIDGET_TOGGLE};
use crate::error::ProtocolError;

/// Identifies this client to the session server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    /// Administrator (session owner) to attach to.
    pub admin: String,
    /// Identifier this client is known by.
    pub id: String,
}

impl Credentials {
    pub fn new(admin: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            admin: admin.into(),
            id: id.into(),
        }
    }

    /// Parses the `admin<item>id` form used by older launchers.
    pub fn parse(s: &str, delimiters: &Delimiters) -> Result<Self, ProtocolError> {
        let mut parts = s.split(delimiters.item.as_str());
        match (parts.next(), parts.next(), parts.next()) {
            (Some(admin), Some(id), None) if !admin.is_empty() && !id.is_empty() => {
                Ok(Self::new(admin, id))
            }
            _ => Err(ProtocolError::MalformedCredentials(s.to_string())),
        }
    }
}

/// How a consumer wants a group's answers reduced before delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ConsumerKind {
    /// Raw pass-through of the latest submitter's answers.
    All,
    /// Tally per distinct answer value.
    Count,
    /// Numeric mean per answer slot.
    Average,
}

impl ConsumerKind {
    /// Name used in consumer declarations.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::All => "All",
            Self::Count => "Count",
            Self::Average => "Avg",
        }
    }
}

impl fmt::Display for ConsumerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ConsumerKind {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("all") {
            Ok(Self::All)
        } else if s.eq_ignore_ascii_case("count") {
            Ok(Self::Count)
        } else if s.eq_ignore_ascii_case("avg") || s.eq_ignore_ascii_case("average") {
            Ok(Self::Average)
        } else {
            Err(ProtocolError::UnknownConsumerKind(s.to_string()))
        }
    }
}

/// What a consumer plugin declares about itself at registration.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConsumerDescriptor {
    /// Key announced to the server and referenced by Open lines.
    pub key: String,
    pub kind: ConsumerKind,
    /// Kind-specific parameters. For [`ConsumerKind::Average`] the first
    /// parameter is the number of slots to average.
    pub params: Vec<String>,
}

impl ConsumerDescriptor {
    pub fn new(key: impl Into<String>, kind: ConsumerKind) -> Self {
        Self {
            key: key.into(),
            kind,
            params: Vec::new(),
        }
    }

    /// Adds a kind-specific parameter.
    pub fn with_param(mut self, param: impl Into<String>) -> Self {
        self.params.push(param.into());
        self
    }

    /// Slot limit for average consumers, if one was declared.
    pub fn slot_limit(&self) -> Option<usize> {
        if self.kind != ConsumerKind::Average {
            return None;
        }
        self.params.first().and_then(|p| p.trim().parse().ok())
    }

    /// Parses a `key<option>kind[<option>param...]` declaration string.
    pub fn parse_declaration(s: &str, delimiters: &Delimiters) -> Result<Self, ProtocolError> {
        let mut parts = s.split(delimiters.option.as_str());
        let key = parts.next().unwrap_or_default().trim();
        if key.is_empty() {
            return Err(ProtocolError::MalformedDeclaration(s.to_string()));
        }
        let kind = parts
            .next()
            .ok_or_else(|| ProtocolError::MalformedDeclaration(s.to_string()))?
            .parse()?;
        Ok(Self {
            key: key.to_string(),
            kind,
            params: parts.map(str::to_string).collect(),
        })
    }

    /// Formats the descriptor back into its declaration string.
    pub fn to_declaration(&self, delimiters: &Delimiters) -> String {
        let mut parts = vec![self.key.as_str(), self.kind.as_str()];
        parts.extend(self.params.iter().map(String::as_str));
        delimiters.join_options(parts.as_slice())
    }
}

/// One input widget of a question.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Widget {
    Button { label: String },
    Toggle { label: String },
    Combo { label: String, choices: Vec<String> },
    /// A widget type this client does not know; kept verbatim.
    Other { kind: String, parts: Vec<String> },
}

impl Widget {
    fn parse(item: &str, delimiters: &Delimiters) -> Self {
        let mut parts = item.split(delimiters.option.as_str()).map(str::to_string);
        let kind = parts.next().unwrap_or_default();
        let label = parts.next().unwrap_or_default();
        match kind.as_str() {
            WIDGET_BUTTON => Self::Button { label },
            WIDGET_TOGGLE => Self::Toggle { label },
            WIDGET_COMBO => {
                let choices = parts
                    .next()
                    .map(|c| split_list(&c, &delimiters.choice))
                    .unwrap_or_default();
                Self::Combo { label, choices }
            }
            _ => {
                let mut rest = vec![label];
                rest.extend(parts);
                Self::Other { kind, parts: rest }
            }
        }
    }

    /// Answer values this widget can produce that should be tallied.
    pub fn options(&self) -> Vec<&str> {
        match self {
            Self::Button { label } | Self::Toggle { label } => vec![label.as_str()],
            Self::Combo { choices, .. } => choices.iter().map(String::as_str).collect(),
            Self::Other { .. } => Vec::new(),
        }
    }
}

/// The question half of an Open line.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct QuestionSpec {
    /// The full Open line as received; handed to consumers as context.
    pub raw: String,
    pub id: String,
    pub prompt: String,
    pub widgets: Vec<Widget>,
    /// Fields after the widget list, uninterpreted.
    pub extra: Vec<String>,
}

impl QuestionSpec {
    /// Parses the question segment `keyword<f>id<f>prompt<f>widgets[<f>...]`.
    pub fn parse(raw: &str, segment: &str, delimiters: &Delimiters) -> Self {
        let mut fields = segment.split(delimiters.field.as_str()).skip(1);
        let id = fields.next().unwrap_or_default().to_string();
        let prompt = fields.next().unwrap_or_default().to_string();
        let widgets = fields
            .next()
            .map(|w| {
                split_list(w, &delimiters.item)
                    .iter()
                    .map(|item| Widget::parse(item, delimiters))
                    .collect()
            })
            .unwrap_or_default();
        Self {
            raw: raw.to_string(),
            id,
            prompt,
            widgets,
            extra: fields.map(str::to_string).collect(),
        }
    }

    /// Every countable option across all widgets, in widget order, without
    /// duplicates.
    pub fn enumerable_options(&self) -> Vec<String> {
        let mut out: Vec<String> = Vec::new();
        for option in self.widgets.iter().flat_map(Widget::options) {
            if !option.is_empty() && !out.iter().any(|o| o == option) {
                out.push(option.to_string());
            }
        }
        out
    }
}

/// Splits a list, dropping empty items.
pub(crate) fn split_list(s: &str, sep: &str) -> Vec<String> {
    s.split(sep)
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}
