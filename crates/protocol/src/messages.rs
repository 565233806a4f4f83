//! Inbound and outbound protocol lines.
//!
//! ```text
//! Open      Open<f>id<f>prompt<f>widgets<g>consumer<i>consumer<g>group<o>spec<i>group
//! Close     Close<f>group<i>group
//! Answer    participant<f>group<f>reserved<f>answer<i>answer
//! Login     admin<i>id
//! Announce  IConsume<f>key<i>key
//! ```
//!
//! `<f>`, `<g>`, `<i>` and `<o>` are the field, group, item and option
//! separators of [`Delimiters`].

use crate::constants::{
    CAPABILITY_KEYWORD, CLOSE_KEYWORD, Delimiters, HEARTBEAT_ACK, HEARTBEAT_PROBE,
    OPEN_CLICK_PAD_KEYWORD, OPEN_KEYWORD,
};
use crate::error::ProtocolError;
use crate::types::{Credentials, QuestionSpec, split_list};

/// A decoded inbound line.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    /// Liveness acknowledgement.
    HeartbeatAck,
    /// Liveness probe initiated by the server.
    HeartbeatProbe,
    Open(OpenQuestion),
    Close(Vec<String>),
    Answer(Answer),
    /// A line with no content.
    Blank,
}

/// Which keyword opened the question.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenKind {
    Open,
    ClickPad,
}

/// A consumer key requested by an Open line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsumerRequest {
    pub key: String,
    pub options: Vec<String>,
}

/// A group an Open line applies to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupTarget {
    pub name: String,
    pub widget_spec: Option<String>,
}

/// A question opened for one or more groups.
#[derive(Debug, Clone, PartialEq)]
pub struct OpenQuestion {
    pub kind: OpenKind,
    pub question: QuestionSpec,
    pub consumers: Vec<ConsumerRequest>,
    pub groups: Vec<GroupTarget>,
}

impl OpenQuestion {
    /// Requested consumer keys, in request order.
    pub fn consumer_keys(&self) -> Vec<String> {
        self.consumers.iter().map(|c| c.key.clone()).collect()
    }
}

/// One participant's submission for a group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Answer {
    pub participant: String,
    pub group: String,
    pub reserved: String,
    /// Answer values indexed by slot.
    pub values: Vec<String>,
}

/// Lines sent by the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    Login(Credentials),
    Capabilities(Vec<String>),
    HeartbeatProbe,
    HeartbeatAck,
}

/// Encodes and decodes protocol lines for one delimiter set.
#[derive(Debug, Clone, Default)]
pub struct Codec {
    delimiters: Delimiters,
}

impl Codec {
    pub fn new(delimiters: Delimiters) -> Self {
        Self { delimiters }
    }

    pub fn delimiters(&self) -> &Delimiters {
        &self.delimiters
    }

    /// Decodes one line (without its terminator).
    pub fn decode(&self, line: &str) -> Result<Inbound, ProtocolError> {
        if line == HEARTBEAT_ACK {
            return Ok(Inbound::HeartbeatAck);
        }
        if line == HEARTBEAT_PROBE {
            return Ok(Inbound::HeartbeatProbe);
        }
        if line.trim().is_empty() {
            return Ok(Inbound::Blank);
        }

        let fields: Vec<&str> = line.split(self.delimiters.field.as_str()).collect();
        let keyword = fields[0];

        if keyword.eq_ignore_ascii_case(OPEN_CLICK_PAD_KEYWORD) {
            self.decode_open(line, OpenKind::ClickPad).map(Inbound::Open)
        } else if keyword.eq_ignore_ascii_case(OPEN_KEYWORD) {
            self.decode_open(line, OpenKind::Open).map(Inbound::Open)
        } else if keyword == CLOSE_KEYWORD {
            self.decode_close(&fields).map(Inbound::Close)
        } else {
            self.decode_answer(&fields).map(Inbound::Answer)
        }
    }

    fn decode_open(&self, line: &str, kind: OpenKind) -> Result<OpenQuestion, ProtocolError> {
        let segments: Vec<&str> = line.split(self.delimiters.group.as_str()).collect();
        // A missing consumer segment leaves question and groups only.
        let (consumer_segment, group_segment) = match segments.as_slice() {
            [_, consumers, groups, ..] => (*consumers, *groups),
            [_, groups] => ("", *groups),
            _ => {
                return Err(ProtocolError::MissingSegment {
                    message: "open",
                    expected: 2,
                    found: segments.len(),
                });
            }
        };

        let consumers = split_list(consumer_segment, &self.delimiters.item)
            .into_iter()
            .filter_map(|item| {
                let mut parts = item.split(self.delimiters.option.as_str());
                let key = parts.next()?.trim().to_string();
                (!key.is_empty()).then(|| ConsumerRequest {
                    key,
                    options: parts.map(str::to_string).collect(),
                })
            })
            .collect();

        let groups: Vec<GroupTarget> = split_list(group_segment, &self.delimiters.item)
            .into_iter()
            .filter_map(|item| {
                let (name, spec) = match item.split_once(self.delimiters.option.as_str()) {
                    Some((name, spec)) => (name, Some(spec.to_string())),
                    None => (item.as_str(), None),
                };
                let name = name.trim();
                (!name.is_empty()).then(|| GroupTarget {
                    name: name.to_string(),
                    widget_spec: spec,
                })
            })
            .collect();
        if groups.is_empty() {
            return Err(ProtocolError::NoGroups { message: "open" });
        }

        Ok(OpenQuestion {
            kind,
            question: QuestionSpec::parse(line, segments[0], &self.delimiters),
            consumers,
            groups,
        })
    }

    fn decode_close(&self, fields: &[&str]) -> Result<Vec<String>, ProtocolError> {
        let payload = fields.get(1).ok_or(ProtocolError::MissingSegment {
            message: "close",
            expected: 2,
            found: fields.len(),
        })?;
        let groups = split_list(payload, &self.delimiters.item);
        if groups.is_empty() {
            return Err(ProtocolError::NoGroups { message: "close" });
        }
        Ok(groups)
    }

    fn decode_answer(&self, fields: &[&str]) -> Result<Answer, ProtocolError> {
        let [participant, group, reserved, values, ..] = fields else {
            return Err(ProtocolError::MissingSegment {
                message: "answer",
                expected: 4,
                found: fields.len(),
            });
        };
        Ok(Answer {
            participant: participant.to_string(),
            group: group.to_string(),
            reserved: reserved.to_string(),
            values: values
                .split(self.delimiters.item.as_str())
                .map(str::to_string)
                .collect(),
        })
    }

    /// Encodes one outbound line (without its terminator).
    pub fn encode(&self, msg: &Outbound) -> String {
        match msg {
            Outbound::Login(creds) => self.delimiters.join_items(&[&creds.admin, &creds.id]),
            Outbound::Capabilities(keys) => format!(
                "{CAPABILITY_KEYWORD}{}{}",
                self.delimiters.field,
                self.delimiters.join_items(keys.as_slice())
            ),
            Outbound::HeartbeatProbe => HEARTBEAT_PROBE.to_string(),
            Outbound::HeartbeatAck => HEARTBEAT_ACK.to_string(),
        }
    }
}
