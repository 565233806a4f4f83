fn main() {
    println!("Run `cargo test -p wire-compat` to execute wire compatibility tests.");
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::fs;
    use std::path::PathBuf;

    use serde::Deserialize;

    use clickerhub_hub_aggregation::{AggregationResult, GroupAnswers, reduce};
    use clickerhub_protocol::{
        Codec, ConsumerDescriptor, Credentials, Delimiters, Inbound, OpenKind, Outbound,
        QuestionSpec,
    };

    /// Returns the path to the fixtures directory.
    fn fixtures_dir() -> PathBuf {
        PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("fixtures")
    }

    /// Loads and deserializes a fixture file.
    fn load_fixture<T: serde::de::DeserializeOwned>(name: &str) -> T {
        let path = fixtures_dir().join(name);
        let data = fs::read_to_string(&path)
            .unwrap_or_else(|e| panic!("failed to read fixture {}: {e}", path.display()));
        serde_json::from_str(&data)
            .unwrap_or_else(|e| panic!("failed to parse fixture {}: {e}", path.display()))
    }

    fn codec(set: &str) -> Codec {
        match set {
            "legacy" => Codec::default(),
            "plain" => Codec::new(Delimiters::plain()),
            other => panic!("unknown delimiter set {other}"),
        }
    }

    #[derive(Deserialize)]
    struct LineCase {
        name: String,
        delimiters: String,
        line: String,
        expect: Expected,
    }

    #[derive(Deserialize)]
    #[serde(tag = "kind", rename_all = "snake_case")]
    enum Expected {
        Open {
            click_pad: bool,
            question: String,
            prompt: String,
            options: Vec<String>,
            consumers: Vec<String>,
            groups: Vec<String>,
        },
        Close {
            groups: Vec<String>,
        },
        Answer {
            participant: String,
            group: String,
            values: Vec<String>,
        },
        Probe,
        Ack,
        Blank,
        Error,
    }

    #[test]
    fn fixture_inbound_lines() {
        let cases: Vec<LineCase> = load_fixture("lines.json");
        assert!(!cases.is_empty());

        for case in cases {
            let name = case.name.as_str();
            let decoded = codec(&case.delimiters).decode(&case.line);
            match (case.expect, decoded) {
                (
                    Expected::Open {
                        click_pad,
                        question,
                        prompt,
                        options,
                        consumers,
                        groups,
                    },
                    Ok(Inbound::Open(open)),
                ) => {
                    let kind = if click_pad {
                        OpenKind::ClickPad
                    } else {
                        OpenKind::Open
                    };
                    assert_eq!(open.kind, kind, "{name}");
                    assert_eq!(open.question.id, question, "{name}");
                    assert_eq!(open.question.prompt, prompt, "{name}");
                    assert_eq!(open.question.raw, case.line, "{name}");
                    assert_eq!(open.question.enumerable_options(), options, "{name}");
                    assert_eq!(open.consumer_keys(), consumers, "{name}");
                    let names: Vec<String> = open.groups.into_iter().map(|g| g.name).collect();
                    assert_eq!(names, groups, "{name}");
                }
                (Expected::Close { groups }, Ok(Inbound::Close(got))) => {
                    assert_eq!(got, groups, "{name}");
                }
                (
                    Expected::Answer {
                        participant,
                        group,
                        values,
                    },
                    Ok(Inbound::Answer(answer)),
                ) => {
                    assert_eq!(answer.participant, participant, "{name}");
                    assert_eq!(answer.group, group, "{name}");
                    assert_eq!(answer.values, values, "{name}");
                }
                (Expected::Probe, Ok(Inbound::HeartbeatProbe))
                | (Expected::Ack, Ok(Inbound::HeartbeatAck))
                | (Expected::Blank, Ok(Inbound::Blank))
                | (Expected::Error, Err(_)) => {}
                (_, got) => panic!("{name}: unexpected decode result {got:?}"),
            }
        }
    }

    #[derive(Deserialize)]
    struct HandshakeCase {
        delimiters: String,
        admin: String,
        id: String,
        consumers: Vec<String>,
        login: String,
        announce: String,
    }

    #[test]
    fn fixture_handshake_lines() {
        let cases: Vec<HandshakeCase> = load_fixture("handshake.json");
        for case in cases {
            let codec = codec(&case.delimiters);
            let credentials = Credentials::new(&case.admin, &case.id);

            let login = codec.encode(&Outbound::Login(credentials.clone()));
            assert_eq!(login, case.login);
            assert_eq!(
                Credentials::parse(&login, codec.delimiters()).unwrap(),
                credentials
            );
            assert_eq!(
                codec.encode(&Outbound::Capabilities(case.consumers)),
                case.announce
            );
        }
    }

    #[derive(Deserialize)]
    struct SessionCase {
        name: String,
        consumer: String,
        lines: Vec<String>,
        expect: ExpectedResult,
    }

    #[derive(Debug, Deserialize)]
    enum ExpectedResult {
        Count(BTreeMap<String, u32>),
        Average(BTreeMap<usize, f64>),
    }

    /// Replays a session and reduces the final answer set for one consumer.
    #[test]
    fn fixture_sessions_reduce_to_expected_results() {
        let cases: Vec<SessionCase> = load_fixture("sessions.json");
        let codec = Codec::new(Delimiters::plain());

        for case in cases {
            let descriptor =
                ConsumerDescriptor::parse_declaration(&case.consumer, codec.delimiters())
                    .unwrap_or_else(|e| panic!("{}: {e}", case.name));
            let mut question = QuestionSpec::default();
            let mut answers = GroupAnswers::new();

            for line in &case.lines {
                match codec.decode(line) {
                    Ok(Inbound::Open(open)) => {
                        question = open.question;
                        answers = GroupAnswers::new();
                    }
                    Ok(Inbound::Answer(answer)) => {
                        answers.record(&answer.participant, &answer.values);
                    }
                    other => panic!("{}: unexpected line {line}: {other:?}", case.name),
                }
            }

            let result = reduce(&descriptor, &answers, &question);
            let expected = match case.expect {
                ExpectedResult::Count(counts) => AggregationResult::Count(counts),
                ExpectedResult::Average(means) => AggregationResult::Average(means),
            };
            assert_eq!(result, Some(expected), "{}", case.name);
        }
    }
}
