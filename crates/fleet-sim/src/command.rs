//! Interpretation of exec commands inside simulated workers.
//!
//! Only a tiny shell subset is understood: `sleep N` keeps the execution
//! running for N seconds (fractions allowed), `echo TEXT` writes a line to
//! stdout, and `echo TEXT >&2` writes it to stderr. Statements may be chained
//! with `;` or `&&`, either as plain argv or wrapped in `sh -c "..."`.
//! Anything else finishes immediately without output.

use std::time::Duration;

use bytes::BytesMut;

use fleet_stream::{Channel, encode_frame};

/// What a simulated execution does.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SimCommand {
    pub duration: Duration,
    pub output: Vec<(Channel, String)>,
}

impl SimCommand {
    pub fn parse(cmd: &[String]) -> Self {
        let script = match cmd {
            [shell, flag, script, ..] if is_shell(shell) && flag == "-c" => script.clone(),
            _ => cmd.join(" "),
        };

        let mut parsed = SimCommand::default();
        for statement in script.split([';', '\n']).flat_map(|s| s.split("&&")) {
            let statement = statement.trim();
            if let Some(arg) = statement.strip_prefix("sleep ") {
                if let Ok(secs) = arg.trim().parse::<f64>()
                    && secs.is_finite()
                    && secs >= 0.0
                {
                    let secs = Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX);
                    parsed.duration = parsed.duration.saturating_add(secs);
                }
            } else if let Some(text) = statement.strip_prefix("echo") {
                let text = text.trim();
                let (channel, text) = match text.strip_suffix(">&2") {
                    Some(rest) => (Channel::Stderr, rest.trim()),
                    None => (Channel::Stdout, text),
                };
                let text = text.trim_matches(|c| c == '"' || c == '\'');
                parsed.output.push((channel, format!("{text}\n")));
            }
        }
        parsed
    }

    /// The command's output in the multiplexed frame format.
    pub fn framed_output(&self) -> BytesMut {
        let mut buf = BytesMut::new();
        for (channel, text) in &self.output {
            buf.extend_from_slice(&encode_frame(*channel, text.as_bytes()));
        }
        buf
    }
}

fn is_shell(program: &str) -> bool {
    matches!(program, "sh" | "bash" | "/bin/sh" | "/bin/bash")
}
