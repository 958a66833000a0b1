//! Rendering of turns and summaries as text, markdown, JSON, or HTML.
//!
//! Summaries and turns are merged into one chronological stream: a summary sits
//! at the start timestamp of the range it covers and sorts ahead of a turn with
//! the same timestamp. Only [`OutputFormat::Json`] round-trips (see
//! [`ConversationFormatter::parse_json`]); the other formats are for display.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;

use super::types::{ConversationSummary, ConversationTurn, Metadata};
use crate::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputFormat {
    #[default]
    Text,
    Markdown,
    Json,
    Html,
}

impl OutputFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Markdown => "markdown",
            Self::Json => "json",
            Self::Html => "html",
        }
    }
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "text" => Ok(Self::Text),
            "markdown" | "md" => Ok(Self::Markdown),
            "json" => Ok(Self::Json),
            "html" => Ok(Self::Html),
            _ => Err(format!("unknown output format: {s}")),
        }
    }
}

/// Rendering switches.
#[derive(Debug, Clone)]
pub struct FormatOptions {
    pub format: OutputFormat,
    pub include_timestamps: bool,
    pub include_metadata: bool,
    pub include_summaries: bool,
    /// Display name of the assistant participant. Defaults to "Assistant".
    pub anchor_name: Option<String>,
    /// User id of the assistant participant, for turns it authored itself.
    pub anchor_id: Option<String>,
    pub highlight_anchor: bool,
}

impl Default for FormatOptions {
    fn default() -> Self {
        Self {
            format: OutputFormat::Text,
            include_timestamps: false,
            include_metadata: false,
            include_summaries: true,
            anchor_name: None,
            anchor_id: None,
            highlight_anchor: false,
        }
    }
}

impl FormatOptions {
    pub fn with_format(format: OutputFormat) -> Self {
        Self {
            format,
            ..Default::default()
        }
    }
}

/// The lossless JSON shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transcript {
    pub turns: Vec<ConversationTurn>,
    #[serde(default)]
    pub summaries: Vec<ConversationSummary>,
}

enum Entry<'a> {
    Summary(&'a ConversationSummary),
    Turn(&'a ConversationTurn),
}

impl Entry<'_> {
    fn sort_key(&self) -> (DateTime<Utc>, u8) {
        match self {
            Entry::Summary(s) => (s.start_timestamp, 0),
            Entry::Turn(t) => (t.timestamp, 1),
        }
    }
}

/// One rendered line of dialogue.
struct Utterance<'a> {
    speaker: &'a str,
    text: &'a str,
    is_anchor: bool,
}

#[derive(Debug, Clone, Default)]
pub struct ConversationFormatter;

impl ConversationFormatter {
    pub fn new() -> Self {
        Self
    }

    pub fn format(
        &self,
        turns: &[ConversationTurn],
        summaries: &[ConversationSummary],
        options: &FormatOptions,
    ) -> Result<String> {
        let summaries: &[ConversationSummary] = if options.include_summaries {
            summaries
        } else {
            &[]
        };

        Ok(match options.format {
            OutputFormat::Json => serde_json::to_string_pretty(&Transcript {
                turns: turns.to_vec(),
                summaries: summaries.to_vec(),
            })?,
            OutputFormat::Text => render_text(&merge(turns, summaries), options),
            OutputFormat::Markdown => render_markdown(&merge(turns, summaries), options),
            OutputFormat::Html => render_html(&merge(turns, summaries), options),
        })
    }

    /// Inverse of `format` with [`OutputFormat::Json`].
    pub fn parse_json(&self, json: &str) -> Result<Transcript> {
        Ok(serde_json::from_str(json)?)
    }
}

/// Stable sort keeps caller order among entries with equal keys.
fn merge<'a>(
    turns: &'a [ConversationTurn],
    summaries: &'a [ConversationSummary],
) -> Vec<Entry<'a>> {
    let mut entries: Vec<Entry<'a>> = summaries
        .iter()
        .map(Entry::Summary)
        .chain(turns.iter().map(Entry::Turn))
        .collect();
    entries.sort_by_key(Entry::sort_key);
    entries
}

fn utterances<'a>(turn: &'a ConversationTurn, options: &'a FormatOptions) -> Vec<Utterance<'a>> {
    let anchor = options.anchor_name.as_deref().unwrap_or("Assistant");
    let authored_by_anchor = match (&options.anchor_id, &turn.user_id) {
        (Some(anchor_id), Some(user_id)) => anchor_id == user_id,
        _ => false,
    } || matches!(
        (&options.anchor_name, &turn.user_name),
        (Some(name), Some(user_name)) if name == user_name
    );

    let speaker = if authored_by_anchor {
        anchor
    } else {
        turn.user_name
            .as_deref()
            .or(turn.user_id.as_deref())
            .unwrap_or("User")
    };

    let mut out = Vec::with_capacity(2);
    if !turn.query.is_empty() {
        out.push(Utterance {
            speaker,
            text: &turn.query,
            is_anchor: authored_by_anchor,
        });
    }
    if !turn.response_text().is_empty() {
        out.push(Utterance {
            speaker: anchor,
            text: turn.response_text(),
            is_anchor: true,
        });
    }
    out
}

fn summary_range(summary: &ConversationSummary) -> String {
    format!(
        "turns {}-{}, {} turns",
        summary.start_turn_index + 1,
        summary.end_turn_index + 1,
        summary.turn_count
    )
}

fn timestamp(ts: &DateTime<Utc>) -> String {
    ts.format("%Y-%m-%d %H:%M:%S").to_string()
}

fn metadata_json(metadata: &Metadata) -> String {
    serde_json::Value::Object(metadata.clone()).to_string()
}

// ── Text ─────────────────────────────────────────────────────────────────────

fn render_text(entries: &[Entry], options: &FormatOptions) -> String {
    let mut out = String::new();
    for entry in entries {
        match entry {
            Entry::Summary(summary) => {
                let _ = writeln!(out, "--- Summary ({}) ---", summary_range(summary));
                if options.include_timestamps {
                    let _ = writeln!(
                        out,
                        "[{} to {}]",
                        timestamp(&summary.start_timestamp),
                        timestamp(&summary.end_timestamp)
                    );
                }
                let _ = writeln!(out, "{}", summary.content);
                if options.include_metadata && !summary.metadata.is_empty() {
                    let _ = writeln!(out, "metadata: {}", metadata_json(&summary.metadata));
                }
            }
            Entry::Turn(turn) => {
                for utterance in utterances(turn, options) {
                    if options.include_timestamps {
                        let _ = write!(out, "[{}] ", timestamp(&turn.timestamp));
                    }
                    if options.highlight_anchor && utterance.is_anchor {
                        let _ = writeln!(out, "* {}: {}", utterance.speaker, utterance.text);
                    } else {
                        let _ = writeln!(out, "{}: {}", utterance.speaker, utterance.text);
                    }
                }
                if options.include_metadata && !turn.metadata.is_empty() {
                    let _ = writeln!(out, "metadata: {}", metadata_json(&turn.metadata));
                }
            }
        }
        out.push('\n');
    }
    out.trim_end().to_string()
}

// ── Markdown ─────────────────────────────────────────────────────────────────

fn render_markdown(entries: &[Entry], options: &FormatOptions) -> String {
    let mut out = String::new();
    for entry in entries {
        match entry {
            Entry::Summary(summary) => {
                let _ = writeln!(out, "### Summary ({})", summary_range(summary));
                if options.include_timestamps {
                    let _ = writeln!(
                        out,
                        "_{} to {}_",
                        timestamp(&summary.start_timestamp),
                        timestamp(&summary.end_timestamp)
                    );
                }
                out.push('\n');
                for line in summary.content.lines() {
                    let _ = writeln!(out, "> {line}");
                }
                if options.include_metadata && !summary.metadata.is_empty() {
                    let _ = writeln!(out, "\n`{}`", metadata_json(&summary.metadata));
                }
            }
            Entry::Turn(turn) => {
                for utterance in utterances(turn, options) {
                    let speaker = if options.highlight_anchor && utterance.is_anchor {
                        format!("**{}** (anchor)", utterance.speaker)
                    } else {
                        format!("**{}**", utterance.speaker)
                    };
                    if options.include_timestamps {
                        let _ = writeln!(
                            out,
                            "{speaker} _{}_: {}\n",
                            timestamp(&turn.timestamp),
                            utterance.text
                        );
                    } else {
                        let _ = writeln!(out, "{speaker}: {}\n", utterance.text);
                    }
                }
                if options.include_metadata && !turn.metadata.is_empty() {
                    let _ = writeln!(out, "`{}`", metadata_json(&turn.metadata));
                }
            }
        }
        out.push('\n');
    }
    out.trim_end().to_string()
}

// ── HTML ─────────────────────────────────────────────────────────────────────

fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

fn render_html(entries: &[Entry], options: &FormatOptions) -> String {
    let mut out = String::from("<div class=\"conversation\">\n");
    for entry in entries {
        match entry {
            Entry::Summary(summary) => {
                let _ = writeln!(
                    out,
                    "  <div class=\"summary\" data-summary-id=\"{}\">",
                    escape_html(&summary.id)
                );
                let _ = writeln!(
                    out,
                    "    <div class=\"summary-header\">Summary ({})</div>",
                    summary_range(summary)
                );
                if options.include_timestamps {
                    let _ = writeln!(
                        out,
                        "    <time>{} to {}</time>",
                        timestamp(&summary.start_timestamp),
                        timestamp(&summary.end_timestamp)
                    );
                }
                let _ = writeln!(out, "    <p>{}</p>", escape_html(&summary.content));
                if options.include_metadata && !summary.metadata.is_empty() {
                    let _ = writeln!(
                        out,
                        "    <pre class=\"metadata\">{}</pre>",
                        escape_html(&metadata_json(&summary.metadata))
                    );
                }
                out.push_str("  </div>\n");
            }
            Entry::Turn(turn) => {
                let _ = writeln!(
                    out,
                    "  <div class=\"turn\" data-turn-id=\"{}\">",
                    escape_html(&turn.id)
                );
                if options.include_timestamps {
                    let _ = writeln!(out, "    <time>{}</time>", timestamp(&turn.timestamp));
                }
                for utterance in utterances(turn, options) {
                    let class = if options.highlight_anchor && utterance.is_anchor {
                        "message anchor"
                    } else {
                        "message"
                    };
                    let _ = writeln!(
                        out,
                        "    <div class=\"{class}\"><span class=\"speaker\">{}</span> {}</div>",
                        escape_html(utterance.speaker),
                        escape_html(utterance.text)
                    );
                }
                if options.include_metadata && !turn.metadata.is_empty() {
                    let _ = writeln!(
                        out,
                        "    <pre class=\"metadata\">{}</pre>",
                        escape_html(&metadata_json(&turn.metadata))
                    );
                }
                out.push_str("  </div>\n");
            }
        }
    }
    out.push_str("</div>");
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn turn(id: &str, minute: u32, user: Option<&str>) -> ConversationTurn {
        ConversationTurn {
            id: id.into(),
            conversation_id: "c1".into(),
            timestamp: Utc.with_ymd_and_hms(2025, 6, 1, 12, minute, 0).unwrap(),
            query: format!("query {id}"),
            response: Some(format!("reply {id}")),
            user_id: user.map(|u| format!("@{u}:example.org")),
            user_name: user.map(str::to_string),
            metadata: Metadata::new(),
        }
    }

    #[test]
    fn output_format_parses() {
        assert_eq!("md".parse::<OutputFormat>().unwrap(), OutputFormat::Markdown);
        assert_eq!("html".parse::<OutputFormat>().unwrap(), OutputFormat::Html);
        assert!("pdf".parse::<OutputFormat>().is_err());
    }

    #[test]
    fn html_escapes_content() {
        let mut t = turn("t1", 0, Some("mallory"));
        t.query = "<script>alert('x')</script>".into();
        let html = ConversationFormatter::new()
            .format(&[t], &[], &FormatOptions::with_format(OutputFormat::Html))
            .unwrap();
        assert!(html.contains("&lt;script&gt;alert(&#39;x&#39;)&lt;/script&gt;"));
        assert!(!html.contains("<script>"));
    }

    #[test]
    fn anchor_highlighting_marks_assistant_lines() {
        let options = FormatOptions {
            format: OutputFormat::Markdown,
            anchor_name: Some("Brain".into()),
            highlight_anchor: true,
            ..Default::default()
        };
        let out = ConversationFormatter::new()
            .format(&[turn("t1", 0, Some("alice"))], &[], &options)
            .unwrap();
        assert!(out.contains("**alice**: query t1"));
        assert!(out.contains("**Brain** (anchor): reply t1"));
    }

    #[test]
    fn turns_authored_by_anchor_use_anchor_name() {
        let options = FormatOptions {
            anchor_id: Some("@brain:example.org".into()),
            anchor_name: Some("Brain".into()),
            highlight_anchor: true,
            ..Default::default()
        };
        let out = ConversationFormatter::new()
            .format(&[turn("t1", 0, Some("brain"))], &[], &options)
            .unwrap();
        assert!(out.starts_with("* Brain: query t1"));
    }

    #[test]
    fn summaries_can_be_excluded() {
        let summary = ConversationSummary {
            id: "s1".into(),
            conversation_id: "c1".into(),
            content: "Earlier chat".into(),
            start_turn_index: 0,
            end_turn_index: 0,
            start_turn_id: "t0".into(),
            end_turn_id: "t0".into(),
            start_timestamp: Utc.with_ymd_and_hms(2025, 6, 1, 11, 0, 0).unwrap(),
            end_timestamp: Utc.with_ymd_and_hms(2025, 6, 1, 11, 0, 0).unwrap(),
            turn_count: 1,
            metadata: Metadata::new(),
            created_at: Utc::now(),
        };
        let options = FormatOptions {
            include_summaries: false,
            ..Default::default()
        };
        let out = ConversationFormatter::new()
            .format(&[turn("t1", 0, None)], &[summary], &options)
            .unwrap();
        assert!(!out.contains("Earlier chat"));
        assert_eq!(out, "User: query t1\nAssistant: reply t1");
    }
}
