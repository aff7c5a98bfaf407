//! Task documents written by the lead for each worker.
//!
//! The body is free-form. An optional header fenced by `---` lines carries
//! `key: value` metadata; only `branch` and `on_complete` mean anything here.

use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;

use crate::hlog_trace;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskDoc {
    pub branch: Option<String>,
    pub on_complete: Option<String>,
    pub body: String,
}

static HEADER_LINE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*([A-Za-z_][A-Za-z0-9_-]*)\s*:\s*(.*?)\s*$").unwrap());

impl TaskDoc {
    pub fn parse(text: &str) -> Self {
        let mut doc = TaskDoc::default();
        let mut lines = text.lines();

        let first = lines.clone().next().map(str::trim);
        if first != Some("---") {
            doc.body = text.to_string();
            return doc;
        }
        lines.next();

        let mut header = Vec::new();
        let mut closed = false;
        for line in lines.by_ref() {
            if line.trim() == "---" {
                closed = true;
                break;
            }
            header.push(line);
        }
        // An unterminated fence is just text.
        if !closed {
            doc.body = text.to_string();
            return doc;
        }

        for line in header {
            let Some(caps) = HEADER_LINE_RE.captures(line) else {
                continue;
            };
            let value = caps[2].trim_matches(|c| c == '"' || c == '\'').to_string();
            if value.is_empty() {
                continue;
            }
            match &caps[1] {
                "branch" => doc.branch = Some(value),
                "on_complete" => doc.on_complete = Some(value),
                other => hlog_trace!("Ignoring task header key '{}'", other),
            }
        }
        doc.body = lines.collect::<Vec<_>>().join("\n").trim_start().to_string();
        doc
    }

    /// Read and parse a task document. Missing or unreadable files are `None`.
    pub fn load(path: &Path) -> Option<Self> {
        let text = std::fs::read_to_string(path).ok()?;
        Some(Self::parse(&text))
    }
}
