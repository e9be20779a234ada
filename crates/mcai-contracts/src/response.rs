use std::sync::LazyLock;

use regex::Regex;

use crate::prompts::FEEDBACK_MARKER;

static RE_FENCED_BLOCK: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"(?s)```[a-z]*\n(.*?)```").ok());

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DecomposedResponse {
    pub feedback_lines: Vec<String>,
    pub code_body: String,
}

/// Splits provider text into `FEEDBACK:` notes and a sanitized code body.
///
/// Notes keep their original order and lose the marker. The body is the
/// first fenced block when the reply has one, otherwise every unmarked line.
pub fn decompose(raw: &str) -> DecomposedResponse {
    let normalized = raw.replace("\r\n", "\n");
    let mut feedback_lines = Vec::new();
    let mut body_lines = Vec::new();
    for line in normalized.split('\n') {
        match strip_feedback_marker(line.trim()) {
            Some(note) => feedback_lines.push(note),
            None => body_lines.push(line),
        }
    }
    let body = body_lines.join("\n");
    DecomposedResponse {
        feedback_lines,
        code_body: extract_code(body.trim()),
    }
}

fn strip_feedback_marker(trimmed: &str) -> Option<String> {
    let head = trimmed.get(..FEEDBACK_MARKER.len())?;
    if !head.eq_ignore_ascii_case(FEEDBACK_MARKER) {
        return None;
    }
    Some(trimmed[FEEDBACK_MARKER.len()..].trim().to_string())
}

pub fn extract_code(body: &str) -> String {
    let normalized = normalize_text(body);
    let fenced = RE_FENCED_BLOCK
        .as_ref()
        .and_then(|re| re.captures(&normalized))
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string());
    strip_fences(fenced.as_deref().unwrap_or(&normalized))
}

pub fn sanitize(text: &str) -> String {
    strip_fences(&normalize_text(text))
}

fn normalize_text(text: &str) -> String {
    let cleaned: String = text
        .chars()
        .filter_map(|ch| match ch {
            '\u{2018}' | '\u{2019}' => Some('\''),
            '\u{201C}' | '\u{201D}' => Some('"'),
            '\u{200B}'..='\u{200D}' | '\u{FEFF}' => None,
            '\u{00A0}' => Some(' '),
            other => Some(other),
        })
        .collect();
    cleaned
        .replace("\\r\\n", "\n")
        .replace("\\n", "\n")
        .replace("\\t", "\t")
        .replace("\r\n", "\n")
        .replace('\r', "\n")
}

fn strip_fences(text: &str) -> String {
    let mut s = text.trim();
    if s.starts_with("```") {
        if let Some(idx) = s.find('\n') {
            s = &s[idx + 1..];
        }
        let trimmed_end = s.trim_end();
        if let Some(stripped) = trimmed_end.strip_suffix("```") {
            s = stripped;
        }
    }

    // stray fence lines from unterminated or nested blocks; a fence closed
    // mid-line keeps only the text before it
    let kept = s
        .split('\n')
        .filter(|line| !line.trim_start().starts_with("```"))
        .map(|line| line.find("```").map_or(line, |idx| &line[..idx]))
        .collect::<Vec<&str>>()
        .join("\n");

    kept.trim_matches(|ch: char| ch == '`' || ch.is_whitespace())
        .to_string()
}
