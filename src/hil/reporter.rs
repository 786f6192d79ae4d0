//! Self-contained HTML rendering of a [`ValidationResult`].

use itertools::Itertools;

use crate::hil::validator::{PacketDiff, ValidationResult};

const STYLE: &str = "body{font-family:sans-serif;background:#1a1a1a;color:#eee;}\
.card{background:#2a2a2a;padding:20px;margin:10px;border-radius:8px;}\
.pass{color:#4caf50;}.fail{color:#f44336;}\
table{border-collapse:collapse;}td,th{padding:4px 8px;border-bottom:1px solid #444;text-align:left;}\
code{word-break:break-all;}";

pub fn render(result: &ValidationResult, subject: &str, protocol: &str) -> String {
    let (class, status) = if result.is_match {
        ("pass", "PASSED")
    } else {
        ("fail", "FAILED")
    };

    let mismatches = if result.differences.is_empty() {
        String::new()
    } else {
        format!(
            "<div class='card'><h2>Mismatches ({})</h2><table>\
<tr><th>Step</th><th>Type</th><th>Label</th><th>Expected</th><th>Actual</th></tr>{}</table></div>",
            result.differences.len(),
            result.differences.iter().map(diff_row).join("")
        )
    };

    format!(
        "<!DOCTYPE html><html><head><meta charset=\"utf-8\">\
<title>HIL Validation Report: {subject}</title><style>{style}</style></head><body>\
<h1>HIL Validation Report: {subject}</h1>\
<div class='card'><h2>Protocol: {protocol}</h2>\
<p>Status: <span class='{class}'>{status}</span></p>\
<p>Similarity: {similarity:.2}%</p>\
<p>Recommendation: {recommendation}</p></div>\
{mismatches}</body></html>",
        subject = escape(subject),
        style = STYLE,
        protocol = escape(protocol),
        class = class,
        status = status,
        similarity = result.similarity_score * 100.0,
        recommendation = escape(&result.recommendation),
        mismatches = mismatches,
    )
}

fn diff_row(diff: &PacketDiff) -> String {
    format!(
        "<tr><td>{}</td><td>{}</td><td>{}</td>\
<td><code>{}</code><br/>{} ms</td><td><code>{}</code><br/>{} ms</td></tr>",
        diff.step_index,
        diff.difference_type,
        escape(&diff.label),
        escape(&diff.expected_hex),
        diff.expected_delay_ms,
        escape(&diff.actual_hex),
        diff.actual_delay_ms
    )
}

fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}
