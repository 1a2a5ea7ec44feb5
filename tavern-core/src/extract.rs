//! Directive extraction and narrative cleaning.
//!
//! [`extract`] makes one left-to-right pass over the raw narrator text. At
//! each keyword it tries the matching production; a hit becomes an
//! [`ExtractedDirective`] and scanning resumes after its span, a miss leaves
//! the text untouched. Spans therefore never overlap and come out in text
//! order, whatever their kind.

use crate::directive::{production, Directive, DirectiveKind, KEYWORD};
use std::ops::Range;
use tracing::{debug, trace};

/// A directive and the byte range it occupied in the raw text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedDirective {
    pub directive: Directive,
    pub span: Range<usize>,
}

/// Result of scanning one narrator response.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Extraction {
    pub directives: Vec<ExtractedDirective>,
}

impl Extraction {
    pub fn is_empty(&self) -> bool {
        self.directives.is_empty()
    }

    pub fn len(&self) -> usize {
        self.directives.len()
    }

    pub fn kinds(&self) -> Vec<DirectiveKind> {
        self.directives.iter().map(|d| d.directive.kind()).collect()
    }

    /// The raw text carried a grid or distance marker.
    pub fn signals_combat_start(&self) -> bool {
        self.directives.iter().any(|d| d.directive.starts_combat())
    }

    /// The raw text carried a combat-end marker.
    pub fn signals_combat_end(&self) -> bool {
        self.directives
            .iter()
            .any(|d| matches!(d.directive, Directive::CombatEnd))
    }
}

/// Find every directive in `text`, in order of appearance.
pub fn extract(text: &str) -> Extraction {
    let mut directives = Vec::new();
    let mut cursor = 0;

    while let Some(caps) = KEYWORD.captures_at(text, cursor) {
        let Some(whole) = caps.get(0) else { break };
        let start = whole.start();
        let keyword = caps.get(1).or_else(|| caps.get(2)).map(|m| m.as_str());

        let parsed = keyword
            .and_then(DirectiveKind::from_keyword)
            .and_then(production)
            .and_then(|p| p.parse(&text[start..]));

        match parsed {
            Some((directive, len)) => {
                trace!(kind = %directive.kind(), start, len, "Matched directive");
                directives.push(ExtractedDirective {
                    directive,
                    span: start..start + len,
                });
                cursor = start + len;
            }
            None => {
                trace!(keyword = ?keyword, start, "Keyword without a valid directive");
                cursor = whole.end();
            }
        }
    }

    debug!(count = directives.len(), "Extracted directives");
    Extraction { directives }
}

/// Remove every extracted span from `text`, substituting each directive's
/// replacement, and tidy the whitespace the removals leave behind.
///
/// Blanks directly before a removed marker are dropped when the marker was
/// followed by whitespace, punctuation or the end of the text. A line that becomes empty
/// because of a removal is dropped. The result is trimmed.
pub fn clean(text: &str, extraction: &Extraction) -> String {
    let mut out = String::with_capacity(text.len());
    let mut removals = Vec::new();
    let mut cursor = 0;

    for extracted in &extraction.directives {
        let span = &extracted.span;
        out.push_str(&text[cursor..span.start]);

        let replacement = extracted.directive.replacement();
        if replacement.is_empty() {
            let next_closes = text[span.end..]
                .chars()
                .next()
                .map_or(true, |c| c.is_whitespace() || c.is_ascii_punctuation());
            if next_closes {
                let kept = out.trim_end_matches([' ', '\t']).len();
                out.truncate(kept);
            }
            removals.push(out.len());
        } else {
            out.push_str(replacement);
        }
        cursor = span.end;
    }
    out.push_str(&text[cursor..]);

    drop_emptied_lines(&out, &removals).trim().to_string()
}

fn drop_emptied_lines(text: &str, removals: &[usize]) -> String {
    if removals.is_empty() {
        return text.to_string();
    }

    let mut kept = Vec::new();
    let mut start = 0;
    for line in text.split('\n') {
        let end = start + line.len();
        let emptied = removals.iter().any(|r| (start..=end).contains(r));
        if !(emptied && line.trim().is_empty()) {
            kept.push(line);
        }
        start = end + 1;
    }
    kept.join("\n")
}

/// Extract and clean in one call.
pub fn process(text: &str) -> (Extraction, String) {
    let extraction = extract(text);
    let cleaned = clean(text, &extraction);
    (extraction, cleaned)
}
