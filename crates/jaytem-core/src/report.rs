use serde::Serialize;

use crate::{
    pdf,
    types::{Role, Session, StepId},
};

pub const DEFAULT_FIRM_NAME: &str = "Marshall, Ginsburg & Motley LLP";
pub const REPORT_SUBTITLE: &str = "Case Evaluation";
pub const FOOTER_TEXT: &str = "Confidential - Attorney Work Product";

/// Steps whose output forms the client-facing report, with their section titles.
/// Earlier steps are working material and never leave the dev view.
const REPORT_SECTIONS: [(StepId, &str); 2] = [
    (StepId::RebuttalOpen, "Strengthened Case Strategy"),
    (StepId::RebuttalFinal, "Final Enhanced Complaint & Roadmap"),
];

#[derive(Debug, thiserror::Error)]
pub enum ReportError {
    #[error("evaluation incomplete: {missing} has no result")]
    Incomplete { missing: StepId },
    #[error("pdf generation failed: {0}")]
    Pdf(String),
}

// ── Markdown subset ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SpanStyle {
    Plain,
    Bold,
    Italic,
    Code,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Span {
    pub text: String,
    pub style: SpanStyle,
}

impl Span {
    pub fn new(text: impl Into<String>, style: SpanStyle) -> Self {
        Self {
            text: text.into(),
            style,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Block {
    Heading { level: u8, spans: Vec<Span> },
    /// `number` is set for `N. ` items, absent for bullets.
    ListItem { number: Option<u32>, spans: Vec<Span> },
    Paragraph { spans: Vec<Span> },
}

impl Block {
    pub fn spans(&self) -> &[Span] {
        match self {
            Self::Heading { spans, .. } | Self::ListItem { spans, .. } | Self::Paragraph { spans } => {
                spans
            }
        }
    }
}

/// Concatenated span text with all styling dropped.
pub fn plain_text(spans: &[Span]) -> String {
    spans.iter().map(|s| s.text.as_str()).collect()
}

/// Parse model output into blocks. Unrecognised syntax is kept as text.
pub fn parse_markdown(text: &str) -> Vec<Block> {
    let mut blocks = Vec::new();
    let mut para: Vec<&str> = Vec::new();

    fn flush(para: &mut Vec<&str>, blocks: &mut Vec<Block>) {
        if !para.is_empty() {
            blocks.push(Block::Paragraph {
                spans: parse_inline(&para.join("\n")),
            });
            para.clear();
        }
    }

    for raw in text.lines() {
        let line = raw.trim();
        if line.is_empty() {
            flush(&mut para, &mut blocks);
            continue;
        }
        if let Some((level, rest)) = heading(line) {
            flush(&mut para, &mut blocks);
            blocks.push(Block::Heading {
                level,
                spans: parse_inline(rest),
            });
        } else if let Some(rest) = line.strip_prefix("- ").or_else(|| line.strip_prefix("* ")) {
            flush(&mut para, &mut blocks);
            blocks.push(Block::ListItem {
                number: None,
                spans: parse_inline(rest.trim()),
            });
        } else if let Some((n, rest)) = numbered_item(line) {
            flush(&mut para, &mut blocks);
            blocks.push(Block::ListItem {
                number: Some(n),
                spans: parse_inline(rest),
            });
        } else {
            para.push(line);
        }
    }
    flush(&mut para, &mut blocks);
    blocks
}

/// `#`..`######` followed by a space. Levels past 3 clamp to 3.
fn heading(line: &str) -> Option<(u8, &str)> {
    let hashes = line.bytes().take_while(|b| *b == b'#').count();
    if hashes == 0 {
        return None;
    }
    let rest = &line[hashes..];
    if !rest.is_empty() && !rest.starts_with(' ') {
        return None;
    }
    Some((hashes.min(3) as u8, rest.trim()))
}

fn numbered_item(line: &str) -> Option<(u32, &str)> {
    let digits = line.bytes().take_while(u8::is_ascii_digit).count();
    if digits == 0 || digits > 9 {
        return None;
    }
    let rest = line[digits..].strip_prefix(". ")?;
    let n = line[..digits].parse().ok()?;
    Some((n, rest.trim()))
}

const MARKERS: [(&str, SpanStyle); 5] = [
    ("**", SpanStyle::Bold),
    ("__", SpanStyle::Bold),
    ("`", SpanStyle::Code),
    ("*", SpanStyle::Italic),
    ("_", SpanStyle::Italic),
];

/// Split a line into styled spans. Markers without a matching close are
/// left in the text as-is.
pub fn parse_inline(text: &str) -> Vec<Span> {
    let mut spans = Vec::new();
    let mut plain = String::new();
    let mut i = 0;

    while i < text.len() {
        if let Some((style, inner, consumed)) = emphasis_at(text, i) {
            if !plain.is_empty() {
                spans.push(Span::new(std::mem::take(&mut plain), SpanStyle::Plain));
            }
            spans.push(Span::new(inner, style));
            i += consumed;
            continue;
        }
        let Some(ch) = text[i..].chars().next() else {
            break;
        };
        plain.push(ch);
        i += ch.len_utf8();
    }
    if !plain.is_empty() {
        spans.push(Span::new(plain, SpanStyle::Plain));
    }
    spans
}

fn emphasis_at(text: &str, i: usize) -> Option<(SpanStyle, &str, usize)> {
    let rest = &text[i..];
    let prev = text[..i].chars().next_back();

    for (marker, style) in MARKERS {
        if !rest.starts_with(marker) {
            continue;
        }
        // snake_case identifiers are not emphasis
        if marker.starts_with('_') && prev.is_some_and(char::is_alphanumeric) {
            continue;
        }
        let body = &rest[marker.len()..];
        if style != SpanStyle::Code && body.starts_with(char::is_whitespace) {
            continue;
        }
        let Some(end) = closing(body, marker) else {
            continue;
        };
        if end == 0 {
            continue;
        }
        return Some((style, &body[..end], marker.len() * 2 + end));
    }
    None
}

fn closing(body: &str, marker: &str) -> Option<usize> {
    body.match_indices(marker).map(|(pos, _)| pos).find(|&pos| {
        if !marker.starts_with('_') {
            return true;
        }
        !body[pos + marker.len()..]
            .chars()
            .next()
            .is_some_and(char::is_alphanumeric)
    })
}

// ── On-screen report ──────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClientField {
    pub label: &'static str,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReportSection {
    pub step: StepId,
    pub banner: &'static str,
    pub title: &'static str,
    pub blocks: Vec<Block>,
}

/// Structured report for the evaluation screen.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReportView {
    pub firm_name: String,
    pub subtitle: &'static str,
    pub client: Vec<ClientField>,
    pub prepared_on: String,
    pub narrative: String,
    pub sections: Vec<ReportSection>,
}

fn client_fields(session: &Session) -> Vec<ClientField> {
    let intake = &session.intake;
    let mut fields = vec![
        ClientField {
            label: "Client",
            value: intake.full_name(),
        },
        ClientField {
            label: "Email",
            value: intake.email.clone(),
        },
        ClientField {
            label: "Phone",
            value: intake.phone.clone(),
        },
        ClientField {
            label: "Primary Language",
            value: intake.primary_language.clone(),
        },
    ];
    if let Some(lang) = intake.secondary_language() {
        fields.push(ClientField {
            label: "Secondary Language",
            value: lang.to_string(),
        });
    }
    fields
}

fn prepared_on(session: &Session) -> String {
    session.created_at.format("%B %-d, %Y").to_string()
}

fn report_outputs(session: &Session) -> Result<Vec<(StepId, &'static str, &str)>, ReportError> {
    REPORT_SECTIONS
        .iter()
        .map(|(step, title)| {
            session
                .results
                .get(*step)
                .map(|text| (*step, *title, text))
                .ok_or(ReportError::Incomplete { missing: *step })
        })
        .collect()
}

pub fn render(session: &Session, firm_name: &str) -> Result<ReportView, ReportError> {
    let sections = report_outputs(session)?
        .into_iter()
        .map(|(step, title, text)| ReportSection {
            step,
            banner: step.role().banner(),
            title,
            blocks: parse_markdown(text),
        })
        .collect();

    Ok(ReportView {
        firm_name: firm_name.to_string(),
        subtitle: REPORT_SUBTITLE,
        client: client_fields(session),
        prepared_on: prepared_on(session),
        narrative: session.intake.narrative.clone(),
        sections,
    })
}

// ── Document ──────────────────────────────────────────────────────────────

/// Flat, style-free unit handed to the PDF layout pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DocBlock {
    Title(String),
    Subtitle(String),
    Field { label: String, value: String },
    /// Starts a new page.
    SectionBreak,
    Banner { role: Role, text: String },
    Heading { level: u8, text: String },
    Paragraph(String),
    ListItem { marker: String, text: String },
}

impl DocBlock {
    pub fn text(&self) -> &str {
        match self {
            Self::Title(t) | Self::Subtitle(t) | Self::Paragraph(t) => t,
            Self::Heading { text, .. } | Self::ListItem { text, .. } | Self::Banner { text, .. } => {
                text
            }
            Self::Field { value, .. } => value,
            Self::SectionBreak => "",
        }
    }
}

/// Cover page then one page-led section per report output.
pub fn document_blocks(session: &Session, firm_name: &str) -> Result<Vec<DocBlock>, ReportError> {
    let outputs = report_outputs(session)?;

    let mut blocks = vec![
        DocBlock::Title(firm_name.to_string()),
        DocBlock::Subtitle(REPORT_SUBTITLE.to_string()),
    ];
    for f in client_fields(session) {
        blocks.push(DocBlock::Field {
            label: format!("{}:", f.label),
            value: f.value,
        });
    }
    blocks.push(DocBlock::Field {
        label: "Prepared on:".into(),
        value: prepared_on(session),
    });
    blocks.push(DocBlock::Heading {
        level: 2,
        text: "Client Story".into(),
    });
    for para in session.intake.narrative.split("\n\n") {
        let para = para.trim();
        if !para.is_empty() {
            blocks.push(DocBlock::Paragraph(para.to_string()));
        }
    }

    for (step, title, text) in outputs {
        blocks.push(DocBlock::SectionBreak);
        blocks.push(DocBlock::Banner {
            role: step.role(),
            text: step.role().banner().to_string(),
        });
        blocks.push(DocBlock::Heading {
            level: 2,
            text: title.to_string(),
        });
        for block in parse_markdown(text) {
            blocks.push(match &block {
                Block::Heading { level, spans } => DocBlock::Heading {
                    level: *level,
                    text: plain_text(spans),
                },
                Block::ListItem { number, spans } => DocBlock::ListItem {
                    marker: number.map_or_else(|| "-".to_string(), |n| format!("{n}.")),
                    text: plain_text(spans),
                },
                Block::Paragraph { spans } => DocBlock::Paragraph(plain_text(spans)),
            });
        }
    }
    Ok(blocks)
}

/// Render the report as an A4 PDF.
pub fn to_document(session: &Session, firm_name: &str) -> Result<Vec<u8>, ReportError> {
    let blocks = document_blocks(session, firm_name)?;
    pdf::render_pdf(&format!("{firm_name} - {REPORT_SUBTITLE}"), &blocks)
}

/// `<Last>_<First>_Evaluation.pdf`, anything outside `[A-Za-z0-9]` mapped to `_`.
pub fn document_file_name(session: &Session) -> String {
    let clean = |s: &str| -> String {
        s.trim()
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
            .collect()
    };
    format!(
        "{}_{}_Evaluation.pdf",
        clean(&session.intake.last_name),
        clean(&session.intake.first_name)
    )
}
