use printpdf::{BuiltinFont, Color, IndirectFontRef, Mm, PdfDocument, PdfLayerReference, Rgb};

use crate::report::{DocBlock, ReportError, FOOTER_TEXT};
use crate::types::Role;

const PAGE_W: f32 = 210.0;
const PAGE_H: f32 = 297.0;
const MARGIN: f32 = 20.0;
/// Lowest baseline body text may use; below is the footer band.
const BODY_BOTTOM: f32 = 25.0;
const FOOTER_Y: f32 = 12.0;
const PAGE_NO_Y: f32 = 8.0;
const FIELD_VALUE_X: f32 = MARGIN + 42.0;
const LIST_TEXT_INDENT: f32 = 8.0;

const PT_TO_MM: f32 = 0.352_778;
/// Average Helvetica advance as a fraction of the font size. Slightly
/// generous so wrapped lines never overrun the right margin.
const AVG_CHAR_EM: f32 = 0.52;
const LINE_SPACING: f32 = 1.4;

type Rgb3 = (f32, f32, f32);
const BLACK: Rgb3 = (0.0, 0.0, 0.0);
const BODY: Rgb3 = (0.22, 0.22, 0.22);
const MUTED: Rgb3 = (0.4, 0.4, 0.4);
const FAINT: Rgb3 = (0.6, 0.6, 0.6);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Weight {
    Regular,
    Bold,
}

/// One positioned line of text. Coordinates are millimetres from the
/// bottom-left corner, matching PDF space.
#[derive(Debug, Clone, PartialEq)]
pub struct TextRun {
    pub text: String,
    pub x: f32,
    pub y: f32,
    pub size: f32,
    pub weight: Weight,
    pub color: Rgb3,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PageLayout {
    pub runs: Vec<TextRun>,
}

fn banner_color(role: Role) -> Rgb3 {
    match role {
        Role::Plaintiff => (0.118, 0.251, 0.686),
        Role::Defense => (0.6, 0.106, 0.106),
        Role::Synthesis => (0.086, 0.396, 0.204),
    }
}

fn line_height(size: f32) -> f32 {
    size * LINE_SPACING * PT_TO_MM
}

fn text_width(text: &str, size: f32) -> f32 {
    text.chars().count() as f32 * size * AVG_CHAR_EM * PT_TO_MM
}

/// Greedy word wrap against an estimated glyph width. Words longer than a
/// full line are split.
pub fn wrap(text: &str, size: f32, width: f32) -> Vec<String> {
    let max_chars = ((width / (size * AVG_CHAR_EM * PT_TO_MM)) as usize).max(1);
    let mut lines = Vec::new();

    for source_line in text.lines() {
        let mut current = String::new();
        let mut current_len = 0;
        for word in source_line.split_whitespace() {
            let mut word: Vec<char> = word.chars().collect();
            while word.len() > max_chars {
                if current_len > 0 {
                    lines.push(std::mem::take(&mut current));
                    current_len = 0;
                }
                let rest = word.split_off(max_chars);
                lines.push(word.into_iter().collect());
                word = rest;
            }
            let needed = if current_len == 0 { word.len() } else { current_len + 1 + word.len() };
            if needed > max_chars {
                lines.push(std::mem::take(&mut current));
                current_len = 0;
            }
            if current_len > 0 {
                current.push(' ');
                current_len += 1;
            }
            current.extend(word.iter());
            current_len += word.len();
        }
        if current_len > 0 || source_line.trim().is_empty() {
            lines.push(current);
        }
    }
    lines
}

/// Map text onto what the standard Type1 fonts can show. Common typographic
/// punctuation and accented Latin letters get ASCII stand-ins.
pub fn to_pdf_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '\u{2018}' | '\u{2019}' | '\u{201B}' | '\u{2032}' => out.push('\''),
            '\u{201C}' | '\u{201D}' | '\u{201F}' | '\u{2033}' => out.push('"'),
            '\u{2013}' | '\u{2014}' | '\u{2212}' => out.push('-'),
            '\u{2022}' | '\u{00B7}' => out.push('-'),
            '\u{2026}' => out.push_str("..."),
            '\u{00A0}' | '\t' => out.push(' '),
            'á' | 'à' | 'â' | 'ä' | 'ã' | 'å' => out.push('a'),
            'Á' | 'À' | 'Â' | 'Ä' | 'Ã' | 'Å' => out.push('A'),
            'é' | 'è' | 'ê' | 'ë' => out.push('e'),
            'É' | 'È' | 'Ê' | 'Ë' => out.push('E'),
            'í' | 'ì' | 'î' | 'ï' => out.push('i'),
            'Í' | 'Ì' | 'Î' | 'Ï' => out.push('I'),
            'ó' | 'ò' | 'ô' | 'ö' | 'õ' => out.push('o'),
            'Ó' | 'Ò' | 'Ô' | 'Ö' | 'Õ' => out.push('O'),
            'ú' | 'ù' | 'û' | 'ü' => out.push('u'),
            'Ú' | 'Ù' | 'Û' | 'Ü' => out.push('U'),
            'ñ' => out.push('n'),
            'Ñ' => out.push('N'),
            'ç' => out.push('c'),
            'Ç' => out.push('C'),
            '§' => out.push_str("Sec."),
            c if c.is_ascii() && (!c.is_ascii_control() || c == '\n') => out.push(c),
            _ => out.push('?'),
        }
    }
    out
}

// ── Layout ────────────────────────────────────────────────────────────────

struct Layouter {
    pages: Vec<PageLayout>,
    y: f32,
}

impl Layouter {
    fn new() -> Self {
        Self {
            pages: vec![PageLayout::default()],
            y: PAGE_H - MARGIN,
        }
    }

    fn new_page(&mut self) {
        self.pages.push(PageLayout::default());
        self.y = PAGE_H - MARGIN;
    }

    fn page_is_blank(&self) -> bool {
        self.pages.last().map_or(true, |p| p.runs.is_empty())
    }

    fn gap(&mut self, mm: f32) {
        if !self.page_is_blank() {
            self.y -= mm;
        }
    }

    /// Move to the next baseline, breaking the page when the body is full.
    fn advance(&mut self, size: f32) {
        let h = line_height(size);
        if self.y - h < BODY_BOTTOM {
            self.new_page();
        }
        self.y -= h;
    }

    fn put(&mut self, text: String, x: f32, size: f32, weight: Weight, color: Rgb3) {
        let y = self.y;
        if let Some(page) = self.pages.last_mut() {
            page.runs.push(TextRun {
                text,
                x,
                y,
                size,
                weight,
                color,
            });
        }
    }

    fn wrapped(&mut self, text: &str, x: f32, size: f32, weight: Weight, color: Rgb3) {
        for line in wrap(&to_pdf_text(text), size, PAGE_W - MARGIN - x) {
            self.advance(size);
            self.put(line, x, size, weight, color);
        }
    }

    fn block(&mut self, block: &DocBlock) {
        match block {
            DocBlock::Title(t) => {
                self.wrapped(t, MARGIN, 22.0, Weight::Bold, BLACK);
                self.y -= 2.0;
            }
            DocBlock::Subtitle(t) => {
                self.wrapped(t, MARGIN, 12.0, Weight::Regular, MUTED);
                self.y -= 6.0;
            }
            DocBlock::Field { label, value } => {
                self.advance(10.0);
                self.put(to_pdf_text(label), MARGIN, 10.0, Weight::Bold, BLACK);
                let mut lines =
                    wrap(&to_pdf_text(value), 10.0, PAGE_W - MARGIN - FIELD_VALUE_X).into_iter();
                if let Some(first) = lines.next() {
                    self.put(first, FIELD_VALUE_X, 10.0, Weight::Regular, BODY);
                }
                for line in lines {
                    self.advance(10.0);
                    self.put(line, FIELD_VALUE_X, 10.0, Weight::Regular, BODY);
                }
            }
            DocBlock::SectionBreak => {
                if !self.page_is_blank() {
                    self.new_page();
                }
            }
            DocBlock::Banner { role, text } => {
                self.gap(4.0);
                self.wrapped(text, MARGIN, 16.0, Weight::Bold, banner_color(*role));
                self.y -= 2.0;
            }
            DocBlock::Heading { level, text } => {
                let size = match level {
                    1 => 14.0,
                    2 => 12.0,
                    _ => 11.0,
                };
                self.gap(4.0);
                self.wrapped(text, MARGIN, size, Weight::Bold, BLACK);
                self.y -= 1.0;
            }
            DocBlock::Paragraph(t) => {
                self.wrapped(t, MARGIN, 10.0, Weight::Regular, BODY);
                self.y -= 2.5;
            }
            DocBlock::ListItem { marker, text } => {
                self.advance(10.0);
                self.put(to_pdf_text(marker), MARGIN + 2.0, 10.0, Weight::Regular, BODY);
                let x = MARGIN + LIST_TEXT_INDENT;
                let mut lines = wrap(&to_pdf_text(text), 10.0, PAGE_W - MARGIN - x).into_iter();
                if let Some(first) = lines.next() {
                    self.put(first, x, 10.0, Weight::Regular, BODY);
                }
                for line in lines {
                    self.advance(10.0);
                    self.put(line, x, 10.0, Weight::Regular, BODY);
                }
                self.y -= 1.0;
            }
        }
    }
}

/// Place every block on A4 pages. Section breaks start a new page and long
/// content flows onto as many pages as it needs.
pub fn layout(blocks: &[DocBlock]) -> Vec<PageLayout> {
    let mut l = Layouter::new();
    for block in blocks {
        l.block(block);
    }
    l.pages
}

// ── Rendering ─────────────────────────────────────────────────────────────

fn draw(layer: &PdfLayerReference, run: &TextRun, regular: &IndirectFontRef, bold: &IndirectFontRef) {
    let (r, g, b) = run.color;
    layer.set_fill_color(Color::Rgb(Rgb::new(r, g, b, None)));
    let font = match run.weight {
        Weight::Regular => regular,
        Weight::Bold => bold,
    };
    layer.use_text(run.text.clone(), run.size, Mm(run.x), Mm(run.y), font);
}

fn footer_runs(page_no: usize, total: usize) -> [TextRun; 2] {
    let number = format!("Page {page_no} of {total}");
    [
        TextRun {
            x: (PAGE_W - text_width(FOOTER_TEXT, 8.0)) / 2.0,
            text: FOOTER_TEXT.to_string(),
            y: FOOTER_Y,
            size: 8.0,
            weight: Weight::Regular,
            color: FAINT,
        },
        TextRun {
            x: PAGE_W - MARGIN - text_width(&number, 8.0),
            text: number,
            y: PAGE_NO_Y,
            size: 8.0,
            weight: Weight::Regular,
            color: FAINT,
        },
    ]
}

fn pdf_err(e: impl std::fmt::Debug) -> ReportError {
    ReportError::Pdf(format!("{e:?}"))
}

pub fn render_pdf(title: &str, blocks: &[DocBlock]) -> Result<Vec<u8>, ReportError> {
    let pages = layout(blocks);
    let total = pages.len();

    let (doc, first_page, first_layer) =
        PdfDocument::new(to_pdf_text(title), Mm(PAGE_W), Mm(PAGE_H), "Layer 1");
    let regular = doc.add_builtin_font(BuiltinFont::Helvetica).map_err(pdf_err)?;
    let bold = doc
        .add_builtin_font(BuiltinFont::HelveticaBold)
        .map_err(pdf_err)?;

    for (i, page) in pages.iter().enumerate() {
        let layer = if i == 0 {
            doc.get_page(first_page).get_layer(first_layer)
        } else {
            let (p, l) = doc.add_page(Mm(PAGE_W), Mm(PAGE_H), "Layer 1");
            doc.get_page(p).get_layer(l)
        };
        for run in page.runs.iter().chain(footer_runs(i + 1, total).iter()) {
            draw(&layer, run, &regular, &bold);
        }
    }

    doc.save_to_bytes().map_err(pdf_err)
}
