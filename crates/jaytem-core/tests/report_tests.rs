use chrono::TimeZone;
use jaytem_core::{
    pdf,
    report::{
        self, parse_markdown, plain_text, Block, DocBlock, ReportError, Span, SpanStyle,
        DEFAULT_FIRM_NAME,
    },
    ClientIntake, ClientType, Role, Session, StepId,
};

fn session_with(outputs: &[(StepId, &str)]) -> Session {
    let mut s = Session::new(ClientIntake {
        client_type: ClientType::Individual,
        first_name: "Ana".into(),
        last_name: "Ruiz".into(),
        email: "ana@example.com".into(),
        phone: "555-0100".into(),
        primary_language: "Spanish".into(),
        secondary_language: None,
        narrative: "First paragraph.\n\nSecond paragraph.".into(),
    });
    s.created_at = chrono::Utc.with_ymd_and_hms(2025, 3, 7, 15, 0, 0).unwrap();
    for (step, text) in outputs {
        s.results.record(*step, text.to_string()).unwrap();
    }
    s
}

fn complete_session(final_text: &str) -> Session {
    session_with(&[
        (StepId::PlaintiffOpen, "OUT-1"),
        (StepId::PlaintiffDraft, "OUT-2"),
        (StepId::DefenseOpen, "OUT-3"),
        (StepId::DefenseStrategy, "OUT-4"),
        (StepId::RebuttalOpen, "OUT-5"),
        (StepId::RebuttalFinal, final_text),
    ])
}

// ── markdown ────────────────────────────────────────────────────────────────

#[test]
fn heading_list_and_bold() {
    let blocks = parse_markdown("## Heading\n- item one\n- item two\n**bold**");
    assert_eq!(
        blocks,
        vec![
            Block::Heading {
                level: 2,
                spans: vec![Span::new("Heading", SpanStyle::Plain)],
            },
            Block::ListItem {
                number: None,
                spans: vec![Span::new("item one", SpanStyle::Plain)],
            },
            Block::ListItem {
                number: None,
                spans: vec![Span::new("item two", SpanStyle::Plain)],
            },
            Block::Paragraph {
                spans: vec![Span::new("bold", SpanStyle::Bold)],
            },
        ]
    );
}

#[test]
fn same_markdown_is_plain_in_the_document() {
    let session = complete_session("## Heading\n- item one\n- item two\n**bold**");
    let doc = report::document_blocks(&session, DEFAULT_FIRM_NAME).unwrap();
    let tail: Vec<_> = doc.iter().rev().take(4).rev().cloned().collect();
    assert_eq!(
        tail,
        vec![
            DocBlock::Heading {
                level: 2,
                text: "Heading".into(),
            },
            DocBlock::ListItem {
                marker: "-".into(),
                text: "item one".into(),
            },
            DocBlock::ListItem {
                marker: "-".into(),
                text: "item two".into(),
            },
            DocBlock::Paragraph("bold".into()),
        ]
    );
    assert!(doc.iter().all(|b| !b.text().contains("**")));
}

#[test]
fn inline_styles() {
    let blocks = parse_markdown("Use *care*, __always__ and `code` or _this_.");
    let Block::Paragraph { spans } = &blocks[0] else {
        panic!("expected paragraph, got {blocks:?}");
    };
    let styled: Vec<_> = spans
        .iter()
        .filter(|s| s.style != SpanStyle::Plain)
        .map(|s| (s.text.as_str(), s.style))
        .collect();
    assert_eq!(
        styled,
        vec![
            ("care", SpanStyle::Italic),
            ("always", SpanStyle::Bold),
            ("code", SpanStyle::Code),
            ("this", SpanStyle::Italic),
        ]
    );
    assert_eq!(plain_text(spans), "Use care, always and code or this.");
}

#[test]
fn numbered_items_deep_headings_and_paragraphs() {
    let blocks = parse_markdown("#### Deep\n1. first\n2. second\n\nline one\nline two\n\nnext");
    assert_eq!(blocks.len(), 5);
    assert!(matches!(&blocks[0], Block::Heading { level: 3, .. }));
    assert!(matches!(&blocks[1], Block::ListItem { number: Some(1), .. }));
    assert!(matches!(&blocks[2], Block::ListItem { number: Some(2), .. }));
    assert_eq!(plain_text(blocks[3].spans()), "line one\nline two");
    assert_eq!(plain_text(blocks[4].spans()), "next");
}

// ── report view ─────────────────────────────────────────────────────────────

#[test]
fn report_view_has_only_final_synthesis_sections() {
    let session = complete_session("## Roadmap\n- file suit");
    let view = report::render(&session, DEFAULT_FIRM_NAME).unwrap();

    assert_eq!(view.firm_name, DEFAULT_FIRM_NAME);
    assert_eq!(view.prepared_on, "March 7, 2025");
    assert_eq!(view.client[0].value, "Ana Ruiz");
    assert!(view.client.iter().all(|f| f.label != "Secondary Language"));
    assert_eq!(
        view.sections.iter().map(|s| s.step).collect::<Vec<_>>(),
        vec![StepId::RebuttalOpen, StepId::RebuttalFinal]
    );
    assert!(view.sections.iter().all(|s| s.banner == Role::Synthesis.banner()));

    let json = serde_json::to_string(&view).unwrap();
    for k in 1..=4 {
        assert!(!json.contains(&format!("OUT-{k}")));
    }
    assert!(json.contains("OUT-5"));
}

#[test]
fn incomplete_session_cannot_be_rendered() {
    let partial = session_with(&[
        (StepId::PlaintiffOpen, "OUT-1"),
        (StepId::PlaintiffDraft, "OUT-2"),
        (StepId::DefenseOpen, "OUT-3"),
        (StepId::DefenseStrategy, "OUT-4"),
        (StepId::RebuttalOpen, "OUT-5"),
    ]);
    let err = report::render(&partial, DEFAULT_FIRM_NAME).unwrap_err();
    assert!(matches!(
        err,
        ReportError::Incomplete {
            missing: StepId::RebuttalFinal
        }
    ));
    assert!(report::to_document(&partial, DEFAULT_FIRM_NAME).is_err());
}

// ── document ────────────────────────────────────────────────────────────────

#[test]
fn document_starts_with_cover_and_breaks_per_section() {
    let session = complete_session("OUT-6");
    let doc = report::document_blocks(&session, "Test Firm LLP").unwrap();

    assert_eq!(doc[0], DocBlock::Title("Test Firm LLP".into()));
    assert_eq!(doc[1], DocBlock::Subtitle("Case Evaluation".into()));
    assert!(doc.contains(&DocBlock::Field {
        label: "Prepared on:".into(),
        value: "March 7, 2025".into(),
    }));
    assert!(doc.contains(&DocBlock::Paragraph("Second paragraph.".into())));
    assert_eq!(doc.iter().filter(|b| **b == DocBlock::SectionBreak).count(), 2);
}

#[test]
fn pdf_is_produced_and_paginates() {
    let long = "A sentence that keeps going to fill the page. ".repeat(400);
    let session = complete_session(&long);

    let bytes = report::to_document(&session, DEFAULT_FIRM_NAME).unwrap();
    assert!(bytes.starts_with(b"%PDF"));

    let pages = pdf::layout(&report::document_blocks(&session, DEFAULT_FIRM_NAME).unwrap());
    // cover, one page for step 5, several for the long step 6
    assert!(pages.len() >= 4, "got {} pages", pages.len());
    assert!(pages
        .iter()
        .flat_map(|p| &p.runs)
        .all(|r| r.y >= 25.0 && r.y <= 297.0 && r.text.is_ascii()));
}

#[test]
fn sections_start_on_fresh_pages() {
    let session = complete_session("OUT-6");
    let pages = pdf::layout(&report::document_blocks(&session, DEFAULT_FIRM_NAME).unwrap());
    assert_eq!(pages.len(), 3);
    assert_eq!(pages[1].runs[0].text, Role::Synthesis.banner());
    assert_eq!(pages[2].runs[0].text, Role::Synthesis.banner());
}

#[test]
fn file_name_uses_client_name() {
    let session = complete_session("x");
    assert_eq!(report::document_file_name(&session), "Ruiz_Ana_Evaluation.pdf");

    let mut odd = session.clone();
    odd.intake.last_name = "O'Neil Smith".into();
    odd.intake.first_name = "José".into();
    assert_eq!(report::document_file_name(&odd), "O_Neil_Smith_Jos__Evaluation.pdf");
}
