//! PDF export of an analysis report.
//!
//! The layout is fixed: title, disclaimer, then five sections in the order
//! the report is read on screen. Content flows onto additional A4 pages as
//! needed. The built-in Helvetica fonts only cover Latin text, so Hindi and
//! Gujarati exports need a TrueType font supplied through [`ExportOptions`].

use printpdf::{
    BuiltinFont, Color, IndirectFontRef, Mm, PdfDocument, PdfDocumentReference,
    PdfLayerReference, Rgb,
};
use report_flow::{AnalysisReport, Language};
use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{info, warn};

pub const DEFAULT_FILE_NAME: &str = "MediAssist_Report_Analysis.pdf";
pub const TITLE: &str = "MediAssist - AI Medical Report Analysis";
pub const DISCLAIMER: &str = "Disclaimer: This is an AI-generated summary for informational purposes only. Please consult a qualified doctor for any medical advice.";

pub const SECTION_TITLES: [&str; 5] = [
    "Simple Summary",
    "Key Findings",
    "Possible Causes & Risk Factors",
    "Cure & Care Suggestions",
    "Recommended Action Steps",
];

const PAGE_WIDTH: f32 = 210.0;
const PAGE_HEIGHT: f32 = 297.0;
const LEFT_MARGIN: f32 = 20.0;
const TOP: f32 = 280.0;
const BOTTOM_MARGIN: f32 = 20.0;
const WRAP_CHARS: usize = 90;

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("PDF font error: {0}")]
    Font(String),
    #[error("failed to open font {path}: {source}")]
    FontFile {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("PDF save error: {0}")]
    Save(String),
}

#[derive(Debug, Clone, Default)]
pub struct ExportOptions {
    pub font_path: Option<PathBuf>,
}

/// A rendered PDF and the number of pages it spans.
#[derive(Debug, Clone)]
pub struct RenderedPdf {
    pub bytes: Vec<u8>,
    pub pages: usize,
}

/// One visual element of the exported document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Block {
    Title(String),
    Disclaimer(String),
    Heading(String),
    Paragraph(String),
    Bullet(String),
    Numbered(usize, String),
}

/// The document content in reading order.
pub fn layout(report: &AnalysisReport) -> Vec<Block> {
    let [summary, findings, causes, care, steps] = SECTION_TITLES;
    let mut blocks = vec![
        Block::Title(TITLE.to_string()),
        Block::Disclaimer(DISCLAIMER.to_string()),
        Block::Heading(summary.to_string()),
        Block::Paragraph(report.simple_summary.clone()),
    ];

    for (heading, items) in [
        (findings, &report.key_findings),
        (causes, &report.possible_causes),
        (care, &report.cure_and_care),
    ] {
        blocks.push(Block::Heading(heading.to_string()));
        blocks.extend(items.iter().cloned().map(Block::Bullet));
    }

    blocks.push(Block::Heading(steps.to_string()));
    blocks.extend(
        report
            .action_steps
            .iter()
            .enumerate()
            .map(|(i, step)| Block::Numbered(i + 1, step.clone())),
    );
    blocks
}

struct Fonts {
    regular: IndirectFontRef,
    bold: IndirectFontRef,
    italic: IndirectFontRef,
    /// The builtin fonts are WinAnsi encoded and cannot draw `\u{2022}`.
    bullet: &'static str,
}

impl Fonts {
    fn load(doc: &PdfDocumentReference, font_path: Option<&Path>) -> Result<Self, ExportError> {
        if let Some(path) = font_path {
            let file = File::open(path).map_err(|source| ExportError::FontFile {
                path: path.to_path_buf(),
                source,
            })?;
            let font = doc
                .add_external_font(file)
                .map_err(|e| ExportError::Font(e.to_string()))?;
            return Ok(Self {
                regular: font.clone(),
                bold: font.clone(),
                italic: font,
                bullet: "\u{2022}",
            });
        }

        let builtin = |font| {
            doc.add_builtin_font(font)
                .map_err(|e| ExportError::Font(e.to_string()))
        };
        Ok(Self {
            regular: builtin(BuiltinFont::Helvetica)?,
            bold: builtin(BuiltinFont::HelveticaBold)?,
            italic: builtin(BuiltinFont::HelveticaOblique)?,
            bullet: "-",
        })
    }
}

/// Tracks the write position and starts new pages when the current one is full.
struct PageWriter<'a> {
    doc: &'a PdfDocumentReference,
    layer: PdfLayerReference,
    y: f32,
    pages: usize,
}

impl<'a> PageWriter<'a> {
    fn line(&mut self, text: &str, size: f32, indent: f32, font: &IndirectFontRef) {
        let height = size * 0.5;
        if self.y - height < BOTTOM_MARGIN {
            self.new_page();
        }
        self.layer
            .use_text(text, size, Mm(LEFT_MARGIN + indent), Mm(self.y), font);
        self.y -= height;
    }

    fn wrapped(&mut self, text: &str, size: f32, indent: f32, font: &IndirectFontRef) {
        for line in wrap_text(text, WRAP_CHARS) {
            self.line(&line, size, indent, font);
        }
    }

    fn gap(&mut self, mm: f32) {
        self.y -= mm;
    }

    fn color(&self, r: f32, g: f32, b: f32) {
        self.layer
            .set_fill_color(Color::Rgb(Rgb::new(r, g, b, None)));
    }

    fn new_page(&mut self) {
        let (page, layer) = self
            .doc
            .add_page(Mm(PAGE_WIDTH), Mm(PAGE_HEIGHT), format!("Layer {}", self.pages + 1));
        self.layer = self.doc.get_page(page).get_layer(layer);
        self.y = TOP;
        self.pages += 1;
    }
}

/// Render `report` (already in `language`) as a PDF.
pub fn render_report_pdf(
    report: &AnalysisReport,
    language: Language,
    options: &ExportOptions,
) -> Result<RenderedPdf, ExportError> {
    if !language.is_source() && options.font_path.is_none() {
        warn!(
            language = %language,
            "No PDF font configured, non-Latin text may not render"
        );
    }

    let (doc, page1, layer1) =
        PdfDocument::new(TITLE, Mm(PAGE_WIDTH), Mm(PAGE_HEIGHT), "Layer 1");
    let fonts = Fonts::load(&doc, options.font_path.as_deref())?;

    let mut writer = PageWriter {
        doc: &doc,
        layer: doc.get_page(page1).get_layer(layer1),
        y: TOP,
        pages: 1,
    };

    for block in layout(report) {
        match block {
            Block::Title(text) => {
                writer.color(0.17, 0.48, 0.48);
                writer.line(&text, 18.0, 0.0, &fonts.bold);
                writer.color(0.0, 0.0, 0.0);
                writer.gap(2.0);
            }
            Block::Disclaimer(text) => {
                writer.color(0.45, 0.5, 0.56);
                writer.wrapped(&text, 9.0, 0.0, &fonts.italic);
                writer.color(0.0, 0.0, 0.0);
            }
            Block::Heading(text) => {
                writer.gap(6.0);
                writer.line(&text, 13.0, 0.0, &fonts.bold);
                writer.gap(1.0);
            }
            Block::Paragraph(text) => writer.wrapped(&text, 10.5, 0.0, &fonts.regular),
            Block::Bullet(text) => {
                writer.wrapped(&format!("{} {}", fonts.bullet, text), 10.5, 2.0, &fonts.regular)
            }
            Block::Numbered(n, text) => {
                writer.wrapped(&format!("{}. {}", n, text), 10.5, 2.0, &fonts.bold)
            }
        }
    }

    let pages = writer.pages;
    let mut buf = BufWriter::new(Vec::new());
    doc.save(&mut buf)
        .map_err(|e| ExportError::Save(e.to_string()))?;
    let bytes = buf
        .into_inner()
        .map_err(|e| ExportError::Save(e.to_string()))?;

    info!(pages, bytes = bytes.len(), language = %language, "Report PDF rendered");
    Ok(RenderedPdf { bytes, pages })
}

fn wrap_text(text: &str, max_chars: usize) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current = String::new();

    for word in text.split_whitespace() {
        let current_len = current.chars().count();
        if current_len + word.chars().count() + 1 > max_chars && !current.is_empty() {
            lines.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(word);
    }
    if !current.is_empty() {
        lines.push(current);
    }
    if lines.is_empty() {
        lines.push(String::new());
    }
    lines
}
