//! Paginated A4 PDF output.
//!
//! Rendering is split into a layout pass that places every text run and
//! callout box on a page, and a paint pass that replays those operations
//! through `printpdf`. Layout is pure so pagination can be checked without
//! decoding PDF bytes.

use std::fs::{self, File};
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use printpdf::{
    BuiltinFont, Color, IndirectFontRef, Line, Mm, PdfDocument, PdfDocumentReference,
    PdfLayerReference, Point, Rgb,
};
use tracing::{debug, info};

use super::{ExportError, ExportResult};
use crate::document::{Block, Document, DocumentAssembler, Section, SectionStyle, TableRow};
use crate::models::FinalRecord;

const PAGE_WIDTH: f32 = 210.0;
const PAGE_HEIGHT: f32 = 297.0;
const MARGIN_LEFT: f32 = 20.0;
const TOP: f32 = 280.0;
const BOTTOM: f32 = 20.0;
const CONTENT_WIDTH: f32 = PAGE_WIDTH - 2.0 * MARGIN_LEFT;
const TABLE_VALUE_X: f32 = 75.0;

/// Typeface used for a text run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Face {
    Regular,
    Bold,
    Italic,
}

/// Text colour.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ink {
    Body,
    Heading,
    Alert,
    Muted,
}

impl Ink {
    fn color(self) -> Color {
        let (r, g, b) = match self {
            Ink::Body => (0.17, 0.24, 0.31),
            Ink::Heading => (0.10, 0.10, 0.10),
            Ink::Alert => (0.75, 0.22, 0.17),
            Ink::Muted => (0.50, 0.55, 0.55),
        };
        Color::Rgb(Rgb::new(r, g, b, None))
    }
}

/// One positioned drawing operation, coordinates in millimetres.
#[derive(Debug, Clone, PartialEq)]
pub enum DrawOp {
    Text {
        text: String,
        size: f32,
        x: f32,
        y: f32,
        face: Face,
        ink: Ink,
    },
    /// Outlined rectangle; `y` is the top edge
    Frame {
        x: f32,
        y: f32,
        width: f32,
        height: f32,
        ink: Ink,
    },
}

/// Word-wrap text to at most `max_chars` characters per line.
///
/// Words longer than a line are broken into line-sized pieces.
pub fn wrap_text(text: &str, max_chars: usize) -> Vec<String> {
    let max_chars = max_chars.max(1);
    let mut lines = Vec::new();
    for paragraph in text.lines() {
        let mut current = String::new();
        let mut width = 0;
        for word in paragraph.split_whitespace() {
            let chars: Vec<char> = word.chars().collect();
            for piece in chars.chunks(max_chars) {
                if width > 0 && width + 1 + piece.len() > max_chars {
                    lines.push(std::mem::take(&mut current));
                    width = 0;
                }
                if width > 0 {
                    current.push(' ');
                    width += 1;
                }
                current.extend(piece);
                width += piece.len();
            }
        }
        if !current.is_empty() {
            lines.push(current);
        }
    }
    if lines.is_empty() {
        lines.push(String::new());
    }
    lines
}

/// Approximate characters per line for a font size across a given width.
fn chars_per_line(size: f32, width: f32) -> usize {
    // Helvetica averages roughly half an em per glyph.
    let glyph_mm = size * 0.352_778 * 0.5;
    ((width / glyph_mm) as usize).max(10)
}

fn line_height(size: f32) -> f32 {
    size * 0.5
}

/// Places document content onto A4 pages.
struct Layout {
    pages: Vec<Vec<DrawOp>>,
    y: f32,
}

impl Layout {
    fn new() -> Self {
        Self {
            pages: vec![Vec::new()],
            y: TOP,
        }
    }

    fn new_page(&mut self) {
        self.pages.push(Vec::new());
        self.y = TOP;
    }

    fn ensure_space(&mut self, height: f32) {
        if self.y - height < BOTTOM {
            self.new_page();
        }
    }

    /// Whole lines of `height` that still fit above the bottom margin,
    /// after reserving `reserve` millimetres.
    fn room(&self, height: f32, reserve: f32) -> usize {
        ((self.y - BOTTOM - reserve) / height - 1e-3).floor().max(0.0) as usize
    }

    fn push(&mut self, op: DrawOp) {
        if let Some(page) = self.pages.last_mut() {
            page.push(op);
        }
    }

    fn gap(&mut self, mm: f32) {
        self.y -= mm;
    }

    fn text(&mut self, text: &str, size: f32, x: f32, face: Face, ink: Ink) {
        let width = PAGE_WIDTH - MARGIN_LEFT - x;
        for line in wrap_text(text, chars_per_line(size, width)) {
            let height = line_height(size);
            self.ensure_space(height);
            self.y -= height;
            self.push(DrawOp::Text {
                text: line,
                size,
                x,
                y: self.y,
                face,
                ink,
            });
        }
    }

    fn centered(&mut self, text: &str, size: f32, face: Face, ink: Ink) {
        let approx_width = text.chars().count() as f32 * size * 0.352_778 * 0.5;
        let x = ((PAGE_WIDTH - approx_width) / 2.0).max(MARGIN_LEFT);
        self.text(text, size, x, face, ink);
    }

    fn table(&mut self, rows: &[TableRow]) {
        let height = line_height(10.0);
        for row in rows {
            let value_lines =
                wrap_text(&row.value, chars_per_line(10.0, PAGE_WIDTH - MARGIN_LEFT - TABLE_VALUE_X));
            // Rows that fit on one page are never split.
            let total = height * value_lines.len() as f32;
            if total <= TOP - BOTTOM {
                self.ensure_space(total);
            }

            let mut remaining = value_lines.as_slice();
            let mut first = true;
            while !remaining.is_empty() {
                let room = self.room(height, 0.0);
                if room == 0 {
                    self.new_page();
                    continue;
                }
                let (chunk, rest) = remaining.split_at(room.min(remaining.len()));
                let top = self.y;
                if first {
                    self.push(DrawOp::Text {
                        text: row.label.clone(),
                        size: 10.0,
                        x: MARGIN_LEFT + 5.0,
                        y: top - height,
                        face: Face::Bold,
                        ink: Ink::Body,
                    });
                    first = false;
                }
                for (i, line) in chunk.iter().enumerate() {
                    self.push(DrawOp::Text {
                        text: line.clone(),
                        size: 10.0,
                        x: TABLE_VALUE_X,
                        y: top - height * (i + 1) as f32,
                        face: Face::Regular,
                        ink: Ink::Body,
                    });
                }
                self.y = top - height * chunk.len() as f32;
                remaining = rest;
            }
            self.y -= 1.0;
        }
    }

    fn block(&mut self, block: &Block) {
        match block {
            Block::Subheading(text) => {
                self.gap(1.5);
                self.text(text, 10.0, MARGIN_LEFT + 2.0, Face::Bold, Ink::Body);
            }
            Block::Paragraph(text) => self.text(text, 10.0, MARGIN_LEFT + 2.0, Face::Regular, Ink::Body),
            Block::Labeled { label, text } => {
                self.text(&format!("{}: {}", label, text), 10.0, MARGIN_LEFT + 2.0, Face::Regular, Ink::Body)
            }
            Block::Table(rows) => self.table(rows),
            Block::Note(text) => self.centered(text, 8.0, Face::Italic, Ink::Muted),
        }
    }

    fn alert(&mut self, section: &Section) {
        let text_x = MARGIN_LEFT + 4.0;
        let width = CONTENT_WIDTH - 8.0;
        let mut lines = vec![(section.title.clone(), Face::Bold)];
        for block in &section.blocks {
            let text = match block {
                Block::Labeled { label, text } => format!("{}: {}", label, text),
                Block::Subheading(t) | Block::Paragraph(t) | Block::Note(t) => t.clone(),
                Block::Table(rows) => rows
                    .iter()
                    .map(|r| format!("{} {}", r.label, r.value))
                    .collect::<Vec<_>>()
                    .join("; "),
            };
            for line in wrap_text(&text, chars_per_line(10.0, width)) {
                lines.push((line, Face::Regular));
            }
        }

        let padding = 3.0;
        let height = line_height(10.0);
        let total = height * lines.len() as f32 + 2.0 * padding;
        if total <= TOP - BOTTOM {
            self.ensure_space(total);
        }

        // Taller alerts continue on following pages, one frame per page.
        let mut remaining = lines.as_slice();
        while !remaining.is_empty() {
            let room = self.room(height, 2.0 * padding);
            if room < remaining.len().min(2) {
                self.new_page();
                continue;
            }
            let (chunk, rest) = remaining.split_at(room.min(remaining.len()));
            let top = self.y;
            let frame_height = height * chunk.len() as f32 + 2.0 * padding;
            self.push(DrawOp::Frame {
                x: MARGIN_LEFT,
                y: top,
                width: CONTENT_WIDTH,
                height: frame_height,
                ink: Ink::Alert,
            });
            self.y -= padding;
            for (line, face) in chunk {
                self.y -= height;
                self.push(DrawOp::Text {
                    text: line.clone(),
                    size: 10.0,
                    x: text_x,
                    y: self.y,
                    face: *face,
                    ink: Ink::Alert,
                });
            }
            self.y = top - frame_height;
            remaining = rest;
        }
    }

    fn section(&mut self, section: &Section) {
        match section.style {
            SectionStyle::Title => {
                self.centered(&section.title, 16.0, Face::Bold, Ink::Heading);
                self.gap(3.0);
                for block in &section.blocks {
                    self.block(block);
                }
                self.gap(4.0);
            }
            SectionStyle::Standard => {
                // Keep a heading together with its first line.
                self.ensure_space(line_height(12.0) + line_height(10.0) + 4.0);
                self.gap(2.0);
                self.text(&section.title, 12.0, MARGIN_LEFT, Face::Bold, Ink::Heading);
                self.gap(1.5);
                for block in &section.blocks {
                    self.block(block);
                }
                self.gap(3.0);
            }
            SectionStyle::Alert => {
                self.gap(2.0);
                self.alert(section);
                self.gap(4.0);
            }
            SectionStyle::Footer => {
                self.gap(6.0);
                for block in &section.blocks {
                    self.block(block);
                    self.gap(1.0);
                }
            }
        }
    }
}

/// Lay a document out into pages of drawing operations.
pub fn layout(document: &Document) -> Vec<Vec<DrawOp>> {
    let mut layout = Layout::new();
    layout.centered(&document.title, 18.0, Face::Bold, Ink::Heading);
    layout.gap(2.0);
    for section in &document.sections {
        layout.section(section);
    }
    layout.pages
}

struct Fonts {
    regular: IndirectFontRef,
    bold: IndirectFontRef,
    italic: IndirectFontRef,
}

impl Fonts {
    fn load(doc: &PdfDocumentReference) -> ExportResult<Self> {
        let font = |builtin| {
            doc.add_builtin_font(builtin)
                .map_err(|e| ExportError::Pdf(format!("font error: {}", e)))
        };
        Ok(Self {
            regular: font(BuiltinFont::Helvetica)?,
            bold: font(BuiltinFont::HelveticaBold)?,
            italic: font(BuiltinFont::HelveticaOblique)?,
        })
    }

    fn get(&self, face: Face) -> &IndirectFontRef {
        match face {
            Face::Regular => &self.regular,
            Face::Bold => &self.bold,
            Face::Italic => &self.italic,
        }
    }
}

fn paint(layer: &PdfLayerReference, fonts: &Fonts, op: &DrawOp) {
    match op {
        DrawOp::Text {
            text,
            size,
            x,
            y,
            face,
            ink,
        } => {
            layer.set_fill_color(ink.color());
            layer.use_text(text.as_str(), *size, Mm(*x), Mm(*y), fonts.get(*face));
        }
        DrawOp::Frame {
            x,
            y,
            width,
            height,
            ink,
        } => {
            let corners = [
                (*x, *y),
                (*x + *width, *y),
                (*x + *width, *y - *height),
                (*x, *y - *height),
            ];
            let frame = Line {
                points: corners
                    .iter()
                    .map(|(px, py)| (Point::new(Mm(*px), Mm(*py)), false))
                    .collect(),
                is_closed: true,
            };
            layer.set_outline_color(ink.color());
            layer.set_outline_thickness(1.5);
            layer.add_line(frame);
        }
    }
}

/// Encode a document as PDF bytes.
pub fn document_to_pdf(document: &Document) -> ExportResult<Vec<u8>> {
    let pages = layout(document);
    let (doc, first_page, first_layer) = PdfDocument::new(
        &document.title,
        Mm(PAGE_WIDTH),
        Mm(PAGE_HEIGHT),
        "Layer 1",
    );
    let fonts = Fonts::load(&doc)?;

    for (index, ops) in pages.iter().enumerate() {
        let layer = if index == 0 {
            doc.get_page(first_page).get_layer(first_layer)
        } else {
            let (page, layer) = doc.add_page(Mm(PAGE_WIDTH), Mm(PAGE_HEIGHT), "Layer 1");
            doc.get_page(page).get_layer(layer)
        };
        for op in ops {
            paint(&layer, &fonts, op);
        }
    }
    debug!(pages = pages.len(), "laid out document");

    let mut buf = BufWriter::new(Vec::new());
    doc.save(&mut buf)
        .map_err(|e| ExportError::Pdf(format!("save error: {}", e)))?;
    buf.into_inner()
        .map_err(|e| ExportError::Pdf(format!("buffer error: {}", e)))
}

/// Keep alphanumerics, spaces, `-` and `_`; trim; spaces become `_`.
pub fn sanitize_filename(part: &str) -> String {
    let kept: String = part
        .chars()
        .filter(|c| c.is_alphanumeric() || matches!(c, ' ' | '-' | '_'))
        .collect();
    let cleaned = kept.trim().replace(' ', "_");
    if cleaned.is_empty() {
        "Unknown".to_string()
    } else {
        cleaned
    }
}

/// Output filename for a patient's note.
pub fn document_filename(patient_name: &str, patient_id: &str) -> String {
    format!(
        "soap_note_{}_{}.pdf",
        sanitize_filename(patient_name),
        sanitize_filename(patient_id)
    )
}

/// Document sink writing final records as PDF files.
#[derive(Debug, Clone, Default)]
pub struct PdfExporter {
    assembler: DocumentAssembler,
}

impl PdfExporter {
    pub fn new(assembler: DocumentAssembler) -> Self {
        Self { assembler }
    }

    pub fn assembler(&self) -> &DocumentAssembler {
        &self.assembler
    }

    /// Render a final record into `destination_dir`, returning the written path.
    ///
    /// The directory is created when missing. An existing file for the same
    /// patient is overwritten.
    pub fn render(
        &self,
        record: &FinalRecord,
        destination_dir: &Path,
        patient_name: &str,
        patient_id: &str,
    ) -> ExportResult<PathBuf> {
        let document = self.assembler.render(record);
        let path = destination_dir.join(document_filename(patient_name, patient_id));
        self.write(&document, &path)?;
        Ok(path)
    }

    /// Write an already assembled document to `path`.
    pub fn write(&self, document: &Document, path: &Path) -> ExportResult<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let bytes = document_to_pdf(document)?;
        let mut file = BufWriter::new(File::create(path)?);
        std::io::Write::write_all(&mut file, &bytes)?;
        std::io::Write::flush(&mut file)?;
        info!(path = %path.display(), bytes = bytes.len(), "wrote SOAP document");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ClinicalField, SoapNote};

    #[test]
    fn test_sanitize_filename() {
        assert_eq!(sanitize_filename("John Doe"), "John_Doe");
        assert_eq!(sanitize_filename("  O'Brien / Jr. "), "OBrien__Jr");
        assert_eq!(sanitize_filename("P-123_a"), "P-123_a");
        assert_eq!(sanitize_filename("../../"), "Unknown");
        assert_eq!(sanitize_filename(""), "Unknown");
    }

    #[test]
    fn test_document_filename() {
        assert_eq!(
            document_filename("John Doe", "P-12345"),
            "soap_note_John_Doe_P-12345.pdf"
        );
        assert_eq!(document_filename("", ""), "soap_note_Unknown_Unknown.pdf");
    }

    #[test]
    fn test_wrap_text() {
        let lines = wrap_text("one two three four five", 9);
        assert_eq!(lines, vec!["one two", "three", "four five"]);
        assert_eq!(wrap_text("", 10), vec![String::new()]);
        assert_eq!(wrap_text("a\nb", 10), vec!["a", "b"]);
    }

    #[test]
    fn test_wrap_text_counts_characters() {
        // Two-byte characters still fit ten to a line.
        assert_eq!(wrap_text("éééé ééééé", 10), vec!["éééé ééééé"]);
        assert_eq!(
            wrap_text("see https://example.org/guidelines/chest-pain now", 12),
            vec!["see", "https://exam", "ple.org/guid", "elines/chest", "-pain now"]
        );
        for line in wrap_text(&"x".repeat(95), 20) {
            assert!(line.chars().count() <= 20);
        }
    }

    fn assert_within_margins(pages: &[Vec<DrawOp>]) {
        for page in pages {
            for op in page {
                match op {
                    DrawOp::Text { y, .. } => assert!(*y >= BOTTOM && *y <= TOP, "text at {}", y),
                    DrawOp::Frame { y, height, .. } => {
                        assert!(*y <= TOP && *y - *height >= BOTTOM, "frame {}..{}", y, y - height)
                    }
                }
            }
        }
    }

    #[test]
    fn test_long_document_paginates() {
        let long = "Patient reports intermittent retrosternal discomfort. ".repeat(200);
        let notice = "Seek emergency care at once if chest pain spreads to the arm or jaw. ".repeat(95);
        let record = FinalRecord {
            soap_note: SoapNote {
                assessment: ClinicalField::Text(long),
                ..Default::default()
            },
            safety_notice: notice.clone(),
            ..Default::default()
        };
        let doc = DocumentAssembler::new().render(&record);
        let pages = layout(&doc);

        assert!(pages.len() > 2);
        assert_within_margins(&pages);

        // Every line of the notice is drawn, split over several framed fragments.
        let ops: Vec<&DrawOp> = pages.iter().flatten().collect();
        let alert_lines = ops
            .iter()
            .filter(|op| matches!(op, DrawOp::Text { ink: Ink::Alert, .. }))
            .count();
        let expected = wrap_text(&notice, chars_per_line(10.0, CONTENT_WIDTH - 8.0)).len();
        assert_eq!(alert_lines, expected + 1);

        let frames: Vec<usize> = pages
            .iter()
            .enumerate()
            .filter(|(_, page)| page.iter().any(|op| matches!(op, DrawOp::Frame { .. })))
            .map(|(index, _)| index)
            .collect();
        assert!(frames.len() > 1);
        assert!(frames.windows(2).all(|w| w[1] == w[0] + 1));
    }

    #[test]
    fn test_long_table_value_splits_across_pages() {
        let record = FinalRecord {
            patient_name: Some("Alexandria Montgomery-Fitzgerald ".repeat(300)),
            ..Default::default()
        };
        let doc = DocumentAssembler::new().render(&record);
        let pages = layout(&doc);

        assert!(pages.len() > 1);
        assert_within_margins(&pages);
        let labels = pages
            .iter()
            .flatten()
            .filter(|op| matches!(op, DrawOp::Text { text, .. } if text == "Patient:"))
            .count();
        assert_eq!(labels, 1);
    }

    #[test]
    fn test_alert_is_framed_in_alert_ink() {
        let record = FinalRecord {
            safety_notice: "Seek emergency care if chest pain worsens.".into(),
            ..Default::default()
        };
        let doc = DocumentAssembler::new().render(&record);
        let ops: Vec<DrawOp> = layout(&doc).into_iter().flatten().collect();

        let frames = ops
            .iter()
            .filter(|op| matches!(op, DrawOp::Frame { ink: Ink::Alert, .. }))
            .count();
        assert_eq!(frames, 1);
        assert!(ops.iter().any(|op| matches!(
            op,
            DrawOp::Text { text, ink: Ink::Alert, .. } if text == "SAFETY ALERT"
        )));
    }

    #[test]
    fn test_no_frame_without_safety_notice() {
        let doc = DocumentAssembler::new().render(&FinalRecord::default());
        let ops: Vec<DrawOp> = layout(&doc).into_iter().flatten().collect();
        assert!(!ops.iter().any(|op| matches!(op, DrawOp::Frame { .. })));
    }

    #[test]
    fn test_render_writes_pdf() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("pdfs");
        let exporter = PdfExporter::default();

        let path = exporter
            .render(&FinalRecord::default(), &out, "John Doe", "P-1")
            .unwrap();

        assert_eq!(path, out.join("soap_note_John_Doe_P-1.pdf"));
        let bytes = fs::read(&path).unwrap();
        assert!(bytes.starts_with(b"%PDF"));
    }
}
