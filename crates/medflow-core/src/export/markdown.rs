//! Plain-text rendering of a document.

use crate::document::{Block, Document, Section, SectionStyle};

impl Document {
    /// Render the document as Markdown, section by section.
    pub fn to_markdown(&self) -> String {
        let mut out = format!("# {}\n", self.title);
        for section in &self.sections {
            out.push('\n');
            write_section(&mut out, section);
        }
        out
    }
}

fn write_section(out: &mut String, section: &Section) {
    match section.style {
        SectionStyle::Alert => {
            out.push_str(&format!("> **{}**\n", section.title));
            for block in &section.blocks {
                for line in block_text(block).lines() {
                    out.push_str(&format!("> {}\n", line));
                }
            }
        }
        SectionStyle::Footer => {
            out.push_str("---\n\n");
            for block in &section.blocks {
                out.push_str(&block_text(block));
                out.push_str("\n\n");
            }
        }
        SectionStyle::Title | SectionStyle::Standard => {
            out.push_str(&format!("## {}\n\n", section.title));
            for block in &section.blocks {
                out.push_str(&block_text(block));
                out.push_str("\n\n");
            }
        }
    }
}

fn block_text(block: &Block) -> String {
    match block {
        Block::Subheading(text) => format!("### {}", text),
        Block::Paragraph(text) => text.clone(),
        Block::Labeled { label, text } => format!("**{}:** {}", label, text),
        Block::Table(rows) => {
            let mut table = String::from("| | |\n|---|---|");
            for row in rows {
                table.push_str(&format!("\n| {} | {} |", row.label, row.value));
            }
            table
        }
        Block::Note(text) => format!("_{}_", text),
    }
}
