use std::fs::File;
use std::io::{BufWriter, Write};

use crate::fetch::CrawlError;
use crate::models::{MangaRow, PictureRow};

pub const DELIMITER: char = '|';
pub const MANGA_HEADER: &str = "manga_id|title|cover|chapters";
pub const PICTURE_HEADER: &str = "manga_id|chapter_name|chapter_url|image_url|image_order";

// ── Escaping ─────────────────────────────────────────────────────────────────

/// Backslash-escape the delimiter and line breaks so a field stays on one line.
pub fn escape_field(field: &str) -> String {
    let mut out = String::with_capacity(field.len());
    for ch in field.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '|' => out.push_str("\\|"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            other => out.push(other),
        }
    }
    out
}

/// Split one written line back into its unescaped fields.
pub fn split_row(line: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut chars = line.chars();

    while let Some(ch) = chars.next() {
        match ch {
            '\\' => match chars.next() {
                Some('n') => current.push('\n'),
                Some('r') => current.push('\r'),
                Some(other) => current.push(other),
                None => current.push('\\'),
            },
            DELIMITER => fields.push(std::mem::take(&mut current)),
            other => current.push(other),
        }
    }
    fields.push(current);
    fields
}

// ── Writer ───────────────────────────────────────────────────────────────────

/// The series table and the picture table, written side by side.
pub struct TableWriter<W: Write> {
    manga: W,
    pictures: W,
}

impl TableWriter<BufWriter<File>> {
    /// Create (truncating) both files and write their headers.
    pub fn create(manga_path: &str, picture_path: &str) -> Result<Self, CrawlError> {
        let manga = BufWriter::new(File::create(manga_path)?);
        let pictures = BufWriter::new(File::create(picture_path)?);
        Self::new(manga, pictures)
    }
}

impl<W: Write> TableWriter<W> {
    pub fn new(mut manga: W, mut pictures: W) -> Result<Self, CrawlError> {
        writeln!(manga, "{MANGA_HEADER}")?;
        writeln!(pictures, "{PICTURE_HEADER}")?;
        Ok(Self { manga, pictures })
    }

    pub fn write_manga(&mut self, row: &MangaRow) -> Result<(), CrawlError> {
        writeln!(
            self.manga,
            "{}|{}|{}|{}",
            row.manga_id,
            escape_field(&row.title),
            escape_field(&row.cover),
            escape_field(&row.chapters_json),
        )?;
        Ok(())
    }

    pub fn write_picture(&mut self, row: &PictureRow) -> Result<(), CrawlError> {
        writeln!(
            self.pictures,
            "{}|{}|{}|{}|{}",
            row.manga_id,
            escape_field(&row.chapter_name),
            escape_field(&row.chapter_url),
            escape_field(&row.image_url),
            row.image_order,
        )?;
        Ok(())
    }

    pub fn flush(&mut self) -> Result<(), CrawlError> {
        self.manga.flush()?;
        self.pictures.flush()?;
        Ok(())
    }

    pub fn into_inner(self) -> (W, W) {
        (self.manga, self.pictures)
    }
}
