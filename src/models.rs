/// One entry of the series listing page.
#[derive(Debug, Clone, PartialEq)]
pub struct SeriesRecord {
    pub title: String,
    pub detail_link: String,
    pub cover_image: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChapterRecord {
    pub name: String,
    pub url: String,
    /// Only used for ordering; 0 when the URL carries no number.
    pub chapter_number: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Padding {
    /// `01-optimized.webp`
    TwoDigit,
    /// `1-optimized.webp`
    Unpadded,
}

/// A speculative image location that still has to be probed.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageCandidate {
    pub url: String,
    pub sequence: u32,
    pub padding: Padding,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MangaRow {
    pub manga_id: u32,
    pub title: String,
    pub cover: String,
    pub chapters_json: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PictureRow {
    pub manga_id: u32,
    pub chapter_name: String,
    pub chapter_url: String,
    pub image_url: String,
    pub image_order: usize,
}
