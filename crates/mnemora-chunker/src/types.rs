use serde::{Deserialize, Serialize};

/// One semantically bounded fragment produced by [`crate::pipeline::chunk_file`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    pub chunk_id: String,
    pub text: String,
    pub tags: Vec<String>,
    pub density: f32,
    pub title: Option<String>,
}

/// A boundary detected during segmentation, before refinement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoundaryType {
    NumberedHeading,
    UppercaseHeader,
    QaMarker,
    ListItem,
    ParagraphBreak,
}

#[derive(Debug, Clone)]
pub(crate) struct Segment {
    pub text: String,
    pub boundary_type: Option<BoundaryType>,
    pub level: u8,
}
