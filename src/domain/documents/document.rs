use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Collaborative document kind. Fixed at creation time; selects the room
/// variant and the cache key family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentKind {
    Yjs,
    Whiteboard,
    Spreadsheet,
    Note,
}

impl DocumentKind {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "yjs" => Some(Self::Yjs),
            "whiteboard" => Some(Self::Whiteboard),
            "spreadsheet" => Some(Self::Spreadsheet),
            "note" => Some(Self::Note),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Yjs => "yjs",
            Self::Whiteboard => "whiteboard",
            Self::Spreadsheet => "spreadsheet",
            Self::Note => "note",
        }
    }
}

#[derive(Debug, Clone)]
pub struct ViewRecord {
    pub id: Uuid,
    pub kind: DocumentKind,
    pub data: Option<String>,
    pub yjs_state: Option<Vec<u8>>,
    pub is_public: bool,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Clone)]
pub struct NoteRecord {
    pub id: Uuid,
    pub title: String,
    pub content: String,
    pub updated_by: Option<String>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

/// A drawable object on the whiteboard canvas.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CanvasObject {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub data: serde_json::Value,
}

/// A placed object referencing other content (text, note, view embed).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ViewObject {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub name: String,
    pub data: serde_json::Value,
}

/// Cached note fields; `updated_at` is RFC 3339 text, matching the hash
/// representation in the cache.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NoteData {
    pub title: String,
    pub content: String,
    pub updated_at: String,
    pub updated_by: String,
}
