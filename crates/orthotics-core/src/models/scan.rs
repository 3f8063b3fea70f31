//! Foot scans and prescription attachments.

use serde::{Deserialize, Serialize};

use super::choices::choice_enum;

choice_enum! {
    Foot {
        Left => "left",
        Right => "right",
    }
    default Left
}

impl Foot {
    /// Media path for this foot's file of one scan. Each scan gets its own
    /// files, so a replaced scan never shares a path with its successor.
    pub fn scan_path(&self, prescription_id: &str, scan_id: &str, extension: &str) -> String {
        format!(
            "scans/{foot}/{prescription_id}_{foot}_{scan_id}.{extension}",
            foot = self.as_str()
        )
    }
}

/// The 3D model files (STL, VRML, OBJ, PLY) scanned for a prescription.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Scan {
    pub id: String,
    pub prescription_id: String,
    /// Media path of the left foot file
    pub left_foot: Option<String>,
    pub right_foot: Option<String>,
    pub left_foot_size: Option<i64>,
    pub right_foot_size: Option<i64>,
    pub created_at: String,
    pub updated_at: String,
}

impl Scan {
    pub fn new(prescription_id: String) -> Self {
        let now = chrono::Utc::now().to_rfc3339();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            prescription_id,
            left_foot: None,
            right_foot: None,
            left_foot_size: None,
            right_foot_size: None,
            created_at: now.clone(),
            updated_at: now,
        }
    }
}

/// Any other document attached to a prescription.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Attachment {
    pub id: String,
    pub prescription_id: String,
    /// Media path of the stored file
    pub file_path: String,
    /// Display name
    pub filename: String,
    pub size_bytes: i64,
    pub uploaded_at: String,
}

impl Attachment {
    pub fn new(prescription_id: String, filename: String, size_bytes: i64) -> Self {
        let id = uuid::Uuid::new_v4().to_string();
        Self {
            file_path: format!("prescription_attachments/{id}_{filename}"),
            id,
            prescription_id,
            filename,
            size_bytes,
            uploaded_at: chrono::Utc::now().to_rfc3339(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scan_path() {
        assert_eq!(Foot::Left.scan_path("rx-1", "s-1", "stl"), "scans/left/rx-1_left_s-1.stl");
        assert_eq!(Foot::Right.scan_path("rx-1", "s-1", "ply"), "scans/right/rx-1_right_s-1.ply");
    }

    #[test]
    fn test_attachment_path_is_unique() {
        let a = Attachment::new("rx".into(), "notes.pdf".into(), 10);
        let b = Attachment::new("rx".into(), "notes.pdf".into(), 10);
        assert_ne!(a.file_path, b.file_path);
        assert!(a.file_path.starts_with("prescription_attachments/"));
        assert!(a.file_path.ends_with("_notes.pdf"));
    }
}
