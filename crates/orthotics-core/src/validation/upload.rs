//! Upload validation for foot scans and prescription attachments.

use std::path::Path;

use crate::config::CoreConfig;

/// Size of the fixed binary STL prelude: 80-byte header plus triangle count.
const STL_PRELUDE_LEN: usize = 84;

/// Bytes per triangle record in a binary STL.
const STL_TRIANGLE_LEN: u64 = 50;

/// Allowed drift between the declared and actual binary STL size.
const STL_SIZE_TOLERANCE: u64 = 100;

/// A file received from an outer surface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedFile {
    /// Name as supplied by the client; may contain a path.
    pub filename: String,
    pub content: Vec<u8>,
}

impl UploadedFile {
    pub fn new(filename: impl Into<String>, content: impl Into<Vec<u8>>) -> Self {
        Self {
            filename: filename.into(),
            content: content.into(),
        }
    }

    pub fn size(&self) -> usize {
        self.content.len()
    }
}

/// Scan acceptance limits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanLimits {
    pub max_bytes: usize,
    /// Lower-case extensions without the leading dot.
    pub allowed_extensions: Vec<String>,
}

impl ScanLimits {
    pub fn from_config(config: &CoreConfig) -> Self {
        Self {
            max_bytes: config.max_scan_bytes,
            allowed_extensions: config
                .allowed_scan_extensions
                .iter()
                .map(|ext| ext.trim_start_matches('.').to_ascii_lowercase())
                .collect(),
        }
    }
}

impl Default for ScanLimits {
    fn default() -> Self {
        Self::from_config(&CoreConfig::default())
    }
}

/// Strip any directory components from a client-supplied filename.
pub fn sanitize_filename(filename: &str) -> Option<String> {
    let normalized = filename.replace('\\', "/");
    Path::new(&normalized)
        .file_name()
        .and_then(|name| name.to_str())
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(str::to_string)
}

/// Lower-case extension of `filename`, without the dot.
pub fn file_extension(filename: &str) -> Option<String> {
    Path::new(filename)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase)
}

/// Validate a single scan file, returning its lower-case extension.
///
/// Error messages are meant for the end user.
pub fn validate_scan_file(file: &UploadedFile, limits: &ScanLimits) -> Result<String, String> {
    let extension = sanitize_filename(&file.filename)
        .as_deref()
        .and_then(file_extension)
        .unwrap_or_default();

    if !limits.allowed_extensions.iter().any(|allowed| *allowed == extension) {
        let allowed = limits
            .allowed_extensions
            .iter()
            .map(|ext| format!(".{ext}"))
            .collect::<Vec<_>>()
            .join(", ");
        return Err(format!(
            "File extension not allowed. Allowed extensions are: {allowed}"
        ));
    }

    if file.content.is_empty() {
        return Err("The submitted file is empty.".to_string());
    }

    if file.size() > limits.max_bytes {
        return Err(format!(
            "File size exceeds maximum limit of {} MB",
            limits.max_bytes / (1024 * 1024)
        ));
    }

    if extension == "stl" && !is_valid_stl(&file.content) {
        return Err("Invalid STL file format".to_string());
    }

    Ok(extension)
}

/// ASCII STL (`solid` header) or a binary STL whose triangle count agrees
/// with its size.
pub fn is_valid_stl(content: &[u8]) -> bool {
    is_ascii_stl(content) || is_binary_stl(content)
}

pub fn is_ascii_stl(content: &[u8]) -> bool {
    content.starts_with(b"solid")
}

pub fn is_binary_stl(content: &[u8]) -> bool {
    if content.len() < STL_PRELUDE_LEN {
        return false;
    }

    let mut count = [0u8; 4];
    count.copy_from_slice(&content[80..STL_PRELUDE_LEN]);
    let triangles = u64::from(u32::from_le_bytes(count));

    let expected = STL_PRELUDE_LEN as u64 + STL_TRIANGLE_LEN * triangles;
    expected.abs_diff(content.len() as u64) < STL_SIZE_TOLERANCE
}

#[cfg(test)]
mod tests {
    use super::*;

    fn binary_stl(triangles: u32, padding: usize) -> Vec<u8> {
        let mut content = vec![0u8; 80];
        content.extend_from_slice(&triangles.to_le_bytes());
        content.extend(std::iter::repeat(0u8).take(50 * triangles as usize + padding));
        content
    }

    #[test]
    fn test_sanitize_filename_strips_paths() {
        assert_eq!(sanitize_filename("../../etc/passwd").as_deref(), Some("passwd"));
        assert_eq!(sanitize_filename("C:\\scans\\left.STL").as_deref(), Some("left.STL"));
        assert_eq!(sanitize_filename("  "), None);
        assert_eq!(sanitize_filename(""), None);
    }

    #[test]
    fn test_extension_rules() {
        let limits = ScanLimits::default();

        let png = UploadedFile::new("foot.png", b"solid test".to_vec());
        let err = validate_scan_file(&png, &limits).unwrap_err();
        assert!(err.starts_with("File extension not allowed"));
        assert!(err.contains(".stl"));

        let upper = UploadedFile::new("LEFT.OBJ", b"v 0 0 0".to_vec());
        assert_eq!(validate_scan_file(&upper, &limits).unwrap(), "obj");

        let none = UploadedFile::new("scan", b"solid".to_vec());
        assert!(validate_scan_file(&none, &limits).is_err());
    }

    #[test]
    fn test_empty_and_oversized_files_rejected() {
        let limits = ScanLimits {
            max_bytes: 16,
            allowed_extensions: vec!["ply".to_string()],
        };

        let empty = UploadedFile::new("a.ply", Vec::new());
        assert!(validate_scan_file(&empty, &limits).is_err());

        let big = UploadedFile::new("a.ply", vec![1u8; 17]);
        assert!(validate_scan_file(&big, &limits)
            .unwrap_err()
            .contains("maximum limit"));

        let exact = UploadedFile::new("a.ply", vec![1u8; 16]);
        assert!(validate_scan_file(&exact, &limits).is_ok());
    }

    #[test]
    fn test_ascii_stl_accepted() {
        let file = UploadedFile::new("left.stl", b"solid test".to_vec());
        assert_eq!(validate_scan_file(&file, &ScanLimits::default()).unwrap(), "stl");
    }

    #[test]
    fn test_binary_stl_size_tolerance() {
        assert!(is_binary_stl(&binary_stl(3, 0)));
        assert!(is_binary_stl(&binary_stl(3, 99)));
        assert!(!is_binary_stl(&binary_stl(3, 100)));
        assert!(!is_binary_stl(&[0u8; 40]));
    }

    #[test]
    fn test_garbage_stl_rejected() {
        let mut content = binary_stl(1000, 0);
        content.truncate(200);
        let file = UploadedFile::new("right.stl", content);
        assert_eq!(
            validate_scan_file(&file, &ScanLimits::default()).unwrap_err(),
            "Invalid STL file format"
        );
    }

    #[test]
    fn test_non_stl_formats_skip_content_check() {
        let file = UploadedFile::new("right.wrl", b"#VRML V2.0 utf8".to_vec());
        assert_eq!(validate_scan_file(&file, &ScanLimits::default()).unwrap(), "wrl");
    }
}
