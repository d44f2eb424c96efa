//! Google Drive lookups made on the user's behalf during setup.

use serde::{Deserialize, Serialize};

pub const SPREADSHEET_MIME: &str = "application/vnd.google-apps.spreadsheet";
pub const DOCUMENT_MIME: &str = "application/vnd.google-apps.document";
pub const FOLDER_MIME: &str = "application/vnd.google-apps.folder";

/// Matches returned for a name search.
pub const SEARCH_PAGE_SIZE: u32 = 5;
/// Files listed when the user does not know a name.
pub const RECENT_PAGE_SIZE: u32 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriveFileType {
    Spreadsheet,
    Document,
    Folder,
    Any,
}

impl DriveFileType {
    /// Unrecognized kinds search everything.
    pub fn parse(kind: &str) -> Self {
        match kind.trim().to_lowercase().as_str() {
            "spreadsheet" | "sheet" => Self::Spreadsheet,
            "document" | "doc" => Self::Document,
            "folder" => Self::Folder,
            _ => Self::Any,
        }
    }

    pub fn mime_type(self) -> Option<&'static str> {
        match self {
            Self::Spreadsheet => Some(SPREADSHEET_MIME),
            Self::Document => Some(DOCUMENT_MIME),
            Self::Folder => Some(FOLDER_MIME),
            Self::Any => None,
        }
    }

    /// "spreadsheets", or "files" for any kind.
    pub fn plural(self) -> &'static str {
        match self {
            Self::Spreadsheet => "spreadsheets",
            Self::Document => "documents",
            Self::Folder => "folders",
            Self::Any => "files",
        }
    }

    /// Config field a pick fills when the tool was not told which.
    pub fn default_field(self) -> Option<&'static str> {
        match self {
            Self::Folder => Some("FOLDER_ID"),
            Self::Spreadsheet => Some("SPREADSHEET_ID"),
            _ => None,
        }
    }
}

/// One entry of a Drive `files.list` response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DriveFile {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub mime_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modified_time: Option<String>,
}

/// Quote a literal for the Drive query language.
fn quoted(value: &str) -> String {
    format!("'{}'", value.replace('\\', "\\\\").replace('\'', "\\'"))
}

fn with_type(mut query: String, kind: DriveFileType) -> String {
    if let Some(mime) = kind.mime_type() {
        query.push_str(&format!(" and mimeType = {}", quoted(mime)));
    }
    query
}

/// `q` for files whose name contains `name`.
pub fn search_query(name: &str, kind: DriveFileType) -> String {
    with_type(
        format!("name contains {} and trashed = false", quoted(name.trim())),
        kind,
    )
}

/// `q` for the user's files of a kind.
pub fn recent_query(kind: DriveFileType) -> String {
    with_type("trashed = false".to_string(), kind)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn queries() {
        assert_eq!(
            search_query("Invoices", DriveFileType::Folder),
            "name contains 'Invoices' and trashed = false and mimeType = 'application/vnd.google-apps.folder'"
        );
        assert_eq!(recent_query(DriveFileType::Any), "trashed = false");
    }

    #[test]
    fn names_are_escaped() {
        assert_eq!(
            search_query("Bob's \\ sheet", DriveFileType::Any),
            r"name contains 'Bob\'s \\ sheet' and trashed = false"
        );
    }

    #[test]
    fn kinds() {
        assert_eq!(DriveFileType::parse("Sheet"), DriveFileType::Spreadsheet);
        assert_eq!(DriveFileType::parse("video"), DriveFileType::Any);
        assert_eq!(DriveFileType::Folder.default_field(), Some("FOLDER_ID"));
        assert_eq!(DriveFileType::Document.default_field(), None);
    }

    #[test]
    fn files_use_drive_field_names() {
        let file: DriveFile = serde_json::from_str(
            r#"{"id":"1a","name":"Q1","mimeType":"application/vnd.google-apps.spreadsheet","modifiedTime":"2026-01-02T00:00:00Z"}"#,
        )
        .unwrap();
        assert_eq!(file.mime_type, SPREADSHEET_MIME);
        assert_eq!(file.modified_time.as_deref(), Some("2026-01-02T00:00:00Z"));
    }
}
