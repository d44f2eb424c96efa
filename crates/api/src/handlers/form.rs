//! Buffered multipart forms for the upload endpoints.

use std::collections::HashMap;

use agora_core::listing::FileMeta;
use axum::extract::Multipart;

use crate::error::{AppError, AppResult};

/// An uploaded file held in memory.
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub file_name: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

impl UploadedFile {
    pub fn size(&self) -> u64 {
        self.bytes.len() as u64
    }

    pub fn meta(&self) -> FileMeta {
        FileMeta {
            name: self.file_name.clone(),
            content_type: self.content_type.clone(),
            size: self.size(),
        }
    }
}

/// Text fields (repeatable) and files of one multipart request.
#[derive(Debug, Default)]
pub struct UploadForm {
    fields: HashMap<String, Vec<String>>,
    files: HashMap<String, UploadedFile>,
}

impl UploadForm {
    /// Drain the request. A part with a file name is a file; anything else is text.
    pub async fn read(mut multipart: Multipart) -> AppResult<Self> {
        let mut form = Self::default();
        while let Some(field) = multipart
            .next_field()
            .await
            .map_err(|e| AppError::BadRequest(e.to_string()))?
        {
            let name = field.name().unwrap_or_default().to_string();
            match field.file_name().map(str::to_string) {
                Some(file_name) => {
                    let content_type = field
                        .content_type()
                        .unwrap_or("application/octet-stream")
                        .to_string();
                    let bytes = field
                        .bytes()
                        .await
                        .map_err(|e| AppError::BadRequest(e.to_string()))?;
                    form.files.insert(
                        name,
                        UploadedFile {
                            file_name,
                            content_type,
                            bytes: bytes.to_vec(),
                        },
                    );
                }
                None => {
                    let text = field
                        .text()
                        .await
                        .map_err(|e| AppError::BadRequest(e.to_string()))?;
                    form.fields.entry(name).or_default().push(text);
                }
            }
        }
        Ok(form)
    }

    /// First value of a text field, or empty.
    pub fn text(&self, name: &str) -> String {
        self.fields
            .get(name)
            .and_then(|v| v.first())
            .cloned()
            .unwrap_or_default()
    }

    /// A list field sent either as repeated parts, a JSON array, or
    /// newline-separated text.
    pub fn list(&self, name: &str) -> Vec<String> {
        let Some(values) = self.fields.get(name) else {
            return Vec::new();
        };
        if let [single] = values.as_slice() {
            if let Ok(items) = serde_json::from_str::<Vec<String>>(single) {
                return items;
            }
            return agora_core::listing::split_lines(single);
        }
        values.clone()
    }

    /// An integer field; blank or malformed values are `None`.
    pub fn integer(&self, name: &str) -> Option<i64> {
        self.text(name).trim().parse().ok()
    }

    pub fn file(&self, name: &str) -> Option<&UploadedFile> {
        self.files.get(name)
    }

    pub fn take_file(&mut self, name: &str) -> Option<UploadedFile> {
        self.files.remove(name)
    }
}
