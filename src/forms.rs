//! Dynamic forms: the single live input surface and the policy that picks it.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::InputError;
use crate::session::Persona;
use crate::surface::Surface;

/// Spreadsheet column name → contact field name.
pub type ColumnMapping = BTreeMap<String, String>;

const SPREADSHEET_EXTENSIONS: &[&str] = &["xlsx", "xls", "csv"];
const SCAN_EXTENSIONS: &[&str] = &[
    "png", "jpg", "jpeg", "gif", "webp", "bmp", "tif", "tiff", "heic", "pdf",
];
const SPREADSHEET_MIME_TYPES: &[&str] = &[
    "text/csv",
    "application/vnd.ms-excel",
    "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
];

/// How a supplied file is handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileKind {
    /// Image or PDF: scanned for a business card.
    Scan,
    /// Spreadsheet: column mapping, then bulk import.
    Spreadsheet,
    /// Anything else; rejected before any network call.
    Unsupported,
}

impl FileKind {
    /// Classify by extension, falling back to the declared MIME type.
    pub fn detect(name: &str, mime: Option<&str>) -> FileKind {
        let ext = Path::new(name)
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase);

        if let Some(ext) = ext.as_deref() {
            if SPREADSHEET_EXTENSIONS.contains(&ext) {
                return Self::Spreadsheet;
            }
            if SCAN_EXTENSIONS.contains(&ext) {
                return Self::Scan;
            }
        }

        let Some(mime) = mime.map(|m| m.trim().to_ascii_lowercase()) else {
            return Self::Unsupported;
        };
        if SPREADSHEET_MIME_TYPES.contains(&mime.as_str()) {
            Self::Spreadsheet
        } else if mime.starts_with("image/") || mime == "application/pdf" {
            Self::Scan
        } else {
            Self::Unsupported
        }
    }
}

/// A file supplied by drop or picker.
#[derive(Clone)]
pub struct FileRef {
    pub name: String,
    pub mime: Option<String>,
    pub kind: FileKind,
    pub bytes: Arc<[u8]>,
}

impl FileRef {
    pub fn new(name: impl Into<String>, mime: Option<String>, bytes: impl Into<Arc<[u8]>>) -> Self {
        let name = name.into();
        let kind = FileKind::detect(&name, mime.as_deref());
        Self {
            name,
            mime,
            kind,
            bytes: bytes.into(),
        }
    }

    /// Read a file from disk; the kind comes from its extension.
    pub async fn from_path(path: &Path) -> std::io::Result<Self> {
        let bytes = tokio::fs::read(path).await?;
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("file")
            .to_string();
        Ok(Self::new(name, None, bytes))
    }

    /// Reject kinds the widget cannot route.
    pub fn ensure_supported(&self) -> Result<FileKind, InputError> {
        match self.kind {
            FileKind::Unsupported => Err(InputError::UnsupportedFile {
                name: self.name.clone(),
            }),
            kind => Ok(kind),
        }
    }

    /// MIME type sent with the multipart part.
    pub fn content_type(&self) -> &str {
        if let Some(mime) = self.mime.as_deref() {
            return mime;
        }
        let ext = Path::new(&self.name)
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();
        match ext.as_str() {
            "png" => "image/png",
            "jpg" | "jpeg" => "image/jpeg",
            "gif" => "image/gif",
            "webp" => "image/webp",
            "pdf" => "application/pdf",
            "csv" => "text/csv",
            "xls" => "application/vnd.ms-excel",
            "xlsx" => "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
            _ => "application/octet-stream",
        }
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

impl std::fmt::Debug for FileRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileRef")
            .field("name", &self.name)
            .field("mime", &self.mime)
            .field("kind", &self.kind)
            .field("len", &self.bytes.len())
            .finish()
    }
}

/// The input surface currently offered to the user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "form", rename_all = "snake_case")]
pub enum DynamicForm {
    /// Plain text box for chatting.
    TextPrompt,
    /// Asks for the access token.
    TokenEntry,
    /// Drop target / file picker, waiting for a file.
    FileDrop,
    /// Optional notes plus a confirm button for a scanned file.
    NotesAndFileConfirm { file_name: String },
    /// Editable column mapping, pre-filled with the service's suggestion.
    SpreadsheetMapping {
        file_name: String,
        suggested: ColumnMapping,
    },
}

impl DynamicForm {
    pub fn label(&self) -> &'static str {
        match self {
            Self::TextPrompt => "text_prompt",
            Self::TokenEntry => "token_entry",
            Self::FileDrop => "file_drop",
            Self::NotesAndFileConfirm { .. } => "notes_and_file_confirm",
            Self::SpreadsheetMapping { .. } => "spreadsheet_mapping",
        }
    }
}

/// A submitted dynamic form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FormSubmission {
    /// TokenEntry: the candidate token.
    Token(String),
    /// NotesAndFileConfirm: scan and import with optional notes.
    Notes { notes: String },
    /// NotesAndFileConfirm: OCR preview only; the form stays.
    Preview,
    /// SpreadsheetMapping: the (possibly edited) mapping.
    Mapping(ColumnMapping),
    /// Any file form: drop the pending file and go back to the drop surface.
    Cancel,
}

/// What the registry decided for the current state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NextForm {
    Show(DynamicForm),
    /// A spreadsheet needs a mapping suggestion from the service before its form exists.
    AwaitMappingSuggestion,
    /// The file kind has no form; the current form stays.
    Unsupported,
}

/// Form selection policy.
pub struct FormRegistry;

impl FormRegistry {
    /// Pick the next form for (persona, token presence, supplied file).
    pub fn next_form(persona: Persona, has_token: bool, file: Option<&FileRef>) -> NextForm {
        match (persona, has_token, file) {
            (Persona::Qa, _, _) => NextForm::Show(DynamicForm::TextPrompt),
            (Persona::Ingest, false, _) => NextForm::Show(DynamicForm::TokenEntry),
            (Persona::Ingest, true, None) => NextForm::Show(DynamicForm::FileDrop),
            (Persona::Ingest, true, Some(f)) => match f.kind {
                FileKind::Spreadsheet => NextForm::AwaitMappingSuggestion,
                FileKind::Scan => NextForm::Show(DynamicForm::NotesAndFileConfirm {
                    file_name: f.name.clone(),
                }),
                FileKind::Unsupported => NextForm::Unsupported,
            },
        }
    }

    /// The resting form of a state, with no file in play.
    pub fn resting_form(persona: Persona, has_token: bool) -> DynamicForm {
        match Self::next_form(persona, has_token, None) {
            NextForm::Show(form) => form,
            NextForm::AwaitMappingSuggestion | NextForm::Unsupported => DynamicForm::FileDrop,
        }
    }
}

/// Holds the one live form; showing a new one replaces the old.
pub struct FormSlot {
    live: DynamicForm,
    surface: Arc<dyn Surface>,
}

impl FormSlot {
    pub fn new(surface: Arc<dyn Surface>) -> Self {
        Self {
            live: DynamicForm::TextPrompt,
            surface,
        }
    }

    pub fn show(&mut self, form: DynamicForm) {
        tracing::debug!(from = self.live.label(), to = form.label(), "Form replaced");
        self.surface.render_form(&form);
        self.live = form;
    }

    pub fn live(&self) -> &DynamicForm {
        &self.live
    }
}
