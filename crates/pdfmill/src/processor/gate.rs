//! Validation gate run against a downloaded source document.

use std::path::{Path, PathBuf};

use lopdf::{Dictionary, Document, Object, ObjectId};
use thiserror::Error;

use crate::task::ErrorCode;

const PDF_MIME: &str = "application/pdf";

#[derive(Error, Debug)]
pub enum GateError {
    #[error("Document is encrypted")]
    Encrypted,

    #[error("Page {page} has an invalid aspect ratio {ratio:.2}")]
    PageRatioInvalid { page: u32, ratio: f64 },

    #[error("Unsupported content type '{0}'")]
    MimeUnsupported(String),

    #[error("Document is {size} bytes, limit is {limit}")]
    TooLarge { size: u64, limit: u64 },

    #[error("Document has {pages} pages, limit is {limit}")]
    TooManyPages { pages: usize, limit: usize },

    #[error("Failed to read '{path}': {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl GateError {
    pub fn code(&self) -> ErrorCode {
        match self {
            GateError::Encrypted => ErrorCode::FileEncryptionFound,
            GateError::PageRatioInvalid { .. } => ErrorCode::FilePageRatioInvalid,
            GateError::MimeUnsupported(_) => ErrorCode::FileMimeUnsupported,
            GateError::TooLarge { .. } => ErrorCode::FileSizeTooLarge,
            GateError::TooManyPages { .. } => ErrorCode::FilePagesTooMany,
            GateError::Read { .. } => ErrorCode::SysInternalError,
        }
    }
}

/// Thresholds a source document must stay within.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Limits {
    pub max_file_size: u64,
    pub max_pages: usize,
    /// Upper bound of long side / short side for every page.
    pub max_page_ratio: f64,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_file_size: 200 * 1024 * 1024,
            max_pages: 1000,
            max_page_ratio: 5.0,
        }
    }
}

pub trait FileGate: Send + Sync {
    /// Inspects `path` without modifying it.
    fn validate(&self, path: &Path) -> Result<(), GateError>;
}

pub struct PdfGate {
    limits: Limits,
}

impl PdfGate {
    pub fn new(limits: Limits) -> Self {
        Self { limits }
    }
}

impl FileGate for PdfGate {
    fn validate(&self, path: &Path) -> Result<(), GateError> {
        let read_err = |e| GateError::Read {
            path: path.to_path_buf(),
            source: e,
        };

        let size = std::fs::metadata(path).map_err(read_err)?.len();
        if size > self.limits.max_file_size {
            return Err(GateError::TooLarge {
                size,
                limit: self.limits.max_file_size,
            });
        }

        let bytes = std::fs::read(path).map_err(read_err)?;
        let mime = infer::get(&bytes)
            .map(|kind| kind.mime_type())
            .unwrap_or("application/octet-stream");
        if mime != PDF_MIME {
            return Err(GateError::MimeUnsupported(mime.to_string()));
        }

        let doc = Document::load_mem(&bytes).map_err(|e| match e {
            lopdf::Error::Decryption(_) | lopdf::Error::InvalidPassword => GateError::Encrypted,
            e => {
                tracing::debug!("lopdf failed to parse document: {}", e);
                GateError::MimeUnsupported(PDF_MIME.to_string())
            }
        })?;
        // Documents opened with an empty user password are decrypted on load
        if doc.is_encrypted() || doc.was_encrypted() {
            return Err(GateError::Encrypted);
        }

        let pages = doc.get_pages();
        if pages.is_empty() {
            return Err(GateError::MimeUnsupported(PDF_MIME.to_string()));
        }
        if pages.len() > self.limits.max_pages {
            return Err(GateError::TooManyPages {
                pages: pages.len(),
                limit: self.limits.max_pages,
            });
        }

        for (number, page_id) in pages {
            let Some((width, height)) = page_size(&doc, page_id) else {
                continue;
            };
            let (long, short) = if width >= height {
                (width, height)
            } else {
                (height, width)
            };
            let ratio = if short > 0.0 { long / short } else { f64::INFINITY };
            if ratio > self.limits.max_page_ratio {
                return Err(GateError::PageRatioInvalid {
                    page: number,
                    ratio,
                });
            }
        }

        Ok(())
    }
}

/// Width and height of a page's MediaBox, following `Parent` inheritance.
fn page_size(doc: &Document, page_id: ObjectId) -> Option<(f64, f64)> {
    let mut dict: &Dictionary = doc.get_dictionary(page_id).ok()?;
    for _ in 0..32 {
        if let Ok(media_box) = dict.get(b"MediaBox") {
            let (_, media_box) = doc.dereference(media_box).ok()?;
            let coords = media_box
                .as_array()
                .ok()?
                .iter()
                .map(|v| number(doc, v))
                .collect::<Option<Vec<f64>>>()?;
            if coords.len() != 4 {
                return None;
            }
            return Some(((coords[2] - coords[0]).abs(), (coords[3] - coords[1]).abs()));
        }
        let parent = dict.get(b"Parent").ok()?.as_reference().ok()?;
        dict = doc.get_dictionary(parent).ok()?;
    }
    None
}

fn number(doc: &Document, value: &Object) -> Option<f64> {
    let (_, value) = doc.dereference(value).ok()?;
    match value {
        Object::Integer(i) => Some(*i as f64),
        Object::Real(r) => Some(f64::from(*r)),
        _ => None,
    }
}
