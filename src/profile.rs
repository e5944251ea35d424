use log::info;
use std::path::{Path, PathBuf};

use crate::error::ProfileError;

const DEFAULT_TEXT_CV: &str = "cv.txt";
const DEFAULT_PDF_CV: &str = "cv.pdf";

/// `cv.txt` when present, otherwise `cv.pdf`.
pub fn default_cv_path() -> PathBuf {
    let text = PathBuf::from(DEFAULT_TEXT_CV);
    if text.exists() {
        text
    } else {
        PathBuf::from(DEFAULT_PDF_CV)
    }
}

/// Read the candidate profile as plain text. PDFs are converted; anything else is read as UTF-8.
pub fn read_profile(path: &Path) -> Result<String, ProfileError> {
    if !path.exists() {
        return Err(ProfileError::NotFound(path.to_path_buf()));
    }

    let is_pdf = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"));

    let text = if is_pdf {
        pdf_extract::extract_text(path).map_err(|e| ProfileError::Pdf(e.to_string()))?
    } else {
        std::fs::read_to_string(path)?
    };

    if text.trim().is_empty() {
        return Err(ProfileError::Empty(path.to_path_buf()));
    }

    info!("Loaded CV from {} ({} characters)", path.display(), text.chars().count());
    Ok(text)
}
