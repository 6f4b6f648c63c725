use stashup_core::naming::{file_page_title, random_candidate};
use stashup_core::{UploadError, UploadService};

/// Upper bound on existence checks for one file; reaching it fails the commit.
const MAX_NAME_ATTEMPTS: usize = 100;

/// First candidate, starting with `original`, with no existing `File:` page.
/// Every retry derives a fresh random suffix from the original name.
pub async fn resolve_unique_name(
    uploads: &dyn UploadService,
    original: &str,
) -> Result<String, UploadError> {
    let mut candidate = original.to_string();
    for _ in 0..MAX_NAME_ATTEMPTS {
        if !uploads.page_exists(&file_page_title(&candidate)).await? {
            return Ok(candidate);
        }
        tracing::debug!(candidate = %candidate, "File name taken, trying another");
        candidate = random_candidate(original);
    }
    Err(UploadError::NameCollision(original.to_string()))
}
