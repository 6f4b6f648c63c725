use stashup_core::hashing::sha1_of_file_or_empty;
use stashup_core::models::{Contribution, UploadResult, UploadedStatus};
use stashup_core::UploadError;

use crate::context::UploadContext;

/// Replaces the pending record with its completed form and writes the integrity
/// audit. Returns the completed record.
///
/// Errors come from fetching the canonical record or from the swap; the audit
/// is best-effort once the swap went through.
#[tracing::instrument(skip_all, fields(page_id = %contribution.page_id))]
pub async fn record_completion(
    ctx: &UploadContext,
    contribution: &Contribution,
    upload_result: &UploadResult,
) -> Result<Contribution, UploadError> {
    let record = ctx
        .metadata
        .fetch_canonical_record(&upload_result.canonical_file_name())
        .await?;
    let completed = contribution.complete_with(record);
    ctx.contributions
        .delete_and_insert(contribution, &completed)
        .await?;

    if contribution.content_uri.is_some() {
        let modified_sha1 = sha1_of_file_or_empty(&contribution.local_path).await;
        let status = UploadedStatus::new(contribution.image_sha1.clone(), modified_sha1);
        let integrity_ok = status.integrity_ok;
        match ctx.uploaded_status.insert_uploaded(&status).await {
            Ok(written) => tracing::debug!(written, integrity_ok, "Upload audit recorded"),
            Err(e) => tracing::error!(error = %e, "Failed to write upload audit record"),
        }
    }

    tracing::info!(filename = %completed.filename, "Contribution completed");
    Ok(completed)
}
