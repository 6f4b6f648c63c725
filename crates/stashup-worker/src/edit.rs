//! Image claim on the contribution's place target after a successful commit.

use chrono::Utc;

use stashup_core::models::{
    Contribution, NotificationEvent, Place, PlaceEditOutcome, PlaceTarget, UploadResult,
};
use stashup_core::WorkerConfig;

use crate::context::UploadContext;

/// Runs the claim for `place` when it applies and reports the outcome.
/// Errors are logged; the upload itself has already succeeded.
#[tracing::instrument(skip_all, fields(page_id = %contribution.page_id, place_id = %place.id))]
pub async fn run_place_edit(
    ctx: &UploadContext,
    config: &WorkerConfig,
    contribution: &Contribution,
    place: &PlaceTarget,
    upload_result: &UploadResult,
) -> PlaceEditOutcome {
    let outcome = if contribution.has_invalid_location() {
        tracing::info!("Place has no coordinates, not claiming image");
        PlaceEditOutcome {
            place_id: place.id.clone(),
            revision_id: None,
            skipped: false,
        }
    } else if place.has_image() {
        tracing::debug!("Place already has an image");
        PlaceEditOutcome {
            place_id: place.id.clone(),
            revision_id: None,
            skipped: true,
        }
    } else {
        let revision_id = match ctx
            .structured_data
            .attach_image_reference(place, &upload_result.filename, &contribution.captions)
            .await
        {
            Ok(revision) => revision,
            Err(e) => {
                tracing::warn!(error = %e, error_code = e.error_code(), "Image claim failed");
                None
            }
        };
        if revision_id.is_some() {
            update_place_cache(ctx, config, place, upload_result).await;
        }
        PlaceEditOutcome {
            place_id: place.id.clone(),
            revision_id,
            skipped: false,
        }
    };

    ctx.notifications
        .notify(NotificationEvent::PlaceEditOutcome(outcome.clone()))
        .await;
    outcome
}

async fn update_place_cache(
    ctx: &UploadContext,
    config: &WorkerConfig,
    place: &PlaceTarget,
    upload_result: &UploadResult,
) {
    let pic = format!("{}{}", config.home_url, upload_result.canonical_file_name());
    match ctx.places.fetch(&place.id).await {
        Ok(Some(cached)) if cached.name != place.name => {
            tracing::debug!(old = %cached.name, new = %place.name, "Refreshing cached place name");
        }
        Ok(_) => {}
        Err(e) => tracing::warn!(error = %e, "Failed to read place cache"),
    }
    let updated = Place {
        entity_id: place.id.clone(),
        name: place.name.clone(),
        pic: Some(pic),
        updated_at: Utc::now(),
    };
    if let Err(e) = ctx.places.save(&updated).await {
        tracing::warn!(error = %e, "Failed to update place cache");
    }
}
