//! Structured-data edits: the primary image claim on a place entity, and
//! depictions/captions on the uploaded file's media entity.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::BTreeMap;

use stashup_core::models::{Contribution, PlaceTarget, UploadResult};
use stashup_core::{ClientConfig, StructuredDataService, UploadError};

use crate::api::{ApiClient, Auth};
use crate::error::{ClientError, Phase};
use crate::upload::MediaWikiClient;

/// Primary image property.
const IMAGE_PROPERTY: &str = "P18";
/// Media legend qualifier, one per caption language.
const MEDIA_LEGEND_PROPERTY: &str = "P2096";
/// "Depicts" statement on media entities.
const DEPICTS_PROPERTY: &str = "P180";

pub struct StructuredDataClient {
    entities: ApiClient,
    media: MediaWikiClient,
    edit_summary: String,
}

impl StructuredDataClient {
    pub fn new(config: &ClientConfig, media: MediaWikiClient) -> Result<Self, ClientError> {
        let auth = if config.access_token.is_empty() {
            Auth::Anonymous
        } else {
            Auth::Bearer(config.access_token.clone())
        };
        let entities = ApiClient::new(
            config.structured_data_api_url.clone(),
            auth,
            config.http_timeout(),
        )?;
        Ok(Self::with_clients(entities, media, config.edit_summary.clone()))
    }

    pub fn with_clients(entities: ApiClient, media: MediaWikiClient, edit_summary: String) -> Self {
        Self {
            entities,
            media,
            edit_summary,
        }
    }

    fn last_revision(body: &Value) -> Option<i64> {
        body.pointer("/pageinfo/lastrevid").and_then(Value::as_i64)
    }

    async fn create_image_claim(
        &self,
        token: &str,
        place: &PlaceTarget,
        filename: &str,
    ) -> Result<Value, ClientError> {
        self.entities
            .post_form(
                "wbcreateclaim",
                &[
                    ("entity", place.id.clone()),
                    ("property", IMAGE_PROPERTY.to_string()),
                    ("snaktype", "value".to_string()),
                    ("value", Value::String(filename.to_string()).to_string()),
                    ("summary", self.edit_summary.clone()),
                    ("token", token.to_string()),
                ],
            )
            .await
    }

    async fn add_media_legend(
        &self,
        token: &str,
        claim_id: &str,
        language: &str,
        text: &str,
    ) -> Result<Value, ClientError> {
        self.entities
            .post_form(
                "wbsetqualifier",
                &[
                    ("claim", claim_id.to_string()),
                    ("property", MEDIA_LEGEND_PROPERTY.to_string()),
                    ("snaktype", "value".to_string()),
                    (
                        "value",
                        json!({ "text": text, "language": language }).to_string(),
                    ),
                    ("summary", self.edit_summary.clone()),
                    ("token", token.to_string()),
                ],
            )
            .await
    }

    /// `wbeditentity` payload with caption labels and depicts statements.
    fn media_entity_data(contribution: &Contribution) -> Value {
        let labels: serde_json::Map<String, Value> = contribution
            .captions
            .iter()
            .map(|(lang, text)| (lang.clone(), json!({ "language": lang, "value": text })))
            .collect();
        let claims: Vec<Value> = contribution
            .depictions
            .iter()
            .map(|entity_id| {
                json!({
                    "mainsnak": {
                        "snaktype": "value",
                        "property": DEPICTS_PROPERTY,
                        "datavalue": {
                            "type": "wikibase-entityid",
                            "value": { "id": entity_id }
                        }
                    },
                    "type": "statement",
                    "rank": "normal"
                })
            })
            .collect();
        json!({ "labels": labels, "claims": claims })
    }
}

#[async_trait]
impl StructuredDataService for StructuredDataClient {
    #[tracing::instrument(skip(self, place, captions), fields(place_id = %place.id))]
    async fn attach_image_reference(
        &self,
        place: &PlaceTarget,
        filename: &str,
        captions: &BTreeMap<String, String>,
    ) -> Result<Option<i64>, UploadError> {
        let token = self
            .entities
            .csrf_token()
            .await
            .map_err(|e| e.into_upload_error(Phase::Edit))?;
        let body = self
            .create_image_claim(&token, place, filename)
            .await
            .map_err(|e| e.into_upload_error(Phase::Edit))?;

        let mut revision = Self::last_revision(&body);
        let claim_id = body.pointer("/claim/id").and_then(Value::as_str);

        if let Some(claim_id) = claim_id {
            for (language, text) in captions {
                match self.add_media_legend(&token, claim_id, language, text).await {
                    Ok(body) => revision = Self::last_revision(&body).or(revision),
                    Err(e) => tracing::warn!(
                        place_id = %place.id,
                        language = %language,
                        error = %e,
                        "Failed to add media legend to image claim"
                    ),
                }
            }
        }

        Ok(revision)
    }

    #[tracing::instrument(skip(self, upload_result, contribution), fields(page_id = %contribution.page_id))]
    async fn add_depictions_and_captions(
        &self,
        upload_result: &UploadResult,
        contribution: &Contribution,
    ) -> Result<(), UploadError> {
        if contribution.captions.is_empty() && contribution.depictions.is_empty() {
            return Ok(());
        }

        let title = upload_result.canonical_file_name();
        let page_id = self
            .media
            .page_id(&title)
            .await
            .map_err(|e| e.into_upload_error(Phase::Edit))?
            .ok_or_else(|| UploadError::SecondaryEdit(format!("{} not found", title)))?;

        let api = self.media.api();
        let token = api
            .csrf_token()
            .await
            .map_err(|e| e.into_upload_error(Phase::Edit))?;
        api.post_form(
            "wbeditentity",
            &[
                ("id", format!("M{}", page_id)),
                ("data", Self::media_entity_data(contribution).to_string()),
                ("summary", self.edit_summary.clone()),
                ("token", token),
            ],
        )
        .await
        .map_err(|e| e.into_upload_error(Phase::Edit))?;

        tracing::info!(
            media_id = %format!("M{}", page_id),
            captions = contribution.captions.len(),
            depictions = contribution.depictions.len(),
            "Added captions and depictions"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::{Matcher, Server, ServerGuard};
    use std::time::Duration;

    fn api(server: &ServerGuard, path: &str) -> ApiClient {
        ApiClient::new(
            format!("{}{}", server.url(), path),
            Auth::Bearer("secret".to_string()),
            Duration::from_secs(5),
        )
        .unwrap()
    }

    fn client(server: &ServerGuard) -> StructuredDataClient {
        let media = MediaWikiClient::with_api(api(server, "/w/api.php"), 1024, "edit".to_string());
        StructuredDataClient::with_clients(api(server, "/data/api.php"), media, "edit".to_string())
    }

    async fn mock_token(server: &mut ServerGuard, path: &str) -> mockito::Mock {
        server
            .mock("GET", path)
            .match_query(Matcher::UrlEncoded("meta".into(), "tokens".into()))
            .with_header("content-type", "application/json")
            .with_body(r#"{"query":{"tokens":{"csrftoken":"tok"}}}"#)
            .create_async()
            .await
    }

    fn place() -> PlaceTarget {
        PlaceTarget {
            id: "Q90".to_string(),
            name: "Paris".to_string(),
            image_value: None,
            location: None,
        }
    }

    #[tokio::test]
    async fn image_claim_returns_revision_and_adds_legends() {
        let mut server = Server::new_async().await;
        let _token = mock_token(&mut server, "/data/api.php").await;
        let claim = server
            .mock("POST", "/data/api.php")
            .match_query(Matcher::UrlEncoded("action".into(), "wbcreateclaim".into()))
            .match_body(Matcher::AllOf(vec![
                Matcher::UrlEncoded("entity".into(), "Q90".into()),
                Matcher::UrlEncoded("property".into(), "P18".into()),
                Matcher::UrlEncoded("value".into(), "\"Eiffel.jpg\"".into()),
            ]))
            .with_header("content-type", "application/json")
            .with_body(r#"{"pageinfo":{"lastrevid":100},"success":1,"claim":{"id":"Q90$abc"}}"#)
            .create_async()
            .await;
        let legend = server
            .mock("POST", "/data/api.php")
            .match_query(Matcher::UrlEncoded("action".into(), "wbsetqualifier".into()))
            .match_body(Matcher::UrlEncoded("claim".into(), "Q90$abc".into()))
            .with_header("content-type", "application/json")
            .with_body(r#"{"pageinfo":{"lastrevid":101},"success":1}"#)
            .create_async()
            .await;

        let mut captions = BTreeMap::new();
        captions.insert("en".to_string(), "Eiffel tower".to_string());
        let revision = client(&server)
            .attach_image_reference(&place(), "Eiffel.jpg", &captions)
            .await
            .unwrap();

        assert_eq!(revision, Some(101));
        claim.assert_async().await;
        legend.assert_async().await;
    }

    #[tokio::test]
    async fn image_claim_error_is_secondary_edit() {
        let mut server = Server::new_async().await;
        let _token = mock_token(&mut server, "/data/api.php").await;
        let _claim = server
            .mock("POST", "/data/api.php")
            .match_query(Matcher::UrlEncoded("action".into(), "wbcreateclaim".into()))
            .with_header("content-type", "application/json")
            .with_body(r#"{"error":{"code":"no-such-entity","info":"Could not find entity"}}"#)
            .create_async()
            .await;

        let err = client(&server)
            .attach_image_reference(&place(), "Eiffel.jpg", &BTreeMap::new())
            .await
            .unwrap_err();
        assert!(matches!(err, UploadError::SecondaryEdit(_)));
    }

    #[tokio::test]
    async fn depictions_edit_targets_media_entity() {
        let mut server = Server::new_async().await;
        let _token = mock_token(&mut server, "/w/api.php").await;
        let _page = server
            .mock("GET", "/w/api.php")
            .match_query(Matcher::UrlEncoded("titles".into(), "File:Fox.jpg".into()))
            .with_header("content-type", "application/json")
            .with_body(r#"{"query":{"pages":[{"pageid":55,"title":"File:Fox.jpg"}]}}"#)
            .create_async()
            .await;
        let edit = server
            .mock("POST", "/w/api.php")
            .match_query(Matcher::UrlEncoded("action".into(), "wbeditentity".into()))
            .match_body(Matcher::AllOf(vec![
                Matcher::UrlEncoded("id".into(), "M55".into()),
                Matcher::Regex("P180".to_string()),
            ]))
            .with_header("content-type", "application/json")
            .with_body(r#"{"entity":{"id":"M55"},"success":1}"#)
            .create_async()
            .await;

        let mut contribution = Contribution::new_queued("p1", "Fox.jpg", "/tmp/fox.jpg", "sha");
        contribution.depictions.push("Q8332".to_string());
        let upload_result = UploadResult {
            result: "Success".to_string(),
            file_key: "k".to_string(),
            filename: "Fox.jpg".to_string(),
        };
        client(&server)
            .add_depictions_and_captions(&upload_result, &contribution)
            .await
            .unwrap();
        edit.assert_async().await;
    }

    #[tokio::test]
    async fn nothing_to_add_makes_no_requests() {
        let server = Server::new_async().await;
        let contribution = Contribution::new_queued("p1", "Fox.jpg", "/tmp/fox.jpg", "sha");
        let upload_result = UploadResult {
            result: "Success".to_string(),
            file_key: "k".to_string(),
            filename: "Fox.jpg".to_string(),
        };
        client(&server)
            .add_depictions_and_captions(&upload_result, &contribution)
            .await
            .unwrap();
    }

    #[test]
    fn media_entity_payload_shape() {
        let mut contribution = Contribution::new_queued("p1", "Fox.jpg", "/tmp/fox.jpg", "sha");
        contribution.captions.insert("fr".to_string(), "Renard".to_string());
        contribution.depictions.push("Q8332".to_string());
        let data = StructuredDataClient::media_entity_data(&contribution);
        assert_eq!(data["labels"]["fr"]["value"], "Renard");
        assert_eq!(data["claims"][0]["mainsnak"]["property"], "P180");
        assert_eq!(
            data["claims"][0]["mainsnak"]["datavalue"]["value"]["id"],
            "Q8332"
        );
    }
}
