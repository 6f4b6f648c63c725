//! Chunked stash upload, commit from stash and file metadata lookups.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::BTreeMap;
use std::io::SeekFrom;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio::sync::mpsc::UnboundedSender;

use stashup_core::models::{
    CanonicalRecord, ChunkInfo, Contribution, ProgressEvent, StashUploadResult, UploadResult,
};
use stashup_core::naming::file_page_title;
use stashup_core::{
    ClientConfig, MetadataService, TransferHandle, TransferSignal, UploadError, UploadService,
    INVALID_TOKEN_ERROR_MESSAGE,
};

use crate::api::{ApiClient, Auth};
use crate::error::{ClientError, Phase};

/// Media repository client: the two upload phases plus page and file lookups.
#[derive(Clone, Debug)]
pub struct MediaWikiClient {
    api: ApiClient,
    chunk_size: u64,
    edit_summary: String,
}

impl MediaWikiClient {
    pub fn new(config: &ClientConfig) -> Result<Self, ClientError> {
        let auth = if config.access_token.is_empty() {
            Auth::Anonymous
        } else {
            Auth::Bearer(config.access_token.clone())
        };
        let api = ApiClient::new(config.api_url.clone(), auth, config.http_timeout())?;
        Ok(Self::with_api(
            api,
            config.chunk_size_bytes,
            config.edit_summary.clone(),
        ))
    }

    pub fn with_api(api: ApiClient, chunk_size: u64, edit_summary: String) -> Self {
        Self {
            api,
            chunk_size: chunk_size.max(1),
            edit_summary,
        }
    }

    pub fn api(&self) -> &ApiClient {
        &self.api
    }

    /// Where to continue a transfer: the checkpoint when it still fits the file,
    /// otherwise the beginning.
    fn resume_point(contribution: &Contribution, file_size: u64) -> (u64, u32, Option<String>) {
        match &contribution.chunk_info {
            Some(info) if info.next_offset > 0 && info.next_offset < file_size => (
                info.next_offset,
                info.next_chunk_index,
                Some(info.file_key.clone()),
            ),
            _ => (0, 0, None),
        }
    }

    async fn read_chunk(
        file: &mut tokio::fs::File,
        offset: u64,
        len: u64,
    ) -> Result<Vec<u8>, ClientError> {
        file.seek(SeekFrom::Start(offset)).await?;
        let mut buf = Vec::with_capacity(len as usize);
        file.take(len).read_to_end(&mut buf).await?;
        Ok(buf)
    }

    async fn upload_chunk(
        &self,
        token: &str,
        filename: &str,
        file_size: u64,
        offset: u64,
        file_key: Option<&str>,
        chunk: Vec<u8>,
    ) -> Result<Value, ClientError> {
        let mut form = reqwest::multipart::Form::new()
            .text("stash", "1")
            .text("ignorewarnings", "1")
            .text("filename", filename.to_string())
            .text("filesize", file_size.to_string())
            .text("offset", offset.to_string())
            .text("token", token.to_string());
        if let Some(key) = file_key {
            form = form.text("filekey", key.to_string());
        }
        let part = reqwest::multipart::Part::bytes(chunk).file_name(filename.to_string());
        form = form.part("chunk", part);

        self.api.post_multipart("upload", form).await
    }

    async fn stash_chunks(
        &self,
        filename: &str,
        contribution: &Contribution,
        progress_tx: &UnboundedSender<ProgressEvent>,
        control: &TransferHandle,
    ) -> Result<StashUploadResult, ClientError> {
        let mut file = tokio::fs::File::open(&contribution.local_path).await?;
        let file_size = file.metadata().await?.len();
        if file_size == 0 {
            return Ok(StashUploadResult::failed("empty-file"));
        }

        let total_chunks = file_size.div_ceil(self.chunk_size) as u32;
        let (mut offset, mut chunk_index, mut file_key) =
            Self::resume_point(contribution, file_size);
        if offset > 0 {
            tracing::info!(
                page_id = %contribution.page_id,
                offset = offset,
                chunk_index = chunk_index,
                "Resuming stash upload from checkpoint"
            );
        }

        let token = self.api.csrf_token().await?;
        let _ = progress_tx.send(ProgressEvent::Transferred {
            transferred: offset,
            total: file_size,
        });

        loop {
            match control.signal() {
                TransferSignal::Pause => return Ok(StashUploadResult::paused()),
                TransferSignal::Cancel => return Ok(StashUploadResult::cancelled()),
                TransferSignal::Continue => {}
            }

            let len = self.chunk_size.min(file_size - offset);
            let chunk = Self::read_chunk(&mut file, offset, len).await?;
            let body = self
                .upload_chunk(
                    &token,
                    filename,
                    file_size,
                    offset,
                    file_key.as_deref(),
                    chunk,
                )
                .await?;

            let upload = body
                .get("upload")
                .ok_or_else(|| ClientError::Decode("missing upload object".to_string()))?;
            let result = upload.get("result").and_then(Value::as_str).unwrap_or("");
            if let Some(key) = upload.get("filekey").and_then(Value::as_str) {
                file_key = Some(key.to_string());
            }

            match result {
                "Continue" => {
                    let next = upload
                        .get("offset")
                        .and_then(Value::as_u64)
                        .unwrap_or(offset + len);
                    if next >= file_size {
                        return Ok(StashUploadResult::failed(format!(
                            "Server requested offset {} beyond file size {}",
                            next, file_size
                        )));
                    }
                    offset = next;
                    chunk_index += 1;
                    let key = file_key.clone().ok_or_else(|| {
                        ClientError::Decode("missing filekey after chunk".to_string())
                    })?;
                    let _ = progress_tx.send(ProgressEvent::Transferred {
                        transferred: offset,
                        total: file_size,
                    });
                    let _ = progress_tx.send(ProgressEvent::ChunkUploaded(ChunkInfo {
                        file_key: key,
                        next_offset: offset,
                        next_chunk_index: chunk_index,
                        total_chunks,
                    }));
                }
                "Success" => {
                    let key = file_key.ok_or_else(|| {
                        ClientError::Decode("missing filekey in final chunk".to_string())
                    })?;
                    let _ = progress_tx.send(ProgressEvent::Transferred {
                        transferred: file_size,
                        total: file_size,
                    });
                    return Ok(StashUploadResult::success(key));
                }
                other => {
                    tracing::warn!(
                        page_id = %contribution.page_id,
                        result = other,
                        "Unexpected stash chunk result"
                    );
                    return Ok(StashUploadResult::failed(format!(
                        "Unexpected stash result: {}",
                        other
                    )));
                }
            }
        }
    }

    /// Page id of an existing page, `None` when it is missing.
    pub async fn page_id(&self, title: &str) -> Result<Option<i64>, ClientError> {
        let body = self
            .api
            .get("query", &[("titles", title.to_string())])
            .await?;
        let page = ApiClient::first_page(&body)
            .ok_or_else(|| ClientError::Decode("missing query.pages".to_string()))?;
        if page.get("missing").is_some() || page.get("invalid").is_some() {
            return Ok(None);
        }
        Ok(page.get("pageid").and_then(Value::as_i64))
    }
}

fn parse_descriptions(value: Option<&Value>) -> BTreeMap<String, String> {
    let mut descriptions = BTreeMap::new();
    match value {
        Some(Value::String(text)) => {
            descriptions.insert("default".to_string(), text.clone());
        }
        Some(Value::Object(map)) => {
            for (lang, text) in map {
                if let Some(text) = text.as_str() {
                    descriptions.insert(lang.clone(), text.to_string());
                }
            }
        }
        _ => {}
    }
    descriptions
}

fn parse_canonical_record(body: &Value) -> Result<CanonicalRecord, ClientError> {
    let page = ApiClient::first_page(body)
        .ok_or_else(|| ClientError::Decode("missing query.pages".to_string()))?;
    if page.get("missing").is_some() {
        return Err(ClientError::Api {
            code: "missingtitle".to_string(),
            info: "The file does not exist".to_string(),
        });
    }
    let title = page.get("title").and_then(Value::as_str).unwrap_or_default();
    let info = page
        .pointer("/imageinfo/0")
        .ok_or_else(|| ClientError::Decode("missing imageinfo".to_string()))?;
    let str_at = |pointer: &str| info.pointer(pointer).and_then(Value::as_str).map(str::to_string);

    Ok(CanonicalRecord {
        page_id: page
            .get("pageid")
            .and_then(Value::as_i64)
            .map(|id| id.to_string()),
        filename: title
            .strip_prefix(stashup_core::naming::FILE_NAMESPACE)
            .unwrap_or(title)
            .to_string(),
        image_url: str_at("/url"),
        thumb_url: str_at("/thumburl"),
        author: str_at("/user"),
        license: str_at("/extmetadata/LicenseShortName/value"),
        sha1: str_at("/sha1"),
        date_uploaded: str_at("/timestamp")
            .and_then(|ts| DateTime::parse_from_rfc3339(&ts).ok())
            .map(|ts| ts.with_timezone(&Utc)),
        descriptions: parse_descriptions(info.pointer("/extmetadata/ImageDescription/value")),
    })
}

#[async_trait]
impl UploadService for MediaWikiClient {
    #[tracing::instrument(skip(self, contribution, progress_tx, control), fields(page_id = %contribution.page_id))]
    async fn stash_upload(
        &self,
        filename: &str,
        contribution: &Contribution,
        progress_tx: UnboundedSender<ProgressEvent>,
        control: &TransferHandle,
    ) -> Result<StashUploadResult, UploadError> {
        match self
            .stash_chunks(filename, contribution, &progress_tx, control)
            .await
        {
            Ok(result) => Ok(result),
            Err(e) if e.is_bad_token() => {
                Ok(StashUploadResult::failed(INVALID_TOKEN_ERROR_MESSAGE))
            }
            Err(ClientError::Api { code, info }) => {
                tracing::warn!(code = %code, info = %info, "Stash upload rejected");
                Ok(StashUploadResult::failed(format!("{}: {}", code, info)))
            }
            Err(ClientError::Io(e)) => Ok(StashUploadResult::failed(format!(
                "Could not read local file: {}",
                e
            ))),
            Err(e) => Err(e.into_upload_error(Phase::Stash)),
        }
    }

    #[tracing::instrument(skip(self, contribution), fields(page_id = %contribution.page_id))]
    async fn commit_from_stash(
        &self,
        contribution: &Contribution,
        filename: &str,
        file_key: &str,
    ) -> Result<UploadResult, UploadError> {
        let token = self
            .api
            .csrf_token()
            .await
            .map_err(|e| e.into_upload_error(Phase::Commit))?;
        let body = self
            .api
            .post_form(
                "upload",
                &[
                    ("filekey", file_key.to_string()),
                    ("filename", filename.to_string()),
                    ("text", contribution.wikitext.clone()),
                    ("comment", self.edit_summary.clone()),
                    ("ignorewarnings", "0".to_string()),
                    ("token", token),
                ],
            )
            .await
            .map_err(|e| e.into_upload_error(Phase::Commit))?;

        let upload = body
            .get("upload")
            .ok_or_else(|| UploadError::Commit("missing upload object".to_string()))?;
        let result = upload
            .get("result")
            .and_then(Value::as_str)
            .unwrap_or("Unknown")
            .to_string();
        if result != "Success" {
            let warnings = upload.get("warnings").cloned().unwrap_or_default();
            tracing::warn!(
                result = %result,
                warnings = %warnings,
                "Commit from stash did not succeed"
            );
        }

        Ok(UploadResult {
            result,
            file_key: file_key.to_string(),
            filename: upload
                .get("filename")
                .and_then(Value::as_str)
                .unwrap_or(filename)
                .to_string(),
        })
    }

    async fn page_exists(&self, title: &str) -> Result<bool, UploadError> {
        self.page_id(title)
            .await
            .map(|id| id.is_some())
            .map_err(|e| e.into_upload_error(Phase::Query))
    }
}

#[async_trait]
impl MetadataService for MediaWikiClient {
    async fn fetch_canonical_record(&self, title: &str) -> Result<CanonicalRecord, UploadError> {
        let body = self
            .api
            .get(
                "query",
                &[
                    ("prop", "imageinfo".to_string()),
                    ("iiprop", "url|user|timestamp|sha1|extmetadata".to_string()),
                    ("iiurlwidth", "640".to_string()),
                    ("iiextmetadatamultilang", "1".to_string()),
                    ("titles", file_page_title(title)),
                ],
            )
            .await
            .map_err(|e| e.into_upload_error(Phase::Query))?;
        parse_canonical_record(&body).map_err(|e| e.into_upload_error(Phase::Query))
    }
}
