use anyhow::Context;
use chrono::{DateTime, Utc};
use std::path::Path;

use stashup_core::hashing::sha1_of_file;
use stashup_core::models::Image;

/// File extensions the gallery lists.
const IMAGE_EXTENSIONS: [&str; 9] = [
    "jpg", "jpeg", "png", "gif", "webp", "tif", "tiff", "svg", "heic",
];

/// Truncate a string to max_len characters, appending "..." if truncated.
pub fn truncate_string(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}

/// Parses `lang=text`.
pub fn parse_caption(raw: &str) -> anyhow::Result<(String, String)> {
    let (lang, text) = raw
        .split_once('=')
        .ok_or_else(|| anyhow::anyhow!("Caption must look like lang=text, got {:?}", raw))?;
    let lang = lang.trim();
    let text = text.trim();
    if lang.is_empty() || text.is_empty() {
        anyhow::bail!("Caption language and text cannot be empty: {:?}", raw);
    }
    Ok((lang.to_string(), text.to_string()))
}

/// Remote file name for `path`: `title` when given, keeping the local extension
/// if the title has none, otherwise the local file name.
pub fn remote_filename(path: &Path, title: Option<&str>) -> anyhow::Result<String> {
    let local_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .with_context(|| format!("{} has no usable file name", path.display()))?;

    let Some(title) = title.map(str::trim).filter(|t| !t.is_empty()) else {
        return Ok(local_name.to_string());
    };
    match path.extension().and_then(|e| e.to_str()) {
        Some(ext) if !title.to_lowercase().ends_with(&format!(".{}", ext.to_lowercase())) => {
            Ok(format!("{}.{}", title, ext))
        }
        _ => Ok(title.to_string()),
    }
}

/// Page text committed with a new file.
pub fn default_wikitext(description: &str, author: Option<&str>, date: DateTime<Utc>) -> String {
    let author = match author {
        Some(user) => format!("[[User:{user}|{user}]]"),
        None => "{{unknown|author}}".to_string(),
    };
    format!(
        "=={{{{int:filedesc}}}}==\n{{{{Information\n|description={description}\n|date={date}\n|source={{{{own}}}}\n|author={author}\n}}}}\n\n=={{{{int:license-header}}}}==\n{{{{self|cc-by-sa-4.0}}}}\n",
        date = date.format("%Y-%m-%d"),
    )
}

fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| IMAGE_EXTENSIONS.contains(&e.to_lowercase().as_str()))
        .unwrap_or(false)
}

/// Images directly inside `dir`, sorted by name, all in bucket `bucket_id`.
/// Ids are 1-based positions in that order.
pub async fn scan_bucket(dir: &Path, bucket_id: i64) -> anyhow::Result<Vec<Image>> {
    let bucket_name = dir
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or_default()
        .to_string();

    let mut paths = Vec::new();
    let mut entries = tokio::fs::read_dir(dir)
        .await
        .with_context(|| format!("Failed to read directory {}", dir.display()))?;
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if entry.file_type().await?.is_file() && is_image(&path) {
            paths.push(path);
        }
    }
    paths.sort();

    let mut images = Vec::with_capacity(paths.len());
    for (idx, path) in paths.into_iter().enumerate() {
        let sha1 = match sha1_of_file(&path).await {
            Ok(sha1) => Some(sha1),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Failed to hash image");
                None
            }
        };
        let date_modified = tokio::fs::metadata(&path)
            .await
            .and_then(|m| m.modified())
            .ok()
            .map(DateTime::<Utc>::from);
        images.push(Image {
            id: idx as i64 + 1,
            name: path
                .file_name()
                .and_then(|n| n.to_str())
                .unwrap_or_default()
                .to_string(),
            path: path.to_string_lossy().to_string(),
            bucket_id,
            bucket_name: bucket_name.clone(),
            sha1,
            date_modified,
        });
    }
    Ok(images)
}

/// Initialize tracing for the CLI. `STASHUP_LOG_FORMAT=json` switches to JSON lines.
pub fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("stashup=info"));
    let json = std::env::var("STASHUP_LOG_FORMAT")
        .map(|f| f.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    if json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}
