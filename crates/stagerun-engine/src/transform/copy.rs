//! Built-in `copy` transform: moves an object unchanged into the
//! `pre-stage` area of the output bucket.

use std::path::{Component, Path, PathBuf};

use anyhow::{Context, Result};
use stagerun_types::response::TransformResponse;

use super::{Transform, TransformRequest};

/// Name under which the transform is registered.
pub const COPY_TRANSFORM: &str = "copy";

/// Buckets are directories under `storage_root`.
#[derive(Debug, Clone)]
pub struct CopyTransform {
    storage_root: PathBuf,
    output_bucket: String,
}

impl CopyTransform {
    #[must_use]
    pub fn new(storage_root: impl Into<PathBuf>, output_bucket: impl Into<String>) -> Self {
        Self {
            storage_root: storage_root.into(),
            output_bucket: output_bucket.into(),
        }
    }

    /// Factory closure for
    /// [`TransformRegistry::register`](super::TransformRegistry::register).
    pub fn factory(
        storage_root: impl Into<PathBuf>,
        output_bucket: impl Into<String>,
    ) -> impl Fn() -> Result<Box<dyn Transform>> + Send + Sync + 'static {
        let template = Self::new(storage_root, output_bucket);
        move || Ok(Box::new(template.clone()) as Box<dyn Transform>)
    }

    fn object_path(&self, bucket: &str, key: &str) -> PathBuf {
        self.storage_root.join(bucket).join(key)
    }
}

/// Event-supplied names must stay below the directory they are joined to.
fn relative_segment<'a>(field: &str, value: &'a str) -> Result<&'a Path> {
    let path = Path::new(value);
    let escapes = path.components().any(|c| {
        matches!(c, Component::ParentDir | Component::RootDir | Component::Prefix(_))
    });
    if value.is_empty() || path.is_absolute() || escapes {
        anyhow::bail!("{field} '{value}' must be a relative path without '..' segments");
    }
    Ok(path)
}

fn file_name(key: &str) -> Result<&str> {
    Path::new(key)
        .file_name()
        .and_then(|n| n.to_str())
        .with_context(|| format!("object key '{key}' has no file name"))
}

impl Transform for CopyTransform {
    fn transform_object(&mut self, request: &TransformRequest<'_>) -> Result<TransformResponse> {
        for (field, value) in [
            ("bucket", request.bucket),
            ("key", request.key),
            ("team", request.team),
            ("dataset", request.dataset),
            ("output bucket", self.output_bucket.as_str()),
        ] {
            relative_segment(field, value).context("refusing to copy object")?;
        }

        let name = file_name(request.key)?;
        let source = self.object_path(request.bucket, request.key);
        let staged = request.workspace.join(name);

        std::fs::copy(&source, &staged).with_context(|| {
            format!(
                "failed to stage object '{}/{}' in {}",
                request.bucket,
                request.key,
                staged.display()
            )
        })?;

        let output_key = format!("pre-stage/{}/{}/{}", request.team, request.dataset, name);
        let dest = self.object_path(&self.output_bucket, &output_key);
        if let Some(parent) = dest.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        std::fs::copy(&staged, &dest).with_context(|| {
            format!("failed to write object '{}/{}'", self.output_bucket, output_key)
        })?;

        tracing::info!(
            bucket = request.bucket,
            key = request.key,
            output_bucket = %self.output_bucket,
            output_key = %output_key,
            "Object copied to pre-stage"
        );
        Ok(TransformResponse::single(output_key))
    }
}
