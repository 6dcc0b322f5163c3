use std::path::Path;
use tracing::debug;

use crate::config::ATTACHMENTS_DIR_NAME;
use crate::error::{ReporterError, ReporterResult};
use crate::events::Attachment;

use super::RelocatedAttachment;

/// Copy every file-backed attachment into `destination` under a fresh uuid
/// name, keeping the original extension. Sources are never removed.
/// The first copy failure aborts the whole call.
pub async fn relocate_attachments(
    attachments: &[Attachment],
    destination: &Path,
) -> ReporterResult<Vec<RelocatedAttachment>> {
    let mut relocated = Vec::with_capacity(attachments.len());
    let mut dir_ready = false;

    for attachment in attachments {
        let Some(source) = attachment.path.as_deref() else {
            relocated.push(RelocatedAttachment {
                name: attachment.name.clone(),
                content_type: attachment.content_type.clone(),
                file_name: None,
                path: None,
                url: attachment.url.clone(),
            });
            continue;
        };

        if !dir_ready {
            tokio::fs::create_dir_all(destination)
                .await
                .map_err(|e| ReporterError::ReportDir {
                    path: destination.to_path_buf(),
                    source: e,
                })?;
            dir_ready = true;
        }

        let file_name = unique_file_name(source);
        let target = destination.join(&file_name);

        tokio::fs::copy(source, &target)
            .await
            .map_err(|e| ReporterError::AttachmentCopy {
                name: attachment.name.clone(),
                from: source.to_path_buf(),
                to: target.clone(),
                source: e,
            })?;

        debug!("Relocated attachment '{}' -> {:?}", attachment.name, target);

        relocated.push(RelocatedAttachment {
            name: attachment.name.clone(),
            content_type: attachment.content_type.clone(),
            url: Some(format!("{}/{}", ATTACHMENTS_DIR_NAME, file_name)),
            path: Some(target.to_string_lossy().to_string()),
            file_name: Some(file_name),
        });
    }

    Ok(relocated)
}

fn unique_file_name(source: &Path) -> String {
    let id = uuid::Uuid::new_v4();
    match source.extension().and_then(|e| e.to_str()) {
        Some(ext) if !ext.is_empty() => format!("{}.{}", id, ext),
        _ => id.to_string(),
    }
}
