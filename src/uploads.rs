use anyhow::{anyhow, Result};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};

/// Accepted upload extensions, lowercase.
const ALLOWED_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png"];

/// Hex prefix length of the content hash used for stored names.
const NAME_HASH_LEN: usize = 16;

/// Persist an uploaded image under `upload_dir`.
///
/// The stored name is derived from the SHA-256 of the content plus the
/// normalized extension; client-supplied names are only consulted for the
/// extension allowlist and never used as paths.
pub fn save_upload(upload_dir: &Path, bytes: &[u8], original_name: &str) -> Result<PathBuf> {
    if bytes.is_empty() {
        return Err(anyhow!("upload is empty"));
    }
    let extension = allowed_extension(original_name)?;

    let digest = Sha256::digest(bytes);
    let mut name = hex::encode(digest);
    name.truncate(NAME_HASH_LEN);

    std::fs::create_dir_all(upload_dir)?;
    let path = upload_dir.join(format!("{}.{}", name, extension));
    std::fs::write(&path, bytes)?;
    Ok(path)
}

/// Extract and validate the extension of a client-supplied name.
pub fn allowed_extension(original_name: &str) -> Result<String> {
    let extension = original_name
        .rsplit('.')
        .next()
        .filter(|ext| !ext.is_empty() && *ext != original_name)
        .ok_or_else(|| anyhow!("upload name '{}' has no extension", original_name))?
        .to_lowercase();
    if !ALLOWED_EXTENSIONS.contains(&extension.as_str()) {
        return Err(anyhow!(
            "extension '{}' not allowed (expected one of {:?})",
            extension,
            ALLOWED_EXTENSIONS
        ));
    }
    Ok(extension)
}
