//! Uploads exported files to S3.

use anyhow::{Context, Result};
use aws_sdk_s3::primitives::ByteStream;
use flate2::Compression;
use flate2::write::GzEncoder;
use std::io::Write;
use std::path::Path;
use tracing::info;

/// Gzip-compresses `bytes` at the default level.
pub fn gzip(bytes: &[u8]) -> Result<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(bytes)?;
    Ok(encoder.finish()?)
}

/// Object key for `file_name` under `prefix`, with `.gz` appended when
/// compressed.
pub fn object_key(prefix: &str, file_name: &str, gzip: bool) -> String {
    let prefix = prefix.trim_matches('/');
    let suffix = if gzip { ".gz" } else { "" };
    if prefix.is_empty() {
        format!("{file_name}{suffix}")
    } else {
        format!("{prefix}/{file_name}{suffix}")
    }
}

/// Uploads the file at `path` to `bucket`, optionally gzip-compressed.
#[tracing::instrument(skip(client), fields(path = %path.display()))]
pub async fn upload_file(
    client: &aws_sdk_s3::Client,
    bucket: &str,
    prefix: &str,
    path: &Path,
    gzip: bool,
) -> Result<String> {
    let file_contents =
        std::fs::read(path).with_context(|| format!("reading {}", path.display()))?;
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| anyhow::anyhow!("'{}' has no usable file name", path.display()))?;

    let body = if gzip {
        self::gzip(&file_contents)?
    } else {
        file_contents
    };
    let key = object_key(prefix, file_name, gzip);

    client
        .put_object()
        .bucket(bucket)
        .key(&key)
        .body(ByteStream::from(body))
        .content_type("text/csv")
        .send()
        .await
        .with_context(|| format!("S3 PutObject failed for '{key}'"))?;

    info!(key = %key, "Uploaded to S3");
    Ok(key)
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::read::GzDecoder;
    use std::io::Read;

    #[test]
    fn test_gzip_output_decompresses_to_input() {
        let input = b"2020-01-01,3,\n2020-01-02,,4\n";

        let compressed = gzip(input).unwrap();
        let mut decoded = Vec::new();
        GzDecoder::new(compressed.as_slice())
            .read_to_end(&mut decoded)
            .unwrap();

        assert_eq!(decoded, input);
    }

    #[test]
    fn test_object_key() {
        assert_eq!(object_key("", "pivot.csv", false), "pivot.csv");
        assert_eq!(
            object_key("/comparisons/", "pivot.csv", true),
            "comparisons/pivot.csv.gz"
        );
    }
}
