use crate::constants::integrity::HASH_BUFFER_SIZE;
use crate::{BackupError, Result};
use sha2::{Digest, Sha256};
use std::path::Path;
use tokio::fs::File;
use tokio::io::AsyncReadExt;

/// 计算文件的 SHA-256 哈希（小写十六进制）
///
/// 按固定大小的块读取，备份文件再大也不会整体读入内存。
pub async fn hash_file(file_path: &Path) -> Result<String> {
    let mut file = File::open(file_path).await.map_err(|e| {
        BackupError::custom(format!("无法打开文件 {}: {}", file_path.display(), e))
    })?;

    let mut hasher = Sha256::new();
    let mut buffer = vec![0u8; HASH_BUFFER_SIZE];

    loop {
        let bytes_read = file.read(&mut buffer).await.map_err(|e| {
            BackupError::custom(format!("读取文件失败 {}: {}", file_path.display(), e))
        })?;

        if bytes_read == 0 {
            break;
        }

        hasher.update(&buffer[..bytes_read]);
    }

    let hash = hasher.finalize();
    Ok(format!("{hash:x}"))
}

/// 常量时间比较两个十六进制摘要（忽略大小写）
///
/// 比较耗时只取决于长度，不取决于第一个不同字节的位置。
pub fn digests_match(a: &str, b: &str) -> bool {
    let a = a.as_bytes();
    let b = b.as_bytes();
    if a.len() != b.len() {
        return false;
    }

    let diff = a
        .iter()
        .zip(b)
        .fold(0u8, |acc, (x, y)| acc | (x.to_ascii_lowercase() ^ y.to_ascii_lowercase()));
    diff == 0
}

/// 校验文件是否与期望的摘要一致
pub async fn verify_file(file_path: &Path, expected_hash: &str) -> Result<bool> {
    let actual_hash = hash_file(file_path).await?;
    let matches = digests_match(&actual_hash, expected_hash);

    if !matches {
        tracing::warn!(
            "文件哈希不匹配: {} (期望 {}, 实际 {})",
            file_path.display(),
            expected_hash,
            actual_hash
        );
    }

    Ok(matches)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_hash_known_content() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("hello.txt");
        std::fs::write(&path, b"hello").unwrap();

        let hash = hash_file(&path).await.unwrap();
        assert_eq!(
            hash,
            "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
        );
    }

    #[tokio::test]
    async fn test_hash_spans_multiple_buffers() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("big.bin");
        let content: Vec<u8> = (0..HASH_BUFFER_SIZE * 3 + 17).map(|i| (i % 251) as u8).collect();
        std::fs::write(&path, &content).unwrap();

        let expected = format!("{:x}", Sha256::digest(&content));
        assert_eq!(hash_file(&path).await.unwrap(), expected);
    }

    #[tokio::test]
    async fn test_hash_missing_file() {
        let dir = tempdir().unwrap();
        assert!(hash_file(&dir.path().join("missing")).await.is_err());
    }

    #[test]
    fn test_digests_match() {
        assert!(digests_match("abcdef", "ABCDEF"));
        assert!(!digests_match("abcdef", "abcdee"));
        assert!(!digests_match("abc", "abcd"));
        assert!(digests_match("", ""));
    }

    #[tokio::test]
    async fn test_verify_detects_single_byte_change() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("artifact.zip");
        std::fs::write(&path, b"payload-0").unwrap();
        let hash = hash_file(&path).await.unwrap();

        assert!(verify_file(&path, &hash).await.unwrap());

        std::fs::write(&path, b"payload-1").unwrap();
        assert!(!verify_file(&path, &hash).await.unwrap());
    }
}
