use crate::constants::archive::ZIP64_THRESHOLD;
use crate::{BackupError, Result};
use std::collections::HashSet;
use std::fs::File;
use std::io::{self, BufReader};
use std::path::{Component, Path, PathBuf};
use tracing::{debug, warn};
use walkdir::WalkDir;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

/// ZIP 归档写入器
///
/// 持有打开的归档文件句柄，`close` 写入中央目录并落盘。
/// 未调用 `close` 就被丢弃时，底层 `ZipWriter` 仍会在析构时释放文件。
pub struct ArchiveWriter {
    path: PathBuf,
    zip: ZipWriter<File>,
    file_options: SimpleFileOptions,
    dir_options: SimpleFileOptions,
    names: HashSet<String>,
}

impl ArchiveWriter {
    /// 创建归档文件，无法创建时直接失败
    pub fn open(path: &Path, compression_level: u32) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                BackupError::archive_write(format!("无法创建归档目录 {}: {e}", parent.display()))
            })?;
        }

        let file = File::create(path).map_err(|e| {
            BackupError::archive_write(format!("无法创建归档 {}: {e}", path.display()))
        })?;

        let compression_level = compression_level.min(9);
        let compression_method = if compression_level == 0 {
            CompressionMethod::Stored
        } else {
            CompressionMethod::Deflated
        };
        let mut file_options = SimpleFileOptions::default().compression_method(compression_method);
        if compression_level > 0 {
            file_options = file_options.compression_level(Some(compression_level as i64));
        }
        let dir_options = SimpleFileOptions::default().compression_method(CompressionMethod::Stored);

        debug!("打开归档: {}", path.display());

        Ok(Self {
            path: path.to_path_buf(),
            zip: ZipWriter::new(file),
            file_options,
            dir_options,
            names: HashSet::new(),
        })
    }

    /// 归档文件路径
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 已写入的条目数（文件和目录）
    pub fn entry_count(&self) -> usize {
        self.names.len()
    }

    /// 添加单个文件，源文件不存在时跳过并返回 `false`
    pub fn add_file(&mut self, source: &Path, archive_path: &str) -> Result<bool> {
        if !source.is_file() {
            warn!("跳过不存在的文件: {}", source.display());
            return Ok(false);
        }

        let archive_path = archive_path.trim_start_matches('/').to_string();
        if !self.names.insert(archive_path.clone()) {
            debug!("归档中已存在条目，跳过: {}", archive_path);
            return Ok(false);
        }

        let file = match File::open(source) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                self.names.remove(&archive_path);
                warn!("文件在打包过程中消失，跳过: {}", source.display());
                return Ok(false);
            }
            Err(e) => {
                return Err(BackupError::archive_write(format!(
                    "读取文件失败 {}: {e}",
                    source.display()
                )));
            }
        };

        let metadata = file.metadata()?;
        let mut options = self
            .file_options
            .clone()
            .large_file(metadata.len() >= ZIP64_THRESHOLD);
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            options = options.unix_permissions(metadata.permissions().mode());
        }

        self.zip
            .start_file(archive_path.as_str(), options)
            .map_err(|e| {
                BackupError::archive_write(format!("写入 Zip 条目失败 {archive_path}: {e}"))
            })?;

        let mut reader = BufReader::new(file);
        io::copy(&mut reader, &mut self.zip).map_err(|e| {
            BackupError::archive_write(format!("写入 Zip 内容失败 {archive_path}: {e}"))
        })?;

        Ok(true)
    }

    /// 递归添加目录，父目录条目先于其中的文件写入，空目录也会保留
    ///
    /// 源目录不存在时跳过，返回写入的条目数。
    pub fn add_tree(&mut self, source_dir: &Path, archive_prefix: &str) -> Result<usize> {
        if !source_dir.is_dir() {
            warn!("跳过不存在的目录: {}", source_dir.display());
            return Ok(0);
        }

        let prefix = archive_prefix.trim_matches('/');
        let mut added = 0;

        for entry in WalkDir::new(source_dir).follow_links(false) {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) if e.io_error().map(|io| io.kind()) == Some(io::ErrorKind::NotFound) => {
                    warn!("遍历时条目消失，跳过: {e}");
                    continue;
                }
                Err(e) => return Err(e.into()),
            };

            let relative = entry.path().strip_prefix(source_dir)?;
            let name = join_archive_name(prefix, relative);
            let file_type = entry.file_type();

            if file_type.is_dir() {
                if name.is_empty() {
                    continue;
                }
                if self.add_directory(&name)? {
                    added += 1;
                }
            } else if file_type.is_file() {
                if self.add_file(entry.path(), &name)? {
                    added += 1;
                }
            } else {
                debug!("跳过符号链接或特殊文件: {}", entry.path().display());
            }
        }

        Ok(added)
    }

    fn add_directory(&mut self, name: &str) -> Result<bool> {
        let name = format!("{}/", name.trim_end_matches('/'));
        if !self.names.insert(name.clone()) {
            return Ok(false);
        }

        self.zip
            .add_directory(name.as_str(), self.dir_options.clone())
            .map_err(|e| BackupError::archive_write(format!("写入 Zip 目录失败 {name}: {e}")))?;
        Ok(true)
    }

    /// 完成归档并落盘，返回归档路径
    pub fn close(self) -> Result<PathBuf> {
        let file = self
            .zip
            .finish()
            .map_err(|e| BackupError::archive_write(format!("完成归档失败: {e}")))?;
        file.sync_all()?;

        debug!("归档完成: {} ({} 个条目)", self.path.display(), self.names.len());
        Ok(self.path)
    }
}

/// 拼接归档内部名称，统一使用 `/` 分隔
pub fn join_archive_name(prefix: &str, relative: &Path) -> String {
    let mut parts: Vec<String> = Vec::new();
    if !prefix.is_empty() {
        parts.push(prefix.to_string());
    }
    for component in relative.components() {
        if let Component::Normal(part) = component {
            parts.push(part.to_string_lossy().to_string());
        }
    }
    parts.join("/")
}

/// 解压归档中的全部条目，保持相对路径
///
/// 路径越出目标目录的条目会被拒绝。返回解压的文件数。
pub fn extract_all(archive_path: &Path, destination: &Path) -> Result<usize> {
    let file = File::open(archive_path)?;
    let mut archive = ZipArchive::new(file)?;
    std::fs::create_dir_all(destination)?;

    let mut extracted = 0;
    for i in 0..archive.len() {
        let mut entry = archive.by_index(i)?;
        let Some(relative) = entry.enclosed_name() else {
            return Err(BackupError::restore(format!(
                "归档条目路径非法: {}",
                entry.name()
            )));
        };
        let outpath = destination.join(relative);

        if entry.is_dir() {
            std::fs::create_dir_all(&outpath)?;
            continue;
        }

        if let Some(parent) = outpath.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut outfile = File::create(&outpath)?;
        io::copy(&mut entry, &mut outfile)?;

        #[cfg(unix)]
        if let Some(mode) = entry.unix_mode() {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&outpath, std::fs::Permissions::from_mode(mode))?;
        }

        extracted += 1;
    }

    Ok(extracted)
}

/// 列出归档中的全部条目名称
pub fn list_entries(archive_path: &Path) -> Result<Vec<String>> {
    let file = File::open(archive_path)?;
    let archive = ZipArchive::new(file)?;
    Ok(archive.file_names().map(str::to_string).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn sample_tree(root: &Path) {
        std::fs::create_dir_all(root.join("nested/deeper")).unwrap();
        std::fs::create_dir_all(root.join("empty")).unwrap();
        std::fs::write(root.join("a.txt"), "hello").unwrap();
        std::fs::write(root.join("nested/deeper/b.txt"), "world").unwrap();
    }

    #[test]
    fn test_add_tree_writes_parents_before_children() {
        let dir = tempdir().unwrap();
        let source = dir.path().join("public");
        sample_tree(&source);

        let archive_path = dir.path().join("out.zip");
        let mut writer = ArchiveWriter::open(&archive_path, 6).unwrap();
        let added = writer.add_tree(&source, "public").unwrap();
        writer.close().unwrap();

        // public/, nested/, deeper/, empty/ 四个目录加两个文件
        assert_eq!(added, 6);

        let names = list_entries(&archive_path).unwrap();
        assert!(names.contains(&"public/empty/".to_string()));
        assert!(names.contains(&"public/a.txt".to_string()));

        let dir_pos = names.iter().position(|n| n == "public/nested/deeper/").unwrap();
        let file_pos = names
            .iter()
            .position(|n| n == "public/nested/deeper/b.txt")
            .unwrap();
        assert!(dir_pos < file_pos);
        assert_eq!(names[0], "public/");
    }

    #[test]
    fn test_missing_sources_are_skipped() {
        let dir = tempdir().unwrap();
        let archive_path = dir.path().join("out.zip");

        let mut writer = ArchiveWriter::open(&archive_path, 6).unwrap();
        assert!(!writer.add_file(&dir.path().join("nope.sql"), "database/nope.sql").unwrap());
        assert_eq!(writer.add_tree(&dir.path().join("nope"), "config").unwrap(), 0);
        writer.close().unwrap();

        assert!(list_entries(&archive_path).unwrap().is_empty());
    }

    #[test]
    fn test_open_fails_for_unwritable_location() {
        let dir = tempdir().unwrap();
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, "file, not a directory").unwrap();

        let result = ArchiveWriter::open(&blocker.join("out.zip"), 6);
        assert!(matches!(result, Err(BackupError::ArchiveWrite(_))));
    }

    #[test]
    fn test_duplicate_entries_are_ignored() {
        let dir = tempdir().unwrap();
        let source = dir.path().join("a.txt");
        std::fs::write(&source, "hello").unwrap();

        let archive_path = dir.path().join("out.zip");
        let mut writer = ArchiveWriter::open(&archive_path, 0).unwrap();
        assert!(writer.add_file(&source, "x/a.txt").unwrap());
        assert!(!writer.add_file(&source, "x/a.txt").unwrap());
        writer.close().unwrap();

        assert_eq!(list_entries(&archive_path).unwrap(), vec!["x/a.txt".to_string()]);
    }

    #[test]
    fn test_extract_all_restores_structure() {
        let dir = tempdir().unwrap();
        let source = dir.path().join("config");
        sample_tree(&source);

        let archive_path = dir.path().join("out.zip");
        let mut writer = ArchiveWriter::open(&archive_path, 9).unwrap();
        writer.add_tree(&source, "config").unwrap();
        writer.close().unwrap();

        let target = dir.path().join("extracted");
        let extracted = extract_all(&archive_path, &target).unwrap();
        assert_eq!(extracted, 2);
        assert_eq!(
            std::fs::read_to_string(target.join("config/a.txt")).unwrap(),
            "hello"
        );
        assert_eq!(
            std::fs::read_to_string(target.join("config/nested/deeper/b.txt")).unwrap(),
            "world"
        );
        assert!(target.join("config/empty").is_dir());
    }

    #[test]
    fn test_join_archive_name() {
        assert_eq!(
            join_archive_name("storage/app", Path::new("x/y.txt")),
            "storage/app/x/y.txt"
        );
        assert_eq!(join_archive_name("", Path::new("y.txt")), "y.txt");
        assert_eq!(join_archive_name("public", Path::new("")), "public");
    }
}
