//! 可恢复的翻译进度存储
//!
//! 每完成一段就立即写一个独立的检查点文件，进程崩溃最多丢失正在翻译的那一段。
//!
//! ## 目录布局
//! ```text
//! <work_dir>/jobs/<job_id>/job.json                      任务记录（磁盘事实的缓存）
//! <work_dir>/jobs/<job_id>/<job_id>_segment_0001.json    段检查点
//! <output_dir>/<标题>-translation-<job_id>.txt           最终产物
//! ```
//!
//! 检查点通过“临时文件 + 重命名”整体写入，并发读取方只会看到完整文件或看不到文件。
//! `lastCompletedSegmentId` 总是从检查点文件重新计算，不依赖任务记录。

use std::collections::BTreeSet;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::task::TranslationJob;
use crate::translation::pipeline::TranslatedBlock;

const JOB_FILE: &str = "job.json";
const MAX_TITLE_CHARS: usize = 60;

/// 存储错误，对任务而言总是致命的
#[derive(Error, Debug, Clone)]
pub enum StoreError {
    #[error("读写失败 {path}: {message}")]
    Io { path: String, message: String },

    #[error("检查点文件损坏 {path}: {message}")]
    Corrupt { path: String, message: String },

    #[error("检查点已存在，拒绝覆盖: {path}")]
    AlreadyExists { path: String },

    #[error("序列化失败: {0}")]
    Serialization(String),
}

impl StoreError {
    fn io(path: &Path, err: impl std::fmt::Display) -> Self {
        StoreError::Io {
            path: path.display().to_string(),
            message: err.to_string(),
        }
    }

    fn corrupt(path: &Path, err: impl std::fmt::Display) -> Self {
        StoreError::Corrupt {
            path: path.display().to_string(),
            message: err.to_string(),
        }
    }
}

/// 一段已完成翻译的检查点记录，写入后不再修改
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranslatedUnit {
    pub segment_id: u64,
    /// 章节标题或“第 N 段”
    pub title: String,
    pub translated_text: String,
    pub source_document_title: String,
    /// 按块的译文，用于重建 HTML
    #[serde(default)]
    pub blocks: Vec<TranslatedBlock>,
    #[serde(default)]
    pub degraded: bool,
}

/// 从磁盘恢复的进度
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Checkpoint {
    /// 0 表示还没有任何完成的段
    pub last_completed_segment_id: u64,
    /// 按 segment_id 升序
    pub units: Vec<TranslatedUnit>,
}

impl Checkpoint {
    pub fn completed_ids(&self) -> BTreeSet<u64> {
        self.units.iter().map(|unit| unit.segment_id).collect()
    }

    /// 按块合并全部段的译文，块之间空一行
    ///
    /// 超长块被切到相邻几段时，各片段直接相接还原成一个段落。
    /// 没有块信息的旧记录整段作为一个段落。
    pub fn merged_text(&self) -> String {
        let mut paragraphs: Vec<(Option<u64>, String)> = Vec::new();
        for unit in &self.units {
            if unit.blocks.is_empty() {
                paragraphs.push((None, unit.translated_text.clone()));
                continue;
            }
            for block in &unit.blocks {
                match paragraphs.last_mut() {
                    Some((Some(sequence), text)) if *sequence == block.sequence => {
                        text.push_str(&block.text)
                    }
                    _ => paragraphs.push((Some(block.sequence), block.text.clone())),
                }
            }
        }

        paragraphs
            .into_iter()
            .map(|(_, text)| text)
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }
}

/// 最终产物
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FinalArtifact {
    pub path: PathBuf,
    pub text: String,
}

/// 检查点存储
#[derive(Debug, Clone)]
pub struct ProgressStore {
    jobs_root: PathBuf,
    output_dir: PathBuf,
    unit_pattern: Regex,
}

impl ProgressStore {
    pub fn new(work_root: impl AsRef<Path>, output_dir: impl AsRef<Path>) -> Self {
        Self {
            jobs_root: work_root.as_ref().join("jobs"),
            output_dir: output_dir.as_ref().to_path_buf(),
            unit_pattern: Regex::new(r"^(.+)_segment_(\d+)\.json$").expect("静态正则表达式"),
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    pub fn job_dir(&self, job_id: &str) -> PathBuf {
        self.jobs_root.join(job_id)
    }

    pub fn unit_file_name(job_id: &str, segment_id: u64) -> String {
        format!("{}_segment_{:04}.json", job_id, segment_id)
    }

    pub fn unit_path(&self, job_id: &str, segment_id: u64) -> PathBuf {
        self.job_dir(job_id).join(Self::unit_file_name(job_id, segment_id))
    }

    /// 写入一段检查点；同一段重复写入返回 `AlreadyExists`
    pub fn append_unit(&self, job_id: &str, unit: &TranslatedUnit) -> Result<PathBuf, StoreError> {
        let dir = self.job_dir(job_id);
        fs::create_dir_all(&dir).map_err(|e| StoreError::io(&dir, e))?;

        let path = self.unit_path(job_id, unit.segment_id);
        let bytes = serde_json::to_vec_pretty(unit)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;

        write_atomic(&dir, &path, &bytes, false)?;
        tracing::debug!("检查点已写入: {}", path.display());
        Ok(path)
    }

    /// 扫描任务目录，按段号排序返回全部检查点
    pub fn load_checkpoint(&self, job_id: &str) -> Result<Checkpoint, StoreError> {
        let dir = self.job_dir(job_id);
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Checkpoint::default()),
            Err(e) => return Err(StoreError::io(&dir, e)),
        };

        let mut units = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| StoreError::io(&dir, e))?;
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };

            let Some(caps) = self.unit_pattern.captures(name) else { continue };
            if &caps[1] != job_id {
                continue;
            }

            let path = entry.path();
            let seq: u64 = caps[2]
                .parse()
                .map_err(|e| StoreError::corrupt(&path, e))?;
            let content = fs::read(&path).map_err(|e| StoreError::io(&path, e))?;
            let unit: TranslatedUnit =
                serde_json::from_slice(&content).map_err(|e| StoreError::corrupt(&path, e))?;

            if unit.segment_id != seq {
                return Err(StoreError::corrupt(
                    &path,
                    format!("文件名段号 {} 与内容段号 {} 不一致", seq, unit.segment_id),
                ));
            }
            units.push(unit);
        }

        units.sort_by_key(|unit| unit.segment_id);
        let last_completed_segment_id = units.last().map(|unit| unit.segment_id).unwrap_or(0);

        Ok(Checkpoint {
            last_completed_segment_id,
            units,
        })
    }

    /// 最终产物路径
    pub fn output_path(&self, job_id: &str, title: &str) -> PathBuf {
        self.output_dir
            .join(format!("{}-translation-{}.txt", file_stem_for(title), job_id))
    }

    /// 其他格式产物（HTML、PDF）的路径
    pub fn artifact_path(&self, job_id: &str, title: &str, extension: &str) -> PathBuf {
        self.output_dir
            .join(format!("{}-{}.{}", file_stem_for(title), job_id, extension))
    }

    /// 按段号顺序拼接全部检查点写入最终产物，可重复调用
    pub fn finalize(&self, job_id: &str, title: &str) -> Result<FinalArtifact, StoreError> {
        let checkpoint = self.load_checkpoint(job_id)?;

        let mut text = format!("《{}》\n\n", title);
        text.push_str(&checkpoint.merged_text());

        fs::create_dir_all(&self.output_dir).map_err(|e| StoreError::io(&self.output_dir, e))?;
        let path = self.output_path(job_id, title);
        write_atomic(&self.output_dir, &path, text.as_bytes(), true)?;

        tracing::info!(
            "已合并 {} 段译文: {}",
            checkpoint.units.len(),
            path.display()
        );
        Ok(FinalArtifact { path, text })
    }

    /// 保存任务记录（覆盖写）
    pub fn save_job(&self, job: &TranslationJob) -> Result<(), StoreError> {
        let dir = self.job_dir(&job.job_id);
        fs::create_dir_all(&dir).map_err(|e| StoreError::io(&dir, e))?;

        let bytes =
            serde_json::to_vec_pretty(job).map_err(|e| StoreError::Serialization(e.to_string()))?;
        write_atomic(&dir, &dir.join(JOB_FILE), &bytes, true)
    }

    pub fn load_job(&self, job_id: &str) -> Result<Option<TranslationJob>, StoreError> {
        let path = self.job_dir(job_id).join(JOB_FILE);
        match fs::read(&path) {
            Ok(content) => serde_json::from_slice(&content)
                .map(Some)
                .map_err(|e| StoreError::corrupt(&path, e)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StoreError::io(&path, e)),
        }
    }

    /// 列出所有持久化的任务记录，损坏的记录跳过并记录日志
    pub fn list_jobs(&self) -> Result<Vec<TranslationJob>, StoreError> {
        let entries = match fs::read_dir(&self.jobs_root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(StoreError::io(&self.jobs_root, e)),
        };

        let mut jobs = Vec::new();
        for entry in entries.flatten() {
            if !entry.path().is_dir() {
                continue;
            }
            let Some(job_id) = entry.file_name().to_str().map(str::to_string) else {
                continue;
            };
            match self.load_job(&job_id) {
                Ok(Some(job)) => jobs.push(job),
                Ok(None) => {}
                Err(e) => tracing::warn!("跳过无法读取的任务记录: {}", e),
            }
        }

        jobs.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(jobs)
    }

    /// 删除任务目录（检查点与记录），可选删除最终产物
    pub fn remove_job(&self, job_id: &str, outputs: &[PathBuf]) -> Result<(), StoreError> {
        let dir = self.job_dir(job_id);
        match fs::remove_dir_all(&dir) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(StoreError::io(&dir, e)),
        }

        for output in outputs {
            if let Err(e) = fs::remove_file(output) {
                if e.kind() != io::ErrorKind::NotFound {
                    return Err(StoreError::io(output, e));
                }
            }
        }
        Ok(())
    }
}

/// 单段的可读文本
pub fn render_unit_text(unit: &TranslatedUnit) -> String {
    format!(
        "======== 《{}》- {} ========\n\n{}",
        unit.source_document_title, unit.title, unit.translated_text
    )
}

/// 标题截断并替换文件名中不允许的字符
fn file_stem_for(title: &str) -> String {
    let stem: String = title
        .trim()
        .chars()
        .take(MAX_TITLE_CHARS)
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();

    if stem.trim().is_empty() {
        "untitled".to_string()
    } else {
        stem
    }
}

/// 在同目录写临时文件再改名
fn write_atomic(dir: &Path, path: &Path, bytes: &[u8], overwrite: bool) -> Result<(), StoreError> {
    let mut temp = tempfile::Builder::new()
        .prefix(".partial-")
        .suffix(".tmp")
        .tempfile_in(dir)
        .map_err(|e| StoreError::io(dir, e))?;

    temp.write_all(bytes).map_err(|e| StoreError::io(temp.path(), e))?;
    temp.as_file()
        .sync_all()
        .map_err(|e| StoreError::io(temp.path(), e))?;

    let result = if overwrite {
        temp.persist(path).map(|_| ())
    } else {
        temp.persist_noclobber(path).map(|_| ())
    };

    result.map_err(|e| {
        if e.error.kind() == io::ErrorKind::AlreadyExists {
            StoreError::AlreadyExists {
                path: path.display().to_string(),
            }
        } else {
            StoreError::io(path, e.error)
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn unit(segment_id: u64, text: &str) -> TranslatedUnit {
        TranslatedUnit {
            segment_id,
            title: format!("第 {} 段", segment_id),
            translated_text: text.to_string(),
            source_document_title: "测试书".to_string(),
            blocks: vec![],
            degraded: false,
        }
    }

    fn store() -> (TempDir, ProgressStore) {
        let dir = TempDir::new().unwrap();
        let store = ProgressStore::new(dir.path().join("work"), dir.path().join("out"));
        (dir, store)
    }

    #[test]
    fn empty_job_has_no_checkpoint() {
        let (_dir, store) = store();
        let checkpoint = store.load_checkpoint("missing").unwrap();
        assert_eq!(checkpoint.last_completed_segment_id, 0);
        assert!(checkpoint.is_empty());
    }

    #[test]
    fn units_are_sorted_by_segment_id() {
        let (_dir, store) = store();
        for id in [3, 1, 2] {
            store.append_unit("job", &unit(id, &format!("段{}", id))).unwrap();
        }

        let checkpoint = store.load_checkpoint("job").unwrap();
        assert_eq!(checkpoint.last_completed_segment_id, 3);
        let ids: Vec<u64> = checkpoint.units.iter().map(|u| u.segment_id).collect();
        assert_eq!(ids, vec![1, 2, 3]);
        assert!(store.unit_path("job", 2).ends_with("job_segment_0002.json"));
    }

    fn unit_with_blocks(segment_id: u64, blocks: &[(u64, &str)]) -> TranslatedUnit {
        TranslatedUnit {
            blocks: blocks
                .iter()
                .map(|(sequence, text)| TranslatedBlock {
                    sequence: *sequence,
                    text: text.to_string(),
                })
                .collect(),
            ..unit(segment_id, "")
        }
    }

    #[test]
    fn finalize_rejoins_block_split_across_segments() {
        let (_dir, store) = store();
        store.append_unit("job", &unit_with_blocks(1, &[(1, "标题"), (2, "前半句，")])).unwrap();
        store.append_unit("job", &unit_with_blocks(2, &[(2, "中间，")])).unwrap();
        store.append_unit("job", &unit_with_blocks(3, &[(2, "后半句。"), (3, "下一段")])).unwrap();

        let artifact = store.finalize("job", "书").unwrap();
        assert_eq!(artifact.text, "《书》\n\n标题\n\n前半句，中间，后半句。\n\n下一段");
    }

    #[test]
    fn duplicate_unit_is_rejected() {
        let (_dir, store) = store();
        store.append_unit("job", &unit(1, "一")).unwrap();
        let err = store.append_unit("job", &unit(1, "二")).unwrap_err();
        assert!(matches!(err, StoreError::AlreadyExists { .. }));

        let checkpoint = store.load_checkpoint("job").unwrap();
        assert_eq!(checkpoint.units[0].translated_text, "一");
    }

    #[test]
    fn corrupt_unit_is_reported() {
        let (_dir, store) = store();
        store.append_unit("job", &unit(1, "一")).unwrap();
        fs::write(store.unit_path("job", 2), b"{not json").unwrap();

        assert!(matches!(
            store.load_checkpoint("job"),
            Err(StoreError::Corrupt { .. })
        ));
    }

    #[test]
    fn stray_files_are_ignored() {
        let (_dir, store) = store();
        store.append_unit("job", &unit(1, "一")).unwrap();
        let dir = store.job_dir("job");
        fs::write(dir.join(".partial-abc.tmp"), b"junk").unwrap();
        fs::write(dir.join("other_segment_0005.json"), b"junk").unwrap();

        assert_eq!(store.load_checkpoint("job").unwrap().units.len(), 1);
    }

    #[test]
    fn finalize_is_idempotent() {
        let (_dir, store) = store();
        store.append_unit("job", &unit(2, "乙")).unwrap();
        store.append_unit("job", &unit(1, "甲")).unwrap();

        let first = store.finalize("job", "书名").unwrap();
        let second = store.finalize("job", "书名").unwrap();
        assert_eq!(first, second);
        assert_eq!(first.text, "《书名》\n\n甲\n\n乙");
        assert_eq!(fs::read_to_string(&first.path).unwrap(), first.text);
        assert_eq!(store.load_checkpoint("job").unwrap().units.len(), 2);
    }

    #[test]
    fn output_name_is_sanitized_and_truncated() {
        let (_dir, store) = store();
        let long = "a/b".repeat(40);
        let name = store
            .output_path("id", &long)
            .file_name()
            .unwrap()
            .to_string_lossy()
            .to_string();
        assert!(!name.contains('/'));
        assert!(name.ends_with("-translation-id.txt"));
        assert_eq!(name.chars().count(), 60 + "-translation-id.txt".len());
    }

    #[test]
    fn unit_text_rendering() {
        let text = render_unit_text(&unit(4, "内容"));
        assert_eq!(text, "======== 《测试书》- 第 4 段 ========\n\n内容");
    }
}
