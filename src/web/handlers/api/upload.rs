//! multipart 上传解析

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use axum::extract::Multipart;

use crate::web::types::ApiError;

/// 一次上传的文件与表单字段
#[derive(Debug, Default)]
pub struct Upload {
    /// 原始文件名与保存路径
    pub file: Option<(String, PathBuf)>,
    pub fields: HashMap<String, String>,
}

impl Upload {
    /// 读取表单，`file_fields` 中任一名称的字段视为文件
    pub async fn read(
        mut multipart: Multipart,
        upload_dir: &Path,
        file_fields: &[&str],
    ) -> Result<Self, ApiError> {
        let mut upload = Upload::default();

        while let Some(field) = multipart
            .next_field()
            .await
            .map_err(|e| ApiError::bad_request(format!("表单解析失败: {}", e)))?
        {
            let name = field.name().unwrap_or_default().to_string();

            if file_fields.contains(&name.as_str()) && upload.file.is_none() {
                let original = field.file_name().unwrap_or("upload").to_string();
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| ApiError::bad_request(format!("文件读取失败: {}", e)))?;
                if bytes.is_empty() {
                    return Err(ApiError::bad_request("上传的文件为空"));
                }

                tokio::fs::create_dir_all(upload_dir)
                    .await
                    .map_err(|e| ApiError::internal(format!("无法创建上传目录: {}", e)))?;
                let saved = upload_dir.join(format!(
                    "{}-{}",
                    uuid::Uuid::new_v4(),
                    sanitize_file_name(&original)
                ));
                tokio::fs::write(&saved, &bytes)
                    .await
                    .map_err(|e| ApiError::internal(format!("文件保存失败: {}", e)))?;

                tracing::info!("收到上传文件 {} ({} 字节) -> {}", original, bytes.len(), saved.display());
                upload.file = Some((original, saved));
            } else {
                let value = field
                    .text()
                    .await
                    .map_err(|e| ApiError::bad_request(format!("字段读取失败: {}", e)))?;
                upload.fields.insert(name, value);
            }
        }

        Ok(upload)
    }

    /// 取出文件，扩展名不符时删除已保存的文件
    pub async fn take_file(&mut self, extension: &str, label: &str) -> Result<PathBuf, ApiError> {
        let (original, saved) = self
            .file
            .take()
            .ok_or_else(|| ApiError::bad_request("未收到文件"))?;

        if !has_extension(&original, extension) {
            let _ = tokio::fs::remove_file(&saved).await;
            return Err(ApiError::bad_request(format!("仅支持{}文件格式", label)));
        }
        Ok(saved)
    }

    /// 布尔字段：`true` / `1` / `on` / `yes`
    pub fn flag(&self, name: &str) -> Option<bool> {
        self.fields.get(name).map(|value| {
            matches!(
                value.trim().to_ascii_lowercase().as_str(),
                "true" | "1" | "on" | "yes"
            )
        })
    }
}

pub fn has_extension(file_name: &str, extension: &str) -> bool {
    Path::new(file_name)
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case(extension))
}

/// 只保留文件名部分，替换路径分隔符和控制字符
pub fn sanitize_file_name(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or(name);
    let cleaned: String = base
        .chars()
        .map(|c| match c {
            ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();

    if cleaned.trim_matches('.').is_empty() {
        "upload".to_string()
    } else {
        cleaned
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extension_check_is_case_insensitive() {
        assert!(has_extension("Book.EPUB", "epub"));
        assert!(!has_extension("book.epub.exe", "epub"));
        assert!(!has_extension("book", "pdf"));
    }

    #[test]
    fn file_names_are_flattened() {
        assert_eq!(sanitize_file_name("../../etc/passwd"), "passwd");
        assert_eq!(sanitize_file_name("C:\\books\\a:b.pdf"), "a_b.pdf");
        assert_eq!(sanitize_file_name(".."), "upload");
        assert_eq!(sanitize_file_name("三体.epub"), "三体.epub");
    }
}
