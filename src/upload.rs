//! 附件上传
//!
//! 帖子和活动都以 multipart 表单提交，文本字段与可选的一个附件混在一起。
//! 附件写入上传目录后通过 `/assets/<文件名>` 静态访问。

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use axum::extract::Multipart;
use axum::extract::multipart::MultipartError;
use axum::http::StatusCode;
use uuid::Uuid;

use crate::error::AppError;

const ALLOWED_DOCUMENT_TYPES: &[&str] = &[
    "application/pdf",
    "application/msword",
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
];

/// 已保存的附件
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    /// 上传目录中的文件名
    pub stored_name: String,
    /// 用户上传时的文件名
    pub original_name: String,
    pub content_type: String,
}

impl Attachment {
    pub fn is_image(&self) -> bool {
        self.content_type.starts_with("image/")
    }
}

/// 解析后的 multipart 表单
#[derive(Debug, Default)]
pub struct UploadForm {
    fields: HashMap<String, String>,
    pub attachment: Option<Attachment>,
}

impl UploadForm {
    /// 去除首尾空白，空字符串视为未填写
    pub fn text(&self, name: &str) -> Option<&str> {
        self.fields
            .get(name)
            .map(|value| value.trim())
            .filter(|value| !value.is_empty())
    }

    pub fn required(&self, name: &str, label: &str) -> Result<String, AppError> {
        self.text(name)
            .map(str::to_string)
            .ok_or_else(|| AppError::Validation(format!("{label}不能为空")))
    }
}

pub fn is_allowed_content_type(content_type: &str) -> bool {
    content_type.starts_with("image/") || ALLOWED_DOCUMENT_TYPES.contains(&content_type)
}

// 浏览器没有给出类型时按扩展名推断
fn content_type_from_extension(file_name: &str) -> Option<&'static str> {
    let extension = Path::new(file_name).extension()?.to_str()?.to_ascii_lowercase();
    match extension.as_str() {
        "jpg" | "jpeg" => Some("image/jpeg"),
        "png" => Some("image/png"),
        "gif" => Some("image/gif"),
        "pdf" => Some("application/pdf"),
        "doc" => Some("application/msword"),
        "docx" => Some("application/vnd.openxmlformats-officedocument.wordprocessingml.document"),
        _ => None,
    }
}

/// 只保留原文件名的最后一段，并替换掉路径分隔符等特殊字符
pub fn sanitize_file_name(original: &str) -> String {
    let base = original
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default();

    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();

    let cleaned = cleaned.trim_start_matches('.');
    // 超长文件名保留末尾部分，扩展名不丢
    let skip = cleaned.chars().count().saturating_sub(100);
    let cleaned: String = cleaned.chars().skip(skip).collect();

    if cleaned.is_empty() {
        "file".to_string()
    } else {
        cleaned
    }
}

fn map_multipart_error(err: MultipartError, max_bytes: usize) -> AppError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        AppError::PayloadTooLarge(max_bytes)
    } else {
        AppError::Validation(format!("表单解析失败: {}", err.body_text()))
    }
}

/// 读取整个表单，名为 `file_field` 的字段作为附件保存到 `upload_dir`
///
/// 返回错误时已经写入磁盘的附件会被删除。
pub async fn read_form(
    mut multipart: Multipart,
    file_field: &str,
    upload_dir: &str,
    max_bytes: usize,
) -> Result<UploadForm, AppError> {
    let mut form = UploadForm::default();

    match read_fields(&mut multipart, &mut form, file_field, upload_dir, max_bytes).await {
        Ok(()) => Ok(form),
        Err(e) => {
            if let Some(attachment) = &form.attachment {
                remove_attachment(upload_dir, &attachment.stored_name).await;
            }
            Err(e)
        }
    }
}

async fn read_fields(
    multipart: &mut Multipart,
    form: &mut UploadForm,
    file_field: &str,
    upload_dir: &str,
    max_bytes: usize,
) -> Result<(), AppError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| map_multipart_error(e, max_bytes))?
    {
        let name = field.name().unwrap_or_default().to_string();

        if name != file_field {
            let value = field
                .text()
                .await
                .map_err(|e| map_multipart_error(e, max_bytes))?;
            form.fields.insert(name, value);
            continue;
        }

        let Some(original_name) = field.file_name().map(str::to_string).filter(|n| !n.is_empty()) else {
            continue;
        };
        if form.attachment.is_some() {
            return Err(AppError::Validation("每次只能上传一个附件".into()));
        }

        let content_type = field
            .content_type()
            .filter(|ct| *ct != "application/octet-stream")
            .map(str::to_string)
            .or_else(|| content_type_from_extension(&original_name).map(str::to_string))
            .unwrap_or_default();
        if !is_allowed_content_type(&content_type) {
            return Err(AppError::Validation("仅支持上传图片、PDF 和 Word 文档".into()));
        }

        let bytes = field
            .bytes()
            .await
            .map_err(|e| map_multipart_error(e, max_bytes))?;
        if bytes.len() > max_bytes {
            return Err(AppError::PayloadTooLarge(max_bytes));
        }
        if bytes.is_empty() {
            continue;
        }

        let stored_name = format!("{}-{}", Uuid::new_v4().simple(), sanitize_file_name(&original_name));
        tokio::fs::create_dir_all(upload_dir).await?;
        tokio::fs::write(stored_path(upload_dir, &stored_name), &bytes).await?;
        tracing::info!(%stored_name, %original_name, size = bytes.len(), "Saved attachment");

        form.attachment = Some(Attachment {
            stored_name,
            original_name,
            content_type,
        });
    }

    Ok(())
}

fn stored_path(upload_dir: &str, stored_name: &str) -> PathBuf {
    Path::new(upload_dir).join(stored_name)
}

/// 删除附件文件，失败只记录日志
pub async fn remove_attachment(upload_dir: &str, stored_name: &str) {
    if stored_name.contains(['/', '\\']) {
        return;
    }
    match tokio::fs::remove_file(stored_path(upload_dir, stored_name)).await {
        Ok(()) => tracing::debug!(stored_name, "Removed attachment"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => tracing::warn!(stored_name, "Failed to remove attachment: {}", e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::extract::FromRequest;
    use axum::http::{Request, header};

    const BOUNDARY: &str = "campus-form-boundary";

    fn file_part(field: &str, file_name: &str, content_type: &str, content: &str) -> String {
        format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{field}\"; filename=\"{file_name}\"\r\nContent-Type: {content_type}\r\n\r\n{content}\r\n"
        )
    }

    fn text_part(field: &str, value: &str) -> String {
        format!("--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{field}\"\r\n\r\n{value}\r\n")
    }

    async fn multipart(parts: &[String]) -> Multipart {
        let body = format!("{}--{BOUNDARY}--\r\n", parts.concat());
        let request = Request::builder()
            .method("POST")
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(body))
            .unwrap();
        Multipart::from_request(request, &()).await.unwrap()
    }

    fn scratch_dir() -> String {
        std::env::temp_dir()
            .join(format!("campus-upload-{}", Uuid::new_v4().simple()))
            .to_string_lossy()
            .into_owned()
    }

    fn files_in(dir: &str) -> usize {
        std::fs::read_dir(dir).map(|entries| entries.count()).unwrap_or(0)
    }

    #[tokio::test]
    async fn form_with_one_attachment_is_saved() {
        let dir = scratch_dir();
        let parts = [
            text_part("description", "  Lab notes "),
            file_part("picture", "notes.pdf", "application/pdf", "%PDF-1.4"),
        ];

        let form = read_form(multipart(&parts).await, "picture", &dir, 1024).await.unwrap();
        assert_eq!(form.text("description"), Some("Lab notes"));

        let attachment = form.attachment.unwrap();
        assert_eq!(attachment.original_name, "notes.pdf");
        assert!(attachment.stored_name.ends_with("-notes.pdf"));
        assert_eq!(files_in(&dir), 1);

        remove_attachment(&dir, &attachment.stored_name).await;
        assert_eq!(files_in(&dir), 0);
    }

    #[tokio::test]
    async fn rejected_form_leaves_no_file_behind() {
        let dir = scratch_dir();
        let parts = [
            file_part("picture", "a.png", "image/png", "first"),
            file_part("picture", "b.png", "image/png", "second"),
        ];

        let result = read_form(multipart(&parts).await, "picture", &dir, 1024).await;
        assert!(matches!(result, Err(AppError::Validation(_))));
        assert_eq!(files_in(&dir), 0);
    }

    #[tokio::test]
    async fn disallowed_type_after_saved_file_cleans_up() {
        let dir = scratch_dir();
        let parts = [
            file_part("file", "agenda.pdf", "application/pdf", "%PDF-1.4"),
            file_part("file", "setup.exe", "application/x-msdownload", "MZ"),
        ];

        assert!(read_form(multipart(&parts).await, "file", &dir, 1024).await.is_err());
        assert_eq!(files_in(&dir), 0);
    }

    #[test]
    fn only_images_pdf_and_word_are_accepted() {
        assert!(is_allowed_content_type("image/png"));
        assert!(is_allowed_content_type("application/pdf"));
        assert!(is_allowed_content_type("application/msword"));
        assert!(!is_allowed_content_type("application/zip"));
        assert!(!is_allowed_content_type("text/html"));
    }

    #[test]
    fn content_type_falls_back_to_extension() {
        assert_eq!(content_type_from_extension("Notes.PDF"), Some("application/pdf"));
        assert_eq!(content_type_from_extension("photo.jpeg"), Some("image/jpeg"));
        assert_eq!(content_type_from_extension("archive.tar.gz"), None);
        assert_eq!(content_type_from_extension("README"), None);
    }

    #[test]
    fn file_names_cannot_escape_the_upload_dir() {
        assert_eq!(sanitize_file_name("../../etc/passwd"), "passwd");
        assert_eq!(sanitize_file_name("C:\\Users\\me\\cv.docx"), "cv.docx");
        assert_eq!(sanitize_file_name("my photo (1).png"), "my_photo__1_.png");
        assert_eq!(sanitize_file_name(".env"), "env");
        assert_eq!(sanitize_file_name(""), "file");
    }

    #[test]
    fn long_names_keep_their_extension() {
        let long = format!("{}.pdf", "a".repeat(300));
        let cleaned = sanitize_file_name(&long);
        assert_eq!(cleaned.chars().count(), 100);
        assert!(cleaned.ends_with(".pdf"));
    }

    #[test]
    fn empty_form_fields_count_as_missing() {
        let mut form = UploadForm::default();
        form.fields.insert("title".into(), "  Hackathon ".into());
        form.fields.insert("location".into(), "   ".into());

        assert_eq!(form.text("title"), Some("Hackathon"));
        assert_eq!(form.text("location"), None);
        assert!(matches!(form.required("location", "地点"), Err(AppError::Validation(_))));
    }
}
