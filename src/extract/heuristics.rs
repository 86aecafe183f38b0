//! 清单不可用时的启发式内容发现
//!
//! 每一遍扫描都是独立的纯函数 `根目录 → 候选文件`，按 [`PASSES`] 的顺序尝试。

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use regex::Regex;

use super::package::{normalize_path, walk_files};
use super::{load_markup_file, LoadedFile};

/// 一遍命名的扫描
#[derive(Debug, Clone, Copy)]
pub struct HeuristicPass {
    pub name: &'static str,
    pub find: fn(&Path) -> Vec<PathBuf>,
}

/// 扫描顺序
pub const PASSES: [HeuristicPass; 3] = [
    HeuristicPass {
        name: "markup-files",
        find: scan_markup_files,
    },
    HeuristicPass {
        name: "keyword-names",
        find: scan_keyword_files,
    },
    HeuristicPass {
        name: "href-references",
        find: scan_href_references,
    },
];

/// 运行一遍扫描并读取候选文件
pub fn run(pass: &HeuristicPass, root: &Path) -> Vec<LoadedFile> {
    (pass.find)(root)
        .iter()
        .filter_map(|path| load_markup_file(root, path))
        .collect()
}

const MARKUP_EXTENSIONS: &[&str] = &["html", "xhtml", "htm"];
const EXCLUDED_EXTENSIONS: &[&str] = &[
    "css", "png", "jpg", "jpeg", "gif", "svg", "webp", "bmp", "ttf", "otf", "woff", "woff2",
    "xml", "opf", "ncx",
];
const NAME_KEYWORDS: &[&str] = &["chapter", "content", "page", "text", "section"];

fn extension_of(path: &Path) -> String {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default()
}

/// 文件名中的第一个数字
fn first_number(path: &Path) -> Option<u64> {
    let name = path.file_name()?.to_str()?;
    let digits: String = name
        .chars()
        .skip_while(|c| !c.is_ascii_digit())
        .take_while(|c| c.is_ascii_digit())
        .collect();
    digits.parse().ok()
}

/// 按文件名中的数字排序，没有数字的排在最后，再按路径
fn sort_by_number(files: &mut [PathBuf]) {
    files.sort_by(|a, b| {
        let key_a = (first_number(a).unwrap_or(u64::MAX), a);
        let key_b = (first_number(b).unwrap_or(u64::MAX), b);
        key_a.cmp(&key_b)
    });
}

/// (a) 所有 `.html` / `.xhtml` / `.htm` 文件
pub fn scan_markup_files(root: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = walk_files(root)
        .into_iter()
        .filter(|path| MARKUP_EXTENSIONS.contains(&extension_of(path).as_str()))
        .collect();
    sort_by_number(&mut files);
    files
}

/// (b) 文件名含章节类关键词或纯数字的文件，不看扩展名
pub fn scan_keyword_files(root: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = walk_files(root)
        .into_iter()
        .filter(|path| !EXCLUDED_EXTENSIONS.contains(&extension_of(path).as_str()))
        .filter(|path| {
            let stem = path
                .file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or_default()
                .to_ascii_lowercase();
            !stem.is_empty()
                && (NAME_KEYWORDS.iter().any(|k| stem.contains(k))
                    || stem.chars().all(|c| c.is_ascii_digit()))
        })
        .collect();
    sort_by_number(&mut files);
    files
}

/// (c) `.xml` / `.opf` / `.ncx` 中引用到的 HTML 文件，按首次出现的顺序
pub fn scan_href_references(root: &Path) -> Vec<PathBuf> {
    static HREF: OnceLock<Regex> = OnceLock::new();
    let href = HREF.get_or_init(|| {
        Regex::new(r#"(?i)href\s*=\s*["']([^"'#]+\.(?:xhtml|html|htm))"#).expect("静态正则表达式")
    });

    let mut seen = HashSet::new();
    let mut files = Vec::new();
    for source in walk_files(root)
        .into_iter()
        .filter(|path| matches!(extension_of(path).as_str(), "xml" | "opf" | "ncx"))
    {
        let Ok(text) = std::fs::read_to_string(&source) else { continue };
        let base = source.parent().unwrap_or(root);
        for caps in href.captures_iter(&text) {
            let decoded = percent_encoding::percent_decode_str(&caps[1])
                .decode_utf8_lossy()
                .into_owned();
            let candidate = normalize_path(&base.join(decoded));
            if candidate.starts_with(root) && candidate.is_file() && seen.insert(candidate.clone()) {
                files.push(candidate);
            }
        }
    }
    files
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn touch(root: &Path, rel: &str, content: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    fn names(files: &[PathBuf]) -> Vec<String> {
        files
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect()
    }

    #[test]
    fn markup_files_sorted_numerically() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "OEBPS/text/ch10.html", "x");
        touch(dir.path(), "OEBPS/text/ch2.html", "x");
        touch(dir.path(), "OEBPS/text/ch01.xhtml", "x");
        touch(dir.path(), "OEBPS/cover.htm", "x");
        touch(dir.path(), "OEBPS/style.css", "x");

        let files = scan_markup_files(dir.path());
        assert_eq!(names(&files), vec!["ch01.xhtml", "ch2.html", "ch10.html", "cover.htm"]);
    }

    #[test]
    fn keyword_names_ignore_styles_and_images() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "data/chapter_b.txt", "x");
        touch(dir.path(), "data/007", "x");
        touch(dir.path(), "data/content.css", "x");
        touch(dir.path(), "data/page1.png", "x");
        touch(dir.path(), "data/readme.txt", "x");

        let files = scan_keyword_files(dir.path());
        assert_eq!(names(&files), vec!["007", "chapter_b.txt"]);
    }

    #[test]
    fn href_references_resolve_relative_to_source() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "meta/list.xml", r#"<a href="../body/one.xhtml"/><a href='../body/two.html#x'/><a href="../body/missing.html"/>"#);
        touch(dir.path(), "body/one.xhtml", "x");
        touch(dir.path(), "body/two.html", "x");

        let files = scan_href_references(dir.path());
        assert_eq!(names(&files), vec!["one.xhtml", "two.html"]);
    }
}
