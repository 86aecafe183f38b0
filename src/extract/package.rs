//! EPUB 包描述文件（OPF）、容器文件与导航（NCX / EPUB 3 nav）解析
//!
//! 这些文件用 xml5ever 解析成 DOM，再按元素本地名遍历，
//! 容忍命名空间前缀与不规范的大小写。

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use markup5ever_rcdom::{Handle, NodeData, RcDom};
use percent_encoding::percent_decode_str;
use xml5ever::driver::{parse_document, XmlParseOpts};
use xml5ever::tendril::TendrilSink;

use super::ExtractionError;

/// 常见的包描述文件位置
const COMMON_PACKAGE_PATHS: &[&str] = &["content.opf", "OEBPS/content.opf", "OPS/content.opf"];

/// 将 XML 文本转换为 DOM
pub fn xml_to_dom(xml: &str) -> std::io::Result<RcDom> {
    parse_document(RcDom::default(), XmlParseOpts::default())
        .from_utf8()
        .read_from(&mut xml.as_bytes())
}

fn parse_xml(xml: &str) -> Option<RcDom> {
    match xml_to_dom(xml) {
        Ok(dom) => Some(dom),
        Err(e) => {
            tracing::warn!("XML 解析失败: {}", e);
            None
        }
    }
}

/// 元素本地名（不含命名空间前缀），小写
fn local_name(node: &Handle) -> Option<String> {
    match &node.data {
        NodeData::Element { name, .. } => {
            let local: &str = &name.local;
            Some(local.to_ascii_lowercase())
        }
        _ => None,
    }
}

fn is_element(node: &Handle, wanted: &str) -> bool {
    local_name(node).is_some_and(|name| name == wanted)
}

/// 按本地名取属性值
fn attr(node: &Handle, wanted: &str) -> Option<String> {
    match &node.data {
        NodeData::Element { attrs, .. } => attrs
            .borrow()
            .iter()
            .find(|a| {
                let local: &str = &a.name.local;
                local.eq_ignore_ascii_case(wanted)
            })
            .map(|a| a.value.to_string()),
        _ => None,
    }
}

fn text_content(node: &Handle) -> String {
    fn collect(node: &Handle, out: &mut String) {
        if let NodeData::Text { contents } = &node.data {
            out.push_str(&contents.borrow());
        }
        for child in node.children.borrow().iter() {
            collect(child, out);
        }
    }

    let mut out = String::new();
    collect(node, &mut out);
    out
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// 文档顺序（先序）列出全部元素
fn elements(node: &Handle) -> Vec<Handle> {
    let mut found = Vec::new();
    let mut pending = vec![node.clone()];
    while let Some(current) = pending.pop() {
        if matches!(current.data, NodeData::Element { .. }) {
            found.push(current.clone());
        }
        for child in current.children.borrow().iter().rev() {
            pending.push(child.clone());
        }
    }
    found
}

/// 清单条目
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestItem {
    pub id: String,
    pub href: String,
    pub media_type: String,
    pub properties: String,
}

/// 清单条目分类
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemClass {
    Html,
    Css,
    Image,
    Other,
}

impl ManifestItem {
    pub fn class(&self) -> ItemClass {
        let media = self.media_type.to_ascii_lowercase();
        let ext = Path::new(&self.href)
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .unwrap_or_default();

        if media.contains("html") || matches!(ext.as_str(), "html" | "xhtml" | "htm") {
            ItemClass::Html
        } else if media == "text/css" || ext == "css" {
            ItemClass::Css
        } else if media.starts_with("image/")
            || matches!(ext.as_str(), "png" | "jpg" | "jpeg" | "gif" | "svg" | "webp")
        {
            ItemClass::Image
        } else {
            ItemClass::Other
        }
    }

    fn is_nav(&self) -> bool {
        self.properties.split_whitespace().any(|p| p == "nav")
    }

    fn is_ncx(&self) -> bool {
        self.media_type.eq_ignore_ascii_case("application/x-dtbncx+xml")
            || self.href.to_ascii_lowercase().ends_with(".ncx")
    }
}

/// 声明的目录条目（尚未映射到内容块）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NavPoint {
    pub title: String,
    /// 相对解压根目录的目标，可能带 `#片段`
    pub target: String,
    pub level: u32,
}

impl NavPoint {
    /// 去掉片段后的文件部分
    pub fn target_file(&self) -> &str {
        self.target.split('#').next().unwrap_or(&self.target)
    }
}

/// 解析后的包描述
#[derive(Debug, Clone, Default)]
pub struct Package {
    /// 包描述文件所在目录
    pub base_dir: PathBuf,
    pub title: Option<String>,
    pub manifest: Vec<ManifestItem>,
    pub spine: Vec<String>,
    pub spine_toc: Option<String>,
}

/// 定位包描述文件：常见路径 → container.xml → 递归搜索
pub fn locate_package(root: &Path) -> Option<PathBuf> {
    for candidate in COMMON_PACKAGE_PATHS {
        let path = root.join(candidate);
        if path.is_file() {
            return Some(path);
        }
    }

    let container = root.join("META-INF").join("container.xml");
    if let Ok(xml) = std::fs::read_to_string(&container) {
        if let Some(full_path) = rootfile_path(&xml) {
            let path = root.join(full_path);
            if path.is_file() {
                return Some(path);
            }
            tracing::warn!("container.xml 指向的包描述文件不存在: {}", path.display());
        }
    }

    let mut found: Vec<PathBuf> = walk_files(root)
        .into_iter()
        .filter(|path| {
            path.extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| e.eq_ignore_ascii_case("opf"))
        })
        .collect();
    found.sort();
    found.into_iter().next()
}

/// `rootfile@full-path`
pub fn rootfile_path(container_xml: &str) -> Option<String> {
    let dom = parse_xml(container_xml)?;
    elements(&dom.document)
        .iter()
        .filter(|node| is_element(node, "rootfile"))
        .find_map(|node| attr(node, "full-path"))
}

/// 读取并解析包描述文件
pub fn load_package(root: &Path, opf_path: &Path) -> Result<Package, ExtractionError> {
    let xml = std::fs::read_to_string(opf_path)
        .map_err(|e| ExtractionError::Io(format!("{}: {}", opf_path.display(), e)))?;
    let mut package = parse_package(&xml);
    package.base_dir = opf_path.parent().unwrap_or(root).to_path_buf();
    Ok(package)
}

/// 解析包描述文本
pub fn parse_package(xml: &str) -> Package {
    let mut package = Package::default();
    let Some(dom) = parse_xml(xml) else {
        return package;
    };

    for node in elements(&dom.document) {
        let Some(name) = local_name(&node) else { continue };
        match name.as_str() {
            "title" if package.title.is_none() => {
                let title = collapse_whitespace(&text_content(&node));
                if !title.is_empty() {
                    package.title = Some(title);
                }
            }
            "item" => {
                let get = |key: &str| attr(&node, key).unwrap_or_default();
                let href = get("href");
                if !href.is_empty() {
                    package.manifest.push(ManifestItem {
                        id: get("id"),
                        href,
                        media_type: get("media-type"),
                        properties: get("properties"),
                    });
                }
            }
            "spine" => package.spine_toc = attr(&node, "toc"),
            "itemref" => {
                if let Some(idref) = attr(&node, "idref") {
                    package.spine.push(idref);
                }
            }
            _ => {}
        }
    }

    package
}

impl Package {
    /// 清单条目在磁盘上的位置：先按原样，再按百分号解码
    pub fn resolve(&self, href: &str) -> Option<PathBuf> {
        let href = href.split('#').next().unwrap_or(href);
        let literal = self.base_dir.join(href);
        if literal.is_file() {
            return Some(literal);
        }

        let decoded = percent_decode_str(href).decode_utf8_lossy();
        let decoded_path = self.base_dir.join(decoded.as_ref());
        decoded_path.is_file().then_some(decoded_path)
    }

    fn item_by_id(&self, id: &str) -> Option<&ManifestItem> {
        self.manifest.iter().find(|item| item.id == id)
    }

    /// HTML 内容文件：先按 spine 顺序，不在 spine 中的按清单顺序排在后面
    pub fn content_paths(&self) -> Vec<PathBuf> {
        let mut ordered: Vec<&ManifestItem> = Vec::new();
        let mut seen: HashSet<&str> = HashSet::new();

        for idref in &self.spine {
            if let Some(item) = self.item_by_id(idref) {
                if item.class() == ItemClass::Html && seen.insert(item.href.as_str()) {
                    ordered.push(item);
                }
            }
        }
        for item in &self.manifest {
            if item.class() == ItemClass::Html && !item.is_nav() && seen.insert(item.href.as_str()) {
                ordered.push(item);
            }
        }

        ordered
            .into_iter()
            .filter_map(|item| {
                let resolved = self.resolve(&item.href);
                if resolved.is_none() {
                    tracing::warn!("清单条目缺失: {}", item.href);
                }
                resolved
            })
            .collect()
    }

    /// 清单中全部样式表内容
    pub fn read_stylesheets(&self) -> Vec<String> {
        self.manifest
            .iter()
            .filter(|item| item.class() == ItemClass::Css)
            .filter_map(|item| self.resolve(&item.href))
            .filter_map(|path| std::fs::read_to_string(path).ok())
            .collect()
    }

    /// 声明的目录：NCX 优先，其次 EPUB 3 导航文档
    pub fn read_toc(&self, root: &Path) -> Vec<NavPoint> {
        let ncx = self
            .spine_toc
            .as_deref()
            .and_then(|id| self.item_by_id(id))
            .or_else(|| self.manifest.iter().find(|item| item.is_ncx()));

        if let Some(path) = ncx.and_then(|item| self.resolve(&item.href)) {
            if let Ok(xml) = std::fs::read_to_string(&path) {
                let points = parse_ncx(&xml);
                if !points.is_empty() {
                    return rebase(points, &path, root);
                }
            }
        }

        let nav = self.manifest.iter().find(|item| item.is_nav());
        if let Some(path) = nav.and_then(|item| self.resolve(&item.href)) {
            if let Ok(xml) = std::fs::read_to_string(&path) {
                return rebase(parse_nav(&xml), &path, root);
            }
        }

        Vec::new()
    }
}

/// 把相对导航文件的目标改写成相对解压根目录
fn rebase(points: Vec<NavPoint>, nav_file: &Path, root: &Path) -> Vec<NavPoint> {
    let nav_dir = nav_file.parent().unwrap_or(root);
    points
        .into_iter()
        .map(|point| {
            let (file, fragment) = match point.target.split_once('#') {
                Some((file, fragment)) => (file.to_string(), Some(fragment.to_string())),
                None => (point.target.clone(), None),
            };
            let decoded = percent_decode_str(&file).decode_utf8_lossy().into_owned();
            let joined = normalize_path(&nav_dir.join(&decoded));
            let mut target = super::relative_ref(root, &joined);
            if let Some(fragment) = fragment {
                target.push('#');
                target.push_str(&fragment);
            }
            NavPoint { target, ..point }
        })
        .collect()
}

/// 消去路径中的 `.` 与 `..`
pub(crate) fn normalize_path(path: &Path) -> PathBuf {
    use std::path::Component;
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// NCX `navMap/navPoint`，层级为嵌套深度
pub fn parse_ncx(xml: &str) -> Vec<NavPoint> {
    let mut points = Vec::new();
    if let Some(dom) = parse_xml(xml) {
        collect_nav_points(&dom.document, 0, &mut points);
    }
    points
}

fn collect_nav_points(node: &Handle, level: u32, out: &mut Vec<NavPoint>) {
    for child in node.children.borrow().iter() {
        if !is_element(child, "navpoint") {
            collect_nav_points(child, level, out);
            continue;
        }

        let children = child.children.borrow();
        let label = children
            .iter()
            .find(|c| is_element(c, "navlabel"))
            .map(|c| collapse_whitespace(&text_content(c)))
            .unwrap_or_default();
        let target = children
            .iter()
            .find(|c| is_element(c, "content"))
            .and_then(|c| attr(c, "src"));
        drop(children);

        // 没有目标的条目跳过，但子条目照常收集
        if let Some(target) = target {
            let title = if label.is_empty() { target.clone() } else { label };
            out.push(NavPoint { title, target, level });
        }
        collect_nav_points(child, level + 1, out);
    }
}

/// EPUB 3 导航文档：优先 `epub:type="toc"` 的 nav，层级为 `ol` 嵌套深度
pub fn parse_nav(xml: &str) -> Vec<NavPoint> {
    let Some(dom) = parse_xml(xml) else {
        return Vec::new();
    };

    let navs: Vec<Handle> = elements(&dom.document)
        .into_iter()
        .filter(|node| is_element(node, "nav"))
        .collect();
    let toc_nav = navs
        .iter()
        .find(|nav| attr(nav, "type").is_some_and(|t| t.split_whitespace().any(|v| v == "toc")))
        .or_else(|| navs.first());

    let mut points = Vec::new();
    if let Some(nav) = toc_nav {
        collect_nav_links(nav, 0, &mut points);
    }
    points
}

fn collect_nav_links(node: &Handle, ol_depth: u32, out: &mut Vec<NavPoint>) {
    for child in node.children.borrow().iter() {
        if is_element(child, "ol") {
            collect_nav_links(child, ol_depth + 1, out);
        } else if is_element(child, "a") {
            if let Some(target) = attr(child, "href") {
                let title = collapse_whitespace(&text_content(child));
                out.push(NavPoint {
                    title: if title.is_empty() { target.clone() } else { title },
                    target,
                    level: ol_depth.saturating_sub(1),
                });
            }
        } else {
            collect_nav_links(child, ol_depth, out);
        }
    }
}

/// 递归列出目录下的全部文件，结果排序
pub(crate) fn walk_files(root: &Path) -> Vec<PathBuf> {
    let mut files = Vec::new();
    let mut pending = vec![root.to_path_buf()];
    while let Some(dir) = pending.pop() {
        let Ok(entries) = std::fs::read_dir(&dir) else { continue };
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() {
                pending.push(path);
            } else if path.is_file() {
                files.push(path);
            }
        }
    }
    files.sort();
    files
}

#[cfg(test)]
mod tests {
    use super::*;

    const OPF: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<package xmlns="http://www.idpf.org/2007/opf" version="2.0">
  <metadata xmlns:dc="http://purl.org/dc/elements/1.1/">
    <dc:title>Tom &amp; Jerry</dc:title>
  </metadata>
  <manifest>
    <item id="ncx" href="toc.ncx" media-type="application/x-dtbncx+xml"/>
    <item id="c2" href="text/ch2.xhtml" media-type="application/xhtml+xml"/>
    <item id="c1" href="text/ch1.xhtml" media-type="application/xhtml+xml"/>
    <item id="extra" href="text/notes.xhtml" media-type="application/xhtml+xml"/>
    <item id="css" href="style.css" media-type="text/css"/>
  </manifest>
  <spine toc="ncx">
    <itemref idref="c1"/>
    <itemref idref="c2"/>
  </spine>
</package>"#;

    #[test]
    fn parses_manifest_spine_and_title() {
        let package = parse_package(OPF);
        assert_eq!(package.title.as_deref(), Some("Tom & Jerry"));
        assert_eq!(package.manifest.len(), 5);
        assert_eq!(package.spine, vec!["c1", "c2"]);
        assert_eq!(package.spine_toc.as_deref(), Some("ncx"));
        assert_eq!(package.manifest[4].class(), ItemClass::Css);
    }

    #[test]
    fn content_paths_follow_spine_then_manifest() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("text")).unwrap();
        for name in ["ch1.xhtml", "ch2.xhtml", "notes.xhtml"] {
            std::fs::write(dir.path().join("text").join(name), "<p>x</p>").unwrap();
        }
        let mut package = parse_package(OPF);
        package.base_dir = dir.path().to_path_buf();

        let names: Vec<String> = package
            .content_paths()
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["ch1.xhtml", "ch2.xhtml", "notes.xhtml"]);
    }

    #[test]
    fn resolves_percent_encoded_href() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("chapter one.html"), "<p>x</p>").unwrap();
        let package = Package {
            base_dir: dir.path().to_path_buf(),
            ..Default::default()
        };
        assert!(package.resolve("chapter%20one.html#frag").is_some());
        assert!(package.resolve("missing.html").is_none());
    }

    #[test]
    fn container_rootfile() {
        let xml = r#"<container><rootfiles><rootfile full-path="item/standard.opf" media-type="application/oebps-package+xml"/></rootfiles></container>"#;
        assert_eq!(rootfile_path(xml).as_deref(), Some("item/standard.opf"));
    }

    #[test]
    fn ncx_nesting_levels() {
        let ncx = r#"<ncx><navMap>
          <navPoint id="p1"><navLabel><text>Part One</text></navLabel><content src="a.html"/>
            <navPoint id="p1-1"><navLabel><text>Chapter 1</text></navLabel><content src="a.html#c1"/></navPoint>
          </navPoint>
          <navPoint id="p2"><navLabel><text>Part Two</text></navLabel><content src="b.html"/></navPoint>
        </navMap></ncx>"#;
        let points = parse_ncx(ncx);
        let summary: Vec<_> = points.iter().map(|p| (p.title.as_str(), p.level)).collect();
        assert_eq!(summary, vec![("Part One", 0), ("Chapter 1", 1), ("Part Two", 0)]);
        assert_eq!(points[1].target_file(), "a.html");
    }

    #[test]
    fn nav_document_toc() {
        let nav = r#"<html xmlns="http://www.w3.org/1999/xhtml" xmlns:epub="http://www.idpf.org/2007/ops"><body>
          <nav epub:type="landmarks"><ol><li><a href="cover.xhtml">Cover</a></li></ol></nav>
          <nav epub:type="toc"><ol>
            <li><a href="c1.xhtml">One</a><ol><li><a href="c1.xhtml#s">One.A</a></li></ol></li>
            <li><a href="c2.xhtml"><span>Two</span></a></li>
          </ol></nav></body></html>"#;
        let points = parse_nav(nav);
        let summary: Vec<_> = points.iter().map(|p| (p.title.as_str(), p.level)).collect();
        assert_eq!(summary, vec![("One", 0), ("One.A", 1), ("Two", 0)]);
    }

    #[test]
    fn container_with_declaration_and_comments() {
        let xml = r#"<?xml version="1.0" encoding="UTF-8"?>
<!-- generated -->
<container version="1.0" xmlns="urn:oasis:names:tc:opendocument:xmlns:container">
  <rootfiles>
    <!-- <rootfile full-path="wrong.opf"/> -->
    <rootfile full-path="OPS/package.opf" media-type="application/oebps-package+xml"/>
  </rootfiles>
</container>"#;
        assert_eq!(rootfile_path(xml).as_deref(), Some("OPS/package.opf"));
    }

    #[test]
    fn decodes_entities_and_cdata_in_labels() {
        let ncx = r#"<ncx xmlns="http://www.daisy.org/z3986/2005/ncx/"><navMap>
          <navPoint id="a"><navLabel><text>Q &amp; A &#x2014; Part &#49;</text></navLabel><content src="a.html"/></navPoint>
          <navPoint id="b"><navLabel><text><![CDATA[<Intro>]]></text></navLabel><content src="b.html"/></navPoint>
        </navMap></ncx>"#;
        let titles: Vec<String> = parse_ncx(ncx).into_iter().map(|p| p.title).collect();
        assert_eq!(titles, vec!["Q & A \u{2014} Part 1", "<Intro>"]);
    }

    #[test]
    fn malformed_package_does_not_panic() {
        let package = parse_package("<package><manifest><item id=\"x\" href=\"a.html\"");
        assert!(package.spine.is_empty());
        assert!(parse_ncx("").is_empty());
        assert!(parse_nav("not xml at all").is_empty());
    }
}
