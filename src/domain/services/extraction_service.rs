// Copyright 2025 Kirky.X
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use crate::utils::url_utils;
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::node::Node;
use scraper::{ElementRef, Html, Selector};
use std::collections::HashSet;
use url::Url;

/// 整树丢弃的标签
const DROPPED_TAGS: [&str; 11] = [
    "script", "style", "noscript", "nav", "footer", "header", "aside", "form", "iframe", "svg",
    "button",
];

/// 广告/跟踪容器的class与id启发式
static AD_TRACKER_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(navbar|menu|sidebar|footer|header|cookie|banner|popup|modal|\bads?\b|advertisement|promo|tracking)")
        .unwrap()
});

static MULTI_BLANK_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{3,}").unwrap());
static WHITESPACE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

static ANCHOR_SELECTOR: Lazy<Selector> = Lazy::new(|| Selector::parse("a[href]").unwrap());
static BODY_SELECTOR: Lazy<Selector> = Lazy::new(|| Selector::parse("body").unwrap());
static TITLE_SELECTOR: Lazy<Selector> = Lazy::new(|| Selector::parse("title").unwrap());
static H1_SELECTOR: Lazy<Selector> = Lazy::new(|| Selector::parse("h1").unwrap());
static META_SELECTOR: Lazy<Selector> = Lazy::new(|| Selector::parse("meta").unwrap());
static LINK_SELECTOR: Lazy<Selector> = Lazy::new(|| Selector::parse("link").unwrap());
static HTML_SELECTOR: Lazy<Selector> = Lazy::new(|| Selector::parse("html").unwrap());
static CANDIDATE_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("article, main, section, div").unwrap());

/// 提取出的链接集合，按可注册域划分站内/站外
#[derive(Debug, Clone, Default)]
pub struct ExtractedLinks {
    /// 与最终URL同可注册域
    pub internal: Vec<String>,
    /// 其余
    pub external: Vec<String>,
}

/// 页面元数据
#[derive(Debug, Clone, Default)]
pub struct PageMetadata {
    /// Open Graph图片
    pub og_image: Option<String>,
    /// 站点图标
    pub favicon_url: Option<String>,
    /// 站点名称
    pub site_name: Option<String>,
    /// 文档语言
    pub language: Option<String>,
    /// 作者
    pub author: Option<String>,
    /// 发布时间
    pub published_at: Option<String>,
    /// 文档声明的规范URL
    pub canonical_url: Option<String>,
    /// 词数
    pub word_count: i32,
    /// 预估阅读时长（分钟）
    pub read_time_minutes: i32,
}

/// 提取结果
#[derive(Debug, Clone)]
pub struct Extracted {
    /// 标题
    pub title: Option<String>,
    /// 描述
    pub description: Option<String>,
    /// 规范化Markdown
    pub markdown: String,
    /// 元数据
    pub metadata: PageMetadata,
    /// 链接集合
    pub links: ExtractedLinks,
}

/// 提取服务
///
/// HTML到干净Markdown、元数据与链接图的纯转换；
/// 同一(html, url)输入保证字节级一致的输出
pub struct ExtractionService;

impl ExtractionService {
    /// 执行提取
    ///
    /// # 参数
    ///
    /// * `html` - 原始HTML
    /// * `final_url` - 重定向后的最终URL（链接绝对化基准）
    ///
    /// # 返回值
    ///
    /// 提取结果
    pub fn extract(html: &str, final_url: &Url) -> Extracted {
        let document = Html::parse_document(html);

        let links = Self::collect_links(&document, final_url);
        let content_root = Self::select_content_root(&document);
        let markdown = match content_root {
            Some(root) => Self::to_markdown(root, final_url),
            None => String::new(),
        };

        let title = Self::extract_title(&document);
        let description = Self::extract_description(&document);
        let mut metadata = Self::extract_metadata(&document, final_url);

        let word_count = Self::count_words(&markdown);
        metadata.word_count = word_count;
        metadata.read_time_minutes = (word_count + 199) / 200;

        Extracted {
            title,
            description,
            markdown,
            metadata,
            links,
        }
    }

    /// 判断元素是否属于被丢弃的子树
    fn is_dropped(element: ElementRef) -> bool {
        let name = element.value().name();
        if DROPPED_TAGS.contains(&name) {
            return true;
        }
        let class_id = format!(
            "{} {}",
            element.value().attr("class").unwrap_or(""),
            element.value().attr("id").unwrap_or("")
        );
        !class_id.trim().is_empty() && AD_TRACKER_RE.is_match(&class_id)
    }

    /// 元素是否位于任何被丢弃的祖先之下
    fn under_dropped(element: ElementRef) -> bool {
        let mut current = Some(element);
        while let Some(el) = current {
            if Self::is_dropped(el) {
                return true;
            }
            current = el.parent().and_then(ElementRef::wrap);
        }
        false
    }

    /// 收集子树可见文本（跳过被丢弃的子树）
    fn visible_text(element: ElementRef, out: &mut String) {
        if Self::is_dropped(element) {
            return;
        }
        for child in element.children() {
            match child.value() {
                Node::Text(text) => out.push_str(text),
                Node::Element(_) => {
                    if let Some(el) = ElementRef::wrap(child) {
                        Self::visible_text(el, out);
                    }
                }
                _ => {}
            }
        }
    }

    /// 以readability风格挑选正文子树
    ///
    /// 候选块按文本密度、链接密度倒数与标点频率打分，取最高者；
    /// 无候选时退回body
    fn select_content_root(document: &Html) -> Option<ElementRef<'_>> {
        let mut best: Option<(f64, ElementRef)> = None;

        for candidate in document.select(&CANDIDATE_SELECTOR) {
            if Self::under_dropped(candidate) {
                continue;
            }
            let score = Self::score_candidate(candidate);
            if score <= 0.0 {
                continue;
            }
            match best {
                // 严格大于：同分保留文档序靠前者
                Some((best_score, _)) if score <= best_score => {}
                _ => best = Some((score, candidate)),
            }
        }

        best.map(|(_, el)| el)
            .or_else(|| document.select(&BODY_SELECTOR).next())
    }

    fn score_candidate(element: ElementRef) -> f64 {
        let mut text = String::new();
        Self::visible_text(element, &mut text);
        let text = WHITESPACE_RE.replace_all(&text, " ");
        let text_len = text.chars().count();
        if text_len < 25 {
            return 0.0;
        }

        let mut link_text = String::new();
        for anchor in element.select(&ANCHOR_SELECTOR) {
            if !Self::under_dropped(anchor) {
                Self::visible_text(anchor, &mut link_text);
            }
        }
        let link_len = link_text.chars().count().min(text_len);
        let link_ratio = link_len as f64 / text_len as f64;

        let punctuation = text
            .chars()
            .filter(|c| matches!(c, '.' | ',' | ';' | ':' | '!' | '?'))
            .count();

        let tag_bonus = match element.value().name() {
            "article" | "main" => 1.5,
            "section" => 1.1,
            _ => 1.0,
        };

        (text_len as f64 * (1.0 - link_ratio) + punctuation as f64 * 3.0) * tag_bonus
    }

    /// 将选中的子树转换为GFM Markdown
    fn to_markdown(root: ElementRef, base_url: &Url) -> String {
        let mut builder = MarkdownBuilder::new(base_url.clone());
        builder.render_children(root);
        builder.finish()
    }

    /// 收集整个文档（剔除丢弃子树后）的锚点并按可注册域划分
    fn collect_links(document: &Html, final_url: &Url) -> ExtractedLinks {
        let base_domain = final_url
            .host_str()
            .and_then(|h| psl::domain_str(h))
            .map(str::to_string);

        let mut internal = Vec::new();
        let mut external = Vec::new();
        let mut seen: HashSet<String> = HashSet::new();

        for anchor in document.select(&ANCHOR_SELECTOR) {
            if Self::under_dropped(anchor) {
                continue;
            }
            let href = anchor.value().attr("href").unwrap_or("").trim();
            if !is_followable_href(href) {
                continue;
            }
            let normalized = match url_utils::normalize_url(href, Some(final_url)) {
                Ok(url) => url,
                Err(_) => continue,
            };
            let as_string = normalized.to_string();
            if !seen.insert(as_string.clone()) {
                continue;
            }

            let link_domain = normalized
                .host_str()
                .and_then(|h| psl::domain_str(h))
                .map(str::to_string);
            match (&base_domain, &link_domain) {
                (Some(a), Some(b)) if a == b => internal.push(as_string),
                _ => external.push(as_string),
            }
        }

        ExtractedLinks { internal, external }
    }

    fn extract_title(document: &Html) -> Option<String> {
        if let Some(title) = Self::meta_content(document, "og:title", None) {
            return Some(title);
        }
        if let Some(el) = document.select(&TITLE_SELECTOR).next() {
            let text = normalize_inline_whitespace(&el.text().collect::<String>());
            if !text.is_empty() {
                return Some(text);
            }
        }
        document.select(&H1_SELECTOR).next().and_then(|h1| {
            let text = normalize_inline_whitespace(&h1.text().collect::<String>());
            (!text.is_empty()).then_some(text)
        })
    }

    fn extract_description(document: &Html) -> Option<String> {
        Self::meta_content(document, "og:description", Some("description"))
    }

    fn extract_metadata(document: &Html, final_url: &Url) -> PageMetadata {
        let canonical_url = document
            .select(&LINK_SELECTOR)
            .find(|l| l.value().attr("rel") == Some("canonical"))
            .and_then(|l| l.value().attr("href"))
            .map(|h| h.trim().to_string());

        let favicon_url = document
            .select(&LINK_SELECTOR)
            .find(|l| matches!(l.value().attr("rel"), Some("icon") | Some("shortcut icon")))
            .and_then(|l| l.value().attr("href"))
            .and_then(|h| final_url.join(h.trim()).ok())
            .map(|u| u.to_string())
            .or_else(|| final_url.join("/favicon.ico").ok().map(|u| u.to_string()));

        let language = document
            .select(&HTML_SELECTOR)
            .next()
            .and_then(|html| html.value().attr("lang"))
            .map(|l| l.trim().to_string())
            .filter(|l| !l.is_empty());

        PageMetadata {
            og_image: Self::meta_content(document, "og:image", None),
            favicon_url,
            site_name: Self::meta_content(document, "og:site_name", None),
            language,
            author: Self::meta_content(document, "", Some("author")),
            published_at: Self::meta_content(document, "article:published_time", None)
                .or_else(|| Self::meta_content(document, "og:published_time", None)),
            canonical_url,
            word_count: 0,
            read_time_minutes: 0,
        }
    }

    /// 按property或name读取meta content
    fn meta_content(document: &Html, property: &str, name: Option<&str>) -> Option<String> {
        for meta in document.select(&META_SELECTOR) {
            let matches_property =
                !property.is_empty() && meta.value().attr("property") == Some(property);
            let matches_name = name.is_some() && meta.value().attr("name") == name;
            if matches_property || matches_name {
                if let Some(content) = meta.value().attr("content") {
                    let trimmed = normalize_inline_whitespace(content);
                    if !trimmed.is_empty() {
                        return Some(trimmed);
                    }
                }
            }
        }
        None
    }

    /// Markdown标点剥离后的空白分词计数
    pub fn count_words(markdown: &str) -> i32 {
        markdown
            .split_whitespace()
            .filter(|token| token.chars().any(|c| c.is_alphanumeric()))
            .count() as i32
    }
}

fn is_followable_href(href: &str) -> bool {
    if href.is_empty() || href.starts_with('#') {
        return false;
    }
    let lower = href.to_ascii_lowercase();
    !(lower.starts_with("mailto:")
        || lower.starts_with("tel:")
        || lower.starts_with("javascript:")
        || lower.starts_with("data:"))
}

fn normalize_inline_whitespace(text: &str) -> String {
    WHITESPACE_RE.replace_all(text.trim(), " ").to_string()
}

/// GFM Markdown构建器
struct MarkdownBuilder {
    out: String,
    base_url: Url,
}

impl MarkdownBuilder {
    fn new(base_url: Url) -> Self {
        Self {
            out: String::new(),
            base_url,
        }
    }

    fn finish(self) -> String {
        let collapsed = MULTI_BLANK_RE.replace_all(&self.out, "\n\n");
        collapsed.trim().to_string()
    }

    fn render_children(&mut self, element: ElementRef) {
        for child in element.children() {
            match child.value() {
                Node::Text(text) => {
                    let normalized = normalize_inline_whitespace(text);
                    if !normalized.is_empty() {
                        self.push_inline(&normalized);
                    }
                }
                Node::Element(_) => {
                    if let Some(el) = ElementRef::wrap(child) {
                        self.render_element(el);
                    }
                }
                _ => {}
            }
        }
    }

    fn render_element(&mut self, element: ElementRef) {
        if ExtractionService::is_dropped(element) {
            return;
        }
        match element.value().name() {
            "h1" | "h2" | "h3" | "h4" | "h5" | "h6" => {
                let level = element.value().name().as_bytes()[1] - b'0';
                let text = self.inline_text(element);
                if !text.is_empty() {
                    self.push_block(&format!("{} {}", "#".repeat(level as usize), text));
                }
            }
            "p" => {
                let text = self.inline_text(element);
                if !text.is_empty() {
                    self.push_block(&text);
                }
            }
            "ul" => self.render_list(element, None, 0),
            "ol" => self.render_list(element, Some(1), 0),
            "table" => self.render_table(element),
            "pre" => {
                let code = element.text().collect::<String>();
                let code = code.trim_matches('\n');
                if !code.is_empty() {
                    self.push_block(&format!("```\n{}\n```", code));
                }
            }
            "blockquote" => {
                let inner = {
                    let mut nested = MarkdownBuilder::new(self.base_url.clone());
                    nested.render_children(element);
                    nested.finish()
                };
                if !inner.is_empty() {
                    let quoted = inner
                        .lines()
                        .map(|l| format!("> {}", l))
                        .collect::<Vec<_>>()
                        .join("\n");
                    self.push_block(&quoted);
                }
            }
            "hr" => self.push_block("---"),
            "br" => self.out.push('\n'),
            "a" => {
                let rendered = self.render_anchor(element);
                if !rendered.is_empty() {
                    self.push_inline(&rendered);
                }
            }
            "strong" | "b" => {
                let text = self.inline_text(element);
                if !text.is_empty() {
                    self.push_inline(&format!("**{}**", text));
                }
            }
            "em" | "i" => {
                let text = self.inline_text(element);
                if !text.is_empty() {
                    self.push_inline(&format!("*{}*", text));
                }
            }
            "code" => {
                let text = normalize_inline_whitespace(&element.text().collect::<String>());
                if !text.is_empty() {
                    self.push_inline(&format!("`{}`", text));
                }
            }
            _ => self.render_children(element),
        }
    }

    fn render_list(&mut self, element: ElementRef, ordered_from: Option<usize>, depth: usize) {
        let mut index = ordered_from.unwrap_or(0);
        let mut lines = Vec::new();
        for child in element.children() {
            let Some(li) = ElementRef::wrap(child) else {
                continue;
            };
            if li.value().name() != "li" || ExtractionService::is_dropped(li) {
                continue;
            }
            let text = self.inline_text(li);
            let marker = if ordered_from.is_some() {
                let m = format!("{}.", index);
                index += 1;
                m
            } else {
                "-".to_string()
            };
            if !text.is_empty() {
                lines.push(format!("{}{} {}", "  ".repeat(depth), marker, text));
            }
            // 嵌套列表
            for nested in li.children() {
                if let Some(inner) = ElementRef::wrap(nested) {
                    match inner.value().name() {
                        "ul" => self.collect_nested_list(&mut lines, inner, None, depth + 1),
                        "ol" => self.collect_nested_list(&mut lines, inner, Some(1), depth + 1),
                        _ => {}
                    }
                }
            }
        }
        if !lines.is_empty() {
            self.push_block(&lines.join("\n"));
        }
    }

    fn collect_nested_list(
        &mut self,
        lines: &mut Vec<String>,
        element: ElementRef,
        ordered_from: Option<usize>,
        depth: usize,
    ) {
        let mut index = ordered_from.unwrap_or(0);
        for child in element.children() {
            let Some(li) = ElementRef::wrap(child) else {
                continue;
            };
            if li.value().name() != "li" || ExtractionService::is_dropped(li) {
                continue;
            }
            let text = self.inline_text(li);
            let marker = if ordered_from.is_some() {
                let m = format!("{}.", index);
                index += 1;
                m
            } else {
                "-".to_string()
            };
            if !text.is_empty() {
                lines.push(format!("{}{} {}", "  ".repeat(depth), marker, text));
            }
        }
    }

    fn render_table(&mut self, element: ElementRef) {
        let row_selector = Selector::parse("tr").unwrap();
        let cell_selector = Selector::parse("th, td").unwrap();

        let mut rows: Vec<Vec<String>> = Vec::new();
        for row in element.select(&row_selector) {
            let cells: Vec<String> = row
                .select(&cell_selector)
                .map(|cell| self.inline_text(cell).replace('|', "\\|"))
                .collect();
            if !cells.is_empty() {
                rows.push(cells);
            }
        }
        if rows.is_empty() {
            return;
        }

        let width = rows.iter().map(Vec::len).max().unwrap_or(0);
        let mut lines = Vec::new();
        for (i, row) in rows.iter().enumerate() {
            let mut padded = row.clone();
            padded.resize(width, String::new());
            lines.push(format!("| {} |", padded.join(" | ")));
            if i == 0 {
                lines.push(format!("|{}|", " --- |".repeat(width)));
            }
        }
        self.push_block(&lines.join("\n"));
    }

    fn render_anchor(&self, element: ElementRef) -> String {
        let text = self.inline_text_of_children(element);
        let href = element.value().attr("href").unwrap_or("").trim();
        if text.is_empty() {
            return String::new();
        }
        if !is_followable_href(href) {
            return text;
        }
        match self.base_url.join(href) {
            Ok(mut absolute) => {
                absolute.set_fragment(None);
                url_utils::strip_tracking_params(&mut absolute);
                format!("[{}]({})", text, absolute)
            }
            Err(_) => text,
        }
    }

    /// 子树的行内渲染（链接、强调与行内代码保留标记）
    fn inline_text(&self, element: ElementRef) -> String {
        self.inline_text_of_children(element)
    }

    fn inline_text_of_children(&self, element: ElementRef) -> String {
        let mut parts: Vec<String> = Vec::new();
        for child in element.children() {
            match child.value() {
                Node::Text(text) => {
                    let normalized = normalize_inline_whitespace(text);
                    if !normalized.is_empty() {
                        parts.push(normalized);
                    }
                }
                Node::Element(_) => {
                    if let Some(el) = ElementRef::wrap(child) {
                        if ExtractionService::is_dropped(el) {
                            continue;
                        }
                        let rendered = match el.value().name() {
                            "a" => self.render_anchor(el),
                            "strong" | "b" => {
                                let inner = self.inline_text_of_children(el);
                                if inner.is_empty() {
                                    inner
                                } else {
                                    format!("**{}**", inner)
                                }
                            }
                            "em" | "i" => {
                                let inner = self.inline_text_of_children(el);
                                if inner.is_empty() {
                                    inner
                                } else {
                                    format!("*{}*", inner)
                                }
                            }
                            "code" => {
                                let inner =
                                    normalize_inline_whitespace(&el.text().collect::<String>());
                                if inner.is_empty() {
                                    inner
                                } else {
                                    format!("`{}`", inner)
                                }
                            }
                            "br" => "\n".to_string(),
                            // 嵌套列表由块级渲染负责，行内收集跳过
                            "ul" | "ol" => String::new(),
                            _ => self.inline_text_of_children(el),
                        };
                        if !rendered.is_empty() {
                            parts.push(rendered);
                        }
                    }
                }
                _ => {}
            }
        }
        parts.join(" ").trim().to_string()
    }

    fn push_block(&mut self, block: &str) {
        if !self.out.is_empty() {
            self.out.push_str("\n\n");
        }
        self.out.push_str(block);
    }

    fn push_inline(&mut self, text: &str) {
        if self
            .out
            .chars()
            .last()
            .map(|c| !c.is_whitespace())
            .unwrap_or(false)
        {
            self.out.push(' ');
        }
        self.out.push_str(text);
    }
}

#[cfg(test)]
#[path = "extraction_service_test.rs"]
mod tests;
