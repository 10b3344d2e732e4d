use std::sync::LazyLock;

use scraper::{ElementRef, Html, Selector};

use super::{BookEntry, SiteError};
use crate::decode::lzstring::decompress_from_base64;

fn selector(css: &str) -> Selector {
    Selector::parse(css).expect("selector is valid")
}

static BOOK_TITLE: LazyLock<Selector> = LazyLock::new(|| selector(".book-title"));
static H1: LazyLock<Selector> = LazyLock::new(|| selector("h1"));
static H2: LazyLock<Selector> = LazyLock::new(|| selector("h2"));
static INTRO: LazyLock<Selector> = LazyLock::new(|| selector("#intro-all p"));
static COVER: LazyLock<Selector> = LazyLock::new(|| selector("p.hcover img"));
static DETAIL_SPANS: LazyLock<Selector> =
    LazyLock::new(|| selector("ul.detail-list li > span"));
static STRONG: LazyLock<Selector> = LazyLock::new(|| selector("strong"));
static SPAN: LazyLock<Selector> = LazyLock::new(|| selector("span"));
static CHAPTER: LazyLock<Selector> = LazyLock::new(|| selector(".chapter"));
static UL: LazyLock<Selector> = LazyLock::new(|| selector("ul"));
static ANCHOR: LazyLock<Selector> = LazyLock::new(|| selector("a"));
static PAGE_COUNT: LazyLock<Selector> = LazyLock::new(|| selector("i"));

/// One chapter or volume listed on a book page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Volume {
    pub url: String,
    /// File stem of the volume page, e.g. `1001` for `/comic/99/1001.html`
    pub id: String,
    pub title: String,
    /// Page count advertised on the book page; 0 when it is not shown
    pub page_count: usize,
    /// Heading of the list the volume belongs to, e.g. `单话` or `单行本`
    pub section: String,
}

/// Book metadata and its volume list
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Book {
    pub id: String,
    pub url: String,
    pub name: String,
    pub cover: Option<String>,
    pub aliases: Vec<String>,
    pub description: String,
    pub production_year: Option<String>,
    pub location: Option<String>,
    pub genres: Vec<String>,
    pub authors: Vec<String>,
    pub last_updated: Option<String>,
    pub is_complete: Option<bool>,
    /// Oldest first within each section
    pub volumes: Vec<Volume>,
}

impl Book {
    /// Parse a book page. Volume URLs are joined onto `base_url`.
    pub fn parse(entry: &BookEntry, html: &str, base_url: &str) -> Result<Self, SiteError> {
        let document = Html::parse_document(html);

        let title = document
            .select(&BOOK_TITLE)
            .next()
            .ok_or_else(|| SiteError::Parse("missing book title".to_string()))?;
        let name = title
            .select(&H1)
            .next()
            .map(text_of)
            .ok_or_else(|| SiteError::Parse("missing book name".to_string()))?;

        let mut book = Book {
            id: entry.id.clone(),
            url: entry.url.clone(),
            name,
            ..Default::default()
        };

        if let Some(subtitle) = title.select(&H2).next().map(text_of) {
            if !subtitle.is_empty() {
                book.aliases.push(subtitle);
            }
        }

        book.description = document
            .select(&INTRO)
            .map(text_of)
            .collect::<Vec<_>>()
            .join("\n");

        book.cover = document
            .select(&COVER)
            .next()
            .and_then(|img| img.value().attr("src"))
            .map(|src| {
                if src.starts_with("//") {
                    format!("https:{src}")
                } else {
                    src.to_string()
                }
            });

        for span in document.select(&DETAIL_SPANS) {
            let Some(label) = span.select(&STRONG).next().map(text_of) else {
                continue;
            };
            let links = || span.select(&ANCHOR).map(text_of).collect::<Vec<_>>();
            match label.as_str() {
                "出品年代：" => {
                    book.production_year = span
                        .select(&ANCHOR)
                        .next()
                        .map(|a| text_of(a).trim_end_matches('年').to_string());
                }
                "漫画地区：" => book.location = span.select(&ANCHOR).next().map(text_of),
                "漫画剧情：" => book.genres = links(),
                "漫画作者：" => book.authors = links(),
                "漫画别名：" => {
                    for alias in links() {
                        if !book.aliases.contains(&alias) {
                            book.aliases.push(alias);
                        }
                    }
                }
                "漫画状态：" => {
                    let mut states = span.select(&SPAN);
                    book.is_complete = states.next().map(|s| text_of(s) == "已完结");
                    book.last_updated = states.next().map(text_of);
                }
                _ => {}
            }
        }

        if let Some(chapter) = document.select(&CHAPTER).next() {
            book.volumes = parse_volumes(chapter, base_url)?;
        }

        Ok(book)
    }

    /// Render the `README.txt` saved next to the volumes
    pub fn readme(&self) -> String {
        let status = if self.is_complete == Some(true) {
            "已完结"
        } else {
            "未完结"
        };
        format!(
            "《{}》（{}）\n{}\n\n作者：\t\t{}\n分类：\t\t{}\n地区：\t\t{}\n出品年份：\t{}\n最后更新：\t{}\n简介：\n{}",
            self.name,
            status,
            self.url,
            self.authors.join("、"),
            self.genres.join("、"),
            self.location.as_deref().unwrap_or_default(),
            self.production_year.as_deref().unwrap_or_default(),
            self.last_updated.as_deref().unwrap_or_default(),
            self.description,
        )
    }
}

fn text_of(element: ElementRef) -> String {
    element.text().collect::<String>().trim().to_string()
}

/// Walk the children of the chapter container in document order
fn parse_volumes(chapter: ElementRef, base_url: &str) -> Result<Vec<Volume>, SiteError> {
    let mut volumes = Vec::new();
    let mut section = String::new();

    for child in chapter.children().filter_map(ElementRef::wrap) {
        let element = child.value();
        match element.name() {
            "h4" => section = text_of(child),
            "div" if element.classes().any(|class| class == "chapter-list") => {
                for ul in child.select(&UL) {
                    let anchors: Vec<_> = ul.select(&ANCHOR).collect();
                    // Lists are newest first
                    for anchor in anchors.into_iter().rev() {
                        volumes.push(parse_volume(anchor, &section, base_url)?);
                    }
                }
            }
            // Adult-gated books ship the whole list compressed
            "input" if element.id() == Some("__VIEWSTATE") => {
                let state = element.attr("value").unwrap_or_default();
                let fragment = decompress_from_base64(state)
                    .map_err(|e| SiteError::Parse(format!("invalid view state: {e}")))?;
                let html = Html::parse_fragment(&format!(r#"<div class="chapter">{fragment}</div>"#));
                let volumes = match html.select(&CHAPTER).next() {
                    Some(chapter) => parse_volumes(chapter, base_url)?,
                    None => Vec::new(),
                };
                return Ok(volumes);
            }
            _ => {}
        }
    }

    Ok(volumes)
}

fn parse_volume(anchor: ElementRef, section: &str, base_url: &str) -> Result<Volume, SiteError> {
    let href = anchor
        .value()
        .attr("href")
        .ok_or_else(|| SiteError::Parse("volume link without href".to_string()))?;
    let file = href.rsplit('/').next().unwrap_or(href);
    let id = file.strip_suffix(".html").unwrap_or(file).to_string();
    let title = match anchor.value().attr("title") {
        Some(title) => title.to_string(),
        None => text_of(anchor),
    };
    let page_count = anchor
        .select(&PAGE_COUNT)
        .next()
        .and_then(|i| text_of(i).trim_end_matches('p').parse().ok())
        .unwrap_or(0);

    Ok(Volume {
        url: format!("{base_url}{href}"),
        id,
        title,
        page_count,
        section: section.to_string(),
    })
}
