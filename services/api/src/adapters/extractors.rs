//! services/api/src/adapters/extractors.rs
//!
//! Turns uploaded PDF, PPTX and TXT files (and web pages) into plain text.
//! Archive and PDF parsing are synchronous and run on the blocking pool.

use async_trait::async_trait;
use std::io::Read;
use std::time::Duration;
use studypod_core::domain::FileType;
use studypod_core::ports::{PortError, PortResult, TextExtractor};
use tracing::{debug, warn};

const SLIDE_PREFIX: &str = "ppt/slides/slide";
const FETCH_TIMEOUT: Duration = Duration::from_secs(30);
const PAGE_SELECTOR: &str = "h1, h2, h3, h4, h5, h6, p, li";

#[derive(Clone)]
pub struct DocumentExtractor {
    http: reqwest::Client,
}

impl DocumentExtractor {
    pub fn new() -> PortResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(FETCH_TIMEOUT)
            .user_agent(concat!("studypod/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| PortError::Unexpected(format!("could not build HTTP client: {}", e)))?;
        Ok(Self { http })
    }
}

fn extract_pdf(data: &[u8]) -> PortResult<String> {
    pdf_extract::extract_text_from_mem(data)
        .map_err(|e| PortError::Extraction(format!("could not read PDF: {}", e)))
}

fn slide_number(name: &str) -> Option<u32> {
    name.strip_prefix(SLIDE_PREFIX)?
        .strip_suffix(".xml")?
        .parse()
        .ok()
}

/// Concatenates the text runs of every slide, in slide order.
fn extract_pptx(data: &[u8]) -> PortResult<String> {
    let mut archive = zip::ZipArchive::new(std::io::Cursor::new(data))
        .map_err(|e| PortError::Extraction(format!("not a valid PPTX archive: {}", e)))?;

    let mut slides: Vec<(u32, String)> = archive
        .file_names()
        .filter_map(|name| slide_number(name).map(|n| (n, name.to_string())))
        .collect();
    slides.sort_by_key(|(n, _)| *n);

    let mut sections = Vec::with_capacity(slides.len());
    for (number, name) in slides {
        let mut xml = String::new();
        archive
            .by_name(&name)
            .map_err(|e| PortError::Extraction(e.to_string()))?
            .read_to_string(&mut xml)
            .map_err(|e| PortError::Extraction(format!("slide {}: {}", number, e)))?;

        let text = slide_text(&xml);
        if !text.is_empty() {
            sections.push(text);
        }
    }
    Ok(sections.join("\n\n"))
}

/// Collects `<a:t>` runs, one line per `<a:p>` paragraph.
fn slide_text(xml: &str) -> String {
    use quick_xml::events::Event;
    use quick_xml::Reader;

    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(false);

    let mut lines = Vec::new();
    let mut line = String::new();
    let mut in_run = false;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) if e.local_name().as_ref() == b"t" => in_run = true,
            Ok(Event::Text(e)) if in_run => {
                if let Ok(text) = e.unescape() {
                    line.push_str(&text);
                }
            }
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"t" => in_run = false,
                b"p" => {
                    let trimmed = line.trim();
                    if !trimmed.is_empty() {
                        lines.push(trimmed.to_string());
                    }
                    line.clear();
                }
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => {
                warn!(error = %e, "Malformed slide XML, keeping text read so far");
                break;
            }
            _ => {}
        }
    }
    if !line.trim().is_empty() {
        lines.push(line.trim().to_string());
    }
    lines.join("\n")
}

/// Pulls headings, paragraphs and list items out of an HTML page.
fn html_text(html: &str) -> PortResult<String> {
    let document = scraper::Html::parse_document(html);
    let selector = scraper::Selector::parse(PAGE_SELECTOR)
        .map_err(|e| PortError::Unexpected(format!("bad selector: {}", e)))?;

    let blocks: Vec<String> = document
        .select(&selector)
        .map(|element| element.text().collect::<Vec<_>>().join(" "))
        .map(|text| text.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|text| !text.is_empty())
        .collect();
    Ok(blocks.join("\n\n"))
}

async fn blocking<F>(work: F) -> PortResult<String>
where
    F: FnOnce() -> PortResult<String> + Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| PortError::Extraction(format!("extraction task failed: {}", e)))?
}

#[async_trait]
impl TextExtractor for DocumentExtractor {
    async fn extract(&self, file_type: FileType, data: &[u8]) -> PortResult<String> {
        let text = match file_type {
            FileType::Txt => String::from_utf8_lossy(data).into_owned(),
            FileType::Pdf => {
                let data = data.to_vec();
                blocking(move || extract_pdf(&data)).await?
            }
            FileType::Pptx => {
                let data = data.to_vec();
                blocking(move || extract_pptx(&data)).await?
            }
        };
        debug!(file_type = ?file_type, bytes = data.len(), chars = text.len(), "Text extracted");
        Ok(text)
    }

    async fn extract_url(&self, url: &str) -> PortResult<String> {
        let response = self
            .http
            .get(url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| PortError::Extraction(format!("could not fetch {}: {}", url, e)))?;
        let html = response
            .text()
            .await
            .map_err(|e| PortError::Extraction(format!("could not read {}: {}", url, e)))?;

        let text = html_text(&html)?;
        debug!(url, chars = text.len(), "Web page extracted");
        Ok(text)
    }
}
