//! News article sourcing
//!
//! [`WebArticleSource`] picks a random article link from a configured homepage
//! and extracts paragraph text from an article page. Extraction is regex based:
//! paragraphs inside the first `<article>` element (or the whole page when there
//! is none), tags stripped, common entities decoded, truncated to `max_chars`.

use async_trait::async_trait;
use quizgen_core::{Article, ArticleSource, ServiceError};
use rand::seq::SliceRandom;
use regex::Regex;
use reqwest::Client;
use std::collections::BTreeSet;
use std::time::Duration;
use tracing::debug;

use crate::config::{ArticlesConfig, ServerConfigError};

pub struct WebArticleSource {
    client: Client,
    homepage_url: String,
    link_pattern: Regex,
    max_chars: usize,
    href: Regex,
    article: Regex,
    paragraph: Regex,
    heading: Regex,
    title: Regex,
    tag: Regex,
    whitespace: Regex,
}

fn compile(pattern: &str) -> Result<Regex, ServerConfigError> {
    Regex::new(pattern)
        .map_err(|e| ServerConfigError::InvalidConfig(format!("Invalid pattern {}: {}", pattern, e)))
}

fn upstream(err: reqwest::Error) -> ServiceError {
    ServiceError::Upstream(err.to_string())
}

impl WebArticleSource {
    pub fn new(config: &ArticlesConfig) -> Result<Self, ServerConfigError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(20))
            .user_agent("quizgen/0.1")
            .build()
            .map_err(|e| ServerConfigError::InvalidConfig(format!("HTTP client: {}", e)))?;

        Ok(Self {
            client,
            homepage_url: config.homepage_url.trim_end_matches('/').to_string(),
            link_pattern: compile(&config.link_pattern)?,
            max_chars: config.max_chars,
            href: compile(r#"(?i)<a\s[^>]*href\s*=\s*["']([^"'#]+)["']"#)?,
            article: compile(r"(?is)<article[^>]*>(.*?)</article>")?,
            paragraph: compile(r"(?is)<p(?:\s[^>]*)?>(.*?)</p>")?,
            heading: compile(r"(?is)<h1[^>]*>(.*?)</h1>")?,
            title: compile(r"(?is)<title[^>]*>(.*?)</title>")?,
            tag: compile(r"(?s)<[^>]+>")?,
            whitespace: compile(r"\s+")?,
        })
    }

    /// Distinct article URLs linked from `html`, made absolute
    pub fn article_links(&self, html: &str) -> Vec<String> {
        let links: BTreeSet<String> = self
            .href
            .captures_iter(html)
            .filter_map(|caps| caps.get(1).map(|m| m.as_str()))
            .filter_map(|href| {
                let path = href.strip_prefix(&self.homepage_url).unwrap_or(href);
                if self.link_pattern.is_match(path) {
                    Some(format!("{}{}", self.homepage_url, path))
                } else {
                    None
                }
            })
            .collect();
        links.into_iter().collect()
    }

    fn clean(&self, fragment: &str) -> String {
        let text = self.tag.replace_all(fragment, " ");
        let text = decode_entities(&text);
        self.whitespace.replace_all(&text, " ").trim().to_string()
    }

    /// Title and paragraph text of an article page
    pub fn article_text(&self, html: &str) -> (Option<String>, String) {
        let scope = self
            .article
            .captures(html)
            .and_then(|caps| caps.get(1))
            .map_or(html, |m| m.as_str());

        let title = self
            .heading
            .captures(scope)
            .or_else(|| self.title.captures(html))
            .and_then(|caps| caps.get(1))
            .map(|m| self.clean(m.as_str()))
            .filter(|title| !title.is_empty());

        let text = self
            .paragraph
            .captures_iter(scope)
            .filter_map(|caps| caps.get(1))
            .map(|m| self.clean(m.as_str()))
            .filter(|p| !p.is_empty())
            .collect::<Vec<_>>()
            .join(" ");

        (title, text.chars().take(self.max_chars).collect())
    }

    async fn fetch(&self, url: &str) -> Result<String, ServiceError> {
        let response = self.client.get(url).send().await.map_err(upstream)?;
        if !response.status().is_success() {
            return Err(ServiceError::Upstream(format!(
                "GET {} returned {}",
                url,
                response.status()
            )));
        }
        response.text().await.map_err(upstream)
    }
}

fn decode_entities(text: &str) -> String {
    text.replace("&nbsp;", " ")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&#x27;", "'")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&amp;", "&")
}

#[async_trait]
impl ArticleSource for WebArticleSource {
    async fn pick_article(&self) -> Result<String, ServiceError> {
        let html = self.fetch(&self.homepage_url).await?;
        let links = self.article_links(&html);
        debug!(homepage = %self.homepage_url, candidates = links.len(), "article links collected");

        links
            .choose(&mut rand::thread_rng())
            .cloned()
            .ok_or_else(|| ServiceError::NotFound("No articles found".to_string()))
    }

    async fn extract(&self, url: &str) -> Result<Article, ServiceError> {
        let html = self.fetch(url).await?;
        let (title, text) = self.article_text(&html);
        Ok(Article {
            title,
            url: Some(url.to_string()),
            text: Some(text).filter(|text| !text.is_empty()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source(max_chars: usize) -> WebArticleSource {
        WebArticleSource::new(&ArticlesConfig {
            homepage_url: "https://nos.nl/".to_string(),
            max_chars,
            ..ArticlesConfig::default()
        })
        .unwrap()
    }

    #[test]
    fn test_article_links_are_filtered_and_deduplicated() {
        let html = r#"
            <a href="/artikel/2500001-storm">Storm</a>
            <a class="x" href="/artikel/2500001-storm">Storm again</a>
            <a href="https://nos.nl/artikel/2500002-regen">Regen</a>
            <a href="/sport">Sport</a>
            <a href="/artikel/live">Live</a>
        "#;
        let links = source(8000).article_links(html);
        assert_eq!(
            links,
            vec![
                "https://nos.nl/artikel/2500001-storm".to_string(),
                "https://nos.nl/artikel/2500002-regen".to_string(),
            ]
        );
    }

    #[test]
    fn test_paragraphs_inside_article_only() {
        let html = r#"
            <html><head><title>NOS</title></head><body>
            <p>Cookie banner</p>
            <article><h1>Storm op <b>komst</b></h1>
              <p>Morgen waait het hard.</p>
              <p class="lead">Zet je fiets &amp; tent binnen.</p>
            </article></body></html>
        "#;
        let (title, text) = source(8000).article_text(html);
        assert_eq!(title.as_deref(), Some("Storm op komst"));
        assert_eq!(text, "Morgen waait het hard. Zet je fiets & tent binnen.");
    }

    #[test]
    fn test_falls_back_to_page_paragraphs_and_truncates() {
        let html = "<title>Nieuws</title><p>abcdefghij</p><p>klm</p>";
        let (title, text) = source(12).article_text(html);
        assert_eq!(title.as_deref(), Some("Nieuws"));
        assert_eq!(text, "abcdefghij k");
    }

    #[test]
    fn test_invalid_link_pattern_is_config_error() {
        let result = WebArticleSource::new(&ArticlesConfig {
            link_pattern: "(".to_string(),
            ..ArticlesConfig::default()
        });
        assert!(matches!(result, Err(ServerConfigError::InvalidConfig(_))));
    }
}
