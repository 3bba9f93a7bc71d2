use regex::Regex;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{Map, Value, json};

use apollo_config::SearchProviderConfig;
use apollo_domain::{Candidate, SearchSource, truncate_summary};

use crate::{Error, Result, SearchPage, SearchRequest};

const ARTICLE_URL_BASE: &str = "https://pubmed.ncbi.nlm.nih.gov";
const ARTICLE_BLOCK_PATTERN: &str = r"(?s)<PubmedArticle\b[^>]*>.*?</PubmedArticle>";
const INLINE_MARKUP_PATTERN: &str = r"</?(?:i|b|u|sup|sub|em|strong|mml:[A-Za-z]+)\b[^>]*>";

#[derive(Debug, Deserialize)]
struct SearchEnvelope {
	esearchresult: Option<SearchResult>,
}

#[derive(Debug, Deserialize)]
struct SearchResult {
	#[serde(default)]
	count: Option<String>,
	#[serde(default)]
	idlist: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct PubmedArticle {
	#[serde(rename = "MedlineCitation")]
	medline_citation: MedlineCitation,
}

#[derive(Debug, Deserialize)]
struct MedlineCitation {
	#[serde(rename = "PMID")]
	pmid: Text,
	#[serde(rename = "Article")]
	article: Article,
}

#[derive(Debug, Default, Deserialize)]
struct Text {
	#[serde(rename = "$text", default)]
	value: String,
}

#[derive(Debug, Deserialize)]
struct Article {
	#[serde(rename = "Journal", default)]
	journal: Option<Journal>,
	#[serde(rename = "ArticleTitle", default)]
	title: Option<Text>,
	#[serde(rename = "Abstract", default)]
	abstract_data: Option<AbstractData>,
	#[serde(rename = "AuthorList", default)]
	author_list: Option<AuthorList>,
}

#[derive(Debug, Deserialize)]
struct Journal {
	#[serde(rename = "Title", default)]
	title: Option<String>,
	#[serde(rename = "JournalIssue", default)]
	issue: Option<JournalIssue>,
}

#[derive(Debug, Deserialize)]
struct JournalIssue {
	#[serde(rename = "PubDate", default)]
	pub_date: Option<PubDate>,
}

#[derive(Debug, Deserialize)]
struct PubDate {
	#[serde(rename = "Year", default)]
	year: Option<String>,
	#[serde(rename = "MedlineDate", default)]
	medline_date: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AbstractData {
	#[serde(rename = "AbstractText", default)]
	sections: Vec<Text>,
}

#[derive(Debug, Deserialize)]
struct AuthorList {
	#[serde(rename = "Author", default)]
	authors: Vec<Author>,
}

#[derive(Debug, Deserialize)]
struct Author {
	#[serde(rename = "LastName", default)]
	last_name: Option<String>,
	#[serde(rename = "ForeName", default)]
	fore_name: Option<String>,
	#[serde(rename = "CollectiveName", default)]
	collective_name: Option<String>,
}

/// NCBI E-utilities client: `esearch` resolves PMIDs, `efetch` returns the article XML.
pub struct PubMedClient {
	client: Client,
	cfg: SearchProviderConfig,
	article_block: Regex,
	inline_markup: Regex,
}
impl PubMedClient {
	pub fn new(cfg: &SearchProviderConfig) -> Result<Self> {
		Ok(Self {
			client: crate::http_client(cfg)?,
			cfg: cfg.clone(),
			article_block: Regex::new(ARTICLE_BLOCK_PATTERN)?,
			inline_markup: Regex::new(INLINE_MARKUP_PATTERN)?,
		})
	}

	pub async fn search(&self, req: &SearchRequest<'_>) -> Result<SearchPage> {
		let (pmids, total_hits) = self.search_ids(req).await?;

		if pmids.is_empty() {
			return Ok(SearchPage { candidates: Vec::new(), total_hits });
		}

		let xml = self.fetch_articles(&pmids).await?;
		let candidates = self.parse_articles(&xml, req.summary_max_chars);

		tracing::debug!(
			requested = pmids.len(),
			parsed = candidates.len(),
			"Parsed PubMed articles."
		);

		Ok(SearchPage { candidates, total_hits })
	}

	async fn search_ids(&self, req: &SearchRequest<'_>) -> Result<(Vec<String>, u64)> {
		let url = format!("{}/esearch.fcgi", self.cfg.api_base);
		let mut params = vec![
			("db".to_string(), "pubmed".to_string()),
			("term".to_string(), req.query.to_string()),
			("retmode".to_string(), "json".to_string()),
			("retmax".to_string(), req.max_results.to_string()),
			("sort".to_string(), "relevance".to_string()),
		];

		self.push_api_key(&mut params);
		crate::push_filters(&mut params, req.filters);

		let res = crate::get_with_retry(&self.client, &self.cfg, &url, &params).await?;
		let body: Value = res.json().await?;

		parse_search_response(body, req.max_results as usize)
	}

	async fn fetch_articles(&self, pmids: &[String]) -> Result<String> {
		let url = format!("{}/efetch.fcgi", self.cfg.api_base);
		let mut params = vec![
			("db".to_string(), "pubmed".to_string()),
			("id".to_string(), pmids.join(",")),
			("rettype".to_string(), "abstract".to_string()),
			("retmode".to_string(), "xml".to_string()),
		];

		self.push_api_key(&mut params);

		let res = crate::get_with_retry(&self.client, &self.cfg, &url, &params).await?;

		Ok(res.text().await?)
	}

	fn push_api_key(&self, params: &mut Vec<(String, String)>) {
		if let Some(key) = self.cfg.api_key.as_deref() {
			params.push(("api_key".to_string(), key.to_string()));
		}
	}

	/// Decodes each `<PubmedArticle>` on its own. A malformed article is skipped.
	fn parse_articles(&self, xml: &str, summary_max_chars: usize) -> Vec<Candidate> {
		let mut candidates = Vec::new();

		for block in self.article_block.find_iter(xml) {
			let cleaned = self.inline_markup.replace_all(block.as_str(), "");

			match parse_article(&cleaned, summary_max_chars) {
				Ok(candidate) => candidates.push(candidate),
				Err(err) => {
					tracing::warn!(error = %err, "Skipping unparseable PubMed article.");
				},
			}
		}

		candidates
	}
}

fn parse_search_response(body: Value, max_results: usize) -> Result<(Vec<String>, u64)> {
	let envelope: SearchEnvelope = serde_json::from_value(body)?;
	let result = envelope.esearchresult.ok_or_else(|| Error::InvalidResponse {
		message: "PubMed search response is missing esearchresult.".to_string(),
	})?;
	let total_hits = result.count.as_deref().and_then(|raw| raw.trim().parse().ok()).unwrap_or(0);
	let pmids = result
		.idlist
		.into_iter()
		.map(|id| id.trim().to_string())
		.filter(|id| !id.is_empty())
		.take(max_results)
		.collect();

	Ok((pmids, total_hits))
}

fn parse_article(xml: &str, summary_max_chars: usize) -> Result<Candidate> {
	let article: PubmedArticle = quick_xml::de::from_str(xml)?;
	let citation = article.medline_citation;
	let pmid = citation.pmid.value.trim().to_string();

	if pmid.is_empty() {
		return Err(Error::InvalidResponse { message: "PubMed article has no PMID.".to_string() });
	}

	let body = citation.article;
	let title = body
		.title
		.map(|title| collapse_whitespace(&title.value))
		.filter(|title| !title.is_empty())
		.unwrap_or_else(|| "No title available".to_string());
	let summary = body
		.abstract_data
		.map(|data| {
			data.sections
				.iter()
				.map(|section| collapse_whitespace(&section.value))
				.filter(|text| !text.is_empty())
				.collect::<Vec<_>>()
				.join(" ")
		})
		.filter(|text| !text.is_empty())
		.unwrap_or_else(|| "No abstract available".to_string());
	let mut metadata = Map::new();

	metadata.insert("pmid".to_string(), json!(pmid));

	if let Some(journal) = body.journal.as_ref() {
		if let Some(name) = journal.title.as_deref().map(collapse_whitespace) {
			metadata.insert("journal".to_string(), json!(name));
		}
		if let Some(year) = journal
			.issue
			.as_ref()
			.and_then(|issue| issue.pub_date.as_ref())
			.and_then(publication_year)
		{
			metadata.insert("year".to_string(), json!(year));
		}
	}

	let authors = body
		.author_list
		.map(|list| list.authors.iter().filter_map(author_name).collect::<Vec<_>>())
		.unwrap_or_default();

	metadata.insert("authors".to_string(), json!(authors));

	Ok(Candidate {
		url: format!("{ARTICLE_URL_BASE}/{pmid}/"),
		id: pmid,
		source: SearchSource::PubMed,
		title,
		summary: truncate_summary(&summary, summary_max_chars),
		metadata,
		relevance_score: None,
		priority_weight: 0,
	})
}

fn publication_year(date: &PubDate) -> Option<u16> {
	let raw = date.year.as_deref().or(date.medline_date.as_deref())?;
	let digits = raw.trim().get(..4)?;

	digits.parse().ok()
}

fn author_name(author: &Author) -> Option<String> {
	if let Some(collective) = author.collective_name.as_deref() {
		return Some(collapse_whitespace(collective));
	}

	let last = author.last_name.as_deref()?.trim();

	match author.fore_name.as_deref().map(str::trim).filter(|name| !name.is_empty()) {
		Some(fore) => Some(format!("{fore} {last}")),
		None => Some(last.to_string()),
	}
}

fn collapse_whitespace(text: &str) -> String {
	text.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
	use super::*;

	const EFETCH_XML: &str = r#"<?xml version="1.0" ?>
<!DOCTYPE PubmedArticleSet PUBLIC "-//NLM//DTD PubMedArticle, 1st January 2024//EN" "https://dtd.nlm.nih.gov/ncbi/pubmed/out/pubmed_240101.dtd">
<PubmedArticleSet>
<PubmedArticle>
  <MedlineCitation Status="MEDLINE" Owner="NLM">
    <PMID Version="1">12345</PMID>
    <Article PubModel="Print">
      <Journal>
        <Title>Journal of Vascular Surgery</Title>
        <JournalIssue CitedMedium="Internet">
          <PubDate><Year>2021</Year><Month>Mar</Month></PubDate>
        </JournalIssue>
      </Journal>
      <ArticleTitle>Acute <i>aortic</i> dissection: a review.</ArticleTitle>
      <Abstract>
        <AbstractText Label="BACKGROUND">Aortic dissection presents with back pain.</AbstractText>
        <AbstractText Label="RESULTS">CT scan confirmed the diagnosis.</AbstractText>
      </Abstract>
      <AuthorList CompleteYN="Y">
        <Author ValidYN="Y"><LastName>Doe</LastName><ForeName>Jane</ForeName></Author>
        <Author ValidYN="Y"><CollectiveName>Aortic Study Group</CollectiveName></Author>
      </AuthorList>
    </Article>
  </MedlineCitation>
</PubmedArticle>
<PubmedArticle>
  <MedlineCitation Status="MEDLINE" Owner="NLM">
    <Article PubModel="Print"><ArticleTitle>Missing PMID</ArticleTitle></Article>
  </MedlineCitation>
</PubmedArticle>
<PubmedArticle>
  <MedlineCitation Status="MEDLINE" Owner="NLM">
    <PMID Version="1">67890</PMID>
    <Article PubModel="Print">
      <Journal>
        <Title>Chest</Title>
        <JournalIssue><PubDate><MedlineDate>1998 Nov-Dec</MedlineDate></PubDate></JournalIssue>
      </Journal>
      <ArticleTitle>Pulmonary embolism outcomes.</ArticleTitle>
    </Article>
  </MedlineCitation>
</PubmedArticle>
</PubmedArticleSet>"#;

	fn client() -> PubMedClient {
		let cfg = SearchProviderConfig {
			api_base: "http://127.0.0.1:9".to_string(),
			api_key: None,
			timeout_ms: 1_000,
			max_retries: 0,
			retry_delay_ms: 1,
		};

		PubMedClient::new(&cfg).expect("client")
	}

	#[test]
	fn parses_search_ids_and_count() {
		let body = json!({
			"header": { "type": "esearch" },
			"esearchresult": { "count": "2048", "retmax": "3", "idlist": ["1", " 2 ", "", "3"] }
		});
		let (ids, total) = parse_search_response(body, 2).expect("parse failed");

		assert_eq!(ids, vec!["1".to_string(), "2".to_string()]);
		assert_eq!(total, 2048);
	}

	#[test]
	fn search_response_without_result_is_invalid() {
		let err = parse_search_response(json!({ "error": "bad" }), 10).expect_err("expected error");

		assert!(matches!(err, Error::InvalidResponse { .. }));
	}

	#[test]
	fn parses_articles_and_skips_broken_ones() {
		let candidates = client().parse_articles(EFETCH_XML, 500);

		assert_eq!(candidates.len(), 2);

		let first = &candidates[0];

		assert_eq!(first.id, "12345");
		assert_eq!(first.title, "Acute aortic dissection: a review.");
		assert_eq!(
			first.summary,
			"Aortic dissection presents with back pain. CT scan confirmed the diagnosis."
		);
		assert_eq!(first.url, "https://pubmed.ncbi.nlm.nih.gov/12345/");
		assert_eq!(first.metadata["journal"], "Journal of Vascular Surgery");
		assert_eq!(first.metadata["year"], 2021);
		assert_eq!(first.metadata["authors"], json!(["Jane Doe", "Aortic Study Group"]));
		assert_eq!(first.source, SearchSource::PubMed);
		assert!(first.relevance_score.is_none());

		let second = &candidates[1];

		assert_eq!(second.id, "67890");
		assert_eq!(second.summary, "No abstract available");
		assert_eq!(second.metadata["year"], 1998);
	}

	#[test]
	fn long_abstracts_are_truncated() {
		let candidates = client().parse_articles(EFETCH_XML, 20);

		assert_eq!(candidates[0].summary, "Aortic dissection pr...");
	}
}
