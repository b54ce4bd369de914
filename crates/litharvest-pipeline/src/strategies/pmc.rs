use std::sync::Arc;

use async_trait::async_trait;
use litharvest_core::CanonicalRecord;
use serde::Deserialize;

use crate::cache::{ResponseCache, response_key};
use crate::error::{PipelineError, Result};
use crate::fetch::download_pdf;
use crate::http::RateLimitedClient;
use crate::identifiers::pmid_for;
use crate::strategies::{AttemptResult, Strategy};

const IDCONV_BASE: &str = "https://www.ncbi.nlm.nih.gov/pmc/utils/idconv/v1.0";
const OA_BASE: &str = "https://www.ncbi.nlm.nih.gov/pmc/utils/oa/oa.fcgi";
const EUROPE_BASE: &str = "https://www.ebi.ac.uk/europepmc/webservices/rest";
const RENDER_BASE: &str = "https://europepmc.org/articles";

/// Resolves PubMed records to full text through PubMed Central: PMID to
/// PMCID, then the US open-access service, then Europe PMC's renderer.
pub struct PmcStrategy {
    client: Arc<RateLimitedClient>,
    cache: Arc<ResponseCache>,
    idconv_base: String,
    oa_base: String,
    europe_base: String,
    render_base: String,
}

#[derive(Debug, Deserialize)]
struct IdconvEnvelope {
    #[serde(default)]
    records: Vec<IdconvRecord>,
}

#[derive(Debug, Deserialize)]
struct IdconvRecord {
    #[serde(default)]
    pmcid: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OaEnvelope {
    #[serde(default)]
    records: Option<OaRecords>,
}

#[derive(Debug, Deserialize)]
struct OaRecords {
    #[serde(default, rename = "record")]
    records: Vec<OaRecordXml>,
}

#[derive(Debug, Deserialize)]
struct OaRecordXml {
    #[serde(default, rename = "link")]
    links: Vec<OaLink>,
}

#[derive(Debug, Deserialize)]
struct OaLink {
    #[serde(default, rename = "@format")]
    format: Option<String>,
    #[serde(default, rename = "@href")]
    href: Option<String>,
}

#[derive(Debug, Deserialize)]
struct EuropeEnvelope {
    #[serde(default, rename = "resultList")]
    result_list: Option<EuropeResultList>,
}

#[derive(Debug, Deserialize)]
struct EuropeResultList {
    #[serde(default)]
    result: Vec<EuropeResult>,
}

#[derive(Debug, Deserialize)]
struct EuropeResult {
    #[serde(default)]
    pmcid: Option<String>,
    #[serde(default, rename = "hasPDF")]
    has_pdf: Option<String>,
}

/// The OA service answers with an error element instead of records when an
/// article is not in the open-access subset. FTP links are served over
/// HTTPS at the same path.
fn pdf_href_from_oa(xml: &str) -> Result<Option<String>> {
    let envelope: OaEnvelope =
        quick_xml::de::from_str(xml).map_err(|e| PipelineError::Parse(e.to_string()))?;
    Ok(envelope
        .records
        .into_iter()
        .flat_map(|records| records.records)
        .flat_map(|record| record.links)
        .find(|link| link.format.as_deref() == Some("pdf"))
        .and_then(|link| link.href)
        .map(|href| href.replacen("ftp://", "https://", 1)))
}

impl PmcStrategy {
    pub fn new(client: Arc<RateLimitedClient>, cache: Arc<ResponseCache>) -> Self {
        Self {
            client,
            cache,
            idconv_base: IDCONV_BASE.to_string(),
            oa_base: OA_BASE.to_string(),
            europe_base: EUROPE_BASE.to_string(),
            render_base: RENDER_BASE.to_string(),
        }
    }

    #[cfg(test)]
    fn with_bases(
        client: Arc<RateLimitedClient>,
        cache: Arc<ResponseCache>,
        base: &str,
    ) -> Self {
        Self {
            client,
            cache,
            idconv_base: format!("{base}/idconv"),
            oa_base: format!("{base}/oa"),
            europe_base: format!("{base}/europe"),
            render_base: format!("{base}/render"),
        }
    }

    async fn resolve(&self, pmid: &str) -> Result<Option<String>> {
        let key = response_key("pmc", pmid);
        if let Some(cached) = self.cache.get::<Option<String>>(&key).await {
            return Ok(cached);
        }
        let resolved = self.resolve_uncached(pmid).await?;
        self.cache.set(&key, &resolved).await;
        Ok(resolved)
    }

    async fn resolve_uncached(&self, pmid: &str) -> Result<Option<String>> {
        if let Some(pmcid) = self.pmcid_for(pmid).await?
            && let Some(url) = self.oa_pdf_for(&pmcid).await?
        {
            return Ok(Some(url));
        }
        self.europe_pdf_for(pmid).await
    }

    async fn pmcid_for(&self, pmid: &str) -> Result<Option<String>> {
        let url = format!("{}/?ids={pmid}&format=json", self.idconv_base);
        let envelope: IdconvEnvelope = self.client.get_json(&url).await?;
        Ok(envelope
            .records
            .into_iter()
            .find_map(|r| r.pmcid)
            .filter(|id| !id.trim().is_empty()))
    }

    async fn oa_pdf_for(&self, pmcid: &str) -> Result<Option<String>> {
        let url = format!("{}?id={pmcid}", self.oa_base);
        let xml = self.client.get_text(&url).await?;
        pdf_href_from_oa(&xml)
    }

    async fn europe_pdf_for(&self, pmid: &str) -> Result<Option<String>> {
        let url = format!(
            "{}/search?query=EXT_ID%3A{pmid}&format=json&resultType=core",
            self.europe_base
        );
        let envelope: EuropeEnvelope = self.client.get_json(&url).await?;
        let hit = envelope
            .result_list
            .map(|list| list.result)
            .unwrap_or_default()
            .into_iter()
            .find(|r| r.has_pdf.as_deref() == Some("Y"));
        Ok(hit
            .and_then(|r| r.pmcid)
            .map(|pmcid| format!("{}/{pmcid}?pdf=render", self.render_base)))
    }
}

#[async_trait]
impl Strategy for PmcStrategy {
    fn name(&self) -> &'static str {
        "pmc"
    }

    fn applicable(&self, record: &CanonicalRecord) -> bool {
        pmid_for(record).is_some()
    }

    async fn attempt(&self, record: &CanonicalRecord) -> AttemptResult {
        let Some(pmid) = pmid_for(record) else {
            return AttemptResult::NotFound;
        };
        match self.resolve(&pmid).await {
            Ok(Some(url)) => download_pdf(&self.client, &url).await,
            Ok(None) => AttemptResult::NotFound,
            Err(e) => e.into(),
        }
    }
}
