// crates/core/src/seia.rs
//! Extractor for the SEIA public project search.
//!
//! The search page is backed by a form-encoded POST endpoint returning
//! `{"data": [row, ...]}`, newest submissions first. Row fields are upper
//! snake case (`EXPEDIENTE_NOMBRE`, `ESTADO_PROYECTO`, ...) and may be
//! strings or numbers.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Map, Value};

use crate::error::ExtractError;
use crate::extractor::Extractor;
use crate::types::{Lead, Source};

pub const SEIA_BASE_URL: &str = "https://seia.sea.gob.cl";
const SEARCH_PATH: &str = "/busqueda/buscarProyectoResumenAction.php";
const REFERER_PATH: &str = "/busqueda/buscarProyectoResumen.php";
const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0 Safari/537.36";

#[derive(Debug, Clone)]
pub struct SeiaConfig {
    /// Scheme and host, without trailing slash. Overridable for tests.
    pub base_url: String,
    pub page_size: u32,
    pub max_pages: u32,
    /// Pause before every page after the first.
    pub page_delay: Duration,
    pub request_timeout: Duration,
}

impl Default for SeiaConfig {
    fn default() -> Self {
        Self {
            base_url: SEIA_BASE_URL.to_string(),
            page_size: 10,
            max_pages: 10,
            page_delay: Duration::from_secs(1),
            request_timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    data: Option<Vec<Map<String, Value>>>,
}

pub struct SeiaExtractor {
    client: reqwest::Client,
    config: SeiaConfig,
}

impl SeiaExtractor {
    pub fn new(config: SeiaConfig) -> Result<Self, ExtractError> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| ExtractError::http(&config.base_url, e))?;
        Ok(Self { client, config })
    }

    pub fn config(&self) -> &SeiaConfig {
        &self.config
    }

    fn search_url(&self) -> String {
        format!("{}{}", self.config.base_url, SEARCH_PATH)
    }

    /// Form body for a 1-based page. The endpoint's `offset` is a page
    /// index in units of ten rows, starting at 1.
    fn form(&self, page: u32) -> Vec<(&'static str, String)> {
        let limit = self.config.page_size;
        let start = page.saturating_sub(1) * limit;
        let offset = start / 10 + 1;

        let mut form: Vec<(&'static str, String)> = [
            "nombre",
            "titular",
            "folio",
            "selectRegion",
            "selectComuna",
            "tipoPresentacion",
            "projectStatus",
            "PresentacionMin",
            "PresentacionMax",
            "CalificaMin",
            "CalificaMax",
            "sectores_economicos",
            "razoningreso",
            "id_tipoexpediente",
        ]
        .into_iter()
        .map(|name| (name, String::new()))
        .collect();
        form.push(("offset", offset.to_string()));
        form.push(("limit", limit.to_string()));
        form.push(("orderColumn", "FECHA_PRESENTACION".to_string()));
        form.push(("orderDir", "DESC".to_string()));
        form
    }

    fn absolute_link(&self, link: &str) -> String {
        if link.is_empty() || link.starts_with("http") {
            link.to_string()
        } else if link.starts_with('/') {
            format!("{}{}", self.config.base_url, link)
        } else {
            format!("{}/{}", self.config.base_url, link)
        }
    }

    fn row_to_lead(&self, mut row: Map<String, Value>) -> Lead {
        let link = self.absolute_link(&text(&row, "EXPEDIENTE_URL_PPAL"));
        if !link.is_empty() {
            row.insert("EXPEDIENTE_URL_PPAL".into(), Value::String(link));
        }

        let external_id = non_empty(first_of(&row, &["EXPEDIENTE_ID", "FOLIO"]));
        let status = non_empty(text(&row, "ESTADO_PROYECTO"));
        let sector = first_of(&row, &["TIPO_PROYECTO", "WORKFLOW_DESCRIPCION"]);
        let date = first_of(&row, &["FECHA_PRESENTACION_FORMAT", "FECHA_PRESENTACION"]);
        let project_name = non_empty(text(&row, "EXPEDIENTE_NOMBRE"))
            .unwrap_or_else(|| "Sin nombre".to_string());

        let description = format!(
            "Titular: {}. Región: {}, {}. Inversión: {}. Estado: {}.",
            or_na(text(&row, "TITULAR")),
            or_na(text(&row, "REGION_NOMBRE")),
            or_na(text(&row, "COMUNA_NOMBRE")),
            or_na(text(&row, "INVERSION_MM_FORMAT")),
            or_na(status.clone().unwrap_or_default()),
        );

        Lead {
            source: Source::Seia,
            project_name,
            date,
            sector,
            description,
            external_id,
            status,
            raw_data: Value::Object(row),
        }
    }
}

#[async_trait]
impl Extractor for SeiaExtractor {
    fn source(&self) -> Source {
        Source::Seia
    }

    fn max_pages(&self) -> u32 {
        self.config.max_pages
    }

    async fn fetch_page(&self, page: u32) -> Result<Vec<Lead>, ExtractError> {
        if page > 1 && !self.config.page_delay.is_zero() {
            tokio::time::sleep(self.config.page_delay).await;
        }

        let url = self.search_url();
        tracing::debug!(page, url = %url, "Fetching SEIA page");

        let response = self
            .client
            .post(&url)
            .header("Referer", format!("{}{}", self.config.base_url, REFERER_PATH))
            .header("Origin", &self.config.base_url)
            .form(&self.form(page))
            .send()
            .await
            .map_err(|e| ExtractError::http(&url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ExtractError::Status {
                url,
                status: status.as_u16(),
            });
        }

        let body = response.text().await.map_err(|e| ExtractError::http(&url, e))?;
        let parsed: SearchResponse = serde_json::from_str(&body).map_err(|e| {
            let preview: String = body.chars().take(200).collect();
            ExtractError::decode(&url, format!("{e}; body starts with {preview:?}"))
        })?;

        let leads: Vec<Lead> = parsed
            .data
            .unwrap_or_default()
            .into_iter()
            .map(|row| self.row_to_lead(row))
            .collect();
        tracing::debug!(page, rows = leads.len(), "Parsed SEIA page");
        Ok(leads)
    }
}

/// Field as text; numbers are rendered, null and missing become empty.
fn text(row: &Map<String, Value>, field: &str) -> String {
    match row.get(field) {
        Some(Value::String(s)) => s.trim().to_string(),
        Some(Value::Number(n)) => n.to_string(),
        Some(Value::Bool(b)) => b.to_string(),
        _ => String::new(),
    }
}

fn first_of(row: &Map<String, Value>, fields: &[&str]) -> String {
    fields
        .iter()
        .map(|f| text(row, f))
        .find(|s| !s.is_empty())
        .unwrap_or_default()
}

fn non_empty(s: String) -> Option<String> {
    (!s.is_empty()).then_some(s)
}

fn or_na(s: String) -> String {
    if s.is_empty() {
        "N/A".to_string()
    } else {
        s
    }
}
