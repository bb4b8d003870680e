// crates/core/src/hechos.rs
//! Material-event filings. The upstream site has no scraper yet, so this
//! extractor serves a fixed sample dataset in a single page.

use async_trait::async_trait;
use serde_json::json;

use crate::error::ExtractError;
use crate::extractor::Extractor;
use crate::types::{Lead, Source};

#[derive(Debug, Default, Clone)]
pub struct HechosEsencialesExtractor;

impl HechosEsencialesExtractor {
    pub fn new() -> Self {
        Self
    }

    fn sample_leads() -> Vec<Lead> {
        vec![
            Lead {
                source: Source::HechosEsenciales,
                project_name: "Fusión Empresa A y Empresa B".into(),
                date: "2024-01-15".into(),
                sector: "Finanzas".into(),
                description: "Anuncio de fusión entre dos empresas del sector financiero. Valor estimado: USD 150M.".into(),
                external_id: None,
                status: None,
                raw_data: json!({ "tipo": "Fusión", "valor": 150_000_000, "moneda": "USD" }),
            },
            Lead {
                source: Source::HechosEsenciales,
                project_name: "OPA sobre Acciones de Empresa C".into(),
                date: "2024-01-14".into(),
                sector: "Tecnología".into(),
                description: "Oferta Pública de Adquisición sobre el 30% de las acciones de Empresa C.".into(),
                external_id: None,
                status: None,
                raw_data: json!({ "tipo": "OPA", "porcentaje": 30 }),
            },
        ]
    }
}

#[async_trait]
impl Extractor for HechosEsencialesExtractor {
    fn source(&self) -> Source {
        Source::HechosEsenciales
    }

    fn max_pages(&self) -> u32 {
        1
    }

    async fn fetch_page(&self, page: u32) -> Result<Vec<Lead>, ExtractError> {
        if page == 1 {
            Ok(Self::sample_leads())
        } else {
            Ok(Vec::new())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_single_page_of_samples() {
        let ex = HechosEsencialesExtractor::new();
        let page = ex.fetch_page(1).await.unwrap();
        assert_eq!(page.len(), 2);
        assert!(page.iter().all(|l| l.source == Source::HechosEsenciales));
        assert_eq!(page[1].raw_data["porcentaje"], 30);
        assert!(ex.fetch_page(2).await.unwrap().is_empty());
    }
}
