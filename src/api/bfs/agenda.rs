use reqwest::blocking::Client;
use reqwest::header::{ACCEPT, ACCEPT_LANGUAGE};
use reqwest::StatusCode;
use serde::Deserialize;

use crate::errors::LoadError;

/// Publishing schedule ("agenda") endpoint of the BFS DAM content API.
pub const AGENDA_URL: &str = "https://dam-api.bfs.admin.ch/hub/api/dam/agenda";

#[derive(Debug, Deserialize)]
pub struct AgendaResponse {
    pub data: Vec<AgendaItem>,
}

/// One scheduled publication as the feed returns it.  Only the fields the
/// archive keeps are modelled; everything else in the document is ignored.
#[derive(Debug, Deserialize)]
pub struct AgendaItem {
    pub ids: Ids,
    pub description: Description,
    pub bfs: Bfs,
}

#[derive(Debug, Deserialize)]
pub struct Ids {
    pub uuid: String,
    pub gnp: Option<String>,
    #[serde(rename = "damId")]
    pub dam_id: i64,
}

#[derive(Debug, Deserialize)]
pub struct Description {
    pub titles: Titles,
    pub categorization: Categorization,
    #[serde(rename = "shortTextGnp")]
    pub short_text_gnp: Option<ShortText>,
    #[serde(default)]
    pub languages: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct Titles {
    pub main: String,
}

#[derive(Debug, Deserialize)]
pub struct Categorization {
    #[serde(default)]
    pub institution: Vec<CategoryLevel>,
    #[serde(default)]
    pub prodima: Vec<ProdimaLevel>,
}

#[derive(Debug, Deserialize)]
pub struct CategoryLevel {
    pub id: i64,
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct ProdimaLevel {
    pub id: i64,
    pub code: String,
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct ShortText {
    pub raw: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct Bfs {
    /// Scheduled publishing timestamp.  Passed through untouched.
    pub embargo: String,
}

/// One flattened archive row.  The load id and creation timestamp are
/// batch-level and stamped at insert time, not carried here.
#[derive(Clone, Debug, PartialEq)]
pub struct Row {
    pub uuid: String,
    pub gnp: Option<String>,
    pub dam_id: i64,
    pub title: String,
    pub published_ts: String,
    pub institution_lvl_0_id: Option<i64>,
    pub institution_lvl_0_name: Option<String>,
    pub institution_lvl_1_id: Option<i64>,
    pub institution_lvl_1_name: Option<String>,
    pub prodima_lvl_0_id: Option<i64>,
    pub prodima_lvl_0_code: Option<String>,
    pub prodima_lvl_0_name: Option<String>,
    pub prodima_lvl_1_id: Option<i64>,
    pub prodima_lvl_1_code: Option<String>,
    pub prodima_lvl_1_name: Option<String>,
    pub short_text_gnp: Option<String>,
    pub languages: String,
}

/// Fetch the current publishing schedule.  The feed is queried in German,
/// same as the reports it announces.
pub fn fetch_agenda(url: &str) -> Result<Vec<AgendaItem>, LoadError> {
    let client = Client::new();
    let response = client
        .get(url)
        .header(ACCEPT, "application/json")
        .header(ACCEPT_LANGUAGE, "de")
        .send()
        .map_err(|e| LoadError::Fetch(e.to_string()))?;
    if response.status() != StatusCode::OK {
        return Err(LoadError::Fetch(format!(
            "status code {}",
            response.status()
        )));
    }
    let body: AgendaResponse = response.json().map_err(|e| LoadError::Fetch(e.to_string()))?;
    Ok(body.data)
}

/// Flatten feed items into archive rows, one row per item.
///
/// A missing institution/prodima level becomes NULL columns for that level;
/// the row survives.  Missing required fields (uuid, damId, title, embargo)
/// already failed decoding in [fetch_agenda] and fail the whole batch.
pub fn flatten(items: &[AgendaItem]) -> Vec<Row> {
    items.iter().map(flatten_item).collect()
}

fn flatten_item(item: &AgendaItem) -> Row {
    let institution = &item.description.categorization.institution;
    let prodima = &item.description.categorization.prodima;
    Row {
        uuid: item.ids.uuid.clone(),
        gnp: item.ids.gnp.clone(),
        dam_id: item.ids.dam_id,
        title: item.description.titles.main.clone(),
        published_ts: item.bfs.embargo.clone(),
        institution_lvl_0_id: institution.first().map(|c| c.id),
        institution_lvl_0_name: institution.first().map(|c| c.name.clone()),
        institution_lvl_1_id: institution.get(1).map(|c| c.id),
        institution_lvl_1_name: institution.get(1).map(|c| c.name.clone()),
        prodima_lvl_0_id: prodima.first().map(|c| c.id),
        prodima_lvl_0_code: prodima.first().map(|c| c.code.clone()),
        prodima_lvl_0_name: prodima.first().map(|c| c.name.clone()),
        prodima_lvl_1_id: prodima.get(1).map(|c| c.id),
        prodima_lvl_1_code: prodima.get(1).map(|c| c.code.clone()),
        prodima_lvl_1_name: prodima.get(1).map(|c| c.name.clone()),
        short_text_gnp: item
            .description
            .short_text_gnp
            .as_ref()
            .and_then(|t| t.raw.clone()),
        languages: item.description.languages.join(","),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
{
  "data": [
    {
      "ids": {
        "uuid": "5f3c2a9e-1d44-4a0b-9a55-0c1e7ad3b7f1",
        "gnp": "gnp-2024-0456",
        "damId": 32100245
      },
      "description": {
        "titles": { "main": "Landesindex der Konsumentenpreise im August 2024" },
        "categorization": {
          "institution": [
            { "id": 7, "name": "Bundesamt für Statistik" },
            { "id": 73, "name": "Preise" }
          ],
          "prodima": [
            { "id": 900210, "code": "05", "name": "Preise" },
            { "id": 900212, "code": "05.2", "name": "Konsumentenpreise" }
          ]
        },
        "shortTextGnp": { "raw": "Monatliche Teuerung gemäss LIK." },
        "languages": ["de", "fr", "it", "en"]
      },
      "bfs": { "embargo": "2024-09-03T08:30:00" }
    },
    {
      "ids": {
        "uuid": "b7e9d1c0-8f2a-4c3d-8e66-2f4a9b0d1e22",
        "gnp": null,
        "damId": 32100391
      },
      "description": {
        "titles": { "main": "Szenarien zur Bevölkerungsentwicklung" },
        "categorization": {
          "institution": [
            { "id": 7, "name": "Bundesamt für Statistik" }
          ],
          "prodima": [
            { "id": 900021, "code": "01", "name": "Bevölkerung" }
          ]
        },
        "languages": ["de", "fr"]
      },
      "bfs": { "embargo": "2024-09-12T08:30:00" }
    }
  ]
}
"#;

    #[test]
    fn flattens_sample_feed() {
        let response: AgendaResponse = serde_json::from_str(SAMPLE).unwrap();
        let rows = flatten(&response.data);
        assert_eq!(rows.len(), 2);

        let first = &rows[0];
        assert_eq!(first.uuid, "5f3c2a9e-1d44-4a0b-9a55-0c1e7ad3b7f1");
        assert_eq!(first.gnp.as_deref(), Some("gnp-2024-0456"));
        assert_eq!(first.dam_id, 32100245);
        assert_eq!(first.published_ts, "2024-09-03T08:30:00");
        assert_eq!(first.institution_lvl_1_name.as_deref(), Some("Preise"));
        assert_eq!(first.prodima_lvl_1_code.as_deref(), Some("05.2"));
        assert_eq!(
            first.short_text_gnp.as_deref(),
            Some("Monatliche Teuerung gemäss LIK.")
        );
        assert_eq!(first.languages, "de,fr,it,en");
    }

    #[test]
    fn missing_second_level_becomes_null() {
        let response: AgendaResponse = serde_json::from_str(SAMPLE).unwrap();
        let rows = flatten(&response.data);

        let second = &rows[1];
        assert_eq!(second.gnp, None);
        assert_eq!(second.institution_lvl_0_id, Some(7));
        assert_eq!(second.institution_lvl_1_id, None);
        assert_eq!(second.institution_lvl_1_name, None);
        assert_eq!(second.prodima_lvl_1_id, None);
        assert_eq!(second.prodima_lvl_1_code, None);
        assert_eq!(second.short_text_gnp, None);
        assert_eq!(second.languages, "de,fr");
    }

    #[test]
    fn missing_required_field_fails_decoding() {
        // no ids.uuid
        let doc = r#"{"data": [{"ids": {"damId": 1},
            "description": {"titles": {"main": "x"}, "categorization": {}},
            "bfs": {"embargo": "2024-01-01T08:30:00"}}]}"#;
        assert!(serde_json::from_str::<AgendaResponse>(doc).is_err());
    }

    #[ignore]
    #[test]
    fn fetch_live_feed() -> Result<(), LoadError> {
        let items = fetch_agenda(AGENDA_URL)?;
        assert!(!items.is_empty());
        println!("{} items in the schedule", items.len());
        Ok(())
    }
}
