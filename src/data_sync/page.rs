use crate::error::{SyncError, SyncResult};
use crate::logic::lap_time::{parse_lap_time, parse_upload_date};
use crate::logic::types::ScrapedRow;
use crate::utils::constants::{SECTOR_COUNT, UNKNOWN_PLAYER_NAME};
use serde::{Deserialize, Serialize};
use strum_macros::Display;

/// One leaderboard row as published, before any decoding
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawRow {
    pub player_id: String,
    pub player_name: String,
    pub lap_time: String,
    #[serde(default)]
    pub sectors: Vec<String>,
    #[serde(default)]
    pub controller: Option<String>,
    pub upload_date: String,
}

/// Parser output for one page payload
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ParsedPage {
    pub rows: Vec<RawRow>,
    /// Only present when the source shows a pager; absent means a single page
    pub total_pages: Option<u32>,
    pub invalid_entity: bool,
    pub empty: bool,
}

/// Turns an opaque page payload into rows and pager metadata.
pub trait PageParser: Send + Sync {
    fn parse(&self, payload: &str) -> SyncResult<ParsedPage>;
}

/// Why a row was left out of a fetch
#[derive(Clone, Debug, Display, PartialEq, Eq)]
#[strum(serialize_all = "snake_case")]
pub enum RowRejection {
    UnknownPlayer,
    IncompleteSectors,
    Malformed(String),
}

impl TryFrom<RawRow> for ScrapedRow {
    type Error = RowRejection;

    fn try_from(raw: RawRow) -> Result<Self, Self::Error> {
        if raw.player_name.trim() == UNKNOWN_PLAYER_NAME {
            return Err(RowRejection::UnknownPlayer);
        }
        if raw.sectors.len() != SECTOR_COUNT {
            return Err(RowRejection::IncompleteSectors);
        }
        let malformed = |e: SyncError| RowRejection::Malformed(e.to_string());

        let player_id = raw.player_id.trim().to_string();
        if player_id.is_empty() {
            return Err(RowRejection::Malformed("missing player id".to_string()));
        }
        let lap_time_ms = parse_lap_time(&raw.lap_time).map_err(malformed)?;
        let mut sectors_ms = [0u32; SECTOR_COUNT];
        for (slot, sector) in sectors_ms.iter_mut().zip(&raw.sectors) {
            *slot = parse_lap_time(sector).map_err(malformed)?;
        }
        let upload_date = parse_upload_date(&raw.upload_date).map_err(malformed)?;

        Ok(ScrapedRow {
            player_id,
            player_name: raw.player_name.trim().to_string(),
            lap_time_ms,
            sectors_ms,
            controller: raw.controller.filter(|c| !c.trim().is_empty()),
            upload_date,
        })
    }
}

#[derive(Debug, Deserialize)]
struct JsonPage {
    #[serde(default)]
    invalid: bool,
    #[serde(default)]
    no_data: bool,
    #[serde(default)]
    total_pages: Option<u32>,
    #[serde(default)]
    rows: Vec<RawRow>,
}

/// Parser for the JSON rendition of a leaderboard page:
/// `{"invalid": bool, "no_data": bool, "total_pages": n, "rows": [RawRow]}`
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonPageParser;

impl PageParser for JsonPageParser {
    fn parse(&self, payload: &str) -> SyncResult<ParsedPage> {
        let page: JsonPage = serde_json::from_str(payload)?;
        let empty = !page.invalid && (page.no_data || page.rows.is_empty());
        Ok(ParsedPage {
            rows: page.rows,
            total_pages: page.total_pages,
            invalid_entity: page.invalid,
            empty,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(name: &str, sectors: &[&str]) -> RawRow {
        RawRow {
            player_id: "76561198000000001".to_string(),
            player_name: name.to_string(),
            lap_time: "1:30.250".to_string(),
            sectors: sectors.iter().map(|s| s.to_string()).collect(),
            controller: Some("wheel".to_string()),
            upload_date: "02/01/2022 18:30".to_string(),
        }
    }

    #[test]
    fn test_row_decoding() {
        let row = ScrapedRow::try_from(raw("Driver", &["0:30.000", "0:30.125", "0:30.125"])).unwrap();
        assert_eq!(row.lap_time_ms, 90_250);
        assert_eq!(row.sectors_ms, [30_000, 30_125, 30_125]);
        assert_eq!(row.controller.as_deref(), Some("wheel"));
    }

    #[test]
    fn test_row_rejections() {
        assert_eq!(
            ScrapedRow::try_from(raw("<unknown>", &["0:30.000", "0:30.125", "0:30.125"])),
            Err(RowRejection::UnknownPlayer)
        );
        assert_eq!(
            ScrapedRow::try_from(raw("Driver", &["0:30.000", "0:30.125"])),
            Err(RowRejection::IncompleteSectors)
        );
        let mut bad_time = raw("Driver", &["0:30.000", "0:30.125", "0:30.125"]);
        bad_time.lap_time = "fast".to_string();
        assert!(matches!(ScrapedRow::try_from(bad_time), Err(RowRejection::Malformed(_))));
    }

    #[test]
    fn test_json_parser_pages() {
        let parsed = JsonPageParser
            .parse(
                r#"{"total_pages": 4, "rows": [{"player_id": "1", "player_name": "A",
                   "lap_time": "1:00.000", "sectors": ["0:20.000","0:20.000","0:20.000"],
                   "upload_date": "01/01/2022 10:00"}]}"#,
            )
            .unwrap();
        assert_eq!(parsed.total_pages, Some(4));
        assert_eq!(parsed.rows.len(), 1);
        assert!(!parsed.empty);
        assert!(!parsed.invalid_entity);
    }

    #[test]
    fn test_json_parser_flags() {
        assert!(JsonPageParser.parse(r#"{"no_data": true}"#).unwrap().empty);
        let invalid = JsonPageParser.parse(r#"{"invalid": true}"#).unwrap();
        assert!(invalid.invalid_entity);
        assert!(!invalid.empty);
        assert!(matches!(JsonPageParser.parse("<html>"), Err(SyncError::Parse(_))));
    }
}
