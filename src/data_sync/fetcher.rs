use crate::data_sync::config::SyncConfig;
use crate::data_sync::page::{PageParser, ParsedPage, RowRejection};
use crate::data_sync::transport::PageTransport;
use crate::error::{SyncError, SyncResult};
use crate::logic::types::{PairKey, ScrapedRow};
use crate::utils::constants::MAX_DISCOVERED_PAGES;
use futures::{StreamExt, TryStreamExt, stream};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::timeout;
use tracing::{debug, info, warn};

/// Rows collected for one pair plus what was dropped along the way
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FetchedRows {
    pub rows: Vec<ScrapedRow>,
    pub pages: u32,
    pub unknown_players: usize,
    pub incomplete_sectors: usize,
    pub malformed: usize,
}

impl FetchedRows {
    pub fn rejected(&self) -> usize {
        self.unknown_players + self.incomplete_sectors + self.malformed
    }

    fn absorb(&mut self, page: ParsedPage) {
        for raw in page.rows {
            let player_id = raw.player_id.clone();
            match ScrapedRow::try_from(raw) {
                Ok(row) => self.rows.push(row),
                Err(rejection) => {
                    debug!("Skipping row of player {}: {}", player_id, rejection);
                    match rejection {
                        RowRejection::UnknownPlayer => self.unknown_players += 1,
                        RowRejection::IncompleteSectors => self.incomplete_sectors += 1,
                        RowRejection::Malformed(_) => self.malformed += 1,
                    }
                }
            }
        }
    }
}

/// Retrieves and decodes every page of a tracked pair's leaderboard
pub struct PageFetcher {
    transport: Arc<dyn PageTransport>,
    parser: Arc<dyn PageParser>,
    request_timeout: Duration,
    max_concurrent_pages: usize,
    page_limit: Option<u32>,
}

impl PageFetcher {
    pub fn new(
        transport: Arc<dyn PageTransport>,
        parser: Arc<dyn PageParser>,
        request_timeout: Duration,
        max_concurrent_pages: usize,
        page_limit: Option<u32>,
    ) -> Self {
        Self {
            transport,
            parser,
            request_timeout,
            max_concurrent_pages: max_concurrent_pages.max(1),
            page_limit,
        }
    }

    pub fn from_config(config: &SyncConfig, transport: Arc<dyn PageTransport>, parser: Arc<dyn PageParser>) -> Self {
        Self::new(
            transport,
            parser,
            config.request_timeout(),
            config.max_concurrent_pages,
            config.page_limit(),
        )
    }

    pub async fn fetch(&self, pair: PairKey) -> SyncResult<Vec<ScrapedRow>> {
        Ok(self.fetch_detailed(pair).await?.rows)
    }

    /// Page 1 decides everything: invalid entity, empty result, or the total page count.
    /// Pages 2..N are then requested concurrently; any failed page fails the whole fetch.
    pub async fn fetch_detailed(&self, pair: PairKey) -> SyncResult<FetchedRows> {
        let start_time = Instant::now();
        let first = self.fetch_page(pair, 1).await?;

        if first.invalid_entity {
            return Err(SyncError::InvalidEntity { pair });
        }
        if first.empty {
            info!("{}: found 0 records", pair);
            return Ok(FetchedRows { pages: 1, ..FetchedRows::default() });
        }

        let pages = self.page_count(pair, &first)?;
        info!("{}: found {} page(s) of times", pair, pages);

        let mut fetched = FetchedRows {
            rows: Vec::with_capacity(first.rows.len()),
            pages,
            ..FetchedRows::default()
        };
        fetched.absorb(first);

        if pages > 1 {
            let remaining: Vec<ParsedPage> = stream::iter(2..=pages)
                .map(|page| self.fetch_page(pair, page))
                .buffered(self.max_concurrent_pages)
                .try_collect()
                .await?;
            for (page, parsed) in (2..=pages).zip(remaining) {
                // Leaderboard shrank or vanished between requests.
                if parsed.invalid_entity {
                    warn!("{}: page {} flagged the pair invalid mid-fetch", pair, page);
                    return Err(SyncError::Transport(format!(
                        "{pair} page {page} rejected the pair after page 1 accepted it"
                    )));
                }
                if parsed.empty {
                    debug!("{}: page {} of {} came back empty", pair, page, pages);
                }
                fetched.absorb(parsed);
            }
        }

        debug!(
            "{}: {} rows kept, {} rejected across {} page(s) in {:?}",
            pair,
            fetched.rows.len(),
            fetched.rejected(),
            pages,
            start_time.elapsed()
        );
        Ok(fetched)
    }

    fn page_count(&self, pair: PairKey, first: &ParsedPage) -> SyncResult<u32> {
        if self.page_limit == Some(1) {
            return Ok(1);
        }
        let discovered = first.total_pages.unwrap_or(1).max(1);
        if discovered > MAX_DISCOVERED_PAGES {
            return Err(SyncError::Parse(format!(
                "{pair} reports {discovered} pages, above the ceiling of {MAX_DISCOVERED_PAGES}"
            )));
        }
        Ok(match self.page_limit {
            Some(limit) => discovered.min(limit),
            None => discovered,
        })
    }

    async fn fetch_page(&self, pair: PairKey, page: u32) -> SyncResult<ParsedPage> {
        let payload = timeout(self.request_timeout, self.transport.get_page(pair, page))
            .await
            .map_err(|_| SyncError::Timeout {
                what: format!("{pair} page {page}"),
                after: self.request_timeout,
            })??;
        self.parser.parse(&payload)
    }
}
