//! Lookup workflow for one page session.
//!
//! A lookup is triggered by a map click or a successful search and runs
//! strictly in order: reset the fact, reverse geocode, enrich with country
//! data, narrate a fact. Every step writes into the shared [`DisplayState`].
//!
//! Each trigger is issued a sequence number. Under [`CommitPolicy::LatestOnly`]
//! a lookup that has been superseded by a newer trigger stops writing and
//! returns early; under [`CommitPolicy::LastWriteWins`] overlapping lookups
//! all write and the last write is what stays on screen.

use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::countries::CountryEnricher;
use crate::display::DisplayState;
use crate::geocoder::LocationResolver;
use crate::map::{MapSurface, MapView, Marker, SEARCH_ZOOM};
use crate::narrator::FactNarrator;
use crate::types::Coordinate;

pub const FETCH_FAILED: &str = "Failed to fetch location data. Please try again.";
pub const SEARCH_FAILED: &str = "Failed to search location. Please try again.";
pub const NOT_FOUND: &str = "Location not found!";

/// What to do with writes from a lookup that is no longer the latest
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum CommitPolicy {
    #[default]
    LatestOnly,
    LastWriteWins,
}

impl CommitPolicy {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "latest" | "latest-only" => Some(Self::LatestOnly),
            "last-write-wins" | "race" => Some(Self::LastWriteWins),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LookupOutcome {
    /// Workflow ran to the end
    Completed,
    /// Geocoding, enrichment or search failed; an alert was raised
    Failed,
    /// Search returned no results; an alert was raised
    NotFound,
    /// Empty search query
    Skipped,
    /// A newer lookup took over before this one finished
    Superseded,
}

/// Blocking, user-facing message
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Alert {
    pub message: String,
}

impl Alert {
    fn new(message: &str) -> Self {
        Self {
            message: message.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionSnapshot {
    pub display: DisplayState,
    pub view: MapView,
    pub marker: Option<Marker>,
    pub latest_lookup: u64,
}

#[derive(Debug, Default)]
struct SessionState {
    map: MapSurface,
    display: DisplayState,
    alerts: Vec<Alert>,
    latest_lookup: u64,
}

pub struct LookupSession<R, E, N> {
    resolver: R,
    enricher: E,
    narrator: N,
    policy: CommitPolicy,
    state: Mutex<SessionState>,
}

impl<R, E, N> LookupSession<R, E, N>
where
    R: LocationResolver,
    E: CountryEnricher,
    N: FactNarrator,
{
    pub fn new(resolver: R, enricher: E, narrator: N, policy: CommitPolicy) -> Self {
        Self {
            resolver,
            enricher,
            narrator,
            policy,
            state: Mutex::new(SessionState::default()),
        }
    }

    pub fn policy(&self) -> CommitPolicy {
        self.policy
    }

    /// Map click: replace the marker, then look up the clicked point.
    pub async fn click(&self, at: Coordinate) -> LookupOutcome {
        let lookup = self.begin(at, None).await;
        self.update_info(lookup, at).await
    }

    /// Search: find the query, pan to it, then look it up.
    pub async fn search(&self, query: &str) -> LookupOutcome {
        if query.is_empty() {
            return LookupOutcome::Skipped;
        }

        match self.resolver.forward_geocode(query).await {
            Ok(Some(at)) => {
                let lookup = self.begin(at, Some(SEARCH_ZOOM)).await;
                self.update_info(lookup, at).await
            }
            Ok(None) => {
                info!("No search results for {:?}", query);
                self.state.lock().await.alerts.push(Alert::new(NOT_FOUND));
                LookupOutcome::NotFound
            }
            Err(e) => {
                error!("Error searching for {:?}: {:#}", query, e);
                self.state.lock().await.alerts.push(Alert::new(SEARCH_FAILED));
                LookupOutcome::Failed
            }
        }
    }

    pub async fn snapshot(&self) -> SessionSnapshot {
        let state = self.state.lock().await;
        SessionSnapshot {
            display: state.display.clone(),
            view: state.map.view(),
            marker: state.map.marker(),
            latest_lookup: state.latest_lookup,
        }
    }

    /// Drain alerts raised since the last call
    pub async fn take_alerts(&self) -> Vec<Alert> {
        std::mem::take(&mut self.state.lock().await.alerts)
    }

    /// Issue a lookup number and replace the marker before any network call.
    async fn begin(&self, at: Coordinate, zoom: Option<u8>) -> u64 {
        let mut state = self.state.lock().await;
        state.latest_lookup += 1;
        if let Some(zoom) = zoom {
            state.map.set_view(at, zoom);
        }
        state.map.set_marker(at);
        info!(
            "Lookup {} at ({:.4}, {:.4})",
            state.latest_lookup, at.latitude, at.longitude
        );
        state.latest_lookup
    }

    /// Apply `write` unless the policy says this lookup's writes are stale.
    async fn commit(&self, lookup: u64, write: impl FnOnce(&mut SessionState)) -> bool {
        let mut state = self.state.lock().await;
        if self.policy == CommitPolicy::LatestOnly && lookup != state.latest_lookup {
            debug!(
                "Discarding write from lookup {} (latest is {})",
                lookup, state.latest_lookup
            );
            return false;
        }
        write(&mut state);
        true
    }

    async fn fail(&self, lookup: u64, e: anyhow::Error) -> LookupOutcome {
        error!("Error fetching data for lookup {}: {:#}", lookup, e);
        if self.commit(lookup, |s| s.alerts.push(Alert::new(FETCH_FAILED))).await {
            LookupOutcome::Failed
        } else {
            LookupOutcome::Superseded
        }
    }

    async fn update_info(&self, lookup: u64, at: Coordinate) -> LookupOutcome {
        if !self.commit(lookup, |s| s.display.reset_fact()).await {
            return LookupOutcome::Superseded;
        }

        let address = match self.resolver.reverse_geocode(at).await {
            Ok(address) => address,
            Err(e) => return self.fail(lookup, e).await,
        };
        if !self
            .commit(lookup, |s| s.display.show_address(&address, at))
            .await
        {
            return LookupOutcome::Superseded;
        }

        let committed = match address.country_code.as_deref() {
            Some(code) => match self.enricher.enrich(code).await {
                Ok(info) => self.commit(lookup, |s| s.display.show_country(&info)).await,
                Err(e) => return self.fail(lookup, e).await,
            },
            None => self.commit(lookup, |s| s.display.clear_country()).await,
        };
        if !committed {
            return LookupOutcome::Superseded;
        }

        if let (Some(country), Some(city)) = (address.country.as_deref(), address.city.as_deref()) {
            let fact = match self.narrator.narrate(country, city).await {
                Ok(fact) => Some(fact),
                Err(e) => {
                    warn!("Error fetching fact about {}, {}: {:#}", city, country, e);
                    None
                }
            };
            if !self.commit(lookup, |s| s.display.show_fact(fact)).await {
                return LookupOutcome::Superseded;
            }
        }

        LookupOutcome::Completed
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::Mutex as StdMutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use anyhow::{Result, bail};
    use tokio::sync::Notify;

    use super::*;
    use crate::display::Flag;
    use crate::types::{Address, CountryInfo, Fact, SENTINEL};

    const PARIS: Coordinate = Coordinate {
        latitude: 48.8566,
        longitude: 2.3522,
    };
    const NAIROBI: Coordinate = Coordinate {
        latitude: -1.2921,
        longitude: 36.8219,
    };
    const OCEAN: Coordinate = Coordinate {
        latitude: -30.0,
        longitude: -140.0,
    };

    fn paris() -> Address {
        Address {
            country: Some("France".to_string()),
            city: Some("Paris".to_string()),
            region: Some("Île-de-France".to_string()),
            postcode: Some("75004".to_string()),
            country_code: Some("fr".to_string()),
        }
    }

    fn nairobi() -> Address {
        Address {
            country: Some("Kenya".to_string()),
            city: Some("Nairobi".to_string()),
            region: Some("Nairobi County".to_string()),
            postcode: None,
            country_code: Some("ke".to_string()),
        }
    }

    /// Holds a reverse geocode until released
    #[derive(Default)]
    struct Gate {
        entered: Notify,
        release: Notify,
    }

    #[derive(Default)]
    struct FakeResolver {
        places: Vec<(Coordinate, Address)>,
        search_hit: Option<Coordinate>,
        fail_reverse: bool,
        fail_search: bool,
        gate: Option<(Coordinate, Arc<Gate>)>,
        reverse_calls: AtomicUsize,
    }

    impl LocationResolver for FakeResolver {
        async fn reverse_geocode(&self, at: Coordinate) -> Result<Address> {
            self.reverse_calls.fetch_add(1, Ordering::SeqCst);
            if let Some((gated, gate)) = &self.gate
                && *gated == at
            {
                gate.entered.notify_one();
                gate.release.notified().await;
            }
            if self.fail_reverse {
                bail!("connection reset");
            }
            Ok(self
                .places
                .iter()
                .find(|(c, _)| *c == at)
                .map(|(_, a)| a.clone())
                .unwrap_or_default())
        }

        async fn forward_geocode(&self, _query: &str) -> Result<Option<Coordinate>> {
            if self.fail_search {
                bail!("search unavailable");
            }
            Ok(self.search_hit)
        }
    }

    #[derive(Default)]
    struct FakeEnricher {
        fail: bool,
        calls: StdMutex<Vec<String>>,
    }

    impl CountryEnricher for FakeEnricher {
        async fn enrich(&self, country_code: &str) -> Result<CountryInfo> {
            self.calls.lock().unwrap().push(country_code.to_string());
            if self.fail {
                bail!("country service down");
            }
            Ok(match country_code {
                "fr" => CountryInfo {
                    population: Some(67391582),
                    primary_currency_name: Some("Euro".to_string()),
                    primary_timezone: Some("UTC-10:00".to_string()),
                    flag_image_url: Some("https://flagcdn.com/w320/fr.png".to_string()),
                },
                _ => CountryInfo {
                    population: Some(53771300),
                    primary_currency_name: Some("Kenyan shilling".to_string()),
                    primary_timezone: Some("UTC+03:00".to_string()),
                    flag_image_url: None,
                },
            })
        }
    }

    #[derive(Default)]
    struct FakeNarrator {
        fail: bool,
        calls: StdMutex<Vec<(String, String)>>,
    }

    impl FactNarrator for FakeNarrator {
        async fn narrate(&self, country: &str, city: &str) -> Result<Fact> {
            self.calls
                .lock()
                .unwrap()
                .push((country.to_string(), city.to_string()));
            if self.fail {
                bail!("insufficient_quota");
            }
            Ok(Fact {
                text: format!("{} is the capital of {}.", city, country),
            })
        }
    }

    type TestSession = LookupSession<FakeResolver, FakeEnricher, FakeNarrator>;

    fn resolver() -> FakeResolver {
        FakeResolver {
            places: vec![(PARIS, paris()), (NAIROBI, nairobi())],
            ..Default::default()
        }
    }

    fn session(resolver: FakeResolver) -> TestSession {
        LookupSession::new(
            resolver,
            FakeEnricher::default(),
            FakeNarrator::default(),
            CommitPolicy::LatestOnly,
        )
    }

    #[tokio::test]
    async fn test_click_round_trip() {
        let session = session(resolver());
        assert_eq!(session.click(PARIS).await, LookupOutcome::Completed);

        let snapshot = session.snapshot().await;
        let display = &snapshot.display;
        assert_eq!(display.country, "France");
        assert_eq!(display.city, "Paris");
        assert_eq!(display.region, "Île-de-France");
        assert_eq!(display.zipcode, "75004");
        assert_eq!(display.coordinates, "Lat: 48.8566, Lng: 2.3522");
        assert_eq!(display.population, "67,391,582");
        assert_eq!(display.currency, "Euro");
        assert_eq!(display.timezone, "UTC-10:00");
        assert_eq!(
            display.flag,
            Flag::Shown("https://flagcdn.com/w320/fr.png".to_string())
        );
        assert_eq!(display.fact, "Paris is the capital of France.");
        assert_eq!(snapshot.marker.unwrap().position, PARIS);

        assert_eq!(*session.enricher.calls.lock().unwrap(), vec!["fr"]);
        assert_eq!(
            *session.narrator.calls.lock().unwrap(),
            vec![("France".to_string(), "Paris".to_string())]
        );
        assert!(session.take_alerts().await.is_empty());
    }

    #[tokio::test]
    async fn test_no_country_code_skips_enrichment() {
        let session = session(resolver());
        session.click(PARIS).await;
        assert_eq!(session.click(OCEAN).await, LookupOutcome::Completed);

        let display = session.snapshot().await.display;
        assert_eq!(display, {
            let mut expected = DisplayState::default();
            expected.coordinates = "Lat: -30.0000, Lng: -140.0000".to_string();
            expected
        });
        assert_eq!(session.enricher.calls.lock().unwrap().len(), 1);
        assert_eq!(session.narrator.calls.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_marker_replaced_per_click() {
        let session = session(resolver());
        session.click(PARIS).await;
        let first = session.snapshot().await.marker.unwrap();
        session.click(NAIROBI).await;
        let second = session.snapshot().await.marker.unwrap();

        assert_ne!(first.id, second.id);
        assert_eq!(second.position, NAIROBI);
    }

    #[tokio::test]
    async fn test_search_not_found_changes_nothing() {
        let session = session(resolver());
        session.click(PARIS).await;
        let before = session.snapshot().await;

        assert_eq!(
            session.search("Nowhere12345xyz").await,
            LookupOutcome::NotFound
        );

        let after = session.snapshot().await;
        assert_eq!(after.display, before.display);
        assert_eq!(after.marker, before.marker);
        assert_eq!(after.view, before.view);
        assert_eq!(after.latest_lookup, before.latest_lookup);
        assert_eq!(session.take_alerts().await, vec![Alert::new(NOT_FOUND)]);
    }

    #[tokio::test]
    async fn test_search_not_found_creates_no_marker() {
        let session = session(resolver());
        session.search("Nowhere12345xyz").await;
        assert!(session.snapshot().await.marker.is_none());
        assert_eq!(session.take_alerts().await.len(), 1);
    }

    #[tokio::test]
    async fn test_search_hit_pans_and_looks_up() {
        let session = session(FakeResolver {
            search_hit: Some(NAIROBI),
            ..resolver()
        });
        assert_eq!(session.search("Nairobi").await, LookupOutcome::Completed);

        let snapshot = session.snapshot().await;
        assert_eq!(snapshot.view.center, NAIROBI);
        assert_eq!(snapshot.view.zoom, SEARCH_ZOOM);
        assert_eq!(snapshot.marker.unwrap().position, NAIROBI);
        assert_eq!(snapshot.display.country, "Kenya");
        assert_eq!(snapshot.display.zipcode, SENTINEL);
        assert_eq!(snapshot.display.flag, Flag::Hidden);
    }

    #[tokio::test]
    async fn test_empty_search_is_ignored() {
        let session = session(resolver());
        assert_eq!(session.search("").await, LookupOutcome::Skipped);
        assert!(session.take_alerts().await.is_empty());
        assert_eq!(session.snapshot().await.latest_lookup, 0);
    }

    #[tokio::test]
    async fn test_search_error_alerts() {
        let session = session(FakeResolver {
            fail_search: true,
            ..resolver()
        });
        assert_eq!(session.search("Paris").await, LookupOutcome::Failed);
        assert_eq!(session.take_alerts().await, vec![Alert::new(SEARCH_FAILED)]);
        assert!(session.snapshot().await.marker.is_none());
    }

    #[tokio::test]
    async fn test_narration_failure_is_silent() {
        let session = LookupSession::new(
            resolver(),
            FakeEnricher::default(),
            FakeNarrator {
                fail: true,
                ..Default::default()
            },
            CommitPolicy::LatestOnly,
        );
        assert_eq!(session.click(PARIS).await, LookupOutcome::Completed);

        let display = session.snapshot().await.display;
        assert_eq!(display.country, "France");
        assert_eq!(display.city, "Paris");
        assert_eq!(display.currency, "Euro");
        assert_eq!(display.fact, SENTINEL);
        assert!(session.take_alerts().await.is_empty());
    }

    #[tokio::test]
    async fn test_geocode_failure_alerts_and_keeps_partial_state() {
        let session = session(FakeResolver {
            fail_reverse: true,
            ..resolver()
        });
        assert_eq!(session.click(PARIS).await, LookupOutcome::Failed);

        let snapshot = session.snapshot().await;
        assert_eq!(snapshot.display, DisplayState::default());
        assert_eq!(snapshot.marker.unwrap().position, PARIS);
        assert_eq!(session.take_alerts().await, vec![Alert::new(FETCH_FAILED)]);
        assert!(session.narrator.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_enrichment_failure_leaves_address_fields() {
        let session = LookupSession::new(
            resolver(),
            FakeEnricher {
                fail: true,
                ..Default::default()
            },
            FakeNarrator::default(),
            CommitPolicy::LatestOnly,
        );
        assert_eq!(session.click(PARIS).await, LookupOutcome::Failed);

        let display = session.snapshot().await.display;
        assert_eq!(display.country, "France");
        assert_eq!(display.population, SENTINEL);
        assert_eq!(display.fact, SENTINEL);
        assert_eq!(session.take_alerts().await, vec![Alert::new(FETCH_FAILED)]);
        assert!(session.narrator.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_fact_reset_before_network_response() {
        let gate = Arc::new(Gate::default());
        let session = Arc::new(session(FakeResolver {
            gate: Some((NAIROBI, gate.clone())),
            ..resolver()
        }));
        session.click(PARIS).await;
        assert_ne!(session.snapshot().await.display.fact, SENTINEL);

        let pending = tokio::spawn({
            let session = session.clone();
            async move { session.click(NAIROBI).await }
        });
        gate.entered.notified().await;

        let snapshot = session.snapshot().await;
        assert_eq!(snapshot.display.fact, SENTINEL);
        assert_eq!(snapshot.display.country, "France");
        assert_eq!(snapshot.marker.unwrap().position, NAIROBI);

        gate.release.notify_one();
        assert_eq!(pending.await.unwrap(), LookupOutcome::Completed);
        assert_eq!(session.snapshot().await.display.country, "Kenya");
    }

    async fn overlapping_lookups(policy: CommitPolicy) -> (TestSession, LookupOutcome) {
        let gate = Arc::new(Gate::default());
        let session = Arc::new(LookupSession::new(
            FakeResolver {
                gate: Some((NAIROBI, gate.clone())),
                ..resolver()
            },
            FakeEnricher::default(),
            FakeNarrator::default(),
            policy,
        ));

        let slow = tokio::spawn({
            let session = session.clone();
            async move { session.click(NAIROBI).await }
        });
        gate.entered.notified().await;

        assert_eq!(session.click(PARIS).await, LookupOutcome::Completed);
        gate.release.notify_one();
        let outcome = slow.await.unwrap();

        let session = Arc::try_unwrap(session).ok().unwrap();
        (session, outcome)
    }

    #[tokio::test]
    async fn test_stale_lookup_discarded() {
        let (session, outcome) = overlapping_lookups(CommitPolicy::LatestOnly).await;
        assert_eq!(outcome, LookupOutcome::Superseded);

        let snapshot = session.snapshot().await;
        assert_eq!(snapshot.display.country, "France");
        assert_eq!(snapshot.display.fact, "Paris is the capital of France.");
        assert_eq!(snapshot.marker.unwrap().position, PARIS);
        assert_eq!(*session.enricher.calls.lock().unwrap(), vec!["fr"]);
    }

    #[tokio::test]
    async fn test_last_write_wins() {
        let (session, outcome) = overlapping_lookups(CommitPolicy::LastWriteWins).await;
        assert_eq!(outcome, LookupOutcome::Completed);

        let snapshot = session.snapshot().await;
        assert_eq!(snapshot.display.country, "Kenya");
        assert_eq!(snapshot.display.fact, "Nairobi is the capital of Kenya.");
        // The marker follows the last trigger, not the last write.
        assert_eq!(snapshot.marker.unwrap().position, PARIS);
    }

    #[test]
    fn test_commit_policy_parse() {
        assert_eq!(CommitPolicy::parse("latest"), Some(CommitPolicy::LatestOnly));
        assert_eq!(
            CommitPolicy::parse(" Last-Write-Wins "),
            Some(CommitPolicy::LastWriteWins)
        );
        assert_eq!(CommitPolicy::parse("sometimes"), None);
        assert_eq!(CommitPolicy::default(), CommitPolicy::LatestOnly);
    }
}
