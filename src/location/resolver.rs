//! Resolver session: drives the selection state machine against the
//! geography source.
//!
//! Data flow per step:  cache → coordinator (one fetch per key) → source,
//! with the built-in province table as the only degraded-mode fallback.

use super::coordinator::FetchCoordinator;
use super::providers::{fallback_provinces, GeographySource};
use super::search::{dedupe_names, exclude_origin, filter_candidates, find_name, same_name, tidy_countries};
use super::state::{Choice, SelectionState};
use super::types::{CacheKey, CachedList, Country, LocationError, Selection, SessionOptions, Step};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

pub const COUNTRIES_UNAVAILABLE: &str = "Unable to load countries right now.";
pub const PROVINCES_UNAVAILABLE: &str = "Unable to load provinces right now.";
pub const PROVINCES_LIMITED: &str = "Showing a limited set of provinces for now.";
pub const CITIES_UNAVAILABLE: &str = "Unable to load cities right now.";

/// Serializable snapshot of a session for the CLI and HTTP API.
#[derive(Debug, Clone, Serialize)]
pub struct SessionView {
    pub step: Step,
    pub selected_country: Option<Country>,
    pub selected_province: Option<String>,
    pub search_query: String,
    pub last_error: Option<String>,
    /// Candidates for the current step after search filtering.
    pub candidates: Vec<String>,
    /// Candidates before search filtering.
    pub total_candidates: usize,
    pub using_fallback: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub selection: Option<Selection>,
}

/// One open-to-close run of the location picker.
pub struct ResolverSession<S> {
    source: Arc<S>,
    coordinator: Arc<FetchCoordinator>,
    options: SessionOptions,
    state: SelectionState,
    country_hint: Option<String>,
    province_hint: Option<String>,
    /// Province list served from the built-in table after a failed lookup.
    /// Never written to the cache, so the next lookup retries the source.
    fallback: Option<Vec<String>>,
}

impl<S: GeographySource + 'static> ResolverSession<S> {
    pub fn new(source: Arc<S>, coordinator: Arc<FetchCoordinator>, options: SessionOptions) -> Self {
        Self {
            country_hint: options.initial_country.clone(),
            province_hint: options.initial_province.clone(),
            source,
            coordinator,
            options,
            state: SelectionState::new(),
            fallback: None,
        }
    }

    /// Create a session and load the first step (applying any hints).
    pub async fn open(source: Arc<S>, coordinator: Arc<FetchCoordinator>, options: SessionOptions) -> Self {
        let mut session = Self::new(source, coordinator, options);
        session.sync().await;
        session
    }

    pub fn state(&self) -> &SelectionState {
        &self.state
    }

    pub fn step(&self) -> Step {
        self.state.step
    }

    pub fn options(&self) -> &SessionOptions {
        &self.options
    }

    pub fn is_using_fallback(&self) -> bool {
        self.state.step == Step::Province && self.fallback.is_some()
    }

    pub fn selection(&self) -> Option<Selection> {
        self.state.selection()
    }

    /// Load whatever the current step needs, fast-forwarding through hints
    /// as their lists become available. Fetch failures end up in
    /// `last_error`; nothing is returned to the caller.
    pub async fn sync(&mut self) {
        loop {
            match self.state.step {
                Step::Country => {
                    if !self.load_countries().await {
                        return;
                    }
                    let Some(hint) = self.country_hint.take() else { return };
                    match self.countries().into_iter().find(|c| same_name(&c.name, &hint)) {
                        Some(country) => {
                            debug!(country = %country.name, "fast-forward from country hint");
                            if self.state.advance(Choice::Country(country)).is_err() {
                                return;
                            }
                        }
                        None => {
                            debug!(hint = %hint, "country hint not in list");
                            self.province_hint = None;
                            return;
                        }
                    }
                }
                Step::Province => {
                    if !self.load_provinces().await {
                        return;
                    }
                    let Some(hint) = self.province_hint.take() else { return };
                    match find_name(&self.province_list(), &hint).cloned() {
                        Some(province) => {
                            debug!(province = %province, "fast-forward from province hint");
                            if self.state.advance(Choice::Province(province)).is_err() {
                                return;
                            }
                        }
                        None => {
                            debug!(hint = %hint, "province hint not in list");
                            return;
                        }
                    }
                }
                Step::City => {
                    self.load_cities().await;
                    return;
                }
                Step::Selected => return,
            }
        }
    }

    /// Re-attempt the current step's lookup. Failed lookups are never
    /// cached, so this reaches the source again.
    pub async fn retry(&mut self) {
        if self.state.step == Step::Province {
            self.fallback = None;
        }
        self.sync().await;
    }

    /// Choose `name` for the current step. Matching ignores case and
    /// surrounding whitespace. Returns the final selection once a city is
    /// chosen.
    pub async fn select(&mut self, name: &str) -> Result<Option<Selection>, LocationError> {
        let step = self.state.step;
        let unknown = || LocationError::UnknownChoice { step, name: name.trim().to_string() };
        let choice = match step {
            Step::Country => {
                let country = self
                    .countries()
                    .into_iter()
                    .find(|c| same_name(&c.name, name))
                    .ok_or_else(unknown)?;
                Choice::Country(country)
            }
            Step::Province => {
                let province = find_name(&self.province_list(), name).cloned().ok_or_else(unknown)?;
                Choice::Province(province)
            }
            Step::City => {
                let city = find_name(&self.city_list(), name).cloned().ok_or_else(unknown)?;
                Choice::City(city)
            }
            Step::Selected => return Err(LocationError::InvalidTransition { step }),
        };

        // An explicit choice overrides whatever the caller hinted.
        self.country_hint = None;
        self.province_hint = None;
        if step == Step::Country {
            self.fallback = None;
        }

        if let Some(selection) = self.state.advance(choice)? {
            info!(city = %selection.city, province = %selection.province, country = %selection.country, "location selected");
            return Ok(Some(selection));
        }
        self.sync().await;
        Ok(None)
    }

    /// Go back one step. Cached data for the parent step is reused.
    pub async fn back(&mut self) -> bool {
        if !self.state.back() {
            return false;
        }
        self.country_hint = None;
        self.province_hint = None;
        if self.state.step == Step::Country {
            self.fallback = None;
        }
        if !self.step_data_ready() {
            self.sync().await;
        }
        true
    }

    pub fn set_search(&mut self, query: impl Into<String>) {
        self.state.set_search(query);
    }

    /// End the session: selections, search and errors are cleared and the
    /// hints re-armed. The shared cache is left alone.
    pub fn close(&mut self) {
        self.state.reset();
        self.fallback = None;
        self.country_hint = self.options.initial_country.clone();
        self.province_hint = self.options.initial_province.clone();
    }

    /// Every candidate for the current step (origin city excluded), before
    /// search filtering.
    pub fn all_candidates(&self) -> Vec<String> {
        match self.state.step {
            Step::Country => self.countries().into_iter().map(|c| c.name).collect(),
            Step::Province => self.province_list(),
            Step::City => self.city_list(),
            Step::Selected => Vec::new(),
        }
    }

    /// Candidates for the current step narrowed by the search query.
    pub fn candidates(&self) -> Vec<String> {
        filter_candidates(&self.all_candidates(), &self.state.search_query)
    }

    pub fn view(&self) -> SessionView {
        let all = self.all_candidates();
        SessionView {
            step: self.state.step,
            selected_country: self.state.selected_country.clone(),
            selected_province: self.state.selected_province.clone(),
            search_query: self.state.search_query.clone(),
            last_error: self.state.last_error.clone(),
            candidates: filter_candidates(&all, &self.state.search_query),
            total_candidates: all.len(),
            using_fallback: self.is_using_fallback(),
            selection: self.state.selection(),
        }
    }

    // ─── Data access ────────────────────────────────────────────

    fn countries(&self) -> Vec<Country> {
        self.coordinator.cache().countries().unwrap_or_default()
    }

    fn province_list(&self) -> Vec<String> {
        let Some(country) = &self.state.selected_country else {
            return Vec::new();
        };
        self.coordinator
            .cache()
            .names(&CacheKey::provinces(&country.name))
            .or_else(|| self.fallback.clone())
            .unwrap_or_default()
    }

    fn city_list(&self) -> Vec<String> {
        let (Some(country), Some(province)) = (&self.state.selected_country, &self.state.selected_province) else {
            return Vec::new();
        };
        let cities = self
            .coordinator
            .cache()
            .names(&CacheKey::cities(&country.name, province))
            .unwrap_or_default();
        exclude_origin(cities, self.options.origin_city.as_deref())
    }

    fn step_data_ready(&self) -> bool {
        let cache = self.coordinator.cache();
        match (&self.state.step, &self.state.selected_country, &self.state.selected_province) {
            (Step::Country, _, _) => cache.has(&CacheKey::countries()),
            (Step::Province, Some(c), _) => self.fallback.is_some() || cache.has(&CacheKey::provinces(&c.name)),
            (Step::City, Some(c), Some(p)) => cache.has(&CacheKey::cities(&c.name, p)),
            _ => false,
        }
    }

    // ─── Loading ────────────────────────────────────────────────

    async fn load_countries(&mut self) -> bool {
        let source = Arc::clone(&self.source);
        let result = self
            .coordinator
            .ensure(&CacheKey::countries(), move || async move {
                let countries = source.fetch_countries().await?;
                Ok::<_, LocationError>(CachedList::Countries(tidy_countries(countries)))
            })
            .await;
        self.settle(result, COUNTRIES_UNAVAILABLE)
    }

    async fn load_provinces(&mut self) -> bool {
        let Some(country) = self.state.selected_country.as_ref().map(|c| c.name.clone()) else {
            return false;
        };
        if self.fallback.is_some() {
            return true;
        }
        let source = Arc::clone(&self.source);
        let name = country.clone();
        let result = self
            .coordinator
            .ensure(&CacheKey::provinces(&country), move || async move {
                let provinces = source.fetch_provinces(&name).await?;
                Ok::<_, LocationError>(CachedList::Names(dedupe_names(provinces)))
            })
            .await;

        let Err(err) = result else {
            self.state.set_error(None);
            return true;
        };
        let fallback = fallback_provinces(&country);
        if fallback.is_empty() {
            warn!(country = %country, error = %err, "province lookup failed, no fallback");
            self.state.set_error(Some(PROVINCES_UNAVAILABLE.to_string()));
            false
        } else {
            warn!(country = %country, error = %err, count = fallback.len(), "province lookup failed, using built-in list");
            self.fallback = Some(fallback);
            self.state.set_error(Some(PROVINCES_LIMITED.to_string()));
            true
        }
    }

    async fn load_cities(&mut self) -> bool {
        let (Some(country), Some(province)) = (
            self.state.selected_country.as_ref().map(|c| c.name.clone()),
            self.state.selected_province.clone(),
        ) else {
            return false;
        };
        let source = Arc::clone(&self.source);
        let key = CacheKey::cities(&country, &province);
        let result = self
            .coordinator
            .ensure(&key, move || async move {
                let cities = source.fetch_cities(&country, &province).await?;
                Ok::<_, LocationError>(CachedList::Names(dedupe_names(cities)))
            })
            .await;
        self.settle(result, CITIES_UNAVAILABLE)
    }

    fn settle(&mut self, result: Result<(), LocationError>, message: &str) -> bool {
        match result {
            Ok(()) => {
                self.state.set_error(None);
                true
            }
            Err(err) => {
                warn!(step = %self.state.step, error = %err, "lookup failed");
                self.state.set_error(Some(message.to_string()));
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::location::cache::ResultCache;
    use crate::location::testing::FakeGeography;

    fn shared() -> (Arc<FakeGeography>, Arc<FetchCoordinator>) {
        (
            Arc::new(FakeGeography::southern_africa()),
            Arc::new(FetchCoordinator::new(Arc::new(ResultCache::new()))),
        )
    }

    async fn open(options: SessionOptions) -> (ResolverSession<FakeGeography>, Arc<FakeGeography>) {
        let (source, coord) = shared();
        let session = ResolverSession::open(Arc::clone(&source), coord, options).await;
        (session, source)
    }

    #[tokio::test]
    async fn test_happy_path() {
        let (mut s, source) = open(SessionOptions::default()).await;
        assert_eq!(s.step(), Step::Country);
        assert_eq!(s.candidates(), vec!["Atlantis", "Namibia", "South Africa"]);

        assert_eq!(s.select("South Africa").await.unwrap(), None);
        assert_eq!(s.step(), Step::Province);
        assert_eq!(s.candidates(), vec!["Western Cape", "Gauteng", "KwaZulu-Natal"]);

        assert_eq!(s.select("Western Cape").await.unwrap(), None);
        assert_eq!(s.step(), Step::City);
        assert!(s.candidates().contains(&"Stellenbosch".to_string()));

        let selection = s.select("Cape Town").await.unwrap().unwrap();
        assert_eq!(selection, Selection {
            city: "Cape Town".into(),
            country: "South Africa".into(),
            province: "Western Cape".into(),
        });
        assert_eq!(s.step(), Step::Selected);
        assert!(s.state().last_error.is_none());
        assert_eq!(source.calls(), (1, 1, 1));
    }

    #[tokio::test]
    async fn test_select_is_case_insensitive() {
        let (mut s, _) = open(SessionOptions::default()).await;
        s.select("  south AFRICA ").await.unwrap();
        assert_eq!(s.state().selected_country.as_ref().unwrap().name, "South Africa");
    }

    #[tokio::test]
    async fn test_unknown_choice() {
        let (mut s, _) = open(SessionOptions::default()).await;
        let err = s.select("Narnia").await.unwrap_err();
        assert_eq!(err, LocationError::UnknownChoice { step: Step::Country, name: "Narnia".into() });
        assert_eq!(s.step(), Step::Country);
    }

    #[tokio::test]
    async fn test_fallback_provinces() {
        let (mut s, source) = open(SessionOptions::default()).await;
        s.select("Namibia").await.unwrap();
        assert_eq!(s.step(), Step::Province);
        assert_eq!(s.candidates(), vec!["Khomas", "Erongo"]);
        assert_eq!(s.state().last_error.as_deref(), Some(PROVINCES_LIMITED));
        assert!(s.is_using_fallback());
        assert!(!s.coordinator.cache().has(&CacheKey::provinces("Namibia")));

        // Still usable: search and drill down
        s.set_search("kho");
        assert_eq!(s.candidates(), vec!["Khomas"]);
        s.select("Khomas").await.unwrap();
        assert_eq!(s.step(), Step::City);
        assert_eq!(s.candidates(), vec!["Windhoek"]);
        assert_eq!(source.calls().1, 1);
    }

    #[tokio::test]
    async fn test_province_failure_without_fallback() {
        let (mut s, _) = open(SessionOptions::default()).await;
        s.select("Atlantis").await.unwrap();
        assert_eq!(s.step(), Step::Province);
        assert!(s.candidates().is_empty());
        assert_eq!(s.state().last_error.as_deref(), Some(PROVINCES_UNAVAILABLE));
        assert!(!s.is_using_fallback());
    }

    #[tokio::test]
    async fn test_hint_fast_forward() {
        let options = SessionOptions {
            initial_country: Some("south africa".into()),
            initial_province: Some(" GAUTENG".into()),
            ..Default::default()
        };
        let (s, source) = open(options).await;
        assert_eq!(s.step(), Step::City);
        assert_eq!(s.state().selected_country.as_ref().unwrap().name, "South Africa");
        assert_eq!(s.state().selected_province.as_deref(), Some("Gauteng"));
        assert_eq!(s.candidates(), vec!["Johannesburg", "Pretoria"]);
        assert_eq!(source.calls(), (1, 1, 1));
    }

    #[tokio::test]
    async fn test_country_hint_only() {
        let options = SessionOptions {
            initial_country: Some("SOUTH AFRICA".into()),
            ..Default::default()
        };
        let (s, _) = open(options).await;
        assert_eq!(s.step(), Step::Province);
    }

    #[tokio::test]
    async fn test_unmatched_hint_stays_put() {
        let options = SessionOptions {
            initial_country: Some("Narnia".into()),
            initial_province: Some("Gauteng".into()),
            ..Default::default()
        };
        let (mut s, _) = open(options).await;
        assert_eq!(s.step(), Step::Country);
        // The province hint is dropped along with the country hint.
        s.select("South Africa").await.unwrap();
        assert_eq!(s.step(), Step::Province);
    }

    #[tokio::test]
    async fn test_province_hint_against_fallback() {
        let options = SessionOptions {
            initial_country: Some("Namibia".into()),
            initial_province: Some("khomas".into()),
            ..Default::default()
        };
        let (s, _) = open(options).await;
        assert_eq!(s.step(), Step::City);
        assert_eq!(s.state().selected_province.as_deref(), Some("Khomas"));
    }

    #[tokio::test]
    async fn test_search_filtering() {
        let (source, coord) = shared();
        source.set_cities("South Africa", "Western Cape", Ok(vec!["Cape Town".into(), "George".into(), "Paarl".into()]));
        let mut s = ResolverSession::open(source, coord, SessionOptions::default()).await;
        s.select("South Africa").await.unwrap();
        s.select("Western Cape").await.unwrap();
        s.set_search("ca");
        assert_eq!(s.candidates(), vec!["Cape Town"]);
        let view = s.view();
        assert_eq!(view.total_candidates, 3);
        assert_eq!(view.search_query, "ca");
        s.set_search("  ");
        assert_eq!(s.candidates().len(), 3);
    }

    #[tokio::test]
    async fn test_origin_city_excluded() {
        let options = SessionOptions {
            origin_city: Some("cape TOWN ".into()),
            ..Default::default()
        };
        let (mut s, _) = open(options).await;
        s.select("South Africa").await.unwrap();
        s.select("Western Cape").await.unwrap();
        assert!(!s.candidates().iter().any(|c| c == "Cape Town"));
        assert_eq!(s.candidates(), vec!["George", "Paarl", "Stellenbosch"]);
        let err = s.select("Cape Town").await.unwrap_err();
        assert!(matches!(err, LocationError::UnknownChoice { step: Step::City, .. }));
    }

    #[tokio::test]
    async fn test_back_reuses_cache() {
        let (mut s, source) = open(SessionOptions::default()).await;
        s.select("South Africa").await.unwrap();
        s.select("Western Cape").await.unwrap();
        s.set_search("pa");
        assert!(s.back().await);
        assert_eq!(s.step(), Step::Province);
        assert!(s.state().selected_province.is_none());
        assert!(s.state().search_query.is_empty());
        assert!(s.state().last_error.is_none());
        assert_eq!(s.candidates(), vec!["Western Cape", "Gauteng", "KwaZulu-Natal"]);

        assert!(s.back().await);
        assert_eq!(s.step(), Step::Country);
        assert!(!s.back().await);
        assert_eq!(source.calls(), (1, 1, 1));
    }

    #[tokio::test]
    async fn test_back_keeps_fallback() {
        let (mut s, source) = open(SessionOptions::default()).await;
        s.select("Namibia").await.unwrap();
        s.select("Khomas").await.unwrap();
        assert!(s.back().await);
        assert_eq!(s.candidates(), vec!["Khomas", "Erongo"]);
        assert_eq!(source.calls().1, 1);
    }

    #[tokio::test]
    async fn test_country_failure_then_retry() {
        let (source, coord) = shared();
        source.set_countries(Err(LocationError::Timeout));
        let mut s = ResolverSession::open(Arc::clone(&source), coord, SessionOptions::default()).await;
        assert_eq!(s.step(), Step::Country);
        assert_eq!(s.state().last_error.as_deref(), Some(COUNTRIES_UNAVAILABLE));
        assert!(s.candidates().is_empty());

        source.set_countries(Ok(vec![Country::new("Namibia", "NA", "NAM")]));
        s.retry().await;
        assert!(s.state().last_error.is_none());
        assert_eq!(s.candidates(), vec!["Namibia"]);
        assert_eq!(source.calls().0, 2);
    }

    #[tokio::test]
    async fn test_city_failure() {
        let (mut s, _) = open(SessionOptions::default()).await;
        s.select("South Africa").await.unwrap();
        s.select("KwaZulu-Natal").await.unwrap();
        assert_eq!(s.step(), Step::City);
        assert_eq!(s.state().last_error.as_deref(), Some(CITIES_UNAVAILABLE));
        assert!(s.candidates().is_empty());
    }

    #[tokio::test]
    async fn test_close_resets_but_keeps_cache() {
        let (source, coord) = shared();
        let mut s = ResolverSession::open(Arc::clone(&source), Arc::clone(&coord), SessionOptions::default()).await;
        s.select("South Africa").await.unwrap();
        s.set_search("gau");
        s.close();
        assert_eq!(s.state(), &SelectionState::new());

        let other = ResolverSession::open(Arc::clone(&source), coord, SessionOptions::default()).await;
        assert_eq!(other.step(), Step::Country);
        assert_eq!(other.candidates().len(), 3);
        assert_eq!(source.calls().0, 1);
    }

    #[tokio::test]
    async fn test_select_after_done() {
        let (mut s, _) = open(SessionOptions::default()).await;
        s.select("South Africa").await.unwrap();
        s.select("Gauteng").await.unwrap();
        s.select("Pretoria").await.unwrap();
        assert_eq!(
            s.select("Pretoria").await.unwrap_err(),
            LocationError::InvalidTransition { step: Step::Selected }
        );
        assert!(s.view().selection.is_some());
        assert!(s.candidates().is_empty());
    }

    #[tokio::test]
    async fn test_any_source_gets_sorted_unique_lists() {
        let source = Arc::new(
            FakeGeography::new()
                .with_countries(&[("Zambia", "ZM", "ZMB"), ("botswana", "BW", "BWA"), ("Angola", "AO", "AGO"), ("BOTSWANA ", "", "")])
                .with_provinces("Zambia", &["Lusaka", "Copperbelt", "lusaka", " "]),
        );
        let coord = Arc::new(FetchCoordinator::new(Arc::new(ResultCache::new())));
        let mut s = ResolverSession::open(source, coord, SessionOptions::default()).await;
        assert_eq!(s.candidates(), vec!["Angola", "botswana", "Zambia"]);

        s.select("ZAMBIA").await.unwrap();
        assert_eq!(s.candidates(), vec!["Lusaka", "Copperbelt"]);
    }

    #[tokio::test]
    async fn test_empty_province_list_is_not_a_failure() {
        let source = Arc::new(
            FakeGeography::new()
                .with_countries(&[("Namibia", "NA", "NAM")])
                .with_provinces("Namibia", &[]),
        );
        let coord = Arc::new(FetchCoordinator::new(Arc::new(ResultCache::new())));
        let options = SessionOptions { initial_country: Some("Namibia".into()), ..Default::default() };
        let s = ResolverSession::open(source, coord, options).await;
        assert_eq!(s.step(), Step::Province);
        assert!(s.candidates().is_empty());
        assert!(!s.is_using_fallback());
        assert!(s.state().last_error.is_none());
    }
}
