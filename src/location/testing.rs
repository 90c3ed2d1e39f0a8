//! Scripted in-memory geography source for tests.

use super::providers::GeographySource;
use super::search::normalize;
use super::types::{Country, LocationError};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

type Scripted = Result<Vec<String>, LocationError>;

pub(crate) struct FakeGeography {
    countries: Mutex<Result<Vec<Country>, LocationError>>,
    provinces: Mutex<HashMap<String, Scripted>>,
    cities: Mutex<HashMap<(String, String), Scripted>>,
    pub country_calls: AtomicUsize,
    pub province_calls: AtomicUsize,
    pub city_calls: AtomicUsize,
}

impl FakeGeography {
    pub fn new() -> Self {
        Self {
            countries: Mutex::new(Ok(Vec::new())),
            provinces: Mutex::new(HashMap::new()),
            cities: Mutex::new(HashMap::new()),
            country_calls: AtomicUsize::new(0),
            province_calls: AtomicUsize::new(0),
            city_calls: AtomicUsize::new(0),
        }
    }

    /// South Africa and Namibia, with Namibia's province lookup failing.
    pub fn southern_africa() -> Self {
        Self::new()
            .with_countries(&[("South Africa", "ZA", "ZAF"), ("Namibia", "NA", "NAM"), ("Atlantis", "AT", "ATL")])
            .with_provinces("South Africa", &["Western Cape", "Gauteng", "KwaZulu-Natal"])
            .with_provinces_error("Namibia", LocationError::Request("connection reset".into()))
            .with_provinces_error("Atlantis", LocationError::Timeout)
            .with_cities("South Africa", "Western Cape", &["Cape Town", "George", "Paarl", "Stellenbosch"])
            .with_cities("South Africa", "Gauteng", &["Johannesburg", "Pretoria"])
            .with_cities("Namibia", "Khomas", &["Windhoek"])
    }

    pub fn with_countries(self, list: &[(&str, &str, &str)]) -> Self {
        self.set_countries(Ok(list.iter().map(|(n, a2, a3)| Country::new(*n, *a2, *a3)).collect()));
        self
    }

    pub fn with_provinces(self, country: &str, list: &[&str]) -> Self {
        self.provinces.lock().insert(normalize(country), Ok(strings(list)));
        self
    }

    pub fn with_provinces_error(self, country: &str, err: LocationError) -> Self {
        self.provinces.lock().insert(normalize(country), Err(err));
        self
    }

    pub fn with_cities(self, country: &str, province: &str, list: &[&str]) -> Self {
        self.set_cities(country, province, Ok(strings(list)));
        self
    }

    pub fn set_countries(&self, result: Result<Vec<Country>, LocationError>) {
        *self.countries.lock() = result;
    }

    pub fn set_cities(&self, country: &str, province: &str, result: Scripted) {
        self.cities.lock().insert((normalize(country), normalize(province)), result);
    }

    pub fn calls(&self) -> (usize, usize, usize) {
        (
            self.country_calls.load(Ordering::SeqCst),
            self.province_calls.load(Ordering::SeqCst),
            self.city_calls.load(Ordering::SeqCst),
        )
    }
}

fn strings(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

#[async_trait]
impl GeographySource for FakeGeography {
    async fn fetch_countries(&self) -> Result<Vec<Country>, LocationError> {
        self.country_calls.fetch_add(1, Ordering::SeqCst);
        self.countries.lock().clone()
    }

    async fn fetch_provinces(&self, country: &str) -> Result<Vec<String>, LocationError> {
        self.province_calls.fetch_add(1, Ordering::SeqCst);
        self.provinces
            .lock()
            .get(&normalize(country))
            .cloned()
            .unwrap_or_else(|| Err(LocationError::Request("country not found".into())))
    }

    async fn fetch_cities(&self, country: &str, province: &str) -> Result<Vec<String>, LocationError> {
        self.city_calls.fetch_add(1, Ordering::SeqCst);
        self.cities
            .lock()
            .get(&(normalize(country), normalize(province)))
            .cloned()
            .unwrap_or_else(|| Err(LocationError::Request("state not found".into())))
    }
}
