//! Geography providers: the remote countries API and the built-in province
//! fallback table.

use super::search::{dedupe_names, normalize, tidy_countries};
use super::types::{Country, LocationError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Default request timeout for a single lookup.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Extra time the async wrapper allows past the agent timeout before it
/// gives up on the blocking task itself.
const TIMEOUT_GRACE: Duration = Duration::from_secs(2);

// ─── Built-in fallback dataset ──────────────────────────────────

struct FallbackRecord {
    country: &'static str,
    provinces: &'static [&'static str],
}

const FALLBACK_PROVINCES: &[FallbackRecord] = &[
    FallbackRecord {
        country: "South Africa",
        provinces: &[
            "Eastern Cape", "Free State", "Gauteng", "KwaZulu-Natal", "Limpopo",
            "Mpumalanga", "North West", "Northern Cape", "Western Cape",
        ],
    },
    FallbackRecord {
        country: "Namibia",
        provinces: &["Khomas", "Erongo"],
    },
    FallbackRecord {
        country: "Botswana",
        provinces: &["Central", "Kgatleng", "Kweneng", "North-East", "North-West", "South-East", "Southern"],
    },
    FallbackRecord {
        country: "Zimbabwe",
        provinces: &[
            "Bulawayo", "Harare", "Manicaland", "Mashonaland Central", "Mashonaland East",
            "Mashonaland West", "Masvingo", "Matabeleland North", "Matabeleland South", "Midlands",
        ],
    },
    FallbackRecord {
        country: "Lesotho",
        provinces: &["Berea", "Butha-Buthe", "Leribe", "Mafeteng", "Maseru", "Mohale's Hoek", "Quthing"],
    },
    FallbackRecord {
        country: "Eswatini",
        provinces: &["Hhohho", "Lubombo", "Manzini", "Shiselweni"],
    },
    FallbackRecord {
        country: "Mozambique",
        provinces: &["Cabo Delgado", "Gaza", "Inhambane", "Manica", "Maputo", "Nampula", "Niassa", "Sofala", "Tete", "Zambezia"],
    },
    FallbackRecord {
        country: "Kenya",
        provinces: &["Mombasa", "Nairobi", "Nakuru", "Kisumu", "Kiambu", "Machakos"],
    },
    FallbackRecord {
        country: "Nigeria",
        provinces: &["Abuja Federal Capital Territory", "Kano", "Lagos", "Oyo", "Rivers"],
    },
    FallbackRecord {
        country: "United Kingdom",
        provinces: &["England", "Northern Ireland", "Scotland", "Wales"],
    },
];

/// Look up the bundled province list for a country. Matching is
/// case-insensitive and ignores surrounding whitespace; an unknown country
/// yields an empty list.
pub fn fallback_provinces(country: &str) -> Vec<String> {
    let wanted = normalize(country);
    FALLBACK_PROVINCES
        .iter()
        .find(|r| normalize(r.country) == wanted)
        .map(|r| r.provinces.iter().map(|p| p.to_string()).collect())
        .unwrap_or_default()
}

/// A fallback table entry for the public API.
#[derive(Debug, Clone, Serialize)]
pub struct FallbackInfo {
    pub country: String,
    pub provinces: Vec<String>,
}

/// Return the whole built-in fallback table.
pub fn fallback_records() -> Vec<FallbackInfo> {
    FALLBACK_PROVINCES
        .iter()
        .map(|r| FallbackInfo {
            country: r.country.to_string(),
            provinces: r.provinces.iter().map(|p| p.to_string()).collect(),
        })
        .collect()
}

// ─── Source trait ───────────────────────────────────────────────

/// The three remote lookups the resolver needs.
#[async_trait]
pub trait GeographySource: Send + Sync {
    async fn fetch_countries(&self) -> Result<Vec<Country>, LocationError>;
    async fn fetch_provinces(&self, country: &str) -> Result<Vec<String>, LocationError>;
    async fn fetch_cities(&self, country: &str, province: &str) -> Result<Vec<String>, LocationError>;
}

#[async_trait]
impl<S: GeographySource + ?Sized> GeographySource for Arc<S> {
    async fn fetch_countries(&self) -> Result<Vec<Country>, LocationError> {
        (**self).fetch_countries().await
    }

    async fn fetch_provinces(&self, country: &str) -> Result<Vec<String>, LocationError> {
        (**self).fetch_provinces(country).await
    }

    async fn fetch_cities(&self, country: &str, province: &str) -> Result<Vec<String>, LocationError> {
        (**self).fetch_cities(country, province).await
    }
}

// ─── Wire format ────────────────────────────────────────────────

/// Every response is wrapped as `{ error, msg, data }`. Fields are kept as
/// raw JSON so a payload of the wrong shape degrades to an empty list
/// instead of failing the lookup.
#[derive(Deserialize, Debug, Default)]
struct Envelope {
    #[serde(default)]
    error: Value,
    #[serde(default)]
    msg: Value,
    #[serde(default)]
    data: Value,
}

impl Envelope {
    fn message(&self) -> Option<String> {
        self.msg
            .as_str()
            .map(str::trim)
            .filter(|m| !m.is_empty())
            .map(str::to_string)
    }

    /// Unwrap the payload, turning a response-level error flag into a failure.
    fn into_data(self) -> Result<Value, LocationError> {
        if self.error.as_bool().unwrap_or(false) {
            let msg = self
                .message()
                .unwrap_or_else(|| "geography API reported an error".to_string());
            return Err(LocationError::Request(msg));
        }
        Ok(self.data)
    }
}

/// Elements of `value` if it is an array, nothing otherwise.
fn items(value: &Value) -> &[Value] {
    value.as_array().map(Vec::as_slice).unwrap_or(&[])
}

fn str_field<'a>(record: &'a Value, key: &str) -> &'a str {
    record.get(key).and_then(Value::as_str).unwrap_or("")
}

fn countries_from(envelope: Envelope) -> Result<Vec<Country>, LocationError> {
    let data = envelope.into_data()?;
    let records = items(&data)
        .iter()
        .filter_map(|r| {
            let name = r.get("name").and_then(Value::as_str)?;
            Some(Country::new(name, str_field(r, "iso2"), str_field(r, "iso3")))
        })
        .collect();
    Ok(tidy_countries(records))
}

fn provinces_from(envelope: Envelope) -> Result<Vec<String>, LocationError> {
    let data = envelope.into_data()?;
    let states = data.get("states").map(items).unwrap_or(&[]);
    Ok(dedupe_names(states.iter().filter_map(|s| s.get("name").and_then(Value::as_str))))
}

fn cities_from(envelope: Envelope) -> Result<Vec<String>, LocationError> {
    let data = envelope.into_data()?;
    Ok(dedupe_names(items(&data).iter().filter_map(Value::as_str)))
}

// ─── HTTP provider ──────────────────────────────────────────────

/// Geography lookups over HTTP.
///
/// The agent is blocking; each call runs on tokio's blocking pool so
/// lookups for different keys proceed concurrently.
#[derive(Clone)]
pub struct HttpGeographyClient {
    agent: ureq::Agent,
    base_url: String,
    timeout: Duration,
}

impl HttpGeographyClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout(timeout)
            .user_agent(concat!("geocascade/", env!("CARGO_PKG_VERSION")))
            .build();
        Self {
            agent,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            timeout,
        }
    }

    pub fn from_config(config: &crate::config::Config) -> Self {
        Self::new(config.api_base_url.clone(), config.timeout())
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    async fn run<T, F>(&self, what: &'static str, call: F) -> Result<T, LocationError>
    where
        T: Send + 'static,
        F: FnOnce(ureq::Agent) -> Result<T, LocationError> + Send + 'static,
    {
        debug!(lookup = what, "geography request");
        let agent = self.agent.clone();
        let task = tokio::task::spawn_blocking(move || call(agent));
        match tokio::time::timeout(self.timeout + TIMEOUT_GRACE, task).await {
            Err(_) => Err(LocationError::Timeout),
            Ok(Err(join)) => Err(LocationError::Request(format!("{} lookup aborted: {}", what, join))),
            Ok(Ok(result)) => result,
        }
    }
}

#[async_trait]
impl GeographySource for HttpGeographyClient {
    async fn fetch_countries(&self) -> Result<Vec<Country>, LocationError> {
        let url = self.url("countries/positions");
        self.run("countries", move |agent| {
            let response = agent.get(&url).call().map_err(classify_error)?;
            countries_from(read_envelope(response)?)
        })
        .await
    }

    async fn fetch_provinces(&self, country: &str) -> Result<Vec<String>, LocationError> {
        let url = self.url("countries/states");
        let body = serde_json::json!({ "country": country });
        self.run("provinces", move |agent| {
            let response = agent.post(&url).send_json(body).map_err(classify_error)?;
            provinces_from(read_envelope(response)?)
        })
        .await
    }

    async fn fetch_cities(&self, country: &str, province: &str) -> Result<Vec<String>, LocationError> {
        let url = self.url("countries/state/cities");
        let body = serde_json::json!({ "country": country, "state": province });
        self.run("cities", move |agent| {
            let response = agent.post(&url).send_json(body).map_err(classify_error)?;
            cities_from(read_envelope(response)?)
        })
        .await
    }
}

fn read_envelope(response: ureq::Response) -> Result<Envelope, LocationError> {
    response
        .into_json()
        .map_err(|e| LocationError::InvalidResponse(e.to_string()))
}

/// Map a transport or status failure onto the resolver's error type,
/// keeping timeouts distinct.
fn classify_error(err: ureq::Error) -> LocationError {
    match err {
        ureq::Error::Status(code, response) => {
            let msg = response
                .into_json::<Envelope>()
                .ok()
                .and_then(|e| e.message());
            match msg {
                Some(m) => LocationError::Request(format!("HTTP {}: {}", code, m)),
                None => LocationError::Request(format!("HTTP {}", code)),
            }
        }
        ureq::Error::Transport(transport) => {
            if is_timeout(&transport) {
                LocationError::Timeout
            } else {
                LocationError::Request(transport.to_string())
            }
        }
    }
}

fn is_timeout(transport: &ureq::Transport) -> bool {
    let io_timeout = std::error::Error::source(transport)
        .and_then(|s| s.downcast_ref::<std::io::Error>())
        .map(|e| matches!(e.kind(), std::io::ErrorKind::TimedOut | std::io::ErrorKind::WouldBlock))
        .unwrap_or(false);
    io_timeout || transport.to_string().contains("timed out")
}
