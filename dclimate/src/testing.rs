use std::{
    collections::HashMap,
    str::FromStr,
    sync::atomic::{AtomicUsize, Ordering},
    time::{Duration, Instant},
};

use async_trait::async_trait;
use chrono::{DateTime, Duration as Days, TimeZone, Utc};
use cid::Cid;
use ndarray::{ArrayD, IxDyn};
use parking_lot::Mutex;
use serde_json::{json, Value};

use crate::{
    catalog::{Clock, Gateway, LookupItem, LookupService},
    dataset::{Coordinate, Dataset, Variable},
    errors::{Error, Result},
    store::ArrayStore,
};

pub(crate) const GATEWAY: &str = "https://gateway.test";
pub(crate) const CATALOG_ROOT: &str =
    "ipfs://bafkreicicneu2e36cyy3xiyb2wwkw3t3w6vhjtqrqxkfmvs66uoxg5txwi/catalog.json";

/// Real content identifiers (raw, sha2-256) to stand in for datasets in tests.
pub(crate) fn cid(name: &str) -> Cid {
    let text = match name {
        "era5-2m_temperature-finalized" => {
            "bafkreiflt6rindn3isuk2dztdoaso22lvk54yha3h5vz7j4omzw4yn23oq"
        }
        "era5-2m_temperature-non-finalized" => {
            "bafkreifonilaipaikhj3gov7scuhlfzio4446fvfgfljsuggnbil2xl63q"
        }
        "chirps-precip-final" => "bafkreicwhga4po3db4v7qywvwxg5flmtgna6q3t3h72mjkqkkptyvyga4u",
        "chirps-precip-prelim" => "bafkreigkjkn3kktozpz54t36wwqt23unficncb2gixsojuexjn6wycajxa",
        "explicit" => "bafkreib3fa7jhxv7anpjsdp44hzbi2chnxcxy2jrhrkxj5b22gqylbaco4",
        "legacy-cpc" => "bafkreia2ljmbfhg6xphsjxulf74ztaeziukxghbxri6erm3656tq3k5e4u",
        "root" => "bafkreicicneu2e36cyy3xiyb2wwkw3t3w6vhjtqrqxkfmvs66uoxg5txwi",
        "x1" => "bafkreihmgfuc7xswdelzkl7xrj5ivxx72d7lynzn2juhdelmi3ddaoa3iu",
        "x2" => "bafkreieej3gaqfsof2vsoy2ktlpodl5glgpfrflq44mxqtqibttup7aoiu",
        "x3" => "bafkreieejnu4jvkmyjslylnnw25xb5j3yer35l6a6wgyd3mm2sqhyjffu4",
        _ => panic!("no test cid named {name}"),
    };

    Cid::from_str(text).expect("bad test cid")
}

/// `n` consecutive days starting at 2020-01-01.
pub(crate) fn days(n: usize) -> Vec<DateTime<Utc>> {
    days_from(2020, 1, 1, n)
}

pub(crate) fn days_from(year: i32, month: u32, day: u32, n: usize) -> Vec<DateTime<Utc>> {
    let start = Utc
        .with_ymd_and_hms(year, month, day, 0, 0, 0)
        .single()
        .expect("bad test date");
    (0..n).map(|i| start + Days::days(i as i64)).collect()
}

/// A 3x3 grid over latitudes [40, 40.5, 41] and longitudes [-74, -73.5, -73] with `times`
/// time steps. `temperature[t, i, j] = 100t + 10i + j`.
///
pub(crate) fn grid(times: usize) -> Dataset {
    let lats = vec![40.0, 40.5, 41.0];
    let lons = vec![-74.0, -73.5, -73.0];
    let data = ArrayD::from_shape_fn(IxDyn(&[times, 3, 3]), |index| {
        (index[0] * 100 + index[1] * 10 + index[2]) as f64
    });

    Dataset::new(
        vec![
            Coordinate::time("time", days(times)),
            Coordinate::float("latitude", lats),
            Coordinate::float("longitude", lons),
        ],
        vec![
            Variable::new("temperature", &["time", "latitude", "longitude"], data)
                .expect("bad grid"),
        ],
    )
    .expect("bad grid")
}

/// A single cell time series with one value per time step.
pub(crate) fn series(times: Vec<DateTime<Utc>>, values: Vec<f64>) -> Dataset {
    let n = times.len();
    let data = ArrayD::from_shape_vec(IxDyn(&[n, 1, 1]), values).expect("bad series");

    Dataset::new(
        vec![
            Coordinate::time("time", times),
            Coordinate::float("latitude", vec![40.0]),
            Coordinate::float("longitude", vec![-74.0]),
        ],
        vec![
            Variable::new("precip", &["time", "latitude", "longitude"], data).expect("bad series"),
        ],
    )
    .expect("bad series")
}

/// Documents served from memory, keyed by absolute URL.
pub(crate) struct MemoryGateway {
    endpoint: String,
    json: Mutex<HashMap<String, Value>>,
    text: Mutex<HashMap<String, String>>,
    fetches: AtomicUsize,
}

impl MemoryGateway {
    pub(crate) fn new() -> Self {
        Self {
            endpoint: String::from(GATEWAY),
            json: Mutex::new(HashMap::new()),
            text: Mutex::new(HashMap::new()),
            fetches: AtomicUsize::new(0),
        }
    }

    pub(crate) fn insert_json(&self, url: &str, value: Value) {
        self.json.lock().insert(url.to_string(), value);
    }

    pub(crate) fn insert_text(&self, url: &str, text: &str) {
        self.text.lock().insert(url.to_string(), text.to_string());
    }

    /// Number of fetches made so far, successful or not
    pub(crate) fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Gateway for MemoryGateway {
    fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn fetch_json(&self, url: &str) -> Result<Value> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        self.json
            .lock()
            .get(url)
            .cloned()
            .ok_or_else(|| Error::Transport(format!("404 Not Found: {url}")))
    }

    async fn fetch_text(&self, url: &str) -> Result<String> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if let Some(text) = self.text.lock().get(url) {
            return Ok(text.clone());
        }
        self.json
            .lock()
            .get(url)
            .map(Value::to_string)
            .ok_or_else(|| Error::Transport(format!("404 Not Found: {url}")))
    }
}

pub(crate) struct MemoryLookup {
    items: Mutex<HashMap<String, Vec<LookupItem>>>,
}

impl MemoryLookup {
    pub(crate) fn new() -> Self {
        Self {
            items: Mutex::new(HashMap::new()),
        }
    }

    pub(crate) fn insert(&self, collection: &str, id: &str, href: &str) {
        self.items
            .lock()
            .entry(collection.to_string())
            .or_default()
            .push(LookupItem {
                id: id.to_string(),
                href: href.to_string(),
            });
    }
}

#[async_trait]
impl LookupService for MemoryLookup {
    async fn search(&self, collection: &str) -> Result<Vec<LookupItem>> {
        Ok(self.items.lock().get(collection).cloned().unwrap_or_default())
    }
}

pub(crate) struct MemoryStore {
    datasets: Mutex<HashMap<Cid, Dataset>>,
    opens: AtomicUsize,
}

impl MemoryStore {
    pub(crate) fn new() -> Self {
        Self {
            datasets: Mutex::new(HashMap::new()),
            opens: AtomicUsize::new(0),
        }
    }

    pub(crate) fn insert(&self, cid: Cid, dataset: Dataset) {
        self.datasets.lock().insert(cid, dataset);
    }

    pub(crate) fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ArrayStore for MemoryStore {
    async fn open(&self, cid: &Cid) -> Result<Dataset> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        self.datasets
            .lock()
            .get(cid)
            .cloned()
            .ok_or_else(|| Error::Transport(format!("no dataset stored at {cid}")))
    }
}

/// A clock that only moves when told to.
pub(crate) struct ManualClock {
    start: Instant,
    elapsed: Mutex<Duration>,
}

impl ManualClock {
    pub(crate) fn new() -> Self {
        Self {
            start: Instant::now(),
            elapsed: Mutex::new(Duration::ZERO),
        }
    }

    pub(crate) fn advance(&self, by: Duration) {
        *self.elapsed.lock() += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.start + *self.elapsed.lock()
    }
}

/// Serve a small catalog from `gateway`, rooted at `CATALOG_ROOT`.
///
/// * ecmwf (declares `era5`)
///   * era5
///     * 2m_temperature: `finalized` (priority 1 on the item), `non-finalized` (priority 2 on
///       the link)
///     * precip: `early` (cid x1), `late` (endpoint answering x2), no concatenation metadata
/// * ucsb (declares `chirps-precip` by slug)
///   * chirps
///     * precip: `final`, `prelim`, a duplicate of `final`, a dangling link and a stray era5
///       item
/// * a broken organization link
///
pub(crate) fn populate_catalog(gateway: &MemoryGateway) {
    let base = format!("{GATEWAY}/ipfs/{}", cid("root"));
    let insert = |path: &str, value: Value| gateway.insert_json(&format!("{base}/{path}"), value);

    insert(
        "catalog.json",
        json!({
            "id": "dclimate",
            "title": "dClimate",
            "links": [
                {"rel": "self", "href": "./catalog.json"},
                {"rel": "child", "href": "./ecmwf/catalog.json", "dclimate:organization": "ecmwf"},
                {"rel": "child", "href": "./ucsb/catalog.json"},
                {"rel": "child", "href": "./missing/catalog.json"},
            ],
        }),
    );

    insert(
        "ecmwf/catalog.json",
        json!({
            "id": "ecmwf-catalog",
            "title": "ECMWF",
            "dclimate:collections": ["era5"],
            "links": [
                {"rel": "parent", "href": "../catalog.json"},
                {"rel": "child", "href": "./era5/collection.json"},
            ],
        }),
    );
    insert(
        "ecmwf/era5/collection.json",
        json!({
            "id": "era5",
            "links": [
                {"rel": "item", "href": "./2m_temperature-finalized.json"},
                {"rel": "item", "href": "./2m_temperature-non-finalized.json", "concatPriority": 2},
                {"rel": "item", "href": "./precip-early.json"},
                {"rel": "item", "href": "./precip-late.json"},
            ],
        }),
    );
    insert(
        "ecmwf/era5/2m_temperature-finalized.json",
        json!({
            "id": "era5-2m_temperature-finalized",
            "properties": {"concatPriority": 1},
            "assets": {
                "data": {"href": format!("ipfs://{}", cid("era5-2m_temperature-finalized"))},
            },
        }),
    );
    insert(
        "ecmwf/era5/2m_temperature-non-finalized.json",
        json!({
            "id": "era5-2m_temperature-non-finalized",
            "assets": {
                "data": {"href": format!("ipfs://{}", cid("era5-2m_temperature-non-finalized"))},
            },
        }),
    );
    insert(
        "ecmwf/era5/precip-early.json",
        json!({
            "id": "era5-precip-early",
            "assets": {"zarr": {"href": format!("ipfs://{}", cid("x1"))}},
        }),
    );
    insert(
        "ecmwf/era5/precip-late.json",
        json!({
            "id": "era5-precip-late",
            "assets": {"data": {"href": "https://api.test/era5-precip-late"}},
        }),
    );
    gateway.insert_text(
        "https://api.test/era5-precip-late",
        &json!({"cid": cid("x2").to_string()}).to_string(),
    );

    insert(
        "ucsb/catalog.json",
        json!({
            "id": "ucsb-catalog",
            "dclimate:id": "ucsb",
            "dclimate:datasets": ["chirps-precip"],
            "links": [{"rel": "child", "href": "./chirps/collection.json"}],
        }),
    );
    insert(
        "ucsb/chirps/collection.json",
        json!({
            "id": "chirps",
            "links": [
                {"rel": "item", "href": "./final.json"},
                {"rel": "item", "href": "./prelim.json"},
                {"rel": "item", "href": "./final.json"},
                {"rel": "item", "href": "./gone.json"},
                {
                    "rel": "item",
                    "href": format!("/ipfs/{}/ecmwf/era5/precip-early.json", cid("root")),
                },
            ],
        }),
    );
    insert(
        "ucsb/chirps/final.json",
        json!({
            "id": "chirps-precip-final",
            "assets": {"data": {"href": format!("ipfs://{}", cid("chirps-precip-final"))}},
        }),
    );
    insert(
        "ucsb/chirps/prelim.json",
        json!({
            "id": "chirps-precip-prelim",
            "assets": {"data": {"href": cid("chirps-precip-prelim").to_string()}},
        }),
    );
}
