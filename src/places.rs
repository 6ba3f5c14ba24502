//! 周辺サロン検索（外部プロバイダ + キャッシュ）
//!
//! 検索・ジオコーディング・詳細取得はトレイト越しに外部へ委譲し、
//! ここでは距離順の整列とキャッシュだけを行う。

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::cache::{geocode_key, place_details_key, places_key, Cache};
use crate::error::ScraperError;
use crate::types::BatchTarget;

const EARTH_RADIUS_METERS: f64 = 6_371_000.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatLng {
    pub lat: f64,
    pub lng: f64,
}

impl LatLng {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Place {
    pub place_id: String,
    pub name: String,
    pub address: String,
    pub location: LatLng,
    pub rating: Option<f64>,
    pub user_ratings_total: Option<u32>,
    pub price_level: Option<u8>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlacesQuery {
    pub center: LatLng,
    pub radius_meters: u32,
    pub query: String,
}

impl PlacesQuery {
    pub fn new(center: LatLng, radius_meters: u32) -> Self {
        Self {
            center,
            radius_meters,
            query: "nail salon".to_string(),
        }
    }

    pub fn with_query(mut self, query: impl Into<String>) -> Self {
        self.query = query.into();
        self
    }
}

/// 中心からの距離付きの検索結果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedPlace {
    #[serde(flatten)]
    pub place: Place,
    pub distance_meters: f64,
}

/// 店舗詳細（スクレイプ対象のWebサイトを含む）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaceInfo {
    pub place_id: String,
    pub name: String,
    pub address: String,
    pub website: Option<String>,
    pub phone: Option<String>,
}

#[async_trait]
pub trait PlacesSearch: Send + Sync {
    async fn search(&self, query: &PlacesQuery) -> Result<Vec<Place>, ScraperError>;
}

#[async_trait]
pub trait Geocoder: Send + Sync {
    async fn geocode(&self, address: &str) -> Result<Option<LatLng>, ScraperError>;
}

#[async_trait]
pub trait PlaceDetails: Send + Sync {
    async fn details(&self, place_id: &str) -> Result<Option<PlaceInfo>, ScraperError>;
}

/// 2点間の大円距離（メートル）
pub fn haversine_meters(a: LatLng, b: LatLng) -> f64 {
    let (lat1, lat2) = (a.lat.to_radians(), b.lat.to_radians());
    let d_lat = (b.lat - a.lat).to_radians();
    let d_lng = (b.lng - a.lng).to_radians();
    let h = (d_lat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (d_lng / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_METERS * h.sqrt().min(1.0).asin()
}

/// 近い順に並べる
pub fn rank_by_distance(center: LatLng, places: Vec<Place>) -> Vec<RankedPlace> {
    let mut ranked: Vec<RankedPlace> = places
        .into_iter()
        .map(|place| RankedPlace {
            distance_meters: haversine_meters(center, place.location),
            place,
        })
        .collect();
    ranked.sort_by(|a, b| a.distance_meters.total_cmp(&b.distance_meters));
    ranked
}

/// 周辺検索（キャッシュ優先）
pub async fn nearby_places(
    cache: &Cache,
    provider: &dyn PlacesSearch,
    query: &PlacesQuery,
) -> Result<Vec<RankedPlace>, ScraperError> {
    let key = places_key(query.center.lat, query.center.lng, query.radius_meters);
    if let Some(cached) = cache.get_json::<Vec<RankedPlace>>(&key).await {
        return Ok(cached);
    }

    let places = provider.search(query).await?;
    let ranked = rank_by_distance(query.center, places);
    info!(
        lat = query.center.lat,
        lng = query.center.lng,
        radius = query.radius_meters,
        found = ranked.len(),
        "Nearby search complete"
    );
    cache.set_json(&key, &ranked, cache.ttls().places).await;
    Ok(ranked)
}

/// 住所 → 座標（見つかった場合のみキャッシュ）
pub async fn geocode(
    cache: &Cache,
    geocoder: &dyn Geocoder,
    address: &str,
) -> Result<Option<LatLng>, ScraperError> {
    let key = geocode_key(address);
    if let Some(cached) = cache.get_json::<LatLng>(&key).await {
        return Ok(Some(cached));
    }

    let location = geocoder.geocode(address.trim()).await?;
    match location {
        Some(location) => cache.set_json(&key, &location, cache.ttls().geocode).await,
        None => debug!(address, "Address not found"),
    }
    Ok(location)
}

pub async fn place_details(
    cache: &Cache,
    lookup: &dyn PlaceDetails,
    place_id: &str,
) -> Result<Option<PlaceInfo>, ScraperError> {
    let key = place_details_key(place_id);
    if let Some(cached) = cache.get_json::<PlaceInfo>(&key).await {
        return Ok(Some(cached));
    }

    let details = lookup.details(place_id).await?;
    if let Some(details) = &details {
        cache
            .set_json(&key, details, cache.ttls().place_details)
            .await;
    }
    Ok(details)
}

/// 詳細一覧からスクレイプ対象を作る（Webサイトなしは空URL）
pub fn batch_targets(details: &[PlaceInfo]) -> Vec<BatchTarget> {
    details
        .iter()
        .map(|d| BatchTarget::new(d.name.clone(), d.website.clone().unwrap_or_default()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCacheStore;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct FixedPlaces {
        calls: AtomicUsize,
    }

    fn place(id: &str, lat: f64, lng: f64) -> Place {
        Place {
            place_id: id.to_string(),
            name: format!("Salon {id}"),
            address: format!("{id} Main St"),
            location: LatLng::new(lat, lng),
            rating: Some(4.5),
            user_ratings_total: Some(120),
            price_level: None,
        }
    }

    #[async_trait]
    impl PlacesSearch for FixedPlaces {
        async fn search(&self, _query: &PlacesQuery) -> Result<Vec<Place>, ScraperError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(vec![
                place("far", 30.30, -97.74),
                place("near", 30.2672, -97.7431),
                place("mid", 30.28, -97.74),
            ])
        }
    }

    struct CountingGeocoder {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Geocoder for CountingGeocoder {
        async fn geocode(&self, address: &str) -> Result<Option<LatLng>, ScraperError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if address.eq_ignore_ascii_case("nowhere") {
                return Ok(None);
            }
            Ok(Some(LatLng::new(30.2672, -97.7431)))
        }
    }

    struct FailingDetails;

    #[async_trait]
    impl PlaceDetails for FailingDetails {
        async fn details(&self, _place_id: &str) -> Result<Option<PlaceInfo>, ScraperError> {
            Err(ScraperError::Places("quota exceeded".into()))
        }
    }

    fn cache() -> Cache {
        Cache::new(Arc::new(MemoryCacheStore::new()))
    }

    #[test]
    fn test_haversine_known_distance() {
        // オースティン → ダラス 約 292km
        let austin = LatLng::new(30.2672, -97.7431);
        let dallas = LatLng::new(32.7767, -96.7970);
        let d = haversine_meters(austin, dallas);
        assert!((d - 292_000.0).abs() < 5_000.0, "distance was {d}");
        assert_eq!(haversine_meters(austin, austin), 0.0);
    }

    #[tokio::test]
    async fn test_nearby_sorted_and_cached() {
        let cache = cache();
        let provider = FixedPlaces {
            calls: AtomicUsize::new(0),
        };
        let query = PlacesQuery::new(LatLng::new(30.2672, -97.7431), 5000);

        let first = nearby_places(&cache, &provider, &query).await.unwrap();
        let ids: Vec<&str> = first.iter().map(|p| p.place.place_id.as_str()).collect();
        assert_eq!(ids, ["near", "mid", "far"]);
        assert!(first.windows(2).all(|w| w[0].distance_meters <= w[1].distance_meters));

        let second = nearby_places(&cache, &provider, &query).await.unwrap();
        let cached_ids: Vec<&str> = second.iter().map(|p| p.place.place_id.as_str()).collect();
        assert_eq!(cached_ids, ids);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_geocode_caches_hits_only() {
        let cache = cache();
        let geocoder = CountingGeocoder {
            calls: AtomicUsize::new(0),
        };

        assert!(geocode(&cache, &geocoder, " 100 Congress Ave ").await.unwrap().is_some());
        assert!(geocode(&cache, &geocoder, "100 congress ave").await.unwrap().is_some());
        assert_eq!(geocoder.calls.load(Ordering::SeqCst), 1);

        assert!(geocode(&cache, &geocoder, "nowhere").await.unwrap().is_none());
        assert!(geocode(&cache, &geocoder, "nowhere").await.unwrap().is_none());
        assert_eq!(geocoder.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_provider_errors_propagate() {
        let err = place_details(&cache(), &FailingDetails, "abc").await.unwrap_err();
        assert!(matches!(err, ScraperError::Places(_)));
    }

    #[test]
    fn test_batch_targets_from_details() {
        let details = vec![
            PlaceInfo {
                place_id: "1".into(),
                name: "Luxe Nails".into(),
                address: "1 Main St".into(),
                website: Some("https://luxenails.test".into()),
                phone: None,
            },
            PlaceInfo {
                place_id: "2".into(),
                name: "No Site Nails".into(),
                address: "2 Main St".into(),
                website: None,
                phone: Some("555-0100".into()),
            },
        ];
        let targets = batch_targets(&details);
        assert_eq!(targets[0].url, "https://luxenails.test");
        assert_eq!(targets[1].url, "");
    }
}
