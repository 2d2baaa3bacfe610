use dashmap::DashMap;
use tokio::time::{Duration, Instant};

use crate::geo::{GeoError, GeoService, RouteEstimate};
use crate::models::location::GeoPoint;
use crate::observability::metrics::Metrics;

const KEY_PRECISION: f64 = 1e5;

/// Origin/destination pair with coordinates rounded to five decimal places.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RouteKey {
    origin: (i64, i64),
    destination: (i64, i64),
}

impl RouteKey {
    pub fn new(origin: GeoPoint, destination: GeoPoint) -> Self {
        Self {
            origin: quantize(origin),
            destination: quantize(destination),
        }
    }
}

fn quantize(point: GeoPoint) -> (i64, i64) {
    (
        (point.lat * KEY_PRECISION).round() as i64,
        (point.lng * KEY_PRECISION).round() as i64,
    )
}

#[derive(Debug, Clone, Copy)]
struct CachedRoute {
    route: RouteEstimate,
    expires_at: Instant,
}

/// TTL memo in front of `GeoService::route_distance`.
///
/// Entries expire lazily when read. There is no size bound and no single-flight
/// coordination: two requests racing on a cold key both reach the Geo Service
/// and the later write wins.
pub struct GeoCache {
    entries: DashMap<RouteKey, CachedRoute>,
    ttl: Duration,
    metrics: Metrics,
}

impl GeoCache {
    pub fn new(ttl: Duration, metrics: Metrics) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
            metrics,
        }
    }

    pub fn get(&self, key: &RouteKey) -> Option<RouteEstimate> {
        let now = Instant::now();
        let expired = match self.entries.get(key) {
            Some(entry) if entry.expires_at > now => return Some(entry.route),
            Some(_) => true,
            None => false,
        };

        if expired {
            self.entries.remove_if(key, |_, entry| entry.expires_at <= now);
        }
        None
    }

    pub fn insert(&self, key: RouteKey, route: RouteEstimate) {
        self.entries.insert(
            key,
            CachedRoute {
                route,
                expires_at: Instant::now() + self.ttl,
            },
        );
    }

    /// Returns the cached route for the pair or fetches and stores it.
    pub async fn route(
        &self,
        geo: &dyn GeoService,
        origin: GeoPoint,
        destination: GeoPoint,
    ) -> Result<RouteEstimate, GeoError> {
        let key = RouteKey::new(origin, destination);

        if let Some(route) = self.get(&key) {
            self.metrics
                .geo_cache_lookups_total
                .with_label_values(&["hit"])
                .inc();
            return Ok(route);
        }

        self.metrics
            .geo_cache_lookups_total
            .with_label_values(&["miss"])
            .inc();

        let route = geo.route_distance(origin, destination).await?;
        self.insert(key, route);
        Ok(route)
    }

    pub fn clear(&self) -> usize {
        let removed = self.entries.len();
        self.entries.clear();
        removed
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use tokio::time::Duration;

    use super::{GeoCache, RouteKey};
    use crate::geo::{GeoError, GeoService, RouteEstimate};
    use crate::models::location::GeoPoint;
    use crate::observability::metrics::Metrics;

    #[derive(Default)]
    struct CountingGeo {
        route_calls: AtomicUsize,
    }

    #[async_trait]
    impl GeoService for CountingGeo {
        async fn geocode(&self, address: &str) -> Result<GeoPoint, GeoError> {
            Err(GeoError::NotFound(address.to_string()))
        }

        async fn route_distance(
            &self,
            _origin: GeoPoint,
            _destination: GeoPoint,
        ) -> Result<RouteEstimate, GeoError> {
            let calls = self.route_calls.fetch_add(1, Ordering::SeqCst) + 1;
            Ok(RouteEstimate {
                distance_km: 5.2 * calls as f64,
                duration_minutes: 14.6,
            })
        }
    }

    fn point(lat: f64, lng: f64) -> GeoPoint {
        GeoPoint { lat, lng }
    }

    #[tokio::test]
    async fn second_lookup_is_served_from_cache() {
        let geo = CountingGeo::default();
        let cache = GeoCache::new(Duration::from_secs(3600), Metrics::new());

        let first = cache.route(&geo, point(6.5, 3.3), point(6.6, 3.4)).await.unwrap();
        let second = cache.route(&geo, point(6.5, 3.3), point(6.6, 3.4)).await.unwrap();

        assert_eq!(first.distance_km.to_bits(), second.distance_km.to_bits());
        assert_eq!(first.duration_minutes.to_bits(), second.duration_minutes.to_bits());
        assert_eq!(geo.route_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn nearby_coordinates_share_a_key() {
        let a = RouteKey::new(point(6.500001, 3.300001), point(6.6, 3.4));
        let b = RouteKey::new(point(6.500004, 3.299996), point(6.6, 3.4));
        let c = RouteKey::new(point(6.5001, 3.3), point(6.6, 3.4));

        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[tokio::test]
    async fn direction_matters() {
        let there = RouteKey::new(point(1.0, 1.0), point(2.0, 2.0));
        let back = RouteKey::new(point(2.0, 2.0), point(1.0, 1.0));
        assert_ne!(there, back);
    }

    #[tokio::test(start_paused = true)]
    async fn expired_entry_is_refetched() {
        let geo = CountingGeo::default();
        let cache = GeoCache::new(Duration::from_secs(3600), Metrics::new());

        cache.route(&geo, point(1.0, 1.0), point(2.0, 2.0)).await.unwrap();
        tokio::time::advance(Duration::from_secs(3601)).await;

        let refreshed = cache.route(&geo, point(1.0, 1.0), point(2.0, 2.0)).await.unwrap();

        assert_eq!(geo.route_calls.load(Ordering::SeqCst), 2);
        assert!((refreshed.distance_km - 10.4).abs() < 1e-9);
    }

    #[tokio::test(start_paused = true)]
    async fn expired_entry_is_dropped_on_read() {
        let cache = GeoCache::new(Duration::from_secs(60), Metrics::new());
        let key = RouteKey::new(point(1.0, 1.0), point(2.0, 2.0));
        cache.insert(
            key,
            RouteEstimate {
                distance_km: 1.0,
                duration_minutes: 2.0,
            },
        );

        tokio::time::advance(Duration::from_secs(61)).await;

        assert!(cache.get(&key).is_none());
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn clear_empties_the_cache() {
        let geo = CountingGeo::default();
        let cache = GeoCache::new(Duration::from_secs(3600), Metrics::new());
        cache.route(&geo, point(1.0, 1.0), point(2.0, 2.0)).await.unwrap();

        assert_eq!(cache.clear(), 1);
        cache.route(&geo, point(1.0, 1.0), point(2.0, 2.0)).await.unwrap();
        assert_eq!(geo.route_calls.load(Ordering::SeqCst), 2);
    }
}
