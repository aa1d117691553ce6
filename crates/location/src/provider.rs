//! Location snapshot holder.

use std::sync::{Arc, PoisonError, RwLock};

use async_trait::async_trait;
use sos_events::PermissionState;

use crate::{Location, LocationError, Result};

/// Geolocation boundary implemented by the platform layer.
#[async_trait]
pub trait Geolocator: Send + Sync {
    /// Ask the user for location access. May suspend until they answer.
    async fn request_permission(&self) -> bool;

    /// Request a fresh position fix.
    async fn current_position(&self) -> Result<Location>;
}

/// Type alias for shared geolocator reference.
pub type GeolocatorRef = Arc<dyn Geolocator>;

/// Holds the latest successful fix and the permission state.
pub struct LocationProvider {
    geolocator: GeolocatorRef,
    snapshot: RwLock<Option<Location>>,
    permission: RwLock<PermissionState>,
}

impl LocationProvider {
    pub fn new(geolocator: GeolocatorRef) -> Self {
        Self {
            geolocator,
            snapshot: RwLock::new(None),
            permission: RwLock::new(PermissionState::Prompt),
        }
    }

    /// Latest successful fix, if any.
    pub fn location(&self) -> Option<Location> {
        self.snapshot
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn permission(&self) -> PermissionState {
        *self.permission.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn permission_granted(&self) -> bool {
        self.permission().is_granted()
    }

    /// Request location access and, when granted, take a first fix.
    ///
    /// A failed first fix is logged; the returned value only reflects the
    /// permission answer.
    pub async fn request_permission(&self) -> bool {
        let granted = self.geolocator.request_permission().await;
        self.set_permission(PermissionState::from_granted(granted));
        tracing::info!(granted, "location permission answered");

        if granted {
            if let Err(e) = self.update_location().await {
                tracing::warn!("initial location fix failed: {}", e);
            }
        }
        granted
    }

    /// Request a fresh fix and replace the snapshot on success.
    ///
    /// A fix older than the stored one never replaces it; overlapping
    /// requests can resolve out of order. The returned location is the
    /// snapshot in effect afterwards. On failure the previous snapshot is
    /// kept and the reason is returned.
    pub async fn update_location(&self) -> Result<Location> {
        if self.permission() == PermissionState::Denied {
            tracing::debug!("skipping location update, permission denied");
            return Err(LocationError::PermissionDenied);
        }

        match self.geolocator.current_position().await {
            Ok(location) => {
                let current = {
                    let mut snapshot =
                        self.snapshot.write().unwrap_or_else(PoisonError::into_inner);
                    let stored_at = snapshot.as_ref().map(|stored| stored.timestamp);
                    match stored_at {
                        Some(stored) if stored > location.timestamp => {
                            tracing::debug!(
                                fix = %location.timestamp,
                                stored = %stored,
                                "stale location fix dropped"
                            );
                        }
                        _ => {
                            tracing::debug!(
                                latitude = location.latitude,
                                longitude = location.longitude,
                                accuracy = ?location.accuracy,
                                "location updated"
                            );
                            *snapshot = Some(location.clone());
                        }
                    }
                    snapshot.clone().unwrap_or(location)
                };
                self.set_permission(PermissionState::Granted);
                Ok(current)
            }
            Err(e) => {
                if e == LocationError::PermissionDenied {
                    self.set_permission(PermissionState::Denied);
                }
                tracing::warn!(
                    has_previous = self.location().is_some(),
                    "location update failed: {}",
                    e
                );
                Err(e)
            }
        }
    }

    fn set_permission(&self, state: PermissionState) {
        *self.permission.write().unwrap_or_else(PoisonError::into_inner) = state;
    }
}

impl std::fmt::Debug for LocationProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocationProvider")
            .field("permission", &self.permission())
            .field("location", &self.location())
            .finish_non_exhaustive()
    }
}
