use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{oneshot, Mutex, RwLock};
use tracing::{debug, info};
use uuid::Uuid;

use strada_core::driver::Driver;
use strada_core::vehicle::Vehicle;
use strada_core::{DispatchError, DispatchResult};
use strada_shared::geo::Coordinates;

/// A driver's answer to an outstanding ride offer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OfferAnswer {
    Accepted,
    Declined,
}

/// The offer currently occupying a driver's slot, carrying the channel the
/// matcher task awaits the answer on.
struct PendingOffer {
    offer_id: Uuid,
    ride_id: Uuid,
    tx: oneshot::Sender<OfferAnswer>,
}

/// A driver plus the vehicle they drive, as seen by matching.
#[derive(Debug, Clone)]
pub struct DriverProfile {
    pub driver: Driver,
    pub vehicle: Vehicle,
}

/// One driver's snapshot for candidate ranking.
#[derive(Debug, Clone)]
pub struct CandidateView {
    pub profile: DriverProfile,
    /// Holds an outstanding offer or an active ride.
    pub busy: bool,
}

struct DriverEntry {
    profile: RwLock<DriverProfile>,
    /// Offer slot. The mutex is held only for the compare-and-swap itself;
    /// the matcher waits on the oneshot receiver outside any lock, so an
    /// accept racing a timeout is resolved by whichever empties the slot
    /// first.
    offer: Mutex<Option<PendingOffer>>,
    /// The one ride (ACCEPTED or IN_PROGRESS) this driver may hold.
    active_ride: Mutex<Option<Uuid>>,
}

/// Concurrent driver directory: presence, availability, the per-driver offer
/// slot and the active-ride exclusivity guard. The unit of synchronization
/// is the individual driver entry; the outer map is locked only for lookup.
pub struct DriverRegistry {
    entries: RwLock<HashMap<Uuid, Arc<DriverEntry>>>,
}

impl DriverRegistry {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }

    pub async fn register(&self, driver: Driver, vehicle: Vehicle) {
        let id = driver.id;
        let entry = Arc::new(DriverEntry {
            profile: RwLock::new(DriverProfile { driver, vehicle }),
            offer: Mutex::new(None),
            active_ride: Mutex::new(None),
        });
        self.entries.write().await.insert(id, entry);
        info!(driver_id = %id, "driver registered");
    }

    pub async fn contains(&self, driver_id: Uuid) -> bool {
        self.entries.read().await.contains_key(&driver_id)
    }

    async fn entry(&self, driver_id: Uuid) -> DispatchResult<Arc<DriverEntry>> {
        self.entries
            .read()
            .await
            .get(&driver_id)
            .cloned()
            .ok_or(DispatchError::DriverNotFound(driver_id))
    }

    pub async fn profile(&self, driver_id: Uuid) -> DispatchResult<DriverProfile> {
        let entry = self.entry(driver_id).await?;
        let profile = entry.profile.read().await;
        Ok(profile.clone())
    }

    pub async fn set_online(
        &self,
        driver_id: Uuid,
        position: Coordinates,
    ) -> DispatchResult<()> {
        let entry = self.entry(driver_id).await?;
        let mut profile = entry.profile.write().await;
        profile.driver.online = true;
        profile.driver.available = true;
        profile.driver.position = Some(position);
        Ok(())
    }

    pub async fn set_offline(&self, driver_id: Uuid) -> DispatchResult<()> {
        let entry = self.entry(driver_id).await?;
        let mut profile = entry.profile.write().await;
        profile.driver.online = false;
        profile.driver.available = false;
        profile.driver.position = None;
        Ok(())
    }

    pub async fn update_position(
        &self,
        driver_id: Uuid,
        position: Coordinates,
    ) -> DispatchResult<()> {
        let entry = self.entry(driver_id).await?;
        let mut profile = entry.profile.write().await;
        profile.driver.position = Some(position);
        Ok(())
    }

    /// Refresh a driver's rolling rating and ride counter after a rating
    /// lands, so candidate ordering sees fresh numbers.
    pub async fn update_standing(
        &self,
        driver_id: Uuid,
        rating: f64,
        rating_count: u64,
        total_rides: u64,
    ) -> DispatchResult<()> {
        let entry = self.entry(driver_id).await?;
        let mut profile = entry.profile.write().await;
        profile.driver.rating = rating;
        profile.driver.rating_count = rating_count;
        profile.driver.total_rides = total_rides;
        Ok(())
    }

    /// Snapshot of every driver for candidate ranking.
    pub async fn candidate_snapshot(&self) -> Vec<CandidateView> {
        let entries: Vec<Arc<DriverEntry>> =
            self.entries.read().await.values().cloned().collect();

        let mut views = Vec::with_capacity(entries.len());
        for entry in entries {
            let profile = entry.profile.read().await.clone();
            let busy = entry.offer.lock().await.is_some()
                || entry.active_ride.lock().await.is_some();
            views.push(CandidateView { profile, busy });
        }
        views
    }

    /// Place a time-boxed exclusive offer on a driver. Returns the offer id
    /// and the channel the answer arrives on, or `None` if the driver is not
    /// offerable right now (offline, unavailable, already holding an offer
    /// or a ride).
    pub async fn try_place_offer(
        &self,
        driver_id: Uuid,
        ride_id: Uuid,
    ) -> DispatchResult<Option<(Uuid, oneshot::Receiver<OfferAnswer>)>> {
        let entry = self.entry(driver_id).await?;

        {
            let profile = entry.profile.read().await;
            if !profile.driver.online || !profile.driver.available {
                return Ok(None);
            }
        }
        if entry.active_ride.lock().await.is_some() {
            return Ok(None);
        }

        let mut slot = entry.offer.lock().await;
        if slot.is_some() {
            return Ok(None);
        }

        let offer_id = Uuid::new_v4();
        let (tx, rx) = oneshot::channel();
        *slot = Some(PendingOffer {
            offer_id,
            ride_id,
            tx,
        });
        debug!(driver_id = %driver_id, ride_id = %ride_id, offer_id = %offer_id, "offer placed");
        Ok(Some((offer_id, rx)))
    }

    /// The offer a driver currently holds, if any.
    pub async fn pending_offer(
        &self,
        driver_id: Uuid,
    ) -> DispatchResult<Option<(Uuid, Uuid)>> {
        let entry = self.entry(driver_id).await?;
        let slot = entry.offer.lock().await;
        Ok(slot.as_ref().map(|o| (o.offer_id, o.ride_id)))
    }

    /// Timeout path of the offer race: empty the slot if it still holds this
    /// offer. Returns true if this call won the race, false if the driver's
    /// answer got there first.
    pub async fn revoke_offer(&self, driver_id: Uuid, offer_id: Uuid) -> bool {
        let Ok(entry) = self.entry(driver_id).await else {
            return false;
        };
        let mut slot = entry.offer.lock().await;
        match slot.as_ref() {
            Some(pending) if pending.offer_id == offer_id => {
                *slot = None;
                debug!(driver_id = %driver_id, offer_id = %offer_id, "offer revoked");
                true
            }
            _ => false,
        }
    }

    /// Driver answer path of the offer race. Fails with `OfferExpired` when
    /// the slot no longer holds this offer (timed out, revoked, or never
    /// placed).
    pub async fn respond(
        &self,
        driver_id: Uuid,
        offer_id: Uuid,
        answer: OfferAnswer,
    ) -> DispatchResult<()> {
        let entry = self.entry(driver_id).await?;
        let mut slot = entry.offer.lock().await;
        match slot.take() {
            Some(pending) if pending.offer_id == offer_id => {
                // Matcher may already have given up between our take and its
                // revoke losing the race; a dropped receiver is fine.
                let _ = pending.tx.send(answer);
                Ok(())
            }
            other => {
                *slot = other;
                Err(DispatchError::OfferExpired)
            }
        }
    }

    /// Bind the driver to a ride, enforcing at most one active ride per
    /// driver at any instant.
    pub async fn bind_ride(&self, driver_id: Uuid, ride_id: Uuid) -> DispatchResult<()> {
        let entry = self.entry(driver_id).await?;
        let mut active = entry.active_ride.lock().await;
        if let Some(existing) = *active {
            return Err(DispatchError::DispatchFailed(format!(
                "driver {driver_id} already bound to ride {existing}"
            )));
        }
        *active = Some(ride_id);
        info!(driver_id = %driver_id, ride_id = %ride_id, "driver bound to ride");
        Ok(())
    }

    /// Release the driver once the ride reaches a terminal state or the
    /// assignment is dropped. Idempotent.
    pub async fn release_ride(&self, driver_id: Uuid, ride_id: Uuid) {
        let Ok(entry) = self.entry(driver_id).await else {
            return;
        };
        let mut active = entry.active_ride.lock().await;
        if *active == Some(ride_id) {
            *active = None;
            debug!(driver_id = %driver_id, ride_id = %ride_id, "driver released");
        }
    }

    pub async fn active_ride(&self, driver_id: Uuid) -> DispatchResult<Option<Uuid>> {
        let entry = self.entry(driver_id).await?;
        let active = entry.active_ride.lock().await;
        Ok(*active)
    }
}

impl Default for DriverRegistry {
    fn default() -> Self {
        Self::new()
    }
}
