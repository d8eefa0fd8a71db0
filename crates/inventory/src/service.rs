use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use common::{Clock, OrderId, Sku};
use metrics::counter;
use tracing::{info, warn};

use crate::error::{InventoryError, Result};
use crate::lock::{LOCK_TTL, SkuLock};
use crate::record::{InventoryReservation, InventoryStock, ReservationStatus, StockView};
use crate::store::InventoryStore;

/// How long a reservation holds stock before the expiry sweep returns
/// it. Long enough for payment to complete, short enough that abandoned
/// checkouts do not starve other buyers.
pub const RESERVATION_TTL: Duration = Duration::from_secs(30 * 60);

/// One (SKU, quantity) line of an order to reserve.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReservationLine {
    pub sku: Sku,
    pub quantity: i64,
}

/// Stock and reservation operations.
///
/// All stock mutations run under the per-SKU lock; acquisition failure
/// surfaces as [`InventoryError::LockContention`], which callers treat
/// as retryable rather than a business rejection.
pub struct InventoryService {
    store: Arc<dyn InventoryStore>,
    lock: Arc<dyn SkuLock>,
    clock: Arc<dyn Clock>,
    reservation_ttl: Duration,
}

impl InventoryService {
    pub fn new(
        store: Arc<dyn InventoryStore>,
        lock: Arc<dyn SkuLock>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        InventoryService {
            store,
            lock,
            clock,
            reservation_ttl: RESERVATION_TTL,
        }
    }

    /// Overrides the reservation TTL, mainly for tests.
    pub fn with_reservation_ttl(mut self, ttl: Duration) -> Self {
        self.reservation_ttl = ttl;
        self
    }

    /// Creates the stock row for `sku` or replaces its available count.
    /// The reserved count is never touched here; live reservations keep
    /// their hold across restocks.
    #[tracing::instrument(skip(self))]
    pub async fn upsert_stock(&self, sku: &Sku, available: i64) -> Result<StockView> {
        if available < 0 {
            return Err(InventoryError::InvalidQuantity(available));
        }
        self.with_sku_lock(sku, async {
            let reserved = self
                .store
                .get_stock(sku)
                .await?
                .map(|s| s.reserved)
                .unwrap_or(0);
            let stock = InventoryStock {
                sku: sku.clone(),
                available,
                reserved,
                updated_at: self.clock.now(),
            };
            self.store.save_stock(&stock).await?;
            info!(sku = %sku, available, "stock upserted");
            Ok(StockView::from(&stock))
        })
        .await
    }

    pub async fn get_stock(&self, sku: &Sku) -> Result<StockView> {
        let stock = self
            .store
            .get_stock(sku)
            .await?
            .ok_or_else(|| InventoryError::SkuNotFound(sku.clone()))?;
        Ok(StockView::from(&stock))
    }

    pub async fn list_stock(&self) -> Result<Vec<StockView>> {
        let rows = self.store.list_stock().await?;
        Ok(rows.iter().map(StockView::from).collect())
    }

    /// Moves `quantity` units of `sku` from available to reserved under
    /// a new reservation row. Fails with `DuplicateReservation` if the
    /// id was already used, `InsufficientStock` if the SKU cannot cover
    /// the quantity.
    #[tracing::instrument(skip(self))]
    pub async fn reserve(
        &self,
        reservation_id: &str,
        sku: &Sku,
        quantity: i64,
    ) -> Result<StockView> {
        if quantity <= 0 {
            return Err(InventoryError::InvalidQuantity(quantity));
        }
        self.with_sku_lock(sku, async {
            if self.store.get_reservation(reservation_id).await?.is_some() {
                return Err(InventoryError::DuplicateReservation(
                    reservation_id.to_string(),
                ));
            }
            let mut stock = self
                .store
                .get_stock(sku)
                .await?
                .ok_or_else(|| InventoryError::SkuNotFound(sku.clone()))?;
            if stock.available < quantity {
                return Err(InventoryError::InsufficientStock {
                    sku: sku.clone(),
                    requested: quantity,
                    available: stock.available,
                });
            }

            let now = self.clock.now();
            stock.available -= quantity;
            stock.reserved += quantity;
            stock.updated_at = now;
            self.store.save_stock(&stock).await?;

            let ttl = chrono::Duration::from_std(self.reservation_ttl)
                .unwrap_or(chrono::Duration::minutes(30));
            let reservation = InventoryReservation {
                reservation_id: reservation_id.to_string(),
                sku: sku.clone(),
                quantity,
                status: ReservationStatus::Reserved,
                created_at: now,
                updated_at: now,
                expires_at: now + ttl,
            };
            self.store.insert_reservation(&reservation).await?;

            counter!("inventory_reservations_total").increment(1);
            info!(reservation_id, sku = %sku, quantity, "stock reserved");
            Ok(StockView::from(&stock))
        })
        .await
    }

    /// Returns a reservation's units to available stock. Releasing an
    /// already-released reservation is a no-op; releasing a confirmed
    /// one is rejected.
    #[tracing::instrument(skip(self))]
    pub async fn release(&self, reservation_id: &str) -> Result<()> {
        let reservation = self.require_reservation(reservation_id).await?;
        self.with_sku_lock(&reservation.sku.clone(), async {
            let reservation = self.require_reservation(reservation_id).await?;
            match reservation.status {
                ReservationStatus::Released => return Ok(()),
                ReservationStatus::Confirmed => {
                    return Err(InventoryError::InvalidReservationState {
                        reservation_id: reservation_id.to_string(),
                        status: reservation.status,
                    });
                }
                ReservationStatus::Reserved => {}
            }

            let mut stock = self
                .store
                .get_stock(&reservation.sku)
                .await?
                .ok_or_else(|| InventoryError::SkuNotFound(reservation.sku.clone()))?;
            let now = self.clock.now();
            stock.available += reservation.quantity;
            stock.reserved = (stock.reserved - reservation.quantity).max(0);
            stock.updated_at = now;
            self.store.save_stock(&stock).await?;

            let mut updated = reservation;
            updated.status = ReservationStatus::Released;
            updated.updated_at = now;
            self.store.update_reservation(&updated).await?;

            counter!("inventory_reservations_released_total").increment(1);
            info!(reservation_id, "reservation released");
            Ok(())
        })
        .await
    }

    /// Finalizes a reservation: the units leave reserved without
    /// returning to available. Confirming twice is a no-op; confirming
    /// a released reservation is rejected.
    #[tracing::instrument(skip(self))]
    pub async fn confirm(&self, reservation_id: &str) -> Result<()> {
        let reservation = self.require_reservation(reservation_id).await?;
        self.with_sku_lock(&reservation.sku.clone(), async {
            let reservation = self.require_reservation(reservation_id).await?;
            match reservation.status {
                ReservationStatus::Confirmed => return Ok(()),
                ReservationStatus::Released => {
                    return Err(InventoryError::InvalidReservationState {
                        reservation_id: reservation_id.to_string(),
                        status: reservation.status,
                    });
                }
                ReservationStatus::Reserved => {}
            }

            let mut stock = self
                .store
                .get_stock(&reservation.sku)
                .await?
                .ok_or_else(|| InventoryError::SkuNotFound(reservation.sku.clone()))?;
            let now = self.clock.now();
            stock.reserved = (stock.reserved - reservation.quantity).max(0);
            stock.updated_at = now;
            self.store.save_stock(&stock).await?;

            let mut updated = reservation;
            updated.status = ReservationStatus::Confirmed;
            updated.updated_at = now;
            self.store.update_reservation(&updated).await?;

            counter!("inventory_reservations_confirmed_total").increment(1);
            info!(reservation_id, "reservation confirmed");
            Ok(())
        })
        .await
    }

    /// Reserves every line of an order, aggregating duplicate SKUs into
    /// one reservation per (order, SKU). A line that was already
    /// reserved by an earlier delivery of the same event counts as
    /// applied. If any line fails, all lines reserved so far are
    /// released before the error is returned.
    #[tracing::instrument(skip(self, lines))]
    pub async fn reserve_for_order(
        &self,
        order_id: &OrderId,
        lines: &[ReservationLine],
    ) -> Result<()> {
        let mut by_sku: BTreeMap<Sku, i64> = BTreeMap::new();
        for line in lines {
            if line.sku.is_blank() || line.quantity <= 0 {
                continue;
            }
            *by_sku.entry(line.sku.clone()).or_insert(0) += line.quantity;
        }

        for (sku, quantity) in &by_sku {
            let reservation_id = InventoryReservation::saga_id(order_id, sku);
            match self.reserve(&reservation_id, sku, *quantity).await {
                Ok(_) => {}
                Err(InventoryError::DuplicateReservation(_)) => {
                    info!(%reservation_id, "reservation already applied, skipping");
                }
                Err(err) => {
                    warn!(order_id = %order_id, sku = %sku, error = %err,
                        "reservation failed, releasing order reservations");
                    if let Err(release_err) = self.release_for_order(order_id).await {
                        warn!(order_id = %order_id, error = %release_err,
                            "compensating release failed");
                    }
                    return Err(err);
                }
            }
        }
        Ok(())
    }

    /// Releases every live reservation of an order. Returns how many
    /// rows transitioned.
    #[tracing::instrument(skip(self))]
    pub async fn release_for_order(&self, order_id: &OrderId) -> Result<usize> {
        self.transition_for_order(order_id, false).await
    }

    /// Confirms every live reservation of an order. Returns how many
    /// rows transitioned.
    #[tracing::instrument(skip(self))]
    pub async fn confirm_for_order(&self, order_id: &OrderId) -> Result<usize> {
        self.transition_for_order(order_id, true).await
    }

    /// Releases reservations whose TTL has lapsed, oldest first, at most
    /// `batch` per call. Rows that raced into a terminal state or whose
    /// SKU is contended are skipped and retried next sweep.
    #[tracing::instrument(skip(self))]
    pub async fn release_expired(&self, batch: usize) -> Result<usize> {
        let expired = self.store.find_expired(self.clock.now(), batch).await?;
        let mut released = 0;
        for reservation in expired {
            match self.release(&reservation.reservation_id).await {
                Ok(()) => released += 1,
                Err(err) if err.is_retryable() => {
                    warn!(reservation_id = %reservation.reservation_id, error = %err,
                        "expiry release deferred");
                }
                Err(InventoryError::InvalidReservationState { .. }) => {}
                Err(err) => return Err(err),
            }
        }
        if released > 0 {
            counter!("inventory_reservations_expired_total").increment(released as u64);
            info!(released, "expired reservations returned to stock");
        }
        Ok(released)
    }

    async fn transition_for_order(&self, order_id: &OrderId, confirm: bool) -> Result<usize> {
        let prefix = format!("{order_id}:");
        let reservations = self.store.find_reservations_by_prefix(&prefix).await?;
        let mut transitioned = 0;
        for reservation in reservations {
            if reservation.status != ReservationStatus::Reserved {
                continue;
            }
            let result = if confirm {
                self.confirm(&reservation.reservation_id).await
            } else {
                self.release(&reservation.reservation_id).await
            };
            match result {
                Ok(()) => transitioned += 1,
                // Lost a race to the expiry sweep or a duplicate event.
                Err(InventoryError::InvalidReservationState { .. }) => {}
                Err(err) => return Err(err),
            }
        }
        Ok(transitioned)
    }

    async fn require_reservation(&self, reservation_id: &str) -> Result<InventoryReservation> {
        self.store
            .get_reservation(reservation_id)
            .await?
            .ok_or_else(|| InventoryError::ReservationNotFound(reservation_id.to_string()))
    }

    /// Runs `body` under the SKU lock, releasing it on every path.
    async fn with_sku_lock<T>(
        &self,
        sku: &Sku,
        body: impl Future<Output = Result<T>>,
    ) -> Result<T> {
        if !self.lock.try_acquire(sku, LOCK_TTL).await {
            counter!("inventory_lock_contention_total").increment(1);
            return Err(InventoryError::LockContention(sku.clone()));
        }
        let result = body.await;
        self.lock.release(sku).await;
        result
    }
}
