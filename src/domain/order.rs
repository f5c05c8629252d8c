//! Order Entity — Lifecycle State Machine
//!
//! One `Order` represents a single trading intent and its execution
//! progress. All status transitions go through the methods on this type;
//! the `OrderManager` registry never mutates fields directly, so the
//! transition rules are enforced in exactly one place.
//!
//! Status machine:
//! - `Pending` is initial.
//! - Fills move `Pending`/`PartiallyFilled` forward; a fill that completes
//!   the requested quantity lands in `Filled`.
//! - `Filled`, `Canceled`, `Rejected` are terminal and absorb every later
//!   update (reported as stale, never applied).

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::events::VenueStatus;

/// Order identifier, assigned sequentially by the `OrderManager`.
pub type OrderId = u64;

/// Buy or sell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Side {
    Buy,
    Sell,
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Buy => write!(f, "BUY"),
            Self::Sell => write!(f, "SELL"),
        }
    }
}

/// Lifecycle status of an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderStatus {
    /// Recorded locally, awaiting venue acknowledgement or first fill.
    Pending,
    /// Some quantity executed, remainder still working.
    PartiallyFilled,
    /// Requested quantity fully executed. Terminal.
    Filled,
    /// Canceled by the caller or the venue. Terminal.
    Canceled,
    /// Rejected by the venue or by a failed delivery. Terminal.
    Rejected,
}

impl OrderStatus {
    /// Terminal statuses accept no further transition.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Filled | Self::Canceled | Self::Rejected)
    }

    /// Active orders are the ones still working at the venue.
    pub fn is_active(self) -> bool {
        matches!(self, Self::Pending | Self::PartiallyFilled)
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "PENDING"),
            Self::PartiallyFilled => write!(f, "PARTIALLY_FILLED"),
            Self::Filled => write!(f, "FILLED"),
            Self::Canceled => write!(f, "CANCELED"),
            Self::Rejected => write!(f, "REJECTED"),
        }
    }
}

/// Illegal or impossible order mutations.
///
/// `NotFound`, `NotCancelable`, `NotModifiable` and `StaleUpdate` are
/// caller/venue misuse and are returned synchronously. `FillOverflow`
/// is a venue data-integrity fault: the registry cannot repair it, so it
/// is surfaced loudly instead of being clamped away.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum OrderError {
    #[error("order {0} not found")]
    NotFound(OrderId),

    #[error("order {id} is not cancelable in status {status}")]
    NotCancelable { id: OrderId, status: OrderStatus },

    #[error("order {id} is not modifiable in status {status}")]
    NotModifiable { id: OrderId, status: OrderStatus },

    #[error("stale update for order {id} already in terminal status {status}")]
    StaleUpdate { id: OrderId, status: OrderStatus },

    #[error(
        "fill of {delta} would overflow order {id}: {filled}/{requested} already filled"
    )]
    FillOverflow {
        id: OrderId,
        filled: u64,
        delta: u64,
        requested: u64,
    },
}

/// A single trading intent and its execution progress.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    /// Gateway-assigned identifier, immutable after creation.
    pub id: OrderId,
    /// Instrument symbol (e.g. "AAPL").
    pub symbol: String,
    /// Buy or sell.
    pub side: Side,
    /// Limit price. Replaced only by an explicit pre-execution modify.
    pub limit_price: Decimal,
    /// Requested quantity in units.
    pub requested_qty: u64,
    /// Executed quantity so far. Monotonically non-decreasing,
    /// never exceeds `requested_qty`.
    pub filled_qty: u64,
    /// Current lifecycle status.
    pub status: OrderStatus,
    /// Set once at creation, never mutated.
    pub created_at: DateTime<Utc>,
}

impl Order {
    /// Create a new pending order.
    pub fn new(
        id: OrderId,
        symbol: impl Into<String>,
        side: Side,
        limit_price: Decimal,
        requested_qty: u64,
    ) -> Self {
        Self {
            id,
            symbol: symbol.into(),
            side,
            limit_price,
            requested_qty,
            filled_qty: 0,
            status: OrderStatus::Pending,
            created_at: Utc::now(),
        }
    }

    /// Remaining unexecuted quantity.
    pub fn remaining_qty(&self) -> u64 {
        self.requested_qty - self.filled_qty
    }

    /// Advance execution progress by `delta` units.
    ///
    /// Status becomes `Filled` once the requested quantity is reached,
    /// `PartiallyFilled` otherwise. A delta that would push past the
    /// requested quantity mutates nothing and reports `FillOverflow`.
    pub fn apply_fill(&mut self, delta: u64) -> Result<(), OrderError> {
        if self.status.is_terminal() {
            return Err(OrderError::StaleUpdate {
                id: self.id,
                status: self.status,
            });
        }
        // Checked: the delta comes straight off the wire, so an absurd
        // value must land in FillOverflow, not wrap.
        let filled = match self.filled_qty.checked_add(delta) {
            Some(filled) if filled <= self.requested_qty => filled,
            _ => {
                return Err(OrderError::FillOverflow {
                    id: self.id,
                    filled: self.filled_qty,
                    delta,
                    requested: self.requested_qty,
                });
            }
        };
        self.filled_qty = filled;
        self.status = if filled == self.requested_qty {
            OrderStatus::Filled
        } else {
            OrderStatus::PartiallyFilled
        };
        Ok(())
    }

    /// Apply a venue-reported status update, optionally carrying a fill.
    ///
    /// This is the only path by which an external event advances an
    /// order. The fill (if any) is validated first; explicit terminal
    /// statuses from the venue then override the computed status, which
    /// covers a cancel-of-remainder arriving together with a final
    /// partial execution.
    pub fn apply_venue_status(
        &mut self,
        venue_status: VenueStatus,
        filled_delta: u64,
    ) -> Result<(), OrderError> {
        if self.status.is_terminal() {
            return Err(OrderError::StaleUpdate {
                id: self.id,
                status: self.status,
            });
        }
        if filled_delta > 0 {
            self.apply_fill(filled_delta)?;
        }
        match venue_status {
            VenueStatus::Canceled => self.status = OrderStatus::Canceled,
            VenueStatus::Rejected => self.status = OrderStatus::Rejected,
            // Acknowledged carries no status change of its own; any fill
            // above already advanced Pending → PartiallyFilled/Filled.
            VenueStatus::Acknowledged
            | VenueStatus::PartiallyFilled
            | VenueStatus::Filled => {}
        }
        Ok(())
    }

    /// Cancel the working remainder. Legal from `Pending` and
    /// `PartiallyFilled` only.
    pub fn cancel(&mut self) -> Result<(), OrderError> {
        if !self.status.is_active() {
            return Err(OrderError::NotCancelable {
                id: self.id,
                status: self.status,
            });
        }
        self.status = OrderStatus::Canceled;
        Ok(())
    }

    /// Replace price and quantity in place, keeping the same id.
    ///
    /// Legal from `Pending` only: once any fill exists the fill history
    /// would have to be reconciled against a resized order, so
    /// modify-after-partial-fill is rejected by design.
    pub fn modify(
        &mut self,
        new_price: Decimal,
        new_qty: u64,
    ) -> Result<(), OrderError> {
        if self.status != OrderStatus::Pending {
            return Err(OrderError::NotModifiable {
                id: self.id,
                status: self.status,
            });
        }
        self.limit_price = new_price;
        self.requested_qty = new_qty;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn order() -> Order {
        Order::new(1, "AAPL", Side::Buy, dec!(150.5), 100)
    }

    #[test]
    fn new_order_is_pending_with_zero_fill() {
        let o = order();
        assert_eq!(o.status, OrderStatus::Pending);
        assert_eq!(o.filled_qty, 0);
        assert_eq!(o.remaining_qty(), 100);
    }

    #[test]
    fn partial_then_complete_fill() {
        let mut o = order();
        o.apply_fill(40).unwrap();
        assert_eq!(o.status, OrderStatus::PartiallyFilled);
        assert_eq!(o.filled_qty, 40);
        o.apply_fill(60).unwrap();
        assert_eq!(o.status, OrderStatus::Filled);
        assert_eq!(o.filled_qty, 100);
    }

    #[test]
    fn fill_overflow_reports_and_mutates_nothing() {
        let mut o = order();
        o.apply_fill(90).unwrap();
        let err = o.apply_fill(20).unwrap_err();
        assert_eq!(
            err,
            OrderError::FillOverflow {
                id: 1,
                filled: 90,
                delta: 20,
                requested: 100
            }
        );
        assert_eq!(o.filled_qty, 90);
        assert_eq!(o.status, OrderStatus::PartiallyFilled);
    }

    #[test]
    fn fill_delta_near_u64_max_overflows_without_wrapping() {
        let mut o = order();
        o.apply_fill(40).unwrap();
        let err = o.apply_fill(u64::MAX).unwrap_err();
        assert_eq!(
            err,
            OrderError::FillOverflow {
                id: 1,
                filled: 40,
                delta: u64::MAX,
                requested: 100
            }
        );
        assert_eq!(o.filled_qty, 40);
        assert_eq!(o.status, OrderStatus::PartiallyFilled);
    }

    #[test]
    fn terminal_statuses_absorb_further_updates() {
        let mut o = order();
        o.apply_fill(100).unwrap();
        assert_eq!(o.status, OrderStatus::Filled);

        let before = o.clone();
        assert!(matches!(
            o.apply_venue_status(VenueStatus::Canceled, 0),
            Err(OrderError::StaleUpdate { .. })
        ));
        assert!(matches!(o.apply_fill(1), Err(OrderError::StaleUpdate { .. })));
        assert_eq!(o.status, before.status);
        assert_eq!(o.filled_qty, before.filled_qty);
    }

    #[test]
    fn venue_cancel_overrides_computed_status() {
        let mut o = order();
        // Final partial execution delivered together with the cancel of
        // the remainder.
        o.apply_venue_status(VenueStatus::Canceled, 30).unwrap();
        assert_eq!(o.filled_qty, 30);
        assert_eq!(o.status, OrderStatus::Canceled);
    }

    #[test]
    fn acknowledgement_keeps_pending() {
        let mut o = order();
        o.apply_venue_status(VenueStatus::Acknowledged, 0).unwrap();
        assert_eq!(o.status, OrderStatus::Pending);
    }

    #[test]
    fn cancel_legal_only_while_active() {
        let mut o = order();
        o.apply_fill(40).unwrap();
        o.cancel().unwrap();
        assert_eq!(o.status, OrderStatus::Canceled);

        let err = o.cancel().unwrap_err();
        assert_eq!(
            err,
            OrderError::NotCancelable {
                id: 1,
                status: OrderStatus::Canceled
            }
        );
    }

    #[test]
    fn modify_illegal_after_partial_fill() {
        let mut o = order();
        o.apply_fill(10).unwrap();
        let err = o.modify(dec!(151.0), 200).unwrap_err();
        assert_eq!(
            err,
            OrderError::NotModifiable {
                id: 1,
                status: OrderStatus::PartiallyFilled
            }
        );
        assert_eq!(o.requested_qty, 100);
    }

    #[test]
    fn modify_replaces_price_and_qty_in_place() {
        let mut o = order();
        o.modify(dec!(151.0), 150).unwrap();
        assert_eq!(o.limit_price, dec!(151.0));
        assert_eq!(o.requested_qty, 150);
        assert_eq!(o.id, 1);
        assert_eq!(o.status, OrderStatus::Pending);
    }
}
