//! Order state machine.
//!
//! `apply_event` is a pure function of the current state and an event. Callers persist the
//! result with a compare-and-set on the previous state, so two deliveries of the same event
//! can never both observe a change: the second one sees the new state and gets `Unchanged`.
//!
//! Status axis: `pending -> confirmed -> processing -> shipped -> delivered`, with `cancelled`
//! reachable from any non-terminal status. Payment axis: `pending|unpaid -> paid|failed`,
//! `paid -> refunded`.

use crate::domain::aggregates::order::{OrderState, OrderStatus, PaymentStatus};
use crate::domain::events::{ChangeMode, Notification, OrderEvent, Transition};
use crate::domain::value_objects::PaymentMethodKind;
use crate::{EcommerceError, Result};

pub fn apply_event(current: OrderState, method: PaymentMethodKind, event: &OrderEvent) -> Result<Transition> {
    let OrderState { status, payment_status } = current;
    match event {
        OrderEvent::CashOrderPlaced => match status {
            OrderStatus::Pending => {
                Ok(Transition::to(OrderState::new(OrderStatus::Confirmed, payment_status)).notify(Notification::Confirmation))
            }
            OrderStatus::Confirmed => Ok(Transition::Unchanged),
            other => Err(EcommerceError::validation(format!("cannot confirm an order that is {other}"))),
        },

        OrderEvent::PaymentSucceeded => match (status, payment_status) {
            (_, PaymentStatus::Paid | PaymentStatus::Refunded) => Ok(Transition::Unchanged),
            (OrderStatus::Pending, _) => {
                Ok(Transition::to(OrderState::new(OrderStatus::Confirmed, PaymentStatus::Paid)).notify(Notification::Confirmation))
            }
            // Already confirmed or further along (or cancelled): record the money, keep the status.
            (other, _) => Ok(Transition::to(OrderState::new(other, PaymentStatus::Paid))),
        },

        OrderEvent::PaymentFailed => match (status, payment_status) {
            (_, PaymentStatus::Paid | PaymentStatus::Refunded | PaymentStatus::Failed) => Ok(Transition::Unchanged),
            (s, _) if s.is_terminal() => Ok(Transition::to(OrderState::new(s, PaymentStatus::Failed))),
            _ => Ok(Transition::to(OrderState::new(OrderStatus::Cancelled, PaymentStatus::Failed))),
        },

        OrderEvent::CustomerCancelled => {
            ensure_open(status)?;
            Ok(Transition::to(OrderState::new(OrderStatus::Cancelled, payment_status))
                .notify(Notification::StatusUpdate(OrderStatus::Cancelled)))
        }

        OrderEvent::StatusChanged { target, tracking_number, mode } => {
            ensure_open(status)?;
            if tracking_number.is_some() && *target != OrderStatus::Shipped {
                return Err(EcommerceError::validation("a tracking number can only be set when shipping"));
            }
            if *target == status {
                // Only a shipped order can reach here with a tracking number: record or correct it.
                return Ok(match tracking_number {
                    None => Transition::Unchanged,
                    Some(tracking) => Transition::Changed {
                        next: OrderState::new(status, payment_status),
                        tracking_number: Some(tracking.clone()),
                        notification: Some(Notification::StatusUpdate(status)),
                    },
                });
            }
            if *mode == ChangeMode::Forward && !is_forward(status, *target) {
                return Err(EcommerceError::validation(format!("cannot move an order from {status} to {target}")));
            }
            if *target == OrderStatus::Delivered && method == PaymentMethodKind::Card && payment_status != PaymentStatus::Paid {
                return Err(EcommerceError::validation("card orders must be paid before delivery"));
            }
            Ok(Transition::Changed {
                next: OrderState::new(*target, payment_status),
                tracking_number: tracking_number.clone(),
                notification: Some(Notification::StatusUpdate(*target)),
            })
        }

        OrderEvent::PaymentStatusChanged { target } => {
            if *target == payment_status {
                return Ok(Transition::Unchanged);
            }
            let allowed = matches!(
                (payment_status, target),
                (PaymentStatus::Pending | PaymentStatus::Unpaid, PaymentStatus::Paid | PaymentStatus::Failed)
                    | (PaymentStatus::Paid, PaymentStatus::Refunded)
            );
            if !allowed {
                return Err(EcommerceError::validation(format!("cannot move payment from {payment_status} to {target}")));
            }
            Ok(Transition::to(OrderState::new(status, *target)))
        }
    }
}

fn ensure_open(status: OrderStatus) -> Result<()> {
    if status.is_terminal() {
        return Err(EcommerceError::validation(format!("order is already {status}")));
    }
    Ok(())
}

fn is_forward(from: OrderStatus, to: OrderStatus) -> bool {
    match (from.step(), to.step()) {
        (_, None) => true,
        (Some(a), Some(b)) => b > a,
        (None, Some(_)) => false,
    }
}
