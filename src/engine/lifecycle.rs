use chrono::{Duration, Utc};
use tracing::info;

use super::edits::{mark_pending, EditField};
use crate::error::AppError;
use crate::gateway::notify;
use crate::lock::AssignGuard;
use crate::models::driver::{Driver, DriverStatus};
use crate::models::order::{display_id, Order, OrderLocation, OrderStatus, PaymentMethod};
use crate::sessions;
use crate::state::{AppState, DispatchEvent};

#[derive(Debug, Clone, Default)]
pub struct OrderSeed {
    pub customer_id: Option<i64>,
    pub customer_name: String,
    pub items: String,
    pub location: Option<OrderLocation>,
}

#[derive(Debug)]
pub enum AssignOutcome {
    Assigned(Driver),
    /// No driver online; the order stays in `New` and waits.
    Queued,
}

#[derive(Debug, Clone, Copy)]
pub enum ArriveTrigger {
    Manual,
    /// Proximity-detected; carries the measured distance to the destination.
    Auto { distance_m: f64 },
}

/// Check the from-state and flip the status, returning the updated order.
fn advance(
    state: &AppState,
    order_id: u64,
    action: &'static str,
    allowed: &[OrderStatus],
    to: OrderStatus,
) -> Result<Order, AppError> {
    let Some(mut order) = state.orders.get_mut(&order_id) else {
        return Err(AppError::NotFound(format!("order {order_id} not found")));
    };
    if !allowed.contains(&order.status) {
        state
            .metrics
            .transitions_total
            .with_label_values(&[action, "invalid"])
            .inc();
        return Err(AppError::InvalidTransition {
            from: order.status,
            action,
        });
    }
    order.status = to;
    state
        .metrics
        .transitions_total
        .with_label_values(&[action, "success"])
        .inc();
    Ok(order.clone())
}

pub async fn create_order(state: &AppState, seed: OrderSeed) -> Order {
    let id = state.next_order_id();
    let mut order = Order::new(id);
    order.customer_id = seed.customer_id;
    order.customer_name = seed.customer_name;
    order.items = seed.items;
    order.location = seed.location;

    if let Some(customer_id) = order.customer_id {
        state.ensure_customer(customer_id, Some(&order.customer_name));
    }
    state.orders.insert(id, order.clone());
    state.metrics.orders_created_total.inc();
    state.publish(DispatchEvent::OrderCreated { order_id: id });
    state.save().await;
    info!(order_id = id, "order created");
    order
}

/// Bind the first online driver to a `New` order. Guarded by the
/// cross-process lock so two instances cannot double-assign; losing the race
/// is a normal outcome surfaced as `AssignmentInProgress`.
pub async fn assign_order(state: &AppState, order_id: u64) -> Result<AssignOutcome, AppError> {
    {
        let Some(order) = state.orders.get(&order_id) else {
            return Err(AppError::NotFound(format!("order {order_id} not found")));
        };
        if order.status != OrderStatus::New {
            return Err(AppError::InvalidTransition {
                from: order.status,
                action: "assign",
            });
        }
    }

    let Some(_guard) = AssignGuard::acquire(&state.locks_dir, order_id) else {
        return Err(AppError::AssignmentInProgress(order_id));
    };

    let Some(driver) = state.first_online_driver() else {
        info!(order_id, "no eligible drivers; order stays queued");
        return Ok(AssignOutcome::Queued);
    };

    let order = {
        let mut order = advance(
            state,
            order_id,
            "assign",
            &[OrderStatus::New],
            OrderStatus::Assigned,
        )?;
        if let Some(mut entry) = state.orders.get_mut(&order_id) {
            entry.driver_id = Some(driver.id);
            order = entry.clone();
        }
        order
    };
    if let Some(mut entry) = state.drivers.get_mut(&driver.id) {
        entry.status = DriverStatus::Assigned;
    }

    state.publish(DispatchEvent::OrderStatus {
        order_id,
        status: OrderStatus::Assigned,
    });
    state.save().await;

    notify(
        state.gateway.as_ref(),
        driver.id,
        format!(
            "New assignment {}: {}",
            display_id(order_id),
            if order.items.is_empty() {
                "(no items listed)"
            } else {
                order.items.as_str()
            }
        ),
    )
    .await;
    if let Some(admin_id) = state.admin_id {
        notify(
            state.gateway.as_ref(),
            admin_id,
            format!("Order {} assigned to {}", display_id(order_id), driver.name),
        )
        .await;
    }
    info!(order_id, driver_id = driver.id, "order assigned");
    Ok(AssignOutcome::Assigned(driver))
}

pub async fn pickup_order(state: &AppState, order_id: u64, driver_id: i64) -> Result<(), AppError> {
    let order = advance(
        state,
        order_id,
        "pickup",
        &[OrderStatus::Assigned],
        OrderStatus::PickedUp,
    )?;
    if let Some(mut entry) = state.orders.get_mut(&order_id) {
        entry.driver_id = Some(driver_id);
    }
    if let Some(mut driver) = state.drivers.get_mut(&driver_id) {
        driver.status = DriverStatus::Busy;
    }

    state.publish(DispatchEvent::OrderStatus {
        order_id,
        status: OrderStatus::PickedUp,
    });
    state.save().await;

    if let Some(customer_id) = order.customer_id {
        let driver_name = state
            .drivers
            .get(&driver_id)
            .map(|d| d.name.clone())
            .unwrap_or_else(|| "your driver".to_string());
        notify(
            state.gateway.as_ref(),
            customer_id,
            format!(
                "Your order {} has been picked up. {} is on the way.",
                display_id(order_id),
                driver_name
            ),
        )
        .await;
    }
    Ok(())
}

pub async fn arrive_order(
    state: &AppState,
    order_id: u64,
    trigger: ArriveTrigger,
) -> Result<(), AppError> {
    let allowed: &[OrderStatus] = match trigger {
        ArriveTrigger::Manual => &[OrderStatus::PickedUp],
        ArriveTrigger::Auto { .. } => &[
            OrderStatus::New,
            OrderStatus::Assigned,
            OrderStatus::PickedUp,
        ],
    };
    let order = advance(state, order_id, "arrive", allowed, OrderStatus::Arrived)?;

    // Arrival ends the driver's live sharing.
    if let Some(driver_id) = order.driver_id {
        sessions::stop_for_driver(state, driver_id, "arrived").await;
    }

    state.publish(DispatchEvent::OrderStatus {
        order_id,
        status: OrderStatus::Arrived,
    });
    state.save().await;

    if let Some(customer_id) = order.customer_id {
        notify(
            state.gateway.as_ref(),
            customer_id,
            format!(
                "Hi, your order {} has arrived. Please collect your order.",
                display_id(order_id)
            ),
        )
        .await;
    }
    if let ArriveTrigger::Auto { distance_m } = trigger {
        state.metrics.auto_arrivals_total.inc();
        let rounded = distance_m.round() as u64;
        if let Some(driver_id) = order.driver_id {
            notify(
                state.gateway.as_ref(),
                driver_id,
                format!(
                    "Auto-marked order {} as arrived (within {rounded}m).",
                    display_id(order_id)
                ),
            )
            .await;
        }
        if let Some(admin_id) = state.admin_id {
            notify(
                state.gateway.as_ref(),
                admin_id,
                format!(
                    "Order {} auto-arrived (driver within {rounded}m).",
                    display_id(order_id)
                ),
            )
            .await;
        }
    }
    Ok(())
}

pub async fn complete_order(state: &AppState, order_id: u64) -> Result<(), AppError> {
    let order = advance(
        state,
        order_id,
        "complete",
        &[OrderStatus::Arrived],
        OrderStatus::Completed,
    )?;
    if let Some(driver_id) = order.driver_id {
        if let Some(mut driver) = state.drivers.get_mut(&driver_id) {
            driver.status = DriverStatus::Online;
        }
    }

    state.publish(DispatchEvent::OrderStatus {
        order_id,
        status: OrderStatus::Completed,
    });
    state.save().await;

    if let Some(customer_id) = order.customer_id {
        notify(
            state.gateway.as_ref(),
            customer_id,
            "Thank you for ordering! Please rate your delivery experience (1-5).",
        )
        .await;
    }
    Ok(())
}

pub async fn cancel_order(state: &AppState, order_id: u64) -> Result<(), AppError> {
    let non_terminal = [
        OrderStatus::New,
        OrderStatus::Assigned,
        OrderStatus::PickedUp,
        OrderStatus::Arrived,
    ];
    advance(state, order_id, "cancel", &non_terminal, OrderStatus::Cancelled)?;
    state
        .pending_edits
        .retain(|_, pending| pending.order_id != order_id);

    state.publish(DispatchEvent::OrderStatus {
        order_id,
        status: OrderStatus::Cancelled,
    });
    state.save().await;
    Ok(())
}

pub async fn archive_order(state: &AppState, order_id: u64) -> Result<(), AppError> {
    let archivable = [
        OrderStatus::New,
        OrderStatus::Assigned,
        OrderStatus::PickedUp,
        OrderStatus::Arrived,
        OrderStatus::Completed,
        OrderStatus::Cancelled,
    ];
    advance(state, order_id, "archive", &archivable, OrderStatus::Archived)?;

    state.publish(DispatchEvent::OrderStatus {
        order_id,
        status: OrderStatus::Archived,
    });
    state.save().await;
    Ok(())
}

/// Bulk form: archive everything older than the configured retention window.
pub async fn archive_stale(state: &AppState) -> usize {
    let archive_days = state
        .settings
        .read()
        .expect("settings lock poisoned")
        .archive_days;
    let cutoff = Utc::now() - Duration::days(archive_days);

    let mut archived = 0;
    for mut entry in state.orders.iter_mut() {
        if entry.created_at < cutoff && entry.status != OrderStatus::Archived {
            entry.status = OrderStatus::Archived;
            archived += 1;
        }
    }
    if archived > 0 {
        state
            .metrics
            .transitions_total
            .with_label_values(&["archive", "success"])
            .inc_by(archived as u64);
        state.save().await;
    }
    info!(archived, archive_days, "bulk archive pass");
    archived
}

pub async fn delete_order(state: &AppState, order_id: u64) -> Result<Order, AppError> {
    let Some((_, order)) = state.orders.remove(&order_id) else {
        return Err(AppError::NotFound(format!("order {order_id} not found")));
    };
    state
        .pending_edits
        .retain(|_, pending| pending.order_id != order_id);
    state.save().await;

    if let Some(admin_id) = state.admin_id {
        notify(
            state.gateway.as_ref(),
            admin_id,
            format!("Order {} deleted.", display_id(order_id)),
        )
        .await;
    }
    Ok(order)
}

pub async fn record_feedback(state: &AppState, order_id: u64, rating: u8) -> Result<(), AppError> {
    if !(1..=5).contains(&rating) {
        return Err(AppError::BadRequest(format!(
            "rating must be 1-5, got {rating}"
        )));
    }
    let order = {
        let Some(mut order) = state.orders.get_mut(&order_id) else {
            return Err(AppError::NotFound(format!("order {order_id} not found")));
        };
        order.feedback = Some(rating);
        order.clone()
    };
    state.save().await;

    if let Some(driver_id) = order.driver_id {
        let customer = if order.customer_name.is_empty() {
            "Customer".to_string()
        } else {
            order.customer_name.clone()
        };
        notify(
            state.gateway.as_ref(),
            driver_id,
            format!("{customer} gave you {rating} stars"),
        )
        .await;
    }
    if let Some(admin_id) = state.admin_id {
        notify(
            state.gateway.as_ref(),
            admin_id,
            format!("Feedback: {rating} for order {}", display_id(order_id)),
        )
        .await;
    }
    Ok(())
}

/// Idempotent: re-marking a paid order is harmless.
pub async fn mark_paid(state: &AppState, order_id: u64) -> Result<(), AppError> {
    {
        let Some(mut order) = state.orders.get_mut(&order_id) else {
            return Err(AppError::NotFound(format!("order {order_id} not found")));
        };
        order.paid = true;
    }
    state.save().await;
    Ok(())
}

/// Switching to cash clears the cash fields and opens a given-cash edit for
/// the operator, who sends the amount next.
pub async fn set_payment_method(
    state: &AppState,
    operator: Option<i64>,
    order_id: u64,
    method: PaymentMethod,
) -> Result<(), AppError> {
    {
        let Some(mut order) = state.orders.get_mut(&order_id) else {
            return Err(AppError::NotFound(format!("order {order_id} not found")));
        };
        order.payment_method = Some(method);
        if method == PaymentMethod::Cash {
            order.given_cash = None;
            order.change_cash = None;
        }
    }
    match (method, operator) {
        (PaymentMethod::Cash, Some(operator)) => {
            mark_pending(state, operator, order_id, EditField::GivenCash);
        }
        _ => {
            if let Some(operator) = operator {
                state.pending_edits.remove(&operator);
            }
        }
    }
    state.save().await;
    Ok(())
}
