pub mod actions;
pub mod edits;
pub mod lifecycle;

use std::sync::Arc;

use tracing::{info, warn};

use crate::engine::actions::Command;
use crate::engine::edits::EditField;
use crate::error::AppError;
use crate::gateway::{notify, InboundEvent, InboundPayload};
use crate::models::driver::{Driver, DriverStatus, GeoPoint};
use crate::models::order::{display_id, Order, OrderLocation, PaymentMethod};
use crate::models::qr::QrMedia;
use crate::sessions;
use crate::sessions::LocationOutcome;
use crate::state::AppState;

/// Top-level inbound dispatcher. Failures are caught here and degraded to a
/// plain-text outcome so one bad event can never poison the next.
pub async fn handle_event(state: &Arc<AppState>, event: InboundEvent) -> String {
    let from = event.from;
    let result = match &event.payload {
        InboundPayload::Callback { action } => match actions::parse(action) {
            Some(command) => {
                let result = dispatch_command(state, from, command).await;
                if result.is_ok() {
                    cleanup_origin_message(state, &event, command).await;
                }
                result
            }
            None => {
                warn!(from, action = %action, "unsupported action");
                Ok("Unsupported action".to_string())
            }
        },
        payload => route_payload(state, &event, payload).await,
    };

    match result {
        Ok(message) => message,
        Err(err) => {
            info!(from, error = %err, "event degraded to notice");
            err.to_string()
        }
    }
}

/// An assignment clears the action buttons on the prompt message; a delete
/// removes the prompt altogether.
async fn cleanup_origin_message(state: &Arc<AppState>, event: &InboundEvent, command: Command) {
    let Some(message_id) = event.message_id else {
        return;
    };
    let result = match command {
        Command::Assign(_) => state.gateway.edit_keyboard(event.chat, message_id).await,
        Command::Delete(_) => state.gateway.delete_message(event.chat, message_id).await,
        _ => return,
    };
    if let Err(err) = result {
        warn!(chat = event.chat, message_id, error = %err, "origin message cleanup failed");
    }
}

async fn route_payload(
    state: &Arc<AppState>,
    event: &InboundEvent,
    payload: &InboundPayload,
) -> Result<String, AppError> {
    let from = event.from;

    // Operator input is consumed by the pending-edit slot first.
    if state.admin_id == Some(from) {
        return match edits::apply_operator_input(state, from, payload).await? {
            Some(message) => Ok(message),
            None => Ok("Ignored".to_string()),
        };
    }

    if state.drivers.contains_key(&from) {
        if let InboundPayload::Location { lat, lng } = payload {
            let point = GeoPoint {
                lat: *lat,
                lng: *lng,
            };
            return match sessions::update_location(state, from, point).await? {
                LocationOutcome::NoActiveSession => {
                    Ok("No active live session. Use START LIVE before sending location.".to_string())
                }
                LocationOutcome::Updated { auto_arrived, .. } if auto_arrived => {
                    Ok("Location shared. Arrival detected.".to_string())
                }
                LocationOutcome::Updated { .. } => Ok("Location shared".to_string()),
            };
        }
        return Ok("Ignored".to_string());
    }

    // Anyone else is a customer; register them on first contact.
    state.ensure_customer(from, event.sender_name.as_deref());
    match payload {
        InboundPayload::Location { lat, lng } => {
            let Some(order) = state.latest_new_order_for_customer(from) else {
                return Ok("Ignored".to_string());
            };
            if let Some(mut entry) = state.orders.get_mut(&order.id) {
                entry.location = Some(OrderLocation::Point(GeoPoint {
                    lat: *lat,
                    lng: *lng,
                }));
            }
            state.save().await;
            Ok("Location saved to your order.".to_string())
        }
        InboundPayload::Text { text } => {
            if let Some(order) = state.latest_new_order_for_customer(from) {
                if let Some(mut entry) = state.orders.get_mut(&order.id) {
                    if !entry.items.is_empty() {
                        entry.items.push('\n');
                    }
                    entry.items.push_str(text);
                }
                state.save().await;
                return Ok("Added to order items.".to_string());
            }
            match try_qr_payment(state, from, payload).await {
                Some(message) => Ok(message),
                None => Ok("Ignored".to_string()),
            }
        }
        InboundPayload::Media { .. } => match try_qr_payment(state, from, payload).await {
            Some(message) => Ok(message),
            None => Ok("Ignored".to_string()),
        },
        _ => Ok("Ignored".to_string()),
    }
}

/// Match a customer's payment proof against the registered QR entries. A hit
/// marks their open QR order paid and tells driver and operator.
async fn try_qr_payment(
    state: &Arc<AppState>,
    customer_id: i64,
    payload: &InboundPayload,
) -> Option<String> {
    let order: Order = state
        .orders
        .iter()
        .filter(|entry| {
            let order = entry.value();
            order.customer_id == Some(customer_id)
                && order.payment_method == Some(PaymentMethod::Qr)
                && !order.paid
        })
        .max_by_key(|entry| entry.value().id)
        .map(|entry| entry.value().clone())?;

    let matched = state.qr_codes.iter().any(|entry| {
        let qr = entry.value();
        if !qr.enabled {
            return false;
        }
        match payload {
            InboundPayload::Text { text } => {
                text.contains(&qr.code)
                    || matches!(&qr.media, Some(QrMedia::Text(t)) if text.contains(t))
            }
            InboundPayload::Media { file_id, .. } => {
                matches!(&qr.media, Some(QrMedia::File { file_id: f }) if f == file_id)
            }
            _ => false,
        }
    });
    if !matched {
        return None;
    }

    if let Some(mut entry) = state.orders.get_mut(&order.id) {
        entry.paid = true;
    }
    state.save().await;

    if let Some(driver_id) = order.driver_id {
        notify(
            state.gateway.as_ref(),
            driver_id,
            format!("Order {} marked PAID by customer.", display_id(order.id)),
        )
        .await;
    }
    if let Some(admin_id) = state.admin_id {
        notify(
            state.gateway.as_ref(),
            admin_id,
            format!("Order {} paid via QR", display_id(order.id)),
        )
        .await;
    }
    Some(format!(
        "Thanks - payment received for order {}.",
        display_id(order.id)
    ))
}

/// Approve a pending registration; the driver can connect afterwards.
pub async fn approve_driver(state: &AppState, driver_id: i64) -> Result<Driver, AppError> {
    let driver = {
        let Some(mut driver) = state.drivers.get_mut(&driver_id) else {
            return Err(AppError::NotFound(format!("driver {driver_id} not found")));
        };
        if driver.status != DriverStatus::Pending {
            return Err(AppError::BadRequest(format!(
                "driver {driver_id} is not pending"
            )));
        }
        driver.status = DriverStatus::Offline;
        driver.clone()
    };
    state.save().await;

    notify(
        state.gateway.as_ref(),
        driver_id,
        "Registration approved! You can now connect.",
    )
    .await;
    Ok(driver)
}

/// Execute one parsed command on behalf of `from`.
pub async fn dispatch_command(
    state: &Arc<AppState>,
    from: i64,
    command: Command,
) -> Result<String, AppError> {
    match command {
        Command::Assign(id) => match lifecycle::assign_order(state, id).await? {
            lifecycle::AssignOutcome::Assigned(driver) => {
                Ok(format!("Order {} assigned to {}", display_id(id), driver.name))
            }
            lifecycle::AssignOutcome::Queued => {
                Ok("No available drivers - order kept in queue".to_string())
            }
        },
        Command::Pickup(id) => {
            lifecycle::pickup_order(state, id, from).await?;
            Ok("You picked up the order".to_string())
        }
        Command::Arrived(id) => {
            lifecycle::arrive_order(state, id, lifecycle::ArriveTrigger::Manual).await?;
            Ok("Marked as arrived".to_string())
        }
        Command::Complete(id) => {
            lifecycle::complete_order(state, id).await?;
            Ok(format!("Completed order {}", display_id(id)))
        }
        Command::StartLive(id) => {
            let session = sessions::start(state, from, id).await?;
            Ok(format!(
                "Live location started (valid until {})",
                session.expires_at.format("%H:%M")
            ))
        }
        Command::StopLive(id) => match sessions::stop(state, from, id).await {
            Some(_) => Ok("Live location stopped".to_string()),
            None => Ok("No active live session".to_string()),
        },
        Command::Route(id) => match sessions::route_preview(state, from, id)? {
            Some(preview) => Ok(format!(
                "Route preview: {} m, ETA {} min",
                preview.distance_m.round() as u64,
                preview.eta_secs.div_ceil(60)
            )),
            None => Ok("Route preview unavailable".to_string()),
        },
        Command::SetPay { method, order_id } => {
            lifecycle::set_payment_method(state, Some(from), order_id, method).await?;
            match method {
                PaymentMethod::Cash => Ok(format!(
                    "Payment method set to CASH - send $<amount> to set given cash for order {}",
                    display_id(order_id)
                )),
                PaymentMethod::Qr => Ok("Payment method set to QR".to_string()),
            }
        }
        Command::SetPaid(id) => {
            lifecycle::mark_paid(state, id).await?;
            Ok("Marked as PAID".to_string())
        }
        Command::SetTotal(id) => edits::begin_edit(state, from, id, EditField::TotalAmount),
        Command::SetLocation(id) => edits::begin_edit(state, from, id, EditField::Location),
        Command::EditCustomer(id) => edits::begin_edit(state, from, id, EditField::CustomerName),
        Command::EditItems(id) => edits::begin_edit(state, from, id, EditField::Items),
        Command::Attach(id) => edits::begin_edit(state, from, id, EditField::AttachMedia),
        Command::Feedback { rating, order_id } => {
            lifecycle::record_feedback(state, order_id, rating).await?;
            Ok(format!("Thanks for your {rating} star rating"))
        }
        Command::Cancel(id) => {
            lifecycle::cancel_order(state, id).await?;
            Ok("Order cancelled".to_string())
        }
        Command::Delete(id) => {
            lifecycle::delete_order(state, id).await?;
            Ok(format!("Deleted order {}", display_id(id)))
        }
        Command::Archive(Some(id)) => {
            lifecycle::archive_order(state, id).await?;
            Ok(format!("Order {} archived", display_id(id)))
        }
        Command::Archive(None) => {
            let archived = lifecycle::archive_stale(state).await;
            Ok(format!("Archived {archived} orders"))
        }
        Command::ApproveDriver(driver_id) => {
            let driver = approve_driver(state, driver_id).await?;
            Ok(format!("Driver {} approved", driver.name))
        }
        Command::DriverLang(lang) => {
            let Some(mut driver) = state.drivers.get_mut(&from) else {
                return Err(AppError::NotFound(format!("driver {from} not found")));
            };
            driver.lang = lang;
            drop(driver);
            state.save().await;
            Ok("Language updated".to_string())
        }
    }
}
