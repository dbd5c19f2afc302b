use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::gateway::InboundPayload;
use crate::models::driver::GeoPoint;
use crate::models::order::{display_id, OrderLocation, OrderMedia};
use crate::state::AppState;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EditField {
    CustomerName,
    TotalAmount,
    GivenCash,
    Items,
    Location,
    AttachMedia,
    AssignCustomer,
}

/// One pending field edit per operator. The next matching inbound payload
/// from that operator is consumed as the field value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PendingEdit {
    pub order_id: u64,
    pub field: EditField,
}

pub fn mark_pending(state: &AppState, operator: i64, order_id: u64, field: EditField) {
    state
        .pending_edits
        .insert(operator, PendingEdit { order_id, field });
}

/// Open an edit slot and return the prompt to show the operator.
pub fn begin_edit(
    state: &AppState,
    operator: i64,
    order_id: u64,
    field: EditField,
) -> Result<String, AppError> {
    if !state.orders.contains_key(&order_id) {
        return Err(AppError::NotFound(format!("order {order_id} not found")));
    }
    mark_pending(state, operator, order_id, field);
    let id = display_id(order_id);
    Ok(match field {
        EditField::CustomerName => format!("Reply with the new customer name for order {id}"),
        EditField::TotalAmount => format!("Send the new total as $<amount> for order {id}"),
        EditField::GivenCash => format!("Send $<amount> to set given cash for order {id}"),
        EditField::Items => format!("Send the updated items for order {id}"),
        EditField::Location => format!("Send a location or map link for order {id}"),
        EditField::AttachMedia => format!("Send a photo, document or text to attach to order {id}"),
        EditField::AssignCustomer => {
            format!("Forward a contact or reply with a name for order {id}")
        }
    })
}

/// Parse `$12.50`, `12.50`, `$ 12.50`.
fn parse_amount(text: &str) -> Option<f64> {
    text.trim().trim_start_matches('$').trim().parse().ok()
}

/// Consume an operator payload against the pending edit, if any. Routing is
/// deterministic: the explicitly marked field decides, `$`-amounts parse only
/// for the money fields, and free text falls through to the location field.
/// Returns `None` when nothing was consumed.
pub async fn apply_operator_input(
    state: &AppState,
    operator: i64,
    payload: &InboundPayload,
) -> Result<Option<String>, AppError> {
    let Some(pending) = state.pending_edits.get(&operator).map(|p| *p) else {
        return Ok(None);
    };
    let order_id = pending.order_id;
    let id = display_id(order_id);
    let Some(mut order) = state.orders.get_mut(&order_id) else {
        state.pending_edits.remove(&operator);
        return Ok(Some(format!("Order {id} no longer exists")));
    };

    let message = match (pending.field, payload) {
        (EditField::TotalAmount, InboundPayload::Text { text }) => match parse_amount(text) {
            Some(total) => {
                order.set_total_amount(total);
                Some(format!("Total updated: {total:.2}"))
            }
            // keep the slot open and re-prompt
            None => return Ok(Some(format!("Send the total as $<amount> for order {id}"))),
        },
        (EditField::GivenCash, InboundPayload::Text { text }) => match parse_amount(text) {
            Some(given) => {
                order.set_given_cash(given);
                let change = order
                    .change_cash
                    .map(|c| format!("{c:.2}"))
                    .unwrap_or_else(|| "unset (no total yet)".to_string());
                Some(format!("Given cash set: {given:.2} - change: {change}"))
            }
            None => return Ok(Some(format!("Send $<amount> to set given cash for order {id}"))),
        },
        (EditField::CustomerName | EditField::AssignCustomer, InboundPayload::Text { text }) => {
            order.customer_name = text.clone();
            Some(format!("Customer name updated for order {id}"))
        }
        (
            EditField::CustomerName | EditField::AssignCustomer,
            InboundPayload::Contact { user_id, name },
        ) => {
            order.customer_name = name.clone();
            order.customer_id = *user_id;
            if let Some(customer_id) = user_id {
                state.ensure_customer(*customer_id, Some(name));
            }
            Some(format!("Customer updated for order {id}"))
        }
        (EditField::Items, InboundPayload::Text { text }) => {
            if !order.items.is_empty() {
                order.items.push('\n');
            }
            order.items.push_str(text);
            Some(format!("Items updated for order {id}"))
        }
        (EditField::Location, InboundPayload::Location { lat, lng }) => {
            order.location = Some(OrderLocation::Point(GeoPoint {
                lat: *lat,
                lng: *lng,
            }));
            Some(format!("Location attached to order {id}"))
        }
        (EditField::Location, InboundPayload::Text { text }) => {
            order.location = Some(OrderLocation::Text(text.clone()));
            Some(format!("Location updated for order {id}"))
        }
        (EditField::AttachMedia, InboundPayload::Media { file_id, .. }) => {
            order.media = Some(OrderMedia::File {
                file_id: file_id.clone(),
            });
            Some(format!("Attachment saved to order {id}"))
        }
        (EditField::AttachMedia, InboundPayload::Text { text }) => {
            order.media = Some(OrderMedia::Text(text.clone()));
            Some(format!("Text attached to order {id}"))
        }
        _ => None,
    };
    drop(order);

    if message.is_some() {
        state.pending_edits.remove(&operator);
        state.save().await;
    }
    Ok(message)
}
