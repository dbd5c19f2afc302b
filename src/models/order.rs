use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::driver::GeoPoint;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrderStatus {
    New,
    Assigned,
    PickedUp,
    Arrived,
    Completed,
    Cancelled,
    Archived,
}

impl OrderStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            OrderStatus::Completed | OrderStatus::Cancelled | OrderStatus::Archived
        )
    }

    /// In a driver's hands: assigned through arrived.
    pub fn is_active(self) -> bool {
        matches!(
            self,
            OrderStatus::Assigned | OrderStatus::PickedUp | OrderStatus::Arrived
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum PaymentMethod {
    Cash,
    Qr,
}

/// Destination as entered by the operator or customer: either structured
/// coordinates (enables auto-arrival and route previews) or free text such as
/// a maps URL, a codename, or delivery instructions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderLocation {
    Point(GeoPoint),
    Text(String),
}

impl OrderLocation {
    pub fn as_point(&self) -> Option<GeoPoint> {
        match self {
            OrderLocation::Point(p) => Some(*p),
            OrderLocation::Text(_) => None,
        }
    }
}

/// Note or platform media file attached to an order by the operator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderMedia {
    Text(String),
    File { file_id: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: u64,
    pub status: OrderStatus,
    #[serde(default)]
    pub customer_id: Option<i64>,
    #[serde(default)]
    pub customer_name: String,
    #[serde(default)]
    pub location: Option<OrderLocation>,
    #[serde(default)]
    pub total_amount: Option<f64>,
    #[serde(default)]
    pub payment_method: Option<PaymentMethod>,
    #[serde(default)]
    pub paid: bool,
    #[serde(default)]
    pub given_cash: Option<f64>,
    #[serde(default)]
    pub change_cash: Option<f64>,
    #[serde(default)]
    pub items: String,
    #[serde(default)]
    pub media: Option<OrderMedia>,
    /// 1..=5 once the customer has rated the delivery.
    #[serde(default)]
    pub feedback: Option<u8>,
    #[serde(default)]
    pub driver_id: Option<i64>,
    pub created_at: DateTime<Utc>,
}

impl Order {
    pub fn new(id: u64) -> Self {
        Self {
            id,
            status: OrderStatus::New,
            customer_id: None,
            customer_name: String::new(),
            location: None,
            total_amount: None,
            payment_method: None,
            paid: false,
            given_cash: None,
            change_cash: None,
            items: String::new(),
            media: None,
            feedback: None,
            driver_id: None,
            created_at: Utc::now(),
        }
    }

    /// Invariant: `change_cash = given_cash - total_amount` whenever both are
    /// set; left unset while the total is still unknown.
    pub fn set_given_cash(&mut self, given: f64) {
        self.given_cash = Some(given);
        self.change_cash = self.total_amount.map(|total| given - total);
    }

    pub fn set_total_amount(&mut self, total: f64) {
        self.total_amount = Some(total);
        if let Some(given) = self.given_cash {
            self.change_cash = Some(given - total);
        }
    }

    pub fn destination(&self) -> Option<GeoPoint> {
        self.location.as_ref().and_then(OrderLocation::as_point)
    }
}

/// Zero-padded display id, `#0042`.
pub fn display_id(id: u64) -> String {
    format!("#{id:04}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn change_follows_given_and_total() {
        let mut order = Order::new(1);
        order.set_given_cash(20.0);
        assert_eq!(order.change_cash, None);

        order.set_total_amount(12.5);
        assert_eq!(order.change_cash, Some(7.5));

        order.set_given_cash(15.0);
        assert_eq!(order.change_cash, Some(2.5));
    }

    #[test]
    fn terminal_statuses() {
        assert!(OrderStatus::Completed.is_terminal());
        assert!(OrderStatus::Cancelled.is_terminal());
        assert!(OrderStatus::Archived.is_terminal());
        assert!(!OrderStatus::Arrived.is_terminal());
        assert!(!OrderStatus::New.is_terminal());
    }

    #[test]
    fn display_id_is_zero_padded() {
        assert_eq!(display_id(7), "#0007");
        assert_eq!(display_id(12345), "#12345");
    }
}
