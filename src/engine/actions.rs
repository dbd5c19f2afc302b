use crate::models::driver::Lang;
use crate::models::order::PaymentMethod;

/// Commands carried by button-press callbacks, encoded as
/// `verb:arg1:arg2...` strings by the messaging front end.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Command {
    Assign(u64),
    Pickup(u64),
    Arrived(u64),
    Complete(u64),
    StartLive(u64),
    StopLive(u64),
    Route(u64),
    SetPay { method: PaymentMethod, order_id: u64 },
    SetPaid(u64),
    SetTotal(u64),
    SetLocation(u64),
    EditCustomer(u64),
    EditItems(u64),
    Attach(u64),
    Feedback { rating: u8, order_id: u64 },
    Cancel(u64),
    Delete(u64),
    /// `None` archives everything past the retention window.
    Archive(Option<u64>),
    ApproveDriver(i64),
    DriverLang(Lang),
}

pub fn parse(action: &str) -> Option<Command> {
    let mut parts = action.split(':');
    let verb = parts.next()?;
    let args: Vec<&str> = parts.collect();

    let order_id = |idx: usize| args.get(idx).and_then(|raw| raw.parse::<u64>().ok());

    match verb {
        "go" => Some(Command::Assign(order_id(0)?)),
        "driver_pickup" => Some(Command::Pickup(order_id(0)?)),
        "driver_arrived" => Some(Command::Arrived(order_id(0)?)),
        "driver_complete" => Some(Command::Complete(order_id(0)?)),
        "driver_start_live" => Some(Command::StartLive(order_id(0)?)),
        "driver_stop_live" => Some(Command::StopLive(order_id(0)?)),
        "driver_route" => Some(Command::Route(order_id(0)?)),
        "setpay" => {
            let method = match *args.first()? {
                "CASH" => PaymentMethod::Cash,
                "QR" => PaymentMethod::Qr,
                _ => return None,
            };
            Some(Command::SetPay {
                method,
                order_id: order_id(1)?,
            })
        }
        "setpaid" => Some(Command::SetPaid(order_id(0)?)),
        "settotal" => Some(Command::SetTotal(order_id(0)?)),
        "setloc" => Some(Command::SetLocation(order_id(0)?)),
        "editcust" => Some(Command::EditCustomer(order_id(0)?)),
        "edititems" => Some(Command::EditItems(order_id(0)?)),
        "attach" => Some(Command::Attach(order_id(0)?)),
        "fb" => {
            let rating = args.first()?.parse::<u8>().ok()?;
            Some(Command::Feedback {
                rating,
                order_id: order_id(1)?,
            })
        }
        "cancel" => Some(Command::Cancel(order_id(0)?)),
        "delete" => Some(Command::Delete(order_id(0)?)),
        // id 0 means the bulk-by-age form
        "archive_approve" => Some(Command::Archive(order_id(0).filter(|id| *id > 0))),
        "drv_approve" => Some(Command::ApproveDriver(
            args.first()?.parse::<i64>().ok()?,
        )),
        "driver_lang" => {
            let lang = match *args.first()? {
                "en" => Lang::En,
                "kh" => Lang::Kh,
                _ => return None,
            };
            Some(Command::DriverLang(lang))
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::{parse, Command};
    use crate::models::order::PaymentMethod;

    #[test]
    fn parses_the_action_vocabulary() {
        assert_eq!(parse("go:12"), Some(Command::Assign(12)));
        assert_eq!(parse("driver_pickup:3"), Some(Command::Pickup(3)));
        assert_eq!(parse("driver_start_live:7"), Some(Command::StartLive(7)));
        assert_eq!(
            parse("setpay:CASH:5"),
            Some(Command::SetPay {
                method: PaymentMethod::Cash,
                order_id: 5
            })
        );
        assert_eq!(
            parse("fb:4:9"),
            Some(Command::Feedback {
                rating: 4,
                order_id: 9
            })
        );
        assert_eq!(parse("archive_approve:6"), Some(Command::Archive(Some(6))));
        assert_eq!(parse("archive_approve:0"), Some(Command::Archive(None)));
        assert_eq!(parse("drv_approve:42"), Some(Command::ApproveDriver(42)));
    }

    #[test]
    fn rejects_malformed_actions() {
        assert_eq!(parse("go"), None);
        assert_eq!(parse("go:abc"), None);
        assert_eq!(parse("setpay:WIRE:5"), None);
        assert_eq!(parse("unknown:1"), None);
        assert_eq!(parse(""), None);
    }
}
