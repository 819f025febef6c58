use log::{error, info, warn};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

const SEND_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Error, Debug)]
pub enum MailError {
    #[error("Mail transport failed: {0}")]
    Transport(String),
}

/// Outbound mail seam. The checkout path only ever talks to this trait.
pub trait Mailer: Send + Sync {
    fn send(&self, from: &str, to: &str, subject: &str, body: &str) -> Result<(), MailError>;
}

/// Default transport: writes the receipt to the application log. SMTP
/// credentials are accepted as configuration but delivery stays behind the
/// trait.
pub struct LogMailer;

impl Mailer for LogMailer {
    fn send(&self, from: &str, to: &str, subject: &str, body: &str) -> Result<(), MailError> {
        info!("mail from={} to={} subject={:?}\n{}", from, to, subject, body);
        Ok(())
    }
}

pub struct ReceiptLine {
    pub name: String,
    pub quantity: i32,
    pub unit_price: i64,
}

pub struct Receipt {
    pub order_id: Uuid,
    pub customer_name: String,
    pub customer_email: String,
    pub lines: Vec<ReceiptLine>,
    pub subtotal: i64,
    pub delivery_fee: i64,
    pub service_fee: i64,
    pub total: i64,
    pub app_url: String,
}

pub fn receipt_body(receipt: &Receipt) -> String {
    let mut body = format!(
        "Hi {},\n\nThanks for your order {}.\n\n",
        receipt.customer_name, receipt.order_id
    );
    for line in &receipt.lines {
        body.push_str(&format!(
            "  {} x {} @ {} = {}\n",
            line.name,
            line.quantity,
            line.unit_price,
            line.unit_price * i64::from(line.quantity)
        ));
    }
    body.push_str(&format!(
        "\nSubtotal: {}\nDelivery: {}\nService: {}\nTotal: {}\n\nTrack your order at {}/orders/{}\n",
        receipt.subtotal,
        receipt.delivery_fee,
        receipt.service_fee,
        receipt.total,
        receipt.app_url,
        receipt.order_id
    ));
    body
}

/// Fires the receipt on a background task with a send timeout. The order is
/// already committed; failures here are logged and dropped.
pub fn send_receipt(mailer: Arc<dyn Mailer>, from: String, receipt: Receipt) {
    tokio::spawn(async move {
        let order_id = receipt.order_id;
        let to = receipt.customer_email.clone();
        let subject = format!("Your Harvest Market order {}", order_id);
        let body = receipt_body(&receipt);

        let send = tokio::task::spawn_blocking(move || mailer.send(&from, &to, &subject, &body));
        match tokio::time::timeout(SEND_TIMEOUT, send).await {
            Ok(Ok(Ok(()))) => info!("Receipt for order {} sent", order_id),
            Ok(Ok(Err(e))) => error!("Failed to send receipt for order {}: {}", order_id, e),
            Ok(Err(e)) => error!("Receipt task failed for order {}: {}", order_id, e),
            Err(_) => warn!("Receipt send for order {} timed out", order_id),
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_receipt_body_lists_lines_and_totals() {
        let receipt = Receipt {
            order_id: Uuid::nil(),
            customer_name: "Jo".to_string(),
            customer_email: "jo@example.com".to_string(),
            lines: vec![ReceiptLine {
                name: "Carrots".to_string(),
                quantity: 3,
                unit_price: 100,
            }],
            subtotal: 300,
            delivery_fee: 50,
            service_fee: 25,
            total: 375,
            app_url: "http://localhost:8080".to_string(),
        };
        let body = receipt_body(&receipt);
        assert!(body.contains("Carrots x 3 @ 100 = 300"));
        assert!(body.contains("Total: 375"));
        assert!(body.contains("Hi Jo"));
    }
}
