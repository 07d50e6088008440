//! Invoice email delivery over SMTP.
//!
//! When SMTP is disabled the service logs what would have been sent and
//! reports success, so local environments work without a relay.

use crate::config::SmtpConfig;
use crate::models::{Client, Invoice};
use lettre::{
    message::{header::ContentType, Mailbox},
    transport::smtp::authentication::Credentials,
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};
use secrecy::ExposeSecret;
use service_core::error::AppError;
use tracing::{info, instrument};

pub struct EmailService {
    config: SmtpConfig,
    transport: Option<AsyncSmtpTransport<Tokio1Executor>>,
}

impl EmailService {
    pub fn new(config: SmtpConfig) -> Result<Self, AppError> {
        if !config.enabled {
            return Ok(Self {
                config,
                transport: None,
            });
        }

        let creds = Credentials::new(config.user.clone(), config.password.expose_secret().clone());

        let transport = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)
            .map_err(|e| AppError::EmailError(format!("Failed to create SMTP relay: {}", e)))?
            .port(config.port)
            .credentials(creds)
            .build();

        Ok(Self {
            config,
            transport: Some(transport),
        })
    }

    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    /// Email an invoice to a client. No-op (logged) when the client has no
    /// email address or SMTP is disabled.
    #[instrument(skip(self, invoice, client), fields(invoice_number = %invoice.invoice_number))]
    pub async fn send_invoice_email(
        &self,
        invoice: &Invoice,
        client: &Client,
    ) -> Result<(), AppError> {
        let Some(to_email) = client.email.as_deref() else {
            info!(client_id = %client.client_id, "Client has no email address, skipping delivery");
            return Ok(());
        };

        let subject = format!(
            "Invoice {} from your service provider",
            invoice.invoice_number
        );
        let body = render_invoice_body(invoice, client);

        if !self.config.enabled {
            info!(
                to = %to_email,
                subject = %subject,
                "[MOCK] Invoice email would be sent"
            );
            return Ok(());
        }

        let transport = self
            .transport
            .as_ref()
            .ok_or_else(|| AppError::EmailError("SMTP transport not initialized".to_string()))?;

        let from_mailbox: Mailbox =
            format!("{} <{}>", self.config.from_name, self.config.from_email)
                .parse()
                .map_err(|e| AppError::EmailError(format!("Invalid from address: {}", e)))?;

        let to_mailbox: Mailbox = to_email
            .parse()
            .map_err(|e| AppError::EmailError(format!("Invalid recipient: {}", e)))?;

        let message = Message::builder()
            .from(from_mailbox)
            .to(to_mailbox)
            .subject(&subject)
            .header(ContentType::TEXT_PLAIN)
            .body(body)
            .map_err(|e| AppError::EmailError(format!("Failed to build message: {}", e)))?;

        transport
            .send(message)
            .await
            .map_err(|e| AppError::EmailError(format!("Failed to send email: {}", e)))?;

        info!(to = %to_email, "Invoice email sent");

        Ok(())
    }
}

fn render_invoice_body(invoice: &Invoice, client: &Client) -> String {
    format!(
        "Dear {},\n\n\
         Please find your invoice details below.\n\n\
         Invoice number: {}\n\
         Amount due: {} {}\n\
         Due date: {}\n\n\
         Thank you for your business.\n",
        client.name, invoice.invoice_number, invoice.amount_due, invoice.currency, invoice.due_date
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, Utc};
    use rust_decimal::Decimal;
    use uuid::Uuid;

    fn sample_invoice() -> Invoice {
        Invoice {
            invoice_id: Uuid::new_v4(),
            tenant_id: Uuid::new_v4(),
            client_id: Uuid::new_v4(),
            invoice_number: "INV-000042".to_string(),
            status: "sent".to_string(),
            payment_status: "unpaid".to_string(),
            currency: "USD".to_string(),
            issue_date: Some(NaiveDate::from_ymd_opt(2026, 3, 1).unwrap()),
            due_date: NaiveDate::from_ymd_opt(2026, 3, 31).unwrap(),
            subtotal: Decimal::from_str_exact("100.00").unwrap(),
            tax_total: Decimal::from_str_exact("20.00").unwrap(),
            total: Decimal::from_str_exact("120.00").unwrap(),
            amount_paid: Decimal::ZERO,
            amount_due: Decimal::from_str_exact("120.00").unwrap(),
            notes: None,
            is_recurring: false,
            recurring_frequency: None,
            recurring_end_date: None,
            source_invoice_id: None,
            metadata: None,
            created_utc: Utc::now(),
            sent_utc: None,
            updated_utc: Utc::now(),
        }
    }

    fn sample_client(email: Option<&str>) -> Client {
        Client {
            client_id: Uuid::new_v4(),
            tenant_id: Uuid::new_v4(),
            name: "Acme Corp".to_string(),
            email: email.map(String::from),
            phone: None,
            address_line1: None,
            address_line2: None,
            city: None,
            state: None,
            postal_code: None,
            country: None,
            tax_number: None,
            created_utc: Utc::now(),
            updated_utc: Utc::now(),
        }
    }

    fn disabled_config() -> SmtpConfig {
        SmtpConfig {
            enabled: false,
            host: "localhost".to_string(),
            port: 587,
            user: String::new(),
            password: secrecy::Secret::new(String::new()),
            from_email: "billing@example.com".to_string(),
            from_name: "Billing".to_string(),
        }
    }

    #[test]
    fn test_body_contains_invoice_details() {
        let body = render_invoice_body(&sample_invoice(), &sample_client(Some("a@b.com")));
        assert!(body.contains("INV-000042"));
        assert!(body.contains("120.00 USD"));
        assert!(body.contains("2026-03-31"));
        assert!(body.contains("Acme Corp"));
    }

    #[tokio::test]
    async fn test_disabled_service_mock_sends() {
        let service = EmailService::new(disabled_config()).unwrap();
        assert!(!service.is_enabled());
        let result = service
            .send_invoice_email(&sample_invoice(), &sample_client(Some("a@b.com")))
            .await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_missing_recipient_is_skipped() {
        let service = EmailService::new(disabled_config()).unwrap();
        let result = service
            .send_invoice_email(&sample_invoice(), &sample_client(None))
            .await;
        assert!(result.is_ok());
    }
}
