use chrono::Duration;
use serde::{Deserialize, Serialize};

use crate::domain::{format_cents, Cents};

/// Price of one unit, in cents (1.00).
pub const DEFAULT_UNIT_PRICE_CENTS: Cents = 100;

/// Longest an auction may run: ten 365-day years.
pub const MAX_AUCTION_DURATION_DAYS: i64 = 10 * 365;

pub const DEFAULT_PAYOUT_CONTACT: &str = "payments@rooster.market";

/// Market-wide settings shared by the ledger and auction services.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarketConfig {
    pub unit_price_cents: Cents,
    #[serde(with = "crate::domain::duration_millis")]
    pub max_auction_duration: Duration,
    /// Where buyers send payments and sell refunds are paid from
    pub payout_contact: String,
}

impl Default for MarketConfig {
    fn default() -> Self {
        Self {
            unit_price_cents: DEFAULT_UNIT_PRICE_CENTS,
            max_auction_duration: Duration::days(MAX_AUCTION_DURATION_DAYS),
            payout_contact: DEFAULT_PAYOUT_CONTACT.to_string(),
        }
    }
}

impl MarketConfig {
    pub fn with_unit_price(mut self, cents: Cents) -> Self {
        self.unit_price_cents = cents;
        self
    }

    pub fn with_max_auction_duration(mut self, max: Duration) -> Self {
        self.max_auction_duration = max;
        self
    }

    pub fn with_payout_contact(mut self, contact: impl Into<String>) -> Self {
        self.payout_contact = contact.into();
        self
    }
}

/// How to buy units, shown to users before they pay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentInstructions {
    pub payout_contact: String,
    pub unit_price_cents: Cents,
    pub steps: Vec<String>,
}

impl PaymentInstructions {
    pub fn from_config(config: &MarketConfig) -> Self {
        let price = format_cents(config.unit_price_cents);
        Self {
            payout_contact: config.payout_contact.clone(),
            unit_price_cents: config.unit_price_cents,
            steps: vec![
                format!("1. Send payment to {}", config.payout_contact),
                format!("2. Each unit of rooster cash costs {}", price),
                "3. Include your user ID in the payment note".to_string(),
                "4. Once payment is confirmed, rooster cash will be added to your wallet"
                    .to_string(),
            ],
        }
    }
}
