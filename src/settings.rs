use figment::{
    providers::{Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct StripeSettings {
    pub api_key: String,
    #[serde(default)]
    pub account_id: String,
    #[serde(default)]
    pub stripe_version: String,
    #[serde(default = "default_stripe_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for StripeSettings {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            account_id: String::new(),
            stripe_version: String::new(),
            timeout_ms: default_stripe_timeout_ms(),
        }
    }
}

/// Shop-level configuration consumed by the payment methods.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct ShopSettings {
    /// Public base URL of the shop, used to assemble gateway return URLs.
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub shop_name: String,
    #[serde(default)]
    pub statement_descriptor: String,
    #[serde(default)]
    pub allow_moto_transactions: bool,
    #[serde(default)]
    pub send_stripe_charge_emails: bool,
}

impl ShopSettings {
    /// Descriptor shown on the customer's statement, falling back to the shop name.
    pub fn statement_descriptor(&self) -> &str {
        if self.statement_descriptor.trim().is_empty() {
            self.shop_name.trim()
        } else {
            self.statement_descriptor.trim()
        }
    }
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub stripe: StripeSettings,
    #[serde(default)]
    pub shop: ShopSettings,
    pub server_port: u16,
    #[serde(default = "default_session_ttl", with = "humantime_serde")]
    pub session_ttl: Duration,
    /// redb file mapping shop customer numbers to Stripe customers.
    #[serde(default = "default_customer_store_path")]
    pub customer_store_path: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            stripe: StripeSettings::default(),
            shop: ShopSettings::default(),
            server_port: 8080,
            session_ttl: default_session_ttl(),
            customer_store_path: default_customer_store_path(),
        }
    }
}

impl Config {
    /// Load from config.toml (if present) and environment variables.
    /// Environment variables override file values.
    /// Supported env keys: STRIPE_API_KEY, STRIPE_ACCOUNT_ID, STRIPE_VERSION,
    /// STRIPE_TIMEOUT_MS, SHOP_BASE_URL, SHOP_NAME, SHOP_STATEMENT_DESCRIPTOR,
    /// SHOP_ALLOW_MOTO_TRANSACTIONS, SHOP_SEND_STRIPE_CHARGE_EMAILS,
    /// SERVER_PORT, SESSION_TTL, CUSTOMER_STORE_PATH
    pub fn load() -> Self {
        let base: Config = Default::default();
        let mut fig = Figment::from(Serialized::defaults(base));
        if std::path::Path::new("config.toml").exists() {
            fig = fig.merge(Toml::file("config.toml"));
        }
        let mut cfg: Config = fig.extract().unwrap_or_default();
        cfg.apply_env(|key| std::env::var(key).ok());
        cfg
    }

    pub fn from_env() -> Self {
        Self::load()
    }

    fn apply_env(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(v) = var("STRIPE_API_KEY") {
            self.stripe.api_key = v;
        }
        if let Some(v) = var("STRIPE_ACCOUNT_ID") {
            self.stripe.account_id = v;
        }
        if let Some(v) = var("STRIPE_VERSION") {
            self.stripe.stripe_version = v;
        }
        if let Some(v) = var("STRIPE_TIMEOUT_MS") {
            self.stripe.timeout_ms = v.parse().unwrap_or(self.stripe.timeout_ms);
        }
        if let Some(v) = var("SHOP_BASE_URL") {
            self.shop.base_url = if v.trim().is_empty() { None } else { Some(v) };
        }
        if let Some(v) = var("SHOP_NAME") {
            self.shop.shop_name = v;
        }
        if let Some(v) = var("SHOP_STATEMENT_DESCRIPTOR") {
            self.shop.statement_descriptor = v;
        }
        if let Some(v) = var("SHOP_ALLOW_MOTO_TRANSACTIONS") {
            self.shop.allow_moto_transactions = parse_flag(&v);
        }
        if let Some(v) = var("SHOP_SEND_STRIPE_CHARGE_EMAILS") {
            self.shop.send_stripe_charge_emails = parse_flag(&v);
        }
        if let Some(v) = var("SERVER_PORT") {
            self.server_port = v.parse().unwrap_or(self.server_port);
        }
        if let Some(v) = var("SESSION_TTL") {
            self.session_ttl = parse_duration_env(&v, self.session_ttl);
        }
        if let Some(v) = var("CUSTOMER_STORE_PATH") {
            if !v.trim().is_empty() {
                self.customer_store_path = PathBuf::from(v);
            }
        }
    }
}

fn parse_flag(value: &str) -> bool {
    matches!(value, "1" | "true" | "TRUE" | "yes" | "YES")
}

fn parse_duration_env(value: &str, current: Duration) -> Duration {
    humantime::parse_duration(value).unwrap_or(current)
}

fn default_stripe_timeout_ms() -> u64 {
    15_000
}

fn default_session_ttl() -> Duration {
    Duration::from_secs(3600)
}

fn default_customer_store_path() -> PathBuf {
    PathBuf::from("data/stripe_customers.redb")
}
