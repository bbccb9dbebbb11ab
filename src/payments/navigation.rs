//! Navigation interception for the embedded payment page.
//!
//! The gateway page redirects to wallet and bank apps through custom URI
//! schemes. Those URLs must never be loaded in the embedded surface; they are
//! handed to the OS instead.

use tracing::{debug, info};

use crate::config::PaymentConfig;

/// Why a URL was diverted away from the embedded surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterceptReason {
    WalletDeepLink,
    GatewayRedirect,
    AppReturn,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavigationDecision {
    Load,
    Divert(InterceptReason),
}

/// Fixed matching rules, all applied verbatim to the raw URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NavigationPolicy {
    wallet_schemes: Vec<String>,
    gateway_marker: String,
    app_scheme: String,
}

impl Default for NavigationPolicy {
    fn default() -> Self {
        Self::new(&PaymentConfig::default())
    }
}

impl NavigationPolicy {
    pub fn new(config: &PaymentConfig) -> Self {
        Self {
            wallet_schemes: config.wallet_schemes.clone(),
            gateway_marker: config.gateway_redirect_marker.clone(),
            app_scheme: config.app_scheme.clone(),
        }
    }

    pub fn classify(&self, url: &str) -> Option<InterceptReason> {
        if self
            .wallet_schemes
            .iter()
            .any(|scheme| url.starts_with(scheme.as_str()))
        {
            return Some(InterceptReason::WalletDeepLink);
        }
        if !self.gateway_marker.is_empty() && url.contains(self.gateway_marker.as_str()) {
            return Some(InterceptReason::GatewayRedirect);
        }
        if !self.app_scheme.is_empty() && url.starts_with(self.app_scheme.as_str()) {
            return Some(InterceptReason::AppReturn);
        }
        None
    }

    pub fn decide(&self, url: &str) -> NavigationDecision {
        match self.classify(url) {
            Some(reason) => {
                info!(url = %url, reason = ?reason, "Diverting payment navigation");
                NavigationDecision::Divert(reason)
            }
            None => {
                debug!(url = %url, "Loading payment navigation");
                NavigationDecision::Load
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Host seams
// ---------------------------------------------------------------------------

/// The in-app web view that renders the gateway page.
pub trait BrowserSurface: Send + Sync {
    fn open(&self, url: &str);
    fn close(&self);
}

/// Hands a URL to whatever app the OS has registered for it.
pub trait ExternalOpener: Send + Sync {
    fn open_external(&self, url: &str) -> Result<(), String>;
}

/// Default opener backed by the platform URL handler.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemOpener;

impl ExternalOpener for SystemOpener {
    fn open_external(&self, url: &str) -> Result<(), String> {
        webbrowser::open(url).map_err(|e| format!("Failed to open external URL: {e}"))
    }
}
