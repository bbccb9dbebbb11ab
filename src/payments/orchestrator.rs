use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::navigation::{BrowserSurface, ExternalOpener, NavigationDecision, NavigationPolicy};
use super::poller::{watch_payment, PollOutcome};
use super::{
    compute_total, order_subtotal, validate_checkout, CreateOrderRequest, CustomerForm, Order,
    OrderBackend, OrderLine, OrderMethod, OrderStatus, PaymentMethod,
};
use crate::config::PaymentConfig;
use crate::error::{ClientError, ClientResult};
use crate::events::{EventSink, Notice, UiEvent};
use crate::session::Session;

/// The single in-flight non-cash payment.
struct PaymentAttempt {
    attempt_id: Uuid,
    order_id: String,
    redirect_url: String,
    browser_open: bool,
    cancel: CancellationToken,
    supervisor: Option<JoinHandle<()>>,
}

impl PaymentAttempt {
    fn stop(self) {
        self.cancel.cancel();
        debug!(order_id = %self.order_id, attempt = %self.attempt_id, "Payment attempt stopped");
    }
}

/// Shared pieces the supervisor task needs after `submit_order` returns.
#[derive(Clone)]
struct Shared {
    backend: Arc<dyn OrderBackend>,
    browser: Arc<dyn BrowserSurface>,
    config: PaymentConfig,
    events: EventSink,
    slot: Arc<Mutex<Option<PaymentAttempt>>>,
    loading: Arc<AtomicBool>,
}

impl Shared {
    fn lock_slot(&self) -> MutexGuard<'_, Option<PaymentAttempt>> {
        self.slot.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Drives checkout for one order screen.
///
/// Holds at most one [`PaymentAttempt`]. Starting a new one, cancelling, or
/// reaching an outcome releases the previous attempt's timers before anything
/// else happens, and a released attempt never emits events.
pub struct PaymentOrchestrator {
    shared: Shared,
    opener: Arc<dyn ExternalOpener>,
    policy: NavigationPolicy,
}

impl PaymentOrchestrator {
    pub fn new(
        backend: Arc<dyn OrderBackend>,
        browser: Arc<dyn BrowserSurface>,
        opener: Arc<dyn ExternalOpener>,
        config: PaymentConfig,
        events: EventSink,
    ) -> Self {
        let policy = NavigationPolicy::new(&config);
        Self {
            shared: Shared {
                backend,
                browser,
                config,
                events,
                slot: Arc::new(Mutex::new(None)),
                loading: Arc::new(AtomicBool::new(false)),
            },
            opener,
            policy,
        }
    }

    // -----------------------------------------------------------------------
    // Checkout
    // -----------------------------------------------------------------------

    /// Validate, create the order, then either confirm it (cash) or start
    /// the payment page and status poller (non-cash).
    pub async fn submit_order(
        &self,
        session: &Session,
        form: &CustomerForm,
        items: Vec<OrderLine>,
        method: OrderMethod,
        payment: Option<PaymentMethod>,
    ) -> ClientResult<Order> {
        let payment = validate_checkout(form, method, payment)?;
        session.require_token()?;

        let totals = compute_total(order_subtotal(&items), method, &self.shared.config);
        let request = CreateOrderRequest::new(form, items, method, payment, &totals);

        self.shared.loading.store(true, Ordering::SeqCst);
        let created = self.shared.backend.create_order(session, &request).await;
        self.shared.loading.store(false, Ordering::SeqCst);
        let created = created.inspect_err(|e| {
            warn!(error = %e, "Order creation failed");
        })?;
        self.release_attempt();

        let mut order = Order {
            id: created.order_id.clone(),
            method,
            items: request.items,
            subtotal: totals.subtotal,
            service_fee: totals.service_fee,
            delivery_fee: totals.delivery_fee,
            payment_method: payment,
            status: OrderStatus::Pending,
        };

        match payment {
            PaymentMethod::Cash => {
                order.status.advance(OrderStatus::Succeeded);
                info!(order_id = %order.id, total = %order.total(), "Cash order confirmed");
                self.shared.events.emit(UiEvent::OrderConfirmed {
                    order_id: order.id.clone(),
                });
            }
            PaymentMethod::NonCash => {
                let Some(redirect_url) = created.redirect_url else {
                    warn!(order_id = %order.id, "Non-cash order came back without a payment link");
                    return Err(ClientError::Remote("cannot build payment link".into()));
                };
                self.start_attempt(session.clone(), order.id.clone(), redirect_url);
            }
        }
        Ok(order)
    }

    /// Drop whatever attempt is active so its poller and ceiling never
    /// publish. The surface is closed after the slot lock is released.
    fn release_attempt(&self) {
        let taken = self.shared.lock_slot().take();
        let Some(prior) = taken else {
            return;
        };
        info!(prior = %prior.order_id, "Releasing active payment attempt");
        if prior.browser_open {
            self.shared.browser.close();
            self.shared.events.emit(UiEvent::PaymentPageClosed {
                order_id: prior.order_id.clone(),
            });
        }
        prior.stop();
    }

    fn start_attempt(&self, session: Session, order_id: String, redirect_url: String) {
        let attempt_id = Uuid::new_v4();
        let cancel = CancellationToken::new();

        self.shared.loading.store(true, Ordering::SeqCst);
        self.shared.browser.open(&redirect_url);
        self.shared.events.emit(UiEvent::PaymentPageOpened {
            order_id: order_id.clone(),
            url: redirect_url.clone(),
        });

        let supervisor = tokio::spawn(supervise(
            self.shared.clone(),
            attempt_id,
            order_id.clone(),
            session,
            cancel.clone(),
        ));
        info!(order_id = %order_id, attempt = %attempt_id, "Payment attempt started");
        let displaced = self.shared.lock_slot().replace(PaymentAttempt {
            attempt_id,
            order_id,
            redirect_url,
            browser_open: true,
            cancel,
            supervisor: Some(supervisor),
        });
        if let Some(displaced) = displaced {
            displaced.stop();
        }
    }

    // -----------------------------------------------------------------------
    // Browser surface callbacks
    // -----------------------------------------------------------------------

    /// Decide whether the embedded surface may load `url`. Diverted URLs are
    /// handed to the OS and the surface is closed; the poller keeps running.
    pub fn on_navigation(&self, url: &str) -> NavigationDecision {
        let decision = self.policy.decide(url);
        let NavigationDecision::Divert(reason) = decision else {
            return decision;
        };

        if let Err(e) = self.opener.open_external(url) {
            warn!(url = %url, reason = ?reason, error = %e, "External app unavailable");
            self.shared
                .events
                .notice(ClientError::ExternalAppUnavailable(e).notice());
        }
        self.close_surface();
        self.shared.loading.store(false, Ordering::SeqCst);
        decision
    }

    pub fn page_load_started(&self) {
        self.shared.loading.store(true, Ordering::SeqCst);
    }

    pub fn page_load_finished(&self) {
        self.shared.loading.store(false, Ordering::SeqCst);
    }

    pub fn is_loading(&self) -> bool {
        self.shared.loading.load(Ordering::SeqCst)
    }

    /// User closed the payment page: stop this attempt's poller as well.
    pub fn cancel_payment(&self) {
        let taken = self.shared.lock_slot().take();
        let Some(attempt) = taken else {
            return;
        };
        info!(order_id = %attempt.order_id, "Payment cancelled by user");
        if attempt.browser_open {
            self.shared.browser.close();
            self.shared.events.emit(UiEvent::PaymentPageClosed {
                order_id: attempt.order_id.clone(),
            });
        }
        self.shared.loading.store(false, Ordering::SeqCst);
        attempt.stop();
    }

    fn close_surface(&self) {
        let closed = {
            let mut slot = self.shared.lock_slot();
            slot.as_mut().filter(|a| a.browser_open).map(|attempt| {
                attempt.browser_open = false;
                attempt.order_id.clone()
            })
        };
        if let Some(order_id) = closed {
            self.shared.browser.close();
            self.shared.events.emit(UiEvent::PaymentPageClosed { order_id });
        }
    }

    // -----------------------------------------------------------------------
    // Read side
    // -----------------------------------------------------------------------

    pub fn active_order_id(&self) -> Option<String> {
        self.shared.lock_slot().as_ref().map(|a| a.order_id.clone())
    }

    pub fn payment_url(&self) -> Option<String> {
        self.shared
            .lock_slot()
            .as_ref()
            .map(|a| a.redirect_url.clone())
    }

    pub fn is_browser_open(&self) -> bool {
        self.shared
            .lock_slot()
            .as_ref()
            .is_some_and(|a| a.browser_open)
    }
}

impl Drop for PaymentOrchestrator {
    fn drop(&mut self) {
        if let Some(attempt) = self.shared.lock_slot().take() {
            if let Some(task) = &attempt.supervisor {
                task.abort();
            }
            attempt.stop();
        }
    }
}

/// Runs one attempt's watch and publishes its outcome if the attempt is
/// still the active one.
async fn supervise(
    shared: Shared,
    attempt_id: Uuid,
    order_id: String,
    session: Session,
    cancel: CancellationToken,
) {
    let outcome = watch_payment(
        shared.backend.as_ref(),
        &session,
        &order_id,
        &shared.config,
        &cancel,
    )
    .await;

    let current = {
        let mut slot = shared.lock_slot();
        let is_current = slot.as_ref().is_some_and(|a| a.attempt_id == attempt_id);
        if is_current && outcome != PollOutcome::Aborted {
            slot.take()
        } else {
            None
        }
    };
    let Some(attempt) = current else {
        debug!(order_id = %order_id, outcome = ?outcome, "Payment attempt already released");
        return;
    };

    if attempt.browser_open {
        shared.browser.close();
        shared.events.emit(UiEvent::PaymentPageClosed {
            order_id: order_id.clone(),
        });
    }
    shared.loading.store(false, Ordering::SeqCst);

    match outcome {
        PollOutcome::Succeeded => {
            info!(order_id = %order_id, "Payment succeeded");
            shared.events.emit(UiEvent::PaymentSucceeded { order_id });
        }
        PollOutcome::Cancelled => {
            warn!(order_id = %order_id, "Payment cancelled or rejected");
            shared.events.notice(Notice::warning(
                "Payment failed",
                "Payment was cancelled or rejected. Please try again.",
            ));
            shared.events.emit(UiEvent::PaymentFailed { order_id });
        }
        PollOutcome::TimedOut => {
            warn!(order_id = %order_id, "Payment status unresolved at ceiling");
            shared
                .events
                .notice(ClientError::Timeout(shared.config.poll_ceiling()).notice());
            shared.events.emit(UiEvent::PaymentTimedOut { order_id });
        }
        PollOutcome::Aborted => {}
    }
    attempt.stop();
}
