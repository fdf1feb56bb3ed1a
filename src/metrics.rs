use prometheus::{Encoder, IntCounter, IntCounterVec, Opts, Registry, TextEncoder};

#[derive(Clone)]
pub struct Metrics {
    registry: Registry,

    pub bookings_reserved_total: IntCounter,
    pub bookings_confirmed_total: IntCounterVec,
    pub bookings_expired_total: IntCounter,
    pub webhook_rejected_total: IntCounterVec,
    pub gateway_orders_total: IntCounterVec,
}

impl Metrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let bookings_reserved_total = IntCounter::with_opts(Opts::new(
            "bookings_reserved_total",
            "Reservations created (inventory held)",
        ))
        .expect("metric");

        let bookings_confirmed_total = IntCounterVec::new(
            Opts::new("bookings_confirmed_total", "Webhook confirmation outcomes"),
            &["result"], // confirmed|failed|replayed|ignored|unknown_order
        )
        .expect("metric");

        let bookings_expired_total = IntCounter::with_opts(Opts::new(
            "bookings_expired_total",
            "Bookings reclaimed by the expiry reaper",
        ))
        .expect("metric");

        let webhook_rejected_total = IntCounterVec::new(
            Opts::new("webhook_rejected_total", "Webhook deliveries rejected"),
            &["reason"], // signature|malformed
        )
        .expect("metric");

        let gateway_orders_total = IntCounterVec::new(
            Opts::new("gateway_orders_total", "Gateway order creation attempts"),
            &["result"], // success|error
        )
        .expect("metric");

        registry
            .register(Box::new(bookings_reserved_total.clone()))
            .expect("register");
        registry
            .register(Box::new(bookings_confirmed_total.clone()))
            .expect("register");
        registry
            .register(Box::new(bookings_expired_total.clone()))
            .expect("register");
        registry
            .register(Box::new(webhook_rejected_total.clone()))
            .expect("register");
        registry
            .register(Box::new(gateway_orders_total.clone()))
            .expect("register");

        Self {
            registry,
            bookings_reserved_total,
            bookings_confirmed_total,
            bookings_expired_total,
            webhook_rejected_total,
            gateway_orders_total,
        }
    }

    pub fn render(&self) -> String {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        if let Err(e) = encoder.encode(&self.registry.gather(), &mut buffer) {
            tracing::error!(error = %e, "failed to encode metrics");
            return String::new();
        }
        String::from_utf8(buffer).unwrap_or_default()
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}
