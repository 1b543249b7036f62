// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use std::time::{Duration, Instant};

use crate::validation::{is_valid_email, is_valid_mobile};

pub const DEFAULT_QUIET_PERIOD: Duration = Duration::from_millis(400);
pub const MIN_QUIET_PERIOD: Duration = Duration::from_millis(300);
pub const MAX_QUIET_PERIOD: Duration = Duration::from_millis(500);

/// Trailing-edge debounce driven by the caller's clock.
#[derive(Debug, Clone)]
pub struct Debouncer<T> {
    quiet: Duration,
    pending: Option<(Instant, T)>,
}

impl<T> Debouncer<T> {
    pub const fn new(quiet: Duration) -> Self {
        Self {
            quiet,
            pending: None,
        }
    }

    pub const fn quiet_period(&self) -> Duration {
        self.quiet
    }

    /// Replaces any pending value and restarts the quiet period.
    pub fn trigger(&mut self, now: Instant, value: T) {
        self.pending = Some((now + self.quiet, value));
    }

    /// Yields the latest value once its deadline has passed.
    pub fn poll(&mut self, now: Instant) -> Option<T> {
        match &self.pending {
            Some((deadline, _)) if *deadline <= now => self.pending.take().map(|(_, value)| value),
            _ => None,
        }
    }

    pub fn cancel(&mut self) {
        self.pending = None;
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.pending.as_ref().map(|(deadline, _)| *deadline)
    }

    pub const fn is_pending(&self) -> bool {
        self.pending.is_some()
    }
}

impl<T> Default for Debouncer<T> {
    fn default() -> Self {
        Self::new(DEFAULT_QUIET_PERIOD)
    }
}

pub const CONTACT_MOBILE_DIGITS: usize = 8;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CustomerQuery {
    pub mobile: Option<String>,
    pub email: Option<String>,
}

/// Builds the autofill query, or `None` when neither key is complete enough
/// to look up (an 8-digit mobile or a well-formed email).
pub fn customer_query(mobile: &str, email: &str) -> Option<CustomerQuery> {
    let mobile = mobile.trim();
    let email = email.trim();
    let mobile = is_valid_mobile(mobile, CONTACT_MOBILE_DIGITS).then(|| mobile.to_owned());
    let email = is_valid_email(email).then(|| email.to_owned());
    if mobile.is_none() && email.is_none() {
        return None;
    }
    Some(CustomerQuery { mobile, email })
}

#[cfg(test)]
mod tests {
    use super::{Debouncer, customer_query};
    use std::time::{Duration, Instant};

    const QUIET: Duration = Duration::from_millis(400);

    #[test]
    fn rapid_keystrokes_fire_once_with_latest_value() {
        let start = Instant::now();
        let mut debouncer = Debouncer::new(QUIET);
        let mut fired = Vec::new();

        for (offset, typed) in ["9", "91", "912", "9123", "91234567"].iter().enumerate() {
            let now = start + Duration::from_millis(100 * offset as u64);
            debouncer.trigger(now, (*typed).to_owned());
            if let Some(value) = debouncer.poll(now + Duration::from_millis(50)) {
                fired.push(value);
            }
        }

        let last_edit = start + Duration::from_millis(400);
        assert_eq!(debouncer.next_deadline(), Some(last_edit + QUIET));
        assert_eq!(debouncer.poll(last_edit + Duration::from_millis(399)), None);
        if let Some(value) = debouncer.poll(last_edit + QUIET) {
            fired.push(value);
        }
        assert_eq!(debouncer.poll(last_edit + QUIET * 3), None);
        assert_eq!(fired, vec!["91234567".to_owned()]);
    }

    #[test]
    fn cancel_drops_pending_value() {
        let start = Instant::now();
        let mut debouncer = Debouncer::new(QUIET);
        debouncer.trigger(start, 1);
        debouncer.cancel();
        assert!(!debouncer.is_pending());
        assert_eq!(debouncer.poll(start + QUIET * 2), None);
        assert_eq!(debouncer.next_deadline(), None);
    }

    #[test]
    fn lookup_needs_full_mobile_or_valid_email() {
        assert_eq!(customer_query("9123", "hana@"), None);
        assert_eq!(customer_query("", ""), None);

        let by_mobile = customer_query(" 91234567 ", "hana@").expect("mobile is complete");
        assert_eq!(by_mobile.mobile.as_deref(), Some("91234567"));
        assert_eq!(by_mobile.email, None);

        let by_email = customer_query("9123", "hana@example.om").expect("email is valid");
        assert_eq!(by_email.mobile, None);
        assert_eq!(by_email.email.as_deref(), Some("hana@example.om"));
    }
}
