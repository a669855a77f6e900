// SPDX-FileCopyrightText: 2026 The sttp-rs Authors
//
// SPDX-License-Identifier: MIT OR Apache-2.0
/*!
Application callback registration surface (§6). Every callback is optional;
callers register only the ones they need via [`Callbacks::builder`].

Callbacks run synchronously on whichever reader thread produced the event
(§5) and are expected to return quickly; a panic inside a callback is caught
at the call site and reported through `error_message` rather than unwinding
the reader thread.
*/

use std::panic::{self, AssertUnwindSafe};

use crate::measurement::{Measurement, Ticks};
use crate::signal_index_cache::SignalIndexCache;

type Callback<T> = Box<dyn Fn(T) + Send + Sync>;

/// Registered application callbacks. Construct via [`Callbacks::builder`].
#[derive(Default)]
pub struct Callbacks {
    status_message: Option<Callback<String>>,
    error_message: Option<Callback<String>>,
    connection_terminated: Option<Callback<()>>,
    auto_reconnect: Option<Callback<()>>,
    metadata_received: Option<Callback<Vec<u8>>>,
    subscription_updated: Option<Callback<SignalIndexCache>>,
    data_start_time: Option<Callback<Ticks>>,
    configuration_changed: Option<Callback<()>>,
    new_measurements: Option<Callback<Vec<Measurement>>>,
    new_buffer_blocks: Option<Callback<Vec<(u32, Vec<u8>)>>>,
    processing_complete: Option<Callback<String>>,
    notification_received: Option<Callback<String>>,
}

/// Incrementally registers the callbacks a [`Callbacks`] value exposes.
#[derive(Default)]
pub struct CallbacksBuilder(Callbacks);

macro_rules! setter {
    ($name:ident, $field:ident, $arg:ty) => {
        /// Registers the `
        #[doc = stringify!($name)]
        /// ` callback.
        pub fn $name(mut self, f: impl Fn($arg) + Send + Sync + 'static) -> Self {
            self.0.$field = Some(Box::new(f));
            self
        }
    };
}

impl CallbacksBuilder {
    setter!(status_message, status_message, String);
    setter!(error_message, error_message, String);
    setter!(connection_terminated, connection_terminated, ());
    setter!(auto_reconnect, auto_reconnect, ());
    setter!(metadata_received, metadata_received, Vec<u8>);
    setter!(subscription_updated, subscription_updated, SignalIndexCache);
    setter!(data_start_time, data_start_time, Ticks);
    setter!(configuration_changed, configuration_changed, ());
    setter!(new_measurements, new_measurements, Vec<Measurement>);
    setter!(new_buffer_blocks, new_buffer_blocks, Vec<(u32, Vec<u8>)>);
    setter!(processing_complete, processing_complete, String);
    setter!(notification_received, notification_received, String);

    /// Finishes registration.
    pub fn build(self) -> Callbacks {
        self.0
    }
}

fn invoke<T>(callback: &Option<Callback<T>>, arg: T) {
    if let Some(f) = callback {
        if panic::catch_unwind(AssertUnwindSafe(|| f(arg))).is_err() {
            log::error!("callback panicked; suppressed to avoid killing the reader thread");
        }
    }
}

impl Callbacks {
    /// Starts building a [`Callbacks`] value with no callbacks registered.
    pub fn builder() -> CallbacksBuilder {
        CallbacksBuilder::default()
    }

    pub(crate) fn status_message(&self, message: impl Into<String>) {
        invoke(&self.status_message, message.into());
    }

    pub(crate) fn error_message(&self, message: impl Into<String>) {
        invoke(&self.error_message, message.into());
    }

    pub(crate) fn connection_terminated(&self) {
        invoke(&self.connection_terminated, ());
    }

    pub(crate) fn auto_reconnect(&self) {
        invoke(&self.auto_reconnect, ());
    }

    pub(crate) fn metadata_received(&self, payload: Vec<u8>) {
        invoke(&self.metadata_received, payload);
    }

    pub(crate) fn subscription_updated(&self, cache: SignalIndexCache) {
        invoke(&self.subscription_updated, cache);
    }

    pub(crate) fn data_start_time(&self, ticks: Ticks) {
        invoke(&self.data_start_time, ticks);
    }

    pub(crate) fn configuration_changed(&self) {
        invoke(&self.configuration_changed, ());
    }

    pub(crate) fn new_measurements(&self, measurements: Vec<Measurement>) {
        invoke(&self.new_measurements, measurements);
    }

    pub(crate) fn new_buffer_blocks(&self, blocks: Vec<(u32, Vec<u8>)>) {
        invoke(&self.new_buffer_blocks, blocks);
    }

    pub(crate) fn processing_complete(&self, message: impl Into<String>) {
        invoke(&self.processing_complete, message.into());
    }

    pub(crate) fn notification_received(&self, message: impl Into<String>) {
        invoke(&self.notification_received, message.into());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    #[test]
    fn unregistered_callback_is_a_silent_no_op() {
        let callbacks = Callbacks::builder().build();
        callbacks.connection_terminated();
    }

    #[test]
    fn registered_callback_is_invoked() {
        let fired = Arc::new(AtomicBool::new(false));
        let fired_clone = fired.clone();
        let callbacks = Callbacks::builder()
            .connection_terminated(move |_| fired_clone.store(true, Ordering::SeqCst))
            .build();
        callbacks.connection_terminated();
        assert!(fired.load(Ordering::SeqCst));
    }

    #[test]
    fn panicking_callback_does_not_propagate() {
        let callbacks = Callbacks::builder()
            .status_message(|_| panic!("boom"))
            .build();
        callbacks.status_message("hi");
    }
}
